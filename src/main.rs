//! Sievegate - inline HTTP traffic inspection proxy
//!
//! Every inbound request on the proxy port is intercepted, scored by the
//! classifier oracle, then blocked or relayed to its origin. Decisions are
//! persisted to the audit store and pushed to live observers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SIEVEGATE                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────────────────────────────────┐ │
//! │  │ Control  │   │ Proxy Listener                           │ │
//! │  │ Surface  │   │  extract → oracle → policy → relay/403   │ │
//! │  │ (Axum)   │   │             │                            │ │
//! │  └────┬─────┘   └─────────────┼────────────────────────────┘ │
//! │       │            ┌──────────┴──────────┐                   │
//! │       ▼            ▼                     ▼                   │
//! │  ┌─────────┐  ┌──────────┐       ┌──────────────┐           │
//! │  │ SQLite  │  │ Audit    │       │ Broadcaster  │──► ws     │
//! │  │ (waf.db)│◄─┤ Store    │       │ (observers)  │           │
//! │  └─────────┘  └──────────┘       └──────────────┘           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod broadcast;
mod config;
mod error;
mod features;
mod handlers;
mod models;
mod oracle;
mod policy;
mod proxy;
mod relay;
mod stats;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use broadcast::Broadcaster;
use oracle::{LogisticOracle, Oracle};
use proxy::pipeline::PipelineContext;
use proxy::ProxyListener;
use relay::{HttpRelay, Relay};
use stats::ProxyStats;
use store::AuditStore;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub listener: Arc<ProxyListener>,
    pub store: Arc<AuditStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub oracle: Arc<dyn Oracle>,
    pub relay: Arc<dyn Relay>,
    pub stats: Arc<ProxyStats>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sievegate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("Sievegate starting...");
    tracing::info!(
        threshold = config.threshold,
        include_headers = config.include_headers,
        "decision policy"
    );

    let stats = Arc::new(ProxyStats::new());
    let store = Arc::new(
        AuditStore::open(&config.database_path)
            .with_context(|| format!("failed to open audit store at {}", config.database_path))?,
    );
    let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&stats)));
    let oracle: Arc<dyn Oracle> = Arc::new(LogisticOracle::default());
    let relay: Arc<dyn Relay> = Arc::new(HttpRelay::new(
        config.relay_timeout_secs,
        config.relay_body_cap,
    ));

    let pipeline_ctx = Arc::new(PipelineContext {
        config: config.clone(),
        oracle: Arc::clone(&oracle),
        relay: Arc::clone(&relay),
        store: Arc::clone(&store),
        broadcaster: Arc::clone(&broadcaster),
        stats: Arc::clone(&stats),
    });

    let proxy_addr = SocketAddr::from(([0, 0, 0, 0], config.proxy_port));
    let listener = Arc::new(ProxyListener::new(proxy_addr, pipeline_ctx));

    if config.proxy_autostart && listener.start().await {
        tracing::info!("proxy autostarted");
    }

    let state = AppState {
        config: config.clone(),
        listener,
        store,
        broadcaster,
        oracle,
        relay,
        stats,
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Control surface listening on http://{}", addr);

    let control_listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control port {}", addr))?;
    axum::serve(control_listener, app)
        .await
        .context("control server error")?;

    Ok(())
}

/// Create the control-surface router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/startproxy", post(handlers::control::start_proxy))
        .route("/stopproxy", post(handlers::control::stop_proxy))
        .route("/requests", get(handlers::requests::list))
        .route("/analyze-request", post(handlers::analyze::analyze_request))
        .route("/replay-request", post(handlers::analyze::replay_request))
        .route("/ws", get(handlers::events::subscribe))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
