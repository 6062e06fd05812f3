//! Proxy Listener
//!
//! Accepts raw HTTP traffic on the ingress port, runs one pipeline
//! execution per request, and writes the relay/reject response back.
//! Lifecycle is Stopped -> Running -> Stopped; `start`/`stop` are
//! idempotent and safe to call concurrently with in-flight handling.

pub mod pipeline;


use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::relay::RelayError;
use pipeline::{PipelineContext, PipelineResponse};

struct RunningListener {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Owns the ingress socket and the Running/Stopped state.
pub struct ProxyListener {
    addr: SocketAddr,
    ctx: Arc<PipelineContext>,
    inner: Mutex<Option<RunningListener>>,
}

impl ProxyListener {
    pub fn new(addr: SocketAddr, ctx: Arc<PipelineContext>) -> Self {
        Self {
            addr,
            ctx,
            inner: Mutex::new(None),
        }
    }

    /// Bind and begin accepting. Returns false when already running or
    /// when the bind fails.
    pub async fn start(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            return false;
        }

        let listener = match tokio::net::TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(addr = %self.addr, error = %e, "proxy bind failed");
                return false;
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, "proxy local_addr failed");
                return false;
            }
        };

        let (shutdown, mut signal) = watch::channel(false);
        let app = Router::new()
            .fallback(intercept)
            .with_state(Arc::clone(&self.ctx));

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                // Wait for stop(); in-flight pipelines finish first.
                let _ = signal.changed().await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "proxy server error");
            }
        });

        tracing::info!(addr = %local_addr, "proxy listening");
        *inner = Some(RunningListener {
            shutdown,
            handle,
            local_addr,
        });
        true
    }

    /// Signal shutdown and wait for the accept loop to drain. Returns
    /// false when already stopped.
    pub async fn stop(&self) -> bool {
        let running = {
            let mut inner = self.inner.lock().await;
            inner.take()
        };

        let Some(running) = running else {
            return false;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "proxy task join error");
        }
        tracing::info!("proxy stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Bound address while running (useful when started on port 0).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().await.as_ref().map(|r| r.local_addr)
    }
}

/// Ingress handler: any method, any target. Reads the body fully, runs
/// the pipeline, converts the outcome into the wire response.
async fn intercept(State(ctx): State<Arc<PipelineContext>>, request: Request) -> Response {
    let method = request.method().to_string();
    let target = request.uri().to_string();

    let mut headers = std::collections::BTreeMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let max_body = ctx.config.max_body_bytes;
    let body = match to_bytes(request.into_body(), max_body).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unreadable request body: {}", e) })),
            )
                .into_response();
        }
    };

    let outcome = pipeline::run(&ctx, method, target, headers, body).await;

    match outcome.response {
        PipelineResponse::Rejected { probability } => rejection_response(probability),
        PipelineResponse::Relayed(relayed) => {
            let status =
                StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut builder = Response::builder().status(status);
            for (name, value) in &relayed.headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    builder = builder.header(name, value);
                }
            }
            builder
                .body(Body::from(relayed.body))
                .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        PipelineResponse::RelayFailed(error) => relay_failure_response(&error),
    }
}

/// Fixed rejection for blocked requests: 403 plus a small JSON body with
/// the block reason and computed probability.
fn rejection_response(probability: f64) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "status": "blocked",
            "reason": format!("malicious_prob={:.4}", probability),
            "malicious_prob": probability,
        })),
    )
        .into_response()
}

/// Synthesized 5xx for transport-level relay failures.
fn relay_failure_response(error: &RelayError) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "status": "relay_failed",
            "reason": error.to_string(),
        })),
    )
        .into_response()
}
