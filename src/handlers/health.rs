//! Health check handler

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "proxy_running": state.listener.is_running().await,
        "observers": state.broadcaster.observer_count(),
        "stats": state.stats.snapshot(),
    }))
}
