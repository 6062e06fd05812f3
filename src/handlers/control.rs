//! Proxy lifecycle handlers

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Start the proxy listener. `running` is false when it was already up
/// or the bind failed.
pub async fn start_proxy(State(state): State<AppState>) -> Json<Value> {
    let ok = state.listener.start().await;
    Json(json!({ "running": ok }))
}

/// Stop the proxy listener. `stopped` is false when it was not running.
pub async fn stop_proxy(State(state): State<AppState>) -> Json<Value> {
    let ok = state.listener.stop().await;
    Json(json!({ "stopped": ok }))
}
