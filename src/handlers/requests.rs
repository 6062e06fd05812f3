//! Audit log handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::models::RequestRecord;
use crate::{AppResult, AppState};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct RecentFilter {
    pub limit: Option<usize>,
}

/// Recent decisions, most recent first.
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<RecentFilter>,
) -> AppResult<Json<Vec<RequestRecord>>> {
    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let records = state.store.recent(limit)?;
    Ok(Json(records))
}
