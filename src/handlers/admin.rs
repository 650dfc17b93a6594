// handlers/admin.rs
use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::{errors::Result, models::settlement::Settlement, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// Recent document changes as seen by the store subscription.
pub async fn activity_feed(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Json<Vec<crate::state::ActivityEntry>> {
    let limit = query.limit.unwrap_or(50).min(100);
    Json(state.activity.recent(limit))
}

pub async fn list_settlements(State(state): State<AppState>) -> Result<Json<Vec<Settlement>>> {
    Ok(Json(state.store.list_settlements().await?))
}
