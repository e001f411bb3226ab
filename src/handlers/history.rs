use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::ApiError;

/// Query parameters for the history listing. Kept flat because nested
/// structs don't survive the urlencoded deserializer.
#[derive(Debug, Deserialize)]
pub struct HistoryListQuery {
    #[serde(default)]
    pub source_kind: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub source_port: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

fn default_limit() -> i32 {
    100
}

/// List audit records, newest first, optionally filtered by source
pub async fn list_history(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryListQuery>,
) -> Result<Json<Vec<ConnectionHistory>>, ApiError> {
    let filter = HistoryQuery {
        source_kind: query.source_kind,
        source_id: query.source_id,
        source_port: query.source_port,
    };
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);
    let records = state.store.list_history(&filter, limit, offset).await?;
    Ok(Json(records))
}
