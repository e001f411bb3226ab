use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ConnectionHistory is one immutable audit record, written in the same
/// transaction as the mutation it describes.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHistory {
    pub id: i64,
    pub actor: String,
    pub link_kind: String,
    pub source_kind: String,
    pub source_id: i64,
    pub source_port: i64,
    pub target_kind: String,
    pub target_id: i64,
    pub target_port: i64,
    pub action: String, // created, updated, deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_values: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Canonical history action values
pub mod history_action {
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";
    pub const DELETED: &str = "deleted";
}

/// Query parameters for the history listing
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub source_kind: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub source_port: Option<i64>,
}
