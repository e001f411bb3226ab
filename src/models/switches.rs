use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Switch represents managed network equipment with a fixed set of ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub ports: i64,
    pub status: String, // online, offline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_in_rack: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateSwitchRequest for creating new switches
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSwitchRequest {
    pub name: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub ports: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub rack_id: Option<i64>,
    #[serde(default)]
    pub position_in_rack: Option<i64>,
}

/// UpdateSwitchRequest for updating switches
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSwitchRequest {
    pub name: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub ports: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub rack_id: Option<i64>,
    #[serde(default)]
    pub position_in_rack: Option<i64>,
}
