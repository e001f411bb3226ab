use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Panel kinds a switch port can terminate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    Patch,
    Fiber,
}

impl PanelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelKind::Patch => "patch",
            PanelKind::Fiber => "fiber",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "patch" => Some(PanelKind::Patch),
            "fiber" => Some(PanelKind::Fiber),
            _ => None,
        }
    }
}

/// PatchPanel represents passive copper cabling equipment in a rack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPanel {
    pub id: i64,
    pub rack_id: i64,
    pub panel_letter: String,
    pub total_ports: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_in_rack: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// FiberPanel represents passive fiber cabling equipment in a rack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberPanel {
    pub id: i64,
    pub rack_id: i64,
    pub panel_letter: String,
    pub total_fibers: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_in_rack: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreatePatchPanelRequest for creating new patch panels
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatchPanelRequest {
    pub rack_id: i64,
    pub panel_letter: String,
    pub total_ports: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position_in_rack: Option<i64>,
}

/// UpdatePatchPanelRequest for updating patch panels
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePatchPanelRequest {
    pub panel_letter: String,
    pub total_ports: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position_in_rack: Option<i64>,
}

/// CreateFiberPanelRequest for creating new fiber panels
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFiberPanelRequest {
    pub rack_id: i64,
    pub panel_letter: String,
    pub total_fibers: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position_in_rack: Option<i64>,
}

/// UpdateFiberPanelRequest for updating fiber panels
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFiberPanelRequest {
    pub panel_letter: String,
    pub total_fibers: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position_in_rack: Option<i64>,
}
