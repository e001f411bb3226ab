use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default slot capacity of a new rack
pub const DEFAULT_RACK_SLOTS: i64 = 42;

/// Upper bound on rack slot capacity
pub const MAX_RACK_SLOTS: i64 = 1000;

/// Rack represents a physical frame with numbered mountable slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rack {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub slots: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateRackRequest for creating new racks
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRackRequest {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slots: Option<i64>,
}

/// UpdateRackRequest for updating racks
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRackRequest {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slots: Option<i64>,
}

/// Free slot positions within a rack
#[derive(Debug, Clone, Serialize)]
pub struct FreeSlots {
    pub rack_id: i64,
    pub slots: i64,
    pub free: Vec<i64>,
}

/// Equipment kinds that can occupy a rack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Switch,
    PatchPanel,
    FiberPanel,
}

impl EquipmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentKind::Switch => "switch",
            EquipmentKind::PatchPanel => "patch_panel",
            EquipmentKind::FiberPanel => "fiber_panel",
        }
    }
}

/// Query parameters for the free-slot listing
#[derive(Debug, Clone, Deserialize)]
pub struct FreeSlotsQuery {
    #[serde(default)]
    pub exclude_kind: Option<EquipmentKind>,
    #[serde(default)]
    pub exclude_id: Option<i64>,
}
