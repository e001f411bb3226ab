use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PanelKind;

/// Number of trailing switch ports that are fiber class
pub const FIBER_PORT_COUNT: i64 = 4;

/// Maximum panel-to-panel hops followed when resolving a jumper chain
pub const MAX_JUMP_HOPS: usize = 8;

/// Maximum logical devices behind a single hub port
pub const MAX_HUB_MEMBERS: usize = 32;

/// Port class derived from a port's position relative to the switch's
/// total port count. Never stored; recomputed on demand so a change to the
/// total count can't leave a stale classification behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortClass {
    Ethernet,
    Fiber,
}

/// The last four ports of a switch are fiber class, the rest ethernet.
pub fn port_class(port_no: i64, total_ports: i64) -> PortClass {
    if port_no > total_ports - FIBER_PORT_COUNT {
        PortClass::Fiber
    } else {
        PortClass::Ethernet
    }
}

impl PortClass {
    /// The panel kind this class of port may terminate on
    pub fn compatible_panel(&self) -> PanelKind {
        match self {
            PortClass::Ethernet => PanelKind::Patch,
            PortClass::Fiber => PanelKind::Fiber,
        }
    }
}

/// Structural peer reference carried on the switch side of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanelBinding {
    pub panel_kind: PanelKind,
    pub panel_id: i64,
    pub panel_port: i64,
}

/// One logical device behind a hub port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMember {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub category: String,
}

/// SwitchPort is the connection state of a single switch port: device
/// fields, the optional structural peer, and the hub fan-out overlay.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchPort {
    pub id: i64,
    pub switch_id: i64,
    pub port_no: i64,
    pub class: PortClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<PanelBinding>,
    pub is_hub: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hub_members: Vec<HubMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PatchPort is the panel-side mirror row of a copper binding
#[derive(Debug, Clone, Serialize)]
pub struct PatchPort {
    pub id: i64,
    pub panel_id: i64,
    pub port_number: i64,
    pub status: String, // active, inactive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_switch_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_switch_port: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// FiberPort is the panel-side mirror row of a fiber binding. The peer is
/// either a switch port or another fiber panel port, never both.
#[derive(Debug, Clone, Serialize)]
pub struct FiberPort {
    pub id: i64,
    pub panel_id: i64,
    pub port_number: i64,
    pub status: String, // active, inactive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_switch_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_switch_port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_panel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_panel_port: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical mirror tag values on panel-side rows
pub mod link_kind {
    pub const SWITCH_TO_PANEL: &str = "switch_to_panel";
    pub const PANEL_TO_SWITCH: &str = "panel_to_switch";
    pub const PANEL_TO_PANEL: &str = "panel_to_panel";
    pub const DIRECT: &str = "direct";
    pub const JUMP_POINT: &str = "jump_point";
}

/// SetPortRequest updates a port's device fields without touching the
/// structural peer slot (any existing peer is disconnected first).
#[derive(Debug, Clone, Deserialize)]
pub struct SetPortRequest {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// BindToPanelRequest binds a switch port to a panel port (switch side)
#[derive(Debug, Clone, Deserialize)]
pub struct BindToPanelRequest {
    pub panel_kind: PanelKind,
    pub panel_id: i64,
    pub panel_port: i64,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// BindPanelPortRequest binds a panel port to a switch port (panel side)
#[derive(Debug, Clone, Deserialize)]
pub struct BindPanelPortRequest {
    pub switch_id: i64,
    pub switch_port: i64,
}

/// BridgeRequest joins two fiber panel ports with a jumper
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRequest {
    pub peer_panel_id: i64,
    pub peer_panel_port: i64,
}

/// SetHubRequest flags a port as an unmanaged-hub uplink
#[derive(Debug, Clone, Deserialize)]
pub struct SetHubRequest {
    pub hub_name: String,
    #[serde(default)]
    pub members: Vec<HubMember>,
}

/// Ultimate switch endpoint of a fiber jumper chain
#[derive(Debug, Clone, Serialize)]
pub struct ChainEndpoint {
    pub switch_id: i64,
    pub switch_port: i64,
    pub hops: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_class_boundaries() {
        // 48-port switch: 45..=48 are fiber, 1..=44 ethernet
        assert_eq!(port_class(44, 48), PortClass::Ethernet);
        assert_eq!(port_class(45, 48), PortClass::Fiber);
        assert_eq!(port_class(46, 48), PortClass::Fiber);
        assert_eq!(port_class(48, 48), PortClass::Fiber);
        assert_eq!(port_class(1, 48), PortClass::Ethernet);
    }

    #[test]
    fn test_port_class_small_switch() {
        // Every port of a 4-port switch is fiber class
        assert_eq!(port_class(1, 4), PortClass::Fiber);
        assert_eq!(port_class(4, 4), PortClass::Fiber);
        assert_eq!(port_class(1, 5), PortClass::Ethernet);
        assert_eq!(port_class(2, 5), PortClass::Fiber);
    }

    #[test]
    fn test_port_class_tracks_total() {
        // The rule is a pure function of (port_no, total): resizing the
        // switch reclassifies without any stored state.
        assert_eq!(port_class(24, 24), PortClass::Fiber);
        assert_eq!(port_class(24, 48), PortClass::Ethernet);
    }

    #[test]
    fn test_compatible_panel() {
        assert_eq!(PortClass::Ethernet.compatible_panel(), PanelKind::Patch);
        assert_eq!(PortClass::Fiber.compatible_panel(), PanelKind::Fiber);
    }
}
