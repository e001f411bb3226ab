use sqlx::{sqlite::SqliteRow, Row};

use crate::models::*;

/// Filter empty strings to None — used when DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Positions are NULL for unracked/unslotted equipment
fn opt_i64(row: &SqliteRow, col: &str) -> Option<i64> {
    row.try_get::<Option<i64>, _>(col).ok().flatten()
}

/// Map a SQLite row to a Rack struct
pub fn map_rack_row(row: &SqliteRow) -> Rack {
    Rack {
        id: row.get("id"),
        name: row.get("name"),
        location: none_if_empty(row.get("location")),
        description: none_if_empty(row.get("description")),
        slots: row.get("slots"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Switch struct
pub fn map_switch_row(row: &SqliteRow) -> Switch {
    Switch {
        id: row.get("id"),
        name: row.get("name"),
        vendor: none_if_empty(row.get("vendor")),
        model: none_if_empty(row.get("model")),
        ports: row.get("ports"),
        status: row.get("status"),
        ip: none_if_empty(row.get("ip")),
        rack_id: opt_i64(row, "rack_id"),
        position_in_rack: opt_i64(row, "position_in_rack"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a PatchPanel struct
pub fn map_patch_panel_row(row: &SqliteRow) -> PatchPanel {
    PatchPanel {
        id: row.get("id"),
        rack_id: row.get("rack_id"),
        panel_letter: row.get("panel_letter"),
        total_ports: row.get("total_ports"),
        description: none_if_empty(row.get("description")),
        position_in_rack: opt_i64(row, "position_in_rack"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a FiberPanel struct
pub fn map_fiber_panel_row(row: &SqliteRow) -> FiberPanel {
    FiberPanel {
        id: row.get("id"),
        rack_id: row.get("rack_id"),
        panel_letter: row.get("panel_letter"),
        total_fibers: row.get("total_fibers"),
        description: none_if_empty(row.get("description")),
        position_in_rack: opt_i64(row, "position_in_rack"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row (joined with the owning switch's port count) to a
/// SwitchPort. The port class is derived here, never read from storage.
pub fn map_switch_port_row(row: &SqliteRow) -> SwitchPort {
    let port_no: i64 = row.get("port_no");
    let total_ports: i64 = row.get("switch_total_ports");
    let binding = match (
        row.try_get::<Option<String>, _>("bound_panel_kind")
            .ok()
            .flatten()
            .as_deref()
            .and_then(PanelKind::parse),
        opt_i64(row, "bound_panel_id"),
        opt_i64(row, "bound_panel_port"),
    ) {
        (Some(panel_kind), Some(panel_id), Some(panel_port)) => Some(PanelBinding {
            panel_kind,
            panel_id,
            panel_port,
        }),
        _ => None,
    };
    let hub_members: Vec<HubMember> = row
        .try_get::<Option<String>, _>("hub_members")
        .ok()
        .flatten()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();
    let is_hub: i64 = row.get("is_hub");

    SwitchPort {
        id: row.get("id"),
        switch_id: row.get("switch_id"),
        port_no,
        class: port_class(port_no, total_ports),
        kind: none_if_empty(row.get("kind")),
        device: none_if_empty(row.get("device")),
        ip: none_if_empty(row.get("ip")),
        mac: none_if_empty(row.get("mac")),
        note: none_if_empty(row.get("note")),
        binding,
        is_hub: is_hub != 0,
        hub_name: none_if_empty(row.get("hub_name")),
        hub_members,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a PatchPort struct
pub fn map_patch_port_row(row: &SqliteRow) -> PatchPort {
    PatchPort {
        id: row.get("id"),
        panel_id: row.get("panel_id"),
        port_number: row.get("port_number"),
        status: row.get("status"),
        link_kind: row.try_get::<Option<String>, _>("link_kind").ok().flatten(),
        peer_switch_id: opt_i64(row, "peer_switch_id"),
        peer_switch_port: opt_i64(row, "peer_switch_port"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a FiberPort struct
pub fn map_fiber_port_row(row: &SqliteRow) -> FiberPort {
    FiberPort {
        id: row.get("id"),
        panel_id: row.get("panel_id"),
        port_number: row.get("port_number"),
        status: row.get("status"),
        link_kind: row.try_get::<Option<String>, _>("link_kind").ok().flatten(),
        peer_switch_id: opt_i64(row, "peer_switch_id"),
        peer_switch_port: opt_i64(row, "peer_switch_port"),
        peer_panel_id: opt_i64(row, "peer_panel_id"),
        peer_panel_port: opt_i64(row, "peer_panel_port"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a ConnectionHistory struct
pub fn map_history_row(row: &SqliteRow) -> ConnectionHistory {
    let parse_json = |col: &str| -> Option<serde_json::Value> {
        row.try_get::<Option<String>, _>(col)
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok())
    };
    ConnectionHistory {
        id: row.get("id"),
        actor: row.get("actor"),
        link_kind: row.get("link_kind"),
        source_kind: row.get("source_kind"),
        source_id: row.get("source_id"),
        source_port: row.get("source_port"),
        target_kind: row.get("target_kind"),
        target_id: row.get("target_id"),
        target_port: row.get("target_port"),
        action: row.get("action"),
        old_values: parse_json("old_values"),
        new_values: parse_json("new_values"),
        created_at: row.get("created_at"),
    }
}

/// Map a SQLite row to a User struct
pub fn map_user_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
