use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection, Transaction};

use crate::models::*;

use super::error::TopologyError;
use super::history::HistoryRepo;
use super::row_helpers::map_switch_port_row;
use super::switches::fetch_switch;
use super::NotFoundError;

const SELECT_SWITCH_PORT: &str = r#"
    SELECT sp.id, sp.switch_id, sp.port_no, sp.kind, sp.device, sp.ip, sp.mac, sp.note,
           sp.bound_panel_kind, sp.bound_panel_id, sp.bound_panel_port,
           sp.is_hub, sp.hub_name, sp.hub_members, sp.created_at, sp.updated_at,
           s.ports AS switch_total_ports
    FROM switch_ports sp
    JOIN switches s ON s.id = sp.switch_id
"#;

/// Connection graph operations. Every mutation validates first, then lands
/// both halves of the mirror in one transaction.
pub struct PortRepo;

impl PortRepo {
    pub async fn list_for_switch(pool: &Pool<Sqlite>, switch_id: i64) -> Result<Vec<SwitchPort>> {
        let rows = sqlx::query(&format!(
            "{} WHERE sp.switch_id = ? ORDER BY sp.port_no",
            SELECT_SWITCH_PORT
        ))
        .bind(switch_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_switch_port_row).collect())
    }

    pub async fn get(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
    ) -> Result<Option<SwitchPort>> {
        let row = sqlx::query(&format!(
            "{} WHERE sp.switch_id = ? AND sp.port_no = ?",
            SELECT_SWITCH_PORT
        ))
        .bind(switch_id)
        .bind(port_no)
        .fetch_optional(pool)
        .await?;
        Ok(row.as_ref().map(map_switch_port_row))
    }

    /// Set device fields on a port with no structural peer. Any existing
    /// peer is disconnected first; the note survives unless supplied.
    pub async fn set_direct(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
        req: &SetPortRequest,
        actor: &str,
    ) -> Result<SwitchPort> {
        let mut tx = pool.begin().await?;
        let switch = require_switch(&mut tx, switch_id).await?;
        let port = require_port(&mut tx, &switch, port_no).await?;

        if port.binding.is_some() {
            disconnect_structural_tx(&mut tx, &port, actor).await?;
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE switch_ports SET kind = ?, device = ?, ip = ?, mac = ?, note = ?, updated_at = ?
            WHERE switch_id = ? AND port_no = ?
            "#,
        )
        .bind(req.kind.clone().unwrap_or_default())
        .bind(req.device.clone().unwrap_or_default())
        .bind(req.ip.clone().unwrap_or_default())
        .bind(req.mac.clone().unwrap_or_default())
        .bind(req.note.clone().or(port.note.clone()).unwrap_or_default())
        .bind(now)
        .bind(switch_id)
        .bind(port_no)
        .execute(&mut *tx)
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            link_kind::DIRECT,
            ("switch", switch_id, port_no),
            ("", 0, 0),
            history_action::UPDATED,
            Some(port_values(&port)),
            Some(serde_json::json!({
                "kind": req.kind,
                "device": req.device,
                "ip": req.ip,
                "mac": req.mac,
            })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, switch_id, port_no)
            .await?
            .context("Port not found after update")
    }

    /// Bind a switch port to a panel port, switch side first. Writes both
    /// halves of the mirror or neither.
    pub async fn bind_to_panel(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
        req: &BindToPanelRequest,
        actor: &str,
    ) -> Result<SwitchPort> {
        let mut tx = pool.begin().await?;
        let switch = require_switch(&mut tx, switch_id).await?;
        let port = require_port(&mut tx, &switch, port_no).await?;

        let panel = require_panel(&mut tx, req.panel_kind, req.panel_id).await?;

        // Rack scoping: binding targets must share the switch's rack
        if switch.rack_id.is_none() || switch.rack_id != Some(panel.rack_id) {
            return Err(TopologyError::RackMismatch {
                panel_kind: req.panel_kind.as_str(),
                panel_id: req.panel_id,
            }
            .into());
        }

        let class = port_class(port_no, switch.ports);
        if class.compatible_panel() != req.panel_kind {
            return Err(TopologyError::PortClassMismatch {
                port: port_no,
                class: match class {
                    PortClass::Ethernet => "ethernet",
                    PortClass::Fiber => "fiber",
                },
                panel_kind: req.panel_kind.as_str(),
            }
            .into());
        }

        if req.panel_port < 1 || req.panel_port > panel.total_ports {
            return Err(TopologyError::PortOutOfRange {
                port: req.panel_port,
                max: panel.total_ports,
            }
            .into());
        }

        // The target's switch-peer slot must be free, or already ours
        let peer = panel_mirror_peer(&mut tx, req.panel_kind, req.panel_id, req.panel_port).await?;
        if let Some((peer_switch, peer_port)) = peer {
            if peer_switch != switch_id || peer_port != port_no {
                return Err(TopologyError::AlreadyBoundElsewhere {
                    detail: format!(
                        "{} panel {} port {} already mirrors switch {} port {}",
                        req.panel_kind.as_str(),
                        req.panel_id,
                        req.panel_port,
                        peer_switch,
                        peer_port
                    ),
                }
                .into());
            }
        }

        // Re-binding elsewhere clears the old mirror inside this transaction
        if let Some(old) = port.binding {
            let moved = old.panel_kind != req.panel_kind
                || old.panel_id != req.panel_id
                || old.panel_port != req.panel_port;
            if moved {
                clear_panel_mirror(&mut tx, old.panel_kind, old.panel_id, old.panel_port).await?;
                HistoryRepo::record(
                    &mut tx,
                    actor,
                    link_kind::SWITCH_TO_PANEL,
                    ("switch", switch_id, port_no),
                    (old.panel_kind.as_str(), old.panel_id, old.panel_port),
                    history_action::DELETED,
                    Some(serde_json::json!({ "reason": "rebound" })),
                    None,
                )
                .await?;
            }
        }

        // A point-to-point binding and the hub overlay are mutually
        // exclusive; rewiring the port drops the fan-out list.
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE switch_ports SET kind = ?, device = ?, ip = ?, mac = ?, note = ?,
                bound_panel_kind = ?, bound_panel_id = ?, bound_panel_port = ?,
                is_hub = 0, hub_name = '', hub_members = NULL, updated_at = ?
            WHERE switch_id = ? AND port_no = ?
            "#,
        )
        .bind(req.kind.clone().or(port.kind.clone()).unwrap_or_default())
        .bind(req.device.clone().or(port.device.clone()).unwrap_or_default())
        .bind(req.ip.clone().or(port.ip.clone()).unwrap_or_default())
        .bind(req.mac.clone().or(port.mac.clone()).unwrap_or_default())
        .bind(req.note.clone().or(port.note.clone()).unwrap_or_default())
        .bind(req.panel_kind.as_str())
        .bind(req.panel_id)
        .bind(req.panel_port)
        .bind(now)
        .bind(switch_id)
        .bind(port_no)
        .execute(&mut *tx)
        .await?;

        write_panel_mirror(
            &mut tx,
            req.panel_kind,
            req.panel_id,
            req.panel_port,
            switch_id,
            port_no,
            link_kind::SWITCH_TO_PANEL,
        )
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            link_kind::SWITCH_TO_PANEL,
            ("switch", switch_id, port_no),
            (req.panel_kind.as_str(), req.panel_id, req.panel_port),
            history_action::CREATED,
            Some(port_values(&port)),
            Some(serde_json::json!({
                "panel_kind": req.panel_kind.as_str(),
                "panel_id": req.panel_id,
                "panel_port": req.panel_port,
                "device": req.device,
            })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, switch_id, port_no)
            .await?
            .context("Port not found after bind")
    }

    /// Bind a panel port to a switch port, panel side first. The same edge
    /// as `bind_to_panel`, with the conflict check on the switch port.
    pub async fn bind_panel_port(
        pool: &Pool<Sqlite>,
        panel_kind: PanelKind,
        panel_id: i64,
        port_number: i64,
        req: &BindPanelPortRequest,
        actor: &str,
    ) -> Result<()> {
        let mut tx = pool.begin().await?;
        let panel = require_panel(&mut tx, panel_kind, panel_id).await?;
        if port_number < 1 || port_number > panel.total_ports {
            return Err(TopologyError::PortOutOfRange {
                port: port_number,
                max: panel.total_ports,
            }
            .into());
        }

        let switch = require_switch(&mut tx, req.switch_id).await?;
        let port = require_port(&mut tx, &switch, req.switch_port).await?;

        if switch.rack_id.is_none() || switch.rack_id != Some(panel.rack_id) {
            return Err(TopologyError::RackMismatch {
                panel_kind: panel_kind.as_str(),
                panel_id,
            }
            .into());
        }

        let class = port_class(req.switch_port, switch.ports);
        if class.compatible_panel() != panel_kind {
            return Err(TopologyError::PortClassMismatch {
                port: req.switch_port,
                class: match class {
                    PortClass::Ethernet => "ethernet",
                    PortClass::Fiber => "fiber",
                },
                panel_kind: panel_kind.as_str(),
            }
            .into());
        }

        // The switch port's peer slot must be free, or already this pair
        if let Some(old) = port.binding {
            let same = old.panel_kind == panel_kind
                && old.panel_id == panel_id
                && old.panel_port == port_number;
            if !same {
                return Err(TopologyError::AlreadyBoundElsewhere {
                    detail: format!(
                        "switch {} port {} already mirrors {} panel {} port {}",
                        req.switch_id,
                        req.switch_port,
                        old.panel_kind.as_str(),
                        old.panel_id,
                        old.panel_port
                    ),
                }
                .into());
            }
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE switch_ports SET bound_panel_kind = ?, bound_panel_id = ?, bound_panel_port = ?,
                is_hub = 0, hub_name = '', hub_members = NULL, updated_at = ?
            WHERE switch_id = ? AND port_no = ?
            "#,
        )
        .bind(panel_kind.as_str())
        .bind(panel_id)
        .bind(port_number)
        .bind(now)
        .bind(req.switch_id)
        .bind(req.switch_port)
        .execute(&mut *tx)
        .await?;

        write_panel_mirror(
            &mut tx,
            panel_kind,
            panel_id,
            port_number,
            req.switch_id,
            req.switch_port,
            link_kind::PANEL_TO_SWITCH,
        )
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            link_kind::PANEL_TO_SWITCH,
            (panel_kind.as_str(), panel_id, port_number),
            ("switch", req.switch_id, req.switch_port),
            history_action::CREATED,
            None,
            Some(serde_json::json!({
                "switch_id": req.switch_id,
                "switch_port": req.switch_port,
            })),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Clear the structural peer on both sides; device fields survive.
    pub async fn disconnect_structural(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
        actor: &str,
    ) -> Result<SwitchPort> {
        let mut tx = pool.begin().await?;
        let switch = require_switch(&mut tx, switch_id).await?;
        let port = require_port(&mut tx, &switch, port_no).await?;

        if port.binding.is_some() {
            disconnect_structural_tx(&mut tx, &port, actor).await?;
        }
        tx.commit().await?;

        Self::get(pool, switch_id, port_no)
            .await?
            .context("Port not found after disconnect")
    }

    /// Disconnect a panel port from whatever it mirrors. Fiber ports may
    /// hold a switch peer and a jumper peer; both are dropped.
    pub async fn disconnect_panel_port(
        pool: &Pool<Sqlite>,
        panel_kind: PanelKind,
        panel_id: i64,
        port_number: i64,
        actor: &str,
    ) -> Result<()> {
        let mut tx = pool.begin().await?;
        let panel = require_panel(&mut tx, panel_kind, panel_id).await?;
        if port_number < 1 || port_number > panel.total_ports {
            return Err(TopologyError::PortOutOfRange {
                port: port_number,
                max: panel.total_ports,
            }
            .into());
        }

        // Clear the switch side if this port mirrors one
        if let Some((switch_id, switch_port)) =
            panel_mirror_peer(&mut tx, panel_kind, panel_id, port_number).await?
        {
            sqlx::query(
                r#"
                UPDATE switch_ports SET bound_panel_kind = NULL, bound_panel_id = NULL,
                    bound_panel_port = NULL, updated_at = ?
                WHERE switch_id = ? AND port_no = ?
                    AND bound_panel_kind = ? AND bound_panel_id = ? AND bound_panel_port = ?
                "#,
            )
            .bind(Utc::now())
            .bind(switch_id)
            .bind(switch_port)
            .bind(panel_kind.as_str())
            .bind(panel_id)
            .bind(port_number)
            .execute(&mut *tx)
            .await?;

            HistoryRepo::record(
                &mut tx,
                actor,
                link_kind::SWITCH_TO_PANEL,
                (panel_kind.as_str(), panel_id, port_number),
                ("switch", switch_id, switch_port),
                history_action::DELETED,
                None,
                None,
            )
            .await?;
        }

        // Fiber jumpers: clear the counterpart only if it still points back
        if panel_kind == PanelKind::Fiber {
            let row = sqlx::query(
                "SELECT peer_panel_id, peer_panel_port FROM fiber_ports WHERE panel_id = ? AND port_number = ?",
            )
            .bind(panel_id)
            .bind(port_number)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = row {
                let peer_panel: Option<i64> = row.get("peer_panel_id");
                let peer_port: Option<i64> = row.get("peer_panel_port");
                if let (Some(peer_panel), Some(peer_port)) = (peer_panel, peer_port) {
                    // The counterpart may be a jump point; keep its switch peer
                    sqlx::query(
                        r#"
                        UPDATE fiber_ports SET
                            peer_panel_id = NULL, peer_panel_port = NULL,
                            status = CASE WHEN peer_switch_id IS NULL THEN 'inactive' ELSE 'active' END,
                            link_kind = CASE WHEN peer_switch_id IS NULL THEN NULL ELSE 'switch_to_panel' END,
                            updated_at = ?
                        WHERE panel_id = ? AND port_number = ?
                            AND peer_panel_id = ? AND peer_panel_port = ?
                        "#,
                    )
                    .bind(Utc::now())
                    .bind(peer_panel)
                    .bind(peer_port)
                    .bind(panel_id)
                    .bind(port_number)
                    .execute(&mut *tx)
                    .await?;

                    HistoryRepo::record(
                        &mut tx,
                        actor,
                        link_kind::PANEL_TO_PANEL,
                        ("fiber_panel", panel_id, port_number),
                        ("fiber_panel", peer_panel, peer_port),
                        history_action::DELETED,
                        None,
                        None,
                    )
                    .await?;
                }
            }
        }

        // Reset this port's own row
        match panel_kind {
            PanelKind::Patch => {
                sqlx::query(
                    r#"
                    UPDATE patch_ports SET status = 'inactive', link_kind = NULL,
                        peer_switch_id = NULL, peer_switch_port = NULL, updated_at = ?
                    WHERE panel_id = ? AND port_number = ?
                    "#,
                )
                .bind(Utc::now())
                .bind(panel_id)
                .bind(port_number)
                .execute(&mut *tx)
                .await?;
            }
            PanelKind::Fiber => {
                sqlx::query(
                    r#"
                    UPDATE fiber_ports SET status = 'inactive', link_kind = NULL,
                        peer_switch_id = NULL, peer_switch_port = NULL,
                        peer_panel_id = NULL, peer_panel_port = NULL, updated_at = ?
                    WHERE panel_id = ? AND port_number = ?
                    "#,
                )
                .bind(Utc::now())
                .bind(panel_id)
                .bind(port_number)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Full reset: disconnect the structural peer, then zero every device
    /// field, the note, and the hub overlay.
    pub async fn clear(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
        actor: &str,
    ) -> Result<SwitchPort> {
        let mut tx = pool.begin().await?;
        let switch = require_switch(&mut tx, switch_id).await?;
        let port = require_port(&mut tx, &switch, port_no).await?;

        if port.binding.is_some() {
            disconnect_structural_tx(&mut tx, &port, actor).await?;
        }

        sqlx::query(
            r#"
            UPDATE switch_ports SET kind = '', device = '', ip = '', mac = '', note = '',
                is_hub = 0, hub_name = '', hub_members = NULL, updated_at = ?
            WHERE switch_id = ? AND port_no = ?
            "#,
        )
        .bind(Utc::now())
        .bind(switch_id)
        .bind(port_no)
        .execute(&mut *tx)
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            link_kind::DIRECT,
            ("switch", switch_id, port_no),
            ("", 0, 0),
            history_action::DELETED,
            Some(port_values(&port)),
            None,
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, switch_id, port_no)
            .await?
            .context("Port not found after clear")
    }

    /// Clear every port of a switch, one atomic `clear` per port
    pub async fn reset_all(pool: &Pool<Sqlite>, switch_id: i64, actor: &str) -> Result<i64> {
        let switch = crate::db::switches::SwitchRepo::get(pool, switch_id)
            .await?
            .ok_or_else(|| NotFoundError::new("Switch", &switch_id.to_string()))?;
        for port_no in 1..=switch.ports {
            Self::clear(pool, switch_id, port_no, actor).await?;
        }
        Ok(switch.ports)
    }

    /// Flag a port as an unmanaged-hub uplink. The structural peer slot is
    /// vacated first; the fan-out list rides on the port row as JSON.
    pub async fn set_hub(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
        req: &SetHubRequest,
        actor: &str,
    ) -> Result<SwitchPort> {
        let mut tx = pool.begin().await?;
        let switch = require_switch(&mut tx, switch_id).await?;
        let port = require_port(&mut tx, &switch, port_no).await?;

        if port.binding.is_some() {
            disconnect_structural_tx(&mut tx, &port, actor).await?;
        }

        // Aggregate member fields into the port summary columns
        let mut ips: Vec<&str> = Vec::new();
        let mut macs: Vec<&str> = Vec::new();
        for m in &req.members {
            if !m.ip.is_empty() && !ips.contains(&m.ip.as_str()) {
                ips.push(&m.ip);
            }
            if !m.mac.is_empty() && !macs.contains(&m.mac.as_str()) {
                macs.push(&m.mac);
            }
        }
        let members_json = serde_json::to_string(&req.members)?;

        sqlx::query(
            r#"
            UPDATE switch_ports SET kind = 'hub', device = ?, ip = ?, mac = ?,
                is_hub = 1, hub_name = ?, hub_members = ?, updated_at = ?
            WHERE switch_id = ? AND port_no = ?
            "#,
        )
        .bind(&req.hub_name)
        .bind(ips.join(", "))
        .bind(macs.join(", "))
        .bind(&req.hub_name)
        .bind(members_json)
        .bind(Utc::now())
        .bind(switch_id)
        .bind(port_no)
        .execute(&mut *tx)
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            "hub",
            ("switch", switch_id, port_no),
            ("", 0, 0),
            history_action::UPDATED,
            Some(port_values(&port)),
            Some(serde_json::json!({
                "hub_name": req.hub_name,
                "members": req.members.len(),
            })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, switch_id, port_no)
            .await?
            .context("Port not found after hub update")
    }

    /// Drop the hub flag and discard the fan-out list
    pub async fn clear_hub(
        pool: &Pool<Sqlite>,
        switch_id: i64,
        port_no: i64,
        actor: &str,
    ) -> Result<SwitchPort> {
        let mut tx = pool.begin().await?;
        let switch = require_switch(&mut tx, switch_id).await?;
        let port = require_port(&mut tx, &switch, port_no).await?;

        sqlx::query(
            r#"
            UPDATE switch_ports SET is_hub = 0, hub_name = '', hub_members = NULL, updated_at = ?
            WHERE switch_id = ? AND port_no = ?
            "#,
        )
        .bind(Utc::now())
        .bind(switch_id)
        .bind(port_no)
        .execute(&mut *tx)
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            "hub",
            ("switch", switch_id, port_no),
            ("", 0, 0),
            history_action::DELETED,
            Some(port_values(&port)),
            None,
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, switch_id, port_no)
            .await?
            .context("Port not found after hub clear")
    }
}

/// Flat JSON snapshot of a port's device fields for history rows
fn port_values(port: &SwitchPort) -> serde_json::Value {
    serde_json::json!({
        "kind": port.kind,
        "device": port.device,
        "ip": port.ip,
        "mac": port.mac,
        "is_hub": port.is_hub,
    })
}

async fn require_switch(tx: &mut Transaction<'_, Sqlite>, switch_id: i64) -> Result<Switch> {
    fetch_switch(&mut *tx, switch_id)
        .await?
        .ok_or_else(|| NotFoundError::new("Switch", &switch_id.to_string()).into())
}

/// Fetch the materialized port row, creating an empty one if the switch
/// predates eager materialization. Rejects out-of-range port numbers.
async fn require_port(
    tx: &mut Transaction<'_, Sqlite>,
    switch: &Switch,
    port_no: i64,
) -> Result<SwitchPort> {
    if port_no < 1 || port_no > switch.ports {
        return Err(TopologyError::PortOutOfRange {
            port: port_no,
            max: switch.ports,
        }
        .into());
    }

    let row = sqlx::query(&format!(
        "{} WHERE sp.switch_id = ? AND sp.port_no = ?",
        SELECT_SWITCH_PORT
    ))
    .bind(switch.id)
    .bind(port_no)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(row) = row {
        return Ok(map_switch_port_row(&row));
    }

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO switch_ports (switch_id, port_no, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(switch.id)
    .bind(port_no)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query(&format!(
        "{} WHERE sp.switch_id = ? AND sp.port_no = ?",
        SELECT_SWITCH_PORT
    ))
    .bind(switch.id)
    .bind(port_no)
    .fetch_one(&mut **tx)
    .await?;
    Ok(map_switch_port_row(&row))
}

/// Panel metadata the graph needs: owning rack and port capacity
pub(crate) struct PanelRef {
    pub rack_id: i64,
    pub total_ports: i64,
}

pub(crate) async fn require_panel(
    tx: &mut Transaction<'_, Sqlite>,
    kind: PanelKind,
    panel_id: i64,
) -> Result<PanelRef> {
    let sql = match kind {
        PanelKind::Patch => "SELECT rack_id, total_ports AS total FROM patch_panels WHERE id = ?",
        PanelKind::Fiber => "SELECT rack_id, total_fibers AS total FROM fiber_panels WHERE id = ?",
    };
    let row = sqlx::query(sql)
        .bind(panel_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(TopologyError::PanelNotFound {
            panel_kind: kind.as_str(),
            panel_id,
        })?;
    Ok(PanelRef {
        rack_id: row.get("rack_id"),
        total_ports: row.get("total"),
    })
}

/// The switch port a panel port currently mirrors, if any
async fn panel_mirror_peer(
    tx: &mut Transaction<'_, Sqlite>,
    kind: PanelKind,
    panel_id: i64,
    panel_port: i64,
) -> Result<Option<(i64, i64)>> {
    let sql = match kind {
        PanelKind::Patch => {
            "SELECT peer_switch_id, peer_switch_port FROM patch_ports WHERE panel_id = ? AND port_number = ?"
        }
        PanelKind::Fiber => {
            "SELECT peer_switch_id, peer_switch_port FROM fiber_ports WHERE panel_id = ? AND port_number = ?"
        }
    };
    let row = sqlx::query(sql)
        .bind(panel_id)
        .bind(panel_port)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.and_then(|r| {
        let id: Option<i64> = r.get("peer_switch_id");
        let port: Option<i64> = r.get("peer_switch_port");
        id.zip(port)
    }))
}

/// Write the panel-side half of a switch binding. The row is upserted so a
/// panel resized down and back up still accepts bindings. A fiber port that
/// also carries a jumper peer becomes a jump point.
async fn write_panel_mirror(
    tx: &mut Transaction<'_, Sqlite>,
    kind: PanelKind,
    panel_id: i64,
    panel_port: i64,
    switch_id: i64,
    switch_port: i64,
    tag: &str,
) -> Result<()> {
    let now = Utc::now();
    let sql = match kind {
        PanelKind::Patch => {
            r#"
            INSERT INTO patch_ports (panel_id, port_number, status, link_kind, peer_switch_id,
                peer_switch_port, created_at, updated_at)
            VALUES (?, ?, 'active', ?, ?, ?, ?, ?)
            ON CONFLICT(panel_id, port_number) DO UPDATE SET
                status = 'active',
                link_kind = excluded.link_kind,
                peer_switch_id = excluded.peer_switch_id,
                peer_switch_port = excluded.peer_switch_port,
                updated_at = excluded.updated_at
            "#
        }
        PanelKind::Fiber => {
            r#"
            INSERT INTO fiber_ports (panel_id, port_number, status, link_kind, peer_switch_id,
                peer_switch_port, created_at, updated_at)
            VALUES (?, ?, 'active', ?, ?, ?, ?, ?)
            ON CONFLICT(panel_id, port_number) DO UPDATE SET
                status = 'active',
                link_kind = CASE WHEN peer_panel_id IS NULL
                    THEN excluded.link_kind ELSE 'jump_point' END,
                peer_switch_id = excluded.peer_switch_id,
                peer_switch_port = excluded.peer_switch_port,
                updated_at = excluded.updated_at
            "#
        }
    };
    sqlx::query(sql)
        .bind(panel_id)
        .bind(panel_port)
        .bind(tag)
        .bind(switch_id)
        .bind(switch_port)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Clear the switch-peer half of a panel port row. Jumper peers on fiber
/// ports are untouched; unplugging the switch cable leaves the jumper in.
pub(crate) async fn clear_panel_mirror(
    conn: &mut SqliteConnection,
    kind: PanelKind,
    panel_id: i64,
    panel_port: i64,
) -> Result<()> {
    let now = Utc::now();
    match kind {
        PanelKind::Patch => {
            sqlx::query(
                r#"
                UPDATE patch_ports SET status = 'inactive', link_kind = NULL,
                    peer_switch_id = NULL, peer_switch_port = NULL, updated_at = ?
                WHERE panel_id = ? AND port_number = ?
                "#,
            )
            .bind(now)
            .bind(panel_id)
            .bind(panel_port)
            .execute(conn)
            .await?;
        }
        PanelKind::Fiber => {
            // Keep 'active' and the jumper tag when a panel peer remains
            sqlx::query(
                r#"
                UPDATE fiber_ports SET
                    peer_switch_id = NULL, peer_switch_port = NULL,
                    status = CASE WHEN peer_panel_id IS NULL THEN 'inactive' ELSE 'active' END,
                    link_kind = CASE WHEN peer_panel_id IS NULL THEN NULL ELSE 'panel_to_panel' END,
                    updated_at = ?
                WHERE panel_id = ? AND port_number = ?
                "#,
            )
            .bind(now)
            .bind(panel_id)
            .bind(panel_port)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}

/// Tear down the structural peer of a bound switch port, both sides, on
/// the caller's transaction. Device fields are left alone.
async fn disconnect_structural_tx(
    tx: &mut Transaction<'_, Sqlite>,
    port: &SwitchPort,
    actor: &str,
) -> Result<()> {
    let binding = match port.binding {
        Some(b) => b,
        None => return Ok(()),
    };

    clear_panel_mirror(&mut *tx, binding.panel_kind, binding.panel_id, binding.panel_port).await?;

    sqlx::query(
        r#"
        UPDATE switch_ports SET bound_panel_kind = NULL, bound_panel_id = NULL,
            bound_panel_port = NULL, updated_at = ?
        WHERE switch_id = ? AND port_no = ?
        "#,
    )
    .bind(Utc::now())
    .bind(port.switch_id)
    .bind(port.port_no)
    .execute(&mut **tx)
    .await?;

    HistoryRepo::record(
        &mut *tx,
        actor,
        link_kind::SWITCH_TO_PANEL,
        ("switch", port.switch_id, port.port_no),
        (
            binding.panel_kind.as_str(),
            binding.panel_id,
            binding.panel_port,
        ),
        history_action::DELETED,
        Some(serde_json::json!({
            "panel_kind": binding.panel_kind.as_str(),
            "panel_id": binding.panel_id,
            "panel_port": binding.panel_port,
        })),
        None,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;
    use crate::db::tests::{fiber_panel_in, patch_panel_in, rack, switch_in};

    fn bind_req(panel_kind: PanelKind, panel_id: i64, panel_port: i64) -> BindToPanelRequest {
        BindToPanelRequest {
            panel_kind,
            panel_id,
            panel_port,
            kind: None,
            device: None,
            ip: None,
            mac: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_basic_bind_mirrors_both_sides() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        let port = store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Patch, p.id, 3), "test")
            .await
            .unwrap();

        let binding = port.binding.unwrap();
        assert_eq!(binding.panel_kind, PanelKind::Patch);
        assert_eq!(binding.panel_id, p.id);
        assert_eq!(binding.panel_port, 3);

        let mirror = store.get_patch_port(p.id, 3).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, Some(s.id));
        assert_eq!(mirror.peer_switch_port, Some(10));
        assert_eq!(mirror.status, "active");
        assert_eq!(mirror.link_kind.as_deref(), Some("switch_to_panel"));
    }

    #[tokio::test]
    async fn test_fiber_class_port_rejects_patch_panel() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        // Port 46 of 48 is within the last four: fiber class
        let err = store
            .bind_to_panel(s.id, 46, &bind_req(PanelKind::Patch, p.id, 1), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::PortClassMismatch { .. }) => {}
            other => panic!("expected PortClassMismatch, got {:?}", other),
        }

        // No rows changed on either side
        let port = store.get_switch_port(s.id, 46).await.unwrap().unwrap();
        assert!(port.binding.is_none());
        let mirror = store.get_patch_port(p.id, 1).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);
    }

    #[tokio::test]
    async fn test_ethernet_port_rejects_fiber_panel() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let f = fiber_panel_in(&store, "F", 12, r.id, Some(6)).await;

        let err = store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Fiber, f.id, 1), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::PortClassMismatch { .. }) => {}
            other => panic!("expected PortClassMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_panel_in_other_rack() {
        let store = test_store().await;
        let r1 = rack(&store, "R1", 42).await;
        let r2 = rack(&store, "R2", 42).await;
        let s = switch_in(&store, "s1", 48, r1.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r2.id, Some(5)).await;

        let err = store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Patch, p.id, 3), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::RackMismatch { .. }) => {}
            other => panic!("expected RackMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_is_idempotent() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        let req = bind_req(PanelKind::Patch, p.id, 3);
        let first = store.bind_to_panel(s.id, 10, &req, "test").await.unwrap();
        let second = store.bind_to_panel(s.id, 10, &req, "test").await.unwrap();
        assert_eq!(first.binding, second.binding);

        let mirror = store.get_patch_port(p.id, 3).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, Some(s.id));
        assert_eq!(mirror.peer_switch_port, Some(10));
    }

    #[tokio::test]
    async fn test_bind_rejects_taken_panel_port() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s1 = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let s2 = switch_in(&store, "s2", 48, r.id, Some(4)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_to_panel(s1.id, 10, &bind_req(PanelKind::Patch, p.id, 3), "test")
            .await
            .unwrap();
        let err = store
            .bind_to_panel(s2.id, 10, &bind_req(PanelKind::Patch, p.id, 3), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::AlreadyBoundElsewhere { .. }) => {}
            other => panic!("expected AlreadyBoundElsewhere, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rebind_moves_mirror() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Patch, p.id, 3), "test")
            .await
            .unwrap();
        store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Patch, p.id, 4), "test")
            .await
            .unwrap();

        // Old mirror released, new one set: peer(peer(x)) == x
        let old = store.get_patch_port(p.id, 3).await.unwrap().unwrap();
        assert_eq!(old.peer_switch_id, None);
        let new = store.get_patch_port(p.id, 4).await.unwrap().unwrap();
        assert_eq!(new.peer_switch_id, Some(s.id));
        assert_eq!(new.peer_switch_port, Some(10));
    }

    #[tokio::test]
    async fn test_bind_preserves_note_unless_supplied() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .set_direct(
                s.id,
                10,
                &SetPortRequest {
                    kind: Some("server".into()),
                    device: Some("web01".into()),
                    ip: Some("10.0.0.5".into()),
                    mac: None,
                    note: Some("run 14, labeled blue".into()),
                },
                "test",
            )
            .await
            .unwrap();

        let port = store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Patch, p.id, 3), "test")
            .await
            .unwrap();
        assert_eq!(port.note.as_deref(), Some("run 14, labeled blue"));
        assert_eq!(port.device.as_deref(), Some("web01"));

        // Supplying a new note replaces it
        let mut req = bind_req(PanelKind::Patch, p.id, 3);
        req.note = Some("relabeled".into());
        let port = store.bind_to_panel(s.id, 10, &req, "test").await.unwrap();
        assert_eq!(port.note.as_deref(), Some("relabeled"));
    }

    #[tokio::test]
    async fn test_disconnect_then_rebind() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_to_panel(s.id, 1, &bind_req(PanelKind::Patch, p.id, 1), "test")
            .await
            .unwrap();
        let port = store.disconnect_structural(s.id, 1, "test").await.unwrap();
        assert!(port.binding.is_none());
        let mirror = store.get_patch_port(p.id, 1).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);

        let port = store
            .bind_to_panel(s.id, 1, &bind_req(PanelKind::Patch, p.id, 2), "test")
            .await
            .unwrap();
        assert_eq!(port.binding.unwrap().panel_port, 2);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_device_fields() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        let mut req = bind_req(PanelKind::Patch, p.id, 1);
        req.device = Some("cam-07".into());
        req.ip = Some("10.1.2.3".into());
        store.bind_to_panel(s.id, 1, &req, "test").await.unwrap();

        let port = store.disconnect_structural(s.id, 1, "test").await.unwrap();
        assert_eq!(port.device.as_deref(), Some("cam-07"));
        assert_eq!(port.ip.as_deref(), Some("10.1.2.3"));
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        let mut req = bind_req(PanelKind::Patch, p.id, 1);
        req.device = Some("cam-07".into());
        req.note = Some("spare".into());
        store.bind_to_panel(s.id, 1, &req, "test").await.unwrap();

        let port = store.clear_port(s.id, 1, "test").await.unwrap();
        assert!(port.binding.is_none());
        assert!(port.device.is_none());
        assert!(port.note.is_none());
        let mirror = store.get_patch_port(p.id, 1).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);
    }

    #[tokio::test]
    async fn test_set_direct_clears_structural_peer() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_to_panel(s.id, 2, &bind_req(PanelKind::Patch, p.id, 2), "test")
            .await
            .unwrap();
        let port = store
            .set_direct(
                s.id,
                2,
                &SetPortRequest {
                    kind: Some("printer".into()),
                    device: Some("prn-3f".into()),
                    ip: None,
                    mac: None,
                    note: None,
                },
                "test",
            )
            .await
            .unwrap();

        assert!(port.binding.is_none());
        assert_eq!(port.device.as_deref(), Some("prn-3f"));
        let mirror = store.get_patch_port(p.id, 2).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);
    }

    #[tokio::test]
    async fn test_port_out_of_range() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 24, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        let err = store
            .bind_to_panel(s.id, 25, &bind_req(PanelKind::Patch, p.id, 1), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::PortOutOfRange { port: 25, .. }) => {}
            other => panic!("expected PortOutOfRange, got {:?}", other),
        }

        let err = store
            .bind_to_panel(s.id, 10, &bind_req(PanelKind::Patch, p.id, 30), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::PortOutOfRange { port: 30, .. }) => {}
            other => panic!("expected PortOutOfRange, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panel_not_found() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 24, r.id, Some(3)).await;

        let err = store
            .bind_to_panel(s.id, 1, &bind_req(PanelKind::Patch, 999, 1), "test")
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::PanelNotFound { panel_id: 999, .. }) => {}
            other => panic!("expected PanelNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hub_flag_vacates_structural_peer() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_to_panel(s.id, 7, &bind_req(PanelKind::Patch, p.id, 7), "test")
            .await
            .unwrap();

        let port = store
            .set_hub(
                s.id,
                7,
                &SetHubRequest {
                    hub_name: "floor3-hub".into(),
                    members: vec![
                        HubMember {
                            device: "pc-301".into(),
                            ip: "10.3.0.1".into(),
                            mac: "aa:bb:cc:00:00:01".into(),
                            category: "workstation".into(),
                        },
                        HubMember {
                            device: "pc-302".into(),
                            ip: "10.3.0.2".into(),
                            mac: "aa:bb:cc:00:00:02".into(),
                            category: "workstation".into(),
                        },
                    ],
                },
                "test",
            )
            .await
            .unwrap();

        assert!(port.is_hub);
        assert!(port.binding.is_none());
        assert_eq!(port.hub_members.len(), 2);
        let mirror = store.get_patch_port(p.id, 7).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);

        // Clearing the flag discards the fan-out list
        let port = store.clear_hub(s.id, 7, "test").await.unwrap();
        assert!(!port.is_hub);
        assert!(port.hub_members.is_empty());
    }

    #[tokio::test]
    async fn test_reset_all_clears_every_port() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 8, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 8, r.id, Some(5)).await;

        store
            .bind_to_panel(s.id, 2, &bind_req(PanelKind::Patch, p.id, 2), "test")
            .await
            .unwrap();
        store
            .set_direct(
                s.id,
                5,
                &SetPortRequest {
                    kind: Some("server".into()),
                    device: Some("db01".into()),
                    ip: None,
                    mac: None,
                    note: None,
                },
                "test",
            )
            .await
            .unwrap();

        let count = store.reset_all_ports(s.id, "test").await.unwrap();
        assert_eq!(count, 8);

        let ports = store.list_switch_ports(s.id).await.unwrap();
        assert!(ports.iter().all(|p| p.device.is_none() && p.binding.is_none()));
        let mirror = store.get_patch_port(p.id, 2).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);
    }

    #[tokio::test]
    async fn test_bind_panel_port_from_panel_side() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_panel_port(
                PanelKind::Patch,
                p.id,
                6,
                &BindPanelPortRequest {
                    switch_id: s.id,
                    switch_port: 12,
                },
                "test",
            )
            .await
            .unwrap();

        let port = store.get_switch_port(s.id, 12).await.unwrap().unwrap();
        let binding = port.binding.unwrap();
        assert_eq!(binding.panel_id, p.id);
        assert_eq!(binding.panel_port, 6);
        let mirror = store.get_patch_port(p.id, 6).await.unwrap().unwrap();
        assert_eq!(mirror.link_kind.as_deref(), Some("panel_to_switch"));
        assert_eq!(mirror.peer_switch_port, Some(12));

        // A switch port already bound elsewhere is refused from the panel side
        let err = store
            .bind_panel_port(
                PanelKind::Patch,
                p.id,
                7,
                &BindPanelPortRequest {
                    switch_id: s.id,
                    switch_port: 12,
                },
                "test",
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::AlreadyBoundElsewhere { .. }) => {}
            other => panic!("expected AlreadyBoundElsewhere, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_panel_port_clears_switch_side() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(3)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(5)).await;

        store
            .bind_to_panel(s.id, 9, &bind_req(PanelKind::Patch, p.id, 9), "test")
            .await
            .unwrap();
        store
            .disconnect_panel_port(PanelKind::Patch, p.id, 9, "test")
            .await
            .unwrap();

        let port = store.get_switch_port(s.id, 9).await.unwrap().unwrap();
        assert!(port.binding.is_none());
        let mirror = store.get_patch_port(p.id, 9).await.unwrap().unwrap();
        assert_eq!(mirror.peer_switch_id, None);
        assert_eq!(mirror.status, "inactive");
    }
}
