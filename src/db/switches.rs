use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection, Transaction};

use crate::models::*;

use super::history::HistoryRepo;
use super::ports;
use super::racks::{assert_slot_exclusive, ensure_slot_free};
use super::row_helpers::map_switch_row;
use super::NotFoundError;

const SELECT_SWITCH: &str = r#"
    SELECT id, name, vendor, model, ports, status, ip, rack_id, position_in_rack,
           created_at, updated_at
    FROM switches
"#;

/// Switch database operations
pub struct SwitchRepo;

impl SwitchRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Switch>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_SWITCH))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_switch_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Switch>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SWITCH))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_switch_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Switch>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_SWITCH))
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_switch_row))
    }

    pub async fn create(
        pool: &Pool<Sqlite>,
        req: &CreateSwitchRequest,
        actor: &str,
    ) -> Result<Switch> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        if let Some(rack_id) = req.rack_id {
            if let Some(position) = req.position_in_rack {
                ensure_slot_free(&mut tx, rack_id, position, None).await?;
            } else {
                // Rack must exist even when no slot is claimed
                sqlx::query("SELECT id FROM racks WHERE id = ?")
                    .bind(rack_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| NotFoundError::new("Rack", &rack_id.to_string()))?;
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO switches (name, vendor, model, ports, status, ip, rack_id, position_in_rack,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.vendor.clone().unwrap_or_default())
        .bind(req.model.clone().unwrap_or_default())
        .bind(req.ports)
        .bind(req.status.as_deref().unwrap_or(switch_status::OFFLINE))
        .bind(req.ip.clone().unwrap_or_default())
        .bind(req.rack_id)
        .bind(req.position_in_rack)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        insert_port_rows(&mut tx, id, 1, req.ports).await?;

        if let Some(rack_id) = req.rack_id {
            assert_slot_exclusive(&mut tx, rack_id).await?;
        }

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("switch", id, 0),
            ("", 0, 0),
            history_action::CREATED,
            None,
            Some(serde_json::json!({ "name": req.name, "ports": req.ports })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Switch not found after creation")
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        req: &UpdateSwitchRequest,
        actor: &str,
    ) -> Result<Switch> {
        let existing = Self::get(pool, id)
            .await?
            .ok_or_else(|| NotFoundError::new("Switch", &id.to_string()))?;

        let now = Utc::now();
        let mut tx = pool.begin().await?;

        if let Some(rack_id) = req.rack_id {
            if let Some(position) = req.position_in_rack {
                ensure_slot_free(&mut tx, rack_id, position, Some((EquipmentKind::Switch, id)))
                    .await?;
            } else {
                sqlx::query("SELECT id FROM racks WHERE id = ?")
                    .bind(rack_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| NotFoundError::new("Rack", &rack_id.to_string()))?;
            }
        }

        sqlx::query(
            r#"
            UPDATE switches SET name = ?, vendor = ?, model = ?, ports = ?, status = ?, ip = ?,
                                rack_id = ?, position_in_rack = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.name)
        .bind(req.vendor.clone().unwrap_or_default())
        .bind(req.model.clone().unwrap_or_default())
        .bind(req.ports)
        .bind(req.status.as_deref().unwrap_or(&existing.status))
        .bind(req.ip.clone().unwrap_or_default())
        .bind(req.rack_id)
        .bind(req.position_in_rack)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        resize_port_rows(&mut tx, id, existing.ports, req.ports, actor).await?;

        if let Some(rack_id) = req.rack_id {
            assert_slot_exclusive(&mut tx, rack_id).await?;
        }

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("switch", id, 0),
            ("", 0, 0),
            history_action::UPDATED,
            Some(serde_json::json!({ "name": existing.name, "ports": existing.ports })),
            Some(serde_json::json!({ "name": req.name, "ports": req.ports })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Switch not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64, actor: &str) -> Result<()> {
        let mut tx = pool.begin().await?;
        Self::delete_tx(&mut tx, id, actor).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a switch on the caller's transaction, tearing down every
    /// connection it participates in first so no mirror is left dangling.
    pub(crate) async fn delete_tx(
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
        actor: &str,
    ) -> Result<()> {
        let switch = fetch_switch(&mut *tx, id)
            .await?
            .ok_or_else(|| NotFoundError::new("Switch", &id.to_string()))?;

        // Drop panel mirrors of every bound port
        let bound: Vec<(i64, String, i64, i64)> = sqlx::query(
            r#"
            SELECT port_no, bound_panel_kind, bound_panel_id, bound_panel_port
            FROM switch_ports
            WHERE switch_id = ? AND bound_panel_id IS NOT NULL
            "#,
        )
        .bind(id)
        .fetch_all(&mut **tx)
        .await?
        .iter()
        .map(|r| {
            (
                r.get("port_no"),
                r.get("bound_panel_kind"),
                r.get("bound_panel_id"),
                r.get("bound_panel_port"),
            )
        })
        .collect();

        for (port_no, kind, panel_id, panel_port) in bound {
            if let Some(kind) = PanelKind::parse(&kind) {
                ports::clear_panel_mirror(&mut *tx, kind, panel_id, panel_port).await?;
                HistoryRepo::record(
                    &mut *tx,
                    actor,
                    link_kind::SWITCH_TO_PANEL,
                    ("switch", id, port_no),
                    (kind.as_str(), panel_id, panel_port),
                    history_action::DELETED,
                    Some(serde_json::json!({ "reason": "switch deleted" })),
                    None,
                )
                .await?;
            }
        }

        // Defensive sweep: any panel row still claiming this switch
        sqlx::query(
            r#"
            UPDATE patch_ports SET status = 'inactive', link_kind = NULL,
                peer_switch_id = NULL, peer_switch_port = NULL, updated_at = ?
            WHERE peer_switch_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            r#"
            UPDATE fiber_ports SET status = 'inactive', link_kind = NULL,
                peer_switch_id = NULL, peer_switch_port = NULL, updated_at = ?
            WHERE peer_switch_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM switch_ports WHERE switch_id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM switches WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        HistoryRepo::record(
            &mut *tx,
            actor,
            "equipment",
            ("switch", id, 0),
            ("", 0, 0),
            history_action::DELETED,
            Some(serde_json::json!({ "name": switch.name })),
            None,
        )
        .await?;
        Ok(())
    }
}

/// Fetch a switch on an open connection/transaction
pub(crate) async fn fetch_switch(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Switch>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SWITCH))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.as_ref().map(map_switch_row))
}

/// Materialize empty port rows `from..=to` for a switch
async fn insert_port_rows(
    tx: &mut Transaction<'_, Sqlite>,
    switch_id: i64,
    from: i64,
    to: i64,
) -> Result<()> {
    let now = Utc::now();
    for port_no in from..=to {
        sqlx::query(
            r#"
            INSERT INTO switch_ports (switch_id, port_no, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(switch_id)
        .bind(port_no)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Grow or trim the materialized port rows after a port-count change.
/// Surviving rows keep their data; trimmed rows that carry a structural
/// peer are disconnected first so the panel side never dangles.
async fn resize_port_rows(
    tx: &mut Transaction<'_, Sqlite>,
    switch_id: i64,
    old_total: i64,
    new_total: i64,
    actor: &str,
) -> Result<()> {
    if new_total > old_total {
        insert_port_rows(tx, switch_id, old_total + 1, new_total).await?;
    } else if new_total < old_total {
        let trimmed: Vec<(i64, String, i64, i64)> = sqlx::query(
            r#"
            SELECT port_no, bound_panel_kind, bound_panel_id, bound_panel_port
            FROM switch_ports
            WHERE switch_id = ? AND port_no > ? AND bound_panel_id IS NOT NULL
            "#,
        )
        .bind(switch_id)
        .bind(new_total)
        .fetch_all(&mut **tx)
        .await?
        .iter()
        .map(|r| {
            (
                r.get("port_no"),
                r.get("bound_panel_kind"),
                r.get("bound_panel_id"),
                r.get("bound_panel_port"),
            )
        })
        .collect();

        for (port_no, kind, panel_id, panel_port) in trimmed {
            if let Some(kind) = PanelKind::parse(&kind) {
                ports::clear_panel_mirror(&mut *tx, kind, panel_id, panel_port).await?;
                HistoryRepo::record(
                    &mut *tx,
                    actor,
                    link_kind::SWITCH_TO_PANEL,
                    ("switch", switch_id, port_no),
                    (kind.as_str(), panel_id, panel_port),
                    history_action::DELETED,
                    Some(serde_json::json!({ "reason": "port trimmed" })),
                    None,
                )
                .await?;
            }
        }

        sqlx::query("DELETE FROM switch_ports WHERE switch_id = ? AND port_no > ?")
            .bind(switch_id)
            .bind(new_total)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::error::TopologyError;
    use crate::db::test_store;
    use crate::db::tests::{patch_panel_in, rack, switch_in};

    #[tokio::test]
    async fn test_slot_conflict_rejected() {
        let store = test_store().await;
        let r = rack(&store, "R1", 10).await;
        switch_in(&store, "s1", 24, r.id, Some(4)).await;

        let err = store
            .create_switch(
                &CreateSwitchRequest {
                    name: "s2".into(),
                    vendor: None,
                    model: None,
                    ports: 24,
                    status: None,
                    ip: None,
                    rack_id: Some(r.id),
                    position_in_rack: Some(4),
                },
                "test",
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::SlotOverflow { .. }) => {}
            other => panic!("expected SlotOverflow, got {:?}", other),
        }

        // s1 is unaffected and still holds the slot
        let s1 = store.get_switch_by_name("s1").await.unwrap().unwrap();
        assert_eq!(s1.position_in_rack, Some(4));
    }

    #[tokio::test]
    async fn test_create_materializes_port_rows() {
        let store = test_store().await;
        let r = rack(&store, "R1", 10).await;
        let s = switch_in(&store, "s1", 8, r.id, Some(1)).await;

        let ports = store.list_switch_ports(s.id).await.unwrap();
        assert_eq!(ports.len(), 8);
        assert!(ports.iter().all(|p| p.device.is_none() && p.binding.is_none()));
    }

    #[tokio::test]
    async fn test_delete_tears_down_mirrors() {
        let store = test_store().await;
        let r = rack(&store, "R1", 10).await;
        let s = switch_in(&store, "s1", 24, r.id, Some(1)).await;
        let p = patch_panel_in(&store, "A", 12, r.id, Some(2)).await;

        store
            .bind_to_panel(
                s.id,
                3,
                &BindToPanelRequest {
                    panel_kind: PanelKind::Patch,
                    panel_id: p.id,
                    panel_port: 5,
                    kind: None,
                    device: None,
                    ip: None,
                    mac: None,
                    note: None,
                },
                "test",
            )
            .await
            .unwrap();

        store.delete_switch(s.id, "test").await.unwrap();

        let pp = store.get_patch_port(p.id, 5).await.unwrap().unwrap();
        assert_eq!(pp.peer_switch_id, None);
        assert_eq!(pp.status, "inactive");
    }

    #[tokio::test]
    async fn test_shrink_port_count_disconnects_trimmed_ports() {
        let store = test_store().await;
        let r = rack(&store, "R1", 10).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(1)).await;
        let f = store
            .create_fiber_panel(
                &CreateFiberPanelRequest {
                    rack_id: r.id,
                    panel_letter: "F".into(),
                    total_fibers: 12,
                    description: None,
                    position_in_rack: Some(2),
                },
                "test",
            )
            .await
            .unwrap();

        // Port 46 is fiber class on a 48-port switch
        store
            .bind_to_panel(
                s.id,
                46,
                &BindToPanelRequest {
                    panel_kind: PanelKind::Fiber,
                    panel_id: f.id,
                    panel_port: 1,
                    kind: None,
                    device: None,
                    ip: None,
                    mac: None,
                    note: None,
                },
                "test",
            )
            .await
            .unwrap();

        store
            .update_switch(
                s.id,
                &UpdateSwitchRequest {
                    name: "s1".into(),
                    vendor: None,
                    model: None,
                    ports: 24,
                    status: None,
                    ip: None,
                    rack_id: Some(r.id),
                    position_in_rack: Some(1),
                },
                "test",
            )
            .await
            .unwrap();

        let ports = store.list_switch_ports(s.id).await.unwrap();
        assert_eq!(ports.len(), 24);
        let fp = store.get_fiber_port(f.id, 1).await.unwrap().unwrap();
        assert_eq!(fp.peer_switch_id, None);
    }
}
