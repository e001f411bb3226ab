use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, Transaction};

use crate::models::*;

use super::history::HistoryRepo;
use super::racks::{assert_slot_exclusive, ensure_slot_free};
use super::row_helpers::{map_patch_panel_row, map_patch_port_row};
use super::NotFoundError;

const SELECT_PANEL: &str = r#"
    SELECT id, rack_id, panel_letter, total_ports, description, position_in_rack,
           created_at, updated_at
    FROM patch_panels
"#;

const SELECT_PORT: &str = r#"
    SELECT id, panel_id, port_number, status, link_kind, peer_switch_id, peer_switch_port,
           created_at, updated_at
    FROM patch_ports
"#;

/// Patch panel database operations
pub struct PatchPanelRepo;

impl PatchPanelRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<PatchPanel>> {
        let rows = sqlx::query(&format!("{} ORDER BY rack_id, panel_letter", SELECT_PANEL))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_patch_panel_row).collect())
    }

    pub async fn list_for_rack(pool: &Pool<Sqlite>, rack_id: i64) -> Result<Vec<PatchPanel>> {
        let rows = sqlx::query(&format!(
            "{} WHERE rack_id = ? ORDER BY panel_letter",
            SELECT_PANEL
        ))
        .bind(rack_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_patch_panel_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<PatchPanel>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PANEL))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_patch_panel_row))
    }

    pub async fn get_by_letter(
        pool: &Pool<Sqlite>,
        rack_id: i64,
        letter: &str,
    ) -> Result<Option<PatchPanel>> {
        let row = sqlx::query(&format!(
            "{} WHERE rack_id = ? AND panel_letter = ?",
            SELECT_PANEL
        ))
        .bind(rack_id)
        .bind(letter)
        .fetch_optional(pool)
        .await?;
        Ok(row.as_ref().map(map_patch_panel_row))
    }

    pub async fn create(
        pool: &Pool<Sqlite>,
        req: &CreatePatchPanelRequest,
        actor: &str,
    ) -> Result<PatchPanel> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        if let Some(position) = req.position_in_rack {
            ensure_slot_free(&mut tx, req.rack_id, position, None).await?;
        } else {
            sqlx::query("SELECT id FROM racks WHERE id = ?")
                .bind(req.rack_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| NotFoundError::new("Rack", &req.rack_id.to_string()))?;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO patch_panels (rack_id, panel_letter, total_ports, description,
                                      position_in_rack, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.rack_id)
        .bind(&req.panel_letter)
        .bind(req.total_ports)
        .bind(req.description.clone().unwrap_or_default())
        .bind(req.position_in_rack)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        insert_port_rows(&mut tx, id, 1, req.total_ports).await?;
        assert_slot_exclusive(&mut tx, req.rack_id).await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("patch_panel", id, 0),
            ("", 0, 0),
            history_action::CREATED,
            None,
            Some(serde_json::json!({
                "rack_id": req.rack_id,
                "panel_letter": req.panel_letter,
                "total_ports": req.total_ports,
            })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Patch panel not found after creation")
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        req: &UpdatePatchPanelRequest,
        actor: &str,
    ) -> Result<PatchPanel> {
        let existing = Self::get(pool, id)
            .await?
            .ok_or_else(|| NotFoundError::new("Patch panel", &id.to_string()))?;

        let now = Utc::now();
        let mut tx = pool.begin().await?;

        if let Some(position) = req.position_in_rack {
            ensure_slot_free(
                &mut tx,
                existing.rack_id,
                position,
                Some((EquipmentKind::PatchPanel, id)),
            )
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE patch_panels SET panel_letter = ?, total_ports = ?, description = ?,
                                    position_in_rack = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.panel_letter)
        .bind(req.total_ports)
        .bind(req.description.clone().unwrap_or_default())
        .bind(req.position_in_rack)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        resize_port_rows(&mut tx, id, existing.total_ports, req.total_ports, actor).await?;
        assert_slot_exclusive(&mut tx, existing.rack_id).await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("patch_panel", id, 0),
            ("", 0, 0),
            history_action::UPDATED,
            Some(serde_json::json!({
                "panel_letter": existing.panel_letter,
                "total_ports": existing.total_ports,
            })),
            Some(serde_json::json!({
                "panel_letter": req.panel_letter,
                "total_ports": req.total_ports,
            })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Patch panel not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64, actor: &str) -> Result<()> {
        let mut tx = pool.begin().await?;
        Self::delete_tx(&mut tx, id, actor).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a patch panel on the caller's transaction, clearing the
    /// switch-side reference of every bound port first.
    pub(crate) async fn delete_tx(
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
        actor: &str,
    ) -> Result<()> {
        let panel = sqlx::query(&format!("{} WHERE id = ?", SELECT_PANEL))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .as_ref()
            .map(map_patch_panel_row)
            .ok_or_else(|| NotFoundError::new("Patch panel", &id.to_string()))?;

        let bound: Vec<(i64, i64, i64)> = sqlx::query(
            r#"
            SELECT port_number, peer_switch_id, peer_switch_port
            FROM patch_ports
            WHERE panel_id = ? AND peer_switch_id IS NOT NULL
            "#,
        )
        .bind(id)
        .fetch_all(&mut **tx)
        .await?
        .iter()
        .map(|r| {
            (
                r.get("port_number"),
                r.get("peer_switch_id"),
                r.get("peer_switch_port"),
            )
        })
        .collect();

        for (port_number, switch_id, switch_port) in bound {
            sqlx::query(
                r#"
                UPDATE switch_ports SET bound_panel_kind = NULL, bound_panel_id = NULL,
                    bound_panel_port = NULL, updated_at = ?
                WHERE switch_id = ? AND port_no = ?
                "#,
            )
            .bind(Utc::now())
            .bind(switch_id)
            .bind(switch_port)
            .execute(&mut **tx)
            .await?;

            HistoryRepo::record(
                &mut *tx,
                actor,
                link_kind::SWITCH_TO_PANEL,
                ("patch_panel", id, port_number),
                ("switch", switch_id, switch_port),
                history_action::DELETED,
                Some(serde_json::json!({ "reason": "panel deleted" })),
                None,
            )
            .await?;
        }

        sqlx::query("DELETE FROM patch_ports WHERE panel_id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM patch_panels WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        HistoryRepo::record(
            &mut *tx,
            actor,
            "equipment",
            ("patch_panel", id, 0),
            ("", 0, 0),
            history_action::DELETED,
            Some(serde_json::json!({
                "rack_id": panel.rack_id,
                "panel_letter": panel.panel_letter,
            })),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn list_ports(pool: &Pool<Sqlite>, panel_id: i64) -> Result<Vec<PatchPort>> {
        let rows = sqlx::query(&format!(
            "{} WHERE panel_id = ? ORDER BY port_number",
            SELECT_PORT
        ))
        .bind(panel_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_patch_port_row).collect())
    }

    pub async fn get_port(
        pool: &Pool<Sqlite>,
        panel_id: i64,
        port_number: i64,
    ) -> Result<Option<PatchPort>> {
        let row = sqlx::query(&format!(
            "{} WHERE panel_id = ? AND port_number = ?",
            SELECT_PORT
        ))
        .bind(panel_id)
        .bind(port_number)
        .fetch_optional(pool)
        .await?;
        Ok(row.as_ref().map(map_patch_port_row))
    }
}

async fn insert_port_rows(
    tx: &mut Transaction<'_, Sqlite>,
    panel_id: i64,
    from: i64,
    to: i64,
) -> Result<()> {
    let now = Utc::now();
    for port_number in from..=to {
        sqlx::query(
            r#"
            INSERT INTO patch_ports (panel_id, port_number, status, created_at, updated_at)
            VALUES (?, ?, 'inactive', ?, ?)
            "#,
        )
        .bind(panel_id)
        .bind(port_number)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn resize_port_rows(
    tx: &mut Transaction<'_, Sqlite>,
    panel_id: i64,
    old_total: i64,
    new_total: i64,
    actor: &str,
) -> Result<()> {
    if new_total > old_total {
        insert_port_rows(tx, panel_id, old_total + 1, new_total).await?;
    } else if new_total < old_total {
        let trimmed: Vec<(i64, i64, i64)> = sqlx::query(
            r#"
            SELECT port_number, peer_switch_id, peer_switch_port
            FROM patch_ports
            WHERE panel_id = ? AND port_number > ? AND peer_switch_id IS NOT NULL
            "#,
        )
        .bind(panel_id)
        .bind(new_total)
        .fetch_all(&mut **tx)
        .await?
        .iter()
        .map(|r| {
            (
                r.get("port_number"),
                r.get("peer_switch_id"),
                r.get("peer_switch_port"),
            )
        })
        .collect();

        for (port_number, switch_id, switch_port) in trimmed {
            sqlx::query(
                r#"
                UPDATE switch_ports SET bound_panel_kind = NULL, bound_panel_id = NULL,
                    bound_panel_port = NULL, updated_at = ?
                WHERE switch_id = ? AND port_no = ?
                "#,
            )
            .bind(Utc::now())
            .bind(switch_id)
            .bind(switch_port)
            .execute(&mut **tx)
            .await?;

            HistoryRepo::record(
                &mut *tx,
                actor,
                link_kind::SWITCH_TO_PANEL,
                ("patch_panel", panel_id, port_number),
                ("switch", switch_id, switch_port),
                history_action::DELETED,
                Some(serde_json::json!({ "reason": "port trimmed" })),
                None,
            )
            .await?;
        }

        sqlx::query("DELETE FROM patch_ports WHERE panel_id = ? AND port_number > ?")
            .bind(panel_id)
            .bind(new_total)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
