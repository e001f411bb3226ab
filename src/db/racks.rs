use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

use crate::models::*;

use super::error::TopologyError;
use super::row_helpers::map_rack_row;
use super::{fiber_panels::FiberPanelRepo, patch_panels::PatchPanelRepo, switches::SwitchRepo};
use super::{history::HistoryRepo, NotFoundError};

const SELECT_RACK: &str = r#"
    SELECT id, name, location, description, slots, created_at, updated_at
    FROM racks
"#;

/// Rack database operations: the slot allocation primitive
pub struct RackRepo;

impl RackRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Rack>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_RACK))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_rack_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Rack>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_RACK))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_rack_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Rack>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_RACK))
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_rack_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateRackRequest, actor: &str) -> Result<Rack> {
        let now = Utc::now();
        let slots = req.slots.unwrap_or(DEFAULT_RACK_SLOTS);
        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO racks (name, location, description, slots, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.location.clone().unwrap_or_default())
        .bind(req.description.clone().unwrap_or_default())
        .bind(slots)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("rack", id, 0),
            ("", 0, 0),
            history_action::CREATED,
            None,
            Some(serde_json::json!({ "name": req.name, "slots": slots })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Rack not found after creation")
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        req: &UpdateRackRequest,
        actor: &str,
    ) -> Result<Rack> {
        let existing = Self::get(pool, id)
            .await?
            .ok_or_else(|| NotFoundError::new("Rack", &id.to_string()))?;
        let slots = req.slots.unwrap_or(existing.slots);

        let mut tx = pool.begin().await?;

        // Shrinking below the highest occupied position would strand
        // equipment; refuse rather than evict.
        let max_used = max_used_position(&mut tx, id).await?;
        if slots < max_used {
            return Err(TopologyError::SlotOverflow {
                rack_id: id,
                detail: format!(
                    "capacity {} is below the highest occupied slot {}",
                    slots, max_used
                ),
            }
            .into());
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE racks SET name = ?, location = ?, description = ?, slots = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&req.name)
        .bind(req.location.clone().unwrap_or_default())
        .bind(req.description.clone().unwrap_or_default())
        .bind(slots)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("rack", id, 0),
            ("", 0, 0),
            history_action::UPDATED,
            Some(serde_json::json!({ "name": existing.name, "slots": existing.slots })),
            Some(serde_json::json!({ "name": req.name, "slots": slots })),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, id).await?.context("Rack not found after update")
    }

    /// Delete a rack and everything mounted in it. The cascade goes through
    /// the equipment deletes so every connection is torn down mirror-safe.
    pub async fn delete(pool: &Pool<Sqlite>, id: i64, actor: &str) -> Result<()> {
        let rack = Self::get(pool, id)
            .await?
            .ok_or_else(|| NotFoundError::new("Rack", &id.to_string()))?;

        let mut tx = pool.begin().await?;

        let switch_ids: Vec<i64> = sqlx::query("SELECT id FROM switches WHERE rack_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();
        for sid in switch_ids {
            SwitchRepo::delete_tx(&mut tx, sid, actor).await?;
        }

        let patch_ids: Vec<i64> = sqlx::query("SELECT id FROM patch_panels WHERE rack_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();
        for pid in patch_ids {
            PatchPanelRepo::delete_tx(&mut tx, pid, actor).await?;
        }

        let fiber_ids: Vec<i64> = sqlx::query("SELECT id FROM fiber_panels WHERE rack_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();
        for fid in fiber_ids {
            FiberPanelRepo::delete_tx(&mut tx, fid, actor).await?;
        }

        sqlx::query("DELETE FROM racks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            "equipment",
            ("rack", id, 0),
            ("", 0, 0),
            history_action::DELETED,
            Some(serde_json::json!({ "name": rack.name })),
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Slot positions not held by any switch or panel in the rack. The
    /// entity being edited may be excluded so moving it in place doesn't
    /// collide with itself.
    pub async fn free_slots(
        pool: &Pool<Sqlite>,
        rack_id: i64,
        exclude: Option<(EquipmentKind, i64)>,
    ) -> Result<FreeSlots> {
        let rack = Self::get(pool, rack_id)
            .await?
            .ok_or_else(|| NotFoundError::new("Rack", &rack_id.to_string()))?;

        let mut conn = pool.acquire().await?;
        let used = used_positions(&mut conn, rack_id, exclude).await?;
        let free = (1..=rack.slots).filter(|p| !used.contains(p)).collect();

        Ok(FreeSlots {
            rack_id,
            slots: rack.slots,
            free,
        })
    }
}

const USED_POSITIONS_SQL: &str = r#"
    SELECT position_in_rack AS pos, 'switch' AS kind, id FROM switches
        WHERE rack_id = ? AND position_in_rack IS NOT NULL
    UNION ALL
    SELECT position_in_rack, 'patch_panel', id FROM patch_panels
        WHERE rack_id = ? AND position_in_rack IS NOT NULL
    UNION ALL
    SELECT position_in_rack, 'fiber_panel', id FROM fiber_panels
        WHERE rack_id = ? AND position_in_rack IS NOT NULL
"#;

/// Slot positions currently held in a rack, across all equipment kinds
pub(crate) async fn used_positions(
    conn: &mut SqliteConnection,
    rack_id: i64,
    exclude: Option<(EquipmentKind, i64)>,
) -> Result<Vec<i64>> {
    let rows = sqlx::query(USED_POSITIONS_SQL)
        .bind(rack_id)
        .bind(rack_id)
        .bind(rack_id)
        .fetch_all(conn)
        .await?;

    Ok(rows
        .iter()
        .filter(|r| match exclude {
            Some((kind, id)) => {
                !(r.get::<String, _>("kind") == kind.as_str() && r.get::<i64, _>("id") == id)
            }
            None => true,
        })
        .map(|r| r.get("pos"))
        .collect())
}

/// Highest occupied slot position in a rack (0 when empty)
pub(crate) async fn max_used_position(conn: &mut SqliteConnection, rack_id: i64) -> Result<i64> {
    let used = used_positions(conn, rack_id, None).await?;
    Ok(used.into_iter().max().unwrap_or(0))
}

/// Validate a target slot for an equipment create/move: the rack must
/// exist, the position must be in range, and no other occupant may hold it.
pub(crate) async fn ensure_slot_free(
    conn: &mut SqliteConnection,
    rack_id: i64,
    position: i64,
    exclude: Option<(EquipmentKind, i64)>,
) -> Result<()> {
    let row = sqlx::query("SELECT slots FROM racks WHERE id = ?")
        .bind(rack_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| NotFoundError::new("Rack", &rack_id.to_string()))?;
    let slots: i64 = row.get("slots");

    if position < 1 || position > slots {
        return Err(TopologyError::SlotOverflow {
            rack_id,
            detail: format!("slot {} is out of range (1..={})", position, slots),
        }
        .into());
    }

    let used = used_positions(conn, rack_id, exclude).await?;
    if used.contains(&position) {
        return Err(TopologyError::SlotOverflow {
            rack_id,
            detail: format!("slot {} is already occupied", position),
        }
        .into());
    }
    Ok(())
}

/// Defensive re-check after an equipment write: no position in the rack
/// may have more than one occupant. A violation aborts the transaction.
pub(crate) async fn assert_slot_exclusive(conn: &mut SqliteConnection, rack_id: i64) -> Result<()> {
    let used = used_positions(conn, rack_id, None).await?;
    let mut seen = std::collections::HashSet::new();
    for pos in used {
        if !seen.insert(pos) {
            anyhow::bail!("slot exclusivity violated in rack {}: slot {}", rack_id, pos);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;

    #[tokio::test]
    async fn test_free_slots_spans_all_equipment_kinds() {
        let store = test_store().await;
        let rack = store
            .create_rack(
                &CreateRackRequest {
                    name: "R1".into(),
                    location: None,
                    description: None,
                    slots: Some(10),
                },
                "test",
            )
            .await
            .unwrap();

        store
            .create_switch(
                &CreateSwitchRequest {
                    name: "sw1".into(),
                    vendor: None,
                    model: None,
                    ports: 24,
                    status: None,
                    ip: None,
                    rack_id: Some(rack.id),
                    position_in_rack: Some(3),
                },
                "test",
            )
            .await
            .unwrap();
        store
            .create_patch_panel(
                &CreatePatchPanelRequest {
                    rack_id: rack.id,
                    panel_letter: "A".into(),
                    total_ports: 24,
                    description: None,
                    position_in_rack: Some(5),
                },
                "test",
            )
            .await
            .unwrap();
        store
            .create_fiber_panel(
                &CreateFiberPanelRequest {
                    rack_id: rack.id,
                    panel_letter: "A".into(),
                    total_fibers: 12,
                    description: None,
                    position_in_rack: Some(7),
                },
                "test",
            )
            .await
            .unwrap();

        let free = store.free_slots(rack.id, None).await.unwrap();
        assert_eq!(free.free, vec![1, 2, 4, 6, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_free_slots_excludes_entity_being_edited() {
        let store = test_store().await;
        let rack = store
            .create_rack(
                &CreateRackRequest {
                    name: "R1".into(),
                    location: None,
                    description: None,
                    slots: Some(4),
                },
                "test",
            )
            .await
            .unwrap();
        let sw = store
            .create_switch(
                &CreateSwitchRequest {
                    name: "sw1".into(),
                    vendor: None,
                    model: None,
                    ports: 8,
                    status: None,
                    ip: None,
                    rack_id: Some(rack.id),
                    position_in_rack: Some(2),
                },
                "test",
            )
            .await
            .unwrap();

        let free = store
            .free_slots(rack.id, Some((EquipmentKind::Switch, sw.id)))
            .await
            .unwrap();
        assert_eq!(free.free, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_shrink_below_occupied_slot_fails() {
        let store = test_store().await;
        let rack = store
            .create_rack(
                &CreateRackRequest {
                    name: "R1".into(),
                    location: None,
                    description: None,
                    slots: Some(20),
                },
                "test",
            )
            .await
            .unwrap();
        store
            .create_switch(
                &CreateSwitchRequest {
                    name: "sw1".into(),
                    vendor: None,
                    model: None,
                    ports: 8,
                    status: None,
                    ip: None,
                    rack_id: Some(rack.id),
                    position_in_rack: Some(15),
                },
                "test",
            )
            .await
            .unwrap();

        let err = store
            .update_rack(
                rack.id,
                &UpdateRackRequest {
                    name: "R1".into(),
                    location: None,
                    description: None,
                    slots: Some(10),
                },
                "test",
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::SlotOverflow { .. }) => {}
            other => panic!("expected SlotOverflow, got {:?}", other),
        }

        // The rack is unchanged
        let rack = store.get_rack(rack.id).await.unwrap().unwrap();
        assert_eq!(rack.slots, 20);
    }
}
