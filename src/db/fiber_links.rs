use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use crate::models::*;

use super::error::TopologyError;
use super::history::HistoryRepo;
use super::ports::require_panel;

/// Panel-to-panel fiber jumpers and chain resolution.
///
/// A fiber port row carries two independent peer slots: the switch it
/// terminates on and the panel port a jumper patches it through to. A port
/// holding both is a jump point; the chain is walked panel-peer by
/// panel-peer until a switch peer appears.
pub struct FiberLinkRepo;

impl FiberLinkRepo {
    /// Bridge two fiber panel ports with a jumper. Both rows are updated in
    /// one transaction; re-bridging the same pair is a no-op.
    pub async fn bridge(
        pool: &Pool<Sqlite>,
        panel_id: i64,
        port_number: i64,
        req: &BridgeRequest,
        actor: &str,
    ) -> Result<()> {
        let mut tx = pool.begin().await?;

        let a_panel = require_panel(&mut tx, PanelKind::Fiber, panel_id).await?;
        if port_number < 1 || port_number > a_panel.total_ports {
            return Err(TopologyError::PortOutOfRange {
                port: port_number,
                max: a_panel.total_ports,
            }
            .into());
        }
        let b_panel = require_panel(&mut tx, PanelKind::Fiber, req.peer_panel_id).await?;
        if req.peer_panel_port < 1 || req.peer_panel_port > b_panel.total_ports {
            return Err(TopologyError::PortOutOfRange {
                port: req.peer_panel_port,
                max: b_panel.total_ports,
            }
            .into());
        }

        if panel_id == req.peer_panel_id && port_number == req.peer_panel_port {
            return Err(TopologyError::AlreadyBoundElsewhere {
                detail: "a fiber port cannot be jumpered to itself".to_string(),
            }
            .into());
        }

        let a_peer = panel_peer(&mut tx, panel_id, port_number).await?;
        let b_peer = panel_peer(&mut tx, req.peer_panel_id, req.peer_panel_port).await?;

        // Idempotent when the pair is already mutually bridged
        if a_peer == Some((req.peer_panel_id, req.peer_panel_port))
            && b_peer == Some((panel_id, port_number))
        {
            return Ok(());
        }

        if let Some((other_panel, other_port)) = a_peer {
            return Err(TopologyError::AlreadyBoundElsewhere {
                detail: format!(
                    "fiber panel {} port {} already jumpered to panel {} port {}",
                    panel_id, port_number, other_panel, other_port
                ),
            }
            .into());
        }
        if let Some((other_panel, other_port)) = b_peer {
            return Err(TopologyError::AlreadyBoundElsewhere {
                detail: format!(
                    "fiber panel {} port {} already jumpered to panel {} port {}",
                    req.peer_panel_id, req.peer_panel_port, other_panel, other_port
                ),
            }
            .into());
        }

        set_panel_peer(&mut tx, panel_id, port_number, req.peer_panel_id, req.peer_panel_port)
            .await?;
        set_panel_peer(&mut tx, req.peer_panel_id, req.peer_panel_port, panel_id, port_number)
            .await?;

        HistoryRepo::record(
            &mut tx,
            actor,
            link_kind::PANEL_TO_PANEL,
            ("fiber_panel", panel_id, port_number),
            ("fiber_panel", req.peer_panel_id, req.peer_panel_port),
            history_action::CREATED,
            None,
            Some(serde_json::json!({
                "peer_panel_id": req.peer_panel_id,
                "peer_panel_port": req.peer_panel_port,
            })),
        )
        .await?;
        HistoryRepo::record(
            &mut tx,
            actor,
            link_kind::PANEL_TO_PANEL,
            ("fiber_panel", req.peer_panel_id, req.peer_panel_port),
            ("fiber_panel", panel_id, port_number),
            history_action::CREATED,
            None,
            Some(serde_json::json!({
                "peer_panel_id": panel_id,
                "peer_panel_port": port_number,
            })),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Resolve the ultimate switch endpoint of a jumper chain. Read-only:
    /// follows panel peers until a switch peer or a dead end, bounded by
    /// MAX_JUMP_HOPS so malformed data can't loop forever.
    pub async fn resolve_endpoint(
        pool: &Pool<Sqlite>,
        panel_id: i64,
        port_number: i64,
    ) -> Result<Option<ChainEndpoint>> {
        let mut current = (panel_id, port_number);
        let mut came_from: Option<(i64, i64)> = None;

        for hops in 0..MAX_JUMP_HOPS {
            let row = sqlx::query(
                r#"
                SELECT peer_switch_id, peer_switch_port, peer_panel_id, peer_panel_port
                FROM fiber_ports
                WHERE panel_id = ? AND port_number = ?
                "#,
            )
            .bind(current.0)
            .bind(current.1)
            .fetch_optional(pool)
            .await?;

            let row = match row {
                Some(row) => row,
                None => return Ok(None),
            };

            let switch_id: Option<i64> = row.get("peer_switch_id");
            let switch_port: Option<i64> = row.get("peer_switch_port");
            if let (Some(switch_id), Some(switch_port)) = (switch_id, switch_port) {
                return Ok(Some(ChainEndpoint {
                    switch_id,
                    switch_port,
                    hops,
                }));
            }

            let peer_panel: Option<i64> = row.get("peer_panel_id");
            let peer_port: Option<i64> = row.get("peer_panel_port");
            match (peer_panel, peer_port) {
                // Mirrored jumpers point back where we came from; that is
                // the end of the line, not another hop.
                (Some(p), Some(n)) if came_from != Some((p, n)) => {
                    came_from = Some(current);
                    current = (p, n);
                }
                _ => return Ok(None),
            }
        }

        Err(TopologyError::JumpChainTooLong { max: MAX_JUMP_HOPS }.into())
    }
}

async fn panel_peer(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    panel_id: i64,
    port_number: i64,
) -> Result<Option<(i64, i64)>> {
    let row = sqlx::query(
        "SELECT peer_panel_id, peer_panel_port FROM fiber_ports WHERE panel_id = ? AND port_number = ?",
    )
    .bind(panel_id)
    .bind(port_number)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.and_then(|r| {
        let id: Option<i64> = r.get("peer_panel_id");
        let port: Option<i64> = r.get("peer_panel_port");
        id.zip(port)
    }))
}

async fn set_panel_peer(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    panel_id: i64,
    port_number: i64,
    peer_panel_id: i64,
    peer_panel_port: i64,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO fiber_ports (panel_id, port_number, status, link_kind, peer_panel_id,
            peer_panel_port, created_at, updated_at)
        VALUES (?, ?, 'active', 'panel_to_panel', ?, ?, ?, ?)
        ON CONFLICT(panel_id, port_number) DO UPDATE SET
            status = 'active',
            link_kind = CASE WHEN peer_switch_id IS NULL THEN 'panel_to_panel' ELSE 'jump_point' END,
            peer_panel_id = excluded.peer_panel_id,
            peer_panel_port = excluded.peer_panel_port,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(panel_id)
    .bind(port_number)
    .bind(peer_panel_id)
    .bind(peer_panel_port)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;
    use crate::db::tests::{fiber_panel_in, rack, switch_in};

    #[tokio::test]
    async fn test_jumper_chain_resolves_to_switch() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s = switch_in(&store, "s1", 48, r.id, Some(1)).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(2)).await;
        let f2 = fiber_panel_in(&store, "G", 12, r.id, Some(3)).await;

        store
            .bridge_fiber(
                f1.id,
                1,
                &BridgeRequest {
                    peer_panel_id: f2.id,
                    peer_panel_port: 1,
                },
                "test",
            )
            .await
            .unwrap();

        // Port 45 of 48 is fiber class; it terminates the chain at F2 port 1
        store
            .bind_to_panel(
                s.id,
                45,
                &BindToPanelRequest {
                    panel_kind: PanelKind::Fiber,
                    panel_id: f2.id,
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

        let endpoint = store.resolve_fiber_endpoint(f1.id, 1).await.unwrap().unwrap();
        assert_eq!(endpoint.switch_id, s.id);
        assert_eq!(endpoint.switch_port, 45);
        assert_eq!(endpoint.hops, 1);

        // From the jump point itself the switch is directly visible
        let endpoint = store.resolve_fiber_endpoint(f2.id, 1).await.unwrap().unwrap();
        assert_eq!(endpoint.hops, 0);
    }

    #[tokio::test]
    async fn test_unterminated_chain_resolves_to_none() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(2)).await;
        let f2 = fiber_panel_in(&store, "G", 12, r.id, Some(3)).await;

        store
            .bridge_fiber(
                f1.id,
                3,
                &BridgeRequest {
                    peer_panel_id: f2.id,
                    peer_panel_port: 3,
                },
                "test",
            )
            .await
            .unwrap();

        // The far end has no switch peer: dead end, not an error
        assert!(store.resolve_fiber_endpoint(f1.id, 3).await.unwrap().is_none());
        assert!(store.resolve_fiber_endpoint(f1.id, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bridge_is_idempotent_and_mirrored() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(2)).await;
        let f2 = fiber_panel_in(&store, "G", 12, r.id, Some(3)).await;

        let req = BridgeRequest {
            peer_panel_id: f2.id,
            peer_panel_port: 4,
        };
        store.bridge_fiber(f1.id, 2, &req, "test").await.unwrap();
        store.bridge_fiber(f1.id, 2, &req, "test").await.unwrap();

        let a = store.get_fiber_port(f1.id, 2).await.unwrap().unwrap();
        assert_eq!(a.peer_panel_id, Some(f2.id));
        assert_eq!(a.peer_panel_port, Some(4));
        assert_eq!(a.link_kind.as_deref(), Some("panel_to_panel"));
        let b = store.get_fiber_port(f2.id, 4).await.unwrap().unwrap();
        assert_eq!(b.peer_panel_id, Some(f1.id));
        assert_eq!(b.peer_panel_port, Some(2));
    }

    #[tokio::test]
    async fn test_bridge_rejects_taken_port() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(2)).await;
        let f2 = fiber_panel_in(&store, "G", 12, r.id, Some(3)).await;
        let f3 = fiber_panel_in(&store, "H", 12, r.id, Some(4)).await;

        store
            .bridge_fiber(
                f1.id,
                1,
                &BridgeRequest {
                    peer_panel_id: f2.id,
                    peer_panel_port: 1,
                },
                "test",
            )
            .await
            .unwrap();

        let err = store
            .bridge_fiber(
                f3.id,
                1,
                &BridgeRequest {
                    peer_panel_id: f2.id,
                    peer_panel_port: 1,
                },
                "test",
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<crate::db::error::TopologyError>() {
            Some(TopologyError::AlreadyBoundElsewhere { .. }) => {}
            other => panic!("expected AlreadyBoundElsewhere, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bridge_rejects_self() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(2)).await;

        let err = store
            .bridge_fiber(
                f1.id,
                1,
                &BridgeRequest {
                    peer_panel_id: f1.id,
                    peer_panel_port: 1,
                },
                "test",
            )
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TopologyError>().is_some());
    }

    #[tokio::test]
    async fn test_disconnect_fiber_clears_jumper_counterpart() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(2)).await;
        let f2 = fiber_panel_in(&store, "G", 12, r.id, Some(3)).await;

        store
            .bridge_fiber(
                f1.id,
                6,
                &BridgeRequest {
                    peer_panel_id: f2.id,
                    peer_panel_port: 6,
                },
                "test",
            )
            .await
            .unwrap();
        store
            .disconnect_panel_port(PanelKind::Fiber, f1.id, 6, "test")
            .await
            .unwrap();

        // Neither end of the chain references an absent peer
        let a = store.get_fiber_port(f1.id, 6).await.unwrap().unwrap();
        assert_eq!(a.peer_panel_id, None);
        let b = store.get_fiber_port(f2.id, 6).await.unwrap().unwrap();
        assert_eq!(b.peer_panel_id, None);
        assert_eq!(b.status, "inactive");
    }
}
