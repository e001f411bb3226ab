pub mod error;
mod fiber_links;
mod fiber_panels;
mod history;
mod patch_panels;
mod ports;
mod racks;
pub(crate) mod row_helpers;
mod switches;
mod users;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;

use fiber_links::FiberLinkRepo;
use fiber_panels::FiberPanelRepo;
use history::HistoryRepo;
use patch_panels::PatchPanelRepo;
use ports::PortRepo;
use racks::RackRepo;
use switches::SwitchRepo;
use users::UserRepo;

/// Typed error for "resource not found" — enables reliable downcast
/// in the API error handler instead of fragile string matching.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo
/// modules. Every bidirectional write runs in a single transaction.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with configurable pool size
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);
        Self::connect(&db_url, max_connections).await
    }

    async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations and seed the default operator
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        self.seed_default_user().await?;
        Ok(())
    }

    async fn seed_default_user(&self) -> Result<()> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        if count.0 == 0 {
            let hash = bcrypt::hash("admin", bcrypt::DEFAULT_COST)?;
            UserRepo::create(
                &self.pool,
                &uuid::Uuid::new_v4().to_string(),
                "admin",
                &hash,
            )
            .await?;
            tracing::warn!("Seeded default user 'admin'; change the password");
        }
        Ok(())
    }

    // ========== User Operations ==========

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        UserRepo::get_by_username(&self.pool, username).await
    }

    // ========== Rack Operations ==========

    pub async fn list_racks(&self) -> Result<Vec<Rack>> {
        RackRepo::list(&self.pool).await
    }

    pub async fn get_rack(&self, id: i64) -> Result<Option<Rack>> {
        RackRepo::get(&self.pool, id).await
    }

    pub async fn get_rack_by_name(&self, name: &str) -> Result<Option<Rack>> {
        RackRepo::get_by_name(&self.pool, name).await
    }

    pub async fn create_rack(&self, req: &CreateRackRequest, actor: &str) -> Result<Rack> {
        RackRepo::create(&self.pool, req, actor).await
    }

    pub async fn update_rack(
        &self,
        id: i64,
        req: &UpdateRackRequest,
        actor: &str,
    ) -> Result<Rack> {
        RackRepo::update(&self.pool, id, req, actor).await
    }

    pub async fn delete_rack(&self, id: i64, actor: &str) -> Result<()> {
        RackRepo::delete(&self.pool, id, actor).await
    }

    pub async fn free_slots(
        &self,
        rack_id: i64,
        exclude: Option<(EquipmentKind, i64)>,
    ) -> Result<FreeSlots> {
        RackRepo::free_slots(&self.pool, rack_id, exclude).await
    }

    // ========== Switch Operations ==========

    pub async fn list_switches(&self) -> Result<Vec<Switch>> {
        SwitchRepo::list(&self.pool).await
    }

    pub async fn get_switch(&self, id: i64) -> Result<Option<Switch>> {
        SwitchRepo::get(&self.pool, id).await
    }

    pub async fn get_switch_by_name(&self, name: &str) -> Result<Option<Switch>> {
        SwitchRepo::get_by_name(&self.pool, name).await
    }

    pub async fn create_switch(&self, req: &CreateSwitchRequest, actor: &str) -> Result<Switch> {
        SwitchRepo::create(&self.pool, req, actor).await
    }

    pub async fn update_switch(
        &self,
        id: i64,
        req: &UpdateSwitchRequest,
        actor: &str,
    ) -> Result<Switch> {
        SwitchRepo::update(&self.pool, id, req, actor).await
    }

    pub async fn delete_switch(&self, id: i64, actor: &str) -> Result<()> {
        SwitchRepo::delete(&self.pool, id, actor).await
    }

    // ========== Patch Panel Operations ==========

    pub async fn list_patch_panels(&self) -> Result<Vec<PatchPanel>> {
        PatchPanelRepo::list(&self.pool).await
    }

    pub async fn list_patch_panels_for_rack(&self, rack_id: i64) -> Result<Vec<PatchPanel>> {
        PatchPanelRepo::list_for_rack(&self.pool, rack_id).await
    }

    pub async fn get_patch_panel(&self, id: i64) -> Result<Option<PatchPanel>> {
        PatchPanelRepo::get(&self.pool, id).await
    }

    pub async fn get_patch_panel_by_letter(
        &self,
        rack_id: i64,
        letter: &str,
    ) -> Result<Option<PatchPanel>> {
        PatchPanelRepo::get_by_letter(&self.pool, rack_id, letter).await
    }

    pub async fn create_patch_panel(
        &self,
        req: &CreatePatchPanelRequest,
        actor: &str,
    ) -> Result<PatchPanel> {
        PatchPanelRepo::create(&self.pool, req, actor).await
    }

    pub async fn update_patch_panel(
        &self,
        id: i64,
        req: &UpdatePatchPanelRequest,
        actor: &str,
    ) -> Result<PatchPanel> {
        PatchPanelRepo::update(&self.pool, id, req, actor).await
    }

    pub async fn delete_patch_panel(&self, id: i64, actor: &str) -> Result<()> {
        PatchPanelRepo::delete(&self.pool, id, actor).await
    }

    pub async fn list_patch_ports(&self, panel_id: i64) -> Result<Vec<PatchPort>> {
        PatchPanelRepo::list_ports(&self.pool, panel_id).await
    }

    pub async fn get_patch_port(&self, panel_id: i64, port_number: i64) -> Result<Option<PatchPort>> {
        PatchPanelRepo::get_port(&self.pool, panel_id, port_number).await
    }

    // ========== Fiber Panel Operations ==========

    pub async fn list_fiber_panels(&self) -> Result<Vec<FiberPanel>> {
        FiberPanelRepo::list(&self.pool).await
    }

    pub async fn list_fiber_panels_for_rack(&self, rack_id: i64) -> Result<Vec<FiberPanel>> {
        FiberPanelRepo::list_for_rack(&self.pool, rack_id).await
    }

    pub async fn get_fiber_panel(&self, id: i64) -> Result<Option<FiberPanel>> {
        FiberPanelRepo::get(&self.pool, id).await
    }

    pub async fn get_fiber_panel_by_letter(
        &self,
        rack_id: i64,
        letter: &str,
    ) -> Result<Option<FiberPanel>> {
        FiberPanelRepo::get_by_letter(&self.pool, rack_id, letter).await
    }

    pub async fn create_fiber_panel(
        &self,
        req: &CreateFiberPanelRequest,
        actor: &str,
    ) -> Result<FiberPanel> {
        FiberPanelRepo::create(&self.pool, req, actor).await
    }

    pub async fn update_fiber_panel(
        &self,
        id: i64,
        req: &UpdateFiberPanelRequest,
        actor: &str,
    ) -> Result<FiberPanel> {
        FiberPanelRepo::update(&self.pool, id, req, actor).await
    }

    pub async fn delete_fiber_panel(&self, id: i64, actor: &str) -> Result<()> {
        FiberPanelRepo::delete(&self.pool, id, actor).await
    }

    pub async fn list_fiber_ports(&self, panel_id: i64) -> Result<Vec<FiberPort>> {
        FiberPanelRepo::list_ports(&self.pool, panel_id).await
    }

    pub async fn get_fiber_port(&self, panel_id: i64, port_number: i64) -> Result<Option<FiberPort>> {
        FiberPanelRepo::get_port(&self.pool, panel_id, port_number).await
    }

    // ========== Connection Graph Operations ==========

    pub async fn list_switch_ports(&self, switch_id: i64) -> Result<Vec<SwitchPort>> {
        PortRepo::list_for_switch(&self.pool, switch_id).await
    }

    pub async fn get_switch_port(&self, switch_id: i64, port_no: i64) -> Result<Option<SwitchPort>> {
        PortRepo::get(&self.pool, switch_id, port_no).await
    }

    pub async fn set_direct(
        &self,
        switch_id: i64,
        port_no: i64,
        req: &SetPortRequest,
        actor: &str,
    ) -> Result<SwitchPort> {
        PortRepo::set_direct(&self.pool, switch_id, port_no, req, actor).await
    }

    pub async fn bind_to_panel(
        &self,
        switch_id: i64,
        port_no: i64,
        req: &BindToPanelRequest,
        actor: &str,
    ) -> Result<SwitchPort> {
        PortRepo::bind_to_panel(&self.pool, switch_id, port_no, req, actor).await
    }

    pub async fn bind_panel_port(
        &self,
        panel_kind: PanelKind,
        panel_id: i64,
        port_number: i64,
        req: &BindPanelPortRequest,
        actor: &str,
    ) -> Result<()> {
        PortRepo::bind_panel_port(&self.pool, panel_kind, panel_id, port_number, req, actor).await
    }

    pub async fn disconnect_structural(
        &self,
        switch_id: i64,
        port_no: i64,
        actor: &str,
    ) -> Result<SwitchPort> {
        PortRepo::disconnect_structural(&self.pool, switch_id, port_no, actor).await
    }

    pub async fn disconnect_panel_port(
        &self,
        panel_kind: PanelKind,
        panel_id: i64,
        port_number: i64,
        actor: &str,
    ) -> Result<()> {
        PortRepo::disconnect_panel_port(&self.pool, panel_kind, panel_id, port_number, actor).await
    }

    pub async fn clear_port(&self, switch_id: i64, port_no: i64, actor: &str) -> Result<SwitchPort> {
        PortRepo::clear(&self.pool, switch_id, port_no, actor).await
    }

    pub async fn reset_all_ports(&self, switch_id: i64, actor: &str) -> Result<i64> {
        PortRepo::reset_all(&self.pool, switch_id, actor).await
    }

    pub async fn set_hub(
        &self,
        switch_id: i64,
        port_no: i64,
        req: &SetHubRequest,
        actor: &str,
    ) -> Result<SwitchPort> {
        PortRepo::set_hub(&self.pool, switch_id, port_no, req, actor).await
    }

    pub async fn clear_hub(&self, switch_id: i64, port_no: i64, actor: &str) -> Result<SwitchPort> {
        PortRepo::clear_hub(&self.pool, switch_id, port_no, actor).await
    }

    // ========== Fiber Jumper Operations ==========

    pub async fn bridge_fiber(
        &self,
        panel_id: i64,
        port_number: i64,
        req: &BridgeRequest,
        actor: &str,
    ) -> Result<()> {
        FiberLinkRepo::bridge(&self.pool, panel_id, port_number, req, actor).await
    }

    pub async fn resolve_fiber_endpoint(
        &self,
        panel_id: i64,
        port_number: i64,
    ) -> Result<Option<ChainEndpoint>> {
        FiberLinkRepo::resolve_endpoint(&self.pool, panel_id, port_number).await
    }

    // ========== History Operations ==========

    pub async fn list_history(
        &self,
        query: &HistoryQuery,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<ConnectionHistory>> {
        HistoryRepo::list(&self.pool, query, limit, offset).await
    }
}

/// In-memory store for tests. Single connection so the database lives as
/// long as the pool.
#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    Store::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory store")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn rack(store: &Store, name: &str, slots: i64) -> Rack {
        store
            .create_rack(
                &CreateRackRequest {
                    name: name.into(),
                    location: None,
                    description: None,
                    slots: Some(slots),
                },
                "test",
            )
            .await
            .unwrap()
    }

    pub(crate) async fn switch_in(
        store: &Store,
        name: &str,
        ports: i64,
        rack_id: i64,
        position: Option<i64>,
    ) -> Switch {
        store
            .create_switch(
                &CreateSwitchRequest {
                    name: name.into(),
                    vendor: Some("generic".into()),
                    model: None,
                    ports,
                    status: None,
                    ip: None,
                    rack_id: Some(rack_id),
                    position_in_rack: position,
                },
                "test",
            )
            .await
            .unwrap()
    }

    pub(crate) async fn patch_panel_in(
        store: &Store,
        letter: &str,
        total_ports: i64,
        rack_id: i64,
        position: Option<i64>,
    ) -> PatchPanel {
        store
            .create_patch_panel(
                &CreatePatchPanelRequest {
                    rack_id,
                    panel_letter: letter.into(),
                    total_ports,
                    description: None,
                    position_in_rack: position,
                },
                "test",
            )
            .await
            .unwrap()
    }

    pub(crate) async fn fiber_panel_in(
        store: &Store,
        letter: &str,
        total_fibers: i64,
        rack_id: i64,
        position: Option<i64>,
    ) -> FiberPanel {
        store
            .create_fiber_panel(
                &CreateFiberPanelRequest {
                    rack_id,
                    panel_letter: letter.into(),
                    total_fibers,
                    description: None,
                    position_in_rack: position,
                },
                "test",
            )
            .await
            .unwrap()
    }

    /// Every bound pair in the store must satisfy peer(peer(x)) == x
    async fn assert_mirror_symmetry(store: &Store) {
        for sw in store.list_switches().await.unwrap() {
            for port in store.list_switch_ports(sw.id).await.unwrap() {
                if let Some(b) = port.binding {
                    let (peer_id, peer_port) = match b.panel_kind {
                        PanelKind::Patch => {
                            let p = store.get_patch_port(b.panel_id, b.panel_port).await.unwrap();
                            let p = p.expect("mirror row must exist");
                            (p.peer_switch_id, p.peer_switch_port)
                        }
                        PanelKind::Fiber => {
                            let p = store.get_fiber_port(b.panel_id, b.panel_port).await.unwrap();
                            let p = p.expect("mirror row must exist");
                            (p.peer_switch_id, p.peer_switch_port)
                        }
                    };
                    assert_eq!(peer_id, Some(sw.id), "panel side must point back");
                    assert_eq!(peer_port, Some(port.port_no));
                }
            }
        }
        for panel in store.list_fiber_panels().await.unwrap() {
            for port in store.list_fiber_ports(panel.id).await.unwrap() {
                if let (Some(pp), Some(pn)) = (port.peer_panel_id, port.peer_panel_port) {
                    let peer = store.get_fiber_port(pp, pn).await.unwrap().unwrap();
                    assert_eq!(peer.peer_panel_id, Some(panel.id));
                    assert_eq!(peer.peer_panel_port, Some(port.port_number));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_mirror_symmetry_across_operation_sequence() {
        let store = test_store().await;
        let r = rack(&store, "R", 42).await;
        let s1 = switch_in(&store, "s1", 48, r.id, Some(1)).await;
        let s2 = switch_in(&store, "s2", 24, r.id, Some(2)).await;
        let p = patch_panel_in(&store, "A", 24, r.id, Some(3)).await;
        let f1 = fiber_panel_in(&store, "F", 12, r.id, Some(4)).await;
        let f2 = fiber_panel_in(&store, "G", 12, r.id, Some(5)).await;

        let bind = |panel_kind, panel_id, panel_port| BindToPanelRequest {
            panel_kind,
            panel_id,
            panel_port,
            kind: None,
            device: None,
            ip: None,
            mac: None,
            note: None,
        };

        store
            .bind_to_panel(s1.id, 1, &bind(PanelKind::Patch, p.id, 1), "test")
            .await
            .unwrap();
        store
            .bind_to_panel(s2.id, 2, &bind(PanelKind::Patch, p.id, 2), "test")
            .await
            .unwrap();
        store
            .bind_to_panel(s1.id, 46, &bind(PanelKind::Fiber, f1.id, 1), "test")
            .await
            .unwrap();
        store
            .bridge_fiber(
                f1.id,
                2,
                &BridgeRequest {
                    peer_panel_id: f2.id,
                    peer_panel_port: 2,
                },
                "test",
            )
            .await
            .unwrap();
        assert_mirror_symmetry(&store).await;

        // Move a binding, disconnect another, clear a third
        store
            .bind_to_panel(s1.id, 1, &bind(PanelKind::Patch, p.id, 5), "test")
            .await
            .unwrap();
        store.disconnect_structural(s2.id, 2, "test").await.unwrap();
        store.clear_port(s1.id, 46, "test").await.unwrap();
        assert_mirror_symmetry(&store).await;

        // Tear equipment down; survivors must stay symmetric
        store.delete_patch_panel(p.id, "test").await.unwrap();
        store.delete_switch(s2.id, "test").await.unwrap();
        assert_mirror_symmetry(&store).await;
    }
}
