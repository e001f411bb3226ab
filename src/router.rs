use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        // Auth
        .route("/api/login", post(handlers::auth::login))
        // Rack routes
        .route("/api/racks", get(handlers::racks::list_racks))
        .route("/api/racks", post(handlers::racks::create_rack))
        .route("/api/racks/:id", get(handlers::racks::get_rack))
        .route("/api/racks/:id", put(handlers::racks::update_rack))
        .route("/api/racks/:id", delete(handlers::racks::delete_rack))
        .route("/api/racks/:id/free-slots", get(handlers::racks::free_slots))
        .route("/api/racks/:id/panels", get(handlers::racks::list_rack_panels))
        // Switch routes
        .route("/api/switches", get(handlers::switches::list_switches))
        .route("/api/switches", post(handlers::switches::create_switch))
        .route("/api/switches/:id", get(handlers::switches::get_switch))
        .route("/api/switches/:id", put(handlers::switches::update_switch))
        .route("/api/switches/:id", delete(handlers::switches::delete_switch))
        // Switch port routes (the connection graph)
        .route("/api/switches/:id/ports", get(handlers::ports::list_switch_ports))
        .route("/api/switches/:id/ports/:port", get(handlers::ports::get_switch_port))
        .route("/api/switches/:id/ports/:port", put(handlers::ports::set_port))
        .route("/api/switches/:id/ports/:port/bind", post(handlers::ports::bind_port))
        .route("/api/switches/:id/ports/:port/disconnect", post(handlers::ports::disconnect_port))
        .route("/api/switches/:id/ports/:port/clear", post(handlers::ports::clear_port))
        .route("/api/switches/:id/ports/:port/hub", post(handlers::ports::set_hub))
        .route("/api/switches/:id/ports/:port/hub", delete(handlers::ports::clear_hub))
        .route("/api/switches/:id/reset-ports", post(handlers::ports::reset_all_ports))
        // Patch panel routes
        .route("/api/patch-panels", get(handlers::patch_panels::list_patch_panels))
        .route("/api/patch-panels", post(handlers::patch_panels::create_patch_panel))
        .route("/api/patch-panels/:id", get(handlers::patch_panels::get_patch_panel))
        .route("/api/patch-panels/:id", put(handlers::patch_panels::update_patch_panel))
        .route("/api/patch-panels/:id", delete(handlers::patch_panels::delete_patch_panel))
        .route("/api/patch-panels/:id/ports", get(handlers::patch_panels::list_patch_ports))
        .route("/api/patch-panels/:id/ports/:port/bind", post(handlers::patch_panels::bind_patch_port))
        .route("/api/patch-panels/:id/ports/:port/disconnect", post(handlers::patch_panels::disconnect_patch_port))
        // Fiber panel routes
        .route("/api/fiber-panels", get(handlers::fiber_panels::list_fiber_panels))
        .route("/api/fiber-panels", post(handlers::fiber_panels::create_fiber_panel))
        .route("/api/fiber-panels/:id", get(handlers::fiber_panels::get_fiber_panel))
        .route("/api/fiber-panels/:id", put(handlers::fiber_panels::update_fiber_panel))
        .route("/api/fiber-panels/:id", delete(handlers::fiber_panels::delete_fiber_panel))
        .route("/api/fiber-panels/:id/ports", get(handlers::fiber_panels::list_fiber_ports))
        .route("/api/fiber-panels/:id/ports/:port/bind", post(handlers::fiber_panels::bind_fiber_port))
        .route("/api/fiber-panels/:id/ports/:port/bridge", post(handlers::fiber_panels::bridge_fiber_port))
        .route("/api/fiber-panels/:id/ports/:port/disconnect", post(handlers::fiber_panels::disconnect_fiber_port))
        .route("/api/fiber-panels/:id/ports/:port/endpoint", get(handlers::fiber_panels::resolve_fiber_endpoint))
        // Audit history
        .route("/api/history", get(handlers::history::list_history))
        // Healthcheck
        .route("/api/health", get(handlers::healthcheck))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
