use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::patch_panels::normalize_panel_letter;
use super::{created, ApiError};

/// List all fiber panels
pub async fn list_fiber_panels(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FiberPanel>>, ApiError> {
    let panels = state.store.list_fiber_panels().await?;
    Ok(Json(panels))
}

/// Get a single fiber panel
pub async fn get_fiber_panel(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<FiberPanel>, ApiError> {
    let panel = state
        .store
        .get_fiber_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber panel"))?;
    Ok(Json(panel))
}

/// Create a fiber panel with its fiber rows
pub async fn create_fiber_panel(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<CreateFiberPanelRequest>,
) -> Result<(StatusCode, Json<FiberPanel>), ApiError> {
    req.panel_letter = normalize_panel_letter(&req.panel_letter)?;
    if req.total_fibers < 1 {
        return Err(ApiError::bad_request("fiber count must be at least 1"));
    }

    if state
        .store
        .get_fiber_panel_by_letter(req.rack_id, &req.panel_letter)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "fiber panel {} already exists in this rack",
            req.panel_letter
        )));
    }

    let panel = state
        .store
        .create_fiber_panel(&req, &auth.claims.username)
        .await?;
    tracing::info!(
        "fiber panel {} created in rack {} by {}",
        panel.panel_letter,
        panel.rack_id,
        auth.claims.username
    );
    Ok(created(panel))
}

/// Update a fiber panel
pub async fn update_fiber_panel(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(mut req): Json<UpdateFiberPanelRequest>,
) -> Result<Json<FiberPanel>, ApiError> {
    req.panel_letter = normalize_panel_letter(&req.panel_letter)?;
    if req.total_fibers < 1 {
        return Err(ApiError::bad_request("fiber count must be at least 1"));
    }

    let existing = state
        .store
        .get_fiber_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber panel"))?;
    if let Some(other) = state
        .store
        .get_fiber_panel_by_letter(existing.rack_id, &req.panel_letter)
        .await?
    {
        if other.id != id {
            return Err(ApiError::conflict(format!(
                "fiber panel {} already exists in this rack",
                req.panel_letter
            )));
        }
    }

    let panel = state
        .store
        .update_fiber_panel(id, &req, &auth.claims.username)
        .await?;
    Ok(Json(panel))
}

/// Delete a fiber panel, releasing switch peers and jumper counterparts
pub async fn delete_fiber_panel(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_fiber_panel(id, &auth.claims.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the panel's fiber rows with their mirror state
pub async fn list_fiber_ports(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FiberPort>>, ApiError> {
    state
        .store
        .get_fiber_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber panel"))?;
    let ports = state.store.list_fiber_ports(id).await?;
    Ok(Json(ports))
}

/// Bind a fiber port to a switch port, initiated from the panel side
pub async fn bind_fiber_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
    Json(req): Json<BindPanelPortRequest>,
) -> Result<Json<FiberPort>, ApiError> {
    state
        .store
        .bind_panel_port(PanelKind::Fiber, id, port, &req, &auth.claims.username)
        .await?;
    let row = state
        .store
        .get_fiber_port(id, port)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber port"))?;
    Ok(Json(row))
}

/// Jumper two fiber panel ports together
pub async fn bridge_fiber_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
    Json(req): Json<BridgeRequest>,
) -> Result<Json<FiberPort>, ApiError> {
    state
        .store
        .bridge_fiber(id, port, &req, &auth.claims.username)
        .await?;
    tracing::info!(
        "fiber jumper {}:{} <-> {}:{} by {}",
        id,
        port,
        req.peer_panel_id,
        req.peer_panel_port,
        auth.claims.username
    );
    let row = state
        .store
        .get_fiber_port(id, port)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber port"))?;
    Ok(Json(row))
}

/// Disconnect a fiber port from its switch peer and jumper counterpart
pub async fn disconnect_fiber_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<FiberPort>, ApiError> {
    state
        .store
        .disconnect_panel_port(PanelKind::Fiber, id, port, &auth.claims.username)
        .await?;
    let row = state
        .store
        .get_fiber_port(id, port)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber port"))?;
    Ok(Json(row))
}

/// Resolve the switch at the far end of a jumper chain, if any
pub async fn resolve_fiber_endpoint(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .get_fiber_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("fiber panel"))?;
    let endpoint = state.store.resolve_fiber_endpoint(id, port).await?;
    Ok(Json(serde_json::json!({ "endpoint": endpoint })))
}
