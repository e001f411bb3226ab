use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// Panels are addressed by a single letter, unique per rack and kind
pub(super) fn normalize_panel_letter(letter: &str) -> Result<String, ApiError> {
    let letter = letter.trim().to_uppercase();
    if letter.len() != 1 || !letter.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::bad_request("panel letter must be a single letter A-Z"));
    }
    Ok(letter)
}

/// List all patch panels
pub async fn list_patch_panels(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PatchPanel>>, ApiError> {
    let panels = state.store.list_patch_panels().await?;
    Ok(Json(panels))
}

/// Get a single patch panel
pub async fn get_patch_panel(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PatchPanel>, ApiError> {
    let panel = state
        .store
        .get_patch_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("patch panel"))?;
    Ok(Json(panel))
}

/// Create a patch panel with its port rows
pub async fn create_patch_panel(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<CreatePatchPanelRequest>,
) -> Result<(StatusCode, Json<PatchPanel>), ApiError> {
    req.panel_letter = normalize_panel_letter(&req.panel_letter)?;
    if req.total_ports < 1 {
        return Err(ApiError::bad_request("port count must be at least 1"));
    }

    if state
        .store
        .get_patch_panel_by_letter(req.rack_id, &req.panel_letter)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "patch panel {} already exists in this rack",
            req.panel_letter
        )));
    }

    let panel = state
        .store
        .create_patch_panel(&req, &auth.claims.username)
        .await?;
    tracing::info!(
        "patch panel {} created in rack {} by {}",
        panel.panel_letter,
        panel.rack_id,
        auth.claims.username
    );
    Ok(created(panel))
}

/// Update a patch panel
pub async fn update_patch_panel(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(mut req): Json<UpdatePatchPanelRequest>,
) -> Result<Json<PatchPanel>, ApiError> {
    req.panel_letter = normalize_panel_letter(&req.panel_letter)?;
    if req.total_ports < 1 {
        return Err(ApiError::bad_request("port count must be at least 1"));
    }

    let existing = state
        .store
        .get_patch_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("patch panel"))?;
    if let Some(other) = state
        .store
        .get_patch_panel_by_letter(existing.rack_id, &req.panel_letter)
        .await?
    {
        if other.id != id {
            return Err(ApiError::conflict(format!(
                "patch panel {} already exists in this rack",
                req.panel_letter
            )));
        }
    }

    let panel = state
        .store
        .update_patch_panel(id, &req, &auth.claims.username)
        .await?;
    Ok(Json(panel))
}

/// Delete a patch panel, releasing every switch port bound to it
pub async fn delete_patch_panel(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_patch_panel(id, &auth.claims.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the panel's port rows with their mirror state
pub async fn list_patch_ports(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PatchPort>>, ApiError> {
    state
        .store
        .get_patch_panel(id)
        .await?
        .ok_or_else(|| ApiError::not_found("patch panel"))?;
    let ports = state.store.list_patch_ports(id).await?;
    Ok(Json(ports))
}

/// Bind a patch port to a switch port, initiated from the panel side
pub async fn bind_patch_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
    Json(req): Json<BindPanelPortRequest>,
) -> Result<Json<PatchPort>, ApiError> {
    state
        .store
        .bind_panel_port(PanelKind::Patch, id, port, &req, &auth.claims.username)
        .await?;
    let row = state
        .store
        .get_patch_port(id, port)
        .await?
        .ok_or_else(|| ApiError::not_found("patch port"))?;
    Ok(Json(row))
}

/// Disconnect a patch port from its switch peer
pub async fn disconnect_patch_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<PatchPort>, ApiError> {
    state
        .store
        .disconnect_panel_port(PanelKind::Patch, id, port, &auth.claims.username)
        .await?;
    let row = state
        .store
        .get_patch_port(id, port)
        .await?
        .ok_or_else(|| ApiError::not_found("patch port"))?;
    Ok(Json(row))
}
