use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// List all racks
pub async fn list_racks(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Rack>>, ApiError> {
    let racks = state.store.list_racks().await?;
    Ok(Json(racks))
}

/// Get a single rack
pub async fn get_rack(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Rack>, ApiError> {
    let rack = state
        .store
        .get_rack(id)
        .await?
        .ok_or_else(|| ApiError::not_found("rack"))?;
    Ok(Json(rack))
}

fn validate_rack_fields(name: &str, slots: Option<i64>) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::bad_request("rack name is required"));
    }
    if let Some(slots) = slots {
        if !(1..=MAX_RACK_SLOTS).contains(&slots) {
            return Err(ApiError::bad_request(format!(
                "slot capacity must be between 1 and {}",
                MAX_RACK_SLOTS
            )));
        }
    }
    Ok(())
}

/// Create a new rack
pub async fn create_rack(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRackRequest>,
) -> Result<(StatusCode, Json<Rack>), ApiError> {
    validate_rack_fields(&req.name, req.slots)?;

    if state.store.get_rack_by_name(&req.name).await?.is_some() {
        return Err(ApiError::conflict("a rack with this name already exists"));
    }

    let rack = state.store.create_rack(&req, &auth.claims.username).await?;
    tracing::info!("rack {} created by {}", rack.name, auth.claims.username);
    Ok(created(rack))
}

/// Update an existing rack. Shrinking below the highest occupied slot is
/// rejected with a slot_overflow conflict.
pub async fn update_rack(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRackRequest>,
) -> Result<Json<Rack>, ApiError> {
    validate_rack_fields(&req.name, req.slots)?;

    if let Some(other) = state.store.get_rack_by_name(&req.name).await? {
        if other.id != id {
            return Err(ApiError::conflict("a rack with this name already exists"));
        }
    }

    let rack = state
        .store
        .update_rack(id, &req, &auth.claims.username)
        .await?;
    Ok(Json(rack))
}

/// Delete a rack, cascading to everything mounted in it
pub async fn delete_rack(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_rack(id, &auth.claims.username).await?;
    tracing::info!("rack {} deleted by {}", id, auth.claims.username);
    Ok(StatusCode::NO_CONTENT)
}

/// List free slot positions, optionally excluding the entity being edited
pub async fn free_slots(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<FreeSlotsQuery>,
) -> Result<Json<FreeSlots>, ApiError> {
    let exclude = match (query.exclude_kind, query.exclude_id) {
        (Some(kind), Some(eid)) => Some((kind, eid)),
        (None, None) => None,
        _ => {
            return Err(ApiError::bad_request(
                "exclude_kind and exclude_id must be supplied together",
            ))
        }
    };
    let free = state.store.free_slots(id, exclude).await?;
    Ok(Json(free))
}

/// List panels (both kinds) available as binding targets in a rack
pub async fn list_rack_panels(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .get_rack(id)
        .await?
        .ok_or_else(|| ApiError::not_found("rack"))?;
    let patch = state.store.list_patch_panels_for_rack(id).await?;
    let fiber = state.store.list_fiber_panels_for_rack(id).await?;
    Ok(Json(serde_json::json!({
        "patch_panels": patch,
        "fiber_panels": fiber,
    })))
}
