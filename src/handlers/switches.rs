use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::utils::is_valid_ipv4;
use crate::AppState;

use super::{created, ApiError};

fn validate_switch_fields(
    name: &str,
    ports: i64,
    status: Option<&str>,
    ip: Option<&str>,
) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::bad_request("switch name is required"));
    }
    if ports < 1 {
        return Err(ApiError::bad_request("port count must be at least 1"));
    }
    if let Some(status) = status {
        if !switch_status::is_valid(status) {
            return Err(ApiError::bad_request("status must be one of: online, offline"));
        }
    }
    if let Some(ip) = ip {
        if !ip.is_empty() && !is_valid_ipv4(ip) {
            return Err(ApiError::bad_request("invalid IPv4 address"));
        }
    }
    Ok(())
}

/// List all switches
pub async fn list_switches(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Switch>>, ApiError> {
    let switches = state.store.list_switches().await?;
    Ok(Json(switches))
}

/// Get a single switch
pub async fn get_switch(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Switch>, ApiError> {
    let switch = state
        .store
        .get_switch(id)
        .await?
        .ok_or_else(|| ApiError::not_found("switch"))?;
    Ok(Json(switch))
}

/// Create a new switch; its port rows are materialized in the same
/// transaction.
pub async fn create_switch(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSwitchRequest>,
) -> Result<(StatusCode, Json<Switch>), ApiError> {
    validate_switch_fields(&req.name, req.ports, req.status.as_deref(), req.ip.as_deref())?;

    if state.store.get_switch_by_name(&req.name).await?.is_some() {
        return Err(ApiError::conflict("a switch with this name already exists"));
    }

    let switch = state.store.create_switch(&req, &auth.claims.username).await?;
    tracing::info!(
        "switch {} ({} ports) created by {}",
        switch.name,
        switch.ports,
        auth.claims.username
    );
    Ok(created(switch))
}

/// Update a switch. Changing the port count grows or trims its port rows.
pub async fn update_switch(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSwitchRequest>,
) -> Result<Json<Switch>, ApiError> {
    validate_switch_fields(&req.name, req.ports, req.status.as_deref(), req.ip.as_deref())?;

    if let Some(other) = state.store.get_switch_by_name(&req.name).await? {
        if other.id != id {
            return Err(ApiError::conflict("a switch with this name already exists"));
        }
    }

    let switch = state
        .store
        .update_switch(id, &req, &auth.claims.username)
        .await?;
    Ok(Json(switch))
}

/// Delete a switch after tearing down all its connections
pub async fn delete_switch(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_switch(id, &auth.claims.username).await?;
    tracing::info!("switch {} deleted by {}", id, auth.claims.username);
    Ok(StatusCode::NO_CONTENT)
}
