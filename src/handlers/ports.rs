use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::utils::normalize_mac;
use crate::AppState;

use super::{ApiError, MessageResponse};

/// List all port rows of a switch
pub async fn list_switch_ports(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SwitchPort>>, ApiError> {
    state
        .store
        .get_switch(id)
        .await?
        .ok_or_else(|| ApiError::not_found("switch"))?;
    let ports = state.store.list_switch_ports(id).await?;
    Ok(Json(ports))
}

/// Get a single port row
pub async fn get_switch_port(
    _auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<SwitchPort>, ApiError> {
    let row = state
        .store
        .get_switch_port(id, port)
        .await?
        .ok_or_else(|| ApiError::not_found("port"))?;
    Ok(Json(row))
}

/// Set device fields on a port. Any structural peer is disconnected first;
/// this is the operation the SNMP collaborator feeds as well.
pub async fn set_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
    Json(mut req): Json<SetPortRequest>,
) -> Result<Json<SwitchPort>, ApiError> {
    if let Some(mac) = &req.mac {
        if !mac.is_empty() {
            req.mac = Some(normalize_mac(mac));
        }
    }
    let row = state
        .store
        .set_direct(id, port, &req, &auth.claims.username)
        .await?;
    Ok(Json(row))
}

/// Bind a switch port to a panel port in the same rack
pub async fn bind_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
    Json(mut req): Json<BindToPanelRequest>,
) -> Result<Json<SwitchPort>, ApiError> {
    if let Some(mac) = &req.mac {
        if !mac.is_empty() {
            req.mac = Some(normalize_mac(mac));
        }
    }
    let row = state
        .store
        .bind_to_panel(id, port, &req, &auth.claims.username)
        .await?;
    tracing::info!(
        "switch {} port {} bound to {} panel {} port {} by {}",
        id,
        port,
        req.panel_kind.as_str(),
        req.panel_id,
        req.panel_port,
        auth.claims.username
    );
    Ok(Json(row))
}

/// Disconnect the structural peer; device fields stay
pub async fn disconnect_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<SwitchPort>, ApiError> {
    let row = state
        .store
        .disconnect_structural(id, port, &auth.claims.username)
        .await?;
    Ok(Json(row))
}

/// Full reset of one port back to empty
pub async fn clear_port(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<SwitchPort>, ApiError> {
    let row = state
        .store
        .clear_port(id, port, &auth.claims.username)
        .await?;
    Ok(Json(row))
}

/// Clear every port of a switch
pub async fn reset_all_ports(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let count = state
        .store
        .reset_all_ports(id, &auth.claims.username)
        .await?;
    tracing::info!("all {} ports of switch {} cleared by {}", count, id, auth.claims.username);
    Ok(MessageResponse::new(format!("{} ports cleared", count)))
}

/// Flag a port as an unmanaged-hub uplink with its fan-out list
pub async fn set_hub(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
    Json(mut req): Json<SetHubRequest>,
) -> Result<Json<SwitchPort>, ApiError> {
    if req.hub_name.trim().is_empty() {
        return Err(ApiError::bad_request("hub name is required"));
    }
    if req.members.len() > MAX_HUB_MEMBERS {
        return Err(ApiError::bad_request(format!(
            "hub fan-out is limited to {} devices",
            MAX_HUB_MEMBERS
        )));
    }
    for member in &mut req.members {
        if !member.mac.is_empty() {
            member.mac = normalize_mac(&member.mac);
        }
    }

    let row = state
        .store
        .set_hub(id, port, &req, &auth.claims.username)
        .await?;
    Ok(Json(row))
}

/// Drop the hub flag and its fan-out list
pub async fn clear_hub(
    auth: crate::auth::AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, port)): Path<(i64, i64)>,
) -> Result<Json<SwitchPort>, ApiError> {
    let row = state
        .store
        .clear_hub(id, port, &auth.claims.username)
        .await?;
    Ok(Json(row))
}
