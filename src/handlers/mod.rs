pub mod auth;
pub mod fiber_panels;
pub mod history;
pub mod patch_panels;
pub mod ports;
pub mod racks;
pub mod switches;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::error::TopologyError;

/// Error response body: a message plus a stable machine-readable kind
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }

    pub fn with_kind(error: impl Into<String>, kind: &str) -> Self {
        Self {
            error: error.into(),
            kind: Some(kind.to_string()),
        }
    }
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: Option<String>,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            kind: None,
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
            kind: Some("not_found".to_string()),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
            kind: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
            kind: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
            kind: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.kind {
            Some(kind) => ErrorResponse::with_kind(self.message, &kind),
            None => ErrorResponse::new(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed topology errors map to client-facing statuses with their
        // stable kind tag (no fragile string matching).
        if let Some(topo) = err.downcast_ref::<TopologyError>() {
            let status = match topo {
                TopologyError::PanelNotFound { .. } => StatusCode::NOT_FOUND,
                TopologyError::SlotOverflow { .. }
                | TopologyError::AlreadyBoundElsewhere { .. } => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            return Self {
                status,
                message: topo.to_string(),
                kind: Some(topo.kind().to_string()),
            };
        }
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::not_found(&nf.to_string());
        }
        // Storage failures are retryable and never leak driver messages
        if err.downcast_ref::<sqlx::Error>().is_some() {
            tracing::error!("storage error: {:#}", err);
            return Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "storage unavailable, retry the operation".to_string(),
                kind: Some("storage_unavailable".to_string()),
            };
        }
        tracing::error!("internal error: {:#}", err);
        Self::internal(err.to_string())
    }
}

/// Message response for simple status messages
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Json<Self> {
        Json(Self { message: msg.into() })
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Healthcheck endpoint — returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "patchbay",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
