mod history;
mod panels;
mod ports;
mod racks;
mod switches;

pub use history::*;
pub use panels::*;
pub use ports::*;
pub use racks::*;
pub use switches::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User represents an authenticated operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// LoginRequest for authenticating an operator
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// LoginResponse returned on successful authentication
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: usize,
    pub iat: usize,
}

/// Canonical switch status values
pub mod switch_status {
    pub const ONLINE: &str = "online";
    pub const OFFLINE: &str = "offline";

    pub const ALL: &[&str] = &[ONLINE, OFFLINE];

    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }
}
