//! Admin API handlers

pub mod auth;
pub mod plans;
pub mod relays;
pub mod stats;
pub mod tenants;
pub mod tokens;

use serde::Serialize;

/// Generic confirmation body for mutating admin endpoints
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
