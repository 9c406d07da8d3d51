//! Request/response shapes for the HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct TriggerPanicRequest {
    pub traveler_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TriggerPanicResponse {
    pub incident_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
