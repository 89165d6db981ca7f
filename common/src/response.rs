//! Response body types shared by the JSON routes.

use serde::Serialize;
use utoipa::ToSchema;

/// Typed error body: `{ "error": message, "code": CODE }`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,

    /// Error code for client handling (e.g., "UNAUTHORIZED", "CONNECTION_ERROR").
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
        }
    }
}

/// Simple status acknowledgement, e.g. `{ "status": "success" }`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusBody {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusBody {
    /// `{ "status": "success" }`.
    pub fn success() -> Self {
        Self::new("success")
    }

    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
