//! Unified application error type.
//!
//! Every failure the agent can surface maps to one variant here and renders
//! as an HTTP status plus a typed JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ErrorBody;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend unreachable, authentication failure or driver initialization error.
    #[error("connection failed: {0}")]
    DatabaseConnection(String),

    /// Unknown or malformed table/column reference, or a failing catalog query.
    #[error("catalog query failed: {0}")]
    CatalogQuery(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Cloud, Tally or verifier transport failure.
    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("unsupported database type: {0}")]
    UnsupportedDatabaseType(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DatabaseConnection(_) => "CONNECTION_ERROR",
            AppError::CatalogQuery(_) => "CATALOG_QUERY_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::UnsupportedDatabaseType(_) => "UNSUPPORTED_DATABASE",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DatabaseConnection(_) | AppError::ExternalService(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::CatalogQuery(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::UnsupportedDatabaseType(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        (status, Json(ErrorBody::new(self.code(), self.to_string()))).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(e.to_string())
    }
}
