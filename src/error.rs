use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to connect to network: {0}")]
    ConnectionError(String),

    #[error("Ledger error: {0}")]
    LedgerError(String),

    #[error("Token store error: {0}")]
    StoreError(String),

    #[error("HTTP request error: {0}")]
    RequestError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Resource already exists: {0}")]
    ConflictError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Discovery cancelled")]
    Cancelled,
}

// Utility methods for error conversion
impl AppError {
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AppError::ConnectionError(err.to_string())
        } else {
            AppError::RequestError(err.to_string())
        }
    }

    pub fn from_serde_error(err: serde_json::Error) -> Self {
        AppError::JsonError(err.to_string())
    }
}

// From trait implementations for common error types
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest_error(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_serde_error(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StoreError(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::ConfigError(format!("Invalid URL: {}", err))
    }
}

// Implement axum's IntoResponse for HTTP error responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            AppError::LedgerError(_) => StatusCode::BAD_GATEWAY,
            AppError::RequestError(_) => StatusCode::BAD_GATEWAY,
            AppError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::JsonError(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        };

        // Create a JSON response with error details
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}
