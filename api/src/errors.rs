//! Error types for the GraphQL SSE API
//!
//! This module provides:
//! - Server-level errors (ApiError enum) for infrastructure failures
//! - Request-level errors (MalformedRequest) raised before the engine is invoked

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// ============================================================================
// Server-Level Errors
// ============================================================================

/// API-related errors for server infrastructure
#[derive(Debug, Error)]
pub enum ApiError {
    /// Server binding error
    #[error("Failed to bind server: {0}")]
    BindError(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request-Level Errors
// ============================================================================

/// An HTTP request that could not be turned into a GraphQL operation
///
/// These never reach the execution engine and are rendered as `400 Bad Request`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRequest {
    /// The `query` field is absent or empty
    #[error("Missing required field 'query'")]
    MissingQuery,

    /// The `variables` field is not a JSON object
    #[error("Invalid variables: {0}")]
    InvalidVariables(String),

    /// The body could not be read or decoded
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// The POST body has a content type we do not understand
    #[error("Unsupported content type '{0}'")]
    UnsupportedContentType(String),

    /// The subscription endpoint was called without a usable `graphql` parameter
    #[error("Invalid subscription request: {0}")]
    InvalidSubscription(String),

    /// The subscription location could not be expressed as a header value
    #[error("Invalid subscription location: {0}")]
    InvalidLocation(String),
}

impl IntoResponse for MalformedRequest {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "errors": [{
                    "message": self.to_string()
                }]
            })),
        )
            .into_response()
    }
}
