//! Error types for fitlink.

use crate::flows::normalize::ValidationReport;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence-layer errors.
///
/// `Unavailable` is the retryable "could not check" case; callers must never
/// collapse it into not-found.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging-gateway errors. Delivery failures trigger the per-domain
/// fallback policy in the send controller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Delivery to {to} failed: {reason}")]
    DeliveryFailed { to: String, reason: String },

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Flow orchestration errors returned to webhook callers as structured
/// results, never thrown past component boundaries.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The completion callback carried no `flow_token` field.
    #[error("Completion payload is missing a flow token")]
    MissingToken,

    /// The token does not exist, was already consumed, or has expired.
    /// Terminal for that token; the user must restart the flow.
    #[error("Flow token is invalid or expired")]
    InvalidOrExpiredToken,

    /// A flow-type tag outside the closed enumeration. Indicates a stale
    /// client or corrupted token row. Logged loudly, never swallowed.
    #[error("Unknown flow type: {0}")]
    UnknownFlowType(String),

    /// Field-level validation failures; user-recoverable.
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Malformed completion payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
