//! Error types for Batata
//!
//! This module defines `BatataError`, the application-level error enum shared
//! by the server components.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum BatataError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("{0} protocol failed to start: {1}")]
    ProtocolStartup(String, String),

    #[error("protocol shutdown failed: {}", .0.join("; "))]
    ProtocolShutdown(Vec<String>),
}

/// Result alias using [`BatataError`]
pub type Result<T> = std::result::Result<T, BatataError>;
