//! Error types for the consistency layer

use crate::protocol::ProtocolKind;

/// Errors raised while configuring, driving or tearing down a protocol
#[derive(thiserror::Error, Debug)]
pub enum ConsistencyError {
    #[error("no config registered for type {0}")]
    ConfigNotFound(&'static str),

    #[error("config type mismatch: expected {expected}, got {actual}")]
    ConfigTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("member {0} has no valid raft port")]
    MissingRaftPort(String),

    #[error("{kind} protocol init failed: {reason}")]
    InitFailed { kind: ProtocolKind, reason: String },

    #[error("{kind} protocol member change failed: {reason}")]
    MemberChangeFailed { kind: ProtocolKind, reason: String },

    #[error("{kind} protocol shutdown failed: {reason}")]
    ShutdownFailed { kind: ProtocolKind, reason: String },

    #[error("executor '{0}' is closed")]
    ExecutorClosed(String),

    #[error("{0} protocol is not initialized")]
    NotInitialized(ProtocolKind),

    #[error("{0} protocol has been shut down")]
    AlreadyShutdown(ProtocolKind),

    #[error("no log processor registered for group '{0}'")]
    ProcessorNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias using [`ConsistencyError`]
pub type Result<T> = std::result::Result<T, ConsistencyError>;
