//! Normalized error types for the federation engine
//!
//! Every driver-native failure is mapped into these unified types so callers
//! see one taxonomy regardless of which backend produced the error. Errors
//! are returned as values and never logged-and-swallowed inside the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::types::BackendKind;

/// A native backend failure, classified by cause.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum BackendFailure {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Which leg of a cross-backend join an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinSide {
    Left,
    Right,
}

impl std::fmt::Display for JoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// Unified error type for all federation operations.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum FederationError {
    /// The requested backend id has no registered descriptor, or its
    /// configuration is invalid. Never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A destructive operation was attempted without explicit opt-in.
    /// The backend is never reached; no side effects occur.
    #[error("safety violation: {message}")]
    SafetyViolation { message: String },

    /// A native backend failure, with the backend id and kind attached
    /// for diagnostics. Retry policy is a caller concern.
    #[error("backend '{backend_id}' ({kind}): {failure}")]
    BackendExecution {
        backend_id: String,
        kind: BackendKind,
        #[source]
        failure: BackendFailure,
    },

    /// A cross-backend join failed: one leg errored, or the join keys were
    /// structurally invalid for the fetched row sets.
    #[error("join failed: {message}")]
    Join {
        message: String,
        #[source]
        cause: Option<Box<FederationError>>,
    },
}

impl FederationError {
    pub fn not_configured(backend_id: impl AsRef<str>) -> Self {
        Self::Configuration {
            message: format!("backend not configured: {}", backend_id.as_ref()),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn destructive_not_allowed() -> Self {
        Self::SafetyViolation {
            message: "destructive operation requires explicit opt-in".to_string(),
        }
    }

    pub fn backend(backend_id: impl Into<String>, kind: BackendKind, failure: BackendFailure) -> Self {
        Self::BackendExecution {
            backend_id: backend_id.into(),
            kind,
            failure,
        }
    }

    pub fn join_side(side: JoinSide, cause: FederationError) -> Self {
        Self::Join {
            message: format!("{side} sub-query failed: {cause}"),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn join_invalid_keys(message: impl Into<String>) -> Self {
        Self::Join {
            message: message.into(),
            cause: None,
        }
    }

    /// True for errors the classifier/gate produced before any backend call.
    pub fn is_safety_violation(&self) -> bool {
        matches!(self, Self::SafetyViolation { .. })
    }
}

/// Result type alias for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
