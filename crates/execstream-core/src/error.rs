//! Error taxonomy shared by every procedure.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error class, stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or missing request fields.
    InvalidArgument,
    /// The addressed resource does not exist.
    NotFound,
    /// Persistence, relay or collaborator failure.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error returned by pipeline steps and surfaced verbatim to callers.
///
/// None of these are retried inside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },
    #[error("{message}: {cause}")]
    Internal { message: String, cause: String },
}

impl ApiError {
    /// Build an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Build a `NotFound` error for a resource kind and id.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Build an `Internal` error wrapping a cause.
    #[must_use]
    pub fn internal(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Internal {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    /// The error class.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }
}
