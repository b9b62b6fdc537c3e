//! Error taxonomy for postflow
//!
//! Only poll failures are retried internally (by the tracker). Every other kind
//! reaches the caller with its kind, a message and, where one exists, a numeric
//! wait hint.

use crate::publish::PublishReadiness;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category, for callers that branch on kind only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Submission,
    Poll,
    ReadinessBlocked,
    RateLimitExceeded,
    ConcurrentOperation,
    Publish,
    NotFound,
    InvalidState,
    Storage,
}

#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// Bad input, rejected before any request is sent
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Workflow creation request failed
    #[error("workflow submission failed: {message}")]
    Submission { message: String },

    /// Status fetch failed (retried by the tracker, never surfaced per occurrence)
    #[error("status poll for '{id}' failed: {message}")]
    Poll { id: String, message: String },

    /// Content violates platform constraints
    #[error("content is not ready to publish: {}", .readiness.blocking_summary())]
    ReadinessBlocked { readiness: PublishReadiness },

    /// Local interval or remote rate limit in effect
    #[error("rate limited: {message}")]
    RateLimitExceeded {
        retry_after: Option<u64>,
        message: String,
    },

    /// A publish attempt is already running on this executor
    #[error("a publish attempt is already in progress")]
    ConcurrentOperation,

    /// Publish failed for a reason other than rate limiting
    #[error("publish failed: {message}")]
    Publish { message: String, retryable: bool },

    #[error("execution '{id}' not found")]
    NotFound { id: String },

    #[error("cannot {action} while {state}")]
    InvalidState { action: String, state: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
        }
    }

    pub fn poll(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Poll {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Validation { .. } => ErrorKind::Validation,
            FlowError::Submission { .. } => ErrorKind::Submission,
            FlowError::Poll { .. } => ErrorKind::Poll,
            FlowError::ReadinessBlocked { .. } => ErrorKind::ReadinessBlocked,
            FlowError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            FlowError::ConcurrentOperation => ErrorKind::ConcurrentOperation,
            FlowError::Publish { .. } => ErrorKind::Publish,
            FlowError::NotFound { .. } => ErrorKind::NotFound,
            FlowError::InvalidState { .. } => ErrorKind::InvalidState,
            FlowError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Seconds to wait before retrying, when known
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            FlowError::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the same request may succeed later without caller changes
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Poll { .. }
            | FlowError::RateLimitExceeded { .. }
            | FlowError::ConcurrentOperation => true,
            FlowError::Publish { retryable, .. } => *retryable,
            FlowError::Validation { .. }
            | FlowError::Submission { .. }
            | FlowError::ReadinessBlocked { .. }
            | FlowError::NotFound { .. }
            | FlowError::InvalidState { .. }
            | FlowError::Storage { .. } => false,
        }
    }
}

impl From<rusqlite::Error> for FlowError {
    fn from(err: rusqlite::Error) -> Self {
        FlowError::storage(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::storage(format!("payload encoding: {}", err))
    }
}
