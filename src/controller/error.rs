//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

use crate::labels::LabelError;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Label selector with invalid syntax
    #[error("Malformed label selector: {0}")]
    MalformedSelector(#[from] LabelError),

    /// Desired-state ConfigMap whose payload cannot be turned into a cluster
    #[error("Invalid cluster document: {0}")]
    InvalidDocument(String),

    /// Desired-state ConfigMap that an operation needs no longer exists
    #[error("Cluster document {namespace}/{name} not found")]
    MissingDocument { namespace: String, name: String },

    /// Operation exceeded the executor's task timeout
    #[error("Operation {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Operation task panicked or was cancelled
    #[error("Operation task failed: {0}")]
    TaskFailed(String),

    /// Watch could not be established
    #[error("Watch failed: {0}")]
    WatchFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error indicates the object already exists
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if the next reconciliation pass can be expected to succeed
    /// where this attempt failed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Timeout { .. } | Error::TaskFailed(_) | Error::WatchFailed(_) => true,
            Error::MissingDocument { .. } => true,
            Error::MalformedSelector(_) | Error::InvalidDocument(_) => false,
            Error::Serialization(_) => false,
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
