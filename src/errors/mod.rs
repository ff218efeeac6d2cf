//! # Error Handling
//!
//! Crate-wide error type for the meridian control plane.
//!
//! Every failure carries a retry classification. Validators and processors only
//! report errors; reconcilers decide whether to requeue by asking
//! [`Error::retry_after`]. Several independent faults found in one pass are
//! collected into an [`ErrorAggregate`].

pub mod retryable;

use std::time::Duration;

pub use retryable::{ErrorAggregate, CONFLICT_BACKOFF, REFERENCE_BACKOFF, STORE_BACKOFF};

/// Custom result type for meridian operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the meridian control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A resource spec violates a supported-field constraint. Never retried.
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// A resource refers to a peer that does not exist or is not admitted yet.
    #[error("{kind} {name}: {message}")]
    Reference { kind: String, name: String, message: String, after: Duration },

    /// Object was not found in the store
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Optimistic concurrency failure against the object store
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient object store failure
    #[error("Object store error: {message}")]
    Store { message: String, after: Duration },

    /// Several independent faults reported at once
    #[error(transparent)]
    Aggregate(#[from] ErrorAggregate),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal invariant violations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new structural validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error tied to a specific field path
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a reference error with the default reference backoff
    pub fn reference<K, N, M>(kind: K, name: N, message: M) -> Self
    where
        K: Into<String>,
        N: Into<String>,
        M: Into<String>,
    {
        Self::Reference {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
            after: REFERENCE_BACKOFF,
        }
    }

    /// Create a not found error
    pub fn not_found<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        Self::NotFound { kind: kind.into(), name: name.into() }
    }

    /// Create a new conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a transient store error with the default store backoff
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store { message: message.into(), after: STORE_BACKOFF }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Backoff before the failed operation should be attempted again.
    ///
    /// `None` means the error is terminal for this cycle.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Reference { after, .. } | Self::Store { after, .. } => Some(*after),
            Self::Conflict(_) => Some(CONFLICT_BACKOFF),
            Self::Aggregate(aggregate) => aggregate.after(),
            _ => None,
        }
    }

    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        self.retry_after().is_some()
    }

    /// NotFound from the store means there is nothing left to converge.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Human readable reason suitable for a status condition
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Invalid",
            Self::Reference { .. } => "ReferenceNotFound",
            Self::NotFound { .. } => "NotFound",
            Self::Aggregate(aggregate) if aggregate.is_retryable() => "ReferenceNotFound",
            Self::Aggregate(_) => "Invalid",
            _ => "Error",
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_error = Error::config("Invalid configuration");
        assert!(matches!(config_error, Error::Config(_)));

        let validation_error = Error::validation_field("duplicate port 80", "spec.listeners");
        assert!(
            matches!(validation_error, Error::Validation { field: Some(ref f), .. } if f == "spec.listeners")
        );

        let reference_error = Error::reference("Service", "default/echo", "not found");
        assert!(matches!(reference_error, Error::Reference { .. }));
    }

    #[test]
    fn test_retry_classification() {
        assert!(Error::reference("GatewayClass", "contour", "not admitted").is_retryable());
        assert!(Error::store("connection reset").is_retryable());
        assert!(Error::conflict("stale resource version").is_retryable());
        assert!(!Error::validation("unsupported path type").is_retryable());
        assert!(!Error::internal("bad state").is_retryable());
        assert!(!Error::not_found("Gateway", "default/gw").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = Error::not_found("Service", "default/echo");
        assert_eq!(error.to_string(), "Service default/echo not found");

        let error = Error::reference("Service", "default/echo", "service does not exist");
        assert_eq!(error.to_string(), "Service default/echo: service does not exist");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(Error::not_found("Envoy", "projectcontour/envoy").is_not_found());
        assert!(!Error::store("timeout").is_not_found());
    }
}
