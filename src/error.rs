//! Error types for the Kiln stack orchestrator.
//!
//! Errors are grouped by concern: configuration loading, provisioning
//! backend calls, and waiting on backend transitions. Backend and validation
//! errors display the backend's own text unchanged so operators can match a
//! reported failure against backend-side logs.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Kiln.
#[derive(Debug, Error)]
pub enum KilnError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provisioning backend errors.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Errors raised while waiting on a backend transition.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A named profile could not be resolved.
    #[error("profile not found: {name}")]
    ProfileNotFound {
        /// Name given on the command line.
        name: String,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// The stack template could not be read.
    #[error("Failed to read template {path}: {message}")]
    TemplateUnreadable {
        /// Path to the template.
        path: PathBuf,
        /// Underlying reason.
        message: String,
    },
}

/// Provisioning backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend rejected the template before anything was mutated.
    #[error("{message}")]
    Validation {
        /// Backend message, verbatim.
        message: String,
    },

    /// The target stack does not exist.
    #[error("stack not found: {name}")]
    StackNotFound {
        /// Stack name.
        name: String,
    },

    /// The target stack already exists.
    #[error("stack already exists: {name}")]
    StackExists {
        /// Stack name.
        name: String,
    },

    /// A backend API call failed.
    #[error("{message}")]
    Api {
        /// Backend operation that failed.
        operation: &'static str,
        /// Backend message, verbatim.
        message: String,
    },

    /// The backend client could not be set up.
    #[error("cannot connect to {backend}: {message}")]
    Connect {
        /// Backend kind.
        backend: String,
        /// Why the client could not be set up.
        message: String,
    },

    /// The backend returned a response missing required data.
    #[error("invalid response from {operation}: {message}")]
    InvalidResponse {
        /// Backend operation.
        operation: &'static str,
        /// What was missing.
        message: String,
    },
}

/// Errors raised by wait loops.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The attempt or time bound was exceeded.
    #[error("timed out waiting for {waiting_for} after {attempts} attempts")]
    Timeout {
        /// What was being waited on.
        waiting_for: String,
        /// Number of checks performed.
        attempts: u32,
    },

    /// The backend reached a failed terminal state.
    #[error("{resource} reached failure state {status}: {reason}")]
    FailureState {
        /// Stack or change set that failed.
        resource: String,
        /// Raw backend status.
        status: String,
        /// Backend status reason.
        reason: String,
    },

    /// The invocation was cancelled.
    #[error("cancelled while waiting for {waiting_for}")]
    Cancelled {
        /// What was being waited on.
        waiting_for: String,
    },
}

/// Result type alias for Kiln operations.
pub type Result<T> = std::result::Result<T, KilnError>;

impl KilnError {
    /// Returns true if the error means the target stack or profile is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Backend(BackendError::StackNotFound { .. })
                | Self::Config(ConfigError::ProfileNotFound { .. })
        )
    }

    /// Returns true if this error came from cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Wait(WaitError::Cancelled { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl BackendError {
    /// Creates an API error for the given operation.
    #[must_use]
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }

    /// Creates a validation error with the backend's message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            message: message.into(),
        }
    }
}
