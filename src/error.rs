//! Error types for the context logger

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the context logger
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Session Start Errors
    // =========================================================================
    /// Required request parameter absent
    #[error("Request parameter '{0}' is required")]
    MissingParameter(&'static str),

    /// Preferences blob could not be parsed
    #[error("Invalid preferences: {0}")]
    InvalidPreferences(String),

    // =========================================================================
    // Entry Model Errors
    // =========================================================================
    /// Value type has no registered converter
    #[error("Type '{type_name}' is not supported for conversion")]
    UnsupportedType { type_name: String },

    /// Converter failed to render or reconstruct a value
    #[error("Failed to convert '{value}' to {type_name}: {reason}")]
    Conversion {
        type_name: String,
        value: String,
        reason: String,
    },

    /// Serialized entry carries an unknown discriminator
    #[error("Unknown entry type: {0}")]
    UnknownEntryType(String),

    /// `stop()` called on an elapse time that was never started
    #[error("Elapse time was stopped before it was started")]
    ElapseTimeNotStarted,

    /// `start()` or `stop()` called on an elapse time that already stopped
    #[error("Elapse time already stopped")]
    ElapseTimeAlreadyStopped,

    // =========================================================================
    // Interception Errors
    // =========================================================================
    /// Method name pattern failed to compile
    #[error("Invalid method pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A listener hook reported a failure
    #[error("Listener '{listener}' failed: {reason}")]
    Listener { listener: String, reason: String },

    // =========================================================================
    // Session Control Errors
    // =========================================================================
    /// No session registered under the id
    #[error("Session not found: {0}")]
    SessionNotFound(u64),

    /// Session already reached a terminal state
    #[error("Session {id} already stopped ({state})")]
    SessionAlreadyStopped { id: u64, state: String },

    /// Session did not finish before the deadline
    #[error("Session {id} did not stop within {timeout_ms}ms")]
    StopTimeout { id: u64, timeout_ms: u64 },

    // =========================================================================
    // Query Errors
    // =========================================================================
    /// `unique_result` matched more than one entry
    #[error("Has more than one entries found: {count}")]
    NonUniqueResult { count: usize },
}

impl Error {
    /// Shorthand for [`Error::UnsupportedType`].
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Error::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Shorthand for [`Error::Listener`].
    pub fn listener(listener: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Listener {
            listener: listener.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_type_names_offender() {
        let err = Error::unsupported("my::Opaque");
        assert_eq!(
            err.to_string(),
            "Type 'my::Opaque' is not supported for conversion"
        );
    }

    #[test]
    fn test_missing_parameter_display() {
        let err = Error::MissingParameter("monitoredAddr");
        assert_eq!(
            err.to_string(),
            "Request parameter 'monitoredAddr' is required"
        );
    }

    #[test]
    fn test_non_unique_result_is_distinct_from_not_found() {
        let err = Error::NonUniqueResult { count: 2 };
        assert!(err.to_string().contains("more than one"));
    }
}
