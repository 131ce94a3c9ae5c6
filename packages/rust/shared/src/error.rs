//! Error types for the outreach pipeline.
//!
//! Library crates use [`OutreachError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::LeadId;

/// Top-level error type for all outreach operations.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An operation was attempted on a lead that is not in the right state.
    /// The lead is left unchanged.
    #[error("lead {lead}: {message}")]
    Precondition { lead: LeadId, message: String },

    /// The recipient is on the opt-out blocklist.
    #[error("{email} is blocked: {reason}")]
    Blocked { email: String, reason: String },

    /// Mail transport failure (send or inbox fetch).
    #[error("transport error: {0}")]
    Transport(String),

    /// AI drafting collaborator failure, scoped to one lead.
    #[error("drafting error: {0}")]
    Drafting(String),

    /// Event-log (spreadsheet) collaborator failure.
    #[error("event log error: {0}")]
    EventLog(String),

    /// Discovery collaborator failure.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Document store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization error, including unknown enum values.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No lead with the given id exists (it may have been removed while
    /// an operation was suspended).
    #[error("lead {0} not found")]
    NotFound(LeadId),

    /// Input validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OutreachError>;

impl OutreachError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a precondition error for `lead`.
    pub fn precondition(lead: &LeadId, msg: impl Into<String>) -> Self {
        Self::Precondition {
            lead: lead.clone(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for OutreachError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = OutreachError::config("missing sender address");
        assert_eq!(err.to_string(), "config error: missing sender address");

        let err = OutreachError::Blocked {
            email: "a@x.com".into(),
            reason: "domain x.com is blocked".into(),
        };
        assert!(err.to_string().contains("a@x.com is blocked"));
    }

    #[test]
    fn precondition_names_the_lead() {
        let id = LeadId::new();
        let err = OutreachError::precondition(&id, "no approved draft");
        assert!(err.to_string().contains(&id.to_string()));
        assert!(matches!(err, OutreachError::Precondition { ref lead, .. } if *lead == id));
    }
}
