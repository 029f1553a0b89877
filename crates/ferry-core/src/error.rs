// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Ferry object handling
#[derive(Error, Debug, Diagnostic)]
pub enum FerryError {
    /// A required field is missing from an object received from the cluster
    #[error("{kind} is missing required field {field}")]
    #[diagnostic(
        code(ferry::missing_field),
        help("The object is malformed or was truncated in transit. It will be ignored")
    )]
    MissingField {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        field: String,
    },

    /// Unrecognized pod phase
    #[error("Invalid pod phase: {phase}")]
    #[diagnostic(
        code(ferry::invalid_phase),
        help("Valid phases are Pending, Running, Succeeded, Failed and Unknown")
    )]
    InvalidPhase {
        #[allow(unused)]
        phase: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(ferry::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type for Ferry core operations
pub type Result<T> = std::result::Result<T, FerryError>;

impl FerryError {
    /// Create a MissingField error
    pub fn missing_field(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            kind: kind.into(),
            field: field.into(),
        }
    }

    /// Create an InvalidPhase error
    pub fn invalid_phase(phase: impl Into<String>) -> Self {
        Self::InvalidPhase {
            phase: phase.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
