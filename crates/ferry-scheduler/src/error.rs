// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// The cluster reported no nodes at all
    #[error("No nodes available for scheduling")]
    #[diagnostic(
        code(scheduler::no_nodes_available),
        help("The pod stays pending and is retried on the next cycle. Check that nodes are registered")
    )]
    NoNodesAvailable,

    /// Cluster API error
    #[error("Cluster client error: {0}")]
    #[diagnostic(
        code(scheduler::client_error),
        help("Check connectivity to the API server. The cycle is retried after the normal delay")
    )]
    ClientError(#[from] ferry_client::ClientError),

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("The object received from the cluster is malformed")
    )]
    CoreError(#[from] ferry_core::FerryError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError {
        message: String,
    },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
