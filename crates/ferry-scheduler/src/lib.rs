//! Ferry Scheduler - Pod to Node placement
//!
//! This crate provides:
//! - Pod admission (unassigned, Pending, matching scheduler name)
//! - Node filtering (Ready condition, with fallback)
//! - Least-loaded node selection
//! - Binding with a single inline retry for transient failures
//! - Polling and watch-driven scheduling loops

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod binder;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod scheduler;
pub mod score;
pub mod types;

// Re-export commonly used types
pub use binder::Binder;
pub use error::{Result, SchedulerError};
pub use filter::{is_eligible, is_node_ready};
pub use ledger::PodLedger;
pub use scheduler::{ObservationMode, Scheduler, SchedulerConfig};
pub use score::{choose, LoadIndex, NodeSelector};
pub use types::{CycleReport, FilterResult, PodDisposition};
