//! Ferry Core - Shared types for the Ferry pod scheduler
//!
//! This crate provides:
//! - Pod addressing (`PodRef`) and phase parsing
//! - Bind outcome classification
//! - Pod change events delivered by the cluster watch
//! - Error types with miette diagnostics

pub mod error;
pub mod events;
pub mod types;

// Re-export commonly used types
pub use error::{FerryError, Result};
pub use events::{PodEvent, WatchEventType};
pub use types::{BindOutcome, PodPhase, PodRef};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
