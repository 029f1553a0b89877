//! Ferry Client - Cluster access for the Ferry scheduler
//!
//! The scheduler only sees the `ClusterClient` trait. `KubeClusterClient`
//! implements it against a Kubernetes API server, `MockCluster` in memory.

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod error;
pub mod kube_client;
pub mod mock;
pub mod traits;

// Re-export primary types
pub use error::{ClientError, Result};
pub use kube_client::{ClientConfig, KubeClusterClient};
pub use mock::MockCluster;
pub use traits::{ClusterClient, PodEventStream};
