use crate::error::Result;
use async_trait::async_trait;
use ferry_core::{BindOutcome, PodEvent, PodRef};
use futures_util::stream::BoxStream;
use k8s_openapi::api::core::v1::{Node, Pod};

/// Stream of pod changes produced by a single watch request
///
/// The stream ends when the server closes the watch; an `Err` item means the
/// watch broke and has to be reopened by the caller.
pub type PodEventStream = BoxStream<'static, Result<PodEvent>>;

/// Trait for the cluster operations the scheduler depends on
///
/// This abstracts over the Kubernetes API server. `KubeClusterClient` talks to
/// a real cluster; `MockCluster` keeps everything in memory for tests.
/// Implementations are shared read-only across the scheduling loop.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List every node in the cluster
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// List every pod across all namespaces
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Open a watch over pods in all namespaces
    ///
    /// The server closes the watch after `timeout_secs`.
    async fn watch_pods(&self, timeout_secs: u32) -> Result<PodEventStream>;

    /// Commit a binding of the pod to the node through the binding subresource
    ///
    /// Never fails: every response, including transport errors, is classified
    /// into a `BindOutcome`.
    async fn bind_pod(&self, pod: &PodRef, node_name: &str) -> BindOutcome;
}
