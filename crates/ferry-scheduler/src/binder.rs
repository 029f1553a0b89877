use ferry_client::ClusterClient;
use ferry_core::{BindOutcome, PodRef};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Issues binding requests and retries transient failures once
pub struct Binder {
    client: Arc<dyn ClusterClient>,
    retry_pause: Duration,
}

impl Binder {
    pub fn new(client: Arc<dyn ClusterClient>, retry_pause: Duration) -> Self {
        Self {
            client,
            retry_pause,
        }
    }

    /// Bind a pod to a node
    ///
    /// A transient failure gets exactly one more attempt after `retry_pause`.
    /// Whatever that attempt returns is final for this cycle.
    pub async fn bind(&self, pod: &PodRef, node_name: &str) -> BindOutcome {
        debug!("Sending binding {} -> {}", pod, node_name);
        let outcome = self.client.bind_pod(pod, node_name).await;
        if !outcome.is_transient() {
            return outcome;
        }

        warn!(
            "Binding {} -> {} failed ({}), retrying once in {:?}",
            pod, node_name, outcome, self.retry_pause
        );
        tokio::time::sleep(self.retry_pause).await;
        self.client.bind_pod(pod, node_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_client::MockCluster;
    use k8s_openapi::api::core::v1::{Pod, PodSpec};

    async fn setup() -> (MockCluster, Binder, PodRef) {
        let cluster = MockCluster::new();
        let mut pod = Pod::default();
        pod.metadata.name = Some("web".to_string());
        pod.spec = Some(PodSpec::default());
        let pod_ref = cluster.add_pod(pod).await;

        let binder = Binder::new(Arc::new(cluster.clone()), Duration::from_millis(200));
        (cluster, binder, pod_ref)
    }

    #[tokio::test]
    async fn test_bind_success_single_request() {
        let (cluster, binder, pod_ref) = setup().await;

        assert_eq!(binder.bind(&pod_ref, "node-a").await, BindOutcome::Success);
        assert_eq!(cluster.bind_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let (cluster, binder, pod_ref) = setup().await;
        cluster.script_bind_outcomes([BindOutcome::Conflict]).await;

        assert_eq!(binder.bind(&pod_ref, "node-a").await, BindOutcome::Conflict);
        assert_eq!(cluster.bind_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_is_not_retried() {
        let (cluster, binder, pod_ref) = setup().await;
        cluster
            .script_bind_outcomes([BindOutcome::permanent("HTTP 422: invalid")])
            .await;

        assert!(matches!(
            binder.bind(&pod_ref, "node-a").await,
            BindOutcome::PermanentError { .. }
        ));
        assert_eq!(cluster.bind_requests().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_once_then_succeeds() {
        let (cluster, binder, pod_ref) = setup().await;
        cluster
            .script_bind_outcomes([BindOutcome::transient("HTTP 503: unavailable")])
            .await;

        assert_eq!(binder.bind(&pod_ref, "node-a").await, BindOutcome::Success);
        assert_eq!(cluster.bind_requests().await.len(), 2);
        assert_eq!(cluster.assigned_node(&pod_ref).await.as_deref(), Some("node-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_at_most_once() {
        let (cluster, binder, pod_ref) = setup().await;
        cluster
            .script_bind_outcomes([
                BindOutcome::transient("HTTP 503"),
                BindOutcome::transient("HTTP 504"),
                BindOutcome::Success,
            ])
            .await;

        let outcome = binder.bind(&pod_ref, "node-a").await;
        assert_eq!(outcome, BindOutcome::transient("HTTP 504"));
        assert_eq!(cluster.bind_requests().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_lost_success_reports_conflict() {
        // The first request went through but the response was lost
        let (cluster, binder, pod_ref) = setup().await;
        cluster.bind_pod(&pod_ref, "node-a").await;
        cluster
            .script_bind_outcomes([BindOutcome::transient("timed out")])
            .await;

        assert_eq!(binder.bind(&pod_ref, "node-a").await, BindOutcome::Conflict);
    }
}
