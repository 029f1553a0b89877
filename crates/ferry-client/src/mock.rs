use crate::error::{ClientError, Result};
use crate::traits::{ClusterClient, PodEventStream};
use async_trait::async_trait;
use ferry_core::{BindOutcome, PodEvent, PodRef};
use futures_util::{future, stream, StreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::debug;

/// Item on the mock watch feed
#[derive(Debug, Clone)]
enum FeedItem {
    Event(PodEvent),
    Fail(String),
    Disconnect,
}

/// In-memory cluster state for MockCluster
#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<Node>,
    pods: BTreeMap<PodRef, Pod>,
    next_version: u64,
    scripted_binds: VecDeque<BindOutcome>,
    list_failures: u32,
    bind_log: Vec<(PodRef, String)>,
}

impl MockState {
    fn bump_version(&mut self, pod: &mut Pod) {
        self.next_version += 1;
        pod.metadata.resource_version = Some(self.next_version.to_string());
    }

    fn take_list_failure(&mut self) -> Result<()> {
        if self.list_failures > 0 {
            self.list_failures -= 1;
            return Err(ClientError::connection_failed("mock: injected list failure"));
        }
        Ok(())
    }
}

/// Mock cluster for tests and local runs
///
/// Keeps nodes and pods in memory, enforces the single-binding rule the way
/// the API server does (409 on an assigned pod, 404 on a missing one), and
/// publishes pod changes to every open watch. Bind outcomes, list failures and
/// watch disconnects can be scripted.
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
    feed: broadcast::Sender<FeedItem>,
}

impl MockCluster {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(1024);
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            feed,
        }
    }

    /// Register a node
    pub async fn add_node(&self, node: Node) {
        let mut state = self.state.write().await;
        debug!("Mock: node added: {:?}", node.metadata.name);
        state.nodes.push(node);
    }

    /// Create a pod and publish an ADDED event
    ///
    /// Pods without a namespace are placed in "default".
    pub async fn add_pod(&self, mut pod: Pod) -> PodRef {
        if pod.metadata.namespace.is_none() {
            pod.metadata.namespace = Some("default".to_string());
        }
        let pod_ref = PodRef::new(
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );

        let mut state = self.state.write().await;
        state.bump_version(&mut pod);
        state.pods.insert(pod_ref.clone(), pod.clone());
        debug!("Mock: pod added: {}", pod_ref);
        self.publish(FeedItem::Event(PodEvent::added(pod)));
        pod_ref
    }

    /// Change a stored pod and publish a MODIFIED event
    pub async fn update_pod(
        &self,
        pod_ref: &PodRef,
        change: impl FnOnce(&mut Pod) + Send,
    ) -> Option<Pod> {
        let mut state = self.state.write().await;
        let mut pod = state.pods.get(pod_ref).cloned()?;
        change(&mut pod);
        state.bump_version(&mut pod);
        state.pods.insert(pod_ref.clone(), pod.clone());
        debug!("Mock: pod updated: {}", pod_ref);
        self.publish(FeedItem::Event(PodEvent::modified(pod.clone())));
        Some(pod)
    }

    /// Delete a pod and publish a DELETED event
    pub async fn remove_pod(&self, pod_ref: &PodRef) -> Option<Pod> {
        let mut state = self.state.write().await;
        let pod = state.pods.remove(pod_ref)?;
        debug!("Mock: pod deleted: {}", pod_ref);
        self.publish(FeedItem::Event(PodEvent::deleted(pod.clone())));
        Some(pod)
    }

    /// Publish a raw event without touching the stored state
    pub fn publish_event(&self, event: PodEvent) {
        self.publish(FeedItem::Event(event));
    }

    /// Current state of a pod
    pub async fn pod(&self, pod_ref: &PodRef) -> Option<Pod> {
        self.state.read().await.pods.get(pod_ref).cloned()
    }

    /// Node a pod is assigned to, if any
    pub async fn assigned_node(&self, pod_ref: &PodRef) -> Option<String> {
        self.pod(pod_ref)
            .await
            .and_then(|p| p.spec)
            .and_then(|s| s.node_name)
    }

    /// Queue outcomes returned by the next bind calls, in order
    ///
    /// A scripted `Success` is applied to the stored pod like a real bind.
    pub async fn script_bind_outcomes(&self, outcomes: impl IntoIterator<Item = BindOutcome>) {
        self.state.write().await.scripted_binds.extend(outcomes);
    }

    /// Make the next `count` list calls fail with a connection error
    pub async fn fail_next_lists(&self, count: u32) {
        self.state.write().await.list_failures = count;
    }

    /// Every bind request received so far, in order
    pub async fn bind_requests(&self) -> Vec<(PodRef, String)> {
        self.state.read().await.bind_log.clone()
    }

    /// End every open watch stream cleanly
    pub fn disconnect_watchers(&self) {
        self.publish(FeedItem::Disconnect);
    }

    /// Deliver an error to every open watch stream
    pub fn break_watchers(&self, message: impl Into<String>) {
        self.publish(FeedItem::Fail(message.into()));
    }

    /// Number of watch streams currently subscribed
    pub fn watcher_count(&self) -> usize {
        self.feed.receiver_count()
    }

    fn publish(&self, item: FeedItem) {
        // No receivers just means nobody is watching
        let _ = self.feed.send(item);
    }

    fn apply_binding(&self, state: &mut MockState, pod_ref: &PodRef, node_name: &str) {
        let Some(mut pod) = state.pods.get(pod_ref).cloned() else {
            return;
        };
        pod.spec.get_or_insert_with(Default::default).node_name = Some(node_name.to_string());
        state.bump_version(&mut pod);
        state.pods.insert(pod_ref.clone(), pod.clone());
        debug!("Mock: pod {} bound to {}", pod_ref, node_name);
        self.publish(FeedItem::Event(PodEvent::modified(pod)));
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let mut state = self.state.write().await;
        state.take_list_failure()?;
        Ok(state.nodes.clone())
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let mut state = self.state.write().await;
        state.take_list_failure()?;
        Ok(state.pods.values().cloned().collect())
    }

    async fn watch_pods(&self, _timeout_secs: u32) -> Result<PodEventStream> {
        // Subscribe before the snapshot so no change falls between the two
        let rx = self.feed.subscribe();
        let existing: Vec<Result<PodEvent>> = {
            let state = self.state.read().await;
            state
                .pods
                .values()
                .cloned()
                .map(|pod| Ok(PodEvent::added(pod)))
                .collect()
        };

        let live = BroadcastStream::new(rx)
            .take_while(|item| future::ready(!matches!(item, Ok(FeedItem::Disconnect))))
            .filter_map(|item| async move {
                match item {
                    Ok(FeedItem::Event(event)) => Some(Ok(event)),
                    Ok(FeedItem::Fail(message)) => Some(Err(ClientError::stream_error(message))),
                    Ok(FeedItem::Disconnect) => None,
                    Err(BroadcastStreamRecvError::Lagged(n)) => Some(Err(
                        ClientError::stream_error(format!("watch lagged by {} events", n)),
                    )),
                }
            });

        Ok(stream::iter(existing).chain(live).boxed())
    }

    async fn bind_pod(&self, pod: &PodRef, node_name: &str) -> BindOutcome {
        let mut state = self.state.write().await;
        state.bind_log.push((pod.clone(), node_name.to_string()));

        if let Some(outcome) = state.scripted_binds.pop_front() {
            debug!("Mock: scripted bind outcome for {}: {}", pod, outcome);
            if outcome.is_success() {
                self.apply_binding(&mut state, pod, node_name);
            }
            return outcome;
        }

        let assigned = match state.pods.get(pod) {
            Some(current) => current.spec.as_ref().and_then(|s| s.node_name.clone()),
            None => {
                return BindOutcome::from_status(404, format!("pods \"{}\" not found", pod.name))
            }
        };

        if let Some(existing) = assigned {
            return BindOutcome::from_status(
                409,
                format!("pod {} is already assigned to node \"{}\"", pod, existing),
            );
        }

        self.apply_binding(&mut state, pod, node_name);
        BindOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::WatchEventType;
    use k8s_openapi::api::core::v1::PodSpec;

    fn make_test_pod(name: &str, namespace: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(namespace.to_string());
        pod.spec = Some(PodSpec {
            scheduler_name: Some("my-scheduler".to_string()),
            ..Default::default()
        });
        pod
    }

    #[tokio::test]
    async fn test_bind_assigns_node_once() {
        let cluster = MockCluster::new();
        let pod_ref = cluster.add_pod(make_test_pod("web", "default")).await;

        assert_eq!(cluster.bind_pod(&pod_ref, "node-a").await, BindOutcome::Success);
        assert_eq!(cluster.assigned_node(&pod_ref).await.as_deref(), Some("node-a"));

        // A second bind is rejected the way the API server rejects it
        assert_eq!(cluster.bind_pod(&pod_ref, "node-b").await, BindOutcome::Conflict);
        assert_eq!(cluster.assigned_node(&pod_ref).await.as_deref(), Some("node-a"));
        assert_eq!(cluster.bind_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_bind_missing_pod_is_permanent() {
        let cluster = MockCluster::new();
        let outcome = cluster
            .bind_pod(&PodRef::new("default", "ghost"), "node-a")
            .await;
        assert!(matches!(outcome, BindOutcome::PermanentError { .. }));
    }

    #[tokio::test]
    async fn test_scripted_outcomes_are_consumed_in_order() {
        let cluster = MockCluster::new();
        let pod_ref = cluster.add_pod(make_test_pod("web", "default")).await;
        cluster
            .script_bind_outcomes([BindOutcome::transient("HTTP 503"), BindOutcome::Success])
            .await;

        assert!(cluster.bind_pod(&pod_ref, "node-a").await.is_transient());
        assert!(cluster.assigned_node(&pod_ref).await.is_none());
        assert!(cluster.bind_pod(&pod_ref, "node-a").await.is_success());
        assert_eq!(cluster.assigned_node(&pod_ref).await.as_deref(), Some("node-a"));
    }

    #[tokio::test]
    async fn test_injected_list_failures() {
        let cluster = MockCluster::new();
        cluster.fail_next_lists(1).await;

        assert!(matches!(
            cluster.list_pods().await,
            Err(ClientError::ConnectionFailed { .. })
        ));
        assert!(cluster.list_pods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_replays_existing_then_streams_changes() {
        let cluster = MockCluster::new();
        let first = cluster.add_pod(make_test_pod("first", "default")).await;

        let mut stream = cluster.watch_pods(60).await.unwrap();
        let replayed = stream.next().await.unwrap().unwrap();
        assert_eq!(replayed.event_type, WatchEventType::Added);
        assert_eq!(PodRef::from_pod(&replayed.pod).unwrap(), first);

        cluster.bind_pod(&first, "node-a").await;
        let modified = stream.next().await.unwrap().unwrap();
        assert_eq!(modified.event_type, WatchEventType::Modified);

        cluster.disconnect_watchers();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_break_watchers_delivers_error() {
        let cluster = MockCluster::new();
        let mut stream = cluster.watch_pods(60).await.unwrap();
        assert_eq!(cluster.watcher_count(), 1);

        cluster.break_watchers("connection reset");
        assert!(matches!(
            stream.next().await,
            Some(Err(ClientError::StreamError { .. }))
        ));

        drop(stream);
        assert_eq!(cluster.watcher_count(), 0);
    }
}
