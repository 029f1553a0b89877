use crate::error::{ClientError, Result};
use crate::traits::{ClusterClient, PodEventStream};
use async_trait::async_trait;
use ferry_core::{BindOutcome, PodEvent, PodRef};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Binding, Node, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Resource;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Configuration for reaching the cluster
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explicit kubeconfig path. When unset, the local kubeconfig or the
    /// in-cluster service account is inferred.
    pub kubeconfig: Option<PathBuf>,
    /// Deadline for list and bind requests
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Cluster client backed by a Kubernetes API server
pub struct KubeClusterClient {
    client: kube::Client,
    request_timeout: Duration,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Load credentials and build a client
    ///
    /// This is the only fallible step at startup; everything after it is
    /// retried by the scheduling loop.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let mut kube_config = match &config.kubeconfig {
            Some(path) => {
                info!("Loading kubeconfig from {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ClientError::invalid_config(
                        format!("Failed to read kubeconfig {}: {}", path.display(), e),
                        "Check that the file exists and is a valid kubeconfig",
                    )
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        ClientError::invalid_config(
                            format!("Failed to load kubeconfig {}: {}", path.display(), e),
                            "Check the current context, cluster and user entries",
                        )
                    })?
            }
            None => {
                info!("Inferring cluster configuration");
                kube::Config::infer().await.map_err(|e| {
                    ClientError::invalid_config(
                        format!("Failed to infer cluster configuration: {}", e),
                        "Set KUBECONFIG, pass --kubeconfig, or run inside the cluster with a service account",
                    )
                })?
            }
        };

        kube_config.connect_timeout = Some(config.request_timeout);
        info!("Using API server {}", kube_config.cluster_url);

        let client = kube::Client::try_from(kube_config)?;
        Ok(Self::new(client, config.request_timeout))
    }

    /// Run a request under the configured deadline
    async fn bounded<T, F>(&self, operation: &str, request: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result.map_err(ClientError::from),
            Err(_) => Err(ClientError::timeout(
                operation,
                self.request_timeout.as_secs(),
            )),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        debug!("GET /api/v1/nodes");
        let api: Api<Node> = Api::all(self.client.clone());
        let lp = ListParams::default();
        let list = self.bounded("list nodes", api.list(&lp)).await?;
        Ok(list.items)
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        debug!("GET /api/v1/pods");
        let api: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default();
        let list = self.bounded("list pods", api.list(&lp)).await?;
        Ok(list.items)
    }

    async fn watch_pods(&self, timeout_secs: u32) -> Result<PodEventStream> {
        debug!("GET /api/v1/pods?watch=true&timeoutSeconds={}", timeout_secs);
        let api: Api<Pod> = Api::all(self.client.clone());
        let wp = WatchParams::default().timeout(timeout_secs);
        let open_timeout = self.request_timeout;

        let (opened_tx, opened_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(64);

        // The watch stream borrows its Api, so both live in the forwarding task
        tokio::spawn(async move {
            // resourceVersion=0 replays every existing pod as ADDED first, so a
            // fresh watch also picks up pods left pending by an earlier one.
            let opened = match tokio::time::timeout(open_timeout, api.watch(&wp, "0")).await {
                Ok(result) => result.map_err(ClientError::from),
                Err(_) => Err(ClientError::timeout(
                    "open pod watch",
                    open_timeout.as_secs(),
                )),
            };
            let stream = match opened {
                Ok(stream) => {
                    let _ = opened_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };
            let mut stream = std::pin::pin!(stream);

            loop {
                let item = tokio::select! {
                    _ = tx.closed() => break,
                    item = stream.next() => item,
                };
                let Some(item) = item else {
                    debug!("Pod watch closed by server");
                    break;
                };
                let Some(event) = to_pod_event(item) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        match opened_rx.await {
            Ok(Ok(())) => Ok(ReceiverStream::new(rx).boxed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::internal_error(
                "watch task ended before the watch was opened",
            )),
        }
    }

    async fn bind_pod(&self, pod: &PodRef, node_name: &str) -> BindOutcome {
        let binding = Binding {
            metadata: ObjectMeta {
                name: Some(pod.name.clone()),
                namespace: Some(pod.namespace.clone()),
                ..Default::default()
            },
            target: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some("Node".to_string()),
                name: Some(node_name.to_string()),
                ..Default::default()
            },
        };

        let data = match serde_json::to_vec(&binding) {
            Ok(data) => data,
            Err(e) => return BindOutcome::permanent(format!("Failed to encode binding: {}", e)),
        };

        let url = Pod::url_path(&(), Some(&pod.namespace));
        let request = match kube::core::Request::new(url).create_subresource(
            "binding",
            &pod.name,
            &PostParams::default(),
            data,
        ) {
            Ok(request) => request,
            Err(e) => return BindOutcome::permanent(format!("Failed to build binding request: {}", e)),
        };

        debug!(
            "POST /api/v1/namespaces/{}/pods/{}/binding",
            pod.namespace, pod.name
        );

        // Only the status code decides the outcome; the success body is a
        // Status object, not a Pod, and is never decoded.
        match tokio::time::timeout(self.request_timeout, self.client.request_text(request)).await {
            Ok(Ok(_)) => BindOutcome::Success,
            Ok(Err(kube::Error::Api(ae))) => BindOutcome::from_status(ae.code, ae.message),
            Ok(Err(e)) => BindOutcome::transient(e.to_string()),
            Err(_) => BindOutcome::transient(format!(
                "bind timed out after {}s",
                self.request_timeout.as_secs()
            )),
        }
    }
}

/// Map one raw watch item to a pod event, dropping bookmarks and undecodable objects
fn to_pod_event(item: kube::Result<WatchEvent<Pod>>) -> Option<Result<PodEvent>> {
    match item {
        Ok(WatchEvent::Added(pod)) => Some(Ok(PodEvent::added(pod))),
        Ok(WatchEvent::Modified(pod)) => Some(Ok(PodEvent::modified(pod))),
        Ok(WatchEvent::Deleted(pod)) => Some(Ok(PodEvent::deleted(pod))),
        Ok(WatchEvent::Bookmark(_)) => None,
        Ok(WatchEvent::Error(e)) => Some(Err(ClientError::api(e.code, e.message))),
        Err(kube::Error::SerdeError(e)) => {
            warn!("Skipping malformed watch event: {}", e);
            None
        }
        Err(e) => Some(Err(ClientError::stream_error(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert!(config.kubeconfig.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connect_with_missing_kubeconfig_fails() {
        let config = ClientConfig {
            kubeconfig: Some(PathBuf::from("/nonexistent/ferry/kubeconfig")),
            ..Default::default()
        };

        let result = KubeClusterClient::connect(&config).await;
        assert!(matches!(result, Err(ClientError::InvalidConfig { .. })));
    }

    #[test]
    fn test_watch_events_map_to_pod_events() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web".to_string());

        let added = to_pod_event(Ok(WatchEvent::Added(pod.clone()))).unwrap().unwrap();
        assert!(added.is_actionable());

        let deleted = to_pod_event(Ok(WatchEvent::Deleted(pod))).unwrap().unwrap();
        assert!(!deleted.is_actionable());
    }

    #[test]
    fn test_watch_error_event_keeps_status() {
        let expired = kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        };

        let mapped = to_pod_event(Ok(WatchEvent::Error(expired))).unwrap();
        assert!(matches!(mapped, Err(ClientError::Api { code: 410, .. })));
    }

    #[test]
    fn test_binding_url_targets_subresource() {
        let url = Pod::url_path(&(), Some("web"));
        let request = kube::core::Request::new(url)
            .create_subresource("binding", "nginx", &PostParams::default(), vec![])
            .unwrap();

        assert_eq!(request.method(), "POST");
        assert!(request
            .uri()
            .path()
            .ends_with("/api/v1/namespaces/web/pods/nginx/binding"));
    }
}
