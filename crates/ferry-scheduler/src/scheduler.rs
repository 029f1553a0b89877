use crate::binder::Binder;
use crate::filter::is_eligible;
use crate::ledger::PodLedger;
use crate::score::{LoadIndex, NodeSelector};
use crate::types::{CycleReport, PodDisposition};
use crate::{Result, SchedulerError};
use ferry_client::ClusterClient;
use ferry_core::{BindOutcome, PodEvent, PodRef};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the scheduler learns about pods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationMode {
    /// List every pod on a fixed interval
    Polling,
    /// Follow a watch stream and reconnect when it ends
    Streaming,
}

impl fmt::Display for ObservationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationMode::Polling => write!(f, "poll"),
            ObservationMode::Streaming => write!(f, "watch"),
        }
    }
}

impl FromStr for ObservationMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "poll" => Ok(ObservationMode::Polling),
            "watch" => Ok(ObservationMode::Streaming),
            other => Err(SchedulerError::internal_error(format!(
                "unknown observation mode '{}', expected 'poll' or 'watch'",
                other
            ))),
        }
    }
}

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pods must request exactly this scheduler name
    pub scheduler_name: String,
    pub mode: ObservationMode,
    /// Pause between polling cycles
    pub poll_interval: Duration,
    /// Server-side timeout for one watch request
    pub watch_timeout: Duration,
    /// Pause before reopening a watch stream
    pub reconnect_delay: Duration,
    /// Pause before the single inline retry of a transient bind failure
    pub bind_retry_pause: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: "my-scheduler".to_string(),
            mode: ObservationMode::Polling,
            poll_interval: Duration::from_secs(2),
            watch_timeout: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            bind_retry_pause: Duration::from_millis(200),
        }
    }
}

/// Nodes and their load as seen by the current cycle
///
/// Our own successful bindings are added in place. After a conflict the view
/// is marked stale and re-listed before the next pod is placed.
struct ClusterView {
    nodes: Vec<Node>,
    load: LoadIndex,
    stale: bool,
}

impl ClusterView {
    fn from_snapshot(nodes: Vec<Node>, pods: &[Pod]) -> Self {
        let load = LoadIndex::build(&nodes, pods);
        Self {
            nodes,
            load,
            stale: false,
        }
    }

    /// A view that is fetched on first use
    fn unfetched() -> Self {
        Self {
            nodes: Vec::new(),
            load: LoadIndex::default(),
            stale: true,
        }
    }

    async fn fetch(client: &dyn ClusterClient) -> Result<Self> {
        let nodes = client.list_nodes().await?;
        let pods = client.list_pods().await?;
        Ok(Self::from_snapshot(nodes, &pods))
    }
}

/// Pod scheduler
pub struct Scheduler {
    client: Arc<dyn ClusterClient>,
    config: SchedulerConfig,
    selector: NodeSelector,
    binder: Binder,
    ledger: PodLedger,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(client: Arc<dyn ClusterClient>, config: SchedulerConfig) -> Self {
        let binder = Binder::new(client.clone(), config.bind_retry_pause);
        Self {
            client,
            config,
            selector: NodeSelector::new(),
            binder,
            ledger: PodLedger::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Terminal outcomes recorded so far
    pub fn ledger(&self) -> &PodLedger {
        &self.ledger
    }

    /// Run the scheduler until the token is cancelled
    ///
    /// Errors from individual cycles or watch streams are logged and retried,
    /// so this only returns once cancellation is observed.
    pub async fn run(&mut self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting scheduler {} in {} mode",
            self.config.scheduler_name, self.config.mode
        );

        match self.config.mode {
            ObservationMode::Polling => self.run_polling(&token).await,
            ObservationMode::Streaming => self.run_streaming(&token).await,
        }

        info!("Scheduler shutting down");
        Ok(())
    }

    async fn run_polling(&mut self, token: &CancellationToken) {
        while !token.is_cancelled() {
            if let Err(e) = self.schedule_cycle().await {
                error!("Scheduling cycle failed: {}", e);
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Run a single polling cycle
    ///
    /// Lists pods, admits the eligible ones and places them one by one in
    /// list order. A failed list aborts the cycle with an error; a failed
    /// binding only affects its own pod.
    pub async fn schedule_cycle(&mut self) -> Result<CycleReport> {
        debug!("Running scheduling cycle");

        let pods = self.client.list_pods().await?;
        let eligible: Vec<(PodRef, Option<String>)> = pods
            .iter()
            .filter(|pod| is_eligible(pod, &self.config.scheduler_name))
            .filter_map(|pod| match PodRef::from_pod(pod) {
                Ok(pod_ref) => Some((pod_ref, pod.metadata.resource_version.clone())),
                Err(e) => {
                    warn!("Skipping malformed pod: {}", e);
                    None
                }
            })
            .collect();

        let present: BTreeSet<PodRef> = eligible.iter().map(|(r, _)| r.clone()).collect();
        self.ledger.retain(&present);

        let mut report = CycleReport {
            eligible: eligible.len(),
            ..Default::default()
        };

        if eligible.is_empty() {
            debug!("No pending pods for {}", self.config.scheduler_name);
            return Ok(report);
        }

        info!(
            "Found {} pending pod(s) for {}",
            eligible.len(),
            self.config.scheduler_name
        );

        let nodes = self.client.list_nodes().await?;
        let mut view = ClusterView::from_snapshot(nodes, &pods);

        for (pod_ref, resource_version) in eligible {
            if self
                .ledger
                .should_skip(&pod_ref, resource_version.as_deref())
            {
                debug!("Pod {} unchanged since last attempt, skipping", pod_ref);
                report.skipped += 1;
                continue;
            }

            let disposition = self.place(&pod_ref, &mut view).await;
            self.ledger.record(&pod_ref, resource_version, &disposition);
            report.record(&disposition);
        }

        info!(
            eligible = report.eligible,
            bound = report.bound,
            conflicts = report.conflicts,
            retryable = report.retryable,
            unschedulable = report.unschedulable,
            dropped = report.dropped,
            skipped = report.skipped,
            "Scheduling cycle complete"
        );

        Ok(report)
    }

    async fn run_streaming(&mut self, token: &CancellationToken) {
        while !token.is_cancelled() {
            match self.watch_once(token).await {
                Ok(()) => info!("Watch stream ended"),
                Err(e) => error!("Watch stream failed: {}", e),
            }

            if token.is_cancelled() {
                break;
            }

            info!(
                "Restarting watch in {:?}",
                self.config.reconnect_delay
            );
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Consume one watch stream until it ends, fails or the token fires
    async fn watch_once(&mut self, token: &CancellationToken) -> Result<()> {
        let timeout_secs = u32::try_from(self.config.watch_timeout.as_secs()).unwrap_or(u32::MAX);
        let mut stream = self.client.watch_pods(timeout_secs).await?;
        info!("Watching pods for {}", self.config.scheduler_name);

        // Watches start at resourceVersion 0, so a stream that runs to its end
        // has shown every pod that still exists
        let mut seen = BTreeSet::new();

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if event.is_actionable() {
                        if let Ok(pod_ref) = PodRef::from_pod(&event.pod) {
                            seen.insert(pod_ref);
                        }
                    }
                    if let Some(disposition) = self.handle_event(event).await {
                        debug!("Event handled: {}", disposition);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.ledger.retain(&seen);
                    return Ok(());
                }
            }
        }
    }

    /// Process one watch event
    ///
    /// Returns the disposition when the event led to a placement attempt.
    /// Deleted events, malformed pods and pods for other schedulers are
    /// ignored, and any ledger entry for a pod that is no longer eligible is
    /// dropped. Each placement works from a fresh node and pod listing.
    pub async fn handle_event(&mut self, event: PodEvent) -> Option<PodDisposition> {
        let pod_ref = match PodRef::from_pod(&event.pod) {
            Ok(pod_ref) => pod_ref,
            Err(e) => {
                debug!("Ignoring {} event for malformed pod: {}", event.event_type, e);
                return None;
            }
        };

        if !event.is_actionable() {
            debug!("Pod {} deleted", pod_ref);
            self.ledger.forget(&pod_ref);
            return None;
        }

        if !is_eligible(&event.pod, &self.config.scheduler_name) {
            // Assigned pods never become eligible again
            self.ledger.forget(&pod_ref);
            return None;
        }

        let resource_version = event.pod.metadata.resource_version.clone();
        if self
            .ledger
            .should_skip(&pod_ref, resource_version.as_deref())
        {
            debug!("Pod {} unchanged since last attempt, skipping", pod_ref);
            return None;
        }

        info!(
            "[{}] Pending pod {} for {}",
            event.event_type, pod_ref, self.config.scheduler_name
        );

        let mut view = ClusterView::unfetched();
        let disposition = self.place(&pod_ref, &mut view).await;
        self.ledger.record(&pod_ref, resource_version, &disposition);
        Some(disposition)
    }

    /// Choose a node for one pod and bind it
    async fn place(&self, pod_ref: &PodRef, view: &mut ClusterView) -> PodDisposition {
        if view.stale {
            match ClusterView::fetch(self.client.as_ref()).await {
                Ok(fresh) => *view = fresh,
                Err(e) => {
                    warn!("Could not refresh cluster state for {}: {}", pod_ref, e);
                    return PodDisposition::Retryable {
                        reason: e.to_string(),
                    };
                }
            }
        }

        let node = match self.selector.choose(&view.nodes, &view.load) {
            Ok(node) => node,
            Err(SchedulerError::NoNodesAvailable) => {
                warn!("No nodes available for pod {}", pod_ref);
                return PodDisposition::Unschedulable {
                    reason: "no nodes available".to_string(),
                };
            }
            Err(e) => {
                return PodDisposition::Retryable {
                    reason: e.to_string(),
                }
            }
        };

        let load = view.load.count(&node).unwrap_or(0);
        info!(pod = %pod_ref, node = %node, load, "Binding {} -> {}", pod_ref, node);
        let outcome = self.binder.bind(pod_ref, &node).await;
        match outcome {
            BindOutcome::Success => {
                view.load.record_binding(&node);
                info!(pod = %pod_ref, node = %node, outcome = "success", "Bound {} -> {}", pod_ref, node);
                PodDisposition::Bound { node }
            }
            BindOutcome::Conflict => {
                info!(pod = %pod_ref, outcome = "conflict", "Pod {} was already bound by someone else", pod_ref);
                view.stale = true;
                PodDisposition::ConflictObserved
            }
            BindOutcome::TransientError { reason } => {
                warn!(pod = %pod_ref, node = %node, outcome = "transient", "Binding failed, will retry: {}", reason);
                PodDisposition::Retryable { reason }
            }
            BindOutcome::PermanentError { reason } => {
                error!(pod = %pod_ref, node = %node, outcome = "permanent", "Binding rejected: {}", reason);
                PodDisposition::Dropped { reason }
            }
        }
    }
}
