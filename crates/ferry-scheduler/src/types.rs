use std::fmt;

/// Result of filtering a node
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Node name
    pub node_name: String,
    /// Whether the node passed the filter
    pub passed: bool,
    /// Reason for failure (if any)
    pub reason: Option<String>,
}

impl FilterResult {
    /// Create a passing filter result
    pub fn pass(node_name: String) -> Self {
        Self {
            node_name,
            passed: true,
            reason: None,
        }
    }

    /// Create a failing filter result
    pub fn fail(node_name: String, reason: String) -> Self {
        Self {
            node_name,
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Where a pod ended up after one scheduling attempt
///
/// `Bound`, `ConflictObserved` and `Dropped` are terminal for the pod as
/// long as it does not change upstream. `Retryable` and `Unschedulable` pods
/// are attempted again on the next observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodDisposition {
    /// Our binding was accepted
    Bound { node: String },
    /// Someone else bound the pod first
    ConflictObserved,
    /// Transient failure, try again next cycle
    Retryable { reason: String },
    /// No node to pick from, try again next cycle
    Unschedulable { reason: String },
    /// Permanent rejection, not retried automatically
    Dropped { reason: String },
}

impl PodDisposition {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PodDisposition::Bound { .. }
                | PodDisposition::ConflictObserved
                | PodDisposition::Dropped { .. }
        )
    }
}

impl fmt::Display for PodDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodDisposition::Bound { node } => write!(f, "bound to {}", node),
            PodDisposition::ConflictObserved => write!(f, "already bound elsewhere"),
            PodDisposition::Retryable { reason } => write!(f, "retryable: {}", reason),
            PodDisposition::Unschedulable { reason } => write!(f, "unschedulable: {}", reason),
            PodDisposition::Dropped { reason } => write!(f, "dropped: {}", reason),
        }
    }
}

/// Tally of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pods that passed admission
    pub eligible: usize,
    pub bound: usize,
    pub conflicts: usize,
    pub retryable: usize,
    pub unschedulable: usize,
    pub dropped: usize,
    /// Eligible pods skipped because they already reached a terminal state
    pub skipped: usize,
}

impl CycleReport {
    /// Count a pod's disposition
    pub fn record(&mut self, disposition: &PodDisposition) {
        match disposition {
            PodDisposition::Bound { .. } => self.bound += 1,
            PodDisposition::ConflictObserved => self.conflicts += 1,
            PodDisposition::Retryable { .. } => self.retryable += 1,
            PodDisposition::Unschedulable { .. } => self.unschedulable += 1,
            PodDisposition::Dropped { .. } => self.dropped += 1,
        }
    }
}
