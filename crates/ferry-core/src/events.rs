use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Watch event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEventType::Added => write!(f, "ADDED"),
            WatchEventType::Modified => write!(f, "MODIFIED"),
            WatchEventType::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A pod change delivered by the cluster watch
#[derive(Debug, Clone)]
pub struct PodEvent {
    /// Type of watch event (ADDED, MODIFIED, DELETED)
    pub event_type: WatchEventType,
    /// The pod as it was at the time of the event
    pub pod: Pod,
}

impl PodEvent {
    /// Create an ADDED event
    pub fn added(pod: Pod) -> Self {
        Self {
            event_type: WatchEventType::Added,
            pod,
        }
    }

    /// Create a MODIFIED event
    pub fn modified(pod: Pod) -> Self {
        Self {
            event_type: WatchEventType::Modified,
            pod,
        }
    }

    /// Create a DELETED event
    pub fn deleted(pod: Pod) -> Self {
        Self {
            event_type: WatchEventType::Deleted,
            pod,
        }
    }

    /// Whether the event can lead to a scheduling decision
    pub fn is_actionable(&self) -> bool {
        matches!(
            self.event_type,
            WatchEventType::Added | WatchEventType::Modified
        )
    }
}
