use crate::types::PodDisposition;
use ferry_core::PodRef;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct LedgerEntry {
    resource_version: Option<String>,
    disposition: PodDisposition,
}

/// Terminal outcomes per pod, keyed by the resourceVersion they were seen at
///
/// A pod is skipped while the cluster still shows it at the version we
/// recorded. Any change upstream produces a new version and re-admits it.
/// Non-terminal outcomes are not kept.
#[derive(Debug, Default)]
pub struct PodLedger {
    entries: BTreeMap<PodRef, LedgerEntry>,
}

impl PodLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pod at this version already reached a terminal state
    pub fn should_skip(&self, pod: &PodRef, resource_version: Option<&str>) -> bool {
        self.entries.get(pod).is_some_and(|entry| {
            resource_version.is_some() && entry.resource_version.as_deref() == resource_version
        })
    }

    /// Record the outcome of an attempt
    pub fn record(
        &mut self,
        pod: &PodRef,
        resource_version: Option<String>,
        disposition: &PodDisposition,
    ) {
        if disposition.is_terminal() {
            self.entries.insert(
                pod.clone(),
                LedgerEntry {
                    resource_version,
                    disposition: disposition.clone(),
                },
            );
        } else {
            self.entries.remove(pod);
        }
    }

    /// Last terminal disposition recorded for a pod
    pub fn disposition(&self, pod: &PodRef) -> Option<&PodDisposition> {
        self.entries.get(pod).map(|entry| &entry.disposition)
    }

    /// Drop entries for pods no longer in `present`
    pub fn retain(&mut self, present: &BTreeSet<PodRef>) {
        self.entries.retain(|pod, _| present.contains(pod));
    }

    pub fn forget(&mut self, pod: &PodRef) {
        self.entries.remove(pod);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dropped() -> PodDisposition {
        PodDisposition::Dropped {
            reason: "HTTP 422: invalid".to_string(),
        }
    }

    #[test]
    fn test_skip_same_version_only() {
        let mut ledger = PodLedger::new();
        let pod = PodRef::new("default", "web");
        ledger.record(&pod, Some("7".to_string()), &dropped());

        assert!(ledger.should_skip(&pod, Some("7")));
        assert!(!ledger.should_skip(&pod, Some("8")));
        assert!(!ledger.should_skip(&PodRef::new("other", "web"), Some("7")));
    }

    #[test]
    fn test_missing_version_never_skips() {
        let mut ledger = PodLedger::new();
        let pod = PodRef::new("default", "web");
        ledger.record(&pod, None, &dropped());

        assert!(!ledger.should_skip(&pod, None));
    }

    #[test]
    fn test_non_terminal_clears_entry() {
        let mut ledger = PodLedger::new();
        let pod = PodRef::new("default", "web");
        ledger.record(&pod, Some("3".to_string()), &PodDisposition::ConflictObserved);
        assert_eq!(ledger.disposition(&pod), Some(&PodDisposition::ConflictObserved));

        ledger.record(
            &pod,
            Some("3".to_string()),
            &PodDisposition::Retryable {
                reason: "HTTP 503".to_string(),
            },
        );
        assert!(ledger.is_empty());
        assert!(!ledger.should_skip(&pod, Some("3")));
    }

    #[test]
    fn test_retain_and_forget() {
        let mut ledger = PodLedger::new();
        let a = PodRef::new("default", "a");
        let b = PodRef::new("default", "b");
        ledger.record(&a, Some("1".to_string()), &dropped());
        ledger.record(&b, Some("2".to_string()), &dropped());

        let present: BTreeSet<PodRef> = [a.clone()].into_iter().collect();
        ledger.retain(&present);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.should_skip(&a, Some("1")));

        ledger.forget(&a);
        assert!(ledger.is_empty());
    }
}
