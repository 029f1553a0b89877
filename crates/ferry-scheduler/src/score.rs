use crate::error::{Result, SchedulerError};
use crate::filter::{default_filters, node_name, NodeFilter};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Number of pods assigned to each known node
///
/// Every pod with a node name counts regardless of phase or namespace, so
/// finished pods still weigh on a node until they are deleted. Pods pointing
/// at nodes outside the node list are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadIndex {
    counts: BTreeMap<String, usize>,
}

impl LoadIndex {
    /// Build the index from a node list and a pod list
    pub fn build(nodes: &[Node], pods: &[Pod]) -> Self {
        let mut counts: BTreeMap<String, usize> = nodes
            .iter()
            .filter_map(node_name)
            .map(|name| (name.to_string(), 0))
            .collect();

        for pod in pods {
            let assigned = pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.as_deref())
                .filter(|n| !n.is_empty());
            if let Some(count) = assigned.and_then(|n| counts.get_mut(n)) {
                *count += 1;
            }
        }

        Self { counts }
    }

    /// Pod count for a node, `None` for nodes the index has never seen
    pub fn count(&self, node: &str) -> Option<usize> {
        self.counts.get(node).copied()
    }

    /// Account for a binding we just made
    pub fn record_binding(&mut self, node: &str) {
        *self.counts.entry(node.to_string()).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Picks the least-loaded node among the ones passing the filters
///
/// When every named node fails the filters the selector falls back to all of
/// them and logs a warning, so a cluster with no Ready node still gets pods
/// placed. Ties go to the node listed first.
pub struct NodeSelector {
    filters: Vec<Box<dyn NodeFilter>>,
}

impl NodeSelector {
    /// Create a selector with the default filters
    pub fn new() -> Self {
        Self::with_filters(default_filters())
    }

    pub fn with_filters(filters: Vec<Box<dyn NodeFilter>>) -> Self {
        Self { filters }
    }

    /// Choose a node for one pod
    pub fn choose(&self, nodes: &[Node], load: &LoadIndex) -> Result<String> {
        let named: Vec<&Node> = nodes.iter().filter(|n| node_name(n).is_some()).collect();
        if named.is_empty() {
            return Err(SchedulerError::NoNodesAvailable);
        }

        let mut candidates: Vec<&Node> = named
            .iter()
            .copied()
            .filter(|node| self.passes_filters(node))
            .collect();

        if candidates.is_empty() {
            warn!(
                "No ready nodes found among {} node(s), falling back to all nodes",
                named.len()
            );
            candidates = named;
        }

        let mut best: Option<(&str, usize)> = None;
        for node in candidates {
            let Some(name) = node_name(node) else {
                continue;
            };
            let pods = load.count(name).unwrap_or(0);
            // Strictly less keeps the first node on ties
            if best.map_or(true, |(_, fewest)| pods < fewest) {
                best = Some((name, pods));
            }
        }

        let (name, pods) = best.ok_or(SchedulerError::NoNodesAvailable)?;
        debug!("Selected node {} with {} pods", name, pods);
        Ok(name.to_string())
    }

    fn passes_filters(&self, node: &Node) -> bool {
        self.filters.iter().all(|filter| {
            let result = filter.filter(node);
            if !result.passed {
                debug!(
                    "Node {} filtered out by {}: {}",
                    result.node_name,
                    filter.name(),
                    result.reason.as_deref().unwrap_or("no reason given")
                );
            }
            result.passed
        })
    }
}

impl Default for NodeSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Choose a node with the default filters
pub fn choose(nodes: &[Node], load: &LoadIndex) -> Result<String> {
    NodeSelector::new().choose(nodes, load)
}
