use crate::types::FilterResult;
use ferry_core::PodPhase;
use k8s_openapi::api::core::v1::{Node, Pod};
use tracing::trace;

/// Filter predicate applied to candidate nodes
pub trait NodeFilter: Send + Sync {
    /// Filter a node
    fn filter(&self, node: &Node) -> FilterResult;

    /// Name of the filter
    fn name(&self) -> &str;
}

/// Filter for the node's Ready condition
pub struct NodeReady;

impl NodeFilter for NodeReady {
    fn filter(&self, node: &Node) -> FilterResult {
        let node_name = node_name(node).unwrap_or("unknown").to_string();

        let ready = node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"));

        match ready {
            Some(condition) if condition.status == "True" => FilterResult::pass(node_name),
            Some(condition) => FilterResult::fail(
                node_name,
                format!("Ready condition is {}", condition.status),
            ),
            None => FilterResult::fail(node_name, "Node reports no Ready condition".to_string()),
        }
    }

    fn name(&self) -> &str {
        "NodeReady"
    }
}

/// Get default filter predicates
pub fn default_filters() -> Vec<Box<dyn NodeFilter>> {
    vec![Box::new(NodeReady)]
}

/// Whether the node has a Ready condition with status True
pub fn is_node_ready(node: &Node) -> bool {
    NodeReady.filter(node).passed
}

/// Name of a node, if it has a non-empty one
pub fn node_name(node: &Node) -> Option<&str> {
    node.metadata.name.as_deref().filter(|n| !n.is_empty())
}

/// Decide whether this scheduler instance should act on the pod
///
/// The pod must have no node assigned, be Pending, and request exactly
/// `scheduler_name`. No trimming or case folding is applied and the default
/// scheduler name gets no special treatment.
pub fn is_eligible(pod: &Pod, scheduler_name: &str) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };

    let unassigned = spec.node_name.as_deref().map_or(true, str::is_empty);
    if !unassigned {
        return false;
    }

    if PodPhase::of(pod) != Some(PodPhase::Pending) {
        return false;
    }

    let eligible = spec.scheduler_name.as_deref() == Some(scheduler_name);
    if !eligible {
        trace!(
            "Pod {:?} requests scheduler {:?}, not {}",
            pod.metadata.name, spec.scheduler_name, scheduler_name
        );
    }
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, PodSpec, PodStatus};

    fn create_test_node(name: &str, ready: Option<&str>) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.status = Some(NodeStatus {
            conditions: ready.map(|status| {
                vec![
                    NodeCondition {
                        type_: "MemoryPressure".to_string(),
                        status: "False".to_string(),
                        ..Default::default()
                    },
                    NodeCondition {
                        type_: "Ready".to_string(),
                        status: status.to_string(),
                        ..Default::default()
                    },
                ]
            }),
            ..Default::default()
        });
        node
    }

    fn create_test_pod(scheduler: &str, node_name: Option<&str>, phase: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some("test-pod".to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.spec = Some(PodSpec {
            scheduler_name: Some(scheduler.to_string()),
            node_name: node_name.map(str::to_string),
            ..Default::default()
        });
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        pod
    }

    #[test]
    fn test_node_ready_pass() {
        let node = create_test_node("node1", Some("True"));
        let result = NodeReady.filter(&node);
        assert!(result.passed);
        assert!(is_node_ready(&node));
    }

    #[test]
    fn test_node_ready_fail_false_or_unknown() {
        for status in ["False", "Unknown"] {
            let node = create_test_node("node1", Some(status));
            let result = NodeReady.filter(&node);
            assert!(!result.passed);
            assert!(result.reason.unwrap().contains(status));
        }
    }

    #[test]
    fn test_node_ready_fail_without_condition() {
        let node = create_test_node("node1", None);
        assert!(!is_node_ready(&node));
        assert!(!is_node_ready(&Node::default()));
    }

    #[test]
    fn test_eligible_pending_unassigned_matching() {
        let pod = create_test_pod("my-scheduler", None, "Pending");
        assert!(is_eligible(&pod, "my-scheduler"));

        // An empty node name counts as unassigned
        let pod = create_test_pod("my-scheduler", Some(""), "Pending");
        assert!(is_eligible(&pod, "my-scheduler"));
    }

    #[test]
    fn test_not_eligible_when_assigned() {
        let pod = create_test_pod("my-scheduler", Some("node1"), "Pending");
        assert!(!is_eligible(&pod, "my-scheduler"));
    }

    #[test]
    fn test_not_eligible_unless_pending() {
        for phase in ["Running", "Succeeded", "Failed", "Unknown", ""] {
            let pod = create_test_pod("my-scheduler", None, phase);
            assert!(!is_eligible(&pod, "my-scheduler"), "phase {:?}", phase);
        }

        let mut pod = create_test_pod("my-scheduler", None, "Pending");
        pod.status = None;
        assert!(!is_eligible(&pod, "my-scheduler"));
    }

    #[test]
    fn test_scheduler_name_must_match_exactly() {
        let pod = create_test_pod("my-scheduler", None, "Pending");
        assert!(!is_eligible(&pod, "My-Scheduler"));
        assert!(!is_eligible(&pod, "my-scheduler "));
        assert!(!is_eligible(&pod, "default-scheduler"));

        let padded = create_test_pod(" my-scheduler", None, "Pending");
        assert!(!is_eligible(&padded, "my-scheduler"));

        let mut unnamed = create_test_pod("my-scheduler", None, "Pending");
        unnamed.spec.as_mut().unwrap().scheduler_name = None;
        assert!(!is_eligible(&unnamed, "my-scheduler"));
        assert!(!is_eligible(&unnamed, "default-scheduler"));
    }

    #[test]
    fn test_not_eligible_without_spec() {
        let mut pod = create_test_pod("my-scheduler", None, "Pending");
        pod.spec = None;
        assert!(!is_eligible(&pod, "my-scheduler"));
    }
}
