use crate::error::{FerryError, Result};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// PodRef addresses a pod by namespace and name
///
/// Binding only needs the pod's identity, so the scheduler passes this
/// instead of re-reading pod state at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodRef {
    /// Namespace of the pod
    pub namespace: String,
    /// Name of the pod
    pub name: String,
}

impl PodRef {
    /// Create a new pod reference
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Extract the reference from a pod's metadata
    ///
    /// Both name and namespace must be present and non-empty.
    pub fn from_pod(pod: &Pod) -> Result<Self> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FerryError::missing_field("Pod", "metadata.name"))?;
        let namespace = pod
            .metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| FerryError::missing_field("Pod", "metadata.namespace"))?;

        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Lifecycle phase reported in a pod's status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Read the phase from a pod's status, if it has a recognizable one
    pub fn of(pod: &Pod) -> Option<Self> {
        pod.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .and_then(|p| p.parse().ok())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl FromStr for PodPhase {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(PodPhase::Pending),
            "Running" => Ok(PodPhase::Running),
            "Succeeded" => Ok(PodPhase::Succeeded),
            "Failed" => Ok(PodPhase::Failed),
            "Unknown" => Ok(PodPhase::Unknown),
            other => Err(FerryError::invalid_phase(other)),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of committing a pod-to-node binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The cluster accepted the binding
    Success,
    /// The pod was already bound by someone else
    Conflict,
    /// Retryable failure (network, timeout, server-side error)
    TransientError { reason: String },
    /// Non-retryable rejection (pod gone, invalid request, forbidden)
    PermanentError { reason: String },
}

impl BindOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientError {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentError {
            reason: reason.into(),
        }
    }

    /// Classify the HTTP status returned by the binding subresource
    ///
    /// 409 is a conflict, 408/429/5xx are transient, any other non-2xx status
    /// is permanent.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        match code {
            200..=299 => BindOutcome::Success,
            409 => BindOutcome::Conflict,
            408 | 429 | 500..=599 => {
                BindOutcome::transient(format!("HTTP {}: {}", code, message.into()))
            }
            _ => BindOutcome::permanent(format!("HTTP {}: {}", code, message.into())),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BindOutcome::Success)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BindOutcome::TransientError { .. })
    }
}

impl fmt::Display for BindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindOutcome::Success => write!(f, "success"),
            BindOutcome::Conflict => write!(f, "conflict"),
            BindOutcome::TransientError { reason } => write!(f, "transient error: {}", reason),
            BindOutcome::PermanentError { reason } => write!(f, "permanent error: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;

    #[test]
    fn test_pod_ref_from_pod() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("nginx".to_string());
        pod.metadata.namespace = Some("web".to_string());

        let pod_ref = PodRef::from_pod(&pod).unwrap();
        assert_eq!(pod_ref, PodRef::new("web", "nginx"));
        assert_eq!(pod_ref.to_string(), "web/nginx");
    }

    #[test]
    fn test_pod_ref_requires_name_and_namespace() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("nginx".to_string());
        assert!(matches!(
            PodRef::from_pod(&pod),
            Err(FerryError::MissingField { .. })
        ));

        pod.metadata.namespace = Some("default".to_string());
        pod.metadata.name = Some(String::new());
        assert!(PodRef::from_pod(&pod).is_err());
    }

    #[test]
    fn test_pod_phase_of() {
        let mut pod = Pod::default();
        assert_eq!(PodPhase::of(&pod), None);

        pod.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        assert_eq!(PodPhase::of(&pod), Some(PodPhase::Pending));

        pod.status.as_mut().unwrap().phase = Some("pending".to_string());
        assert_eq!(PodPhase::of(&pod), None);
    }

    #[test]
    fn test_bind_outcome_from_status() {
        assert_eq!(BindOutcome::from_status(201, "Created"), BindOutcome::Success);
        assert_eq!(BindOutcome::from_status(409, "already assigned"), BindOutcome::Conflict);
        assert!(BindOutcome::from_status(500, "etcd timeout").is_transient());
        assert!(BindOutcome::from_status(503, "unavailable").is_transient());
        assert!(BindOutcome::from_status(429, "throttled").is_transient());
        assert!(BindOutcome::from_status(408, "request timeout").is_transient());
        assert!(matches!(
            BindOutcome::from_status(404, "pods \"x\" not found"),
            BindOutcome::PermanentError { .. }
        ));
        assert!(matches!(
            BindOutcome::from_status(403, "forbidden"),
            BindOutcome::PermanentError { .. }
        ));
    }

    #[test]
    fn test_bind_outcome_display() {
        let outcome = BindOutcome::from_status(404, "not found");
        assert_eq!(outcome.to_string(), "permanent error: HTTP 404: not found");
    }
}
