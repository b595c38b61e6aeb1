//! In-memory registry holding the current pod of every Vizier component.
//!
//! Vizier components run without replicas, so the registry keeps exactly one
//! [`PodRecord`] per value of the `name` label. While a component rolls, the
//! old and the new pod can both produce events; the most recently created pod
//! wins and an older pod can never displace it again.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use tokio::sync::RwLock;
use tracing::debug;

/// Pod label carrying the logical component name.
pub const COMPONENT_LABEL: &str = "name";

/// Lifecycle phase of a pod as reported by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl PodPhase {
    fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of a single pod, taken when an event for it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub component: String,
    pub phase: PodPhase,
    pub created: Option<DateTime<Utc>>,
    pub pod_ip: Option<String>,
    /// First declared port of the first container, 0 when none is declared.
    pub port: i32,
    pub resource_version: Option<String>,
}

impl PodRecord {
    /// Returns `None` for pods that carry no component label.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let metadata = &pod.metadata;
        let component = metadata.labels.as_ref()?.get(COMPONENT_LABEL)?.clone();

        let port = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.containers.first())
            .and_then(|container| container.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|port| port.container_port)
            .unwrap_or_default();

        let status = pod.status.as_ref();

        Some(Self {
            name: metadata.name.clone().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            component,
            phase: PodPhase::parse(status.and_then(|s| s.phase.as_deref())),
            created: metadata.creation_timestamp.as_ref().map(|t| t.0),
            pod_ip: status.and_then(|s| s.pod_ip.clone()).filter(|ip| !ip.is_empty()),
            port,
            resource_version: metadata.resource_version.clone(),
        })
    }

    /// Whether `self` may overwrite `stored`. Updates of the same pod always
    /// apply; a different pod applies unless it was created before `stored`.
    fn supersedes(&self, stored: &PodRecord) -> bool {
        self.name == stored.name || self.created >= stored.created
    }
}

/// Immutable view of the registry handed to the status algorithm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot(HashMap<String, PodRecord>);

impl RegistrySnapshot {
    pub fn get(&self, component: &str) -> Option<&PodRecord> {
        self.0.get(component)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PodRecord)> {
        self.0.iter()
    }
}

impl FromIterator<PodRecord> for RegistrySnapshot {
    fn from_iter<I: IntoIterator<Item = PodRecord>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|record| (record.component.clone(), record))
                .collect(),
        )
    }
}

/// Component name -> current pod. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct PodRegistry {
    pods: Arc<RwLock<HashMap<String, PodRecord>>>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` unless an already stored, newer pod of the same
    /// component takes precedence.
    pub async fn handle(&self, record: PodRecord) {
        let mut pods = self.pods.write().await;
        if let Some(stored) = pods.get(&record.component) {
            if !record.supersedes(stored) {
                debug!(
                    component = %record.component,
                    pod = %record.name,
                    current = %stored.name,
                    "Ignoring update from an older pod"
                );
                return;
            }
        }
        pods.insert(record.component.clone(), record);
    }

    /// Removes the component entry if it still belongs to `record`'s pod.
    pub async fn forget(&self, record: &PodRecord) -> bool {
        let mut pods = self.pods.write().await;
        match pods.get(&record.component) {
            Some(stored) if stored.name == record.name => {
                pods.remove(&record.component);
                true
            }
            _ => false,
        }
    }

    /// Drops every entry whose pod is not in `live_pods` and returns the
    /// dropped records.
    pub async fn retain_pods(&self, live_pods: &HashSet<String>) -> Vec<PodRecord> {
        let mut pods = self.pods.write().await;
        let stale: Vec<String> = pods
            .iter()
            .filter(|(_, record)| !live_pods.contains(&record.name))
            .map(|(component, _)| component.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|component| pods.remove(&component))
            .collect()
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.pods.read().await.clone())
    }

    pub async fn get(&self, component: &str) -> Option<PodRecord> {
        self.pods.read().await.get(component).cloned()
    }

    pub async fn len(&self) -> usize {
        self.pods.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pods.read().await.is_empty()
    }
}
