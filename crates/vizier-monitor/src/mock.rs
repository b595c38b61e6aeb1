//! Test adapters implementing the collaborator traits
//!
//! In-memory stand-ins for the pod list-watch source, the Vizier store, the
//! HTTP client and the prober, shared by unit and integration tests.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use api_types::Vizier;
use api_types::VizierSpec;
use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use tokio::sync::mpsc;

use crate::k8s::MonitorError;
use crate::k8s::NamespacedName;
use crate::k8s::PodListing;
use crate::k8s::PodSource;
use crate::k8s::PodWatchEvent;
use crate::k8s::PodWatchStream;
use crate::k8s::VizierStore;
use crate::monitor::prober::HttpClient;
use crate::monitor::prober::HttpResponse;
use crate::monitor::prober::ProbeResult;
use crate::monitor::prober::Prober;
use crate::monitor::registry::PodPhase;
use crate::monitor::registry::PodRecord;
use crate::monitor::registry::COMPONENT_LABEL;

/// Pod in namespace `pl` at 10.0.0.1 whose first container declares port
/// 50800.
pub fn pod(
    name: &str,
    component: &str,
    phase: &str,
    created_secs: i64,
    resource_version: &str,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("pl".to_string()),
            labels: Some(BTreeMap::from([(
                COMPONENT_LABEL.to_string(),
                component.to_string(),
            )])),
            creation_timestamp: Utc.timestamp_opt(created_secs, 0).single().map(Time),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "app".to_string(),
                ports: Some(vec![ContainerPort {
                    container_port: 50800,
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: Some("10.0.0.1".to_string()),
            ..Default::default()
        }),
    }
}

/// Cloud connector record created at t=100s.
pub fn record(name: &str, phase: PodPhase) -> PodRecord {
    PodRecord {
        name: name.to_string(),
        namespace: "pl".to_string(),
        component: crate::config::CLOUD_CONNECTOR_LABEL.to_string(),
        phase,
        created: Utc.timestamp_opt(100, 0).single(),
        pod_ip: Some("10.0.0.1".to_string()),
        port: 50800,
        resource_version: None,
    }
}

/// Pods and resource version of the next list response.
type ListResponse = (Vec<Pod>, Option<String>);

struct PodSourceState {
    listing: Option<ListResponse>,
    watch_fails: bool,
    sender: Option<mpsc::UnboundedSender<PodWatchEvent>>,
    pending: VecDeque<PodWatchEvent>,
    watched_from: Vec<String>,
}

/// Scriptable list-watch source. Events pushed while no watch is open are
/// delivered once the next watch opens.
#[derive(Clone)]
pub struct FakePodSource {
    state: Arc<Mutex<PodSourceState>>,
}

impl Default for FakePodSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePodSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PodSourceState {
                listing: Some((Vec::new(), Some("1".to_string()))),
                watch_fails: false,
                sender: None,
                pending: VecDeque::new(),
                watched_from: Vec::new(),
            })),
        }
    }

    pub fn set_list(&self, pods: Vec<Pod>, resource_version: &str) {
        self.state.lock().unwrap().listing = Some((pods, Some(resource_version.to_string())));
    }

    /// Makes the next lists succeed without carrying a resource version.
    pub fn set_unversioned_list(&self, pods: Vec<Pod>) {
        self.state.lock().unwrap().listing = Some((pods, None));
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().listing = None;
    }

    pub fn fail_watch(&self) {
        self.state.lock().unwrap().watch_fails = true;
    }

    pub fn push(&self, event: PodWatchEvent) {
        let mut state = self.state.lock().unwrap();
        let unsent = match &state.sender {
            Some(sender) => sender.send(event).err().map(|e| e.0),
            None => Some(event),
        };
        if let Some(event) = unsent {
            state.sender = None;
            state.pending.push_back(event);
        }
    }

    /// Ends the currently open watch stream.
    pub fn close_stream(&self) {
        self.state.lock().unwrap().sender = None;
    }

    /// Resource versions of every watch attempt, in order.
    pub fn watched_from(&self) -> Vec<String> {
        self.state.lock().unwrap().watched_from.clone()
    }
}

#[async_trait]
impl PodSource for FakePodSource {
    async fn list(&self) -> Result<PodListing, Report<MonitorError>> {
        let (pods, resource_version) =
            self.state.lock().unwrap().listing.clone().ok_or_else(|| {
                Report::new(MonitorError::ListFailed {
                    namespace: "pl".to_string(),
                })
            })?;
        PodListing::new(pods, resource_version, "pl")
    }

    async fn watch(&self, resource_version: &str) -> Result<PodWatchStream, Report<MonitorError>> {
        let mut state = self.state.lock().unwrap();
        state.watched_from.push(resource_version.to_string());
        if state.watch_fails {
            return Err(Report::new(MonitorError::WatchFailed {
                message: "watch refused".to_string(),
            }));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        while let Some(event) = state.pending.pop_front() {
            let _ = tx.send(event);
        }
        state.sender = Some(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }
}

#[derive(Default)]
struct VizierStoreState {
    vizier: Option<Vizier>,
    fail_get: bool,
    fail_update: bool,
    updates: Vec<Vizier>,
}

/// Vizier store holding a single object.
#[derive(Clone, Default)]
pub struct FakeVizierStore {
    state: Arc<Mutex<VizierStoreState>>,
}

impl FakeVizierStore {
    pub fn with_vizier(namespace: &str, name: &str) -> Self {
        let mut vizier = Vizier::new(name, VizierSpec::default());
        vizier.metadata.namespace = Some(namespace.to_string());
        let store = Self::default();
        store.state.lock().unwrap().vizier = Some(vizier);
        store
    }

    pub fn fail_get(&self, fail: bool) {
        self.state.lock().unwrap().fail_get = fail;
    }

    pub fn fail_update(&self, fail: bool) {
        self.state.lock().unwrap().fail_update = fail;
    }

    pub fn last_update(&self) -> Option<Vizier> {
        self.state.lock().unwrap().updates.last().cloned()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }
}

#[async_trait]
impl VizierStore for FakeVizierStore {
    async fn get(&self, name: &NamespacedName) -> Result<Vizier, Report<MonitorError>> {
        let state = self.state.lock().unwrap();
        if state.fail_get {
            return Err(Report::new(MonitorError::FetchFailed { name: name.clone() }));
        }
        state
            .vizier
            .clone()
            .filter(|vz| {
                vz.name_any() == name.name && vz.namespace().as_deref() == Some(&*name.namespace)
            })
            .ok_or_else(|| Report::new(MonitorError::FetchFailed { name: name.clone() }))
    }

    async fn update(&self, vizier: &Vizier) -> Result<(), Report<MonitorError>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_update {
            return Err(Report::new(MonitorError::UpdateFailed {
                name: NamespacedName::new(
                    vizier.namespace().unwrap_or_default(),
                    vizier.name_any(),
                ),
            }));
        }
        state.vizier = Some(vizier.clone());
        state.updates.push(vizier.clone());
        Ok(())
    }
}

/// HTTP client answering every request with the same response, or failing.
#[derive(Clone)]
pub struct FakeHttpClient {
    response: Option<HttpResponse>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHttpClient {
    pub fn responding(status: u16, body: &str) -> Self {
        Self {
            response: Some(HttpResponse {
                status,
                body: body.to_string(),
            }),
            requests: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, Report<MonitorError>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.response.clone().ok_or_else(|| {
            Report::new(MonitorError::ProbeFailed {
                url: url.to_string(),
            })
        })
    }
}

/// Prober returning a fixed result and counting its calls.
pub struct StaticProber {
    result: ProbeResult,
    calls: AtomicUsize,
}

impl StaticProber {
    pub fn new(result: ProbeResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for StaticProber {
    async fn probe(&self, _record: &PodRecord) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
