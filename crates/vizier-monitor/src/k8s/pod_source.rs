use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::api::WatchEvent;
use kube::api::WatchParams;
use kube::Api;
use kube::Client;

use crate::k8s::MonitorError;

/// Status code the API server returns once a resource version has been
/// compacted away.
const HTTP_GONE: u16 = 410;

/// Result of a full pod list.
#[derive(Debug, Clone)]
pub struct PodListing {
    pub pods: Vec<Pod>,
    /// Resource version of the list, used as the starting point of the watch.
    pub resource_version: String,
}

/// One item delivered by a pod watch.
#[derive(Debug, Clone)]
pub enum PodWatchEvent {
    /// A pod was added or modified.
    Applied(Pod),
    Deleted(Pod),
    /// Progress marker carrying only a resource version.
    Bookmark { resource_version: String },
    /// The watch cursor is too old to resume from.
    Expired { message: String },
    /// Any other failure or status object inside the stream.
    Failure { message: String },
}

impl PodListing {
    /// Rejects a list without a resource version, since no watch could be
    /// resumed from it.
    pub fn new(
        pods: Vec<Pod>,
        resource_version: Option<String>,
        namespace: &str,
    ) -> Result<Self, Report<MonitorError>> {
        let resource_version = resource_version
            .filter(|rv| !rv.is_empty())
            .ok_or_else(|| {
                Report::new(MonitorError::InvalidListResponse {
                    message: format!(
                        "pod list for namespace {namespace} has no resource version"
                    ),
                })
            })?;

        Ok(Self {
            pods,
            resource_version,
        })
    }
}

pub type PodWatchStream = BoxStream<'static, PodWatchEvent>;

/// List-watch source of the pods in one namespace.
#[async_trait]
pub trait PodSource: Send + Sync {
    async fn list(&self) -> Result<PodListing, Report<MonitorError>>;

    /// Opens a watch that delivers every change after `resource_version`.
    /// The stream ends when the server closes the connection.
    async fn watch(&self, resource_version: &str) -> Result<PodWatchStream, Report<MonitorError>>;
}

/// [`PodSource`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePodSource {
    api: Api<Pod>,
    namespace: String,
}

impl KubePodSource {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn list(&self) -> Result<PodListing, Report<MonitorError>> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .change_context(MonitorError::ListFailed {
                namespace: self.namespace.clone(),
            })?;

        PodListing::new(list.items, list.metadata.resource_version, &self.namespace)
    }

    async fn watch(&self, resource_version: &str) -> Result<PodWatchStream, Report<MonitorError>> {
        let stream = self
            .api
            .watch(&WatchParams::default(), resource_version)
            .await
            .change_context(MonitorError::WatchFailed {
                message: format!(
                    "could not open pod watch in namespace {} at resource version {}",
                    self.namespace, resource_version
                ),
            })?;

        Ok(stream.map(from_kube_event).boxed())
    }
}

fn from_kube_event(event: Result<WatchEvent<Pod>, kube::Error>) -> PodWatchEvent {
    match event {
        Ok(WatchEvent::Added(pod)) | Ok(WatchEvent::Modified(pod)) => PodWatchEvent::Applied(pod),
        Ok(WatchEvent::Deleted(pod)) => PodWatchEvent::Deleted(pod),
        Ok(WatchEvent::Bookmark(bookmark)) => PodWatchEvent::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        },
        Ok(WatchEvent::Error(e)) if e.code == HTTP_GONE => {
            PodWatchEvent::Expired { message: e.message }
        }
        Ok(WatchEvent::Error(e)) => PodWatchEvent::Failure { message: e.message },
        Err(kube::Error::Api(e)) if e.code == HTTP_GONE => {
            PodWatchEvent::Expired { message: e.message }
        }
        Err(e) => PodWatchEvent::Failure {
            message: e.to_string(),
        },
    }
}
