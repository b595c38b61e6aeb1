use thiserror::Error;

/// Errors that can occur while monitoring a Vizier.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("Failed to list pods in namespace {namespace}")]
    ListFailed { namespace: String },
    #[error("Pod list response is malformed: {message}")]
    InvalidListResponse { message: String },
    #[error("Failed to watch pods: {message}")]
    WatchFailed { message: String },
    #[error("Failed to get vizier {name}")]
    FetchFailed { name: NamespacedName },
    #[error("Failed to update vizier status {name}")]
    UpdateFailed { name: NamespacedName },
    #[error("Statusz request to {url} failed")]
    ProbeFailed { url: String },
    #[error("Failed to build HTTP client")]
    HttpClientBuild,
    #[error("Monitor is already running")]
    AlreadyStarted,
    #[error("Monitor was stopped and cannot be restarted")]
    Terminated,
}

/// Namespace-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
