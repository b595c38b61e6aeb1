use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use utils::logging::LogFormat;

/// Label value of the cloud connector pod.
pub const CLOUD_CONNECTOR_LABEL: &str = "vizier-cloud-connector";

/// Health endpoint exposed by every Vizier pod.
pub const STATUSZ_PATH: &str = "/statusz";

#[derive(Parser, Clone, Debug)]
pub struct MonitorArgs {
    #[arg(
        long,
        env = "POD_NAMESPACE",
        default_value = "pl",
        help = "Namespace the Vizier pods and the Vizier resource live in"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "VIZIER_NAME",
        default_value = "pixie",
        help = "Name of the Vizier resource whose status is reconciled"
    )]
    pub vizier_name: String,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        default_value = "20",
        help = "Seconds between two status reconciliations"
    )]
    pub reconcile_interval_secs: u64,

    #[arg(
        long,
        default_value = "10",
        help = "Timeout in seconds for a single statusz request"
    )]
    pub probe_timeout_secs: u64,

    #[arg(long, default_value = STATUSZ_PATH, help = "Path of the pod health endpoint")]
    pub statusz_path: String,

    #[arg(
        long,
        default_value = CLOUD_CONNECTOR_LABEL,
        help = "Value of the `name` label identifying the cloud connector pod"
    )]
    pub cloud_connector_label: String,

    #[arg(
        long,
        default_value = "10",
        help = "Consecutive failures to open the pod watch before giving up"
    )]
    pub max_watch_retries: u32,

    #[arg(
        long,
        help = "Drop a component's last known pod once that pod is deleted",
        default_value_t = false
    )]
    pub forget_deleted_pods: bool,

    #[arg(
        long,
        env = "LOG_FORMAT",
        default_value = "text",
        help = "Log output format, `text` or `json`"
    )]
    pub log_format: LogFormat,
}

/// What happens to a component's record when its pod is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    /// Keep serving the last known record until a newer pod shows up.
    #[default]
    Retain,
    /// Remove the record if it still belongs to the deleted pod.
    Forget,
}

/// Runtime configuration of a [`crate::monitor::VizierMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub namespace: String,
    pub vizier_name: String,
    pub reconcile_interval: Duration,
    pub probe_timeout: Duration,
    pub statusz_path: String,
    pub cloud_connector_label: String,
    pub max_watch_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Pause before reopening a watch that ended without error.
    pub rewatch_delay: Duration,
    pub deletion_policy: DeletionPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            namespace: "pl".to_string(),
            vizier_name: "pixie".to_string(),
            reconcile_interval: Duration::from_secs(20),
            probe_timeout: Duration::from_secs(10),
            statusz_path: STATUSZ_PATH.to_string(),
            cloud_connector_label: CLOUD_CONNECTOR_LABEL.to_string(),
            max_watch_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            rewatch_delay: Duration::from_secs(1),
            deletion_policy: DeletionPolicy::Retain,
        }
    }
}

impl From<&MonitorArgs> for MonitorConfig {
    fn from(args: &MonitorArgs) -> Self {
        Self {
            namespace: args.namespace.clone(),
            vizier_name: args.vizier_name.clone(),
            reconcile_interval: Duration::from_secs(args.reconcile_interval_secs.max(1)),
            probe_timeout: Duration::from_secs(args.probe_timeout_secs.max(1)),
            statusz_path: args.statusz_path.clone(),
            cloud_connector_label: args.cloud_connector_label.clone(),
            max_watch_retries: args.max_watch_retries,
            deletion_policy: if args.forget_deleted_pods {
                DeletionPolicy::Forget
            } else {
                DeletionPolicy::Retain
            },
            ..Default::default()
        }
    }
}
