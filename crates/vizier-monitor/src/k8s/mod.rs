//! Kubernetes integration module.
//!
//! Wraps the two cluster collaborators of the monitor behind traits so the
//! monitor can be driven by fakes in tests:
//! - [`PodSource`]: list and watch the pods of one namespace
//! - [`VizierStore`]: read and update the `Vizier` custom resource

pub mod kube_client;
pub mod pod_source;
pub mod types;
pub mod vizier_store;

pub use kube_client::init_kube_client;
pub use pod_source::KubePodSource;
pub use pod_source::PodListing;
pub use pod_source::PodSource;
pub use pod_source::PodWatchEvent;
pub use pod_source::PodWatchStream;
pub use types::MonitorError;
pub use types::NamespacedName;
pub use vizier_store::KubeVizierStore;
pub use vizier_store::VizierStore;
