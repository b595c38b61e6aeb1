//! Vizier health monitor.
//!
//! Pod events flow from the [`PodIngester`] into the [`PodRegistry`]; on
//! every tick the [`Reconciler`] evaluates the registry with a
//! [`StatusStrategy`] and writes the result to the Vizier status.
//! [`VizierMonitor`] owns both loops.

pub mod cursor;
pub mod ingester;
pub mod prober;
pub mod reconciler;
pub mod registry;
pub mod session;
pub mod status;

pub use cursor::WatchCursor;
pub use ingester::PodIngester;
pub use prober::HttpClient;
pub use prober::ProbeResult;
pub use prober::Prober;
pub use prober::ReqwestHttpClient;
pub use prober::StatuszProber;
pub use reconciler::Reconciler;
pub use registry::PodPhase;
pub use registry::PodRecord;
pub use registry::PodRegistry;
pub use registry::RegistrySnapshot;
pub use session::VizierMonitor;
pub use status::CloudConnectorStrategy;
pub use status::StatusOutcome;
pub use status::StatusStrategy;
