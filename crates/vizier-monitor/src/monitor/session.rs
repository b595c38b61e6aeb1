//! Start/stop of the two background loops that keep a Vizier status current.

use std::sync::Arc;

use error_stack::Report;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::config::MonitorConfig;
use crate::k8s::MonitorError;
use crate::k8s::NamespacedName;
use crate::k8s::PodSource;
use crate::k8s::VizierStore;
use crate::monitor::cursor::WatchCursor;
use crate::monitor::ingester::IngestConfig;
use crate::monitor::ingester::PodIngester;
use crate::monitor::prober::Prober;
use crate::monitor::prober::ReqwestHttpClient;
use crate::monitor::prober::StatuszProber;
use crate::monitor::reconciler::Reconciler;
use crate::monitor::registry::PodRegistry;
use crate::monitor::status::CloudConnectorStrategy;
use crate::monitor::status::StatusStrategy;

/// State of one started monitor.
struct MonitorSession {
    token: CancellationToken,
    registry: PodRegistry,
    cursor: WatchCursor,
    watch_task: Option<JoinHandle<Result<(), Report<MonitorError>>>>,
    reconcile_task: Option<JoinHandle<()>>,
    watch_result: Option<Result<(), Report<MonitorError>>>,
}

/// Watches the pods of a Vizier namespace and periodically writes the derived
/// health to the Vizier's status.
pub struct VizierMonitor {
    config: MonitorConfig,
    pods: Arc<dyn PodSource>,
    viziers: Arc<dyn VizierStore>,
    prober: Option<Arc<dyn Prober>>,
    strategy: Arc<dyn StatusStrategy>,
    session: Option<MonitorSession>,
}

impl VizierMonitor {
    pub fn new(
        config: MonitorConfig,
        pods: Arc<dyn PodSource>,
        viziers: Arc<dyn VizierStore>,
    ) -> Self {
        let strategy = Arc::new(CloudConnectorStrategy::new(
            config.cloud_connector_label.clone(),
        ));
        Self {
            config,
            pods,
            viziers,
            prober: None,
            strategy,
            session: None,
        }
    }

    /// Replaces the statusz prober that `start` would otherwise build.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn StatusStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Performs the initial pod list and spawns the watch and reconcile
    /// loops. A failing initial list aborts startup and leaves the monitor
    /// unstarted.
    #[tracing::instrument(
        skip(self),
        fields(namespace = %self.config.namespace, vizier = %self.config.vizier_name)
    )]
    pub async fn start(&mut self) -> Result<(), Report<MonitorError>> {
        if let Some(session) = &self.session {
            return Err(Report::new(if session.token.is_cancelled() {
                MonitorError::Terminated
            } else {
                MonitorError::AlreadyStarted
            }));
        }

        let prober = match &self.prober {
            Some(prober) => prober.clone(),
            None => Arc::new(StatuszProber::new(
                ReqwestHttpClient::new(self.config.probe_timeout)?,
                self.config.statusz_path.clone(),
            )),
        };

        let token = CancellationToken::new();
        let registry = PodRegistry::new();
        let cursor = WatchCursor::new();

        let ingester = Arc::new(PodIngester::new(
            self.pods.clone(),
            registry.clone(),
            cursor.clone(),
            IngestConfig::from(&self.config),
        ));
        ingester.initial_sync().await?;

        let reconciler = Reconciler::new(
            registry.clone(),
            prober,
            self.strategy.clone(),
            self.viziers.clone(),
            NamespacedName::new(&self.config.namespace, &self.config.vizier_name),
            self.config.reconcile_interval,
        );

        let watch_task = {
            let token = token.clone();
            tokio::spawn(async move { ingester.run(token).await })
        };
        let reconcile_task = {
            let token = token.clone();
            tokio::spawn(async move { reconciler.run(token).await })
        };

        info!(
            components = registry.len().await,
            resource_version = %cursor.current(),
            "Vizier monitor started"
        );

        self.session = Some(MonitorSession {
            token,
            registry,
            cursor,
            watch_task: Some(watch_task),
            reconcile_task: Some(reconcile_task),
            watch_result: None,
        });
        Ok(())
    }

    /// Signals both loops to stop without waiting for them. Does nothing if
    /// the monitor was never started or is already stopped.
    pub fn stop(&self) {
        if let Some(session) = &self.session {
            if !session.token.is_cancelled() {
                info!("Stopping vizier monitor");
                session.token.cancel();
            }
        }
    }

    /// Waits until both loops have exited. If the watch loop fails, the
    /// reconcile loop is stopped as well and the watch error is returned.
    /// Cancel safe.
    pub async fn join(&mut self) -> Result<(), Report<MonitorError>> {
        let Some(session) = &mut self.session else {
            return Ok(());
        };

        // Handles are only cleared once awaited so a dropped join can resume.
        if let Some(watch_task) = &mut session.watch_task {
            let result = match watch_task.await {
                Ok(result) => result,
                Err(e) => Err(Report::new(MonitorError::WatchFailed {
                    message: format!("pod watch task aborted: {e}"),
                })),
            };
            session.watch_task = None;
            if result.is_err() {
                session.token.cancel();
            }
            session.watch_result = Some(result);
        }

        if let Some(reconcile_task) = &mut session.reconcile_task {
            let result = reconcile_task.await;
            session.reconcile_task = None;
            if let Err(e) = result {
                warn!("Status reconciler task aborted: {e}");
            }
        }

        session.watch_result.take().unwrap_or(Ok(()))
    }

    /// Token cancelled by [`Self::stop`], available once started.
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.session.as_ref().map(|s| s.token.clone())
    }

    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.token.is_cancelled())
    }

    pub fn registry(&self) -> Option<&PodRegistry> {
        self.session.as_ref().map(|s| &s.registry)
    }

    pub fn cursor(&self) -> Option<&WatchCursor> {
        self.session.as_ref().map(|s| &s.cursor)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::mock::pod;
    use crate::mock::FakePodSource;
    use crate::mock::FakeVizierStore;
    use crate::mock::StaticProber;
    use crate::monitor::prober::ProbeResult;

    fn monitor(source: &FakePodSource) -> VizierMonitor {
        let config = MonitorConfig {
            reconcile_interval: Duration::from_millis(10),
            ..Default::default()
        };
        VizierMonitor::new(
            config,
            Arc::new(source.clone()),
            Arc::new(FakeVizierStore::with_vizier("pl", "pixie")),
        )
        .with_prober(Arc::new(StaticProber::new(ProbeResult::healthy())))
    }

    #[test(tokio::test)]
    async fn stop_before_start_is_a_no_op() {
        let source = FakePodSource::new();
        let monitor = monitor(&source);

        monitor.stop();
        monitor.stop();

        assert!(!monitor.is_running());
        assert!(monitor.shutdown_token().is_none());
    }

    #[test(tokio::test)]
    async fn failed_initial_list_aborts_start() {
        let source = FakePodSource::new();
        source.fail_list();
        let mut monitor = monitor(&source);

        let err = monitor.start().await.expect_err("list fails");

        assert!(matches!(
            err.current_context(),
            MonitorError::ListFailed { .. }
        ));
        assert!(!monitor.is_running());
        assert!(monitor.registry().is_none());
    }

    #[test(tokio::test)]
    async fn unversioned_initial_list_aborts_start() {
        let source = FakePodSource::new();
        source.set_unversioned_list(vec![pod(
            "cc-1",
            "vizier-cloud-connector",
            "Running",
            100,
            "90",
        )]);
        let mut monitor = monitor(&source);

        let err = monitor.start().await.expect_err("list is malformed");

        assert!(matches!(
            err.current_context(),
            MonitorError::InvalidListResponse { .. }
        ));
        assert!(!monitor.is_running());
        assert!(monitor.registry().is_none());
        assert!(source.watched_from().is_empty());
    }

    #[test(tokio::test)]
    async fn start_twice_is_rejected_and_stopped_monitor_cannot_restart() {
        let source = FakePodSource::new();
        source.set_list(
            vec![pod("cc-1", "vizier-cloud-connector", "Running", 100, "90")],
            "100",
        );
        let mut monitor = monitor(&source);

        monitor.start().await.expect("starts");
        assert!(monitor.is_running());
        assert_eq!(monitor.cursor().map(WatchCursor::current).as_deref(), Some("100"));

        let err = monitor.start().await.expect_err("already running");
        assert!(matches!(err.current_context(), MonitorError::AlreadyStarted));

        monitor.stop();
        monitor.stop();
        tokio::time::timeout(Duration::from_secs(5), monitor.join())
            .await
            .expect("loops stop in time")
            .expect("clean shutdown");

        let err = monitor.start().await.expect_err("terminated");
        assert!(matches!(err.current_context(), MonitorError::Terminated));
    }

    #[test(tokio::test)]
    async fn join_surfaces_watch_failure_and_stops_reconciler() {
        let source = FakePodSource::new();
        source.set_list(vec![], "100");
        source.fail_watch();
        let config = MonitorConfig {
            reconcile_interval: Duration::from_millis(10),
            max_watch_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let mut monitor = VizierMonitor::new(
            config,
            Arc::new(source.clone()),
            Arc::new(FakeVizierStore::with_vizier("pl", "pixie")),
        )
        .with_prober(Arc::new(StaticProber::new(ProbeResult::healthy())));

        monitor.start().await.expect("starts");
        let err = tokio::time::timeout(Duration::from_secs(5), monitor.join())
            .await
            .expect("joins in time")
            .expect_err("watch gives up");

        assert!(matches!(
            err.current_context(),
            MonitorError::WatchFailed { .. }
        ));
        assert!(!monitor.is_running());
    }
}
