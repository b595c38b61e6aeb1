//! Feeds pod list and watch results into the [`PodRegistry`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::DeletionPolicy;
use crate::config::MonitorConfig;
use crate::k8s::MonitorError;
use crate::k8s::PodSource;
use crate::k8s::PodWatchEvent;
use crate::k8s::PodWatchStream;
use crate::monitor::cursor::WatchCursor;
use crate::monitor::registry::PodRecord;
use crate::monitor::registry::PodRegistry;

/// Retry policy of the watch loop.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Consecutive failures to open the watch (or to relist) before the
    /// ingester gives up.
    pub max_watch_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub rewatch_delay: Duration,
    pub deletion_policy: DeletionPolicy,
}

impl From<&MonitorConfig> for IngestConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            max_watch_retries: config.max_watch_retries.max(1),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            rewatch_delay: config.rewatch_delay,
            deletion_policy: config.deletion_policy,
        }
    }
}

/// Doubling delay capped at a maximum.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = std::cmp::min(self.next * 2, self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Why consuming a watch stream stopped.
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    Closed,
    Expired,
}

pub struct PodIngester {
    source: Arc<dyn PodSource>,
    registry: PodRegistry,
    cursor: WatchCursor,
    config: IngestConfig,
}

impl PodIngester {
    pub fn new(
        source: Arc<dyn PodSource>,
        registry: PodRegistry,
        cursor: WatchCursor,
        config: IngestConfig,
    ) -> Self {
        Self {
            source,
            registry,
            cursor,
            config,
        }
    }

    /// Lists all pods, records the list's resource version as the cursor and
    /// feeds every pod into the registry.
    pub async fn initial_sync(&self) -> Result<(), Report<MonitorError>> {
        let listing = self.source.list().await?;
        info!(
            pods = listing.pods.len(),
            resource_version = %listing.resource_version,
            "Listed pods"
        );

        for pod in &listing.pods {
            self.apply(pod).await;
        }
        if self.config.deletion_policy == DeletionPolicy::Forget {
            self.prune(&listing.pods).await;
        }
        self.cursor.advance(listing.resource_version);
        Ok(())
    }

    /// Relists until a list succeeds or `token` is cancelled. Gives up after
    /// `max_watch_retries` consecutive failures.
    async fn relist(&self, token: &CancellationToken) -> Result<(), Report<MonitorError>> {
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut failures = 0u32;

        loop {
            let Err(e) = self.initial_sync().await else {
                return Ok(());
            };
            failures += 1;
            if failures >= self.config.max_watch_retries {
                return Err(e.change_context(MonitorError::WatchFailed {
                    message: format!("relisting pods failed {failures} consecutive times"),
                }));
            }
            let delay = backoff.next_delay();
            warn!(failures, "Relisting pods failed, retrying in {delay:?}: {e:?}");
            if Self::sleep_or_cancel(delay, token).await {
                return Ok(());
            }
        }
    }

    /// Drops records of pods that are absent from a fresh list.
    async fn prune(&self, listed: &[Pod]) {
        let live: HashSet<String> = listed
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .collect();
        for record in self.registry.retain_pods(&live).await {
            info!(
                component = %record.component,
                pod = %record.name,
                "Pod no longer listed, dropped its component record"
            );
        }
    }

    /// Watches pods from the cursor onwards until `token` is cancelled.
    ///
    /// A stream that closes is reopened from the cursor and an expired cursor
    /// triggers a relist. Failing to open the watch, or to relist, is retried
    /// with backoff; after `max_watch_retries` consecutive failures the error
    /// is returned so the process can be restarted by its supervisor.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self, token: CancellationToken) -> Result<(), Report<MonitorError>> {
        info!("Starting pod watcher");

        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut failures = 0u32;

        loop {
            let resource_version = self.cursor.current();
            let opened = select! {
                biased;
                _ = token.cancelled() => break,
                opened = self.source.watch(&resource_version) => opened,
            };

            let stream = match opened {
                Ok(stream) => {
                    failures = 0;
                    backoff.reset();
                    stream
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.config.max_watch_retries {
                        return Err(e.attach_printable(format!(
                            "giving up after {failures} consecutive failures"
                        )));
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        %resource_version,
                        failures,
                        "Could not start watcher for pods, retrying in {delay:?}: {e:?}"
                    );
                    if Self::sleep_or_cancel(delay, &token).await {
                        break;
                    }
                    continue;
                }
            };

            match self.consume(stream, &token).await {
                StreamEnd::Cancelled => break,
                StreamEnd::Closed => {
                    debug!(
                        resource_version = %self.cursor.current(),
                        "Pod watch stream closed, reopening"
                    );
                    if Self::sleep_or_cancel(self.config.rewatch_delay, &token).await {
                        break;
                    }
                }
                StreamEnd::Expired => {
                    info!(
                        resource_version = %self.cursor.current(),
                        "Watch cursor expired, relisting pods"
                    );
                    self.relist(&token).await?;
                }
            }
        }

        info!("Pod watcher shutdown requested");
        Ok(())
    }

    async fn consume(&self, mut stream: PodWatchStream, token: &CancellationToken) -> StreamEnd {
        loop {
            let event = select! {
                biased;
                _ = token.cancelled() => return StreamEnd::Cancelled,
                event = stream.next() => event,
            };

            let Some(event) = event else {
                return StreamEnd::Closed;
            };

            match event {
                PodWatchEvent::Applied(pod) => {
                    self.apply(&pod).await;
                    self.advance_from(&pod);
                }
                PodWatchEvent::Deleted(pod) => {
                    self.forget(&pod).await;
                    self.advance_from(&pod);
                }
                PodWatchEvent::Bookmark { resource_version } => {
                    self.cursor.advance(resource_version);
                }
                PodWatchEvent::Expired { message } => {
                    debug!(%message, "Pod watch reported an expired resource version");
                    return StreamEnd::Expired;
                }
                PodWatchEvent::Failure { message } => {
                    debug!(%message, "Ignoring failure event on pod watch");
                }
            }
        }
    }

    fn advance_from(&self, pod: &Pod) {
        if let Some(resource_version) = &pod.metadata.resource_version {
            self.cursor.advance(resource_version.as_str());
        }
    }

    async fn apply(&self, pod: &Pod) {
        if let Some(record) = PodRecord::from_pod(pod) {
            debug!(
                component = %record.component,
                pod = %record.name,
                phase = ?record.phase,
                "Observed pod"
            );
            self.registry.handle(record).await;
        }
    }

    async fn forget(&self, pod: &Pod) {
        if self.config.deletion_policy != DeletionPolicy::Forget {
            return;
        }
        if let Some(record) = PodRecord::from_pod(pod) {
            if self.registry.forget(&record).await {
                info!(
                    component = %record.component,
                    pod = %record.name,
                    "Pod deleted, dropped its component record"
                );
            }
        }
    }

    /// Returns `true` when cancelled before `delay` elapsed.
    async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
        select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
