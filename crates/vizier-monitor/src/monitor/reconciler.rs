//! Periodic evaluation of the Vizier health and write-back to its status.

use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use tokio::select;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::k8s::MonitorError;
use crate::k8s::NamespacedName;
use crate::k8s::VizierStore;
use crate::monitor::prober::Prober;
use crate::monitor::registry::PodRegistry;
use crate::monitor::status::StatusOutcome;
use crate::monitor::status::StatusStrategy;

pub struct Reconciler {
    registry: PodRegistry,
    prober: Arc<dyn Prober>,
    strategy: Arc<dyn StatusStrategy>,
    store: Arc<dyn VizierStore>,
    vizier: NamespacedName,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        registry: PodRegistry,
        prober: Arc<dyn Prober>,
        strategy: Arc<dyn StatusStrategy>,
        store: Arc<dyn VizierStore>,
        vizier: NamespacedName,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            prober,
            strategy,
            store,
            vizier,
            interval,
        }
    }

    /// Evaluates the current registry contents and writes the outcome to the
    /// Vizier status. Nothing is retried here; the next tick starts over.
    pub async fn reconcile_once(&self) -> Result<StatusOutcome, Report<MonitorError>> {
        let snapshot = self.registry.snapshot().await;
        let outcome = self.strategy.evaluate(&snapshot, self.prober.as_ref()).await;

        let mut vizier = self.store.get(&self.vizier).await?;
        vizier.set_health(outcome.phase, &outcome.reason);
        self.store.update(&vizier).await?;

        debug!(
            vizier = %self.vizier,
            phase = %outcome.phase,
            reason = %outcome.reason,
            "Updated vizier status"
        );
        Ok(outcome)
    }

    /// Reconciles every `interval` until `token` is cancelled. The first
    /// reconciliation happens one interval after start.
    #[tracing::instrument(skip_all, fields(vizier = %self.vizier))]
    pub async fn run(&self, token: CancellationToken) {
        info!(interval = ?self.interval, "Starting status reconciler");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                biased;
                _ = token.cancelled() => {
                    info!("Status reconciler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        error!("Failed to reconcile vizier status: {e:?}");
                    }
                }
            }
        }
    }
}
