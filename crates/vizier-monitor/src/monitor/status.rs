//! Derivation of the aggregate Vizier phase from the registry contents.

use api_types::VizierPhase;
use async_trait::async_trait;
use tracing::debug;

use crate::monitor::prober::Prober;
use crate::monitor::registry::PodPhase;
use crate::monitor::registry::RegistrySnapshot;

/// Phase plus the reason explaining it. The reason is empty unless a pod
/// reported one through its statusz endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub phase: VizierPhase,
    pub reason: String,
}

impl StatusOutcome {
    pub fn new(phase: VizierPhase) -> Self {
        Self {
            phase,
            reason: String::new(),
        }
    }

    pub fn with_reason(phase: VizierPhase, reason: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
        }
    }
}

/// Strategy turning a registry snapshot into a [`StatusOutcome`].
#[async_trait]
pub trait StatusStrategy: Send + Sync {
    async fn evaluate(&self, pods: &RegistrySnapshot, prober: &dyn Prober) -> StatusOutcome;
}

/// Uses the cloud connector as a proxy for the whole Vizier: it only reaches
/// a healthy state once the components it depends on are up. Other
/// components are not inspected.
#[derive(Debug, Clone)]
pub struct CloudConnectorStrategy {
    component: String,
}

impl CloudConnectorStrategy {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Default for CloudConnectorStrategy {
    fn default() -> Self {
        Self::new(crate::config::CLOUD_CONNECTOR_LABEL)
    }
}

#[async_trait]
impl StatusStrategy for CloudConnectorStrategy {
    async fn evaluate(&self, pods: &RegistrySnapshot, prober: &dyn Prober) -> StatusOutcome {
        let Some(connector) = pods.get(&self.component) else {
            return StatusOutcome::new(VizierPhase::Disconnected);
        };

        match connector.phase {
            PodPhase::Pending => return StatusOutcome::new(VizierPhase::Updating),
            PodPhase::Running => {}
            _ => return StatusOutcome::new(VizierPhase::Unhealthy),
        }

        debug!(pod = %connector.name, "Cloud connector is running, checking statusz");
        let result = prober.probe(connector).await;
        if !result.healthy {
            return StatusOutcome::with_reason(VizierPhase::Unhealthy, result.diagnostic);
        }

        StatusOutcome::new(VizierPhase::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::mock::record;
    use crate::mock::StaticProber;
    use crate::monitor::prober::ProbeResult;

    fn snapshot_with(phase: PodPhase) -> RegistrySnapshot {
        [record("cc-1", phase)].into_iter().collect()
    }

    #[test(tokio::test)]
    async fn missing_connector_is_disconnected() {
        let prober = StaticProber::new(ProbeResult::healthy());
        let mut other = record("kelvin-1", PodPhase::Running);
        other.component = "kelvin".to_string();
        let pods: RegistrySnapshot = [other].into_iter().collect();

        let outcome = CloudConnectorStrategy::default().evaluate(&pods, &prober).await;

        assert_eq!(outcome, StatusOutcome::new(VizierPhase::Disconnected));
        assert_eq!(prober.calls(), 0);
    }

    #[test(tokio::test)]
    async fn empty_registry_is_disconnected() {
        let prober = StaticProber::new(ProbeResult::healthy());

        let outcome = CloudConnectorStrategy::default()
            .evaluate(&RegistrySnapshot::default(), &prober)
            .await;

        assert_eq!(outcome.phase, VizierPhase::Disconnected);
    }

    #[test(tokio::test)]
    async fn pending_connector_is_updating_without_probing() {
        for probe in [ProbeResult::healthy(), ProbeResult::unhealthy("boom")] {
            let prober = StaticProber::new(probe);

            let outcome = CloudConnectorStrategy::default()
                .evaluate(&snapshot_with(PodPhase::Pending), &prober)
                .await;

            assert_eq!(outcome, StatusOutcome::new(VizierPhase::Updating));
            assert_eq!(prober.calls(), 0);
        }
    }

    #[test(tokio::test)]
    async fn terminal_or_unknown_connector_is_unhealthy_without_probing() {
        for phase in [PodPhase::Failed, PodPhase::Succeeded, PodPhase::Unknown] {
            let prober = StaticProber::new(ProbeResult::healthy());

            let outcome = CloudConnectorStrategy::default()
                .evaluate(&snapshot_with(phase), &prober)
                .await;

            assert_eq!(outcome, StatusOutcome::new(VizierPhase::Unhealthy));
            assert_eq!(prober.calls(), 0);
        }
    }

    #[test(tokio::test)]
    async fn running_connector_with_healthy_statusz_is_healthy() {
        let prober = StaticProber::new(ProbeResult::healthy());

        let outcome = CloudConnectorStrategy::default()
            .evaluate(&snapshot_with(PodPhase::Running), &prober)
            .await;

        assert_eq!(outcome, StatusOutcome::new(VizierPhase::Healthy));
        assert_eq!(prober.calls(), 1);
    }

    #[test(tokio::test)]
    async fn running_connector_with_failing_statusz_reports_diagnostic() {
        let prober = StaticProber::new(ProbeResult::unhealthy("db unreachable"));

        let outcome = CloudConnectorStrategy::default()
            .evaluate(&snapshot_with(PodPhase::Running), &prober)
            .await;

        assert_eq!(
            outcome,
            StatusOutcome::with_reason(VizierPhase::Unhealthy, "db unreachable")
        );
    }

    #[test(tokio::test)]
    async fn custom_component_label_is_honoured() {
        let prober = StaticProber::new(ProbeResult::healthy());
        let mut connector = record("cc-1", PodPhase::Running);
        connector.component = "custom-connector".to_string();
        let pods: RegistrySnapshot = [connector].into_iter().collect();

        let outcome = CloudConnectorStrategy::new("custom-connector")
            .evaluate(&pods, &prober)
            .await;

        assert_eq!(outcome.phase, VizierPhase::Healthy);
    }
}
