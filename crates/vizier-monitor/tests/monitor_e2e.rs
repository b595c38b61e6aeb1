use std::sync::Arc;
use std::time::Duration;

use api_types::VizierPhase;
use similar_asserts::assert_eq;
use test_log::test;
use vizier_monitor::config::DeletionPolicy;
use vizier_monitor::config::MonitorConfig;
use vizier_monitor::k8s::PodWatchEvent;
use vizier_monitor::mock::pod;
use vizier_monitor::mock::FakePodSource;
use vizier_monitor::mock::FakeVizierStore;
use vizier_monitor::mock::StaticProber;
use vizier_monitor::monitor::PodPhase;
use vizier_monitor::monitor::ProbeResult;
use vizier_monitor::monitor::VizierMonitor;

const CLOUD_CONNECTOR: &str = "vizier-cloud-connector";

fn config() -> MonitorConfig {
    MonitorConfig {
        reconcile_interval: Duration::from_millis(20),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        rewatch_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

async fn wait_for_phase(store: &FakeVizierStore, phase: VizierPhase) -> api_types::VizierStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(status) = store.last_update().and_then(|vz| vz.status) {
                if status.vizier_phase == phase {
                    break status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status reaches expected phase")
}

#[test(tokio::test)]
async fn failed_connector_turns_vizier_unhealthy() {
    let source = FakePodSource::new();
    source.set_list(vec![pod("cc-1", CLOUD_CONNECTOR, "Running", 100, "90")], "100");
    let store = FakeVizierStore::with_vizier("pl", "pixie");
    let mut monitor = VizierMonitor::new(
        config(),
        Arc::new(source.clone()),
        Arc::new(store.clone()),
    )
    .with_prober(Arc::new(StaticProber::new(ProbeResult::healthy())));

    monitor.start().await.expect("starts");
    wait_for_phase(&store, VizierPhase::Healthy).await;

    source.push(PodWatchEvent::Applied(pod(
        "cc-1",
        CLOUD_CONNECTOR,
        "Failed",
        100,
        "101",
    )));

    let cursor = monitor.cursor().expect("started").clone();
    let mut rv = cursor.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rv.wait_for(|rv| rv == "101"))
        .await
        .expect("cursor advances")
        .expect("cursor alive");

    let stored = monitor
        .registry()
        .expect("started")
        .get(CLOUD_CONNECTOR)
        .await
        .expect("connector tracked");
    assert_eq!(stored.phase, PodPhase::Failed);

    let status = wait_for_phase(&store, VizierPhase::Unhealthy).await;
    assert_eq!(status.vizier_reason, "");
    assert_eq!(status.message, "");

    monitor.stop();
    tokio::time::timeout(Duration::from_secs(5), monitor.join())
        .await
        .expect("stops in time")
        .expect("clean shutdown");
}

#[test(tokio::test)]
async fn rollout_keeps_newest_connector() {
    let source = FakePodSource::new();
    source.set_list(vec![pod("cc-new", CLOUD_CONNECTOR, "Pending", 200, "95")], "100");
    let store = FakeVizierStore::with_vizier("pl", "pixie");
    let mut monitor = VizierMonitor::new(
        config(),
        Arc::new(source.clone()),
        Arc::new(store.clone()),
    )
    .with_prober(Arc::new(StaticProber::new(ProbeResult::healthy())));

    monitor.start().await.expect("starts");

    // The terminating predecessor still emits events.
    source.push(PodWatchEvent::Applied(pod(
        "cc-old",
        CLOUD_CONNECTOR,
        "Failed",
        100,
        "101",
    )));
    let mut rv = monitor.cursor().expect("started").subscribe();
    tokio::time::timeout(Duration::from_secs(5), rv.wait_for(|rv| rv == "101"))
        .await
        .expect("cursor advances")
        .expect("cursor alive");

    let stored = monitor
        .registry()
        .expect("started")
        .get(CLOUD_CONNECTOR)
        .await
        .expect("connector tracked");
    assert_eq!(stored.name, "cc-new");
    wait_for_phase(&store, VizierPhase::Updating).await;

    monitor.stop();
    tokio::time::timeout(Duration::from_secs(5), monitor.join())
        .await
        .expect("stops in time")
        .expect("clean shutdown");
}

#[test(tokio::test)]
async fn forgotten_connector_disconnects_vizier() {
    let source = FakePodSource::new();
    let connector = pod("cc-1", CLOUD_CONNECTOR, "Running", 100, "90");
    source.set_list(vec![connector.clone()], "100");
    let store = FakeVizierStore::with_vizier("pl", "pixie");
    let config = MonitorConfig {
        deletion_policy: DeletionPolicy::Forget,
        ..config()
    };
    let mut monitor = VizierMonitor::new(config, Arc::new(source.clone()), Arc::new(store.clone()))
        .with_prober(Arc::new(StaticProber::new(ProbeResult::healthy())));

    monitor.start().await.expect("starts");
    wait_for_phase(&store, VizierPhase::Healthy).await;

    let mut deleted = connector;
    deleted.metadata.resource_version = Some("101".to_string());
    source.push(PodWatchEvent::Deleted(deleted));

    wait_for_phase(&store, VizierPhase::Disconnected).await;
    assert!(monitor.registry().expect("started").is_empty().await);

    monitor.stop();
    tokio::time::timeout(Duration::from_secs(5), monitor.join())
        .await
        .expect("stops in time")
        .expect("clean shutdown");
}
