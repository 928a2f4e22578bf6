mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use orchestra::application::{ResourceMonitor, TaskManager};
use orchestra::domain::models::{
    AlertSeverity, MetricKind, MetricSample, MonitoringConfig, Node, RecommendedAction, Trend,
};
use orchestra::services::{AlertEvent, EventBus, MetricsService};

use common::{memory_manager, test_config, ScriptedSource};

fn monitor_for(manager: &TaskManager, source: Arc<ScriptedSource>) -> ResourceMonitor {
    ResourceMonitor::new(
        source,
        Arc::clone(manager.metrics()),
        Arc::clone(manager.queue()),
        Arc::clone(manager.registry()),
        Arc::clone(manager.allocator()),
        Arc::clone(manager.events()),
    )
}

#[tokio::test]
async fn test_threshold_alerts_dedup_and_escalate() {
    let manager = memory_manager(test_config());
    let source = ScriptedSource::new(80.0, 20.0);
    let monitor = monitor_for(&manager, source.clone());
    let mut alert_events = manager.events().subscribe_alerts();

    monitor.sample_once().await.unwrap();
    monitor.sample_once().await.unwrap();
    let active = manager.metrics().active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, AlertSeverity::Warning);
    assert_eq!(active[0].metric, Some(MetricKind::CpuUsage));

    source.set(95.0, 20.0);
    monitor.sample_once().await.unwrap();
    let active = manager.metrics().active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, AlertSeverity::Critical);

    let mut raised = 0;
    let mut resolved = 0;
    while let Ok(event) = alert_events.try_recv() {
        match event {
            AlertEvent::Raised(_) => raised += 1,
            AlertEvent::Resolved(alert) => {
                assert_eq!(alert.severity, AlertSeverity::Warning);
                resolved += 1;
            }
        }
    }
    assert_eq!((raised, resolved), (2, 1));

    // Once resolved, the same condition may alert again.
    assert!(manager.metrics().resolve_alert(active[0].id).await);
    monitor.sample_once().await.unwrap();
    assert_eq!(manager.metrics().active_alerts().await.len(), 1);
    assert_eq!(manager.metrics().all_alerts().await.len(), 3);
}

#[tokio::test]
async fn test_saturated_node_raises_info_alert_once() {
    let manager = memory_manager(test_config());
    manager
        .registry()
        .register_node(Node::new("worker-1", ["echo"], 1))
        .await
        .unwrap();
    manager.registry().reserve_slot("worker-1").await.unwrap();

    let monitor = monitor_for(&manager, ScriptedSource::new(10.0, 10.0));
    let sample = monitor.sample_once().await.unwrap();
    monitor.sample_once().await.unwrap();
    assert_eq!(sample.per_node_metrics[0].utilization, 1.0);

    let active = manager.metrics().active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, AlertSeverity::Info);
    assert_eq!(active[0].service.as_deref(), Some("worker-1"));

    manager.registry().release_slot("worker-1").await.unwrap();
    let sample = monitor.sample_once().await.unwrap();
    assert_eq!(sample.per_node_metrics[0].current_load, 0);
}

#[tokio::test]
async fn test_rising_load_recommends_scale_up() {
    let metrics = MetricsService::new(MonitoringConfig::default(), Arc::new(EventBus::default()));
    let start = Utc::now() - ChronoDuration::seconds(60);

    for i in 0..6_i32 {
        let step = f64::from(i);
        let mut sample = MetricSample::new(62.0 + step * 5.0, 61.0 + step * 6.0)
            .with_queue(22 + i as usize * 4, 2);
        sample.timestamp = start + ChronoDuration::seconds(i64::from(i) * 10);
        metrics.record(sample).await;
    }

    let window = Duration::from_secs(300);
    assert_eq!(metrics.trend(MetricKind::CpuUsage, window).await, Trend::Degrading);
    assert_eq!(metrics.trend(MetricKind::Processing, window).await, Trend::Stable);

    let prediction = metrics.predict().await;
    assert_eq!(prediction.signals.len(), 3);
    assert!((prediction.confidence - 1.0).abs() < f64::EPSILON);
    assert_eq!(prediction.recommended_action, RecommendedAction::ScaleUp);
}

#[tokio::test]
async fn test_single_signal_only_monitors() {
    let metrics = MetricsService::new(MonitoringConfig::default(), Arc::new(EventBus::default()));
    let start = Utc::now() - ChronoDuration::seconds(60);

    for i in 0..4_i32 {
        let mut sample = MetricSample::new(65.0 + f64::from(i) * 8.0, 30.0).with_queue(0, 0);
        sample.timestamp = start + ChronoDuration::seconds(i64::from(i) * 10);
        metrics.record(sample).await;
    }

    let prediction = metrics.predict().await;
    assert_eq!(prediction.signals.len(), 1);
    assert_eq!(prediction.recommended_action, RecommendedAction::Monitor);
}
