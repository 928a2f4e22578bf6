//! Rolling metrics history, threshold alerting, trend and predictive analysis.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{
    Alert, AlertSeverity, MetricKind, MetricSample, MonitoringConfig, Prediction,
    PredictiveSignal, RecommendedAction, Trend,
};
use crate::services::event_bus::{AlertEvent, EventBus};

/// Relative change between window halves below which a metric is stable.
const STABLE_BAND: f64 = 0.10;

/// Confidence needed before two or more signals recommend scaling up.
const SCALE_UP_CONFIDENCE: f64 = 0.75;

/// Utilization at which a node raises a capacity alert.
const NODE_SATURATION: f64 = 1.0;

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let len = values.len() as f64;
    values.iter().sum::<f64>() / len
}

/// Collects samples pushed by the monitoring loop.
///
/// History is pruned lazily on every append, relative to the newest sample's
/// timestamp. Alerts are de-duplicated by `(message, service)` while
/// unresolved; a critical alert for a metric supersedes the warning for it.
pub struct MetricsService {
    config: MonitoringConfig,
    history: RwLock<VecDeque<MetricSample>>,
    alerts: RwLock<Vec<Alert>>,
    events: Arc<EventBus>,
}

impl MetricsService {
    pub fn new(config: MonitoringConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            history: RwLock::new(VecDeque::new()),
            alerts: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Append a sample, evaluate thresholds and publish it to subscribers.
    ///
    /// Returns the alerts newly raised by this sample.
    #[instrument(skip(self, sample), fields(cpu = sample.cpu_usage_percent, memory = sample.memory_usage_percent))]
    pub async fn record(&self, sample: MetricSample) -> Vec<Alert> {
        {
            let mut history = self.history.write().await;
            history.push_back(sample.clone());
            let cutoff = sample.timestamp - to_chrono(Duration::from_secs(self.config.retention_secs));
            while history.front().is_some_and(|s| s.timestamp < cutoff) {
                history.pop_front();
            }
            debug!(retained = history.len(), "Sample recorded");
        }

        let raised = self.evaluate_thresholds(&sample).await;
        self.events.publish_sample(sample);
        raised
    }

    async fn evaluate_thresholds(&self, sample: &MetricSample) -> Vec<Alert> {
        let checks = [
            (
                MetricKind::CpuUsage,
                "CPU",
                sample.cpu_usage_percent,
                self.config.cpu_warning,
                self.config.cpu_critical,
            ),
            (
                MetricKind::MemoryUsage,
                "Memory",
                sample.memory_usage_percent,
                self.config.memory_warning,
                self.config.memory_critical,
            ),
        ];

        let mut raised = Vec::new();
        for (metric, label, value, warning, critical) in checks {
            let severity = if value > critical {
                AlertSeverity::Critical
            } else if value > warning {
                AlertSeverity::Warning
            } else {
                continue;
            };

            let alert = Alert::new(severity, format!("{label} usage {severity}"), None)
                .for_metric(metric, value);
            if let Some(alert) = self.raise_alert(alert).await {
                raised.push(alert);
            }
        }

        for node in &sample.per_node_metrics {
            if node.utilization >= NODE_SATURATION {
                let alert = Alert::new(
                    AlertSeverity::Info,
                    "Node at capacity",
                    Some(node.node_id.clone()),
                );
                if let Some(alert) = self.raise_alert(alert).await {
                    raised.push(alert);
                }
            }
        }

        raised
    }

    /// Record an alert unless an unresolved duplicate exists.
    ///
    /// Returns the stored alert when it was new.
    pub async fn raise_alert(&self, alert: Alert) -> Option<Alert> {
        let mut alerts = self.alerts.write().await;

        if alerts
            .iter()
            .any(|a| !a.resolved && a.dedup_key() == alert.dedup_key())
        {
            debug!(message = %alert.message, "Duplicate alert suppressed");
            return None;
        }

        if alert.severity == AlertSeverity::Critical && alert.metric.is_some() {
            for existing in alerts.iter_mut().filter(|a| {
                !a.resolved
                    && a.severity < AlertSeverity::Critical
                    && a.metric == alert.metric
                    && a.service == alert.service
            }) {
                existing.resolve();
                info!(alert_id = %existing.id, message = %existing.message, "Alert superseded");
                self.events.publish_alert(AlertEvent::Resolved(existing.clone()));
            }
        }

        warn!(
            alert_id = %alert.id,
            severity = %alert.severity,
            message = %alert.message,
            service = ?alert.service,
            value = alert.value,
            "Alert raised"
        );
        alerts.push(alert.clone());
        self.events.publish_alert(AlertEvent::Raised(alert.clone()));
        Some(alert)
    }

    /// Resolve an alert. Unknown or already resolved alerts return false.
    pub async fn resolve_alert(&self, id: Uuid) -> bool {
        let mut alerts = self.alerts.write().await;
        let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        if !alert.resolve() {
            return false;
        }
        info!(alert_id = %id, message = %alert.message, "Alert resolved");
        self.events.publish_alert(AlertEvent::Resolved(alert.clone()));
        true
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    pub async fn latest(&self) -> Option<MetricSample> {
        self.history.read().await.back().cloned()
    }

    pub async fn history(&self) -> Vec<MetricSample> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Samples newer than `window` before the most recent one.
    async fn window_samples(&self, window: Duration) -> Vec<MetricSample> {
        let history = self.history.read().await;
        let Some(newest) = history.back().map(|s| s.timestamp) else {
            return Vec::new();
        };
        let cutoff: DateTime<Utc> = newest - to_chrono(window);
        history
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Compare the mean of the first half of the window with the second half.
    pub async fn trend(&self, metric: MetricKind, window: Duration) -> Trend {
        let samples = self.window_samples(window).await;
        Self::trend_of(metric, &samples)
    }

    fn trend_of(metric: MetricKind, samples: &[MetricSample]) -> Trend {
        if samples.len() < 2 {
            return Trend::Stable;
        }

        let values: Vec<f64> = samples.iter().map(|s| s.value_of(metric)).collect();
        let (first, second) = values.split_at(values.len() / 2);
        let first_mean = mean(first);
        let delta = mean(second) - first_mean;

        if delta.abs() < STABLE_BAND * first_mean.abs() {
            return Trend::Stable;
        }

        let rising = delta > 0.0;
        if rising == metric.higher_is_better() {
            Trend::Improving
        } else {
            Trend::Degrading
        }
    }

    fn soft_threshold(&self, metric: MetricKind) -> Option<(f64, f64)> {
        match metric {
            MetricKind::CpuUsage => Some((self.config.cpu_soft, 0.4)),
            MetricKind::MemoryUsage => Some((self.config.memory_soft, 0.4)),
            MetricKind::QueueLength => Some((self.config.queue_soft, 0.3)),
            MetricKind::Processing => None,
        }
    }

    /// Look for metrics that are degrading while already above their soft
    /// threshold, and recommend an action when several co-occur.
    pub async fn predict(&self) -> Prediction {
        let samples = self
            .window_samples(Duration::from_secs(self.config.trend_window_secs))
            .await;

        let mut signals = Vec::new();
        if let Some(current) = samples.last() {
            for metric in MetricKind::ALL {
                let Some((soft_threshold, weight)) = self.soft_threshold(metric) else {
                    continue;
                };
                let current_value = current.value_of(metric);
                if current_value > soft_threshold
                    && Self::trend_of(metric, &samples) == Trend::Degrading
                {
                    signals.push(PredictiveSignal {
                        metric,
                        current_value,
                        soft_threshold,
                        weight,
                    });
                }
            }
        }

        let confidence = signals.iter().map(|s| s.weight).sum::<f64>().min(1.0);
        let recommended_action = if signals.len() < 2 {
            RecommendedAction::Monitor
        } else if confidence >= SCALE_UP_CONFIDENCE {
            RecommendedAction::ScaleUp
        } else {
            RecommendedAction::Investigate
        };

        if recommended_action != RecommendedAction::Monitor {
            info!(
                signals = signals.len(),
                confidence,
                action = ?recommended_action,
                "Predictive analysis flagged degradation"
            );
        }

        Prediction {
            signals,
            confidence,
            recommended_action,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NodeMetrics;

    fn service() -> MetricsService {
        MetricsService::new(MonitoringConfig::default(), Arc::new(EventBus::default()))
    }

    fn sample_at(secs: i64, cpu: f64, memory: f64) -> MetricSample {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        MetricSample::new(cpu, memory).at(base + chrono::Duration::seconds(secs))
    }

    #[tokio::test]
    async fn test_critical_cpu_alert_is_deduplicated() {
        let metrics = service();

        let raised = metrics.record(sample_at(0, 95.0, 10.0)).await;
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, AlertSeverity::Critical);

        let raised = metrics.record(sample_at(5, 97.0, 10.0)).await;
        assert!(raised.is_empty());

        let active = metrics.active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "CPU usage critical");
    }

    #[tokio::test]
    async fn test_critical_supersedes_warning() {
        let metrics = service();
        metrics.record(sample_at(0, 80.0, 10.0)).await;
        assert_eq!(metrics.active_alerts().await[0].severity, AlertSeverity::Warning);

        metrics.record(sample_at(5, 92.0, 10.0)).await;
        let active = metrics.active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
        assert_eq!(metrics.all_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_alert_is_idempotent() {
        let metrics = service();
        let raised = metrics.record(sample_at(0, 10.0, 95.0)).await;
        let id = raised[0].id;

        assert!(metrics.resolve_alert(id).await);
        assert!(!metrics.resolve_alert(id).await);
        assert!(!metrics.resolve_alert(Uuid::new_v4()).await);
        assert!(metrics.active_alerts().await.is_empty());

        // Once resolved, the same condition raises a fresh alert.
        let raised = metrics.record(sample_at(5, 10.0, 95.0)).await;
        assert_eq!(raised.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_pruned_to_retention_window() {
        let config = MonitoringConfig {
            retention_secs: 60,
            ..MonitoringConfig::default()
        };
        let metrics = MetricsService::new(config, Arc::new(EventBus::default()));

        metrics.record(sample_at(0, 10.0, 10.0)).await;
        metrics.record(sample_at(30, 10.0, 10.0)).await;
        metrics.record(sample_at(90, 10.0, 10.0)).await;

        let history = metrics.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, sample_at(30, 0.0, 0.0).timestamp);
    }

    #[tokio::test]
    async fn test_trend_directions() {
        let metrics = service();
        for (i, cpu) in [20.0, 22.0, 50.0, 55.0].into_iter().enumerate() {
            metrics.record(sample_at(i as i64 * 5, cpu, 30.0)).await;
        }
        let window = Duration::from_secs(300);

        assert_eq!(metrics.trend(MetricKind::CpuUsage, window).await, Trend::Degrading);
        assert_eq!(metrics.trend(MetricKind::MemoryUsage, window).await, Trend::Stable);
    }

    #[tokio::test]
    async fn test_rising_throughput_is_improving() {
        let metrics = service();
        for (i, processing) in [1, 1, 4, 5].into_iter().enumerate() {
            let sample = sample_at(i as i64, 10.0, 10.0).with_queue(0, processing);
            metrics.record(sample).await;
        }
        assert_eq!(
            metrics.trend(MetricKind::Processing, Duration::from_secs(60)).await,
            Trend::Improving
        );
    }

    #[test]
    fn test_ten_percent_change_is_not_stable() {
        let samples: Vec<MetricSample> = [100.0, 100.0, 110.0, 110.0]
            .into_iter()
            .enumerate()
            .map(|(i, cpu)| sample_at(i as i64 * 10, cpu, 30.0))
            .collect();
        assert_eq!(
            MetricsService::trend_of(MetricKind::CpuUsage, &samples),
            Trend::Degrading
        );

        let samples: Vec<MetricSample> = [100.0, 100.0, 109.0, 109.0]
            .into_iter()
            .enumerate()
            .map(|(i, cpu)| sample_at(i as i64 * 10, cpu, 30.0))
            .collect();
        assert_eq!(
            MetricsService::trend_of(MetricKind::CpuUsage, &samples),
            Trend::Stable
        );
    }

    #[tokio::test]
    async fn test_trend_with_single_sample_is_stable() {
        let metrics = service();
        metrics.record(sample_at(0, 50.0, 50.0)).await;
        assert_eq!(
            metrics.trend(MetricKind::CpuUsage, Duration::from_secs(60)).await,
            Trend::Stable
        );
    }

    #[tokio::test]
    async fn test_prediction_requires_two_signals() {
        let metrics = service();
        for (i, cpu) in [50.0, 52.0, 65.0, 70.0].into_iter().enumerate() {
            metrics.record(sample_at(i as i64, cpu, 30.0)).await;
        }
        let prediction = metrics.predict().await;
        assert_eq!(prediction.signals.len(), 1);
        assert_eq!(prediction.recommended_action, RecommendedAction::Monitor);

        let metrics = service();
        for (i, load) in [50.0, 52.0, 65.0, 70.0].into_iter().enumerate() {
            metrics.record(sample_at(i as i64, load, load)).await;
        }
        let prediction = metrics.predict().await;
        assert_eq!(prediction.signals.len(), 2);
        assert!((prediction.confidence - 0.8).abs() < 1e-9);
        assert_eq!(prediction.recommended_action, RecommendedAction::ScaleUp);
    }

    #[tokio::test]
    async fn test_prediction_investigates_on_weaker_signals() {
        let metrics = service();
        for (i, (cpu, queue)) in [(50.0, 10), (52.0, 12), (65.0, 30), (70.0, 40)]
            .into_iter()
            .enumerate()
        {
            let sample = sample_at(i as i64, cpu, 20.0).with_queue(queue, 1);
            metrics.record(sample).await;
        }
        let prediction = metrics.predict().await;
        assert_eq!(prediction.signals.len(), 2);
        assert_eq!(prediction.recommended_action, RecommendedAction::Investigate);
    }

    #[tokio::test]
    async fn test_saturated_node_alert_carries_service() {
        let metrics = service();
        let mut sample = sample_at(0, 10.0, 10.0);
        sample.per_node_metrics.push(NodeMetrics {
            node_id: "worker-1".into(),
            current_load: 2,
            max_concurrent_tasks: 2,
            utilization: 1.0,
        });

        let raised = metrics.record(sample.clone()).await;
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].service.as_deref(), Some("worker-1"));
        assert!(metrics.record(sample).await.is_empty());
    }

    #[tokio::test]
    async fn test_samples_are_published() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe_samples();
        let metrics = MetricsService::new(MonitoringConfig::default(), Arc::clone(&events));

        metrics.record(sample_at(0, 10.0, 10.0)).await;
        let published = rx.recv().await.unwrap();
        assert!((published.cpu_usage_percent - 10.0).abs() < f64::EPSILON);
    }
}
