use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::models::{MetricSample, SchedulerStatus};
use crate::domain::ports::MetricsSource;
use crate::services::{EventBus, MetricsService, NodeRegistry, ResourceAllocator, TaskQueue};

/// Periodic sampler feeding the metrics service.
///
/// Each tick reads host usage from the [`MetricsSource`], combines it with
/// queue occupancy and per-node load, records the sample (which raises
/// alerts and wakes the allocator) and publishes the aggregate status.
pub struct ResourceMonitor {
    source: Arc<dyn MetricsSource>,
    metrics: Arc<MetricsService>,
    queue: Arc<TaskQueue>,
    registry: Arc<NodeRegistry>,
    allocator: Arc<ResourceAllocator>,
    events: Arc<EventBus>,
}

impl ResourceMonitor {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        metrics: Arc<MetricsService>,
        queue: Arc<TaskQueue>,
        registry: Arc<NodeRegistry>,
        allocator: Arc<ResourceAllocator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            source,
            metrics,
            queue,
            registry,
            allocator,
            events,
        }
    }

    /// Take and record one sample.
    pub async fn sample_once(&self) -> Result<MetricSample> {
        let reading = self
            .source
            .read()
            .await
            .context("Failed to read resource usage")?;
        let queue = self.queue.status().await;

        let mut sample = MetricSample::new(reading.cpu_usage_percent, reading.memory_usage_percent)
            .with_queue(queue.queue_length, queue.processing);
        sample.per_node_metrics = self.registry.node_metrics().await;

        self.metrics.record(sample.clone()).await;
        self.events
            .publish_status(scheduler_status(&self.queue, &self.allocator, Some(&sample)).await);

        debug!(
            cpu = sample.cpu_usage_percent,
            memory = sample.memory_usage_percent,
            queue_length = sample.queue_length,
            processing = sample.processing,
            "Resource check completed"
        );
        Ok(sample)
    }

    /// Sample every `period` until `shutdown` fires.
    pub fn start(self: Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            #[allow(clippy::cast_possible_truncation)]
            let interval_ms = period.as_millis() as u64;
            info!(interval_ms, "Resource monitor started");

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sample_once().await {
                            warn!(error = ?e, "Resource sample skipped");
                        }
                    }
                }
            }

            info!("Resource monitor stopped");
        })
    }
}

/// Combined queue and allocator view.
pub(crate) async fn scheduler_status(
    queue: &TaskQueue,
    allocator: &ResourceAllocator,
    latest: Option<&MetricSample>,
) -> SchedulerStatus {
    let snapshot = queue.status().await;
    SchedulerStatus {
        queue_length: snapshot.queue_length,
        processing: snapshot.processing,
        max_concurrent: snapshot.max_concurrent,
        min_concurrent: allocator.config().min_concurrent,
        last_scale_at: allocator.last_scale_at().await,
        cpu_usage: latest.map(|s| s.cpu_usage_percent),
        memory_usage: latest.map(|s| s.memory_usage_percent),
    }
}
