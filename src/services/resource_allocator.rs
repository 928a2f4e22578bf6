//! Adjusts the queue's concurrency ceiling from resource samples.
//!
//! A hysteresis controller: independent high and low watermarks for CPU and
//! memory plus a cooldown between changes. Pressure lowers the ceiling; idle
//! resources with a backlog raise it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AllocationUpdate, AllocatorConfig, MetricSample, ScaleReason};
use crate::services::event_bus::EventBus;
use crate::services::task_queue::TaskQueue;

/// Check watermark ordering and bounds.
pub fn validate_allocator_config(config: &AllocatorConfig) -> DomainResult<()> {
    if config.min_concurrent == 0 {
        return Err(DomainError::Validation(
            "allocator.min_concurrent must be at least 1".to_string(),
        ));
    }
    if config.min_concurrent > config.max_concurrent {
        return Err(DomainError::Validation(format!(
            "allocator.min_concurrent ({}) exceeds max_concurrent ({})",
            config.min_concurrent, config.max_concurrent
        )));
    }
    if config.scale_step == 0 {
        return Err(DomainError::Validation(
            "allocator.scale_step must be at least 1".to_string(),
        ));
    }

    for (name, value) in [
        ("cpu_high", config.cpu_high),
        ("cpu_low", config.cpu_low),
        ("mem_high", config.mem_high),
        ("mem_low", config.mem_low),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(DomainError::Validation(format!(
                "allocator.{name} must be between 0 and 100, got {value}"
            )));
        }
    }
    if config.cpu_low >= config.cpu_high {
        return Err(DomainError::Validation(format!(
            "allocator.cpu_low ({}) must be below cpu_high ({})",
            config.cpu_low, config.cpu_high
        )));
    }
    if config.mem_low >= config.mem_high {
        return Err(DomainError::Validation(format!(
            "allocator.mem_low ({}) must be below mem_high ({})",
            config.mem_low, config.mem_high
        )));
    }
    Ok(())
}

pub struct ResourceAllocator {
    config: AllocatorConfig,
    queue: Arc<TaskQueue>,
    events: Arc<EventBus>,
    /// Timestamp of the last ceiling change, in sample time.
    last_scale_at: Mutex<Option<DateTime<Utc>>>,
}

impl ResourceAllocator {
    pub fn new(config: AllocatorConfig, queue: Arc<TaskQueue>, events: Arc<EventBus>) -> DomainResult<Self> {
        validate_allocator_config(&config)?;
        Ok(Self {
            config,
            queue,
            events,
            last_scale_at: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub async fn last_scale_at(&self) -> Option<DateTime<Utc>> {
        *self.last_scale_at.lock().await
    }

    /// Evaluate one sample and apply any change to the queue.
    ///
    /// "Now" is the sample's timestamp, so replaying samples is deterministic.
    #[instrument(skip(self, sample), fields(cpu = sample.cpu_usage_percent, memory = sample.memory_usage_percent, queue_length = sample.queue_length))]
    pub async fn evaluate(&self, sample: &MetricSample) -> DomainResult<Option<AllocationUpdate>> {
        if !sample.cpu_usage_percent.is_finite() || !sample.memory_usage_percent.is_finite() {
            return Err(DomainError::AllocatorDegraded(format!(
                "non-finite reading (cpu={}, memory={})",
                sample.cpu_usage_percent, sample.memory_usage_percent
            )));
        }

        let mut last_scale_at = self.last_scale_at.lock().await;
        let now = sample.timestamp;

        if let Some(last) = *last_scale_at {
            let cooldown = chrono::Duration::milliseconds(
                i64::try_from(self.config.cooldown_ms).unwrap_or(i64::MAX),
            );
            if now - last < cooldown {
                debug!(last_scale_at = %last, "Within cooldown");
                return Ok(None);
            }
        }

        let cfg = &self.config;
        let current = self.queue.max_concurrent().await;
        let high_pressure =
            sample.cpu_usage_percent >= cfg.cpu_high || sample.memory_usage_percent >= cfg.mem_high;
        let idle_with_backlog = sample.cpu_usage_percent <= cfg.cpu_low
            && sample.memory_usage_percent <= cfg.mem_low
            && sample.queue_length >= cfg.queue_pressure_threshold;

        let (target, reason) = if high_pressure {
            (
                current.saturating_sub(cfg.scale_step).max(cfg.min_concurrent),
                ScaleReason::HighPressure,
            )
        } else if idle_with_backlog {
            (
                current.saturating_add(cfg.scale_step).min(cfg.max_concurrent),
                ScaleReason::QueuePressure,
            )
        } else {
            return Ok(None);
        };

        if target == current {
            debug!(current, reason = %reason, "Ceiling already at bound");
            return Ok(None);
        }

        self.queue.set_max_concurrent(target).await?;
        *last_scale_at = Some(now);

        let update = AllocationUpdate {
            previous: current,
            current: target,
            reason,
            cpu_usage: sample.cpu_usage_percent,
            memory_usage: sample.memory_usage_percent,
            queue_length: sample.queue_length,
            processing: sample.processing,
            timestamp: now,
        };
        info!(previous = current, current = target, reason = %reason, "Concurrency ceiling adjusted");
        self.events.publish_allocation(update.clone());
        Ok(Some(update))
    }

    /// Evaluate every sample published on the bus until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut samples = self.events.subscribe_samples();
        tokio::spawn(async move {
            info!("Resource allocator started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    received = samples.recv() => match received {
                        Ok(sample) => {
                            if let Err(e) = self.evaluate(&sample).await {
                                warn!(error = %e, "Allocator evaluation failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Allocator lagged behind metric samples");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            info!("Resource allocator stopped");
        })
    }
}
