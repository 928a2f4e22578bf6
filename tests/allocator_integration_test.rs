mod common;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use orchestra::domain::errors::DomainError;
use orchestra::domain::models::{MetricSample, NewTask, ScaleReason};
use orchestra::domain::ports::executor_fn;

use common::{memory_manager, test_config, wait_until, ScriptedSource};

fn sample_at(cpu: f64, memory: f64, queue_length: usize, offset_secs: i64) -> MetricSample {
    let mut sample = MetricSample::new(cpu, memory).with_queue(queue_length, 0);
    sample.timestamp = Utc::now() + ChronoDuration::seconds(offset_secs);
    sample
}

#[tokio::test]
async fn test_cooldown_suppresses_consecutive_changes() {
    let mut config = test_config();
    config.allocator.cooldown_ms = 30_000;
    let manager = memory_manager(config);
    let allocator = manager.allocator();

    let first = allocator.evaluate(&sample_at(95.0, 30.0, 0, 0)).await.unwrap();
    assert_eq!(first.map(|u| (u.previous, u.current)), Some((4, 3)));

    assert!(allocator
        .evaluate(&sample_at(95.0, 30.0, 0, 10))
        .await
        .unwrap()
        .is_none());
    assert_eq!(manager.queue().max_concurrent().await, 3);

    let after = allocator.evaluate(&sample_at(95.0, 30.0, 0, 31)).await.unwrap();
    assert_eq!(after.map(|u| u.current), Some(2));
}

#[tokio::test]
async fn test_ceiling_stays_within_bounds() {
    let mut config = test_config();
    config.allocator.cooldown_ms = 0;
    config.allocator.min_concurrent = 2;
    config.allocator.max_concurrent = 6;
    config.allocator.scale_step = 3;
    let manager = memory_manager(config);
    let allocator = manager.allocator();

    for i in 0..5 {
        allocator.evaluate(&sample_at(99.0, 99.0, 0, i)).await.unwrap();
        assert!(manager.queue().max_concurrent().await >= 2);
    }
    assert_eq!(manager.queue().max_concurrent().await, 2);

    for i in 5..10 {
        allocator.evaluate(&sample_at(5.0, 5.0, 50, i)).await.unwrap();
        assert!(manager.queue().max_concurrent().await <= 6);
    }
    assert_eq!(manager.queue().max_concurrent().await, 6);
    assert!(manager.status().await.last_scale_at.is_some());
}

#[tokio::test]
async fn test_middle_band_and_small_backlog_leave_ceiling_alone() {
    let manager = memory_manager(test_config());
    let allocator = manager.allocator();

    assert!(allocator.evaluate(&sample_at(60.0, 60.0, 100, 0)).await.unwrap().is_none());
    assert!(allocator.evaluate(&sample_at(10.0, 10.0, 1, 0)).await.unwrap().is_none());
    assert!(matches!(
        allocator.evaluate(&sample_at(f64::NAN, 10.0, 0, 0)).await,
        Err(DomainError::AllocatorDegraded(_))
    ));
    assert_eq!(manager.queue().max_concurrent().await, 4);
}

#[tokio::test]
async fn test_monitoring_loop_scales_down_then_up() {
    let mut config = test_config();
    config.allocator.cooldown_ms = 0;
    config.allocator.max_concurrent = 6;
    config.allocator.queue_pressure_threshold = 3;
    config.monitoring.sample_interval_ms = 10;
    let manager = memory_manager(config);
    let mut allocations = manager.events().subscribe_allocations();

    let release = CancellationToken::new();
    {
        let release = release.clone();
        manager
            .register_executor(
                "gate",
                executor_fn(move |_p, _t, _c| {
                    let release = release.clone();
                    async move {
                        release.cancelled().await;
                        Ok(json!(null))
                    }
                }),
            )
            .await;
    }

    let source = ScriptedSource::new(95.0, 40.0);
    assert!(manager.start_monitoring(source.clone()).await);
    assert!(!manager.start_monitoring(source.clone()).await);

    let reached_min = {
        let manager = Arc::clone(&manager);
        wait_until(
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.queue().max_concurrent().await == 1 }
            },
            2000,
        )
        .await
    };
    assert!(reached_min);

    // One running, the rest waiting behind the single slot.
    let mut handles = Vec::new();
    for i in 0..12 {
        let (_, handle) = manager
            .create_task_with_handle(NewTask::new("gate", format!("held-{i}"), json!(null)))
            .await
            .unwrap();
        handles.push(handle);
    }
    source.set(10.0, 10.0);

    let reached_max = {
        let manager = Arc::clone(&manager);
        wait_until(
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.queue().max_concurrent().await == 6 }
            },
            2000,
        )
        .await
    };
    assert!(reached_max);

    manager.shutdown().await;

    let mut saw_high = false;
    let mut saw_backlog = false;
    while let Ok(update) = allocations.try_recv() {
        assert!((1..=6).contains(&update.current));
        match update.reason {
            ScaleReason::HighPressure => saw_high = true,
            ScaleReason::QueuePressure => saw_backlog = true,
        }
    }
    assert!(saw_high && saw_backlog);

    release.cancel();
    for handle in handles {
        let result = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("held task should finish once released");
        assert!(result.success);
    }
}
