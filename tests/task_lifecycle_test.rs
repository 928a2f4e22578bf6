mod common;

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use orchestra::domain::errors::DomainError;
use orchestra::domain::models::{NewTask, TaskStatus};
use orchestra::domain::ports::executor_fn;
use orchestra::services::TaskEventKind;

use common::{memory_manager, test_config, wait_until};

#[tokio::test]
async fn test_echo_task_runs_to_completion() {
    let manager = memory_manager(test_config());
    manager
        .register_executor(
            "echo",
            executor_fn(|payload, _task, ctx| async move {
                ctx.report_progress(40);
                Ok(payload)
            }),
        )
        .await;
    let mut events = manager.events().subscribe_tasks();

    let (task, handle) = manager
        .create_task_with_handle(NewTask::new("echo", "say hi", json!({"msg": "hi"})))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let result = handle.wait().await;
    assert!(result.success);
    assert_eq!(result.result, Some(json!({"msg": "hi"})));

    let stored = manager.get_task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.progress_percent, 100);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at >= stored.started_at);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.task_id, task.id);
        kinds.push(event.kind);
    }
    assert_eq!(kinds.first(), Some(&TaskEventKind::Created));
    assert_eq!(kinds.get(1), Some(&TaskEventKind::Queued));
    assert_eq!(kinds.get(2), Some(&TaskEventKind::Started));
    assert!(kinds.contains(&TaskEventKind::Progress { percent: 40 }));
    assert!(matches!(kinds.last(), Some(TaskEventKind::Completed { .. })));
}

#[tokio::test]
async fn test_unknown_task_type_fails_without_blocking_queue() {
    let manager = memory_manager(test_config());
    manager
        .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
        .await;

    let (_, orphan) = manager
        .create_task_with_handle(NewTask::new("nobody-handles-this", "lost", json!(null)))
        .await
        .unwrap();
    let (_, fine) = manager
        .create_task_with_handle(NewTask::new("echo", "fine", json!(1)))
        .await
        .unwrap();

    let orphan = orphan.wait().await;
    assert!(!orphan.success);
    assert!(orphan.error.unwrap().contains("nobody-handles-this"));
    assert!(fine.wait().await.success);
}

#[tokio::test]
async fn test_higher_priority_starts_first_under_single_slot() {
    let mut config = test_config();
    config.queue.initial_concurrent = 1;
    let manager = memory_manager(config);

    let gate = Arc::new(Notify::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let gate = Arc::clone(&gate);
        manager
            .register_executor(
                "gate",
                executor_fn(move |_p, _t, _c| {
                    let gate = Arc::clone(&gate);
                    async move {
                        gate.notified().await;
                        Ok(json!(null))
                    }
                }),
            )
            .await;
    }
    {
        let order = Arc::clone(&order);
        manager
            .register_executor(
                "record",
                executor_fn(move |_p, task, _c| {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().unwrap().push(task.name);
                        Ok(json!(null))
                    }
                }),
            )
            .await;
    }

    let (_, blocker) = manager
        .create_task_with_handle(NewTask::new("gate", "blocker", json!(null)))
        .await
        .unwrap();
    let mut handles = Vec::new();
    for (name, priority) in [("low", 1), ("high", 9), ("mid", 5), ("high-later", 9)] {
        let (_, handle) = manager
            .create_task_with_handle(NewTask::new("record", name, json!(null)).priority(priority))
            .await
            .unwrap();
        handles.push(handle);
    }
    assert_eq!(manager.status().await.queue_length, 4);

    gate.notify_one();
    assert!(blocker.wait().await.success);
    for handle in handles {
        assert!(handle.wait().await.success);
    }

    assert_eq!(
        *order.lock().unwrap(),
        vec!["high", "high-later", "mid", "low"]
    );
}

#[tokio::test]
async fn test_cancel_running_task_frees_slot_immediately() {
    let mut config = test_config();
    config.queue.initial_concurrent = 1;
    let manager = memory_manager(config);

    manager
        .register_executor(
            "stuck",
            executor_fn(|_p, _t, _c| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!(null))
            }),
        )
        .await;
    manager
        .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
        .await;

    let (stuck, stuck_handle) = manager
        .create_task_with_handle(NewTask::new("stuck", "never ends", json!(null)))
        .await
        .unwrap();
    let (_, next) = manager
        .create_task_with_handle(NewTask::new("echo", "next", json!(2)))
        .await
        .unwrap();

    let running = {
        let manager = Arc::clone(&manager);
        wait_until(
            move || {
                let manager = Arc::clone(&manager);
                async move {
                    manager.get_task(stuck.id).await.map(|t| t.status).ok() == Some(TaskStatus::Running)
                }
            },
            1000,
        )
        .await
    };
    assert!(running);

    assert!(manager.cancel_task(stuck.id).await);
    let cancelled = stuck_handle.wait().await;
    assert!(!cancelled.success);
    assert_eq!(cancelled.error.as_deref(), Some("task cancelled"));

    let next = tokio::time::timeout(Duration::from_secs(2), next.wait())
        .await
        .expect("queued task should start once the slot is freed");
    assert!(next.success);

    assert_eq!(manager.get_task(stuck.id).await.unwrap().status, TaskStatus::Cancelled);
    assert!(!manager.cancel_task(stuck.id).await);
}

#[tokio::test]
async fn test_failed_attempts_are_retried_until_budget_runs_out() {
    let manager = memory_manager(test_config());
    let attempts = Arc::new(Mutex::new(Vec::new()));
    {
        let attempts = Arc::clone(&attempts);
        manager
            .register_executor(
                "flaky",
                executor_fn(move |_p, _t, ctx| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        attempts.lock().unwrap().push(ctx.attempt);
                        if ctx.attempt < 2 {
                            anyhow::bail!("transient failure {}", ctx.attempt);
                        }
                        Ok(json!("recovered"))
                    }
                }),
            )
            .await;
    }

    let (task, handle) = manager
        .create_task_with_handle(NewTask::new("flaky", "eventually works", json!(null)).retries(2, 1))
        .await
        .unwrap();
    assert!(handle.wait().await.success);
    assert_eq!(*attempts.lock().unwrap(), vec![0, 1, 2]);

    let task = manager.get_task(task.id).await.unwrap();
    assert_eq!(task.retry_count, 2);
    assert_eq!(task.error, None);

    let (_, exhausted) = manager
        .create_task_with_handle(NewTask::new("flaky", "gives up", json!(null)).retries(1, 1))
        .await
        .unwrap();
    let result = exhausted.wait().await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("transient failure 1"));
}

#[tokio::test]
async fn test_cleanup_removes_finished_tasks() {
    let manager = memory_manager(test_config());
    manager
        .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
        .await;

    let (task, handle) = manager
        .create_task_with_handle(NewTask::new("echo", "old news", json!(null)))
        .await
        .unwrap();
    handle.wait().await;

    assert_eq!(manager.cleanup(Duration::from_secs(3600)).await.unwrap(), 0);
    assert!(manager.get_task(task.id).await.is_ok());

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(manager.cleanup(Duration::ZERO).await.unwrap(), 1);
    assert!(matches!(
        manager.get_task(task.id).await,
        Err(DomainError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_recent_tasks_are_newest_first() {
    let manager = memory_manager(test_config());
    manager
        .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
        .await;

    for i in 0..3 {
        let (_, handle) = manager
            .create_task_with_handle(NewTask::new("echo", format!("task-{i}"), json!(i)))
            .await
            .unwrap();
        handle.wait().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let recent = manager.get_recent_tasks(2).await;
    let names: Vec<_> = recent.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["task-2", "task-1"]);
}
