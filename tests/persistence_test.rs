mod common;

use serde_json::json;
use std::time::Duration;

use orchestra::application::{RecoveryReport, TaskManager};
use orchestra::domain::models::{NewTask, Task, TaskStatus};
use orchestra::domain::ports::{executor_fn, StoreMode, TaskStore};
use orchestra::infrastructure::database::{DatabaseConnection, SqliteTaskStore};

use common::{durable_config, temp_db_path};

#[tokio::test]
async fn test_completed_task_survives_restart() {
    let (_dir, path) = temp_db_path();

    let task_id = {
        let manager = TaskManager::initialize(durable_config(&path)).await.unwrap();
        assert_eq!(manager.store_mode(), StoreMode::Durable);
        manager
            .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
            .await;

        let (task, handle) = manager
            .create_task_with_handle(NewTask::new("echo", "persist me", json!({"k": "v"})))
            .await
            .unwrap();
        assert!(handle.wait().await.success);
        manager.shutdown().await;
        task.id
    };

    let manager = TaskManager::initialize(durable_config(&path)).await.unwrap();
    let task = manager.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(json!({"k": "v"})));
    assert_eq!(task.payload, json!({"k": "v"}));
    assert_eq!(manager.get_recent_tasks(10).await.len(), 1);
}

#[tokio::test]
async fn test_recover_requeues_waiting_and_fails_interrupted_tasks() {
    let (_dir, path) = temp_db_path();

    // Leave behind what a crashed process would have written.
    let (pending_id, queued_id, running_id, done_id) = {
        let db = DatabaseConnection::open_file(&path, 1).await.unwrap();
        db.migrate().await.unwrap();
        let store = SqliteTaskStore::new(db.pool().clone());

        let pending = Task::new("echo", "pending", json!(1));
        let mut queued = Task::new("echo", "queued", json!(2));
        queued.transition_to(TaskStatus::Queued).unwrap();
        let mut running = Task::new("echo", "running", json!(3));
        running.transition_to(TaskStatus::Queued).unwrap();
        running.transition_to(TaskStatus::Running).unwrap();
        let mut done = Task::new("echo", "done", json!(4));
        done.transition_to(TaskStatus::Queued).unwrap();
        done.transition_to(TaskStatus::Running).unwrap();
        done.transition_to(TaskStatus::Completed).unwrap();

        for task in [&pending, &queued, &running, &done] {
            store.insert(task).await.unwrap();
        }
        db.close().await;
        (pending.id, queued.id, running.id, done.id)
    };

    let manager = TaskManager::initialize(durable_config(&path)).await.unwrap();
    manager
        .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
        .await;

    let report = manager.recover().await.unwrap();
    assert_eq!(
        report,
        RecoveryReport {
            requeued: 2,
            interrupted: 1
        }
    );

    for id in [pending_id, queued_id] {
        if let Ok(handle) = manager.wait_for(id).await {
            let result = tokio::time::timeout(Duration::from_secs(2), handle.wait())
                .await
                .unwrap();
            assert!(result.success);
        }
        assert_eq!(manager.get_task(id).await.unwrap().status, TaskStatus::Completed);
    }

    let interrupted = manager.get_task(running_id).await.unwrap();
    assert_eq!(interrupted.status, TaskStatus::Failed);
    assert_eq!(interrupted.error.as_deref(), Some("interrupted by restart"));
    assert_eq!(manager.get_task(done_id).await.unwrap().status, TaskStatus::Completed);

    // Nothing left to recover the second time around.
    manager.shutdown().await;
    assert_eq!(manager.recover().await.unwrap(), RecoveryReport::default());
}

#[tokio::test]
async fn test_unusable_database_degrades_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the database file should be cannot be opened.
    let manager = TaskManager::initialize(durable_config(dir.path())).await.unwrap();
    assert_eq!(manager.store_mode(), StoreMode::Ephemeral);

    manager
        .register_executor("echo", executor_fn(|p, _t, _c| async move { Ok(p) }))
        .await;
    let (_, handle) = manager
        .create_task_with_handle(NewTask::new("echo", "still works", json!(null)))
        .await
        .unwrap();
    assert!(handle.wait().await.success);
}
