use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::Task;
use crate::domain::ports::{DatabaseError, StoreMode, TaskStore};

/// Process-local store used when no database is reachable.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Ephemeral
    }

    async fn insert(&self, task: &Task) -> Result<(), DatabaseError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "task {} already exists",
                task.id
            )));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<(), DatabaseError> {
        let mut tasks = self.tasks.write().await;
        let slot = tasks
            .get_mut(&task.id)
            .ok_or(DatabaseError::TaskNotFound(task.id))?;
        *slot = task.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, DatabaseError> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn list_unfinished(&self) -> Result<Vec<Task>, DatabaseError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| {
            !(t.status.is_terminal() && t.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - tasks.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_roundtrip_and_cleanup() {
        let store = MemoryTaskStore::new();
        assert_eq!(store.mode(), StoreMode::Ephemeral);

        let mut task = Task::new("echo", "t", json!(1));
        store.insert(&task).await.unwrap();
        assert!(store.insert(&task).await.is_err());

        task.transition_to(TaskStatus::Cancelled).unwrap();
        store.update(&task).await.unwrap();
        assert_eq!(store.get(task.id).await.unwrap().unwrap().status, TaskStatus::Cancelled);
        assert!(store.list_unfinished().await.unwrap().is_empty());

        let removed = store
            .delete_finished_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.list_recent(10).await.unwrap().is_empty());
    }
}
