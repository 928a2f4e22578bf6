use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{DatabaseError, StoreMode, TaskStore};

/// Timestamps are stored as fixed-width RFC3339 so string order is time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.as_deref().map(parse_timestamp).transpose()
}

fn int<T: TryFrom<i64>>(row: &SqliteRow, column: &str) -> Result<T, DatabaseError> {
    let raw: i64 = row.try_get(column)?;
    T::try_from(raw).map_err(|_| DatabaseError::ParseError(format!("{column} out of range: {raw}")))
}

/// `SQLite` implementation of [`TaskStore`]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> Result<Task, DatabaseError> {
        let status: String = row.try_get("status")?;
        let result: Option<String> = row.try_get("result")?;

        Ok(Task {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            task_type: row.try_get("task_type")?,
            name: row.try_get("name")?,
            priority: int(row, "priority")?,
            payload: serde_json::from_str(&row.try_get::<String, _>("payload")?)?,
            metadata: serde_json::from_str(&row.try_get::<String, _>("metadata")?)?,
            status: TaskStatus::from_str(&status)
                .ok_or_else(|| DatabaseError::ParseError(format!("unknown task status '{status}'")))?,
            progress_percent: int(row, "progress_percent")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            started_at: parse_optional_timestamp(row.try_get("started_at")?)?,
            completed_at: parse_optional_timestamp(row.try_get("completed_at")?)?,
            result: result.as_deref().map(serde_json::from_str).transpose()?,
            error: row.try_get("error")?,
            retry_count: int(row, "retry_count")?,
            max_retries: int(row, "max_retries")?,
            retry_delay_ms: int(row, "retry_delay_ms")?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Durable
    }

    async fn insert(&self, task: &Task) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r"INSERT INTO tasks (
                id, task_type, name, priority, payload, metadata, status, progress_percent,
                created_at, started_at, completed_at, result, error,
                retry_count, max_retries, retry_delay_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(&task.task_type)
        .bind(&task.name)
        .bind(task.priority)
        .bind(serde_json::to_string(&task.payload)?)
        .bind(serde_json::to_string(&task.metadata)?)
        .bind(task.status.as_str())
        .bind(i64::from(task.progress_percent))
        .bind(format_timestamp(task.created_at))
        .bind(task.started_at.map(format_timestamp))
        .bind(task.completed_at.map(format_timestamp))
        .bind(task.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&task.error)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(i64::try_from(task.retry_delay_ms).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                DatabaseError::ConstraintViolation(format!("task {} already exists", task.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, task: &Task) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r"UPDATE tasks SET
                priority = ?, metadata = ?, status = ?, progress_percent = ?,
                started_at = ?, completed_at = ?, result = ?, error = ?, retry_count = ?
            WHERE id = ?",
        )
        .bind(task.priority)
        .bind(serde_json::to_string(&task.metadata)?)
        .bind(task.status.as_str())
        .bind(i64::from(task.progress_percent))
        .bind(task.started_at.map(format_timestamp))
        .bind(task.completed_at.map(format_timestamp))
        .bind(task.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&task.error)
        .bind(i64::from(task.retry_count))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::TaskNotFound(task.id));
        }
        debug!(task_id = %task.id, status = %task.status, "Task persisted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_task)
            .transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, DatabaseError> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn list_unfinished(&self) -> Result<Vec<Task>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE status IN ('pending', 'queued', 'running') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r"DELETE FROM tasks
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND completed_at IS NOT NULL
              AND completed_at < ?",
        )
        .bind(format_timestamp(cutoff))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
