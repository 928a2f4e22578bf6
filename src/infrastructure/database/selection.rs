use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::models::DatabaseConfig;
use crate::domain::ports::{DatabaseError, TaskStore};

use super::{DatabaseConnection, MemoryTaskStore, SqliteTaskStore};

async fn open_durable(config: &DatabaseConfig) -> Result<SqliteTaskStore, DatabaseError> {
    let db = DatabaseConnection::open_file(&config.path, config.max_connections).await?;
    db.migrate().await?;
    db.probe().await?;
    Ok(SqliteTaskStore::new(db.pool().clone()))
}

/// Pick the persistence strategy.
///
/// The durable store is used when enabled and its connectivity probe passes;
/// otherwise tasks are kept in memory and a degraded-mode warning is logged.
pub async fn select_task_store(config: &DatabaseConfig) -> Arc<dyn TaskStore> {
    if !config.enabled {
        info!("Database disabled; using in-memory task store");
        return Arc::new(MemoryTaskStore::new());
    }

    match open_durable(config).await {
        Ok(store) => {
            info!(path = %config.path, "Using durable task store");
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                path = %config.path,
                error = %e,
                "Database unavailable; running in degraded mode with an in-memory task store"
            );
            Arc::new(MemoryTaskStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::StoreMode;

    #[tokio::test]
    async fn test_durable_when_reachable() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("orchestra.db").display().to_string(),
            ..DatabaseConfig::default()
        };
        assert_eq!(select_task_store(&config).await.mode(), StoreMode::Durable);
    }

    #[tokio::test]
    async fn test_falls_back_when_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let config = DatabaseConfig {
            path: dir.path().display().to_string(),
            ..DatabaseConfig::default()
        };
        assert_eq!(select_task_store(&config).await.mode(), StoreMode::Ephemeral);
    }

    #[tokio::test]
    async fn test_disabled_uses_memory() {
        let config = DatabaseConfig {
            enabled: false,
            ..DatabaseConfig::default()
        };
        assert_eq!(select_task_store(&config).await.mode(), StoreMode::Ephemeral);
    }
}
