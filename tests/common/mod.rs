//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use orchestra::application::TaskManager;
use orchestra::domain::models::Config;
use orchestra::domain::ports::{MetricsSource, ResourceReading};
use orchestra::infrastructure::database::MemoryTaskStore;
use orchestra::services::LatestSubmissionJudge;

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
#[allow(dead_code)]
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("orchestra.db");
    (dir, db_path)
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Config with persistence off and quick retries.
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.enabled = false;
    config.queue.retry_delay_ms = 5;
    config
}

/// Config pointing the durable store at `path`.
#[allow(dead_code)]
pub fn durable_config(path: &std::path::Path) -> Config {
    let mut config = test_config();
    config.database.enabled = true;
    config.database.path = path.display().to_string();
    config
}

/// Manager over an in-memory store.
#[allow(dead_code)]
pub fn memory_manager(config: Config) -> Arc<TaskManager> {
    TaskManager::from_parts(
        config,
        Arc::new(MemoryTaskStore::new()),
        Arc::new(LatestSubmissionJudge),
    )
    .expect("Failed to build task manager")
}

/// Poll an async predicate every 10ms until it holds or `timeout_ms` passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Metrics source returning whatever reading was last set.
#[allow(dead_code)]
pub struct ScriptedSource {
    reading: Mutex<ResourceReading>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(cpu: f64, memory: f64) -> Arc<Self> {
        Arc::new(Self {
            reading: Mutex::new(ResourceReading {
                cpu_usage_percent: cpu,
                memory_usage_percent: memory,
            }),
        })
    }

    pub fn set(&self, cpu: f64, memory: f64) {
        *self.reading.lock().unwrap() = ResourceReading {
            cpu_usage_percent: cpu,
            memory_usage_percent: memory,
        };
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn read(&self) -> Result<ResourceReading> {
        Ok(*self.reading.lock().unwrap())
    }
}
