//! Metrics source port - where raw resource readings come from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Host-level resource usage, both as percentages (0.0-100.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceReading {
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn read(&self) -> anyhow::Result<ResourceReading>;
}
