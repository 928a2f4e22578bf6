use anyhow::Result;
use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;

use crate::domain::ports::{MetricsSource, ResourceReading};

/// Host CPU and memory usage read through `sysinfo`.
///
/// CPU usage is computed between two refreshes, so the very first reading
/// after construction may report zero.
pub struct SystemMetricsSource {
    system: Mutex<System>,
}

impl SystemMetricsSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());

        Self {
            system: Mutex::new(System::new_with_specifics(refresh_kind)),
        }
    }
}

impl Default for SystemMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SystemMetricsSource {
    #[allow(clippy::cast_precision_loss)]
    async fn read(&self) -> Result<ResourceReading> {
        let mut sys = self.system.lock().await;
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            anyhow::bail!("system reported zero total memory");
        }

        Ok(ResourceReading {
            cpu_usage_percent: f64::from(sys.global_cpu_usage()),
            memory_usage_percent: sys.used_memory() as f64 / total as f64 * 100.0,
        })
    }
}
