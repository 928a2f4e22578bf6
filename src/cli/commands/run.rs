//! Implementation of the `orchestra run` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::application::{RecoveryReport, TaskManager};
use crate::cli::commands::echo_executor;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, SchedulerStatus};
use crate::infrastructure::SystemMetricsSource;
use crate::services::AlertEvent;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Register the built-in `echo` executor
    #[arg(long)]
    pub echo: bool,

    /// Override the sampling interval in milliseconds
    #[arg(long)]
    pub sample_interval_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub store: String,
    pub recovered: RecoveryReport,
    pub scale_events: usize,
    pub alerts_raised: usize,
    pub status: SchedulerStatus,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        [
            "Scheduler stopped".to_string(),
            format!("  Store: {}", self.store),
            format!(
                "  Recovered: {} requeued, {} interrupted",
                self.recovered.requeued, self.recovered.interrupted
            ),
            format!("  Scale events: {}", self.scale_events),
            format!("  Alerts raised: {}", self.alerts_raised),
            format!(
                "  Final ceiling: {} (queued {}, running {})",
                self.status.max_concurrent, self.status.queue_length, self.status.processing
            ),
        ]
        .join("\n")
    }
}

pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(ms) = args.sample_interval_ms {
        config.monitoring.sample_interval_ms = ms;
    }

    let manager = TaskManager::initialize(config).await?;
    if args.echo {
        manager
            .register_executor("echo", echo_executor(Duration::from_millis(100)))
            .await;
    }
    let recovered = manager
        .recover()
        .await
        .context("Failed to recover unfinished tasks")?;

    let mut allocations = manager.events().subscribe_allocations();
    let mut alerts = manager.events().subscribe_alerts();
    manager
        .start_monitoring(Arc::new(SystemMetricsSource::new()))
        .await;

    if !json_mode {
        println!("Starting Orchestra scheduler");
        println!("   Store: {}", manager.store_mode());
        println!(
            "   Concurrency: {} (bounds {}..={})",
            manager.config().queue.initial_concurrent,
            manager.config().allocator.min_concurrent,
            manager.config().allocator.max_concurrent
        );
        println!("   Sample interval: {}ms", manager.config().monitoring.sample_interval_ms);
        println!("Press Ctrl-C to stop");
        println!();
    }

    let mut scale_events = 0;
    let mut alerts_raised = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("Failed to listen for Ctrl-C")?;
                break;
            }
            update = allocations.recv() => match update {
                Ok(update) => {
                    scale_events += 1;
                    if !json_mode {
                        println!(
                            "Concurrency {} -> {} ({})",
                            update.previous, update.current, update.reason
                        );
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            event = alerts.recv() => match event {
                Ok(AlertEvent::Raised(alert)) => {
                    alerts_raised += 1;
                    if !json_mode {
                        println!("[{}] {}", alert.severity, alert.message);
                    }
                }
                Ok(AlertEvent::Resolved(alert)) => {
                    if !json_mode {
                        println!("Resolved: {}", alert.message);
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.shutdown().await;
    let status = manager.status().await;
    output(
        &RunOutput {
            store: manager.store_mode().to_string(),
            recovered,
            scale_events,
            alerts_raised,
            status,
        },
        json_mode,
    );
    Ok(())
}
