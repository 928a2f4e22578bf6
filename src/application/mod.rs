pub mod resource_monitor;
pub mod task_manager;

pub use resource_monitor::ResourceMonitor;
pub use task_manager::{RecoveryReport, TaskManager};
