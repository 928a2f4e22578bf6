pub mod arena_manager;
pub mod event_bus;
pub mod judge;
pub mod metrics_service;
pub mod node_registry;
pub mod resource_allocator;
pub mod task_queue;

pub use arena_manager::ArenaManager;
pub use event_bus::{AlertEvent, EventBus, EventBusConfig, SequenceNumber, TaskEvent, TaskEventKind};
pub use judge::LatestSubmissionJudge;
pub use metrics_service::MetricsService;
pub use node_registry::NodeRegistry;
pub use resource_allocator::{validate_allocator_config, ResourceAllocator};
pub use task_queue::{TaskHandle, TaskQueue};
