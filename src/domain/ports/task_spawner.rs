use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{NewTask, Task};

/// Lets components create follow-up tasks without owning the coordinator.
#[async_trait]
pub trait TaskSpawner: Send + Sync {
    async fn spawn_task(&self, request: NewTask) -> DomainResult<Task>;
}
