//! Task persistence adapters
//!
//! - `SqliteTaskStore`: durable store on a WAL-mode `SQLite` pool
//! - `MemoryTaskStore`: ephemeral fallback
//! - `select_task_store`: probe-based choice between the two

pub mod connection;
pub mod memory_task_store;
pub mod selection;
pub mod sqlite_task_store;

pub use crate::domain::ports::DatabaseError;
pub use connection::DatabaseConnection;
pub use memory_task_store::MemoryTaskStore;
pub use selection::select_task_store;
pub use sqlite_task_store::SqliteTaskStore;
