pub mod error;
pub mod idempotency;
pub mod lock;
pub mod memory;
pub mod postgres_store;
pub mod redb_store;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
pub use lock::{DistributedLock, InMemoryLockService, LockToken};
pub use memory::{InMemoryPersistence, InMemoryQueue, InMemoryTracker};
pub use postgres_store::PostgresStore;
pub use redb_store::RedbStore;
pub use state::{ExecutionState, ExecutionStatus, StageResult, StageStatus};
pub use store::{MessageQueue, PersistenceStore, TrackerStore};
