//! Storage backends for metric persistence
//!
//! One capability trait, two implementations:
//!
//! - **In-memory** (default): two maps behind a single read/write lock,
//!   reconstructed from the backup file at boot.
//! - **Postgres** (feature `storage-postgres`): one table keyed by
//!   (name, type), transactional counter accumulation.
//!
//! The trait is async so both backends sit naturally behind the axum
//! handlers and the RPC listener; implementations must be `Send + Sync`
//! because one instance is shared across all request tasks.

pub mod error;
pub mod memory;
#[cfg(feature = "storage-postgres")]
pub mod postgres;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
#[cfg(feature = "storage-postgres")]
pub use postgres::PostgresStorage;

use async_trait::async_trait;

use crate::MetricRecord;

/// Capability interface shared by all storage backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Overwrite the gauge unconditionally.
    async fn set_gauge(&self, id: &str, value: f64) -> StorageResult<()>;

    /// Add `delta` to the stored counter, starting from zero when absent.
    async fn set_counter(&self, id: &str, delta: i64) -> StorageResult<()>;

    async fn get_gauge(&self, id: &str) -> StorageResult<f64>;

    async fn get_counter(&self, id: &str) -> StorageResult<i64>;

    /// Apply a whole batch with save semantics as one atomic unit.
    ///
    /// Concurrent readers never observe a partially applied batch.
    async fn set_all(&self, records: &[MetricRecord]) -> StorageResult<()>;

    /// Consistent point-in-time dump of every stored metric.
    async fn get_all(&self) -> StorageResult<Vec<MetricRecord>>;

    /// Liveness probe; meaningful for Postgres, trivial for memory.
    async fn ping(&self) -> StorageResult<()>;
}
