//! Pluggable destination for the batch loader.

use async_trait::async_trait;
use serde_json::Value;

use super::{ColumnSpec, Record, TableSpec};
use crate::error::SinkResult;

/// Destination for batches of records.
///
/// Implementations signal a not-yet-existing table with
/// [`SinkError::MissingTable`](crate::error::SinkError::MissingTable) so
/// the loader can create it lazily and treat the delete count as zero.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Create `spec`'s table if it does not exist, shaping columns from
    /// the spec or, failing that, from `sample`.
    async fn ensure_table(&self, spec: &TableSpec, sample: &Record) -> SinkResult<()>;

    /// Delete every row of `table`. Returns the number of rows removed.
    async fn delete_all(&self, table: &str) -> SinkResult<u64>;

    /// Delete rows whose `rid` column matches one of `ids`. Returns the
    /// number of rows removed.
    async fn delete_by_ids(&self, table: &str, rid: &str, ids: &[Value]) -> SinkResult<u64>;

    /// Bulk-insert one chunk. Returns the number of rows written.
    async fn insert(&self, table: &str, records: &[Record]) -> SinkResult<u64>;

    /// Column shapes of an existing table, or `None` if it does not exist.
    async fn reflect(&self, table: &str) -> SinkResult<Option<Vec<ColumnSpec>>>;
}
