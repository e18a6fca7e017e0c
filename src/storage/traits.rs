//! The query backend boundary.

use super::{BatchResult, Query};
use crate::Result;

/// A storage backend executing batches of named read/write requests.
///
/// The engine requires exactly two guarantees from an implementation:
///
/// 1. A batch that returns `Ok` is durable in its entirety — including
///    the knowledge-counter update that rides along with every save
///    batch. Atomicity across *separate* batches is not assumed.
/// 2. The backend can express "all rows where stamp > N for budget B",
///    which every incremental read is built from.
pub trait QueryBackend: Send + Sync {
    /// Executes the batch, returning rows grouped by request name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] naming the failing request; the
    /// batch must leave no partial writes behind.
    fn execute(&self, queries: &[Query]) -> Result<BatchResult>;
}
