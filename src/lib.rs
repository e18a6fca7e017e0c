//! # Fiscus
//!
//! Knowledge-clock incremental persistence engine for envelope-budget data.
//!
//! Fiscus keeps a single logical budget durable in an embedded `SQLite`
//! database while letting callers save and reload only the records that
//! changed since their last look. Every save event stamps the touched
//! records with a value drawn from a monotonic, crash-recoverable counter
//! (a *knowledge clock*); every load filters on those stamps, so neither
//! direction ever has to move the full dataset.
//!
//! ## Architecture
//!
//! - **Knowledge clocks** (`knowledge`): one monotonic counter per scope
//!   (the budget catalog, one budget's entities, one budget's calculated
//!   fields), recovered on startup from a durable side table reconciled
//!   against the stamps already present in the entity tables.
//! - **Storage** (`storage`): a batch-oriented [`QueryBackend`] boundary
//!   with a `SQLite` implementation; a batch is durable once it returns.
//! - **Services** (`services`): the [`SyncService`] orchestrator driving
//!   the save → recompute → reload round-trip, budget selection, the
//!   default-budget factory and the incremental loader.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fiscus::{EngineConfig, SyncService};
//! use fiscus::services::NoopCalculationRunner;
//! use fiscus::storage::SqliteBackend;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let backend = Arc::new(SqliteBackend::new(&config.database_path)?);
//! let mut engine = SyncService::new(backend, Box::new(NoopCalculationRunner), config);
//! engine.initialize()?;
//! engine.select_active_budget()?;
//! let view = engine.load_budget_data()?;
//! # Ok::<(), fiscus::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod knowledge;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::EngineConfig;
pub use knowledge::{BudgetKnowledge, CatalogKnowledge, KnowledgeClock, KnowledgeScope};
pub use models::{Budget, BudgetId, EntityCollection, EntityId};
pub use services::{BudgetSelector, CalculationRunner, IncrementalLoader, SyncService};
pub use storage::{QueryBackend, SqliteBackend};

/// Error type for engine operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations. The five leading variants mirror the phases of the
/// engine's lifecycle and encode what durable state they leave behind.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Durable state afterwards |
/// |---------|-------------|--------------------------|
/// | `InitializationFailed` | Schema setup or catalog counter read failed | Nothing retained |
/// | `SelectionFailed` | Catalog read failed during budget selection | No budget activated |
/// | `SaveFailed` | Stamp-and-save batch rejected | Counter not persisted; retry re-stamps |
/// | `RecomputeFailed` | Calculation run rejected | Saved rows durable; watermarks untouched |
/// | `ReloadFailed` | Incremental read rejected | Watermarks untouched; retry re-reads delta |
/// | `Storage` | A backend batch failed below the phase boundary | Depends on the wrapping phase |
/// | `InvalidInput` | API misuse or malformed rows | Unchanged |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Engine initialization failed.
    ///
    /// Raised when:
    /// - The database schema cannot be created or migrated
    /// - The catalog knowledge counter cannot be read back
    ///
    /// Fatal: the engine retains no partial state and must not be used.
    #[error("initialization failed: {cause}")]
    InitializationFailed {
        /// The underlying cause.
        cause: String,
    },

    /// Budget selection failed.
    ///
    /// Raised when the catalog read during budget selection is rejected.
    /// No budget is activated and no budget is fabricated. This is the
    /// only error a best-effort top-level caller may degrade to a logged
    /// `None`.
    #[error("budget selection failed: {cause}")]
    SelectionFailed {
        /// The underlying cause.
        cause: String,
    },

    /// The stamp-and-save phase of a sync round was rejected.
    ///
    /// The batch carries the counter update, so no clock advancement was
    /// persisted. The stamped in-memory batch is discarded; a retry must
    /// re-submit the dirty records so they are stamped afresh.
    #[error("save failed: {cause}")]
    SaveFailed {
        /// The underlying cause.
        cause: String,
    },

    /// The recompute phase of a sync round was rejected.
    ///
    /// Phase-1 writes remain durable. Watermarks are not advanced, so the
    /// next reload (or retry) still picks up the saved records.
    #[error("recalculation failed: {cause}")]
    RecomputeFailed {
        /// The underlying cause.
        cause: String,
    },

    /// The reload phase of a sync round was rejected.
    ///
    /// Watermarks are not advanced; repeating the round re-reads the same
    /// delta, making retry safe.
    #[error("reload failed: {cause}")]
    ReloadFailed {
        /// The underlying cause.
        cause: String,
    },

    /// A storage backend operation failed.
    ///
    /// Raised when:
    /// - A `SQLite` batch cannot begin, execute or commit
    /// - A parameter cannot be bound or a row value cannot be converted
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The named request that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A sync round is requested with no active budget
    /// - A loaded row is missing a required column
    /// - Configuration values are malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Centralized so every `last_accessed_on` value in the catalog is
/// produced the same way. Clamps to 0 for clocks set before the epoch.
///
/// # Examples
///
/// ```rust
/// let ts = fiscus::current_timestamp_ms();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::Storage {
            operation: "budgets".to_string(),
            cause: "disk I/O error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage operation 'budgets' failed: disk I/O error"
        );

        let err = Error::SaveFailed {
            cause: "constraint violated".to_string(),
        };
        assert_eq!(err.to_string(), "save failed: constraint violated");
    }

    #[test]
    fn test_timestamp_is_positive() {
        assert!(current_timestamp_ms() > 1_600_000_000_000);
    }
}
