//! Engine services.
//!
//! Services orchestrate the storage backend and the knowledge clocks
//! into the engine's public operations: budget selection, the
//! save → recompute → reload round-trip, and incremental loading.

mod calculations;
mod factory;
mod loader;
mod selector;
mod sync;

pub use calculations::{CalculationRunner, MonthlyBudgetCalculator, NoopCalculationRunner};
pub use factory::BudgetFactory;
pub use loader::IncrementalLoader;
pub use selector::{BudgetSelector, SelectedBudget};
pub use sync::{SyncPhase, SyncService};
