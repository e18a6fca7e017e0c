//! Incremental entity loading.

use crate::Result;
use crate::knowledge::PersistedBudgetKnowledge;
use crate::models::{BudgetId, EntityCollection};
use crate::storage::queries::{budget as budget_queries, knowledge as knowledge_queries};
use crate::storage::{QueryBackend, Row};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read-only loader fetching the subset of each entity table whose stamps
/// exceed the supplied watermarks.
///
/// One read per table, all issued in a single batch together with the
/// budget's knowledge side-table row (so the caller can advance its
/// watermarks from the same consistent snapshot). A watermark of 0 is an
/// explicit full load. The loader never synthesizes or mutates stamps,
/// and it does not filter tombstones — that is a consumer concern.
pub struct IncrementalLoader {
    backend: Arc<dyn QueryBackend>,
}

impl IncrementalLoader {
    /// Creates a loader over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    /// Loads every record with `knowledge_stamp > watermark` (plain
    /// tables) or either stamp above its watermark (calculated tables),
    /// plus the budget's persisted counters.
    ///
    /// Row order within a table is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] when the batch fails and
    /// [`crate::Error::InvalidInput`] when a returned row is malformed.
    #[instrument(skip(self), fields(budget = %budget_id))]
    pub fn load_since(
        &self,
        budget_id: &BudgetId,
        watermark: u64,
        calc_watermark: u64,
    ) -> Result<(EntityCollection, PersistedBudgetKnowledge)> {
        let batch = vec![
            budget_queries::load_accounts(budget_id, watermark, calc_watermark),
            budget_queries::load_payees(budget_id, watermark),
            budget_queries::load_master_categories(budget_id, watermark),
            budget_queries::load_sub_categories(budget_id, watermark),
            budget_queries::load_transactions(budget_id, watermark, calc_watermark),
            budget_queries::load_monthly_budgets(budget_id, watermark, calc_watermark),
            knowledge_queries::load_budget_knowledge(budget_id),
        ];

        let result = self.backend.execute(&batch)?;

        let collection = EntityCollection {
            accounts: map_rows(result.rows(budget_queries::ACCOUNTS), budget_queries::account_from_row)?,
            payees: map_rows(result.rows(budget_queries::PAYEES), budget_queries::payee_from_row)?,
            master_categories: map_rows(
                result.rows(budget_queries::MASTER_CATEGORIES),
                budget_queries::master_category_from_row,
            )?,
            sub_categories: map_rows(
                result.rows(budget_queries::SUB_CATEGORIES),
                budget_queries::sub_category_from_row,
            )?,
            transactions: map_rows(
                result.rows(budget_queries::TRANSACTIONS),
                budget_queries::transaction_from_row,
            )?,
            monthly_budgets: map_rows(
                result.rows(budget_queries::MONTHLY_BUDGETS),
                budget_queries::monthly_budget_from_row,
            )?,
        };
        let persisted = knowledge_queries::budget_knowledge_from_result(&result)?;

        debug!(
            records = collection.record_count(),
            watermark, calc_watermark, "incremental load complete"
        );
        Ok((collection, persisted))
    }
}

fn map_rows<T>(rows: &[Row], map: impl Fn(&Row) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}
