//! Active-budget selection.

use super::factory::BudgetFactory;
use crate::knowledge::{CatalogKnowledge, PersistedCatalogKnowledge};
use crate::models::Budget;
use crate::storage::QueryBackend;
use crate::storage::queries::{catalog, knowledge as knowledge_queries};
use crate::{Error, Result, current_timestamp_ms};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Outcome of a selection: the active budget and whether it had to be
/// created.
#[derive(Debug, Clone)]
pub struct SelectedBudget {
    /// The budget now considered active.
    pub budget: Budget,
    /// True when the catalog was empty and the factory synthesized it.
    pub newly_created: bool,
}

/// Chooses or creates the budget to open at startup.
///
/// With a non-empty catalog the most recently accessed live budget wins,
/// ties broken by first encounter. With an empty catalog the factory is
/// invoked exactly once and no ordering logic runs.
pub struct BudgetSelector {
    backend: Arc<dyn QueryBackend>,
}

impl BudgetSelector {
    /// Creates a selector over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    /// Selects the active budget and records the access.
    ///
    /// Touching `last_accessed_on` is a catalog mutation, so the selected
    /// budget is re-stamped from the catalog scope and written back
    /// together with the catalog counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelectionFailed`] when the catalog cannot be read
    /// or the selection cannot be recorded. No budget is fabricated on
    /// failure.
    #[instrument(skip_all)]
    pub fn select_active(
        &self,
        catalog: &mut CatalogKnowledge,
        default_budget_name: &str,
    ) -> Result<SelectedBudget> {
        let result = self
            .backend
            .execute(&[catalog::get_all_budgets()])
            .map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;

        let mut budgets = Vec::new();
        for row in result.rows(catalog::BUDGETS) {
            let budget =
                catalog::budget_from_row(row).map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;
            if !budget.is_tombstone {
                budgets.push(budget);
            }
        }

        let mut selected = match most_recently_accessed(budgets) {
            Some(budget) => {
                debug!(budget = %budget.entity_id, "selected existing budget");
                SelectedBudget { budget, newly_created: false }
            },
            None => {
                let factory = BudgetFactory::new(Arc::clone(&self.backend));
                let budget = factory
                    .create_default_budget(catalog, default_budget_name)
                    .map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;
                SelectedBudget { budget, newly_created: true }
            },
        };

        selected.budget.last_accessed_on = current_timestamp_ms();
        selected.budget.knowledge_stamp = catalog.clock.next();
        self.backend
            .execute(&[
                catalog::insert_budget(&selected.budget),
                knowledge_queries::save_catalog_knowledge(&PersistedCatalogKnowledge::from(
                    &*catalog,
                )),
            ])
            .map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;

        Ok(selected)
    }
}

/// Greatest `last_accessed_on` wins; the first encountered wins ties.
fn most_recently_accessed(budgets: Vec<Budget>) -> Option<Budget> {
    let mut winner: Option<Budget> = None;
    for candidate in budgets {
        match &winner {
            Some(current) if candidate.last_accessed_on <= current.last_accessed_on => {},
            _ => winner = Some(candidate),
        }
    }
    winner
}
