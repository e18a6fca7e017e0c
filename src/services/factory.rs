//! Default-budget factory.

use crate::knowledge::{
    BudgetKnowledge, CatalogKnowledge, PersistedBudgetKnowledge, PersistedCatalogKnowledge,
    stamp_collection,
};
use crate::models::{Budget, EntityCollection, EntityId, MasterCategory, SubCategory};
use crate::storage::queries::{budget as budget_queries, catalog, knowledge as knowledge_queries};
use crate::storage::QueryBackend;
use crate::{Result, current_timestamp_ms};
use std::sync::Arc;
use tracing::{info, instrument};

/// The category structure a fresh budget starts with.
const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("Immediate Obligations", &["Rent/Mortgage", "Utilities", "Groceries"]),
    ("True Expenses", &["Auto Maintenance", "Medical", "Clothing"]),
    ("Quality of Life", &["Vacation", "Fitness"]),
];

/// Builds and persists a default budget when the catalog is empty.
///
/// The budget row is stamped from the catalog scope; the seeded category
/// structure is stamped from the new budget's own scope, whose counter is
/// persisted in the same batch so a restart recovers it intact.
pub struct BudgetFactory {
    backend: Arc<dyn QueryBackend>,
}

impl BudgetFactory {
    /// Creates a factory over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    /// Creates, seeds and persists a new budget with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] when the write batch fails; in
    /// that case nothing was persisted.
    #[instrument(skip(self, catalog))]
    pub fn create_default_budget(
        &self,
        catalog: &mut CatalogKnowledge,
        budget_name: &str,
    ) -> Result<Budget> {
        let mut budget = Budget::new(budget_name, current_timestamp_ms());
        budget.knowledge_stamp = catalog.clock.next();

        let mut knowledge = BudgetKnowledge::recover(
            &budget.entity_id,
            &PersistedBudgetKnowledge::default(),
            0,
            0,
        );
        let mut seed = default_categories();
        stamp_collection(&mut seed, &budget.entity_id, &mut knowledge.clock);

        let mut batch = vec![catalog::insert_budget(&budget)];
        batch.extend(budget_queries::insert_collection(&seed));
        batch.push(knowledge_queries::save_budget_knowledge(
            &budget.entity_id,
            &PersistedBudgetKnowledge::from(&knowledge),
        ));
        batch.push(knowledge_queries::save_catalog_knowledge(
            &PersistedCatalogKnowledge::from(&*catalog),
        ));

        self.backend.execute(&batch)?;
        info!(budget = %budget.entity_id, name = budget_name, "created default budget");
        Ok(budget)
    }
}

fn default_categories() -> EntityCollection {
    let mut collection = EntityCollection::default();
    for (master_index, (master_name, sub_names)) in DEFAULT_CATEGORIES.iter().enumerate() {
        let master = MasterCategory {
            entity_id: EntityId::generate(),
            name: (*master_name).to_string(),
            sort_order: i64::try_from(master_index).unwrap_or(i64::MAX),
            ..MasterCategory::default()
        };
        for (sub_index, sub_name) in sub_names.iter().enumerate() {
            collection.sub_categories.push(SubCategory {
                entity_id: EntityId::generate(),
                master_category_id: master.entity_id.clone(),
                name: (*sub_name).to_string(),
                sort_order: i64::try_from(sub_index).unwrap_or(i64::MAX),
                ..SubCategory::default()
            });
        }
        collection.master_categories.push(master);
    }
    collection
}
