//! Catalog (budget list) queries.

use crate::Result;
use crate::models::{Budget, BudgetId};
use crate::storage::{Query, Row, row};
use serde_json::json;

/// Request name under which budget rows are returned.
pub const BUDGETS: &str = "budgets";

/// Reads every budget in the catalog, tombstoned ones included.
#[must_use]
pub fn get_all_budgets() -> Query {
    Query::read(
        BUDGETS,
        "SELECT entity_id, budget_name, last_accessed_on, is_tombstone, knowledge_stamp \
         FROM budgets",
        vec![],
    )
}

/// Upserts one budget row.
#[must_use]
pub fn insert_budget(budget: &Budget) -> Query {
    Query::write(
        "insert_budget",
        "REPLACE INTO budgets (entity_id, budget_name, last_accessed_on, is_tombstone, knowledge_stamp) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        vec![
            json!(budget.entity_id.as_str()),
            json!(budget.budget_name),
            json!(budget.last_accessed_on),
            json!(budget.is_tombstone),
            json!(budget.knowledge_stamp),
        ],
    )
}

/// Maps a catalog row back to a [`Budget`].
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the missing or
/// mistyped column.
pub fn budget_from_row(r: &Row) -> Result<Budget> {
    Ok(Budget {
        entity_id: BudgetId::new(row::str_column(r, "entity_id")?),
        budget_name: row::str_column(r, "budget_name")?,
        last_accessed_on: row::i64_column(r, "last_accessed_on")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{QueryBackend, SqliteBackend};

    #[test]
    fn test_budget_roundtrip() {
        let backend = SqliteBackend::in_memory().unwrap();
        let mut budget = Budget::new("Household", 1_700_000_000_000);
        budget.knowledge_stamp = 2;

        backend.execute(&[insert_budget(&budget)]).unwrap();
        let result = backend.execute(&[get_all_budgets()]).unwrap();

        let rows = result.rows(BUDGETS);
        assert_eq!(rows.len(), 1);
        assert_eq!(budget_from_row(&rows[0]).unwrap(), budget);
    }

    #[test]
    fn test_insert_is_upsert() {
        let backend = SqliteBackend::in_memory().unwrap();
        let mut budget = Budget::new("Household", 10);
        backend.execute(&[insert_budget(&budget)]).unwrap();

        budget.last_accessed_on = 20;
        backend.execute(&[insert_budget(&budget)]).unwrap();

        let result = backend.execute(&[get_all_budgets()]).unwrap();
        let rows = result.rows(BUDGETS);
        assert_eq!(rows.len(), 1);
        assert_eq!(budget_from_row(&rows[0]).unwrap().last_accessed_on, 20);
    }
}
