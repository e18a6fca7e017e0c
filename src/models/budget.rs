//! Catalog types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique identifier for a persisted entity.
///
/// Assigned exactly once when the record is created and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random entity ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a budget, the top-level unit of isolation.
///
/// A budget ID is the entity ID of the catalog row that describes the
/// budget; entity tables reference it in their `budget_id` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetId(String);

impl BudgetId {
    /// Creates a budget ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random budget ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BudgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BudgetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BudgetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A budget as recorded in the catalog.
///
/// Budgets are catalog entities: their knowledge stamps are drawn from the
/// catalog scope, not from any budget scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Budget {
    /// Unique identifier; doubles as the [`BudgetId`] of the owned tables.
    pub entity_id: BudgetId,
    /// Display name of the budget.
    pub budget_name: String,
    /// Unix milliseconds of the most recent activation.
    pub last_accessed_on: i64,
    /// Logical-deletion marker; tombstoned budgets stay in the catalog.
    pub is_tombstone: bool,
    /// Catalog-scope knowledge stamp of the most recent save.
    pub knowledge_stamp: u64,
}

impl Budget {
    /// Creates a new, not-yet-stamped budget with the given name.
    #[must_use]
    pub fn new(budget_name: impl Into<String>, last_accessed_on: i64) -> Self {
        Self {
            entity_id: BudgetId::generate(),
            budget_name: budget_name.into(),
            last_accessed_on,
            is_tombstone: false,
            knowledge_stamp: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(EntityId::from("abc-123"), id);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(EntityId::generate(), EntityId::generate());
        assert_ne!(BudgetId::generate(), BudgetId::generate());
    }

    #[test]
    fn test_new_budget_is_unstamped() {
        let budget = Budget::new("Household", 1_700_000_000_000);
        assert_eq!(budget.knowledge_stamp, 0);
        assert!(!budget.is_tombstone);
        assert_eq!(budget.budget_name, "Household");
    }
}
