//! Data models for the persistence engine.
//!
//! This module contains the catalog and budget entity types plus the
//! collection type that moves them across the engine boundary.

mod budget;
mod collection;
mod entities;

pub use budget::{Budget, BudgetId, EntityId};
pub use collection::EntityCollection;
pub use entities::{
    Account, BudgetEntity, ClearedStatus, MasterCategory, MonthlyBudget, Payee, SubCategory,
    Transaction,
};
