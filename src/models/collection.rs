//! The entity collection moved across the engine boundary.

use super::budget::EntityId;
use super::entities::{
    Account, BudgetEntity, MasterCategory, MonthlyBudget, Payee, SubCategory, Transaction,
};

/// A heterogeneous set of budget records, one `Vec` per entity table.
///
/// The same shape serves both directions: callers hand the engine a
/// collection of *dirty* records to save (records with no mutated fields
/// must simply not be included), and the engine hands back collections of
/// loaded records and maintains the merged per-budget view as one.
///
/// Tombstoned records travel through collections unfiltered; the `live_*`
/// accessors are the consumer-side filter.
#[derive(Debug, Clone, Default)]
pub struct EntityCollection {
    /// Bank and cash accounts.
    pub accounts: Vec<Account>,
    /// Transaction counterparties.
    pub payees: Vec<Payee>,
    /// Top-level category groupings.
    pub master_categories: Vec<MasterCategory>,
    /// Envelope categories.
    pub sub_categories: Vec<SubCategory>,
    /// Register transactions.
    pub transactions: Vec<Transaction>,
    /// Per-month aggregates.
    pub monthly_budgets: Vec<MonthlyBudget>,
}

impl EntityCollection {
    /// Returns true when no table holds any record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Total number of records across all tables.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.accounts.len()
            + self.payees.len()
            + self.master_categories.len()
            + self.sub_categories.len()
            + self.transactions.len()
            + self.monthly_budgets.len()
    }

    /// Accounts that are not tombstoned.
    pub fn live_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|e| !e.is_tombstone)
    }

    /// Payees that are not tombstoned.
    pub fn live_payees(&self) -> impl Iterator<Item = &Payee> {
        self.payees.iter().filter(|e| !e.is_tombstone)
    }

    /// Master categories that are not tombstoned.
    pub fn live_master_categories(&self) -> impl Iterator<Item = &MasterCategory> {
        self.master_categories.iter().filter(|e| !e.is_tombstone)
    }

    /// Sub-categories that are not tombstoned.
    pub fn live_sub_categories(&self) -> impl Iterator<Item = &SubCategory> {
        self.sub_categories.iter().filter(|e| !e.is_tombstone)
    }

    /// Transactions that are not tombstoned.
    pub fn live_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|e| !e.is_tombstone)
    }

    /// Monthly budgets that are not tombstoned.
    pub fn live_monthly_budgets(&self) -> impl Iterator<Item = &MonthlyBudget> {
        self.monthly_budgets.iter().filter(|e| !e.is_tombstone)
    }

    /// Merges a freshly loaded delta into this collection.
    ///
    /// Records replace existing records with the same `entity_id` and are
    /// appended otherwise. Order within a table is not significant.
    pub fn merge(&mut self, delta: Self) {
        merge_table(&mut self.accounts, delta.accounts);
        merge_table(&mut self.payees, delta.payees);
        merge_table(&mut self.master_categories, delta.master_categories);
        merge_table(&mut self.sub_categories, delta.sub_categories);
        merge_table(&mut self.transactions, delta.transactions);
        merge_table(&mut self.monthly_budgets, delta.monthly_budgets);
    }

    /// Collects the entity IDs present in the collection, across tables.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids = Vec::with_capacity(self.record_count());
        ids.extend(self.accounts.iter().map(|e| e.entity_id().clone()));
        ids.extend(self.payees.iter().map(|e| e.entity_id().clone()));
        ids.extend(self.master_categories.iter().map(|e| e.entity_id().clone()));
        ids.extend(self.sub_categories.iter().map(|e| e.entity_id().clone()));
        ids.extend(self.transactions.iter().map(|e| e.entity_id().clone()));
        ids.extend(self.monthly_budgets.iter().map(|e| e.entity_id().clone()));
        ids
    }
}

fn merge_table<T: BudgetEntity>(existing: &mut Vec<T>, incoming: Vec<T>) {
    for record in incoming {
        match existing
            .iter_mut()
            .find(|e| e.entity_id() == record.entity_id())
        {
            Some(slot) => *slot = record,
            None => existing.push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityId;

    fn payee(id: &str, name: &str, tombstone: bool) -> Payee {
        Payee {
            entity_id: EntityId::new(id),
            payee_name: name.to_string(),
            enabled: true,
            is_tombstone: tombstone,
            ..Payee::default()
        }
    }

    #[test]
    fn test_empty_collection() {
        let collection = EntityCollection::default();
        assert!(collection.is_empty());
        assert_eq!(collection.record_count(), 0);
    }

    #[test]
    fn test_merge_replaces_by_entity_id() {
        let mut view = EntityCollection {
            payees: vec![payee("p1", "Grocer", false), payee("p2", "Landlord", false)],
            ..EntityCollection::default()
        };

        let delta = EntityCollection {
            payees: vec![payee("p1", "Corner Grocer", false), payee("p3", "Gym", false)],
            ..EntityCollection::default()
        };

        view.merge(delta);
        assert_eq!(view.payees.len(), 3);
        let renamed = view.payees.iter().find(|p| p.entity_id.as_str() == "p1");
        assert_eq!(renamed.unwrap().payee_name, "Corner Grocer");
    }

    #[test]
    fn test_live_filter_excludes_tombstones() {
        let mut view = EntityCollection::default();
        view.payees.push(payee("p1", "Grocer", false));
        view.payees.push(payee("p2", "Old Grocer", true));

        assert_eq!(view.record_count(), 2);
        assert_eq!(view.live_payees().count(), 1);
    }

    #[test]
    fn test_merge_keeps_tombstoned_records() {
        let mut view = EntityCollection {
            payees: vec![payee("p1", "Grocer", false)],
            ..EntityCollection::default()
        };
        view.merge(EntityCollection {
            payees: vec![payee("p1", "Grocer", true)],
            ..EntityCollection::default()
        });

        assert_eq!(view.payees.len(), 1);
        assert!(view.payees[0].is_tombstone);
        assert_eq!(view.live_payees().count(), 0);
    }
}
