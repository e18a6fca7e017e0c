//! Applies knowledge stamps to a batch of mutated records.

use super::KnowledgeClock;
use crate::models::{BudgetEntity, BudgetId, EntityCollection};
use tracing::debug;

/// Stamps every record in `collection` for one save event against one
/// budget.
///
/// Each record receives exactly one stamp via one [`KnowledgeClock::next`]
/// call — one call per record, never per field — and has its `budget_id`
/// set. Records within the batch therefore carry distinct, increasing
/// stamps; the order across tables is an internal detail and not part of
/// the contract. Empty table vectors contribute nothing.
///
/// This function is the only producer of primary knowledge stamps. The
/// collection is expected to contain only mutated records; unmutated
/// records must not be submitted and thus never burn a stamp.
///
/// Returns the number of records stamped.
pub fn stamp_collection(
    collection: &mut EntityCollection,
    budget_id: &BudgetId,
    clock: &mut KnowledgeClock,
) -> usize {
    let mut stamped = 0;
    stamped += stamp_records(&mut collection.accounts, budget_id, clock);
    stamped += stamp_records(&mut collection.payees, budget_id, clock);
    stamped += stamp_records(&mut collection.master_categories, budget_id, clock);
    stamped += stamp_records(&mut collection.sub_categories, budget_id, clock);
    stamped += stamp_records(&mut collection.transactions, budget_id, clock);
    stamped += stamp_records(&mut collection.monthly_budgets, budget_id, clock);

    if stamped > 0 {
        debug!(
            scope = %clock.scope(),
            records = stamped,
            high_stamp = clock.current(),
            "stamped save batch"
        );
    }
    stamped
}

fn stamp_records<T: BudgetEntity>(
    records: &mut [T],
    budget_id: &BudgetId,
    clock: &mut KnowledgeClock,
) -> usize {
    for record in records.iter_mut() {
        record.set_budget_id(budget_id);
        record.set_knowledge_stamp(clock.next());
    }
    records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeScope;
    use crate::models::{Account, EntityId, Payee, Transaction};
    use std::collections::HashSet;

    fn test_clock(budget_id: &BudgetId) -> KnowledgeClock {
        KnowledgeClock::new(KnowledgeScope::Budget(budget_id.clone()))
    }

    #[test]
    fn test_stamps_are_distinct_and_increasing() {
        let budget_id = BudgetId::new("b1");
        let mut clock = test_clock(&budget_id);
        let mut batch = EntityCollection {
            accounts: vec![Account::default(), Account::default()],
            payees: vec![Payee::default()],
            transactions: vec![Transaction::default()],
            ..EntityCollection::default()
        };

        let stamped = stamp_collection(&mut batch, &budget_id, &mut clock);
        assert_eq!(stamped, 4);
        assert_eq!(clock.current(), 4);

        let mut stamps = HashSet::new();
        for account in &batch.accounts {
            assert!(stamps.insert(account.knowledge_stamp));
            assert_eq!(account.budget_id.as_ref(), Some(&budget_id));
        }
        assert!(stamps.insert(batch.payees[0].knowledge_stamp));
        assert!(stamps.insert(batch.transactions[0].knowledge_stamp));
        assert_eq!(stamps, (1..=4).collect::<HashSet<u64>>());
    }

    #[test]
    fn test_empty_batch_issues_no_stamps() {
        let budget_id = BudgetId::new("b1");
        let mut clock = test_clock(&budget_id);
        let mut batch = EntityCollection::default();

        assert_eq!(stamp_collection(&mut batch, &budget_id, &mut clock), 0);
        assert_eq!(clock.current(), 0);
    }

    #[test]
    fn test_one_stamp_per_record_not_per_field() {
        let budget_id = BudgetId::new("b1");
        let mut clock = test_clock(&budget_id);
        let mut batch = EntityCollection {
            transactions: vec![Transaction {
                entity_id: EntityId::new("t1"),
                amount: -4_500,
                memo: Some("coffee".to_string()),
                ..Transaction::default()
            }],
            ..EntityCollection::default()
        };

        stamp_collection(&mut batch, &budget_id, &mut clock);
        // Multiple mutated fields still draw a single stamp.
        assert_eq!(batch.transactions[0].knowledge_stamp, 1);
        assert_eq!(clock.current(), 1);
    }

    #[test]
    fn test_tombstoned_records_are_stamped_like_any_other() {
        let budget_id = BudgetId::new("b1");
        let mut clock = test_clock(&budget_id);
        let mut batch = EntityCollection {
            payees: vec![Payee {
                entity_id: EntityId::new("p1"),
                is_tombstone: true,
                ..Payee::default()
            }],
            ..EntityCollection::default()
        };

        stamp_collection(&mut batch, &budget_id, &mut clock);
        assert_eq!(batch.payees[0].knowledge_stamp, 1);
    }
}
