//! Budget entity records.
//!
//! Every persisted record carries the engine envelope: `entity_id`
//! (assigned once), `budget_id` (immutable after first save),
//! `knowledge_stamp` (set exactly once per save event by the stamper) and
//! `is_tombstone` for logical deletion. Tables whose fields are refreshed
//! by the calculation run additionally carry `calc_knowledge_stamp`,
//! advanced only from the calculations scope.
//!
//! Amounts are integer milliunits; dates and months are Unix milliseconds
//! and `YYYY-MM` strings respectively. Presentation formatting is a
//! consumer concern.

use super::budget::{BudgetId, EntityId};
use serde::{Deserialize, Serialize};

/// Common envelope shared by all persisted budget records.
///
/// The stamper is the only writer of `knowledge_stamp`; the calculation
/// run is the only writer of `calc_knowledge_stamp`.
pub trait BudgetEntity {
    /// Returns the record's unique identifier.
    fn entity_id(&self) -> &EntityId;

    /// Returns the owning budget, if the record has been saved before.
    fn budget_id(&self) -> Option<&BudgetId>;

    /// Sets the owning budget. Called by the stamper on first save.
    fn set_budget_id(&mut self, budget_id: &BudgetId);

    /// Returns the primary knowledge stamp (0 = never saved).
    fn knowledge_stamp(&self) -> u64;

    /// Sets the primary knowledge stamp. Called only by the stamper.
    fn set_knowledge_stamp(&mut self, stamp: u64);

    /// Whether the record is logically deleted.
    fn is_tombstone(&self) -> bool;
}

macro_rules! impl_budget_entity {
    ($ty:ty) => {
        impl BudgetEntity for $ty {
            fn entity_id(&self) -> &EntityId {
                &self.entity_id
            }

            fn budget_id(&self) -> Option<&BudgetId> {
                self.budget_id.as_ref()
            }

            fn set_budget_id(&mut self, budget_id: &BudgetId) {
                self.budget_id = Some(budget_id.clone());
            }

            fn knowledge_stamp(&self) -> u64 {
                self.knowledge_stamp
            }

            fn set_knowledge_stamp(&mut self, stamp: u64) {
                self.knowledge_stamp = stamp;
            }

            fn is_tombstone(&self) -> bool {
                self.is_tombstone
            }
        }
    };
}

/// Clearing state of a transaction against its bank statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClearedStatus {
    /// Entered but not yet seen on a statement.
    #[default]
    Uncleared,
    /// Seen on a statement.
    Cleared,
    /// Cleared and locked by an account reconciliation.
    Reconciled,
}

impl ClearedStatus {
    /// Returns the canonical storage string for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uncleared => "Uncleared",
            Self::Cleared => "Cleared",
            Self::Reconciled => "Reconciled",
        }
    }

    /// Parses a storage string, defaulting unknown values to `Uncleared`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "Cleared" => Self::Cleared,
            "Reconciled" => Self::Reconciled,
            _ => Self::Uncleared,
        }
    }
}

/// A bank or cash account.
///
/// `cleared_balance` and `uncleared_balance` are calculated fields owned
/// by the calculation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Account {
    /// Unique identifier.
    pub entity_id: EntityId,
    /// Owning budget; set by the stamper on first save.
    pub budget_id: Option<BudgetId>,
    /// Display name.
    pub account_name: String,
    /// Whether the account participates in envelope budgeting.
    pub on_budget: bool,
    /// Free-form note.
    pub note: Option<String>,
    /// Whether the account has been closed.
    pub closed: bool,
    /// Logical-deletion marker.
    pub is_tombstone: bool,
    /// Primary knowledge stamp.
    pub knowledge_stamp: u64,
    /// Calculated: sum of cleared transaction amounts, milliunits.
    pub cleared_balance: i64,
    /// Calculated: sum of uncleared transaction amounts, milliunits.
    pub uncleared_balance: i64,
    /// Calculations-scope stamp of the last recompute that touched this row.
    pub calc_knowledge_stamp: u64,
}

impl_budget_entity!(Account);

/// A transaction counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payee {
    /// Unique identifier.
    pub entity_id: EntityId,
    /// Owning budget; set by the stamper on first save.
    pub budget_id: Option<BudgetId>,
    /// Display name.
    pub payee_name: String,
    /// Whether the payee is offered in entry autocomplete.
    pub enabled: bool,
    /// Logical-deletion marker.
    pub is_tombstone: bool,
    /// Primary knowledge stamp.
    pub knowledge_stamp: u64,
}

impl_budget_entity!(Payee);

/// A top-level category grouping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterCategory {
    /// Unique identifier.
    pub entity_id: EntityId,
    /// Owning budget; set by the stamper on first save.
    pub budget_id: Option<BudgetId>,
    /// Display name.
    pub name: String,
    /// Position within the category list.
    pub sort_order: i64,
    /// Logical-deletion marker.
    pub is_tombstone: bool,
    /// Primary knowledge stamp.
    pub knowledge_stamp: u64,
}

impl_budget_entity!(MasterCategory);

/// An envelope category under a master category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubCategory {
    /// Unique identifier.
    pub entity_id: EntityId,
    /// Owning budget; set by the stamper on first save.
    pub budget_id: Option<BudgetId>,
    /// Parent master category.
    pub master_category_id: EntityId,
    /// Display name.
    pub name: String,
    /// Position within the master category.
    pub sort_order: i64,
    /// Logical-deletion marker.
    pub is_tombstone: bool,
    /// Primary knowledge stamp.
    pub knowledge_stamp: u64,
}

impl_budget_entity!(SubCategory);

/// A single register transaction.
///
/// `cash_amount` and `credit_amount` are calculated fields owned by the
/// calculation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Unique identifier.
    pub entity_id: EntityId,
    /// Owning budget; set by the stamper on first save.
    pub budget_id: Option<BudgetId>,
    /// Account the transaction belongs to.
    pub account_id: EntityId,
    /// Counterparty, when known.
    pub payee_id: Option<EntityId>,
    /// Envelope category, when assigned.
    pub sub_category_id: Option<EntityId>,
    /// Transaction date, Unix milliseconds.
    pub date: i64,
    /// Signed amount in milliunits; outflows are negative.
    pub amount: i64,
    /// Free-form memo.
    pub memo: Option<String>,
    /// Clearing state.
    pub cleared: ClearedStatus,
    /// Flag color label, when set.
    pub flag: Option<String>,
    /// Logical-deletion marker.
    pub is_tombstone: bool,
    /// Primary knowledge stamp.
    pub knowledge_stamp: u64,
    /// Calculated: portion of the amount attributed to cash accounts.
    pub cash_amount: i64,
    /// Calculated: portion of the amount attributed to credit accounts.
    pub credit_amount: i64,
    /// Calculations-scope stamp of the last recompute that touched this row.
    pub calc_knowledge_stamp: u64,
}

impl_budget_entity!(Transaction);

/// Per-month budget aggregate.
///
/// Rows in this table are created and refreshed solely by the calculation
/// run, which draws stamps from the calculations scope; their primary
/// `knowledge_stamp` stays 0 unless the row is later edited directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonthlyBudget {
    /// Unique identifier.
    pub entity_id: EntityId,
    /// Owning budget; set by the stamper on first save.
    pub budget_id: Option<BudgetId>,
    /// Month in `YYYY-MM` form.
    pub month: String,
    /// Logical-deletion marker.
    pub is_tombstone: bool,
    /// Primary knowledge stamp.
    pub knowledge_stamp: u64,
    /// Amount budgeted for the month, milliunits.
    pub budgeted: i64,
    /// Calculated: total outflows for the month (stored positive).
    pub outflows: i64,
    /// Calculated: `budgeted - outflows`.
    pub balance: i64,
    /// Calculations-scope stamp of the last recompute that touched this row.
    pub calc_knowledge_stamp: u64,
}

impl_budget_entity!(MonthlyBudget);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleared_status_roundtrip() {
        for status in [
            ClearedStatus::Uncleared,
            ClearedStatus::Cleared,
            ClearedStatus::Reconciled,
        ] {
            assert_eq!(ClearedStatus::parse(status.as_str()), status);
        }
        // Unknown strings degrade to Uncleared rather than failing a load.
        assert_eq!(ClearedStatus::parse("garbage"), ClearedStatus::Uncleared);
    }

    #[test]
    fn test_envelope_accessors() {
        let mut account = Account {
            entity_id: EntityId::new("a1"),
            account_name: "Checking".to_string(),
            on_budget: true,
            ..Account::default()
        };
        assert!(account.budget_id().is_none());
        assert_eq!(account.knowledge_stamp(), 0);

        let budget_id = BudgetId::new("b1");
        account.set_budget_id(&budget_id);
        account.set_knowledge_stamp(7);
        assert_eq!(account.budget_id(), Some(&budget_id));
        assert_eq!(account.knowledge_stamp(), 7);
        assert!(!account.is_tombstone());
    }
}
