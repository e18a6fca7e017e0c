//! The derived-value recomputation boundary.

use crate::Result;
use crate::knowledge::KnowledgeClock;
use crate::models::{Account, BudgetId, ClearedStatus, EntityId, MonthlyBudget, Transaction};
use crate::storage::queries::budget as budget_queries;
use crate::storage::{Query, QueryBackend, Row};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// A derived-value recomputation job.
///
/// The orchestrator invokes the runner once per sync round, after the
/// dirty batch is durable. The runner is opaque to the engine: it reads
/// committed storage state itself (it is never handed the dirty batch)
/// and may mutate or insert entities. The calculations-scope clock it is
/// lent is the only legal source of `calc_knowledge_stamp` values.
pub trait CalculationRunner: Send {
    /// Runs the recomputation for one budget.
    ///
    /// # Errors
    ///
    /// Any error is surfaced by the orchestrator as
    /// [`crate::Error::RecomputeFailed`]; writes the runner completed
    /// before failing remain durable.
    fn run(
        &mut self,
        backend: &dyn QueryBackend,
        budget_id: &BudgetId,
        calc_clock: &mut KnowledgeClock,
    ) -> Result<()>;
}

/// A runner that computes nothing. Useful when derived values are
/// maintained elsewhere, and in tests.
pub struct NoopCalculationRunner;

impl CalculationRunner for NoopCalculationRunner {
    fn run(
        &mut self,
        _backend: &dyn QueryBackend,
        _budget_id: &BudgetId,
        _calc_clock: &mut KnowledgeClock,
    ) -> Result<()> {
        Ok(())
    }
}

/// Recomputes account balances, transaction cash/credit splits and
/// per-month aggregates from committed transactions.
///
/// Only rows whose derived values actually changed are re-stamped and
/// written; an unchanged store produces no writes and burns no
/// calculation stamps, so repeated runs are idempotent.
pub struct MonthlyBudgetCalculator;

impl CalculationRunner for MonthlyBudgetCalculator {
    #[instrument(skip_all, fields(budget = %budget_id))]
    fn run(
        &mut self,
        backend: &dyn QueryBackend,
        budget_id: &BudgetId,
        calc_clock: &mut KnowledgeClock,
    ) -> Result<()> {
        // Full read of committed state; the dirty batch from phase 1 is
        // already durable and therefore visible here.
        let result = backend.execute(&[
            budget_queries::load_accounts(budget_id, 0, 0),
            budget_queries::load_transactions(budget_id, 0, 0),
            budget_queries::load_monthly_budgets(budget_id, 0, 0),
        ])?;
        let mut accounts = map_rows(result.rows(budget_queries::ACCOUNTS), budget_queries::account_from_row)?;
        let mut transactions = map_rows(
            result.rows(budget_queries::TRANSACTIONS),
            budget_queries::transaction_from_row,
        )?;
        let monthly_budgets = map_rows(
            result.rows(budget_queries::MONTHLY_BUDGETS),
            budget_queries::monthly_budget_from_row,
        )?;

        let mut writes: Vec<Query> = Vec::new();
        recompute_splits(&mut transactions, &accounts, calc_clock, &mut writes);
        recompute_balances(&mut accounts, &transactions, calc_clock, &mut writes);
        recompute_monthly(monthly_budgets, &transactions, budget_id, calc_clock, &mut writes);

        if writes.is_empty() {
            debug!("derived values unchanged, nothing to write");
            return Ok(());
        }
        backend.execute(&writes)?;
        debug!(
            records = writes.len(),
            high_stamp = calc_clock.current(),
            "derived values written"
        );
        Ok(())
    }
}

fn map_rows<T>(rows: &[Row], map: impl Fn(&Row) -> crate::Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

/// Splits each transaction's amount into its cash and credit portion
/// based on whether the owning account is on budget.
fn recompute_splits(
    transactions: &mut [Transaction],
    accounts: &[Account],
    calc_clock: &mut KnowledgeClock,
    writes: &mut Vec<Query>,
) {
    for transaction in transactions.iter_mut().filter(|t| !t.is_tombstone) {
        let on_budget = accounts
            .iter()
            .find(|a| a.entity_id == transaction.account_id)
            .is_some_and(|a| a.on_budget);
        let cash_amount = if on_budget { transaction.amount } else { 0 };
        let credit_amount = transaction.amount - cash_amount;

        if transaction.cash_amount != cash_amount || transaction.credit_amount != credit_amount {
            transaction.cash_amount = cash_amount;
            transaction.credit_amount = credit_amount;
            transaction.calc_knowledge_stamp = calc_clock.next();
            writes.push(budget_queries::insert_transaction(transaction));
        }
    }
}

/// Refreshes per-account cleared and uncleared balances from live
/// transactions.
fn recompute_balances(
    accounts: &mut [Account],
    transactions: &[Transaction],
    calc_clock: &mut KnowledgeClock,
    writes: &mut Vec<Query>,
) {
    for account in accounts.iter_mut().filter(|a| !a.is_tombstone) {
        let mut cleared_balance = 0_i64;
        let mut uncleared_balance = 0_i64;
        for transaction in transactions
            .iter()
            .filter(|t| !t.is_tombstone && t.account_id == account.entity_id)
        {
            match transaction.cleared {
                ClearedStatus::Cleared | ClearedStatus::Reconciled => {
                    cleared_balance += transaction.amount;
                },
                ClearedStatus::Uncleared => uncleared_balance += transaction.amount,
            }
        }

        if account.cleared_balance != cleared_balance
            || account.uncleared_balance != uncleared_balance
        {
            account.cleared_balance = cleared_balance;
            account.uncleared_balance = uncleared_balance;
            account.calc_knowledge_stamp = calc_clock.next();
            writes.push(budget_queries::insert_account(account));
        }
    }
}

/// Refreshes existing per-month aggregate rows and creates rows for
/// months that gained their first outflow.
fn recompute_monthly(
    mut monthly_budgets: Vec<MonthlyBudget>,
    transactions: &[Transaction],
    budget_id: &BudgetId,
    calc_clock: &mut KnowledgeClock,
    writes: &mut Vec<Query>,
) {
    let mut outflows_by_month: BTreeMap<String, i64> = BTreeMap::new();
    for transaction in transactions.iter().filter(|t| !t.is_tombstone && t.amount < 0) {
        *outflows_by_month.entry(month_of(transaction.date)).or_default() -= transaction.amount;
    }

    for monthly in monthly_budgets.iter_mut().filter(|m| !m.is_tombstone) {
        let outflows = outflows_by_month.remove(&monthly.month).unwrap_or(0);
        let balance = monthly.budgeted - outflows;
        if monthly.outflows != outflows || monthly.balance != balance {
            monthly.outflows = outflows;
            monthly.balance = balance;
            monthly.calc_knowledge_stamp = calc_clock.next();
            writes.push(budget_queries::insert_monthly_budget(monthly));
        }
    }

    // Months with outflows but no aggregate row yet. These rows are
    // born from the calculations scope: their primary stamp stays 0.
    for (month, outflows) in outflows_by_month {
        let monthly = MonthlyBudget {
            entity_id: EntityId::generate(),
            budget_id: Some(budget_id.clone()),
            month,
            outflows,
            balance: -outflows,
            calc_knowledge_stamp: calc_clock.next(),
            ..MonthlyBudget::default()
        };
        writes.push(budget_queries::insert_monthly_budget(&monthly));
    }
}

/// `YYYY-MM` of a Unix-millisecond date.
fn month_of(date_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(date_ms)
        .map_or_else(|| "1970-01".to_string(), |dt| dt.format("%Y-%m").to_string())
}
