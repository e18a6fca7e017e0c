//! Entity-table queries for one budget.
//!
//! Two watermark classes exist. Plain tables (`payees`,
//! `master_categories`, `sub_categories`) filter on the primary stamp
//! only. Calculated tables (`accounts`, `transactions`,
//! `monthly_budgets`) carry fields refreshed by the calculation run and
//! filter on *either* stamp, so a row whose recomputed fields advanced
//! without a primary edit is still picked up.

use crate::Result;
use crate::models::{
    Account, BudgetId, ClearedStatus, EntityId, MasterCategory, MonthlyBudget, Payee, SubCategory,
    Transaction,
};
use crate::storage::{Query, Row, row};
use serde_json::json;

/// Request name for account rows.
pub const ACCOUNTS: &str = "accounts";
/// Request name for payee rows.
pub const PAYEES: &str = "payees";
/// Request name for master-category rows.
pub const MASTER_CATEGORIES: &str = "master_categories";
/// Request name for sub-category rows.
pub const SUB_CATEGORIES: &str = "sub_categories";
/// Request name for transaction rows.
pub const TRANSACTIONS: &str = "transactions";
/// Request name for monthly-budget rows.
pub const MONTHLY_BUDGETS: &str = "monthly_budgets";

fn budget_id_param(record_budget: Option<&BudgetId>) -> serde_json::Value {
    record_budget.map_or(json!(null), |id| json!(id.as_str()))
}

/// Builds the write requests for every record in a collection, in table
/// order. Empty tables contribute nothing.
#[must_use]
pub fn insert_collection(collection: &crate::models::EntityCollection) -> Vec<Query> {
    let mut queries = Vec::with_capacity(collection.record_count());
    queries.extend(collection.accounts.iter().map(insert_account));
    queries.extend(collection.payees.iter().map(insert_payee));
    queries.extend(collection.master_categories.iter().map(insert_master_category));
    queries.extend(collection.sub_categories.iter().map(insert_sub_category));
    queries.extend(collection.transactions.iter().map(insert_transaction));
    queries.extend(collection.monthly_budgets.iter().map(insert_monthly_budget));
    queries
}

// ---------------------------------------------------------------------------
// accounts

/// Upserts one account row.
#[must_use]
pub fn insert_account(account: &Account) -> Query {
    Query::write(
        "insert_account",
        "REPLACE INTO accounts (entity_id, budget_id, account_name, on_budget, note, closed, \
         is_tombstone, knowledge_stamp, cleared_balance, uncleared_balance, calc_knowledge_stamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        vec![
            json!(account.entity_id.as_str()),
            budget_id_param(account.budget_id.as_ref()),
            json!(account.account_name),
            json!(account.on_budget),
            json!(account.note),
            json!(account.closed),
            json!(account.is_tombstone),
            json!(account.knowledge_stamp),
            json!(account.cleared_balance),
            json!(account.uncleared_balance),
            json!(account.calc_knowledge_stamp),
        ],
    )
}

/// Reads account rows newer than either watermark.
#[must_use]
pub fn load_accounts(budget_id: &BudgetId, watermark: u64, calc_watermark: u64) -> Query {
    Query::read(
        ACCOUNTS,
        "SELECT * FROM accounts \
         WHERE budget_id = ?1 AND (knowledge_stamp > ?2 OR calc_knowledge_stamp > ?3)",
        vec![json!(budget_id.as_str()), json!(watermark), json!(calc_watermark)],
    )
}

/// Maps an account row.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the bad column.
pub fn account_from_row(r: &Row) -> Result<Account> {
    Ok(Account {
        entity_id: EntityId::new(row::str_column(r, "entity_id")?),
        budget_id: Some(BudgetId::new(row::str_column(r, "budget_id")?)),
        account_name: row::str_column(r, "account_name")?,
        on_budget: row::bool_column(r, "on_budget")?,
        note: row::opt_str_column(r, "note")?,
        closed: row::bool_column(r, "closed")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
        cleared_balance: row::i64_column(r, "cleared_balance")?,
        uncleared_balance: row::i64_column(r, "uncleared_balance")?,
        calc_knowledge_stamp: row::u64_column(r, "calc_knowledge_stamp")?,
    })
}

// ---------------------------------------------------------------------------
// payees

/// Upserts one payee row.
#[must_use]
pub fn insert_payee(payee: &Payee) -> Query {
    Query::write(
        "insert_payee",
        "REPLACE INTO payees (entity_id, budget_id, payee_name, enabled, is_tombstone, knowledge_stamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        vec![
            json!(payee.entity_id.as_str()),
            budget_id_param(payee.budget_id.as_ref()),
            json!(payee.payee_name),
            json!(payee.enabled),
            json!(payee.is_tombstone),
            json!(payee.knowledge_stamp),
        ],
    )
}

/// Reads payee rows newer than the watermark.
#[must_use]
pub fn load_payees(budget_id: &BudgetId, watermark: u64) -> Query {
    Query::read(
        PAYEES,
        "SELECT * FROM payees WHERE budget_id = ?1 AND knowledge_stamp > ?2",
        vec![json!(budget_id.as_str()), json!(watermark)],
    )
}

/// Maps a payee row.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the bad column.
pub fn payee_from_row(r: &Row) -> Result<Payee> {
    Ok(Payee {
        entity_id: EntityId::new(row::str_column(r, "entity_id")?),
        budget_id: Some(BudgetId::new(row::str_column(r, "budget_id")?)),
        payee_name: row::str_column(r, "payee_name")?,
        enabled: row::bool_column(r, "enabled")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
    })
}

// ---------------------------------------------------------------------------
// master categories

/// Upserts one master-category row.
#[must_use]
pub fn insert_master_category(category: &MasterCategory) -> Query {
    Query::write(
        "insert_master_category",
        "REPLACE INTO master_categories (entity_id, budget_id, name, sort_order, is_tombstone, knowledge_stamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        vec![
            json!(category.entity_id.as_str()),
            budget_id_param(category.budget_id.as_ref()),
            json!(category.name),
            json!(category.sort_order),
            json!(category.is_tombstone),
            json!(category.knowledge_stamp),
        ],
    )
}

/// Reads master-category rows newer than the watermark.
#[must_use]
pub fn load_master_categories(budget_id: &BudgetId, watermark: u64) -> Query {
    Query::read(
        MASTER_CATEGORIES,
        "SELECT * FROM master_categories WHERE budget_id = ?1 AND knowledge_stamp > ?2",
        vec![json!(budget_id.as_str()), json!(watermark)],
    )
}

/// Maps a master-category row.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the bad column.
pub fn master_category_from_row(r: &Row) -> Result<MasterCategory> {
    Ok(MasterCategory {
        entity_id: EntityId::new(row::str_column(r, "entity_id")?),
        budget_id: Some(BudgetId::new(row::str_column(r, "budget_id")?)),
        name: row::str_column(r, "name")?,
        sort_order: row::i64_column(r, "sort_order")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
    })
}

// ---------------------------------------------------------------------------
// sub categories

/// Upserts one sub-category row.
#[must_use]
pub fn insert_sub_category(category: &SubCategory) -> Query {
    Query::write(
        "insert_sub_category",
        "REPLACE INTO sub_categories (entity_id, budget_id, master_category_id, name, sort_order, \
         is_tombstone, knowledge_stamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        vec![
            json!(category.entity_id.as_str()),
            budget_id_param(category.budget_id.as_ref()),
            json!(category.master_category_id.as_str()),
            json!(category.name),
            json!(category.sort_order),
            json!(category.is_tombstone),
            json!(category.knowledge_stamp),
        ],
    )
}

/// Reads sub-category rows newer than the watermark.
#[must_use]
pub fn load_sub_categories(budget_id: &BudgetId, watermark: u64) -> Query {
    Query::read(
        SUB_CATEGORIES,
        "SELECT * FROM sub_categories WHERE budget_id = ?1 AND knowledge_stamp > ?2",
        vec![json!(budget_id.as_str()), json!(watermark)],
    )
}

/// Maps a sub-category row.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the bad column.
pub fn sub_category_from_row(r: &Row) -> Result<SubCategory> {
    Ok(SubCategory {
        entity_id: EntityId::new(row::str_column(r, "entity_id")?),
        budget_id: Some(BudgetId::new(row::str_column(r, "budget_id")?)),
        master_category_id: EntityId::new(row::str_column(r, "master_category_id")?),
        name: row::str_column(r, "name")?,
        sort_order: row::i64_column(r, "sort_order")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
    })
}

// ---------------------------------------------------------------------------
// transactions

/// Upserts one transaction row.
#[must_use]
pub fn insert_transaction(transaction: &Transaction) -> Query {
    Query::write(
        "insert_transaction",
        "REPLACE INTO transactions (entity_id, budget_id, account_id, payee_id, sub_category_id, \
         date, amount, memo, cleared, flag, is_tombstone, knowledge_stamp, cash_amount, \
         credit_amount, calc_knowledge_stamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        vec![
            json!(transaction.entity_id.as_str()),
            budget_id_param(transaction.budget_id.as_ref()),
            json!(transaction.account_id.as_str()),
            json!(transaction.payee_id.as_ref().map(EntityId::as_str)),
            json!(transaction.sub_category_id.as_ref().map(EntityId::as_str)),
            json!(transaction.date),
            json!(transaction.amount),
            json!(transaction.memo),
            json!(transaction.cleared.as_str()),
            json!(transaction.flag),
            json!(transaction.is_tombstone),
            json!(transaction.knowledge_stamp),
            json!(transaction.cash_amount),
            json!(transaction.credit_amount),
            json!(transaction.calc_knowledge_stamp),
        ],
    )
}

/// Reads transaction rows newer than either watermark.
#[must_use]
pub fn load_transactions(budget_id: &BudgetId, watermark: u64, calc_watermark: u64) -> Query {
    Query::read(
        TRANSACTIONS,
        "SELECT * FROM transactions \
         WHERE budget_id = ?1 AND (knowledge_stamp > ?2 OR calc_knowledge_stamp > ?3)",
        vec![json!(budget_id.as_str()), json!(watermark), json!(calc_watermark)],
    )
}

/// Maps a transaction row.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the bad column.
pub fn transaction_from_row(r: &Row) -> Result<Transaction> {
    Ok(Transaction {
        entity_id: EntityId::new(row::str_column(r, "entity_id")?),
        budget_id: Some(BudgetId::new(row::str_column(r, "budget_id")?)),
        account_id: EntityId::new(row::str_column(r, "account_id")?),
        payee_id: row::opt_str_column(r, "payee_id")?.map(EntityId::new),
        sub_category_id: row::opt_str_column(r, "sub_category_id")?.map(EntityId::new),
        date: row::i64_column(r, "date")?,
        amount: row::i64_column(r, "amount")?,
        memo: row::opt_str_column(r, "memo")?,
        cleared: ClearedStatus::parse(&row::str_column(r, "cleared")?),
        flag: row::opt_str_column(r, "flag")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
        cash_amount: row::i64_column(r, "cash_amount")?,
        credit_amount: row::i64_column(r, "credit_amount")?,
        calc_knowledge_stamp: row::u64_column(r, "calc_knowledge_stamp")?,
    })
}

// ---------------------------------------------------------------------------
// monthly budgets

/// Upserts one monthly-budget row.
#[must_use]
pub fn insert_monthly_budget(monthly: &MonthlyBudget) -> Query {
    Query::write(
        "insert_monthly_budget",
        "REPLACE INTO monthly_budgets (entity_id, budget_id, month, is_tombstone, knowledge_stamp, \
         budgeted, outflows, balance, calc_knowledge_stamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        vec![
            json!(monthly.entity_id.as_str()),
            budget_id_param(monthly.budget_id.as_ref()),
            json!(monthly.month),
            json!(monthly.is_tombstone),
            json!(monthly.knowledge_stamp),
            json!(monthly.budgeted),
            json!(monthly.outflows),
            json!(monthly.balance),
            json!(monthly.calc_knowledge_stamp),
        ],
    )
}

/// Reads monthly-budget rows newer than either watermark.
#[must_use]
pub fn load_monthly_budgets(budget_id: &BudgetId, watermark: u64, calc_watermark: u64) -> Query {
    Query::read(
        MONTHLY_BUDGETS,
        "SELECT * FROM monthly_budgets \
         WHERE budget_id = ?1 AND (knowledge_stamp > ?2 OR calc_knowledge_stamp > ?3)",
        vec![json!(budget_id.as_str()), json!(watermark), json!(calc_watermark)],
    )
}

/// Maps a monthly-budget row.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the bad column.
pub fn monthly_budget_from_row(r: &Row) -> Result<MonthlyBudget> {
    Ok(MonthlyBudget {
        entity_id: EntityId::new(row::str_column(r, "entity_id")?),
        budget_id: Some(BudgetId::new(row::str_column(r, "budget_id")?)),
        month: row::str_column(r, "month")?,
        is_tombstone: row::bool_column(r, "is_tombstone")?,
        knowledge_stamp: row::u64_column(r, "knowledge_stamp")?,
        budgeted: row::i64_column(r, "budgeted")?,
        outflows: row::i64_column(r, "outflows")?,
        balance: row::i64_column(r, "balance")?,
        calc_knowledge_stamp: row::u64_column(r, "calc_knowledge_stamp")?,
    })
}
