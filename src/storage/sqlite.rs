//! `SQLite`-backed query backend.
//!
//! Executes every batch inside a single transaction, so a batch is
//! durable in its entirety or not at all — the property the sync round
//! leans on when it rides the knowledge-counter update along with the
//! entity writes.
//!
//! # Concurrency Model
//!
//! Uses a `Mutex<Connection>` for thread-safe access. `SQLite`'s WAL mode
//! and `busy_timeout` pragma mitigate contention:
//!
//! - **WAL mode**: Allows concurrent readers with a single writer
//! - **`busy_timeout`**: Waits up to 5 seconds for locks instead of
//!   failing immediately
//! - **NORMAL synchronous**: Balances durability with performance

use super::{BatchResult, Query, QueryBackend, Row};
use crate::{Error, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, instrument};

/// Schema applied on every open. `CREATE TABLE IF NOT EXISTS` keeps the
/// statements idempotent across restarts.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS budgets (
    entity_id        TEXT PRIMARY KEY,
    budget_name      TEXT NOT NULL,
    last_accessed_on INTEGER NOT NULL,
    is_tombstone     INTEGER NOT NULL DEFAULT 0,
    knowledge_stamp  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS catalog_knowledge (
    id               INTEGER PRIMARY KEY CHECK (id = 1),
    current          INTEGER NOT NULL,
    known_by_peer    INTEGER NOT NULL,
    peer_known_by_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS budget_knowledge (
    budget_id        TEXT PRIMARY KEY,
    current          INTEGER NOT NULL,
    calc_current     INTEGER NOT NULL,
    known_by_peer    INTEGER NOT NULL,
    peer_known_by_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    entity_id           TEXT PRIMARY KEY,
    budget_id           TEXT NOT NULL,
    account_name        TEXT NOT NULL,
    on_budget           INTEGER NOT NULL,
    note                TEXT,
    closed              INTEGER NOT NULL,
    is_tombstone        INTEGER NOT NULL,
    knowledge_stamp     INTEGER NOT NULL,
    cleared_balance     INTEGER NOT NULL,
    uncleared_balance   INTEGER NOT NULL,
    calc_knowledge_stamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_accounts_stamps
    ON accounts (budget_id, knowledge_stamp, calc_knowledge_stamp);

CREATE TABLE IF NOT EXISTS payees (
    entity_id        TEXT PRIMARY KEY,
    budget_id        TEXT NOT NULL,
    payee_name       TEXT NOT NULL,
    enabled          INTEGER NOT NULL,
    is_tombstone     INTEGER NOT NULL,
    knowledge_stamp  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_payees_stamps
    ON payees (budget_id, knowledge_stamp);

CREATE TABLE IF NOT EXISTS master_categories (
    entity_id        TEXT PRIMARY KEY,
    budget_id        TEXT NOT NULL,
    name             TEXT NOT NULL,
    sort_order       INTEGER NOT NULL,
    is_tombstone     INTEGER NOT NULL,
    knowledge_stamp  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_master_categories_stamps
    ON master_categories (budget_id, knowledge_stamp);

CREATE TABLE IF NOT EXISTS sub_categories (
    entity_id          TEXT PRIMARY KEY,
    budget_id          TEXT NOT NULL,
    master_category_id TEXT NOT NULL,
    name               TEXT NOT NULL,
    sort_order         INTEGER NOT NULL,
    is_tombstone       INTEGER NOT NULL,
    knowledge_stamp    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sub_categories_stamps
    ON sub_categories (budget_id, knowledge_stamp);

CREATE TABLE IF NOT EXISTS transactions (
    entity_id           TEXT PRIMARY KEY,
    budget_id           TEXT NOT NULL,
    account_id          TEXT NOT NULL,
    payee_id            TEXT,
    sub_category_id     TEXT,
    date                INTEGER NOT NULL,
    amount              INTEGER NOT NULL,
    memo                TEXT,
    cleared             TEXT NOT NULL,
    flag                TEXT,
    is_tombstone        INTEGER NOT NULL,
    knowledge_stamp     INTEGER NOT NULL,
    cash_amount         INTEGER NOT NULL,
    credit_amount       INTEGER NOT NULL,
    calc_knowledge_stamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_stamps
    ON transactions (budget_id, knowledge_stamp, calc_knowledge_stamp);

CREATE TABLE IF NOT EXISTS monthly_budgets (
    entity_id           TEXT PRIMARY KEY,
    budget_id           TEXT NOT NULL,
    month               TEXT NOT NULL,
    is_tombstone        INTEGER NOT NULL,
    knowledge_stamp     INTEGER NOT NULL,
    budgeted            INTEGER NOT NULL,
    outflows            INTEGER NOT NULL,
    balance             INTEGER NOT NULL,
    calc_knowledge_stamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_monthly_budgets_stamps
    ON monthly_budgets (budget_id, knowledge_stamp, calc_knowledge_stamp);
";

/// Tables dropped by a refresh, children first.
const ALL_TABLES: &[&str] = &[
    "monthly_budgets",
    "transactions",
    "sub_categories",
    "master_categories",
    "payees",
    "accounts",
    "budget_knowledge",
    "catalog_knowledge",
    "budgets",
];

/// Helper to acquire the connection lock with poison recovery.
///
/// If the mutex is poisoned by a panic in a previous critical section we
/// recover the inner value and log a warning; the connection itself is
/// still in a usable state because every batch runs in a transaction.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("storage_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// `SQLite`-backed implementation of [`QueryBackend`].
pub struct SqliteBackend {
    /// Connection to the `SQLite` database.
    ///
    /// Protected by a Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database file (`None` for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database at `db_path` and ensures
    /// the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitializationFailed`] if the database cannot be
    /// opened or the schema cannot be applied.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(db_path, false)
    }

    /// Opens the database, optionally dropping all tables first.
    ///
    /// `refresh` recreates the store from scratch; used by callers that
    /// want a blank database at startup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitializationFailed`] on open or schema failure.
    pub fn with_options(db_path: impl Into<PathBuf>, refresh: bool) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::InitializationFailed {
            cause: format!("cannot open {}: {e}", db_path.display()),
        })?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        backend.initialize(refresh)?;
        Ok(backend)
    }

    /// Opens an in-memory database. Used by tests and throwaway sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitializationFailed`] on open or schema failure.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::InitializationFailed {
            cause: format!("cannot open in-memory database: {e}"),
        })?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        backend.initialize(false)?;
        Ok(backend)
    }

    /// Path of the underlying database file, if any.
    #[must_use]
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self, refresh: bool) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // WAL survives poorly on some network filesystems but is the
        // right default for a local single-writer store.
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| Error::InitializationFailed {
                cause: format!("pragma synchronous: {e}"),
            })?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| Error::InitializationFailed {
                cause: format!("pragma busy_timeout: {e}"),
            })?;

        if refresh {
            for table in ALL_TABLES {
                conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
                    .map_err(|e| Error::InitializationFailed {
                        cause: format!("dropping {table}: {e}"),
                    })?;
            }
            debug!("dropped existing tables for refresh");
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::InitializationFailed {
                cause: format!("applying schema: {e}"),
            })?;
        Ok(())
    }
}

impl QueryBackend for SqliteBackend {
    #[instrument(skip_all, fields(queries = queries.len()))]
    fn execute(&self, queries: &[Query]) -> Result<BatchResult> {
        let start = Instant::now();
        let mut conn = acquire_lock(&self.conn);
        let result = execute_in_transaction(&mut conn, queries);
        drop(conn);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("storage_batch_total", "status" => status).increment(1);
        metrics::histogram!("storage_batch_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

fn execute_in_transaction(conn: &mut Connection, queries: &[Query]) -> Result<BatchResult> {
    let tx = conn.transaction().map_err(|e| Error::Storage {
        operation: "begin".to_string(),
        cause: e.to_string(),
    })?;

    let mut result = BatchResult::default();
    for query in queries {
        let storage_err = |e: rusqlite::Error| Error::Storage {
            operation: query.name.clone(),
            cause: e.to_string(),
        };
        let params = bind_params(query)?;
        let mut stmt = tx.prepare(&query.sql).map_err(storage_err)?;

        if query.returns_rows {
            let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
            let mut rows = stmt.query(params_from_iter(params)).map_err(storage_err)?;
            let mut collected = Vec::new();
            while let Some(sql_row) = rows.next().map_err(storage_err)? {
                let mut row = Row::new();
                for (index, column) in columns.iter().enumerate() {
                    let value = sql_row.get_ref(index).map_err(storage_err)?;
                    row.insert(column.clone(), value_ref_to_json(value));
                }
                collected.push(row);
            }
            result.push_rows(&query.name, collected);
        } else {
            stmt.execute(params_from_iter(params)).map_err(storage_err)?;
        }
    }

    tx.commit().map_err(|e| Error::Storage {
        operation: "commit".to_string(),
        cause: e.to_string(),
    })?;
    Ok(result)
}

/// Converts the JSON parameters of a query into `SQLite` values.
fn bind_params(query: &Query) -> Result<Vec<SqlValue>> {
    query
        .params
        .iter()
        .map(|value| json_to_sql(value).ok_or_else(|| Error::Storage {
            operation: query.name.clone(),
            cause: format!("unbindable parameter {value}"),
        }))
        .collect()
}

fn json_to_sql(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => Some(SqlValue::Null),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        // Nested structures never cross this boundary.
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        // The schema defines no blob columns.
        ValueRef::Blob(_) => Value::Null,
    }
}
