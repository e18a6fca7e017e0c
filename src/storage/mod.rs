//! Storage layer abstraction.
//!
//! The engine talks to storage through one boundary: a *batch* of named,
//! parameterized read/write requests ([`Query`]) handed to a
//! [`QueryBackend`], which returns a [`BatchResult`] mapping request name
//! to rows. A successful return implies every write in the batch is
//! durable; nothing beyond a single batch is assumed transactional.
//!
//! The shipped implementation is [`SqliteBackend`]; the trait keeps the
//! engine testable against failure-injecting wrappers.

pub mod queries;
pub mod row;
mod sqlite;
mod traits;

pub use sqlite::SqliteBackend;
pub use traits::QueryBackend;

use serde_json::Value;
use std::collections::HashMap;

/// A row returned by a read request: column name → JSON value.
pub type Row = serde_json::Map<String, Value>;

/// One named, parameterized request within a batch.
///
/// Reads deposit their rows in the [`BatchResult`] under `name`; writes
/// use `name` only for error attribution. Parameters bind positionally
/// (`?1`, `?2`, …).
#[derive(Debug, Clone)]
pub struct Query {
    /// Request name; the key under which read rows are returned.
    pub name: String,
    /// The SQL text.
    pub sql: String,
    /// Positional parameters as JSON scalars.
    pub params: Vec<Value>,
    /// Whether the request produces rows.
    pub returns_rows: bool,
}

impl Query {
    /// Builds a read request.
    #[must_use]
    pub fn read(name: impl Into<String>, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            params,
            returns_rows: true,
        }
    }

    /// Builds a write request.
    #[must_use]
    pub fn write(name: impl Into<String>, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            params,
            returns_rows: false,
        }
    }
}

/// The outcome of one executed batch.
///
/// Rows from reads are grouped under the request name. Requests sharing a
/// name append to the same group, so a batch must use distinct names for
/// reads it wants to tell apart.
#[derive(Debug, Default)]
pub struct BatchResult {
    groups: HashMap<String, Vec<Row>>,
}

impl BatchResult {
    /// Adds rows under a request name. Used by backends.
    pub fn push_rows(&mut self, name: &str, rows: Vec<Row>) {
        self.groups.entry(name.to_string()).or_default().extend(rows);
    }

    /// Rows returned for a request name; empty when the request returned
    /// nothing or was not part of the batch.
    #[must_use]
    pub fn rows(&self, name: &str) -> &[Row] {
        self.groups.get(name).map_or(&[], Vec::as_slice)
    }

    /// First row for a request name, if any.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&Row> {
        self.rows(name).first()
    }

    /// Removes and returns the rows for a request name.
    pub fn take(&mut self, name: &str) -> Vec<Row> {
        self.groups.remove(name).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_constructors() {
        let read = Query::read("budgets", "SELECT 1", vec![]);
        assert!(read.returns_rows);
        let write = Query::write("insert_budget", "INSERT ...", vec![json!("x")]);
        assert!(!write.returns_rows);
        assert_eq!(write.params.len(), 1);
    }

    #[test]
    fn test_batch_result_grouping() {
        let mut result = BatchResult::default();
        let mut row = Row::new();
        row.insert("n".to_string(), json!(1));
        result.push_rows("budgets", vec![row.clone()]);
        result.push_rows("budgets", vec![row]);

        assert_eq!(result.rows("budgets").len(), 2);
        assert!(result.first("budgets").is_some());
        assert!(result.rows("missing").is_empty());
        assert_eq!(result.take("budgets").len(), 2);
        assert!(result.rows("budgets").is_empty());
    }
}
