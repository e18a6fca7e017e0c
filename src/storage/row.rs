//! Typed access to rows crossing the query-backend boundary.
//!
//! Backends return rows as JSON maps; these helpers pull out the types
//! the entity mappers need and turn missing or mistyped columns into
//! [`crate::Error::InvalidInput`] with the column named.

use super::Row;
use crate::{Error, Result};

fn missing(column: &str) -> Error {
    Error::InvalidInput(format!("row is missing required column '{column}'"))
}

fn mistyped(column: &str, expected: &str) -> Error {
    Error::InvalidInput(format!("column '{column}' is not {expected}"))
}

/// Required string column.
pub fn str_column(row: &Row, column: &str) -> Result<String> {
    row.get(column)
        .ok_or_else(|| missing(column))?
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| mistyped(column, "a string"))
}

/// Optional string column; SQL NULL maps to `None`.
pub fn opt_str_column(row: &Row, column: &str) -> Result<Option<String>> {
    match row.get(column) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| mistyped(column, "a string")),
    }
}

/// Required signed integer column.
pub fn i64_column(row: &Row, column: &str) -> Result<i64> {
    row.get(column)
        .ok_or_else(|| missing(column))?
        .as_i64()
        .ok_or_else(|| mistyped(column, "an integer"))
}

/// Required unsigned integer column (knowledge stamps, counters).
pub fn u64_column(row: &Row, column: &str) -> Result<u64> {
    row.get(column)
        .ok_or_else(|| missing(column))?
        .as_u64()
        .ok_or_else(|| mistyped(column, "a non-negative integer"))
}

/// Required boolean column stored as a 0/1 integer.
pub fn bool_column(row: &Row, column: &str) -> Result<bool> {
    let value = row.get(column).ok_or_else(|| missing(column))?;
    match (value.as_bool(), value.as_i64()) {
        (Some(b), _) => Ok(b),
        (None, Some(i)) => Ok(i != 0),
        _ => Err(mistyped(column, "a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> Row {
        let mut row = Row::new();
        row.insert("name".to_string(), json!("Checking"));
        row.insert("note".to_string(), json!(null));
        row.insert("amount".to_string(), json!(-4500));
        row.insert("stamp".to_string(), json!(12));
        row.insert("closed".to_string(), json!(0));
        row
    }

    #[test]
    fn test_typed_accessors() {
        let row = sample_row();
        assert_eq!(str_column(&row, "name").unwrap(), "Checking");
        assert_eq!(opt_str_column(&row, "note").unwrap(), None);
        assert_eq!(opt_str_column(&row, "name").unwrap().as_deref(), Some("Checking"));
        assert_eq!(i64_column(&row, "amount").unwrap(), -4500);
        assert_eq!(u64_column(&row, "stamp").unwrap(), 12);
        assert!(!bool_column(&row, "closed").unwrap());
    }

    #[test]
    fn test_missing_column_is_invalid_input() {
        let row = sample_row();
        let err = str_column(&row, "absent").unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_negative_value_rejected_for_u64() {
        let row = sample_row();
        assert!(u64_column(&row, "amount").is_err());
    }
}
