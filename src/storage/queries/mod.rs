//! Query builders and row mappers for the engine's tables.
//!
//! Each submodule owns the SQL for one table family: the catalog of
//! budgets, the knowledge side tables, and the per-budget entity tables.
//! Everything the engine says to storage is built here, so the rest of
//! the crate never touches SQL text.

pub mod budget;
pub mod catalog;
pub mod knowledge;
