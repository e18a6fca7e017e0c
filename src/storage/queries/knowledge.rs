//! Knowledge side-table queries.
//!
//! The side tables persist each scope's counter between runs. Loading a
//! scope always pairs the side-table read with an aggregate over the
//! scope's entity tables; the clock recovery step takes the maximum of
//! the two (see [`crate::knowledge::KnowledgeClock::recover`]).

use crate::Result;
use crate::knowledge::{PersistedBudgetKnowledge, PersistedCatalogKnowledge};
use crate::models::BudgetId;
use crate::storage::{BatchResult, Query, row};
use serde_json::json;

/// Request name for the catalog side-table row.
pub const CATALOG_KNOWLEDGE: &str = "catalog_knowledge";
/// Request name for the maximum stamp observed in catalog tables.
pub const CATALOG_KNOWLEDGE_FROM_ENTITIES: &str = "catalog_knowledge_from_entities";
/// Request name for a budget's side-table row.
pub const BUDGET_KNOWLEDGE: &str = "budget_knowledge";
/// Request name for the maximum stamps observed in a budget's tables.
pub const BUDGET_KNOWLEDGE_FROM_ENTITIES: &str = "budget_knowledge_from_entities";

/// Reads the catalog counter row.
#[must_use]
pub fn load_catalog_knowledge() -> Query {
    Query::read(
        CATALOG_KNOWLEDGE,
        "SELECT current, known_by_peer, peer_known_by_us FROM catalog_knowledge WHERE id = 1",
        vec![],
    )
}

/// Upserts the catalog counter row.
#[must_use]
pub fn save_catalog_knowledge(knowledge: &PersistedCatalogKnowledge) -> Query {
    Query::write(
        "save_catalog_knowledge",
        "REPLACE INTO catalog_knowledge (id, current, known_by_peer, peer_known_by_us) \
         VALUES (1, ?1, ?2, ?3)",
        vec![
            json!(knowledge.current),
            json!(knowledge.known_by_peer),
            json!(knowledge.peer_known_by_us),
        ],
    )
}

/// Aggregates the maximum stamp present in the catalog tables.
#[must_use]
pub fn max_catalog_stamp() -> Query {
    Query::read(
        CATALOG_KNOWLEDGE_FROM_ENTITIES,
        "SELECT COALESCE(MAX(knowledge_stamp), 0) AS max_stamp FROM budgets",
        vec![],
    )
}

/// Reads one budget's counter row.
#[must_use]
pub fn load_budget_knowledge(budget_id: &BudgetId) -> Query {
    Query::read(
        BUDGET_KNOWLEDGE,
        "SELECT current, calc_current, known_by_peer, peer_known_by_us \
         FROM budget_knowledge WHERE budget_id = ?1",
        vec![json!(budget_id.as_str())],
    )
}

/// Upserts one budget's counter row.
#[must_use]
pub fn save_budget_knowledge(budget_id: &BudgetId, knowledge: &PersistedBudgetKnowledge) -> Query {
    Query::write(
        "save_budget_knowledge",
        "REPLACE INTO budget_knowledge \
         (budget_id, current, calc_current, known_by_peer, peer_known_by_us) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        vec![
            json!(budget_id.as_str()),
            json!(knowledge.current),
            json!(knowledge.calc_current),
            json!(knowledge.known_by_peer),
            json!(knowledge.peer_known_by_us),
        ],
    )
}

/// Aggregates the maximum primary and calculations stamps present across
/// one budget's entity tables.
#[must_use]
pub fn max_budget_stamps(budget_id: &BudgetId) -> Query {
    let id = json!(budget_id.as_str());
    Query::read(
        BUDGET_KNOWLEDGE_FROM_ENTITIES,
        "SELECT \
           (SELECT COALESCE(MAX(s), 0) FROM ( \
              SELECT MAX(knowledge_stamp) AS s FROM accounts WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(knowledge_stamp) FROM payees WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(knowledge_stamp) FROM master_categories WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(knowledge_stamp) FROM sub_categories WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(knowledge_stamp) FROM transactions WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(knowledge_stamp) FROM monthly_budgets WHERE budget_id = ?1 \
           )) AS max_stamp, \
           (SELECT COALESCE(MAX(s), 0) FROM ( \
              SELECT MAX(calc_knowledge_stamp) AS s FROM accounts WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(calc_knowledge_stamp) FROM transactions WHERE budget_id = ?1 \
              UNION ALL SELECT MAX(calc_knowledge_stamp) FROM monthly_budgets WHERE budget_id = ?1 \
           )) AS max_calc_stamp",
        vec![id],
    )
}

/// Extracts the persisted catalog counters from a batch result,
/// defaulting to zeros when no row exists yet.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if a present row is malformed.
pub fn catalog_knowledge_from_result(result: &BatchResult) -> Result<PersistedCatalogKnowledge> {
    result.first(CATALOG_KNOWLEDGE).map_or_else(
        || Ok(PersistedCatalogKnowledge::default()),
        |r| {
            Ok(PersistedCatalogKnowledge {
                current: row::u64_column(r, "current")?,
                known_by_peer: row::u64_column(r, "known_by_peer")?,
                peer_known_by_us: row::u64_column(r, "peer_known_by_us")?,
            })
        },
    )
}

/// Extracts one budget's persisted counters from a batch result,
/// defaulting to zeros when no row exists yet.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if a present row is malformed.
pub fn budget_knowledge_from_result(result: &BatchResult) -> Result<PersistedBudgetKnowledge> {
    result.first(BUDGET_KNOWLEDGE).map_or_else(
        || Ok(PersistedBudgetKnowledge::default()),
        |r| {
            Ok(PersistedBudgetKnowledge {
                current: row::u64_column(r, "current")?,
                calc_current: row::u64_column(r, "calc_current")?,
                known_by_peer: row::u64_column(r, "known_by_peer")?,
                peer_known_by_us: row::u64_column(r, "peer_known_by_us")?,
            })
        },
    )
}

/// Extracts the `(max_stamp, max_calc_stamp)` aggregate from a batch
/// result; `(0, 0)` when the budget has no rows at all.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if the aggregate row is
/// malformed.
pub fn max_stamps_from_result(result: &BatchResult) -> Result<(u64, u64)> {
    result.first(BUDGET_KNOWLEDGE_FROM_ENTITIES).map_or(
        Ok((0, 0)),
        |r| {
            Ok((
                row::u64_column(r, "max_stamp")?,
                row::u64_column(r, "max_calc_stamp")?,
            ))
        },
    )
}
