//! Knowledge clocks and scoped counter state.
//!
//! A *knowledge clock* is a monotonic counter whose values (stamps) mark
//! records at save time so later reads can ask for "everything newer than
//! what I already have". Each counting namespace — the budget catalog, one
//! budget's entities, one budget's calculated fields — owns exactly one
//! live clock per process.

mod clock;
mod stamper;

pub use clock::KnowledgeClock;
pub use stamper::stamp_collection;

use crate::models::BudgetId;
use std::fmt;

/// A counting namespace over which one knowledge clock is independently
/// monotonic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KnowledgeScope {
    /// The catalog of budgets.
    Catalog,
    /// One budget's entity tables.
    Budget(BudgetId),
    /// One budget's calculated fields, advanced only by the calculation run.
    BudgetCalculations(BudgetId),
}

impl fmt::Display for KnowledgeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Budget(id) => write!(f, "budget:{id}"),
            Self::BudgetCalculations(id) => write!(f, "budget:{id}:calculations"),
        }
    }
}

/// Live counter state for the catalog scope.
///
/// Created at engine initialization and held for the process lifetime.
/// The peer cursors are opaque pass-through values reserved for a future
/// peer-reconciliation protocol; they are persisted and threaded through
/// unchanged.
#[derive(Debug, Clone)]
pub struct CatalogKnowledge {
    /// The catalog-scope clock.
    pub clock: KnowledgeClock,
    /// Opaque cursor: what the peer knows of us.
    pub known_by_peer: u64,
    /// Opaque cursor: what we know of the peer.
    pub peer_known_by_us: u64,
}

impl CatalogKnowledge {
    /// Builds catalog knowledge from persisted state.
    ///
    /// `persisted` is all-zero when no side-table row exists;
    /// `max_observed_stamp` is the maximum stamp already present in the
    /// catalog tables. See [`KnowledgeClock::recover`] for why both are
    /// required.
    #[must_use]
    pub fn recover(persisted: &PersistedCatalogKnowledge, max_observed_stamp: u64) -> Self {
        Self {
            clock: KnowledgeClock::recover(
                KnowledgeScope::Catalog,
                persisted.current,
                max_observed_stamp,
            ),
            known_by_peer: persisted.known_by_peer,
            peer_known_by_us: persisted.peer_known_by_us,
        }
    }
}

/// The durable side-table image of the catalog counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedCatalogKnowledge {
    /// Highest catalog stamp issued.
    pub current: u64,
    /// Opaque cursor: what the peer knows of us.
    pub known_by_peer: u64,
    /// Opaque cursor: what we know of the peer.
    pub peer_known_by_us: u64,
}

impl From<&CatalogKnowledge> for PersistedCatalogKnowledge {
    fn from(knowledge: &CatalogKnowledge) -> Self {
        Self {
            current: knowledge.clock.current(),
            known_by_peer: knowledge.known_by_peer,
            peer_known_by_us: knowledge.peer_known_by_us,
        }
    }
}

/// Live counter state for one budget.
///
/// Created when the budget becomes active and replaced when a different
/// budget is activated. Owns two clocks: the primary entity scope and the
/// calculations scope. The watermark pair is process-local (reset to 0 on
/// activation) and only ever advances after a successful reload.
#[derive(Debug, Clone)]
pub struct BudgetKnowledge {
    /// The budget-scope clock stamping ordinary saves.
    pub clock: KnowledgeClock,
    /// The calculations-scope clock stamping recomputed fields.
    pub calc_clock: KnowledgeClock,
    /// Opaque cursor: what the peer knows of us.
    pub known_by_peer: u64,
    /// Opaque cursor: what we know of the peer.
    pub peer_known_by_us: u64,
    /// Exclusive lower bound of the next incremental read (primary scope).
    pub last_loaded: u64,
    /// Exclusive lower bound of the next incremental read (calculations scope).
    pub last_loaded_calc: u64,
}

impl BudgetKnowledge {
    /// Builds budget knowledge from persisted state.
    ///
    /// The two `max_observed_*` values come from an aggregate query over
    /// the budget's entity tables and guard against a counter update that
    /// did not survive a crash. Watermarks start at 0: the first load
    /// after activation is a full load.
    #[must_use]
    pub fn recover(
        budget_id: &BudgetId,
        persisted: &PersistedBudgetKnowledge,
        max_observed_stamp: u64,
        max_observed_calc_stamp: u64,
    ) -> Self {
        Self {
            clock: KnowledgeClock::recover(
                KnowledgeScope::Budget(budget_id.clone()),
                persisted.current,
                max_observed_stamp,
            ),
            calc_clock: KnowledgeClock::recover(
                KnowledgeScope::BudgetCalculations(budget_id.clone()),
                persisted.calc_current,
                max_observed_calc_stamp,
            ),
            known_by_peer: persisted.known_by_peer,
            peer_known_by_us: persisted.peer_known_by_us,
            last_loaded: 0,
            last_loaded_calc: 0,
        }
    }

    /// Returns the watermark pair currently in effect.
    #[must_use]
    pub const fn watermarks(&self) -> (u64, u64) {
        (self.last_loaded, self.last_loaded_calc)
    }
}

/// The durable side-table image of one budget's counters.
///
/// What [`BudgetKnowledge`] persists between runs; the watermark pair is
/// deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedBudgetKnowledge {
    /// Highest primary stamp issued.
    pub current: u64,
    /// Highest calculations stamp issued.
    pub calc_current: u64,
    /// Opaque cursor: what the peer knows of us.
    pub known_by_peer: u64,
    /// Opaque cursor: what we know of the peer.
    pub peer_known_by_us: u64,
}

impl From<&BudgetKnowledge> for PersistedBudgetKnowledge {
    fn from(knowledge: &BudgetKnowledge) -> Self {
        Self {
            current: knowledge.clock.current(),
            calc_current: knowledge.calc_clock.current(),
            known_by_peer: knowledge.known_by_peer,
            peer_known_by_us: knowledge.peer_known_by_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        let id = BudgetId::new("b-42");
        assert_eq!(KnowledgeScope::Catalog.to_string(), "catalog");
        assert_eq!(KnowledgeScope::Budget(id.clone()).to_string(), "budget:b-42");
        assert_eq!(
            KnowledgeScope::BudgetCalculations(id).to_string(),
            "budget:b-42:calculations"
        );
    }

    #[test]
    fn test_budget_knowledge_recover_resets_watermarks() {
        let persisted = PersistedBudgetKnowledge {
            current: 9,
            calc_current: 4,
            known_by_peer: 2,
            peer_known_by_us: 3,
        };
        let knowledge = BudgetKnowledge::recover(&BudgetId::new("b1"), &persisted, 0, 0);
        assert_eq!(knowledge.watermarks(), (0, 0));
        assert_eq!(knowledge.clock.current(), 9);
        assert_eq!(knowledge.calc_clock.current(), 4);
        assert_eq!(knowledge.known_by_peer, 2);
        assert_eq!(knowledge.peer_known_by_us, 3);
    }

    #[test]
    fn test_persisted_image_carries_cursors_unchanged() {
        let persisted = PersistedBudgetKnowledge {
            current: 1,
            calc_current: 0,
            known_by_peer: 7,
            peer_known_by_us: 8,
        };
        let mut knowledge = BudgetKnowledge::recover(&BudgetId::new("b1"), &persisted, 0, 0);
        knowledge.clock.next();

        let image = PersistedBudgetKnowledge::from(&knowledge);
        assert_eq!(image.current, 2);
        assert_eq!(image.known_by_peer, 7);
        assert_eq!(image.peer_known_by_us, 8);
    }
}
