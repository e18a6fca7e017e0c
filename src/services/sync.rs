//! The sync orchestrator.
//!
//! [`SyncService`] owns the live knowledge state for the process and
//! drives the engine's central operation, the sync round:
//!
//! 1. **Save** — stamp the caller's dirty records from the budget-scope
//!    clock and write them durably together with the counter update.
//! 2. **Recompute** — hand the calculations-scope clock to the
//!    [`CalculationRunner`], then persist the advanced counters.
//! 3. **Reload** — incrementally read everything above the watermarks
//!    that were in effect when the round began, merge it into the view,
//!    and only then advance the watermarks.
//!
//! Reloading against the pre-round watermarks is what makes a caller's
//! own saves visible to it: the records stamped in phase 1 sit above the
//! old watermarks and therefore come back in phase 3. A failed phase
//! leaves the watermarks untouched, so retrying a round is always safe.

use super::calculations::CalculationRunner;
use super::loader::IncrementalLoader;
use super::selector::{BudgetSelector, SelectedBudget};
use crate::config::EngineConfig;
use crate::knowledge::{
    BudgetKnowledge, CatalogKnowledge, PersistedBudgetKnowledge, stamp_collection,
};
use crate::models::{Budget, EntityCollection};
use crate::storage::queries::knowledge as knowledge_queries;
use crate::storage::queries::{budget as budget_queries, knowledge::CATALOG_KNOWLEDGE_FROM_ENTITIES};
use crate::storage::{QueryBackend, row};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// The phase of a sync round, used in logs and failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Stamping and durably writing the caller's dirty records.
    Save,
    /// Running the derived-value recomputation.
    Recompute,
    /// Incrementally reading everything above the round's watermarks.
    Reload,
}

impl SyncPhase {
    /// Returns the phase's label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Recompute => "recompute",
            Self::Reload => "reload",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The budget currently open, with its live clocks and watermarks.
struct ActiveBudget {
    budget: Budget,
    knowledge: BudgetKnowledge,
}

/// Orchestrates the engine lifecycle over one backend.
///
/// Holds the catalog knowledge for the process lifetime and the active
/// budget's knowledge from activation until a different budget is
/// selected. All operations take `&mut self`; rounds cannot overlap.
pub struct SyncService {
    backend: Arc<dyn QueryBackend>,
    calculations: Box<dyn CalculationRunner>,
    config: EngineConfig,
    catalog: Option<CatalogKnowledge>,
    active: Option<ActiveBudget>,
    view: EntityCollection,
}

impl SyncService {
    /// Creates an engine over the given backend and calculation runner.
    ///
    /// The engine is inert until [`Self::initialize`] succeeds.
    #[must_use]
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        calculations: Box<dyn CalculationRunner>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            calculations,
            config,
            catalog: None,
            active: None,
            view: EntityCollection::default(),
        }
    }

    /// Recovers the catalog knowledge from storage.
    ///
    /// Reads the catalog counter row together with the maximum stamp
    /// actually present in the catalog tables and takes the larger, so a
    /// counter update lost to a crash can never lead to duplicate stamps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitializationFailed`]; the engine retains no
    /// state and must not be used further.
    #[instrument(skip_all)]
    pub fn initialize(&mut self) -> Result<()> {
        let result = self
            .backend
            .execute(&[
                knowledge_queries::load_catalog_knowledge(),
                knowledge_queries::max_catalog_stamp(),
            ])
            .map_err(|e| Error::InitializationFailed { cause: e.to_string() })?;

        let persisted = knowledge_queries::catalog_knowledge_from_result(&result)
            .map_err(|e| Error::InitializationFailed { cause: e.to_string() })?;
        let max_observed = result
            .first(CATALOG_KNOWLEDGE_FROM_ENTITIES)
            .map_or(Ok(0), |r| row::u64_column(r, "max_stamp"))
            .map_err(|e| Error::InitializationFailed { cause: e.to_string() })?;

        let catalog = CatalogKnowledge::recover(&persisted, max_observed);
        info!(current = catalog.clock.current(), "catalog knowledge recovered");
        self.catalog = Some(catalog);
        Ok(())
    }

    /// Selects (or creates) the active budget and recovers its clocks.
    ///
    /// Replaces any previously active budget: the view is cleared and the
    /// watermarks reset to 0, so the first reload afterwards is a full
    /// load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when called before
    /// [`Self::initialize`] and [`Error::SelectionFailed`] when the
    /// catalog or the budget's counters cannot be read.
    #[instrument(skip_all)]
    pub fn select_active_budget(&mut self) -> Result<&Budget> {
        let Some(catalog) = self.catalog.as_mut() else {
            return Err(Error::InvalidInput(
                "engine not initialized; call initialize() first".to_string(),
            ));
        };

        let selector = BudgetSelector::new(Arc::clone(&self.backend));
        let SelectedBudget { budget, newly_created } =
            selector.select_active(catalog, &self.config.default_budget_name)?;

        let result = self
            .backend
            .execute(&[
                knowledge_queries::load_budget_knowledge(&budget.entity_id),
                knowledge_queries::max_budget_stamps(&budget.entity_id),
            ])
            .map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;
        let persisted = knowledge_queries::budget_knowledge_from_result(&result)
            .map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;
        let (max_stamp, max_calc_stamp) = knowledge_queries::max_stamps_from_result(&result)
            .map_err(|e| Error::SelectionFailed { cause: e.to_string() })?;

        let knowledge =
            BudgetKnowledge::recover(&budget.entity_id, &persisted, max_stamp, max_calc_stamp);
        info!(
            budget = %budget.entity_id,
            newly_created,
            current = knowledge.clock.current(),
            calc_current = knowledge.calc_clock.current(),
            "budget activated"
        );

        self.view = EntityCollection::default();
        let active = self.active.insert(ActiveBudget { budget, knowledge });
        Ok(&active.budget)
    }

    /// [`Self::select_active_budget`], degrading selection failure to a
    /// logged `None` for callers that can run without a budget open.
    ///
    /// Only [`Error::SelectionFailed`] is swallowed; other errors still
    /// indicate misuse and are logged at the same level.
    pub fn select_active_budget_best_effort(&mut self) -> Option<&Budget> {
        match self.select_active_budget() {
            Ok(budget) => Some(budget),
            Err(e) => {
                warn!(error = %e, "budget selection failed, continuing without one");
                None
            },
        }
    }

    /// Runs one sync round: save `changes`, recompute, reload.
    ///
    /// `changes` carries the caller's dirty records; their stamps are
    /// assigned here and any value the caller put there is overwritten.
    /// An empty `changes` skips the save write but still recomputes and
    /// reloads, which is how a caller picks up another writer's records.
    ///
    /// Returns the merged view after the round.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] with no active budget, otherwise one of
    /// [`Error::SaveFailed`], [`Error::RecomputeFailed`] or
    /// [`Error::ReloadFailed`]; see each variant for the durable state it
    /// leaves behind. Retrying the round after any of them is safe.
    #[instrument(skip_all, fields(records = changes.record_count()))]
    pub fn sync_with_database(&mut self, changes: EntityCollection) -> Result<&EntityCollection> {
        let started = Instant::now();
        let outcome = self.run_round(changes);

        let status = match &outcome {
            Ok(()) => "ok",
            Err(Error::SaveFailed { .. }) => "save_failed",
            Err(Error::RecomputeFailed { .. }) => "recompute_failed",
            Err(Error::ReloadFailed { .. }) => "reload_failed",
            Err(_) => "error",
        };
        metrics::counter!("budget_sync_total", "status" => status).increment(1);
        metrics::histogram!("budget_sync_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        outcome?;
        Ok(&self.view)
    }

    fn run_round(&mut self, mut changes: EntityCollection) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(Error::InvalidInput(
                "no active budget; call select_active_budget() first".to_string(),
            ));
        };

        // Phase 1: stamp and save. The counter update rides in the same
        // batch as the records it covers.
        let stamped = stamp_collection(
            &mut changes,
            &active.budget.entity_id,
            &mut active.knowledge.clock,
        );
        if stamped > 0 {
            let mut batch = budget_queries::insert_collection(&changes);
            batch.push(knowledge_queries::save_budget_knowledge(
                &active.budget.entity_id,
                &PersistedBudgetKnowledge::from(&active.knowledge),
            ));
            self.backend
                .execute(&batch)
                .map_err(|e| Error::SaveFailed { cause: e.to_string() })?;
            debug!(phase = %SyncPhase::Save, stamped, "dirty records durable");
        }

        // Phase 2: recompute. The runner reads committed state and is the
        // only writer allowed to draw from the calculations clock.
        let calc_before = active.knowledge.calc_clock.current();
        self.calculations
            .run(
                self.backend.as_ref(),
                &active.budget.entity_id,
                &mut active.knowledge.calc_clock,
            )
            .map_err(|e| Error::RecomputeFailed { cause: e.to_string() })?;
        if active.knowledge.calc_clock.current() > calc_before {
            self.backend
                .execute(&[knowledge_queries::save_budget_knowledge(
                    &active.budget.entity_id,
                    &PersistedBudgetKnowledge::from(&active.knowledge),
                )])
                .map_err(|e| Error::RecomputeFailed { cause: e.to_string() })?;
            debug!(
                phase = %SyncPhase::Recompute,
                calc_current = active.knowledge.calc_clock.current(),
                "calculation stamps durable"
            );
        }

        // Phase 3: reload against the watermarks in effect when the round
        // began, so the records just saved and recomputed come back.
        let merged = reload(&self.backend, active, &mut self.view)?;
        debug!(phase = %SyncPhase::Reload, merged, "sync round complete");
        Ok(())
    }

    /// Reloads everything above the current watermarks without saving or
    /// recomputing anything. Returns the merged view.
    ///
    /// After activation this is a full load; afterwards it picks up only
    /// records another writer stamped since the last look.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] with no active budget, otherwise
    /// [`Error::ReloadFailed`]. Watermarks are untouched on failure.
    #[instrument(skip_all)]
    pub fn load_budget_data(&mut self) -> Result<&EntityCollection> {
        let Some(active) = self.active.as_mut() else {
            return Err(Error::InvalidInput(
                "no active budget; call select_active_budget() first".to_string(),
            ));
        };
        reload(&self.backend, active, &mut self.view)?;
        Ok(&self.view)
    }

    /// Returns the in-memory view accumulated by reloads.
    #[must_use]
    pub const fn current_view(&self) -> &EntityCollection {
        &self.view
    }

    /// Returns the active budget, if one has been selected.
    #[must_use]
    pub fn active_budget(&self) -> Option<&Budget> {
        self.active.as_ref().map(|a| &a.budget)
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Loads the delta above the active budget's watermarks, merges it into
/// the view and advances the watermarks from the same snapshot's counter
/// row. Watermarks never move on failure and never move backwards.
fn reload(
    backend: &Arc<dyn QueryBackend>,
    active: &mut ActiveBudget,
    view: &mut EntityCollection,
) -> Result<usize> {
    let (watermark, calc_watermark) = active.knowledge.watermarks();
    let loader = IncrementalLoader::new(Arc::clone(backend));
    let (delta, persisted) = loader
        .load_since(&active.budget.entity_id, watermark, calc_watermark)
        .map_err(|e| Error::ReloadFailed { cause: e.to_string() })?;

    active.knowledge.last_loaded = watermark.max(persisted.current);
    active.knowledge.last_loaded_calc = calc_watermark.max(persisted.calc_current);
    active.knowledge.known_by_peer = persisted.known_by_peer;
    active.knowledge.peer_known_by_us = persisted.peer_known_by_us;

    let merged = delta.record_count();
    view.merge(delta);
    Ok(merged)
}
