//! End-to-end sync rounds: save, recompute, reload, and the durable
//! state each failing phase leaves behind.

use anyhow::Result;
use fiscus::knowledge::KnowledgeClock;
use fiscus::models::{Account, ClearedStatus, Payee, Transaction};
use fiscus::services::{CalculationRunner, MonthlyBudgetCalculator, NoopCalculationRunner};
use fiscus::storage::queries::budget as budget_queries;
use fiscus::storage::{BatchResult, Query, QueryBackend, SqliteBackend};
use fiscus::{BudgetId, EngineConfig, EntityCollection, EntityId, Error, SyncService};
use std::sync::{Arc, Mutex};

/// Backend wrapper that rejects any batch containing a request with a
/// chosen name, standing in for a disk-level failure.
struct FaultInjector {
    inner: SqliteBackend,
    fail_on: Mutex<Option<String>>,
}

impl FaultInjector {
    fn new(inner: SqliteBackend) -> Self {
        Self { inner, fail_on: Mutex::new(None) }
    }

    fn fail_batches_naming(&self, name: &str) {
        *self.fail_on.lock().unwrap() = Some(name.to_string());
    }

    fn heal(&self) {
        *self.fail_on.lock().unwrap() = None;
    }
}

impl QueryBackend for FaultInjector {
    fn execute(&self, queries: &[Query]) -> fiscus::Result<BatchResult> {
        if let Some(target) = self.fail_on.lock().unwrap().clone() {
            if queries.iter().any(|q| q.name == target) {
                return Err(Error::Storage {
                    operation: target,
                    cause: "injected fault".to_string(),
                });
            }
        }
        self.inner.execute(queries)
    }
}

/// Runner that always fails, for exercising the recompute phase boundary.
struct FailingRunner;

impl CalculationRunner for FailingRunner {
    fn run(
        &mut self,
        _backend: &dyn QueryBackend,
        _budget_id: &BudgetId,
        _calc_clock: &mut KnowledgeClock,
    ) -> fiscus::Result<()> {
        Err(Error::Storage {
            operation: "recompute".to_string(),
            cause: "injected fault".to_string(),
        })
    }
}

fn ready_engine(
    backend: Arc<dyn QueryBackend>,
    calculations: Box<dyn CalculationRunner>,
) -> Result<SyncService> {
    let mut engine = SyncService::new(backend, calculations, EngineConfig::default());
    engine.initialize()?;
    engine.select_active_budget()?;
    engine.load_budget_data()?;
    Ok(engine)
}

fn payee(name: &str) -> Payee {
    Payee {
        entity_id: EntityId::generate(),
        payee_name: name.to_string(),
        enabled: true,
        ..Payee::default()
    }
}

fn checking_with_grocery_run() -> (EntityId, EntityCollection) {
    let account_id = EntityId::generate();
    let mut changes = EntityCollection::default();
    changes.accounts.push(Account {
        entity_id: account_id.clone(),
        account_name: "Checking".to_string(),
        on_budget: true,
        ..Account::default()
    });
    changes.transactions.push(Transaction {
        entity_id: EntityId::generate(),
        account_id: account_id.clone(),
        date: 1_755_000_000_000, // 2025-08
        amount: -42_000,
        cleared: ClearedStatus::Cleared,
        ..Transaction::default()
    });
    (account_id, changes)
}

#[test]
fn lifecycle_survives_process_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("fiscus.db");

    let first_round_view_size;
    {
        let backend: Arc<dyn QueryBackend> = Arc::new(SqliteBackend::new(&db_path)?);
        let mut engine = ready_engine(backend, Box::new(MonthlyBudgetCalculator))?;

        let (_, mut changes) = checking_with_grocery_run();
        changes.payees.push(payee("Grocery Store"));
        let view = engine.sync_with_database(changes)?;

        assert!(view.payees.iter().any(|p| p.payee_name == "Grocery Store"));
        let monthly = view
            .monthly_budgets
            .iter()
            .find(|m| m.month == "2025-08")
            .expect("recompute created the month row");
        assert_eq!(monthly.outflows, 42_000);
        first_round_view_size = view.record_count();
    }

    // Fresh process: everything comes back from disk.
    let backend: Arc<dyn QueryBackend> = Arc::new(SqliteBackend::new(&db_path)?);
    let engine = ready_engine(backend, Box::new(MonthlyBudgetCalculator))?;
    let view = engine.current_view();
    assert_eq!(view.record_count(), first_round_view_size);
    assert!(view.payees.iter().any(|p| p.payee_name == "Grocery Store"));
    assert!(view.monthly_budgets.iter().any(|m| m.month == "2025-08"));
    Ok(())
}

#[test]
fn another_writers_records_arrive_through_an_empty_round() -> Result<()> {
    let backend: Arc<dyn QueryBackend> = Arc::new(SqliteBackend::in_memory()?);
    let mut writer = ready_engine(Arc::clone(&backend), Box::new(NoopCalculationRunner))?;
    let mut reader = ready_engine(Arc::clone(&backend), Box::new(NoopCalculationRunner))?;

    let mut changes = EntityCollection::default();
    changes.payees.push(payee("Landlord"));
    writer.sync_with_database(changes)?;

    assert!(!reader.current_view().payees.iter().any(|p| p.payee_name == "Landlord"));
    let view = reader.sync_with_database(EntityCollection::default())?;
    assert!(view.payees.iter().any(|p| p.payee_name == "Landlord"));
    Ok(())
}

#[test]
fn failed_save_leaves_no_partial_writes_and_retry_succeeds() -> Result<()> {
    let injector = Arc::new(FaultInjector::new(SqliteBackend::in_memory()?));
    let backend: Arc<dyn QueryBackend> = injector.clone();
    let mut engine = ready_engine(backend, Box::new(NoopCalculationRunner))?;

    // The counter update rides in the phase-1 batch; rejecting it must
    // reject the entity writes with it.
    injector.fail_batches_naming("save_budget_knowledge");
    let mut changes = EntityCollection::default();
    let record = payee("Utility Co");
    changes.payees.push(record.clone());
    let err = engine.sync_with_database(changes).unwrap_err();
    assert!(matches!(err, Error::SaveFailed { .. }));

    let budget_id = engine.active_budget().unwrap().entity_id.clone();
    let rows = injector
        .inner
        .execute(&[budget_queries::load_payees(&budget_id, 0)])?;
    assert!(rows.rows(budget_queries::PAYEES).is_empty());

    injector.heal();
    let mut retry = EntityCollection::default();
    retry.payees.push(record);
    let view = engine.sync_with_database(retry)?;
    let saved: Vec<_> = view.payees.iter().filter(|p| p.payee_name == "Utility Co").collect();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].knowledge_stamp > 0);
    Ok(())
}

#[test]
fn failed_recompute_keeps_saved_rows_and_watermarks() -> Result<()> {
    let backend: Arc<dyn QueryBackend> = Arc::new(SqliteBackend::in_memory()?);
    let mut engine = ready_engine(Arc::clone(&backend), Box::new(FailingRunner))?;

    let (_, changes) = checking_with_grocery_run();
    let err = engine.sync_with_database(changes).unwrap_err();
    assert!(matches!(err, Error::RecomputeFailed { .. }));

    // Phase 1 committed before the recompute ran.
    let budget_id = engine.active_budget().unwrap().entity_id.clone();
    let rows = backend.execute(&[budget_queries::load_transactions(&budget_id, 0, 0)])?;
    assert_eq!(rows.rows(budget_queries::TRANSACTIONS).len(), 1);

    // Watermarks did not move, so a plain reload still returns the rows.
    let view = engine.load_budget_data()?;
    assert_eq!(view.transactions.len(), 1);
    assert_eq!(view.accounts.len(), 1);
    Ok(())
}

#[test]
fn failed_reload_keeps_watermarks_so_retry_reads_the_delta() -> Result<()> {
    let injector = Arc::new(FaultInjector::new(SqliteBackend::in_memory()?));
    let backend: Arc<dyn QueryBackend> = injector.clone();
    let mut engine = ready_engine(backend, Box::new(NoopCalculationRunner))?;

    injector.fail_batches_naming(budget_queries::ACCOUNTS);
    let mut changes = EntityCollection::default();
    changes.payees.push(payee("Pharmacy"));
    let err = engine.sync_with_database(changes).unwrap_err();
    assert!(matches!(err, Error::ReloadFailed { .. }));
    // Save went through; only the reload was rejected, and the view was
    // left untouched.
    assert!(!engine.current_view().payees.iter().any(|p| p.payee_name == "Pharmacy"));

    injector.heal();
    let view = engine.load_budget_data()?;
    assert!(view.payees.iter().any(|p| p.payee_name == "Pharmacy"));
    Ok(())
}

#[test]
fn tombstones_flow_through_but_are_hidden_from_live_views() -> Result<()> {
    let backend: Arc<dyn QueryBackend> = Arc::new(SqliteBackend::in_memory()?);
    let mut engine = ready_engine(backend, Box::new(NoopCalculationRunner))?;

    let mut changes = EntityCollection::default();
    changes.payees.push(payee("Short Lived"));
    let view = engine.sync_with_database(changes)?;
    let mut dead = view
        .payees
        .iter()
        .find(|p| p.payee_name == "Short Lived")
        .unwrap()
        .clone();

    dead.is_tombstone = true;
    let mut deletion = EntityCollection::default();
    deletion.payees.push(dead);
    let view = engine.sync_with_database(deletion)?;

    // The record still exists and was re-stamped, but live accessors
    // skip it.
    let stored = view.payees.iter().find(|p| p.payee_name == "Short Lived").unwrap();
    assert!(stored.is_tombstone);
    assert!(!view.live_payees().any(|p| p.payee_name == "Short Lived"));
    Ok(())
}
