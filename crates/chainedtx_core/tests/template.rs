//! Integration tests for callback-style execution.

use chainedtx_core::{
    ChainCoordinator, ChainError, HeuristicState, ManagerRef, TransactionDefinition,
};
use chainedtx_testkit::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[test]
fn execute_commits_on_success() {
    let orders = Arc::new(InMemoryResource::new("orders"));
    let stock = Arc::new(InMemoryResource::new("stock"));
    let orders_ref = Arc::clone(&orders) as ManagerRef;
    let stock_ref = Arc::clone(&stock) as ManagerRef;
    let chain = ChainCoordinator::new([Arc::clone(&orders_ref), Arc::clone(&stock_ref)]).unwrap();

    let id = chain
        .execute(&TransactionDefinition::new().name("place-order"), |status| {
            status.with_handle(&orders_ref, |h| orders.put(h, "order-7", "placed"))?;
            status.with_handle(&stock_ref, |h| stock.put(h, "sku-1", "41"))?;
            Ok(7)
        })
        .unwrap();

    assert_eq!(id, 7);
    assert_eq!(orders.committed("order-7").as_deref(), Some("placed"));
    assert_eq!(stock.committed("sku-1").as_deref(), Some("41"));
}

#[test]
fn execute_rolls_back_on_callback_error() {
    let chain = Chain::new(3);

    let err = chain
        .execute(&TransactionDefinition::default(), |_status| -> Result<(), ChainError> {
            Err(ChainError::aborted("insufficient funds"))
        })
        .unwrap_err();

    assert!(matches!(err, ChainError::Aborted { .. }));
    assert!(chain.journal.resources_for(Op::Commit).is_empty());
    assert_eq!(chain.journal.resources_for(Op::Rollback), chain.reversed_names());
    assert!(!chain.synchronization_active());
}

#[test]
fn execute_discards_callback_writes() {
    let store = Arc::new(InMemoryResource::new("kv"));
    let store_ref = Arc::clone(&store) as ManagerRef;
    let chain = ChainCoordinator::new([Arc::clone(&store_ref)]).unwrap();

    let result: Result<(), ChainError> = chain.execute(&TransactionDefinition::default(), |status| {
        status.with_handle(&store_ref, |h| store.put(h, "k", "v"))?;
        Err(ChainError::aborted("changed my mind"))
    });

    assert!(result.is_err());
    assert_eq!(store.committed_len(), 0);
}

#[test]
fn execute_marks_every_resource_before_first_rollback() {
    let chain = Chain::new(3);

    let result: Result<(), ChainError> = chain.execute(&TransactionDefinition::default(), |_| {
        Err(ChainError::aborted("changed my mind"))
    });
    assert!(result.is_err());

    let calls = chain.journal.calls();
    let first_rollback = calls
        .iter()
        .position(|c| c.op == Op::Rollback)
        .expect("rollback was called");
    let marked: Vec<&str> = calls[..first_rollback]
        .iter()
        .filter(|c| c.op == Op::SetRollbackOnly)
        .map(|c| c.resource.as_str())
        .collect();
    assert_eq!(marked, chain.names());
}

#[test]
fn execute_reports_rollback_failure_with_callback_error() {
    init_tracing();
    let chain = Chain::new(2);
    chain.fail(0, Op::Rollback);

    let err = chain
        .execute(&TransactionDefinition::default(), |_status| -> Result<(), ChainError> {
            Err(ChainError::aborted("validation failed"))
        })
        .unwrap_err();

    match err {
        ChainError::RollbackAfterCallback { callback, source } => {
            assert!(matches!(*callback, ChainError::Aborted { .. }));
            assert!(matches!(*source, ChainError::UnexpectedRollback { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn execute_surfaces_commit_classification() {
    let chain = Chain::new(3);
    chain.fail(1, Op::Commit);

    let err = chain
        .execute(&TransactionDefinition::default(), |_status| Ok(()))
        .unwrap_err();
    assert_eq!(err.heuristic_state(), Some(HeuristicState::Mixed));
}

#[test]
fn execute_does_not_run_callback_when_begin_fails() {
    let chain = Chain::new(2);
    chain.fail(1, Op::Begin);

    let mut ran = false;
    let err = chain
        .execute(&TransactionDefinition::default(), |_status| {
            ran = true;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, ChainError::CannotCreateTransaction { .. }));
    assert!(!ran);
}

#[test]
fn panicking_callback_releases_synchronization() {
    init_tracing();
    let chain = Chain::new(2);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), ChainError> =
            chain.execute(&TransactionDefinition::default(), |_| panic!("callback panicked"));
    }));

    assert!(outcome.is_err());
    assert!(!chain.synchronization_active());

    let status = chain.begin(&TransactionDefinition::default()).unwrap();
    assert!(status.is_new_synchronization());
    chain.commit(status).unwrap();
    assert!(!chain.synchronization_active());
}
