//! Integration tests for composite savepoints.

use chainedtx_core::{
    ChainCoordinator, ChainError, ManagerRef, ResourceError, ResourceResult, ResourceStatus,
    ResourceTransactionManager, TransactionDefinition, TransactionHandle,
};
use chainedtx_testkit::prelude::*;
use std::sync::Arc;

fn two_stores() -> (ChainCoordinator, Arc<InMemoryResource>, Arc<InMemoryResource>) {
    let orders = Arc::new(InMemoryResource::new("orders"));
    let billing = Arc::new(InMemoryResource::new("billing"));
    let chain = ChainCoordinator::new([
        Arc::clone(&orders) as ManagerRef,
        Arc::clone(&billing) as ManagerRef,
    ])
    .unwrap();
    (chain, orders, billing)
}

#[test]
fn rollback_to_savepoint_restores_every_resource() {
    let (chain, orders, billing) = two_stores();
    let orders_ref = Arc::clone(&orders) as ManagerRef;
    let billing_ref = Arc::clone(&billing) as ManagerRef;

    let status = chain.begin(&TransactionDefinition::default()).unwrap();
    status
        .with_handle(&orders_ref, |h| orders.put(h, "order-1", "pending"))
        .unwrap();
    status
        .with_handle(&billing_ref, |h| billing.put(h, "invoice-1", "open"))
        .unwrap();

    let sp = status.create_savepoint().unwrap();
    assert_eq!(sp.len(), 2);
    assert!(status.has_savepoint());

    status
        .with_handle(&orders_ref, |h| orders.put(h, "order-1", "cancelled"))
        .unwrap();
    status
        .with_handle(&billing_ref, |h| billing.put(h, "invoice-2", "open"))
        .unwrap();

    status.rollback_to_savepoint(&sp).unwrap();

    let order = status
        .with_handle(&orders_ref, |h| orders.get(h, "order-1"))
        .unwrap();
    assert_eq!(order.as_deref(), Some("pending"));
    let invoice = status
        .with_handle(&billing_ref, |h| billing.get(h, "invoice-2"))
        .unwrap();
    assert_eq!(invoice, None);

    // Nothing was committed or rolled back by the savepoint rollback.
    assert_eq!(orders.commit_count(), 0);
    assert!(!status.is_completed());

    status.release_savepoint(sp).unwrap();
    assert!(!status.has_savepoint());

    chain.commit(status).unwrap();
    assert_eq!(orders.committed("order-1").as_deref(), Some("pending"));
    assert_eq!(billing.committed("invoice-1").as_deref(), Some("open"));
    assert_eq!(billing.committed("invoice-2"), None);
}

#[test]
fn savepoint_calls_do_not_commit_or_roll_back() {
    let chain = Chain::new(3);
    let status = chain.begin(&TransactionDefinition::default()).unwrap();

    let sp = status.create_savepoint().unwrap();
    status.rollback_to_savepoint(&sp).unwrap();
    status.release_savepoint(sp).unwrap();

    assert_eq!(chain.journal.resources_for(Op::CreateSavepoint), chain.names());
    assert_eq!(chain.journal.resources_for(Op::RollbackToSavepoint), chain.names());
    assert_eq!(chain.journal.resources_for(Op::ReleaseSavepoint), chain.names());
    assert!(chain.journal.resources_for(Op::Commit).is_empty());
    assert!(chain.journal.resources_for(Op::Rollback).is_empty());

    chain.rollback(status).unwrap();
}

#[test]
fn savepoint_create_failure_propagates_immediately() {
    let chain = Chain::new(3);
    chain.fail(1, Op::CreateSavepoint);
    let status = chain.begin(&TransactionDefinition::default()).unwrap();

    let err = status.create_savepoint().unwrap_err();
    assert!(matches!(err, ChainError::Resource(ResourceError::Message(_))));
    assert_eq!(chain.journal.resources_for(Op::CreateSavepoint), vec!["r0", "r1"]);
    // No cleanup of the savepoint already taken on r0.
    assert!(chain.journal.resources_for(Op::ReleaseSavepoint).is_empty());
    assert!(status.has_savepoint());

    chain.rollback(status).unwrap();
}

#[test]
fn savepoints_are_not_shared_between_transactions() {
    let chain = Chain::new(2);
    let first = chain.begin(&TransactionDefinition::default()).unwrap();
    let second = chain.begin(&TransactionDefinition::default()).unwrap();

    let sp = first.create_savepoint().unwrap();
    let err = second.release_savepoint(sp).unwrap_err();
    assert!(matches!(err, ChainError::InvalidOperation { .. }));

    chain.rollback(second).unwrap();
    chain.rollback(first).unwrap();
}

#[test]
fn unsupported_savepoints_surface_as_resource_errors() {
    struct NoSavepoints(InMemoryResource);

    impl ResourceTransactionManager for NoSavepoints {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn begin(&self, definition: &TransactionDefinition) -> ResourceResult<TransactionHandle> {
            self.0.begin(definition)
        }

        fn commit(&self, handle: &TransactionHandle) -> ResourceResult<()> {
            self.0.commit(handle)
        }

        fn rollback(&self, handle: &TransactionHandle) -> ResourceResult<()> {
            self.0.rollback(handle)
        }

        fn set_rollback_only(&self, handle: &TransactionHandle) {
            self.0.set_rollback_only(handle);
        }

        fn status(&self, handle: &TransactionHandle) -> ResourceStatus {
            self.0.status(handle)
        }
    }

    let chain = ChainCoordinator::new([
        Arc::new(NoSavepoints(InMemoryResource::new("legacy"))) as ManagerRef,
    ])
    .unwrap();
    let status = chain.begin(&TransactionDefinition::default()).unwrap();
    let err = status.create_savepoint().unwrap_err();
    assert!(matches!(
        err,
        ChainError::Resource(ResourceError::SavepointUnsupported)
    ));
    chain.rollback(status).unwrap();
}
