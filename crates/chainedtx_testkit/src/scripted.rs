//! Scripted resource managers with injectable failures.
//!
//! Every call is recorded in a [`CallJournal`] shared by all managers of a
//! chain, so tests can assert on the exact cross-resource call order.

use chainedtx_core::{
    ResourceError, ResourceResult, ResourceStatus, ResourceTransactionManager, SavepointToken,
    TransactionDefinition, TransactionHandle,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// An operation on a resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `begin`
    Begin,
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
    /// `flush`
    Flush,
    /// `create_savepoint`
    CreateSavepoint,
    /// `release_savepoint`
    ReleaseSavepoint,
    /// `rollback_to_savepoint`
    RollbackToSavepoint,
    /// `set_rollback_only`, recorded but never failed
    SetRollbackOnly,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Name of the resource that was called.
    pub resource: String,
    /// The operation.
    pub op: Op,
}

/// Shared, ordered record of calls across resources.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call.
    pub fn record(&self, resource: &str, op: Op) {
        self.calls.lock().push(Call {
            resource: resource.to_string(),
            op,
        });
    }

    /// Returns a copy of all calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns the resources that received `op`, in call order.
    #[must_use]
    pub fn resources_for(&self, op: Op) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.resource.clone())
            .collect()
    }

    /// Returns the operations `resource` received, in call order.
    #[must_use]
    pub fn ops_for(&self, resource: &str) -> Vec<Op> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.resource == resource)
            .map(|c| c.op)
            .collect()
    }

    /// Returns how many times `resource` received `op`.
    #[must_use]
    pub fn count(&self, resource: &str, op: Op) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.resource == resource && c.op == op)
            .count()
    }

    /// Forgets all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Transaction value held inside a [`TransactionHandle`] by [`ScriptedManager`].
#[derive(Debug, Default)]
pub struct ScriptedTransaction {
    id: u64,
    rollback_only: AtomicBool,
    completed: AtomicBool,
    savepoints: Mutex<Vec<u64>>,
    next_savepoint: AtomicU64,
}

impl ScriptedTransaction {
    /// Returns the transaction number assigned by the manager.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the live savepoint numbers.
    #[must_use]
    pub fn savepoints(&self) -> Vec<u64> {
        self.savepoints.lock().clone()
    }
}

/// A resource manager that records every call and fails on request.
#[derive(Debug)]
pub struct ScriptedManager {
    name: String,
    journal: CallJournal,
    failures: Mutex<HashSet<Op>>,
    next_txn: AtomicU64,
}

impl ScriptedManager {
    /// Creates a manager recording into `journal`.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: CallJournal) -> Self {
        Self {
            name: name.into(),
            journal,
            failures: Mutex::new(HashSet::new()),
            next_txn: AtomicU64::new(1),
        }
    }

    /// Makes every later `op` fail.
    pub fn fail_on(&self, op: Op) {
        self.failures.lock().insert(op);
    }

    /// Makes `op` succeed again.
    pub fn heal(&self, op: Op) {
        self.failures.lock().remove(&op);
    }

    /// Returns the journal this manager records into.
    #[must_use]
    pub fn journal(&self) -> &CallJournal {
        &self.journal
    }

    fn call(&self, op: Op) -> ResourceResult<()> {
        self.journal.record(&self.name, op);
        if self.failures.lock().contains(&op) {
            return Err(ResourceError::message(format!(
                "{} failed on {:?}",
                self.name, op
            )));
        }
        Ok(())
    }

    fn transaction<'a>(
        &self,
        handle: &'a TransactionHandle,
    ) -> ResourceResult<&'a ScriptedTransaction> {
        handle
            .downcast_ref::<ScriptedTransaction>()
            .ok_or_else(|| ResourceError::message(format!("{}: foreign handle", self.name)))
    }

    fn active<'a>(&self, handle: &'a TransactionHandle) -> ResourceResult<&'a ScriptedTransaction> {
        let txn = self.transaction(handle)?;
        if txn.completed.load(Ordering::SeqCst) {
            return Err(ResourceError::NotActive);
        }
        Ok(txn)
    }

    fn savepoint_id(savepoint: &SavepointToken) -> ResourceResult<u64> {
        savepoint
            .downcast_ref::<u64>()
            .copied()
            .ok_or(ResourceError::UnknownSavepoint)
    }
}

impl ResourceTransactionManager for ScriptedManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, _definition: &TransactionDefinition) -> ResourceResult<TransactionHandle> {
        self.call(Op::Begin)?;
        Ok(TransactionHandle::new(ScriptedTransaction {
            id: self.next_txn.fetch_add(1, Ordering::SeqCst),
            ..ScriptedTransaction::default()
        }))
    }

    fn commit(&self, handle: &TransactionHandle) -> ResourceResult<()> {
        let txn = self.active(handle)?;
        self.call(Op::Commit)?;
        txn.completed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, handle: &TransactionHandle) -> ResourceResult<()> {
        let txn = self.active(handle)?;
        self.call(Op::Rollback)?;
        txn.completed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_rollback_only(&self, handle: &TransactionHandle) {
        self.journal.record(&self.name, Op::SetRollbackOnly);
        if let Ok(txn) = self.transaction(handle) {
            txn.rollback_only.store(true, Ordering::SeqCst);
        }
    }

    fn status(&self, handle: &TransactionHandle) -> ResourceStatus {
        match self.transaction(handle) {
            Ok(txn) => ResourceStatus {
                new_transaction: true,
                completed: txn.completed.load(Ordering::SeqCst),
                has_savepoint: !txn.savepoints.lock().is_empty(),
                rollback_only: txn.rollback_only.load(Ordering::SeqCst),
            },
            Err(_) => ResourceStatus::default(),
        }
    }

    fn flush(&self, handle: &TransactionHandle) -> ResourceResult<()> {
        self.active(handle)?;
        self.call(Op::Flush)
    }

    fn create_savepoint(&self, handle: &TransactionHandle) -> ResourceResult<SavepointToken> {
        let txn = self.active(handle)?;
        self.call(Op::CreateSavepoint)?;
        let id = txn.next_savepoint.fetch_add(1, Ordering::SeqCst) + 1;
        txn.savepoints.lock().push(id);
        Ok(SavepointToken::new(id))
    }

    fn release_savepoint(
        &self,
        handle: &TransactionHandle,
        savepoint: &SavepointToken,
    ) -> ResourceResult<()> {
        let txn = self.active(handle)?;
        let id = Self::savepoint_id(savepoint)?;
        self.call(Op::ReleaseSavepoint)?;
        let mut savepoints = txn.savepoints.lock();
        let pos = savepoints
            .iter()
            .position(|&s| s == id)
            .ok_or(ResourceError::UnknownSavepoint)?;
        savepoints.remove(pos);
        Ok(())
    }

    fn rollback_to_savepoint(
        &self,
        handle: &TransactionHandle,
        savepoint: &SavepointToken,
    ) -> ResourceResult<()> {
        let txn = self.active(handle)?;
        let id = Self::savepoint_id(savepoint)?;
        self.call(Op::RollbackToSavepoint)?;
        let mut savepoints = txn.savepoints.lock();
        let pos = savepoints
            .iter()
            .position(|&s| s == id)
            .ok_or(ResourceError::UnknownSavepoint)?;
        // Later savepoints are discarded; the target itself survives.
        savepoints.truncate(pos + 1);
        Ok(())
    }
}
