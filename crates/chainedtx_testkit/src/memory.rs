//! In-memory key/value resource for tests.

use chainedtx_core::{
    ResourceError, ResourceResult, ResourceStatus, ResourceTransactionManager, SavepointToken,
    TransactionDefinition, TransactionHandle,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

type Store = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct TxnState {
    /// Working copy seen by the transaction.
    data: Store,
    /// (savepoint id, snapshot of `data` when it was taken)
    savepoints: Vec<(u64, Store)>,
    next_savepoint: u64,
    rollback_only: bool,
    completed: bool,
}

/// Transaction value held inside a [`TransactionHandle`] by [`InMemoryResource`].
#[derive(Debug, Default)]
pub struct MemoryTransaction {
    state: Mutex<TxnState>,
}

/// A transactional key/value store that lives in memory.
///
/// Each transaction works on a private copy of the committed data. Commit
/// replaces the committed data with the copy; rollback discards it.
/// Savepoints snapshot the copy.
///
/// Commits can be made to fail with [`InMemoryResource::fail_commits`] to
/// simulate a fragile resource.
#[derive(Debug)]
pub struct InMemoryResource {
    name: String,
    committed: RwLock<Store>,
    fail_commits: Mutex<bool>,
    commits: AtomicU64,
}

impl InMemoryResource {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            committed: RwLock::new(Store::new()),
            fail_commits: Mutex::new(false),
            commits: AtomicU64::new(0),
        }
    }

    /// Makes later commits fail (or succeed again).
    pub fn fail_commits(&self, fail: bool) {
        *self.fail_commits.lock() = fail;
    }

    /// Returns the committed value for `key`.
    #[must_use]
    pub fn committed(&self, key: &str) -> Option<String> {
        self.committed.read().get(key).cloned()
    }

    /// Returns the number of committed keys.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed.read().len()
    }

    /// Returns how many transactions committed successfully.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Writes `key` inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is no longer active.
    pub fn put(
        &self,
        handle: &TransactionHandle,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> ResourceResult<()> {
        let txn = Self::transaction(handle)?;
        let mut state = txn.state.lock();
        Self::ensure_active(&state)?;
        state.data.insert(key.into(), value.into());
        Ok(())
    }

    /// Reads `key` inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is no longer active.
    pub fn get(&self, handle: &TransactionHandle, key: &str) -> ResourceResult<Option<String>> {
        let txn = Self::transaction(handle)?;
        let state = txn.state.lock();
        Self::ensure_active(&state)?;
        Ok(state.data.get(key).cloned())
    }

    fn transaction(handle: &TransactionHandle) -> ResourceResult<&MemoryTransaction> {
        handle
            .downcast_ref::<MemoryTransaction>()
            .ok_or_else(|| {
                ResourceError::message("handle does not belong to an in-memory resource")
            })
    }

    fn ensure_active(state: &TxnState) -> ResourceResult<()> {
        if state.completed {
            return Err(ResourceError::NotActive);
        }
        Ok(())
    }

    fn savepoint_position(state: &TxnState, savepoint: &SavepointToken) -> ResourceResult<usize> {
        let id = savepoint
            .downcast_ref::<u64>()
            .ok_or(ResourceError::UnknownSavepoint)?;
        state
            .savepoints
            .iter()
            .position(|(sp, _)| sp == id)
            .ok_or(ResourceError::UnknownSavepoint)
    }
}

impl ResourceTransactionManager for InMemoryResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, _definition: &TransactionDefinition) -> ResourceResult<TransactionHandle> {
        let txn = MemoryTransaction::default();
        txn.state.lock().data = self.committed.read().clone();
        Ok(TransactionHandle::new(txn))
    }

    fn commit(&self, handle: &TransactionHandle) -> ResourceResult<()> {
        let txn = Self::transaction(handle)?;
        let mut state = txn.state.lock();
        Self::ensure_active(&state)?;
        if state.rollback_only {
            return Err(ResourceError::message(format!(
                "{}: transaction is rollback-only",
                self.name
            )));
        }
        if *self.fail_commits.lock() {
            return Err(ResourceError::message(format!("{}: commit failed", self.name)));
        }
        *self.committed.write() = std::mem::take(&mut state.data);
        state.savepoints.clear();
        state.completed = true;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, handle: &TransactionHandle) -> ResourceResult<()> {
        let txn = Self::transaction(handle)?;
        let mut state = txn.state.lock();
        Self::ensure_active(&state)?;
        state.data.clear();
        state.savepoints.clear();
        state.completed = true;
        Ok(())
    }

    fn set_rollback_only(&self, handle: &TransactionHandle) {
        if let Ok(txn) = Self::transaction(handle) {
            txn.state.lock().rollback_only = true;
        }
    }

    fn status(&self, handle: &TransactionHandle) -> ResourceStatus {
        let Ok(txn) = Self::transaction(handle) else {
            return ResourceStatus::default();
        };
        let state = txn.state.lock();
        ResourceStatus {
            new_transaction: true,
            completed: state.completed,
            has_savepoint: !state.savepoints.is_empty(),
            rollback_only: state.rollback_only,
        }
    }

    fn create_savepoint(&self, handle: &TransactionHandle) -> ResourceResult<SavepointToken> {
        let txn = Self::transaction(handle)?;
        let mut state = txn.state.lock();
        Self::ensure_active(&state)?;
        state.next_savepoint += 1;
        let id = state.next_savepoint;
        let snapshot = state.data.clone();
        state.savepoints.push((id, snapshot));
        Ok(SavepointToken::new(id))
    }

    fn release_savepoint(
        &self,
        handle: &TransactionHandle,
        savepoint: &SavepointToken,
    ) -> ResourceResult<()> {
        let txn = Self::transaction(handle)?;
        let mut state = txn.state.lock();
        Self::ensure_active(&state)?;
        let pos = Self::savepoint_position(&state, savepoint)?;
        state.savepoints.remove(pos);
        Ok(())
    }

    fn rollback_to_savepoint(
        &self,
        handle: &TransactionHandle,
        savepoint: &SavepointToken,
    ) -> ResourceResult<()> {
        let txn = Self::transaction(handle)?;
        let mut state = txn.state.lock();
        Self::ensure_active(&state)?;
        let pos = Self::savepoint_position(&state, savepoint)?;
        state.savepoints.truncate(pos + 1);
        state.data = state.savepoints[pos].1.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_publishes_writes() {
        let store = InMemoryResource::new("kv");
        let handle = store.begin(&TransactionDefinition::default()).unwrap();
        store.put(&handle, "a", "1").unwrap();
        assert_eq!(store.committed("a"), None);

        store.commit(&handle).unwrap();
        assert_eq!(store.committed("a").as_deref(), Some("1"));
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = InMemoryResource::new("kv");
        let handle = store.begin(&TransactionDefinition::default()).unwrap();
        store.put(&handle, "a", "1").unwrap();
        store.rollback(&handle).unwrap();
        assert_eq!(store.committed_len(), 0);
        assert!(store.put(&handle, "b", "2").is_err());
    }

    #[test]
    fn savepoint_restores_working_copy() {
        let store = InMemoryResource::new("kv");
        let handle = store.begin(&TransactionDefinition::default()).unwrap();
        store.put(&handle, "a", "1").unwrap();
        let sp = store.create_savepoint(&handle).unwrap();
        store.put(&handle, "a", "2").unwrap();
        store.put(&handle, "b", "3").unwrap();

        store.rollback_to_savepoint(&handle, &sp).unwrap();
        assert_eq!(store.get(&handle, "a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get(&handle, "b").unwrap(), None);
        assert!(store.status(&handle).has_savepoint);
    }

    #[test]
    fn rollback_only_blocks_commit() {
        let store = InMemoryResource::new("kv");
        let handle = store.begin(&TransactionDefinition::default()).unwrap();
        store.set_rollback_only(&handle);
        assert!(store.commit(&handle).is_err());
        store.rollback(&handle).unwrap();
    }
}
