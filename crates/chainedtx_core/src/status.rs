//! Composite transaction status.

use crate::definition::TransactionDefinition;
use crate::error::{ChainError, ChainResult, ResourceError, ResourceResult};
use crate::resource::{same_manager, ManagerRef, ResourceStatus, SavepointToken, TransactionHandle};
use crate::sync::SynchronizationRegistry;
use crate::types::{CoordinatorId, StatusId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// One resource's entry in a composite status.
struct Registration {
    manager: ManagerRef,
    handle: TransactionHandle,
}

/// Aggregate of one transaction handle per registered resource manager.
///
/// Created by [`crate::ChainCoordinator::begin`] and consumed by
/// [`crate::ChainCoordinator::commit`] or [`crate::ChainCoordinator::rollback`].
/// Savepoint, flush and rollback-only operations fan out to every resource.
///
/// ## Approximate aggregate
///
/// [`is_new_transaction`](Self::is_new_transaction),
/// [`is_completed`](Self::is_completed), [`has_savepoint`](Self::has_savepoint)
/// and [`is_rollback_only`](Self::is_rollback_only) answer from the main
/// (first registered) resource only. If the first resource's transaction is
/// still viable the composite is assumed to be viable. Use
/// [`resource_statuses`](Self::resource_statuses) to compute a true aggregate.
///
/// ## Dropping
///
/// A status dropped without commit or rollback (for example while a panic
/// unwinds through [`crate::ChainCoordinator::execute`]) releases the
/// synchronization it activated and logs a warning. Its resource
/// transactions are left to the resources themselves.
pub struct CompositeTransactionStatus {
    id: StatusId,
    coordinator: CoordinatorId,
    main_manager: ManagerRef,
    /// Registration order = begin order.
    registrations: RwLock<Vec<Registration>>,
    /// Set when this status activated synchronization.
    owned_registry: Option<Arc<dyn SynchronizationRegistry>>,
    new_synchronization: bool,
    finished: bool,
}

impl CompositeTransactionStatus {
    pub(crate) fn new(coordinator: CoordinatorId, main_manager: ManagerRef) -> Self {
        Self {
            id: StatusId::generate(),
            coordinator,
            main_manager,
            registrations: RwLock::new(Vec::new()),
            owned_registry: None,
            new_synchronization: false,
            finished: false,
        }
    }

    /// Returns the status ID.
    #[must_use]
    pub fn id(&self) -> StatusId {
        self.id
    }

    pub(crate) fn coordinator(&self) -> CoordinatorId {
        self.coordinator
    }

    /// Returns true if this status activated the synchronization registry and
    /// is therefore responsible for clearing it.
    #[must_use]
    pub fn is_new_synchronization(&self) -> bool {
        self.new_synchronization
    }

    /// Records that this status activated `registry` and must clear it.
    pub(crate) fn own_synchronization(&mut self, registry: Arc<dyn SynchronizationRegistry>) {
        self.owned_registry = Some(registry);
        self.new_synchronization = true;
    }

    /// Begins a transaction on `manager` and records its handle.
    pub(crate) fn register(
        &self,
        manager: &ManagerRef,
        definition: &TransactionDefinition,
    ) -> ResourceResult<()> {
        let handle = manager.begin(definition)?;
        self.registrations.write().push(Registration {
            manager: Arc::clone(manager),
            handle,
        });
        Ok(())
    }

    /// Returns true if `manager` has a recorded handle.
    pub(crate) fn is_registered(&self, manager: &ManagerRef) -> bool {
        self.registrations
            .read()
            .iter()
            .any(|r| same_manager(&r.manager, manager))
    }

    /// Commits the handle recorded for `manager`.
    pub(crate) fn commit(&self, manager: &ManagerRef) -> ResourceResult<()> {
        self.with_handle(manager, |handle| manager.commit(handle))
    }

    /// Rolls back the handle recorded for `manager`.
    pub(crate) fn rollback(&self, manager: &ManagerRef) -> ResourceResult<()> {
        self.with_handle(manager, |handle| manager.rollback(handle))
    }

    /// Marks the status completed and clears synchronization it owns.
    pub(crate) fn finish(&mut self) {
        self.release_synchronization();
        self.finished = true;
    }

    fn release_synchronization(&mut self) {
        if let Some(registry) = self.owned_registry.take() {
            registry.clear();
        }
    }

    /// Runs `f` with the handle recorded for `manager`.
    ///
    /// This is how work inside the transaction reaches one resource.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotActive`] if `manager` is not part of this
    /// transaction, otherwise whatever `f` returns.
    pub fn with_handle<T>(
        &self,
        manager: &ManagerRef,
        f: impl FnOnce(&TransactionHandle) -> ResourceResult<T>,
    ) -> ResourceResult<T> {
        let registrations = self.registrations.read();
        let registration = registrations
            .iter()
            .find(|r| same_manager(&r.manager, manager))
            .ok_or(ResourceError::NotActive)?;
        f(&registration.handle)
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns the registered resource names in registration order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<String> {
        self.registrations
            .read()
            .iter()
            .map(|r| r.manager.name().to_string())
            .collect()
    }

    /// Returns every resource's status in registration order.
    #[must_use]
    pub fn resource_statuses(&self) -> Vec<ResourceStatus> {
        self.registrations
            .read()
            .iter()
            .map(|r| r.manager.status(&r.handle))
            .collect()
    }

    /// Marks every resource's transaction rollback-only.
    pub fn set_rollback_only(&self) {
        for r in self.registrations.read().iter() {
            r.manager.set_rollback_only(&r.handle);
        }
    }

    /// Flushes every resource.
    ///
    /// # Errors
    ///
    /// Returns the first flush failure. Remaining resources are not flushed.
    pub fn flush(&self) -> ChainResult<()> {
        for r in self.registrations.read().iter() {
            r.manager.flush(&r.handle)?;
        }
        Ok(())
    }

    /// Creates a savepoint on every resource, in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first failure immediately. Savepoints already created on
    /// earlier resources are not released; callers needing all-or-nothing
    /// savepoints must handle that themselves.
    pub fn create_savepoint(&self) -> ChainResult<CompositeSavepoint> {
        let registrations = self.registrations.read();
        let mut entries = Vec::with_capacity(registrations.len());
        for r in registrations.iter() {
            let token = r.manager.create_savepoint(&r.handle)?;
            entries.push(SavepointEntry {
                manager: Arc::clone(&r.manager),
                token,
            });
        }
        Ok(CompositeSavepoint {
            status: self.id,
            entries,
        })
    }

    /// Rolls every resource back to the given savepoint.
    ///
    /// The savepoint stays valid and can be rolled back to again or released.
    ///
    /// # Errors
    ///
    /// Returns an error if the savepoint belongs to another status, or the
    /// first per-resource failure.
    pub fn rollback_to_savepoint(&self, savepoint: &CompositeSavepoint) -> ChainResult<()> {
        self.check_savepoint(savepoint)?;
        for entry in &savepoint.entries {
            self.with_handle(&entry.manager, |handle| {
                entry.manager.rollback_to_savepoint(handle, &entry.token)
            })?;
        }
        Ok(())
    }

    /// Releases the given savepoint on every resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the savepoint belongs to another status, or the
    /// first per-resource failure.
    pub fn release_savepoint(&self, savepoint: CompositeSavepoint) -> ChainResult<()> {
        self.check_savepoint(&savepoint)?;
        for entry in &savepoint.entries {
            self.with_handle(&entry.manager, |handle| {
                entry.manager.release_savepoint(handle, &entry.token)
            })?;
        }
        Ok(())
    }

    fn check_savepoint(&self, savepoint: &CompositeSavepoint) -> ChainResult<()> {
        if savepoint.status != self.id {
            return Err(ChainError::invalid_operation(format!(
                "savepoint belongs to {}, not {}",
                savepoint.status, self.id
            )));
        }
        Ok(())
    }

    /// Approximate aggregate: whether the main resource began a new transaction.
    #[must_use]
    pub fn is_new_transaction(&self) -> bool {
        self.main_status().new_transaction
    }

    /// Approximate aggregate: whether the main resource's transaction completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.main_status().completed
    }

    /// Approximate aggregate: whether the main resource holds a savepoint.
    #[must_use]
    pub fn has_savepoint(&self) -> bool {
        self.main_status().has_savepoint
    }

    /// Approximate aggregate: whether the main resource is rollback-only.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.main_status().rollback_only
    }

    fn main_status(&self) -> ResourceStatus {
        self.with_handle(&self.main_manager, |handle| {
            Ok(self.main_manager.status(handle))
        })
        .unwrap_or_default()
    }
}

impl Drop for CompositeTransactionStatus {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.release_synchronization();
        if !self.registrations.get_mut().is_empty() {
            tracing::warn!(
                status = %self.id,
                resources = self.registrations.get_mut().len(),
                "composite transaction dropped without commit or rollback"
            );
        }
    }
}

impl fmt::Debug for CompositeTransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTransactionStatus")
            .field("id", &self.id)
            .field("main_manager", &self.main_manager.name())
            .field("resources", &self.resource_names())
            .field("new_synchronization", &self.new_synchronization)
            .finish_non_exhaustive()
    }
}

struct SavepointEntry {
    manager: ManagerRef,
    token: SavepointToken,
}

/// One savepoint per resource, created together by
/// [`CompositeTransactionStatus::create_savepoint`].
///
/// Releasing consumes the savepoint, so a released savepoint cannot be
/// rolled back to.
pub struct CompositeSavepoint {
    status: StatusId,
    entries: Vec<SavepointEntry>,
}

impl CompositeSavepoint {
    /// Returns the number of per-resource savepoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no resource is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CompositeSavepoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSavepoint")
            .field("status", &self.status)
            .field(
                "resources",
                &self.entries.iter().map(|e| e.manager.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
