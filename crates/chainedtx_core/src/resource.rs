//! Resource transaction manager contract.

use crate::definition::TransactionDefinition;
use crate::error::{ResourceError, ResourceResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque per-resource transaction value.
///
/// Returned by [`ResourceTransactionManager::begin`] and handed back to the
/// same manager for every later call. The coordinator never inspects it;
/// managers recover their own type with [`TransactionHandle::downcast_ref`].
pub struct TransactionHandle(Box<dyn Any + Send + Sync>);

impl TransactionHandle {
    /// Wraps a manager-specific transaction value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Returns the wrapped value if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if the wrapped value is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle").finish_non_exhaustive()
    }
}

/// Opaque per-resource savepoint value.
pub struct SavepointToken(Box<dyn Any + Send + Sync>);

impl SavepointToken {
    /// Wraps a manager-specific savepoint value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Returns the wrapped value if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if the wrapped value is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for SavepointToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavepointToken").finish_non_exhaustive()
    }
}

/// Snapshot of the read-only queries on one resource's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceStatus {
    /// The resource started a new transaction (rather than joining one).
    pub new_transaction: bool,
    /// The transaction has been committed or rolled back.
    pub completed: bool,
    /// The transaction currently holds a savepoint.
    pub has_savepoint: bool,
    /// The transaction has been marked rollback-only.
    pub rollback_only: bool,
}

/// One independently transactional resource, such as a single database.
///
/// Implementations own their transaction state; the coordinator only carries
/// the [`TransactionHandle`] between calls.
///
/// # Invariants
///
/// - `commit` and `rollback` are called at most once per handle
/// - A handle is only ever passed back to the manager that created it
/// - Implementations must be `Send + Sync` so one coordinator can serve
///   concurrent callers
pub trait ResourceTransactionManager: Send + Sync {
    /// Returns a human readable name used in errors and logs.
    fn name(&self) -> &str;

    /// Begins a transaction on this resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot start a transaction.
    fn begin(&self, definition: &TransactionDefinition) -> ResourceResult<TransactionHandle>;

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails. The outcome on the resource is
    /// then unknown to the coordinator.
    fn commit(&self, handle: &TransactionHandle) -> ResourceResult<()>;

    /// Rolls back the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(&self, handle: &TransactionHandle) -> ResourceResult<()>;

    /// Marks the transaction so that it can only be rolled back.
    fn set_rollback_only(&self, handle: &TransactionHandle);

    /// Returns the current status of the transaction.
    fn status(&self, handle: &TransactionHandle) -> ResourceStatus;

    /// Flushes pending work to the underlying resource, if applicable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self, _handle: &TransactionHandle) -> ResourceResult<()> {
        Ok(())
    }

    /// Creates a savepoint inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::SavepointUnsupported`] unless overridden.
    fn create_savepoint(&self, _handle: &TransactionHandle) -> ResourceResult<SavepointToken> {
        Err(ResourceError::SavepointUnsupported)
    }

    /// Releases a savepoint. The token must not be used afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::SavepointUnsupported`] unless overridden.
    fn release_savepoint(
        &self,
        _handle: &TransactionHandle,
        _savepoint: &SavepointToken,
    ) -> ResourceResult<()> {
        Err(ResourceError::SavepointUnsupported)
    }

    /// Rolls the transaction back to a savepoint without ending it.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::SavepointUnsupported`] unless overridden.
    fn rollback_to_savepoint(
        &self,
        _handle: &TransactionHandle,
        _savepoint: &SavepointToken,
    ) -> ResourceResult<()> {
        Err(ResourceError::SavepointUnsupported)
    }
}

/// Shared reference to a resource manager.
pub type ManagerRef = Arc<dyn ResourceTransactionManager>;

/// Returns true if both references point at the same manager instance.
#[must_use]
pub fn same_manager(a: &ManagerRef, b: &ManagerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl ResourceTransactionManager for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn begin(&self, _definition: &TransactionDefinition) -> ResourceResult<TransactionHandle> {
            Ok(TransactionHandle::new(7u32))
        }

        fn commit(&self, _handle: &TransactionHandle) -> ResourceResult<()> {
            Ok(())
        }

        fn rollback(&self, _handle: &TransactionHandle) -> ResourceResult<()> {
            Ok(())
        }

        fn set_rollback_only(&self, _handle: &TransactionHandle) {}

        fn status(&self, _handle: &TransactionHandle) -> ResourceStatus {
            ResourceStatus::default()
        }
    }

    #[test]
    fn handle_downcast() {
        let handle = TransactionHandle::new(42u64);
        assert!(handle.is::<u64>());
        assert_eq!(handle.downcast_ref::<u64>(), Some(&42));
        assert!(handle.downcast_ref::<String>().is_none());
    }

    #[test]
    fn savepoint_downcast() {
        let token = SavepointToken::new("sp1".to_string());
        assert_eq!(token.downcast_ref::<String>().map(String::as_str), Some("sp1"));
        assert!(!token.is::<u64>());
    }

    #[test]
    fn default_savepoint_operations_are_unsupported() {
        let manager = Noop;
        let handle = manager.begin(&TransactionDefinition::default()).unwrap();
        assert!(matches!(
            manager.create_savepoint(&handle),
            Err(ResourceError::SavepointUnsupported)
        ));
        let token = SavepointToken::new(());
        assert!(manager.release_savepoint(&handle, &token).is_err());
        assert!(manager.rollback_to_savepoint(&handle, &token).is_err());
        assert!(manager.flush(&handle).is_ok());
    }

    #[test]
    fn manager_identity() {
        let a: ManagerRef = Arc::new(Noop);
        let b: ManagerRef = Arc::new(Noop);
        let a2 = Arc::clone(&a);
        assert!(same_manager(&a, &a2));
        assert!(!same_manager(&a, &b));
    }
}
