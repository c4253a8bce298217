//! Callback-style execution of a chained transaction.

use crate::coordinator::ChainCoordinator;
use crate::definition::TransactionDefinition;
use crate::error::{ChainError, ChainResult};
use crate::status::CompositeTransactionStatus;
use tracing::warn;

impl ChainCoordinator {
    /// Executes `f` inside a chained transaction.
    ///
    /// Begins on every resource, runs the callback, then commits if it
    /// returned `Ok`. If it returned `Err`, the status is marked
    /// rollback-only and rolled back, and the callback's error is returned.
    ///
    /// # Errors
    ///
    /// - Begin and commit failures as returned by [`ChainCoordinator::begin`]
    ///   and [`ChainCoordinator::commit`]
    /// - The callback's own error
    /// - [`ChainError::RollbackAfterCallback`] if the callback failed and the
    ///   rollback that followed failed too
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let total = chain.execute(&TransactionDefinition::default(), |status| {
    ///     orders.insert(&order)?;
    ///     billing.charge(&order)?;
    ///     Ok(order.total)
    /// })?;
    /// ```
    pub fn execute<F, T>(&self, definition: &TransactionDefinition, f: F) -> ChainResult<T>
    where
        F: FnOnce(&CompositeTransactionStatus) -> ChainResult<T>,
    {
        let status = self.begin(definition)?;
        match f(&status) {
            Ok(value) => {
                self.commit(status)?;
                Ok(value)
            }
            Err(err) => {
                status.set_rollback_only();
                match self.rollback(status) {
                    Ok(()) => Err(err),
                    Err(rollback_err) => {
                        warn!(error = %err, "callback failed and rollback failed");
                        Err(ChainError::RollbackAfterCallback {
                            callback: Box::new(err),
                            source: Box::new(rollback_err),
                        })
                    }
                }
            }
        }
    }
}
