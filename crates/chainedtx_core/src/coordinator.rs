//! Chain coordinator.

use crate::definition::TransactionDefinition;
use crate::error::{ChainError, ChainResult, HeuristicState, ResourceError};
use crate::resource::{same_manager, ManagerRef};
use crate::status::CompositeTransactionStatus;
use crate::sync::{SynchronizationRegistry, ThreadLocalRegistry};
use crate::types::CoordinatorId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, error, warn};

/// Coordinates one logical transaction across several independent resources.
///
/// Resources begin in registration order and commit or roll back in
/// **reverse** order. This is not a two-phase commit: a commit failure can
/// leave resources in different states, which is reported precisely through
/// [`ChainError::HeuristicCompletion`].
///
/// ## Ordering contract
///
/// Register the resource most likely to fail **last**. It then commits first,
/// so if it fails nothing else has committed yet and the whole chain rolls
/// back cleanly ([`HeuristicState::RolledBack`]). A commit failure on any
/// other resource leaves a [`HeuristicState::Mixed`] outcome. This ordering
/// is a usage convention and cannot be checked by the coordinator.
///
/// ## Concurrency
///
/// The coordinator holds only its immutable resource list and a shared
/// synchronization registry. One instance may begin any number of
/// independent composite transactions from different threads.
pub struct ChainCoordinator {
    id: CoordinatorId,
    managers: Vec<ManagerRef>,
    registry: Arc<dyn SynchronizationRegistry>,
}

impl ChainCoordinator {
    /// Creates a coordinator using the thread-local synchronization registry.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidConfiguration`] if `managers` is empty or
    /// contains the same manager twice.
    pub fn new(managers: impl IntoIterator<Item = ManagerRef>) -> ChainResult<Self> {
        Self::builder().managers(managers).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ChainCoordinatorBuilder {
        ChainCoordinatorBuilder::default()
    }

    /// Returns the coordinator ID.
    #[must_use]
    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    /// Returns the resource managers in registration order.
    #[must_use]
    pub fn managers(&self) -> &[ManagerRef] {
        &self.managers
    }

    /// Returns the number of resource managers.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.managers.len()
    }

    /// Returns the last registered manager, the one expected to fail first.
    #[must_use]
    pub fn last_manager(&self) -> &ManagerRef {
        // Non-empty by construction.
        &self.managers[self.managers.len() - 1]
    }

    /// Begins a transaction on every resource, in registration order.
    ///
    /// If any resource fails to begin, every resource already begun is rolled
    /// back (failures there are logged, not returned) and synchronization is
    /// cleared if this call activated it.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::CannotCreateTransaction`] wrapping the begin
    /// failure.
    pub fn begin(
        &self,
        definition: &TransactionDefinition,
    ) -> ChainResult<CompositeTransactionStatus> {
        let mut status = CompositeTransactionStatus::new(self.id, Arc::clone(&self.managers[0]));
        let span = debug_span!("chain_begin", status = %status.id());
        let _enter = span.enter();

        if self.registry.try_activate() {
            status.own_synchronization(Arc::clone(&self.registry));
        }

        for manager in &self.managers {
            if let Err(err) = status.register(manager, definition) {
                debug!(resource = manager.name(), error = %err, "begin failed");
                self.rollback_begun(&status);
                status.finish();
                return Err(ChainError::CannotCreateTransaction { source: err });
            }
            debug!(resource = manager.name(), "resource transaction begun");
        }

        Ok(status)
    }

    /// Commits every resource in reverse registration order.
    ///
    /// After the first commit failure, the remaining resources are rolled
    /// back instead of committed. Failures during that rollback are logged
    /// and never replace the commit failure.
    ///
    /// # Errors
    ///
    /// - [`ChainError::HeuristicCompletion`] with [`HeuristicState::RolledBack`]
    ///   if the last registered resource failed to commit
    /// - [`ChainError::HeuristicCompletion`] with [`HeuristicState::Mixed`] if
    ///   any other resource failed to commit
    /// - [`ChainError::ForeignStatus`] if `status` was created by another
    ///   coordinator, handing it back untouched
    pub fn commit(&self, status: CompositeTransactionStatus) -> ChainResult<()> {
        let mut status = self.ensure_owned(status)?;
        let span = debug_span!("chain_commit", status = %status.id());
        let _enter = span.enter();

        let mut committing = true;
        let mut failure: Option<(&ManagerRef, ResourceError)> = None;

        for manager in self.managers.iter().rev() {
            if committing {
                match status.commit(manager) {
                    Ok(()) => debug!(resource = manager.name(), "resource committed"),
                    Err(err) => {
                        committing = false;
                        failure = Some((manager, err));
                    }
                }
            } else {
                match status.rollback(manager) {
                    Ok(()) => debug!(
                        resource = manager.name(),
                        "resource rolled back after failed commit"
                    ),
                    Err(err) => warn!(
                        resource = manager.name(),
                        error = %err,
                        "rollback after failed commit failed"
                    ),
                }
            }
        }

        status.finish();

        let Some((manager, source)) = failure else {
            return Ok(());
        };

        let state = if same_manager(manager, self.last_manager()) {
            HeuristicState::RolledBack
        } else {
            HeuristicState::Mixed
        };
        if state == HeuristicState::Mixed {
            error!(
                resource = manager.name(),
                error = %source,
                "commit failed after other resources committed; manual reconciliation required"
            );
        }

        Err(ChainError::HeuristicCompletion {
            state,
            resource: manager.name().to_string(),
            source,
        })
    }

    /// Rolls back every resource in reverse registration order.
    ///
    /// Every resource is attempted regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::UnexpectedRollback`] naming the first resource
    /// whose rollback failed. Later failures are logged only.
    /// [`ChainError::ForeignStatus`] hands back a status created by another
    /// coordinator untouched.
    pub fn rollback(&self, status: CompositeTransactionStatus) -> ChainResult<()> {
        let mut status = self.ensure_owned(status)?;
        let span = debug_span!("chain_rollback", status = %status.id());
        let _enter = span.enter();

        let mut first_failure: Option<(&ManagerRef, ResourceError)> = None;

        for manager in self.managers.iter().rev() {
            match status.rollback(manager) {
                Ok(()) => debug!(resource = manager.name(), "resource rolled back"),
                Err(err) if first_failure.is_none() => first_failure = Some((manager, err)),
                Err(err) => warn!(resource = manager.name(), error = %err, "rollback failed"),
            }
        }

        status.finish();

        match first_failure {
            None => Ok(()),
            Some((manager, source)) => Err(ChainError::UnexpectedRollback {
                resource: manager.name().to_string(),
                source,
            }),
        }
    }

    /// Rolls back whatever was begun before a begin failure.
    fn rollback_begun(&self, status: &CompositeTransactionStatus) {
        for manager in &self.managers {
            if !status.is_registered(manager) {
                continue;
            }
            if let Err(err) = status.rollback(manager) {
                warn!(
                    resource = manager.name(),
                    error = %err,
                    "rollback after failed begin failed"
                );
            }
        }
    }

    fn ensure_owned(
        &self,
        status: CompositeTransactionStatus,
    ) -> ChainResult<CompositeTransactionStatus> {
        if status.coordinator() != self.id {
            debug!(status = %status.id(), coordinator = %self.id, "rejected foreign status");
            return Err(ChainError::ForeignStatus {
                status: Box::new(status),
            });
        }
        Ok(status)
    }
}

impl fmt::Debug for ChainCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainCoordinator")
            .field("id", &self.id)
            .field("managers", &self.managers.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ChainCoordinator`].
#[derive(Default)]
pub struct ChainCoordinatorBuilder {
    managers: Vec<ManagerRef>,
    registry: Option<Arc<dyn SynchronizationRegistry>>,
}

impl ChainCoordinatorBuilder {
    /// Appends a resource manager. Later managers commit earlier.
    #[must_use]
    pub fn manager(mut self, manager: ManagerRef) -> Self {
        self.managers.push(manager);
        self
    }

    /// Appends several resource managers in order.
    #[must_use]
    pub fn managers(mut self, managers: impl IntoIterator<Item = ManagerRef>) -> Self {
        self.managers.extend(managers);
        self
    }

    /// Sets the synchronization registry (default: [`ThreadLocalRegistry`]).
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn SynchronizationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidConfiguration`] if no manager was given
    /// or a manager instance was given twice.
    pub fn build(self) -> ChainResult<ChainCoordinator> {
        if self.managers.is_empty() {
            return Err(ChainError::invalid_configuration(
                "at least one resource transaction manager must be given",
            ));
        }
        for (i, manager) in self.managers.iter().enumerate() {
            if self.managers[..i].iter().any(|m| same_manager(m, manager)) {
                return Err(ChainError::invalid_configuration(format!(
                    "resource transaction manager '{}' registered twice",
                    manager.name()
                )));
            }
        }

        Ok(ChainCoordinator {
            id: CoordinatorId::generate(),
            managers: self.managers,
            registry: self.registry.unwrap_or_else(|| Arc::new(ThreadLocalRegistry)),
        })
    }
}
