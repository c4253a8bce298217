//! Test fixtures and chain helpers.
//!
//! Provides convenience functions for setting up coordinators over scripted
//! resources and for enabling log output in tests.

use crate::scripted::{CallJournal, Op, ScriptedManager};
use chainedtx_core::{
    ChainCoordinator, ManagerRef, SessionRegistry, SynchronizationRegistry,
};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A coordinator over scripted resources named `r0`, `r1`, ...
pub struct Chain {
    /// The coordinator.
    pub coordinator: ChainCoordinator,
    /// The scripted resources in registration order.
    pub managers: Vec<Arc<ScriptedManager>>,
    /// Journal shared by every resource.
    pub journal: CallJournal,
    /// Session registry used by the coordinator.
    pub registry: Arc<SessionRegistry>,
}

impl Chain {
    /// Creates a chain of `count` scripted resources.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let names: Vec<String> = (0..count).map(resource_name).collect();
        Self::named(&names)
    }

    /// Creates a chain of scripted resources with the given names.
    ///
    /// # Panics
    ///
    /// Panics if `names` is empty.
    #[must_use]
    pub fn named<S: AsRef<str>>(names: &[S]) -> Self {
        let journal = CallJournal::new();
        let managers: Vec<Arc<ScriptedManager>> = names
            .iter()
            .map(|n| Arc::new(ScriptedManager::new(n.as_ref(), journal.clone())))
            .collect();
        let registry = Arc::new(SessionRegistry::new());
        let coordinator = ChainCoordinator::builder()
            .managers(managers.iter().map(|m| Arc::clone(m) as ManagerRef))
            .registry(Arc::clone(&registry) as Arc<dyn SynchronizationRegistry>)
            .build()
            .expect("Failed to build chain");

        Self {
            coordinator,
            managers,
            journal,
            registry,
        }
    }

    /// Returns the resource names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.managers
            .iter()
            .map(|m| chainedtx_core::ResourceTransactionManager::name(m.as_ref()).to_string())
            .collect()
    }

    /// Returns the names in reverse registration order.
    #[must_use]
    pub fn reversed_names(&self) -> Vec<String> {
        let mut names = self.names();
        names.reverse();
        names
    }

    /// Makes resource `index` fail on `op`.
    pub fn fail(&self, index: usize, op: Op) {
        self.managers[index].fail_on(op);
    }

    /// Returns true if the session registry is active.
    #[must_use]
    pub fn synchronization_active(&self) -> bool {
        self.registry.is_active()
    }
}

impl std::ops::Deref for Chain {
    type Target = ChainCoordinator;

    fn deref(&self) -> &Self::Target {
        &self.coordinator
    }
}

/// Name given to the resource at `index` by [`Chain::new`].
#[must_use]
pub fn resource_name(index: usize) -> String {
    format!("r{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainedtx_core::TransactionDefinition;

    #[test]
    fn chain_names_resources() {
        let chain = Chain::new(3);
        assert_eq!(chain.names(), vec!["r0", "r1", "r2"]);
        assert_eq!(chain.reversed_names(), vec!["r2", "r1", "r0"]);
        assert_eq!(chain.resource_count(), 3);
    }

    #[test]
    fn chain_runs_a_transaction() {
        init_tracing();
        let chain = Chain::named(&["orders", "billing"]);
        let status = chain.begin(&TransactionDefinition::default()).unwrap();
        assert!(chain.synchronization_active());
        chain.commit(status).unwrap();
        assert!(!chain.synchronization_active());
        assert_eq!(chain.journal.resources_for(Op::Commit), vec!["billing", "orders"]);
    }
}
