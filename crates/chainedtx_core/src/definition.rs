//! Transaction definition passed through to every resource.

use std::time::Duration;

/// Isolation level requested from each resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Isolation {
    /// Use the resource's default isolation level.
    #[default]
    Default,
    /// Dirty reads are allowed.
    ReadUncommitted,
    /// Only committed data is visible.
    ReadCommitted,
    /// Repeated reads within the transaction see the same data.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

/// Propagation behavior requested from each resource.
///
/// Interpreted by the resources themselves; the coordinator only forwards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join an existing transaction or create a new one.
    #[default]
    Required,
    /// Always create a new transaction, suspending any existing one.
    RequiresNew,
    /// Join an existing transaction, otherwise run non-transactionally.
    Supports,
    /// Require an existing transaction.
    Mandatory,
    /// Run non-transactionally, suspending any existing transaction.
    NotSupported,
    /// Fail if a transaction exists.
    Never,
    /// Run in a nested transaction if one exists.
    Nested,
}

/// Definition of the transaction to begin on every resource.
///
/// The same definition is handed unchanged to each resource manager's
/// `begin`. Timeouts are a property of the resources; the coordinator adds
/// no timeout of its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionDefinition {
    /// Optional name, used by resources for diagnostics.
    pub name: Option<String>,

    /// Isolation level.
    pub isolation: Isolation,

    /// Propagation behavior.
    pub propagation: Propagation,

    /// Transaction timeout (`None` = resource default).
    pub timeout: Option<Duration>,

    /// Whether the transaction is read-only.
    pub read_only: bool,
}

impl TransactionDefinition {
    /// Creates a definition with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transaction name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the isolation level.
    #[must_use]
    pub const fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Sets the propagation behavior.
    #[must_use]
    pub const fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets whether the transaction is read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}
