//! Error types for chained transactions.

use crate::status::CompositeTransactionStatus;
use std::fmt;
use std::io;
use thiserror::Error;

/// Boxed error used for type-erased causes.
///
/// Resource implementations wrap their driver errors in this through
/// [`ResourceError::other`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for resource manager operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type for coordinator operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors reported by an individual resource transaction manager.
///
/// This is the error type implementors of
/// [`ResourceTransactionManager`](crate::ResourceTransactionManager) return.
/// [`Io`](Self::Io) and [`Other`](Self::Other) carry the underlying driver
/// error so it stays reachable through `source()` on the coordinator error.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Free-form failure reported by the resource.
    #[error("{0}")]
    Message(String),

    /// The transaction handle is no longer active.
    #[error("transaction is not active")]
    NotActive,

    /// The resource does not support savepoints.
    #[error("savepoints are not supported by this resource")]
    SavepointUnsupported,

    /// The savepoint token is unknown or was already released.
    #[error("unknown or released savepoint")]
    UnknownSavepoint,

    /// I/O error from a file or socket backed resource.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other error raised by the resource, such as a database driver
    /// error.
    #[error("{0}")]
    Other(#[source] BoxError),
}

impl ResourceError {
    /// Creates a free-form resource error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wraps an arbitrary error.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }
}

/// Outcome recorded when a commit fails after the chain started committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeuristicState {
    /// The resource that failed was the last one begun, so nothing else had
    /// committed before it failed.
    RolledBack,
    /// Some resources committed and others were rolled back. Manual
    /// reconciliation is required.
    Mixed,
}

impl fmt::Display for HeuristicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RolledBack => f.write_str("rolled back"),
            Self::Mixed => f.write_str("mixed"),
        }
    }
}

/// Errors raised by the chain coordinator.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A resource failed to begin. Resources begun before it were rolled back.
    #[error("could not create chained transaction: {source}")]
    CannotCreateTransaction {
        /// The begin failure.
        #[source]
        source: ResourceError,
    },

    /// A resource failed to commit during the reverse commit pass.
    #[error("heuristic completion ({state}) at resource '{resource}': {source}")]
    HeuristicCompletion {
        /// Classification of the partial outcome.
        state: HeuristicState,
        /// Name of the resource whose commit failed.
        resource: String,
        /// The commit failure.
        #[source]
        source: ResourceError,
    },

    /// A resource failed to roll back during the rollback sweep.
    #[error("rollback failed, originated at resource '{resource}': {source}")]
    UnexpectedRollback {
        /// Name of the first resource whose rollback failed.
        resource: String,
        /// The rollback failure.
        #[source]
        source: ResourceError,
    },

    /// The coordinator was configured incorrectly.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The status was created by another coordinator.
    ///
    /// Nothing was committed or rolled back. The status is handed back
    /// untouched; recover it with [`ChainError::into_foreign_status`] and
    /// complete it on the coordinator that created it.
    #[error("status {} was not created by this coordinator", .status.id())]
    ForeignStatus {
        /// The rejected status.
        status: Box<CompositeTransactionStatus>,
    },

    /// A fan-out operation (flush, savepoint) failed on one resource.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Work inside a transaction callback asked for the transaction to abort.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// A callback failed and the rollback that followed failed too.
    #[error("rollback after callback failure also failed: {source}")]
    RollbackAfterCallback {
        /// The error returned by the callback.
        callback: Box<ChainError>,
        /// The rollback failure.
        #[source]
        source: Box<ChainError>,
    },
}

impl ChainError {
    /// Creates an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns the status carried by [`ChainError::ForeignStatus`].
    #[must_use]
    pub fn into_foreign_status(self) -> Option<CompositeTransactionStatus> {
        match self {
            Self::ForeignStatus { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns the heuristic state if this is a heuristic completion.
    #[must_use]
    pub fn heuristic_state(&self) -> Option<HeuristicState> {
        match self {
            Self::HeuristicCompletion { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Returns true if this is a heuristic completion.
    #[must_use]
    pub fn is_heuristic(&self) -> bool {
        self.heuristic_state().is_some()
    }

    /// Returns the name of the resource the failure originated at, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::HeuristicCompletion { resource, .. }
            | Self::UnexpectedRollback { resource, .. } => Some(resource),
            _ => None,
        }
    }
}
