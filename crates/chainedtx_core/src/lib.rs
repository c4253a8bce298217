//! # chainedtx core
//!
//! Coordinates one logical transaction across several independently
//! transactional resources, such as separate databases.
//!
//! This crate provides:
//! - The [`ResourceTransactionManager`] contract each resource implements
//! - [`ChainCoordinator`], which begins resources in order and commits or
//!   rolls them back in reverse order
//! - [`CompositeTransactionStatus`], the unit of work handed to callers
//! - [`SynchronizationRegistry`] implementations (thread-local and
//!   session-scoped)
//!
//! ## Guarantees
//!
//! There is no prepare phase and no recovery log. The coordinator narrows the
//! window for partial failure by committing the most fragile resource (the
//! last registered) first, and classifies every commit failure:
//!
//! - [`HeuristicState::RolledBack`] - the last resource failed, nothing else
//!   had committed
//! - [`HeuristicState::Mixed`] - some resources committed, others rolled back
//!
//! Failed steps are reported, never retried.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chainedtx_core::{ChainCoordinator, TransactionDefinition};
//!
//! let chain = ChainCoordinator::new([orders_db, billing_db])?;
//! let status = chain.begin(&TransactionDefinition::default())?;
//! // ... work against both resources ...
//! chain.commit(status)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod coordinator;
mod definition;
mod error;
mod resource;
mod status;
mod sync;
mod template;
mod types;

pub use coordinator::{ChainCoordinator, ChainCoordinatorBuilder};
pub use definition::{Isolation, Propagation, TransactionDefinition};
pub use error::{BoxError, ChainError, ChainResult, HeuristicState, ResourceError, ResourceResult};
pub use resource::{
    same_manager, ManagerRef, ResourceStatus, ResourceTransactionManager, SavepointToken,
    TransactionHandle,
};
pub use status::{CompositeSavepoint, CompositeTransactionStatus};
pub use sync::{SessionRegistry, SynchronizationRegistry, ThreadLocalRegistry};
pub use types::{CoordinatorId, StatusId};
