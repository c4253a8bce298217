//! # chainedtx testkit
//!
//! Test utilities for chainedtx.
//!
//! This crate provides:
//! - Scripted resource managers that record calls and fail on request
//! - An in-memory key/value resource with savepoints
//! - Chain fixtures and test log setup
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainedtx_testkit::prelude::*;
//!
//! #[test]
//! fn commit_failure_on_last_is_rolled_back() {
//!     let chain = Chain::new(3);
//!     chain.fail(2, Op::Commit);
//!     let status = chain.begin(&TransactionDefinition::default()).unwrap();
//!     assert!(chain.commit(status).is_err());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod memory;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::memory::*;
    pub use crate::scripted::*;
}

pub use fixtures::*;
pub use generators::*;
pub use memory::*;
pub use scripted::*;
