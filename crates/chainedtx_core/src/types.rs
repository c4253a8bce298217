//! Core identifier types.

use std::fmt;
use uuid::Uuid;

/// Unique identifier for a composite transaction status.
///
/// Used to correlate log records emitted while a chained transaction is
/// begun, committed or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusId(Uuid);

impl StatusId {
    /// Generates a fresh random ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{}", self.0.simple())
    }
}

/// Identifier of the coordinator that created a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinatorId(Uuid);

impl CoordinatorId {
    /// Generates a fresh random ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain:{}", self.0.simple())
    }
}
