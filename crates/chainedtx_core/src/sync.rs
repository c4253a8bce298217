//! Transaction synchronization registry.
//!
//! The registry is the single source of truth for "is a synchronization
//! context already active". A composite status remembers only whether it was
//! the one that activated it.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag service marking whether transaction synchronization is active.
pub trait SynchronizationRegistry: Send + Sync {
    /// Returns true if synchronization is currently active.
    fn is_active(&self) -> bool;

    /// Activates synchronization.
    fn init(&self);

    /// Deactivates synchronization.
    fn clear(&self);

    /// Activates synchronization if it is not active yet.
    ///
    /// Returns true if this call activated it, making the caller its owner.
    /// Registries reachable from several threads override this with an
    /// atomic check-and-set.
    fn try_activate(&self) -> bool {
        if self.is_active() {
            return false;
        }
        self.init();
        true
    }
}

thread_local! {
    static THREAD_SYNC_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Registry scoped to the calling thread.
///
/// This is the default used by [`crate::ChainCoordinator::new`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLocalRegistry;

impl SynchronizationRegistry for ThreadLocalRegistry {
    fn is_active(&self) -> bool {
        THREAD_SYNC_ACTIVE.with(Cell::get)
    }

    fn init(&self) {
        THREAD_SYNC_ACTIVE.with(|active| active.set(true));
    }

    fn clear(&self) {
        THREAD_SYNC_ACTIVE.with(|active| active.set(false));
    }

    fn try_activate(&self) -> bool {
        !THREAD_SYNC_ACTIVE.with(|active| active.replace(true))
    }
}

/// Registry held explicitly by a session object.
///
/// Use this when synchronization is scoped to a logical request rather than
/// a thread. Independent sessions never see each other's state. When one
/// session is shared by concurrent `begin` calls, exactly one of them becomes
/// the owner.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: AtomicBool,
}

impl SessionRegistry {
    /// Creates an inactive session registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SynchronizationRegistry for SessionRegistry {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn init(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn try_activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
