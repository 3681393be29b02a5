//! Epoch-based guard backed by crossbeam-epoch.
//!
//! # Design
//!
//! `EpochGuard` is a zero-sized type; all state lives in crossbeam's global
//! collector. A collection operation pins the calling thread for its
//! duration, and unlinked nodes are handed to the collector, which runs their
//! destructor once every thread pinned at that time has unpinned.
//!
//! ```text
//! Stack<T, EpochGuard>::pop
//!     │
//!     ├── epoch::pin()                  (ReadGuard, held for the call)
//!     ├── CAS head past the node
//!     └── defer_destroy(node)           (runs after all current pins drop)
//! ```
//!
//! Iterators hold their pin for their whole lifetime, so a long iteration
//! delays reclamation of everything retired meanwhile.
//!

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};
use parallel_core::guard::Guard;

/// Epoch-based memory reclamation for the `parallel-core` collections.
///
/// ```
/// use parallel_core::Stack;
/// use parallel_crossbeam::EpochGuard;
///
/// let stack: Stack<i32, EpochGuard> = Stack::new();
/// stack.push(42);
/// assert_eq!(stack.pop(), Some(42));
/// ```
///
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochGuard;

impl EpochGuard {
    pub fn new() -> Self {
        EpochGuard
    }

    /// Asks the global collector to run whatever destructors are already
    /// safe to run. Mostly useful in tests and at quiescent points.
    ///
    pub fn flush() {
        epoch::pin().flush();
    }
}

impl Guard for EpochGuard {
    type ReadGuard = CrossbeamGuard;

    fn pin() -> Self::ReadGuard {
        epoch::pin()
    }

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        // Re-pinning is cheap when the caller is already pinned.
        //
        let guard = epoch::pin();
        unsafe {
            guard.defer_unchecked(move || dealloc(node));
        }
    }
}
