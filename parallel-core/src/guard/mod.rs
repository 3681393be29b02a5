//! Memory reclamation for the lock-free collections.
//!
//! `Stack`, `Queue` and `ArrayList` unlink nodes (or descriptors) that a
//! racing thread may still be dereferencing. They never free such memory
//! directly. Instead every operation pins a read guard for its duration and
//! hands unlinked memory to the collection's stored guard, which frees it
//! once no pinned reader can observe it.
//!
//! ```text
//! Stack<T, G: Guard>
//!     │
//!     ├── Stack<T, EpochGuard>      (parallel-crossbeam, production)
//!     └── Stack<T, DeferredGuard>   (frees on collection drop, tests)
//! ```
//!
//! `SortedDictionary` does not use a guard: its nodes live in an index arena.
//! Removed nodes go back to the arena's free list and are reused, but their
//! memory is only returned when the dictionary itself is dropped.

mod deferred_guard;

pub use deferred_guard::DeferredGuard;

/// Reclamation strategy a collection is parameterized with.
///
/// # Safety Contract
///
/// Implementations must ensure that memory passed to `defer_destroy` stays
/// valid for every thread that pinned a `ReadGuard` before the call, and is
/// deallocated exactly once.
///
pub trait Guard: Sized + Default + Send + Sync {
    /// Protection held for the duration of an operation or an iteration.
    ///
    /// Epoch based guards hold a pinned epoch here; guards that never free
    /// early use `()`.
    ///
    type ReadGuard: Sized;

    /// Pin the current thread.
    ///
    fn pin() -> Self::ReadGuard;

    /// Schedule unlinked memory for destruction.
    ///
    /// # Safety
    ///
    /// - `node` must have been allocated by the collection owning this guard
    /// - `node` must no longer be reachable from the collection's roots
    /// - `node` must not be scheduled twice
    /// - `dealloc` must be the matching deallocation function
    ///
    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N));
}

/// Frees a pointer produced by `Box::into_raw`.
///
/// # Safety
///
/// `ptr` must come from `Box::into_raw` and must not be used afterwards.
///
pub unsafe fn drop_boxed<N>(ptr: *mut N) {
    unsafe { drop(Box::from_raw(ptr)) };
}
