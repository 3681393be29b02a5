/// A raw mutual exclusion primitive.
///
/// `lock` returns a token that must be handed back to `unlock`. The token
/// carries whatever the algorithm needs to release: nothing for a spin lock,
/// the ticket number for a ticket lock, the caller's queue node for the
/// queue based locks.
///
/// Raw locks do not protect data by themselves. Wrap them in
/// [`Lock`](super::Lock) or [`RwLock`](super::RwLock) to get scoped guards.
///
pub trait RawLock: Default + Send + Sync {
    type Token;

    /// Blocks until the lock is acquired.
    ///
    fn lock(&self) -> Self::Token;

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// `token` must come from a `lock` (or `try_lock`) call on this lock that
    /// has not been released yet.
    ///
    unsafe fn unlock(&self, token: Self::Token);
}

/// A raw lock that can be acquired without blocking.
///
pub trait RawTryLock: RawLock {
    /// Acquires the lock if it is free right now.
    ///
    fn try_lock(&self) -> Option<Self::Token>;
}
