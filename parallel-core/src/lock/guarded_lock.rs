use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use super::raw_lock::{RawLock, RawTryLock};

/// Mutual exclusion around a value, built on any [`RawLock`].
///
/// ```
/// use parallel_core::lock::{Lock, TicketLock};
///
/// let counter: Lock<TicketLock, u64> = Lock::new(0);
/// *counter.lock() += 1;
/// assert_eq!(*counter.lock(), 1);
/// ```
///
pub struct Lock<L: RawLock, T> {
    raw: L,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `raw`.
unsafe impl<L: RawLock, T: Send> Send for Lock<L, T> {}
unsafe impl<L: RawLock, T: Send> Sync for Lock<L, T> {}

impl<L: RawLock, T> Lock<L, T> {
    pub fn new(data: T) -> Self {
        Lock {
            raw: L::default(),
            data: UnsafeCell::new(data),
        }
    }

    /// Blocks until the lock is held and returns the guard.
    ///
    pub fn lock(&self) -> LockGuard<'_, L, T> {
        let token = self.raw.lock();
        LockGuard::new(self, token)
    }

    /// Exclusive borrow means no guard can be alive.
    ///
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<L: RawTryLock, T> Lock<L, T> {
    /// Returns `None` right away if another guard is alive.
    ///
    pub fn try_lock(&self) -> Option<LockGuard<'_, L, T>> {
        self.raw
            .try_lock()
            .map(|token| LockGuard::new(self, token))
    }
}

impl<L: RawLock, T: Default> Default for Lock<L, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<L: RawLock, T> fmt::Debug for Lock<L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock").finish_non_exhaustive()
    }
}

/// Scoped access to the data of a [`Lock`]. Dropping the guard releases the
/// lock.
///
/// The guard stays on the thread that acquired it, since some raw locks
/// expect their token back on the same thread.
///
#[must_use = "if unused the Lock will immediately unlock"]
pub struct LockGuard<'a, L: RawLock, T> {
    lock: &'a Lock<L, T>,
    token: ManuallyDrop<L::Token>,
    _not_send: PhantomData<*const ()>,
}

// Safety: a shared guard only hands out `&T`.
unsafe impl<L: RawLock, T: Sync> Sync for LockGuard<'_, L, T> {}

impl<'a, L: RawLock, T> LockGuard<'a, L, T> {
    fn new(lock: &'a Lock<L, T>, token: L::Token) -> Self {
        LockGuard {
            lock,
            token: ManuallyDrop::new(token),
            _not_send: PhantomData,
        }
    }

    /// Releases the lock now. Same as dropping the guard.
    ///
    pub fn unlock(self) {
        drop(self);
    }
}

impl<L: RawLock, T> Deref for LockGuard<'_, L, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<L: RawLock, T> DerefMut for LockGuard<'_, L, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<L: RawLock, T> Drop for LockGuard<'_, L, T> {
    fn drop(&mut self) {
        // Safety: the token came from `raw` and is taken exactly once.
        //
        unsafe {
            let token = ManuallyDrop::take(&mut self.token);
            self.lock.raw.unlock(token);
        }
    }
}
