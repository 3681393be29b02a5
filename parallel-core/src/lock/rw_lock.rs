use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use super::guarded_lock::Lock;
use super::raw_lock::RawLock;

/// Reader-writer lock composed from two raw locks of the same kind.
///
/// Readers as a group hold one `global` acquisition: the first reader in takes
/// it, the last reader out releases it. The reader count itself is protected
/// by a [`Lock`]. Writers take `global` directly.
///
/// ```text
///   read()   ─► lock(read_count) ─► 0 → 1 ? lock(global), park token
///   drop     ─► lock(read_count) ─► 1 → 0 ? unlock(global, parked token)
///   write()  ─► lock(global)
/// ```
///
/// Readers are preferred: a writer waits until the reader count drops to
/// zero, which may never happen under a steady stream of readers.
///
pub struct RwLock<L: RawLock, T> {
    read_count: Lock<L, usize>,
    global: L,
    // Written only by the 0 → 1 reader and taken only by the 1 → 0 reader,
    // both while `read_count` is held.
    reader_token: UnsafeCell<Option<L::Token>>,
    data: UnsafeCell<T>,
}

// Safety: the last reader may release a token taken on another thread, so the
// token type must be sendable. Readers share `&T` across threads.
unsafe impl<L: RawLock, T: Send> Send for RwLock<L, T> where L::Token: Send {}
unsafe impl<L: RawLock, T: Send + Sync> Sync for RwLock<L, T> where L::Token: Send {}

impl<L: RawLock, T> RwLock<L, T> {
    pub fn new(data: T) -> Self {
        RwLock {
            read_count: Lock::new(0),
            global: L::default(),
            reader_token: UnsafeCell::new(None),
            data: UnsafeCell::new(data),
        }
    }

    /// Shared access. Blocks while a writer holds the lock.
    ///
    pub fn read(&self) -> ReadGuard<'_, L, T> {
        let mut count = self.read_count.lock();

        if *count == 0 {
            let token = self.global.lock();
            unsafe { *self.reader_token.get() = Some(token) };
        }
        *count += 1;

        ReadGuard { lock: self }
    }

    /// Exclusive access. Blocks while any reader or writer holds the lock.
    ///
    pub fn write(&self) -> WriteGuard<'_, L, T> {
        let token = self.global.lock();

        WriteGuard {
            lock: self,
            token: ManuallyDrop::new(token),
            _not_send: PhantomData,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn release_reader(&self) {
        let mut count = self.read_count.lock();
        *count -= 1;

        if *count == 0 {
            let token = unsafe { (*self.reader_token.get()).take() };
            match token {
                Some(token) => unsafe { self.global.unlock(token) },
                None => panic!("last reader found no parked global token"),
            }
        }
    }
}

impl<L: RawLock, T: Default> Default for RwLock<L, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<L: RawLock, T> fmt::Debug for RwLock<L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock").finish_non_exhaustive()
    }
}

/// Shared access to the data of a [`RwLock`].
///
#[must_use = "if unused the RwLock will immediately release the read"]
pub struct ReadGuard<'a, L: RawLock, T> {
    lock: &'a RwLock<L, T>,
}

impl<L: RawLock, T> ReadGuard<'_, L, T> {
    pub fn unlock(self) {
        drop(self);
    }
}

impl<L: RawLock, T> Deref for ReadGuard<'_, L, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<L: RawLock, T> Drop for ReadGuard<'_, L, T> {
    fn drop(&mut self) {
        self.lock.release_reader();
    }
}

/// Exclusive access to the data of a [`RwLock`].
///
#[must_use = "if unused the RwLock will immediately release the write"]
pub struct WriteGuard<'a, L: RawLock, T> {
    lock: &'a RwLock<L, T>,
    token: ManuallyDrop<L::Token>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<L: RawLock, T: Sync> Sync for WriteGuard<'_, L, T> {}

impl<L: RawLock, T> WriteGuard<'_, L, T> {
    pub fn unlock(self) {
        drop(self);
    }
}

impl<L: RawLock, T> Deref for WriteGuard<'_, L, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<L: RawLock, T> DerefMut for WriteGuard<'_, L, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<L: RawLock, T> Drop for WriteGuard<'_, L, T> {
    fn drop(&mut self) {
        unsafe {
            let token = ManuallyDrop::take(&mut self.token);
            self.lock.global.unlock(token);
        }
    }
}
