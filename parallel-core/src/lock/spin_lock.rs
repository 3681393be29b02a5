use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::utils::Backoff;

use super::raw_lock::{RawLock, RawTryLock};

/// Test-and-test-and-set spin lock.
///
/// Smallest footprint of the raw locks (one flag), no fairness: a releasing
/// thread may win the flag again before any waiter notices it was free.
///
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub fn new() -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

impl RawLock for SpinLock {
    type Token = ();

    fn lock(&self) {
        let backoff = Backoff::new();

        while !self.try_acquire() {
            // Wait on a plain load so waiters do not bounce the cache line.
            //
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    unsafe fn unlock(&self, _token: ()) {
        self.locked.store(false, Ordering::Release);
    }
}

impl RawTryLock for SpinLock {
    fn try_lock(&self) -> Option<()> {
        self.try_acquire().then_some(())
    }
}
