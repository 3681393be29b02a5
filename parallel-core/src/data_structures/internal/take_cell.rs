use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::Backoff;

// Low bit: the value has been moved out. Remaining bits: readers currently
// cloning or comparing the value.
//
const TAKEN: usize = 1;
const READER: usize = 1 << 1;

///
/// Element storage for a node that many threads can read but exactly one
/// thread removes.
///
/// ```text
///   state = readers * READER | TAKEN?
///
///   read():  state += READER; if !TAKEN use &T; state -= READER
///   take():  state |= TAKEN;  wait until readers == 0; move T out
/// ```
///
/// The thread that wins the unlinking CAS calls `take` and receives the value
/// by move. Readers that registered first finish with the value before it
/// leaves; readers that arrive later see `TAKEN` and get `None`. Dropping the
/// cell drops the value only if nobody took it.
///
pub(crate) struct TakeCell<T> {
    state: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

// Safety: readers only get `&T` while registered, and `take` waits until no
// readers remain before moving the value out to another thread.
unsafe impl<T: Send> Send for TakeCell<T> {}
unsafe impl<T: Send + Sync> Sync for TakeCell<T> {}

impl<T> TakeCell<T> {
    pub(crate) fn new(value: T) -> Self {
        TakeCell {
            state: AtomicUsize::new(0),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        }
    }

    /// A cell that never held a value, such as a queue's first sentinel.
    ///
    pub(crate) fn empty() -> Self {
        TakeCell {
            state: AtomicUsize::new(TAKEN),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Runs `f` on the value unless it was already taken.
    ///
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.fetch_add(READER, Ordering::Acquire);
        let _exit = ReaderExit(&self.state);

        if state & TAKEN != 0 {
            return None;
        }

        Some(f(unsafe { (*self.value.get()).assume_init_ref() }))
    }

    /// Moves the value out. Returns `None` if it was already taken.
    ///
    /// # Safety
    ///
    /// The caller must have unlinked the owning node (or otherwise won the
    /// right to remove it), so that no thread starts a `take` after the
    /// value is gone and reuses the memory.
    ///
    pub(crate) unsafe fn take(&self) -> Option<T> {
        let previous = self.state.fetch_or(TAKEN, Ordering::AcqRel);
        if previous & TAKEN != 0 {
            return None;
        }

        let backoff = Backoff::new();
        while self.state.load(Ordering::Acquire) != TAKEN {
            backoff.snooze();
        }

        Some(unsafe { (*self.value.get()).assume_init_read() })
    }

    /// Moves the value out of a cell nobody else can reach.
    ///
    pub(crate) fn into_inner(mut self) -> Option<T> {
        let state = self.state.get_mut();
        if *state & TAKEN != 0 {
            return None;
        }

        *state = TAKEN;
        Some(unsafe { self.value.get_mut().assume_init_read() })
    }
}

impl<T> Drop for TakeCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() & TAKEN == 0 {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

struct ReaderExit<'a>(&'a AtomicUsize);

impl Drop for ReaderExit<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(READER, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_take_moves_value_once() {
        let shared = Arc::new(0u32);
        let cell = TakeCell::new(Arc::clone(&shared));

        assert_eq!(cell.read(|v| **v), Some(0));

        let taken = unsafe { cell.take() };
        assert!(taken.is_some());
        assert!(unsafe { cell.take() }.is_none());
        assert_eq!(cell.read(|v| **v), None);

        drop(taken);
        drop(cell);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_drop_releases_untaken_value() {
        let shared = Arc::new(());
        drop(TakeCell::new(Arc::clone(&shared)));
        assert_eq!(Arc::strong_count(&shared), 1);

        let empty = TakeCell::<Arc<()>>::empty();
        assert!(empty.into_inner().is_none());

        let full = TakeCell::new(Arc::clone(&shared));
        assert!(full.into_inner().is_some());
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_take_waits_for_readers() {
        let cell = Arc::new(TakeCell::new(String::from("payload")));
        let mut handles = vec![];

        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            handles.push(thread::spawn(move || {
                let mut seen = 0;
                while let Some(len) = cell.read(|s| s.clone().len()) {
                    assert_eq!(len, 7);
                    seen += 1;
                }
                seen
            }));
        }

        thread::yield_now();
        assert_eq!(unsafe { cell.take() }.as_deref(), Some("payload"));

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
