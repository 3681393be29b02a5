use std::sync::atomic::{AtomicBool, Ordering};

use crate::data_structures::internal::TakeCell;

// Snapshot of the list state, replaced wholesale by CAS.
//
//   { count: 5, write: None }                       settled
//   { count: 6, write: Some(slot 5: old → new) }    push in flight
//
// The descriptor never owns `old` or `new`. Whichever thread wins the slot
// CAS while completing the write retires `old`; `new` is then owned by the
// slot.
//
pub(super) struct Descriptor<T> {
    pub(super) count: usize,
    pub(super) write: Option<WriteOp<T>>,
}

pub(super) struct WriteOp<T> {
    pub(super) index: usize,
    pub(super) old: *mut TakeCell<T>,
    pub(super) new: *mut TakeCell<T>,
    pending: AtomicBool,
}

impl<T> Descriptor<T> {
    pub(super) fn settled(count: usize) -> *mut Self {
        Box::into_raw(Box::new(Descriptor { count, write: None }))
    }

    pub(super) fn with_write(
        count: usize,
        index: usize,
        old: *mut TakeCell<T>,
        new: *mut TakeCell<T>,
    ) -> *mut Self {
        Box::into_raw(Box::new(Descriptor {
            count,
            write: Some(WriteOp {
                index,
                old,
                new,
                pending: AtomicBool::new(true),
            }),
        }))
    }

    /// Elements visible to readers: a push still in flight does not count.
    ///
    pub(super) fn len(&self) -> usize {
        match &self.write {
            Some(op) if op.is_pending() => self.count - 1,
            _ => self.count,
        }
    }
}

impl<T> WriteOp<T> {
    #[inline]
    pub(super) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn finish(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    #[test]
    fn test_len_excludes_pending_push() {
        let desc = unsafe { Box::from_raw(Descriptor::<u8>::with_write(3, 2, ptr::null_mut(), ptr::null_mut())) };
        assert_eq!(desc.len(), 2);

        if let Some(op) = &desc.write {
            op.finish();
        }
        assert_eq!(desc.len(), 3);

        let settled = unsafe { Box::from_raw(Descriptor::<u8>::settled(4)) };
        assert_eq!(settled.len(), 4);
    }
}
