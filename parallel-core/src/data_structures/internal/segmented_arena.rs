use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use tracing::trace;

use super::bucket_index::{BUCKET_COUNT, MAX_CAPACITY, bucket_len, locate};

/// Index that never refers to a slot.
pub(crate) const NIL: u32 = u32::MAX;

/// Growable arena of `N` addressed by `u32` indices.
///
/// Slots live in doubling buckets (same layout as `ArrayList`), so a slot
/// never moves once allocated and `get` is a pair of loads. Buckets are
/// installed lazily by CAS and only freed when the arena drops.
///
/// Released indices are recycled through a lock-free free list. A thread
/// holding a stale index still reads a valid `N`; it is up to the owner of
/// the arena to detect that the slot changed meaning.
///
pub(crate) struct SegmentedArena<N> {
    buckets: [AtomicPtr<N>; BUCKET_COUNT],
    next: AtomicUsize,
    free: SegQueue<u32>,
    _marker: PhantomData<Box<N>>,
}

impl<N: Default> SegmentedArena<N> {
    pub(crate) fn new() -> Self {
        SegmentedArena {
            buckets: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            next: AtomicUsize::new(0),
            free: SegQueue::new(),
            _marker: PhantomData,
        }
    }

    /// A fresh or recycled slot index. Recycled slots keep their old
    /// contents; the caller reinitializes them.
    ///
    pub(crate) fn alloc(&self) -> u32 {
        if let Some(index) = self.free.pop() {
            return index;
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed);
        if index >= MAX_CAPACITY {
            panic!("arena exhausted at {index} slots");
        }

        let (bucket, _) = locate(index);
        self.ensure_bucket(bucket);

        index as u32
    }

    /// Returns a slot to the free list.
    ///
    pub(crate) fn release(&self, index: u32) {
        debug_assert!((index as usize) < self.next.load(Ordering::Relaxed));
        self.free.push(index);
    }

    #[inline]
    pub(crate) fn get(&self, index: u32) -> &N {
        debug_assert!(index != NIL, "dereferenced a nil index");

        let (bucket, offset) = locate(index as usize);
        let base = self.buckets[bucket].load(Ordering::Acquire);
        debug_assert!(!base.is_null(), "index {index} outside installed buckets");

        unsafe { &*base.add(offset) }
    }

    /// Slots handed out so far, including released ones.
    ///
    pub(crate) fn allocated(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    fn ensure_bucket(&self, bucket: usize) {
        if !self.buckets[bucket].load(Ordering::Acquire).is_null() {
            return;
        }

        let len = bucket_len(bucket);
        let fresh: Box<[N]> = (0..len).map(|_| N::default()).collect();
        let fresh = Box::into_raw(fresh) as *mut N;

        match self.buckets[bucket].compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => trace!(bucket, len, "arena bucket installed"),
            Err(_) => unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(fresh, len))) },
        }
    }
}

impl<N> Drop for SegmentedArena<N> {
    fn drop(&mut self) {
        for (bucket, slot) in self.buckets.iter_mut().enumerate() {
            let base = *slot.get_mut();
            if !base.is_null() {
                let len = bucket_len(bucket);
                unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(base, len))) };
            }
        }
    }
}
