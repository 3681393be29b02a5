mod descriptor;
mod iter;

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crossbeam::utils::{Backoff, CachePadded};
use tracing::{debug, trace};

use self::descriptor::Descriptor;
use crate::data_structures::internal::{ArrayPool, TakeCell};
use crate::data_structures::internal::bucket_index::{
    BUCKET_COUNT, FIRST_BUCKET_SIZE, MAX_CAPACITY, bucket_len, buckets_for, capacity_of, hibit,
    locate,
};
use crate::error::{CollectionError, CollectionResult};
use crate::guard::{Guard, drop_boxed};

pub use self::iter::Iter;

type Slot<T> = AtomicPtr<TakeCell<T>>;

///
/// Lock-free unbounded vector (Dechev, Pirkelbauer & Stroustrup).
///
/// Elements live in doubling buckets that never move, so a slot address stays
/// valid for the life of the list. Each slot holds a pointer to a boxed
/// [`TakeCell`], which lets a plain pointer CAS replace any `T`.
///
/// ```text
///   descriptor ──► { count: 11, write: Some(slot 10: old → new) }
///
///   buckets[0] ──► [ 0  1  2  3  4  5  6  7 ]
///   buckets[1] ──► [ 8  9 10  .  .  .  .  .  .  .  .  .  .  .  .  . ]
///   buckets[2] ──► null (installed on demand)
/// ```
///
/// `push` and `pop_back` linearize on the descriptor CAS. A push publishes a
/// descriptor that still has to write its slot; every thread that loads the
/// descriptor first completes that write, so no one ever observes a count
/// whose last slot is stale.
///
/// `pop_back` moves the element out of its cell and leaves the empty cell in
/// the slot past the end. The next push at that index replaces and retires
/// it.
///
/// Methods taking `&mut self` (`clear`, `reduce`, `insert`, `remove`,
/// `remove_at`) rely on exclusive access instead of the descriptor protocol.
///
pub struct ArrayList<T, G: Guard> {
    descriptor: CachePadded<AtomicPtr<Descriptor<T>>>,
    buckets: [AtomicPtr<Slot<T>>; BUCKET_COUNT],
    pool: ArrayPool<Slot<T>>,
    revision: AtomicU64,
    guard: G,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send, G: Guard> Send for ArrayList<T, G> {}
unsafe impl<T: Send + Sync, G: Guard> Sync for ArrayList<T, G> {}

impl<T, G: Guard> ArrayList<T, G> {
    pub fn new() -> Self {
        let list = ArrayList {
            descriptor: CachePadded::new(AtomicPtr::new(Descriptor::settled(0))),
            buckets: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            pool: ArrayPool::new(),
            revision: AtomicU64::new(0),
            guard: G::default(),
            _marker: PhantomData,
        };

        list.ensure_bucket(0);
        list
    }

    /// Empty list with buckets for at least `capacity` elements.
    ///
    pub fn with_capacity(capacity: usize) -> CollectionResult<Self> {
        let list = Self::new();
        list.reserve(capacity)?;
        Ok(list)
    }

    /// Appends `value`.
    ///
    pub fn push(&self, value: T) {
        let new = Box::into_raw(Box::new(TakeCell::new(value)));

        let _pin = G::pin();
        let backoff = Backoff::new();

        loop {
            let current = self.descriptor.load(Ordering::Acquire);
            let desc = unsafe { &*current };
            self.complete_write(desc);

            let index = desc.count;
            if index >= MAX_CAPACITY {
                unsafe { drop_boxed(new) };
                panic!("ArrayList capacity of {MAX_CAPACITY} elements exceeded");
            }

            self.ensure_bucket(locate(index).0);
            let old = self.slot(index).load(Ordering::Acquire);
            let next = Descriptor::with_write(index + 1, index, old, new);

            match self.descriptor.compare_exchange(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    unsafe { self.guard.defer_destroy(current, drop_boxed) };
                    self.complete_write(unsafe { &*next });
                    self.revision.fetch_add(1, Ordering::Release);
                    return;
                }
                Err(_) => {
                    // Never published, nobody else saw it.
                    //
                    unsafe { drop_boxed(next) };
                    backoff.spin();
                }
            }
        }
    }

    /// Replaces the element at `index`.
    ///
    pub fn set(&self, index: usize, value: T) -> CollectionResult<()> {
        let _pin = G::pin();
        let desc = self.settled_descriptor();

        if index >= desc.count {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: desc.count,
            });
        }

        let new = Box::into_raw(Box::new(TakeCell::new(value)));
        let old = self.slot(index).swap(new, Ordering::AcqRel);
        if !old.is_null() {
            unsafe { self.guard.defer_destroy(old, drop_boxed) };
        }

        self.revision.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Installs buckets until at least `size` elements fit. Does not change
    /// the length.
    ///
    pub fn reserve(&self, size: usize) -> CollectionResult<()> {
        if size > MAX_CAPACITY {
            return Err(CollectionError::CapacityExceeded {
                requested: size,
                max: MAX_CAPACITY,
            });
        }

        for bucket in 0..buckets_for(size) {
            self.ensure_bucket(bucket);
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        let _pin = G::pin();
        let desc = unsafe { &*self.descriptor.load(Ordering::Acquire) };
        desc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots currently installed, in the leading run of buckets.
    ///
    pub fn capacity(&self) -> usize {
        let installed = self
            .buckets
            .iter()
            .take_while(|bucket| !bucket.load(Ordering::Acquire).is_null())
            .count();

        capacity_of(installed)
    }

    /// Removes every element and releases every bucket except the first.
    ///
    pub fn clear(&mut self) {
        let len = self.settle_exclusive();

        for bucket in 0..BUCKET_COUNT {
            let Some(buffer) = self.take_bucket(bucket) else {
                continue;
            };

            if bucket == 0 {
                // Already emptied by `take_bucket`.
                //
                let base = Box::into_raw(buffer) as *mut Slot<T>;
                *self.buckets[0].get_mut() = base;
            } else {
                self.pool.give_back(buffer, false);
            }
        }

        self.replace_descriptor_exclusive(0);
        self.revision.fetch_add(1, Ordering::Release);
        debug!(removed = len, "array list cleared");
    }

    /// Releases spare buckets so that capacity stays within a small multiple
    /// of the length.
    ///
    pub fn reduce(&mut self) {
        let len = self.settle_exclusive();
        // Keep the buckets holding `len`, plus one spare.
        //
        let keep = (hibit(len + FIRST_BUCKET_SIZE - 1) + 2 - FIRST_BUCKET_SIZE.trailing_zeros()) as usize;

        let mut released = 0usize;
        for bucket in keep..BUCKET_COUNT {
            match self.take_bucket(bucket) {
                Some(buffer) => {
                    self.pool.give_back(buffer, false);
                    released += 1;
                }
                None => break,
            }
        }

        debug!(len, released, "array list reduced");
    }

    /// Inserts `value` at `index`, shifting later elements up.
    ///
    pub fn insert(&mut self, index: usize, value: T) -> CollectionResult<()> {
        let len = self.settle_exclusive();
        if index > len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }

        self.push(value);

        let inserted = self.slot(len).load(Ordering::Relaxed);
        for i in (index..len).rev() {
            let moved = self.slot(i).load(Ordering::Relaxed);
            self.slot(i + 1).store(moved, Ordering::Relaxed);
        }
        self.slot(index).store(inserted, Ordering::Relaxed);

        Ok(())
    }

    /// Removes and returns the element at `index`, shifting later elements
    /// down.
    ///
    pub fn remove_at(&mut self, index: usize) -> CollectionResult<T> {
        let len = self.settle_exclusive();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }

        let removed = self.slot(index).load(Ordering::Relaxed);
        for i in index..len - 1 {
            let moved = self.slot(i + 1).load(Ordering::Relaxed);
            self.slot(i).store(moved, Ordering::Relaxed);
        }
        self.slot(len - 1).store(ptr::null_mut(), Ordering::Relaxed);

        self.replace_descriptor_exclusive(len - 1);
        self.revision.fetch_add(1, Ordering::Release);

        // Cells below the length always hold a value once writes are settled.
        //
        unsafe { Box::from_raw(removed) }
            .into_inner()
            .ok_or(CollectionError::IndexOutOfRange { index, len })
    }

    /// Removes and returns the last element.
    ///
    pub fn pop_back(&self) -> Option<T> {
        let _pin = G::pin();
        let backoff = Backoff::new();

        loop {
            let current = self.descriptor.load(Ordering::Acquire);
            let desc = unsafe { &*current };
            self.complete_write(desc);

            if desc.count == 0 {
                return None;
            }

            let last = self.slot(desc.count - 1).load(Ordering::Acquire);
            let next = Descriptor::settled(desc.count - 1);

            match self.descriptor.compare_exchange(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    unsafe { self.guard.defer_destroy(current, drop_boxed) };
                    self.revision.fetch_add(1, Ordering::Release);

                    // Each cell is taken by the pop that shortened the list
                    // past it, so an empty one here is stale. Pop again.
                    //
                    match unsafe { (*last).take() } {
                        Some(value) => return Some(value),
                        None => backoff.spin(),
                    }
                }
                Err(_) => {
                    unsafe { drop_boxed(next) };
                    backoff.spin();
                }
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    // Finishes the pending write of `desc`, if any. Only the thread whose slot
    // CAS succeeds retires the replaced element.
    //
    fn complete_write(&self, desc: &Descriptor<T>) {
        if let Some(op) = &desc.write
            && op.is_pending()
        {
            let slot = self.slot(op.index);
            if slot
                .compare_exchange(op.old, op.new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
                && !op.old.is_null()
            {
                unsafe { self.guard.defer_destroy(op.old, drop_boxed) };
            }
            op.finish();
        }
    }

    // Current descriptor with its write completed. Must be called while
    // pinned; the reference is valid for the pin's lifetime.
    //
    fn settled_descriptor(&self) -> &Descriptor<T> {
        let desc = unsafe { &*self.descriptor.load(Ordering::Acquire) };
        self.complete_write(desc);
        desc
    }

    #[inline]
    fn slot(&self, index: usize) -> &Slot<T> {
        let (bucket, offset) = locate(index);
        let base = self.buckets[bucket].load(Ordering::Acquire);

        if base.is_null() {
            panic!("slot {index} read before bucket {bucket} was installed");
        }

        unsafe { &*base.add(offset) }
    }

    fn ensure_bucket(&self, bucket: usize) {
        if !self.buckets[bucket].load(Ordering::Acquire).is_null() {
            return;
        }

        let buffer = self.pool.rent(bucket_len(bucket));
        let base = Box::into_raw(buffer) as *mut Slot<T>;

        match self.buckets[bucket].compare_exchange(
            ptr::null_mut(),
            base,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => trace!(bucket, "array list bucket installed"),
            Err(_) => {
                let buffer = unsafe { Self::bucket_from_raw(base, bucket) };
                self.pool.give_back(buffer, false);
            }
        }
    }

    unsafe fn bucket_from_raw(base: *mut Slot<T>, bucket: usize) -> Box<[Slot<T>]> {
        unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(base, bucket_len(bucket))) }
    }

    // Detaches a bucket and frees every cell still in it, including the
    // emptied ones past the end left behind by `pop_back`.
    //
    fn take_bucket(&mut self, bucket: usize) -> Option<Box<[Slot<T>]>> {
        let base = std::mem::replace(self.buckets[bucket].get_mut(), ptr::null_mut());
        if base.is_null() {
            return None;
        }

        let mut buffer = unsafe { Self::bucket_from_raw(base, bucket) };
        for slot in buffer.iter_mut() {
            let value = std::mem::replace(slot.get_mut(), ptr::null_mut());
            if !value.is_null() {
                unsafe { drop_boxed(value) };
            }
        }

        Some(buffer)
    }

    fn settle_exclusive(&mut self) -> usize {
        let desc = unsafe { &*self.descriptor.load(Ordering::Acquire) };
        self.complete_write(desc);
        desc.count
    }

    fn replace_descriptor_exclusive(&mut self, count: usize) {
        let old = std::mem::replace(self.descriptor.get_mut(), Descriptor::settled(count));
        unsafe { drop_boxed(old) };
    }
}

impl<T: Clone, G: Guard> ArrayList<T, G> {
    pub fn get(&self, index: usize) -> CollectionResult<T> {
        let _pin = G::pin();
        let backoff = Backoff::new();

        loop {
            let desc = self.settled_descriptor();

            if index >= desc.count {
                return Err(CollectionError::IndexOutOfRange {
                    index,
                    len: desc.count,
                });
            }

            // An empty cell means a pop overtook us; the length has changed.
            //
            let cell = self.slot(index).load(Ordering::Acquire);
            match unsafe { (*cell).read(T::clone) } {
                Some(value) => return Ok(value),
                None => backoff.spin(),
            }
        }
    }

    /// Clones every element into `dest[start..]`.
    ///
    /// Fails with `Revised` if a concurrent pop removes an element before it
    /// is copied.
    ///
    pub fn copy_to(&self, dest: &mut [T], start: usize) -> CollectionResult<()> {
        let _pin = G::pin();
        let len = self.settled_descriptor().count;
        let available = dest.len().saturating_sub(start);

        if start > dest.len() || len > available {
            return Err(CollectionError::InsufficientSpace {
                required: len,
                available,
            });
        }

        for (i, target) in dest[start..start + len].iter_mut().enumerate() {
            let cell = self.slot(i).load(Ordering::Acquire);
            match unsafe { (*cell).read(T::clone) } {
                Some(value) => *target = value,
                None => return Err(CollectionError::Revised),
            }
        }

        Ok(())
    }

    /// Walks elements by index. See [`Iter`].
    ///
    pub fn iter(&self) -> Iter<'_, T, G> {
        Iter::new(self)
    }

    pub fn to_vec(&self) -> CollectionResult<Vec<T>> {
        self.iter().collect()
    }
}

impl<T: PartialEq, G: Guard> ArrayList<T, G> {
    pub fn index_of(&self, value: &T) -> Option<usize> {
        let _pin = G::pin();
        let len = self.settled_descriptor().count;

        (0..len).find(|&i| {
            let cell = unsafe { &*self.slot(i).load(Ordering::Acquire) };
            cell.read(|element| element == value) == Some(true)
        })
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index_of(value).is_some()
    }

    /// Removes the first element equal to `value`.
    ///
    pub fn remove(&mut self, value: &T) -> bool {
        match self.index_of(value) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }
}

impl<T, G: Guard> Default for ArrayList<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Drop for ArrayList<T, G> {
    fn drop(&mut self) {
        self.settle_exclusive();

        for bucket in 0..BUCKET_COUNT {
            // Dropping the buffer only frees slot storage; cells were freed
            // by `take_bucket`.
            //
            drop(self.take_bucket(bucket));
        }

        let desc = std::mem::replace(self.descriptor.get_mut(), ptr::null_mut());
        unsafe { drop_boxed(desc) };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::guard::DeferredGuard;

    type List<T> = ArrayList<T, DeferredGuard>;

    #[test]
    fn test_push_get_across_buckets() {
        let list: List<usize> = ArrayList::new();

        for i in 0..100 {
            list.push(i * 2);
        }

        assert_eq!(list.len(), 100);
        for i in 0..100 {
            assert_eq!(list.get(i), Ok(i * 2));
        }
        assert_eq!(
            list.get(100),
            Err(CollectionError::IndexOutOfRange { index: 100, len: 100 })
        );
    }

    #[test]
    fn test_pop_back_then_push_reuses_slot() {
        let list: List<String> = ArrayList::new();
        list.push("a".into());
        list.push("b".into());

        assert_eq!(list.pop_back().as_deref(), Some("b"));
        list.push("c".into());

        assert_eq!(list.to_vec(), Ok(vec!["a".to_string(), "c".to_string()]));
        assert_eq!(list.pop_back().as_deref(), Some("c"));
        assert_eq!(list.pop_back().as_deref(), Some("a"));
        assert_eq!(list.pop_back(), None);
    }

    #[test]
    fn test_set_replaces_element() {
        let list: List<i32> = ArrayList::new();
        list.push(1);
        list.push(2);

        assert_eq!(list.set(1, 20), Ok(()));
        assert_eq!(list.get(1), Ok(20));
        assert!(list.set(2, 0).is_err());
    }

    #[test]
    fn test_reserve_and_reduce() {
        let mut list: List<i32> = ArrayList::with_capacity(100).unwrap();
        assert!(list.capacity() >= 100);
        assert!(list.is_empty());

        list.push(1);
        list.reduce();

        // One element keeps buckets 0 and 1.
        //
        assert_eq!(list.capacity(), capacity_of(2));
        assert_eq!(list.get(0), Ok(1));
    }

    #[test]
    fn test_clear_keeps_first_bucket() {
        let mut list: List<i32> = ArrayList::new();
        for i in 0..50 {
            list.push(i);
        }

        list.clear();
        assert_eq!(list.len(), 0);
        assert_eq!(list.capacity(), FIRST_BUCKET_SIZE);

        list.push(7);
        assert_eq!(list.to_vec(), Ok(vec![7]));
    }

    #[test]
    fn test_insert_and_remove_shift_elements() {
        let mut list: List<i32> = ArrayList::new();
        for i in [1, 2, 4] {
            list.push(i);
        }

        list.insert(2, 3).unwrap();
        list.insert(0, 0).unwrap();
        assert_eq!(list.to_vec(), Ok(vec![0, 1, 2, 3, 4]));

        assert_eq!(list.remove_at(1), Ok(1));
        assert!(list.remove(&3));
        assert!(!list.remove(&42));
        assert_eq!(list.to_vec(), Ok(vec![0, 2, 4]));

        assert!(list.insert(9, 9).is_err());
    }

    #[test]
    fn test_contains_index_of_copy_to() {
        let list: List<char> = ArrayList::new();
        for c in ['x', 'y', 'z'] {
            list.push(c);
        }

        assert!(list.contains(&'y'));
        assert_eq!(list.index_of(&'z'), Some(2));
        assert_eq!(list.index_of(&'w'), None);

        let mut dest = ['-'; 5];
        list.copy_to(&mut dest, 1).unwrap();
        assert_eq!(dest, ['-', 'x', 'y', 'z', '-']);

        assert_eq!(
            list.copy_to(&mut dest, 3),
            Err(CollectionError::InsufficientSpace {
                required: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_pop_back_leaves_no_copy_behind() {
        let shared = Arc::new(3u32);
        let list: List<Arc<u32>> = ArrayList::new();

        for _ in 0..3 {
            list.push(Arc::clone(&shared));
        }

        for _ in 0..3 {
            drop(list.pop_back());
        }
        assert_eq!(Arc::strong_count(&shared), 1);

        // The emptied cell is replaced, not reused, by the next push.
        //
        list.push(Arc::clone(&shared));
        assert_eq!(list.get(0).map(|v| *v), Ok(3));
        assert_eq!(Arc::strong_count(&shared), 2);
    }

    #[test]
    fn test_reserve_beyond_max_capacity_is_reported() {
        let list: List<u8> = ArrayList::new();
        let requested = MAX_CAPACITY + 1;

        assert_eq!(
            list.reserve(requested),
            Err(CollectionError::CapacityExceeded {
                requested,
                max: MAX_CAPACITY
            })
        );
        assert!(ArrayList::<u8, DeferredGuard>::with_capacity(requested).is_err());
        assert_eq!(list.reserve(16), Ok(()));
    }
}
