use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU64, Ordering};

use crossbeam::utils::{Backoff, CachePadded};
use tracing::debug;

use crate::data_structures::internal::TakeCell;
use crate::error::{CollectionError, CollectionResult};
use crate::guard::{Guard, drop_boxed};

type NodePtr<T> = *mut QueueNode<T>;

struct QueueNode<T> {
    // Empty in every sentinel: the first one never held a value, later ones
    // gave theirs to the dequeue that promoted them.
    data: TakeCell<T>,
    next: AtomicPtr<QueueNode<T>>,
}

impl<T> QueueNode<T> {
    fn new_boxed(data: TakeCell<T>) -> NodePtr<T> {
        Box::into_raw(Box::new(QueueNode {
            data,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

///
/// Lock-free FIFO queue (Michael & Scott).
///
/// ```text
///   head                      tail
///    │                         │
///    ▼                         ▼
///   [S] ──► [a] ──► [b] ──► [c] ──► null
///  sentinel
///
///   enqueue(d): CAS(c.next, null → d), then swing tail to d
///   dequeue():  CAS(head, S → a), move a's value out, a becomes the sentinel
/// ```
///
/// There is always exactly one sentinel, so `head` and `tail` are never null.
/// `tail` may lag one node behind the real last node; every operation that
/// notices the lag swings it forward before continuing. The old sentinel is
/// retired through the guard `G` after each successful dequeue.
///
pub struct Queue<T, G: Guard> {
    head: CachePadded<AtomicPtr<QueueNode<T>>>,
    tail: CachePadded<AtomicPtr<QueueNode<T>>>,
    count: AtomicIsize,
    revision: AtomicU64,
    guard: G,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send, G: Guard> Send for Queue<T, G> {}
unsafe impl<T: Send + Sync, G: Guard> Sync for Queue<T, G> {}

impl<T, G: Guard> Queue<T, G> {
    pub fn new() -> Self {
        let sentinel = QueueNode::new_boxed(TakeCell::empty());

        Queue {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            count: AtomicIsize::new(0),
            revision: AtomicU64::new(0),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    pub fn enqueue(&self, value: T) {
        let node = QueueNode::new_boxed(TakeCell::new(value));

        let _pin = G::pin();
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                let linked = unsafe {
                    (*tail)
                        .next
                        .compare_exchange(next, node, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                };

                if linked {
                    // Losing this CAS is fine, someone already helped.
                    //
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    );
                    break;
                }
            } else {
                self.help_tail(tail, next);
            }

            backoff.spin();
        }

        self.count.fetch_add(1, Ordering::Relaxed);
        self.revision.fetch_add(1, Ordering::Release);
    }

    /// Removes every element. Safe to call concurrently; elements enqueued
    /// during the call may or may not survive it.
    ///
    pub fn clear(&self) {
        let _pin = G::pin();
        let mut removed = 0usize;

        while let Some((old_sentinel, sentinel)) = self.advance_head() {
            drop(unsafe { (*sentinel).data.take() });
            unsafe { self.guard.defer_destroy(old_sentinel, drop_boxed) };
            removed += 1;
        }

        debug!(removed, "queue cleared");
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        let _pin = G::pin();
        let head = self.head.load(Ordering::Acquire);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    pub fn dequeue(&self) -> Option<T> {
        let _pin = G::pin();
        let (old_sentinel, sentinel) = self.advance_head()?;

        // The node stays reachable as the new sentinel, but only the thread
        // that promoted it takes its value.
        //
        let value = unsafe { (*sentinel).data.take() };
        unsafe { self.guard.defer_destroy(old_sentinel, drop_boxed) };

        value
    }

    #[inline]
    fn help_tail(&self, tail: NodePtr<T>, next: NodePtr<T>) {
        let _ = self
            .tail
            .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Relaxed);
    }

    // Moves `head` one node forward. Returns the old sentinel, which the
    // caller must retire, and the new one, which holds the dequeued value.
    // Must be called while pinned.
    //
    fn advance_head(&self) -> Option<(NodePtr<T>, NodePtr<T>)> {
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*head).next.load(Ordering::Acquire) };

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                return None;
            }

            if head == tail {
                // Tail still points at the sentinel we are about to retire.
                //
                self.help_tail(tail, next);
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.count.fetch_sub(1, Ordering::Relaxed);
                self.revision.fetch_add(1, Ordering::Release);
                return Some((head, next));
            }

            backoff.spin();
        }
    }
}

impl<T: Clone, G: Guard> Queue<T, G> {
    /// Oldest element without removing it.
    ///
    pub fn peek(&self) -> Option<T> {
        let _pin = G::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let first = unsafe { (*head).next.load(Ordering::Acquire) };
            if first.is_null() {
                return None;
            }

            // Taken by a racing dequeue, `head` has moved on.
            //
            match unsafe { (*first).data.read(T::clone) } {
                Some(value) => return Some(value),
                None => backoff.spin(),
            }
        }
    }

    /// Walks the queue from oldest to newest. See [`Iter`].
    ///
    pub fn iter(&self) -> Iter<'_, T, G> {
        let pin = G::pin();
        let revision = self.revision.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);

        Iter {
            queue: self,
            _pin: pin,
            current: unsafe { (*head).next.load(Ordering::Acquire) },
            revision,
            done: false,
        }
    }

    pub fn to_vec(&self) -> CollectionResult<Vec<T>> {
        self.iter().collect()
    }
}

impl<T, G: Guard> Default for Queue<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Drop for Queue<T, G> {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            let node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
        }
    }
}

/// Fail-fast iterator over a [`Queue`], oldest first.
///
/// Same contract as the stack iterator: pinned for its whole life, yields
/// `Err(CollectionError::Revised)` once after any completed enqueue or
/// dequeue, then ends.
///
pub struct Iter<'a, T, G: Guard> {
    queue: &'a Queue<T, G>,
    _pin: G::ReadGuard,
    current: NodePtr<T>,
    revision: u64,
    done: bool,
}

impl<T: Clone, G: Guard> Iterator for Iter<'_, T, G> {
    type Item = CollectionResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.queue.revision.load(Ordering::Acquire) != self.revision {
            self.done = true;
            return Some(Err(CollectionError::Revised));
        }

        if self.current.is_null() {
            self.done = true;
            return None;
        }

        let node = unsafe { &*self.current };
        self.current = node.next.load(Ordering::Acquire);

        match node.data.read(T::clone) {
            Some(value) => Some(Ok(value)),
            None => {
                self.done = true;
                Some(Err(CollectionError::Revised))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::guard::DeferredGuard;

    #[test]
    fn test_enqueue_dequeue_is_fifo() {
        let queue: Queue<i32, DeferredGuard> = Queue::new();

        for i in 1..=3 {
            queue.enqueue(i);
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_and_to_vec() {
        let queue: Queue<&str, DeferredGuard> = Queue::default();
        assert_eq!(queue.peek(), None);

        queue.enqueue("x");
        queue.enqueue("y");

        assert_eq!(queue.peek(), Some("x"));
        assert_eq!(queue.to_vec(), Ok(vec!["x", "y"]));
    }

    #[test]
    fn test_iterator_fails_after_dequeue() {
        let queue: Queue<i32, DeferredGuard> = Queue::new();
        queue.enqueue(1);
        queue.enqueue(2);

        let mut iter = queue.iter();
        queue.dequeue();

        assert_eq!(iter.next(), Some(Err(CollectionError::Revised)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_clear_retires_sentinels() {
        let queue: Queue<i32, DeferredGuard> = Queue::new();
        for i in 0..8 {
            queue.enqueue(i);
        }

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.guard.retired_count(), 8);

        queue.enqueue(9);
        assert_eq!(queue.dequeue(), Some(9));
    }

    #[test]
    fn test_sentinel_does_not_keep_dequeued_value() {
        let shared = Arc::new(1u32);
        let queue: Queue<Arc<u32>, DeferredGuard> = Queue::new();

        queue.enqueue(Arc::clone(&shared));
        queue.enqueue(Arc::clone(&shared));

        drop(queue.dequeue());
        assert_eq!(Arc::strong_count(&shared), 2);

        drop(queue.dequeue());
        assert_eq!(Arc::strong_count(&shared), 1);
        assert!(queue.is_empty());
    }
}
