use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU64, Ordering};

use crossbeam::utils::{Backoff, CachePadded};
use tracing::debug;

use crate::data_structures::internal::TakeCell;
use crate::error::{CollectionError, CollectionResult};
use crate::guard::{Guard, drop_boxed};

type NodePtr<T> = *mut StackNode<T>;

struct StackNode<T> {
    data: TakeCell<T>,
    next: AtomicPtr<StackNode<T>>,
}

///
/// Lock-free LIFO stack (Treiber).
///
/// ```text
///   head ──► [4] ──► [3] ──► [2] ──► [1] ──► null
///
///   push(5):  new.next = head;  CAS(head, [4] → [5])
///   pop():    CAS(head, [4] → [3]);  [4] goes to the guard
/// ```
///
/// The successful CAS on `head` is the linearization point of both push and
/// pop. The winning pop moves the value out of the node; the emptied node is
/// never freed directly, since a racing pop or `peek` may have loaded it as
/// its own head candidate, so it is handed to the guard `G` instead.
/// Since a retired node cannot be reused while anyone is pinned, a stale head
/// can never reappear at the same address (no ABA).
///
// `count` is adjusted after the linking CAS, so it may briefly disagree with
// the chain (and even dip below zero with a pop racing ahead of its push's
// increment). `len` clamps it.
//
pub struct Stack<T, G: Guard> {
    head: CachePadded<AtomicPtr<StackNode<T>>>,
    count: AtomicIsize,
    revision: AtomicU64,
    guard: G,
    _marker: PhantomData<T>,
}

// Safety: values move between threads through push/pop, and `peek` and
// iteration clone them through shared references.
unsafe impl<T: Send, G: Guard> Send for Stack<T, G> {}
unsafe impl<T: Send + Sync, G: Guard> Sync for Stack<T, G> {}

impl<T, G: Guard> Stack<T, G> {
    pub fn new() -> Self {
        Stack {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            count: AtomicIsize::new(0),
            revision: AtomicU64::new(0),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(StackNode {
            data: TakeCell::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }));

        let _pin = G::pin();
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Acquire);

        loop {
            // Node is still private, a relaxed store is enough.
            //
            unsafe { (*node).next.store(head, Ordering::Relaxed) };

            match self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => {
                    head = actual;
                    backoff.spin();
                }
            }
        }

        self.count.fetch_add(1, Ordering::Relaxed);
        self.revision.fetch_add(1, Ordering::Release);
    }

    /// Removes every element. Safe to call concurrently with other operations;
    /// elements pushed during the call may or may not survive it.
    ///
    pub fn clear(&self) {
        let _pin = G::pin();
        let mut removed = 0usize;

        while let Some(node) = self.unlink_head() {
            drop(unsafe { (*node).data.take() });
            unsafe { self.guard.defer_destroy(node, drop_boxed) };
            removed += 1;
        }

        debug!(removed, "stack cleared");
    }

    /// Number of elements. Exact when no operation is in flight.
    ///
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    pub fn pop(&self) -> Option<T> {
        let _pin = G::pin();
        let node = self.unlink_head()?;

        // Only the thread that unlinked the node takes its value.
        //
        let value = unsafe { (*node).data.take() };
        unsafe { self.guard.defer_destroy(node, drop_boxed) };

        value
    }

    // Must be called while pinned. The returned node is unreachable from
    // `head` and belongs to the caller, who retires it.
    //
    fn unlink_head(&self) -> Option<NodePtr<T>> {
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }

            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.count.fetch_sub(1, Ordering::Relaxed);
                self.revision.fetch_add(1, Ordering::Release);
                return Some(head);
            }

            backoff.spin();
        }
    }
}

impl<T: Clone, G: Guard> Stack<T, G> {
    /// Top element without removing it.
    ///
    pub fn peek(&self) -> Option<T> {
        let _pin = G::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }

            // A racing pop emptied this node, look at the new head.
            //
            match unsafe { (*head).data.read(T::clone) } {
                Some(value) => return Some(value),
                None => backoff.spin(),
            }
        }
    }

    /// Walks the stack from top to bottom. See [`Iter`].
    ///
    pub fn iter(&self) -> Iter<'_, T, G> {
        let pin = G::pin();
        let revision = self.revision.load(Ordering::Acquire);

        Iter {
            stack: self,
            _pin: pin,
            current: self.head.load(Ordering::Acquire),
            revision,
            done: false,
        }
    }

    /// Elements from top to bottom.
    ///
    pub fn to_vec(&self) -> CollectionResult<Vec<T>> {
        self.iter().collect()
    }
}

impl<T, G: Guard> Default for Stack<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Drop for Stack<T, G> {
    fn drop(&mut self) {
        // Nodes still linked are owned by the stack alone; retired ones are
        // freed by the guard when it drops right after.
        //
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            let node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
        }
    }
}

/// Fail-fast iterator over a [`Stack`], top to bottom.
///
/// Holds a pin for its whole life, so every node it can reach stays
/// allocated. If any push or pop completes after the iterator was created,
/// the next call yields `Err(CollectionError::Revised)` and the iterator ends.
///
pub struct Iter<'a, T, G: Guard> {
    stack: &'a Stack<T, G>,
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

        if self.stack.revision.load(Ordering::Acquire) != self.revision {
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
