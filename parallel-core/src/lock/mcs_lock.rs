use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

use super::raw_lock::RawLock;

struct McsNode {
    locked: CachePadded<AtomicBool>,
    next: CachePadded<AtomicPtr<McsNode>>,
}

impl McsNode {
    fn new_boxed() -> *mut McsNode {
        Box::into_raw(Box::new(McsNode {
            locked: CachePadded::new(AtomicBool::new(true)),
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
        }))
    }
}

/// MCS queue lock.
///
/// Unlike CLH, the queue is explicit: each waiter links itself behind its
/// predecessor and spins on its own node, and the releasing thread hands the
/// lock directly to the successor.
///
/// ```text
///   tail ──────────────────────────────┐
///                                      ▼
///   [A: holder] ──next──► [B: locked] ──next──► [C: locked]
///
///   A unlocks:  B.locked = false, A frees its node.
/// ```
///
/// A null tail means the lock is free.
///
pub struct McsLock {
    tail: CachePadded<AtomicPtr<McsNode>>,
}

/// Token of a [`McsLock`]: the caller's queue node.
pub struct McsToken {
    node: *mut McsNode,
}

// Safety: the node is heap allocated and only reached through atomics, so the
// release may run on a different thread than the acquire.
unsafe impl Send for McsToken {}

impl McsLock {
    pub fn new() -> Self {
        McsLock {
            tail: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
        }
    }
}

impl Default for McsLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for McsLock {
    type Token = McsToken;

    fn lock(&self) -> McsToken {
        let node = McsNode::new_boxed();
        let pred = self.tail.swap(node, Ordering::AcqRel);

        if pred.is_null() {
            // Queue was empty, the lock is ours.
            //
            return McsToken { node };
        }

        unsafe { (*pred).next.store(node, Ordering::Release) };

        let backoff = Backoff::new();
        while unsafe { (*node).locked.load(Ordering::Acquire) } {
            backoff.snooze();
        }

        McsToken { node }
    }

    unsafe fn unlock(&self, token: McsToken) {
        let node = token.node;
        let backoff = Backoff::new();

        loop {
            let next = unsafe { (*node).next.load(Ordering::Acquire) };

            if !next.is_null() {
                // Hand off to the linked successor.
                //
                unsafe {
                    (*next).locked.store(false, Ordering::Release);
                    drop(Box::from_raw(node));
                }
                return;
            }

            if self
                .tail
                .compare_exchange(node, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // No successor at all.
                //
                unsafe { drop(Box::from_raw(node)) };
                return;
            }

            // A successor swapped the tail but has not linked itself yet.
            //
            backoff.snooze();
        }
    }
}

// Safety: all shared state is reached through atomics.
unsafe impl Send for McsLock {}
unsafe impl Sync for McsLock {}
