use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

use super::raw_lock::RawLock;

// Queue node. Padded so that a waiter spinning on its predecessor's flag does
// not share a cache line with any other waiter.
//
struct ClhNode {
    locked: CachePadded<AtomicBool>,
}

impl ClhNode {
    fn new_boxed(locked: bool) -> *mut ClhNode {
        Box::into_raw(Box::new(ClhNode {
            locked: CachePadded::new(AtomicBool::new(locked)),
        }))
    }
}

/// CLH queue lock.
///
/// Waiters form an implicit queue through the tail pointer: each one spins on
/// the node of the thread that swapped in right before it.
///
/// ```text
///   tail ──► [C: locked] ─spins on─► [B: locked] ─spins on─► [A: locked]
///                                                             (holder)
///
///   A unlocks:  [A: unlocked]  B stops spinning, frees A's node, B holds.
/// ```
///
/// The node allocated by `lock` is the token. It stays alive after `unlock`
/// until the successor frees it, or until the lock itself drops when no
/// successor ever came.
///
pub struct ClhLock {
    tail: CachePadded<AtomicPtr<ClhNode>>,
}

/// Token of a [`ClhLock`]: the caller's queue node.
pub struct ClhToken {
    node: *mut ClhNode,
}

// Safety: releasing only stores into the heap node, which may happen from any
// thread (`RwLock` lets the last reader release the first reader's token).
unsafe impl Send for ClhToken {}

impl ClhLock {
    pub fn new() -> Self {
        ClhLock {
            tail: CachePadded::new(AtomicPtr::new(ClhNode::new_boxed(false))),
        }
    }
}

impl Default for ClhLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for ClhLock {
    type Token = ClhToken;

    fn lock(&self) -> ClhToken {
        let node = ClhNode::new_boxed(true);
        let pred = self.tail.swap(node, Ordering::AcqRel);

        let backoff = Backoff::new();
        while unsafe { (*pred).locked.load(Ordering::Acquire) } {
            backoff.snooze();
        }

        // The predecessor's owner never touches its node after unlocking,
        // and nobody else can reach it anymore.
        //
        unsafe { drop(Box::from_raw(pred)) };

        ClhToken { node }
    }

    unsafe fn unlock(&self, token: ClhToken) {
        unsafe { (*token.node).locked.store(false, Ordering::Release) };
    }
}

impl Drop for ClhLock {
    fn drop(&mut self) {
        // With no holder left the tail is the only node still allocated.
        //
        let tail = std::mem::replace(self.tail.get_mut(), ptr::null_mut());
        if !tail.is_null() {
            unsafe { drop(Box::from_raw(tail)) };
        }
    }
}

// Safety: all shared state is reached through atomics.
unsafe impl Send for ClhLock {}
unsafe impl Sync for ClhLock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock_reuses_queue() {
        let lock = ClhLock::new();

        for _ in 0..100 {
            let token = lock.lock();
            unsafe { lock.unlock(token) };
        }
    }

    #[test]
    fn test_drop_while_never_locked() {
        let _lock = ClhLock::default();
    }
}
