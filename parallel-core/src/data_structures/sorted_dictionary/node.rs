use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::data_structures::internal::NIL;

/// Number of permanent ancestors above the root.
pub const DUMMY_COUNT: usize = 5;

/// Ancestors marked above the claimed area of a structural change.
pub const MARKED_ANCESTORS: usize = 4;

/// The last dummy. Its left child is the root.
pub(super) const ROOT_HOLDER: u32 = (DUMMY_COUNT - 1) as u32;

// Tree node stored in the arena.
//
// Links and color are atomics so that a stale reader never tears a value, but
// they only change while `flag` is held. `entry` is read and written only
// under `flag`.
//
//   internal node:  entry = Some((k, v)), left/right = children
//   leaf:           entry = None,         left = right = NIL
//   dummy:          entry = None,         left = next dummy (or root)
//
pub(super) struct Node<K, V> {
    entry: UnsafeCell<Option<(K, V)>>,
    pub(super) left: AtomicU32,
    pub(super) right: AtomicU32,
    pub(super) parent: AtomicU32,
    red: AtomicBool,
    flag: AtomicBool,
    marker: AtomicUsize,
}

impl<K, V> Default for Node<K, V> {
    fn default() -> Self {
        Node {
            entry: UnsafeCell::new(None),
            left: AtomicU32::new(NIL),
            right: AtomicU32::new(NIL),
            parent: AtomicU32::new(NIL),
            red: AtomicBool::new(false),
            flag: AtomicBool::new(false),
            marker: AtomicUsize::new(0),
        }
    }
}

impl<K, V> Node<K, V> {
    // =========================================================================
    // Flag
    // =========================================================================

    #[inline]
    pub(super) fn try_flag(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub(super) fn unflag(&self) {
        self.flag.store(false, Ordering::Release);
    }

    #[inline]
    pub(super) fn is_flagged(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    // =========================================================================
    // Marker (operation id, 0 = unmarked). Written only under `flag`.
    // =========================================================================

    #[inline]
    pub(super) fn marker(&self) -> usize {
        self.marker.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn set_marker(&self, owner: usize) {
        self.marker.store(owner, Ordering::Release);
    }

    /// True if another operation reserved this node.
    #[inline]
    pub(super) fn marked_by_other(&self, owner: usize) -> bool {
        let marker = self.marker();
        marker != 0 && marker != owner
    }

    // =========================================================================
    // Links and color
    // =========================================================================

    #[inline]
    pub(super) fn left(&self) -> u32 {
        self.left.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn right(&self) -> u32 {
        self.right.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn parent(&self) -> u32 {
        self.parent.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn is_red(&self) -> bool {
        self.red.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn set_links(&self, left: u32, right: u32, parent: u32, red: bool) {
        self.left.store(left, Ordering::Release);
        self.right.store(right, Ordering::Release);
        self.parent.store(parent, Ordering::Release);
        self.red.store(red, Ordering::Release);
    }

    #[inline]
    pub(super) fn is_leaf(&self) -> bool {
        self.left() == NIL
    }

    // =========================================================================
    // Entry. Every accessor requires the caller to hold `flag`.
    // =========================================================================

    #[inline]
    pub(super) unsafe fn entry(&self) -> Option<&(K, V)> {
        unsafe { (*self.entry.get()).as_ref() }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(super) unsafe fn entry_mut(&self) -> &mut Option<(K, V)> {
        unsafe { &mut *self.entry.get() }
    }

    /// Key of an internal node.
    ///
    /// # Safety
    ///
    /// The caller holds `flag`.
    ///
    #[inline]
    pub(super) unsafe fn key(&self) -> &K {
        match unsafe { self.entry() } {
            Some((key, _)) => key,
            None => panic!("internal node without an entry"),
        }
    }

    /// Resets a node that was unlinked from the tree. Drops its entry.
    ///
    /// # Safety
    ///
    /// The caller holds `flag` and the node is no longer reachable.
    ///
    pub(super) unsafe fn reset(&self) {
        unsafe { *self.entry_mut() = None };
        self.set_links(NIL, NIL, NIL, false);
        self.marker.store(0, Ordering::Release);
    }
}
