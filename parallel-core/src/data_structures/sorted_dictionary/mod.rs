mod area;
mod node;
mod options;
mod verify;

use std::cmp::Ordering as KeyOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::utils::Backoff;
use rand::Rng;
use tracing::debug;

use self::area::{Attempt, Conflict, LocalArea, OwnedNodes, Side};
use self::node::{Node, ROOT_HOLDER};
use crate::data_structures::internal::{NIL, SegmentedArena};

pub use self::node::{DUMMY_COUNT, MARKED_ANCESTORS};
pub use self::options::SortedDictionaryOptions;
pub use self::verify::{InvariantViolation, TreeShape};

///
/// Concurrent ordered map: a red-black tree with per-node busy flags.
///
/// ```text
///   [d0] ─► [d1] ─► [d2] ─► [d3] ─► [d4 = root holder]
///                                        │ left
///                                        ▼
///                                      (root)
///                                     /      \
///                                  ...        ...
///                                 /   \
///                             [leaf] [leaf]
/// ```
///
/// Five black dummies sit above the root so that every node has at least
/// four ancestors to mark. Leaves are real nodes without an entry; an insert
/// turns a leaf into a red internal node with two fresh leaves.
///
/// # Protocol
///
/// - A node's links and entry only change while its flag is held.
/// - Descents are flag-coupled: the child is flagged before the parent is
///   released, so nothing can be rotated away under a descending thread.
///   Waiting only ever happens downwards, which rules out deadlock.
/// - A writer then claims every node its fixup will touch, computing the
///   fixup on private copies (see `LocalArea`), and marks up to four
///   ancestors above that area. A busy flag or a foreign marker aborts the
///   attempt: everything is released, the thread sleeps a short random time
///   and starts over from the root.
/// - Only once the whole area is owned are the copies written back.
///
/// Nodes live in an index arena. Removed nodes are recycled through a free
/// list; every reference to a node is taken under the flag of a linked
/// neighbor, so a recycled index is never reached through a stale link.
///
pub struct SortedDictionary<K, V> {
    nodes: SegmentedArena<Node<K, V>>,
    compare: fn(&K, &K) -> KeyOrdering,
    len: AtomicUsize,
    next_op: AtomicUsize,
    options: SortedDictionaryOptions,
}

// Safety: entries are only reached under node flags. Values are moved in and
// dropped by whichever thread performs the operation, and cloned out through
// shared references.
unsafe impl<K: Send, V: Send> Send for SortedDictionary<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for SortedDictionary<K, V> {}

// Result of a successful insert setup.
enum InsertPlan<'a, K, V> {
    Replace {
        owned: OwnedNodes<'a, K, V>,
        node: u32,
    },
    Attach {
        area: LocalArea<'a, K, V>,
        leaf: u32,
    },
}

// Result of a successful remove setup. `successor` is the node spliced out;
// it differs from `target` when the target had two internal children.
struct RemovePlan<'a, K, V> {
    area: LocalArea<'a, K, V>,
    target: u32,
    successor: u32,
    discarded_leaf: u32,
}

// Where a descent stopped. Both nodes are flagged by the caller's
// `OwnedNodes`.
struct Position {
    parent: u32,
    node: u32,
    found: bool,
}

impl<K: Ord, V> SortedDictionary<K, V> {
    pub fn new() -> Self {
        Self::with_comparator(K::cmp)
    }

    pub fn with_options(options: SortedDictionaryOptions) -> Self {
        Self::with_comparator_and_options(K::cmp, options)
    }
}

impl<K, V> SortedDictionary<K, V> {
    /// Orders keys by `compare` instead of `Ord`.
    ///
    pub fn with_comparator(compare: fn(&K, &K) -> KeyOrdering) -> Self {
        Self::with_comparator_and_options(compare, SortedDictionaryOptions::default())
    }

    pub fn with_comparator_and_options(
        compare: fn(&K, &K) -> KeyOrdering,
        options: SortedDictionaryOptions,
    ) -> Self {
        let nodes: SegmentedArena<Node<K, V>> = SegmentedArena::new();

        for _ in 0..DUMMY_COUNT {
            nodes.alloc();
        }
        let root = nodes.alloc();

        for dummy in 0..ROOT_HOLDER {
            let parent = if dummy == 0 { NIL } else { dummy - 1 };
            nodes.get(dummy).set_links(dummy + 1, NIL, parent, false);
        }
        nodes.get(ROOT_HOLDER).set_links(root, NIL, ROOT_HOLDER - 1, false);
        nodes.get(root).set_links(NIL, NIL, ROOT_HOLDER, false);

        SortedDictionary {
            nodes,
            compare,
            len: AtomicUsize::new(0),
            next_op: AtomicUsize::new(1),
            options,
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts `key`, or overwrites the value of an existing equal key.
    /// Returns the previous value in that case.
    ///
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let id = self.next_op.fetch_add(1, Ordering::Relaxed);
        let fresh = (self.alloc_leaf(), self.alloc_leaf());

        let mut attempt = 0u32;
        let plan = loop {
            match self.plan_insert(id, &key, fresh) {
                Ok(plan) => break plan,
                Err(Conflict) => {
                    self.pause_before_restart(id, attempt);
                    attempt += 1;
                }
            }
        };

        match plan {
            InsertPlan::Replace { owned, node } => {
                let previous = match unsafe { self.node(node).entry_mut() } {
                    Some((_, current)) => std::mem::replace(current, value),
                    None => panic!("matched node {node} has no entry"),
                };
                drop(owned);

                self.nodes.release(fresh.0);
                self.nodes.release(fresh.1);
                Some(previous)
            }
            InsertPlan::Attach { area, leaf } => {
                area.commit();
                unsafe { *self.node(leaf).entry_mut() = Some((key, value)) };
                drop(area);

                self.len.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn plan_insert<'a>(&'a self, id: usize, key: &K, fresh: (u32, u32)) -> Attempt<InsertPlan<'a, K, V>> {
        let mut owned = OwnedNodes::new(&self.nodes, id);
        let position = self.descend(&mut owned, key)?;

        if position.found {
            return Ok(InsertPlan::Replace {
                owned,
                node: position.node,
            });
        }

        let leaf = position.node;
        let mut area = LocalArea::new(owned);
        area.adopt_fresh(fresh.0);
        area.adopt_fresh(fresh.1);

        area.set_child(leaf, Side::Left, fresh.0)?;
        area.set_child(leaf, Side::Right, fresh.1)?;
        area.set_parent(fresh.0, leaf)?;
        area.set_parent(fresh.1, leaf)?;
        area.set_red(leaf, true)?;

        area.insert_fixup(leaf)?;
        area.mark_ancestors(leaf)?;

        Ok(InsertPlan::Attach { area, leaf })
    }

    fn alloc_leaf(&self) -> u32 {
        let index = self.nodes.alloc();
        self.node(index).set_links(NIL, NIL, NIL, false);
        index
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes `key`. Returns false if it was not present.
    ///
    pub fn remove(&self, key: &K) -> bool {
        let id = self.next_op.fetch_add(1, Ordering::Relaxed);

        let mut attempt = 0u32;
        let plan = loop {
            match self.plan_remove(id, key) {
                Ok(Some(plan)) => break plan,
                Ok(None) => return false,
                Err(Conflict) => {
                    self.pause_before_restart(id, attempt);
                    attempt += 1;
                }
            }
        };

        let RemovePlan {
            area,
            target,
            successor,
            discarded_leaf,
        } = plan;

        area.commit();

        unsafe {
            if successor != target {
                let moved = self.node(successor).entry_mut().take();
                *self.node(target).entry_mut() = moved;
            }
            self.node(successor).reset();
            self.node(discarded_leaf).reset();
        }
        drop(area);

        self.nodes.release(successor);
        self.nodes.release(discarded_leaf);
        self.len.fetch_sub(1, Ordering::Relaxed);

        true
    }

    fn plan_remove<'a>(&'a self, id: usize, key: &K) -> Attempt<Option<RemovePlan<'a, K, V>>> {
        let limit = self.options.descent_spin_limit;
        let mut owned = OwnedNodes::new(&self.nodes, id);
        let position = self.descend(&mut owned, key)?;

        if !position.found {
            return Ok(None);
        }

        let target = position.node;
        let left = self.node(target).left();
        let right = self.node(target).right();
        owned.acquire(left, limit)?;
        owned.acquire(right, limit)?;

        // successor: node spliced out, above: its parent, survivor: the child
        // that takes its place.
        //
        let (successor, above, survivor, discarded_leaf) = if self.node(left).is_leaf() {
            (target, position.parent, right, left)
        } else if self.node(right).is_leaf() {
            (target, position.parent, left, right)
        } else {
            owned.release(left);
            owned.release(position.parent);

            let mut above = target;
            let mut current = right;
            loop {
                let next = self.node(current).left();
                owned.acquire(next, limit)?;

                if self.node(next).is_leaf() {
                    let survivor = self.node(current).right();
                    owned.acquire(survivor, limit)?;
                    break (current, above, survivor, next);
                }

                if above != target {
                    owned.release(above);
                }
                above = current;
                current = next;
            }
        };

        let successor_red = self.node(successor).is_red();
        let mut area = LocalArea::new(owned);

        area.replace_child(above, successor, survivor)?;
        if !successor_red {
            area.delete_fixup(survivor)?;
        }
        area.mark_ancestors(above)?;

        Ok(Some(RemovePlan {
            area,
            target,
            successor,
            discarded_leaf,
        }))
    }

    // =========================================================================
    // Descent and restart
    // =========================================================================

    // Flag-coupled descent from the root holder. Stops at the node holding
    // `key` or at the leaf where it would go; that node and its parent stay
    // flagged in `owned`.
    //
    fn descend(&self, owned: &mut OwnedNodes<'_, K, V>, key: &K) -> Attempt<Position> {
        let limit = self.options.descent_spin_limit;

        owned.acquire(ROOT_HOLDER, limit)?;
        let mut parent = ROOT_HOLDER;
        let mut current = self.node(ROOT_HOLDER).left();
        owned.acquire(current, limit)?;

        loop {
            let node = self.node(current);
            if node.is_leaf() {
                return Ok(Position {
                    parent,
                    node: current,
                    found: false,
                });
            }

            let next = match (self.compare)(key, unsafe { node.key() }) {
                KeyOrdering::Equal => {
                    return Ok(Position {
                        parent,
                        node: current,
                        found: true,
                    });
                }
                KeyOrdering::Less => node.left(),
                KeyOrdering::Greater => node.right(),
            };

            owned.acquire(next, limit)?;
            owned.release(parent);
            parent = current;
            current = next;
        }
    }

    fn pause_before_restart(&self, id: usize, attempt: u32) {
        debug!(op = id, attempt, "tree operation restarting");

        let max = self.options.restart_delay_max.as_nanos() as u64;
        if max == 0 {
            thread::yield_now();
            return;
        }

        let nanos = rand::rng().random_range(0..=max);
        thread::sleep(Duration::from_nanos(nanos));
    }

    #[inline]
    fn node(&self, index: u32) -> &Node<K, V> {
        self.nodes.get(index)
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// True if `key` is present.
    ///
    pub fn contains_key(&self, key: &K) -> bool {
        self.lookup(key, |_| ()).is_some()
    }

    // Read-only descent: at most two flags held at any time, and no give up.
    //
    fn lookup<R>(&self, key: &K, read: impl FnOnce(&V) -> R) -> Option<R> {
        let holder = HeldFlag::acquire(self.node(ROOT_HOLDER));
        let mut current = HeldFlag::acquire(self.node(holder.node.left()));
        drop(holder);

        loop {
            let node = current.node;
            if node.is_leaf() {
                return None;
            }

            let (node_key, value) = match unsafe { node.entry() } {
                Some((k, v)) => (k, v),
                None => panic!("internal node without an entry"),
            };

            let next = match (self.compare)(key, node_key) {
                KeyOrdering::Equal => return Some(read(value)),
                KeyOrdering::Less => node.left(),
                KeyOrdering::Greater => node.right(),
            };

            current = HeldFlag::acquire(self.node(next));
        }
    }

    /// Calls `visit` for every entry in ascending key order.
    ///
    /// Holds the flags of the whole path from the root to the current node,
    /// so writers below or at that path wait. Concurrent writers elsewhere
    /// may or may not be observed; the keys seen are still strictly
    /// ascending.
    ///
    pub fn inorder(&self, mut visit: impl FnMut(&K, &V)) {
        let holder = HeldFlag::acquire(self.node(ROOT_HOLDER));
        let root = HeldFlag::acquire(self.node(holder.node.left()));
        drop(holder);

        self.visit_subtree(root.node, &mut visit);
    }

    fn visit_subtree<F: FnMut(&K, &V)>(&self, node: &Node<K, V>, visit: &mut F) {
        if node.is_leaf() {
            return;
        }

        {
            let left = HeldFlag::acquire(self.node(node.left()));
            self.visit_subtree(left.node, visit);
        }

        if let Some((key, value)) = unsafe { node.entry() } {
            visit(key, value);
        }

        let right = HeldFlag::acquire(self.node(node.right()));
        self.visit_subtree(right.node, visit);
    }
}

impl<K, V: Clone> SortedDictionary<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.lookup(key, V::clone)
    }
}

impl<K: Clone, V: Clone> SortedDictionary<K, V> {
    /// Entries in ascending key order.
    ///
    pub fn to_vec(&self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        self.inorder(|key, value| entries.push((key.clone(), value.clone())));
        entries
    }
}

impl<K: Ord, V> Default for SortedDictionary<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// Flag held by a reader, released on drop (also when a visitor panics).
//
struct HeldFlag<'a, K, V> {
    node: &'a Node<K, V>,
}

impl<'a, K, V> HeldFlag<'a, K, V> {
    fn acquire(node: &'a Node<K, V>) -> Self {
        let backoff = Backoff::new();
        while !node.try_flag() {
            backoff.snooze();
        }
        HeldFlag { node }
    }
}

impl<K, V> Drop for HeldFlag<'_, K, V> {
    fn drop(&mut self) {
        self.node.unflag();
    }
}
