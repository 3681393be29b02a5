use crossbeam::utils::Backoff;

use super::node::{DUMMY_COUNT, MARKED_ANCESTORS, Node, ROOT_HOLDER};
use crate::data_structures::internal::{NIL, SegmentedArena};

/// Signal that the current attempt met a busy flag or a foreign marker and
/// has to start over from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Conflict;

pub(super) type Attempt<T> = Result<T, Conflict>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Side {
    Left,
    Right,
}

impl Side {
    #[inline]
    pub(super) fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

// =============================================================================
// OwnedNodes
// =============================================================================

/// Flags and markers held by one attempt of one operation.
///
/// Everything recorded here is released when the value drops, which is how
/// an aborted attempt gives its claims back before restarting.
///
pub(super) struct OwnedNodes<'a, K, V> {
    nodes: &'a SegmentedArena<Node<K, V>>,
    id: usize,
    flags: Vec<u32>,
    markers: Vec<u32>,
}

impl<'a, K, V> OwnedNodes<'a, K, V> {
    pub(super) fn new(nodes: &'a SegmentedArena<Node<K, V>>, id: usize) -> Self {
        OwnedNodes {
            nodes,
            id,
            flags: Vec::with_capacity(16),
            markers: Vec::with_capacity(MARKED_ANCESTORS),
        }
    }

    #[inline]
    pub(super) fn holds(&self, index: u32) -> bool {
        self.flags.contains(&index)
    }

    /// Waits for the flag of `index`, giving up after `spin_limit` failed
    /// attempts. Only used to move downwards from nodes already held.
    ///
    pub(super) fn acquire(&mut self, index: u32, spin_limit: u32) -> Attempt<()> {
        let node = self.nodes.get(index);
        let backoff = Backoff::new();
        let mut failures = 0u32;

        while !node.try_flag() {
            failures += 1;
            if failures >= spin_limit {
                return Err(Conflict);
            }
            backoff.snooze();
        }

        self.flags.push(index);
        Ok(())
    }

    /// Takes the flag of `index` only if it is free and not reserved by
    /// another operation.
    ///
    pub(super) fn try_claim(&mut self, index: u32) -> Attempt<()> {
        let node = self.nodes.get(index);
        if !node.try_flag() {
            return Err(Conflict);
        }

        if node.marked_by_other(self.id) {
            node.unflag();
            return Err(Conflict);
        }

        self.flags.push(index);
        Ok(())
    }

    pub(super) fn release(&mut self, index: u32) {
        if let Some(pos) = self.flags.iter().position(|&held| held == index) {
            self.flags.swap_remove(pos);
            self.nodes.get(index).unflag();
        }
    }

    /// Fails if a node this attempt already holds was reserved by another
    /// operation before we got it.
    ///
    pub(super) fn check_marker(&self, index: u32) -> Attempt<()> {
        if self.nodes.get(index).marked_by_other(self.id) {
            Err(Conflict)
        } else {
            Ok(())
        }
    }

    /// Reserves `index` for this operation and returns its parent.
    ///
    /// The marker is written under the node's flag, so a concurrent claimer
    /// either sees it or made us fail to get the flag.
    ///
    pub(super) fn mark(&mut self, index: u32) -> Attempt<u32> {
        let node = self.nodes.get(index);

        if self.holds(index) {
            self.check_marker(index)?;
            node.set_marker(self.id);
            self.markers.push(index);
            return Ok(node.parent());
        }

        if !node.try_flag() {
            return Err(Conflict);
        }

        if node.marked_by_other(self.id) {
            node.unflag();
            return Err(Conflict);
        }

        node.set_marker(self.id);
        let parent = node.parent();
        node.unflag();

        self.markers.push(index);
        Ok(parent)
    }
}

impl<K, V> Drop for OwnedNodes<'_, K, V> {
    fn drop(&mut self) {
        for &index in &self.markers {
            let node = self.nodes.get(index);
            if node.marker() == self.id {
                node.set_marker(0);
            }
        }

        for &index in &self.flags {
            self.nodes.get(index).unflag();
        }
    }
}

// =============================================================================
// LocalArea
// =============================================================================

// Copy of one owned node. The fixups run against these copies; nothing
// reaches the shared nodes before `commit`.
//
#[derive(Debug, Clone, Copy)]
struct LocalNode {
    index: u32,
    left: u32,
    right: u32,
    parent: u32,
    red: bool,
    parent_before: u32,
    dirty: bool,
}

/// Private working copy of the part of the tree an insert or remove
/// rewrites.
///
/// ```text
///   setup:   every node the fixup reads is claimed on first touch
///            (try only, a busy node aborts the attempt)
///            fixup runs on the local copies
///            MARKED_ANCESTORS nodes above the area get our marker
///   commit:  dirty copies are written back, then everything is released
/// ```
///
/// Because nothing is written before the whole area is owned, an abort at
/// any point during setup leaves the tree untouched.
///
pub(super) struct LocalArea<'a, K, V> {
    owned: OwnedNodes<'a, K, V>,
    local: Vec<LocalNode>,
}

impl<'a, K, V> LocalArea<'a, K, V> {
    pub(super) fn new(owned: OwnedNodes<'a, K, V>) -> Self {
        LocalArea {
            owned,
            local: Vec::with_capacity(16),
        }
    }

    /// Adds a node that is not linked into the tree yet. It needs no flag:
    /// nobody can reach it before the commit publishes it.
    ///
    pub(super) fn adopt_fresh(&mut self, index: u32) {
        self.snapshot(index);
    }

    fn snapshot(&mut self, index: u32) -> usize {
        let node = self.owned.nodes.get(index);
        let parent = node.parent();

        self.local.push(LocalNode {
            index,
            left: node.left(),
            right: node.right(),
            parent,
            red: node.is_red(),
            parent_before: parent,
            dirty: false,
        });

        self.local.len() - 1
    }

    // Position of `index` in the local copies, claiming it first if needed.
    //
    fn slot(&mut self, index: u32) -> Attempt<usize> {
        if index == NIL {
            panic!("followed a nil link inside the local area");
        }

        if let Some(pos) = self.local.iter().position(|n| n.index == index) {
            return Ok(pos);
        }

        if self.owned.holds(index) {
            self.owned.check_marker(index)?;
        } else {
            self.owned.try_claim(index)?;
        }

        Ok(self.snapshot(index))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub(super) fn parent(&mut self, index: u32) -> Attempt<u32> {
        let slot = self.slot(index)?;
        Ok(self.local[slot].parent)
    }

    pub(super) fn child(&mut self, index: u32, side: Side) -> Attempt<u32> {
        let slot = self.slot(index)?;
        Ok(match side {
            Side::Left => self.local[slot].left,
            Side::Right => self.local[slot].right,
        })
    }

    pub(super) fn is_red(&mut self, index: u32) -> Attempt<bool> {
        let slot = self.slot(index)?;
        Ok(self.local[slot].red)
    }

    pub(super) fn set_parent(&mut self, index: u32, parent: u32) -> Attempt<()> {
        let slot = self.slot(index)?;
        self.local[slot].parent = parent;
        self.local[slot].dirty = true;
        Ok(())
    }

    pub(super) fn set_child(&mut self, index: u32, side: Side, child: u32) -> Attempt<()> {
        let slot = self.slot(index)?;
        match side {
            Side::Left => self.local[slot].left = child,
            Side::Right => self.local[slot].right = child,
        }
        self.local[slot].dirty = true;
        Ok(())
    }

    pub(super) fn set_red(&mut self, index: u32, red: bool) -> Attempt<()> {
        let slot = self.slot(index)?;
        self.local[slot].red = red;
        self.local[slot].dirty = true;
        Ok(())
    }

    /// Which child of `parent` is `child`.
    pub(super) fn side_of(&mut self, parent: u32, child: u32) -> Attempt<Side> {
        if self.child(parent, Side::Left)? == child {
            Ok(Side::Left)
        } else if self.child(parent, Side::Right)? == child {
            Ok(Side::Right)
        } else {
            panic!("node {child} is not a child of {parent}");
        }
    }

    pub(super) fn replace_child(&mut self, parent: u32, old: u32, new: u32) -> Attempt<()> {
        let side = self.side_of(parent, old)?;
        self.set_child(parent, side, new)?;
        self.set_parent(new, parent)
    }

    #[inline]
    fn is_root(&mut self, index: u32) -> Attempt<bool> {
        Ok(self.parent(index)? == ROOT_HOLDER)
    }

    // Dummies are always black, so their color is known without a claim.
    //
    #[inline]
    fn is_dummy(index: u32) -> bool {
        (index as usize) < DUMMY_COUNT
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Moves `top` down to `side`; its child on the other side takes its
    /// place.
    ///
    /// ```text
    ///   rotate(a, Left):
    ///
    ///        a                b
    ///       / \              / \
    ///      α   b     ==>    a   γ
    ///         / \          / \
    ///        β   γ        α   β
    /// ```
    ///
    pub(super) fn rotate(&mut self, top: u32, side: Side) -> Attempt<()> {
        let pivot = self.child(top, side.flip())?;
        let inner = self.child(pivot, side)?;
        let above = self.parent(top)?;

        self.set_child(top, side.flip(), inner)?;
        self.set_parent(inner, top)?;

        self.replace_child(above, top, pivot)?;

        self.set_child(pivot, side, top)?;
        self.set_parent(top, pivot)
    }

    // =========================================================================
    // Fixups (CLRS, with mirrored cases folded through `Side`)
    // =========================================================================

    /// Restores the red-black properties after `x` turned into a red
    /// internal node.
    ///
    pub(super) fn insert_fixup(&mut self, mut x: u32) -> Attempt<()> {
        loop {
            let p = self.parent(x)?;
            if Self::is_dummy(p) || !self.is_red(p)? {
                break;
            }

            // A red node is never the root, so the grandparent is real.
            //
            let g = self.parent(p)?;
            let side = self.side_of(g, p)?;
            let uncle = self.child(g, side.flip())?;

            if self.is_red(uncle)? {
                self.set_red(p, false)?;
                self.set_red(uncle, false)?;
                self.set_red(g, true)?;
                x = g;
                continue;
            }

            if self.side_of(p, x)? == side.flip() {
                x = p;
                self.rotate(x, side)?;
            }

            let p = self.parent(x)?;
            let g = self.parent(p)?;
            self.set_red(p, false)?;
            self.set_red(g, true)?;
            self.rotate(g, side.flip())?;
        }

        if self.is_root(x)? {
            self.set_red(x, false)?;
        }

        Ok(())
    }

    /// Restores black heights after a black node was spliced out and `x`
    /// took its place.
    ///
    pub(super) fn delete_fixup(&mut self, mut x: u32) -> Attempt<()> {
        while !self.is_root(x)? && !self.is_red(x)? {
            let p = self.parent(x)?;
            let side = self.side_of(p, x)?;
            let mut w = self.child(p, side.flip())?;

            if self.is_red(w)? {
                self.set_red(w, false)?;
                self.set_red(p, true)?;
                self.rotate(p, side)?;
                w = self.child(p, side.flip())?;
            }

            let near = self.child(w, side)?;
            let far = self.child(w, side.flip())?;

            if !self.is_red(near)? && !self.is_red(far)? {
                self.set_red(w, true)?;
                x = p;
                continue;
            }

            if !self.is_red(far)? {
                self.set_red(near, false)?;
                self.set_red(w, true)?;
                self.rotate(w, side.flip())?;
                w = self.child(p, side.flip())?;
            }

            let p_red = self.is_red(p)?;
            let far = self.child(w, side.flip())?;
            self.set_red(w, p_red)?;
            self.set_red(p, false)?;
            self.set_red(far, false)?;
            self.rotate(p, side)?;

            // Balanced; the new subtree root keeps the old color of `p`.
            //
            return Ok(());
        }

        self.set_red(x, false)
    }

    // =========================================================================
    // Markers and commit
    // =========================================================================

    /// Marks up to `MARKED_ANCESTORS` nodes above the area that contains
    /// `anchor`.
    ///
    pub(super) fn mark_ancestors(&mut self, anchor: u32) -> Attempt<()> {
        let mut top = self.slot(anchor)?;

        loop {
            let above = self.local[top].parent_before;
            match self.local.iter().position(|n| n.index == above) {
                Some(pos) => top = pos,
                None => break,
            }
        }

        let mut next = self.local[top].parent_before;
        for _ in 0..MARKED_ANCESTORS {
            if next == NIL {
                break;
            }
            next = self.owned.mark(next)?;
        }

        Ok(())
    }

    /// Writes every changed copy back. Flags and markers stay held until the
    /// area drops.
    ///
    pub(super) fn commit(&self) {
        for copy in self.local.iter().filter(|n| n.dirty) {
            self.owned
                .nodes
                .get(copy.index)
                .set_links(copy.left, copy.right, copy.parent, copy.red);
        }
    }
}
