use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use log::{debug, trace, warn};

use crate::error::{RBError, RBResult};
use crate::node::{Color, Entry, Handle, Link, NIL, Node, NodeId, Slot};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

fn next_tree_id() -> u64 {
    NEXT_TREE_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Red-black tree over an arena of nodes.
///
/// Every absent child, and the parent of the root, is the shared sentinel
/// `NIL`. The sentinel is always black, so color reads never need a
/// presence check. Equal keys are accepted and placed to the right of
/// their peers.
#[derive(Debug)]
pub struct RBTree<K> {
    root: NodeId,
    nil: Link,
    slots: Vec<Slot<K>>,
    free_head: NodeId,
    len: usize,
    id: u64,
}

impl<K> Default for RBTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> Clone for RBTree<K> {
    /// The clone gets its own identity: handles from `self` are foreign to it.
    fn clone(&self) -> Self {
        Self {
            root: self.root,
            nil: self.nil,
            slots: self.slots.clone(),
            free_head: self.free_head,
            len: self.len,
            id: next_tree_id(),
        }
    }
}

impl<K> RBTree<K> {
    pub fn new() -> Self {
        Self {
            root: NIL,
            nil: Link::SENTINEL,
            slots: Vec::new(),
            free_head: NIL,
            len: 0,
            id: next_tree_id(),
        }
    }

    /// Creates an empty tree with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> RBResult<Self> {
        let mut tree = Self::new();
        tree.slots.try_reserve(capacity)?;
        debug!("tree {}: reserved {} node slots", tree.id, capacity);
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    pub fn root(&self) -> Option<Handle> {
        (self.root != NIL).then(|| self.handle(self.root))
    }

    /// Key stored at `handle`, or `None` if the handle does not resolve.
    pub fn key(&self, handle: Handle) -> Option<&K> {
        let id = self.resolve(handle).ok()?;
        Some(&self.node(id).key)
    }

    pub fn color(&self, handle: Handle) -> Option<Color> {
        let id = self.resolve(handle).ok()?;
        Some(self.color_of(id))
    }

    pub fn contains_handle(&self, handle: Handle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Leftmost node.
    pub fn min(&self) -> Option<Handle> {
        if self.root == NIL {
            return None;
        }
        Some(self.handle(self.subtree_min(self.root)))
    }

    /// Rightmost node.
    pub fn max(&self) -> Option<Handle> {
        if self.root == NIL {
            return None;
        }
        Some(self.handle(self.subtree_max(self.root)))
    }

    /// Removes the node behind `handle` and returns its key.
    ///
    /// A node with two children is replaced by its in-order successor, which
    /// is moved (not copied) so handles to the successor stay valid. Only the
    /// erased node's slot is released.
    pub fn erase(&mut self, handle: Handle) -> RBResult<K> {
        let z = match self.resolve(handle) {
            Ok(id) => id,
            Err(e) => {
                warn!("tree {}: erase rejected {:?}: {}", self.id, handle, e);
                return Err(e);
            }
        };

        let mut victim_color = self.color_of(z);
        let x;

        if self.left(z) == NIL {
            x = self.right(z);
            self.transplant(z, x);
        } else if self.right(z) == NIL {
            x = self.left(z);
            self.transplant(z, x);
        } else {
            let y = self.subtree_min(self.right(z));
            victim_color = self.color_of(y);
            x = self.right(y);

            if self.parent(y) == z {
                // x may be the sentinel; the fixup climbs from its parent link.
                self.link_mut(x).parent = y;
            } else {
                self.transplant(y, x);
                let z_right = self.right(z);
                self.link_mut(y).right = z_right;
                self.link_mut(z_right).parent = y;
            }

            self.transplant(z, y);
            let z_left = self.left(z);
            self.link_mut(y).left = z_left;
            self.link_mut(z_left).parent = y;
            let z_color = self.color_of(z);
            self.set_color(y, z_color);
        }

        trace!(
            "tree {}: erase node {} (victim {:?}, replacement {})",
            self.id, z, victim_color, x
        );

        if victim_color == Color::Black {
            self.erase_fixup(x);
        }

        Ok(self.release(z))
    }

    /// Releases every node in post-order and returns how many were released.
    /// The tree stays usable; all outstanding handles become stale.
    pub fn clear(&mut self) -> usize {
        let mut released = 0;
        let mut stack: Vec<(NodeId, bool)> = Vec::new();
        if self.root != NIL {
            stack.push((self.root, false));
        }

        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                drop(self.release(id));
                released += 1;
                continue;
            }
            stack.push((id, true));
            let (left, right) = (self.left(id), self.right(id));
            if right != NIL {
                stack.push((right, false));
            }
            if left != NIL {
                stack.push((left, false));
            }
        }

        self.root = NIL;
        self.nil = Link::SENTINEL;
        debug!("tree {}: cleared {} nodes", self.id, released);
        released
    }

    /// Up to `limit` keys in ascending order.
    pub fn to_sorted_vec(&self, limit: usize) -> Vec<K>
    where
        K: Clone,
    {
        let mut out = Vec::with_capacity(limit.min(self.len));
        self.walk_in_order(limit, |key| out.push(key.clone()));
        out
    }

    /// Fills `out` with the smallest keys in ascending order and returns how
    /// many were written.
    pub fn fill_sorted(&self, out: &mut [K]) -> usize
    where
        K: Clone,
    {
        let mut written = 0;
        let limit = out.len();
        self.walk_in_order(limit, |key| {
            out[written] = key.clone();
            written += 1;
        });
        written
    }

    pub(crate) fn walk_in_order<'a, F: FnMut(&'a K)>(&'a self, limit: usize, mut visit: F) {
        let mut stack: Vec<NodeId> = Vec::new();
        let mut current = self.root;
        let mut visited = 0;

        while visited < limit {
            while current != NIL {
                stack.push(current);
                current = self.left(current);
            }
            let Some(id) = stack.pop() else { break };
            visit(&self.node(id).key);
            visited += 1;
            current = self.right(id);
        }
    }

    // Arena access

    pub(crate) fn link(&self, id: NodeId) -> &Link {
        if id == NIL {
            return &self.nil;
        }
        &self.node(id).link
    }

    fn link_mut(&mut self, id: NodeId) -> &mut Link {
        if id == NIL {
            return &mut self.nil;
        }
        match &mut self.slots[id as usize].entry {
            Entry::Occupied(node) => &mut node.link,
            Entry::Vacant { .. } => unreachable!("node {} is linked but vacant", id),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node<K> {
        match &self.slots[id as usize].entry {
            Entry::Occupied(node) => node,
            Entry::Vacant { .. } => unreachable!("node {} is linked but vacant", id),
        }
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn left(&self, id: NodeId) -> NodeId {
        self.link(id).left
    }

    #[inline]
    pub(crate) fn right(&self, id: NodeId) -> NodeId {
        self.link(id).right
    }

    #[inline]
    pub(crate) fn parent(&self, id: NodeId) -> NodeId {
        self.link(id).parent
    }

    #[inline]
    pub(crate) fn color_of(&self, id: NodeId) -> Color {
        self.link(id).color
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        debug_assert!(id != NIL || color == Color::Black, "sentinel must stay black");
        self.link_mut(id).color = color;
    }

    #[cfg(test)]
    pub(crate) fn corrupt_color(&mut self, id: NodeId, color: Color) {
        self.link_mut(id).color = color;
    }

    fn handle(&self, id: NodeId) -> Handle {
        Handle {
            index: id,
            generation: self.slots[id as usize].generation,
            tree: self.id,
        }
    }

    fn resolve(&self, handle: Handle) -> RBResult<NodeId> {
        if handle.tree != self.id {
            return Err(RBError::ForeignHandle);
        }
        match self.slots.get(handle.index as usize) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(_),
            }) if *generation == handle.generation => Ok(handle.index),
            _ => Err(RBError::StaleHandle),
        }
    }

    fn allocate(&mut self, key: K, parent: NodeId) -> RBResult<NodeId> {
        let node = Node {
            link: Link::fresh(parent),
            key,
        };

        if self.free_head != NIL {
            let id = self.free_head;
            let slot = &mut self.slots[id as usize];
            self.free_head = match slot.entry {
                Entry::Vacant { next_free } => next_free,
                Entry::Occupied(_) => unreachable!("free list points at live node {}", id),
            };
            slot.entry = Entry::Occupied(node);
            return Ok(id);
        }

        let id = self.slots.len();
        if id >= NIL as usize {
            return Err(RBError::TreeFull);
        }
        self.slots.try_reserve(1)?;
        self.slots.push(Slot {
            generation: 0,
            entry: Entry::Occupied(node),
        });
        Ok(id as NodeId)
    }

    fn release(&mut self, id: NodeId) -> K {
        let slot = &mut self.slots[id as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let entry = std::mem::replace(
            &mut slot.entry,
            Entry::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = id;
        self.len -= 1;
        match entry {
            Entry::Occupied(node) => node.key,
            Entry::Vacant { .. } => unreachable!("node {} released twice", id),
        }
    }

    fn subtree_min(&self, mut id: NodeId) -> NodeId {
        while self.left(id) != NIL {
            id = self.left(id);
        }
        id
    }

    fn subtree_max(&self, mut id: NodeId) -> NodeId {
        while self.right(id) != NIL {
            id = self.right(id);
        }
        id
    }

    // Structure

    fn left_rotate(&mut self, x: NodeId) {
        let y = self.right(x);
        let y_left = self.left(y);
        let x_parent = self.parent(x);

        self.link_mut(x).right = y_left;

        if y_left != NIL {
            self.link_mut(y_left).parent = x;
        }

        self.link_mut(y).parent = x_parent;

        if x_parent == NIL {
            self.root = y;
        } else if x == self.left(x_parent) {
            self.link_mut(x_parent).left = y;
        } else {
            self.link_mut(x_parent).right = y;
        }

        self.link_mut(y).left = x;
        self.link_mut(x).parent = y;
    }

    fn right_rotate(&mut self, y: NodeId) {
        let x = self.left(y);
        let x_right = self.right(x);
        let y_parent = self.parent(y);

        self.link_mut(y).left = x_right;

        if x_right != NIL {
            self.link_mut(x_right).parent = y;
        }

        self.link_mut(x).parent = y_parent;

        if y_parent == NIL {
            self.root = x;
        } else if y == self.right(y_parent) {
            self.link_mut(y_parent).right = x;
        } else {
            self.link_mut(y_parent).left = x;
        }

        self.link_mut(x).right = y;
        self.link_mut(y).parent = x;
    }

    /// Puts `v` where `u` hangs from its parent. `v` may be the sentinel.
    fn transplant(&mut self, u: NodeId, v: NodeId) {
        let u_parent = self.parent(u);
        if u_parent == NIL {
            self.root = v;
        } else if u == self.left(u_parent) {
            self.link_mut(u_parent).left = v;
        } else {
            self.link_mut(u_parent).right = v;
        }
        self.link_mut(v).parent = u_parent;
    }

    fn insert_fixup(&mut self, mut node_id: NodeId) {
        while self.color_of(self.parent(node_id)) == Color::Red {
            let parent_id = self.parent(node_id);
            let grandparent_id = self.parent(parent_id);

            if parent_id == self.left(grandparent_id) {
                let uncle_id = self.right(grandparent_id);

                if self.color_of(uncle_id) == Color::Red {
                    // Uncle is red: push the blackness down one level
                    self.set_color(parent_id, Color::Black);
                    self.set_color(uncle_id, Color::Black);
                    self.set_color(grandparent_id, Color::Red);
                    node_id = grandparent_id;
                } else {
                    if node_id == self.right(parent_id) {
                        // Inner child: straighten the zig-zag first
                        node_id = parent_id;
                        self.left_rotate(node_id);
                    }
                    let parent_id = self.parent(node_id);
                    let grandparent_id = self.parent(parent_id);
                    self.set_color(parent_id, Color::Black);
                    self.set_color(grandparent_id, Color::Red);
                    self.right_rotate(grandparent_id);
                }
            } else {
                let uncle_id = self.left(grandparent_id);

                if self.color_of(uncle_id) == Color::Red {
                    self.set_color(parent_id, Color::Black);
                    self.set_color(uncle_id, Color::Black);
                    self.set_color(grandparent_id, Color::Red);
                    node_id = grandparent_id;
                } else {
                    if node_id == self.left(parent_id) {
                        node_id = parent_id;
                        self.right_rotate(node_id);
                    }
                    let parent_id = self.parent(node_id);
                    let grandparent_id = self.parent(parent_id);
                    self.set_color(parent_id, Color::Black);
                    self.set_color(grandparent_id, Color::Red);
                    self.left_rotate(grandparent_id);
                }
            }
        }

        let root = self.root;
        self.set_color(root, Color::Black);
    }

    /// Restores black-height after a black node was unlinked above `x`.
    /// `x` may be the sentinel, in which case its parent link was set by the
    /// erase that called us.
    fn erase_fixup(&mut self, mut x: NodeId) {
        while x != self.root && self.color_of(x) == Color::Black {
            x = if x == self.left(self.parent(x)) {
                self.erase_fixup_left(x)
            } else {
                self.erase_fixup_right(x)
            };
        }
        self.set_color(x, Color::Black);
    }

    /// One step of the erase fixup for a deficient left child. Returns the
    /// next node to examine.
    fn erase_fixup_left(&mut self, x: NodeId) -> NodeId {
        let parent = self.parent(x);
        let mut sibling = self.right(parent);

        if self.color_of(sibling) == Color::Red {
            self.set_color(sibling, Color::Black);
            self.set_color(parent, Color::Red);
            self.left_rotate(parent);
            sibling = self.right(parent);
        }

        if self.color_of(self.left(sibling)) == Color::Black
            && self.color_of(self.right(sibling)) == Color::Black
        {
            self.set_color(sibling, Color::Red);
            return parent;
        }

        if self.color_of(self.right(sibling)) == Color::Black {
            let near = self.left(sibling);
            self.set_color(near, Color::Black);
            self.set_color(sibling, Color::Red);
            self.right_rotate(sibling);
            sibling = self.right(parent);
        }

        let parent_color = self.color_of(parent);
        self.set_color(sibling, parent_color);
        self.set_color(parent, Color::Black);
        let far = self.right(sibling);
        self.set_color(far, Color::Black);
        self.left_rotate(parent);
        self.root
    }

    /// Mirror of [`Self::erase_fixup_left`].
    fn erase_fixup_right(&mut self, x: NodeId) -> NodeId {
        let parent = self.parent(x);
        let mut sibling = self.left(parent);

        if self.color_of(sibling) == Color::Red {
            self.set_color(sibling, Color::Black);
            self.set_color(parent, Color::Red);
            self.right_rotate(parent);
            sibling = self.left(parent);
        }

        if self.color_of(self.left(sibling)) == Color::Black
            && self.color_of(self.right(sibling)) == Color::Black
        {
            self.set_color(sibling, Color::Red);
            return parent;
        }

        if self.color_of(self.left(sibling)) == Color::Black {
            let near = self.right(sibling);
            self.set_color(near, Color::Black);
            self.set_color(sibling, Color::Red);
            self.left_rotate(sibling);
            sibling = self.left(parent);
        }

        let parent_color = self.color_of(parent);
        self.set_color(sibling, parent_color);
        self.set_color(parent, Color::Black);
        let far = self.left(sibling);
        self.set_color(far, Color::Black);
        self.right_rotate(parent);
        self.root
    }
}

impl<K: Ord> RBTree<K> {
    /// Inserts `key` and returns a handle to its node. Duplicates are kept.
    ///
    /// On error the tree is left untouched.
    pub fn insert(&mut self, key: K) -> RBResult<Handle> {
        // Perform standard BST insertion
        let mut current = self.root;
        let mut parent = NIL;
        let mut is_left_child = false;

        while current != NIL {
            parent = current;
            if key < self.node(current).key {
                current = self.left(current);
                is_left_child = true;
            } else {
                current = self.right(current);
                is_left_child = false;
            }
        }

        let new_id = self.allocate(key, parent)?;
        self.len += 1;

        if parent == NIL {
            self.root = new_id;
        } else if is_left_child {
            self.link_mut(parent).left = new_id;
        } else {
            self.link_mut(parent).right = new_id;
        }
        trace!("tree {}: insert node {} under {}", self.id, new_id, parent);

        self.insert_fixup(new_id);
        Ok(self.handle(new_id))
    }

    /// Finds a node holding `key`. With duplicates, returns the first one
    /// met on the way down.
    pub fn find<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = self.root;

        while current != NIL {
            match key.cmp(self.node(current).key.borrow()) {
                Ordering::Equal => return Some(self.handle(current)),
                Ordering::Less => current = self.left(current),
                Ordering::Greater => current = self.right(current),
            }
        }

        None
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    /// (key, color) of every node in order.
    fn snapshot(tree: &RBTree<i64>) -> Vec<(i64, Color)> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut current = tree.root;
        loop {
            while current != NIL {
                stack.push(current);
                current = tree.left(current);
            }
            let Some(id) = stack.pop() else { break };
            out.push((tree.node(id).key, tree.color_of(id)));
            current = tree.right(id);
        }
        out
    }

    fn build(keys: &[i64]) -> RBTree<i64> {
        let mut tree = RBTree::new();
        for &k in keys {
            tree.insert(k).expect("insert failed");
            tree.validate().expect("invariants broken after insert");
        }
        tree
    }

    #[test]
    fn test_insert_and_find() {
        let tree = build(&[10, 20, 5, 15]);

        for k in [10, 20, 5, 15] {
            let h = tree.find(&k).expect("inserted key not found");
            assert_eq!(tree.key(h), Some(&k));
        }

        assert!(tree.find(&25).is_none());
        assert!(tree.find(&0).is_none());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_three_ascending_keys_rotate() {
        let tree = build(&[10, 20, 30]);

        let root = tree.root().expect("tree is empty");
        assert_eq!(tree.key(root), Some(&20));
        assert_eq!(tree.color(root), Some(Color::Black));

        for k in [10, 30] {
            let h = tree.find(&k).expect("missing key");
            assert_eq!(tree.color(h), Some(Color::Red));
        }

        assert_eq!(tree.to_sorted_vec(3), vec![10, 20, 30]);
    }

    #[test]
    fn test_zig_zag_insert() {
        let tree = build(&[10, 30, 20]);

        let root = tree.root().expect("tree is empty");
        assert_eq!(tree.key(root), Some(&20));
        assert_eq!(snapshot(&tree), vec![
            (10, Color::Red),
            (20, Color::Black),
            (30, Color::Red),
        ]);
    }

    #[test]
    fn test_erase_from_seven() {
        let mut tree = build(&[1, 2, 3, 4, 5, 6, 7]);

        let h = tree.find(&1).expect("missing key");
        assert_eq!(tree.erase(h), Ok(1));
        tree.validate().expect("invariants broken after erase");

        assert!((tree.height() as f64) <= 2.0 * 7f64.log2());
        let min = tree.min().expect("tree is empty");
        assert_eq!(tree.key(min), Some(&2));
        assert_eq!(tree.to_sorted_vec(10), vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_empty_tree_reports_absent() {
        let tree: RBTree<i64> = RBTree::new();
        assert!(tree.is_empty());
        assert!(tree.min().is_none());
        assert!(tree.max().is_none());
        assert!(tree.find(&1).is_none());
        assert!(tree.root().is_none());
        assert!(tree.to_sorted_vec(10).is_empty());
        tree.validate().expect("empty tree must be valid");
    }

    #[test]
    fn test_min_max() {
        let tree = build(&[42, 7, 99, 13, -5, 64]);
        let min = tree.min().expect("tree is empty");
        let max = tree.max().expect("tree is empty");
        assert_eq!(tree.key(min), Some(&-5));
        assert_eq!(tree.key(max), Some(&99));
    }

    #[test]
    fn test_sorted_output_keeps_duplicates() {
        let keys = [5, 3, 5, 8, 1, 5, 3];
        let tree = build(&keys);

        let mut expected = keys.to_vec();
        expected.sort();
        assert_eq!(tree.to_sorted_vec(usize::MAX), expected);
        assert_eq!(tree.to_sorted_vec(3), vec![1, 3, 3]);
        assert_eq!(tree.to_sorted_vec(0), Vec::<i64>::new());
    }

    #[test]
    fn test_fill_sorted_caps_at_buffer() {
        let tree = build(&[9, 2, 7, 4]);

        let mut small = [0i64; 2];
        assert_eq!(tree.fill_sorted(&mut small), 2);
        assert_eq!(small, [2, 4]);

        let mut large = [0i64; 6];
        assert_eq!(tree.fill_sorted(&mut large), 4);
        assert_eq!(&large[..4], &[2, 4, 7, 9]);
    }

    #[test]
    fn test_duplicates_erase_one_at_a_time() {
        let mut tree = build(&[5, 5, 5, 1, 9]);

        for remaining in (0..3).rev() {
            let h = tree.find(&5).expect("duplicate missing");
            assert_eq!(tree.erase(h), Ok(5));
            tree.validate().expect("invariants broken after erase");
            assert_eq!(tree.to_sorted_vec(10).iter().filter(|&&k| k == 5).count(), remaining);
        }
        assert!(tree.find(&5).is_none());
    }

    #[test]
    fn test_equal_keys_go_right_and_find_stops_at_first() {
        let mut tree = RBTree::new();
        let first = tree.insert(5).expect("insert failed");
        let second = tree.insert(5).expect("insert failed");

        assert_eq!(tree.right(first.index), second.index);
        assert_eq!(tree.left(first.index), NIL);
        assert_eq!(tree.find(&5), Some(first));

        // Right-right chain rotates left: the second copy becomes the root
        let third = tree.insert(5).expect("insert failed");
        tree.validate().expect("invariants broken after insert");
        assert_eq!(tree.root(), Some(second));
        assert_eq!(tree.left(second.index), first.index);
        assert_eq!(tree.right(second.index), third.index);
        assert_eq!(tree.find(&5), Some(second));
    }

    #[test]
    fn test_erase_red_leaf_touches_nothing_else() {
        let mut tree = build(&[50, 30, 70, 20, 40, 60, 80]);

        let h = tree.insert(65).expect("insert failed");
        let id = h.index;
        assert_eq!(tree.color(h), Some(Color::Red));
        assert_eq!(tree.left(id), NIL);
        assert_eq!(tree.right(id), NIL);

        let mut before = snapshot(&tree);
        before.retain(|&(k, _)| k != 65);

        assert_eq!(tree.erase(h), Ok(65));
        assert_eq!(snapshot(&tree), before);
        tree.validate().expect("invariants broken after erase");
    }

    #[test]
    fn test_erase_two_children_keeps_successor_handle() {
        let mut tree = build(&[50, 30, 70, 20, 40, 60, 80, 65]);

        let successor = tree.find(&60).expect("missing key");
        let target = tree.find(&50).expect("missing key");
        assert_eq!(tree.erase(target), Ok(50));
        tree.validate().expect("invariants broken after erase");

        assert_eq!(tree.key(successor), Some(&60));
        assert_eq!(tree.to_sorted_vec(10), vec![20, 30, 40, 60, 65, 70, 80]);
    }

    #[test]
    fn test_erase_root_until_empty() {
        let mut tree = build(&(0..32).collect::<Vec<_>>());

        while let Some(root) = tree.root() {
            tree.erase(root).expect("erase failed");
            tree.validate().expect("invariants broken after erase");
        }
        assert_eq!(tree.len(), 0);
        assert!(tree.min().is_none());
    }

    #[test]
    fn test_stale_and_foreign_handles() {
        let mut tree = build(&[1, 2, 3]);
        let mut other = build(&[1, 2, 3]);

        let h = tree.find(&2).expect("missing key");
        assert_eq!(other.erase(h), Err(RBError::ForeignHandle));
        assert_eq!(other.len(), 3);

        assert_eq!(tree.erase(h), Ok(2));
        assert_eq!(tree.erase(h), Err(RBError::StaleHandle));
        assert_eq!(tree.key(h), None);
        assert!(!tree.contains_handle(h));

        // The freed slot is reused but the old handle stays dead
        let fresh = tree.insert(2).expect("insert failed");
        assert_eq!(fresh.index, h.index);
        assert_ne!(fresh, h);
        assert_eq!(tree.key(h), None);
        assert_eq!(tree.key(fresh), Some(&2));
        tree.validate().expect("invariants broken");
    }

    #[test]
    fn test_clone_has_own_identity() {
        let tree = build(&[4, 8, 15]);
        let copy = tree.clone();

        let h = tree.find(&8).expect("missing key");
        assert!(!copy.contains_handle(h));
        assert_eq!(copy.to_sorted_vec(10), tree.to_sorted_vec(10));
        copy.validate().expect("clone is invalid");
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut tree = build(&[16, 8, 24, 4, 12, 20, 28]);
        let h = tree.min().expect("tree is empty");

        assert_eq!(tree.clear(), 7);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.erase(h), Err(RBError::StaleHandle));
        assert_eq!(tree.clear(), 0);

        tree.insert(3).expect("insert failed");
        assert_eq!(tree.to_sorted_vec(10), vec![3]);
        tree.validate().expect("invariants broken");
    }

    #[test]
    fn test_with_capacity() {
        let tree: RBTree<i64> = RBTree::with_capacity(128).expect("reserve failed");
        assert!(tree.is_empty());

        let err = RBTree::<i64>::with_capacity(usize::MAX).expect_err("reserve should fail");
        assert!(matches!(err, RBError::AllocationFailed(_)));
    }

    #[test]
    fn test_find_borrowed_key() {
        let mut tree = RBTree::new();
        for word in ["pear", "apple", "fig", "kiwi"] {
            tree.insert(word.to_string()).expect("insert failed");
        }
        assert!(tree.contains("fig"));
        assert!(!tree.contains("plum"));
        assert_eq!(tree.to_sorted_vec(2), vec!["apple".to_string(), "fig".to_string()]);
    }

    #[test]
    fn test_hundred_random_keys_erased_in_random_order() {
        let mut rng = StdRng::seed_from_u64(0x5eed_2b1e);
        let mut keys: Vec<i64> = (0..10_000).collect();
        keys.shuffle(&mut rng);
        keys.truncate(100);

        let mut tree = build(&keys);
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(tree.to_sorted_vec(usize::MAX), expected);

        keys.shuffle(&mut rng);
        for (i, k) in keys.iter().enumerate() {
            let h = tree.find(k).expect("missing key");
            assert_eq!(tree.erase(h), Ok(*k));
            if let Err(e) = tree.validate() {
                panic!("erase #{} of {} broke the tree: {}", i, k, e);
            }
            assert!(tree.find(k).is_none());
        }

        assert!(tree.is_empty());
        assert!(tree.min().is_none());
        assert!(tree.max().is_none());
    }

    #[test]
    fn test_height_stays_logarithmic() {
        let keys: Vec<i64> = (0..4096).collect();
        let tree = build(&keys);
        let bound = 2.0 * ((tree.len() + 1) as f64).log2();
        assert!((tree.height() as f64) <= bound);
        assert!(tree.black_height() >= 1);
    }

    mod proptests {
        use std::collections::BTreeMap;

        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(i64),
            Erase(i64),
        }

        fn arbitrary_op() -> impl Strategy<Value = Op> {
            // A small key domain keeps duplicates and misses common.
            prop_oneof![
                (0..64i64).prop_map(Op::Insert),
                (0..64i64).prop_map(Op::Erase),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn prop_matches_counting_model(ops in prop::collection::vec(arbitrary_op(), 0..300)) {
                let mut tree = RBTree::new();
                let mut model: BTreeMap<i64, usize> = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Insert(k) => {
                            let h = tree.insert(k).expect("insert failed");
                            prop_assert_eq!(tree.key(h), Some(&k));
                            *model.entry(k).or_default() += 1;
                        }
                        Op::Erase(k) => match tree.find(&k) {
                            Some(h) => {
                                prop_assert_eq!(tree.erase(h), Ok(k));
                                let count = model.get_mut(&k).expect("model out of sync");
                                *count -= 1;
                                if *count == 0 {
                                    model.remove(&k);
                                }
                            }
                            None => prop_assert!(!model.contains_key(&k)),
                        },
                    }
                    prop_assert!(tree.validate().is_ok());
                }

                let expected: Vec<i64> = model
                    .iter()
                    .flat_map(|(&k, &n)| std::iter::repeat(k).take(n))
                    .collect();
                prop_assert_eq!(tree.len(), expected.len());
                prop_assert_eq!(tree.to_sorted_vec(usize::MAX), expected);
            }

            #[test]
            fn prop_insert_then_erase_all(keys in prop::collection::vec(-1000..1000i64, 0..200), seed in any::<u64>()) {
                let mut tree = RBTree::new();
                for &k in &keys {
                    tree.insert(k).expect("insert failed");
                }

                let mut order = keys.clone();
                order.shuffle(&mut StdRng::seed_from_u64(seed));
                for k in order {
                    let h = tree.find(&k).expect("missing key");
                    prop_assert_eq!(tree.erase(h), Ok(k));
                    prop_assert!(tree.validate().is_ok());
                }

                prop_assert!(tree.is_empty());
                prop_assert!(tree.min().is_none());
            }
        }
    }
}
