//! An ordered map from integer keys to values, backed by a weak AVL tree, or WAVL tree.
//!
//! Every node also tracks the number of keys in its subtree, so the tree answers order-statistic
//! queries ([`WavlTree::select`], [`WavlTree::rank_of`]) in _O(log(n))_ time.
#![no_std]

// Conventions used in comments are from Hauepler, Sen and Tarjan:
// - The rank of a node `x` is denoted `r(x)`.
// - The parent of a node `x` is denoted `p(x)`.
// - The rank difference of a node `x` is given by `r(p(x)) - r(x)`.
// - A node `x` is an `i`-child if its rank difference is `i`.
// - A node is `i,j` if one of its children is an `i`-child and the other is a `j`-child.
// - A missing child has rank -1.
//
// The fundamental invariants of a WAVL tree are:
// 1. All rank differences are either 1 or 2.
// 2. All leaves have rank 0.
//
// Corollaries:
// 3. All ancestors of a leaf have rank at least one.
//
//    Proof:
//    a. The parent of a leaf has rank 1 or 2 (by (1) and (2)).
//    b. All ancestors of a node have a rank greater than it (by (1)).
//    QED by (a) and (b)
//
// 4. All unary nodes are 1,2 with rank 1.
//
//    Proof:
//    a. A unary node `n` has one missing child with rank -1, so `r(n) ∈ {0, 1}` (by (1)).
//    b. `n` is not a leaf, so `r(n) = 1` (by (3)).
//    c. `n`'s one child `c` has `r(c) ≥ 0`, so `r(c) = 0` and `c` is a 1-child.
//    QED by (a), (b) and (c)
//
// Besides its rank, every node stores its subtree size `s(x) = 1 + s(left) + s(right)`, with
// missing children contributing 0.

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

use alloc::{boxed::Box, vec::Vec};
use core::{cmp::Ordering, fmt, mem, ptr::NonNull};

use cordyceps::Linked;
use tracing::debug;

mod error;
mod iter;
mod node;
mod rebalance;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use error::WavlError;
pub use iter::Iter;
pub use node::NodeView;

use node::{Dir, Link, Node};

/// The key type. Keys are unique within a tree.
pub type Key = i64;

/// The number of rotations and unit rank changes an update performed.
pub type RebalanceCount = usize;

/// An ordered map backed by a weak AVL tree, or WAVL tree.
///
/// Implementation based on the paper [Rank-Balanced Trees] by Hauepler, Sen and Tarjan.
///
/// [Rank-Balanced Trees]: http://arks.princeton.edu/ark:/88435/pr1nz5z
pub struct WavlTree<V> {
    root: Link<Node<V>>,
}

// Where a key sits relative to the tree.
enum Position<V> {
    Empty,
    Found,
    Vacant { parent: NonNull<Node<V>>, dir: Dir },
}

impl<V> WavlTree<V> {
    /// Returns a new empty tree.
    pub const fn new() -> WavlTree<V> {
        WavlTree { root: None }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of elements in the tree.
    ///
    /// This is the subtree size of the root, so it completes in _O(1)_ time.
    pub fn size(&self) -> usize {
        unsafe { node::size(self.root) }
    }

    /// Returns the number of elements in the tree. Same as [`size`](Self::size).
    pub fn len(&self) -> usize {
        self.size()
    }

    /// Returns a read-only view of the root, or `None` if the tree is empty.
    pub fn root_handle(&self) -> Option<NodeView<'_, V>> {
        self.root.map(|root| NodeView::new(Some(root)))
    }

    /// Returns the value associated with `key`.
    pub fn search(&self, key: Key) -> Option<&V> {
        let ptr = self.get_raw(key)?;
        unsafe { Some(&(*ptr.as_ptr()).value) }
    }

    /// Returns `true` if the tree contains `key`.
    pub fn contains_key(&self, key: Key) -> bool {
        self.get_raw(key).is_some()
    }

    /// Returns a mutable reference to the value associated with `key`.
    pub fn get_mut(&mut self, key: Key) -> Option<&mut V> {
        let ptr = self.get_raw(key)?;
        unsafe { Some(&mut (*ptr.as_ptr()).value) }
    }

    fn get_raw(&self, key: Key) -> Link<Node<V>> {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(&cur.as_ref().key) {
                    Ordering::Less => opt_cur = Node::links(cur).as_ref().left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = Node::links(cur).as_ref().right(),
                }
            }
        }
    }

    // Finds the node holding `key`, or else the node and side where it would be attached.
    fn locate(&self, key: Key) -> Position<V> {
        let Some(mut cur) = self.root else {
            return Position::Empty;
        };

        loop {
            let dir = match key.cmp(unsafe { &cur.as_ref().key }) {
                Ordering::Less => Dir::Left,
                Ordering::Equal => return Position::Found,
                Ordering::Greater => Dir::Right,
            };

            match unsafe { Node::links(cur).as_ref().child(dir) } {
                Some(child) => cur = child,
                None => return Position::Vacant { parent: cur, dir },
            }
        }
    }

    /// Returns the value associated with the minimum key.
    pub fn min(&self) -> Option<&V> {
        self.first_key_value().map(|(_, value)| value)
    }

    /// Returns the value associated with the maximum key.
    pub fn max(&self) -> Option<&V> {
        self.last_key_value().map(|(_, value)| value)
    }

    /// Returns the entry with the minimum key.
    pub fn first_key_value(&self) -> Option<(Key, &V)> {
        let first = self.first_node()?;
        unsafe { Some((first.as_ref().key, &(*first.as_ptr()).value)) }
    }

    /// Returns the entry with the maximum key.
    pub fn last_key_value(&self) -> Option<(Key, &V)> {
        let last = self.last_node()?;
        unsafe { Some((last.as_ref().key, &(*last.as_ptr()).value)) }
    }

    pub(crate) fn first_node(&self) -> Link<Node<V>> {
        self.root
            .map(|root| unsafe { self.extreme_in_subtree(root, Dir::Left) })
    }

    pub(crate) fn last_node(&self) -> Link<Node<V>> {
        self.root
            .map(|root| unsafe { self.extreme_in_subtree(root, Dir::Right) })
    }

    /// Returns an in-order iterator over the entries of the tree.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self)
    }

    /// Returns all keys in ascending order.
    pub fn keys_in_order(&self) -> Vec<Key> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Returns all values, ordered by their keys.
    pub fn values_in_order(&self) -> Vec<&V> {
        self.iter().map(|(_, value)| value).collect()
    }

    /// Returns the value associated with the `i`-th smallest key, counting from 1.
    ///
    /// Descends once from the root using subtree sizes, so this completes in _O(log(n))_ time.
    pub fn select(&self, i: usize) -> Result<&V, WavlError> {
        let Some(root) = self.root else {
            return Err(WavlError::EmptyTree);
        };

        let len = self.size();
        if i == 0 || i > len {
            return Err(WavlError::IndexOutOfRange { index: i, len });
        }

        let mut cur = root;
        let mut remaining = i;

        loop {
            unsafe {
                let links = Node::links(cur).as_ref();
                let here = node::size(links.left()) + 1;

                cur = match remaining.cmp(&here) {
                    Ordering::Less => links.left().expect("left subtree holds the index"),
                    Ordering::Equal => return Ok(&(*cur.as_ptr()).value),
                    Ordering::Greater => {
                        remaining -= here;
                        links.right().expect("right subtree holds the index")
                    }
                };
            }
        }
    }

    /// Returns the 1-based position of `key` in ascending key order.
    ///
    /// This is the inverse of [`select`](Self::select).
    pub fn rank_of(&self, key: Key) -> Option<usize> {
        let mut opt_cur = self.root;
        let mut before = 0;

        loop {
            let cur = opt_cur?;

            unsafe {
                let links = Node::links(cur).as_ref();

                match key.cmp(&cur.as_ref().key) {
                    Ordering::Less => opt_cur = links.left(),
                    Ordering::Equal => return Some(before + node::size(links.left()) + 1),
                    Ordering::Greater => {
                        before += node::size(links.left()) + 1;
                        opt_cur = links.right();
                    }
                }
            }
        }
    }

    /// Inserts `value` under `key`.
    ///
    /// Returns the number of rebalancing operations performed. If `key` is already present the
    /// tree is left untouched and [`WavlError::DuplicateKey`] is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, key: Key, value: V) -> Result<RebalanceCount, WavlError> {
        let node = self.insert_leaf(key, value)?;

        Ok(unsafe { self.rebalance_inserted(node) })
    }

    // Attaches a new rank 0 leaf at the search position of `key` and grows every ancestor.
    //
    // The rank rule is not restored.
    fn insert_leaf(&mut self, key: Key, value: V) -> Result<NonNull<Node<V>>, WavlError> {
        let slot = match self.locate(key) {
            Position::Found => {
                debug!(key, "rejected duplicate insert");
                return Err(WavlError::DuplicateKey { key });
            }
            Position::Empty => None,
            Position::Vacant { parent, dir } => Some((parent, dir)),
        };

        let ptr = Node::into_ptr(Node::new(key, value));

        match slot {
            // Tree is empty. Set the new node as the root.
            None => self.root = Some(ptr),

            Some((parent, dir)) => unsafe {
                Node::links(parent).as_mut().set_child(dir, Some(ptr));
                Node::links(ptr).as_mut().set_parent(Some(parent));
                self.grow_path(Some(parent));
            },
        }

        Ok(ptr)
    }

    /// Removes `key` from the tree.
    ///
    /// Returns the number of rebalancing operations performed. If `key` is absent the tree is
    /// left untouched and [`WavlError::KeyNotFound`] is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn delete(&mut self, key: Key) -> Result<RebalanceCount, WavlError> {
        let Some(node) = self.get_raw(key) else {
            debug!(key, "rejected delete of absent key");
            return Err(WavlError::KeyNotFound { key });
        };

        let (_, count) = unsafe { self.remove_at(node) };
        Ok(count)
    }

    /// Removes `key` from the tree, returning its value.
    pub fn remove(&mut self, key: Key) -> Option<V> {
        let node = self.get_raw(key)?;
        let (removed, _) = unsafe { self.remove_at(node) };

        Some(removed.value)
    }

    /// Removes and returns the entry with the minimum key.
    pub fn pop_first(&mut self) -> Option<(Key, V)> {
        let first = self.first_node()?;
        let (removed, _) = unsafe { self.remove_at(first) };
        let Node { key, value, .. } = *removed;

        Some((key, value))
    }

    /// Removes and returns the entry with the maximum key.
    pub fn pop_last(&mut self) -> Option<(Key, V)> {
        let last = self.last_node()?;
        let (removed, _) = unsafe { self.remove_at(last) };
        let Node { key, value, .. } = *removed;

        Some((key, value))
    }

    // Removes the entry held by `node` and restores the rank rule.
    //
    // A binary node stays in place: it takes over its successor's key and value, and the
    // successor's slot is removed instead. The returned box holds the removed entry either way.
    //
    // # Safety
    //
    // `node` must be an element of `self`.
    unsafe fn remove_at(&mut self, node: NonNull<Node<V>>) -> (Box<Node<V>>, RebalanceCount) {
        unsafe {
            let (left, right) = {
                let links = Node::links(node).as_ref();
                (links.left(), links.right())
            };

            let victim = match (left, right) {
                (Some(_), Some(right)) => {
                    let successor = self.extreme_in_subtree(right, Dir::Left);
                    Self::swap_entries(node, successor);
                    successor
                }
                _ => node,
            };

            let (parent, removed) = self.unlink(victim);

            let count = match parent {
                Some(parent) => self.rebalance_removed(parent, removed),
                None => 0,
            };

            (Node::from_ptr(victim), count)
        }
    }

    // Splices out `node`, which has at most one child, lifting that child into its slot and
    // shrinking every ancestor.
    //
    // Returns the former parent of `node`. The rank rule is not restored.
    unsafe fn unlink(
        &mut self,
        node: NonNull<Node<V>>,
    ) -> (Link<Node<V>>, rebalance::Removed) {
        unsafe {
            let links = Node::links(node).as_mut();
            let parent = links.set_parent(None);
            let left = links.set_child(Dir::Left, None);
            let right = links.set_child(Dir::Right, None);

            let (child, removed) = match (left, right) {
                (None, None) => (None, rebalance::Removed::Leaf),
                (Some(child), None) | (None, Some(child)) => {
                    (Some(child), rebalance::Removed::Unary)
                }
                (Some(_), Some(_)) => unreachable!("binary nodes are removed via their successor"),
            };

            self.replace_child_or_set_root(parent, node, child);
            self.maybe_set_parent(child, parent);
            self.shrink_path(parent);

            (parent, removed)
        }
    }

    unsafe fn swap_entries(a: NonNull<Node<V>>, b: NonNull<Node<V>>) {
        debug_assert_ne!(a, b);

        unsafe {
            let (a, b) = (&mut *a.as_ptr(), &mut *b.as_ptr());
            mem::swap(&mut a.key, &mut b.key);
            mem::swap(&mut a.value, &mut b.value);
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = self.extreme_in_subtree(cur, Dir::Left);
                let parent = Node::links(cur).as_ref().parent();
                let right = Node::links(cur).as_ref().right();

                // Elevate the node's right child (which may be None). Sizes are not maintained,
                // every remaining node is about to be dropped too.
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                drop(Node::from_ptr(cur));

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
    }

    /// Panics unless every structural invariant holds: search order, rank differences of 1 or
    /// 2, rank 0 leaves, consistent parent links and exact subtree sizes.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        if let Some(root) = self.root {
            unsafe {
                assert_eq!(
                    Node::links(root).as_ref().parent(),
                    None,
                    "root must not have a parent"
                );
                self.assert_invariants_at(root, None, None);
            }
        }
    }

    // Checks the subtree at `node`, whose keys must lie strictly between `lower` and `upper`.
    //
    // Returns the number of nodes in the subtree.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at(
        &self,
        node: NonNull<Node<V>>,
        lower: Option<Key>,
        upper: Option<Key>,
    ) -> usize {
        unsafe {
            let links = Node::links(node).as_ref();
            let key = node.as_ref().key;
            let rank = links.rank();

            if let Some(lower) = lower {
                assert!(lower < key, "key {key} is out of order (must exceed {lower})");
            }
            if let Some(upper) = upper {
                assert!(key < upper, "key {key} is out of order (must precede {upper})");
            }

            // Ensure all leaves have rank 0.
            if links.is_leaf() {
                assert_eq!(rank, 0, "leaf {key} must have rank 0");
            }

            let mut size = 1;

            for dir in [Dir::Left, Dir::Right] {
                let child = links.child(dir);

                // Ensure all rank differences are 1 or 2, counting missing children.
                let rank_diff = rank - node::rank(child);
                assert!(
                    [1, 2].contains(&rank_diff),
                    "node {key} has a {rank_diff}-child"
                );

                if let Some(child) = child {
                    // Ensure child's parent link points to this node.
                    let parent = Node::links(child)
                        .as_ref()
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    let (lower, upper) = match dir {
                        Dir::Left => (lower, Some(key)),
                        Dir::Right => (Some(key), upper),
                    };
                    size += self.assert_invariants_at(child, lower, upper);
                }
            }

            assert_eq!(links.size(), size, "node {key} has a stale subtree size");

            size
        }
    }

    // Support methods ========================================================

    // Returns the node reached from `root` by following `dir` links as far as possible.
    #[inline]
    unsafe fn extreme_in_subtree(&self, root: NonNull<Node<V>>, dir: Dir) -> NonNull<Node<V>> {
        let mut cur = root;

        while let Some(next) = unsafe { Node::links(cur).as_ref().child(dir) } {
            cur = next;
        }

        cur
    }

    // Returns the in-order neighbour of `node` in direction `dir`.
    //
    // If `node` has a `dir` child, this is the `!dir`-most node of that subtree. Otherwise this
    // is the first ancestor reached by climbing out of a `!dir` child.
    unsafe fn neighbor(&self, node: NonNull<Node<V>>, dir: Dir) -> Link<Node<V>> {
        unsafe {
            if let Some(child) = Node::links(node).as_ref().child(dir) {
                return Some(self.extreme_in_subtree(child, !dir));
            }

            let mut cur = node;
            while let Some(parent) = Node::links(cur).as_ref().parent() {
                if self.which_child(parent, cur) == !dir {
                    return Some(parent);
                }
                cur = parent;
            }

            None
        }
    }

    /// Returns the node holding the smallest key greater than `node`'s.
    pub(crate) unsafe fn successor(&self, node: NonNull<Node<V>>) -> Link<Node<V>> {
        unsafe { self.neighbor(node, Dir::Right) }
    }

    /// Returns the node holding the greatest key less than `node`'s.
    pub(crate) unsafe fn predecessor(&self, node: NonNull<Node<V>>) -> Link<Node<V>> {
        unsafe { self.neighbor(node, Dir::Left) }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<Node<V>>, parent: Link<Node<V>>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { Node::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<Node<V>>,
        old_child: NonNull<Node<V>>,
        new_child: Link<Node<V>>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that `old_child` is a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<Node<V>>,
        old_child: NonNull<Node<V>>,
        new_child: Link<Node<V>>,
    ) {
        unsafe {
            let links = Node::links(parent).as_mut();

            if links.left() == Some(old_child) {
                links.set_child(Dir::Left, new_child);
            } else {
                debug_assert_eq!(
                    links.right(),
                    Some(old_child),
                    "`old_child` must be a child of `parent`"
                );
                links.set_child(Dir::Right, new_child);
            }
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // The subtree sizes of `down` and then `up` are recomputed; no other node's subtree changes.
    // The ranks of affected nodes are not updated.
    unsafe fn rotate_at(&mut self, down: NonNull<Node<V>>, up: NonNull<Node<V>>) {
        unsafe {
            debug_assert_eq!(Node::links(up).as_ref().parent(), Some(down));

            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = if Node::links(down).as_ref().right() == Some(up) {
                Dir::Left
            } else {
                Dir::Right
            };

            let across = Node::links(up).as_ref().child(dir);
            Node::links(down).as_mut().set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            Node::links(up).as_mut().set_child(dir, Some(down));
            let parent = Node::links(down).as_mut().set_parent(Some(up));
            Node::links(up).as_mut().set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            // `up`'s size depends on `down`'s new size.
            self.update_size(down);
            self.update_size(up);
        }
    }

    #[inline]
    unsafe fn update_size(&mut self, node: NonNull<Node<V>>) {
        unsafe {
            let links = Node::links(node).as_mut();
            let size = 1 + node::size(links.left()) + node::size(links.right());
            links.set_size(size);
        }
    }

    // Adds one to the size of `from` and each of its ancestors.
    unsafe fn grow_path(&mut self, from: Link<Node<V>>) {
        let mut opt_cur = from;

        while let Some(cur) = opt_cur {
            unsafe {
                let links = Node::links(cur).as_mut();
                links.set_size(links.size() + 1);
                opt_cur = links.parent();
            }
        }
    }

    // Subtracts one from the size of `from` and each of its ancestors.
    unsafe fn shrink_path(&mut self, from: Link<Node<V>>) {
        let mut opt_cur = from;

        while let Some(cur) = opt_cur {
            unsafe {
                let links = Node::links(cur).as_mut();
                links.set_size(links.size() - 1);
                opt_cur = links.parent();
            }
        }
    }

    #[inline]
    unsafe fn promote(&mut self, node: NonNull<Node<V>>) {
        unsafe {
            let links = Node::links(node).as_mut();
            links.set_rank(links.rank() + 1);
        }
    }

    #[inline]
    unsafe fn promote_twice(&mut self, node: NonNull<Node<V>>) {
        unsafe {
            let links = Node::links(node).as_mut();
            links.set_rank(links.rank() + 2);
        }
    }

    #[inline]
    unsafe fn demote(&mut self, node: NonNull<Node<V>>) {
        unsafe {
            let links = Node::links(node).as_mut();
            links.set_rank(links.rank() - 1);
        }
    }

    #[inline]
    unsafe fn demote_twice(&mut self, node: NonNull<Node<V>>) {
        unsafe {
            let links = Node::links(node).as_mut();
            links.set_rank(links.rank() - 2);
        }
    }

    // Returns the rank difference between `node` and its `dir` child.
    #[inline]
    unsafe fn rank_diff(&self, node: NonNull<Node<V>>, dir: Dir) -> i8 {
        unsafe {
            let links = Node::links(node).as_ref();
            links.rank() - node::rank(links.child(dir))
        }
    }

    unsafe fn is_2_2(&self, node: NonNull<Node<V>>) -> bool {
        unsafe { self.rank_diff(node, Dir::Left) == 2 && self.rank_diff(node, Dir::Right) == 2 }
    }

    unsafe fn which_child(&self, parent: NonNull<Node<V>>, child: NonNull<Node<V>>) -> Dir {
        if unsafe { Node::links(parent).as_ref().left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<V> Default for WavlTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for WavlTree<V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<V: fmt::Debug> fmt::Debug for WavlTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// SAFETY: The tree owns every node exclusively, as a `Box<Node<V>>` would.
unsafe impl<V: Send> Send for WavlTree<V> {}

// SAFETY: Shared access only ever reads nodes.
unsafe impl<V: Sync> Sync for WavlTree<V> {}
