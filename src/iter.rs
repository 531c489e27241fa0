use core::iter::FusedIterator;

use crate::{node::Link, node::Node, Key, WavlTree};

/// An in-order iterator over the entries of a [`WavlTree`].
///
/// Created by [`WavlTree::iter`].
pub struct Iter<'tree, V> {
    tree: &'tree WavlTree<V>,

    front_cur: Link<Node<V>>,
    back_cur: Link<Node<V>>,

    len: usize,
}

impl<'tree, V> Iter<'tree, V> {
    pub(crate) fn new(tree: &'tree WavlTree<V>) -> Self {
        Iter {
            tree,

            front_cur: tree.first_node(),
            back_cur: tree.last_node(),
            len: tree.len(),
        }
    }
}

impl<'tree, V> Iterator for Iter<'tree, V> {
    type Item = (Key, &'tree V);

    fn next(&mut self) -> Option<Self::Item> {
        // The two ends meet when `len` runs out; the cursors themselves never cross.
        if self.len == 0 {
            return None;
        }

        let cur = self.front_cur?;
        self.front_cur = unsafe { self.tree.successor(cur) };
        self.len -= 1;

        let node = unsafe { &*cur.as_ptr() };
        Some((node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, V> DoubleEndedIterator for Iter<'tree, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back_cur?;
        self.back_cur = unsafe { self.tree.predecessor(cur) };
        self.len -= 1;

        let node = unsafe { &*cur.as_ptr() };
        Some((node.key, &node.value))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Iter { ..*self }
    }
}

impl<'tree, V> IntoIterator for &'tree WavlTree<V> {
    type Item = (Key, &'tree V);
    type IntoIter = Iter<'tree, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
