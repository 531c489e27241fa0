//! Bottom-up restoration of the rank rule after an insertion or removal.
//!
//! Each walk is a loop over a closed set of cases. A case is first classified from the rank
//! differences around one node, then applied; classification never mutates the tree.
//!
//! Rebalance counts: every rotation counts 1 and every unit rank change counts 1, so promoting a
//! node twice counts 2. A count of 0 means no rank or link was changed.

use core::ptr::NonNull;

use cordyceps::Linked;
use tracing::trace;

use crate::{
    node::{Dir, Node},
    RebalanceCount, WavlTree,
};

/// The shape of the node that was spliced out of the tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Removed {
    /// The node had no children.
    Leaf,
    /// The node had one child, which took its place.
    Unary,
}

/// A step of the insertion walk, classified at a node `x` and its parent `z`.
///
/// The direction is the side of `z` that `x` hangs from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum InsertCase {
    /// `x` is not a 0-child.
    Balanced,
    /// `z` is 0,1: promote `z` and continue from `z`.
    Promote,
    /// `z` is 0,2 and `x`'s outer child is a 1-child: rotate `x` over `z`, demote `z`.
    Rotate(Dir),
    /// `z` is 0,2 and `x`'s inner child `y` is a 1-child: rotate `y` over `x`, then over `z`;
    /// demote `x` and `z`, promote `y`.
    DoubleRotate(Dir),
}

/// A step of the removal walk, classified at a node `z` which may have a 3-child `x`.
///
/// The direction is the side of `z` that `x` hangs from; `y` is `x`'s sibling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RemoveCase {
    /// `z` has no 3-child.
    Balanced,
    /// `z` is 2,3: demote `z` and continue from `p(z)`.
    Demote,
    /// `z` is 1,3 and `y` is 2,2: demote `y` and `z`, continue from `p(z)`.
    DoubleDemote(Dir),
    /// `z` is 1,3 and `y`'s outer child is a 1-child: rotate `y` over `z`, promote `y`, demote
    /// `z`; demote `z` once more if that leaves it a 2,2 leaf.
    Rotate(Dir),
    /// `z` is 1,3 and `y` is 2,1 with its inner child `v` the 1-child: rotate `v` over `y`, then
    /// over `z`; promote `v` twice, demote `y` once and `z` twice.
    DoubleRotate(Dir),
}

impl<V> WavlTree<V> {
    pub(crate) unsafe fn classify_inserted(
        &self,
        z: NonNull<Node<V>>,
        x: NonNull<Node<V>>,
    ) -> InsertCase {
        unsafe {
            let dir = self.which_child(z, x);

            if self.rank_diff(z, dir) != 0 {
                return InsertCase::Balanced;
            }

            if self.rank_diff(z, !dir) == 1 {
                return InsertCase::Promote;
            }

            // `x` was promoted on the previous step, so it is 1,2.
            if self.rank_diff(x, dir) == 1 {
                InsertCase::Rotate(dir)
            } else {
                InsertCase::DoubleRotate(dir)
            }
        }
    }

    // Performs a bottom-up rebalance of the tree after the insertion of the leaf `node`.
    //
    // The only possible violation is a 0-child, starting at `node` and moving up with each
    // promotion.
    pub(crate) unsafe fn rebalance_inserted(&mut self, node: NonNull<Node<V>>) -> RebalanceCount {
        let mut count = 0;
        let mut x = node;

        unsafe {
            // Promotions may carry the violation up to the root, where it disappears.
            while let Some(z) = Node::links(x).as_ref().parent() {
                let case = self.classify_inserted(z, x);
                trace!(key = z.as_ref().key, ?case, "insert rebalance step");

                match case {
                    InsertCase::Balanced => break,

                    InsertCase::Promote => {
                        self.promote(z);
                        count += 1;
                        x = z;
                    }

                    InsertCase::Rotate(_) => {
                        self.rotate_at(z, x);
                        self.demote(z);
                        count += 2;
                        break;
                    }

                    InsertCase::DoubleRotate(dir) => {
                        let y = Node::links(x)
                            .as_ref()
                            .child(!dir)
                            .expect("inner 1-child must exist");

                        self.rotate_at(x, y);
                        self.rotate_at(z, y);
                        self.demote(x);
                        self.demote(z);
                        self.promote(y);
                        count += 5;
                        break;
                    }
                }
            }
        }

        count
    }

    pub(crate) unsafe fn classify_removed(&self, z: NonNull<Node<V>>) -> RemoveCase {
        unsafe {
            let dir = match (
                self.rank_diff(z, Dir::Left),
                self.rank_diff(z, Dir::Right),
            ) {
                (3, _) => Dir::Left,
                (_, 3) => Dir::Right,
                _ => return RemoveCase::Balanced,
            };

            if self.rank_diff(z, !dir) == 2 {
                return RemoveCase::Demote;
            }

            let y = Node::links(z)
                .as_ref()
                .child(!dir)
                .expect("sibling of a 3-child must exist");

            match (self.rank_diff(y, !dir), self.rank_diff(y, dir)) {
                (1, _) => RemoveCase::Rotate(dir),
                (2, 1) => RemoveCase::DoubleRotate(dir),
                _ => RemoveCase::DoubleDemote(dir),
            }
        }
    }

    // Performs a bottom-up rebalance of the tree after a node was spliced out from under
    // `parent`.
    //
    // Removing a leaf may leave `parent` a 2,2 leaf, which is demoted first. After that, the
    // only possible violation is a single 3-child, moving up with each demotion.
    pub(crate) unsafe fn rebalance_removed(
        &mut self,
        parent: NonNull<Node<V>>,
        removed: Removed,
    ) -> RebalanceCount {
        let mut count = 0;
        let mut opt_z = Some(parent);

        unsafe {
            if removed == Removed::Leaf && self.is_2_2(parent) {
                trace!(key = parent.as_ref().key, "demote 2,2 leaf");
                self.demote(parent);
                count += 1;
                opt_z = Node::links(parent).as_ref().parent();
            }

            while let Some(z) = opt_z {
                let case = self.classify_removed(z);
                trace!(key = z.as_ref().key, ?case, "remove rebalance step");

                match case {
                    RemoveCase::Balanced => break,

                    RemoveCase::Demote => {
                        self.demote(z);
                        count += 1;
                    }

                    RemoveCase::DoubleDemote(dir) => {
                        let y = Node::links(z)
                            .as_ref()
                            .child(!dir)
                            .expect("sibling of a 3-child must exist");

                        self.demote(y);
                        self.demote(z);
                        count += 2;
                    }

                    RemoveCase::Rotate(dir) => {
                        let y = Node::links(z)
                            .as_ref()
                            .child(!dir)
                            .expect("sibling of a 3-child must exist");

                        self.rotate_at(z, y);
                        self.promote(y);
                        self.demote(z);
                        count += 3;

                        if Node::links(z).as_ref().is_leaf() && self.is_2_2(z) {
                            self.demote(z);
                            count += 1;
                        }
                        break;
                    }

                    RemoveCase::DoubleRotate(dir) => {
                        let y = Node::links(z)
                            .as_ref()
                            .child(!dir)
                            .expect("sibling of a 3-child must exist");
                        let v = Node::links(y)
                            .as_ref()
                            .child(dir)
                            .expect("inner 1-child must exist");

                        self.rotate_at(y, v);
                        self.rotate_at(z, v);
                        self.promote_twice(v);
                        self.demote(y);
                        self.demote_twice(z);
                        count += 7;
                        break;
                    }
                }

                opt_z = Node::links(z).as_ref().parent();
            }
        }

        count
    }
}
