use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::{
    model,
    node::{Dir, Node},
    rebalance::{InsertCase, RemoveCase},
};

use super::*;

fn tree_of(keys: &[Key]) -> WavlTree<Key> {
    let mut tree = WavlTree::new();

    for &key in keys {
        tree.insert(key, key * 10).expect("keys are distinct");
        tree.assert_invariants();
    }

    tree
}

fn node_at(tree: &WavlTree<Key>, key: Key) -> NonNull<Node<Key>> {
    tree.get_raw(key).expect("item not found")
}

fn rank_at(tree: &WavlTree<Key>, key: Key) -> i8 {
    unsafe { Node::links(node_at(tree, key)).as_ref().rank() }
}

// Overrides ranks so that a single case can be classified without building it organically.
fn set_ranks(tree: &mut WavlTree<Key>, ranks: &[(Key, i8)]) {
    for &(key, rank) in ranks {
        unsafe { Node::links(node_at(tree, key)).as_mut().set_rank(rank) };
    }
}

// Returns `true` if no node is 2,2. Insert-only WAVL trees are AVL trees and never have one.
fn no_2_2_nodes(tree: &WavlTree<Key>) -> bool {
    tree.keys_in_order()
        .into_iter()
        .all(|key| unsafe { !tree.is_2_2(node_at(tree, key)) })
}

fn permutations(keys: &[Key]) -> Vec<Vec<Key>> {
    if keys.len() <= 1 {
        return vec![keys.to_vec()];
    }

    let mut all = Vec::new();
    for (i, &first) in keys.iter().enumerate() {
        let mut rest = keys.to_vec();
        rest.remove(i);

        for mut tail in permutations(&rest) {
            tail.insert(0, first);
            all.push(tail);
        }
    }

    all
}

fn insert_find_all(keys: &[Key]) {
    let tree = tree_of(keys);

    for &key in keys {
        assert_eq!(tree.search(key), Some(&(key * 10)));
    }

    assert_eq!(tree.size(), keys.len());
    assert!(no_2_2_nodes(&tree));
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

#[test]
fn five_elems_find() {
    for keys in permutations(&[0, 1, 2, 3, 4]) {
        insert_find_all(&keys);
    }
}

fn insert_remove_all(keys: &[Key]) {
    let mut tree = tree_of(keys);

    for &key in keys {
        tree.delete(key).expect("item not found");
        tree.assert_invariants();
    }
    assert!(tree.is_empty());

    for &key in keys {
        tree.insert(key, key * 10).expect("keys are distinct");
        tree.assert_invariants();
    }

    for &key in keys.iter().rev() {
        assert_eq!(tree.remove(key), Some(key * 10));
        tree.assert_invariants();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.size(), 0);
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    for keys in permutations(&[0, 1, 2]) {
        insert_remove_all(&keys);
    }
}

#[test]
fn remove_five() {
    for keys in permutations(&[0, 1, 2, 3, 4]) {
        insert_remove_all(&keys);
    }
}

#[test]
fn remove_middle_first() {
    // Deleting from the middle exercises binary removal through the successor.
    let keys: Vec<Key> = (0..64).collect();
    let mut tree = tree_of(&keys);

    for key in (0..64).map(|i| (i * 37) % 64) {
        tree.delete(key).expect("item not found");
        tree.assert_invariants();
        assert!(!tree.contains_key(key));
    }
    assert!(tree.is_empty());
}

#[test]
fn binary_removal_keeps_node_in_place() {
    let mut tree = tree_of(&[20, 10, 30, 5, 15, 25, 35]);
    let root = node_at(&tree, 20);

    tree.delete(20).expect("item not found");
    tree.assert_invariants();

    // The successor's entry moved into the old root node.
    assert_eq!(tree.root, Some(root));
    assert_eq!(unsafe { root.as_ref().key }, 25);
    assert_eq!(tree.search(25), Some(&250));
    assert_eq!(tree.keys_in_order(), vec![5, 10, 15, 25, 30, 35]);
}

#[test]
fn failed_updates_leave_tree_untouched() {
    let mut tree = tree_of(&[2, 1, 3]);

    assert_eq!(tree.insert(2, 99), Err(WavlError::DuplicateKey { key: 2 }));
    assert_eq!(tree.delete(7), Err(WavlError::KeyNotFound { key: 7 }));

    tree.assert_invariants();
    assert_eq!(tree.search(2), Some(&20));
    assert_eq!(tree.size(), 3);
}

#[test]
fn successor_and_predecessor_walk_all_keys() {
    let keys = [50, 20, 80, 10, 30, 70, 90, 25, 35, 75];
    let tree = tree_of(&keys);
    let sorted = tree.keys_in_order();

    for pair in sorted.windows(2) {
        let (lo, hi) = (node_at(&tree, pair[0]), node_at(&tree, pair[1]));
        unsafe {
            assert_eq!(tree.successor(lo), Some(hi));
            assert_eq!(tree.predecessor(hi), Some(lo));
        }
    }

    unsafe {
        assert_eq!(tree.successor(node_at(&tree, 90)), None);
        assert_eq!(tree.predecessor(node_at(&tree, 10)), None);
    }
}

#[test]
fn rotations_update_sizes() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3]);
    let (two, four) = (node_at(&tree, 2), node_at(&tree, 4));

    unsafe {
        tree.rotate_at(four, two);

        assert_eq!(tree.root, Some(two));
        assert_eq!(Node::links(two).as_ref().size(), 5);
        assert_eq!(Node::links(four).as_ref().size(), 3);
        assert_eq!(Node::links(four).as_ref().left(), Some(node_at(&tree, 3)));
    }

    assert_eq!(tree.keys_in_order(), vec![1, 2, 3, 4, 6]);
}

// Insertion cases ============================================================

#[test]
fn insert_promote() {
    let mut tree = tree_of(&[10]);

    assert_eq!(tree.insert(5, 50), Ok(1));
    assert_eq!(rank_at(&tree, 10), 1);
}

#[test]
fn insert_no_rebalance() {
    let mut tree = tree_of(&[10, 5]);

    assert_eq!(tree.insert(15, 150), Ok(0));
    tree.assert_invariants();
}

#[test]
fn insert_rotate() {
    let mut tree = tree_of(&[10, 5]);

    // Promote 5, then rotate 5 over 10 and demote 10.
    assert_eq!(tree.insert(1, 10), Ok(3));
    tree.assert_invariants();

    assert_eq!(tree.root, Some(node_at(&tree, 5)));
    assert_eq!(rank_at(&tree, 5), 1);
    assert_eq!(rank_at(&tree, 1), 0);
    assert_eq!(rank_at(&tree, 10), 0);
}

#[test]
fn insert_double_rotate() {
    let mut tree = tree_of(&[10, 5]);

    // Promote 5, then lift 7 over 5 and 10.
    assert_eq!(tree.insert(7, 70), Ok(6));
    tree.assert_invariants();

    assert_eq!(tree.root, Some(node_at(&tree, 7)));
    assert_eq!(rank_at(&tree, 7), 1);
    assert_eq!(tree.keys_in_order(), vec![5, 7, 10]);
}

#[test]
fn classify_insert_cases() {
    let mut tree = tree_of(&[2, 1, 3]);
    let (one, two) = (node_at(&tree, 1), node_at(&tree, 2));

    unsafe {
        assert_eq!(tree.classify_inserted(two, one), InsertCase::Balanced);

        set_ranks(&mut tree, &[(1, 1)]);
        assert_eq!(tree.classify_inserted(two, one), InsertCase::Promote);

        set_ranks(&mut tree, &[(3, -1)]);
        assert_eq!(tree.classify_inserted(two, one), InsertCase::DoubleRotate(Dir::Left));
    }

    let mut tree = tree_of(&[4, 2, 6, 1]);
    let (two, four) = (node_at(&tree, 2), node_at(&tree, 4));
    set_ranks(&mut tree, &[(4, 2), (2, 2), (6, 0), (1, 1)]);
    unsafe {
        assert_eq!(tree.classify_inserted(four, two), InsertCase::Rotate(Dir::Left));
    }
}

// Removal cases ==============================================================

#[test]
fn classify_remove_cases() {
    // 2 with a 1-child at 1 and the subtree 4[3, 5] on the right.
    let mut tree = tree_of(&[2, 1, 4, 3, 5]);
    let two = node_at(&tree, 2);

    unsafe {
        assert_eq!(tree.classify_removed(two), RemoveCase::Balanced);

        set_ranks(&mut tree, &[(2, 3), (1, 0), (4, 1)]);
        assert_eq!(tree.classify_removed(two), RemoveCase::Demote);

        set_ranks(&mut tree, &[(4, 2), (3, 0), (5, 0)]);
        assert_eq!(tree.classify_removed(two), RemoveCase::DoubleDemote(Dir::Left));

        set_ranks(&mut tree, &[(5, 1)]);
        assert_eq!(tree.classify_removed(two), RemoveCase::Rotate(Dir::Left));

        set_ranks(&mut tree, &[(3, 1), (5, 0)]);
        assert_eq!(tree.classify_removed(two), RemoveCase::DoubleRotate(Dir::Left));
    }

    // Mirror image: 4 with a 1-child at 5 and the subtree 2[1, 3] on the left.
    let mut tree = tree_of(&[4, 5, 2, 1, 3]);
    let four = node_at(&tree, 4);
    set_ranks(&mut tree, &[(4, 3), (5, 0), (2, 2), (1, 1), (3, 0)]);

    unsafe {
        assert_eq!(tree.classify_removed(four), RemoveCase::Rotate(Dir::Right));
    }
}

#[test]
fn remove_leaf_without_rebalance() {
    // 10 keeps 15, so it is left 2,1.
    let mut tree = tree_of(&[20, 10, 30, 5, 15]);

    assert_eq!(tree.delete(5), Ok(0));
    tree.assert_invariants();
}

#[test]
fn remove_2_2_leaf_demotes() {
    let mut tree = tree_of(&[20, 10, 30, 5, 15, 25, 35]);

    assert_eq!(tree.delete(5), Ok(0));
    // 10 is left a 2,2 leaf.
    assert_eq!(tree.delete(15), Ok(1));
    tree.assert_invariants();
    assert_eq!(rank_at(&tree, 10), 0);
}

#[test]
fn remove_rotate() {
    let mut tree = tree_of(&[20, 10, 30, 5, 15, 25, 35]);
    tree.delete(5).expect("item not found");
    tree.delete(15).expect("item not found");

    // 20 is 3,1 and 30's outer child is a 1-child.
    assert_eq!(tree.delete(10), Ok(3));
    tree.assert_invariants();

    assert_eq!(tree.root, Some(node_at(&tree, 30)));
    assert_eq!(rank_at(&tree, 30), 2);
    assert_eq!(rank_at(&tree, 20), 1);
}

#[test]
fn remove_rotate_then_demote_leaf() {
    // 2 has rank 2 over the leaf 1 and the unary 3, whose child 4 is on its right.
    let mut tree = tree_of(&[2, 1, 3, 4]);

    // After rotating 3 up, 2 is a 2,2 leaf and is demoted again.
    assert_eq!(tree.delete(1), Ok(4));
    tree.assert_invariants();

    assert_eq!(tree.root, Some(node_at(&tree, 3)));
    assert_eq!(rank_at(&tree, 2), 0);
}

#[test]
fn remove_double_rotate() {
    // As above, but 4 is unary with 3 on its left.
    let mut tree = tree_of(&[2, 1, 4, 3]);

    assert_eq!(tree.delete(1), Ok(7));
    tree.assert_invariants();

    assert_eq!(tree.root, Some(node_at(&tree, 3)));
    assert_eq!(rank_at(&tree, 3), 2);
    assert_eq!(rank_at(&tree, 2), 0);
    assert_eq!(rank_at(&tree, 4), 0);
}

// Order statistics ===========================================================

#[test]
fn select_descends_by_size() {
    let tree = tree_of(&[20, 10, 30, 5, 15, 25, 35]);

    for (i, key) in tree.keys_in_order().into_iter().enumerate() {
        assert_eq!(tree.select(i + 1), Ok(&(key * 10)));
        assert_eq!(tree.rank_of(key), Some(i + 1));
    }

    assert_eq!(
        tree.select(0),
        Err(WavlError::IndexOutOfRange { index: 0, len: 7 })
    );
    assert_eq!(
        tree.select(8),
        Err(WavlError::IndexOutOfRange { index: 8, len: 7 })
    );
    assert_eq!(tree.rank_of(11), None);
    assert_eq!(WavlTree::<Key>::new().select(1), Err(WavlError::EmptyTree));
}

// Feeds the same decoder the fuzz target uses with fixed pseudo-random bytes.
#[test]
fn arbitrary_ops_match_btree() {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let bytes: Vec<u8> = (0..16_384)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect();

    let mut input = arbitrary::Unstructured::new(&bytes);
    let mut ops = Vec::new();
    while !input.is_empty() {
        ops.push(<model::Op as arbitrary::Arbitrary>::arbitrary(&mut input).expect("op decodes"));
    }
    assert!(ops.len() > 100);

    model::run_btree_equivalence(ops);
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn insert_only_trees_are_avl(
        keys in proptest::collection::btree_set(-500i64..500, 0..200)
            .prop_map(|set| set.into_iter().collect::<Vec<Key>>())
            .prop_shuffle()
    ) {
        let tree = tree_of(&keys);

        let mut sorted = keys.clone();
        sorted.sort_unstable();

        prop_assert!(no_2_2_nodes(&tree));
        prop_assert_eq!(tree.keys_in_order(), sorted);
    }
}
