//! A reference model for [`WavlTree`], driven by `proptest` strategies or `arbitrary` input.

use std::{collections::BTreeMap, prelude::v1::*};

use arbitrary::Arbitrary;
use proptest::strategy::{Just, Strategy};

use crate::{Key, WavlError, WavlTree};

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    /// Picks an existing key by position, so removals and lookups usually hit.
    Index(usize),
    Random(i16),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in -1000i16..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Search(ItemValue),
    Delete(ItemValue),
    Remove(ItemValue),
    RankOf(ItemValue),
    Select(usize),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, model: &BTreeMap<Key, u32>) -> FinalOp {
        fn get_key(m: &BTreeMap<Key, u32>, i: ItemValue) -> Key {
            match i {
                ItemValue::Index(idx) => match m.keys().nth(idx % m.len().max(1)) {
                    Some(&key) => key,
                    None => idx as Key,
                },
                ItemValue::Random(v) => v.into(),
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_key(model, item)),
            Op::Search(item) => FinalOp::Search(get_key(model, item)),
            Op::Delete(item) => FinalOp::Delete(get_key(model, item)),
            Op::Remove(item) => FinalOp::Remove(get_key(model, item)),
            Op::RankOf(item) => FinalOp::RankOf(get_key(model, item)),
            // Reach one past either end of `1..=len` now and then.
            Op::Select(i) => FinalOp::Select(i % (model.len() + 2)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(Key),
    Search(Key),
    Delete(Key),
    Remove(Key),
    RankOf(Key),
    Select(usize),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        4 => value_strategy().prop_map(Op::Insert),
        1 => value_strategy().prop_map(Op::Search),
        2 => value_strategy().prop_map(Op::Delete),
        1 => value_strategy().prop_map(Op::Remove),
        1 => value_strategy().prop_map(Op::RankOf),
        1 => (0usize..1000).prop_map(Op::Select),
        1 => Just(Op::First),
        1 => Just(Op::PopFirst),
        1 => Just(Op::Last),
        1 => Just(Op::PopLast),
    ]
}

/// Replays `ops` against both a `WavlTree` and a `BTreeMap`, checking that every result agrees
/// and that the tree's invariants hold after each step.
pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut btree = BTreeMap::new();
    let mut wavl: WavlTree<u32> = WavlTree::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&btree);
        // Values record which op inserted them, so an overwrite would be noticed.
        let value = op_id as u32;

        match final_op {
            FinalOp::Insert(key) => {
                let from_btree = if btree.contains_key(&key) {
                    Err(WavlError::DuplicateKey { key })
                } else {
                    btree.insert(key, value);
                    Ok(())
                };
                let from_wavl = wavl.insert(key, value).map(drop);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Search(key) => {
                let from_btree = btree.get(&key);
                let from_wavl = wavl.search(key);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Delete(key) => {
                let from_btree = match btree.remove(&key) {
                    Some(_) => Ok(()),
                    None => Err(WavlError::KeyNotFound { key }),
                };
                let from_wavl = wavl.delete(key).map(drop);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(key) => {
                let from_btree = btree.remove(&key);
                let from_wavl = wavl.remove(key);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::RankOf(key) => {
                let from_btree = btree
                    .contains_key(&key)
                    .then(|| btree.range(..=key).count());
                let from_wavl = wavl.rank_of(key);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Select(i) => {
                let len = btree.len();
                let from_btree = if len == 0 {
                    Err(WavlError::EmptyTree)
                } else if i == 0 || i > len {
                    Err(WavlError::IndexOutOfRange { index: i, len })
                } else {
                    Ok(btree.values().nth(i - 1).expect("index checked above"))
                };
                let from_wavl = wavl.select(i);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first_key_value().map(|(&k, v)| (k, v));
                let from_wavl = wavl.first_key_value();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_wavl = wavl.pop_first();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last_key_value().map(|(&k, v)| (k, v));
                let from_wavl = wavl.last_key_value();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_wavl = wavl.pop_last();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        wavl.assert_invariants();
        assert_eq!(btree.len(), wavl.len());
        assert!(btree
            .iter()
            .map(|(&k, v)| (k, v))
            .eq(wavl.iter()));
    }
}
