//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random keys, values, patterns and
//! operation sequences, plus a reference model to check them against.

use burrow_core::{CoreError, CoreResult, SetOptions, Tx};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// A single mutation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Set `key` to `value`.
    Set {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Delete `key` if present.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Remove every item.
    DeleteAll,
}

/// Strategy for keys drawn from a small alphabet, so operations collide.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::string::string_regex("[a-d:]{1,6}")
        .expect("Invalid regex")
        .prop_map(String::into_bytes)
}

/// Strategy for arbitrary values, including bytes the log must escape.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for glob patterns over the key alphabet.
pub fn pattern_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::string::string_regex("[a-d:*?]{0,5}")
        .expect("Invalid regex")
        .prop_map(String::into_bytes)
}

/// Strategy for a single operation. Whole-database deletes are rare.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (key_strategy(), value_strategy()).prop_map(|(key, value)| Op::Set { key, value }),
        3 => key_strategy().prop_map(|key| Op::Delete { key }),
        1 => Just(Op::DeleteAll),
    ]
}

/// Strategy for a batch of transactions, each a list of operations.
pub fn batches_strategy() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op_strategy(), 1..8), 1..10)
}

/// Applies `ops` inside a writable transaction. Deleting a missing key is
/// not an error.
pub fn apply_ops(tx: &mut Tx<'_>, ops: &[Op]) -> CoreResult<()> {
    for op in ops {
        match op {
            Op::Set { key, value } => {
                tx.set(key, value, SetOptions::new())?;
            }
            Op::Delete { key } => match tx.delete(key) {
                Ok(_) | Err(CoreError::NotFound) => {}
                Err(err) => return Err(err),
            },
            Op::DeleteAll => tx.delete_all()?,
        }
    }
    Ok(())
}

/// Reference model of the item store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    /// Expected contents in key order.
    pub items: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Model {
    /// Applies `ops` to the model.
    pub fn apply(&mut self, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Set { key, value } => {
                    self.items.insert(key.clone(), value.clone());
                }
                Op::Delete { key } => {
                    self.items.remove(key);
                }
                Op::DeleteAll => self.items.clear(),
            }
        }
    }

    /// Contents as `(key, value)` pairs in key order.
    pub fn pairs(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn test_keys_are_not_empty(key in key_strategy()) {
            prop_assert!(!key.is_empty());
        }

        #[test]
        fn test_model_delete_all_clears(ops in prop::collection::vec(op_strategy(), 0..20)) {
            let mut model = Model::default();
            model.apply(&ops);
            model.apply(&[Op::DeleteAll]);
            prop_assert!(model.items.is_empty());
        }
    }
}
