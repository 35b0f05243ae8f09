//! Property-based tests for HamtMap.
//!
//! This module verifies that HamtMap satisfies various laws
//! and invariants using proptest.

use hamtree::{HamtMap, Resolver, TransientHamtMap};
use proptest::prelude::*;
use std::collections::HashMap;

// =============================================================================
// Strategy for generating test data
// =============================================================================

fn arbitrary_key() -> impl Strategy<Value = String> {
    "[a-z]{1,10}"
}

fn arbitrary_value() -> impl Strategy<Value = i32> {
    any::<i32>()
}

fn arbitrary_entry() -> impl Strategy<Value = (String, i32)> {
    (arbitrary_key(), arbitrary_value())
}

fn arbitrary_entries() -> impl Strategy<Value = Vec<(String, i32)>> {
    prop::collection::vec(arbitrary_entry(), 0..50)
}

/// One step of a builder workload.
#[derive(Clone, Debug)]
enum BuilderStep {
    Insert(String, i32),
    InsertAll(Vec<(String, i32)>),
    Remove(String),
}

fn arbitrary_builder_step() -> impl Strategy<Value = BuilderStep> {
    prop_oneof![
        arbitrary_entry().prop_map(|(key, value)| BuilderStep::Insert(key, value)),
        prop::collection::vec(arbitrary_entry(), 0..8).prop_map(BuilderStep::InsertAll),
        arbitrary_key().prop_map(BuilderStep::Remove),
    ]
}

// =============================================================================
// Get-Insert Law: map.insert(k, v).get(&k) == Some(&v)
// =============================================================================

proptest! {
    #[test]
    fn prop_get_insert_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let inserted = map.insert(key.clone(), value);

        prop_assert_eq!(inserted.get(&key), Some(&value));
    }
}

// =============================================================================
// Get-Insert-Other Law: k1 != k2 => map.insert(k1, v).get(&k2) == map.get(&k2)
// =============================================================================

proptest! {
    #[test]
    fn prop_get_insert_other_law(
        entries in arbitrary_entries(),
        key1 in arbitrary_key(),
        key2 in arbitrary_key(),
        value in arbitrary_value()
    ) {
        prop_assume!(key1 != key2);

        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let inserted = map.insert(key1, value);

        prop_assert_eq!(inserted.get(&key2), map.get(&key2));
    }
}

// =============================================================================
// Insert Idempotence: inserting the same pair twice changes nothing more
// =============================================================================

proptest! {
    #[test]
    fn prop_insert_idempotence_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let once = map.insert(key.clone(), value);
        let twice = once.insert(key, value);

        prop_assert_eq!(once, twice);
    }
}

// =============================================================================
// Remove-Get Law: map.remove(&k).get(&k) == None
// =============================================================================

proptest! {
    #[test]
    fn prop_remove_get_law(
        entries in arbitrary_entries(),
        key in arbitrary_key()
    ) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let removed = map.remove(&key);

        prop_assert_eq!(removed.get(&key), None);
    }
}

// =============================================================================
// Remove-Insert Law: !map.contains_key(&k) => map.insert(k, v).remove(&k) == map
// =============================================================================

proptest! {
    #[test]
    fn prop_remove_insert_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();

        if !map.contains_key(&key) {
            let inserted_then_removed = map.insert(key.clone(), value).remove(&key);
            prop_assert_eq!(inserted_then_removed, map);
        }
    }
}

// =============================================================================
// Length Law: len equals the number of distinct keys
// =============================================================================

proptest! {
    #[test]
    fn prop_length_matches_distinct_keys(entries in arbitrary_entries()) {
        let model: HashMap<String, i32> = entries.iter().cloned().collect();
        let map: HamtMap<String, i32> = entries.into_iter().collect();

        prop_assert_eq!(map.len(), model.len());
    }
}

// =============================================================================
// Round-Trip Law: iteration yields exactly the inserted multiset
// =============================================================================

proptest! {
    #[test]
    fn prop_iteration_round_trip(entries in arbitrary_entries()) {
        let model: HashMap<String, i32> = entries.iter().cloned().collect();
        let map: HamtMap<String, i32> = entries.into_iter().collect();

        let mut iterated: Vec<(String, i32)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        iterated.sort();
        let mut expected: Vec<(String, i32)> = model.into_iter().collect();
        expected.sort();

        prop_assert_eq!(iterated, expected);
    }
}

// =============================================================================
// Size Exactness: len always equals the iterator length
// =============================================================================

proptest! {
    #[test]
    fn prop_len_equals_iterator_count(
        entries in arbitrary_entries(),
        removals in prop::collection::vec(arbitrary_key(), 0..20)
    ) {
        let mut map: HamtMap<String, i32> = entries.into_iter().collect();
        for key in &removals {
            map = map.remove(key);
        }
        prop_assert_eq!(map.len(), map.iter().count());
    }
}

// =============================================================================
// Deterministic Iteration: same entries, same order, however constructed
// =============================================================================

proptest! {
    #[test]
    fn prop_iteration_is_deterministic(entries in arbitrary_entries()) {
        let forward: HamtMap<String, i32> = entries.iter().cloned().collect();
        let backward: HamtMap<String, i32> = entries.iter().rev().cloned().collect();

        // Deduplicate like a map would before comparing sequences: both maps
        // hold the same key set, so the sequences must be identical.
        prop_assume!(forward.len() == backward.len());
        let forward_keys: Vec<String> = forward.keys().cloned().collect();
        let backward_keys: Vec<String> = backward.keys().cloned().collect();
        prop_assert_eq!(forward_keys, backward_keys);
    }
}

// =============================================================================
// No-Mutation Law: derived maps never change their parent
// =============================================================================

proptest! {
    #[test]
    fn prop_operations_never_mutate_the_source(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let snapshot: Vec<(String, i32)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();

        let _inserted = map.insert(key.clone(), value);
        let _removed = map.remove(&key);
        let _filtered = map.filter(|_, v| v % 2 == 0);
        let _merged = map.merge(&HamtMap::singleton(key, value));
        let _split = map.split();

        let after: Vec<(String, i32)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(after, snapshot);
    }
}

// =============================================================================
// Merge Identity Law: merge with empty returns the other map, shared
// =============================================================================

proptest! {
    #[test]
    fn prop_merge_identity_law(entries in arbitrary_entries()) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let empty: HamtMap<String, i32> = HamtMap::new();

        let left_identity = empty.merge(&map);
        let right_identity = map.merge(&empty);

        prop_assert_eq!(&left_identity, &map);
        prop_assert_eq!(&right_identity, &map);
        prop_assert!(left_identity.shares_root(&map));
        prop_assert!(right_identity.shares_root(&map));
    }
}

// =============================================================================
// Merge Model Law: merge is the left-biased union
// =============================================================================

proptest! {
    #[test]
    fn prop_merge_matches_left_biased_union(
        left_entries in arbitrary_entries(),
        right_entries in arbitrary_entries()
    ) {
        let left: HamtMap<String, i32> = left_entries.iter().cloned().collect();
        let right: HamtMap<String, i32> = right_entries.iter().cloned().collect();

        let mut model: HashMap<String, i32> = right_entries.iter().cloned().collect();
        // Left values win on overlap.
        for (key, value) in left_entries {
            model.insert(key, value);
        }

        let merged = left.merge(&right);
        prop_assert_eq!(merged.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(merged.get(key), Some(value));
        }
    }
}

// =============================================================================
// Merge Associativity Law (default resolver)
// =============================================================================

proptest! {
    #[test]
    fn prop_merge_associativity_law(
        a_entries in arbitrary_entries(),
        b_entries in arbitrary_entries(),
        c_entries in arbitrary_entries()
    ) {
        let a: HamtMap<String, i32> = a_entries.into_iter().collect();
        let b: HamtMap<String, i32> = b_entries.into_iter().collect();
        let c: HamtMap<String, i32> = c_entries.into_iter().collect();

        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }
}

// =============================================================================
// Merge Commutes with a Commutative Resolver
// =============================================================================

proptest! {
    #[test]
    fn prop_merge_with_sum_resolver_is_commutative(
        left_entries in arbitrary_entries(),
        right_entries in arbitrary_entries()
    ) {
        let add: Resolver<String, i32> = Resolver::from_fn(|(key, a): (&String, &i32), (_, b): (&String, &i32)| {
            (key.clone(), a.wrapping_add(*b))
        });

        let left: HamtMap<String, i32> = left_entries.into_iter().collect();
        let right: HamtMap<String, i32> = right_entries.into_iter().collect();

        prop_assert_eq!(
            left.merge_with(&right, &add),
            right.merge_with(&left, &add)
        );
    }
}

// =============================================================================
// Filter Partition Law: filter and filter_not split the map exactly
// =============================================================================

proptest! {
    #[test]
    fn prop_filter_partition_law(entries in arbitrary_entries()) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let kept = map.filter(|_, value| value % 2 == 0);
        let dropped = map.filter_not(|_, value| value % 2 == 0);

        prop_assert_eq!(kept.len() + dropped.len(), map.len());
        prop_assert_eq!(kept.merge(&dropped), map.clone());
        for (key, value) in kept.iter() {
            prop_assert_eq!(map.get(key), Some(value));
            prop_assert!(!dropped.contains_key(key));
        }
    }
}

// =============================================================================
// Filter Model Law
// =============================================================================

proptest! {
    #[test]
    fn prop_filter_matches_model(entries in arbitrary_entries()) {
        let model: HashMap<String, i32> = entries.iter().cloned().collect();
        let map: HamtMap<String, i32> = entries.into_iter().collect();

        let filtered = map.filter(|key, _| key.len() > 3);
        let expected: HashMap<String, i32> = model
            .into_iter()
            .filter(|(key, _)| key.len() > 3)
            .collect();

        prop_assert_eq!(filtered.len(), expected.len());
        for (key, value) in &expected {
            prop_assert_eq!(filtered.get(key), Some(value));
        }
    }
}

// =============================================================================
// Split Union Law: the split parts reassemble into the original map
// =============================================================================

proptest! {
    #[test]
    fn prop_split_union_law(entries in arbitrary_entries()) {
        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let parts = map.split();

        prop_assert!(!parts.is_empty());
        prop_assert!(parts.len() <= 2);

        let total: usize = parts.iter().map(HamtMap::len).sum();
        prop_assert_eq!(total, map.len());

        let mut reunited: HamtMap<String, i32> = HamtMap::new();
        for part in &parts {
            reunited = reunited.merge(part);
        }
        prop_assert_eq!(reunited, map);
    }
}

// =============================================================================
// Builder Parity Law: any interleaving of builder steps matches a naive
// accumulator
// =============================================================================

proptest! {
    #[test]
    fn prop_builder_parity_law(
        steps in prop::collection::vec(arbitrary_builder_step(), 0..40)
    ) {
        let mut builder = TransientHamtMap::new();
        let mut model: HashMap<String, i32> = HashMap::new();

        for step in steps {
            match step {
                BuilderStep::Insert(key, value) => {
                    builder.insert(key.clone(), value);
                    model.insert(key, value);
                }
                BuilderStep::InsertAll(batch) => {
                    builder.extend(batch.iter().cloned());
                    model.extend(batch);
                }
                BuilderStep::Remove(key) => {
                    builder.remove(&key);
                    model.remove(&key);
                }
            }
        }

        let map = builder.persistent();
        prop_assert_eq!(map.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(map.get(key), Some(value));
        }
    }
}

// =============================================================================
// Insert-With Law: resolver output lands in the map
// =============================================================================

proptest! {
    #[test]
    fn prop_insert_with_applies_resolver(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let add: Resolver<String, i32> = Resolver::from_fn(|(k, a): (&String, &i32), (_, b): (&String, &i32)| {
            (k.clone(), a.wrapping_add(*b))
        });

        let map: HamtMap<String, i32> = entries.into_iter().collect();
        let expected = map.get(&key).map_or(value, |existing| existing.wrapping_add(value));

        let updated = map.insert_with(key.clone(), value, &add);
        prop_assert_eq!(updated.get(&key), Some(&expected));
    }
}
