//! Persistent (immutable) hash map based on HAMT.
//!
//! This module provides [`HamtMap`], an immutable hash map
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `HamtMap` is based on Hash Array Mapped Trie (HAMT), a data structure
//! that provides efficient immutable operations. It uses a 32-way branching
//! trie where 5-bit slices of a mixed 32-bit hash navigate the tree.
//!
//! - O(log32 N) get (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len and `is_empty`
//! - Merge cost proportional to the structural difference of the two maps
//!
//! All operations return new maps without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Examples
//!
//! ```rust
//! use hamtree::HamtMap;
//!
//! let map = HamtMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2)
//!     .insert("three".to_string(), 3);
//!
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(map.get("two"), Some(&2));
//! assert_eq!(map.get("three"), Some(&3));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```
//!
//! # Internal Structure
//!
//! The HAMT uses:
//! - 32-way branching (5 bits per level)
//! - A bitmap per internal node to track occupied slots
//! - Collision nodes for keys sharing a full 32-bit mixed hash
//! - Structural sharing via reference-counted nodes

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::iter::FromIterator;

use crate::ReferenceCounter;
use crate::hash::{BITS_PER_LEVEL, hash_index, mixed_hash};

#[cfg(feature = "rayon")]
use rayon::iter::plumbing::{Folder, UnindexedConsumer, UnindexedProducer, bridge_unindexed};
#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32).
const BRANCHING_FACTOR: usize = 32;

/// Capacity bound for the filter scratch buffer: one full node per level.
const FILTER_BUFFER_LIMIT: usize = BRANCHING_FACTOR * 7;

// =============================================================================
// Node Definition
// =============================================================================

/// Shared handle to a trie node.
type NodeRef<K, V> = ReferenceCounter<Node<K, V>>;

/// Internal node structure for the HAMT.
///
/// Nodes are immutable once published; every structural operation builds new
/// nodes along the touched path and shares everything else.
enum Node<K, V> {
    /// Absence of any entries.
    Empty,
    /// A single entry, with its mixed hash cached so restructuring never
    /// recomputes it.
    Leaf { hash: u32, key: K, value: V },
    /// Two or more entries whose keys share the full 32-bit mixed hash.
    /// Keys are pairwise distinct.
    Collision { hash: u32, entries: Vec<(K, V)> },
    /// Bitmap-indexed branch node. `bitmap` has one bit per occupied slot,
    /// `children` is the packed array of occupied slots in ascending bit
    /// order, and `size` is the total number of entries in the subtree.
    Trie {
        bitmap: u32,
        children: Vec<NodeRef<K, V>>,
        size: usize,
    },
}

impl<K, V> Node<K, V> {
    /// Number of entries in the subtree. O(1): stored on branch nodes.
    fn size(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Leaf { .. } => 1,
            Self::Collision { entries, .. } => entries.len(),
            Self::Trie { size, .. } => *size,
        }
    }

    fn is_trie(&self) -> bool {
        matches!(self, Self::Trie { .. })
    }

    /// Looks up the entry for `key`, comparing cached hashes before keys.
    fn get_entry<'a, Q>(&'a self, key: &Q, hash: u32, shift: u32) -> Option<(&'a K, &'a V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self {
            Self::Empty => None,
            Self::Leaf {
                hash: leaf_hash,
                key: leaf_key,
                value,
            } => {
                if *leaf_hash == hash && leaf_key.borrow() == key {
                    Some((leaf_key, value))
                } else {
                    None
                }
            }
            Self::Collision {
                hash: collision_hash,
                entries,
            } => {
                if *collision_hash != hash {
                    return None;
                }
                entries
                    .iter()
                    .find(|(entry_key, _)| entry_key.borrow() == key)
                    .map(|(entry_key, value)| (entry_key, value))
            }
            Self::Trie {
                bitmap, children, ..
            } => {
                let index = hash_index(hash, shift);
                // A fully dense node can index directly by the slice.
                if *bitmap == u32::MAX {
                    return children[index as usize].get_entry(key, hash, shift + BITS_PER_LEVEL);
                }
                let bit = 1u32 << index;
                if bitmap & bit == 0 {
                    return None;
                }
                let position = (bitmap & (bit - 1)).count_ones() as usize;
                children[position].get_entry(key, hash, shift + BITS_PER_LEVEL)
            }
        }
    }
}

// =============================================================================
// Node Operations: update / remove
// =============================================================================

impl<K: Clone + Eq, V: Clone> Node<K, V> {
    /// Inserts or replaces the entry for `key`, returning the new subtree.
    ///
    /// With no resolver the incoming value replaces an existing one. With a
    /// resolver, an existing entry is combined with the incoming entry as
    /// `resolver((existing_key, existing_value), (key, value))`.
    fn update(
        node: &NodeRef<K, V>,
        key: K,
        value: V,
        hash: u32,
        shift: u32,
        resolver: Option<&Resolver<K, V>>,
    ) -> NodeRef<K, V> {
        match &**node {
            Self::Empty => ReferenceCounter::new(Self::Leaf { hash, key, value }),
            Self::Leaf {
                hash: leaf_hash,
                key: leaf_key,
                value: leaf_value,
            } => {
                if hash == *leaf_hash {
                    if *leaf_key == key {
                        let (new_key, new_value) = match resolver {
                            None => (key, value),
                            Some(resolver) => {
                                resolver.resolve((leaf_key, leaf_value), (&key, &value))
                            }
                        };
                        ReferenceCounter::new(Self::Leaf {
                            hash,
                            key: new_key,
                            value: new_value,
                        })
                    } else {
                        // Full 32-bit hash collision (rare, but not impossible).
                        ReferenceCounter::new(Self::Collision {
                            hash,
                            entries: vec![(leaf_key.clone(), leaf_value.clone()), (key, value)],
                        })
                    }
                } else {
                    // Different hashes, but they may collide at this level;
                    // find a level at which they don't.
                    let incoming = ReferenceCounter::new(Self::Leaf { hash, key, value });
                    Self::make_trie(
                        *leaf_hash,
                        ReferenceCounter::clone(node),
                        hash,
                        incoming,
                        shift,
                        2,
                    )
                }
            }
            Self::Collision {
                hash: collision_hash,
                entries,
            } => {
                if hash == *collision_hash {
                    let mut new_entries = entries.clone();
                    let existing = new_entries
                        .iter()
                        .position(|(entry_key, _)| *entry_key == key);
                    match existing {
                        Some(position) => {
                            let replacement = match resolver {
                                None => (key, value),
                                Some(resolver) => {
                                    let (existing_key, existing_value) = &entries[position];
                                    resolver.resolve((existing_key, existing_value), (&key, &value))
                                }
                            };
                            new_entries[position] = replacement;
                        }
                        None => new_entries.push((key, value)),
                    }
                    ReferenceCounter::new(Self::Collision {
                        hash: *collision_hash,
                        entries: new_entries,
                    })
                } else {
                    let size = entries.len() + 1;
                    let incoming = ReferenceCounter::new(Self::Leaf { hash, key, value });
                    Self::make_trie(
                        *collision_hash,
                        ReferenceCounter::clone(node),
                        hash,
                        incoming,
                        shift,
                        size,
                    )
                }
            }
            Self::Trie {
                bitmap,
                children,
                size,
            } => {
                let index = hash_index(hash, shift);
                let bit = 1u32 << index;
                let position = (bitmap & (bit - 1)).count_ones() as usize;

                if bitmap & bit == 0 {
                    // Slot is free: splice in a new leaf.
                    let mut new_children = children.clone();
                    new_children
                        .insert(position, ReferenceCounter::new(Self::Leaf { hash, key, value }));
                    ReferenceCounter::new(Self::Trie {
                        bitmap: bitmap | bit,
                        children: new_children,
                        size: size + 1,
                    })
                } else {
                    let child = &children[position];
                    let new_child =
                        Self::update(child, key, value, hash, shift + BITS_PER_LEVEL, resolver);
                    if ReferenceCounter::ptr_eq(child, &new_child) {
                        return ReferenceCounter::clone(node);
                    }
                    let new_size = size + new_child.size() - child.size();
                    let mut new_children = children.clone();
                    new_children[position] = new_child;
                    ReferenceCounter::new(Self::Trie {
                        bitmap: *bitmap,
                        children: new_children,
                        size: new_size,
                    })
                }
            }
        }
    }

    /// Builds the minimal spine separating two nodes whose hashes differ,
    /// descending one level at a time until their 5-bit slices diverge.
    ///
    /// `size` is the entry count of the combined subtree.
    fn make_trie(
        hash0: u32,
        node0: NodeRef<K, V>,
        hash1: u32,
        node1: NodeRef<K, V>,
        shift: u32,
        size: usize,
    ) -> NodeRef<K, V> {
        let index0 = hash_index(hash0, shift);
        let index1 = hash_index(hash1, shift);
        if index0 == index1 {
            let child = Self::make_trie(hash0, node0, hash1, node1, shift + BITS_PER_LEVEL, size);
            ReferenceCounter::new(Self::Trie {
                bitmap: 1u32 << index0,
                children: vec![child],
                size,
            })
        } else {
            let bitmap = (1u32 << index0) | (1u32 << index1);
            let children = if index0 < index1 {
                vec![node0, node1]
            } else {
                vec![node1, node0]
            };
            ReferenceCounter::new(Self::Trie {
                bitmap,
                children,
                size,
            })
        }
    }

    /// Removes the entry for `key`. Returns the original handle when the key
    /// is absent, so callers can detect "no change" by pointer identity.
    fn remove<Q>(node: &NodeRef<K, V>, key: &Q, hash: u32, shift: u32) -> NodeRef<K, V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match &**node {
            Node::Empty => ReferenceCounter::clone(node),
            Node::Leaf {
                hash: leaf_hash,
                key: leaf_key,
                ..
            } => {
                if *leaf_hash == hash && leaf_key.borrow() == key {
                    ReferenceCounter::new(Node::Empty)
                } else {
                    ReferenceCounter::clone(node)
                }
            }
            Node::Collision {
                hash: collision_hash,
                entries,
            } => {
                if *collision_hash != hash {
                    return ReferenceCounter::clone(node);
                }
                let Some(position) = entries
                    .iter()
                    .position(|(entry_key, _)| entry_key.borrow() == key)
                else {
                    return ReferenceCounter::clone(node);
                };
                let mut remaining = entries.clone();
                remaining.remove(position);
                match remaining.len() {
                    0 => ReferenceCounter::new(Node::Empty),
                    1 => {
                        // Demote to a leaf.
                        let (remaining_key, remaining_value) = remaining.remove(0);
                        ReferenceCounter::new(Node::Leaf {
                            hash: *collision_hash,
                            key: remaining_key,
                            value: remaining_value,
                        })
                    }
                    _ => ReferenceCounter::new(Node::Collision {
                        hash: *collision_hash,
                        entries: remaining,
                    }),
                }
            }
            Node::Trie {
                bitmap,
                children,
                size,
            } => {
                let index = hash_index(hash, shift);
                let bit = 1u32 << index;
                if bitmap & bit == 0 {
                    return ReferenceCounter::clone(node);
                }
                let position = (bitmap & (bit - 1)).count_ones() as usize;
                let child = &children[position];
                let new_child = Self::remove(child, key, hash, shift + BITS_PER_LEVEL);
                if ReferenceCounter::ptr_eq(child, &new_child) {
                    return ReferenceCounter::clone(node);
                }
                if matches!(&*new_child, Node::Empty) {
                    let new_bitmap = bitmap & !bit;
                    if new_bitmap == 0 {
                        return ReferenceCounter::new(Node::Empty);
                    }
                    let mut new_children = children.clone();
                    new_children.remove(position);
                    // A trie never keeps a single non-trie child.
                    if let [lone] = new_children.as_slice() {
                        if !lone.is_trie() {
                            return ReferenceCounter::clone(lone);
                        }
                    }
                    ReferenceCounter::new(Node::Trie {
                        bitmap: new_bitmap,
                        children: new_children,
                        size: size - child.size(),
                    })
                } else if !new_child.is_trie() && children.len() == 1 {
                    // The lone subtree contracted below a trie: hoist it.
                    new_child
                } else {
                    let new_size = size - child.size() + new_child.size();
                    let mut new_children = children.clone();
                    new_children[position] = new_child;
                    ReferenceCounter::new(Node::Trie {
                        bitmap: *bitmap,
                        children: new_children,
                        size: new_size,
                    })
                }
            }
        }
    }
}

// =============================================================================
// Node Operations: filter / split
// =============================================================================

impl<K: Clone + Eq, V: Clone> Node<K, V> {
    /// Filters the subtree, keeping entries where `predicate` disagrees with
    /// `negate`. Returns `None` when nothing survives and the original handle
    /// when everything does.
    ///
    /// Branch nodes accumulate surviving children in `buffer` (shared across
    /// the whole recursion) instead of allocating per level; each call leaves
    /// the buffer length exactly as it found it.
    fn filter<P>(
        node: &NodeRef<K, V>,
        predicate: &mut P,
        negate: bool,
        buffer: &mut Vec<NodeRef<K, V>>,
    ) -> Option<NodeRef<K, V>>
    where
        P: FnMut(&K, &V) -> bool,
    {
        match &**node {
            Node::Empty => None,
            Node::Leaf { key, value, .. } => {
                (predicate(key, value) != negate).then(|| ReferenceCounter::clone(node))
            }
            Node::Collision { hash, entries } => {
                let mut surviving: Vec<(K, V)> = entries
                    .iter()
                    .filter(|(key, value)| predicate(key, value) != negate)
                    .cloned()
                    .collect();
                match surviving.len() {
                    0 => None,
                    len if len == entries.len() => Some(ReferenceCounter::clone(node)),
                    1 => {
                        let (key, value) = surviving.remove(0);
                        Some(ReferenceCounter::new(Node::Leaf {
                            hash: *hash,
                            key,
                            value,
                        }))
                    }
                    _ => Some(ReferenceCounter::new(Node::Collision {
                        hash: *hash,
                        entries: surviving,
                    })),
                }
            }
            Node::Trie {
                bitmap,
                children,
                size,
            } => {
                let offset = buffer.len();
                let mut kept = 0u32;
                let mut surviving_size = 0usize;
                for (position, child) in children.iter().enumerate() {
                    let mark = buffer.len();
                    let result = Self::filter(child, predicate, negate, buffer);
                    buffer.truncate(mark);
                    if let Some(result) = result {
                        surviving_size += result.size();
                        kept |= 1 << position;
                        buffer.push(result);
                    }
                }
                let surviving = buffer.len() - offset;
                if surviving == 0 {
                    None
                } else if surviving_size == *size {
                    // Every child survived unchanged.
                    buffer.truncate(offset);
                    Some(ReferenceCounter::clone(node))
                } else if surviving == 1 && !buffer[offset].is_trie() {
                    Some(buffer.swap_remove(offset))
                } else {
                    let new_children: Vec<NodeRef<K, V>> = buffer.drain(offset..).collect();
                    let new_bitmap = if new_children.len() == children.len() {
                        *bitmap
                    } else {
                        keep_bits(*bitmap, kept)
                    };
                    Some(ReferenceCounter::new(Node::Trie {
                        bitmap: new_bitmap,
                        children: new_children,
                        size: surviving_size,
                    }))
                }
            }
        }
    }

    /// Splits the subtree into one or two parts whose union is the subtree.
    fn split(node: &NodeRef<K, V>) -> Vec<NodeRef<K, V>> {
        match &**node {
            Node::Empty | Node::Leaf { .. } => vec![ReferenceCounter::clone(node)],
            Node::Collision { hash, entries } => {
                if entries.len() == 1 {
                    return vec![ReferenceCounter::clone(node)];
                }
                let midpoint = entries.len() / 2;
                let (low, high) = entries.split_at(midpoint);
                vec![
                    Self::collision_or_leaf(*hash, low.to_vec()),
                    Self::collision_or_leaf(*hash, high.to_vec()),
                ]
            }
            Node::Trie {
                bitmap,
                children,
                size,
            } => {
                if *size == 1 {
                    return vec![ReferenceCounter::clone(node)];
                }
                let slot_count = children.len();
                if slot_count > 1 {
                    let split_point = slot_count / 2;
                    let bit_split = nth_set_bit_position(*bitmap, split_point);
                    let low_mask = (1u32 << bit_split) - 1;
                    vec![
                        Self::trie_or_lone_child(
                            bitmap & low_mask,
                            children[..split_point].to_vec(),
                        ),
                        Self::trie_or_lone_child(
                            bitmap & !low_mask,
                            children[split_point..].to_vec(),
                        ),
                    ]
                } else {
                    Self::split(&children[0])
                }
            }
        }
    }

    /// Wraps surviving collision entries, demoting a singleton to a leaf.
    fn collision_or_leaf(hash: u32, mut entries: Vec<(K, V)>) -> NodeRef<K, V> {
        if entries.len() == 1 {
            let (key, value) = entries.remove(0);
            ReferenceCounter::new(Node::Leaf { hash, key, value })
        } else {
            ReferenceCounter::new(Node::Collision { hash, entries })
        }
    }

    /// Builds a trie over `children`, hoisting a lone non-trie child.
    fn trie_or_lone_child(bitmap: u32, children: Vec<NodeRef<K, V>>) -> NodeRef<K, V> {
        if let [lone] = children.as_slice() {
            if !lone.is_trie() {
                return ReferenceCounter::clone(lone);
            }
        }
        let size = children.iter().map(|child| child.size()).sum();
        ReferenceCounter::new(Node::Trie {
            bitmap,
            children,
            size,
        })
    }
}

/// Selects the bits of `bitmap` whose ordinal among its set bits is marked
/// in `kept`.
fn keep_bits(bitmap: u32, kept: u32) -> u32 {
    let mut result = 0u32;
    let mut current = bitmap;
    let mut kept = kept;
    while kept != 0 {
        let lsb = current ^ (current & current.wrapping_sub(1));
        if kept & 1 != 0 {
            result |= lsb;
        }
        current &= !lsb;
        kept >>= 1;
    }
    result
}

/// Bit index of the `n`-th (0-based) set bit of `bitmap`.
fn nth_set_bit_position(bitmap: u32, n: usize) -> u32 {
    let mut left = n as isize;
    let mut index: i64 = -1;
    let mut bits = bitmap;
    while left >= 0 {
        index += 1;
        if bits & 1 != 0 {
            left -= 1;
        }
        bits >>= 1;
    }
    index as u32
}

// =============================================================================
// Node Operations: merge
// =============================================================================

impl<K: Clone + Eq, V: Clone> Node<K, V> {
    /// Merges two subtrees at the same level into their union.
    ///
    /// Where both sides contain a key, `resolver` decides the kept entry and
    /// always sees the left side's entry as its first argument; recursing
    /// with flipped operands therefore flips the resolver. Subtrees shared
    /// between both sides are returned as-is whenever the resolver is
    /// directional, which keeps the cost proportional to the structural
    /// difference of the inputs.
    fn merge(
        left: &NodeRef<K, V>,
        right: &NodeRef<K, V>,
        shift: u32,
        resolver: &Resolver<K, V>,
    ) -> NodeRef<K, V> {
        match (&**left, &**right) {
            (Node::Empty, _) => ReferenceCounter::clone(right),
            (_, Node::Empty) => ReferenceCounter::clone(left),
            (Node::Leaf { hash, key, value }, _) => Self::update(
                right,
                key.clone(),
                value.clone(),
                *hash,
                shift,
                Some(&resolver.invert()),
            ),
            (Node::Collision { hash, entries }, _) => {
                let inverted = resolver.invert();
                let mut accumulator = ReferenceCounter::clone(right);
                for (key, value) in entries {
                    accumulator = Self::update(
                        &accumulator,
                        key.clone(),
                        value.clone(),
                        *hash,
                        shift,
                        Some(&inverted),
                    );
                }
                accumulator
            }
            (Node::Trie { .. }, Node::Leaf { hash, key, value }) => Self::update(
                left,
                key.clone(),
                value.clone(),
                *hash,
                shift,
                Some(resolver),
            ),
            (Node::Trie { .. }, Node::Collision { hash, entries }) => {
                let mut accumulator = ReferenceCounter::clone(left);
                for (key, value) in entries {
                    accumulator = Self::update(
                        &accumulator,
                        key.clone(),
                        value.clone(),
                        *hash,
                        shift,
                        Some(resolver),
                    );
                }
                accumulator
            }
            (
                Node::Trie {
                    bitmap: left_bitmap,
                    children: left_children,
                    ..
                },
                Node::Trie {
                    bitmap: right_bitmap,
                    children: right_children,
                    ..
                },
            ) => {
                let union = left_bitmap | right_bitmap;
                let slot_count = union.count_ones() as usize;
                let directional = resolver.is_directional();

                let mut merged: Vec<NodeRef<K, V>> = Vec::with_capacity(slot_count);
                let mut merged_size = 0usize;
                let mut this_bitmap = *left_bitmap;
                let mut that_bitmap = *right_bitmap;
                let mut this_position = 0usize;
                let mut that_position = 0usize;
                // The result can alias an input outright when every emitted
                // child came from that input.
                let mut can_be_left = true;
                let mut can_be_right = true;

                while merged.len() < slot_count {
                    let this_lsb = this_bitmap ^ (this_bitmap & this_bitmap.wrapping_sub(1));
                    let that_lsb = that_bitmap ^ (that_bitmap & that_bitmap.wrapping_sub(1));
                    if this_lsb == that_lsb {
                        // Slot occupied on both sides.
                        let left_child = &left_children[this_position];
                        let right_child = &right_children[that_position];
                        let merged_child =
                            if directional && ReferenceCounter::ptr_eq(left_child, right_child) {
                                ReferenceCounter::clone(left_child)
                            } else {
                                Self::merge(left_child, right_child, shift + BITS_PER_LEVEL, resolver)
                            };
                        can_be_left &= ReferenceCounter::ptr_eq(&merged_child, left_child);
                        can_be_right &= ReferenceCounter::ptr_eq(&merged_child, right_child);
                        merged_size += merged_child.size();
                        merged.push(merged_child);
                        this_bitmap &= !this_lsb;
                        that_bitmap &= !that_lsb;
                        this_position += 1;
                        that_position += 1;
                    } else if this_lsb.wrapping_sub(1) < that_lsb.wrapping_sub(1) {
                        // Slot only on the left. An exhausted bitmap has
                        // lsb 0, which wraps to the maximum and loses.
                        let left_child = &left_children[this_position];
                        can_be_right = false;
                        merged_size += left_child.size();
                        merged.push(ReferenceCounter::clone(left_child));
                        this_bitmap &= !this_lsb;
                        this_position += 1;
                    } else {
                        // Slot only on the right.
                        let right_child = &right_children[that_position];
                        can_be_left = false;
                        merged_size += right_child.size();
                        merged.push(ReferenceCounter::clone(right_child));
                        that_bitmap &= !that_lsb;
                        that_position += 1;
                    }
                }

                if can_be_left {
                    ReferenceCounter::clone(left)
                } else if can_be_right {
                    ReferenceCounter::clone(right)
                } else {
                    ReferenceCounter::new(Node::Trie {
                        bitmap: union,
                        children: merged,
                        size: merged_size,
                    })
                }
            }
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Conflict-resolution function type: receives the left entry and the right
/// entry, returns the kept entry.
type ResolverFunction<K, V> = dyn Fn((&K, &V), (&K, &V)) -> (K, V);

/// Decides which entry survives when two maps contain the same key.
///
/// A resolver always sees the entry of the *left* map (for
/// [`HamtMap::merge_with`]) or the *existing* entry (for
/// [`HamtMap::insert_with`]) as its first argument. [`Resolver::invert`]
/// swaps the argument order; the merge engine uses the inverted resolver
/// whenever it recurses with its operands flipped.
///
/// The default resolver keeps the first argument ("prefer left"). Both the
/// default and its invert are recognized structurally, which lets the merge
/// engine return subtrees shared between both inputs without visiting them.
///
/// The kept entry should carry one of the two argument keys: entries are
/// stored under the hash they collided at.
///
/// # Examples
///
/// ```rust
/// use hamtree::{HamtMap, Resolver};
///
/// let add: Resolver<String, i32> =
///     Resolver::from_fn(|(key, left): (&String, &i32), (_, right): (&String, &i32)| (key.clone(), left + right));
///
/// let map = HamtMap::new().insert("hits".to_string(), 1);
/// let map = map.insert_with("hits".to_string(), 2, &add);
/// assert_eq!(map.get("hits"), Some(&3));
/// ```
pub struct Resolver<K, V> {
    kind: ResolverKind<K, V>,
}

enum ResolverKind<K, V> {
    /// Keep the first (left / existing) entry. The default.
    KeepExisting,
    /// Keep the second (right / incoming) entry. The default's invert.
    KeepIncoming,
    Custom {
        function: ReferenceCounter<ResolverFunction<K, V>>,
        flipped: bool,
    },
}

impl<K, V> Resolver<K, V> {
    /// Wraps a conflict-resolution function.
    ///
    /// The function must be pure; it may be invoked once per overlapping
    /// key, in trie order.
    pub fn from_fn<F>(function: F) -> Self
    where
        F: Fn((&K, &V), (&K, &V)) -> (K, V) + 'static,
    {
        let function: ReferenceCounter<ResolverFunction<K, V>> = ReferenceCounter::new(function);
        Self {
            kind: ResolverKind::Custom {
                function,
                flipped: false,
            },
        }
    }

    /// Returns the resolver with its argument order swapped.
    ///
    /// Inverting twice restores the original resolver.
    #[must_use]
    pub fn invert(&self) -> Self {
        let kind = match &self.kind {
            ResolverKind::KeepExisting => ResolverKind::KeepIncoming,
            ResolverKind::KeepIncoming => ResolverKind::KeepExisting,
            ResolverKind::Custom { function, flipped } => ResolverKind::Custom {
                function: ReferenceCounter::clone(function),
                flipped: !flipped,
            },
        };
        Self { kind }
    }

    /// `true` for the default resolver and its invert, whose outcome on a
    /// subtree shared by both sides never requires visiting it.
    fn is_directional(&self) -> bool {
        !matches!(self.kind, ResolverKind::Custom { .. })
    }
}

impl<K: Clone, V: Clone> Resolver<K, V> {
    fn resolve(&self, left: (&K, &V), right: (&K, &V)) -> (K, V) {
        match &self.kind {
            ResolverKind::KeepExisting => (left.0.clone(), left.1.clone()),
            ResolverKind::KeepIncoming => (right.0.clone(), right.1.clone()),
            ResolverKind::Custom {
                function,
                flipped: false,
            } => (**function)(left, right),
            ResolverKind::Custom {
                function,
                flipped: true,
            } => (**function)(right, left),
        }
    }
}

impl<K, V> Default for Resolver<K, V> {
    /// The "prefer left" resolver: keeps the existing entry.
    fn default() -> Self {
        Self {
            kind: ResolverKind::KeepExisting,
        }
    }
}

impl<K, V> Clone for Resolver<K, V> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            ResolverKind::KeepExisting => ResolverKind::KeepExisting,
            ResolverKind::KeepIncoming => ResolverKind::KeepIncoming,
            ResolverKind::Custom { function, flipped } => ResolverKind::Custom {
                function: ReferenceCounter::clone(function),
                flipped: *flipped,
            },
        };
        Self { kind }
    }
}

impl<K, V> fmt::Debug for Resolver<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match &self.kind {
            ResolverKind::KeepExisting => "Resolver::KeepExisting",
            ResolverKind::KeepIncoming => "Resolver::KeepIncoming",
            ResolverKind::Custom { flipped: false, .. } => "Resolver::Custom",
            ResolverKind::Custom { flipped: true, .. } => "Resolver::Custom(inverted)",
        })
    }
}

// =============================================================================
// HamtMap Definition
// =============================================================================

/// A persistent (immutable) hash map based on HAMT.
///
/// `HamtMap` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log32 N)        |
/// | `insert`       | O(log32 N)        |
/// | `remove`       | O(log32 N)        |
/// | `contains_key` | O(log32 N)        |
/// | `len`          | O(1)              |
/// | `merge`        | O(structural difference) |
///
/// # Examples
///
/// ```rust
/// use hamtree::HamtMap;
///
/// let map = HamtMap::singleton("key".to_string(), 42);
/// assert_eq!(map.get("key"), Some(&42));
/// ```
#[derive(Clone)]
pub struct HamtMap<K, V> {
    /// Root node of the trie.
    root: NodeRef<K, V>,
}

impl<K, V> HamtMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map: HamtMap<String, i32> = HamtMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ReferenceCounter::new(Node::Empty),
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1): every node carries the size of its subtree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// assert_eq!(map.len(), 2);
    /// ```
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.size()
    }

    /// Returns `true` if the map contains no entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let empty: HamtMap<String, i32> = HamtMap::new();
    /// assert!(empty.is_empty());
    ///
    /// let non_empty = empty.insert("key".to_string(), 42);
    /// assert!(!non_empty.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if both maps share the same root node allocation.
    ///
    /// A `true` result implies the maps are equal; the converse does not
    /// hold. Useful for observing structural sharing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new().insert("a".to_string(), 1);
    /// let same = map.clone();
    /// assert!(map.shares_root(&same));
    /// ```
    #[must_use]
    pub fn shares_root(&self, other: &Self) -> bool {
        ReferenceCounter::ptr_eq(&self.root, &other.root)
    }

    /// Returns an iterator over key-value pairs.
    ///
    /// The iterator is lazy. Its order follows the trie structure: it is
    /// deterministic for a given key set, identical across maps holding the
    /// same entries, but unrelated to any natural key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// for (key, value) in map.iter() {
    ///     println!("{key}: {value}");
    /// }
    /// ```
    #[must_use]
    pub fn iter(&self) -> HamtMapIterator<'_, K, V> {
        HamtMapIterator::from_node(&self.root)
    }

    /// Returns an iterator over keys.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// assert_eq!(map.keys().count(), 2);
    /// ```
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let sum: i32 = map.values().sum();
    /// assert_eq!(sum, 3);
    /// ```
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

impl<K: Clone + Hash + Eq, V: Clone> HamtMap<K, V> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::singleton("key".to_string(), 42);
    /// assert_eq!(map.len(), 1);
    /// assert_eq!(map.get("key"), Some(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key-value pair corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new().insert("hello".to_string(), 42);
    /// let (key, value) = map.get_key_value("hello").unwrap();
    /// assert_eq!(key, "hello");
    /// assert_eq!(value, &42);
    /// ```
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = mixed_hash(key);
        self.root.get_entry(key, hash, 0)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new().insert("key".to_string(), 42);
    ///
    /// assert!(map.contains_key("key"));
    /// assert!(!map.contains_key("other"));
    /// ```
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains the key, the value is replaced.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map1 = HamtMap::new().insert("key".to_string(), 1);
    /// let map2 = map1.insert("key".to_string(), 2);
    ///
    /// assert_eq!(map1.get("key"), Some(&1)); // Original unchanged
    /// assert_eq!(map2.get("key"), Some(&2)); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = mixed_hash(&key);
        Self {
            root: Node::update(&self.root, key, value, hash, 0, None),
        }
    }

    /// Inserts a key-value pair, combining with any existing entry.
    ///
    /// When the key is absent this behaves like [`HamtMap::insert`]. When
    /// the key is present, `resolver` receives the existing entry and the
    /// incoming entry (in that order) and returns the kept entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::{HamtMap, Resolver};
    ///
    /// let add: Resolver<String, i32> =
    ///     Resolver::from_fn(|(key, left): (&String, &i32), (_, right): (&String, &i32)| (key.clone(), left + right));
    ///
    /// let map = HamtMap::new().insert("hits".to_string(), 1);
    /// let map = map.insert_with("hits".to_string(), 10, &add);
    /// assert_eq!(map.get("hits"), Some(&11));
    /// ```
    #[must_use]
    pub fn insert_with(&self, key: K, value: V, resolver: &Resolver<K, V>) -> Self {
        let hash = mixed_hash(&key);
        Self {
            root: Node::update(&self.root, key, value, hash, 0, Some(resolver)),
        }
    }

    /// Removes a key from the map.
    ///
    /// Returns a new map without the key. If the key doesn't exist,
    /// returns a map sharing the entire structure of the original.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let removed = map.remove("a");
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get("a"), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = mixed_hash(key);
        Self {
            root: Node::remove(&self.root, key, hash, 0),
        }
    }

    /// Updates, inserts, or removes a value for a key using one closure.
    ///
    /// The updater receives `Some(&V)` if the key exists, or `None` if it
    /// doesn't. If the updater returns `Some(V)`, the value is inserted or
    /// updated. If the updater returns `None`, the key is removed (if it
    /// exists).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new().insert("count".to_string(), 10);
    ///
    /// // Increment existing value
    /// let updated = map.update_with("count", |value| value.map(|v| v + 1));
    /// assert_eq!(updated.get("count"), Some(&11));
    ///
    /// // Remove by returning None
    /// let removed = map.update_with("count", |_| None);
    /// assert_eq!(removed.get("count"), None);
    /// ```
    #[must_use]
    pub fn update_with<Q, F>(&self, key: &Q, updater: F) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let current = self.get_key_value(key);
        let new_value = updater(current.map(|(_, value)| value));

        match (current, new_value) {
            (Some((stored_key, _)), Some(value)) => self.insert(stored_key.clone(), value),
            (Some(_), None) => self.remove(key),
            (None, Some(value)) => self.insert(key.to_owned(), value),
            (None, None) => self.clone(),
        }
    }

    /// Returns a map with only the entries satisfying the predicate.
    ///
    /// When every entry survives, the result shares the entire structure of
    /// the original map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map: HamtMap<i32, i32> = (0..10).map(|i| (i, i * i)).collect();
    /// let even = map.filter(|key, _| key % 2 == 0);
    /// assert_eq!(even.len(), 5);
    /// ```
    #[must_use]
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.filter_impl(predicate, false)
    }

    /// Returns a map with only the entries *not* satisfying the predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map: HamtMap<i32, i32> = (0..10).map(|i| (i, i * i)).collect();
    /// let odd = map.filter_not(|key, _| key % 2 == 0);
    /// assert_eq!(odd.len(), 5);
    /// ```
    #[must_use]
    pub fn filter_not<P>(&self, predicate: P) -> Self
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.filter_impl(predicate, true)
    }

    fn filter_impl<P>(&self, mut predicate: P, negate: bool) -> Self
    where
        P: FnMut(&K, &V) -> bool,
    {
        let capacity = self.len().saturating_add(6).min(FILTER_BUFFER_LIMIT);
        let mut buffer = Vec::with_capacity(capacity);
        match Node::filter(&self.root, &mut predicate, negate, &mut buffer) {
            Some(root) => Self { root },
            None => Self::new(),
        }
    }

    /// Merges two maps; on overlapping keys, the value from `self` wins.
    ///
    /// Subtrees shared between both maps are reused without being visited,
    /// so merging a map with a derived version of itself costs only the
    /// difference between them. Merging with an empty map returns a map
    /// sharing the entire structure of the other.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let left = HamtMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let right = HamtMap::new()
    ///     .insert("b".to_string(), 20)
    ///     .insert("c".to_string(), 3);
    ///
    /// let merged = left.merge(&right);
    ///
    /// assert_eq!(merged.get("a"), Some(&1));
    /// assert_eq!(merged.get("b"), Some(&2)); // Left value wins
    /// assert_eq!(merged.get("c"), Some(&3));
    /// ```
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        self.merge_with(other, &Resolver::default())
    }

    /// Merges two maps with a resolver deciding overlapping keys.
    ///
    /// The resolver always receives `self`'s entry as its first argument
    /// and `other`'s entry as its second, regardless of how the merge
    /// recursion flips its operands internally. The resolver must be pure;
    /// if it panics, the panic propagates and no partially-built map is
    /// observable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::{HamtMap, Resolver};
    ///
    /// let add: Resolver<String, i32> =
    ///     Resolver::from_fn(|(key, left): (&String, &i32), (_, right): (&String, &i32)| (key.clone(), left + right));
    ///
    /// let left = HamtMap::new().insert("a".to_string(), 1);
    /// let right = HamtMap::new().insert("a".to_string(), 2);
    /// let merged = left.merge_with(&right, &add);
    /// assert_eq!(merged.get("a"), Some(&3));
    /// ```
    #[must_use]
    pub fn merge_with(&self, other: &Self, resolver: &Resolver<K, V>) -> Self {
        Self {
            root: Node::merge(&self.root, &other.root, 0, resolver),
        }
    }

    /// Splits the map into one or two submaps whose union equals the map.
    ///
    /// The partition is implementation-defined but stable for a given tree,
    /// which makes it suitable for handing halves to parallel consumers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map: HamtMap<i32, i32> = (0..100).map(|i| (i, i)).collect();
    /// let parts = map.split();
    ///
    /// assert!(parts.len() <= 2);
    /// let total: usize = parts.iter().map(HamtMap::len).sum();
    /// assert_eq!(total, 100);
    /// ```
    #[must_use]
    pub fn split(&self) -> Vec<Self> {
        Node::split(&self.root)
            .into_iter()
            .map(|root| Self { root })
            .collect()
    }

    /// Returns a transient (builder) view seeded with this map's contents.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    ///
    /// let map = HamtMap::new().insert("a".to_string(), 1);
    /// let mut builder = map.transient();
    /// builder.insert("b".to_string(), 2);
    /// assert_eq!(builder.persistent().len(), 2);
    /// ```
    #[must_use]
    pub fn transient(&self) -> TransientHamtMap<K, V> {
        TransientHamtMap { map: self.clone() }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

enum IterFrame<'a, K, V> {
    Node(&'a Node<K, V>),
    Children(std::slice::Iter<'a, NodeRef<K, V>>),
    Entries(std::slice::Iter<'a, (K, V)>),
}

/// An iterator over key-value pairs of a [`HamtMap`].
///
/// Depth-first over the trie; sibling slots are visited in ascending bit
/// position, collision entries in their stored order.
pub struct HamtMapIterator<'a, K, V> {
    stack: Vec<IterFrame<'a, K, V>>,
    remaining: usize,
}

impl<'a, K, V> HamtMapIterator<'a, K, V> {
    fn from_node(root: &'a Node<K, V>) -> Self {
        let remaining = root.size();
        let stack = if remaining == 0 {
            Vec::new()
        } else {
            vec![IterFrame::Node(root)]
        };
        Self { stack, remaining }
    }
}

impl<'a, K, V> Iterator for HamtMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.pop()? {
                IterFrame::Node(node) => match node {
                    Node::Empty => {}
                    Node::Leaf { key, value, .. } => {
                        self.remaining -= 1;
                        return Some((key, value));
                    }
                    Node::Collision { entries, .. } => {
                        self.stack.push(IterFrame::Entries(entries.iter()));
                    }
                    Node::Trie { children, .. } => {
                        self.stack.push(IterFrame::Children(children.iter()));
                    }
                },
                IterFrame::Children(mut children) => {
                    if let Some(child) = children.next() {
                        self.stack.push(IterFrame::Children(children));
                        self.stack.push(IterFrame::Node(&**child));
                    }
                }
                IterFrame::Entries(mut entries) => {
                    if let Some((key, value)) = entries.next() {
                        self.stack.push(IterFrame::Entries(entries));
                        self.remaining -= 1;
                        return Some((key, value));
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for HamtMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over key-value pairs of a [`HamtMap`].
pub struct HamtMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for HamtMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for HamtMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Transient (builder)
// =============================================================================

/// A mutable builder over a [`HamtMap`].
///
/// A transient composes the persistent operations behind a `&mut` API, so
/// node invariants always hold and `persistent` is free. Other references
/// to maps it was seeded from are never affected.
///
/// # Examples
///
/// ```rust
/// use hamtree::TransientHamtMap;
///
/// let mut builder = TransientHamtMap::new();
/// builder.insert("a".to_string(), 1).insert("b".to_string(), 2);
/// builder.remove("a");
///
/// let map = builder.persistent();
/// assert_eq!(map.len(), 1);
/// assert_eq!(map.get("b"), Some(&2));
/// ```
#[derive(Clone)]
pub struct TransientHamtMap<K, V> {
    map: HamtMap<K, V>,
}

impl<K, V> TransientHamtMap<K, V> {
    /// Creates an empty transient map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HamtMap::new(),
        }
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Finalizes the builder into a persistent map.
    #[inline]
    #[must_use]
    pub fn persistent(self) -> HamtMap<K, V> {
        self.map
    }
}

impl<K: Clone + Hash + Eq, V: Clone> TransientHamtMap<K, V> {
    /// Inserts a key-value pair, replacing any existing value.
    pub fn insert(&mut self, key: K, value: V) -> &mut Self {
        self.map = self.map.insert(key, value);
        self
    }

    /// Removes a key.
    pub fn remove<Q>(&mut self, key: &Q) -> &mut Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map = self.map.remove(key);
        self
    }

    /// Returns a reference to the value corresponding to the key.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }
}

impl<K, V> Default for TransientHamtMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> Extend<(K, V)> for TransientHamtMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

// =============================================================================
// Parallel Iterator (rayon)
// =============================================================================

/// Parallel iterator over borrowed entries of a [`HamtMap`].
///
/// Work is divided along trie children, so splitting never copies entries
/// or allocates nodes.
#[cfg(feature = "rayon")]
pub struct HamtMapParallelIterator<'a, K, V> {
    root: &'a Node<K, V>,
}

#[cfg(feature = "rayon")]
struct SubtreeProducer<'a, K, V> {
    roots: Vec<&'a Node<K, V>>,
}

#[cfg(feature = "rayon")]
impl<'a, K: Sync + Send, V: Sync + Send> UnindexedProducer for SubtreeProducer<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn split(mut self) -> (Self, Option<Self>) {
        if self.roots.len() > 1 {
            let tail = self.roots.split_off(self.roots.len() / 2);
            return (self, Some(Self { roots: tail }));
        }
        if let Some(Node::Trie { children, .. }) = self.roots.first().copied() {
            if children.len() > 1 {
                let (low, high) = children.split_at(children.len() / 2);
                return (
                    Self {
                        roots: low.iter().map(|child| &**child).collect(),
                    },
                    Some(Self {
                        roots: high.iter().map(|child| &**child).collect(),
                    }),
                );
            }
        }
        (self, None)
    }

    fn fold_with<F>(self, mut folder: F) -> F
    where
        F: Folder<Self::Item>,
    {
        for root in self.roots {
            folder = folder.consume_iter(HamtMapIterator::from_node(root));
            if folder.full() {
                break;
            }
        }
        folder
    }
}

#[cfg(feature = "rayon")]
impl<'a, K: Sync + Send, V: Sync + Send> ParallelIterator for HamtMapParallelIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn drive_unindexed<C>(self, consumer: C) -> C::Result
    where
        C: UnindexedConsumer<Self::Item>,
    {
        bridge_unindexed(
            SubtreeProducer {
                roots: vec![self.root],
            },
            consumer,
        )
    }
}

#[cfg(feature = "rayon")]
impl<K: Sync + Send, V: Sync + Send> HamtMap<K, V> {
    /// Returns a parallel iterator over key-value pairs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hamtree::HamtMap;
    /// use rayon::prelude::*;
    ///
    /// let map: HamtMap<i32, i32> = (0..1000).map(|i| (i, i)).collect();
    /// let total: i32 = map.par_iter().map(|(_, value)| value).sum();
    /// assert_eq!(total, (0..1000).sum());
    /// ```
    #[must_use]
    pub fn par_iter(&self) -> HamtMapParallelIterator<'_, K, V> {
        HamtMapParallelIterator { root: &self.root }
    }
}

#[cfg(feature = "rayon")]
impl<'a, K: Sync + Send, V: Sync + Send> IntoParallelIterator for &'a HamtMap<K, V> {
    type Item = (&'a K, &'a V);
    type Iter = HamtMapParallelIterator<'a, K, V>;

    fn into_par_iter(self) -> Self::Iter {
        self.par_iter()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for HamtMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> FromIterator<(K, V)> for HamtMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut transient = TransientHamtMap::new();
        transient.extend(iter);
        transient.persistent()
    }
}

impl<K: Clone, V: Clone> IntoIterator for HamtMap<K, V> {
    type Item = (K, V);
    type IntoIter = HamtMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        HamtMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a HamtMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = HamtMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq for HamtMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter()
            .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Eq> Eq for HamtMap<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for HamtMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
