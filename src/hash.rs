//! Hashing front-end for the trie.
//!
//! Keys are hashed with the selected hasher, the result is truncated to 32
//! bits, and a post-mixing step spreads entropy into the low bits before the
//! trie consumes the hash in 5-bit slices. The mixer is a compatibility
//! contract: any structure that wants to interoperate at the node level must
//! compute identical mixed hashes, so its exact outputs are pinned by tests.

use std::hash::{Hash, Hasher};

// =============================================================================
// Constants
// =============================================================================

/// Bits consumed per trie level.
pub(crate) const BITS_PER_LEVEL: u32 = 5;

/// Bit mask for extracting the index within a node.
pub(crate) const MASK: u32 = (1 << BITS_PER_LEVEL) - 1;

// =============================================================================
// Hasher selection
// =============================================================================

#[cfg(feature = "fxhash")]
type SelectedHasher = fxhash::FxHasher;

#[cfg(all(feature = "ahash", not(feature = "fxhash")))]
type SelectedHasher = ahash::AHasher;

#[cfg(not(any(feature = "fxhash", feature = "ahash")))]
type SelectedHasher = std::collections::hash_map::DefaultHasher;

// =============================================================================
// Mixing and slicing
// =============================================================================

/// Post-mixes a raw 32-bit hash to improve low-bit entropy.
///
/// All arithmetic wraps modulo 2^32 and all shifts are logical.
pub(crate) const fn mix(hash: u32) -> u32 {
    let mut mixed = hash.wrapping_add(!(hash << 9));
    mixed ^= mixed >> 14;
    mixed = mixed.wrapping_add(mixed << 4);
    mixed ^ (mixed >> 10)
}

/// Computes the mixed 32-bit hash of a key.
///
/// The raw hash is the low 32 bits of the selected hasher's output.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn mixed_hash<K: Hash + ?Sized>(key: &K) -> u32 {
    let mut hasher = SelectedHasher::default();
    key.hash(&mut hasher);
    mix(hasher.finish() as u32)
}

/// Extracts the 5-bit slot index of `hash` at the given bit offset.
///
/// `shift` is one of 0, 5, 10, 15, 20, 25, 30.
#[inline]
pub(crate) const fn hash_index(hash: u32, shift: u32) -> u32 {
    (hash >> shift) & MASK
}

// =============================================================================
// Tests
// =============================================================================
