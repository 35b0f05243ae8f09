//! # hamtree
//!
//! Persistent (immutable) hash map based on a hash array mapped trie (HAMT).
//!
//! ## Overview
//!
//! This crate provides [`HamtMap`], an immutable map that uses structural
//! sharing for efficient functional updates. The trie branches 32 ways per
//! level, navigated by 5-bit slices of a post-mixed 32-bit hash:
//!
//! - O(log32 N) get, insert, remove (effectively O(1) for practical sizes)
//! - O(1) len and `is_empty`
//! - Structural merge of two maps whose cost scales with the structural
//!   difference of the tries, not with their total size
//! - `filter`, `split` (for parallel consumers), deterministic iteration
//!
//! Every operation returns a new map without modifying the original; nodes
//! are never mutated after they are published, so any number of readers may
//! traverse shared structure concurrently.
//!
//! ## Feature Flags
//!
//! - `arc`: share nodes via `Arc` instead of `Rc` (thread-safe)
//! - `rayon`: parallel iteration over entries (implies `arc`)
//! - `fxhash` / `ahash`: fast non-cryptographic hashers
//! - `full`: `arc` + `rayon`
//!
//! ## Example
//!
//! ```rust
//! use hamtree::HamtMap;
//!
//! let map = HamtMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//!
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: proptest generates large arrays in property tests for nested types
#![cfg_attr(test, allow(clippy::large_stack_arrays))]

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod hash;
mod map;

pub use map::HamtMap;
pub use map::HamtMapIntoIterator;
pub use map::HamtMapIterator;
pub use map::Resolver;
pub use map::TransientHamtMap;

#[cfg(feature = "rayon")]
pub use map::HamtMapParallelIterator;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod reference_counter_tests {
    use super::ReferenceCounter;
    use rstest::rstest;

    #[rstest]
    fn test_reference_counter_clone() {
        let reference_counter: ReferenceCounter<i32> = ReferenceCounter::new(42);
        let reference_counter_clone = reference_counter.clone();
        assert_eq!(*reference_counter, *reference_counter_clone);
    }

    #[rstest]
    fn test_reference_counter_pointer_equality() {
        let reference_counter: ReferenceCounter<i32> = ReferenceCounter::new(42);
        let reference_counter_clone = ReferenceCounter::clone(&reference_counter);
        assert!(ReferenceCounter::ptr_eq(
            &reference_counter,
            &reference_counter_clone
        ));

        let other: ReferenceCounter<i32> = ReferenceCounter::new(42);
        assert!(!ReferenceCounter::ptr_eq(&reference_counter, &other));
    }
}
