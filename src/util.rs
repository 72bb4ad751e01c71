//! Hash containers used throughout the crate.
//!
//! Built on *hashbrown* and *foldhash*; `TypeId` keys use a pass-through
//! hasher since they are already high-quality hashes.

use core::any::TypeId;
use core::fmt::Debug;
use core::hash::{BuildHasher, Hasher};

use foldhash::fast::{FixedState, FoldHasher};
use hashbrown::hash_map::Entry;

// -----------------------------------------------------------------------------
// Hashers

const FIXED_HASH_STATE: FixedState = FixedState::with_seed(0x51C3_7D4A_90E2_6B18);

/// The crate's default hasher; the same input always hashes the same.
pub type FixedHasher = FoldHasher<'static>;

/// Build state for [`FixedHasher`], seeded with a compile-time constant so
/// hash order is stable across runs.
#[derive(Copy, Clone, Default, Debug)]
pub struct FixedHashState;

impl BuildHasher for FixedHashState {
    type Hasher = FixedHasher;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        FIXED_HASH_STATE.build_hasher()
    }
}

/// A hasher that forwards a single `u64` write as the finished hash.
///
/// `TypeId` feeds the map a value that is itself a hash, so running it
/// through a real hash function again buys nothing. Do not use this with
/// key types whose bits are not uniformly distributed.
#[derive(Copy, Clone, Default, Debug)]
pub struct NoOpHasher {
    hash: u64,
}

impl Hasher for NoOpHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.hash
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes.iter().rev() {
            self.hash = self.hash.rotate_left(8).wrapping_add(*byte as u64);
        }
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.hash = i;
    }
}

/// Hash state producing [`NoOpHasher`].
#[derive(Copy, Clone, Default, Debug)]
pub struct NoOpHashState;

impl BuildHasher for NoOpHashState {
    type Hasher = NoOpHasher;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        NoOpHasher { hash: 0 }
    }
}

// -----------------------------------------------------------------------------
// Aliases

/// The crate's default [`HashMap`](hashbrown::HashMap).
pub type HashMap<K, V> = hashbrown::HashMap<K, V, FixedHashState>;

/// The crate's default [`HashSet`](hashbrown::HashSet).
pub type HashSet<K> = hashbrown::HashSet<K, FixedHashState>;

// -----------------------------------------------------------------------------
// TypeIdMap

/// A map keyed by [`TypeId`], hashed with the pass-through hasher.
///
/// Exposes its own small method surface rather than derefing to the inner
/// map, which keeps the choice of backing map out of the public API.
pub struct TypeIdMap<V>(hashbrown::HashMap<TypeId, V, NoOpHashState>);

impl<V> TypeIdMap<V> {
    /// Creates an empty `TypeIdMap`.
    #[inline]
    pub const fn new() -> Self {
        Self(hashbrown::HashMap::with_hasher(NoOpHashState))
    }

    /// Inserts `f()` under `type_id` if the slot is vacant.
    ///
    /// Reports whether an insertion happened; an occupied slot is left
    /// untouched and `f` is never called.
    #[inline]
    pub fn try_insert(&mut self, type_id: TypeId, f: impl FnOnce() -> V) -> bool {
        match self.0.entry(type_id) {
            Entry::Vacant(entry) => {
                entry.insert(f());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Looks up the entry stored under `type_id`.
    pub fn get(&self, type_id: &TypeId) -> Option<&V> {
        self.0.get(type_id)
    }

    /// Looks up the entry stored under `T`'s type id.
    #[inline(always)]
    pub fn get_type<T: ?Sized + 'static>(&self) -> Option<&V> {
        self.get(&TypeId::of::<T>())
    }

    /// Stores `v` under `type_id`, handing back any displaced entry.
    pub fn insert(&mut self, type_id: TypeId, v: V) -> Option<V> {
        self.0.insert(type_id, v)
    }

    /// Stores `v` under `T`'s type id, handing back any displaced entry.
    #[inline(always)]
    pub fn insert_type<T: ?Sized + 'static>(&mut self, v: V) -> Option<V> {
        self.insert(TypeId::of::<T>(), v)
    }

    /// Whether an entry is stored under `type_id`.
    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.0.contains_key(type_id)
    }

    /// The number of stored entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every entry.
    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterates the stored values, in no particular order.
    #[inline]
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.0.values()
    }
}

impl<V> Default for TypeIdMap<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Clone for TypeIdMap<V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<V: Debug> Debug for TypeIdMap<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_id_map_roundtrip() {
        let mut map = TypeIdMap::<u32>::new();
        assert!(map.try_insert(TypeId::of::<String>(), || 7));
        assert!(!map.try_insert(TypeId::of::<String>(), || 8));
        assert_eq!(map.get_type::<String>(), Some(&7));
        assert_eq!(map.len(), 1);
    }
}
