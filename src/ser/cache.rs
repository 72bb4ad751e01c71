//! The shared serializer cache.
//!
//! Two tiers: a mutex-guarded authoritative map that construction and
//! resolution run under, and a lock-light read snapshot rebuilt on demand
//! after mutations. Steady-state serialization touches only the snapshot.
//!
//! Lock ordering: the snapshot lock is never taken while the authoritative
//! mutex is held by the same thread, except inside the snapshot rebuild,
//! which takes them in snapshot-then-shared order. Mutating callers drop
//! the shared guard before invalidating the snapshot.

use core::any::TypeId;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::trace;

use crate::util::HashMap;

use super::ValueSerializer;

// -----------------------------------------------------------------------------
// CacheKey

/// Cache key: the value type plus whether the entry carries polymorphic
/// type metadata. The two usages cache independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) type_id: TypeId,
    pub(crate) typed: bool,
}

impl CacheKey {
    #[inline]
    pub(crate) const fn untyped(type_id: TypeId) -> Self {
        Self {
            type_id,
            typed: false,
        }
    }

    #[inline]
    pub(crate) const fn typed(type_id: TypeId) -> Self {
        Self {
            type_id,
            typed: true,
        }
    }
}

// -----------------------------------------------------------------------------
// CacheShared

type SerializerMap = HashMap<CacheKey, Arc<dyn ValueSerializer>>;

/// The authoritative cache state, accessed under the construction mutex.
pub(crate) struct CacheShared {
    serializers: SerializerMap,
    order: VecDeque<CacheKey>,
    limit: usize,
}

impl CacheShared {
    fn new(limit: usize) -> Self {
        Self {
            serializers: HashMap::default(),
            order: VecDeque::new(),
            limit,
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: &CacheKey) -> Option<Arc<dyn ValueSerializer>> {
        self.serializers.get(key).map(Arc::clone)
    }

    /// Inserts an entry without enforcing the limit.
    ///
    /// The bound is applied separately by [`CacheShared::trim_to_limit`]
    /// once a top-level resolution has finished; evicting here could drop
    /// an entry that a recursive lookup still needs mid-resolution.
    pub(crate) fn insert(&mut self, key: CacheKey, serializer: Arc<dyn ValueSerializer>) {
        if self.serializers.insert(key, serializer).is_none() {
            self.order.push_back(key);
        }
    }

    /// Evicts oldest insertions until the entry count is back within the
    /// limit. A runaway set of distinct types degrades throughput, not
    /// memory.
    pub(crate) fn trim_to_limit(&mut self) {
        while self.serializers.len() > self.limit {
            match self.order.pop_front() {
                Some(oldest) => {
                    trace!(typed = oldest.typed, "evicting cached serializer");
                    self.serializers.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Removes an entry; used to back out a publication whose resolution
    /// failed.
    pub(crate) fn remove(&mut self, key: &CacheKey) {
        if self.serializers.remove(key).is_some() {
            self.order.retain(|entry| entry != key);
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.serializers.len()
    }

    fn clear(&mut self) {
        self.serializers.clear();
        self.order.clear();
    }
}

// -----------------------------------------------------------------------------
// SerializerCache

/// The two-tier serializer cache shared by all clones of a provider.
pub struct SerializerCache {
    shared: Mutex<CacheShared>,
    snapshot: RwLock<Option<Arc<SerializerMap>>>,
}

impl SerializerCache {
    /// Creates a cache holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            shared: Mutex::new(CacheShared::new(limit)),
            snapshot: RwLock::new(None),
        }
    }

    /// Snapshot lookup; rebuilds the snapshot if a mutation invalidated it.
    pub(crate) fn lookup(&self, key: &CacheKey) -> Option<Arc<dyn ValueSerializer>> {
        {
            let snapshot = self
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(map) = snapshot.as_ref() {
                return map.get(key).map(Arc::clone);
            }
        }

        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let map = snapshot.get_or_insert_with(|| {
            let shared = self
                .shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::new(shared.serializers.clone())
        });
        map.get(key).map(Arc::clone)
    }

    /// Locks the authoritative state for construction and resolution.
    pub(crate) fn lock_shared(&self) -> MutexGuard<'_, CacheShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the size bound. Called after a construction pass, once the
    /// shared guard has been released.
    pub(crate) fn trim_to_limit(&self) {
        self.lock_shared().trim_to_limit();
    }

    /// Discards the read snapshot; the next lookup rebuilds it.
    pub(crate) fn invalidate_snapshot(&self) {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *snapshot = None;
    }

    /// Drops every cached serializer.
    pub fn flush(&self) {
        self.lock_shared().clear();
        self.invalidate_snapshot();
    }

    /// The number of cached entries.
    pub fn len(&self) -> usize {
        self.lock_shared().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for SerializerCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerializerCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::ser::NullSerializer;

    use super::*;

    fn key(marker: u32) -> CacheKey {
        // Distinct TypeIds for tests, taken from distinct const generics.
        fn type_id_for(marker: u32) -> TypeId {
            match marker {
                0 => TypeId::of::<[(); 0]>(),
                1 => TypeId::of::<[(); 1]>(),
                2 => TypeId::of::<[(); 2]>(),
                3 => TypeId::of::<[(); 3]>(),
                _ => TypeId::of::<[(); 4]>(),
            }
        }
        CacheKey::untyped(type_id_for(marker))
    }

    fn entry() -> Arc<dyn ValueSerializer> {
        Arc::new(NullSerializer::new())
    }

    #[test]
    fn trim_drops_oldest_insertions() {
        let cache = SerializerCache::new(2);
        {
            let mut shared = cache.lock_shared();
            shared.insert(key(0), entry());
            shared.insert(key(1), entry());
            shared.insert(key(2), entry());
        }
        cache.trim_to_limit();
        cache.invalidate_snapshot();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key(0)).is_none());
        assert!(cache.lookup(&key(1)).is_some());
        assert!(cache.lookup(&key(2)).is_some());
    }

    #[test]
    fn inserts_beyond_the_limit_survive_until_trimmed() {
        let cache = SerializerCache::new(1);
        {
            let mut shared = cache.lock_shared();
            shared.insert(key(0), entry());
            shared.insert(key(1), entry());
            shared.insert(key(2), entry());
            // Every entry stays reachable while the guard is held, even
            // though the cache is over its limit.
            assert!(shared.get(&key(0)).is_some());
            assert!(shared.get(&key(1)).is_some());
            assert!(shared.get(&key(2)).is_some());
        }
        cache.trim_to_limit();
        cache.invalidate_snapshot();
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&key(2)).is_some());
    }

    #[test]
    fn snapshot_is_rebuilt_after_invalidation() {
        let cache = SerializerCache::new(8);
        assert!(cache.lookup(&key(0)).is_none());

        {
            let mut shared = cache.lock_shared();
            shared.insert(key(0), entry());
        }
        // Stale snapshot until invalidated.
        assert!(cache.lookup(&key(0)).is_none());
        cache.invalidate_snapshot();
        assert!(cache.lookup(&key(0)).is_some());
    }

    #[test]
    fn typed_and_untyped_entries_are_distinct() {
        let cache = SerializerCache::new(8);
        {
            let mut shared = cache.lock_shared();
            shared.insert(CacheKey::untyped(TypeId::of::<u8>()), entry());
        }
        cache.invalidate_snapshot();

        assert!(cache.lookup(&CacheKey::untyped(TypeId::of::<u8>())).is_some());
        assert!(cache.lookup(&CacheKey::typed(TypeId::of::<u8>())).is_none());
    }

    #[test]
    fn flush_empties_everything() {
        let cache = SerializerCache::new(8);
        {
            let mut shared = cache.lock_shared();
            shared.insert(key(0), entry());
        }
        cache.flush();
        assert!(cache.is_empty());
        assert!(cache.lookup(&key(0)).is_none());
    }
}
