//! Per-call object-identity tracking.
//!
//! Beans with object-id metadata write their full form on first sight and
//! a bare id on every later sight within the same top-level call. The
//! state lives in the serialize context, never in the shared serializers.

use core::any::{Any, TypeId};

use crate::desc::ObjectIdKeyFn;
use crate::util::HashMap;

// -----------------------------------------------------------------------------
// ObjKey

/// The identity under which an object is tracked.
///
/// Address identity is the default: two references are the same object only
/// if they alias. A registered key extractor switches the type to logical
/// identity, where distinct allocations carrying the same key collapse into
/// one serialized object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjKey {
    /// Pointer identity.
    Addr(usize),
    /// Logical identity: the value's type plus its extracted key.
    Keyed(TypeId, u64),
}

impl ObjKey {
    /// Computes the key for `value`.
    pub fn for_value(value: &dyn Any, key_fn: Option<&ObjectIdKeyFn>) -> Self {
        match key_fn {
            Some(key_fn) => Self::Keyed(value.type_id(), key_fn.key(value)),
            None => Self::Addr(value as *const dyn Any as *const () as usize),
        }
    }
}

// -----------------------------------------------------------------------------
// WritableObjectId

/// What was recorded when an object was first serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritableObjectId {
    /// A generated sequence id; re-references write this number.
    Sequence(u64),
    /// The id lives in one of the object's own properties; re-references
    /// re-read that property from the value at hand.
    Property,
}

// -----------------------------------------------------------------------------
// ObjectIdState

/// All object ids seen during one top-level serialize call.
#[derive(Debug, Default)]
pub struct ObjectIdState {
    entries: HashMap<ObjKey, WritableObjectId>,
    next: u64,
}

impl ObjectIdState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded id for `key`, if this object was already written.
    #[inline]
    pub fn get(&self, key: &ObjKey) -> Option<WritableObjectId> {
        self.entries.get(key).copied()
    }

    /// Records a first sighting under a fresh sequence id and returns it.
    ///
    /// Sequence ids start at 1 and increment per distinct object.
    pub fn record_sequence(&mut self, key: ObjKey) -> u64 {
        self.next += 1;
        let id = self.next;
        self.entries.insert(key, WritableObjectId::Sequence(id));
        id
    }

    /// Records a first sighting of a property-identified object.
    pub fn record_property(&mut self, key: ObjKey) {
        self.entries.insert(key, WritableObjectId::Property);
    }

    /// The number of distinct objects recorded so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ids_start_at_one() {
        let mut state = ObjectIdState::new();
        let a = ObjKey::Addr(0x10);
        let b = ObjKey::Addr(0x20);

        assert_eq!(state.record_sequence(a), 1);
        assert_eq!(state.record_sequence(b), 2);
        assert_eq!(state.get(&a), Some(WritableObjectId::Sequence(1)));
        assert_eq!(state.get(&ObjKey::Addr(0x30)), None);
    }

    #[test]
    fn keyed_identity_collapses_allocations() {
        let key_fn = ObjectIdKeyFn::new(|value| {
            u64::from(*value.downcast_ref::<u32>().unwrap_or(&0))
        });
        let first: u32 = 7;
        let second: u32 = 7;

        let a = ObjKey::for_value(&first, Some(&key_fn));
        let b = ObjKey::for_value(&second, Some(&key_fn));
        assert_eq!(a, b);

        let c = ObjKey::for_value(&first, None);
        let d = ObjKey::for_value(&second, None);
        assert_ne!(c, d);
    }
}
