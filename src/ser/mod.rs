//! Serializer construction and execution.
//!
//! The [`ValueSerializer`] trait is the single execution contract: one
//! immutable, shareable object per (type, usage) that writes values of that
//! type into a [`Generator`]. Construction flows through the
//! [`BeanSerializerFactory`], results are shared through the
//! [`SerializerCache`], and beans are assembled by the
//! [`BeanSerializerBuilder`] pipeline.

use core::any::{Any, TypeId};
use core::fmt;

use std::sync::{Arc, Mutex, PoisonError};

use crate::desc::PropertyDefinition;
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};

// -----------------------------------------------------------------------------
// Modules

mod any_getter;
mod bean;
mod builder;
mod cache;
mod containers;
mod factory;
mod filter;
mod modifier;
mod object_id;
mod property;
mod std_types;

// -----------------------------------------------------------------------------
// Exports

pub use any_getter::AnyGetterWriter;
pub use bean::BeanSerializer;
pub use builder::BeanSerializerBuilder;
pub use cache::SerializerCache;
pub use containers::{
    MapSerializer, OptionalSerializer, ReferenceSerializer, SequenceSerializer,
};
pub use factory::BeanSerializerFactory;
pub use filter::{PropertyFilter, SimplePropertyFilter};
pub use modifier::SerializerModifier;
pub use object_id::{ObjKey, ObjectIdState, WritableObjectId};
pub use property::BeanPropertyWriter;
pub use std_types::{NullSerializer, UnknownSerializer, std_serializer};

pub(crate) use cache::{CacheKey, CacheShared};

// -----------------------------------------------------------------------------
// TypeSerializer

/// Polymorphic type metadata emitted alongside a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSerializer {
    /// Wrap the value in a single-field object whose field name is the
    /// type id: `{ "<type id>": value }`.
    WrapperObject { type_id: String },
    /// Emit the type id as an extra leading property inside the value's
    /// own object. Serializers that do not produce an object fall back to
    /// wrapper form. A declared property with the same name keeps the
    /// field; the type id is then not emitted.
    Property { name: String, type_id: String },
}

impl TypeSerializer {
    /// The type id carried by this metadata.
    pub fn type_id(&self) -> &str {
        match self {
            Self::WrapperObject { type_id } | Self::Property { type_id, .. } => type_id,
        }
    }
}

// -----------------------------------------------------------------------------
// ValueSerializer

/// A serializer for values of one logical type.
///
/// Instances are immutable after the resolution phase and shared freely
/// across threads; all per-call state lives in the [`SerializeCx`].
///
/// The lifecycle has three phases. [`resolve`](ValueSerializer::resolve)
/// runs once, right after construction and after the instance is already
/// published to the cache, so cyclic type graphs resolve against the
/// partially initialized entry instead of recursing forever.
/// [`create_contextual`](ValueSerializer::create_contextual) then lets the
/// serializer specialize itself to the property it will serialize through
/// (returning `None` keeps the blueprint instance). Finally
/// [`serialize`](ValueSerializer::serialize) runs per value.
pub trait ValueSerializer: Send + Sync + fmt::Debug {
    /// Writes `value` into `out`.
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError>;

    /// Writes `value` together with polymorphic type metadata.
    ///
    /// The default wraps the plain output in a `{ "<type id>": value }`
    /// object; serializers that produce objects themselves may inline the
    /// id as a property instead.
    fn serialize_with_type(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
        type_ser: &TypeSerializer,
    ) -> Result<(), SerError> {
        out.write_start_object()?;
        out.write_field_name(type_ser.type_id())?;
        self.serialize(value, out, cx)?;
        out.write_end_object()?;
        Ok(())
    }

    /// Completes construction against the resolution context.
    ///
    /// Called exactly once, after the instance has been published to the
    /// cache. Dependent serializers fetched here may therefore be this
    /// very instance.
    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        let _ = cx;
        Ok(())
    }

    /// Specializes this serializer to a property's annotations.
    ///
    /// `Ok(None)` keeps the blueprint instance; `Ok(Some(_))` substitutes a
    /// specialized copy (the blueprint itself stays cached unchanged).
    fn create_contextual(
        &self,
        cx: &mut ResolveCx<'_, '_>,
        property: Option<&PropertyDefinition>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        let _ = (cx, property);
        Ok(None)
    }

    /// Emptiness per this serializer's own definition, consulted by the
    /// `NonEmpty` inclusion rule. Defaults to "never empty".
    fn is_empty(&self, cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        let _ = (cx, value);
        false
    }

    /// Value equality per this serializer, consulted by the `NonDefault`
    /// inclusion rule. Defaults to "never equal", which degrades
    /// `NonDefault` to `Always` rather than guessing.
    fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        let _ = (a, b);
        false
    }

    /// Whether this serializer participates in object-id handling.
    ///
    /// The self-reference guard stands down for such serializers since the
    /// id mechanism already breaks the cycle.
    fn uses_object_id(&self) -> bool {
        false
    }
}

// -----------------------------------------------------------------------------
// DynamicSerializers

const DYNAMIC_CACHE_LIMIT: usize = 8;

/// A small per-site cache for serializers looked up by runtime type.
///
/// Property writers and container serializers whose declared type is not
/// final keep one of these so repeated values of the same few runtime types
/// skip the shared cache. The list is append-only and bounded; call sites
/// that see more distinct types than the bound fall through to the shared
/// cache for the rest.
#[derive(Default)]
pub struct DynamicSerializers {
    entries: Mutex<Vec<(TypeId, Arc<dyn ValueSerializer>)>>,
}

impl DynamicSerializers {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a serializer up by runtime type.
    pub fn find(&self, type_id: TypeId) -> Option<Arc<dyn ValueSerializer>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .find(|(id, _)| *id == type_id)
            .map(|(_, serializer)| Arc::clone(serializer))
    }

    /// Records a lookup result, if the bound permits.
    pub fn insert(&self, type_id: TypeId, serializer: Arc<dyn ValueSerializer>) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.len() < DYNAMIC_CACHE_LIMIT && !entries.iter().any(|(id, _)| *id == type_id) {
            entries.push((type_id, serializer));
        }
    }

    /// Finds a serializer for the runtime type of `value`, consulting the
    /// shared cache (and recording locally) on a miss.
    pub fn serializer_for(
        &self,
        cx: &mut SerializeCx<'_>,
        value: &dyn Any,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        let type_id = value.type_id();
        if let Some(serializer) = self.find(type_id) {
            return Ok(serializer);
        }
        let serializer = cx.find_value_serializer(type_id)?;
        self.insert(type_id, Arc::clone(&serializer));
        Ok(serializer)
    }
}

impl fmt::Debug for DynamicSerializers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicSerializers").finish_non_exhaustive()
    }
}
