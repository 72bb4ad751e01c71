use core::any::{Any, TypeId, type_name};
use core::fmt;

use std::sync::Arc;

use crate::ser::ValueSerializer;
use crate::util::TypeIdMap;

use super::accessor::AccessError;
use super::bean::{BeanDescription, ErasedValue};
use super::shape::{MapShape, OptionalShape, SequenceShape, TypeShape};

// -----------------------------------------------------------------------------
// Converter

/// A value conversion applied before serialization.
///
/// The declared type is converted to `output_type` and the output type's
/// serializer does the writing, so the original type needs no serializer of
/// its own.
#[derive(Clone)]
pub struct Converter {
    output: TypeId,
    convert: Arc<dyn Fn(&dyn Any) -> Result<ErasedValue, AccessError> + Send + Sync>,
}

impl Converter {
    /// Creates a converter from a typed function.
    pub fn new<I, O>(convert: fn(&I) -> O) -> Self
    where
        I: Any,
        O: Any + Send + Sync,
    {
        Self {
            output: TypeId::of::<O>(),
            convert: Arc::new(move |value: &dyn Any| match value.downcast_ref::<I>() {
                Some(input) => Ok(ErasedValue::new(convert(input))),
                None => Err(AccessError::MismatchedOwner {
                    expected: type_name::<I>(),
                }),
            }),
        }
    }

    /// The type produced by the conversion.
    #[inline]
    pub const fn output_type(&self) -> TypeId {
        self.output
    }

    /// Runs the conversion.
    #[inline]
    pub fn convert(&self, value: &dyn Any) -> Result<ErasedValue, AccessError> {
        (self.convert)(value)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Converter")
    }
}

// -----------------------------------------------------------------------------
// TypeDescription

/// Everything registered about one serializable type.
///
/// Most fields are escape hatches consulted by the factory in a fixed
/// order: explicit serializer, then `serialize_as` refinement, then
/// converter, and only then shape-driven construction.
#[derive(Clone, Debug)]
pub struct TypeDescription {
    name: String,
    shape: TypeShape,
    serializer: Option<Arc<dyn ValueSerializer>>,
    serialize_as: Option<TypeId>,
    converter: Option<Converter>,
}

impl TypeDescription {
    /// Creates a description with the type's logical name and shape.
    pub fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            serializer: None,
            serialize_as: None,
            converter: None,
        }
    }

    /// Creates a bean-shaped description, taking the name from the bean.
    pub fn bean(description: BeanDescription) -> Self {
        Self::new(
            description.name().to_owned(),
            TypeShape::Bean(description),
        )
    }

    /// Forces a specific serializer, bypassing all shape handling.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ValueSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Serializes values of this type as if they were the named type.
    ///
    /// The target must be safely reachable by reference; the factory builds
    /// the target type's serializer and hands it this type's values.
    #[must_use]
    pub fn serialize_as<T: Any>(mut self) -> Self {
        self.serialize_as = Some(TypeId::of::<T>());
        self
    }

    /// Converts values of this type before serialization.
    #[must_use]
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    #[inline]
    pub fn serializer(&self) -> Option<&Arc<dyn ValueSerializer>> {
        self.serializer.as_ref()
    }

    #[inline]
    pub fn serialize_as_type(&self) -> Option<TypeId> {
        self.serialize_as
    }

    #[inline]
    pub fn converter(&self) -> Option<&Converter> {
        self.converter.as_ref()
    }
}

// -----------------------------------------------------------------------------
// DescriptionRegistry

/// The registry of [`TypeDescription`]s the factory introspects against.
///
/// Populated up front, before serialization starts; the provider holds it
/// behind an `Arc` and never mutates it afterwards.
///
/// # Examples
///
/// ```
/// use tokenbind::desc::{
///     Accessor, BeanDescription, DescriptionRegistry, PropertyDefinition,
/// };
///
/// struct Point { x: i32, y: i32 }
///
/// let mut registry = DescriptionRegistry::new();
/// registry.register_bean::<Point>(
///     BeanDescription::new("Point")
///         .with_property(
///             PropertyDefinition::new("x", Accessor::field(|p: &Point| &p.x))
///                 .with_type::<i32>(),
///         )
///         .with_property(
///             PropertyDefinition::new("y", Accessor::field(|p: &Point| &p.y))
///                 .with_type::<i32>(),
///         ),
/// );
///
/// assert!(registry.get_type::<Point>().is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct DescriptionRegistry {
    descriptions: TypeIdMap<Arc<TypeDescription>>,
}

impl DescriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    pub const fn new() -> Self {
        Self {
            descriptions: TypeIdMap::new(),
        }
    }

    /// Registers a description for type `T`, replacing any previous one.
    pub fn register<T: Any>(&mut self, description: TypeDescription) {
        self.descriptions
            .insert_type::<T>(Arc::new(description));
    }

    /// Registers a description under an explicit type id.
    pub fn register_with(&mut self, type_id: TypeId, description: TypeDescription) {
        self.descriptions.insert(type_id, Arc::new(description));
    }

    /// Registers a bean description for type `T`.
    pub fn register_bean<T: Any>(&mut self, description: BeanDescription) {
        self.register::<T>(TypeDescription::bean(description));
    }

    /// Registers sequence container `C` with element type `T`.
    pub fn register_sequence<C, T>(&mut self)
    where
        C: Any,
        T: Any,
        for<'a> &'a C: IntoIterator<Item = &'a T>,
    {
        self.register::<C>(TypeDescription::new(
            type_name::<C>(),
            TypeShape::Sequence(SequenceShape::of::<C, T>()),
        ));
    }

    /// Registers map container `M` with key `K` and value `V`.
    pub fn register_map<M, K, V>(&mut self)
    where
        M: Any,
        K: Any,
        V: Any,
        for<'a> &'a M: IntoIterator<Item = (&'a K, &'a V)>,
    {
        self.register::<M>(TypeDescription::new(
            type_name::<M>(),
            TypeShape::Map(MapShape::of::<M, K, V>()),
        ));
    }

    /// Registers `Option<T>`.
    pub fn register_optional<T: Any>(&mut self) {
        self.register::<Option<T>>(TypeDescription::new(
            type_name::<Option<T>>(),
            TypeShape::Optional(OptionalShape::of::<T>()),
        ));
    }

    /// Looks a description up by type id.
    #[inline]
    pub fn get(&self, type_id: &TypeId) -> Option<&Arc<TypeDescription>> {
        self.descriptions.get(type_id)
    }

    /// Looks a description up by type.
    #[inline]
    pub fn get_type<T: ?Sized + 'static>(&self) -> Option<&Arc<TypeDescription>> {
        self.descriptions.get_type::<T>()
    }

    /// The number of registered descriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converter_changes_the_serialized_type() {
        let converter = Converter::new(|value: &u8| u64::from(*value) * 2);
        assert_eq!(converter.output_type(), TypeId::of::<u64>());

        let out = converter.convert(&21_u8).unwrap();
        assert_eq!(out.as_any().downcast_ref::<u64>(), Some(&42));
    }

    #[test]
    fn registry_replaces_on_reregistration() {
        let mut registry = DescriptionRegistry::new();
        registry.register::<u8>(TypeDescription::new("first", TypeShape::Scalar));
        registry.register::<u8>(TypeDescription::new("second", TypeShape::Scalar));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_type::<u8>().unwrap().name(), "second");
    }
}
