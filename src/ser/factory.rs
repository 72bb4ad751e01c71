//! Serializer construction.
//!
//! The factory turns a type id plus its registered description into a
//! serializer. Candidate sources are tried in a fixed order; the first one
//! that claims the type wins. Everything here runs under the cache's
//! construction lock, via the resolve context.

use core::any::{Any, TypeId};
use core::fmt;

use std::sync::{Arc, OnceLock};

use crate::desc::{Converter, TypeDescription, TypeShape};
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};

use super::builder::BeanSerializerBuilder;
use super::containers::{
    MapSerializer, OptionalSerializer, ReferenceSerializer, SequenceSerializer,
};
use super::modifier::SerializerModifier;
use super::std_types::{std_serializer, UnknownSerializer};
use super::ValueSerializer;

// -----------------------------------------------------------------------------
// ConverterSerializer

/// Delegates to the converter's output type after converting the value.
struct ConverterSerializer {
    converter: Converter,
    delegate: OnceLock<Arc<dyn ValueSerializer>>,
}

impl ConverterSerializer {
    fn delegate_for(
        &self,
        cx: &mut SerializeCx<'_>,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        match self.delegate.get() {
            Some(delegate) => Ok(Arc::clone(delegate)),
            None => cx.find_value_serializer(self.converter.output_type()),
        }
    }
}

impl ValueSerializer for ConverterSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let delegate = self.delegate_for(cx)?;
        let converted = self.converter.convert(value).map_err(SerError::value)?;
        delegate.serialize(converted.as_any(), out, cx)
    }

    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        let delegate = cx.find_value_serializer(self.converter.output_type())?;
        let _ = self.delegate.set(delegate);
        Ok(())
    }
}

impl fmt::Debug for ConverterSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterSerializer").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// BeanSerializerFactory

type Resolver = fn(
    &BeanSerializerFactory,
    &mut ResolveCx<'_, '_>,
    TypeId,
    Option<&Arc<TypeDescription>>,
) -> Result<Option<Arc<dyn ValueSerializer>>, SerError>;

/// Builds serializers from type descriptions.
#[derive(Default)]
pub struct BeanSerializerFactory {
    modifiers: Vec<Arc<dyn SerializerModifier>>,
}

impl BeanSerializerFactory {
    /// Candidate sources, most specific first. The description's escape
    /// hatches all outrank shape-driven construction, and the standard
    /// table outranks nothing but the bean step.
    const RESOLVERS: &'static [Resolver] = &[
        Self::from_explicit,
        Self::from_refinement,
        Self::from_converter,
        Self::from_container_shape,
        Self::from_std_table,
        Self::from_bean,
    ];

    pub fn new(modifiers: Vec<Arc<dyn SerializerModifier>>) -> Self {
        Self { modifiers }
    }

    /// Constructs the serializer for `type_id`.
    ///
    /// Never returns "nothing": a type no source claims gets the unknown
    /// fallback, whose behavior is decided at write time by the
    /// `fail_on_empty_beans` setting.
    pub(crate) fn create_serializer(
        &self,
        cx: &mut ResolveCx<'_, '_>,
        type_id: TypeId,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        let description = cx.description(type_id);
        for resolver in Self::RESOLVERS {
            if let Some(serializer) = resolver(self, cx, type_id, description.as_ref())? {
                return Ok(serializer);
            }
        }
        let name = description
            .as_ref()
            .map(|description| description.name().to_owned())
            .unwrap_or_default();
        Ok(Arc::new(UnknownSerializer::new(name)))
    }

    fn from_explicit(
        &self,
        _cx: &mut ResolveCx<'_, '_>,
        _type_id: TypeId,
        description: Option<&Arc<TypeDescription>>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        Ok(description
            .and_then(|description| description.serializer())
            .map(Arc::clone))
    }

    fn from_refinement(
        &self,
        cx: &mut ResolveCx<'_, '_>,
        _type_id: TypeId,
        description: Option<&Arc<TypeDescription>>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        match description.and_then(|description| description.serialize_as_type()) {
            Some(target) => Ok(Some(cx.find_value_serializer(target)?)),
            None => Ok(None),
        }
    }

    fn from_converter(
        &self,
        _cx: &mut ResolveCx<'_, '_>,
        _type_id: TypeId,
        description: Option<&Arc<TypeDescription>>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        Ok(description
            .and_then(|description| description.converter())
            .map(|converter| {
                Arc::new(ConverterSerializer {
                    converter: converter.clone(),
                    delegate: OnceLock::new(),
                }) as Arc<dyn ValueSerializer>
            }))
    }

    fn from_container_shape(
        &self,
        _cx: &mut ResolveCx<'_, '_>,
        _type_id: TypeId,
        description: Option<&Arc<TypeDescription>>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        let Some(description) = description else {
            return Ok(None);
        };
        let serializer: Arc<dyn ValueSerializer> = match description.shape() {
            TypeShape::Sequence(shape) => Arc::new(SequenceSerializer::new(shape.clone())),
            TypeShape::Map(shape) => Arc::new(MapSerializer::new(shape.clone())),
            TypeShape::Optional(shape) => Arc::new(OptionalSerializer::new(shape.clone())),
            TypeShape::Reference(shape) => Arc::new(ReferenceSerializer::new(shape.clone())),
            TypeShape::Scalar | TypeShape::Bean(_) => return Ok(None),
        };
        Ok(Some(serializer))
    }

    fn from_std_table(
        &self,
        _cx: &mut ResolveCx<'_, '_>,
        type_id: TypeId,
        _description: Option<&Arc<TypeDescription>>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        Ok(std_serializer(type_id))
    }

    fn from_bean(
        &self,
        cx: &mut ResolveCx<'_, '_>,
        _type_id: TypeId,
        description: Option<&Arc<TypeDescription>>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        let Some(TypeShape::Bean(bean)) = description.map(|description| description.shape())
        else {
            return Ok(None);
        };

        let mut builder = BeanSerializerBuilder::new(bean);

        let mut properties = builder.properties().to_vec();
        for modifier in &self.modifiers {
            properties = modifier.change_properties(bean, properties);
        }
        for modifier in &self.modifiers {
            properties = modifier.order_properties(bean, properties);
        }
        builder.set_properties(properties);

        for modifier in &self.modifiers {
            builder = modifier.update_builder(bean, builder);
        }

        let serializer: Arc<dyn ValueSerializer> = match builder.build(cx)? {
            Some(serializer) => Arc::new(serializer),
            // No properties survived. A container add-on view, declared on
            // the description, gets its turn only now.
            None => match bean.addon_sequence() {
                Some(shape) => Arc::new(SequenceSerializer::new(shape.clone())),
                None => Arc::new(UnknownSerializer::new(bean.name())),
            },
        };

        let mut serializer = serializer;
        for modifier in &self.modifiers {
            serializer = modifier.modify_serializer(bean, serializer);
        }
        Ok(Some(serializer))
    }
}

impl fmt::Debug for BeanSerializerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanSerializerFactory")
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}
