//! Bean serializer assembly.
//!
//! The builder is the mutable middle stage between an immutable
//! [`BeanDescription`] and an immutable [`BeanSerializer`]. The factory
//! seeds it, modifiers may rewrite it, and `build` compiles the surviving
//! definitions into property writers.

use core::any::TypeId;

use crate::desc::{
    AnyGetterDefinition, BeanDescription, FormatShape, Inclusion, ObjectIdInfo, ObjectIdKind,
    PropertyDefinition, TypeShape,
};
use crate::error::SerError;
use crate::provider::ResolveCx;

use super::any_getter::AnyGetterWriter;
use super::bean::{BeanSerializer, ObjectIdHandling};
use super::property::BeanPropertyWriter;

// -----------------------------------------------------------------------------
// BeanSerializerBuilder

/// Accumulates the parts of a [`BeanSerializer`] under construction.
#[derive(Debug)]
pub struct BeanSerializerBuilder {
    description: BeanDescription,
    properties: Vec<PropertyDefinition>,
    any_getter: Option<AnyGetterDefinition>,
    object_id: Option<ObjectIdInfo>,
    filter_id: Option<String>,
    shape: FormatShape,
}

impl BeanSerializerBuilder {
    /// Seeds a builder from a description, applying the ignore and include
    /// name sets up front.
    pub fn new(description: &BeanDescription) -> Self {
        let properties = description
            .properties()
            .iter()
            .filter(|definition| {
                !description
                    .ignored()
                    .iter()
                    .any(|name| name == definition.name())
            })
            .filter(|definition| match description.included() {
                Some(included) => included.iter().any(|name| name == definition.name()),
                None => true,
            })
            .cloned()
            .collect();

        Self {
            properties,
            any_getter: description.any_getter().cloned(),
            object_id: description.object_id().cloned(),
            filter_id: description.filter_id().map(str::to_owned),
            shape: description.shape(),
            description: description.clone(),
        }
    }

    /// The description this builder was seeded from.
    #[inline]
    pub fn description(&self) -> &BeanDescription {
        &self.description
    }

    /// The current property definitions, in output order.
    #[inline]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Replaces the property definitions wholesale.
    pub fn set_properties(&mut self, properties: Vec<PropertyDefinition>) {
        self.properties = properties;
    }

    pub fn set_any_getter(&mut self, any_getter: Option<AnyGetterDefinition>) {
        self.any_getter = any_getter;
    }

    pub fn set_object_id(&mut self, object_id: Option<ObjectIdInfo>) {
        self.object_id = object_id;
    }

    pub fn set_filter_id(&mut self, filter_id: Option<String>) {
        self.filter_id = filter_id;
    }

    pub fn set_shape(&mut self, shape: FormatShape) {
        self.shape = shape;
    }

    /// Moves the object-id property to output position 0 so re-references
    /// can be matched against already-written output.
    fn hoist_id_property(&mut self, name: &str) -> Result<usize, SerError> {
        let index = self
            .properties
            .iter()
            .position(|definition| definition.name() == name)
            .ok_or_else(|| {
                SerError::definition(
                    self.description.name(),
                    format!("object id references unknown property `{name}`"),
                )
            })?;
        let definition = self.properties.remove(index);
        self.properties.insert(0, definition);
        Ok(0)
    }

    fn is_container(&self, cx: &ResolveCx<'_, '_>, type_id: TypeId) -> bool {
        cx.description(type_id).is_some_and(|description| {
            matches!(
                description.shape(),
                TypeShape::Sequence(_) | TypeShape::Map(_)
            )
        })
    }

    /// The effective inclusion for one property: its own override, then the
    /// type default, then the global default. With empty-collection writing
    /// disabled, container properties that would always write are upgraded
    /// to `NonEmpty`.
    fn effective_inclusion(
        &self,
        cx: &ResolveCx<'_, '_>,
        definition: &PropertyDefinition,
    ) -> Inclusion {
        let inclusion = definition
            .inclusion()
            .or_else(|| self.description.inclusion())
            .cloned()
            .unwrap_or_else(|| cx.config().inclusion().clone());

        if matches!(inclusion, Inclusion::Always)
            && !cx.config().write_empty_collections()
            && definition
                .declared_type()
                .is_some_and(|type_id| self.is_container(cx, type_id))
        {
            return Inclusion::NonEmpty;
        }
        inclusion
    }

    /// Compiles the builder into a serializer.
    ///
    /// Returns `Ok(None)` when nothing would ever be written and the
    /// description does not explicitly allow an empty object; the factory
    /// then falls through to its unknown-type handling.
    pub fn build(mut self, cx: &mut ResolveCx<'_, '_>) -> Result<Option<BeanSerializer>, SerError> {
        let object_id = match self.object_id.take() {
            Some(info) => {
                let id_property = match info.kind() {
                    ObjectIdKind::IntSequence => None,
                    ObjectIdKind::Property(name) => {
                        let name = name.clone();
                        Some(self.hoist_id_property(&name)?)
                    }
                };
                // Positional output has no stable field to re-reference, so
                // object ids force object form.
                self.shape = FormatShape::Object;
                Some(ObjectIdHandling { info, id_property })
            }
            None => None,
        };

        if self.properties.is_empty()
            && self.any_getter.is_none()
            && !self.description.is_empty_allowed()
        {
            return Ok(None);
        }

        let writers = self
            .properties
            .iter()
            .map(|definition| {
                let inclusion = self.effective_inclusion(cx, definition);
                BeanPropertyWriter::new(definition.clone(), &inclusion)
            })
            .collect();

        Ok(Some(BeanSerializer::from_parts(
            self.description.name().to_owned(),
            writers,
            self.any_getter.map(AnyGetterWriter::new),
            object_id,
            self.filter_id,
            self.shape,
        )))
    }
}
