//! The catch-all property.
//!
//! An any-getter exposes a map whose entries are merged into the enclosing
//! object's output as sibling fields of the declared properties. The bean
//! serializer always runs it last, after every declared property.

use core::any::Any;
use core::fmt;

use std::sync::OnceLock;

use crate::desc::{AnyGetterDefinition, MapShape, TypeShape};
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};

use super::std_types::key_to_field_name;
use super::DynamicSerializers;

// -----------------------------------------------------------------------------
// AnyGetterWriter

/// Writes an any-getter's map entries into the current object.
pub struct AnyGetterWriter {
    definition: AnyGetterDefinition,
    shape: OnceLock<MapShape>,
    dynamic: DynamicSerializers,
}

impl AnyGetterWriter {
    pub(crate) fn new(definition: AnyGetterDefinition) -> Self {
        Self {
            definition,
            shape: OnceLock::new(),
            dynamic: DynamicSerializers::new(),
        }
    }

    pub(crate) fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        if let Some(type_id) = self.definition.declared_type() {
            let shape = cx
                .description(type_id)
                .and_then(|description| match description.shape() {
                    TypeShape::Map(shape) => Some(shape.clone()),
                    _ => None,
                })
                .ok_or_else(|| {
                    SerError::definition(
                        "",
                        "any-getter declared type is not registered as a map shape",
                    )
                })?;
            let _ = self.shape.set(shape);
        }
        Ok(())
    }

    fn shape_for(
        &self,
        cx: &SerializeCx<'_>,
        value: &dyn Any,
    ) -> Result<MapShape, SerError> {
        if let Some(shape) = self.shape.get() {
            return Ok(shape.clone());
        }
        cx.description(value.type_id())
            .and_then(|description| match description.shape() {
                TypeShape::Map(shape) => Some(shape.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                SerError::definition("", "any-getter value has no registered map shape")
            })
    }

    /// Fetches the map and writes its entries as fields of the object
    /// currently open on `out`. Absent maps contribute nothing.
    pub fn serialize_and_merge(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let Some(map) = self
            .definition
            .accessor()
            .get(bean)
            .map_err(SerError::value)?
        else {
            return Ok(());
        };

        let shape = self.shape_for(cx, map)?;
        let entries = shape.iter(map).map_err(SerError::value)?;
        for (index, (key, entry_value)) in entries.enumerate() {
            let name = key_to_field_name(key).ok_or_else(|| {
                SerError::value("any-getter key cannot be rendered as a field name")
                    .with_index(index)
            })?;
            let serializer = self.dynamic.serializer_for(cx, entry_value)?;
            out.write_field_name(&name)?;
            serializer
                .serialize(entry_value, out, cx)
                .map_err(|err| err.with_field(&name))?;
        }
        Ok(())
    }
}

impl fmt::Debug for AnyGetterWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyGetterWriter").finish_non_exhaustive()
    }
}
