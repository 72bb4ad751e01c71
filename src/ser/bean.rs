//! The bean serializer.
//!
//! One immutable instance per bean type, assembled by the
//! [`BeanSerializerBuilder`](super::BeanSerializerBuilder) pipeline. All
//! per-call state (depth, object ids, the active view) comes in through the
//! serialize context.

use core::any::Any;

use crate::desc::{FormatShape, ObjectIdInfo, ObjectIdKind};
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};

use super::any_getter::AnyGetterWriter;
use super::object_id::{ObjKey, WritableObjectId};
use super::property::BeanPropertyWriter;
use super::{TypeSerializer, ValueSerializer};

// -----------------------------------------------------------------------------
// ObjectIdHandling

#[derive(Debug)]
pub(crate) struct ObjectIdHandling {
    pub(crate) info: ObjectIdInfo,
    /// Index of the id property within `properties`; `None` for generated
    /// sequence ids.
    pub(crate) id_property: Option<usize>,
}

// -----------------------------------------------------------------------------
// BeanSerializer

/// Serializes one bean type as an object (or positional array).
#[derive(Debug)]
pub struct BeanSerializer {
    type_name: String,
    properties: Vec<BeanPropertyWriter>,
    any_getter: Option<AnyGetterWriter>,
    object_id: Option<ObjectIdHandling>,
    filter_id: Option<String>,
    shape: FormatShape,
    has_views: bool,
}

impl BeanSerializer {
    pub(crate) fn from_parts(
        type_name: String,
        properties: Vec<BeanPropertyWriter>,
        any_getter: Option<AnyGetterWriter>,
        object_id: Option<ObjectIdHandling>,
        filter_id: Option<String>,
        shape: FormatShape,
    ) -> Self {
        let has_views = properties.iter().any(BeanPropertyWriter::has_views);
        Self {
            type_name,
            properties,
            any_getter,
            object_id,
            filter_id,
            shape,
            has_views,
        }
    }

    /// The bean's logical type name.
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The property writers, in output order.
    #[inline]
    pub fn properties(&self) -> &[BeanPropertyWriter] {
        &self.properties
    }

    fn visible(&self, writer: &BeanPropertyWriter, cx: &SerializeCx<'_>) -> bool {
        if !self.has_views && cx.active_view().is_none() {
            return true;
        }
        writer.in_view(cx.active_view(), cx.config().default_view_inclusion())
    }

    /// Handles a re-reference: writes the bare id and reports `true`, or
    /// records a first sighting and reports `false` (with the sequence id
    /// to emit, when generated).
    fn write_reference_or_record(
        &self,
        handling: &ObjectIdHandling,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<ReferenceOutcome, SerError> {
        let key = ObjKey::for_value(bean, handling.info.key_fn());
        if let Some(recorded) = cx.object_ids().get(&key) {
            match recorded {
                WritableObjectId::Sequence(id) => out.write_u64(id)?,
                WritableObjectId::Property => match handling.id_property {
                    Some(index) => {
                        self.properties[index].serialize_bare_value(bean, out, cx)?;
                    }
                    None => {
                        return Err(SerError::definition(
                            &self.type_name,
                            "object id names a property that was not built",
                        ));
                    }
                },
            }
            return Ok(ReferenceOutcome::Written);
        }

        match handling.info.kind() {
            ObjectIdKind::IntSequence => {
                let id = cx.object_ids().record_sequence(key);
                Ok(ReferenceOutcome::First(Some(id)))
            }
            ObjectIdKind::Property(_) => {
                cx.object_ids().record_property(key);
                Ok(ReferenceOutcome::First(None))
            }
        }
    }

    fn write_fields(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let filter = match &self.filter_id {
            Some(id) => Some(cx.filter(id).ok_or_else(|| {
                SerError::value(format!("no property filter registered under id `{id}`"))
            })?),
            None => None,
        };

        for writer in &self.properties {
            if !self.visible(writer, cx) {
                continue;
            }
            if filter
                .as_ref()
                .is_some_and(|filter| !filter.include(writer.name(), bean))
            {
                continue;
            }
            writer.serialize_as_field(bean, out, cx)?;
        }

        if let Some(any_getter) = &self.any_getter {
            any_getter.serialize_and_merge(bean, out, cx)?;
        }
        Ok(())
    }

    /// The whole object write path, optionally with a leading polymorphic
    /// type property.
    fn serialize_object(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
        type_property: Option<(&str, &str)>,
    ) -> Result<(), SerError> {
        cx.descend()?;

        if let Some(handling) = &self.object_id {
            match self.write_reference_or_record(handling, bean, out, cx)? {
                ReferenceOutcome::Written => {
                    cx.ascend();
                    return Ok(());
                }
                ReferenceOutcome::First(sequence_id) => {
                    out.write_start_object()?;
                    if let Some((name, type_id)) = type_property {
                        out.write_field_name(name)?;
                        out.write_str(type_id)?;
                    }
                    if let Some(id) = sequence_id {
                        out.write_field_name(handling.info.alias())?;
                        out.write_u64(id)?;
                    }
                    self.write_fields(bean, out, cx)?;
                    out.write_end_object()?;
                    cx.ascend();
                    return Ok(());
                }
            }
        }

        out.write_start_object()?;
        if let Some((name, type_id)) = type_property {
            out.write_field_name(name)?;
            out.write_str(type_id)?;
        }
        self.write_fields(bean, out, cx)?;
        out.write_end_object()?;
        cx.ascend();
        Ok(())
    }

    fn serialize_array(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        cx.descend()?;
        out.write_start_array()?;
        for writer in &self.properties {
            // Hidden columns still occupy their slot.
            if !self.visible(writer, cx) {
                out.write_null()?;
                continue;
            }
            writer.serialize_as_column(bean, out, cx)?;
        }
        out.write_end_array()?;
        cx.ascend();
        Ok(())
    }
}

enum ReferenceOutcome {
    /// A bare id reference was written; nothing else to do.
    Written,
    /// First sighting; carries the generated sequence id, if any.
    First(Option<u64>),
}

impl ValueSerializer for BeanSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        match self.shape {
            FormatShape::Object => self.serialize_object(value, out, cx, None),
            FormatShape::Array => self.serialize_array(value, out, cx),
        }
    }

    fn serialize_with_type(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
        type_ser: &TypeSerializer,
    ) -> Result<(), SerError> {
        match (type_ser, self.shape) {
            (TypeSerializer::Property { name, type_id }, FormatShape::Object) => {
                // A declared property that owns the name wins; the inline
                // type id is not emitted alongside it.
                let type_property = self
                    .properties
                    .iter()
                    .all(|writer| writer.name() != name)
                    .then(|| (name.as_str(), type_id.as_str()));
                self.serialize_object(value, out, cx, type_property)
            }
            _ => {
                out.write_start_object()?;
                out.write_field_name(type_ser.type_id())?;
                self.serialize(value, out, cx)?;
                out.write_end_object()?;
                Ok(())
            }
        }
    }

    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        for writer in &self.properties {
            writer
                .resolve(cx)
                .map_err(|err| match err {
                    SerError::Definition { .. } | SerError::Io(_) => err,
                    other => SerError::definition(
                        &self.type_name,
                        format!("property `{}` failed to resolve: {other}", writer.name()),
                    ),
                })?;
        }
        if let Some(any_getter) = &self.any_getter {
            any_getter.resolve(cx)?;
        }
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, _value: &dyn Any) -> bool {
        self.properties.is_empty() && self.any_getter.is_none()
    }

    fn uses_object_id(&self) -> bool {
        self.object_id.is_some()
    }
}
