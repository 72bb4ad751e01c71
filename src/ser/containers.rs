//! Serializers for container shapes.
//!
//! Each serializer wraps an erased shape adapter from the description layer
//! and resolves its element serializer once, during the resolution phase.
//! Cyclic element types are safe: by the time `resolve` runs, this instance
//! is already published to the cache, so a recursive lookup returns it
//! instead of rebuilding.

use core::any::Any;

use std::sync::{Arc, OnceLock};

use crate::desc::{MapShape, OptionalShape, ReferenceShape, SequenceShape};
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};

use super::std_types::key_to_field_name;
use super::{DynamicSerializers, ValueSerializer};

// -----------------------------------------------------------------------------
// SequenceSerializer

/// Writes sequence-like containers as arrays.
#[derive(Debug)]
pub struct SequenceSerializer {
    shape: SequenceShape,
    elem: OnceLock<Arc<dyn ValueSerializer>>,
}

impl SequenceSerializer {
    pub fn new(shape: SequenceShape) -> Self {
        Self {
            shape,
            elem: OnceLock::new(),
        }
    }

    fn elem_serializer(
        &self,
        cx: &mut SerializeCx<'_>,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        match self.elem.get() {
            Some(serializer) => Ok(Arc::clone(serializer)),
            None => cx.find_value_serializer(self.shape.elem_type()),
        }
    }
}

impl ValueSerializer for SequenceSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let elem = self.elem_serializer(cx)?;
        cx.descend()?;
        out.write_start_array()?;
        for (index, item) in self.shape.iter(value).map_err(SerError::value)?.enumerate() {
            elem.serialize(item, out, cx)
                .map_err(|err| err.with_index(index))?;
        }
        out.write_end_array()?;
        cx.ascend();
        Ok(())
    }

    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        let elem = cx.find_value_serializer(self.shape.elem_type())?;
        let _ = self.elem.set(elem);
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        self.shape.is_empty(value)
    }
}

// -----------------------------------------------------------------------------
// MapSerializer

/// Writes map-like containers as objects.
///
/// Keys become field names; a key that cannot be rendered as a string is a
/// value error naming the offending entry's position.
#[derive(Debug)]
pub struct MapSerializer {
    shape: MapShape,
    value_ser: OnceLock<Arc<dyn ValueSerializer>>,
}

impl MapSerializer {
    pub fn new(shape: MapShape) -> Self {
        Self {
            shape,
            value_ser: OnceLock::new(),
        }
    }

    fn value_serializer(
        &self,
        cx: &mut SerializeCx<'_>,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        match self.value_ser.get() {
            Some(serializer) => Ok(Arc::clone(serializer)),
            None => cx.find_value_serializer(self.shape.value_type()),
        }
    }
}

impl ValueSerializer for MapSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let value_ser = self.value_serializer(cx)?;
        cx.descend()?;
        out.write_start_object()?;
        let entries = self.shape.iter(value).map_err(SerError::value)?;
        for (index, (key, entry_value)) in entries.enumerate() {
            let name = key_to_field_name(key).ok_or_else(|| {
                SerError::value("map key cannot be rendered as a field name").with_index(index)
            })?;
            out.write_field_name(&name)?;
            value_ser
                .serialize(entry_value, out, cx)
                .map_err(|err| err.with_field(&name))?;
        }
        out.write_end_object()?;
        cx.ascend();
        Ok(())
    }

    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        let value_ser = cx.find_value_serializer(self.shape.value_type())?;
        let _ = self.value_ser.set(value_ser);
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        self.shape.is_empty(value)
    }
}

// -----------------------------------------------------------------------------
// OptionalSerializer

/// Writes `Option`-like wrappers: the contained value when present, a null
/// token when absent.
#[derive(Debug)]
pub struct OptionalSerializer {
    shape: OptionalShape,
    inner: OnceLock<Arc<dyn ValueSerializer>>,
}

impl OptionalSerializer {
    pub fn new(shape: OptionalShape) -> Self {
        Self {
            shape,
            inner: OnceLock::new(),
        }
    }
}

impl ValueSerializer for OptionalSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        match self.shape.project(value).map_err(SerError::value)? {
            Some(inner_value) => {
                let inner = match self.inner.get() {
                    Some(serializer) => Arc::clone(serializer),
                    None => cx.find_value_serializer(self.shape.inner_type())?,
                };
                inner.serialize(inner_value, out, cx)
            }
            None => {
                out.write_null()?;
                Ok(())
            }
        }
    }

    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        let inner = cx.find_value_serializer(self.shape.inner_type())?;
        let _ = self.inner.set(inner);
        Ok(())
    }

    fn is_empty(&self, cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        match self.shape.project(value) {
            Ok(Some(inner_value)) => self
                .inner
                .get()
                .is_some_and(|inner| inner.is_empty(cx, inner_value)),
            Ok(None) => true,
            Err(_) => false,
        }
    }
}

// -----------------------------------------------------------------------------
// ReferenceSerializer

/// Writes smart-pointer-like wrappers by serializing the pointee.
///
/// A statically known pointee resolves once; a trait-object pointee is
/// dispatched per runtime type through a small dynamic cache.
#[derive(Debug)]
pub struct ReferenceSerializer {
    shape: ReferenceShape,
    inner: OnceLock<Arc<dyn ValueSerializer>>,
    dynamic: DynamicSerializers,
}

impl ReferenceSerializer {
    pub fn new(shape: ReferenceShape) -> Self {
        Self {
            shape,
            inner: OnceLock::new(),
            dynamic: DynamicSerializers::new(),
        }
    }
}

impl ValueSerializer for ReferenceSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let pointee = self.shape.project(value).map_err(SerError::value)?;
        let serializer = match self.inner.get() {
            Some(serializer) => Arc::clone(serializer),
            None => self.dynamic.serializer_for(cx, pointee)?,
        };
        serializer.serialize(pointee, out, cx)
    }

    fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        if let Some(inner_type) = self.shape.inner_type() {
            let inner = cx.find_value_serializer(inner_type)?;
            let _ = self.inner.set(inner);
        }
        Ok(())
    }

    fn is_empty(&self, cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        match self.shape.project(value) {
            Ok(pointee) => self
                .inner
                .get()
                .is_some_and(|inner| inner.is_empty(cx, pointee)),
            Err(_) => false,
        }
    }
}
