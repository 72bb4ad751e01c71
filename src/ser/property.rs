//! The per-property write path.
//!
//! A [`BeanPropertyWriter`] owns everything one property needs at write
//! time: the bound accessor, the resolved (or dynamically looked-up) value
//! serializer, the compiled suppression rule, and view membership. Bean
//! serializers hold a flat slice of these and iterate it per value.

use core::any::Any;
use core::fmt;

use std::sync::{Arc, OnceLock};

use crate::desc::{ErasedValue, Inclusion, PropertyDefinition, SuppressPredicate};
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};

use super::{DynamicSerializers, ValueSerializer};

// -----------------------------------------------------------------------------
// Suppress

/// The compiled form of an inclusion rule, fixed at build time.
pub(crate) enum Suppress {
    None,
    Empty,
    Default(ErasedValue),
    Custom(SuppressPredicate),
}

impl Suppress {
    /// Compiles an inclusion rule against the property's definition.
    ///
    /// Returns the value rule plus whether absent values are suppressed.
    /// `NonDefault` without a registered baseline cannot compare anything,
    /// so it degrades to absent-suppression only.
    fn compile(inclusion: &Inclusion, definition: &PropertyDefinition) -> (Self, bool) {
        match inclusion {
            Inclusion::Always => (Self::None, false),
            Inclusion::NonNull | Inclusion::NonAbsent => (Self::None, true),
            Inclusion::NonEmpty => (Self::Empty, true),
            Inclusion::NonDefault => match definition.default_value() {
                Some(baseline) => (Self::Default(baseline.clone()), true),
                None => (Self::None, true),
            },
            Inclusion::Custom(predicate) => (Self::Custom(predicate.clone()), true),
        }
    }
}

impl fmt::Debug for Suppress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Empty => f.write_str("Empty"),
            Self::Default(_) => f.write_str("Default"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

// -----------------------------------------------------------------------------
// BeanPropertyWriter

/// Writes one bean property as a named field or a positional slot.
#[derive(Debug)]
pub struct BeanPropertyWriter {
    definition: PropertyDefinition,
    suppress: Suppress,
    suppress_absent: bool,
    serializer: OnceLock<Arc<dyn ValueSerializer>>,
    dynamic: DynamicSerializers,
}

impl BeanPropertyWriter {
    /// Builds a writer from its definition and the effective inclusion rule
    /// (property override, type default, then global default).
    pub(crate) fn new(definition: PropertyDefinition, inclusion: &Inclusion) -> Self {
        let (suppress, suppress_absent) = Suppress::compile(inclusion, &definition);
        Self {
            definition,
            suppress,
            suppress_absent,
            serializer: OnceLock::new(),
            dynamic: DynamicSerializers::new(),
        }
    }

    /// The property's output name.
    #[inline]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The definition this writer was built from.
    #[inline]
    pub fn definition(&self) -> &PropertyDefinition {
        &self.definition
    }

    /// Whether this writer carries any view restriction.
    #[inline]
    pub fn has_views(&self) -> bool {
        self.definition.views().is_some()
    }

    /// View membership, given the call's active view.
    ///
    /// With no active view everything is visible. Under an active view a
    /// restricted property must list it; an unrestricted property follows
    /// the `default_view_inclusion` setting.
    pub fn in_view(&self, active_view: Option<&str>, default_inclusion: bool) -> bool {
        let Some(active) = active_view else {
            return true;
        };
        match self.definition.views() {
            Some(views) => views.iter().any(|view| view == active),
            None => default_inclusion,
        }
    }

    /// Eagerly resolves the statically typed serializer, then gives it the
    /// chance to contextualize against this property.
    pub(crate) fn resolve(&self, cx: &mut ResolveCx<'_, '_>) -> Result<(), SerError> {
        let blueprint = match self.definition.serializer() {
            Some(explicit) => Arc::clone(explicit),
            None => match self.definition.declared_type() {
                Some(type_id) => cx.find_value_serializer(type_id)?,
                // No static type: every value dispatches on its runtime type.
                None => return Ok(()),
            },
        };
        let resolved = match blueprint.create_contextual(cx, Some(&self.definition))? {
            Some(contextual) => contextual,
            None => blueprint,
        };
        let _ = self.serializer.set(resolved);
        Ok(())
    }

    fn serializer_for(
        &self,
        cx: &mut SerializeCx<'_>,
        value: &dyn Any,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        match self.serializer.get() {
            Some(serializer) => Ok(Arc::clone(serializer)),
            None => self.dynamic.serializer_for(cx, value),
        }
    }

    fn is_suppressed(
        &self,
        serializer: &dyn ValueSerializer,
        cx: &SerializeCx<'_>,
        value: &dyn Any,
    ) -> bool {
        match &self.suppress {
            Suppress::None => false,
            Suppress::Empty => serializer.is_empty(cx, value),
            Suppress::Default(baseline) => serializer.value_eq(value, baseline.as_any()),
            Suppress::Custom(predicate) => predicate.check(value),
        }
    }

    fn check_self_reference(
        &self,
        bean: &dyn Any,
        value: &dyn Any,
        serializer: &dyn ValueSerializer,
    ) -> Result<(), SerError> {
        // TypeId must match as well: a first field sits at the bean's own
        // address, and address equality alone would flag it.
        if core::ptr::addr_eq(bean as *const dyn Any, value as *const dyn Any)
            && bean.type_id() == value.type_id()
            && !serializer.uses_object_id()
        {
            return Err(SerError::value(
                "direct self-reference cannot be serialized without object-id handling",
            )
            .with_field(self.name()));
        }
        Ok(())
    }

    fn fetch<'a>(&self, bean: &'a dyn Any) -> Result<Option<&'a dyn Any>, SerError> {
        self.definition
            .accessor()
            .get(bean)
            .map_err(|err| SerError::value(err).with_field(self.name()))
    }

    /// Writes `name: value`, or nothing when the value is suppressed.
    ///
    /// Absent values are omitted from the object unless a null serializer
    /// is configured and the inclusion rule still admits them.
    pub fn serialize_as_field(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let Some(value) = self.fetch(bean)? else {
            if self.suppress_absent {
                return Ok(());
            }
            let Some(null_ser) = self.definition.null_serializer() else {
                return Ok(());
            };
            out.write_field_name(self.name())?;
            return null_ser
                .serialize(&(), out, cx)
                .map_err(|err| err.with_field(self.name()));
        };

        let serializer = self.serializer_for(cx, value)?;
        if self.is_suppressed(serializer.as_ref(), cx, value) {
            return Ok(());
        }
        self.check_self_reference(bean, value, serializer.as_ref())?;

        out.write_field_name(self.name())?;
        self.write_value(value, serializer.as_ref(), out, cx)
    }

    /// Writes the value as a positional slot of an as-array bean.
    ///
    /// Suppression cannot shift later columns, so suppressed and absent
    /// values become null placeholders instead of disappearing.
    pub fn serialize_as_column(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let Some(value) = self.fetch(bean)? else {
            return self.write_absent(out, cx);
        };

        let serializer = self.serializer_for(cx, value)?;
        if self.is_suppressed(serializer.as_ref(), cx, value) {
            out.write_null()?;
            return Ok(());
        }
        self.check_self_reference(bean, value, serializer.as_ref())?;
        self.write_value(value, serializer.as_ref(), out, cx)
    }

    /// Fetches and writes the bare property value, with no name and no
    /// suppression. Used for property-based object ids.
    pub(crate) fn serialize_bare_value(
        &self,
        bean: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        match self.fetch(bean)? {
            Some(value) => {
                let serializer = self.serializer_for(cx, value)?;
                self.write_value(value, serializer.as_ref(), out, cx)
            }
            None => {
                out.write_null()?;
                Ok(())
            }
        }
    }

    // Column slots cannot be omitted, so an absent value writes the null
    // serializer's output or a plain null placeholder.
    fn write_absent(
        &self,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        match self.definition.null_serializer() {
            Some(null_ser) => null_ser
                .serialize(&(), out, cx)
                .map_err(|err| err.with_field(self.name())),
            None => {
                out.write_null()?;
                Ok(())
            }
        }
    }

    fn write_value(
        &self,
        value: &dyn Any,
        serializer: &dyn ValueSerializer,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let result = match self.definition.type_serializer() {
            Some(type_ser) => serializer.serialize_with_type(value, out, cx, type_ser),
            None => serializer.serialize(value, out, cx),
        };
        result.map_err(|err| err.with_field(self.name()))
    }
}
