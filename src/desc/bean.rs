use core::any::{Any, TypeId};
use core::fmt;

use std::sync::Arc;

use crate::ser::{TypeSerializer, ValueSerializer};

use super::accessor::Accessor;
use super::shape::SequenceShape;

// -----------------------------------------------------------------------------
// ErasedValue

/// An owned, type-erased value.
///
/// Used for default-value baselines (`NON_DEFAULT` inclusion) and for
/// converter outputs.
#[derive(Clone)]
pub struct ErasedValue {
    value: Arc<dyn Any + Send + Sync>,
}

impl ErasedValue {
    /// Wraps an owned value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Borrows the wrapped value.
    #[inline]
    pub fn as_any(&self) -> &dyn Any {
        &*self.value
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErasedValue")
    }
}

// -----------------------------------------------------------------------------
// Inclusion

/// A predicate deciding whether a property value should be suppressed.
#[derive(Clone)]
pub struct SuppressPredicate {
    fun: Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>,
}

impl SuppressPredicate {
    /// Creates a predicate; returning `true` suppresses the property.
    pub fn new(fun: impl Fn(&dyn Any) -> bool + Send + Sync + 'static) -> Self {
        Self { fun: Arc::new(fun) }
    }

    /// Runs the predicate against a property value.
    #[inline]
    pub fn check(&self, value: &dyn Any) -> bool {
        (self.fun)(value)
    }
}

impl fmt::Debug for SuppressPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SuppressPredicate")
    }
}

/// The rule governing whether a property with a given value is emitted.
#[derive(Clone, Debug, Default)]
pub enum Inclusion {
    /// Emit every present value. Absent values still need a configured
    /// null serializer to appear in object output.
    #[default]
    Always,
    /// Omit the property when its value is absent.
    NonNull,
    /// Omit the property when its value is absent or empty per the
    /// serializer's own emptiness predicate.
    NonEmpty,
    /// Omit the property when its value equals the configured default.
    NonDefault,
    /// Omit the property when its value is absent (`Option::None`).
    /// Equivalent to [`NonNull`](Inclusion::NonNull) in this crate, where
    /// absence is the only null-like state.
    NonAbsent,
    /// Omit the property when the predicate says so.
    Custom(SuppressPredicate),
}

// -----------------------------------------------------------------------------
// PropertyFormat

/// Per-property output formatting hints, honored by serializers that
/// implement the contextual hook.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyFormat {
    /// Decimal places to round floating-point output to.
    pub precision: Option<u32>,
}

// -----------------------------------------------------------------------------
// Object ids

/// Key extractor for equality-based object-id tracking.
#[derive(Clone)]
pub struct ObjectIdKeyFn {
    fun: Arc<dyn Fn(&dyn Any) -> u64 + Send + Sync>,
}

impl ObjectIdKeyFn {
    /// Creates a key extractor; values with equal keys are treated as the
    /// same logical object.
    pub fn new(fun: impl Fn(&dyn Any) -> u64 + Send + Sync + 'static) -> Self {
        Self { fun: Arc::new(fun) }
    }

    /// Computes the key for a value.
    #[inline]
    pub fn key(&self, value: &dyn Any) -> u64 {
        (self.fun)(value)
    }
}

impl fmt::Debug for ObjectIdKeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectIdKeyFn")
    }
}

/// How object ids are generated for a bean type.
#[derive(Clone, Debug)]
pub enum ObjectIdKind {
    /// A per-call integer sequence (1, 2, 3, ...), emitted under the alias
    /// field name.
    IntSequence,
    /// An existing property serves as the id; the property is hoisted to
    /// output position 0 and re-references emit its value alone.
    Property(String),
}

/// Object-id configuration for a bean type.
#[derive(Clone, Debug)]
pub struct ObjectIdInfo {
    kind: ObjectIdKind,
    alias: String,
    key: Option<ObjectIdKeyFn>,
}

impl ObjectIdInfo {
    /// Integer-sequence ids, written under `alias` (commonly `"@id"`).
    pub fn int_sequence(alias: impl Into<String>) -> Self {
        Self {
            kind: ObjectIdKind::IntSequence,
            alias: alias.into(),
            key: None,
        }
    }

    /// Property-based ids using the named declared property.
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            kind: ObjectIdKind::Property(name),
            key: None,
        }
    }

    /// Attaches a key extractor for equality-based tracking.
    #[must_use]
    pub fn with_key(mut self, key: ObjectIdKeyFn) -> Self {
        self.key = Some(key);
        self
    }

    #[inline]
    pub fn kind(&self) -> &ObjectIdKind {
        &self.kind
    }

    #[inline]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[inline]
    pub fn key_fn(&self) -> Option<&ObjectIdKeyFn> {
        self.key.as_ref()
    }
}

// -----------------------------------------------------------------------------
// AnyGetterDefinition

/// A catch-all property whose map-shaped value is merged into the enclosing
/// object's output as top-level sibling fields.
#[derive(Clone, Debug)]
pub struct AnyGetterDefinition {
    accessor: Accessor,
    declared_type: Option<TypeId>,
}

impl AnyGetterDefinition {
    /// Creates an any-getter with an unknown (runtime-resolved) value type.
    pub fn new(accessor: Accessor) -> Self {
        Self {
            accessor,
            declared_type: None,
        }
    }

    /// Declares the map type returned by the accessor.
    #[must_use]
    pub fn with_declared_type(mut self, type_id: TypeId) -> Self {
        self.declared_type = Some(type_id);
        self
    }

    #[inline]
    pub fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    #[inline]
    pub fn declared_type(&self) -> Option<TypeId> {
        self.declared_type
    }
}

// -----------------------------------------------------------------------------
// FormatShape

/// Class-level output-shape override.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatShape {
    /// The natural `{ name: value }` object form.
    #[default]
    Object,
    /// Positional output: field names omitted, suppressed values emitted as
    /// null placeholders to preserve column alignment.
    Array,
}

// -----------------------------------------------------------------------------
// PropertyDefinition

/// The description of one serializable bean property.
///
/// Definitions are assembled by the introspection layer (or directly by
/// callers) and consumed once, when the bean's serializer is built.
#[derive(Clone, Debug)]
pub struct PropertyDefinition {
    name: String,
    accessor: Accessor,
    declared_type: Option<TypeId>,
    inclusion: Option<Inclusion>,
    required: bool,
    views: Option<Vec<String>>,
    serializer: Option<Arc<dyn ValueSerializer>>,
    null_serializer: Option<Arc<dyn ValueSerializer>>,
    default_value: Option<ErasedValue>,
    type_serializer: Option<TypeSerializer>,
    format: Option<PropertyFormat>,
}

impl PropertyDefinition {
    /// Creates a definition with the given output name and accessor.
    pub fn new(name: impl Into<String>, accessor: Accessor) -> Self {
        Self {
            name: name.into(),
            accessor,
            declared_type: None,
            inclusion: None,
            required: false,
            views: None,
            serializer: None,
            null_serializer: None,
            default_value: None,
            type_serializer: None,
            format: None,
        }
    }

    /// Declares the property's static type, enabling eager serializer
    /// resolution. Without it the serializer is looked up per runtime type.
    #[must_use]
    pub fn with_type<T: Any>(mut self) -> Self {
        self.declared_type = Some(TypeId::of::<T>());
        self
    }

    /// Declares the property's static type by id.
    #[must_use]
    pub fn with_type_id(mut self, type_id: TypeId) -> Self {
        self.declared_type = Some(type_id);
        self
    }

    /// Overrides the inclusion policy for this property.
    #[must_use]
    pub fn with_inclusion(mut self, inclusion: Inclusion) -> Self {
        self.inclusion = Some(inclusion);
        self
    }

    /// Marks the property as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts the property to the named views.
    #[must_use]
    pub fn with_views<I, S>(mut self, views: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.views = Some(views.into_iter().map(Into::into).collect());
        self
    }

    /// Forces a specific serializer for this property.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ValueSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Configures a serializer for absent values. Without one, absent
    /// values are omitted entirely.
    #[must_use]
    pub fn with_null_serializer(mut self, serializer: Arc<dyn ValueSerializer>) -> Self {
        self.null_serializer = Some(serializer);
        self
    }

    /// Supplies the default-value baseline for `NON_DEFAULT` inclusion.
    #[must_use]
    pub fn with_default_value(mut self, value: ErasedValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Attaches polymorphic type metadata emitted alongside the value.
    #[must_use]
    pub fn with_type_serializer(mut self, type_serializer: TypeSerializer) -> Self {
        self.type_serializer = Some(type_serializer);
        self
    }

    /// Attaches per-property formatting hints.
    #[must_use]
    pub fn with_format(mut self, format: PropertyFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    #[inline]
    pub fn declared_type(&self) -> Option<TypeId> {
        self.declared_type
    }

    #[inline]
    pub fn inclusion(&self) -> Option<&Inclusion> {
        self.inclusion.as_ref()
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[inline]
    pub fn views(&self) -> Option<&[String]> {
        self.views.as_deref()
    }

    #[inline]
    pub fn serializer(&self) -> Option<&Arc<dyn ValueSerializer>> {
        self.serializer.as_ref()
    }

    #[inline]
    pub fn null_serializer(&self) -> Option<&Arc<dyn ValueSerializer>> {
        self.null_serializer.as_ref()
    }

    #[inline]
    pub fn default_value(&self) -> Option<&ErasedValue> {
        self.default_value.as_ref()
    }

    #[inline]
    pub fn type_serializer(&self) -> Option<&TypeSerializer> {
        self.type_serializer.as_ref()
    }

    #[inline]
    pub fn format(&self) -> Option<&PropertyFormat> {
        self.format.as_ref()
    }
}

// -----------------------------------------------------------------------------
// BeanDescription

/// Everything the serializer factory needs to know about one bean type.
///
/// # Examples
///
/// ```
/// use tokenbind::desc::{Accessor, BeanDescription, PropertyDefinition};
///
/// struct Point { x: i32, y: i32 }
///
/// let desc = BeanDescription::new("Point")
///     .with_property(
///         PropertyDefinition::new("x", Accessor::field(|p: &Point| &p.x)).with_type::<i32>(),
///     )
///     .with_property(
///         PropertyDefinition::new("y", Accessor::field(|p: &Point| &p.y)).with_type::<i32>(),
///     );
///
/// assert_eq!(desc.properties().len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct BeanDescription {
    name: String,
    properties: Vec<PropertyDefinition>,
    any_getter: Option<AnyGetterDefinition>,
    object_id: Option<ObjectIdInfo>,
    filter_id: Option<String>,
    inclusion: Option<Inclusion>,
    type_info: Option<TypeSerializer>,
    shape: FormatShape,
    addon_sequence: Option<SequenceShape>,
    ignored: Vec<String>,
    included: Option<Vec<String>>,
    allow_empty: bool,
}

impl BeanDescription {
    /// Creates an empty description with the type's logical name.
    ///
    /// The name feeds root-name derivation and error messages.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            any_getter: None,
            object_id: None,
            filter_id: None,
            inclusion: None,
            type_info: None,
            shape: FormatShape::Object,
            addon_sequence: None,
            ignored: Vec::new(),
            included: None,
            allow_empty: false,
        }
    }

    /// Appends a property definition. Order is preserved in output.
    #[must_use]
    pub fn with_property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    /// Attaches the catch-all any-getter.
    #[must_use]
    pub fn with_any_getter(mut self, any_getter: AnyGetterDefinition) -> Self {
        self.any_getter = Some(any_getter);
        self
    }

    /// Enables object-id handling for this type.
    #[must_use]
    pub fn with_object_id(mut self, object_id: ObjectIdInfo) -> Self {
        self.object_id = Some(object_id);
        self
    }

    /// Associates a property filter resolved through the provider.
    #[must_use]
    pub fn with_filter_id(mut self, filter_id: impl Into<String>) -> Self {
        self.filter_id = Some(filter_id.into());
        self
    }

    /// Sets the default inclusion policy for all properties of this type.
    #[must_use]
    pub fn with_inclusion(mut self, inclusion: Inclusion) -> Self {
        self.inclusion = Some(inclusion);
        self
    }

    /// Attaches polymorphic type metadata for typed-root serialization.
    #[must_use]
    pub fn with_type_info(mut self, type_info: TypeSerializer) -> Self {
        self.type_info = Some(type_info);
        self
    }

    /// Overrides the output shape (object vs positional array).
    #[must_use]
    pub fn with_shape(mut self, shape: FormatShape) -> Self {
        self.shape = shape;
        self
    }

    /// Declares a container-like add-on view of this type.
    ///
    /// Consulted only after bean-property discovery yields nothing: a bean
    /// that incidentally iterates stays a bean.
    #[must_use]
    pub fn with_addon_sequence(mut self, shape: SequenceShape) -> Self {
        self.addon_sequence = Some(shape);
        self
    }

    /// Names properties to drop during serializer construction.
    #[must_use]
    pub fn with_ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored = names.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts serialization to the named properties.
    #[must_use]
    pub fn with_included<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Permits an empty `{}` output when no properties survive discovery.
    ///
    /// Without this marker a property-less bean is a definition error
    /// (subject to the provider's `fail_on_empty_beans` setting), so that
    /// genuinely unmappable types do not silently serialize as `{}`.
    #[must_use]
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    #[inline]
    pub fn any_getter(&self) -> Option<&AnyGetterDefinition> {
        self.any_getter.as_ref()
    }

    #[inline]
    pub fn object_id(&self) -> Option<&ObjectIdInfo> {
        self.object_id.as_ref()
    }

    #[inline]
    pub fn filter_id(&self) -> Option<&str> {
        self.filter_id.as_deref()
    }

    #[inline]
    pub fn inclusion(&self) -> Option<&Inclusion> {
        self.inclusion.as_ref()
    }

    #[inline]
    pub fn type_info(&self) -> Option<&TypeSerializer> {
        self.type_info.as_ref()
    }

    #[inline]
    pub fn shape(&self) -> FormatShape {
        self.shape
    }

    #[inline]
    pub fn addon_sequence(&self) -> Option<&SequenceShape> {
        self.addon_sequence.as_ref()
    }

    #[inline]
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    #[inline]
    pub fn included(&self) -> Option<&[String]> {
        self.included.as_deref()
    }

    #[inline]
    pub fn is_empty_allowed(&self) -> bool {
        self.allow_empty
    }
}
