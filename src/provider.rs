//! The serialization entry point.
//!
//! A [`SerializerProvider`] ties together the description registry, the
//! factory, the shared cache and the call configuration. Providers are
//! cheap to clone and share all of that state; per-call state (depth,
//! object ids) lives in a fresh [`SerializeCx`] per top-level call.

use core::any::{Any, TypeId};
use core::fmt;

use std::sync::{Arc, MutexGuard};

use tracing::{debug, trace};

use crate::desc::{DescriptionRegistry, Inclusion, TypeDescription, TypeShape};
use crate::error::SerError;
use crate::generator::Generator;
use crate::ser::{
    BeanSerializerFactory, CacheKey, CacheShared, ObjectIdState, PropertyFilter, SerializerCache,
    SerializerModifier, TypeSerializer, ValueSerializer,
};
use crate::util::HashMap;

// -----------------------------------------------------------------------------
// SerializationConfig

const DEFAULT_MAX_NESTING: usize = 1000;
const DEFAULT_MAX_CACHED: usize = 4000;

/// Per-provider serialization settings.
///
/// # Examples
///
/// ```
/// use tokenbind::provider::SerializationConfig;
///
/// let config = SerializationConfig::new()
///     .with_wrap_root(true)
///     .with_active_view("public");
/// assert_eq!(config.active_view(), Some("public"));
/// ```
#[derive(Clone, Debug)]
pub struct SerializationConfig {
    wrap_root: bool,
    root_name: Option<String>,
    active_view: Option<String>,
    default_view_inclusion: bool,
    inclusion: Inclusion,
    write_empty_collections: bool,
    fail_on_empty_beans: bool,
    max_nesting: usize,
    max_cached_serializers: usize,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            wrap_root: false,
            root_name: None,
            active_view: None,
            default_view_inclusion: true,
            inclusion: Inclusion::Always,
            write_empty_collections: true,
            fail_on_empty_beans: true,
            max_nesting: DEFAULT_MAX_NESTING,
            max_cached_serializers: DEFAULT_MAX_CACHED,
        }
    }
}

impl SerializationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps root output in an object named after the root type's
    /// registered description.
    #[must_use]
    pub fn with_wrap_root(mut self, wrap_root: bool) -> Self {
        self.wrap_root = wrap_root;
        self
    }

    /// Forces a specific root wrapper name, overriding `wrap_root`
    /// derivation. The empty string disables wrapping outright.
    #[must_use]
    pub fn with_root_name(mut self, root_name: impl Into<String>) -> Self {
        self.root_name = Some(root_name.into());
        self
    }

    /// Activates a serialization view for all calls through this provider.
    #[must_use]
    pub fn with_active_view(mut self, view: impl Into<String>) -> Self {
        self.active_view = Some(view.into());
        self
    }

    /// Whether properties without view restrictions are written when a
    /// view is active. Defaults to `true`.
    #[must_use]
    pub fn with_default_view_inclusion(mut self, include: bool) -> Self {
        self.default_view_inclusion = include;
        self
    }

    /// The global default inclusion rule.
    #[must_use]
    pub fn with_inclusion(mut self, inclusion: Inclusion) -> Self {
        self.inclusion = inclusion;
        self
    }

    /// When disabled, container-typed properties with no explicit inclusion
    /// rule omit empty values.
    #[must_use]
    pub fn with_write_empty_collections(mut self, write: bool) -> Self {
        self.write_empty_collections = write;
        self
    }

    /// Whether a type with no serializable properties is an error rather
    /// than an empty object. Defaults to `true`.
    #[must_use]
    pub fn with_fail_on_empty_beans(mut self, fail: bool) -> Self {
        self.fail_on_empty_beans = fail;
        self
    }

    /// The nesting depth at which serialization aborts.
    #[must_use]
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// The serializer cache capacity.
    #[must_use]
    pub fn with_max_cached_serializers(mut self, max: usize) -> Self {
        self.max_cached_serializers = max;
        self
    }

    #[inline]
    pub fn wrap_root(&self) -> bool {
        self.wrap_root
    }

    #[inline]
    pub fn root_name(&self) -> Option<&str> {
        self.root_name.as_deref()
    }

    #[inline]
    pub fn active_view(&self) -> Option<&str> {
        self.active_view.as_deref()
    }

    #[inline]
    pub fn default_view_inclusion(&self) -> bool {
        self.default_view_inclusion
    }

    #[inline]
    pub fn inclusion(&self) -> &Inclusion {
        &self.inclusion
    }

    #[inline]
    pub fn write_empty_collections(&self) -> bool {
        self.write_empty_collections
    }

    #[inline]
    pub fn fail_on_empty_beans(&self) -> bool {
        self.fail_on_empty_beans
    }

    #[inline]
    pub fn max_nesting(&self) -> usize {
        self.max_nesting
    }

    #[inline]
    pub fn max_cached_serializers(&self) -> usize {
        self.max_cached_serializers
    }
}

// -----------------------------------------------------------------------------
// TypedSerializer

/// A cached pairing of a value serializer with its type metadata, stored
/// under the typed cache key.
#[derive(Debug)]
struct TypedSerializer {
    inner: Arc<dyn ValueSerializer>,
    type_info: TypeSerializer,
}

impl ValueSerializer for TypedSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        self.inner
            .serialize_with_type(value, out, cx, &self.type_info)
    }

    fn is_empty(&self, cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        self.inner.is_empty(cx, value)
    }

    fn uses_object_id(&self) -> bool {
        self.inner.uses_object_id()
    }
}

// -----------------------------------------------------------------------------
// SerializerProvider

#[derive(Debug)]
struct ProviderInner {
    config: SerializationConfig,
    registry: DescriptionRegistry,
    factory: BeanSerializerFactory,
    cache: SerializerCache,
    filters: HashMap<String, Arc<dyn PropertyFilter>>,
}

/// The shared serialization front end.
///
/// # Examples
///
/// ```
/// use tokenbind::desc::{Accessor, BeanDescription, DescriptionRegistry, PropertyDefinition};
/// use tokenbind::generator::TokenBuffer;
/// use tokenbind::provider::SerializerProvider;
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
/// let provider = SerializerProvider::builder().registry(registry).build();
/// let mut out = TokenBuffer::new();
/// provider.serialize_value(&Point { x: 3, y: 4 }, &mut out).unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct SerializerProvider {
    inner: Arc<ProviderInner>,
}

impl SerializerProvider {
    /// Starts building a provider.
    pub fn builder() -> ProviderBuilder {
        ProviderBuilder::default()
    }

    /// The provider's configuration.
    #[inline]
    pub fn config(&self) -> &SerializationConfig {
        &self.inner.config
    }

    /// The registered description for a type, if any.
    pub fn description(&self, type_id: TypeId) -> Option<Arc<TypeDescription>> {
        self.inner.registry.get(&type_id).map(Arc::clone)
    }

    /// Creates a fresh per-call context.
    pub fn serialize_cx(&self) -> SerializeCx<'_> {
        SerializeCx {
            provider: self,
            depth: 0,
            object_ids: ObjectIdState::new(),
        }
    }

    /// Serializes `value` by its runtime type.
    pub fn serialize_value(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
    ) -> Result<(), SerError> {
        let type_id = value.type_id();
        let serializer = self.find_value_serializer(type_id)?;
        self.write_root(serializer.as_ref(), value, type_id, out)
    }

    /// Serializes `value` as the declared type `declared`.
    ///
    /// The runtime type must match exactly; subtype dispatch goes through
    /// [`serialize_polymorphic`](Self::serialize_polymorphic) instead.
    pub fn serialize_value_as(
        &self,
        value: &dyn Any,
        declared: TypeId,
        out: &mut dyn Generator,
    ) -> Result<(), SerError> {
        if value.type_id() != declared {
            return Err(SerError::value(
                "root value's runtime type differs from its declared type",
            ));
        }
        let serializer = self.find_value_serializer(declared)?;
        self.write_root(serializer.as_ref(), value, declared, out)
    }

    /// Serializes `value` with polymorphic type metadata, when its
    /// description carries any.
    pub fn serialize_polymorphic(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
    ) -> Result<(), SerError> {
        let type_id = value.type_id();
        let serializer = self.find_typed_serializer(type_id)?;
        self.write_root(serializer.as_ref(), value, type_id, out)
    }

    /// Finds (or builds and caches) the serializer for a type.
    pub fn find_value_serializer(
        &self,
        type_id: TypeId,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        self.find_cached(CacheKey::untyped(type_id))
    }

    /// Finds the type-metadata-carrying serializer for a type. Types
    /// without metadata get their plain serializer.
    pub fn find_typed_serializer(
        &self,
        type_id: TypeId,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        self.find_cached(CacheKey::typed(type_id))
    }

    fn find_cached(&self, key: CacheKey) -> Result<Arc<dyn ValueSerializer>, SerError> {
        if let Some(serializer) = self.inner.cache.lookup(&key) {
            return Ok(serializer);
        }
        let serializer = {
            let guard = self.inner.cache.lock_shared();
            let mut cx = ResolveCx {
                provider: self,
                shared: guard,
            };
            cx.find_with_key(key)?
        };
        // The bound is applied only here, with the guard released; trimming
        // mid-resolution could evict an entry a recursive lookup relies on.
        self.inner.cache.trim_to_limit();
        self.inner.cache.invalidate_snapshot();
        Ok(serializer)
    }

    fn root_wrapper_name(&self, type_id: TypeId) -> Result<Option<String>, SerError> {
        let config = &self.inner.config;
        if let Some(name) = config.root_name() {
            // The empty string is the explicit "never wrap" form.
            return Ok((!name.is_empty()).then(|| name.to_owned()));
        }
        if config.wrap_root() {
            let name = self
                .inner
                .registry
                .get(&type_id)
                .map(|description| description.name().to_owned())
                .ok_or_else(|| {
                    SerError::definition(
                        "",
                        "root wrapping needs a registered description to derive the name from",
                    )
                })?;
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn write_root(
        &self,
        serializer: &dyn ValueSerializer,
        value: &dyn Any,
        type_id: TypeId,
        out: &mut dyn Generator,
    ) -> Result<(), SerError> {
        let mut cx = self.serialize_cx();
        match self.root_wrapper_name(type_id)? {
            Some(name) => {
                out.write_start_object()?;
                out.write_field_name(&name)?;
                serializer.serialize(value, out, &mut cx)?;
                out.write_end_object()?;
                Ok(())
            }
            None => serializer.serialize(value, out, &mut cx),
        }
    }

    /// Drops all cached serializers. Registered descriptions are untouched.
    pub fn flush_cache(&self) {
        debug!("flushing serializer cache");
        self.inner.cache.flush();
    }

    /// The number of currently cached serializers.
    pub fn cached_serializer_count(&self) -> usize {
        self.inner.cache.len()
    }

    fn filter(&self, id: &str) -> Option<Arc<dyn PropertyFilter>> {
        self.inner.filters.get(id).map(Arc::clone)
    }
}

// -----------------------------------------------------------------------------
// ProviderBuilder

/// Builder for [`SerializerProvider`].
#[derive(Debug, Default)]
pub struct ProviderBuilder {
    config: SerializationConfig,
    registry: DescriptionRegistry,
    modifiers: Vec<Arc<dyn SerializerModifier>>,
    filters: HashMap<String, Arc<dyn PropertyFilter>>,
}

impl ProviderBuilder {
    #[must_use]
    pub fn config(mut self, config: SerializationConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: DescriptionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Appends a construction hook; hooks run in registration order.
    #[must_use]
    pub fn modifier(mut self, modifier: Arc<dyn SerializerModifier>) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Registers a property filter under an id referenced by descriptions.
    #[must_use]
    pub fn filter(mut self, id: impl Into<String>, filter: Arc<dyn PropertyFilter>) -> Self {
        self.filters.insert(id.into(), filter);
        self
    }

    pub fn build(self) -> SerializerProvider {
        let cache = SerializerCache::new(self.config.max_cached_serializers());
        SerializerProvider {
            inner: Arc::new(ProviderInner {
                config: self.config,
                registry: self.registry,
                factory: BeanSerializerFactory::new(self.modifiers),
                cache,
                filters: self.filters,
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// ResolveCx

/// The serializer-construction context.
///
/// Holds the cache's construction lock for its whole lifetime, so the
/// build-publish-resolve sequence is atomic and recursive lookups hit
/// already-published partial entries instead of re-locking.
pub struct ResolveCx<'p, 'g> {
    provider: &'p SerializerProvider,
    shared: MutexGuard<'g, CacheShared>,
}

impl ResolveCx<'_, '_> {
    #[inline]
    pub fn config(&self) -> &SerializationConfig {
        self.provider.config()
    }

    /// The registered description for a type, if any.
    pub fn description(&self, type_id: TypeId) -> Option<Arc<TypeDescription>> {
        self.provider.description(type_id)
    }

    /// Finds the serializer for a type, building it under the held lock if
    /// necessary.
    pub fn find_value_serializer(
        &mut self,
        type_id: TypeId,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        self.find_with_key(CacheKey::untyped(type_id))
    }

    fn find_with_key(&mut self, key: CacheKey) -> Result<Arc<dyn ValueSerializer>, SerError> {
        if let Some(serializer) = self.shared.get(&key) {
            return Ok(serializer);
        }
        trace!(typed = key.typed, "serializer cache miss, building");

        let provider = self.provider;
        let serializer: Arc<dyn ValueSerializer> = if key.typed {
            let inner = self.find_with_key(CacheKey::untyped(key.type_id))?;
            let type_info = provider
                .description(key.type_id)
                .and_then(|description| match description.shape() {
                    TypeShape::Bean(bean) => bean.type_info().cloned(),
                    _ => None,
                });
            match type_info {
                Some(type_info) => Arc::new(TypedSerializer { inner, type_info }),
                None => inner,
            }
        } else {
            provider.inner.factory.create_serializer(self, key.type_id)?
        };

        // Publish before resolving: a cyclic type graph resolves against
        // this entry instead of recursing into a rebuild.
        self.shared.insert(key, Arc::clone(&serializer));
        if let Err(err) = serializer.resolve(self) {
            self.shared.remove(&key);
            return Err(err);
        }
        Ok(serializer)
    }
}

impl fmt::Debug for ResolveCx<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveCx").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// SerializeCx

/// Per-call serialization state.
pub struct SerializeCx<'p> {
    provider: &'p SerializerProvider,
    depth: usize,
    object_ids: ObjectIdState,
}

impl SerializeCx<'_> {
    #[inline]
    pub fn config(&self) -> &SerializationConfig {
        self.provider.config()
    }

    /// The active view for this call, if any.
    #[inline]
    pub fn active_view(&self) -> Option<&str> {
        self.config().active_view()
    }

    /// The registered description for a type, if any.
    pub fn description(&self, type_id: TypeId) -> Option<Arc<TypeDescription>> {
        self.provider.description(type_id)
    }

    /// Finds (or builds) a serializer mid-call; used by dynamically typed
    /// call sites.
    pub fn find_value_serializer(
        &mut self,
        type_id: TypeId,
    ) -> Result<Arc<dyn ValueSerializer>, SerError> {
        self.provider.find_value_serializer(type_id)
    }

    /// Looks a property filter up by id.
    pub fn filter(&self, id: &str) -> Option<Arc<dyn PropertyFilter>> {
        self.provider.filter(id)
    }

    /// The object-id bookkeeping for this call.
    #[inline]
    pub fn object_ids(&mut self) -> &mut ObjectIdState {
        &mut self.object_ids
    }

    /// Enters one nesting level; fails once the configured limit is hit.
    pub fn descend(&mut self) -> Result<(), SerError> {
        let limit = self.config().max_nesting();
        if self.depth >= limit {
            return Err(SerError::NestingLimit {
                limit,
                path: Vec::new(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Leaves one nesting level.
    #[inline]
    pub fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl fmt::Debug for SerializeCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializeCx")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use serde_json::{json, Value};

    use crate::desc::{
        Accessor, AnyGetterDefinition, BeanDescription, Converter, ErasedValue, FormatShape,
        Inclusion, ObjectIdInfo, ObjectIdKeyFn, PropertyDefinition, PropertyFormat,
        ReferenceShape, SequenceShape, TypeDescription, TypeShape,
    };
    use crate::generator::{JsonValueGenerator, Token, TokenBuffer};
    use crate::ser::{SerializerModifier, SimplePropertyFilter};

    use super::*;

    struct Point {
        x: i32,
        y: i32,
    }

    fn point_registry() -> DescriptionRegistry {
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Point>(
            BeanDescription::new("Point")
                .with_property(
                    PropertyDefinition::new("x", Accessor::field(|p: &Point| &p.x))
                        .with_type::<i32>(),
                )
                .with_property(
                    PropertyDefinition::new("y", Accessor::field(|p: &Point| &p.y))
                        .with_type::<i32>(),
                ),
        );
        registry
    }

    fn to_json(provider: &SerializerProvider, value: &dyn Any) -> Value {
        let mut out = JsonValueGenerator::new();
        provider.serialize_value(value, &mut out).unwrap();
        out.finish().unwrap()
    }

    fn to_tokens(provider: &SerializerProvider, value: &dyn Any) -> Vec<Token> {
        let mut out = TokenBuffer::new();
        provider.serialize_value(value, &mut out).unwrap();
        out.into_tokens()
    }

    #[test]
    fn bean_serializes_declared_properties_in_order() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .build();
        assert_eq!(
            to_json(&provider, &Point { x: 3, y: 4 }),
            json!({ "x": 3, "y": 4 }),
        );
    }

    #[test]
    fn serializers_are_cached_and_shared() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .build();
        let first = provider.find_value_serializer(TypeId::of::<Point>()).unwrap();
        let second = provider.find_value_serializer(TypeId::of::<Point>()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.cached_serializer_count(), 1);

        provider.flush_cache();
        assert_eq!(provider.cached_serializer_count(), 0);
        let rebuilt = provider.find_value_serializer(TypeId::of::<Point>()).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }

    #[test]
    fn concurrent_lookups_converge_on_one_instance() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .build();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let provider = provider.clone();
                scope.spawn(move || {
                    let mut out = JsonValueGenerator::new();
                    provider
                        .serialize_value(&Point { x: 1, y: 2 }, &mut out)
                        .unwrap();
                });
            }
        });

        let first = provider.find_value_serializer(TypeId::of::<Point>()).unwrap();
        let second = provider.find_value_serializer(TypeId::of::<Point>()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn concurrent_builds_of_distinct_types_all_land_in_the_cache() {
        struct Slot<const N: usize> {
            n: u32,
        }

        fn register_slot<const N: usize>(registry: &mut DescriptionRegistry) {
            registry.register_bean::<Slot<N>>(
                BeanDescription::new(format!("Slot{N}")).with_property(
                    PropertyDefinition::new("n", Accessor::field(|s: &Slot<N>| &s.n))
                        .with_type::<u32>(),
                ),
            );
        }

        fn check_slot<const N: usize>(provider: &SerializerProvider) {
            let mut out = JsonValueGenerator::new();
            provider
                .serialize_value(&Slot::<N> { n: N as u32 }, &mut out)
                .unwrap();
            let n = N as u32;
            assert_eq!(out.finish().unwrap(), json!({ "n": n }));
        }

        let mut registry = DescriptionRegistry::new();
        register_slot::<0>(&mut registry);
        register_slot::<1>(&mut registry);
        register_slot::<2>(&mut registry);
        register_slot::<3>(&mut registry);
        register_slot::<4>(&mut registry);
        register_slot::<5>(&mut registry);
        register_slot::<6>(&mut registry);
        register_slot::<7>(&mut registry);
        let provider = SerializerProvider::builder().registry(registry).build();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let provider = provider.clone();
                scope.spawn(move || {
                    check_slot::<0>(&provider);
                    check_slot::<1>(&provider);
                    check_slot::<2>(&provider);
                    check_slot::<3>(&provider);
                    check_slot::<4>(&provider);
                    check_slot::<5>(&provider);
                    check_slot::<6>(&provider);
                    check_slot::<7>(&provider);
                });
            }
        });

        // Eight beans plus the shared u32 scalar.
        assert_eq!(provider.cached_serializer_count(), 9);
    }

    // -------------------------------------------------------------------------
    // Inclusion

    struct Tagged {
        name: String,
        tags: Vec<String>,
    }

    fn tagged_registry() -> DescriptionRegistry {
        let mut registry = DescriptionRegistry::new();
        registry.register_sequence::<Vec<String>, String>();
        registry.register_bean::<Tagged>(
            BeanDescription::new("Tagged")
                .with_property(
                    PropertyDefinition::new("name", Accessor::field(|t: &Tagged| &t.name))
                        .with_type::<String>(),
                )
                .with_property(
                    PropertyDefinition::new("tags", Accessor::field(|t: &Tagged| &t.tags))
                        .with_type::<Vec<String>>(),
                ),
        );
        registry
    }

    #[test]
    fn empty_collections_omitted_when_disabled() {
        let provider = SerializerProvider::builder()
            .registry(tagged_registry())
            .config(SerializationConfig::new().with_write_empty_collections(false))
            .build();

        let empty = Tagged {
            name: "a".into(),
            tags: Vec::new(),
        };
        assert_eq!(to_json(&provider, &empty), json!({ "name": "a" }));

        let full = Tagged {
            name: "a".into(),
            tags: vec!["x".into()],
        };
        assert_eq!(
            to_json(&provider, &full),
            json!({ "name": "a", "tags": ["x"] }),
        );
    }

    #[test]
    fn empty_collections_written_by_default() {
        let provider = SerializerProvider::builder()
            .registry(tagged_registry())
            .build();
        let empty = Tagged {
            name: "a".into(),
            tags: Vec::new(),
        };
        assert_eq!(
            to_json(&provider, &empty),
            json!({ "name": "a", "tags": [] }),
        );
    }

    struct MaybeLabeled {
        label: Option<String>,
    }

    fn labeled_registry(inclusion: Inclusion) -> DescriptionRegistry {
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<MaybeLabeled>(
            BeanDescription::new("MaybeLabeled").with_property(
                PropertyDefinition::new(
                    "label",
                    Accessor::optional(|m: &MaybeLabeled| m.label.as_ref()),
                )
                .with_type::<String>()
                .with_inclusion(inclusion),
            ),
        );
        registry
    }

    #[test]
    fn non_null_omits_absent_values() {
        let provider = SerializerProvider::builder()
            .registry(labeled_registry(Inclusion::NonNull))
            .build();
        assert_eq!(
            to_json(&provider, &MaybeLabeled { label: None }),
            json!({}),
        );
        assert_eq!(
            to_json(
                &provider,
                &MaybeLabeled {
                    label: Some("x".into())
                }
            ),
            json!({ "label": "x" }),
        );
    }

    #[test]
    fn custom_null_serializer_replaces_the_null_token() {
        #[derive(Debug)]
        struct AbsentMarker;
        impl ValueSerializer for AbsentMarker {
            fn serialize(
                &self,
                _value: &dyn Any,
                out: &mut dyn Generator,
                _cx: &mut SerializeCx<'_>,
            ) -> Result<(), SerError> {
                out.write_str("n/a")?;
                Ok(())
            }
        }

        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<MaybeLabeled>(
            BeanDescription::new("MaybeLabeled").with_property(
                PropertyDefinition::new(
                    "label",
                    Accessor::optional(|m: &MaybeLabeled| m.label.as_ref()),
                )
                .with_type::<String>()
                .with_null_serializer(Arc::new(AbsentMarker)),
            ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        assert_eq!(
            to_json(&provider, &MaybeLabeled { label: None }),
            json!({ "label": "n/a" }),
        );
    }

    #[test]
    fn absent_values_without_a_null_serializer_are_omitted() {
        let provider = SerializerProvider::builder()
            .registry(labeled_registry(Inclusion::Always))
            .build();
        assert_eq!(to_json(&provider, &MaybeLabeled { label: None }), json!({}));
        assert_eq!(
            to_json(
                &provider,
                &MaybeLabeled {
                    label: Some("x".into())
                }
            ),
            json!({ "label": "x" }),
        );
    }

    #[test]
    fn optional_values_write_the_inner_value_or_null() {
        let mut registry = DescriptionRegistry::new();
        registry.register_optional::<String>();
        let provider = SerializerProvider::builder().registry(registry).build();

        let some: Option<String> = Some("x".into());
        let none: Option<String> = None;
        assert_eq!(to_json(&provider, &some), json!("x"));
        assert_eq!(to_json(&provider, &none), json!(null));
    }

    #[test]
    fn non_default_compares_against_the_baseline() {
        struct Counter {
            n: i32,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Counter>(
            BeanDescription::new("Counter").with_property(
                PropertyDefinition::new("n", Accessor::field(|c: &Counter| &c.n))
                    .with_type::<i32>()
                    .with_inclusion(Inclusion::NonDefault)
                    .with_default_value(ErasedValue::new(0_i32)),
            ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        assert_eq!(to_json(&provider, &Counter { n: 0 }), json!({}));
        assert_eq!(to_json(&provider, &Counter { n: 5 }), json!({ "n": 5 }));
    }

    // -------------------------------------------------------------------------
    // Views

    struct Audited {
        public_id: u32,
        internal_note: String,
        plain: bool,
    }

    fn audited_registry() -> DescriptionRegistry {
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Audited>(
            BeanDescription::new("Audited")
                .with_property(
                    PropertyDefinition::new("public_id", Accessor::field(|a: &Audited| &a.public_id))
                        .with_type::<u32>()
                        .with_views(["public"]),
                )
                .with_property(
                    PropertyDefinition::new(
                        "internal_note",
                        Accessor::field(|a: &Audited| &a.internal_note),
                    )
                    .with_type::<String>()
                    .with_views(["internal"]),
                )
                .with_property(
                    PropertyDefinition::new("plain", Accessor::field(|a: &Audited| &a.plain))
                        .with_type::<bool>(),
                ),
        );
        registry
    }

    fn audited() -> Audited {
        Audited {
            public_id: 9,
            internal_note: "n".into(),
            plain: true,
        }
    }

    #[test]
    fn active_view_selects_properties() {
        let provider = SerializerProvider::builder()
            .registry(audited_registry())
            .config(SerializationConfig::new().with_active_view("public"))
            .build();
        assert_eq!(
            to_json(&provider, &audited()),
            json!({ "public_id": 9, "plain": true }),
        );
    }

    #[test]
    fn default_view_inclusion_can_hide_unrestricted_properties() {
        let provider = SerializerProvider::builder()
            .registry(audited_registry())
            .config(
                SerializationConfig::new()
                    .with_active_view("public")
                    .with_default_view_inclusion(false),
            )
            .build();
        assert_eq!(to_json(&provider, &audited()), json!({ "public_id": 9 }));
    }

    #[test]
    fn no_active_view_writes_everything() {
        let provider = SerializerProvider::builder()
            .registry(audited_registry())
            .build();
        assert_eq!(
            to_json(&provider, &audited()),
            json!({ "public_id": 9, "internal_note": "n", "plain": true }),
        );
    }

    // -------------------------------------------------------------------------
    // Root wrapping

    #[test]
    fn wrap_root_derives_the_name_from_the_description() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .config(SerializationConfig::new().with_wrap_root(true))
            .build();
        assert_eq!(
            to_json(&provider, &Point { x: 1, y: 2 }),
            json!({ "Point": { "x": 1, "y": 2 } }),
        );
    }

    #[test]
    fn explicit_root_name_overrides_derivation() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .config(
                SerializationConfig::new()
                    .with_wrap_root(true)
                    .with_root_name("pt"),
            )
            .build();
        assert_eq!(
            to_json(&provider, &Point { x: 1, y: 2 }),
            json!({ "pt": { "x": 1, "y": 2 } }),
        );
    }

    #[test]
    fn empty_root_name_disables_wrapping() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .config(
                SerializationConfig::new()
                    .with_wrap_root(true)
                    .with_root_name(""),
            )
            .build();
        assert_eq!(
            to_json(&provider, &Point { x: 1, y: 2 }),
            json!({ "x": 1, "y": 2 }),
        );
    }

    // -------------------------------------------------------------------------
    // Recursion, depth, self-reference

    struct Chain {
        label: u32,
        next: Option<Box<Chain>>,
    }

    fn chain_registry() -> DescriptionRegistry {
        let mut registry = DescriptionRegistry::new();
        registry.register::<Box<Chain>>(TypeDescription::new(
            "Box<Chain>",
            TypeShape::Reference(ReferenceShape::boxed::<Chain>()),
        ));
        registry.register_bean::<Chain>(
            BeanDescription::new("Chain")
                .with_property(
                    PropertyDefinition::new("label", Accessor::field(|c: &Chain| &c.label))
                        .with_type::<u32>(),
                )
                .with_property(
                    PropertyDefinition::new(
                        "next",
                        Accessor::optional(|c: &Chain| c.next.as_ref()),
                    )
                    .with_type::<Box<Chain>>()
                    .with_inclusion(Inclusion::NonNull),
                ),
        );
        registry
    }

    fn chain(depth: u32) -> Chain {
        let mut head = Chain {
            label: 0,
            next: None,
        };
        for label in 1..depth {
            head = Chain {
                label,
                next: Some(Box::new(head)),
            };
        }
        head
    }

    #[test]
    fn self_referential_types_resolve_and_serialize() {
        let provider = SerializerProvider::builder()
            .registry(chain_registry())
            .build();
        assert_eq!(
            to_json(&provider, &chain(3)),
            json!({ "label": 2, "next": { "label": 1, "next": { "label": 0 } } }),
        );
    }

    #[test]
    fn tiny_cache_still_resolves_recursive_types() {
        // Resolving `Chain` publishes more entries than the cache may keep;
        // none of them may be dropped while the resolution is in flight.
        let provider = SerializerProvider::builder()
            .registry(chain_registry())
            .config(SerializationConfig::new().with_max_cached_serializers(1))
            .build();

        assert_eq!(
            to_json(&provider, &chain(3)),
            json!({ "label": 2, "next": { "label": 1, "next": { "label": 0 } } }),
        );
        assert!(provider.cached_serializer_count() <= 1);

        // A later call rebuilds whatever was trimmed and still succeeds.
        assert_eq!(
            to_json(&provider, &chain(2)),
            json!({ "label": 1, "next": { "label": 0 } }),
        );
    }

    #[test]
    fn nesting_limit_aborts_deep_graphs() {
        let provider = SerializerProvider::builder()
            .registry(chain_registry())
            .config(SerializationConfig::new().with_max_nesting(4))
            .build();

        let mut out = TokenBuffer::new();
        let err = provider
            .serialize_value(&chain(10), &mut out)
            .unwrap_err();
        assert!(matches!(err, SerError::NestingLimit { limit: 4, .. }));

        let mut out = TokenBuffer::new();
        provider.serialize_value(&chain(3), &mut out).unwrap();
    }

    struct Parent {
        name: String,
        child: Option<Box<Child>>,
    }

    struct Child {
        name: String,
        parent: Option<Box<Parent>>,
    }

    #[test]
    fn mutually_recursive_beans_resolve_without_deadlock() {
        let mut registry = DescriptionRegistry::new();
        registry.register::<Box<Parent>>(TypeDescription::new(
            "Box<Parent>",
            TypeShape::Reference(ReferenceShape::boxed::<Parent>()),
        ));
        registry.register::<Box<Child>>(TypeDescription::new(
            "Box<Child>",
            TypeShape::Reference(ReferenceShape::boxed::<Child>()),
        ));
        registry.register_bean::<Parent>(
            BeanDescription::new("Parent")
                .with_property(
                    PropertyDefinition::new("name", Accessor::field(|p: &Parent| &p.name))
                        .with_type::<String>(),
                )
                .with_property(
                    PropertyDefinition::new(
                        "child",
                        Accessor::optional(|p: &Parent| p.child.as_ref()),
                    )
                    .with_type::<Box<Child>>()
                    .with_inclusion(Inclusion::NonNull),
                ),
        );
        registry.register_bean::<Child>(
            BeanDescription::new("Child")
                .with_property(
                    PropertyDefinition::new("name", Accessor::field(|c: &Child| &c.name))
                        .with_type::<String>(),
                )
                .with_property(
                    PropertyDefinition::new(
                        "parent",
                        Accessor::optional(|c: &Child| c.parent.as_ref()),
                    )
                    .with_type::<Box<Parent>>()
                    .with_inclusion(Inclusion::NonNull),
                ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let parent = Parent {
            name: "p".into(),
            child: Some(Box::new(Child {
                name: "c".into(),
                parent: None,
            })),
        };
        assert_eq!(
            to_json(&provider, &parent),
            json!({ "name": "p", "child": { "name": "c" } }),
        );
    }

    #[test]
    fn direct_self_reference_is_rejected() {
        struct Selfish {
            n: u8,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Selfish>(
            BeanDescription::new("Selfish")
                .with_property(
                    PropertyDefinition::new("n", Accessor::field(|s: &Selfish| &s.n))
                        .with_type::<u8>(),
                )
                .with_property(PropertyDefinition::new(
                    "me",
                    Accessor::with(|owner| Ok(Some(owner))),
                )),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let mut out = TokenBuffer::new();
        let err = provider
            .serialize_value(&Selfish { n: 1 }, &mut out)
            .unwrap_err();
        assert!(err.to_string().contains("self-reference"));
    }

    #[test]
    fn self_reference_with_object_id_writes_a_bare_id() {
        struct Node {
            n: u32,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Node>(
            BeanDescription::new("Node")
                .with_property(
                    PropertyDefinition::new("n", Accessor::field(|s: &Node| &s.n))
                        .with_type::<u32>(),
                )
                .with_property(PropertyDefinition::new(
                    "me",
                    Accessor::with(|owner| Ok(Some(owner))),
                ))
                .with_object_id(ObjectIdInfo::int_sequence("@id")),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        // Object-id handling turns the cycle into a re-reference, so the
        // guard that rejects plain self-references stands down.
        assert_eq!(
            to_tokens(&provider, &Node { n: 5 }),
            [
                Token::StartObject,
                Token::FieldName("@id".into()),
                Token::U64(1),
                Token::FieldName("n".into()),
                Token::U64(5),
                Token::FieldName("me".into()),
                Token::U64(1),
                Token::EndObject,
            ],
        );
    }

    // -------------------------------------------------------------------------
    // Object ids

    struct Leaf {
        n: u32,
    }

    struct SharedPair {
        a: Rc<Leaf>,
        b: Rc<Leaf>,
    }

    #[test]
    fn shared_references_write_a_bare_sequence_id() {
        let mut registry = DescriptionRegistry::new();
        registry.register::<Rc<Leaf>>(TypeDescription::new(
            "Rc<Leaf>",
            TypeShape::Reference(ReferenceShape::rc::<Leaf>()),
        ));
        registry.register_bean::<Leaf>(
            BeanDescription::new("Leaf")
                .with_property(
                    PropertyDefinition::new("n", Accessor::field(|l: &Leaf| &l.n))
                        .with_type::<u32>(),
                )
                .with_object_id(ObjectIdInfo::int_sequence("@id")),
        );
        registry.register_bean::<SharedPair>(
            BeanDescription::new("SharedPair")
                .with_property(
                    PropertyDefinition::new("a", Accessor::field(|p: &SharedPair| &p.a))
                        .with_type::<Rc<Leaf>>(),
                )
                .with_property(
                    PropertyDefinition::new("b", Accessor::field(|p: &SharedPair| &p.b))
                        .with_type::<Rc<Leaf>>(),
                ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let shared = Rc::new(Leaf { n: 7 });
        let pair = SharedPair {
            a: Rc::clone(&shared),
            b: shared,
        };
        assert_eq!(
            to_tokens(&provider, &pair),
            [
                Token::StartObject,
                Token::FieldName("a".into()),
                Token::StartObject,
                Token::FieldName("@id".into()),
                Token::U64(1),
                Token::FieldName("n".into()),
                Token::U64(7),
                Token::EndObject,
                Token::FieldName("b".into()),
                Token::U64(1),
                Token::EndObject,
            ],
        );
    }

    struct User {
        name: String,
        id: u32,
    }

    #[test]
    fn property_object_id_is_hoisted_and_reused() {
        let mut registry = DescriptionRegistry::new();
        registry.register_sequence::<Vec<User>, User>();
        registry.register_bean::<User>(
            BeanDescription::new("User")
                .with_property(
                    PropertyDefinition::new("name", Accessor::field(|u: &User| &u.name))
                        .with_type::<String>(),
                )
                .with_property(
                    PropertyDefinition::new("id", Accessor::field(|u: &User| &u.id))
                        .with_type::<u32>(),
                )
                .with_object_id(ObjectIdInfo::property("id").with_key(ObjectIdKeyFn::new(
                    |value| {
                        value
                            .downcast_ref::<User>()
                            .map(|user| u64::from(user.id))
                            .unwrap_or_default()
                    },
                ))),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let users = vec![
            User {
                name: "a".into(),
                id: 1,
            },
            User {
                name: "b".into(),
                id: 1,
            },
        ];
        // Logical identity collapses the second allocation; the id property
        // leads the first object's output.
        assert_eq!(
            to_tokens(&provider, &users),
            [
                Token::StartArray,
                Token::StartObject,
                Token::FieldName("id".into()),
                Token::U64(1),
                Token::FieldName("name".into()),
                Token::Str("a".into()),
                Token::EndObject,
                Token::U64(1),
                Token::EndArray,
            ],
        );
    }

    // -------------------------------------------------------------------------
    // Any getter, filters, shapes

    struct Rec {
        name: String,
        extra: BTreeMap<String, i64>,
    }

    #[test]
    fn any_getter_entries_follow_declared_properties() {
        let mut registry = DescriptionRegistry::new();
        registry.register_map::<BTreeMap<String, i64>, String, i64>();
        registry.register_bean::<Rec>(
            BeanDescription::new("Rec")
                .with_property(
                    PropertyDefinition::new("name", Accessor::field(|r: &Rec| &r.name))
                        .with_type::<String>(),
                )
                .with_any_getter(
                    AnyGetterDefinition::new(Accessor::field(|r: &Rec| &r.extra))
                        .with_declared_type(TypeId::of::<BTreeMap<String, i64>>()),
                ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let mut extra = BTreeMap::new();
        extra.insert("k1".to_owned(), 10_i64);
        extra.insert("k2".to_owned(), 20_i64);
        let rec = Rec {
            name: "r".into(),
            extra,
        };
        assert_eq!(
            to_tokens(&provider, &rec),
            [
                Token::StartObject,
                Token::FieldName("name".into()),
                Token::Str("r".into()),
                Token::FieldName("k1".into()),
                Token::I64(10),
                Token::FieldName("k2".into()),
                Token::I64(20),
                Token::EndObject,
            ],
        );
    }

    #[test]
    fn filters_drop_properties_per_call() {
        struct Account {
            id: u32,
            secret: String,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Account>(
            BeanDescription::new("Account")
                .with_property(
                    PropertyDefinition::new("id", Accessor::field(|a: &Account| &a.id))
                        .with_type::<u32>(),
                )
                .with_property(
                    PropertyDefinition::new("secret", Accessor::field(|a: &Account| &a.secret))
                        .with_type::<String>(),
                )
                .with_filter_id("redact"),
        );
        let provider = SerializerProvider::builder()
            .registry(registry)
            .filter("redact", Arc::new(SimplePropertyFilter::exclude(["secret"])))
            .build();

        let account = Account {
            id: 5,
            secret: "s".into(),
        };
        assert_eq!(to_json(&provider, &account), json!({ "id": 5 }));
    }

    #[test]
    fn missing_filter_is_an_error() {
        struct Locked {
            id: u32,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Locked>(
            BeanDescription::new("Locked")
                .with_property(
                    PropertyDefinition::new("id", Accessor::field(|l: &Locked| &l.id))
                        .with_type::<u32>(),
                )
                .with_filter_id("nope"),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let mut out = TokenBuffer::new();
        let err = provider
            .serialize_value(&Locked { id: 1 }, &mut out)
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn array_shape_keeps_suppressed_slots_as_nulls() {
        struct Row {
            x: i32,
            note: String,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Row>(
            BeanDescription::new("Row")
                .with_property(
                    PropertyDefinition::new("x", Accessor::field(|r: &Row| &r.x))
                        .with_type::<i32>(),
                )
                .with_property(
                    PropertyDefinition::new("note", Accessor::field(|r: &Row| &r.note))
                        .with_type::<String>()
                        .with_inclusion(Inclusion::NonEmpty),
                )
                .with_shape(FormatShape::Array),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let row = Row {
            x: 3,
            note: String::new(),
        };
        assert_eq!(
            to_tokens(&provider, &row),
            [
                Token::StartArray,
                Token::I64(3),
                Token::Null,
                Token::EndArray,
            ],
        );
    }

    struct Bag {
        items: Vec<i32>,
    }

    impl<'a> IntoIterator for &'a Bag {
        type Item = &'a i32;
        type IntoIter = std::slice::Iter<'a, i32>;

        fn into_iter(self) -> Self::IntoIter {
            self.items.iter()
        }
    }

    #[test]
    fn addon_sequence_applies_only_without_properties() {
        let bag = Bag { items: vec![1, 2] };

        // No declared properties: the container add-on view takes over.
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Bag>(
            BeanDescription::new("Bag").with_addon_sequence(SequenceShape::of::<Bag, i32>()),
        );
        let provider = SerializerProvider::builder().registry(registry).build();
        assert_eq!(to_json(&provider, &bag), json!([1, 2]));

        // With a declared property the bean form wins.
        let mut registry = DescriptionRegistry::new();
        registry.register_sequence::<Vec<i32>, i32>();
        registry.register_bean::<Bag>(
            BeanDescription::new("Bag")
                .with_property(
                    PropertyDefinition::new("items", Accessor::field(|b: &Bag| &b.items))
                        .with_type::<Vec<i32>>(),
                )
                .with_addon_sequence(SequenceShape::of::<Bag, i32>()),
        );
        let provider = SerializerProvider::builder().registry(registry).build();
        assert_eq!(to_json(&provider, &bag), json!({ "items": [1, 2] }));
    }

    // -------------------------------------------------------------------------
    // Escape hatches

    #[test]
    fn converter_delegates_to_the_output_type() {
        struct Celsius(f64);
        let mut registry = DescriptionRegistry::new();
        registry.register::<Celsius>(
            TypeDescription::new("Celsius", TypeShape::Scalar)
                .with_converter(Converter::new(|c: &Celsius| c.0 * 9.0 / 5.0 + 32.0)),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        assert_eq!(to_json(&provider, &Celsius(100.0)), json!(212.0));
    }

    #[test]
    fn serialize_as_refines_to_the_target_serializer() {
        #[derive(Debug)]
        struct Redacting;
        impl ValueSerializer for Redacting {
            fn serialize(
                &self,
                _value: &dyn Any,
                out: &mut dyn Generator,
                _cx: &mut SerializeCx<'_>,
            ) -> Result<(), SerError> {
                out.write_str("***")?;
                Ok(())
            }
        }

        struct Redacted;
        struct Secret {
            #[allow(dead_code)]
            key: String,
        }

        let mut registry = DescriptionRegistry::new();
        registry.register::<Redacted>(
            TypeDescription::new("Redacted", TypeShape::Scalar)
                .with_serializer(Arc::new(Redacting)),
        );
        registry.register::<Secret>(
            TypeDescription::new("Secret", TypeShape::Scalar).serialize_as::<Redacted>(),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        assert_eq!(
            to_json(&provider, &Secret { key: "k".into() }),
            json!("***"),
        );
    }

    #[test]
    fn contextual_precision_rounds_floats() {
        struct Reading {
            v: f64,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Reading>(
            BeanDescription::new("Reading").with_property(
                PropertyDefinition::new("v", Accessor::field(|r: &Reading| &r.v))
                    .with_type::<f64>()
                    .with_format(PropertyFormat {
                        precision: Some(2),
                    }),
            ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        assert_eq!(
            to_json(&provider, &Reading { v: 3.14159 }),
            json!({ "v": 3.14 }),
        );
    }

    // -------------------------------------------------------------------------
    // Polymorphic type info

    struct Event {
        kind: String,
        seq: u32,
    }

    fn event_registry(type_property: &str) -> DescriptionRegistry {
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Event>(
            BeanDescription::new("Event")
                .with_property(
                    PropertyDefinition::new("kind", Accessor::field(|e: &Event| &e.kind))
                        .with_type::<String>(),
                )
                .with_property(
                    PropertyDefinition::new("seq", Accessor::field(|e: &Event| &e.seq))
                        .with_type::<u32>(),
                )
                .with_type_info(TypeSerializer::Property {
                    name: type_property.to_owned(),
                    type_id: "event".to_owned(),
                }),
        );
        registry
    }

    #[test]
    fn inline_type_id_leads_the_typed_output() {
        let provider = SerializerProvider::builder()
            .registry(event_registry("@type"))
            .build();
        let event = Event {
            kind: "k".into(),
            seq: 2,
        };

        let mut out = TokenBuffer::new();
        provider.serialize_polymorphic(&event, &mut out).unwrap();
        assert_eq!(
            out.into_tokens(),
            [
                Token::StartObject,
                Token::FieldName("@type".into()),
                Token::Str("event".into()),
                Token::FieldName("kind".into()),
                Token::Str("k".into()),
                Token::FieldName("seq".into()),
                Token::U64(2),
                Token::EndObject,
            ],
        );
    }

    #[test]
    fn declared_property_wins_over_a_colliding_type_id() {
        let provider = SerializerProvider::builder()
            .registry(event_registry("kind"))
            .build();
        let event = Event {
            kind: "k".into(),
            seq: 2,
        };

        // `kind` belongs to the declared property; the inline type id
        // stands down instead of overwriting its value.
        let mut out = TokenBuffer::new();
        provider.serialize_polymorphic(&event, &mut out).unwrap();
        assert_eq!(
            out.into_tokens(),
            [
                Token::StartObject,
                Token::FieldName("kind".into()),
                Token::Str("k".into()),
                Token::FieldName("seq".into()),
                Token::U64(2),
                Token::EndObject,
            ],
        );
    }

    #[test]
    fn plain_serialization_keeps_the_colliding_property() {
        let provider = SerializerProvider::builder()
            .registry(event_registry("kind"))
            .build();
        let event = Event {
            kind: "k".into(),
            seq: 2,
        };
        assert_eq!(to_json(&provider, &event), json!({ "kind": "k", "seq": 2 }));
    }

    // -------------------------------------------------------------------------
    // Modifiers, fallbacks, misc

    #[derive(Debug)]
    struct DropSecret;

    impl SerializerModifier for DropSecret {
        fn change_properties(
            &self,
            _description: &BeanDescription,
            properties: Vec<PropertyDefinition>,
        ) -> Vec<PropertyDefinition> {
            properties
                .into_iter()
                .filter(|definition| definition.name() != "secret")
                .collect()
        }
    }

    #[test]
    fn modifiers_can_rewrite_the_property_set() {
        struct Creds {
            user: String,
            secret: String,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_bean::<Creds>(
            BeanDescription::new("Creds")
                .with_property(
                    PropertyDefinition::new("user", Accessor::field(|c: &Creds| &c.user))
                        .with_type::<String>(),
                )
                .with_property(
                    PropertyDefinition::new("secret", Accessor::field(|c: &Creds| &c.secret))
                        .with_type::<String>(),
                ),
        );
        let provider = SerializerProvider::builder()
            .registry(registry)
            .modifier(Arc::new(DropSecret))
            .build();

        let creds = Creds {
            user: "u".into(),
            secret: "s".into(),
        };
        assert_eq!(to_json(&provider, &creds), json!({ "user": "u" }));
    }

    #[test]
    fn unregistered_types_fail_or_degrade_to_empty_objects() {
        struct Mystery;

        let provider = SerializerProvider::builder().build();
        let mut out = TokenBuffer::new();
        let err = provider.serialize_value(&Mystery, &mut out).unwrap_err();
        assert!(matches!(err, SerError::Definition { .. }));

        let lenient = SerializerProvider::builder()
            .config(SerializationConfig::new().with_fail_on_empty_beans(false))
            .build();
        let mut out = JsonValueGenerator::new();
        lenient.serialize_value(&Mystery, &mut out).unwrap();
        assert_eq!(out.finish().unwrap(), json!({}));
    }

    #[test]
    fn serialize_value_as_validates_the_runtime_type() {
        let provider = SerializerProvider::builder()
            .registry(point_registry())
            .build();
        let mut out = TokenBuffer::new();
        let err = provider
            .serialize_value_as(&Point { x: 1, y: 2 }, TypeId::of::<i32>(), &mut out)
            .unwrap_err();
        assert!(matches!(err, SerError::Value { .. }));

        let mut out = JsonValueGenerator::new();
        provider
            .serialize_value_as(&Point { x: 1, y: 2 }, TypeId::of::<Point>(), &mut out)
            .unwrap();
        assert_eq!(out.finish().unwrap(), json!({ "x": 1, "y": 2 }));
    }

    #[test]
    fn ignored_and_included_name_sets_prune_properties() {
        struct Wide {
            a: u8,
            b: u8,
            c: u8,
        }
        let description = |registry: &mut DescriptionRegistry, base: BeanDescription| {
            registry.register_bean::<Wide>(
                base.with_property(
                    PropertyDefinition::new("a", Accessor::field(|w: &Wide| &w.a))
                        .with_type::<u8>(),
                )
                .with_property(
                    PropertyDefinition::new("b", Accessor::field(|w: &Wide| &w.b))
                        .with_type::<u8>(),
                )
                .with_property(
                    PropertyDefinition::new("c", Accessor::field(|w: &Wide| &w.c))
                        .with_type::<u8>(),
                ),
            );
        };

        let mut registry = DescriptionRegistry::new();
        description(
            &mut registry,
            BeanDescription::new("Wide").with_ignored(["b"]),
        );
        let provider = SerializerProvider::builder().registry(registry).build();
        let wide = Wide { a: 1, b: 2, c: 3 };
        assert_eq!(to_json(&provider, &wide), json!({ "a": 1, "c": 3 }));

        let mut registry = DescriptionRegistry::new();
        description(
            &mut registry,
            BeanDescription::new("Wide").with_included(["c"]),
        );
        let provider = SerializerProvider::builder().registry(registry).build();
        assert_eq!(to_json(&provider, &wide), json!({ "c": 3 }));
    }

    #[test]
    fn errors_carry_the_property_path() {
        struct Inner {
            times: Vec<std::time::SystemTime>,
        }
        struct Outer {
            inner: Inner,
        }
        let mut registry = DescriptionRegistry::new();
        registry.register_sequence::<Vec<std::time::SystemTime>, std::time::SystemTime>();
        registry.register_bean::<Inner>(
            BeanDescription::new("Inner").with_property(
                PropertyDefinition::new("times", Accessor::field(|i: &Inner| &i.times))
                    .with_type::<Vec<std::time::SystemTime>>(),
            ),
        );
        registry.register_bean::<Outer>(
            BeanDescription::new("Outer").with_property(
                PropertyDefinition::new("inner", Accessor::field(|o: &Outer| &o.inner))
                    .with_type::<Inner>(),
            ),
        );
        let provider = SerializerProvider::builder().registry(registry).build();

        let bad = Outer {
            inner: Inner {
                times: vec![std::time::UNIX_EPOCH - std::time::Duration::from_secs(1)],
            },
        };
        let mut out = TokenBuffer::new();
        let err = provider.serialize_value(&bad, &mut out).unwrap_err();
        assert!(err.to_string().contains("value.inner.times[0]"));
    }
}
