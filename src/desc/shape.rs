use core::any::{Any, TypeId, type_name};
use core::fmt;

use std::sync::Arc;

use super::accessor::AccessError;
use super::bean::BeanDescription;

// -----------------------------------------------------------------------------
// Erased adapter signatures

type SeqIterFn = dyn for<'a> Fn(
        &'a dyn Any,
    ) -> Result<Box<dyn Iterator<Item = &'a dyn Any> + 'a>, AccessError>
    + Send
    + Sync;

type MapIterFn = dyn for<'a> Fn(
        &'a dyn Any,
    )
        -> Result<Box<dyn Iterator<Item = (&'a dyn Any, &'a dyn Any)> + 'a>, AccessError>
    + Send
    + Sync;

type OptionProjectFn =
    dyn for<'a> Fn(&'a dyn Any) -> Result<Option<&'a dyn Any>, AccessError> + Send + Sync;

type RefProjectFn =
    dyn for<'a> Fn(&'a dyn Any) -> Result<&'a dyn Any, AccessError> + Send + Sync;

// Shape adapters are bound to a concrete container type at registration
// time; a value of any other runtime type is reported as an access error
// for the serializer layer to surface.
fn shape_mismatch<C>() -> AccessError {
    AccessError::MismatchedOwner {
        expected: type_name::<C>(),
    }
}

// -----------------------------------------------------------------------------
// SequenceShape

/// Erased element iteration for a sequence-like container.
///
/// Built once per concrete container type; the serializer layer never needs
/// to know the container's element type at compile time.
///
/// # Examples
///
/// ```
/// use tokenbind::desc::SequenceShape;
///
/// let shape = SequenceShape::of::<Vec<i32>, i32>();
/// let values = vec![1, 2, 3];
///
/// assert_eq!(shape.iter(&values).unwrap().count(), 3);
/// assert!(!shape.is_empty(&values));
/// ```
#[derive(Clone)]
pub struct SequenceShape {
    elem: TypeId,
    iter: Arc<SeqIterFn>,
}

// Lifetimes stay elided so the fn items keep them late-bound and coerce to
// the higher-ranked adapter types.
fn seq_iter_impl<C, T>(
    value: &dyn Any,
) -> Result<Box<dyn Iterator<Item = &dyn Any> + '_>, AccessError>
where
    C: Any,
    T: Any,
    for<'a> &'a C: IntoIterator<Item = &'a T>,
{
    match value.downcast_ref::<C>() {
        Some(container) => Ok(Box::new(container.into_iter().map(|item| item as &dyn Any))),
        None => Err(shape_mismatch::<C>()),
    }
}

impl SequenceShape {
    /// Creates the shape for container `C` with element type `T`.
    pub fn of<C, T>() -> Self
    where
        C: Any,
        T: Any,
        for<'a> &'a C: IntoIterator<Item = &'a T>,
    {
        Self {
            elem: TypeId::of::<T>(),
            iter: Arc::new(seq_iter_impl::<C, T>),
        }
    }

    /// The element type.
    #[inline]
    pub const fn elem_type(&self) -> TypeId {
        self.elem
    }

    /// Iterates the elements of `value` as erased references.
    #[inline]
    pub fn iter<'a>(
        &self,
        value: &'a dyn Any,
    ) -> Result<Box<dyn Iterator<Item = &'a dyn Any> + 'a>, AccessError> {
        (self.iter)(value)
    }

    /// Returns `true` if `value` has no elements.
    ///
    /// A runtime-type mismatch reports "not empty", so the write path still
    /// runs and surfaces the error.
    pub fn is_empty(&self, value: &dyn Any) -> bool {
        match (self.iter)(value) {
            Ok(mut iter) => iter.next().is_none(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for SequenceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceShape").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// MapShape

/// Erased entry iteration for a map-like container.
#[derive(Clone)]
pub struct MapShape {
    key: TypeId,
    value: TypeId,
    iter: Arc<MapIterFn>,
}

fn map_iter_impl<M, K, V>(
    value: &dyn Any,
) -> Result<Box<dyn Iterator<Item = (&dyn Any, &dyn Any)> + '_>, AccessError>
where
    M: Any,
    K: Any,
    V: Any,
    for<'a> &'a M: IntoIterator<Item = (&'a K, &'a V)>,
{
    match value.downcast_ref::<M>() {
        Some(map) => Ok(Box::new(
            map.into_iter()
                .map(|(key, val)| (key as &dyn Any, val as &dyn Any)),
        )),
        None => Err(shape_mismatch::<M>()),
    }
}

impl MapShape {
    /// Creates the shape for map `M` with key type `K` and value type `V`.
    pub fn of<M, K, V>() -> Self
    where
        M: Any,
        K: Any,
        V: Any,
        for<'a> &'a M: IntoIterator<Item = (&'a K, &'a V)>,
    {
        Self {
            key: TypeId::of::<K>(),
            value: TypeId::of::<V>(),
            iter: Arc::new(map_iter_impl::<M, K, V>),
        }
    }

    /// The key type.
    #[inline]
    pub const fn key_type(&self) -> TypeId {
        self.key
    }

    /// The value type.
    #[inline]
    pub const fn value_type(&self) -> TypeId {
        self.value
    }

    /// Iterates the entries of `value` as erased references.
    #[inline]
    pub fn iter<'a>(
        &self,
        value: &'a dyn Any,
    ) -> Result<Box<dyn Iterator<Item = (&'a dyn Any, &'a dyn Any)> + 'a>, AccessError> {
        (self.iter)(value)
    }

    /// Returns `true` if `value` has no entries.
    ///
    /// A runtime-type mismatch reports "not empty", so the write path still
    /// runs and surfaces the error.
    pub fn is_empty(&self, value: &dyn Any) -> bool {
        match (self.iter)(value) {
            Ok(mut iter) => iter.next().is_none(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for MapShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapShape").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// OptionalShape

/// Erased `Some`-projection for `Option`-like types.
#[derive(Clone)]
pub struct OptionalShape {
    inner: TypeId,
    project: Arc<OptionProjectFn>,
}

fn optional_project_impl<T: Any>(value: &dyn Any) -> Result<Option<&dyn Any>, AccessError> {
    match value.downcast_ref::<Option<T>>() {
        Some(opt) => Ok(opt.as_ref().map(|inner| inner as &dyn Any)),
        None => Err(shape_mismatch::<Option<T>>()),
    }
}

impl OptionalShape {
    /// Creates the shape for `Option<T>`.
    pub fn of<T: Any>() -> Self {
        Self {
            inner: TypeId::of::<T>(),
            project: Arc::new(optional_project_impl::<T>),
        }
    }

    /// The contained type.
    #[inline]
    pub const fn inner_type(&self) -> TypeId {
        self.inner
    }

    /// Projects the contained value; `Ok(None)` means absent.
    #[inline]
    pub fn project<'a>(&self, value: &'a dyn Any) -> Result<Option<&'a dyn Any>, AccessError> {
        (self.project)(value)
    }
}

impl fmt::Debug for OptionalShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalShape").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ReferenceShape

/// Erased dereference for smart-pointer-like wrappers (`Box`, `Arc`, `Rc`).
///
/// When the pointee type is statically known, `inner` carries it and the
/// wrapped serializer resolves once. A trait-object pointee reports
/// `inner = None`, in which case the element serializer is looked up per
/// runtime type at write time.
#[derive(Clone)]
pub struct ReferenceShape {
    inner: Option<TypeId>,
    project: Arc<RefProjectFn>,
}

fn ref_project_impl<'a, C: Any>(
    value: &'a dyn Any,
    project: fn(&C) -> &dyn Any,
) -> Result<&'a dyn Any, AccessError> {
    match value.downcast_ref::<C>() {
        Some(wrapper) => Ok(project(wrapper)),
        None => Err(shape_mismatch::<C>()),
    }
}

// Pins the closure's higher-ranked signature, which inference alone does
// not always land on.
fn erase_ref_project<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any) -> Result<&'a dyn Any, AccessError> + Send + Sync + 'static,
{
    f
}

impl ReferenceShape {
    /// Creates the shape for `Box<T>` with a statically known pointee.
    pub fn boxed<T: Any>() -> Self {
        Self::project_with::<Box<T>>(Some(TypeId::of::<T>()), |boxed| &**boxed as &dyn Any)
    }

    /// Creates the shape for `std::sync::Arc<T>`.
    pub fn arc<T: Any>() -> Self {
        Self::project_with::<Arc<T>>(Some(TypeId::of::<T>()), |arc| &**arc as &dyn Any)
    }

    /// Creates the shape for `std::rc::Rc<T>`.
    pub fn rc<T: Any>() -> Self {
        Self::project_with::<std::rc::Rc<T>>(Some(TypeId::of::<T>()), |rc| &**rc as &dyn Any)
    }

    /// Creates a shape from a caller-supplied projection.
    ///
    /// Pass `inner = None` when the pointee type is only known at runtime
    /// (a trait-object wrapper whose projection typically calls a
    /// caller-defined `as_any` method).
    pub fn project_with<C: Any>(inner: Option<TypeId>, project: fn(&C) -> &dyn Any) -> Self {
        Self {
            inner,
            project: Arc::new(erase_ref_project(move |value| {
                ref_project_impl::<C>(value, project)
            })),
        }
    }

    /// The statically known pointee type, if any.
    #[inline]
    pub const fn inner_type(&self) -> Option<TypeId> {
        self.inner
    }

    /// Projects through the wrapper.
    #[inline]
    pub fn project<'a>(&self, value: &'a dyn Any) -> Result<&'a dyn Any, AccessError> {
        (self.project)(value)
    }
}

impl fmt::Debug for ReferenceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceShape").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// TypeShape

/// The structural classification of a described type.
///
/// The serializer factory dispatches on this shape after the explicit
/// serializer, refinement and converter escape hatches have had their turn.
#[derive(Clone, Debug)]
pub enum TypeShape {
    /// A leaf value; covered by the built-in scalar table or an explicit
    /// serializer on the description.
    Scalar,
    /// A sequence-like container.
    Sequence(SequenceShape),
    /// A map-like container.
    Map(MapShape),
    /// An `Option`-like wrapper.
    Optional(OptionalShape),
    /// A smart-pointer-like wrapper.
    Reference(ReferenceShape),
    /// A bean with discoverable properties.
    Bean(BeanDescription),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn sequence_shape_iterates_erased() {
        let shape = SequenceShape::of::<Vec<String>, String>();
        let values = vec!["a".to_owned(), "b".to_owned()];

        let collected: Vec<&String> = shape
            .iter(&values)
            .unwrap()
            .map(|item| item.downcast_ref::<String>().unwrap())
            .collect();
        assert_eq!(collected, [&"a".to_owned(), &"b".to_owned()]);
        assert_eq!(shape.elem_type(), TypeId::of::<String>());
    }

    #[test]
    fn map_shape_iterates_entries() {
        let shape = MapShape::of::<BTreeMap<String, i32>, String, i32>();
        let mut map = BTreeMap::new();
        map.insert("k".to_owned(), 5);

        let (key, value) = shape.iter(&map).unwrap().next().unwrap();
        assert_eq!(key.downcast_ref::<String>().unwrap(), "k");
        assert_eq!(value.downcast_ref::<i32>(), Some(&5));
    }

    #[test]
    fn optional_shape_projects() {
        let shape = OptionalShape::of::<u8>();
        let some: Option<u8> = Some(9);
        let none: Option<u8> = None;

        assert!(shape.project(&some).unwrap().is_some());
        assert!(shape.project(&none).unwrap().is_none());
    }

    #[test]
    fn reference_shape_derefs_box() {
        let shape = ReferenceShape::boxed::<u16>();
        let boxed = Box::new(11_u16);

        let inner = shape.project(&boxed).unwrap();
        assert_eq!(inner.downcast_ref::<u16>(), Some(&11));
    }

    #[test]
    fn runtime_type_mismatch_is_an_error() {
        let seq = SequenceShape::of::<Vec<i32>, i32>();
        assert!(matches!(
            seq.iter(&7_u8).err().unwrap(),
            AccessError::MismatchedOwner { .. }
        ));
        assert!(!seq.is_empty(&7_u8));

        let map = MapShape::of::<BTreeMap<String, i32>, String, i32>();
        assert!(map.iter(&7_u8).is_err());

        let opt = OptionalShape::of::<i32>();
        assert!(opt.project(&7_u8).is_err());

        let reference = ReferenceShape::boxed::<i32>();
        assert!(reference.project(&7_u8).is_err());
    }
}
