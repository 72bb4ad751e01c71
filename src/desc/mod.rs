//! Static type descriptions.
//!
//! Everything the serializer factory knows about a type is registered here
//! up front: bean properties with bound accessors, container shapes with
//! erased iteration adapters, and the per-type escape hatches (explicit
//! serializers, refinements, converters). Nothing in this module writes
//! output; it is pure metadata consumed at serializer-construction time.

// -----------------------------------------------------------------------------
// Modules

mod accessor;
mod bean;
mod registry;
mod shape;

// -----------------------------------------------------------------------------
// Exports

pub use accessor::{AccessError, Accessor};
pub use bean::{
    AnyGetterDefinition, BeanDescription, ErasedValue, FormatShape, Inclusion, ObjectIdInfo,
    ObjectIdKeyFn, ObjectIdKind, PropertyDefinition, PropertyFormat, SuppressPredicate,
};
pub use registry::{Converter, DescriptionRegistry, TypeDescription};
pub use shape::{MapShape, OptionalShape, ReferenceShape, SequenceShape, TypeShape};
