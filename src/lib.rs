//! Type-erased value serialization with a pluggable token sink.
//!
//! The crate splits serialization into three layers:
//!
//! - [`desc`] holds static type metadata: bean property definitions with
//!   bound accessors, container shapes, and per-type overrides, all
//!   registered up front in a [`DescriptionRegistry`](desc::DescriptionRegistry).
//! - [`ser`] turns that metadata into immutable, shareable
//!   [`ValueSerializer`](ser::ValueSerializer)s through a factory and a
//!   two-tier cache, and runs them.
//! - [`provider`] is the front door: a cloneable
//!   [`SerializerProvider`](provider::SerializerProvider) owning the shared
//!   state, with per-call contexts carrying depth and object-id tracking.
//!
//! Output goes through the [`generator::Generator`] token sink, so the
//! same serializers drive any wire format; a [`serde_json::Value`] backend
//! ships behind the default `json` feature.
//!
//! # Examples
//!
//! ```
//! use tokenbind::desc::{Accessor, BeanDescription, DescriptionRegistry, PropertyDefinition};
//! use tokenbind::generator::JsonValueGenerator;
//! use tokenbind::provider::SerializerProvider;
//!
//! struct Point { x: i32, y: i32 }
//!
//! let mut registry = DescriptionRegistry::new();
//! registry.register_bean::<Point>(
//!     BeanDescription::new("Point")
//!         .with_property(
//!             PropertyDefinition::new("x", Accessor::field(|p: &Point| &p.x))
//!                 .with_type::<i32>(),
//!         )
//!         .with_property(
//!             PropertyDefinition::new("y", Accessor::field(|p: &Point| &p.y))
//!                 .with_type::<i32>(),
//!         ),
//! );
//!
//! let provider = SerializerProvider::builder().registry(registry).build();
//! let mut out = JsonValueGenerator::new();
//! provider.serialize_value(&Point { x: 3, y: 4 }, &mut out).unwrap();
//! assert_eq!(out.finish().unwrap(), serde_json::json!({ "x": 3, "y": 4 }));
//! ```

pub mod desc;
pub mod error;
pub mod generator;
pub mod provider;
pub mod ser;
pub mod util;

pub use error::{PathSegment, SerError};
pub use provider::{SerializationConfig, SerializerProvider};
pub use ser::ValueSerializer;
