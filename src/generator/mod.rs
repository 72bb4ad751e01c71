//! The token sink consumed by every serializer.
//!
//! The core is format-agnostic: serializers emit structured events
//! (object/array boundaries, field names, leaf values) into a [`Generator`]
//! and never see the wire representation. JSON is the expected default but
//! not assumed anywhere in this crate.

// -----------------------------------------------------------------------------
// Modules

mod token;

#[cfg(feature = "json")]
mod json;

// -----------------------------------------------------------------------------
// Exports

pub use token::{Token, TokenBuffer};

#[cfg(feature = "json")]
pub use json::JsonValueGenerator;

use std::io;

// -----------------------------------------------------------------------------
// Generator

/// A push-style token sink.
///
/// Implementations translate the event stream into a concrete format
/// (text, bytes, an in-memory tree). All methods report failures as
/// [`io::Error`]; the serialization layer passes those through unwrapped
/// since they are transport problems, not mapping problems.
///
/// Call ordering contract: a field name must be followed by exactly one
/// value (which may itself be a nested object or array); objects and arrays
/// must be closed in the order they were opened. Implementations may return
/// `InvalidData` on misuse but are not required to validate.
pub trait Generator {
    fn write_start_object(&mut self) -> io::Result<()>;
    fn write_end_object(&mut self) -> io::Result<()>;

    /// Writes the name of the next object field.
    fn write_field_name(&mut self, name: &str) -> io::Result<()>;

    fn write_start_array(&mut self) -> io::Result<()>;
    fn write_end_array(&mut self) -> io::Result<()>;

    fn write_null(&mut self) -> io::Result<()>;
    fn write_bool(&mut self, value: bool) -> io::Result<()>;
    fn write_i64(&mut self, value: i64) -> io::Result<()>;
    fn write_u64(&mut self, value: u64) -> io::Result<()>;
    fn write_f64(&mut self, value: f64) -> io::Result<()>;
    fn write_str(&mut self, value: &str) -> io::Result<()>;
}
