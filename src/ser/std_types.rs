//! Serializers for standard library types.
//!
//! These cover the leaves every model bottoms out in. The table is frozen
//! into a static map on first use; per-type overrides registered in the
//! description registry take precedence in the factory, so the table is
//! only the final shape-free fallback before the bean step.

use core::any::{Any, TypeId, type_name};
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::desc::PropertyDefinition;
use crate::error::SerError;
use crate::generator::Generator;
use crate::provider::{ResolveCx, SerializeCx};
use crate::util::TypeIdMap;

use super::ValueSerializer;

fn downcast<'a, T: Any>(value: &'a dyn Any) -> Result<&'a T, SerError> {
    value.downcast_ref::<T>().ok_or_else(|| {
        SerError::value(format!(
            "serializer for `{}` received a value of a different runtime type",
            type_name::<T>(),
        ))
    })
}

// -----------------------------------------------------------------------------
// Numbers, bool, char

macro_rules! scalar_serializer {
    ($name:ident, $ty:ty, |$value:ident, $out:ident| $write:expr) => {
        #[derive(Debug)]
        struct $name;

        impl ValueSerializer for $name {
            fn serialize(
                &self,
                value: &dyn Any,
                out: &mut dyn Generator,
                _cx: &mut SerializeCx<'_>,
            ) -> Result<(), SerError> {
                let $value = downcast::<$ty>(value)?;
                let $out = out;
                $write?;
                Ok(())
            }

            fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
                matches!(
                    (a.downcast_ref::<$ty>(), b.downcast_ref::<$ty>()),
                    (Some(a), Some(b)) if a == b
                )
            }
        }
    };
}

scalar_serializer!(BoolSerializer, bool, |value, out| out.write_bool(*value));
scalar_serializer!(I8Serializer, i8, |value, out| out.write_i64(i64::from(*value)));
scalar_serializer!(I16Serializer, i16, |value, out| out.write_i64(i64::from(*value)));
scalar_serializer!(I32Serializer, i32, |value, out| out.write_i64(i64::from(*value)));
scalar_serializer!(I64Serializer, i64, |value, out| out.write_i64(*value));
scalar_serializer!(IsizeSerializer, isize, |value, out| out.write_i64(*value as i64));
scalar_serializer!(U8Serializer, u8, |value, out| out.write_u64(u64::from(*value)));
scalar_serializer!(U16Serializer, u16, |value, out| out.write_u64(u64::from(*value)));
scalar_serializer!(U32Serializer, u32, |value, out| out.write_u64(u64::from(*value)));
scalar_serializer!(U64Serializer, u64, |value, out| out.write_u64(*value));
scalar_serializer!(UsizeSerializer, usize, |value, out| out.write_u64(*value as u64));
scalar_serializer!(F32Serializer, f32, |value, out| out.write_f64(f64::from(*value)));
scalar_serializer!(CharSerializer, char, |value, out| out
    .write_str(value.encode_utf8(&mut [0_u8; 4])));

/// `f64` serializer, optionally rounding to a contextual precision.
#[derive(Debug)]
struct F64Serializer {
    precision: Option<u32>,
}

impl ValueSerializer for F64Serializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        _cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let mut value = *downcast::<f64>(value)?;
        if let Some(precision) = self.precision {
            let factor = 10_f64.powi(precision as i32);
            value = (value * factor).round() / factor;
        }
        out.write_f64(value)?;
        Ok(())
    }

    fn create_contextual(
        &self,
        _cx: &mut ResolveCx<'_, '_>,
        property: Option<&PropertyDefinition>,
    ) -> Result<Option<Arc<dyn ValueSerializer>>, SerError> {
        let precision = property
            .and_then(PropertyDefinition::format)
            .and_then(|format| format.precision);
        match precision {
            Some(_) if precision != self.precision => {
                Ok(Some(Arc::new(Self { precision })))
            }
            _ => Ok(None),
        }
    }

    fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        matches!(
            (a.downcast_ref::<f64>(), b.downcast_ref::<f64>()),
            (Some(a), Some(b)) if a == b
        )
    }
}

// -----------------------------------------------------------------------------
// Strings

#[derive(Debug)]
struct StringSerializer;

impl ValueSerializer for StringSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        _cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        out.write_str(downcast::<String>(value)?)?;
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        value
            .downcast_ref::<String>()
            .is_some_and(String::is_empty)
    }

    fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        matches!(
            (a.downcast_ref::<String>(), b.downcast_ref::<String>()),
            (Some(a), Some(b)) if a == b
        )
    }
}

#[derive(Debug)]
struct StaticStrSerializer;

impl ValueSerializer for StaticStrSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        _cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        out.write_str(downcast::<&'static str>(value)?)?;
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        value
            .downcast_ref::<&'static str>()
            .is_some_and(|s| s.is_empty())
    }

    fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        matches!(
            (a.downcast_ref::<&'static str>(), b.downcast_ref::<&'static str>()),
            (Some(a), Some(b)) if a == b
        )
    }
}

// -----------------------------------------------------------------------------
// Time, paths, addresses

// Durations are written as fractional seconds, timestamps as integer
// milliseconds since the Unix epoch.

scalar_serializer!(DurationSerializer, Duration, |value, out| out
    .write_f64(value.as_secs_f64()));

#[derive(Debug)]
struct SystemTimeSerializer;

impl ValueSerializer for SystemTimeSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        _cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let time = downcast::<SystemTime>(value)?;
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| SerError::value("cannot serialize a timestamp before the Unix epoch"))?;
        out.write_u64(since_epoch.as_millis() as u64)?;
        Ok(())
    }

    fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        matches!(
            (a.downcast_ref::<SystemTime>(), b.downcast_ref::<SystemTime>()),
            (Some(a), Some(b)) if a == b
        )
    }
}

#[derive(Debug)]
struct PathSerializer;

impl ValueSerializer for PathSerializer {
    fn serialize(
        &self,
        value: &dyn Any,
        out: &mut dyn Generator,
        _cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        let path = downcast::<PathBuf>(value)?;
        out.write_str(&path.to_string_lossy())?;
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, value: &dyn Any) -> bool {
        value
            .downcast_ref::<PathBuf>()
            .is_some_and(|path| path.as_os_str().is_empty())
    }

    fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        matches!(
            (a.downcast_ref::<PathBuf>(), b.downcast_ref::<PathBuf>()),
            (Some(a), Some(b)) if a == b
        )
    }
}

macro_rules! display_serializer {
    ($name:ident, $ty:ty) => {
        #[derive(Debug)]
        struct $name;

        impl ValueSerializer for $name {
            fn serialize(
                &self,
                value: &dyn Any,
                out: &mut dyn Generator,
                _cx: &mut SerializeCx<'_>,
            ) -> Result<(), SerError> {
                out.write_str(&downcast::<$ty>(value)?.to_string())?;
                Ok(())
            }

            fn value_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
                matches!(
                    (a.downcast_ref::<$ty>(), b.downcast_ref::<$ty>()),
                    (Some(a), Some(b)) if a == b
                )
            }
        }
    };
}

display_serializer!(IpAddrSerializer, IpAddr);
display_serializer!(Ipv4AddrSerializer, Ipv4Addr);
display_serializer!(Ipv6AddrSerializer, Ipv6Addr);
display_serializer!(SocketAddrSerializer, SocketAddr);

// -----------------------------------------------------------------------------
// NullSerializer

/// Writes a null token regardless of the value.
///
/// Installed as a property's null serializer to turn absent values into
/// explicit nulls, and used for suppressed positional slots in as-array
/// beans.
#[derive(Debug, Default)]
pub struct NullSerializer;

impl NullSerializer {
    pub const fn new() -> Self {
        Self
    }
}

impl ValueSerializer for NullSerializer {
    fn serialize(
        &self,
        _value: &dyn Any,
        out: &mut dyn Generator,
        _cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        out.write_null()?;
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, _value: &dyn Any) -> bool {
        true
    }
}

// -----------------------------------------------------------------------------
// UnknownSerializer

/// The terminal fallback for types nothing else matched.
///
/// Fails with a definition error by default; with `fail_on_empty_beans`
/// disabled it degrades to an empty object so one unmapped leaf does not
/// sink an otherwise serializable graph.
#[derive(Debug)]
pub struct UnknownSerializer {
    type_name: String,
}

impl UnknownSerializer {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

impl ValueSerializer for UnknownSerializer {
    fn serialize(
        &self,
        _value: &dyn Any,
        out: &mut dyn Generator,
        cx: &mut SerializeCx<'_>,
    ) -> Result<(), SerError> {
        if cx.config().fail_on_empty_beans() {
            return Err(SerError::definition(
                &self.type_name,
                "no serializer found and no properties discovered \
                 (disable fail_on_empty_beans to serialize as an empty object)",
            ));
        }
        out.write_start_object()?;
        out.write_end_object()?;
        Ok(())
    }

    fn is_empty(&self, _cx: &SerializeCx<'_>, _value: &dyn Any) -> bool {
        true
    }
}

// -----------------------------------------------------------------------------
// The frozen table

static STD_SERIALIZERS: LazyLock<TypeIdMap<Arc<dyn ValueSerializer>>> = LazyLock::new(|| {
    let mut table = TypeIdMap::new();

    fn put<T: Any>(table: &mut TypeIdMap<Arc<dyn ValueSerializer>>, s: impl ValueSerializer + 'static) {
        table.insert_type::<T>(Arc::new(s));
    }

    put::<bool>(&mut table, BoolSerializer);
    put::<i8>(&mut table, I8Serializer);
    put::<i16>(&mut table, I16Serializer);
    put::<i32>(&mut table, I32Serializer);
    put::<i64>(&mut table, I64Serializer);
    put::<isize>(&mut table, IsizeSerializer);
    put::<u8>(&mut table, U8Serializer);
    put::<u16>(&mut table, U16Serializer);
    put::<u32>(&mut table, U32Serializer);
    put::<u64>(&mut table, U64Serializer);
    put::<usize>(&mut table, UsizeSerializer);
    put::<f32>(&mut table, F32Serializer);
    put::<f64>(&mut table, F64Serializer { precision: None });
    put::<char>(&mut table, CharSerializer);
    put::<String>(&mut table, StringSerializer);
    put::<&'static str>(&mut table, StaticStrSerializer);
    put::<Duration>(&mut table, DurationSerializer);
    put::<SystemTime>(&mut table, SystemTimeSerializer);
    put::<PathBuf>(&mut table, PathSerializer);
    put::<IpAddr>(&mut table, IpAddrSerializer);
    put::<Ipv4Addr>(&mut table, Ipv4AddrSerializer);
    put::<Ipv6Addr>(&mut table, Ipv6AddrSerializer);
    put::<SocketAddr>(&mut table, SocketAddrSerializer);

    table
});

/// Looks up the built-in serializer for a standard library type.
pub fn std_serializer(type_id: TypeId) -> Option<Arc<dyn ValueSerializer>> {
    STD_SERIALIZERS.get(&type_id).map(Arc::clone)
}

/// Renders a map key as an object field name.
///
/// Field names are always strings on the wire, so keys are stringified
/// rather than serialized: integer and textual keys map naturally, anything
/// else is a value error surfaced by the map serializer.
pub(crate) fn key_to_field_name(key: &dyn Any) -> Option<String> {
    if let Some(key) = key.downcast_ref::<String>() {
        return Some(key.clone());
    }
    if let Some(key) = key.downcast_ref::<&'static str>() {
        return Some((*key).to_owned());
    }
    if let Some(key) = key.downcast_ref::<char>() {
        return Some(key.to_string());
    }

    macro_rules! try_display {
        ($($ty:ty),+ $(,)?) => {
            $(
                if let Some(key) = key.downcast_ref::<$ty>() {
                    return Some(key.to_string());
                }
            )+
        };
    }
    try_display!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

    None
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::generator::{Token, TokenBuffer};
    use crate::provider::SerializerProvider;

    use super::*;

    fn write_std(value: &dyn Any) -> Vec<Token> {
        let provider = SerializerProvider::builder().build();
        let mut cx = provider.serialize_cx();
        let mut out = TokenBuffer::new();
        let serializer = std_serializer(value.type_id()).unwrap();
        serializer.serialize(value, &mut out, &mut cx).unwrap();
        out.into_tokens()
    }

    #[test]
    fn scalar_table_covers_primitives() {
        assert_eq!(write_std(&true), [Token::Bool(true)]);
        assert_eq!(write_std(&-7_i32), [Token::I64(-7)]);
        assert_eq!(write_std(&7_u64), [Token::U64(7)]);
        assert_eq!(write_std(&1.5_f64), [Token::F64(1.5)]);
        assert_eq!(write_std(&'x'), [Token::Str("x".into())]);
        assert_eq!(
            write_std(&"hi".to_owned()),
            [Token::Str("hi".into())]
        );
    }

    #[test]
    fn time_types_use_numeric_forms() {
        assert_eq!(
            write_std(&Duration::from_millis(1500)),
            [Token::F64(1.5)]
        );
        let time = UNIX_EPOCH + Duration::from_millis(12345);
        assert_eq!(write_std(&time), [Token::U64(12345)]);
    }

    #[test]
    fn addresses_are_strings() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(write_std(&addr), [Token::Str("127.0.0.1".into())]);
    }

    #[test]
    fn string_emptiness() {
        let provider = SerializerProvider::builder().build();
        let cx = provider.serialize_cx();
        let serializer = std_serializer(TypeId::of::<String>()).unwrap();
        assert!(serializer.is_empty(&cx, &String::new()));
        assert!(!serializer.is_empty(&cx, &"x".to_owned()));
    }

    #[test]
    fn key_rendering() {
        assert_eq!(key_to_field_name(&"k".to_owned()).as_deref(), Some("k"));
        assert_eq!(key_to_field_name(&42_u32).as_deref(), Some("42"));
        assert_eq!(key_to_field_name(&Path::new("x").to_owned()), None);
    }
}
