use std::io;

use serde_json::{Map, Number, Value};

use super::Generator;

// -----------------------------------------------------------------------------
// JsonValueGenerator

/// A [`Generator`] that assembles a [`serde_json::Value`] tree.
///
/// # Examples
///
/// ```
/// use tokenbind::generator::{Generator, JsonValueGenerator};
///
/// let mut out = JsonValueGenerator::new();
/// out.write_start_object().unwrap();
/// out.write_field_name("x").unwrap();
/// out.write_i64(3).unwrap();
/// out.write_end_object().unwrap();
///
/// assert_eq!(out.finish().unwrap(), serde_json::json!({ "x": 3 }));
/// ```
#[derive(Default, Debug)]
pub struct JsonValueGenerator {
    stack: Vec<Frame>,
    root: Option<Value>,
}

#[derive(Debug)]
enum Frame {
    Object {
        map: Map<String, Value>,
        pending_name: Option<String>,
    },
    Array(Vec<Value>),
}

fn misuse(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_owned())
}

impl JsonValueGenerator {
    /// Creates an empty generator.
    #[inline]
    pub const fn new() -> Self {
        Self {
            stack: Vec::new(),
            root: None,
        }
    }

    /// Consumes the generator and returns the assembled tree.
    ///
    /// Fails if the event stream was incomplete (unclosed object/array)
    /// or no value was ever written.
    pub fn finish(self) -> io::Result<Value> {
        if !self.stack.is_empty() {
            return Err(misuse("token stream ended inside an open object or array"));
        }
        self.root
            .ok_or_else(|| misuse("token stream produced no value"))
    }

    fn push_value(&mut self, value: Value) -> io::Result<()> {
        match self.stack.last_mut() {
            Some(Frame::Object { map, pending_name }) => match pending_name.take() {
                Some(name) => {
                    map.insert(name, value);
                    Ok(())
                }
                None => Err(misuse("object value written without a field name")),
            },
            Some(Frame::Array(items)) => {
                items.push(value);
                Ok(())
            }
            None => {
                if self.root.is_some() {
                    return Err(misuse("more than one root value written"));
                }
                self.root = Some(value);
                Ok(())
            }
        }
    }
}

impl Generator for JsonValueGenerator {
    fn write_start_object(&mut self) -> io::Result<()> {
        self.stack.push(Frame::Object {
            map: Map::new(),
            pending_name: None,
        });
        Ok(())
    }

    fn write_end_object(&mut self) -> io::Result<()> {
        match self.stack.pop() {
            Some(Frame::Object { map, pending_name }) => {
                if pending_name.is_some() {
                    return Err(misuse("object closed with a dangling field name"));
                }
                self.push_value(Value::Object(map))
            }
            _ => Err(misuse("end-object without matching start-object")),
        }
    }

    fn write_field_name(&mut self, name: &str) -> io::Result<()> {
        match self.stack.last_mut() {
            Some(Frame::Object { pending_name, .. }) if pending_name.is_none() => {
                *pending_name = Some(name.to_owned());
                Ok(())
            }
            _ => Err(misuse("field name written outside an object")),
        }
    }

    fn write_start_array(&mut self) -> io::Result<()> {
        self.stack.push(Frame::Array(Vec::new()));
        Ok(())
    }

    fn write_end_array(&mut self) -> io::Result<()> {
        match self.stack.pop() {
            Some(Frame::Array(items)) => self.push_value(Value::Array(items)),
            _ => Err(misuse("end-array without matching start-array")),
        }
    }

    fn write_null(&mut self) -> io::Result<()> {
        self.push_value(Value::Null)
    }

    fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.push_value(Value::Bool(value))
    }

    fn write_i64(&mut self, value: i64) -> io::Result<()> {
        self.push_value(Value::Number(Number::from(value)))
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.push_value(Value::Number(Number::from(value)))
    }

    fn write_f64(&mut self, value: f64) -> io::Result<()> {
        match Number::from_f64(value) {
            Some(number) => self.push_value(Value::Number(number)),
            None => Err(misuse("non-finite float cannot be represented as JSON")),
        }
    }

    fn write_str(&mut self, value: &str) -> io::Result<()> {
        self.push_value(Value::String(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_structures() {
        let mut out = JsonValueGenerator::new();
        out.write_start_object().unwrap();
        out.write_field_name("tags").unwrap();
        out.write_start_array().unwrap();
        out.write_str("a").unwrap();
        out.write_str("b").unwrap();
        out.write_end_array().unwrap();
        out.write_field_name("inner").unwrap();
        out.write_start_object().unwrap();
        out.write_field_name("ok").unwrap();
        out.write_bool(true).unwrap();
        out.write_end_object().unwrap();
        out.write_end_object().unwrap();

        assert_eq!(
            out.finish().unwrap(),
            json!({ "tags": ["a", "b"], "inner": { "ok": true } }),
        );
    }

    #[test]
    fn value_without_name_is_rejected() {
        let mut out = JsonValueGenerator::new();
        out.write_start_object().unwrap();
        let err = out.write_i64(1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unterminated_stream_is_rejected() {
        let mut out = JsonValueGenerator::new();
        out.write_start_array().unwrap();
        assert!(out.finish().is_err());
    }
}
