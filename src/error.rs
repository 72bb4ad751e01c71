use core::{error, fmt};
use std::io;

// -----------------------------------------------------------------------------
// PathSegment

/// One step of the property path leading to a failed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// A named object field.
    Field(String),
    /// A positional element inside a sequence or as-array bean.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[PathSegment]) -> fmt::Result {
    if path.is_empty() {
        return Ok(());
    }
    f.write_str(" (at value")?;
    for segment in path {
        fmt::Display::fmt(segment, f)?;
    }
    f.write_str(")")
}

// -----------------------------------------------------------------------------
// SerError

/// An enumeration of all error outcomes that might happen while resolving
/// or running a serializer.
///
/// The taxonomy separates "your model is wrong" ([`Definition`]) from
/// "your data is wrong" ([`Value`]). Token-sink I/O failures are carried
/// unwrapped in [`Io`] so they are never disguised as mapping problems.
///
/// [`Definition`]: SerError::Definition
/// [`Value`]: SerError::Value
/// [`Io`]: SerError::Io
#[derive(Debug)]
pub enum SerError {
    /// A serializer could not be constructed from the registered type
    /// description. Raised at resolution time, non-retryable.
    Definition {
        /// The logical name of the offending type, when known.
        type_name: String,
        message: String,
    },
    /// A value could not be written. Scoped to the single serialize call
    /// that triggered it; the cached serializer stays valid.
    Value {
        message: String,
        /// Property path from the root value to the failure, outermost first.
        path: Vec<PathSegment>,
    },
    /// The graph exceeded the configured nesting limit. Deep or cyclic
    /// graphs without object-id protection end up here instead of
    /// exhausting the call stack.
    NestingLimit {
        limit: usize,
        path: Vec<PathSegment>,
    },
    /// An I/O failure reported by the token sink, passed through untouched.
    Io(io::Error),
}

impl SerError {
    /// Creates a [`SerError::Definition`] error.
    pub fn definition(type_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Definition {
            type_name: type_name.into(),
            message: message.to_string(),
        }
    }

    /// Creates a [`SerError::Value`] error with an empty path.
    pub fn value(message: impl fmt::Display) -> Self {
        Self::Value {
            message: message.to_string(),
            path: Vec::new(),
        }
    }

    /// Prepends a field name to the property path.
    ///
    /// Used at the property-write boundary so errors bubbling out of nested
    /// serializers reconstruct the full path. I/O errors pass unchanged.
    #[must_use]
    pub fn with_field(self, name: &str) -> Self {
        self.prepend(PathSegment::Field(name.to_owned()))
    }

    /// Prepends a positional index to the property path.
    #[must_use]
    pub fn with_index(self, index: usize) -> Self {
        self.prepend(PathSegment::Index(index))
    }

    fn prepend(mut self, segment: PathSegment) -> Self {
        match &mut self {
            Self::Value { path, .. } | Self::NestingLimit { path, .. } => {
                path.insert(0, segment);
            }
            Self::Definition { .. } | Self::Io(_) => {}
        }
        self
    }

    /// The property path carried by this error, if any.
    pub fn path(&self) -> &[PathSegment] {
        match self {
            Self::Value { path, .. } | Self::NestingLimit { path, .. } => path,
            Self::Definition { .. } | Self::Io(_) => &[],
        }
    }
}

impl fmt::Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition { type_name, message } => {
                if type_name.is_empty() {
                    write!(f, "invalid type definition: {message}")
                } else {
                    write!(f, "invalid definition for type `{type_name}`: {message}")
                }
            }
            Self::Value { message, path } => {
                write!(f, "{message}")?;
                write_path(f, path)
            }
            Self::NestingLimit { limit, path } => {
                write!(f, "maximum nesting depth ({limit}) exceeded")?;
                write_path(f, path)
            }
            Self::Io(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl error::Error for SerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SerError {
    #[inline]
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prepends_outermost_first() {
        let err = SerError::value("boom")
            .with_index(2)
            .with_field("items")
            .with_field("root");
        assert_eq!(err.to_string(), "boom (at value.root.items[2])");
    }

    #[test]
    fn io_errors_are_not_annotated() {
        let err = SerError::from(io::Error::other("sink closed")).with_field("x");
        assert!(matches!(err, SerError::Io(_)));
        assert!(err.path().is_empty());
    }
}
