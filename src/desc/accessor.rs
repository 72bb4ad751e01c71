use core::any::{Any, type_name};
use core::{error, fmt};

use std::sync::Arc;

// -----------------------------------------------------------------------------
// AccessError

/// An error produced by a property accessor.
#[derive(Debug)]
pub enum AccessError {
    /// The accessor was handed a containing value of the wrong runtime type.
    MismatchedOwner { expected: &'static str },
    /// The accessor itself reported a failure.
    Failed { message: String },
}

impl AccessError {
    /// Creates a [`AccessError::Failed`] error.
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MismatchedOwner { expected } => {
                write!(f, "accessor expected an owner of type `{expected}`")
            }
            Self::Failed { message } => write!(f, "accessor failed: {message}"),
        }
    }
}

impl error::Error for AccessError {}

// -----------------------------------------------------------------------------
// Accessor

type AccessFn =
    dyn for<'a> Fn(&'a dyn Any) -> Result<Option<&'a dyn Any>, AccessError> + Send + Sync;

// Pins the closure's higher-ranked signature, which inference alone does
// not always land on.
fn erase_access<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any) -> Result<Option<&'a dyn Any>, AccessError> + Send + Sync + 'static,
{
    f
}

/// A bound, type-erased property accessor.
///
/// Accessors are built once, at description time, from typed functions;
/// nothing is re-resolved by name per call. `Ok(None)` models an absent
/// value (for example `Option::None`), which the property layer either
/// omits or hands to a configured null serializer.
///
/// # Examples
///
/// ```
/// use tokenbind::desc::Accessor;
///
/// struct Point { x: i32 }
///
/// let accessor = Accessor::field(|p: &Point| &p.x);
/// let point = Point { x: 3 };
///
/// let value = accessor.get(&point).unwrap().unwrap();
/// assert_eq!(value.downcast_ref::<i32>(), Some(&3));
/// ```
#[derive(Clone)]
pub struct Accessor {
    fun: Arc<AccessFn>,
}

impl Accessor {
    /// Creates an accessor for a plain field.
    pub fn field<B: Any, V: Any>(get: fn(&B) -> &V) -> Self {
        Self {
            fun: Arc::new(erase_access(move |owner| match owner.downcast_ref::<B>() {
                Some(owner) => Ok(Some(get(owner) as &dyn Any)),
                None => Err(AccessError::MismatchedOwner {
                    expected: type_name::<B>(),
                }),
            })),
        }
    }

    /// Creates an accessor for an optional field; `None` models absence.
    pub fn optional<B: Any, V: Any>(get: fn(&B) -> Option<&V>) -> Self {
        Self {
            fun: Arc::new(erase_access(move |owner| match owner.downcast_ref::<B>() {
                Some(owner) => Ok(get(owner).map(|value| value as &dyn Any)),
                None => Err(AccessError::MismatchedOwner {
                    expected: type_name::<B>(),
                }),
            })),
        }
    }

    /// Creates an accessor from an arbitrary erased function.
    pub fn with(
        fun: impl for<'a> Fn(&'a dyn Any) -> Result<Option<&'a dyn Any>, AccessError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self { fun: Arc::new(fun) }
    }

    /// Fetches the property value out of `owner`.
    #[inline]
    pub fn get<'a>(&self, owner: &'a dyn Any) -> Result<Option<&'a dyn Any>, AccessError> {
        (self.fun)(owner)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Accessor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Holder {
        label: Option<String>,
    }

    #[test]
    fn optional_accessor_models_absence() {
        let accessor = Accessor::optional(|h: &Holder| h.label.as_ref());

        let some = Holder {
            label: Some("a".into()),
        };
        let none = Holder { label: None };

        assert!(accessor.get(&some).unwrap().is_some());
        assert!(accessor.get(&none).unwrap().is_none());
    }

    #[test]
    fn mismatched_owner_is_reported() {
        let accessor = Accessor::field(|h: &Holder| &h.label);
        let err = accessor.get(&3_i32).unwrap_err();
        assert!(matches!(err, AccessError::MismatchedOwner { .. }));
    }
}
