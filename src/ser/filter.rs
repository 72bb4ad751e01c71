//! Dynamic property filtering.
//!
//! A bean description may carry a filter id; the matching filter is looked
//! up through the provider at write time, so the same cached serializer can
//! emit different property subsets per call configuration.

use core::any::Any;
use core::fmt;

use crate::util::HashSet;

// -----------------------------------------------------------------------------
// PropertyFilter

/// A per-call veto over individual bean properties.
pub trait PropertyFilter: Send + Sync + fmt::Debug {
    /// Whether the named property of `bean` should be written.
    fn include(&self, property_name: &str, bean: &dyn Any) -> bool;
}

// -----------------------------------------------------------------------------
// SimplePropertyFilter

/// A name-set filter, in allow-list or deny-list form.
///
/// # Examples
///
/// ```
/// use tokenbind::ser::{PropertyFilter, SimplePropertyFilter};
///
/// let filter = SimplePropertyFilter::include_only(["id", "name"]);
/// assert!(filter.include("id", &()));
/// assert!(!filter.include("secret", &()));
/// ```
#[derive(Clone, Debug)]
pub struct SimplePropertyFilter {
    names: HashSet<String>,
    include_listed: bool,
}

impl SimplePropertyFilter {
    /// Writes only the listed properties.
    pub fn include_only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            include_listed: true,
        }
    }

    /// Writes everything except the listed properties.
    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            include_listed: false,
        }
    }
}

impl PropertyFilter for SimplePropertyFilter {
    fn include(&self, property_name: &str, _bean: &dyn Any) -> bool {
        self.names.contains(property_name) == self.include_listed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_inverts_allow_list() {
        let filter = SimplePropertyFilter::exclude(["secret"]);
        assert!(filter.include("id", &()));
        assert!(!filter.include("secret", &()));
    }
}
