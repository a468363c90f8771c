//! The ordered list of middleware units owned by a pipeline.

use crate::middleware::Middleware;
use std::fmt;
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Middleware units in registration order.
///
/// The executor walks this list forward for `before` and backward for
/// `after` and `on_error`. Cloning is cheap: only the `Arc`s are copied.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    units: Vec<BoxedMiddleware>,
}

impl MiddlewareStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit.
    pub fn push(&mut self, unit: BoxedMiddleware) {
        self.units.push(unit);
    }

    /// Returns the number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns the unit at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BoxedMiddleware> {
        self.units.get(index)
    }

    /// Iterates the units in registration order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BoxedMiddleware> + ExactSizeIterator {
        self.units.iter()
    }

    /// Returns the units as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[BoxedMiddleware] {
        &self.units
    }

    /// Returns the unit names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|unit| unit.name()).collect()
    }
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Extend<BoxedMiddleware> for MiddlewareStack {
    fn extend<I: IntoIterator<Item = BoxedMiddleware>>(&mut self, iter: I) {
        self.units.extend(iter);
    }
}

impl FromIterator<BoxedMiddleware> for MiddlewareStack {
    fn from_iter<I: IntoIterator<Item = BoxedMiddleware>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}
