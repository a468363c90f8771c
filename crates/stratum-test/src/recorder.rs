//! Ordered phase log.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A shared, ordered log of labels.
///
/// Clones share the same log, so one recorder can be handed to every
/// scripted unit and the handler of a pipeline. Labels follow the
/// `"{unit}.{phase}"` convention, with `"handler"` for the base handler.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a label.
    pub fn record(&self, label: impl Into<String>) {
        self.entries.lock().push(label.into());
    }

    /// Returns a snapshot of all labels in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the number of labels recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns `true` if `label` was recorded at least once.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.entries.lock().iter().any(|entry| entry == label)
    }

    /// Returns how many times `label` was recorded.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.entries.lock().iter().filter(|entry| *entry == label).count()
    }

    /// Returns the index of the first occurrence of `label`.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries.lock().iter().position(|entry| entry == label)
    }

    /// Asserts that the log is exactly `expected`.
    ///
    /// # Panics
    ///
    /// Panics with both sequences if they differ.
    #[track_caller]
    pub fn assert_order(&self, expected: &[&str]) {
        let actual = self.entries();
        assert_eq!(
            actual, expected,
            "recorded phases differ\n  actual:   {actual:?}\n  expected: {expected:?}"
        );
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.lock().iter()).finish()
    }
}
