//! Capturing callback outcomes.

use parking_lot::Mutex;
use std::sync::Arc;
use stratum_core::{Callback, CompletionBridge, HandlerResult};

/// A [`Callback`] whose delivered outcome can be inspected.
///
/// Only the first completion reaches the probe; later attempts are
/// suppressed by the underlying [`CompletionBridge`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stratum_test::CallbackProbe;
///
/// let probe = CallbackProbe::new();
/// probe.callback().succeed(json!(1)).unwrap();
/// assert!(probe.callback().succeed(json!(2)).is_err());
///
/// assert_eq!(probe.delivered(), 1);
/// assert_eq!(probe.take().unwrap().unwrap(), json!(1));
/// ```
#[derive(Debug)]
pub struct CallbackProbe {
    callback: Callback<HandlerResult>,
    outcomes: Arc<Mutex<Vec<HandlerResult>>>,
}

impl CallbackProbe {
    /// Creates a probe with a fresh callback.
    #[must_use]
    pub fn new() -> Self {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let bridge = CompletionBridge::new(move |outcome| sink.lock().push(outcome));
        Self {
            callback: Callback::new(bridge),
            outcomes,
        }
    }

    /// Returns a handle to the callback.
    #[must_use]
    pub fn callback(&self) -> Callback<HandlerResult> {
        self.callback.clone()
    }

    /// Returns how many outcomes reached the sink.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes.lock().len()
    }

    /// Removes and returns the delivered outcome.
    #[must_use]
    pub fn take(&self) -> Option<HandlerResult> {
        self.outcomes.lock().pop()
    }
}

impl Default for CallbackProbe {
    fn default() -> Self {
        Self::new()
    }
}
