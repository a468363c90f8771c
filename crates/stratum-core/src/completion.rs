//! Exactly-once outcome delivery.
//!
//! A [`CompletionBridge`] guards a single completion sink. The first outcome
//! handed to it is delivered; every later attempt is suppressed, logged and
//! counted, but never panics. The pipeline uses it to answer a caller's
//! completion callback, and the callback-style adapters use it to turn a
//! "call me when done" function into an awaitable result.
//!
//! # Example
//!
//! ```
//! use stratum_core::{CompletionBridge, CompletionError};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let bridge = CompletionBridge::new(move |value: u32| sink.lock().unwrap().push(value));
//!
//! assert!(bridge.complete(1).is_ok());
//! assert_eq!(
//!     bridge.complete(2),
//!     Err(CompletionError::AlreadyCompleted { attempts: 2 })
//! );
//! assert_eq!(*seen.lock().unwrap(), vec![1]);
//! assert_eq!(bridge.suppressed(), 1);
//! ```

use crate::error::{CompletionError, HandlerError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

type Sink<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Delivers an outcome to a sink at most once.
pub struct CompletionBridge<T> {
    sink: Mutex<Option<Sink<T>>>,
    attempts: AtomicUsize,
}

impl<T> CompletionBridge<T> {
    /// Creates a bridge around the given sink.
    pub fn new<F>(sink: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            sink: Mutex::new(Some(Box::new(sink))),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Delivers `outcome` if nothing has been delivered yet.
    ///
    /// Later calls drop their outcome and return
    /// [`CompletionError::AlreadyCompleted`].
    pub fn complete(&self, outcome: T) -> Result<(), CompletionError> {
        let attempts = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        // Take the sink out before calling it so the lock is not held while
        // user code runs.
        let sink = self.sink.lock().take();
        match sink {
            Some(sink) => {
                sink(outcome);
                Ok(())
            }
            None => {
                tracing::warn!(attempts, "completion signalled more than once; ignoring");
                Err(CompletionError::AlreadyCompleted { attempts })
            }
        }
    }

    /// Returns `true` once an outcome has been delivered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.sink.lock().is_none()
    }

    /// Returns how many completion attempts were suppressed.
    #[must_use]
    pub fn suppressed(&self) -> usize {
        self.attempts.load(Ordering::SeqCst).saturating_sub(1)
    }
}

impl<T: Send + 'static> CompletionBridge<T> {
    /// Creates a bridge whose sink feeds a oneshot channel.
    ///
    /// The receiver resolves with the first delivered outcome, or with a
    /// `RecvError` if the bridge is dropped without completing.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let bridge = Self::new(move |outcome| {
            // The receiver may already be gone if the awaiting side gave up.
            let _ = tx.send(outcome);
        });
        (bridge, rx)
    }
}

impl<T> fmt::Debug for CompletionBridge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBridge")
            .field("completed", &self.is_completed())
            .field("attempts", &self.attempts.load(Ordering::SeqCst))
            .finish()
    }
}

/// A cloneable completion handle given to callback-style handlers and phases.
///
/// All clones share one [`CompletionBridge`], so only the first signal from
/// any of them is delivered.
pub struct Callback<T> {
    bridge: Arc<CompletionBridge<T>>,
}

impl<T> Callback<T> {
    /// Wraps a bridge in a callback handle.
    #[must_use]
    pub fn new(bridge: CompletionBridge<T>) -> Self {
        Self {
            bridge: Arc::new(bridge),
        }
    }

    /// Signals the outcome.
    pub fn complete(&self, outcome: T) -> Result<(), CompletionError> {
        self.bridge.complete(outcome)
    }

    /// Returns `true` once an outcome has been delivered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.bridge.is_completed()
    }
}

impl<V> Callback<Result<V, HandlerError>> {
    /// Signals success.
    pub fn succeed(&self, value: V) -> Result<(), CompletionError> {
        self.complete(Ok(value))
    }

    /// Signals failure.
    pub fn fail(&self, error: HandlerError) -> Result<(), CompletionError> {
        self.complete(Err(error))
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.bridge).finish()
    }
}

/// Awaits the outcome of a callback-style function.
///
/// A dropped callback (no handle ever signalled) becomes an internal error.
pub async fn await_callback<V>(
    receiver: oneshot::Receiver<Result<V, HandlerError>>,
) -> Result<V, HandlerError> {
    receiver.await.unwrap_or_else(|_| {
        Err(HandlerError::internal(
            "completion callback dropped without being called",
        ))
    })
}
