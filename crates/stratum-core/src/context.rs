//! Invocation context types.
//!
//! The [`HandlerContext`] carries all per-invocation state through the
//! middleware phases and into the base handler. It is created fresh for every
//! invocation and owned exclusively by it, so phases communicate only by
//! mutating it.

use crate::error::HandlerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each invocation, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for log correlation.
///
/// # Example
///
/// ```
/// use stratum_core::InvocationId;
///
/// let id = InvocationId::new();
/// println!("Invocation ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Creates a new unique invocation ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an `InvocationId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InvocationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Platform metadata that accompanies an event.
///
/// This is the analogue of the runtime "context" object a serverless platform
/// hands to a function. The pipeline treats it as opaque and only passes it
/// through; units and handlers read whatever they need from it.
///
/// # Example
///
/// ```
/// use stratum_core::InvocationMetadata;
/// use std::time::Duration;
///
/// let metadata = InvocationMetadata::new("orders-api")
///     .with_request_id("c6af9ac6-7b61-11e6-9a41-93e8deadbeef")
///     .with_timeout(Duration::from_secs(3));
///
/// assert_eq!(metadata.function_name, "orders-api");
/// assert!(metadata.remaining_time().is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationMetadata {
    /// Name of the function being invoked.
    pub function_name: String,

    /// Deployed version of the function.
    #[serde(default)]
    pub function_version: Option<String>,

    /// Request ID assigned by the platform.
    #[serde(default)]
    pub aws_request_id: Option<String>,

    /// Configured memory limit, in megabytes.
    #[serde(default)]
    pub memory_limit_mb: Option<u32>,

    /// Point in time at which the platform will abort the invocation.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,

    /// Any other platform fields.
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

impl InvocationMetadata {
    /// Creates metadata for the given function name.
    #[must_use]
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            ..Self::default()
        }
    }

    /// Sets the platform request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.aws_request_id = Some(request_id.into());
        self
    }

    /// Sets the function version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.function_version = Some(version.into());
        self
    }

    /// Sets the memory limit.
    #[must_use]
    pub fn with_memory_limit(mut self, megabytes: u32) -> Self {
        self.memory_limit_mb = Some(megabytes);
        self
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let deadline = Utc::now()
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.with_deadline(deadline)
    }

    /// Adds an extra platform field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Returns the time left before the deadline.
    ///
    /// Returns `None` when no deadline is known, and `Some(Duration::ZERO)`
    /// once the deadline has passed.
    #[must_use]
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline.map(|deadline| {
            (deadline - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }
}

/// Per-invocation state shared by every phase and the base handler.
///
/// At completion, an error (if present) is authoritative. A response produced
/// before the failure is kept so that error-handling units can inspect it.
///
/// # Example
///
/// ```
/// use stratum_core::{HandlerContext, HandlerError, InvocationMetadata};
/// use serde_json::json;
///
/// let mut ctx = HandlerContext::new(json!({"path": "/"}), InvocationMetadata::new("fn"));
/// ctx.set_error(HandlerError::not_found("no route"));
/// assert!(ctx.has_error());
///
/// // An error-handling unit converts the failure into a response.
/// ctx.resolve(json!({"statusCode": 404}));
/// assert!(!ctx.has_error());
/// assert_eq!(ctx.into_outcome().unwrap()["statusCode"], 404);
/// ```
#[derive(Debug)]
pub struct HandlerContext {
    /// Unique identifier for this invocation.
    invocation_id: InvocationId,

    /// The incoming event. Units may rewrite it before the handler runs.
    event: Value,

    /// Platform metadata.
    metadata: InvocationMetadata,

    /// The in-progress response.
    response: Option<Value>,

    /// The in-progress error.
    error: Option<HandlerError>,

    /// Once set, no further phase runs.
    terminated: bool,

    /// When the invocation started.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HandlerContext {
    /// Creates a context for a fresh invocation.
    #[must_use]
    pub fn new(event: Value, metadata: InvocationMetadata) -> Self {
        Self::with_invocation_id(InvocationId::new(), event, metadata)
    }

    /// Creates a context with a specific invocation ID.
    #[must_use]
    pub fn with_invocation_id(
        invocation_id: InvocationId,
        event: Value,
        metadata: InvocationMetadata,
    ) -> Self {
        Self {
            invocation_id,
            event,
            metadata,
            response: None,
            error: None,
            terminated: false,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the invocation ID.
    #[must_use]
    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    /// Returns the event.
    #[must_use]
    pub fn event(&self) -> &Value {
        &self.event
    }

    /// Returns the event for in-place modification.
    pub fn event_mut(&mut self) -> &mut Value {
        &mut self.event
    }

    /// Replaces the event.
    pub fn set_event(&mut self, event: Value) {
        self.event = event;
    }

    /// Returns the invocation metadata.
    #[must_use]
    pub fn metadata(&self) -> &InvocationMetadata {
        &self.metadata
    }

    /// Returns the in-progress response, if any.
    #[must_use]
    pub fn response(&self) -> Option<&Value> {
        self.response.as_ref()
    }

    /// Returns the in-progress response for in-place modification.
    pub fn response_mut(&mut self) -> Option<&mut Value> {
        self.response.as_mut()
    }

    /// Sets the response.
    pub fn set_response(&mut self, response: Value) {
        self.response = Some(response);
    }

    /// Removes and returns the response.
    pub fn take_response(&mut self) -> Option<Value> {
        self.response.take()
    }

    /// Returns the in-progress error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&HandlerError> {
        self.error.as_ref()
    }

    /// Returns `true` if an error is pending.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Records an error, returning the one it replaces.
    pub fn set_error(&mut self, error: HandlerError) -> Option<HandlerError> {
        self.error.replace(error)
    }

    /// Removes and returns the pending error.
    ///
    /// Clearing the error during `on_error` resolves the failure.
    pub fn take_error(&mut self) -> Option<HandlerError> {
        self.error.take()
    }

    /// Clears the pending error and sets the response.
    ///
    /// This is how an error-handling unit converts a failure into a
    /// successful outcome. Returns the error that was cleared.
    pub fn resolve(&mut self, response: Value) -> Option<HandlerError> {
        self.response = Some(response);
        self.error.take()
    }

    /// Returns `true` once no further phase may run.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Stops the invocation after the current phase.
    ///
    /// The pipeline completes with whatever response or error the context
    /// holds at that point.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Returns when the invocation started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the invocation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// Extensions let units share typed data without touching the event or
    /// the response.
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_core::{HandlerContext, InvocationMetadata};
    ///
    /// #[derive(Clone)]
    /// struct CacheHit(bool);
    ///
    /// let mut ctx = HandlerContext::new(serde_json::Value::Null, InvocationMetadata::default());
    /// ctx.set_extension(CacheHit(true));
    ///
    /// assert!(ctx.get_extension::<CacheHit>().unwrap().0);
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Retrieves a typed extension value for modification.
    pub fn get_extension_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Consumes the context and returns the final outcome.
    ///
    /// A pending error wins; otherwise the response (or `null`) is returned.
    pub fn into_outcome(self) -> Result<Value, HandlerError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.response.unwrap_or(Value::Null)),
        }
    }
}
