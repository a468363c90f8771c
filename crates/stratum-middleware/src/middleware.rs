//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every middleware unit
//! implements. A unit exposes up to three phases:
//!
//! - `before` runs ahead of the base handler, in registration order
//! - `after` runs once a response exists, in reverse registration order
//! - `on_error` runs when any step failed, in reverse registration order
//!
//! Every phase has a no-op default, so a unit only implements the phases it
//! cares about. Phases receive the shared [`HandlerContext`] and communicate
//! exclusively by mutating it.
//!
//! # Example
//!
//! ```
//! use stratum_core::{BoxFuture, HandlerContext};
//! use stratum_middleware::{Flow, Middleware, PhaseResult};
//! use serde_json::json;
//!
//! /// Adds a header to every response, including error responses.
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &str {
//!         "powered_by"
//!     }
//!
//!     fn after<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
//!         Box::pin(async move {
//!             if let Some(response) = ctx.response_mut() {
//!                 response["headers"]["x-powered-by"] = json!("stratum");
//!             }
//!             Ok(Flow::Continue)
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;
use stratum_core::{BoxFuture, Callback, CompletionBridge, HandlerContext, HandlerError};

/// What a phase asks the executor to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed normally.
    Continue,
    /// Short-circuit: skip the remaining `before` phases and the handler.
    ///
    /// Only meaningful from `before`; the unit is expected to have set the
    /// final response on the context. `after` and `on_error` treat it like
    /// [`Flow::Continue`].
    Return,
}

/// Outcome of a single phase.
pub type PhaseResult = Result<Flow, HandlerError>;

/// A type-erased phase function.
pub type PhaseFn =
    Arc<dyn for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> + Send + Sync>;

fn continue_now<'a>() -> BoxFuture<'a, PhaseResult> {
    Box::pin(std::future::ready(Ok(Flow::Continue)))
}

/// The middleware unit trait.
///
/// # Invariants
///
/// - Units are shared by every invocation of a pipeline, so any state they
///   keep must be safe to use concurrently
/// - A phase that wants to stop the handler from running must set the
///   response and return [`Flow::Return`] from `before`
/// - An `on_error` phase resolves a failure by clearing `ctx.error`
///   (see [`HandlerContext::resolve`])
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this unit.
    ///
    /// This name is used for logging, metrics, and debugging.
    fn name(&self) -> &str;

    /// Runs before the base handler.
    fn before<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        let _ = ctx;
        continue_now()
    }

    /// Runs after the base handler (or a short-circuit) produced a response.
    fn after<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        let _ = ctx;
        continue_now()
    }

    /// Runs when an earlier step failed and `ctx.error` is set.
    fn on_error<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        let _ = ctx;
        continue_now()
    }
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn before<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        (**self).before(ctx)
    }

    fn after<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        (**self).after(ctx)
    }

    fn on_error<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        (**self).on_error(ctx)
    }
}

/// Builds a [`PhaseFn`] from an async phase closure.
///
/// The closure must return a boxed future borrowing the context:
///
/// ```
/// use stratum_middleware::{async_phase, Flow};
///
/// let phase = async_phase(|ctx| {
///     Box::pin(async move {
///         ctx.event_mut()["seen"] = true.into();
///         Ok(Flow::Continue)
///     })
/// });
/// ```
pub fn async_phase<F>(func: F) -> PhaseFn
where
    F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Builds a [`PhaseFn`] from a synchronous phase closure.
pub fn sync_phase<F>(func: F) -> PhaseFn
where
    F: Fn(&mut HandlerContext) -> PhaseResult + Send + Sync + 'static,
{
    async_phase(move |ctx| {
        let result = func(ctx);
        Box::pin(std::future::ready(result))
    })
}

/// Builds a [`PhaseFn`] from a callback-style phase closure.
///
/// The closure may mutate the context synchronously and then signal its
/// outcome, immediately or later from another task, through the
/// [`Callback`]. The executor waits for the first signal; a callback
/// dropped without signalling fails the phase.
pub fn callback_phase<F>(func: F) -> PhaseFn
where
    F: Fn(&mut HandlerContext, Callback<PhaseResult>) + Send + Sync + 'static,
{
    async_phase(move |ctx| {
        let (bridge, receiver) = CompletionBridge::channel();
        func(ctx, Callback::new(bridge));
        Box::pin(stratum_core::await_callback(receiver))
    })
}

/// A middleware unit assembled from closures.
///
/// Each phase slot is optional; empty slots are no-ops.
///
/// # Example
///
/// ```
/// use stratum_middleware::{Flow, FnMiddleware};
/// use serde_json::json;
///
/// let warmup = FnMiddleware::new("warmup").before_sync(|ctx| {
///     if ctx.event().get("source") == Some(&json!("serverless-plugin-warmup")) {
///         ctx.set_response(json!("warmed"));
///         return Ok(Flow::Return);
///     }
///     Ok(Flow::Continue)
/// });
/// ```
#[derive(Clone)]
pub struct FnMiddleware {
    name: String,
    before: Option<PhaseFn>,
    after: Option<PhaseFn>,
    on_error: Option<PhaseFn>,
}

impl FnMiddleware {
    /// Creates a unit with no phases.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: None,
            after: None,
            on_error: None,
        }
    }

    /// Sets the `before` phase from a prepared [`PhaseFn`].
    #[must_use]
    pub fn with_before(mut self, phase: PhaseFn) -> Self {
        self.before = Some(phase);
        self
    }

    /// Sets the `after` phase from a prepared [`PhaseFn`].
    #[must_use]
    pub fn with_after(mut self, phase: PhaseFn) -> Self {
        self.after = Some(phase);
        self
    }

    /// Sets the `on_error` phase from a prepared [`PhaseFn`].
    #[must_use]
    pub fn with_on_error(mut self, phase: PhaseFn) -> Self {
        self.on_error = Some(phase);
        self
    }

    /// Sets an async `before` phase.
    #[must_use]
    pub fn before<F>(self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult>
            + Send
            + Sync
            + 'static,
    {
        self.with_before(async_phase(func))
    }

    /// Sets a synchronous `before` phase.
    #[must_use]
    pub fn before_sync<F>(self, func: F) -> Self
    where
        F: Fn(&mut HandlerContext) -> PhaseResult + Send + Sync + 'static,
    {
        self.with_before(sync_phase(func))
    }

    /// Sets a callback-style `before` phase.
    #[must_use]
    pub fn before_callback<F>(self, func: F) -> Self
    where
        F: Fn(&mut HandlerContext, Callback<PhaseResult>) + Send + Sync + 'static,
    {
        self.with_before(callback_phase(func))
    }

    /// Sets an async `after` phase.
    #[must_use]
    pub fn after<F>(self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult>
            + Send
            + Sync
            + 'static,
    {
        self.with_after(async_phase(func))
    }

    /// Sets a synchronous `after` phase.
    #[must_use]
    pub fn after_sync<F>(self, func: F) -> Self
    where
        F: Fn(&mut HandlerContext) -> PhaseResult + Send + Sync + 'static,
    {
        self.with_after(sync_phase(func))
    }

    /// Sets a callback-style `after` phase.
    #[must_use]
    pub fn after_callback<F>(self, func: F) -> Self
    where
        F: Fn(&mut HandlerContext, Callback<PhaseResult>) + Send + Sync + 'static,
    {
        self.with_after(callback_phase(func))
    }

    /// Sets an async `on_error` phase.
    #[must_use]
    pub fn on_error<F>(self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult>
            + Send
            + Sync
            + 'static,
    {
        self.with_on_error(async_phase(func))
    }

    /// Sets a synchronous `on_error` phase.
    #[must_use]
    pub fn on_error_sync<F>(self, func: F) -> Self
    where
        F: Fn(&mut HandlerContext) -> PhaseResult + Send + Sync + 'static,
    {
        self.with_on_error(sync_phase(func))
    }

    /// Sets a callback-style `on_error` phase.
    #[must_use]
    pub fn on_error_callback<F>(self, func: F) -> Self
    where
        F: Fn(&mut HandlerContext, Callback<PhaseResult>) + Send + Sync + 'static,
    {
        self.with_on_error(callback_phase(func))
    }
}

impl std::fmt::Debug for FnMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl Middleware for FnMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn before<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        match &self.before {
            Some(phase) => phase(ctx),
            None => continue_now(),
        }
    }

    fn after<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        match &self.after {
            Some(phase) => phase(ctx),
            None => continue_now(),
        }
    }

    fn on_error<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        match &self.on_error {
            Some(phase) => phase(ctx),
            None => continue_now(),
        }
    }
}
