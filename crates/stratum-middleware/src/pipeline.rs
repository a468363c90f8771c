//! The onion-model pipeline executor.
//!
//! A [`Pipeline`] wraps one base handler with an ordered stack of middleware
//! units and runs every invocation through a small state machine:
//!
//! ```text
//!   RunningBefore ──Return──────────────┐
//!        │ ok                           ▼
//!        ▼                        RunningAfter ──ok──► Done
//!   RunningHandler ──ok─────────────────▲  │
//!        │ err                             │ err
//!        ▼                                 ▼
//!   RunningError ◄─────────────────────────┘
//!        │ resolved / exhausted
//!        ▼
//!       Done
//! ```
//!
//! `before` phases run in registration order. `after` and `on_error` run in
//! reverse, and only for units whose `before` was entered. A unit that
//! short-circuits does not get its own `after`.
//!
//! The stack is held behind an `Arc` and snapshotted at the start of each
//! invocation, so concurrent invocations never observe a half-built stack.

use crate::error::PipelineError;
use crate::middleware::{async_phase, Flow, FnMiddleware, Middleware, PhaseResult};
use crate::stack::{BoxedMiddleware, MiddlewareStack};
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use stratum_core::{
    BoxFuture, Callback, CompletionError, Handler, HandlerContext, HandlerError, HandlerResult,
    InvocationMetadata,
};
use stratum_telemetry::metrics::{self as telemetry, InvocationOutcome};
use tracing::Instrument;

/// Label used for the base handler in logs and metrics.
const HANDLER: &str = "handler";

/// A middleware phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Runs ahead of the handler.
    Before,
    /// Runs after a response exists.
    After,
    /// Runs while an error is pending.
    OnError,
}

impl Phase {
    /// Returns the phase name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::OnError => "on_error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Executor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Walking `before` phases forward.
    RunningBefore,
    /// Awaiting the base handler.
    RunningHandler,
    /// Walking `after` phases backward.
    RunningAfter,
    /// Walking `on_error` phases backward.
    RunningError,
    /// The outcome is final.
    Done,
}

/// Pipeline behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Name used in spans and metric labels.
    pub name: String,

    /// Convert panics in phases and the handler into internal errors.
    pub catch_panics: bool,

    /// Record invocation metrics.
    pub record_metrics: bool,
}

impl PipelineOptions {
    /// Creates options with the given pipeline name and defaults otherwise.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets whether panics are caught.
    #[must_use]
    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Sets whether metrics are recorded.
    #[must_use]
    pub fn record_metrics(mut self, enabled: bool) -> Self {
        self.record_metrics = enabled;
        self
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            catch_panics: true,
            record_metrics: true,
        }
    }
}

/// A base handler wrapped in middleware.
///
/// `Pipeline` itself implements [`Handler`], so a pipeline can be used as
/// the base handler of another pipeline.
///
/// # Example
///
/// ```
/// use stratum_core::{sync_handler, InvocationMetadata};
/// use stratum_middleware::{Flow, FnMiddleware, Pipeline};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::wrap(sync_handler(|event, _| Ok(json!({ "echo": event }))))
///     .use_middleware(FnMiddleware::new("stamp").after_sync(|ctx| {
///         if let Some(response) = ctx.response_mut() {
///             response["stamped"] = json!(true);
///         }
///         Ok(Flow::Continue)
///     }));
///
/// let response = pipeline
///     .invoke(json!("hi"), InvocationMetadata::new("echo"))
///     .await
///     .unwrap();
/// assert_eq!(response, json!({ "echo": "hi", "stamped": true }));
/// # });
/// ```
#[derive(Clone)]
pub struct Pipeline {
    handler: Arc<dyn Handler>,
    stack: Arc<MiddlewareStack>,
    options: Arc<PipelineOptions>,
}

impl Pipeline {
    /// Wraps a base handler with an empty stack.
    #[must_use]
    pub fn wrap<H: Handler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            stack: Arc::new(MiddlewareStack::new()),
            options: Arc::new(PipelineOptions::default()),
        }
    }

    /// Replaces the pipeline options.
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Appends a middleware unit.
    ///
    /// If the stack is shared with a clone of this pipeline, the clone keeps
    /// its own snapshot.
    #[must_use]
    pub fn use_middleware<M: Middleware>(mut self, unit: M) -> Self {
        Arc::make_mut(&mut self.stack).push(Arc::new(unit));
        self
    }

    /// Appends several pre-boxed units in order.
    #[must_use]
    pub fn use_all<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = BoxedMiddleware>,
    {
        Arc::make_mut(&mut self.stack).extend(units);
        self
    }

    /// Registers an inline unit with only a `before` phase.
    #[must_use]
    pub fn before<F>(self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult>
            + Send
            + Sync
            + 'static,
    {
        let name = self.inline_name(Phase::Before);
        self.use_middleware(FnMiddleware::new(name).with_before(async_phase(func)))
    }

    /// Registers an inline unit with only an `after` phase.
    #[must_use]
    pub fn after<F>(self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult>
            + Send
            + Sync
            + 'static,
    {
        let name = self.inline_name(Phase::After);
        self.use_middleware(FnMiddleware::new(name).with_after(async_phase(func)))
    }

    /// Registers an inline unit with only an `on_error` phase.
    #[must_use]
    pub fn on_error<F>(self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut HandlerContext) -> BoxFuture<'a, PhaseResult>
            + Send
            + Sync
            + 'static,
    {
        let name = self.inline_name(Phase::OnError);
        self.use_middleware(FnMiddleware::new(name).with_on_error(async_phase(func)))
    }

    /// Appends a unit in place.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StackInUse`] while the stack is shared with
    /// a running invocation or a clone of this pipeline, idle or not.
    pub fn register<M: Middleware>(&mut self, unit: M) -> Result<&mut Self, PipelineError> {
        if let Some(stack) = Arc::get_mut(&mut self.stack) {
            stack.push(Arc::new(unit));
            return Ok(self);
        }
        let holders = Arc::strong_count(&self.stack).saturating_sub(1);
        tracing::warn!(
            pipeline = %self.options.name,
            holders,
            "rejected middleware registration on a shared stack"
        );
        Err(PipelineError::StackInUse { holders })
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Returns the registered unit names in order.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<&str> {
        self.stack.names()
    }

    /// Returns the number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns `true` if no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Runs one invocation and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error no `on_error` phase resolved.
    pub async fn invoke(&self, event: Value, metadata: InvocationMetadata) -> HandlerResult {
        self.run(HandlerContext::new(event, metadata))
            .await
            .into_outcome()
    }

    /// Runs one invocation and delivers its outcome through `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::AlreadyCompleted`] if the callback was
    /// already signalled elsewhere; the outcome is dropped in that case.
    pub async fn invoke_with_callback(
        &self,
        event: Value,
        metadata: InvocationMetadata,
        callback: Callback<HandlerResult>,
    ) -> Result<(), CompletionError> {
        let outcome = self.invoke(event, metadata).await;
        callback.complete(outcome)
    }

    /// Runs one invocation over an existing context and returns it.
    ///
    /// The returned context is terminated and holds the final response or
    /// error.
    pub async fn run(&self, mut ctx: HandlerContext) -> HandlerContext {
        let span = tracing::info_span!(
            "invocation",
            pipeline = %self.options.name,
            invocation_id = %ctx.invocation_id(),
        );

        let started = Instant::now();
        let stack = Arc::clone(&self.stack);
        let report = Execution::new(self, &stack)
            .drive(&mut ctx)
            .instrument(span)
            .await;

        if self.options.record_metrics {
            let outcome = if ctx.has_error() {
                InvocationOutcome::Error
            } else if report.recovered {
                InvocationOutcome::Recovered
            } else {
                InvocationOutcome::Success
            };
            telemetry::record_invocation(&self.options.name, outcome, started.elapsed());
        }
        ctx
    }

    fn inline_name(&self, phase: Phase) -> String {
        format!("{}#{}", phase.name(), self.stack.len())
    }
}

impl Handler for Pipeline {
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.invoke(event, metadata.clone()))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

/// What happened during one invocation, beyond the context itself.
#[derive(Debug, Default)]
struct Report {
    short_circuited: bool,
    recovered: bool,
}

/// State for a single walk through the stack.
struct Execution<'p> {
    pipeline: &'p Pipeline,
    units: &'p [BoxedMiddleware],
    /// Leading units eligible for `after` and `on_error`.
    entered: usize,
    report: Report,
}

impl<'p> Execution<'p> {
    fn new(pipeline: &'p Pipeline, stack: &'p MiddlewareStack) -> Self {
        Self {
            pipeline,
            units: stack.as_slice(),
            entered: 0,
            report: Report::default(),
        }
    }

    async fn drive(mut self, ctx: &mut HandlerContext) -> Report {
        let mut state = ExecutionState::RunningBefore;
        while state != ExecutionState::Done {
            tracing::trace!(?state, "entering state");
            state = match state {
                ExecutionState::RunningBefore => self.run_before(ctx).await,
                ExecutionState::RunningHandler => self.run_handler(ctx).await,
                ExecutionState::RunningAfter => self.run_after(ctx).await,
                ExecutionState::RunningError => self.run_error(ctx).await,
                ExecutionState::Done => ExecutionState::Done,
            };
        }
        self.finish(ctx);
        self.report
    }

    async fn run_before(&mut self, ctx: &mut HandlerContext) -> ExecutionState {
        let units = self.units;
        for (index, unit) in units.iter().enumerate() {
            if ctx.is_terminated() {
                return self.terminated(Phase::Before.name());
            }
            let result = self.call_phase(unit.as_ref(), Phase::Before, ctx).await;
            match settle(result, ctx) {
                Ok(Flow::Continue) => self.entered = index + 1,
                Ok(Flow::Return) => {
                    self.entered = index;
                    self.report.short_circuited = true;
                    tracing::debug!(unit = unit.name(), "short-circuited before handler");
                    if self.pipeline.options.record_metrics {
                        telemetry::record_short_circuit(&self.pipeline.options.name);
                    }
                    return ExecutionState::RunningAfter;
                }
                Err(error) => {
                    self.entered = index + 1;
                    self.fail(ctx, error, Phase::Before.name(), unit.name());
                    return ExecutionState::RunningError;
                }
            }
        }
        ExecutionState::RunningHandler
    }

    async fn run_handler(&mut self, ctx: &mut HandlerContext) -> ExecutionState {
        if ctx.is_terminated() {
            return self.terminated(HANDLER);
        }

        let event = ctx.event().clone();
        let pipeline = self.pipeline;
        let handler = &pipeline.handler;
        let metadata = ctx.metadata();
        let result = guard(
            pipeline.options.catch_panics,
            async move { handler.call(event, metadata).await },
        )
        .await
        .unwrap_or_else(|message| Err(self.panicked(HANDLER, HANDLER, &message)));

        match result {
            Ok(response) => {
                ctx.set_response(response);
                ExecutionState::RunningAfter
            }
            Err(error) => {
                self.fail(ctx, error, HANDLER, HANDLER);
                ExecutionState::RunningError
            }
        }
    }

    async fn run_after(&mut self, ctx: &mut HandlerContext) -> ExecutionState {
        let units = &self.units[..self.entered];
        for unit in units.iter().rev() {
            if ctx.is_terminated() {
                return self.terminated(Phase::After.name());
            }
            let result = self.call_phase(unit.as_ref(), Phase::After, ctx).await;
            if let Err(error) = settle(result, ctx) {
                self.fail(ctx, error, Phase::After.name(), unit.name());
                return ExecutionState::RunningError;
            }
        }
        ExecutionState::Done
    }

    async fn run_error(&mut self, ctx: &mut HandlerContext) -> ExecutionState {
        let units = &self.units[..self.entered];
        for unit in units.iter().rev() {
            if ctx.is_terminated() {
                return self.terminated(Phase::OnError.name());
            }
            match self.call_phase(unit.as_ref(), Phase::OnError, ctx).await {
                Ok(_) if !ctx.has_error() => {
                    self.report.recovered = true;
                    tracing::debug!(unit = unit.name(), "error resolved");
                    if self.pipeline.options.record_metrics {
                        telemetry::record_recovered_error(&self.pipeline.options.name);
                    }
                    return ExecutionState::Done;
                }
                Ok(_) => {}
                Err(error) => {
                    if self.pipeline.options.record_metrics {
                        telemetry::record_phase_failure(
                            &self.pipeline.options.name,
                            Phase::OnError.name(),
                        );
                    }
                    if let Some(previous) = ctx.set_error(error) {
                        tracing::debug!(
                            unit = unit.name(),
                            superseded = %previous,
                            "error handler failed; error replaced"
                        );
                    }
                }
            }
        }
        ExecutionState::Done
    }

    fn finish(&self, ctx: &mut HandlerContext) {
        ctx.terminate();
        match ctx.error() {
            Some(error) => tracing::warn!(
                error = %error,
                status = error.status_code().as_u16(),
                "invocation finished with unhandled error"
            ),
            None => tracing::debug!(
                short_circuited = self.report.short_circuited,
                recovered = self.report.recovered,
                "invocation finished"
            ),
        }
    }

    fn terminated(&self, phase: &str) -> ExecutionState {
        tracing::debug!(phase, "context terminated; skipping remaining phases");
        ExecutionState::Done
    }

    fn fail(&self, ctx: &mut HandlerContext, error: HandlerError, phase: &str, unit: &str) {
        tracing::debug!(unit, phase, error = %error, "phase failed");
        if self.pipeline.options.record_metrics {
            telemetry::record_phase_failure(&self.pipeline.options.name, phase);
        }
        if let Some(previous) = ctx.set_error(error) {
            tracing::debug!(superseded = %previous, "pending error replaced");
        }
    }

    async fn call_phase(
        &self,
        unit: &dyn Middleware,
        phase: Phase,
        ctx: &mut HandlerContext,
    ) -> PhaseResult {
        let call = async move {
            match phase {
                Phase::Before => unit.before(ctx).await,
                Phase::After => unit.after(ctx).await,
                Phase::OnError => unit.on_error(ctx).await,
            }
        };
        guard(self.pipeline.options.catch_panics, call)
            .await
            .unwrap_or_else(|message| Err(self.panicked(phase.name(), unit.name(), &message)))
    }

    fn panicked(&self, phase: &str, unit: &str, message: &str) -> HandlerError {
        tracing::error!(unit, phase, panic = message, "panic caught in pipeline");
        HandlerError::internal(format!("`{unit}` panicked during {phase}: {message}"))
    }
}

/// A phase that left `ctx.error` set without returning `Err` has failed.
fn settle(result: PhaseResult, ctx: &mut HandlerContext) -> PhaseResult {
    match result {
        Ok(_) if ctx.has_error() => Err(ctx
            .take_error()
            .unwrap_or_else(|| HandlerError::internal("pending error vanished"))),
        other => other,
    }
}

/// Awaits `fut`, turning a panic into its message when `catch` is set.
async fn guard<T, F>(catch: bool, fut: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    if !catch {
        return Ok(fut.await);
    }
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
