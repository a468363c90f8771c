//! Scripted middleware units and handlers.

use crate::Recorder;
use serde_json::{json, Value};
use std::time::Duration;
use stratum_core::{
    BoxFuture, Handler, HandlerContext, HandlerError, HandlerResult, InvocationMetadata,
};
use stratum_middleware::{Flow, Middleware, PhaseResult};

/// What a scripted phase does after recording itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Return [`Flow::Continue`] without touching the context.
    Continue,
    /// Append the unit name to the event's `trail` array, then continue.
    Tag,
    /// Fail with an internal error carrying this message.
    Fail(String),
    /// Fail with a bad request error carrying this message.
    Reject(String),
    /// Set this response and short-circuit.
    Return(Value),
    /// Clear the pending error, set this response, then continue.
    Resolve(Value),
    /// Leave a bad request error on the context and return `Ok`.
    LeaveError(String),
    /// Terminate the context, then continue.
    Terminate,
    /// Panic with this message.
    Panic(String),
}

/// A middleware unit whose phases follow a script.
///
/// Every phase records `"{name}.{phase}"` on the shared [`Recorder`] before
/// playing its [`Step`]. Unscripted phases continue.
#[derive(Debug, Clone)]
pub struct ScriptedMiddleware {
    name: String,
    recorder: Recorder,
    before: Step,
    after: Step,
    on_error: Step,
    delay: Option<Duration>,
}

impl ScriptedMiddleware {
    /// Creates a unit whose phases all continue.
    #[must_use]
    pub fn new(name: impl Into<String>, recorder: &Recorder) -> Self {
        Self {
            name: name.into(),
            recorder: recorder.clone(),
            before: Step::Continue,
            after: Step::Continue,
            on_error: Step::Continue,
            delay: None,
        }
    }

    /// Scripts the `before` phase.
    #[must_use]
    pub fn before(mut self, step: Step) -> Self {
        self.before = step;
        self
    }

    /// Scripts the `after` phase.
    #[must_use]
    pub fn after(mut self, step: Step) -> Self {
        self.after = step;
        self
    }

    /// Scripts the `on_error` phase.
    #[must_use]
    pub fn on_error(mut self, step: Step) -> Self {
        self.on_error = step;
        self
    }

    /// Sleeps for `delay` in every phase, after recording.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn play(&self, phase: &str, step: &Step, ctx: &mut HandlerContext) -> PhaseResult {
        self.recorder.record(format!("{}.{phase}", self.name));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match step {
            Step::Continue => Ok(Flow::Continue),
            Step::Tag => {
                tag(ctx.event_mut(), &self.name);
                Ok(Flow::Continue)
            }
            Step::Fail(message) => Err(HandlerError::internal(message.clone())),
            Step::Reject(message) => Err(HandlerError::bad_request(message.clone())),
            Step::Return(response) => {
                ctx.set_response(response.clone());
                Ok(Flow::Return)
            }
            Step::Resolve(response) => {
                ctx.resolve(response.clone());
                Ok(Flow::Continue)
            }
            Step::LeaveError(message) => {
                ctx.set_error(HandlerError::bad_request(message.clone()));
                Ok(Flow::Continue)
            }
            Step::Terminate => {
                ctx.terminate();
                Ok(Flow::Continue)
            }
            Step::Panic(message) => panic!("{message}"),
        }
    }
}

impl Middleware for ScriptedMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn before<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        Box::pin(self.play("before", &self.before, ctx))
    }

    fn after<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        Box::pin(self.play("after", &self.after, ctx))
    }

    fn on_error<'a>(&'a self, ctx: &'a mut HandlerContext) -> BoxFuture<'a, PhaseResult> {
        Box::pin(self.play("on_error", &self.on_error, ctx))
    }
}

/// What a [`ScriptedHandler`] answers.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `{"echo": <event>}`.
    Echo,
    /// A fixed response.
    Respond(Value),
    /// An internal error carrying this message.
    Fail(String),
    /// A panic with this message.
    Panic(String),
}

/// A base handler that records `"handler"` and answers per its [`Reply`].
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    recorder: Recorder,
    reply: Reply,
    delay: Option<Duration>,
}

impl ScriptedHandler {
    /// Creates a handler with the given reply.
    #[must_use]
    pub fn new(recorder: &Recorder, reply: Reply) -> Self {
        Self {
            recorder: recorder.clone(),
            reply,
            delay: None,
        }
    }

    /// Echoes the event back.
    #[must_use]
    pub fn echo(recorder: &Recorder) -> Self {
        Self::new(recorder, Reply::Echo)
    }

    /// Always answers `response`.
    #[must_use]
    pub fn respond(recorder: &Recorder, response: Value) -> Self {
        Self::new(recorder, Reply::Respond(response))
    }

    /// Always fails.
    #[must_use]
    pub fn failing(recorder: &Recorder, message: impl Into<String>) -> Self {
        Self::new(recorder, Reply::Fail(message.into()))
    }

    /// Always panics.
    #[must_use]
    pub fn panicking(recorder: &Recorder, message: impl Into<String>) -> Self {
        Self::new(recorder, Reply::Panic(message.into()))
    }

    /// Sleeps for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Handler for ScriptedHandler {
    fn call<'a>(
        &'a self,
        event: Value,
        _metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            self.recorder.record("handler");
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match &self.reply {
                Reply::Echo => Ok(json!({ "echo": event })),
                Reply::Respond(response) => Ok(response.clone()),
                Reply::Fail(message) => Err(HandlerError::internal(message.clone())),
                Reply::Panic(message) => panic!("{message}"),
            }
        })
    }
}

fn tag(event: &mut Value, name: &str) {
    if let Some(fields) = event.as_object_mut() {
        if let Value::Array(trail) = fields.entry("trail").or_insert_with(|| json!([])) {
            trail.push(json!(name));
        }
    }
}
