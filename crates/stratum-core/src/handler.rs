//! Handler trait for invocation processing.
//!
//! The [`Handler`] trait is the shape shared by base handlers and wrapped
//! pipelines: it takes an event plus invocation metadata and produces a
//! response or an error. Because a composed pipeline implements the same
//! trait, pipelines can be nested or re-wrapped freely.
//!
//! Three adapters cover the ways a handler can signal its result:
//!
//! - [`handler_fn`] for async closures,
//! - [`sync_handler`] for plain closures that return immediately,
//! - [`callback_handler`] for closures that report through a [`Callback`].

use crate::completion::{await_callback, Callback, CompletionBridge};
use crate::context::InvocationMetadata;
use crate::error::HandlerResult;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A base handler or a wrapped pipeline.
///
/// # Example
///
/// ```
/// use stratum_core::{BoxFuture, Handler, HandlerResult, InvocationMetadata};
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     fn call<'a>(
///         &'a self,
///         event: Value,
///         _metadata: &'a InvocationMetadata,
///     ) -> BoxFuture<'a, HandlerResult> {
///         Box::pin(async move { Ok(json!({ "echo": event })) })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`](crate::HandlerError) when the invocation
    /// fails.
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).call(event, metadata)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).call(event, metadata)
    }
}

/// A handler built from an async closure.
///
/// Created by [`handler_fn`].
pub struct FnHandler<F> {
    func: F,
}

/// Wraps an async closure as a [`Handler`].
///
/// The closure receives an owned copy of the metadata so its future can be
/// `'static`.
///
/// # Example
///
/// ```
/// use stratum_core::{handler_fn, HandlerError};
/// use serde_json::json;
///
/// let handler = handler_fn(|event, _metadata| async move {
///     match event.get("name") {
///         Some(name) => Ok(json!({ "greeting": format!("Hello, {}!", name) })),
///         None => Err(HandlerError::bad_request("missing name")),
///     }
/// });
/// ```
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(Value, InvocationMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { func }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value, InvocationMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin((self.func)(event, metadata.clone()))
    }
}

/// A handler built from a synchronous closure.
///
/// Created by [`sync_handler`].
pub struct SyncFnHandler<F> {
    func: F,
}

/// Wraps a synchronous closure as a [`Handler`].
pub fn sync_handler<F>(func: F) -> SyncFnHandler<F>
where
    F: Fn(Value, &InvocationMetadata) -> HandlerResult + Send + Sync + 'static,
{
    SyncFnHandler { func }
}

impl<F> Handler for SyncFnHandler<F>
where
    F: Fn(Value, &InvocationMetadata) -> HandlerResult + Send + Sync + 'static,
{
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        let result = (self.func)(event, metadata);
        Box::pin(std::future::ready(result))
    }
}

/// A handler that reports its outcome through a [`Callback`].
///
/// Created by [`callback_handler`].
pub struct CallbackHandler<F> {
    func: F,
}

/// Wraps a callback-style closure as a [`Handler`].
///
/// The closure may signal immediately or hand the callback to another task.
/// Only the first signal counts; a callback dropped without signalling
/// becomes an internal error.
///
/// # Example
///
/// ```
/// use stratum_core::callback_handler;
/// use serde_json::json;
///
/// let handler = callback_handler(|event, _metadata, done| {
///     tokio::spawn(async move {
///         let _ = done.succeed(json!({ "received": event }));
///     });
/// });
/// ```
pub fn callback_handler<F>(func: F) -> CallbackHandler<F>
where
    F: Fn(Value, InvocationMetadata, Callback<HandlerResult>) + Send + Sync + 'static,
{
    CallbackHandler { func }
}

impl<F> Handler for CallbackHandler<F>
where
    F: Fn(Value, InvocationMetadata, Callback<HandlerResult>) + Send + Sync + 'static,
{
    fn call<'a>(
        &'a self,
        event: Value,
        metadata: &'a InvocationMetadata,
    ) -> BoxFuture<'a, HandlerResult> {
        let (bridge, receiver) = CompletionBridge::channel();
        (self.func)(event, metadata.clone(), Callback::new(bridge));
        Box::pin(await_callback(receiver))
    }
}
