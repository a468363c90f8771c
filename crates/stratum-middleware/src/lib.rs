//! # Stratum Middleware
//!
//! Onion-model middleware pipeline for serverless handlers.
//!
//! A [`Pipeline`] wraps one base [`Handler`](stratum_core::Handler) with an
//! ordered stack of [`Middleware`] units. Each unit may contribute a
//! `before`, `after` and `on_error` phase:
//!
//! ```text
//! event → A.before → B.before → handler
//!                                  ↓
//! result ← A.after ← B.after ←─────┘
//!
//! failure → B.on_error → A.on_error → result or error
//! ```
//!
//! ## Key Features
//!
//! - **Short-circuit**: a `before` phase returning [`Flow::Return`] skips the
//!   handler and the remaining `before` phases
//! - **Recovery**: an `on_error` phase that clears `ctx.error` turns the
//!   failure into a success
//! - **Panic isolation**: panics in phases and the handler become internal
//!   errors (configurable in [`PipelineOptions`])
//! - **Nesting**: a pipeline is itself a handler
//!
//! ## Example
//!
//! ```
//! use stratum_core::{handler_fn, HandlerError, InvocationMetadata};
//! use stratum_middleware::{Flow, FnMiddleware, Pipeline};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::wrap(handler_fn(|_event, _metadata| async {
//!     Err(HandlerError::not_found("no such order"))
//! }))
//! .use_middleware(FnMiddleware::new("http_errors").on_error_sync(|ctx| {
//!     if let Some(error) = ctx.error() {
//!         let envelope = error.to_envelope(None);
//!         let status = error.status_code().as_u16();
//!         ctx.resolve(json!({ "statusCode": status, "body": envelope }));
//!     }
//!     Ok(Flow::Continue)
//! }));
//!
//! let response = pipeline
//!     .invoke(json!({}), InvocationMetadata::new("orders"))
//!     .await
//!     .unwrap();
//! assert_eq!(response["statusCode"], 404);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/stratum-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod stack;

// Re-export main types at crate root
pub use error::PipelineError;
pub use middleware::{
    async_phase, callback_phase, sync_phase, Flow, FnMiddleware, Middleware, PhaseFn, PhaseResult,
};
pub use pipeline::{ExecutionState, Phase, Pipeline, PipelineOptions};
pub use stack::{BoxedMiddleware, MiddlewareStack};
