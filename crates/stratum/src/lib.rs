//! # Stratum
//!
//! **Onion-model middleware engine for serverless function handlers**
//!
//! Stratum wraps a base handler `(event, metadata) -> response | error` with
//! an ordered stack of middleware units:
//!
//! - **Three phases per unit** – `before`, `after` and `on_error`, each optional
//! - **Short-circuit** – a `before` can answer early and skip the handler
//! - **Error recovery** – an `on_error` can turn any failure into a response
//! - **Sync, async or callback** – every phase style runs on one executor
//! - **Exactly-once completion** – one outcome per invocation, always
//!
//! ## Quick Start
//!
//! ```
//! use stratum::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let orders = Pipeline::wrap(handler_fn(|event, _metadata| async move {
//!     Ok(json!({ "statusCode": 200, "body": event["body"] }))
//! }))
//! .use_middleware(FnMiddleware::new("warmup").before_sync(|ctx| {
//!     if ctx.event()["source"] == "serverless-plugin-warmup" {
//!         ctx.set_response(json!("warm"));
//!         return Ok(Flow::Return);
//!     }
//!     Ok(Flow::Continue)
//! }));
//!
//! let warm = orders
//!     .invoke(json!({ "source": "serverless-plugin-warmup" }), InvocationMetadata::new("orders"))
//!     .await
//!     .unwrap();
//! assert_eq!(warm, json!("warm"));
//! # });
//! ```
//!
//! ## Bootstrapping
//!
//! ```rust,ignore
//! let config = stratum::bootstrap("STRATUM")?;
//! let orders = stratum::pipeline(orders_handler, &config).use_middleware(HttpErrors);
//! ```
//!
//! ## Crates
//!
//! ```text
//! stratum-core        context, errors, handler trait, completion bridge
//! stratum-middleware  middleware trait, stack, pipeline executor
//! stratum-telemetry   logging and Prometheus metrics
//! stratum-config      layered configuration
//! ```

#![doc(html_root_url = "https://docs.rs/stratum/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod setup;

pub use error::StratumError;
pub use setup::{bootstrap, init, pipeline, pipeline_options, telemetry_config, CONFIG_FILE};

// Re-export core types
pub use stratum_core as core;

// Re-export middleware types
pub use stratum_middleware as middleware;

// Re-export telemetry
pub use stratum_telemetry as telemetry;

// Re-export configuration
pub use stratum_config as config;
pub use stratum_config::{ConfigLoader, StratumConfig};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use stratum::prelude::*;
/// ```
pub mod prelude {
    pub use stratum_core::{
        callback_handler, handler_fn, sync_handler, BoxFuture, Callback, Handler, HandlerContext,
        HandlerError, HandlerResult, InvocationMetadata,
    };

    pub use stratum_middleware::{
        async_phase, callback_phase, sync_phase, Flow, FnMiddleware, Middleware, Pipeline,
        PipelineError, PipelineOptions, PhaseResult,
    };

    pub use stratum_config::{ConfigLoader, StratumConfig};
}
