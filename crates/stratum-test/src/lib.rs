//! # Stratum Test
//!
//! Test utilities for Stratum pipelines. Everything runs in-process: no
//! platform runtime, no network.
//!
//! ## Key Features
//!
//! - **Recorder**: Shared, ordered log of which phases ran
//! - **Scripted Units**: Middleware whose phases continue, fail, short-circuit,
//!   resolve, panic or terminate on demand
//! - **Scripted Handler**: A base handler that echoes, responds, fails or panics
//! - **Sample Events**: API-gateway, scheduled and warmup event payloads
//! - **Callback Probe**: Captures every outcome delivered through a callback
//!
//! ## Example
//!
//! ```
//! use stratum_middleware::Pipeline;
//! use stratum_test::{events, Recorder, ScriptedHandler, ScriptedMiddleware, Step};
//!
//! # tokio_test::block_on(async {
//! let recorder = Recorder::new();
//! let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
//!     .use_middleware(ScriptedMiddleware::new("auth", &recorder))
//!     .use_middleware(
//!         ScriptedMiddleware::new("validate", &recorder).before(Step::Reject("bad body".into())),
//!     );
//!
//! let event = events::api_gateway("POST", "/orders", None);
//! let result = pipeline.invoke(event, events::metadata()).await;
//!
//! assert!(result.is_err());
//! recorder.assert_order(&[
//!     "auth.before",
//!     "validate.before",
//!     "validate.on_error",
//!     "auth.on_error",
//! ]);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/stratum-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
mod probe;
mod recorder;
mod scripted;

pub use probe::CallbackProbe;
pub use recorder::Recorder;
pub use scripted::{Reply, ScriptedHandler, ScriptedMiddleware, Step};
