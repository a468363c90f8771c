//! # Stratum Core
//!
//! Core types and traits for the Stratum middleware engine.
//!
//! This crate provides the foundational types used throughout Stratum:
//!
//! - [`HandlerContext`] - Per-invocation state shared by every phase
//! - [`InvocationMetadata`] - Platform metadata that accompanies an event
//! - [`InvocationId`] - UUID v7 invocation identifier
//! - [`HandlerError`] - Standard error type
//! - [`Handler`] - Shape shared by base handlers and wrapped pipelines
//! - [`CompletionBridge`] - Exactly-once outcome delivery

#![doc(html_root_url = "https://docs.rs/stratum-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod completion;
mod context;
mod error;
mod handler;

pub use completion::{await_callback, Callback, CompletionBridge};
pub use context::{HandlerContext, InvocationId, InvocationMetadata};
pub use error::{
    CompletionError, ErrorCategory, ErrorDetail, ErrorEnvelope, HandlerError, HandlerResult,
};
pub use handler::{
    callback_handler, handler_fn, sync_handler, BoxFuture, CallbackHandler, FnHandler, Handler,
    SyncFnHandler,
};
