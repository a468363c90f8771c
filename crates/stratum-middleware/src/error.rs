//! Pipeline configuration errors.

use thiserror::Error;

/// Errors raised while configuring a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The stack is shared with a running invocation or a pipeline clone.
    #[error(
        "middleware stack is shared by {holders} other holder(s); \
         register units before invoking or use `use_middleware`"
    )]
    StackInUse {
        /// Other holders of the stack: pipeline clones and running invocations.
        holders: usize,
    },
}
