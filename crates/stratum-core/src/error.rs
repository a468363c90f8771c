//! Error types for Stratum.
//!
//! This module provides [`HandlerError`], the single error type that flows
//! through a pipeline. Base handlers return it, phases return it, and it is
//! what the caller finally receives when no `on_error` phase resolves a
//! failure.
//!
//! Errors are classified by [`ErrorCategory`], which maps onto an HTTP status
//! code so that an error-handling middleware can turn any failure into an
//! HTTP-shaped response via [`HandlerError::to_envelope`].

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type returned by handlers and wrapped pipelines.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Message used in envelopes for errors that must not leak details.
const MASKED_MESSAGE: &str = "An internal error occurred";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or invalid input.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Caller is not permitted to perform the operation.
    Forbidden,
    /// Resource not found.
    NotFound,
    /// Work did not finish in time.
    Timeout,
    /// Any other client-side (4xx) failure raised with an explicit status.
    ///
    /// Its default status is a fallback; the error keeps its own 4xx status.
    Client,
    /// Internal failures, including panics caught by the executor.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::Client => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Standard error type for handlers and middleware phases.
///
/// # Example
///
/// ```
/// use stratum_core::{ErrorCategory, HandlerError};
///
/// fn parse_body(body: &str) -> Result<(), HandlerError> {
///     if body.is_empty() {
///         return Err(HandlerError::bad_request("body cannot be empty"));
///     }
///     Ok(())
/// }
///
/// let err = parse_body("").unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::BadRequest);
/// assert_eq!(err.status_code().as_u16(), 400);
/// ```
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The event was malformed or failed validation.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
        /// Structured details (e.g. per-field validation messages).
        details: Option<serde_json::Value>,
    },

    /// Authentication failed.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Work timed out.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// An error raised with an explicit HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code to respond with.
        status: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (never exposed to callers).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl HandlerError {
    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    /// Creates a bad request error carrying structured details.
    #[must_use]
    pub fn bad_request_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an error with an explicit HTTP status.
    ///
    /// Statuses outside `400..600` are not errors and become `500`.
    #[must_use]
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status: error_status(status.as_u16()).as_u16(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BadRequest { .. } => ErrorCategory::BadRequest,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::Forbidden { .. } => ErrorCategory::Forbidden,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Http { status, .. } => match error_status(*status).as_u16() {
                401 => ErrorCategory::Unauthorized,
                403 => ErrorCategory::Forbidden,
                404 => ErrorCategory::NotFound,
                504 => ErrorCategory::Timeout,
                400..=499 => ErrorCategory::Client,
                _ => ErrorCategory::Internal,
            },
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => error_status(*status),
            other => other.category().default_status_code(),
        }
    }

    /// Returns `true` if the message is safe to show to the caller.
    ///
    /// Only client errors (4xx) are exposable.
    #[must_use]
    pub fn is_exposable(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Returns the bare message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::NotFound { message }
            | Self::Timeout { message }
            | Self::Http { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    /// Converts this error to a serializable error envelope.
    ///
    /// Messages of non-exposable errors are masked.
    #[must_use]
    pub fn to_envelope(&self, invocation_id: Option<&str>) -> ErrorEnvelope {
        let message = if self.is_exposable() {
            self.message().to_string()
        } else {
            MASKED_MESSAGE.to_string()
        };

        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code(),
                message,
                category: self.category(),
                details: match self {
                    Self::BadRequest { details, .. } => details.clone(),
                    _ => None,
                },
            },
            invocation_id: invocation_id.map(ToString::to_string),
        }
    }

    /// Returns a machine-readable error code.
    fn error_code(&self) -> String {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST".to_string(),
            Self::Unauthorized { .. } => "UNAUTHORIZED".to_string(),
            Self::Forbidden { .. } => "FORBIDDEN".to_string(),
            Self::NotFound { .. } => "NOT_FOUND".to_string(),
            Self::Timeout { .. } => "TIMEOUT".to_string(),
            Self::Http { status, .. } => format!("HTTP_{status}"),
            Self::Internal { .. } => "INTERNAL_ERROR".to_string(),
        }
    }
}

/// Maps a raw status to an error status, falling back to `500`.
fn error_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(status) if status.is_client_error() || status.is_server_error() => status,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serializable error envelope, suitable as an HTTP response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The invocation ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Errors reported by a [`CompletionBridge`](crate::CompletionBridge).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The outcome had already been delivered; this attempt was dropped.
    #[error("completion already delivered; attempt {attempts} was suppressed")]
    AlreadyCompleted {
        /// Total number of completion attempts so far, including this one.
        attempts: usize,
    },
}
