//! Structured logging for Stratum.
//!
//! Every pipeline invocation runs inside an `invocation` span carrying the
//! pipeline name and invocation ID. The JSON format attaches the current
//! span to each event, so phase and handler logs are correlated with their
//! invocation without any extra fields.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::default())?;
//!
//! tracing::info!(unit = "auth", "token accepted");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown log format `{other}` (expected json, pretty or compact)"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directives (e.g., "info" or "stratum_middleware=debug,warn").
    pub level: String,

    /// Let `RUST_LOG` override `level` when it is set.
    pub respect_env: bool,

    /// Output format.
    pub format: LogFormat,

    /// Emit span open/close events (includes invocation timing).
    pub span_events: bool,

    /// Include file and line of the call site.
    pub file_line_info: bool,

    /// Include the event target (module path).
    pub include_target: bool,

    /// Service name recorded when logging starts.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            respect_env: true,
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
            include_target: true,
            service_name: "stratum".to_string(),
        }
    }
}

impl LogConfig {
    /// Human-readable output at debug level, with span timing.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            span_events: true,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        if self.respect_env {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        create_env_filter(&self.level)
    }
}

/// Initializes the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` for invalid filter directives or
/// when a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.filter()?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_target(config.include_target);

    let layer = match config.format {
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(service = %config.service_name, format = ?config.format, "logging initialized");
    Ok(())
}

/// Parses filter directives.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the directives are invalid.
pub fn create_env_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log filter `{directives}`: {e}")))
}
