//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections. Every
//! section rejects unknown fields and fills missing ones with defaults.

use serde::{Deserialize, Serialize};

/// Service identity section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Service name recorded in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Service version.
    #[serde(default)]
    pub version: Option<String>,

    /// Deployment environment (e.g., "development", "staging", "production").
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: None,
            environment: default_environment(),
        }
    }
}

fn default_service_name() -> String {
    "stratum-service".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable multi-line format (development).
    Pretty,
    /// Human-readable single-line format.
    Compact,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives (e.g., "info" or "stratum_middleware=debug,warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit span open/close events.
    #[serde(default)]
    pub span_events: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            span_events: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics collection.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus scrape listener address. Unset means no listener.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Histogram bucket boundaries for invocation duration, in seconds.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// Pipeline section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name used in spans and metric labels.
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Convert panics in phases and the handler into internal errors.
    #[serde(default = "default_true")]
    pub catch_panics: bool,

    /// Record invocation metrics.
    #[serde(default = "default_true")]
    pub record_metrics: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            catch_panics: true,
            record_metrics: true,
        }
    }
}

fn default_pipeline_name() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}
