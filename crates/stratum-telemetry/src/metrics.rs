//! Prometheus metrics for Stratum pipelines.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `stratum_invocations_total` | Counter | `pipeline`, `outcome` | Completed invocations |
//! | `stratum_invocation_duration_seconds` | Histogram | `pipeline` | Invocation latency |
//! | `stratum_short_circuits_total` | Counter | `pipeline` | `before` phases that returned early |
//! | `stratum_phase_failures_total` | Counter | `pipeline`, `phase` | Failed phases |
//! | `stratum_recovered_errors_total` | Counter | `pipeline` | Errors resolved by `on_error` |
//!
//! Recording functions are cheap no-ops until a recorder is installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_telemetry::metrics::{record_invocation, InvocationOutcome};
//!
//! record_invocation("orders", InvocationOutcome::Success, Duration::from_millis(45));
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Counter of completed invocations.
pub const INVOCATIONS_TOTAL: &str = "stratum_invocations_total";
/// Histogram of invocation latency.
pub const INVOCATION_DURATION_SECONDS: &str = "stratum_invocation_duration_seconds";
/// Counter of short-circuited invocations.
pub const SHORT_CIRCUITS_TOTAL: &str = "stratum_short_circuits_total";
/// Counter of failed phases.
pub const PHASE_FAILURES_TOTAL: &str = "stratum_phase_failures_total";
/// Counter of errors resolved by an `on_error` phase.
pub const RECOVERED_ERRORS_TOTAL: &str = "stratum_recovered_errors_total";

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address for the scrape listener (e.g., "0.0.0.0:9090").
    ///
    /// `None` installs the recorder without a listener; use
    /// [`render_metrics`] to expose the text format yourself.
    pub listen_addr: Option<String>,

    /// Histogram buckets for invocation duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationOutcome {
    /// The handler (or a short-circuit) produced a response.
    Success,
    /// A failure was resolved by an `on_error` phase.
    Recovered,
    /// The invocation ended with an unresolved error.
    Error,
}

impl InvocationOutcome {
    /// Returns the `outcome` label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Recovered => "recovered",
            Self::Error => "error",
        }
    }
}

/// Initializes the metrics subsystem.
///
/// Starting a listener requires a running tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable listen
/// address and `TelemetryError::MetricsInit` if the recorder cannot be
/// installed (for example because another recorder is already global).
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(INVOCATION_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;

    let handle = match &config.listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                TelemetryError::MetricsInit(format!("metrics listener needs a tokio runtime: {e}"))
            })?;

            let (recorder, exporter) = builder
                .with_http_listener(addr)
                .build()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

            runtime.spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "metrics listener stopped");
                }
            });
            tracing::info!(%addr, "metrics listener started");
            handle
        }
        None => builder
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
    };

    // Store handle for later access
    let _ = METRICS_HANDLE.set(handle);

    register_metric_descriptions();
    Ok(())
}

/// Returns the global metrics handle if initialized.
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Registers descriptions for all standard metrics.
pub fn register_metric_descriptions() {
    describe_counter!(INVOCATIONS_TOTAL, "Total number of completed pipeline invocations");
    describe_histogram!(
        INVOCATION_DURATION_SECONDS,
        "Pipeline invocation duration in seconds"
    );
    describe_counter!(
        SHORT_CIRCUITS_TOTAL,
        "Invocations answered by a before phase without running the handler"
    );
    describe_counter!(PHASE_FAILURES_TOTAL, "Failed phases by phase name");
    describe_counter!(
        RECOVERED_ERRORS_TOTAL,
        "Errors converted into a response by an on_error phase"
    );
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Records a completed invocation.
///
/// Updates `stratum_invocations_total` and
/// `stratum_invocation_duration_seconds`.
pub fn record_invocation(pipeline: &str, outcome: InvocationOutcome, duration: Duration) {
    counter!(
        INVOCATIONS_TOTAL,
        "pipeline" => pipeline.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        INVOCATION_DURATION_SECONDS,
        "pipeline" => pipeline.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a short-circuit from a `before` phase.
pub fn record_short_circuit(pipeline: &str) {
    counter!(SHORT_CIRCUITS_TOTAL, "pipeline" => pipeline.to_string()).increment(1);
}

/// Records a failed phase (`before`, `handler`, `after` or `on_error`).
pub fn record_phase_failure(pipeline: &str, phase: &str) {
    counter!(
        PHASE_FAILURES_TOTAL,
        "pipeline" => pipeline.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// Records an error resolved by an `on_error` phase.
pub fn record_recovered_error(pipeline: &str) {
    counter!(RECOVERED_ERRORS_TOTAL, "pipeline" => pipeline.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(record: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, record);
        handle.render()
    }

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.listen_addr.is_none());
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(InvocationOutcome::Success.as_str(), "success");
        assert_eq!(InvocationOutcome::Recovered.as_str(), "recovered");
        assert_eq!(InvocationOutcome::Error.as_str(), "error");
    }

    #[test]
    fn test_record_invocation() {
        let output = capture(|| {
            record_invocation("orders", InvocationOutcome::Success, Duration::from_millis(5));
            record_invocation("orders", InvocationOutcome::Success, Duration::from_millis(7));
        });

        assert!(output.contains(INVOCATIONS_TOTAL));
        assert!(output.contains("pipeline=\"orders\""));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains(INVOCATION_DURATION_SECONDS));
    }

    #[test]
    fn test_record_pipeline_events() {
        let output = capture(|| {
            record_short_circuit("cache");
            record_phase_failure("cache", "after");
            record_recovered_error("cache");
        });

        assert!(output.contains(SHORT_CIRCUITS_TOTAL));
        assert!(output.contains(PHASE_FAILURES_TOTAL));
        assert!(output.contains("phase=\"after\""));
        assert!(output.contains(RECOVERED_ERRORS_TOTAL));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        // No recorder installed: the metrics facade drops everything.
        record_invocation("test", InvocationOutcome::Error, Duration::from_millis(10));
        record_short_circuit("test");
        record_phase_failure("test", "before");
        record_recovered_error("test");
    }

    #[test]
    fn test_disabled_metrics() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = MetricsConfig {
            listen_addr: Some("not-an-address".to_string()),
            ..Default::default()
        };
        let err = init_metrics(&config).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidAddress(_)));
    }
}
