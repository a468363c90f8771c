//! Observability for Stratum pipelines.
//!
//! - **Logging**: `tracing-subscriber` with JSON, pretty or compact output
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//!
//! The pipeline executor emits one `invocation` span per call and records
//! the metrics listed in [`metrics`]. Nothing is exported until
//! [`init_telemetry`] (or one of the per-subsystem initializers) runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .service_name("orders-fn")
//!         .metrics_addr("0.0.0.0:9090")
//!         .build();
//!
//!     init_telemetry(&config).expect("telemetry");
//! }
//! ```
//!
//! # Metrics Endpoint
//!
//! ```text
//! # TYPE stratum_invocations_total counter
//! stratum_invocations_total{pipeline="orders",outcome="success"} 1234
//! stratum_invocations_total{pipeline="orders",outcome="recovered"} 12
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, render_metrics, InvocationOutcome, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        "telemetry initialized"
    );
    Ok(())
}
