//! Telemetry configuration.

use crate::logging::{LogConfig, LogFormat};
use crate::metrics::MetricsConfig;

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name (recorded in logs).
    pub service_name: String,

    /// Environment (production, staging, development).
    pub environment: String,

    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "stratum-service".to_string(),
            environment: "development".to_string(),
            metrics: MetricsConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    environment: Option<String>,
    metrics: Option<MetricsConfig>,
    logging: Option<LogConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.environment = Some(env.to_string());
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.metrics = Some(config);
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Enables a metrics scrape listener on `addr`.
    #[must_use]
    pub fn metrics_addr(mut self, addr: &str) -> Self {
        let config = self.metrics.take().unwrap_or_default();
        self.metrics = Some(MetricsConfig {
            enabled: true,
            listen_addr: Some(addr.to_string()),
            ..config
        });
        self
    }

    /// Sets the log filter directives.
    #[must_use]
    pub fn log_level(mut self, level: &str) -> Self {
        let config = self.logging.take().unwrap_or_default();
        self.logging = Some(LogConfig {
            level: level.to_string(),
            ..config
        });
        self
    }

    /// Sets the log output format.
    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        let config = self.logging.take().unwrap_or_default();
        self.logging = Some(LogConfig { format, ..config });
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        let service_name = self.service_name.unwrap_or(defaults.service_name);
        let environment = self.environment.unwrap_or(defaults.environment);

        let mut logging = self.logging.unwrap_or(defaults.logging);
        logging.service_name = service_name.clone();

        TelemetryConfig {
            service_name,
            environment,
            metrics: self.metrics.unwrap_or(defaults.metrics),
            logging,
        }
    }
}
