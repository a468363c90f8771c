//! Main configuration types.
//!
//! This module provides the top-level [`StratumConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, LoggingConfig, MetricsConfig, PipelineConfig, ServiceConfig};

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Complete Stratum configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use stratum_config::StratumConfig;
///
/// let config = StratumConfig::default();
/// assert_eq!(config.pipeline.name, "default");
/// assert!(config.pipeline.catch_panics);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StratumConfig {
    /// Service identity.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl StratumConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> StratumConfigBuilder {
        StratumConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The log filter names an unknown level
    /// - The metrics listen address is not a socket address
    /// - Histogram buckets are empty or not strictly increasing
    /// - The pipeline name is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "`{}` is not a valid filter (levels: {})",
                    self.logging.level,
                    LEVELS.join(", ")
                ),
            ));
        }

        if self.metrics.enabled {
            if let Some(addr) = &self.metrics.listen_addr {
                if addr.parse::<std::net::SocketAddr>().is_err() {
                    return Err(ConfigError::invalid_value(
                        "metrics.listen_addr",
                        format!("invalid socket address: {addr}"),
                    ));
                }
            }

            let buckets = &self.metrics.histogram_buckets;
            if buckets.is_empty() || buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ConfigError::invalid_value(
                    "metrics.histogram_buckets",
                    "must be non-empty and strictly increasing",
                ));
            }
        }

        if self.pipeline.name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "pipeline.name",
                "must not be empty",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty logs at debug level with span events and locations
    /// - No metrics recording
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_config::StratumConfig;
    ///
    /// let config = StratumConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.service.environment = "development".to_string();

        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.span_events = true;
        config.logging.include_location = true;

        config.metrics.enabled = false;
        config.pipeline.record_metrics = false;

        config
    }

    /// Create a production configuration preset.
    ///
    /// - JSON logs at info level
    /// - Metrics enabled and recorded
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_config::{LogFormat, StratumConfig};
    ///
    /// let config = StratumConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.service.environment = "production".to_string();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.span_events = false;
        config.logging.include_location = false;

        config.metrics.enabled = true;
        config.pipeline.record_metrics = true;
        config.pipeline.catch_panics = true;

        config
    }
}

/// Checks `tracing` filter directives such as `info` or
/// `stratum_middleware=debug,warn`.
fn is_valid_filter(directives: &str) -> bool {
    let directives = directives.trim();
    !directives.is_empty()
        && directives.split(',').map(str::trim).all(|directive| {
            let level = directive.rsplit_once('=').map_or(directive, |(_, level)| level);
            // A bare target (no `=`) is also a valid directive.
            LEVELS.contains(&level.to_ascii_lowercase().as_str())
                || (!directive.contains('=') && !directive.is_empty())
        })
}

/// Builder for [`StratumConfig`].
#[derive(Debug, Default)]
pub struct StratumConfigBuilder {
    service: Option<ServiceConfig>,
    logging: Option<LoggingConfig>,
    metrics: Option<MetricsConfig>,
    pipeline: Option<PipelineConfig>,
}

impl StratumConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service section.
    #[must_use]
    pub fn service(mut self, service: ServiceConfig) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the metrics section.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the pipeline section.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> StratumConfig {
        StratumConfig {
            service: self.service.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<StratumConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StratumConfig::default();
        assert_eq!(config.service.name, "stratum-service");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_sections() {
        let config = StratumConfig::builder()
            .pipeline(PipelineConfig {
                name: "orders".to_string(),
                ..Default::default()
            })
            .service(ServiceConfig {
                name: "orders-fn".to_string(),
                ..Default::default()
            })
            .build();

        assert_eq!(config.pipeline.name, "orders");
        assert_eq!(config.service.name, "orders-fn");
        // Other sections use defaults
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_log_filters() {
        for ok in ["info", "WARN", "stratum_middleware=debug,warn", "stratum"] {
            let config = StratumConfig::builder()
                .logging(LoggingConfig {
                    level: ok.to_string(),
                    ..Default::default()
                })
                .build();
            assert!(config.validate().is_ok(), "{ok} should be accepted");
        }

        let config = StratumConfig::builder()
            .logging(LoggingConfig {
                level: "stratum=loud".to_string(),
                ..Default::default()
            })
            .build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_validate_invalid_metrics_addr() {
        let config = StratumConfig::builder()
            .metrics(MetricsConfig {
                listen_addr: Some("invalid".to_string()),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.listen_addr"));
    }

    #[test]
    fn test_validate_ignores_addr_when_metrics_disabled() {
        let config = StratumConfig::builder()
            .metrics(MetricsConfig {
                enabled: false,
                listen_addr: Some("invalid".to_string()),
                ..Default::default()
            })
            .build();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unsorted_buckets() {
        let config = StratumConfig::builder()
            .metrics(MetricsConfig {
                histogram_buckets: vec![0.5, 0.1],
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("histogram_buckets"));
    }

    #[test]
    fn test_validate_empty_pipeline_name() {
        let result = StratumConfig::builder()
            .pipeline(PipelineConfig {
                name: "  ".to_string(),
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("pipeline.name"));
    }

    #[test]
    fn test_development_preset() {
        let config = StratumConfig::development();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.span_events);
        assert!(!config.pipeline.record_metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_preset() {
        let config = StratumConfig::production();
        assert_eq!(config.service.environment, "production");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.metrics.enabled);
        assert!(config.pipeline.catch_panics);
    }

    #[test]
    fn test_toml_serialization() {
        let config = StratumConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[service]"));
        assert!(toml_str.contains("[pipeline]"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let toml_str = r#"
            [pipeline]
            name = "orders"

            [server]
            http_addr = "127.0.0.1:8000"
        "#;

        let result: Result<StratumConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
