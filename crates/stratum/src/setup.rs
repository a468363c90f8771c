//! Glue between configuration and the runtime pieces it drives.

use crate::StratumError;
use stratum_config::{ConfigLoader, LogFormat, StratumConfig};
use stratum_core::Handler;
use stratum_middleware::{Pipeline, PipelineOptions};
use stratum_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

/// File read by [`bootstrap`] when present.
pub const CONFIG_FILE: &str = "stratum.toml";

/// Converts the `[pipeline]` section into executor options.
#[must_use]
pub fn pipeline_options(config: &StratumConfig) -> PipelineOptions {
    PipelineOptions::named(config.pipeline.name.clone())
        .catch_panics(config.pipeline.catch_panics)
        .record_metrics(config.pipeline.record_metrics && config.metrics.enabled)
}

/// Converts the service, logging and metrics sections into telemetry
/// settings.
#[must_use]
pub fn telemetry_config(config: &StratumConfig) -> TelemetryConfig {
    let format = match config.logging.format {
        LogFormat::Json => stratum_telemetry::LogFormat::Json,
        LogFormat::Pretty => stratum_telemetry::LogFormat::Pretty,
        LogFormat::Compact => stratum_telemetry::LogFormat::Compact,
    };

    let logging = LogConfig {
        enabled: config.logging.enabled,
        level: config.logging.level.clone(),
        format,
        span_events: config.logging.span_events,
        file_line_info: config.logging.include_location,
        ..LogConfig::default()
    };

    let metrics = MetricsConfig {
        enabled: config.metrics.enabled,
        listen_addr: config.metrics.listen_addr.clone(),
        duration_buckets: config.metrics.histogram_buckets.clone(),
    };

    TelemetryConfig::builder()
        .service_name(&config.service.name)
        .environment(&config.service.environment)
        .logging(logging)
        .metrics(metrics)
        .build()
}

/// Wraps `handler` in a pipeline configured from `config`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stratum::{pipeline, StratumConfig};
/// use stratum::core::{sync_handler, InvocationMetadata};
///
/// let mut config = StratumConfig::default();
/// config.pipeline.name = "orders".to_string();
///
/// let orders = pipeline(sync_handler(|event, _| Ok(event)), &config);
/// assert_eq!(orders.options().name, "orders");
/// ```
#[must_use]
pub fn pipeline<H: Handler>(handler: H, config: &StratumConfig) -> Pipeline {
    Pipeline::wrap(handler).with_options(pipeline_options(config))
}

/// Validates `config` and starts logging and metrics.
///
/// Call once per process, before the first invocation. Starting a metrics
/// listener requires a running tokio runtime.
///
/// # Errors
///
/// Returns [`StratumError`] if validation or telemetry setup fails.
pub fn init(config: &StratumConfig) -> Result<(), StratumError> {
    config.validate()?;
    stratum_telemetry::init_telemetry(&telemetry_config(config))?;
    tracing::info!(
        service = %config.service.name,
        pipeline = %config.pipeline.name,
        "stratum initialized"
    );
    Ok(())
}

/// Loads configuration from [`CONFIG_FILE`], `.env` and `{env_prefix}__*`
/// variables on top of the production preset, then calls [`init`].
///
/// # Errors
///
/// Returns [`StratumError`] if loading, validation or telemetry setup fails.
pub fn bootstrap(env_prefix: &str) -> Result<StratumConfig, StratumError> {
    let config = ConfigLoader::new()
        .with_production()
        .with_optional_file(CONFIG_FILE)?
        .with_env_prefix(env_prefix)
        .with_dotenv()
        .load()?;
    init(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_config::{LoggingConfig, MetricsConfig as MetricsSection, PipelineConfig};

    #[test]
    fn test_pipeline_options_from_config() {
        let config = StratumConfig::builder()
            .pipeline(PipelineConfig {
                name: "orders".to_string(),
                catch_panics: false,
                record_metrics: true,
            })
            .build();

        let options = pipeline_options(&config);
        assert_eq!(options.name, "orders");
        assert!(!options.catch_panics);
        assert!(options.record_metrics);
    }

    #[test]
    fn test_metrics_disabled_disables_recording() {
        let config = StratumConfig::builder()
            .metrics(MetricsSection {
                enabled: false,
                ..Default::default()
            })
            .build();

        assert!(!pipeline_options(&config).record_metrics);
    }

    #[test]
    fn test_telemetry_config_mapping() {
        let mut config = StratumConfig::development();
        config.service.name = "orders-fn".to_string();
        config.metrics.listen_addr = Some("127.0.0.1:9100".to_string());

        let telemetry = telemetry_config(&config);
        assert_eq!(telemetry.service_name, "orders-fn");
        assert_eq!(telemetry.logging.service_name, "orders-fn");
        assert_eq!(telemetry.logging.level, "debug");
        assert_eq!(telemetry.logging.format, stratum_telemetry::LogFormat::Pretty);
        assert!(telemetry.logging.file_line_info);
        assert_eq!(telemetry.metrics.listen_addr.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(
            telemetry.metrics.duration_buckets,
            config.metrics.histogram_buckets
        );
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = StratumConfig::builder()
            .logging(LoggingConfig {
                level: "stratum=loud".to_string(),
                ..Default::default()
            })
            .build();

        assert!(matches!(init(&config), Err(StratumError::Config(_))));
    }

    #[test]
    fn test_init_with_everything_disabled() {
        let mut config = StratumConfig::default();
        config.logging.enabled = false;
        config.metrics.enabled = false;

        assert!(init(&config).is_ok());
    }
}
