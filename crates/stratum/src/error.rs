//! Errors raised while bootstrapping a function.

use stratum_config::ConfigError;
use stratum_telemetry::TelemetryError;
use thiserror::Error;

/// Failure to load configuration or start telemetry.
#[derive(Error, Debug)]
pub enum StratumError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}
