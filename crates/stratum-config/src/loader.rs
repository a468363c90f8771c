//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` files and environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{ConfigError, LogFormat, StratumConfig};

/// Where `.env` entries come from.
#[derive(Debug, Clone)]
enum DotenvSource {
    /// Read if present.
    Optional(PathBuf),
    /// Must exist.
    Required(PathBuf),
}

/// Configuration loader with layered approach.
///
/// Layers apply in order, later layers overriding earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration files and strings (TOML or JSON), merged field by field
/// 3. `.env` entries with the environment prefix
/// 4. Process environment variables with the environment prefix
///
/// # Example
///
/// ```no_run
/// use stratum_config::ConfigLoader;
///
/// # fn main() -> Result<(), stratum_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_optional_file("stratum.toml")?
///     .with_env_prefix("STRATUM")
///     .with_dotenv()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: StratumConfig,
    env_prefix: Option<String>,
    dotenv: Option<DotenvSource>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StratumConfig::default(),
            env_prefix: None,
            dotenv: None,
        }
    }

    /// Reset to default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = StratumConfig::default();
        self
    }

    /// Start from the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = StratumConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = StratumConfig::production();
        self
    }

    /// Merge a configuration file.
    ///
    /// The format is chosen by extension (`.toml` or `.json`). Only the
    /// fields present in the file override the current values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or unreadable, fails to
    /// parse, or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::unsupported_format(path.display().to_string()))?;

        self.with_string(&content, &format)
    }

    /// Merge a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merge configuration from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails, the format is not `toml` or
    /// `json`, or the content has unknown fields.
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [pipeline]
    ///     name = "orders"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.pipeline.name, "orders");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::unsupported_format(other)),
        };

        self.merge_layer(layer)?;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `STRATUM__PIPELINE__NAME=orders`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Read prefixed overrides from `./.env` if it exists.
    ///
    /// Entries in the file rank below real environment variables. The
    /// process environment is not modified.
    #[must_use]
    pub fn with_dotenv(mut self) -> Self {
        self.dotenv = Some(DotenvSource::Optional(PathBuf::from(".env")));
        self
    }

    /// Read prefixed overrides from a specific `.env` file, which must exist.
    #[must_use]
    pub fn with_dotenv_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.dotenv = Some(DotenvSource::Required(path.into()));
        self
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies `.env` and environment overrides (if a prefix was set) and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<StratumConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars = BTreeMap::new();
            if let Some(source) = self.dotenv.take() {
                vars.extend(read_dotenv(&source)?);
            }
            vars.extend(env::vars_os().filter_map(|(key, value)| {
                Some((key.into_string().ok()?, value.into_string().ok()?))
            }));
            self.apply_env_overrides(&prefix, vars)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> StratumConfig {
        self.config
    }

    // Strict-parse the layer, then overlay only the fields it sets.
    fn merge_layer(&mut self, layer: Value) -> Result<(), ConfigError> {
        let _: StratumConfig = serde_json::from_value(layer.clone())?;

        let mut merged = serde_json::to_value(&self.config)?;
        merge_values(&mut merged, layer);
        self.config = serde_json::from_value(merged)?;
        Ok(())
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        for (key, value) in vars.iter().filter(|(k, _)| k.starts_with(&marker)) {
            self.apply_env_var(key, value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Service section
            ["SERVICE", "NAME"] => config.service.name = value.to_string(),
            ["SERVICE", "VERSION"] => config.service.version = non_empty(value),
            ["SERVICE", "ENVIRONMENT"] => config.service.environment = value.to_string(),

            // Logging section
            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_bool_var(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = LogFormat::parse(value).ok_or_else(|| {
                    ConfigError::env_parse_error(key, "expected 'json', 'pretty' or 'compact'")
                })?;
            }
            ["LOGGING", "SPAN_EVENTS"] => {
                config.logging.span_events = parse_bool_var(key, value)?;
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = parse_bool_var(key, value)?;
            }

            // Metrics section
            ["METRICS", "ENABLED"] => config.metrics.enabled = parse_bool_var(key, value)?,
            ["METRICS", "LISTEN_ADDR"] => config.metrics.listen_addr = non_empty(value),
            ["METRICS", "HISTOGRAM_BUCKETS"] => {
                config.metrics.histogram_buckets = value
                    .split(',')
                    .map(|b| b.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| {
                        ConfigError::env_parse_error(key, "expected comma-separated numbers")
                    })?;
            }

            // Pipeline section
            ["PIPELINE", "NAME"] => config.pipeline.name = value.to_string(),
            ["PIPELINE", "CATCH_PANICS"] => {
                config.pipeline.catch_panics = parse_bool_var(key, value)?;
            }
            ["PIPELINE", "RECORD_METRICS"] => {
                config.pipeline.record_metrics = parse_bool_var(key, value)?;
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

fn read_dotenv(source: &DotenvSource) -> Result<Vec<(String, String)>, ConfigError> {
    let path = match source {
        DotenvSource::Optional(path) if !path.exists() => return Ok(Vec::new()),
        DotenvSource::Optional(path) => path,
        DotenvSource::Required(path) if !path.exists() => {
            return Err(ConfigError::file_not_found(path));
        }
        DotenvSource::Required(path) => path,
    };

    dotenvy::from_path_iter(path)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(ConfigError::from)
}

/// Recursively overlays `layer` onto `base`; non-object values replace.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
