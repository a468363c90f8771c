//! Typed configuration for Stratum.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → files → `.env` → env)
//!
//! # Overview
//!
//! The configuration is built around the [`StratumConfig`] struct:
//!
//! - [`ServiceConfig`] - Service identity (name, version, environment)
//! - [`LoggingConfig`] - Log filter and output format
//! - [`MetricsConfig`] - Prometheus recorder and histogram buckets
//! - [`PipelineConfig`] - Pipeline name and panic handling
//!
//! # Example
//!
//! ```no_run
//! use stratum_config::ConfigLoader;
//!
//! # fn main() -> Result<(), stratum_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("stratum.toml")?
//!     .with_env_prefix("STRATUM")
//!     .load()?;
//!
//! println!("pipeline: {}", config.pipeline.name);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [service]
//! name = "orders-fn"
//! version = "1.0.0"
//! environment = "production"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! listen_addr = "0.0.0.0:9090"
//!
//! [pipeline]
//! name = "orders"
//! catch_panics = true
//! record_metrics = true
//! ```
//!
//! # Environment Variables
//!
//! Every field can be overridden as `PREFIX__SECTION__KEY`:
//!
//! - `STRATUM__PIPELINE__NAME=orders`
//! - `STRATUM__LOGGING__FORMAT=pretty`
//! - `STRATUM__METRICS__HISTOGRAM_BUCKETS=0.01,0.1,1`

#![doc(html_root_url = "https://docs.rs/stratum-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{StratumConfig, StratumConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LogFormat, LoggingConfig, MetricsConfig, PipelineConfig, ServiceConfig};
