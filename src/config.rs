//! Configuration management for the lesion classification service

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Execution target for model sessions
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA execution provider; ONNX Runtime falls back to CPU if unavailable
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

/// What a request does when one model's forward pass fails
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the failing model and aggregate the rest
    #[default]
    Partial,
    /// Abort the request on the first failing model
    FailFast,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Overridden by `PORT`
    pub port: u16,
    /// Largest accepted upload
    pub max_upload_bytes: usize,
    /// Timeout around the whole per-request pipeline
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 5 * 1024 * 1024,
            request_timeout_ms: 30_000,
        }
    }
}

/// ML models configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files, overridden by `MODELS_DIR`
    pub models_dir: String,
    /// Number of threads for ONNX inference per model
    pub onnx_threads: usize,
    pub device: Device,
    pub failure_policy: FailurePolicy,
    /// Evaluate models concurrently instead of one after another
    pub parallel: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: "./models".to_string(),
            onnx_threads: 1,
            device: Device::Cpu,
            failure_policy: FailurePolicy::Partial,
            parallel: false,
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `CONFIG_PATH` or the default file, then the
    /// environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path; a missing file means defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(
            path,
            std::env::var("MODELS_DIR").ok(),
            std::env::var("PORT").ok(),
        )
    }

    fn load_with_env<P: AsRef<Path>>(
        path: P,
        models_dir: Option<String>,
        port: Option<String>,
    ) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .set_override_option("models.models_dir", models_dir)
            .context("Invalid MODELS_DIR")?
            .set_override_option("server.port", port)
            .context("Invalid PORT")?
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Socket address string for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
