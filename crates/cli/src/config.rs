//! `CliConfig`: the TOML configuration file.
//!
//! ```toml
//! [logging]
//! format = "json"        # or "pretty"
//! filter = "info"
//!
//! [telemetry]
//! otlp_endpoint = "http://localhost:4317"
//!
//! [node]
//! auto_optimize = true
//! gpu_detection = true
//!
//! [resources]
//! simulate_available_memory_gib = 2.0
//! ```
//!
//! Every section and key is optional. A missing file yields the defaults.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Config file consulted when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".act/pointcloud.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint. Span export is disabled when unset.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub auto_optimize: bool,
    /// Query `nvidia-smi` for a GPU once at startup.
    pub gpu_detection: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            auto_optimize: true,
            gpu_detection: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Replaces the live probe with a fixed snapshot reporting this much
    /// available memory.
    pub simulate_available_memory_gib: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
    pub node: NodeConfig,
    pub resources: ResourcesConfig,
}

impl CliConfig {
    /// Loads `explicit`, or [`DEFAULT_CONFIG_PATH`] when present, or the defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(gib) = self.resources.simulate_available_memory_gib {
            if !(gib.is_finite() && gib > 0.0) {
                bail!("resources.simulate_available_memory_gib must be a positive number, got {gib}");
            }
        }
        if let Some(endpoint) = &self.telemetry.otlp_endpoint {
            if endpoint.trim().is_empty() {
                bail!("telemetry.otlp_endpoint must not be empty");
            }
        }
        Ok(())
    }
}
