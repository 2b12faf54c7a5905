//! Configuration management for vigil-agent.
//!
//! This module handles loading, merging, and validating configuration from
//! files and CLI arguments. It supports YAML, JSON, and TOML formats.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_INVENTORY_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PLUGINS_DIR: &str = "/var/lib/vigil-agent/plugins";
pub const DEFAULT_CUSTOM_PLUGINS_DIR: &str = "/var/lib/vigil-agent/custom-plugins";
pub const DEFAULT_CONFIG_SERVICE_URL: &str = "http://localhost:8086/api/v1";
pub const DEFAULT_INGEST_URL: &str = "http://localhost:8086/api/v1/points";

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host name attached as a dimension to every point; defaults to the
    /// system hostname.
    pub hostname: Option<String>,

    // Scheduling
    /// Seconds between scheduler ticks; also the per-invocation deadline.
    #[serde(alias = "poll-interval-secs")]
    pub poll_interval_secs: Option<u64>,
    /// Seconds between plugin inventory uploads.
    #[serde(alias = "inventory-interval-secs")]
    pub inventory_interval_secs: Option<u64>,

    // Plugin directories
    #[serde(alias = "plugins-dir")]
    pub plugins_dir: Option<PathBuf>,
    #[serde(alias = "custom-plugins-dir")]
    pub custom_plugins_dir: Option<PathBuf>,

    // Collaborator endpoints
    #[serde(alias = "config-service-url")]
    pub config_service_url: Option<String>,
    #[serde(alias = "ingest-url")]
    pub ingest_url: Option<String>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: None,
            poll_interval_secs: Some(DEFAULT_POLL_INTERVAL_SECS),
            inventory_interval_secs: Some(DEFAULT_INVENTORY_INTERVAL_SECS),
            plugins_dir: Some(PathBuf::from(DEFAULT_PLUGINS_DIR)),
            custom_plugins_dir: Some(PathBuf::from(DEFAULT_CUSTOM_PLUGINS_DIR)),
            config_service_url: Some(DEFAULT_CONFIG_SERVICE_URL.to_string()),
            ingest_url: Some(DEFAULT_INGEST_URL.to_string()),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    /// Effective polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }

    /// Effective inventory interval.
    pub fn inventory_interval(&self) -> Duration {
        Duration::from_secs(
            self.inventory_interval_secs
                .unwrap_or(DEFAULT_INVENTORY_INTERVAL_SECS),
        )
    }

    /// Effective bundled-plugins root directory.
    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGINS_DIR))
    }

    /// Effective custom-plugins directory.
    pub fn custom_plugins_dir(&self) -> PathBuf {
        self.custom_plugins_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CUSTOM_PLUGINS_DIR))
    }

    /// Effective config-service base URL.
    pub fn config_service_url(&self) -> String {
        self.config_service_url
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_SERVICE_URL.to_string())
    }

    /// Effective metrics ingest URL.
    pub fn ingest_url(&self) -> String {
        self.ingest_url
            .clone()
            .unwrap_or_else(|| DEFAULT_INGEST_URL.to_string())
    }

    /// Effective hostname, falling back to the system hostname.
    pub fn hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.poll_interval_secs == Some(0) {
        return Err("poll_interval_secs must be greater than zero".into());
    }
    if cfg.inventory_interval_secs == Some(0) {
        return Err("inventory_interval_secs must be greater than zero".into());
    }

    if cfg.config_service_url().is_empty() {
        return Err("config_service_url must not be empty".into());
    }
    if cfg.ingest_url().is_empty() {
        return Err("ingest_url must not be empty".into());
    }

    let plugins_dir = cfg.plugins_dir();
    let custom_dir = cfg.custom_plugins_dir();
    if plugins_dir == custom_dir {
        return Err(format!(
            "plugins_dir and custom_plugins_dir must differ (both are '{}')",
            plugins_dir.display()
        )
        .into());
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if let Some(hostname) = &args.hostname {
        config.hostname = Some(hostname.clone());
    }

    if let Some(interval) = args.interval {
        config.poll_interval_secs = Some(interval);
    }
    if let Some(interval) = args.inventory_interval {
        config.inventory_interval_secs = Some(interval);
    }

    if let Some(plugins_dir) = &args.plugins_dir {
        config.plugins_dir = Some(plugins_dir.clone());
    }
    if let Some(custom_dir) = &args.custom_plugins_dir {
        config.custom_plugins_dir = Some(custom_dir.clone());
    }

    if let Some(url) = &args.config_service_url {
        config.config_service_url = Some(url.clone());
    }
    if let Some(url) = &args.ingest_url {
        config.ingest_url = Some(url.clone());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/vigil-agent/agent.yaml",
            "/etc/vigil-agent/agent.yml",
            "/etc/vigil-agent/agent.json",
            "./vigil-agent.yaml",
            "./vigil-agent.yml",
            "./vigil-agent.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
