//! Plugin discovery.
//!
//! Scans the bundled and custom plugin directories and resolves plugin
//! names to their metadata. Each plugin is a subdirectory holding an
//! executable named `status` and an `info.yml` descriptor declaring the
//! output format and the rate-eligible metric name patterns. Custom plugins
//! are merged last and override same-named bundled plugins entirely.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::api::ConfigClient;
use crate::config::Config;
use crate::parser::OutputFormat;

/// Name of the descriptor file inside a plugin directory.
pub const DESCRIPTOR_FILE: &str = "info.yml";

/// Name of the check executable inside a plugin directory.
pub const STATUS_EXECUTABLE: &str = "status";

/// Name of the optional host-probe executable inside a plugin directory.
pub const SHOULD_MONITOR_EXECUTABLE: &str = "should_monitor";

/// Name of the marker file recording the installed bundle version.
pub const VERSION_MARKER_FILE: &str = "version";

/// On-disk descriptor (`info.yml`) for one plugin.
///
/// Unknown `output` values fail deserialization here, so a misconfigured
/// format is rejected at resolution time rather than at parse time.
#[derive(Debug, Deserialize)]
struct PluginDescriptor {
    output: OutputFormat,
    #[serde(default)]
    calculate_rates: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Identity and execution contract for one discoverable plugin.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    /// Unique name, derived from the directory name.
    pub name: String,
    /// Plugin directory holding `status` and `info.yml`.
    pub path: PathBuf,
    pub output: OutputFormat,
    /// Compiled patterns naming which metrics also produce a `.rate` point.
    pub rate_patterns: Vec<Regex>,
    /// Custom plugins override bundled ones of the same name.
    pub is_custom: bool,
}

impl PluginMetadata {
    /// Path of the check executable.
    pub fn status_path(&self) -> PathBuf {
        self.path.join(STATUS_EXECUTABLE)
    }

    /// Path of the host-probe executable.
    pub fn should_monitor_path(&self) -> PathBuf {
        self.path.join(SHOULD_MONITOR_EXECUTABLE)
    }

    /// Whether `name` matches any of the rate-eligible patterns.
    pub fn is_rate_eligible(&self, metric_name: &str) -> bool {
        self.rate_patterns
            .iter()
            .any(|pattern| pattern.is_match(metric_name))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read descriptor {path}: {source}")]
    DescriptorRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("cannot parse descriptor {path}: {source}")]
    DescriptorParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Reads the installed bundle version from the marker file, if present.
pub fn installed_version(plugins_root: &Path) -> Option<String> {
    match fs::read_to_string(plugins_root.join(VERSION_MARKER_FILE)) {
        Ok(version) => {
            let version = version.trim().to_string();
            if version.is_empty() {
                None
            } else {
                Some(version)
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(
                "Cannot read version marker in {}: {}",
                plugins_root.display(),
                e
            );
            None
        }
    }
}

/// Loads one plugin directory into metadata.
///
/// Invalid rate patterns are logged and dropped; the plugin itself is kept.
fn load_plugin(dir: &Path, is_custom: bool) -> Result<PluginMetadata, RegistryError> {
    let descriptor_path = dir.join(DESCRIPTOR_FILE);
    let content = fs::read_to_string(&descriptor_path).map_err(|source| {
        RegistryError::DescriptorRead {
            path: descriptor_path.clone(),
            source,
        }
    })?;

    let descriptor: PluginDescriptor =
        serde_yaml::from_str(&content).map_err(|source| RegistryError::DescriptorParse {
            path: descriptor_path,
            source,
        })?;

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut rate_patterns = Vec::with_capacity(descriptor.calculate_rates.len());
    for pattern in &descriptor.calculate_rates {
        match Regex::new(pattern) {
            Ok(regex) => rate_patterns.push(regex),
            Err(e) => error!(
                "Invalid rate pattern '{}' for plugin '{}': {}",
                pattern, name, e
            ),
        }
    }

    Ok(PluginMetadata {
        name,
        path: dir.to_path_buf(),
        output: descriptor.output,
        rate_patterns,
        is_custom,
    })
}

/// Reads a plugin's descriptor description, for inventory upload.
pub fn plugin_description(plugin: &PluginMetadata) -> Option<String> {
    let content = fs::read_to_string(plugin.path.join(DESCRIPTOR_FILE)).ok()?;
    let descriptor: PluginDescriptor = serde_yaml::from_str(&content).ok()?;
    descriptor.description
}

/// Scans one plugin directory tree.
///
/// Subdirectories that fail to parse are logged and skipped; they never
/// abort the scan. A missing or unreadable root yields an empty map.
pub fn scan_dir(dir: &Path, is_custom: bool) -> HashMap<String, PluginMetadata> {
    let mut plugins = HashMap::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                error!("Cannot list directory '{}': {}", dir.display(), e);
            }
            return plugins;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            debug!("'{}' isn't a directory, skipping", path.display());
            continue;
        }

        match load_plugin(&path, is_custom) {
            Ok(plugin) => {
                plugins.insert(plugin.name.clone(), plugin);
            }
            Err(e) => {
                error!("Cannot parse plugin directory '{}': {}", path.display(), e);
            }
        }
    }

    plugins
}

/// Resolves the merged plugin registry from explicit directories.
///
/// Custom plugins take precedence: a custom plugin replaces a bundled
/// plugin of the same name entirely, not field-by-field.
pub fn resolve(bundled_dir: &Path, custom_dir: &Path) -> HashMap<String, PluginMetadata> {
    let mut plugins = scan_dir(bundled_dir, false);
    for (name, plugin) in scan_dir(custom_dir, true) {
        plugins.insert(name, plugin);
    }
    plugins
}

/// Syncs the bundle version with the config service and resolves the registry.
///
/// The bundled directory is versioned: plugins live under
/// `<plugins_dir>/<version>/`. When the latest published version differs
/// from the installed marker, the installation collaborator is asked to
/// install it. If the service is unreachable the locally installed version
/// is used; with neither available only custom plugins are resolved.
pub async fn sync_and_resolve(
    client: &dyn ConfigClient,
    config: &Config,
) -> HashMap<String, PluginMetadata> {
    let plugins_root = config.plugins_dir();
    let installed = installed_version(&plugins_root);

    let version = match client.get_current_plugins_version().await {
        Ok(latest) => {
            if installed.as_deref() != Some(latest.as_str()) {
                debug!(
                    "Installed plugin bundle {:?} is behind latest '{}', requesting install",
                    installed, latest
                );
                if let Err(e) = client.install_plugin(&latest).await {
                    error!("Cannot install plugin bundle '{}': {}", latest, e);
                }
            }
            Some(latest)
        }
        Err(e) => {
            error!("Cannot fetch current plugins version: {}", e);
            installed
        }
    };

    let bundled_dir = match version {
        Some(version) => plugins_root.join(version),
        None => {
            warn!(
                "No plugin bundle version known, scanning custom plugins only ({})",
                config.custom_plugins_dir().display()
            );
            plugins_root.join("unversioned")
        }
    };

    resolve(&bundled_dir, &config.custom_plugins_dir())
}
