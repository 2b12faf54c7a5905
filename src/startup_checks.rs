//! Startup requirement validation for vigil-agent.
//!
//! This module validates the agent's environment before the loops start:
//! plugin directories, hostname resolution, and a first registry scan.
//! Soft problems are warnings — a missing bundled directory just means no
//! bundle has been installed yet.

use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::registry;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("hostname cannot be determined and none is configured")]
    NoHostname,

    #[error("custom plugins directory '{0}' exists but is not a directory")]
    CustomDirNotADirectory(String),
}

/// Validates the environment the agent is about to run in.
pub fn validate_environment(config: &Config) -> Result<(), ValidationError> {
    let hostname = config.hostname();
    if hostname.is_empty() || hostname == "unknown" {
        if config.hostname.is_none() {
            return Err(ValidationError::NoHostname);
        }
    }
    info!("Reporting as host '{}'", hostname);

    let plugins_dir = config.plugins_dir();
    if !plugins_dir.exists() {
        warn!(
            "Bundled plugins directory '{}' does not exist yet - waiting for the first bundle install",
            plugins_dir.display()
        );
    } else {
        match registry::installed_version(&plugins_dir) {
            Some(version) => info!("Installed plugin bundle version: {}", version),
            None => warn!(
                "No version marker in '{}' - bundle sync will install one",
                plugins_dir.display()
            ),
        }
    }

    let custom_dir = config.custom_plugins_dir();
    check_custom_dir(&custom_dir)?;

    Ok(())
}

fn check_custom_dir(custom_dir: &Path) -> Result<(), ValidationError> {
    if !custom_dir.exists() {
        warn!(
            "Custom plugins directory '{}' does not exist - only bundled plugins will run",
            custom_dir.display()
        );
        return Ok(());
    }
    if !custom_dir.is_dir() {
        return Err(ValidationError::CustomDirNotADirectory(
            custom_dir.display().to_string(),
        ));
    }

    let custom = registry::scan_dir(custom_dir, true);
    info!(
        "Found {} custom plugin(s) in '{}'",
        custom.len(),
        custom_dir.display()
    );
    Ok(())
}
