//! The agent's main scheduling loop.
//!
//! Each tick fetches the run configuration from the config service, resolves
//! the plugin registry, and fans out one concurrent invocation per
//! (plugin, instance) pair. Tasks are not awaited: a slow plugin may overlap
//! its own next scheduled invocation, but never survives longer than one
//! polling interval thanks to the runner's deadline. The loop itself never
//! exits; every failure degrades to skipping a plugin or a tick.

use once_cell::sync::Lazy;
use tracing::{debug, error, info};

use crate::api::{Instance, RunConfiguration};
use crate::registry;
use crate::runner;
use crate::state::SharedState;

/// The single unnamed instance used when a plugin has none configured.
static DEFAULT_INSTANCES: Lazy<Vec<Instance>> = Lazy::new(|| vec![Instance::default()]);

/// Drives the periodic plugin execution.
pub struct Scheduler {
    state: SharedState,
}

impl Scheduler {
    pub fn new(state: SharedState) -> Self {
        Scheduler { state }
    }

    /// Runs the tick loop forever.
    pub async fn run(&self) {
        info!(
            "Scheduler started, polling every {:?}",
            self.state.config.poll_interval()
        );

        let mut last_config: Option<RunConfiguration> = None;
        loop {
            self.tick(&mut last_config).await;
            tokio::time::sleep(self.state.config.poll_interval()).await;
        }
    }

    /// One scheduling pass.
    ///
    /// On a config fetch failure the last successfully fetched configuration
    /// is reused; with none available yet the tick is skipped entirely.
    pub async fn tick(&self, last_config: &mut Option<RunConfiguration>) {
        let config = match self.state.config_client.get_plugins_to_run().await {
            Ok(config) => {
                *last_config = Some(config.clone());
                config
            }
            Err(e) => {
                error!("Error while getting configuration from backend: {}", e);
                match last_config {
                    Some(previous) => previous.clone(),
                    None => return,
                }
            }
        };

        debug!("Iterating through {} plugins", config.plugins.len());

        let plugins =
            registry::sync_and_resolve(self.state.config_client.as_ref(), &self.state.config)
                .await;

        for (name, instances) in &config.plugins {
            let Some(plugin) = plugins.get(name) else {
                error!("Cannot find plugin '{}' in the registry, skipping", name);
                continue;
            };

            let instances = if instances.is_empty() {
                &*DEFAULT_INSTANCES
            } else {
                instances
            };

            for instance in instances {
                let state = self.state.clone();
                let plugin = plugin.clone();
                let instance = instance.clone();
                tokio::spawn(async move {
                    run_check(state, plugin, instance).await;
                });
            }
        }
    }
}

/// Runs one plugin instance end to end: execute, parse, report.
///
/// A failed cycle (spawn error, timeout, signal, parse error) is logged and
/// produces neither a metric report nor a rate tracker update.
async fn run_check(
    state: SharedState,
    plugin: crate::registry::PluginMetadata,
    instance: Instance,
) {
    let deadline = state.config.poll_interval();
    match runner::run(&plugin, &instance, deadline).await {
        Ok(output) => {
            debug!("Parsed output of plugin '{}': {:?}", plugin.name, output);
            state.reporter.report(&plugin, &instance, &output);
        }
        Err(e) => {
            error!("Plugin '{}' failed this cycle: {}", plugin.name, e);
        }
    }
}
