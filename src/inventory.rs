//! Plugin inventory reporting.
//!
//! A second long-lived loop, slower than the scheduler: it uploads the set
//! of plugins present on this host to the config service, and probes which
//! discovered-but-unconfigured plugins could usefully run here by executing
//! their `should_monitor` program. Probe exit 0 means the software the
//! plugin monitors is installed on this server.

use chrono::Utc;
use tracing::{debug, error, info};

use crate::api::{AgentStatus, CustomPluginInfo, PluginInformation};
use crate::registry;
use crate::runner;
use crate::state::SharedState;

/// Runs the inventory loop forever.
pub async fn run(state: SharedState) {
    info!(
        "Checking for new plugins and for potentially useful plugins every {:?}",
        state.config.inventory_interval()
    );

    loop {
        cycle(&state).await;
        tokio::time::sleep(state.config.inventory_interval()).await;
    }
}

/// One inventory pass. Every failure is logged and the pass continues.
async fn cycle(state: &SharedState) {
    let plugins =
        registry::sync_and_resolve(state.config_client.as_ref(), &state.config).await;

    let mut info = PluginInformation::default();
    for plugin in plugins.values() {
        if !plugin.is_custom {
            info.running_plugins.push(plugin.name.clone());
            continue;
        }
        info.custom_plugins.push(CustomPluginInfo {
            name: plugin.name.clone(),
            description: registry::plugin_description(plugin),
        });
    }
    info.running_plugins.sort();

    if let Err(e) = state.config_client.send_plugin_information(&info).await {
        error!("Cannot send custom plugins information: {}", e);
    }

    // probe only the plugins that aren't already configured to run; if the
    // run configuration is unavailable, probe everything
    let configured = match state.config_client.get_plugins_to_run().await {
        Ok(config) => config.plugins.keys().cloned().collect::<Vec<_>>(),
        Err(e) => {
            debug!("Cannot fetch run configuration for inventory: {}", e);
            Vec::new()
        }
    };

    let mut available_plugins = Vec::new();
    for plugin in plugins.values() {
        if configured.contains(&plugin.name) {
            continue;
        }

        debug!(
            "Checking whether plugin {} needs to be installed on this server or not",
            plugin.name
        );
        if runner::probe_should_monitor(plugin, state.config.poll_interval()).await {
            debug!("Plugin {} should be installed on this server", plugin.name);
            available_plugins.push(plugin.name.clone());
        }
    }
    available_plugins.sort();

    let status = AgentStatus {
        available_plugins,
        timestamp: Utc::now().timestamp(),
    };
    if let Err(e) = state.config_client.send_plugin_status(&status).await {
        error!("Cannot send plugin status: {}", e);
    }
}
