//! Config-service collaborator.
//!
//! The config service tells the agent which plugins to run (and with which
//! instances), tracks the current plugin bundle version, and receives the
//! agent's plugin inventory. This module defines the client interface and
//! the HTTP implementation; every call failure is recoverable by design.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One configured invocation of a plugin.
///
/// An empty `name` is the unnamed default instance. `args_list` entries are
/// passed through verbatim; `args` entries are expanded to `--key value`
/// pairs, order not significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args_list: Vec<String>,
    #[serde(default)]
    pub args: HashMap<String, String>,
}

/// The set of plugins the agent should run, keyed by plugin name.
///
/// A plugin mapped to an empty instance list runs exactly once with the
/// unnamed default instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    #[serde(default)]
    pub plugins: HashMap<String, Vec<Instance>>,
}

/// Descriptor summary of one custom plugin, uploaded to the config service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomPluginInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Inventory of the plugins present on this host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginInformation {
    pub running_plugins: Vec<String>,
    pub custom_plugins: Vec<CustomPluginInfo>,
}

/// The plugins whose `should_monitor` probe succeeded on this host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub available_plugins: Vec<String>,
    pub timestamp: i64,
}

/// Client interface to the config service.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Fetches the plugins (and instances) this agent should run.
    async fn get_plugins_to_run(&self) -> anyhow::Result<RunConfiguration>;

    /// Fetches the latest published plugin bundle version.
    async fn get_current_plugins_version(&self) -> anyhow::Result<String>;

    /// Asks the installation collaborator to install a bundle version.
    async fn install_plugin(&self, version: &str) -> anyhow::Result<()>;

    /// Uploads the plugin inventory for this host.
    async fn send_plugin_information(&self, info: &PluginInformation) -> anyhow::Result<()>;

    /// Uploads the available-plugin probe results for this host.
    async fn send_plugin_status(&self, status: &AgentStatus) -> anyhow::Result<()>;
}

/// HTTP implementation of [`ConfigClient`].
pub struct HttpConfigClient {
    client: reqwest::Client,
    base_url: String,
    hostname: String,
}

impl HttpConfigClient {
    pub fn new(base_url: String, hostname: String) -> Self {
        HttpConfigClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            hostname,
        }
    }

    fn agent_url(&self, suffix: &str) -> String {
        format!("{}/agents/{}/{}", self.base_url, self.hostname, suffix)
    }
}

#[async_trait]
impl ConfigClient for HttpConfigClient {
    async fn get_plugins_to_run(&self) -> anyhow::Result<RunConfiguration> {
        let config = self
            .client
            .get(self.agent_url("plugins"))
            .send()
            .await?
            .error_for_status()?
            .json::<RunConfiguration>()
            .await?;
        Ok(config)
    }

    async fn get_current_plugins_version(&self) -> anyhow::Result<String> {
        let version = self
            .client
            .get(format!("{}/plugins/version", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(version.trim().to_string())
    }

    async fn install_plugin(&self, version: &str) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/plugins/install", self.base_url))
            .json(&serde_json::json!({ "version": version }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_plugin_information(&self, info: &PluginInformation) -> anyhow::Result<()> {
        self.client
            .post(self.agent_url("plugins/info"))
            .json(info)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_plugin_status(&self, status: &AgentStatus) -> anyhow::Result<()> {
        self.client
            .post(self.agent_url("plugins/status"))
            .json(status)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
