//! Application state management for the agent.
//!
//! This module defines the shared state passed to the scheduler and
//! inventory loops: configuration, the config-service client, the rate
//! tracker and the reporter feeding the delivery queue.

use std::sync::Arc;

use crate::api::ConfigClient;
use crate::config::Config;
use crate::rates::RateTracker;
use crate::reporter::Reporter;

/// Type alias for shared application state.
pub type SharedState = Arc<AgentState>;

/// Global agent state shared across the long-lived loops.
pub struct AgentState {
    pub config: Arc<Config>,
    /// Config-service collaborator.
    pub config_client: Arc<dyn ConfigClient>,
    /// Per-key two-sample rate window.
    pub tracker: Arc<RateTracker>,
    /// Builds point batches and enqueues them for delivery.
    pub reporter: Reporter,
}
