//! Metric reporting.
//!
//! Turns one parsed plugin invocation into a batch of dimensioned points:
//! a status point, the parsed metrics (or forwarded errplane points), and a
//! `.rate` point for every rate the tracker computed. Statuses are written
//! to `plugins.<name>.status` with a value of 1 and a status dimension;
//! other metrics go to `plugins.<name>.<metric>` with the given value. All
//! points carry the host name as a dimension.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::api::Instance;
use crate::parser::PluginOutput;
use crate::rates::{RateSample, RateTracker};
use crate::registry::PluginMetadata;
use crate::transport::{Dimensions, PointWrite, WriteOperation};

/// Builds point batches and hands them to the delivery queue.
pub struct Reporter {
    hostname: String,
    tracker: Arc<RateTracker>,
    delivery: mpsc::Sender<WriteOperation>,
}

impl Reporter {
    pub fn new(
        hostname: String,
        tracker: Arc<RateTracker>,
        delivery: mpsc::Sender<WriteOperation>,
    ) -> Self {
        Reporter {
            hostname,
            tracker,
            delivery,
        }
    }

    /// Reports one successful invocation.
    ///
    /// Updates the rate tracker for this (plugin, instance) key and enqueues
    /// the whole batch for delivery. Never blocks and never fails the caller:
    /// a full delivery queue drops the batch with an error log.
    pub fn report(&self, plugin: &PluginMetadata, instance: &Instance, output: &PluginOutput) {
        let batch = self.build_batch(plugin, instance, output);
        if batch.writes.is_empty() {
            return;
        }

        if let Err(e) = self.delivery.try_send(batch) {
            error!(
                "Cannot enqueue metrics for plugin '{}': {}",
                plugin.name, e
            );
        }
    }

    /// Builds the full point batch for one invocation.
    pub fn build_batch(
        &self,
        plugin: &PluginMetadata,
        instance: &Instance,
        output: &PluginOutput,
    ) -> WriteOperation {
        let timestamp = output.timestamp.timestamp();

        let mut status_dimensions: Dimensions = HashMap::from([
            ("host".to_string(), self.hostname.clone()),
            ("status".to_string(), output.state.to_string()),
            ("status_msg".to_string(), output.message.clone()),
        ]);
        if !instance.name.is_empty() {
            status_dimensions.insert("instance".to_string(), instance.name.clone());
        }

        let mut writes = vec![PointWrite::single(
            format!("plugins.{}.status", plugin.name),
            1.0,
            timestamp,
            status_dimensions.clone(),
        )];

        // current values of the rate-eligible metrics, keyed by the
        // unprefixed metric name
        let mut current_values: HashMap<String, f64> = HashMap::new();

        if let Some(points) = &output.points {
            for write in points {
                if plugin.is_rate_eligible(&write.name) {
                    if let Some(first) = write.points.first() {
                        current_values.insert(write.name.clone(), first.value);
                    }
                }

                let mut forwarded = write.clone();
                forwarded.name = format!("plugins.{}.{}", plugin.name, write.name);
                if !instance.name.is_empty() {
                    for point in &mut forwarded.points {
                        point
                            .dimensions
                            .insert("instance".to_string(), instance.name.clone());
                    }
                }
                writes.push(forwarded);
            }
        }

        if let Some(metrics) = &output.metrics {
            let mut metric_dimensions: Dimensions =
                HashMap::from([("host".to_string(), self.hostname.clone())]);
            if !instance.name.is_empty() {
                metric_dimensions.insert("instance".to_string(), instance.name.clone());
            }

            for (name, value) in metrics {
                if plugin.is_rate_eligible(name) {
                    current_values.insert(name.clone(), *value);
                }

                writes.push(PointWrite::single(
                    format!("plugins.{}.{}", plugin.name, name),
                    *value,
                    timestamp,
                    metric_dimensions.clone(),
                ));
            }
        }

        debug!(
            "Plugin '{}' rate candidates: {:?}",
            plugin.name, current_values
        );

        let key = RateTracker::key(&plugin.name, &instance.name);
        let rates = self.tracker.update(
            &key,
            RateSample {
                timestamp: output.timestamp,
                values: current_values,
            },
        );

        // rate points carry the same dimension set as the status point
        for (name, rate) in rates {
            writes.push(PointWrite::single(
                format!("plugins.{}.{}.rate", plugin.name, name),
                rate,
                timestamp,
                status_dimensions.clone(),
            ));
        }

        WriteOperation { writes }
    }
}
