//! Rate-of-change tracking.
//!
//! Keeps the last metric sample per `<plugin>/<instance>` key and computes
//! per-second deltas between consecutive samples. This is a two-sample
//! window: no history beyond the immediately preceding sample is retained.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// One observed sample: capture time plus the rate-eligible metric values.
#[derive(Debug, Clone)]
pub struct RateSample {
    pub timestamp: DateTime<Utc>,
    pub values: HashMap<String, f64>,
}

/// Keyed store of the previous sample per (plugin, instance).
///
/// Entries are retained until overwritten by the next cycle's sample.
/// Updates for one key are serialized by the map shard lock; different keys
/// update concurrently without interference.
#[derive(Debug, Default)]
pub struct RateTracker {
    samples: DashMap<String, RateSample>,
}

impl RateTracker {
    pub fn new() -> Self {
        RateTracker {
            samples: DashMap::new(),
        }
    }

    /// Cache key for one plugin instance.
    pub fn key(plugin_name: &str, instance_name: &str) -> String {
        format!("{}/{}", plugin_name, instance_name)
    }

    /// Records `current` under `key` and returns the per-second rates.
    ///
    /// The first observation for a key establishes the baseline and returns
    /// no rates. Afterwards, for every metric present in both the previous
    /// and current sample, the rate is `(current - previous) / elapsed`
    /// seconds; metrics present on only one side are skipped. The stored
    /// sample is replaced unconditionally. A non-positive elapsed time
    /// yields no rates for the cycle.
    pub fn update(&self, key: &str, current: RateSample) -> HashMap<String, f64> {
        match self.samples.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(current);
                HashMap::new()
            }
            Entry::Occupied(mut slot) => {
                let previous = slot.get();
                let elapsed = (current.timestamp - previous.timestamp).num_milliseconds() as f64
                    / 1000.0;

                let mut rates = HashMap::new();
                if elapsed > 0.0 {
                    for (name, previous_value) in &previous.values {
                        if let Some(current_value) = current.values.get(name) {
                            rates.insert(name.clone(), (current_value - previous_value) / elapsed);
                        }
                    }
                }

                slot.insert(current);
                rates
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn sample(at: DateTime<Utc>, values: &[(&str, f64)]) -> RateSample {
        RateSample {
            timestamp: at,
            values: values
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn first_observation_returns_no_rates() {
        let tracker = RateTracker::new();
        let rates = tracker.update("disk/", sample(t0(), &[("x", 10.0)]));
        assert!(rates.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn rate_is_delta_over_elapsed_seconds() {
        let tracker = RateTracker::new();
        tracker.update("disk/", sample(t0(), &[("x", 10.0)]));
        let rates = tracker.update(
            "disk/",
            sample(t0() + TimeDelta::seconds(4), &[("x", 20.0)]),
        );
        assert_eq!(rates.len(), 1);
        assert_eq!(rates["x"], 2.5);
    }

    #[test]
    fn metric_missing_from_either_side_is_skipped() {
        let tracker = RateTracker::new();
        tracker.update("disk/", sample(t0(), &[("x", 10.0), ("gone", 1.0)]));
        let rates = tracker.update(
            "disk/",
            sample(t0() + TimeDelta::seconds(2), &[("x", 14.0), ("new", 7.0)]),
        );
        assert_eq!(rates.len(), 1);
        assert_eq!(rates["x"], 2.0);
    }

    #[test]
    fn store_happens_even_when_no_rate_is_computable() {
        let tracker = RateTracker::new();
        tracker.update("disk/", sample(t0(), &[("x", 10.0)]));
        // disjoint metric set: no rates, but the entry must be replaced
        tracker.update("disk/", sample(t0() + TimeDelta::seconds(2), &[("y", 5.0)]));
        let rates = tracker.update(
            "disk/",
            sample(t0() + TimeDelta::seconds(4), &[("y", 9.0)]),
        );
        assert_eq!(rates["y"], 2.0);
    }

    #[test]
    fn keys_do_not_interfere() {
        let tracker = RateTracker::new();
        tracker.update("disk/a", sample(t0(), &[("x", 10.0)]));
        let rates = tracker.update(
            "disk/b",
            sample(t0() + TimeDelta::seconds(4), &[("x", 20.0)]),
        );
        assert!(rates.is_empty(), "different key must start a new baseline");
    }

    #[test]
    fn zero_elapsed_yields_no_rates() {
        let tracker = RateTracker::new();
        tracker.update("disk/", sample(t0(), &[("x", 10.0)]));
        let rates = tracker.update("disk/", sample(t0(), &[("x", 20.0)]));
        assert!(rates.is_empty());
    }

    #[test]
    fn negative_values_produce_negative_rates() {
        let tracker = RateTracker::new();
        tracker.update("disk/", sample(t0(), &[("free", 100.0)]));
        let rates = tracker.update(
            "disk/",
            sample(t0() + TimeDelta::seconds(10), &[("free", 40.0)]),
        );
        assert_eq!(rates["free"], -6.0);
    }
}
