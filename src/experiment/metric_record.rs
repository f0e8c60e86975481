//! Metric - time-series observations for runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single timestamped `(key, value)` observation tied to a run.
///
/// Keys are not unique: logging the same key repeatedly builds a time series,
/// ordered by insertion (`id`). Metrics are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    id: i64,
    run: i64,
    key: String,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl Metric {
    /// Create a metric record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `id` - Surrogate key assigned by the database
    /// * `run` - ID of the parent run
    /// * `key` - Metric name (e.g., "loss", "accuracy")
    /// * `value` - Observed value
    #[must_use]
    pub fn new(id: i64, run: i64, key: impl Into<String>, value: f64) -> Self {
        MetricBuilder::new(id, run, key, value).build()
    }

    /// Create a builder for constructing a metric with an explicit timestamp.
    #[must_use]
    pub fn builder(id: i64, run: i64, key: impl Into<String>, value: f64) -> MetricBuilder {
        MetricBuilder::new(id, run, key, value)
    }

    /// Get the surrogate key.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Get the parent run ID.
    #[must_use]
    pub const fn run(&self) -> i64 {
        self.run
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Builder for `Metric`.
#[derive(Debug)]
pub struct MetricBuilder {
    id: i64,
    run: i64,
    key: String,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: i64, run: i64, key: impl Into<String>, value: f64) -> Self {
        Self {
            id,
            run,
            key: key.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Build the `Metric`.
    #[must_use]
    pub fn build(self) -> Metric {
        Metric {
            id: self.id,
            run: self.run,
            key: self.key,
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}
