//! Experiment - root entity for experiment tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, globally unique grouping of runs.
///
/// Rows are created on first reference to a name and only ever change their
/// `updated_at` timestamp afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Create an experiment record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `id` - Surrogate key assigned by the database
    /// * `name` - Unique experiment name
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        ExperimentBuilder::new(id, name).build()
    }

    /// Create a builder for constructing an experiment with explicit timestamps.
    #[must_use]
    pub fn builder(id: i64, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(id, name)
    }

    /// Get the surrogate key.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the last-modified timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a custom creation timestamp (useful for row decoding/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set a custom last-modified timestamp.
    #[must_use]
    pub const fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Build the `Experiment`.
    #[must_use]
    pub fn build(self) -> Experiment {
        Experiment {
            id: self.id,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
