//! Run - execution instance of an experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Params;

/// One execution attempt within an experiment.
///
/// The `(experiment, name)` pair is unique. `params` is a free-form mapping
/// that can be replaced wholesale or extended one key at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    id: i64,
    experiment: i64,
    name: String,
    params: Params,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a run record with empty params, stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `id` - Surrogate key assigned by the database
    /// * `experiment` - ID of the parent experiment
    /// * `name` - Run name, unique within the experiment
    #[must_use]
    pub fn new(id: i64, experiment: i64, name: impl Into<String>) -> Self {
        RunBuilder::new(id, experiment, name).build()
    }

    /// Create a builder for constructing a run with params or explicit timestamps.
    #[must_use]
    pub fn builder(id: i64, experiment: i64, name: impl Into<String>) -> RunBuilder {
        RunBuilder::new(id, experiment, name)
    }

    /// Get the surrogate key.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub const fn experiment(&self) -> i64 {
        self.experiment
    }

    /// Get the run name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the parameter mapping.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Consume the record, returning its parameter mapping.
    #[must_use]
    pub fn into_params(self) -> Params {
        self.params
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

    pub(crate) fn replace_params(&mut self, params: Params, updated_at: DateTime<Utc>) {
        self.params = params;
        self.updated_at = updated_at;
    }
}

/// Builder for `Run`.
#[derive(Debug)]
pub struct RunBuilder {
    id: i64,
    experiment: i64,
    name: String,
    params: Params,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: i64, experiment: i64, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            experiment,
            name: name.into(),
            params: Params::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parameter mapping.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set a custom creation timestamp.
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

    /// Build the `Run`.
    #[must_use]
    pub fn build(self) -> Run {
        Run {
            id: self.id,
            experiment: self.experiment,
            name: self.name,
            params: self.params,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
