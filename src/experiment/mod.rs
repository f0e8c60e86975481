//! Experiment Tracking Entity Model
//!
//! Plain records shared between the persistence layer and the session
//! orchestrator. They carry no behavior beyond accessors.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Run (N)
//!                     │
//!                     ├── params: Params [versioned blob]
//!                     └──< Metric (N) [time-series]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use mltracker::experiment::{Experiment, Metric, Params, Run};
//! use serde_json::json;
//!
//! let experiment = Experiment::new(1, "resnet-sweep");
//!
//! let mut params = Params::new();
//! params.insert("lr".to_string(), json!(0.01));
//! let run = Run::builder(1, experiment.id(), "run-1").params(params).build();
//!
//! let metric = Metric::new(1, run.id(), "loss", 0.5);
//! assert_eq!(metric.run(), run.id());
//! ```

mod experiment_record;
mod metric_record;
mod run_record;

pub use experiment_record::{Experiment, ExperimentBuilder};
pub use metric_record::{Metric, MetricBuilder};
pub use run_record::{Run, RunBuilder};

/// Free-form run parameters: string keys to arbitrary nested JSON values.
pub type Params = serde_json::Map<String, serde_json::Value>;
