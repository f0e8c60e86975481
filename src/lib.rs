//! # mltracker: Embedded ML Experiment Tracking
//!
//! mltracker persists experiment metadata in an embedded SQLite file and
//! mirrors the experiment/run hierarchy as a directory tree for artifacts.
//!
//! ## Layers
//!
//! - [`experiment`]: plain records (`Experiment`, `Run`, `Metric`, `Params`)
//! - [`storage`]: `TrackingDatabase`, schema and typed CRUD
//! - [`session`]: `Session`, the create/resume/delete lifecycle and the
//!   directory tree
//!
//! ## Filesystem Layout
//!
//! ```text
//! {data_dir}/mltracker.db
//! {data_dir}/{experiment}/
//! {data_dir}/{experiment}/{run}/
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mltracker::Session;
//! use serde_json::json;
//!
//! let mut session = Session::new("experiment 1", "./.experiments")?;
//! let mut params = mltracker::Params::new();
//! params.insert("a".to_string(), json!(1));
//! session.start(None, Some(params))?;
//!
//! for i in 0..30 {
//!     session.log("accuracy", f64::from(i) / 30.0)?;
//! }
//! println!("{} metrics logged", session.get_all_metrics()?.len());
//! # Ok::<(), mltracker::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod session;
pub mod storage;

pub use config::TrackerConfig;
pub use error::{Error, ErrorKind, Result};
pub use experiment::{Experiment, Metric, Params, Run};
pub use session::{DeletionOutcome, Session, SessionState};
pub use storage::TrackingDatabase;
