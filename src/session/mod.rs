//! Session orchestrator
//!
//! A [`Session`] binds one experiment name (and, per run, a run name) to
//! database rows and to directories under the data directory, and routes
//! metric and parameter calls to the currently bound run.
//!
//! ## Lifecycle
//!
//! ```text
//! Unbound ──bind_experiment──> ExperimentBound ──start/resume──> RunBound
//!    ^                                                              │
//!    └──────────────────── delete_experiment ───────────────────────┘
//!
//! any state ──close──> Closed
//! ```
//!
//! `start` and `resume` bind the experiment first when the session is still
//! unbound.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mltracker::Session;
//!
//! let mut session = Session::new("resnet-sweep", "/tmp/mltracker")?;
//! session.start(Some("run-1"), None)?;
//! session.add_param("lr", 0.01)?;
//! for epoch in 0..3 {
//!     session.log("loss", 1.0 / f64::from(epoch + 1))?;
//! }
//! assert_eq!(session.get_all_metrics()?.len(), 3);
//! session.close()?;
//! # Ok::<(), mltracker::Error>(())
//! ```

mod names;
mod reconcile;

pub use names::generate_run_name;
pub use reconcile::ReconcileReport;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::experiment::{Experiment, Metric, Params, Run};
use crate::storage::{DeletedRows, TrackingDatabase};
use crate::{Error, Result};

use names::validate_name;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No experiment row bound yet.
    Unbound,
    /// Experiment row and directory exist; no run bound.
    ExperimentBound {
        /// Bound experiment row
        experiment: Experiment,
    },
    /// A run was started or resumed.
    RunBound {
        /// Bound experiment row
        experiment: Experiment,
        /// Bound run row
        run: Run,
    },
    /// Connection released; every operation fails.
    Closed,
}

impl SessionState {
    /// Bound experiment, if any.
    #[must_use]
    pub const fn experiment(&self) -> Option<&Experiment> {
        match self {
            Self::ExperimentBound { experiment } | Self::RunBound { experiment, .. } => {
                Some(experiment)
            }
            Self::Unbound | Self::Closed => None,
        }
    }

    /// Bound run, if any.
    #[must_use]
    pub const fn run(&self) -> Option<&Run> {
        match self {
            Self::RunBound { run, .. } => Some(run),
            _ => None,
        }
    }

    /// True once the session has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result of [`Session::delete_experiment`].
///
/// Directory removal and row deletion are independent steps and are reported
/// separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Experiment name
    pub experiment: String,
    /// Whether the experiment directory existed and was removed
    pub directory_removed: bool,
    /// Rows deleted, or `None` if the experiment had no row
    pub rows: Option<DeletedRows>,
}

impl DeletionOutcome {
    /// Whether the experiment row was deleted.
    #[must_use]
    pub fn rows_deleted(&self) -> bool {
        self.rows.is_some_and(|rows| rows.experiments > 0)
    }

    /// Both the directory and the row are gone.
    #[must_use]
    pub fn success(&self) -> bool {
        self.directory_removed && self.rows_deleted()
    }

    /// Turn an incomplete deletion into [`Error::PartialDeletion`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialDeletion`] unless both steps succeeded.
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::PartialDeletion {
                rows_deleted: self.rows_deleted(),
                experiment: self.experiment,
                directory_removed: self.directory_removed,
            })
        }
    }
}

/// Tracking session for one experiment.
#[derive(Debug)]
pub struct Session {
    experiment_name: String,
    config: TrackerConfig,
    db: TrackingDatabase,
    state: SessionState,
}

impl Session {
    /// Open a session for `experiment_name` rooted at `data_dir`.
    ///
    /// Creates the data directory and the database file when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the store cannot be opened.
    pub fn new(experiment_name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = TrackerConfig::builder().data_dir(data_dir).build()?;
        Self::with_config(experiment_name, config)
    }

    /// Open a session with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or config is invalid, the store cannot be
    /// opened, or the optional reconciliation pass fails.
    pub fn with_config(experiment_name: impl Into<String>, config: TrackerConfig) -> Result<Self> {
        let experiment_name = experiment_name.into();
        validate_name(&experiment_name)?;
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let mut db =
            TrackingDatabase::new(config.db_path()).with_busy_timeout(config.busy_timeout());
        db.initialize_schema()?;
        db.open()?;

        let session = Self {
            experiment_name,
            config,
            db,
            state: SessionState::Unbound,
        };
        if session.config.reconcile_on_open {
            session.reconcile()?;
        }
        Ok(session)
    }

    /// Experiment name this session is for.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Read access to the underlying database handle.
    #[must_use]
    pub const fn database(&self) -> &TrackingDatabase {
        &self.db
    }

    /// Bound experiment row, if any.
    #[must_use]
    pub const fn experiment(&self) -> Option<&Experiment> {
        self.state.experiment()
    }

    /// Bound run row, if any.
    #[must_use]
    pub const fn run(&self) -> Option<&Run> {
        self.state.run()
    }

    /// Id of the bound experiment, if any.
    #[must_use]
    pub fn get_experiment_id(&self) -> Option<i64> {
        self.state.experiment().map(Experiment::id)
    }

    /// `{data_dir}/{experiment_name}`.
    #[must_use]
    pub fn experiment_dir(&self) -> PathBuf {
        self.config.data_dir.join(&self.experiment_name)
    }

    /// `{data_dir}/{experiment_name}/{run_name}` for the bound run.
    #[must_use]
    pub fn run_dir(&self) -> Option<PathBuf> {
        self.state.run().map(|run| self.experiment_dir().join(run.name()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn bound_run(&self) -> Result<&Run> {
        self.ensure_open()?;
        self.state.run().ok_or(Error::NoRunBound)
    }

    /// Look up or create the experiment row, then ensure its directory exists.
    ///
    /// Calling it again returns the already bound row.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the store fails.
    pub fn bind_experiment(&mut self) -> Result<&Experiment> {
        self.ensure_open()?;
        if self.state.experiment().is_none() {
            let experiment = self.find_or_create_experiment()?;
            self.state = SessionState::ExperimentBound { experiment };
        }
        fs::create_dir_all(self.experiment_dir())?;
        self.state.experiment().ok_or(Error::NoExperimentBound)
    }

    fn find_or_create_experiment(&self) -> Result<Experiment> {
        let name = self.experiment_name.as_str();
        if let Some(experiment) = self.db.experiment_by_name(name)? {
            debug!(experiment = name, id = experiment.id(), "experiment already exists");
            return Ok(experiment);
        }
        self.insert_or_fetch_experiment()
    }

    /// Insert the experiment row, falling back to the existing row when
    /// another writer inserted the same name first.
    fn insert_or_fetch_experiment(&self) -> Result<Experiment> {
        let name = self.experiment_name.as_str();
        match self.db.insert_experiment(name) {
            Ok(experiment) => {
                info!(experiment = name, id = experiment.id(), "inserted new experiment");
                Ok(experiment)
            }
            Err(err) if err.is_constraint_violation() => {
                warn!(experiment = name, "experiment inserted concurrently, fetching");
                self.db
                    .experiment_by_name(name)?
                    .ok_or_else(|| Error::not_found("experiment", name))
            }
            Err(err) => Err(err),
        }
    }

    /// Start a new run under the experiment.
    ///
    /// Without a `run_name` a random one is generated. The run row is written
    /// first, then its directory, which must not already exist.
    ///
    /// # Errors
    ///
    /// - [`Error::ConstraintViolation`] if the run name is taken
    /// - [`Error::DirectoryExists`] if the run directory already exists
    /// - [`Error::InvalidName`] if `run_name` is not a plain directory name
    pub fn start(&mut self, run_name: Option<&str>, params: Option<Params>) -> Result<&mut Self> {
        if let Some(name) = run_name {
            validate_name(name)?;
        }
        let experiment_id = self.bind_experiment()?.id();
        let params = params.unwrap_or_default();

        let run = match run_name {
            Some(name) => self.db.insert_run(experiment_id, name, &params)?,
            None => {
                let len = self.config.run_name_length;
                self.insert_generated_run(experiment_id, &params, || generate_run_name(len))?
            }
        };
        self.db.touch_experiment(experiment_id)?;
        let experiment = self
            .db
            .experiment_by_id(experiment_id)?
            .ok_or_else(|| Error::not_found("experiment", experiment_id))?;

        let run_dir = self.experiment_dir().join(run.name());
        create_fresh_dir(&run_dir)?;
        info!(
            experiment = %self.experiment_name,
            run = run.name(),
            id = run.id(),
            "started run"
        );
        self.state = SessionState::RunBound { experiment, run };
        Ok(self)
    }

    /// Insert a run under names drawn from `next_name`, up to
    /// `generated_name_attempts` tries. The last collision is returned as is.
    fn insert_generated_run(
        &self,
        experiment_id: i64,
        params: &Params,
        mut next_name: impl FnMut() -> String,
    ) -> Result<Run> {
        let attempts = self.config.generated_name_attempts;
        let mut attempt = 1;
        loop {
            let name = next_name();
            match self.db.insert_run(experiment_id, &name, params) {
                Err(err) if err.is_constraint_violation() && attempt < attempts => {
                    warn!(run = %name, attempt, "generated run name collided, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Bind an existing run by name.
    ///
    /// The run directory is created if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment has no run with this name.
    pub fn resume(&mut self, run_name: &str) -> Result<&mut Self> {
        validate_name(run_name)?;
        let experiment = self.bind_experiment()?.clone();
        let run = self
            .db
            .run_by_name(experiment.id(), run_name)?
            .ok_or_else(|| Error::not_found("run", format!("{}/{run_name}", experiment.name())))?;

        fs::create_dir_all(self.experiment_dir().join(run.name()))?;
        info!(experiment = %self.experiment_name, run = run_name, "resumed run");
        self.state = SessionState::RunBound { experiment, run };
        Ok(self)
    }

    /// Append a metric observation to the bound run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRunBound`] before `start`/`resume`.
    pub fn log(&self, key: &str, value: f64) -> Result<Metric> {
        let run_id = self.bound_run()?.id();
        self.db.log_metric(run_id, key, value)
    }

    /// Set one parameter on the bound run.
    ///
    /// Reads the stored mapping, sets the key, and writes the whole mapping
    /// back. Two writers on the same run can lose each other's updates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRunBound`] before `start`/`resume`.
    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let run_id = self.bound_run()?.id();
        let mut params = self
            .db
            .run_by_id(run_id)?
            .ok_or_else(|| Error::not_found("run", run_id))?
            .into_params();
        params.insert(key.into(), value.into());
        self.write_params(run_id, params)
    }

    /// Replace the bound run's parameter mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRunBound`] before `start`/`resume`.
    pub fn set_params(&mut self, params: Params) -> Result<()> {
        let run_id = self.bound_run()?.id();
        self.write_params(run_id, params)
    }

    fn write_params(&mut self, run_id: i64, params: Params) -> Result<()> {
        let updated_at = self.db.update_run_params(run_id, &params)?;
        if let SessionState::RunBound { run, .. } = &mut self.state {
            run.replace_params(params, updated_at);
        }
        Ok(())
    }

    /// Read the bound run's parameters from the database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRunBound`] before `start`/`resume`.
    pub fn get_params(&self) -> Result<Params> {
        let run_id = self.bound_run()?.id();
        Ok(self
            .db
            .run_by_id(run_id)?
            .ok_or_else(|| Error::not_found("run", run_id))?
            .into_params())
    }

    /// Full metric history of the bound run, in logging order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRunBound`] before `start`/`resume`.
    pub fn get_all_metrics(&self) -> Result<Vec<Metric>> {
        let run_id = self.bound_run()?.id();
        self.db.list_metrics(run_id)
    }

    /// All runs of the bound experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExperimentBound`] before the experiment is bound.
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        self.ensure_open()?;
        let experiment = self.state.experiment().ok_or(Error::NoExperimentBound)?;
        self.db.list_runs(experiment.id())
    }

    /// Remove the experiment directory, then delete its rows.
    ///
    /// Row deletion runs whether or not the directory removal worked; the
    /// outcome reports each step. Runs and metrics of the experiment are
    /// deleted with it. The session returns to `Unbound` once the rows are
    /// gone; if the row deletion fails the binding is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if neither a row nor a directory exists,
    /// or a database error if the row deletion fails.
    pub fn delete_experiment(&mut self) -> Result<DeletionOutcome> {
        self.ensure_open()?;
        let experiment = match self.state.experiment() {
            Some(experiment) => Some(experiment.clone()),
            None => self.db.experiment_by_name(&self.experiment_name)?,
        };
        let dir = self.experiment_dir();
        if experiment.is_none() && !dir.is_dir() {
            return Err(Error::not_found("experiment", &self.experiment_name));
        }

        let directory_removed = remove_experiment_dir(&dir);
        let rows = match experiment {
            Some(experiment) => Some(self.db.delete_experiment(experiment.id())?),
            None => None,
        };
        self.state = SessionState::Unbound;
        info!(
            experiment = %self.experiment_name,
            directory_removed,
            rows = ?rows,
            "deleted experiment"
        );
        Ok(DeletionOutcome {
            experiment: self.experiment_name.clone(),
            directory_removed,
            rows,
        })
    }

    /// Release the database connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails to close; the session is closed regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.state.is_closed() {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.db.close()
    }
}

fn create_fresh_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            warn!(path = %path.display(), "run row written but directory already exists");
            Err(Error::DirectoryExists(path.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

fn remove_experiment_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        warn!(path = %dir.display(), "experiment directory missing, cannot delete files");
        return false;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "failed to delete experiment files");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn session(name: &str) -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let session = Session::new(name, dir.path()).unwrap();
        (dir, session)
    }

    #[test]
    fn test_new_session_is_unbound() {
        let (dir, session) = session("exp");
        assert_eq!(session.state(), &SessionState::Unbound);
        assert!(session.get_experiment_id().is_none());
        assert!(session.run_dir().is_none());
        assert!(dir.path().join("mltracker.db").is_file());
        assert!(!session.experiment_dir().exists());
    }

    #[test]
    fn test_invalid_experiment_name_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Session::new("../escape", dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn test_run_operations_need_bound_run() {
        let (_dir, mut session) = session("exp");
        assert!(matches!(session.log("loss", 1.0), Err(Error::NoRunBound)));
        assert!(matches!(session.add_param("lr", 0.1), Err(Error::NoRunBound)));
        assert!(matches!(session.get_all_metrics(), Err(Error::NoRunBound)));
        assert!(matches!(session.list_runs(), Err(Error::NoExperimentBound)));

        session.bind_experiment().unwrap();
        assert!(matches!(session.log("loss", 1.0), Err(Error::NoRunBound)));
    }

    #[test]
    fn test_start_updates_cached_state() {
        let (_dir, mut session) = session("exp");
        session.start(Some("r1"), None).unwrap();
        session.set_params(Params::new()).unwrap();
        session.add_param("batch", 32).unwrap();

        let cached = session.run().unwrap();
        assert_eq!(cached.params().get("batch"), Some(&Value::from(32)));
        assert!(cached.updated_at() >= cached.created_at());
    }

    #[test]
    fn test_generated_name_uses_configured_length() {
        let dir = TempDir::new().unwrap();
        let config = TrackerConfig::builder()
            .data_dir(dir.path())
            .run_name_length(6)
            .build()
            .unwrap();
        let mut session = Session::with_config("exp", config).unwrap();
        session.start(None, None).unwrap();
        assert_eq!(session.run().unwrap().name().len(), 6);
    }

    #[test]
    fn test_insert_or_fetch_returns_existing_row() {
        let (_dir, session) = session("taken");
        let existing = session.db.insert_experiment("taken").unwrap();

        let experiment = session.insert_or_fetch_experiment().unwrap();
        assert_eq!(experiment.id(), existing.id());
        assert_eq!(session.db.list_experiments().unwrap().len(), 1);
    }

    fn session_with_attempts(attempts: u32) -> (TempDir, Session, i64) {
        let dir = TempDir::new().unwrap();
        let config = TrackerConfig::builder()
            .data_dir(dir.path())
            .generated_name_attempts(attempts)
            .build()
            .unwrap();
        let mut session = Session::with_config("exp", config).unwrap();
        let experiment_id = session.bind_experiment().unwrap().id();
        session.db.insert_run(experiment_id, "taken", &Params::new()).unwrap();
        (dir, session, experiment_id)
    }

    fn names(list: &'static [&'static str]) -> impl FnMut() -> String {
        let mut iter = list.iter().copied().cycle();
        move || iter.next().unwrap_or_default().to_string()
    }

    #[test]
    fn test_generated_name_collision_without_retry() {
        let (_dir, session, experiment_id) = session_with_attempts(1);
        let err = session
            .insert_generated_run(experiment_id, &Params::new(), names(&["taken", "fresh"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(session.db.list_runs(experiment_id).unwrap().len(), 1);
    }

    #[test]
    fn test_generated_name_retries_with_fresh_name() {
        let (_dir, session, experiment_id) = session_with_attempts(3);
        let run = session
            .insert_generated_run(experiment_id, &Params::new(), names(&["taken", "taken", "fresh"]))
            .unwrap();
        assert_eq!(run.name(), "fresh");
        assert_eq!(session.db.list_runs(experiment_id).unwrap().len(), 2);
    }

    #[test]
    fn test_generated_name_retries_exhausted() {
        let (_dir, session, experiment_id) = session_with_attempts(3);
        let mut calls = 0;
        let err = session
            .insert_generated_run(experiment_id, &Params::new(), || {
                calls += 1;
                "taken".to_string()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_failed_row_delete_keeps_binding() {
        let (_dir, mut session) = session("exp");
        session.bind_experiment().unwrap();
        session.db.close().unwrap();

        assert!(matches!(session.delete_experiment(), Err(Error::Closed)));
        assert_eq!(session.get_experiment_id(), Some(1));
    }

    #[test]
    fn test_close_twice() {
        let (_dir, mut session) = session("exp");
        session.close().unwrap();
        session.close().unwrap();
        assert!(session.state().is_closed());
    }
}
