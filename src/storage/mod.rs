//! Persistence layer (embedded SQLite)
//!
//! [`TrackingDatabase`] owns the database file and its single connection,
//! creates the schema once, and exposes typed CRUD over the `experiment`,
//! `run` and `metric` tables.
//!
//! Every individual write is atomic. Insert-then-fetch sequences are not:
//! a concurrent writer can slip in between, and callers handle that through
//! [`crate::Error::ConstraintViolation`].
//!
//! ```rust,no_run
//! use mltracker::experiment::Params;
//! use mltracker::storage::TrackingDatabase;
//!
//! let mut db = TrackingDatabase::new("/tmp/mltracker/mltracker.db");
//! db.initialize_schema()?;
//! db.open()?;
//!
//! let experiment = db.insert_experiment("baseline")?;
//! let run = db.insert_run(experiment.id(), "run-1", &Params::new())?;
//! db.log_metric(run.id(), "loss", 0.42)?;
//! assert_eq!(db.list_metrics(run.id())?.len(), 1);
//! db.close()?;
//! # Ok::<(), mltracker::Error>(())
//! ```

mod params;
mod schema;

pub use params::{decode_params, encode_params, ParamsCodecError, PARAMS_FORMAT_VERSION};
pub use schema::SCHEMA_VERSION;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use crate::experiment::{Experiment, Metric, Params, Run};
use crate::{Error, Result};

/// Default time SQLite waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const EXPERIMENT_COLUMNS: &str = "id, name, created_at, updated_at";
const RUN_COLUMNS: &str = "id, experiment, name, params, created_at, updated_at";
const METRIC_COLUMNS: &str = "id, run, key, value, timestamp";

/// Row counts removed by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletedRows {
    /// Experiment rows removed (0 or 1)
    pub experiments: usize,
    /// Run rows removed
    pub runs: usize,
    /// Metric rows removed
    pub metrics: usize,
}

/// Handle on the tracking database file.
///
/// The connection is opened explicitly with [`open`](Self::open) and released
/// with [`close`](Self::close) or on drop. Queries against a closed handle fail
/// with [`Error::Closed`]; they never reopen the connection.
#[derive(Debug)]
pub struct TrackingDatabase {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Option<Connection>,
}

impl TrackingDatabase {
    /// Create a handle for the database at `path` without touching the filesystem.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            conn: None,
        }
    }

    /// Set how long a statement waits on a locked database.
    #[must_use]
    pub const fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Get the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether the database file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Check whether a connection is currently held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Create the database file and schema if the file does not exist yet.
    ///
    /// Returns `true` if the schema was created, `false` if the file was
    /// already present. An existing file is never modified.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the schema fails to apply.
    pub fn initialize_schema(&self) -> Result<bool> {
        if self.exists() {
            debug!(path = %self.path.display(), "database already exists, skipping schema");
            return Ok(false);
        }
        let mut conn = Connection::open(&self.path)?;
        schema::create_schema(&mut conn)?;
        conn.close().map_err(|(_, err)| Error::from(err))?;
        info!(path = %self.path.display(), version = SCHEMA_VERSION, "created tracking database");
        Ok(true)
    }

    /// Open the connection to an existing database file.
    ///
    /// Opening an already open handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be opened.
    pub fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(self.busy_timeout)?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Release the connection. Safe to call when never opened or already closed.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses to close (the handle is still released).
    pub fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| Error::from(err)),
            None => Ok(()),
        }
    }

    /// Read the schema version stamped at creation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the handle is closed.
    pub fn schema_version(&self) -> Result<i64> {
        Ok(schema::read_schema_version(self.conn()?)?)
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::Closed)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(Error::Closed)
    }

    // ========================================================================
    // Experiments
    // ========================================================================

    /// List every experiment, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the query fails.
    pub fn list_experiments(&self) -> Result<Vec<Experiment>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment ORDER BY id"))?;
        let rows = stmt.query_map([], experiment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Fetch an experiment by its unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the query fails.
    pub fn experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE name = ?1"))?;
        Ok(stmt.query_row(params![name], experiment_from_row).optional()?)
    }

    /// Fetch an experiment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the query fails.
    pub fn experiment_by_id(&self, id: i64) -> Result<Option<Experiment>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], experiment_from_row).optional()?)
    }

    /// Insert an experiment and return the canonical row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstraintViolation`] if the name is already taken.
    pub fn insert_experiment(&self, name: &str) -> Result<Experiment> {
        let now = to_micros(now());
        self.conn()?.execute(
            "INSERT INTO experiment (name, created_at, updated_at) VALUES (?1, ?2, ?3)",
            params![name, now, now],
        )?;
        self.experiment_by_name(name)?
            .ok_or_else(|| Error::not_found("experiment", name))
    }

    /// Bump an experiment's `updated_at` to now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no experiment has this id.
    pub fn touch_experiment(&self, id: i64) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE experiment SET updated_at = ?1 WHERE id = ?2",
            params![to_micros(now()), id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("experiment", id));
        }
        Ok(())
    }

    /// Delete an experiment together with its runs and their metrics.
    ///
    /// All three deletes run in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or a statement fails.
    pub fn delete_experiment(&mut self, id: i64) -> Result<DeletedRows> {
        let tx = self.conn_mut()?.transaction()?;
        let metrics = tx.execute(
            "DELETE FROM metric WHERE run IN (SELECT id FROM run WHERE experiment = ?1)",
            params![id],
        )?;
        let runs = tx.execute("DELETE FROM run WHERE experiment = ?1", params![id])?;
        let experiments = tx.execute("DELETE FROM experiment WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(DeletedRows {
            experiments,
            runs,
            metrics,
        })
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// List all runs of an experiment, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a params blob cannot be decoded.
    pub fn list_runs(&self, experiment_id: i64) -> Result<Vec<Run>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RUN_COLUMNS} FROM run WHERE experiment = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![experiment_id], RawRun::from_row)?;
        rows.map(|raw| raw?.decode()).collect()
    }

    /// Fetch a run by `(experiment id, name)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the params blob cannot be decoded.
    pub fn run_by_name(&self, experiment_id: i64, name: &str) -> Result<Option<Run>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RUN_COLUMNS} FROM run WHERE experiment = ?1 AND name = ?2"
        ))?;
        stmt.query_row(params![experiment_id, name], RawRun::from_row)
            .optional()?
            .map(RawRun::decode)
            .transpose()
    }

    /// Fetch a run by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the params blob cannot be decoded.
    pub fn run_by_id(&self, id: i64) -> Result<Option<Run>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {RUN_COLUMNS} FROM run WHERE id = ?1"))?;
        stmt.query_row(params![id], RawRun::from_row)
            .optional()?
            .map(RawRun::decode)
            .transpose()
    }

    /// Insert a run and return the canonical row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstraintViolation`] if the name is taken within the
    /// experiment or the experiment does not exist.
    pub fn insert_run(&self, experiment_id: i64, name: &str, params: &Params) -> Result<Run> {
        let blob = encode_params(params)?;
        let now = to_micros(now());
        self.conn()?.execute(
            "INSERT INTO run (experiment, name, params, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![experiment_id, name, blob, now, now],
        )?;
        self.run_by_name(experiment_id, name)?
            .ok_or_else(|| Error::not_found("run", name))
    }

    /// Delete a run and its metrics in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or a statement fails.
    pub fn delete_run(&mut self, id: i64) -> Result<DeletedRows> {
        let tx = self.conn_mut()?.transaction()?;
        let metrics = tx.execute("DELETE FROM metric WHERE run = ?1", params![id])?;
        let runs = tx.execute("DELETE FROM run WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(DeletedRows {
            experiments: 0,
            runs,
            metrics,
        })
    }

    /// Replace a run's params mapping, returning the new `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no run has this id.
    pub fn update_run_params(&self, id: i64, params: &Params) -> Result<DateTime<Utc>> {
        let blob = encode_params(params)?;
        let now = now();
        let changed = self.conn()?.execute(
            "UPDATE run SET params = ?1, updated_at = ?2 WHERE id = ?3",
            params![blob, to_micros(now), id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("run", id));
        }
        Ok(now)
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Append one metric observation, timestamped now.
    ///
    /// Non-finite values are accepted; NaN reads back as NaN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstraintViolation`] if the run does not exist.
    pub fn log_metric(&self, run_id: i64, key: &str, value: f64) -> Result<Metric> {
        let conn = self.conn()?;
        let timestamp = now();
        conn.execute(
            "INSERT INTO metric (run, key, value, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, key, value, to_micros(timestamp)],
        )?;
        Ok(Metric::builder(conn.last_insert_rowid(), run_id, key, value)
            .timestamp(timestamp)
            .build())
    }

    /// List a run's metrics in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the query fails.
    pub fn list_metrics(&self, run_id: i64) -> Result<Vec<Metric>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {METRIC_COLUMNS} FROM metric WHERE run = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![run_id], metric_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Run row with the params blob still encoded.
struct RawRun {
    id: i64,
    experiment: i64,
    name: String,
    params: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            experiment: row.get(1)?,
            name: row.get(2)?,
            params: row.get(3)?,
            created_at: timestamp_column(row, 4)?,
            updated_at: timestamp_column(row, 5)?,
        })
    }

    fn decode(self) -> Result<Run> {
        let params = decode_params(&self.params)?;
        Ok(Run::builder(self.id, self.experiment, self.name)
            .params(params)
            .created_at(self.created_at)
            .updated_at(self.updated_at)
            .build())
    }
}

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment::builder(row.get(0)?, row.get::<_, String>(1)?)
        .created_at(timestamp_column(row, 2)?)
        .updated_at(timestamp_column(row, 3)?)
        .build())
}

// SQLite binds NaN as NULL.
fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<Metric> {
    let value = row.get::<_, Option<f64>>(3)?.unwrap_or(f64::NAN);
    Ok(
        Metric::builder(row.get(0)?, row.get(1)?, row.get::<_, String>(2)?, value)
            .timestamp(timestamp_column(row, 4)?)
            .build(),
    )
}

/// Current time at the precision stored in the database.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}
