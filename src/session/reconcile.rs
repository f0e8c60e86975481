//! Directory tree reconciliation.
//!
//! Rows are written before their directories, so a crash in between leaves a
//! row without a directory. Reconciliation recreates those directories.
//! Directories without a row are reported but left alone: they may hold
//! artifacts that only their owner can decide to discard.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::Session;
use crate::Result;

/// Outcome of [`Session::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Directories created for rows that had none.
    pub created_dirs: Vec<PathBuf>,
    /// Directories with no matching row (not removed).
    pub orphan_dirs: Vec<PathBuf>,
}

impl ReconcileReport {
    /// True when the tree already matched the database.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.created_dirs.is_empty() && self.orphan_dirs.is_empty()
    }
}

impl Session {
    /// Align the directory tree with the database rows.
    ///
    /// Idempotent: a second call on an unchanged store creates nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed, a query fails, or a
    /// directory cannot be created or listed.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        self.ensure_open()?;
        let mut report = ReconcileReport::default();
        let experiments = self.db.list_experiments()?;

        for experiment in &experiments {
            let experiment_dir = self.config.data_dir.join(experiment.name());
            ensure_dir(&experiment_dir, &mut report)?;

            let runs = self.db.list_runs(experiment.id())?;
            for run in &runs {
                ensure_dir(&experiment_dir.join(run.name()), &mut report)?;
            }
            let run_names: HashSet<&str> = runs.iter().map(|run| run.name()).collect();
            collect_orphans(&experiment_dir, &run_names, &mut report)?;
        }

        let experiment_names: HashSet<&str> = experiments.iter().map(|e| e.name()).collect();
        collect_orphans(&self.config.data_dir, &experiment_names, &mut report)?;

        report.created_dirs.sort();
        report.orphan_dirs.sort();
        if !report.orphan_dirs.is_empty() {
            warn!(count = report.orphan_dirs.len(), "directories without database rows");
        }
        Ok(report)
    }
}

fn ensure_dir(path: &Path, report: &mut ReconcileReport) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    info!(path = %path.display(), "recreated missing directory");
    report.created_dirs.push(path.to_path_buf());
    Ok(())
}

fn collect_orphans(
    parent: &Path,
    known: &HashSet<&str>,
    report: &mut ReconcileReport,
) -> Result<()> {
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let is_known = name.to_str().is_some_and(|name| known.contains(name));
        if !is_known {
            report.orphan_dirs.push(entry.path());
        }
    }
    Ok(())
}
