//! Post-session timeline reconciliation
//!
//! Turns the raw event log of a finished session into a clean series file
//! `<basename>_processed.csv`:
//! - discarded pause intervals are spliced out and the samples that followed
//!   them moved back by the pause duration
//! - kept pause intervals only lose their control rows
//! - the END summary is not part of the series
//!
//! The raw log is only ever read. The series file is written once the whole
//! log has been reconciled, so a malformed log leaves no output behind.

mod engine;
mod processed;

pub use engine::{
    reconcile, trim_trailing, ReconcileProgress, ReconciledSeries, TrailingSample,
};
pub use processed::{load_processed, write_processed, PROCESSED_HEADER};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::eventlog::read_log;

/// Outcome of reconciling one session log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub log_path: PathBuf,
    /// Log path without extension; other session files derive from it
    pub basename: PathBuf,
    pub output_path: PathBuf,
    pub rows: usize,
    pub pauses: usize,
    pub pauses_discarded: usize,
    pub samples_discarded: usize,
    pub trailing_dropped: bool,
}

/// `recordings/epgOutput.csv` → (`recordings/epgOutput`,
/// `recordings/epgOutput_processed.csv`)
pub fn processed_paths(log_path: &Path) -> (PathBuf, PathBuf) {
    let basename = log_path.with_extension("");
    let mut output = basename.clone().into_os_string();
    output.push("_processed.csv");
    (basename, PathBuf::from(output))
}

/// Reads a closed session log, reconciles it and writes the series file.
pub fn reconcile_file(
    log_path: impl AsRef<Path>,
    trailing: TrailingSample,
    on_progress: impl FnMut(ReconcileProgress),
) -> Result<ReconcileReport> {
    let log_path = log_path.as_ref();
    info!("Processing {}...", log_path.display());

    let events = read_log(log_path)?;
    let series = reconcile(&events, trailing, on_progress)?;

    let (basename, output_path) = processed_paths(log_path);
    let partial = output_path.with_extension("csv.partial");
    if let Err(e) = write_processed(&partial, &series.samples) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::rename(&partial, &output_path).map_err(csv::Error::from)?;

    info!(
        "Processed series written to {} ({} rows, {} of {} pauses discarded)",
        output_path.display(),
        series.samples.len(),
        series.pauses_discarded,
        series.pauses
    );

    Ok(ReconcileReport {
        log_path: log_path.to_path_buf(),
        basename,
        output_path,
        rows: series.samples.len(),
        pauses: series.pauses,
        pauses_discarded: series.pauses_discarded,
        samples_discarded: series.samples_discarded,
        trailing_dropped: series.trailing_dropped,
    })
}
