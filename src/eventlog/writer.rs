use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::event::LogEvent;
use crate::error::{AcquisitionError, Result};

/// Append-only writer for one session's event log.
///
/// Events are written in call order, one line each. The file stays
/// exclusively owned by the writer until [`EventLogWriter::close`].
pub struct EventLogWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    events_written: usize,
}

impl EventLogWriter {
    /// Creates the log file at `path`. An existing file is left alone and
    /// reported as [`AcquisitionError::LogExists`].
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(AcquisitionError::LogWriteFailure)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => AcquisitionError::LogExists { path: path.clone() },
                _ => AcquisitionError::LogWriteFailure(e),
            })?;
        info!("Recording will be saved to {}", path.display());

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            events_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events_written(&self) -> usize {
        self.events_written
    }

    pub fn append(&mut self, event: &LogEvent) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(closed_error)?;
        writeln!(writer, "{}", event).map_err(AcquisitionError::LogWriteFailure)?;
        self.events_written += 1;
        Ok(())
    }

    /// Pushes buffered lines to the OS.
    pub fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(closed_error)?;
        writer.flush().map_err(AcquisitionError::LogWriteFailure)
    }

    /// Flushes, syncs and releases the file. Returns the log path.
    pub fn close(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| AcquisitionError::LogWriteFailure(e.into_error()))?;
            file.sync_all().map_err(AcquisitionError::LogWriteFailure)?;
        }
        info!(
            "Recording is saved: {} ({} events)",
            self.path.display(),
            self.events_written
        );
        Ok(self.path.clone())
    }
}

fn closed_error() -> AcquisitionError {
    AcquisitionError::LogWriteFailure(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "event log already closed",
    ))
}

impl Drop for EventLogWriter {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush event log on drop: {}", e);
            }
        }
    }
}
