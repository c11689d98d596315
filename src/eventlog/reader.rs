use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use super::event::LogEvent;
use crate::error::{AcquisitionError, Result};

/// Reads a closed event log. Fails on the first unparseable line; blank lines
/// are skipped.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogEvent>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(AcquisitionError::LogReadFailure)?;
    let events = parse_log(BufReader::new(file))?;
    debug!("Read {} events from {}", events.len(), path.display());
    Ok(events)
}

pub fn parse_log(reader: impl BufRead) -> Result<Vec<LogEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(AcquisitionError::LogReadFailure)?;
        if line.trim().is_empty() {
            continue;
        }
        let event = LogEvent::parse_line(&line)
            .map_err(|reason| AcquisitionError::parse_failure(index + 1, reason))?;
        events.push(event);
    }
    Ok(events)
}
