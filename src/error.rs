use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::serial::HandshakeStep;
use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, AcquisitionError>;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// No serial port matched the vendor heuristic.
    #[error("no EPG device found among {scanned} serial port(s)")]
    DeviceNotFound { scanned: usize },

    #[error("unable to open serial port {port}: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("device did not answer within {secs}s while in {step:?}")]
    HandshakeTimeout { step: HandshakeStep, secs: f64 },

    #[error("malformed device line {line:?}: {reason}")]
    MalformedSample { line: String, reason: String },

    /// Logs are never overwritten.
    #[error("event log {} already exists", .path.display())]
    LogExists { path: PathBuf },

    #[error("invalid log file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("failed to write event log: {0}")]
    LogWriteFailure(#[source] io::Error),

    #[error("failed to read event log: {0}")]
    LogReadFailure(#[source] io::Error),

    #[error("event log line {line}: {reason}")]
    ReconciliationParseFailure { line: usize, reason: String },

    #[error("failed to write processed series: {0}")]
    ProcessedOutput(#[from] csv::Error),

    #[error("cannot {action} while session is {from:?}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    #[error("invalid parameter string {param:?}: {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("device link closed")]
    LinkClosed,

    #[error("device link error: {0}")]
    Link(#[source] io::Error),

    #[error("session has ended")]
    SessionEnded,

    #[error("session aborted: {reason}")]
    SessionAborted { reason: String },
}

impl AcquisitionError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedSample {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse_failure(line: usize, reason: impl Into<String>) -> Self {
        Self::ReconciliationParseFailure {
            line,
            reason: reason.into(),
        }
    }

    /// Whether the error ends the session rather than a single line.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::LogWriteFailure(_)
                | Self::LinkClosed
                | Self::Link(_)
                | Self::SessionAborted { .. }
        )
    }
}
