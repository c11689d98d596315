use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::state::SessionState;

/// Statistics about an acquisition session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When recording started, if it has
    pub started_at: Option<DateTime<Utc>>,

    /// Session-relative seconds, paused time excluded
    pub elapsed_secs: f64,

    /// Seconds removed from the timeline by discarded pauses
    pub total_paused_secs: f64,

    /// DATA rows written to the event log
    pub samples_recorded: usize,

    /// Device lines dropped as malformed
    pub lines_dropped: usize,

    /// Pauses taken so far
    pub pauses: usize,

    /// Samples held back until a pause is resolved
    pub buffered: usize,

    pub log_path: Option<PathBuf>,
}
