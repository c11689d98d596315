use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::reconcile::TrailingSample;
use crate::serial::AcquisitionParams;

/// Configuration for one acquisition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-<uuid>")
    pub session_id: String,

    /// Event log written during the session; the processed series lands next
    /// to it
    pub log_path: PathBuf,

    /// Samples per second requested from the device
    pub sample_rate: u32,

    /// Parameters sent during the handshake
    pub params: AcquisitionParams,

    /// How long each handshake step may wait for the device
    pub handshake_timeout_secs: f64,

    /// Policy for the last sample of the processed series
    pub trailing_sample: TrailingSample,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            log_path: PathBuf::from("recordings/epgOutput.csv"),
            sample_rate: 100,
            params: AcquisitionParams::default(),
            handshake_timeout_secs: 10.0,
            trailing_sample: TrailingSample::Keep,
        }
    }
}
