use serde::{Deserialize, Serialize};

/// Channel number stamped on live samples. Live acquisition is single-channel
/// and the handshake only configures channel 1.
pub const LIVE_CHANNEL: u32 = 1;

/// One voltage reading on the session-relative time base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since recording start, paused time excluded
    pub time: f64,
    pub voltage: f64,
    pub channel: u32,
}

impl Sample {
    pub fn new(time: f64, voltage: f64, channel: u32) -> Self {
        Self {
            time,
            voltage,
            channel,
        }
    }

    /// Copy of this sample moved `offset` seconds earlier.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            time: round4(self.time - offset),
            ..*self
        }
    }
}

/// Round to the 4 decimal places the event log keeps.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
