//! Acquisition session management
//!
//! This module provides the `AcquisitionSession` state machine and the task
//! that drives it:
//! - Device handshake and streaming over a line link
//! - Pause / resume with an operator decision on the paused portion
//! - Event log writing with flushes at every transition
//! - Reconciliation of the closed log when the session stops
//! - Session statistics and state management

mod clock;
mod config;
mod decision;
mod runner;
#[allow(clippy::module_inception)]
mod session;
mod state;
mod stats;

pub use clock::{Clock, ManualClock, SessionClock, SystemClock};
pub use config::SessionConfig;
pub use decision::{
    resolve, DeferredPrompt, FixedPrompt, OperatorPrompt, PauseDecision, PendingPause, Resolution,
};
pub use runner::{SessionCommand, SessionHandle, SessionRequest, SessionRunner};
pub use session::AcquisitionSession;
pub use state::SessionState;
pub use stats::SessionStats;
