//! HTTP API server for external control (acquisition UI)
//!
//! This module provides a REST API for driving the acquisition session:
//! - POST /session/setup - Find the device and run the handshake, optionally
//!   naming the event log (`{"file_name": ...}`)
//! - POST /session/start - Start recording
//! - POST /session/pause, /session/resume - Pause and resume
//! - POST /session/decision - Keep or discard the paused portion
//! - POST /session/param - Send acquisition parameters
//! - POST /session/stop - Stop, close the log and reconcile it
//! - GET /session/status - Query session statistics
//! - GET /session/events - Server-sent session notifications
//! - GET /ports - List serial ports
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{
    ApiError, DecisionRequest, ErrorResponse, ParamRequest, SetupRequest, StopResponse,
};
pub use routes::create_router;
pub use state::{ActiveSession, AppState, SetupGuard};
