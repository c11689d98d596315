use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use super::state::AppState;
use crate::error::AcquisitionError;
use crate::reconcile::ReconcileReport;
use crate::serial::{list_ports as scan_ports, open_device, PortInfo};
use crate::session::{PauseDecision, SessionHandle, SessionStats, SystemClock};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    /// Event log file name; a timestamped default is used when absent
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// Keep the paused portion (`true`) or splice it out (`false`)
    pub keep: bool,
}

#[derive(Debug, Deserialize)]
pub struct ParamRequest {
    /// `PARAM,<channel>,<ri>,<gain>,<bias>,<freq>,<amp>`
    pub param: String,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub port: PortInfo,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stats: SessionStats,
    /// Absent when recording never started
    pub report: Option<ReconcileReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub enum ApiError {
    NoSession,
    Conflict(String),
    Session(AcquisitionError),
    Internal(String),
}

impl From<AcquisitionError> for ApiError {
    fn from(e: AcquisitionError) -> Self {
        ApiError::Session(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoSession => (StatusCode::NOT_FOUND, "No session set up".to_string()),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            ApiError::Session(e) => {
                let status = match &e {
                    AcquisitionError::DeviceNotFound { .. } => StatusCode::NOT_FOUND,
                    AcquisitionError::PortUnavailable { .. } | AcquisitionError::LinkClosed => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    AcquisitionError::HandshakeTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    AcquisitionError::InvalidTransition { .. }
                    | AcquisitionError::LogExists { .. } => StatusCode::CONFLICT,
                    AcquisitionError::InvalidParam { .. }
                    | AcquisitionError::InvalidFileName { .. } => StatusCode::BAD_REQUEST,
                    AcquisitionError::SessionEnded => StatusCode::GONE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };

        if status.is_server_error() {
            error!("{}", message);
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn setup_in_progress() -> ApiError {
    ApiError::Conflict("Session setup in progress".to_string())
}

async fn current_handle(state: &AppState) -> Result<SessionHandle, ApiError> {
    let slot = state.session.lock().await;
    match slot.as_ref() {
        Some(active) => Ok(active.handle.clone()),
        None if state.is_setting_up() => Err(setup_in_progress()),
        None => Err(ApiError::NoSession),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /ports
/// Serial ports visible to the host
pub async fn list_ports() -> ApiResult<Vec<PortInfo>> {
    Ok(Json(scan_ports()?))
}

/// POST /session/setup
/// Find the device, open it and run the handshake
pub async fn setup_session(
    State(state): State<AppState>,
    request: Option<Json<SetupRequest>>,
) -> ApiResult<SetupResponse> {
    let guard = match state.begin_setup().await {
        Some(guard) => guard,
        None if state.is_setting_up() => return Err(setup_in_progress()),
        None => {
            return Err(ApiError::Conflict(
                "A session is already set up, stop it first".to_string(),
            ))
        }
    };
    let file_name = request.and_then(|Json(request)| request.file_name);
    let config = state.config.session_config(file_name.as_deref())?;

    let device = &state.config.device;
    let (port, link) = open_device(&device.manufacturers, device.baud_rate)?;
    info!("Setting up session on {}", port.name);

    let handle = state
        .set_up_session(guard, config, link, Arc::new(SystemClock))
        .await?;

    Ok(Json(SetupResponse {
        port,
        stats: handle.status(),
    }))
}

/// POST /session/start
pub async fn start_reading(State(state): State<AppState>) -> ApiResult<SessionStats> {
    let handle = current_handle(&state).await?;
    handle.start_reading().await?;
    Ok(Json(handle.status()))
}

/// POST /session/pause
pub async fn pause(State(state): State<AppState>) -> ApiResult<SessionStats> {
    let handle = current_handle(&state).await?;
    handle.pause().await?;
    Ok(Json(handle.status()))
}

/// POST /session/resume
/// Resumes streaming; the paused portion waits for POST /session/decision
pub async fn resume(State(state): State<AppState>) -> ApiResult<SessionStats> {
    let handle = current_handle(&state).await?;
    handle.resume().await?;
    Ok(Json(handle.status()))
}

/// POST /session/decision
/// Keep or discard the paused portion
pub async fn decide(
    State(state): State<AppState>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<SessionStats> {
    let handle = current_handle(&state).await?;
    handle.decide(PauseDecision::from_keep(req.keep)).await?;
    Ok(Json(handle.status()))
}

/// POST /session/param
/// Send new acquisition parameters to the device
pub async fn send_param(
    State(state): State<AppState>,
    Json(req): Json<ParamRequest>,
) -> ApiResult<SessionStats> {
    let handle = current_handle(&state).await?;
    handle.send_param(req.param).await?;
    Ok(Json(handle.status()))
}

/// POST /session/stop
/// Stop recording, close the log and reconcile it. A pause still open at
/// this point waits for POST /session/decision before the log is closed.
pub async fn stop(State(state): State<AppState>) -> ApiResult<StopResponse> {
    let (handle, task) = {
        let mut slot = state.session.lock().await;
        let active = match slot.as_mut() {
            Some(active) => active,
            None if state.is_setting_up() => return Err(setup_in_progress()),
            None => return Err(ApiError::NoSession),
        };
        let task = active
            .task
            .take()
            .ok_or_else(|| ApiError::Conflict("Session is already stopping".to_string()))?;
        (active.handle.clone(), task)
    };

    // a session whose device hung up has already stopped on its own
    match handle.stop().await {
        Ok(()) | Err(AcquisitionError::SessionEnded) => {}
        Err(e) => warn!("Stop request failed: {}", e),
    }

    let outcome = task.await;
    *state.session.lock().await = None;

    let report = outcome
        .map_err(|e| ApiError::Internal(format!("Session task failed: {}", e)))??;
    info!("Session stopped");

    Ok(Json(StopResponse {
        stats: handle.status(),
        report,
    }))
}

/// GET /session/status
pub async fn status(State(state): State<AppState>) -> ApiResult<SessionStats> {
    let handle = current_handle(&state).await?;
    Ok(Json(handle.status()))
}

/// GET /session/events
/// Session notifications as server-sent events
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(state.bus.subscribe(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default().event(event.name());
                    let sse = match serde_json::to_string(&event) {
                        Ok(json) => sse.data(json),
                        Err(e) => {
                            warn!("Failed to serialize {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
