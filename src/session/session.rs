use std::mem;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use tracing::{debug, error, info, warn};

use super::clock::SessionClock;
use super::config::SessionConfig;
use super::decision::{self, PauseDecision, PendingPause};
use super::state::SessionState;
use super::stats::SessionStats;
use crate::annotation::Annotation;
use crate::error::{AcquisitionError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::eventlog::{EventLogWriter, LogEvent};
use crate::sample::{Sample, LIVE_CHANNEL};
use crate::serial::DeviceMessage;

/// State machine of one acquisition session.
///
/// Owns the session clock, the event log and the samples held back while a
/// pause decision is pending. Every method takes the current epoch time explicitly, so the
/// machine itself never reads a clock. It is driven from a single task and
/// publishes notifications on the [`EventBus`].
pub struct AcquisitionSession {
    config: SessionConfig,
    state: SessionState,
    clock: SessionClock,
    log: Option<EventLogWriter>,
    log_path: Option<PathBuf>,
    /// Samples received while a pause decision is pending
    buffer: Vec<Sample>,
    pending: Option<PendingPause>,
    bus: EventBus,
    samples_recorded: usize,
    lines_dropped: usize,
    pauses: usize,
}

impl AcquisitionSession {
    pub fn new(config: SessionConfig, bus: EventBus) -> Self {
        info!("Creating acquisition session: {}", config.session_id);

        Self {
            config,
            state: SessionState::Idle,
            clock: SessionClock::default(),
            log: None,
            log_path: None,
            buffer: Vec::new(),
            pending: None,
            bus,
            samples_recorded: 0,
            lines_dropped: 0,
            pauses: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn pending_pause(&self) -> Option<PendingPause> {
        self.pending
    }

    /// Samples held until the pending pause is resolved, in arrival order.
    pub fn buffered(&self) -> &[Sample] {
        &self.buffer
    }

    pub fn is_recording(&self) -> bool {
        self.clock.is_started() && self.state.is_active()
    }

    fn transition(&mut self, next: SessionState, action: &'static str) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AcquisitionError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn log_mut(&mut self) -> Result<&mut EventLogWriter> {
        let state = self.state;
        self.log.as_mut().ok_or(AcquisitionError::InvalidTransition {
            from: state,
            action: "write the event log before recording started",
        })
    }

    /// Appends a control event and flushes; transitions are flush points.
    fn append_and_flush(&mut self, event: LogEvent) -> Result<()> {
        let log = self.log_mut()?;
        log.append(&event)?;
        log.flush()
    }

    pub fn begin_handshake(&mut self) -> Result<()> {
        self.transition(SessionState::Handshaking, "set up serial")?;
        info!("Handshaking with device");
        Ok(())
    }

    pub fn handshake_complete(&mut self) -> Result<()> {
        self.transition(SessionState::Streaming, "complete handshake")?;
        info!("Device ready to stream");
        self.bus.publish(SessionEvent::Ready);
        Ok(())
    }

    /// Handshake could not finish; the session ends without streaming.
    pub fn handshake_failed(&mut self) {
        if self.state == SessionState::Handshaking {
            self.state = SessionState::Ended;
        }
    }

    /// Opens the event log and starts the session clock.
    pub fn start_recording(&mut self, now: f64) -> Result<()> {
        if self.state != SessionState::Streaming || self.clock.is_started() {
            return Err(AcquisitionError::InvalidTransition {
                from: self.state,
                action: "start recording",
            });
        }

        let log = EventLogWriter::create(&self.config.log_path)?;
        self.log_path = Some(log.path().to_path_buf());
        self.log = Some(log);
        self.clock.start(now);

        info!(elapsed = 0.0, "Recording started");
        self.bus.publish(SessionEvent::StartTime { epoch: now });
        Ok(())
    }

    /// Handles one line from the device.
    ///
    /// Malformed lines are logged and dropped. Only event log failures are
    /// returned as errors.
    pub fn ingest_line(&mut self, line: &str, now: f64) -> Result<Option<Sample>> {
        let message = match DeviceMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                self.drop_line(&e);
                return Ok(None);
            }
        };

        match message {
            DeviceMessage::Sample { voltage } => self.ingest_sample(voltage, now),
            DeviceMessage::Param(fields) => {
                info!(
                    elapsed = self.clock.elapsed_time,
                    "Change in parameters registered by device: {}",
                    fields.join(",")
                );
                Ok(None)
            }
            other => {
                debug!("Ignoring {} outside the handshake", other.label());
                Ok(None)
            }
        }
    }

    /// Counts and logs a device line that could not be used.
    pub fn drop_line(&mut self, reason: &AcquisitionError) {
        self.lines_dropped += 1;
        error!(
            elapsed = self.clock.elapsed_time,
            "Unable to parse the received data: {}", reason
        );
    }

    fn ingest_sample(&mut self, voltage: f64, now: f64) -> Result<Option<Sample>> {
        if !self.is_recording() {
            debug!("Sample received before recording started, ignoring");
            return Ok(None);
        }

        let time = match self.state {
            // elapsed time is frozen while paused
            SessionState::Paused => self.clock.elapsed_at(now),
            _ => self.clock.tick(now),
        };
        let sample = Sample::new(time, voltage, LIVE_CHANNEL);

        self.log_mut()?.append(&LogEvent::Data(sample))?;
        self.samples_recorded += 1;

        if self.state == SessionState::AwaitingPauseDecision {
            self.buffer.push(sample);
        } else {
            self.bus.publish(SessionEvent::Progress {
                samples: vec![sample],
            });
        }

        Ok(Some(sample))
    }

    pub fn pause(&mut self, now: f64) -> Result<()> {
        if !self.clock.is_started() {
            return Err(AcquisitionError::InvalidTransition {
                from: self.state,
                action: "pause before recording started",
            });
        }
        self.transition(SessionState::Paused, "pause")?;

        self.clock.begin_pause(now);
        self.pauses += 1;
        let time = self.clock.elapsed_time;
        self.append_and_flush(LogEvent::Pause { time })?;

        info!(elapsed = time, "Recording is paused");
        self.bus.publish(SessionEvent::Paused);
        Ok(())
    }

    /// Ends the pause and waits for a decision. Returns the pause duration.
    pub fn resume(&mut self, now: f64) -> Result<f64> {
        self.transition(SessionState::AwaitingPauseDecision, "resume")?;

        let paused_at = self.clock.pause_started_at.unwrap_or(now);
        let pause_duration = self.clock.pause_duration(now);
        let time = self.clock.elapsed_at(now);
        self.append_and_flush(LogEvent::Resume {
            time,
            pause_duration,
        })?;
        self.pending = Some(PendingPause {
            paused_at,
            pause_duration,
        });

        info!(
            elapsed = time,
            "Recording resumed after {:.4}s, awaiting decision on paused portion", pause_duration
        );
        Ok(pause_duration)
    }

    /// Applies the operator's decision on the pending pause.
    pub fn resolve_pause(&mut self, decision: PauseDecision, now: f64) -> Result<Annotation> {
        let pending = match (self.state, self.pending) {
            (SessionState::AwaitingPauseDecision, Some(pending)) => pending,
            _ => {
                return Err(AcquisitionError::InvalidTransition {
                    from: self.state,
                    action: "resolve a pause",
                })
            }
        };

        let time = self.clock.elapsed_at(now);
        self.append_and_flush(LogEvent::SaveDecision {
            time,
            keep: decision.keep(),
        })?;
        self.transition(SessionState::Streaming, "resolve a pause")?;
        self.pending = None;

        let resolution = decision::resolve(
            pending,
            decision,
            &mut self.clock,
            mem::take(&mut self.buffer),
            now,
        );

        match decision {
            PauseDecision::Keep => info!(
                elapsed = self.clock.elapsed_time,
                "Paused portion is saved, and recording is resumed"
            ),
            PauseDecision::Discard => info!(
                elapsed = self.clock.elapsed_time,
                "Paused portion is not saved, and recording is resumed"
            ),
        }

        self.bus.publish(SessionEvent::Resumed {
            keep: decision.keep(),
            buffer: resolution.released,
            pause_duration: pending.pause_duration,
        });
        self.bus.publish(SessionEvent::AnnotationAutogenerated {
            annotation: resolution.annotation.clone(),
        });
        Ok(resolution.annotation)
    }

    /// Writes END, closes the log and ends the session. Any pause must be
    /// resolved first. Returns the closed log, if recording ever started.
    pub fn finish(&mut self, now: f64) -> Result<Option<PathBuf>> {
        if self.state != SessionState::Streaming {
            return Err(AcquisitionError::InvalidTransition {
                from: self.state,
                action: "stop with an unresolved pause",
            });
        }

        let closed = match self.log.take() {
            Some(mut log) => {
                self.clock.ended_at = Some(now);
                let time = self.clock.tick(now);
                let event = LogEvent::End {
                    time,
                    summary: self.clock.summary(),
                };
                log.append(&event)?;
                log.flush()?;
                info!(elapsed = time, "Recording has stopped, saving recording");
                Some(log.close()?)
            }
            None => {
                warn!("Session stopped before recording started, no event log written");
                None
            }
        };

        self.transition(SessionState::Ended, "stop")?;
        self.bus.publish(SessionEvent::Finished);

        self.clock = SessionClock::default();
        self.buffer.clear();
        Ok(closed)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state,
            started_at: self
                .clock
                .started_at
                .and_then(|secs| Utc.timestamp_micros((secs * 1_000_000.0).round() as i64).single()),
            elapsed_secs: self.clock.elapsed_time,
            total_paused_secs: self.clock.total_time_paused,
            samples_recorded: self.samples_recorded,
            lines_dropped: self.lines_dropped,
            pauses: self.pauses,
            buffered: self.buffer.len(),
            log_path: self.log_path.clone(),
        }
    }
}
