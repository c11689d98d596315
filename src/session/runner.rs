use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use super::clock::Clock;
use super::decision::{OperatorPrompt, PauseDecision};
use super::session::AcquisitionSession;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::error::{AcquisitionError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::reconcile::{reconcile_file, ReconcileReport, TrailingSample};
use crate::serial::{AcquisitionParams, Command, Handshake, LineLink};

const REQUEST_QUEUE: usize = 16;

/// Operator commands accepted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    StartReading,
    Pause,
    Resume,
    /// Raw `PARAM,...` string
    SendParam(String),
    /// Resolves the pending pause; only valid while a decision is awaited
    Decide(PauseDecision),
    Stop,
}

impl SessionCommand {
    fn action(&self) -> &'static str {
        match self {
            SessionCommand::StartReading => "start recording",
            SessionCommand::Pause => "pause",
            SessionCommand::Resume => "resume",
            SessionCommand::SendParam(_) => "send parameters",
            SessionCommand::Decide(_) => "resolve a pause",
            SessionCommand::Stop => "stop",
        }
    }
}

#[derive(Debug)]
pub struct SessionRequest {
    pub command: SessionCommand,
    pub reply: oneshot::Sender<Result<()>>,
}

/// Cloneable front end of a [`SessionRunner`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<SessionRequest>,
    status: watch::Receiver<SessionStats>,
}

impl SessionHandle {
    /// Sends a command and waits until the session task has applied it.
    pub async fn request(&self, command: SessionCommand) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SessionRequest { command, reply })
            .await
            .map_err(|_| AcquisitionError::SessionEnded)?;
        response.await.map_err(|_| AcquisitionError::SessionEnded)?
    }

    pub async fn start_reading(&self) -> Result<()> {
        self.request(SessionCommand::StartReading).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(SessionCommand::Resume).await
    }

    pub async fn send_param(&self, param: impl Into<String>) -> Result<()> {
        self.request(SessionCommand::SendParam(param.into())).await
    }

    /// Resolves the pending pause. Returns once the decision is applied.
    pub async fn decide(&self, decision: PauseDecision) -> Result<()> {
        self.request(SessionCommand::Decide(decision)).await
    }

    /// Asks the session to stop. The outcome is returned by
    /// [`SessionRunner::run`].
    pub async fn stop(&self) -> Result<()> {
        self.request(SessionCommand::Stop).await
    }

    pub fn status(&self) -> SessionStats {
        self.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionStats> {
        self.status.clone()
    }
}

/// Session, device link and time source, borrowed apart from the prompt so
/// device lines keep flowing while a decision is pending.
struct Core<T> {
    session: AcquisitionSession,
    link: LineLink<T>,
    clock: Arc<dyn Clock>,
    link_open: bool,
}

impl<T> Core<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn on_line(&mut self, line: Result<Option<String>>) -> Result<()> {
        match line {
            Ok(Some(line)) => {
                let now = self.clock.now();
                self.session.ingest_line(&line, now)?;
            }
            Err(e @ AcquisitionError::MalformedSample { .. }) => self.session.drop_line(&e),
            Ok(None) => {
                warn!(
                    elapsed = self.session.clock().elapsed_time,
                    "Device link closed"
                );
                self.link_open = false;
            }
            Err(e) => {
                error!(
                    elapsed = self.session.clock().elapsed_time,
                    "Device link failed: {}", e
                );
                self.link_open = false;
            }
        }
        Ok(())
    }

    async fn apply(&mut self, command: &SessionCommand) -> Result<()> {
        let now = self.clock.now();
        match command {
            SessionCommand::StartReading => self.session.start_recording(now),
            SessionCommand::Pause => self.session.pause(now),
            SessionCommand::Resume => self.session.resume(now).map(|_| ()),
            SessionCommand::SendParam(raw) => self.send_param(raw).await,
            SessionCommand::Decide(_) => Err(AcquisitionError::InvalidTransition {
                from: self.session.state(),
                action: command.action(),
            }),
            SessionCommand::Stop => Ok(()),
        }
    }

    async fn send_param(&mut self, raw: &str) -> Result<()> {
        if !self.session.state().is_active() {
            return Err(AcquisitionError::InvalidTransition {
                from: self.session.state(),
                action: "send parameters",
            });
        }
        let params: AcquisitionParams = raw.parse()?;
        if !self.link_open {
            return Err(AcquisitionError::LinkClosed);
        }

        if let Err(e) = self.link.send(&Command::Param(params)).await {
            self.link_open = false;
            return Err(e);
        }
        info!(
            elapsed = self.session.clock().elapsed_time,
            "Sent parameters: Ri = {}, Gain = {}, Bias = {}, Freq = {}, Amp = {}",
            params.input_resistance,
            params.gain,
            params.bias,
            params.frequency,
            params.amplitude
        );
        Ok(())
    }
}

/// The single task that owns a session once the device is ready.
///
/// Device lines and operator commands are handled one at a time, so the
/// session state is never touched concurrently. A resume waits on the
/// [`OperatorPrompt`] while still reading the device; samples arriving in the
/// meantime are buffered by the session.
pub struct SessionRunner<T, P> {
    core: Core<T>,
    prompt: P,
    requests: mpsc::Receiver<SessionRequest>,
    status: watch::Sender<SessionStats>,
    stopping: bool,
}

impl<T, P> SessionRunner<T, P>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    P: OperatorPrompt,
{
    /// Runs the device handshake over `link`. Handshake errors are returned
    /// here and the session ends without streaming.
    pub async fn connect(
        mut session: AcquisitionSession,
        mut link: LineLink<T>,
        prompt: P,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, SessionHandle)> {
        session.begin_handshake()?;

        let config = session.config();
        let mut handshake = Handshake::new(config.sample_rate, config.params)
            .with_step_timeout(Duration::from_secs_f64(config.handshake_timeout_secs));
        if let Err(e) = handshake.run(&mut link).await {
            error!("Handshake failed while in {:?}: {}", handshake.step(), e);
            session.handshake_failed();
            return Err(e);
        }
        session.handshake_complete()?;

        let (requests_tx, requests) = mpsc::channel(REQUEST_QUEUE);
        let (status, status_rx) = watch::channel(session.stats());

        let runner = Self {
            core: Core {
                session,
                link,
                clock,
                link_open: true,
            },
            prompt,
            requests,
            status,
            stopping: false,
        };
        let handle = SessionHandle {
            requests: requests_tx,
            status: status_rx,
        };
        Ok((runner, handle))
    }

    pub fn stats(&self) -> SessionStats {
        self.core.session.stats()
    }

    fn publish_status(&self) {
        self.status.send_replace(self.core.session.stats());
    }

    /// Runs until stopped, the device hangs up or every handle is dropped.
    ///
    /// Returns the reconciliation report, or `None` when recording never
    /// started. Only an event log failure aborts without closing the log.
    pub async fn run(mut self) -> Result<Option<ReconcileReport>> {
        info!("Session {} running", self.core.session.config().session_id);

        while !self.stopping && self.core.link_open {
            tokio::select! {
                line = self.core.link.next_line(), if self.core.link_open => {
                    self.core.on_line(line)?;
                }
                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request).await?,
                    None => {
                        info!("All session handles dropped, stopping");
                        self.stopping = true;
                    }
                },
            }
            self.publish_status();
        }

        let outcome = self.stop().await;
        self.publish_status();
        outcome
    }

    async fn handle(&mut self, request: SessionRequest) -> Result<()> {
        let SessionRequest { command, reply } = request;
        if command == SessionCommand::Stop {
            self.stopping = true;
            let _ = reply.send(Ok(()));
            return Ok(());
        }

        match self.core.apply(&command).await {
            Err(AcquisitionError::LogWriteFailure(e)) => {
                error!("Event log failed, aborting session: {}", e);
                let _ = reply.send(Err(AcquisitionError::SessionAborted {
                    reason: e.to_string(),
                }));
                Err(AcquisitionError::LogWriteFailure(e))
            }
            Err(e) => {
                warn!("Rejected {:?}: {}", command, e);
                let _ = reply.send(Err(e));
                Ok(())
            }
            Ok(()) => {
                self.publish_status();
                let _ = reply.send(Ok(()));
                if command == SessionCommand::Resume {
                    self.await_decision().await?;
                }
                Ok(())
            }
        }
    }

    /// Blocks the session on the operator's decision, buffering device lines
    /// until it arrives from the prompt or as a [`SessionCommand::Decide`].
    async fn await_decision(&mut self) -> Result<()> {
        self.publish_status();
        let pause_duration = self
            .core
            .session
            .pending_pause()
            .map_or(0.0, |pending| pending.pause_duration);

        let (decision, reply) = {
            let mut decide = self.prompt.decide_pause(pause_duration);

            loop {
                tokio::select! {
                    biased;
                    decision = &mut decide => break (decision, None),
                    request = self.requests.recv() => match request {
                        Some(SessionRequest {
                            command: SessionCommand::Decide(decision),
                            reply,
                        }) => break (decision, Some(reply)),
                        Some(SessionRequest { command, reply }) => {
                            let result = match command {
                                SessionCommand::Stop => {
                                    self.stopping = true;
                                    Ok(())
                                }
                                SessionCommand::SendParam(raw) => self.core.send_param(&raw).await,
                                other => Err(AcquisitionError::InvalidTransition {
                                    from: self.core.session.state(),
                                    action: other.action(),
                                }),
                            };
                            let _ = reply.send(result);
                        }
                        None => {
                            warn!("All session handles dropped while a decision was pending, keeping paused portion");
                            break (PauseDecision::Keep, None);
                        }
                    },
                    line = self.core.link.next_line(), if self.core.link_open => {
                        self.core.on_line(line)?;
                        self.status.send_replace(self.core.session.stats());
                    }
                }
            }
        };

        let now = self.core.clock.now();
        match self.core.session.resolve_pause(decision, now) {
            Ok(_) => {
                self.publish_status();
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to apply pause decision: {}", e);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(AcquisitionError::SessionAborted {
                        reason: e.to_string(),
                    }));
                }
                Err(e)
            }
        }
    }

    /// Resolves any open pause, closes the log and reconciles it.
    async fn stop(&mut self) -> Result<Option<ReconcileReport>> {
        match self.core.session.state() {
            SessionState::Paused => {
                info!("Stopping while paused, resuming first");
                let now = self.core.clock.now();
                self.core.session.resume(now)?;
                self.await_decision().await?;
            }
            SessionState::AwaitingPauseDecision => self.await_decision().await?,
            _ => {}
        }

        let now = self.core.clock.now();
        let log_path = match self.core.session.finish(now)? {
            Some(log_path) => log_path,
            None => return Ok(None),
        };
        self.publish_status();

        let bus = self.core.session.bus().clone();
        let trailing = self.core.session.config().trailing_sample;
        let report = reconcile_log(bus, log_path, trailing).await?;
        if self.prompt.review_processed(&report).await {
            self.core.session.bus().publish(SessionEvent::Processed {
                output_basename: report.basename.clone(),
            });
        }
        Ok(Some(report))
    }
}

/// Reconciles a closed log off the async threads, publishing progress.
async fn reconcile_log(
    bus: EventBus,
    log_path: PathBuf,
    trailing: TrailingSample,
) -> Result<ReconcileReport> {
    tokio::task::spawn_blocking(move || {
        reconcile_file(&log_path, trailing, |progress| {
            bus.publish(SessionEvent::ReconcileProgress(progress))
        })
    })
    .await
    .map_err(|e| AcquisitionError::SessionAborted {
        reason: format!("reconciliation task failed: {}", e),
    })?
}
