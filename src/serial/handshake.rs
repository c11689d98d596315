use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use super::link::LineLink;
use super::protocol::{AcquisitionParams, Command};
use crate::error::{AcquisitionError, Result};

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandshakeStep {
    AwaitInit,
    AwaitBegin,
    AwaitParam,
    Ready,
}

impl HandshakeStep {
    /// The only label that advances this step.
    pub fn expected_label(self) -> Option<&'static str> {
        match self {
            HandshakeStep::AwaitInit => Some("INIT"),
            HandshakeStep::AwaitBegin => Some("BEGIN"),
            HandshakeStep::AwaitParam => Some("PARAM"),
            HandshakeStep::Ready => None,
        }
    }
}

/// INIT → BEGIN → PARAM exchange that brings the device to streaming.
#[derive(Debug, Clone)]
pub struct Handshake {
    step: HandshakeStep,
    sample_rate: u32,
    params: AcquisitionParams,
    step_timeout: Duration,
}

impl Handshake {
    pub fn new(sample_rate: u32, params: AcquisitionParams) -> Self {
        Self {
            step: HandshakeStep::AwaitInit,
            sample_rate,
            params,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Bounds how long any one step waits for its line.
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn step(&self) -> HandshakeStep {
        self.step
    }

    pub fn is_ready(&self) -> bool {
        self.step == HandshakeStep::Ready
    }

    /// Feeds one device line. Returns the command to send when the line
    /// advanced the exchange; lines with any other label are ignored.
    pub fn on_line(&mut self, line: &str) -> Option<Command> {
        let label = line.split(',').next().unwrap_or_default().trim();
        if self.step.expected_label() != Some(label) {
            debug!("Ignoring {:?} while in {:?}", line, self.step);
            return None;
        }

        match self.step {
            HandshakeStep::AwaitInit => {
                info!("INIT received, device initialization is complete");
                self.step = HandshakeStep::AwaitBegin;
                Some(Command::Begin {
                    sample_rate: self.sample_rate,
                })
            }
            HandshakeStep::AwaitBegin => {
                info!(
                    "BEGIN received, sending default parameters: Ri = {}, Gain = {}, Bias = {}, Freq = {}, Amp = {}",
                    self.params.input_resistance,
                    self.params.gain,
                    self.params.bias,
                    self.params.frequency,
                    self.params.amplitude
                );
                self.step = HandshakeStep::AwaitParam;
                Some(Command::Param(self.params))
            }
            HandshakeStep::AwaitParam => {
                info!("Default parameter values are set, ready to record");
                self.step = HandshakeStep::Ready;
                None
            }
            HandshakeStep::Ready => None,
        }
    }

    /// Drives the exchange over `link` until the device is ready.
    ///
    /// Fails with [`AcquisitionError::HandshakeTimeout`] when a step gets no
    /// answer in time; there is no retry.
    pub async fn run<T>(&mut self, link: &mut LineLink<T>) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut step = self.step;
        let mut deadline = Instant::now() + self.step_timeout;

        while !self.is_ready() {
            let line = match timeout_at(deadline, link.next_line()).await {
                Err(_) => {
                    return Err(AcquisitionError::HandshakeTimeout {
                        step: self.step,
                        secs: self.step_timeout.as_secs_f64(),
                    })
                }
                Ok(Err(e @ AcquisitionError::MalformedSample { .. })) => {
                    debug!("Ignoring undecodable line while in {:?}: {}", self.step, e);
                    continue;
                }
                Ok(line) => line?.ok_or(AcquisitionError::LinkClosed)?,
            };

            if let Some(command) = self.on_line(&line) {
                link.send(&command).await?;
            }
            if self.step != step {
                step = self.step;
                deadline = Instant::now() + self.step_timeout;
            }
        }
        Ok(())
    }
}
