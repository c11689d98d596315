use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};
use crate::sample::LIVE_CHANNEL;

/// A line received from the acquisition device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// Boot complete
    Init,
    /// Sample rate acknowledged
    Begin,
    /// Parameter change acknowledged; carries the echoed fields
    Param(Vec<String>),
    /// `O,<voltage>[,...]`
    Sample { voltage: f64 },
}

impl DeviceMessage {
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.trim().split(',').map(str::trim);
        let label = fields.next().unwrap_or_default();

        match label {
            "INIT" => Ok(DeviceMessage::Init),
            "BEGIN" => Ok(DeviceMessage::Begin),
            "PARAM" => Ok(DeviceMessage::Param(fields.map(String::from).collect())),
            "O" => {
                let raw = fields
                    .next()
                    .ok_or_else(|| AcquisitionError::malformed(line, "sample without voltage"))?;
                let voltage: f64 = raw
                    .parse()
                    .map_err(|_| AcquisitionError::malformed(line, format!("invalid voltage {:?}", raw)))?;
                if !voltage.is_finite() {
                    return Err(AcquisitionError::malformed(line, "voltage is not finite"));
                }
                Ok(DeviceMessage::Sample { voltage })
            }
            "" => Err(AcquisitionError::malformed(line, "empty line")),
            other => Err(AcquisitionError::malformed(
                line,
                format!("unknown label {:?}", other),
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceMessage::Init => "INIT",
            DeviceMessage::Begin => "BEGIN",
            DeviceMessage::Param(_) => "PARAM",
            DeviceMessage::Sample { .. } => "O",
        }
    }
}

/// Acquisition settings sent with `PARAM`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionParams {
    pub channel: u32,
    /// Ohms
    pub input_resistance: u64,
    pub gain: f64,
    /// DC bias
    pub bias: f64,
    /// Excitation frequency in Hz
    pub frequency: u32,
    /// Excitation amplitude
    pub amplitude: f64,
}

impl Default for AcquisitionParams {
    fn default() -> Self {
        Self {
            channel: LIVE_CHANNEL,
            input_resistance: 100_000,
            gain: 0.0,
            bias: 1.0,
            frequency: 1000,
            amplitude: 0.0,
        }
    }
}

impl fmt::Display for AcquisitionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PARAM,{},{},{},{},{},{}",
            self.channel,
            self.input_resistance,
            self.gain,
            self.bias,
            self.frequency,
            self.amplitude
        )
    }
}

impl FromStr for AcquisitionParams {
    type Err = AcquisitionError;

    /// Parses `PARAM,<channel>,<ri>,<gain>,<bias>,<freq>,<amp>`.
    fn from_str(param: &str) -> Result<Self> {
        let invalid = |reason: String| AcquisitionError::InvalidParam {
            param: param.trim().to_string(),
            reason,
        };

        let fields: Vec<&str> = param.trim().split(',').map(str::trim).collect();
        if fields.first() != Some(&"PARAM") {
            return Err(invalid("must start with PARAM".to_string()));
        }
        if fields.len() != 7 {
            return Err(invalid(format!("expected 7 fields, got {}", fields.len())));
        }

        let number = |index: usize, name: &str| -> Result<f64> {
            let value: f64 = fields[index]
                .parse()
                .map_err(|_| invalid(format!("{} {:?} is not a number", name, fields[index])))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(invalid(format!("{} is not finite", name)))
            }
        };
        let whole = |index: usize, name: &str| -> Result<f64> {
            let value = number(index, name)?;
            if value < 0.0 {
                return Err(invalid(format!("{} must not be negative", name)));
            }
            Ok(value.trunc())
        };

        let channel = whole(1, "channel")? as u32;
        if channel != LIVE_CHANNEL {
            return Err(invalid(format!(
                "only channel {} is acquired live",
                LIVE_CHANNEL
            )));
        }

        Ok(Self {
            channel,
            input_resistance: whole(2, "input resistance")? as u64,
            gain: number(3, "gain")?,
            bias: number(4, "bias")?,
            frequency: whole(5, "frequency")? as u32,
            amplitude: number(6, "amplitude")?,
        })
    }
}

/// A line sent to the acquisition device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Begin { sample_rate: u32 },
    Param(AcquisitionParams),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Begin { sample_rate } => write!(f, "BEGIN,{}", sample_rate),
            Command::Param(params) => write!(f, "{}", params),
        }
    }
}
