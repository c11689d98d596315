use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// One line of the per-session event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    Data(Sample),
    Pause { time: f64 },
    Resume { time: f64, pause_duration: f64 },
    SaveDecision { time: f64, keep: bool },
    End { time: f64, summary: String },
}

impl LogEvent {
    pub fn time(&self) -> f64 {
        match self {
            LogEvent::Data(sample) => sample.time,
            LogEvent::Pause { time }
            | LogEvent::Resume { time, .. }
            | LogEvent::SaveDecision { time, .. }
            | LogEvent::End { time, .. } => *time,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LogEvent::Data(_) => "DATA",
            LogEvent::Pause { .. } => "PAUSE",
            LogEvent::Resume { .. } => "RESUME",
            LogEvent::SaveDecision { .. } => "SAVE",
            LogEvent::End { .. } => "END",
        }
    }

    /// Parse one log line (without its trailing newline).
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(3, ',');

        let time_field = fields.next().unwrap_or_default();
        let time: f64 = time_field
            .trim()
            .parse()
            .map_err(|_| format!("invalid time {:?}", time_field))?;
        let label = fields
            .next()
            .ok_or_else(|| "missing event label".to_string())?
            .trim();
        let rest = fields.next();

        match label {
            "DATA" => {
                let rest = rest.ok_or_else(|| "DATA row without values".to_string())?;
                let (voltage, channel) = rest
                    .split_once(',')
                    .ok_or_else(|| "DATA row needs voltage and channel".to_string())?;
                let voltage: f64 = voltage
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid voltage {:?}", voltage))?;
                let channel: u32 = channel
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid channel {:?}", channel))?;
                Ok(LogEvent::Data(Sample::new(time, voltage, channel)))
            }
            "PAUSE" => match rest {
                None => Ok(LogEvent::Pause { time }),
                Some(extra) => Err(format!("unexpected PAUSE fields {:?}", extra)),
            },
            "RESUME" => {
                let duration = rest.ok_or_else(|| "RESUME row without pause duration".to_string())?;
                let pause_duration: f64 = duration
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid pause duration {:?}", duration))?;
                Ok(LogEvent::Resume {
                    time,
                    pause_duration,
                })
            }
            "SAVE" => match rest.map(str::trim) {
                Some("T") => Ok(LogEvent::SaveDecision { time, keep: true }),
                Some("F") => Ok(LogEvent::SaveDecision { time, keep: false }),
                other => Err(format!("SAVE decision must be T or F, got {:?}", other)),
            },
            "END" => Ok(LogEvent::End {
                time,
                summary: rest.unwrap_or_default().to_string(),
            }),
            other => Err(format!("unknown event label {:?}", other)),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::Data(sample) => write!(
                f,
                "{:.4},DATA,{:.4},{}",
                sample.time, sample.voltage, sample.channel
            ),
            LogEvent::Pause { time } => write!(f, "{:.4},PAUSE", time),
            LogEvent::Resume {
                time,
                pause_duration,
            } => write!(f, "{:.4},RESUME,{:.4}", time, pause_duration),
            LogEvent::SaveDecision { time, keep } => {
                write!(f, "{:.4},SAVE,{}", time, if *keep { "T" } else { "F" })
            }
            // one event per line
            LogEvent::End { time, summary } => {
                write!(f, "{:.4},END,{}", time, summary.replace(['\r', '\n'], " "))
            }
        }
    }
}
