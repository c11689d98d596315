use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AcquisitionError, Result};
use crate::eventlog::LogEvent;
use crate::sample::Sample;

/// What to do with the last retained sample of a reconciled series.
///
/// Older recordings were post-processed with the final row always removed;
/// `Drop` reproduces that for compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSample {
    #[default]
    Keep,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileProgress {
    /// Pause intervals resolved so far
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSeries {
    pub samples: Vec<Sample>,
    pub pauses: usize,
    pub pauses_discarded: usize,
    /// Data rows removed because they fell inside a discarded pause
    pub samples_discarded: usize,
    pub trailing_dropped: bool,
}

/// The pause interval currently being read.
enum Window {
    Closed,
    /// Between PAUSE and RESUME
    Paused { held: Vec<Sample> },
    /// Between RESUME and SAVE
    Resumed {
        held: Vec<Sample>,
        after: Vec<Sample>,
        offset: f64,
    },
}

/// Rewrites an ordered session log into a gap-free sample series.
///
/// Single forward pass. Samples inside an open pause interval are held until
/// its SAVE row is read; a discarded interval drops the samples recorded
/// while paused and moves the samples between RESUME and SAVE back by the
/// pause duration. Samples after SAVE were already timed without the pause.
pub fn reconcile(
    events: &[LogEvent],
    trailing: TrailingSample,
    mut on_progress: impl FnMut(ReconcileProgress),
) -> Result<ReconciledSeries> {
    let total = events
        .iter()
        .filter(|e| matches!(e, LogEvent::Pause { .. }))
        .count();

    let mut samples = Vec::new();
    let mut window = Window::Closed;
    let mut ended = false;
    let mut done = 0;
    let mut pauses_discarded = 0;
    let mut samples_discarded = 0;

    for (index, event) in events.iter().enumerate() {
        let line = index + 1;
        if ended {
            return Err(AcquisitionError::parse_failure(
                line,
                format!("{} row after END", event.label()),
            ));
        }

        let next = match (event, &mut window) {
            (LogEvent::Data(sample), Window::Closed) => {
                samples.push(*sample);
                None
            }
            (LogEvent::Data(sample), Window::Paused { held }) => {
                held.push(*sample);
                None
            }
            (LogEvent::Data(sample), Window::Resumed { after, .. }) => {
                after.push(*sample);
                None
            }

            (LogEvent::Pause { .. }, Window::Closed) => Some(Window::Paused { held: Vec::new() }),
            (LogEvent::Resume { pause_duration, .. }, Window::Paused { held }) => {
                if !pause_duration.is_finite() || *pause_duration < 0.0 {
                    return Err(AcquisitionError::parse_failure(
                        line,
                        format!("invalid pause duration {}", pause_duration),
                    ));
                }
                Some(Window::Resumed {
                    held: mem::take(held),
                    after: Vec::new(),
                    offset: *pause_duration,
                })
            }
            (LogEvent::SaveDecision { keep, .. }, Window::Resumed { held, after, offset }) => {
                if *keep {
                    samples.append(held);
                    samples.append(after);
                } else {
                    pauses_discarded += 1;
                    samples_discarded += held.len();
                    samples.extend(after.iter().map(|s| s.shifted(*offset)));
                }

                done += 1;
                on_progress(ReconcileProgress { done, total });
                debug!(
                    "Resolved pause {}/{} ({})",
                    done,
                    total,
                    if *keep { "kept" } else { "discarded" }
                );
                Some(Window::Closed)
            }
            (LogEvent::End { .. }, Window::Closed) => {
                ended = true;
                None
            }

            (LogEvent::End { .. }, _) => {
                return Err(AcquisitionError::parse_failure(
                    line,
                    "END inside an unresolved pause",
                ));
            }
            (other, _) => {
                return Err(AcquisitionError::parse_failure(
                    line,
                    format!("{} row out of PAUSE/RESUME/SAVE order", other.label()),
                ));
            }
        };

        if let Some(next) = next {
            window = next;
        }
    }

    if !ended {
        return Err(AcquisitionError::parse_failure(
            events.len(),
            "log has no END row",
        ));
    }

    let trailing_dropped = trim_trailing(&mut samples, trailing);

    if let Some(pair) = samples.windows(2).find(|pair| pair[1].time < pair[0].time) {
        warn!(
            "Reconciled series is not monotonic: {:.4} follows {:.4}",
            pair[1].time, pair[0].time
        );
    }

    Ok(ReconciledSeries {
        samples,
        pauses: total,
        pauses_discarded,
        samples_discarded,
        trailing_dropped,
    })
}

/// Applies the trailing-sample policy; returns whether a sample was removed.
pub fn trim_trailing(samples: &mut Vec<Sample>, policy: TrailingSample) -> bool {
    match policy {
        TrailingSample::Keep => false,
        TrailingSample::Drop => samples.pop().is_some(),
    }
}
