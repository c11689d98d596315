use async_trait::async_trait;
use futures::future;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::clock::SessionClock;
use crate::annotation::Annotation;
use crate::reconcile::ReconcileReport;
use crate::sample::Sample;

/// What to do with a paused interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseDecision {
    /// Keep the samples recorded during the pause, timestamps unchanged
    Keep,
    /// Splice the pause out of the timeline
    Discard,
}

impl PauseDecision {
    pub fn from_keep(keep: bool) -> Self {
        if keep {
            PauseDecision::Keep
        } else {
            PauseDecision::Discard
        }
    }

    pub fn keep(self) -> bool {
        self == PauseDecision::Keep
    }
}

/// A resumed pause waiting for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PendingPause {
    /// Epoch seconds
    pub paused_at: f64,
    pub pause_duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub decision: PauseDecision,
    /// Samples to hand downstream, on the final time base
    pub released: Vec<Sample>,
    pub annotation: Annotation,
}

/// Applies a decision to the samples held back by a pause.
///
/// `buffer` holds the samples that arrived while the decision was pending.
/// Keeping releases them untouched. Discarding moves them back by the pause
/// duration and adds the pause to the clock's paused total. Either way the
/// elapsed time is brought up to `now` on the resulting time base.
pub fn resolve(
    pending: PendingPause,
    decision: PauseDecision,
    clock: &mut SessionClock,
    buffer: Vec<Sample>,
    now: f64,
) -> Resolution {
    // marker time is taken before the pause joins the paused total
    let time_start = clock.pause_marker_time(pending.paused_at);

    let released = match decision {
        PauseDecision::Keep => {
            clock.tick(now);
            buffer
        }
        PauseDecision::Discard => {
            clock.discard_pause(pending.pause_duration, now);
            buffer
                .iter()
                .map(|sample| sample.shifted(pending.pause_duration))
                .collect()
        }
    };
    clock.end_pause();

    let annotation = Annotation::pause_marker(
        time_start,
        pending.paused_at,
        pending.pause_duration,
        decision.keep(),
    );

    Resolution {
        decision,
        released,
        annotation,
    }
}

/// The operator side of the session: answers pause decisions and whether to
/// open the reconciled series.
///
/// A decision sent as [`SessionCommand::Decide`](super::SessionCommand::Decide)
/// wins over a prompt that has not answered yet.
#[async_trait]
pub trait OperatorPrompt: Send {
    async fn decide_pause(&mut self, pause_duration: f64) -> PauseDecision;

    async fn review_processed(&mut self, report: &ReconcileReport) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt {
    pub decision: PauseDecision,
    pub review: bool,
}

#[async_trait]
impl OperatorPrompt for FixedPrompt {
    async fn decide_pause(&mut self, pause_duration: f64) -> PauseDecision {
        info!(
            "Pause of {:.4}s resolved by policy: {:?}",
            pause_duration, self.decision
        );
        self.decision
    }

    async fn review_processed(&mut self, _report: &ReconcileReport) -> bool {
        self.review
    }
}

/// Never answers; decisions arrive as session commands, e.g. from the HTTP
/// API.
#[derive(Debug, Clone, Copy)]
pub struct DeferredPrompt {
    pub review: bool,
}

#[async_trait]
impl OperatorPrompt for DeferredPrompt {
    async fn decide_pause(&mut self, pause_duration: f64) -> PauseDecision {
        info!("Waiting for decision on pause of {:.4}s", pause_duration);
        future::pending().await
    }

    async fn review_processed(&mut self, _report: &ReconcileReport) -> bool {
        self.review
    }
}
