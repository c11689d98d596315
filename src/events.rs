use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::annotation::Annotation;
use crate::reconcile::ReconcileProgress;
use crate::sample::Sample;

/// Notifications published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Handshake done, recording can start
    Ready,
    /// Live samples for the chart
    Progress { samples: Vec<Sample> },
    Paused,
    /// A pause was resolved; `buffer` holds the samples released by it, already
    /// on the final time base
    Resumed {
        keep: bool,
        buffer: Vec<Sample>,
        pause_duration: f64,
    },
    /// Recording stopped and the log is closed
    Finished,
    ReconcileProgress(ReconcileProgress),
    /// Reconciled series ready for review at `<output_basename>_processed.csv`
    Processed { output_basename: PathBuf },
    /// Recording start as epoch seconds
    StartTime { epoch: f64 },
    AnnotationAutogenerated { annotation: Annotation },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Ready => "ready",
            SessionEvent::Progress { .. } => "progress",
            SessionEvent::Paused => "paused",
            SessionEvent::Resumed { .. } => "resumed",
            SessionEvent::Finished => "finished",
            SessionEvent::ReconcileProgress(_) => "reconcile_progress",
            SessionEvent::Processed { .. } => "processed",
            SessionEvent::StartTime { .. } => "start_time",
            SessionEvent::AnnotationAutogenerated { .. } => "annotation_autogenerated",
        }
    }
}

/// Publish/subscribe fan-out of [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => trace!("Published {} to {} subscriber(s)", name, receivers),
            Err(_) => trace!("Published {} with no subscribers", name),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_their_name() {
        let paused = serde_json::to_value(SessionEvent::Paused).unwrap();
        assert_eq!(paused, serde_json::json!({ "event": "paused" }));

        let progress = SessionEvent::ReconcileProgress(ReconcileProgress { done: 1, total: 2 });
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            serde_json::json!({ "event": progress.name(), "done": 1, "total": 2 })
        );
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        bus.publish(SessionEvent::Ready);

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.publish(SessionEvent::StartTime { epoch: 12.5 });

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.try_recv().unwrap(), SessionEvent::StartTime { epoch: 12.5 });
            assert!(rx.try_recv().is_err());
        }
    }
}
