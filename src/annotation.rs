use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Point,
    Duration,
    Vertical,
}

/// A note attached to the recording timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    /// Session-relative start time in seconds
    pub time_start: f64,
    /// Wall clock at the annotated moment, e.g. "09/12 21:00 -07:00"
    pub clock_time: String,
    pub text: String,
    /// Seconds
    pub duration: f64,
    pub kind: AnnotationKind,
    pub channel: Option<u32>,
    /// Created by the session rather than by the user
    pub autogenerated: bool,
}

impl Annotation {
    /// Marker for a pause the operator resolved.
    pub fn pause_marker(time_start: f64, paused_at: f64, pause_duration: f64, kept: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            time_start,
            clock_time: format_clock_time(paused_at),
            text: format!("Paused for {:.4} seconds", pause_duration),
            // a discarded pause no longer occupies any of the timeline
            duration: if kept { pause_duration } else { 0.0 },
            kind: AnnotationKind::Vertical,
            channel: None,
            autogenerated: true,
        }
    }
}

/// Format epoch seconds as local `mm/dd HH:MM <offset>`.
pub fn format_clock_time(epoch_secs: f64) -> String {
    let millis = (epoch_secs * 1000.0).round() as i64;
    match Local.timestamp_millis_opt(millis).single() {
        Some(at) => at.format("%m/%d %H:%M %Z").to_string(),
        None => String::from("--/-- --:--"),
    }
}

/// Format a span of seconds as `HH:MM:SS`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(5.9), "00:00:05");
        assert_eq!(format_duration(3725.0), "01:02:05");
        assert_eq!(format_duration(-3.0), "00:00:00");
    }

    #[test]
    fn test_pause_marker_discarded_has_no_duration() {
        let kept = Annotation::pause_marker(2.0, 1_700_000_000.0, 3.0, true);
        let discarded = Annotation::pause_marker(2.0, 1_700_000_000.0, 3.0, false);

        assert_eq!(kept.duration, 3.0);
        assert_eq!(discarded.duration, 0.0);
        assert_eq!(kept.kind, AnnotationKind::Vertical);
        assert!(discarded.autogenerated);
        assert_eq!(discarded.text, "Paused for 3.0000 seconds");
    }
}
