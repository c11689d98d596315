use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::annotation::format_duration;
use crate::sample::round4;

/// Source of wall-clock time in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn starting_at(epoch_secs: f64) -> Self {
        let clock = Self::default();
        clock.set(epoch_secs);
        clock
    }

    pub fn set(&self, epoch_secs: f64) {
        self.micros
            .store((epoch_secs * 1_000_000.0).round() as i64, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.micros
            .fetch_add((secs * 1_000_000.0).round() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

/// Elapsed-time bookkeeping for one session. All instants are epoch seconds.
///
/// `elapsed_time` only advances through [`SessionClock::tick`], which the
/// session calls while playing; it stays frozen while paused.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionClock {
    pub started_at: Option<f64>,
    pub ended_at: Option<f64>,
    pub elapsed_time: f64,
    pub pause_started_at: Option<f64>,
    pub total_time_paused: f64,
}

impl SessionClock {
    pub fn start(&mut self, now: f64) {
        self.started_at = Some(now);
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// `now - total_time_paused - started_at`, rounded to 4 places.
    pub fn elapsed_at(&self, now: f64) -> f64 {
        match self.started_at {
            Some(started) => round4(now - self.total_time_paused - started),
            None => 0.0,
        }
    }

    /// Advances `elapsed_time` to `now`. Never moves it backwards.
    pub fn tick(&mut self, now: f64) -> f64 {
        self.elapsed_time = self.elapsed_time.max(self.elapsed_at(now));
        self.elapsed_time
    }

    pub fn begin_pause(&mut self, now: f64) {
        self.pause_started_at = Some(now);
    }

    /// Seconds since the current pause began.
    pub fn pause_duration(&self, now: f64) -> f64 {
        self.pause_started_at
            .map(|paused_at| round4((now - paused_at).max(0.0)))
            .unwrap_or(0.0)
    }

    /// Session-relative time at which the pause began.
    pub fn pause_marker_time(&self, paused_at: f64) -> f64 {
        match self.started_at {
            Some(started) => round4(paused_at - self.total_time_paused - started),
            None => 0.0,
        }
    }

    /// Removes a pause from the time base for good and re-reads the elapsed
    /// time at `now` on the new base.
    pub fn discard_pause(&mut self, pause_duration: f64, now: f64) {
        self.total_time_paused = round4(self.total_time_paused + pause_duration);
        self.elapsed_time = self.elapsed_at(now);
    }

    pub fn end_pause(&mut self) {
        self.pause_started_at = None;
    }

    /// Human-readable totals for the END row.
    pub fn summary(&self) -> String {
        let wall_clock = match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => ended - started,
            _ => 0.0,
        };
        format!(
            "Total elapsed time in hh:mm:ss: {}. Total recording time including time paused: {}. Computer clock says it has been {}",
            format_duration(self.elapsed_time),
            format_duration(self.elapsed_time + self.total_time_paused),
            format_duration(wall_clock)
        )
    }
}
