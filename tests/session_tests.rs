// Integration tests for the acquisition session state machine
//
// The session is driven directly with explicit epoch times, so every
// timestamp in these tests is exact. Recording starts at epoch 1000.

use anyhow::Result;
use epg_acquire::eventlog::read_log;
use epg_acquire::reconcile::{load_processed, reconcile_file, TrailingSample};
use epg_acquire::session::{AcquisitionSession, PauseDecision, SessionConfig, SessionState};
use epg_acquire::{AcquisitionError, AnnotationKind, EventBus, LogEvent, SessionEvent};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::broadcast;

const T0: f64 = 1000.0;

fn streaming_session(
    dir: &TempDir,
) -> Result<(AcquisitionSession, broadcast::Receiver<SessionEvent>)> {
    let bus = EventBus::default();
    let events = bus.subscribe();

    let config = SessionConfig {
        session_id: "test-session".to_string(),
        log_path: dir.path().join("epgOutput.csv"),
        ..SessionConfig::default()
    };
    let mut session = AcquisitionSession::new(config, bus);
    session.begin_handshake()?;
    session.handshake_complete()?;
    session.start_recording(T0)?;
    Ok((session, events))
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Samples at 0, 1, 2; pause at 2 for 3s; two samples at 5 and 6 while the
/// decision is pending; decision at 6.5; stop at 7.
fn run_pause_scenario(
    session: &mut AcquisitionSession,
    decision: PauseDecision,
) -> Result<Option<PathBuf>> {
    for t in [0.0, 1.0, 2.0] {
        session.ingest_line("O,0.5", T0 + t)?;
    }
    session.pause(T0 + 2.0)?;
    session.resume(T0 + 5.0)?;
    session.ingest_line("O,0.6", T0 + 5.0)?;
    session.ingest_line("O,0.7", T0 + 6.0)?;
    session.resolve_pause(decision, T0 + 6.5)?;
    Ok(session.finish(T0 + 7.0)?)
}

fn processed_times(log_path: &PathBuf) -> Result<Vec<f64>> {
    let report = reconcile_file(log_path, TrailingSample::Keep, |_| {})?;
    Ok(load_processed(&report.output_path)?
        .iter()
        .map(|s| s.time)
        .collect())
}

#[test]
fn test_discarded_pause_is_spliced_out() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, mut events) = streaming_session(&dir)?;

    let log_path = run_pause_scenario(&mut session, PauseDecision::Discard)?
        .expect("recording started, log must exist");

    // The live buffer is released already shifted
    let resumed = drain(&mut events)
        .into_iter()
        .find_map(|event| match event {
            SessionEvent::Resumed {
                keep,
                buffer,
                pause_duration,
            } => Some((keep, buffer, pause_duration)),
            _ => None,
        })
        .expect("resumed event");
    assert!(!resumed.0);
    assert_eq!(resumed.2, 3.0);
    let buffered: Vec<f64> = resumed.1.iter().map(|s| s.time).collect();
    assert_eq!(buffered, vec![2.0, 3.0]);

    assert_eq!(processed_times(&log_path)?, vec![0.0, 1.0, 2.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn test_kept_pause_preserves_timestamps() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, _events) = streaming_session(&dir)?;

    let log_path = run_pause_scenario(&mut session, PauseDecision::Keep)?
        .expect("recording started, log must exist");

    assert_eq!(processed_times(&log_path)?, vec![0.0, 1.0, 2.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn test_event_log_contents() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, _events) = streaming_session(&dir)?;

    let log_path = run_pause_scenario(&mut session, PauseDecision::Discard)?
        .expect("recording started, log must exist");
    let log = read_log(&log_path)?;

    let labels: Vec<&str> = log.iter().map(|e| e.label()).collect();
    assert_eq!(
        labels,
        vec!["DATA", "DATA", "DATA", "PAUSE", "RESUME", "DATA", "DATA", "SAVE", "END"]
    );
    assert_eq!(log[3], LogEvent::Pause { time: 2.0 });
    assert_eq!(
        log[4],
        LogEvent::Resume {
            time: 5.0,
            pause_duration: 3.0
        }
    );
    assert_eq!(
        log[7],
        LogEvent::SaveDecision {
            time: 6.5,
            keep: false
        }
    );

    match &log[8] {
        LogEvent::End { time, summary } => {
            // 7s on the wall clock, 3s of it discarded
            assert_eq!(*time, 4.0);
            assert!(summary.contains("Total elapsed time in hh:mm:ss: 00:00:04"));
            assert!(summary.contains("Computer clock says it has been 00:00:07"));
        }
        other => panic!("expected END, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_elapsed_time_monotonic_while_playing() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, _events) = streaming_session(&dir)?;

    let mut times = Vec::new();
    for t in [0.0, 0.01, 0.02, 0.5, 0.49, 1.0] {
        let sample = session
            .ingest_line("O,1.25", T0 + t)?
            .expect("sample accepted while streaming");
        times.push(sample.time);
    }

    assert!(times.windows(2).all(|w| w[0] <= w[1]), "{:?}", times);
    assert_eq!(session.clock().elapsed_time, 1.0);
    Ok(())
}

#[test]
fn test_samples_buffered_until_decision() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, mut events) = streaming_session(&dir)?;

    session.ingest_line("O,0.1", T0 + 1.0)?;
    session.pause(T0 + 1.0)?;
    session.resume(T0 + 2.0)?;
    drain(&mut events);

    session.ingest_line("O,0.2", T0 + 2.5)?;
    session.ingest_line("O,0.3", T0 + 3.0)?;

    // Nothing is emitted while the decision is pending
    assert!(drain(&mut events).is_empty());
    assert_eq!(session.state(), SessionState::AwaitingPauseDecision);
    assert_eq!(session.stats().buffered, 2);
    assert_eq!(session.buffered()[1].voltage, 0.3);

    session.resolve_pause(PauseDecision::Keep, T0 + 3.0)?;

    let released = drain(&mut events);
    assert!(matches!(
        &released[0],
        SessionEvent::Resumed { buffer, .. } if buffer.len() == 2
    ));
    assert_eq!(session.stats().buffered, 0);
    assert_eq!(session.state(), SessionState::Streaming);

    // Streaming again emits straight away
    session.ingest_line("O,0.4", T0 + 4.0)?;
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::Progress { samples }] if samples.len() == 1
    ));
    Ok(())
}

#[test]
fn test_samples_while_paused_are_emitted_live() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, mut events) = streaming_session(&dir)?;

    session.ingest_line("O,0.1", T0 + 0.5)?;
    session.pause(T0 + 1.0)?;
    drain(&mut events);

    let live = session
        .ingest_line("O,0.9", T0 + 1.5)?
        .expect("sample is logged while paused");
    assert_eq!(live.time, 1.5);
    // elapsed time is frozen while paused
    assert_eq!(session.clock().elapsed_time, 0.5);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::Progress { samples }] if samples[0] == live
    ));
    assert_eq!(session.stats().buffered, 0);

    session.resume(T0 + 2.0)?;
    session.resolve_pause(PauseDecision::Discard, T0 + 2.0)?;

    // only samples from the pending decision are released
    match drain(&mut events).first() {
        Some(SessionEvent::Resumed { buffer, keep, .. }) => {
            assert!(!keep);
            assert!(buffer.is_empty());
        }
        other => panic!("expected resumed, got {:?}", other),
    }
    // 2s on the wall clock, 1s of it discarded
    assert_eq!(session.stats().elapsed_secs, 1.0);

    // reconciliation drops the paused row
    let log_path = session.finish(T0 + 3.0)?.expect("log exists");
    assert_eq!(processed_times(&log_path)?, vec![0.5]);
    Ok(())
}

#[test]
fn test_existing_log_is_not_overwritten_on_start() -> Result<()> {
    let dir = TempDir::new()?;
    let log_path = dir.path().join("epgOutput.csv");
    std::fs::write(&log_path, "0.0000,END,previous session\n")?;

    let config = SessionConfig {
        log_path: log_path.clone(),
        ..SessionConfig::default()
    };
    let mut session = AcquisitionSession::new(config, EventBus::default());
    session.begin_handshake()?;
    session.handshake_complete()?;

    assert!(matches!(
        session.start_recording(T0),
        Err(AcquisitionError::LogExists { .. })
    ));
    assert!(!session.is_recording());
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(
        std::fs::read_to_string(&log_path)?,
        "0.0000,END,previous session\n"
    );
    Ok(())
}

#[test]
fn test_pause_annotation() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, mut events) = streaming_session(&dir)?;

    session.ingest_line("O,0.1", T0 + 2.0)?;
    session.pause(T0 + 2.0)?;
    session.resume(T0 + 5.0)?;
    let annotation = session.resolve_pause(PauseDecision::Keep, T0 + 5.0)?;

    assert_eq!(annotation.time_start, 2.0);
    assert_eq!(annotation.duration, 3.0);
    assert_eq!(annotation.text, "Paused for 3.0000 seconds");
    assert_eq!(annotation.kind, AnnotationKind::Vertical);
    assert!(annotation.autogenerated);

    let published = drain(&mut events).into_iter().any(|event| {
        matches!(event, SessionEvent::AnnotationAutogenerated { annotation: a } if a.id == annotation.id)
    });
    assert!(published, "annotation should be published");
    Ok(())
}

#[test]
fn test_invalid_transitions_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;

    // Pausing before the handshake
    let mut idle = AcquisitionSession::new(SessionConfig::default(), EventBus::default());
    assert!(matches!(
        idle.pause(T0),
        Err(AcquisitionError::InvalidTransition { .. })
    ));
    assert_eq!(idle.state(), SessionState::Idle);

    let (mut session, _events) = streaming_session(&dir)?;

    assert!(matches!(
        session.resume(T0 + 1.0),
        Err(AcquisitionError::InvalidTransition {
            from: SessionState::Streaming,
            ..
        })
    ));
    assert!(matches!(
        session.resolve_pause(PauseDecision::Keep, T0 + 1.0),
        Err(AcquisitionError::InvalidTransition { .. })
    ));
    assert!(matches!(
        session.start_recording(T0 + 1.0),
        Err(AcquisitionError::InvalidTransition { .. })
    ));

    session.pause(T0 + 1.0)?;
    assert!(matches!(
        session.pause(T0 + 1.5),
        Err(AcquisitionError::InvalidTransition {
            from: SessionState::Paused,
            ..
        })
    ));
    // Stop has to resolve the pause first
    assert!(matches!(
        session.finish(T0 + 2.0),
        Err(AcquisitionError::InvalidTransition { .. })
    ));
    assert_eq!(session.state(), SessionState::Paused);
    Ok(())
}

#[test]
fn test_malformed_lines_are_dropped() -> Result<()> {
    let dir = TempDir::new()?;
    let (mut session, _events) = streaming_session(&dir)?;

    assert_eq!(session.ingest_line("O,abc", T0 + 0.1)?, None);
    assert_eq!(session.ingest_line("garbage", T0 + 0.2)?, None);
    assert_eq!(session.ingest_line("O", T0 + 0.3)?, None);
    // parameter echo is an acknowledgment, not an error
    assert_eq!(session.ingest_line("PARAM,1,100000,2,1,1000,0", T0 + 0.4)?, None);
    assert!(session.ingest_line("O,0.25", T0 + 0.5)?.is_some());

    let stats = session.stats();
    assert_eq!(stats.lines_dropped, 3);
    assert_eq!(stats.samples_recorded, 1);
    assert_eq!(session.state(), SessionState::Streaming);
    Ok(())
}

#[test]
fn test_samples_before_start_are_ignored() -> Result<()> {
    let dir = TempDir::new()?;
    let config = SessionConfig {
        log_path: dir.path().join("epgOutput.csv"),
        ..SessionConfig::default()
    };
    let mut session = AcquisitionSession::new(config, EventBus::default());
    session.begin_handshake()?;
    session.handshake_complete()?;

    assert_eq!(session.ingest_line("O,0.5", T0)?, None);
    assert!(!dir.path().join("epgOutput.csv").exists());

    // Stopping without recording ends the session without a log
    assert_eq!(session.finish(T0 + 1.0)?, None);
    assert_eq!(session.state(), SessionState::Ended);
    Ok(())
}
