// Integration tests for timeline reconciliation
//
// These tests write raw event logs to disk, reconcile them and check the
// processed series file next to them.

use anyhow::Result;
use epg_acquire::reconcile::{
    load_processed, processed_paths, reconcile_file, ReconcileProgress, TrailingSample,
};
use epg_acquire::AcquisitionError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Three samples, a 3s pause at t=2, two samples while the decision was
/// pending, then the decision.
fn scenario_log(keep: bool) -> String {
    let decision = if keep { "T" } else { "F" };
    format!(
        "0.0000,DATA,0.5000,1
1.0000,DATA,0.5000,1
2.0000,DATA,0.5000,1
2.0000,PAUSE
5.0000,RESUME,3.0000
5.0000,DATA,0.6000,1
6.0000,DATA,0.7000,1
6.5000,SAVE,{}
7.0000,END,Total elapsed time in hh:mm:ss: 00:00:07
",
        decision
    )
}

fn write_log(dir: &TempDir, contents: &str) -> Result<PathBuf> {
    let path = dir.path().join("epgOutput.csv");
    fs::write(&path, contents)?;
    Ok(path)
}

fn times(path: &Path) -> Result<Vec<f64>> {
    Ok(load_processed(path)?.iter().map(|s| s.time).collect())
}

#[test]
fn test_discard_splices_out_the_pause() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_path = write_log(&temp_dir, &scenario_log(false))?;

    let report = reconcile_file(&log_path, TrailingSample::Keep, |_| {})?;

    assert_eq!(
        report.output_path,
        temp_dir.path().join("epgOutput_processed.csv")
    );
    assert_eq!(report.basename, temp_dir.path().join("epgOutput"));
    assert_eq!(report.rows, 5);
    assert_eq!(report.pauses, 1);
    assert_eq!(report.pauses_discarded, 1);
    assert_eq!(times(&report.output_path)?, vec![0.0, 1.0, 2.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn test_keep_preserves_timestamps() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_path = write_log(&temp_dir, &scenario_log(true))?;

    let report = reconcile_file(&log_path, TrailingSample::Keep, |_| {})?;

    assert_eq!(report.pauses_discarded, 0);
    assert_eq!(times(&report.output_path)?, vec![0.0, 1.0, 2.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn test_processed_file_layout() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_path = write_log(&temp_dir, &scenario_log(false))?;

    let report = reconcile_file(&log_path, TrailingSample::Keep, |_| {})?;
    let contents = fs::read_to_string(&report.output_path)?;
    let lines: Vec<&str> = contents.lines().collect();

    assert_eq!(lines[0], "timestamp,value1,value2");
    assert_eq!(lines[4], "2.0000,0.6000,1");
    assert_eq!(lines.len(), 6);
    Ok(())
}

#[test]
fn test_each_discarded_pause_removes_exactly_its_gap() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Rows after a SAVE were already timed without the discarded pause
    let log = "0.0000,DATA,0.1,1
1.0000,PAUSE
3.5000,RESUME,2.5000
3.5000,DATA,0.2,1
4.0000,DATA,0.3,1
4.0000,SAVE,F
2.0000,DATA,0.4,1
2.0000,PAUSE
3.0000,DATA,0.5,1
3.0000,RESUME,1.0000
3.2500,DATA,0.6,1
3.5000,SAVE,F
2.7500,DATA,0.7,1
3.0000,END,done
";
    let log_path = write_log(&temp_dir, log)?;

    let report = reconcile_file(&log_path, TrailingSample::Keep, |_| {})?;

    assert_eq!(report.pauses, 2);
    assert_eq!(report.pauses_discarded, 2);
    // recorded while paused
    assert_eq!(report.samples_discarded, 1);
    assert_eq!(
        times(&report.output_path)?,
        vec![0.0, 1.0, 1.5, 2.0, 2.25, 2.75]
    );
    Ok(())
}

#[test]
fn test_progress_reported_per_pause() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log = "0.0000,DATA,0.1,1
0.5000,PAUSE
1.0000,RESUME,0.5000
1.0000,SAVE,T
1.0000,PAUSE
2.0000,RESUME,1.0000
2.0000,SAVE,F
1.5000,END,done
";
    let log_path = write_log(&temp_dir, log)?;

    let mut progress = Vec::new();
    reconcile_file(&log_path, TrailingSample::Keep, |p| progress.push(p))?;

    assert_eq!(
        progress,
        vec![
            ReconcileProgress { done: 1, total: 2 },
            ReconcileProgress { done: 2, total: 2 },
        ]
    );
    Ok(())
}

#[test]
fn test_drop_final_sample() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_path = write_log(&temp_dir, &scenario_log(true))?;

    let report = reconcile_file(&log_path, TrailingSample::Drop, |_| {})?;

    assert!(report.trailing_dropped);
    assert_eq!(times(&report.output_path)?, vec![0.0, 1.0, 2.0, 5.0]);
    Ok(())
}

#[test]
fn test_failure_leaves_no_output_and_raw_log_untouched() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // RESUME without its SAVE
    let log = "0.0000,DATA,0.1,1
0.5000,PAUSE
1.0000,RESUME,0.5000
1.2000,DATA,0.2,1
1.5000,END,done
";
    let log_path = write_log(&temp_dir, log)?;
    let (_, output_path) = processed_paths(&log_path);

    match reconcile_file(&log_path, TrailingSample::Keep, |_| {}) {
        Err(AcquisitionError::ReconciliationParseFailure { line, .. }) => assert_eq!(line, 5),
        other => panic!("expected parse failure, got {:?}", other),
    }

    assert!(!output_path.exists());
    assert_eq!(fs::read_dir(temp_dir.path())?.count(), 1);
    assert_eq!(fs::read_to_string(&log_path)?, log);
    Ok(())
}

#[test]
fn test_log_without_end_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_path = write_log(&temp_dir, "0.0000,DATA,0.1,1\n0.0100,DATA,0.2,1\n")?;

    let result = reconcile_file(&log_path, TrailingSample::Keep, |_| {});
    assert!(matches!(
        result,
        Err(AcquisitionError::ReconciliationParseFailure { .. })
    ));
    Ok(())
}

#[test]
fn test_rows_after_end_are_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_path = write_log(&temp_dir, "0.0000,DATA,0.1,1\n0.0100,END,done\n0.0200,DATA,0.2,1\n")?;

    match reconcile_file(&log_path, TrailingSample::Keep, |_| {}) {
        Err(AcquisitionError::ReconciliationParseFailure { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected parse failure, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_load_processed_with_and_without_header() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let with_header = temp_dir.path().join("a_processed.csv");
    fs::write(&with_header, "timestamp,value1,value2\n0.0,0.5,1\n0.01,0.6,1\n")?;
    let without_header = temp_dir.path().join("b_processed.csv");
    fs::write(&without_header, "0.0,0.5,1\n0.01,0.6\n0.02,0.7,1\n")?;

    let a = load_processed(&with_header)?;
    assert_eq!(a.len(), 2);
    assert_eq!(a[1].voltage, 0.6);

    // the short row is skipped
    let b = load_processed(&without_header)?;
    let b_times: Vec<f64> = b.iter().map(|s| s.time).collect();
    assert_eq!(b_times, vec![0.0, 0.02]);
    Ok(())
}
