use std::fs;

use anyhow::Result;

use ppe_sentinel::violation_log::report::counts_by_type;
use ppe_sentinel::{
    build_backend, open_source, BackendKind, CsvViolationLog, DetectionAdapter, DetectorSettings,
    Frame, LabelTable, Monitor, MonitorSettings, ScriptedBackend, ScriptedSource, SourceSettings,
    SourceSpec, StopReason, ViolationLogStore, ViolationRule,
};

fn quiet_monitor(max_frames: Option<u64>) -> Monitor {
    Monitor::new(MonitorSettings {
        frame_delay: std::time::Duration::ZERO,
        max_frames,
        ..MonitorSettings::default()
    })
}

#[test]
fn scripted_session_appends_to_existing_csv_log() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("violation_logs.csv");
    fs::write(
        &log_path,
        "Timestamp,Violation,Confidence\n2024-01-02 07:00:00,NO-Hardhat,0.91\n",
    )?;

    let labels = LabelTable::ppe_default();
    let backend = ScriptedBackend::new(labels)
        .then_detect_named(&[("Hardhat", 0.91), ("NO-Mask", 0.76)])
        .then_detect_named(&[("Person", 0.88)])
        .then_detect_named(&[("NO-Safety Vest", 0.6345), ("NO-Mask", 0.5)]);
    let frame = Frame::filled(64, 48, [90, 90, 90])?;
    let mut source = ScriptedSource::new()
        .then_frame(frame.clone())
        .then_failures(2)
        .then_frames(&frame, 2);
    let mut adapter = DetectionAdapter::new(
        Box::new(backend),
        ViolationRule::default(),
        CsvViolationLog::new(&log_path),
    );

    let mut per_frame = Vec::new();
    let summary = quiet_monitor(None).run(&mut source, &mut adapter, |report, _| {
        per_frame.push(report.violations)
    })?;

    assert_eq!(summary.reason, StopReason::EndOfStream);
    assert_eq!(per_frame, vec![1, 0, 2]);
    assert_eq!(summary.read_failures, 2);

    let records = adapter.store().read_all()?;
    let types: Vec<&str> = records.iter().map(|r| r.violation_type.as_str()).collect();
    assert_eq!(types, vec!["NO-Hardhat", "NO-Mask", "NO-Safety Vest", "NO-Mask"]);
    assert_eq!(records[2].confidence_field(), "0.63");

    let counts = counts_by_type(&records);
    assert_eq!(counts[0].violation_type, "NO-Mask");
    assert_eq!(counts[0].count, 2);
    Ok(())
}

#[test]
fn corrupt_log_is_recreated_by_first_violation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("violation_logs.csv");
    fs::write(&log_path, "when,what\nyesterday\n")?;

    let backend =
        ScriptedBackend::new(LabelTable::ppe_default()).then_detect_named(&[("NO-Hardhat", 0.8)]);
    let mut source = ScriptedSource::new().then_frame(Frame::filled(8, 8, [0, 0, 0])?);
    let mut adapter = DetectionAdapter::new(
        Box::new(backend),
        ViolationRule::default(),
        CsvViolationLog::new(&log_path),
    );
    quiet_monitor(None).run(&mut source, &mut adapter, |_, _| {})?;

    let records = adapter.store().read_all()?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].violation_type, "NO-Hardhat");
    Ok(())
}

#[test]
fn synthetic_source_with_stub_backend_runs_to_frame_limit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let settings = SourceSettings {
        width: 160,
        height: 120,
        ..SourceSettings::default()
    };
    let mut source = open_source(&SourceSpec::parse("stub://yard")?, &settings)?;
    let backend = build_backend(&DetectorSettings {
        backend: BackendKind::Stub,
        ..DetectorSettings::default()
    })?;
    let mut adapter = DetectionAdapter::new(
        backend,
        ViolationRule::default(),
        CsvViolationLog::new(dir.path().join("log.csv")),
    );

    let summary = quiet_monitor(Some(12)).run(source.as_mut(), &mut adapter, |_, outcome| {
        assert_eq!((outcome.annotated.width, outcome.annotated.height), (160, 120));
    })?;

    assert_eq!(summary.reason, StopReason::FrameLimit);
    assert_eq!(summary.frames, 12);
    let logged = adapter.store().read_all()?.len() as u64;
    assert_eq!(logged, summary.violations);
    Ok(())
}

#[test]
fn still_image_is_processed_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let image_path = dir.path().join("gate.png");
    Frame::filled(40, 30, [200, 180, 20])?.save(&image_path)?;

    let mut source = open_source(
        &SourceSpec::parse(image_path.to_str().expect("utf-8 path"))?,
        &SourceSettings::default(),
    )?;
    let backend =
        ScriptedBackend::new(LabelTable::ppe_default()).then_detect_named(&[("NO-Mask", 0.9)]);
    let mut adapter = DetectionAdapter::new(
        Box::new(backend),
        ViolationRule::default(),
        CsvViolationLog::new(dir.path().join("log.csv")),
    );

    let summary = quiet_monitor(None).run(source.as_mut(), &mut adapter, |_, _| {})?;
    assert_eq!(summary.reason, StopReason::EndOfStream);
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.violations, 1);
    let snapshot = summary.last_annotated.expect("annotated frame");
    assert_eq!((snapshot.width, snapshot.height), (40, 30));
    Ok(())
}
