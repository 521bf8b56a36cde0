use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use ppe_sentinel::config::SentinelConfig;
use ppe_sentinel::{BackendKind, ViolationRule};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_CONFIG",
        "SENTINEL_LOG_FILE",
        "SENTINEL_SOURCE",
        "SENTINEL_BACKEND",
        "SENTINEL_MODEL_PATH",
        "SENTINEL_LABELS_PATH",
        "SENTINEL_MAX_READ_FAILURES",
        "SENTINEL_FRAME_DELAY_MS",
        "SENTINEL_VIOLATION_LABELS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "log_path": "site_a/violations.csv",
        "source": {
            "spec": "rtsp://camera-1/stream",
            "target_fps": 12,
            "width": 800,
            "height": 600
        },
        "detector": {
            "backend": "stub",
            "labels_path": "labels/ppe.txt",
            "confidence_threshold": 0.4
        },
        "monitor": {
            "max_read_failures": 5,
            "frame_delay_ms": 0
        },
        "rule": {
            "marker": "NO-"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_SOURCE", "stub://gate");
    std::env::set_var("SENTINEL_MAX_READ_FAILURES", "2");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.log_path, PathBuf::from("site_a/violations.csv"));
    assert_eq!(cfg.source.spec, "stub://gate");
    assert_eq!(cfg.source.target_fps, 12);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.detector.backend, BackendKind::Stub);
    assert_eq!(cfg.detector.labels_path, Some(PathBuf::from("labels/ppe.txt")));
    assert_eq!(cfg.detector.confidence_threshold, 0.4);
    assert_eq!(cfg.monitor.max_read_failures, 2);
    assert_eq!(cfg.monitor.frame_delay, Duration::ZERO);
    assert_eq!(cfg.violation_rule, ViolationRule::substring("NO-"));

    clear_env();
}

#[test]
fn loads_toml_config_and_label_rule_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        log_path = "ppe.csv"

        [detector]
        backend = "tract"
        model_path = "models/best.onnx"
        input_size = 416

        [monitor]
        frame_delay_ms = 100
        max_frames = 50
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_VIOLATION_LABELS", "NO-Hardhat, NO-Mask,");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.log_path, PathBuf::from("ppe.csv"));
    assert_eq!(cfg.detector.backend, BackendKind::Tract);
    assert_eq!(cfg.detector.model_path, Some(PathBuf::from("models/best.onnx")));
    assert_eq!(cfg.detector.input_size, 416);
    assert_eq!(cfg.monitor.frame_delay, Duration::from_millis(100));
    assert_eq!(cfg.monitor.max_frames, Some(50));
    assert_eq!(cfg.monitor.max_read_failures, 10);
    assert_eq!(
        cfg.violation_rule,
        ViolationRule::labels(["NO-Hardhat", "NO-Mask"])
    );

    clear_env();
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_MAX_READ_FAILURES", "many");
    assert!(SentinelConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_BACKEND", "opencv");
    assert!(SentinelConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_CONFIG", "/nonexistent/sentinel.json");
    assert!(SentinelConfig::load().is_err());

    clear_env();
}
