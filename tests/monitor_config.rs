use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use varroa_watch::config::MonitorConfig;
use varroa_watch::{BackendKind, SourceMode, TelemetryFormat};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VARROA_CONFIG",
        "VARROA_CONFIDENCE_THRESHOLD",
        "VARROA_CROP_PADDING",
        "VARROA_FRAME_SKIP",
        "VARROA_DETECTOR_BACKEND",
        "VARROA_BEE_MODEL",
        "VARROA_MITE_MODEL",
        "VARROA_SOURCE_MODE",
        "VARROA_RETRY_ON_CAMERA_LOSS",
        "VARROA_RECONNECT_DELAY_SECS",
        "VARROA_DEMO_PATH",
        "VARROA_TELEMETRY_PATH",
        "VARROA_TELEMETRY_FORMAT",
        "VARROA_SENSOR_PATH",
        "VARROA_SNAPSHOT_PATH",
        "VARROA_LABEL_FONT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detection": {
            "confidence_threshold": 0.4,
            "crop_padding": 20,
            "frame_skip_interval": 5,
            "backend": "stub",
            "bee_model": "/opt/models/bee.onnx"
        },
        "camera": {
            "source_mode": "camera",
            "max_camera_index": 4,
            "retry_on_camera_loss": true,
            "reconnect_delay_secs": 7
        },
        "telemetry": {
            "path": "/var/log/hive.db",
            "format": "sqlite"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VARROA_CONFIG", file.path());
    std::env::set_var("VARROA_CROP_PADDING", "10");
    std::env::set_var("VARROA_RETRY_ON_CAMERA_LOSS", "false");
    std::env::set_var("VARROA_SENSOR_PATH", "/run/hive/dht22");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.detection.confidence_threshold, 0.4);
    assert_eq!(cfg.detection.crop_padding, 10);
    assert_eq!(cfg.detection.frame_skip_interval, 5);
    assert_eq!(cfg.detection.backend, BackendKind::Stub);
    assert_eq!(cfg.detection.bee_model, PathBuf::from("/opt/models/bee.onnx"));
    assert_eq!(cfg.camera.source_mode, SourceMode::Camera);
    assert_eq!(cfg.camera.max_camera_index, 4);
    assert!(!cfg.camera.retry_on_camera_loss);
    assert_eq!(cfg.camera.reconnect_delay, Duration::from_secs(7));
    assert_eq!(cfg.telemetry.format, TelemetryFormat::Sqlite);
    assert_eq!(cfg.telemetry.path, PathBuf::from("/var/log/hive.db"));
    assert_eq!(
        cfg.telemetry.sensor_path,
        Some(PathBuf::from("/run/hive/dht22"))
    );

    let acquisition = cfg.acquisition_settings();
    assert_eq!(acquisition.max_camera_index, 4);
    assert!(!acquisition.retry_on_camera_loss);
    assert_eq!(cfg.cascade_settings().crop_padding, 10);

    clear_env();
}

#[test]
fn loads_toml_config_from_explicit_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [detection]
        confidence_threshold = 0.3
        frame_skip_interval = 1

        [camera]
        source_mode = "file"
        demo_path = "clips/entrance.mp4"

        [display]
        snapshot_path = "/tmp/latest.jpg"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = MonitorConfig::load_with(Some(file.path())).expect("load config");

    assert_eq!(cfg.detection.confidence_threshold, 0.3);
    assert_eq!(cfg.detection.frame_skip_interval, 1);
    assert_eq!(cfg.detection.crop_padding, 150);
    assert_eq!(cfg.camera.source_mode, SourceMode::File);
    assert_eq!(cfg.camera.demo_path, PathBuf::from("clips/entrance.mp4"));
    assert_eq!(
        cfg.display.snapshot_path,
        Some(PathBuf::from("/tmp/latest.jpg"))
    );

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VARROA_FRAME_SKIP", "0");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("VARROA_CONFIDENCE_THRESHOLD", "1.5");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("VARROA_SOURCE_MODE", "rtsp");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("VARROA_RETRY_ON_CAMERA_LOSS", "sometimes");
    assert!(MonitorConfig::load().is_err());
    clear_env();
}

#[test]
fn later_overrides_can_fix_out_of_range_values() -> anyhow::Result<()> {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VARROA_FRAME_SKIP", "0");
    std::env::set_var("VARROA_TELEMETRY_FORMAT", "SQLite");

    let mut cfg = MonitorConfig::load_with(None)?;
    assert_eq!(cfg.detection.frame_skip_interval, 0);
    assert_eq!(cfg.telemetry.format, TelemetryFormat::Sqlite);
    assert!(cfg.validate().is_err());

    cfg.detection.frame_skip_interval = 5;
    cfg.validate()?;

    clear_env();
    Ok(())
}

#[test]
fn rejects_unknown_config_keys() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"detection": {"threshold": 0.5}}"#)
        .expect("write config");
    std::env::set_var("VARROA_CONFIG", file.path());

    assert!(MonitorConfig::load().is_err());

    clear_env();
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load defaults");
    assert_eq!(cfg.detection.frame_skip_interval, 25);
    assert_eq!(cfg.camera.source_mode, SourceMode::Auto);
    assert_eq!(cfg.camera.reconnect_delay, Duration::from_secs(3));
    assert_eq!(cfg.telemetry.path, PathBuf::from("varroa_log.csv"));
    assert!(cfg.telemetry.sensor_path.is_none());
}
