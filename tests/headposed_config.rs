use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use headpose_sync::config::HeadposeConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HEADPOSE_CONFIG",
        "HEADPOSE_SYNC_CAPACITY",
        "HEADPOSE_STEREO",
        "HEADPOSE_CROP_MARGIN",
        "HEADPOSE_POLL_INTERVAL_MS",
        "HEADPOSE_CAMERA_URL",
        "HEADPOSE_QUEUE_DEPTH",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_defaults_without_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = HeadposeConfig::load().expect("load config");
    assert_eq!(cfg.camera.url, "stub://color");
    assert_eq!(cfg.camera.preview_size, (400, 400));
    assert_eq!(cfg.camera.frame_size, (1920, 1080));
    assert_eq!(cfg.sync.capacity, 15);
    assert_eq!(cfg.sync.crop_size, (60, 60));
    assert!((cfg.sync.crop_margin - 0.03).abs() < f32::EPSILON);
    assert_eq!(cfg.sync.poll_interval, Duration::from_millis(1));
    assert_eq!(cfg.sync.queue_depth, 4);
    assert!((cfg.detector.confidence_threshold - 0.7).abs() < f32::EPSILON);
    assert!(!cfg.detector.stereo);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": {
                "url": "stub://lab",
                "preview_width": 300,
                "preview_height": 300,
                "frame_width": 1280,
                "frame_height": 720
            },
            "detector": {
                "confidence_threshold": 0.5,
                "stereo": false,
                "depth_lower_mm": 200,
                "depth_upper_mm": 3000
            },
            "sync": {
                "capacity": 8,
                "crop_margin": 0.05,
                "crop_width": 64,
                "crop_height": 64,
                "poll_interval_ms": 5,
                "queue_depth": 8
            }
        }"#,
    );

    std::env::set_var("HEADPOSE_CONFIG", file.path());
    std::env::set_var("HEADPOSE_SYNC_CAPACITY", "20");
    std::env::set_var("HEADPOSE_STEREO", "true");
    std::env::set_var("HEADPOSE_QUEUE_DEPTH", "2");

    let cfg = HeadposeConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://lab");
    assert_eq!(cfg.camera.preview_size, (300, 300));
    assert_eq!(cfg.camera.frame_size, (1280, 720));
    assert!((cfg.detector.confidence_threshold - 0.5).abs() < f32::EPSILON);
    assert!(cfg.detector.stereo);
    assert_eq!(cfg.detector.depth_lower_mm, 200.0);
    assert_eq!(cfg.detector.depth_upper_mm, 3000.0);
    assert_eq!(cfg.sync.capacity, 20);
    assert!((cfg.sync.crop_margin - 0.05).abs() < f32::EPSILON);
    assert_eq!(cfg.sync.crop_size, (64, 64));
    assert_eq!(cfg.sync.poll_interval, Duration::from_millis(5));
    assert_eq!(cfg.sync.queue_depth, 2);

    clear_env();
}

#[test]
fn rejects_zero_capacity() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADPOSE_SYNC_CAPACITY", "0");
    assert!(HeadposeConfig::load().is_err());
    clear_env();

    std::env::set_var("HEADPOSE_QUEUE_DEPTH", "0");
    assert!(HeadposeConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_malformed_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADPOSE_STEREO", "sometimes");
    assert!(HeadposeConfig::load().is_err());
    clear_env();

    std::env::set_var("HEADPOSE_CROP_MARGIN", "wide");
    assert!(HeadposeConfig::load().is_err());
    clear_env();

    std::env::set_var("HEADPOSE_CROP_MARGIN", "0.6");
    assert!(HeadposeConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_invalid_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("{ not json");
    std::env::set_var("HEADPOSE_CONFIG", file.path());
    let err = HeadposeConfig::load().expect_err("invalid json");
    assert!(err.to_string().contains("invalid config file"));

    std::env::set_var("HEADPOSE_CONFIG", "/nonexistent/headpose.json");
    let err = HeadposeConfig::load().expect_err("missing file");
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
