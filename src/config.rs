use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::sync::{DEFAULT_CROP_MARGIN, DEFAULT_CROP_SIZE, DEFAULT_SYNC_CAPACITY};

const DEFAULT_CAMERA_URL: &str = "stub://color";
const DEFAULT_PREVIEW_SIZE: (u32, u32) = (400, 400);
const DEFAULT_FRAME_SIZE: (u32, u32) = (1920, 1080);
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DEFAULT_DEPTH_LOWER_MM: f32 = 100.0;
const DEFAULT_DEPTH_UPPER_MM: f32 = 5000.0;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1;
const DEFAULT_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Deserialize, Default)]
struct HeadposeConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    sync: Option<SyncConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    preview_width: Option<u32>,
    preview_height: Option<u32>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    confidence_threshold: Option<f32>,
    stereo: Option<bool>,
    depth_lower_mm: Option<f32>,
    depth_upper_mm: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SyncConfigFile {
    capacity: Option<usize>,
    crop_margin: Option<f32>,
    crop_width: Option<u32>,
    crop_height: Option<u32>,
    poll_interval_ms: Option<u64>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HeadposeConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub preview_size: (u32, u32),
    pub frame_size: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    /// Spatial detections (depth-capable camera module).
    pub stereo: bool,
    pub depth_lower_mm: f32,
    pub depth_upper_mm: f32,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// In-flight sequence numbers per correlator.
    pub capacity: usize,
    pub crop_margin: f32,
    pub crop_size: (u32, u32),
    /// Idle sleep of the control loops.
    pub poll_interval: Duration,
    /// Messages each stage queue holds before new ones are dropped.
    pub queue_depth: usize,
}

impl HeadposeConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HEADPOSE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HeadposeConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let sync = file.sync.unwrap_or_default();

        Self {
            camera: CameraSettings {
                url: camera
                    .url
                    .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                preview_size: (
                    camera.preview_width.unwrap_or(DEFAULT_PREVIEW_SIZE.0),
                    camera.preview_height.unwrap_or(DEFAULT_PREVIEW_SIZE.1),
                ),
                frame_size: (
                    camera.frame_width.unwrap_or(DEFAULT_FRAME_SIZE.0),
                    camera.frame_height.unwrap_or(DEFAULT_FRAME_SIZE.1),
                ),
            },
            detector: DetectorSettings {
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                stereo: detector.stereo.unwrap_or(false),
                depth_lower_mm: detector.depth_lower_mm.unwrap_or(DEFAULT_DEPTH_LOWER_MM),
                depth_upper_mm: detector.depth_upper_mm.unwrap_or(DEFAULT_DEPTH_UPPER_MM),
            },
            sync: SyncSettings {
                capacity: sync.capacity.unwrap_or(DEFAULT_SYNC_CAPACITY),
                crop_margin: sync.crop_margin.unwrap_or(DEFAULT_CROP_MARGIN),
                crop_size: (
                    sync.crop_width.unwrap_or(DEFAULT_CROP_SIZE.0),
                    sync.crop_height.unwrap_or(DEFAULT_CROP_SIZE.1),
                ),
                poll_interval: Duration::from_millis(
                    sync.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
                queue_depth: sync.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(capacity) = std::env::var("HEADPOSE_SYNC_CAPACITY") {
            self.sync.capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("HEADPOSE_SYNC_CAPACITY must be a positive integer"))?;
        }
        if let Ok(stereo) = std::env::var("HEADPOSE_STEREO") {
            self.detector.stereo = parse_bool(&stereo)
                .ok_or_else(|| anyhow!("HEADPOSE_STEREO must be true/false/1/0"))?;
        }
        if let Ok(margin) = std::env::var("HEADPOSE_CROP_MARGIN") {
            self.sync.crop_margin = margin
                .trim()
                .parse()
                .map_err(|_| anyhow!("HEADPOSE_CROP_MARGIN must be a number"))?;
        }
        if let Ok(interval) = std::env::var("HEADPOSE_POLL_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("HEADPOSE_POLL_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.sync.poll_interval = Duration::from_millis(millis);
        }
        if let Ok(depth) = std::env::var("HEADPOSE_QUEUE_DEPTH") {
            self.sync.queue_depth = depth
                .trim()
                .parse()
                .map_err(|_| anyhow!("HEADPOSE_QUEUE_DEPTH must be a positive integer"))?;
        }
        if let Ok(url) = std::env::var("HEADPOSE_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sync.capacity == 0 {
            return Err(anyhow!("sync capacity must be greater than zero"));
        }
        if self.sync.queue_depth == 0 {
            return Err(anyhow!("queue depth must be greater than zero"));
        }
        if !(0.0..0.5).contains(&self.sync.crop_margin) {
            return Err(anyhow!(
                "crop margin must be in [0, 0.5), got {}",
                self.sync.crop_margin
            ));
        }
        if self.sync.crop_size.0 == 0 || self.sync.crop_size.1 == 0 {
            return Err(anyhow!("crop size must be non-zero"));
        }
        let (pw, ph) = self.camera.preview_size;
        let (fw, fh) = self.camera.frame_size;
        if pw == 0 || ph == 0 || fw == 0 || fh == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        let threshold = self.detector.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(anyhow!(
                "confidence threshold must be in (0, 1], got {}",
                threshold
            ));
        }
        if self.detector.depth_lower_mm >= self.detector.depth_upper_mm {
            return Err(anyhow!("depth lower threshold must be below the upper threshold"));
        }
        Ok(())
    }
}

impl Default for HeadposeConfig {
    fn default() -> Self {
        Self::from_file(HeadposeConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<HeadposeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
