//! Camera frame source.
//!
//! This module provides `CameraSource`, which yields one `Capture` per
//! camera tick. Sequence numbers start at 0 and increase by one per capture.
//!
//! `stub://` URLs select a synthetic camera. Any other URL is rejected:
//! talking to a real camera module is outside this crate.

use anyhow::{bail, Result};

use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Camera URL (e.g., "stub://color").
    pub url: String,
    /// Preview size fed to the face detector.
    pub preview_width: u32,
    pub preview_height: u32,
    /// Size of the rendered frame.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://color".to_string(),
            preview_width: 400,
            preview_height: 400,
            frame_width: 1920,
            frame_height: 1080,
        }
    }
}

/// Both taps of one camera capture.
#[derive(Clone, Debug)]
pub struct Capture {
    pub seq: u64,
    pub preview: Frame,
    pub frame: Frame,
}

/// Anything that yields sequence-tagged captures.
pub trait FrameSource: Send {
    fn next_capture(&mut self) -> Result<Capture>;
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Camera source. Only the synthetic backend exists.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            bail!(
                "camera url {} not supported: only stub:// sources are available",
                config.url
            );
        }
        if config.preview_width == 0
            || config.preview_height == 0
            || config.frame_width == 0
            || config.frame_height == 0
        {
            bail!("camera dimensions must be non-zero");
        }
        Ok(Self {
            backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
        })
    }

    /// Connect to the camera.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn next_capture(&mut self) -> Result<Capture> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_capture(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    next_seq: u64,
    /// Simulated scene state; changes every 50 frames.
    scene_state: u8,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            next_seq: 0,
            scene_state: 0,
        }
    }

    /// Synthetic cameras are always "connected".
    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_capture(&mut self) -> Result<Capture> {
        let seq = self.next_seq;
        self.next_seq += 1;

        if seq % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shade = (seq as u8).wrapping_add(self.scene_state.wrapping_mul(37));

        let preview = Frame::new(
            seq,
            self.config.preview_width,
            self.config.preview_height,
            synthetic_pixels(self.config.preview_width, self.config.preview_height, shade),
        );
        let frame = Frame::new(
            seq,
            self.config.frame_width,
            self.config.frame_height,
            synthetic_pixels(self.config.frame_width, self.config.frame_height, shade),
        );
        Ok(Capture {
            seq,
            preview,
            frame,
        })
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.next_seq,
            url: self.config.url.clone(),
        }
    }
}

/// Flat planar RGB image of one shade.
fn synthetic_pixels(width: u32, height: u32, shade: u8) -> Vec<u8> {
    vec![shade; width as usize * height as usize * 3]
}
