//! Render-side consumers of correlated bundles.
//!
//! Converts a `RenderBundle` into per-face overlay records in frame pixel
//! space and hands them to a `RenderSink`. Drawing pose axes onto pixels
//! and encoding the result for streaming happen outside this crate.

use anyhow::Result;

use crate::detect::{Detection, Recognition};
use crate::frame::Frame;
use crate::sync::RenderBundle;

/// Vertical offset of the depth label below the box centre, in pixels.
const DEPTH_LABEL_OFFSET: i32 = 60;

/// Bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

/// Everything needed to draw one face.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceOverlay {
    pub bbox: PixelBox,
    pub pose: Recognition,
    /// "Z: 1.23 m" when the detection carries depth.
    pub depth_label: Option<String>,
    /// Anchor of the depth label.
    pub label_origin: (i32, i32),
}

/// A frame ready to be drawn and encoded.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    pub seq: u64,
    pub frame: Frame,
    pub faces: Vec<FaceOverlay>,
}

/// Map a normalized detection onto the frame, clipping to the image.
pub fn frame_norm(width: u32, height: u32, detection: &Detection) -> PixelBox {
    let scale = |value: f32, size: u32| (value.clamp(0.0, 1.0) * size as f32) as i32;
    PixelBox {
        xmin: scale(detection.xmin, width),
        ymin: scale(detection.ymin, height),
        xmax: scale(detection.xmax, width),
        ymax: scale(detection.ymax, height),
    }
}

pub fn depth_label(z_mm: f32) -> String {
    format!("Z: {:.2} m", z_mm / 1000.0)
}

/// Build the overlay for every face of a bundle, in detection order.
pub fn overlay(bundle: &RenderBundle) -> RenderedFrame {
    let (width, height) = (bundle.frame.width, bundle.frame.height);
    let faces = bundle
        .faces()
        .map(|(detection, pose)| {
            let bbox = frame_norm(width, height, detection);
            let centre_y = (bbox.ymin + bbox.ymax) / 2;
            FaceOverlay {
                bbox,
                pose: *pose,
                depth_label: detection.spatial_z.map(depth_label),
                label_origin: (bbox.xmin, centre_y + DEPTH_LABEL_OFFSET),
            }
        })
        .collect();

    RenderedFrame {
        seq: bundle.seq,
        frame: bundle.frame.clone(),
        faces,
    }
}

/// Consumer of rendered frames (encoder, streaming server, test collector).
pub trait RenderSink {
    fn render(&mut self, frame: &RenderedFrame) -> Result<()>;
}

/// Logs one line per face.
#[derive(Default)]
pub struct LogSink {
    frames: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSink for LogSink {
    fn render(&mut self, frame: &RenderedFrame) -> Result<()> {
        self.frames += 1;
        if frame.faces.is_empty() {
            log::debug!("frame seq={} no faces", frame.seq);
        }
        for (index, face) in frame.faces.iter().enumerate() {
            log::info!(
                "frame seq={} face #{} box=({},{})-({},{}) yaw={:.1} pitch={:.1} roll={:.1}{}",
                frame.seq,
                index,
                face.bbox.xmin,
                face.bbox.ymin,
                face.bbox.xmax,
                face.bbox.ymax,
                face.pose.yaw,
                face.pose.pitch,
                face.pose.roll,
                face.depth_label
                    .as_deref()
                    .map(|label| format!(" {}", label))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}

/// Keeps every rendered frame in memory.
#[derive(Default)]
pub struct CollectSink {
    pub frames: Vec<RenderedFrame>,
}

impl RenderSink for CollectSink {
    fn render(&mut self, frame: &RenderedFrame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}
