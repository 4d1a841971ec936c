//! Camera frames as they travel through the correlators.
//!
//! - `Frame`: sequence-tagged image with shared, immutable pixel data.
//!
//! A frame is produced once by the camera stage. Clones share the pixel
//! buffer, so a crop request or render bundle can hold "a reference to the
//! frame" without copying the image.

use std::fmt;
use std::sync::Arc;

/// Camera frame tagged with the camera stage's sequence number.
#[derive(Clone)]
pub struct Frame {
    /// Sequence number assigned by the camera.
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pixels: Arc<[u8]>,
}

impl Frame {
    pub fn new(seq: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            seq,
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Frame with no pixel payload. Used where only geometry matters.
    pub fn empty(seq: u64, width: u32, height: u32) -> Self {
        Self::new(seq, width, height, Vec::new())
    }

    /// Planar RGB pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// True when both frames share the same pixel buffer.
    pub fn shares_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

// Pixel data is never logged.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
