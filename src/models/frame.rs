use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Bytes per pixel of every frame buffer (RGBA8)
pub const CHANNELS: usize = 4;

/// One captured camera image
///
/// Pixels are always stored as tightly packed RGBA8 rows. Frames are never
/// mutated in place: every transform allocates a new buffer and keeps the
/// capture timestamp of its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    timestamp: Instant,
}

impl Frame {
    /// Wrap an RGBA8 buffer
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, timestamp: Instant) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(ScanError::FrameSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            timestamp,
        })
    }

    /// Build a frame from RGB8 bytes (3 bytes per pixel); alpha is set opaque
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8], timestamp: Instant) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(ScanError::FrameSize {
                expected,
                actual: rgb.len(),
            });
        }
        let mut pixels = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for px in rgb.chunks_exact(3) {
            pixels.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Self::from_rgba(width, height, pixels, timestamp)
    }

    /// Build an opaque gray frame from a luma plane (1 byte per pixel)
    pub fn from_luma(width: u32, height: u32, luma: &[u8], timestamp: Instant) -> Result<Self> {
        let expected = width as usize * height as usize;
        if luma.len() != expected {
            return Err(ScanError::FrameSize {
                expected,
                actual: luma.len(),
            });
        }
        let mut pixels = Vec::with_capacity(expected * CHANNELS);
        for &v in luma {
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
        Self::from_rgba(width, height, pixels, timestamp)
    }

    /// Same dimensions and timestamp, new pixel buffer.
    ///
    /// Callers guarantee `pixels.len() == self.pixels.len()`.
    pub(crate) fn derive(&self, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        Self {
            pixels,
            width: self.width,
            height: self.height,
            timestamp: self.timestamp,
        }
    }

    /// New dimensions, same timestamp.
    pub(crate) fn derive_sized(&self, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * CHANNELS);
        Self {
            pixels,
            width,
            height,
            timestamp: self.timestamp,
        }
    }

    /// Same pixels, new capture time
    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Raw RGBA8 bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Capture time
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// True when the frame holds no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// RGBA value at (x, y); out-of-range coordinates read as opaque white
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [255, 255, 255, 255];
        }
        let idx = y as usize * self.stride() + x as usize * CHANNELS;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// Copy a sub-rectangle out into a new frame; the rectangle is clipped to the frame
    pub fn crop(&self, rect: PixelRect) -> Self {
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let w = rect.width.min(self.width - x0);
        let h = rect.height.min(self.height - y0);
        let mut pixels = Vec::with_capacity(w as usize * h as usize * CHANNELS);
        let stride = self.stride();
        for y in y0..y0 + h {
            let start = y as usize * stride + x0 as usize * CHANNELS;
            pixels.extend_from_slice(&self.pixels[start..start + w as usize * CHANNELS]);
        }
        self.derive_sized(w, h, pixels)
    }
}

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PixelRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// Rectangle expressed as fractions of the frame size (0.0..=1.0)
///
/// Regions are resolution independent so one catalogue works for every
/// constraint set on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge as a fraction of width
    pub x: f32,
    /// Top edge as a fraction of height
    pub y: f32,
    /// Width as a fraction of frame width
    pub width: f32,
    /// Height as a fraction of frame height
    pub height: f32,
}

impl Region {
    /// Create a region, clamping every component into 0.0..=1.0
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        let x = x.clamp(0.0, 1.0);
        let y = y.clamp(0.0, 1.0);
        Self {
            x,
            y,
            width: width.clamp(0.0, 1.0 - x),
            height: height.clamp(0.0, 1.0 - y),
        }
    }

    /// Centered region covering `fraction` of each dimension
    pub fn center(fraction: f32) -> Self {
        let f = fraction.clamp(0.0, 1.0);
        let margin = (1.0 - f) / 2.0;
        Self::new(margin, margin, f, f)
    }

    /// The four quadrants, each grown by `overlap` so codes on the seams survive
    pub fn quadrants(overlap: f32) -> [Self; 4] {
        let size = 0.5 + overlap.clamp(0.0, 0.5);
        let far = 1.0 - size;
        [
            Self::new(0.0, 0.0, size, size),
            Self::new(far, 0.0, size, size),
            Self::new(0.0, far, size, size),
            Self::new(far, far, size, size),
        ]
    }

    /// Resolve against concrete frame dimensions
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let x = (self.x * width as f32).floor() as u32;
        let y = (self.y * height as f32).floor() as u32;
        let w = (self.width * width as f32).round() as u32;
        let h = (self.height * height as f32).round() as u32;
        PixelRect {
            x: x.min(width),
            y: y.min(height),
            width: w.min(width.saturating_sub(x)),
            height: h.min(height.saturating_sub(y)),
        }
    }
}
