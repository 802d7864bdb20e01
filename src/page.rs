//! Page rasters and the measure rectangles found on them.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// An immutable page raster handed over by the renderer.
///
/// Cloning is cheap, so a page can be shipped to a detection task while the
/// document keeps its own handle.
#[derive(Debug, Clone)]
pub struct PageImage {
    image: Arc<DynamicImage>,
}

impl PageImage {
    pub fn new(image: DynamicImage) -> Result<Self, DecodeError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Empty { width, height });
        }
        Ok(Self {
            image: Arc::new(image),
        })
    }

    /// Decodes an encoded raster (PNG, JPEG, ...), guessing the format.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::new(image::load_from_memory(bytes)?)
    }

    /// Wraps a raw RGBA8 buffer as produced by a canvas renderer.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DecodeError> {
        let actual = pixels.len();
        let size_error = |expected| DecodeError::BufferSize {
            width,
            height,
            expected,
            actual,
        };
        // usize::MAX stands for a size no buffer can hold.
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| size_error(usize::MAX))?;
        if actual != expected {
            return Err(size_error(expected));
        }
        let buffer =
            RgbaImage::from_raw(width, height, pixels).ok_or_else(|| size_error(expected))?;
        Self::new(DynamicImage::ImageRgba8(buffer))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// An axis-aligned rectangle in pixel coordinates of some image.
///
/// Field names match the detection backend's JSON boxes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl PixelRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite())
            && self.w >= 0.0
            && self.h >= 0.0
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self::new(self.x * sx, self.y * sy, self.w * sx, self.h * sy)
    }

    /// Expresses the rectangle as fractions of a `width` x `height` page.
    pub fn normalized(&self, width: u32, height: u32) -> NormRect {
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        NormRect {
            x: self.x / w,
            y: self.y / h,
            w: self.w / w,
            h: self.h / h,
        }
    }
}

/// A rectangle expressed as fractions of page width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl NormRect {
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let (w, h) = (width as f64, height as f64);
        PixelRect::new(self.x * w, self.y * h, self.w * w, self.h * h)
    }
}

/// Identity a measure keeps for its whole life, independent of its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasureId(pub u64);

/// The region between two consecutive bar lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: MeasureId,
    pub rect: NormRect,
}

/// Position of a measure in global reading order.
///
/// The derived ordering (page first, then index) is the reading order, since
/// each page's measures are stored already sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasureRef {
    pub page: usize,
    pub index: usize,
}

impl MeasureRef {
    pub fn new(page: usize, index: usize) -> Self {
        Self { page, index }
    }
}
