//! Pluggable measure detection.
//!
//! Every detector fulfils the same contract: a page raster goes in, measure
//! rectangles in reading order and in that raster's pixel space come out.
//! [`BarLineDetector`] finds them geometrically from bar lines;
//! [`BackendDetector`] delegates to an external (e.g. learned) box predictor;
//! [`Calibrated`] runs either on a page downscaled to a canonical width.

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use log::debug;

use crate::{
    config::DetectConfig,
    contours::find_bar_candidates,
    error::{ConfigError, DetectionError},
    measures::{build_measures, reading_order},
    page::PixelRect,
    preprocess::vertical_strokes,
    staff::{StaffGroup, group_into_staves},
};

/// Image in, ordered measure rectangles out.
pub trait MeasureDetector: Send + Sync {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<PixelRect>, DetectionError>;
}

impl<D: MeasureDetector + ?Sized> MeasureDetector for Box<D> {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<PixelRect>, DetectionError> {
        (**self).detect(page)
    }
}

/// Morphology and contour based detector.
///
/// Create once, detect on many pages.
#[derive(Debug, Clone, Default)]
pub struct BarLineDetector {
    config: DetectConfig,
}

impl BarLineDetector {
    pub fn new(config: DetectConfig) -> Self {
        Self { config }
    }

    /// Like [`BarLineDetector::new`], rejecting unusable settings.
    pub fn try_new(config: DetectConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Runs the pipeline up to the staff rows, for inspection and overlays.
    pub fn staff_groups(&self, page: &DynamicImage) -> Vec<StaffGroup> {
        let strokes = vertical_strokes(page, &self.config);
        let candidates = find_bar_candidates(&strokes, &self.config);
        group_into_staves(candidates, self.config.row_tolerance, self.config.dedup_radius)
    }
}

impl MeasureDetector for BarLineDetector {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<PixelRect>, DetectionError> {
        let groups = self.staff_groups(page);
        let measures = build_measures(&groups, self.config.reading_row_tolerance);
        debug!("bar lines: {} measures in {} rows", measures.len(), groups.len());
        Ok(measures)
    }
}

/// An external box predictor answering with a JSON body.
///
/// The body is an array of `{"x": .., "y": .., "w": .., "h": ..}` objects in
/// the pixel space of the image it was given.
pub trait BoxBackend: Send + Sync {
    fn predict(&self, page: &DynamicImage) -> Result<String, DetectionError>;
}

impl<F> BoxBackend for F
where
    F: Fn(&DynamicImage) -> Result<String, DetectionError> + Send + Sync,
{
    fn predict(&self, page: &DynamicImage) -> Result<String, DetectionError> {
        self(page)
    }
}

/// Detector backed by a [`BoxBackend`].
pub struct BackendDetector<B> {
    backend: B,
    reading_row_tolerance: f64,
}

impl<B: BoxBackend> BackendDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            reading_row_tolerance: DetectConfig::default().reading_row_tolerance,
        }
    }

    pub fn with_row_tolerance(mut self, tolerance: f64) -> Self {
        self.reading_row_tolerance = tolerance;
        self
    }
}

impl<B: BoxBackend> MeasureDetector for BackendDetector<B> {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<PixelRect>, DetectionError> {
        let body = self.backend.predict(page)?;
        let boxes = parse_box_response(&body)?;
        debug!("backend: {} boxes", boxes.len());
        Ok(reading_order(boxes, self.reading_row_tolerance))
    }
}

/// Parses a backend response, rejecting non-finite or negative-sized boxes.
pub fn parse_box_response(body: &str) -> Result<Vec<PixelRect>, DetectionError> {
    let boxes: Vec<PixelRect> = serde_json::from_str(body)?;
    if let Some(index) = boxes.iter().position(|b| !b.is_valid()) {
        return Err(DetectionError::InvalidRectangle { index });
    }
    Ok(boxes)
}

/// Runs the inner detector on a page downscaled to `width` pixels and maps
/// the rectangles back to the page's own pixel space.
///
/// Pages already at or below the calibration width are passed through.
pub struct Calibrated<D> {
    inner: D,
    width: u32,
}

impl<D: MeasureDetector> Calibrated<D> {
    pub fn new(inner: D, width: u32) -> Self {
        Self {
            inner,
            width: width.max(1),
        }
    }
}

impl<D: MeasureDetector> MeasureDetector for Calibrated<D> {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<PixelRect>, DetectionError> {
        let (width, height) = page.dimensions();
        if width <= self.width {
            return self.inner.detect(page);
        }

        let scaled_height = ((height as u64 * self.width as u64) / width as u64).max(1) as u32;
        let scaled = page.resize_exact(self.width, scaled_height, FilterType::Triangle);
        let sx = width as f64 / self.width as f64;
        let sy = height as f64 / scaled_height as f64;
        debug!("calibrated: {width}x{height} -> {}x{scaled_height}", self.width);

        Ok(self
            .inner
            .detect(&scaled)?
            .iter()
            .map(|r| r.scaled(sx, sy))
            .collect())
    }
}
