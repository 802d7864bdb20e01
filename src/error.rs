//! Error types, one enum per failure domain.

use thiserror::Error;

/// A page raster could not be turned into an image.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to decode page image: {0}")]
    Image(#[from] image::ImageError),

    #[error(
        "pixel buffer holds {actual} bytes, expected {expected} for a {width}x{height} RGBA page"
    )]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("page image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Measure detection failed for one page.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection backend failed: {0}")]
    Backend(String),

    #[error("malformed detection response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("detection returned an invalid rectangle at position {index}")]
    InvalidRectangle { index: usize },

    #[error("page {page} does not exist")]
    UnknownPage { page: usize },

    #[error("page {page} has no decoded image to analyze")]
    MissingImage { page: usize },
}

/// The playback sequencer was asked to act on a position it cannot resolve.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("no measure has been clicked yet")]
    NothingSelected,

    #[error("measure {index} on page {page} does not exist")]
    UnknownMeasure { page: usize, index: usize },

    #[error("the selected measure no longer exists")]
    StaleSelection,

    #[error("no further measures to play")]
    Exhausted,
}

/// Invalid playback or detection settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tempo must be a positive finite bpm, got {0}")]
    InvalidBpm(f64),

    #[error("a measure needs at least one beat")]
    InvalidBeatsPerMeasure,

    #[error("transition window [{start}, {end}] must satisfy 0 <= start <= end <= 1")]
    InvalidTransitionWindow { start: f64, end: f64 },

    #[error("{name} must be positive")]
    NonPositive { name: &'static str },

    #[error("{name} must be odd, got {value}")]
    NotOdd { name: &'static str, value: u32 },

    #[error("a measure lasting {secs} s is longer than the {max} s limit")]
    MeasureTooLong { secs: f64, max: f64 },
}

/// Umbrella error for callers that do not care which stage failed.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
