//! Measure detection and metronome-driven measure hiding for sight-reading
//! practice.
//!
//! Detection turns a page raster into measure rectangles:
//! [`preprocess`] isolates vertical strokes, [`contours`] boxes and filters
//! bar-line candidates, [`staff`] groups them into rows and [`measures`]
//! builds rectangles between adjacent bars. [`detector`] wraps this (or an
//! external box predictor) behind one trait.
//!
//! Playback is driven through [`practice::Practice`], which owns the
//! [`document::Document`] and its [`sequencer::PlaybackSession`].

pub mod config;
pub mod contours;
pub mod detector;
pub mod document;
pub mod error;
pub mod measures;
pub mod overlay;
pub mod page;
pub mod practice;
pub mod preprocess;
pub mod rect;
pub mod sequencer;
pub mod staff;

pub use config::{DetectConfig, HideTransition, PlaybackSettings};
pub use detector::{BackendDetector, BarLineDetector, Calibrated, MeasureDetector};
pub use document::{AnalysisStatus, Document};
pub use error::{ConfigError, DecodeError, DetectionError, Error, StateError};
pub use page::{Measure, MeasureId, MeasureRef, NormRect, PageImage, PixelRect};
pub use practice::Practice;
pub use sequencer::{ClickOutcome, PlaybackSession, PlaybackState, TickCommand, TickOutcome};
