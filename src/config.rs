//! Tunable parameters for detection and playback.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest measure, in seconds, that playback timing accepts.
pub const MAX_MEASURE_SECS: f64 = 3600.0;

/// Parameters of the bar-line detection pipeline.
///
/// The defaults are calibrated for pages rendered at roughly 1.5x of a
/// letter-sized PDF page (about 900px wide).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Side of the square neighbourhood used by adaptive thresholding. Must
    /// be odd.
    pub threshold_block_size: u32,
    /// Constant subtracted from the weighted neighbourhood mean.
    pub threshold_constant: f32,
    /// Height of the vertical structuring element used for opening.
    pub vertical_kernel_height: u32,
    /// How many times erosion and dilation are each applied.
    pub opening_iterations: u32,
    /// Bars must be strictly taller than this.
    pub min_bar_height: u32,
    /// Bars must be strictly shorter than this.
    pub max_bar_height: u32,
    /// Allowed deviation of a bar's height from the page median.
    pub median_tolerance: f64,
    /// Vertical tolerance when grouping bars into staff rows.
    pub row_tolerance: u32,
    /// Bars whose centers are closer than this are the same bar.
    pub dedup_radius: f64,
    /// Vertical tolerance collapsing rectangles into one reading row.
    pub reading_row_tolerance: f64,
    /// Straighten the page before thresholding.
    pub deskew: bool,
    /// Width pages are downscaled to by [`crate::detector::Calibrated`].
    pub calibration_width: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            threshold_block_size: 11,
            threshold_constant: 2.0,
            vertical_kernel_height: 25,
            opening_iterations: 2,
            min_bar_height: 50,
            max_bar_height: 1000,
            median_tolerance: 5.0,
            row_tolerance: 5,
            dedup_radius: 20.0,
            reading_row_tolerance: 50.0,
            deskew: false,
            calibration_width: 600,
        }
    }
}

impl DetectConfig {
    /// Checks the values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_block_size == 0 {
            return Err(ConfigError::NonPositive {
                name: "threshold_block_size",
            });
        }
        if self.threshold_block_size % 2 == 0 {
            return Err(ConfigError::NotOdd {
                name: "threshold_block_size",
                value: self.threshold_block_size,
            });
        }
        if self.vertical_kernel_height == 0 {
            return Err(ConfigError::NonPositive {
                name: "vertical_kernel_height",
            });
        }
        if self.calibration_width == 0 {
            return Err(ConfigError::NonPositive {
                name: "calibration_width",
            });
        }
        Ok(())
    }

    /// Standard deviation of the Gaussian window matching `threshold_block_size`.
    ///
    /// Same relation OpenCV uses when it derives sigma from a kernel size.
    pub fn threshold_sigma(&self) -> f32 {
        let k = self.threshold_block_size.max(3) as f32;
        0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
    }
}

/// Metronome and transition preferences of a practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub bpm: f64,
    pub beats_per_measure: u32,
    /// Fraction of the measure after which the hide transition starts.
    pub transition_start: f64,
    /// Fraction of the measure at which the hide transition is complete.
    pub transition_end: f64,
    /// Whether the beeper should sound. Sequencing runs either way.
    pub metronome_audible: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            bpm: 60.0,
            beats_per_measure: 4,
            transition_start: 0.25,
            transition_end: 0.75,
            metronome_audible: true,
        }
    }
}

impl PlaybackSettings {
    pub fn new(
        bpm: f64,
        beats_per_measure: u32,
        transition_start: f64,
        transition_end: f64,
    ) -> Result<Self, ConfigError> {
        let settings = Self {
            bpm,
            beats_per_measure,
            transition_start,
            transition_end,
            ..Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(ConfigError::InvalidBpm(self.bpm));
        }
        if self.beats_per_measure == 0 {
            return Err(ConfigError::InvalidBeatsPerMeasure);
        }
        let (start, end) = (self.transition_start, self.transition_end);
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
            return Err(ConfigError::InvalidTransitionWindow { start, end });
        }
        let secs = self.measure_duration_secs();
        if !secs.is_finite() || secs > MAX_MEASURE_SECS {
            return Err(ConfigError::MeasureTooLong {
                secs,
                max: MAX_MEASURE_SECS,
            });
        }
        Ok(())
    }

    /// Interval between two metronome ticks.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm)
    }

    /// Length of one measure in seconds.
    pub fn measure_duration_secs(&self) -> f64 {
        self.beats_per_measure as f64 * 60.0 / self.bpm
    }

    /// Timing of the hide transition applied to a freshly reached measure.
    pub fn hide_transition(&self) -> HideTransition {
        let measure = self.measure_duration_secs();
        HideTransition {
            delay: Duration::from_secs_f64(measure * self.transition_start),
            duration: Duration::from_secs_f64(
                measure * (self.transition_end - self.transition_start),
            ),
        }
    }
}

/// Delay and length of the fade that hides a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HideTransition {
    pub delay: Duration,
    pub duration: Duration,
}
