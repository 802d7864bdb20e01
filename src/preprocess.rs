//! Turns a page raster into a binary map of near-vertical strokes.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::{
    edges::canny,
    filter::gaussian_blur_f32,
    geometric_transformations::{Interpolation, rotate_about_center},
    hough::{LineDetectionOptions, detect_lines},
    morphology::{Mask, grayscale_dilate, grayscale_erode},
};
use log::debug;

use crate::config::DetectConfig;

const INK: Luma<u8> = Luma([255]);
const PAPER: Luma<u8> = Luma([0]);

/// Largest structuring element a [`Mask`] can hold.
const MAX_MASK_EXTENT: u32 = 511;

/// Hough lines further than this from horizontal are ignored by deskew.
const SKEW_WINDOW_DEGREES: i32 = 15;

/// Full preprocessing chain: grayscale, optional deskew, inverted adaptive
/// threshold, then vertical opening.
///
/// The result holds 255 wherever a near-vertical stroke at least
/// `vertical_kernel_height` pixels tall survived, and 0 elsewhere.
pub fn vertical_strokes(page: &DynamicImage, config: &DetectConfig) -> GrayImage {
    let mut gray = page.to_luma8();
    if config.deskew {
        gray = deskew(&gray);
    }
    let binary =
        adaptive_threshold_inverted(&gray, config.threshold_sigma(), config.threshold_constant);
    vertical_opening(&binary, config.vertical_kernel_height, config.opening_iterations)
}

/// Gaussian-weighted adaptive threshold with ink mapped to white.
///
/// A pixel is ink when it is at least `constant` darker than the Gaussian
/// mean of its neighbourhood.
pub fn adaptive_threshold_inverted(gray: &GrayImage, sigma: f32, constant: f32) -> GrayImage {
    let local_mean = gaussian_blur_f32(gray, sigma);
    let mut binary = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in binary.enumerate_pixels_mut() {
        let value = gray.get_pixel(x, y).0[0] as f32;
        let threshold = local_mean.get_pixel(x, y).0[0] as f32 - constant;
        *pixel = if value <= threshold { INK } else { PAPER };
    }
    binary
}

/// Morphological opening with a `1 x kernel_height` vertical line.
///
/// Erodes `iterations` times, then dilates `iterations` times, which keeps
/// only strokes that are at least roughly as tall as the kernel.
pub fn vertical_opening(binary: &GrayImage, kernel_height: u32, iterations: u32) -> GrayImage {
    let height = kernel_height.clamp(1, MAX_MASK_EXTENT);
    let kernel = GrayImage::from_pixel(1, height, INK);
    let mask = Mask::from_image(&kernel, 0, (height / 2) as u8);

    let mut opened = binary.clone();
    for _ in 0..iterations {
        opened = grayscale_erode(&opened, &mask);
    }
    for _ in 0..iterations {
        opened = grayscale_dilate(&opened, &mask);
    }
    opened
}

/// Estimates how many degrees the staff lines are rotated clockwise.
///
/// Returns `None` when no long near-horizontal line is found.
pub fn estimate_skew_degrees(gray: &GrayImage) -> Option<f32> {
    let edges = canny(gray, 50.0, 150.0);
    let options = LineDetectionOptions {
        vote_threshold: (gray.width() / 4).max(50),
        suppression_radius: 8,
    };
    let mut skews: Vec<i32> = detect_lines(&edges, options)
        .into_iter()
        .map(|line| line.angle_in_degrees as i32 - 90)
        .filter(|skew| skew.abs() <= SKEW_WINDOW_DEGREES)
        .collect();
    debug!("deskew: {} near-horizontal lines", skews.len());
    if skews.is_empty() {
        return None;
    }
    skews.sort_unstable();
    Some(skews[skews.len() / 2] as f32)
}

/// Rotates the page so that its staff lines become horizontal.
pub fn deskew(gray: &GrayImage) -> GrayImage {
    match estimate_skew_degrees(gray) {
        Some(skew) if skew != 0.0 => {
            debug!("deskew: rotating by {skew} degrees");
            rotate_about_center(
                gray,
                -skew.to_radians(),
                Interpolation::Bilinear,
                Luma([255]),
            )
        }
        _ => gray.clone(),
    }
}
