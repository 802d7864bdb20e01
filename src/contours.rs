use image::{GrayImage, math::Rect};
use imageproc::contours::{BorderType, Contour, find_contours};
use log::debug;

use crate::{config::DetectConfig, rect::bounding_box};

/// Bounding box of a stroke that may be a bar line.
pub type BarCandidate = Rect;

/// Finds the bar-line candidates of a vertical-stroke map.
///
/// Traces the outer contours of the map, boxes them, and runs the two
/// height filters: [`retain_plausible_heights`] followed by
/// [`retain_near_median_height`].
pub fn find_bar_candidates(strokes: &GrayImage, config: &DetectConfig) -> Vec<BarCandidate> {
    let mut contours = find_contours::<i32>(strokes);
    retain_external_in_place(&mut contours);
    debug!("contours: {} external", contours.len());

    let mut boxes: Vec<BarCandidate> = contours
        .iter()
        .filter_map(|contour| bounding_box(&contour.points))
        .collect();

    retain_plausible_heights(&mut boxes, config.min_bar_height, config.max_bar_height);
    debug!("contours: {} within height bounds", boxes.len());

    retain_near_median_height(&mut boxes, config.median_tolerance);
    debug!("contours: {} near median height", boxes.len());

    boxes
}

/// Keeps only the outermost borders, dropping holes and anything nested.
pub fn retain_external_in_place(contours: &mut Vec<Contour<i32>>) {
    contours.retain(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none());
}

/// Removes boxes whose height is not strictly between `min_height` and
/// `max_height`: dust and page-sized artifacts.
pub fn retain_plausible_heights(boxes: &mut Vec<BarCandidate>, min_height: u32, max_height: u32) {
    boxes.retain(|b| b.height > min_height && b.height < max_height);
}

/// Removes boxes deviating from the median height by more than `tolerance`.
///
/// Bar lines of one page share nearly the same height, whereas stems and
/// slurs that survive the opening do not.
pub fn retain_near_median_height(boxes: &mut Vec<BarCandidate>, tolerance: f64) {
    let mut heights: Vec<u32> = boxes.iter().map(|b| b.height).collect();
    let Some(median) = median(&mut heights) else {
        return;
    };
    boxes.retain(|b| (b.height as f64 - median).abs() <= tolerance);
}

/// Median of `values`, averaging the two middle elements for even lengths.
pub fn median(values: &mut [u32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[middle - 1] as f64 + values[middle] as f64) / 2.0)
    } else {
        Some(values[middle] as f64)
    }
}
