//! Drawing detected geometry back onto a page.

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::{
    drawing::{Blend, draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};
use palette::{FromColor, Hsl, Srgb};

use crate::{
    page::{Measure, PixelRect},
    staff::StaffGroup,
};

/// Translucent magenta marking a detected measure.
pub const MEASURE_FILL: Rgba<u8> = Rgba([255, 0, 255, 38]);

/// Opaque paper covering a measure that has been played.
pub const HIDDEN_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// `n` evenly spaced hues, so neighbouring rows are easy to tell apart.
pub(crate) fn row_colors(n: usize, alpha: u8) -> Vec<Rgba<u8>> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 * 360.0) / n as f32;
            let srgb: Srgb<u8> = Srgb::from_color(Hsl::new(hue, 0.9, 0.5)).into_format();
            Rgba([srgb.red, srgb.green, srgb.blue, alpha])
        })
        .collect()
}

/// Converts to a drawable rectangle, or `None` if nothing of it is visible.
fn drawable(rect: &PixelRect) -> Option<Rect> {
    if !rect.is_valid() {
        return None;
    }
    let width = rect.w.round().max(1.0) as u32;
    let height = rect.h.round().max(1.0) as u32;
    Some(Rect::at(rect.x.round() as i32, rect.y.round() as i32).of_size(width, height))
}

/// Draws the measures of a page the way the practice view shows them.
///
/// `is_played(index)` decides whether measure `index` is covered up.
pub fn draw_measures(
    page: &DynamicImage,
    measures: &[Measure],
    is_played: impl Fn(usize) -> bool,
) -> RgbaImage {
    let (width, height) = page.dimensions();
    let mut canvas = Blend(page.to_rgba8());
    for (index, measure) in measures.iter().enumerate() {
        let Some(rect) = drawable(&measure.rect.to_pixels(width, height)) else {
            continue;
        };
        let fill = if is_played(index) {
            HIDDEN_FILL
        } else {
            MEASURE_FILL
        };
        draw_filled_rect_mut(&mut canvas, rect, fill);
    }
    canvas.0
}

/// Outlines every bar line, one color per staff row.
pub fn draw_staff_groups(page: &DynamicImage, groups: &[StaffGroup]) -> RgbaImage {
    let mut canvas = page.to_rgba8();
    let colors = row_colors(groups.len(), 255);
    for (group, color) in groups.iter().zip(colors) {
        for bar in &group.bars {
            let outline = PixelRect::new(
                bar.x as f64,
                bar.y as f64,
                bar.width as f64,
                bar.height as f64,
            );
            if let Some(rect) = drawable(&outline) {
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }
    }
    canvas
}
