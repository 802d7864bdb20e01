//! Builds measure rectangles from staff rows and puts rectangles in
//! reading order.

use std::cmp::Ordering;

use crate::{page::PixelRect, staff::StaffGroup};

/// Emits one rectangle per pair of adjacent bars in `group`.
///
/// Measure `i` runs from the left edge of bar `i` to the right edge of bar
/// `i + 1`, so neighbouring measures share the stroke of the bar between
/// them. The height is the left bar's height; bars of one row are of equal
/// height after the median filter. A row with fewer than two bars yields
/// nothing.
pub fn measures_of_group(group: &StaffGroup) -> Vec<PixelRect> {
    group
        .bars
        .windows(2)
        .map(|pair| {
            let (left, right) = (&pair[0], &pair[1]);
            PixelRect::new(
                left.x as f64,
                left.y as f64,
                (right.x + right.width) as f64 - left.x as f64,
                left.height as f64,
            )
        })
        .collect()
}

/// Builds the measures of every row and orders them for reading.
pub fn build_measures(groups: &[StaffGroup], reading_row_tolerance: f64) -> Vec<PixelRect> {
    let rects = groups.iter().flat_map(measures_of_group).collect();
    reading_order(rects, reading_row_tolerance)
}

/// Sorts rectangles top to bottom, then left to right within a row.
///
/// Rectangles are swept in order of `y`; one whose top is within
/// `row_tolerance` of the current row's first rectangle joins that row.
/// Rows are then sorted by `x`, ties broken by `y`.
pub fn reading_order(mut rects: Vec<PixelRect>, row_tolerance: f64) -> Vec<PixelRect> {
    rects.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut rows: Vec<Vec<PixelRect>> = Vec::new();
    for rect in rects {
        match rows.last_mut() {
            Some(row) if rect.y - row[0].y <= row_tolerance => row.push(rect),
            _ => rows.push(vec![rect]),
        }
    }

    rows.into_iter()
        .flat_map(|mut row| {
            row.sort_by(compare_within_row);
            row
        })
        .collect()
}

fn compare_within_row(a: &PixelRect, b: &PixelRect) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::math::Rect;
    use pretty_assertions::assert_eq;

    fn bars(xs: &[u32], y: u32, width: u32, height: u32) -> StaffGroup {
        StaffGroup {
            bars: xs
                .iter()
                .map(|&x| Rect {
                    x,
                    y,
                    width,
                    height,
                })
                .collect(),
        }
    }

    #[test]
    fn adjacent_bars_make_measures() {
        let group = bars(&[10, 110, 210, 310], 50, 0, 40);
        assert_eq!(
            measures_of_group(&group),
            vec![
                PixelRect::new(10.0, 50.0, 100.0, 40.0),
                PixelRect::new(110.0, 50.0, 100.0, 40.0),
                PixelRect::new(210.0, 50.0, 100.0, 40.0),
            ]
        );
    }

    #[test]
    fn measure_includes_closing_bar_stroke() {
        let group = bars(&[10, 110], 0, 3, 60);
        assert_eq!(measures_of_group(&group), vec![PixelRect::new(10.0, 0.0, 103.0, 60.0)]);
    }

    #[test]
    fn n_bars_give_n_minus_one_ordered_measures() {
        for n in 0..8u32 {
            let xs: Vec<u32> = (0..n).map(|i| 20 + i * 90).collect();
            let measures = measures_of_group(&bars(&xs, 0, 2, 80));
            assert_eq!(measures.len(), n.saturating_sub(1) as usize);
            for pair in measures.windows(2) {
                assert!(pair[0].x < pair[1].x);
                // Only the shared bar stroke may be covered by both.
                assert!(pair[0].right() - pair[1].x <= 2.0);
            }
        }
    }

    #[test]
    fn rows_are_read_top_to_bottom_then_left_to_right() {
        let rects = vec![
            PixelRect::new(300.0, 420.0, 90.0, 80.0),
            PixelRect::new(10.0, 100.0, 90.0, 80.0),
            PixelRect::new(10.0, 440.0, 90.0, 80.0),
            PixelRect::new(200.0, 95.0, 90.0, 80.0),
            PixelRect::new(100.0, 130.0, 90.0, 80.0),
        ];
        let ordered: Vec<(f64, f64)> = reading_order(rects, 50.0)
            .iter()
            .map(|r| (r.x, r.y))
            .collect();
        assert_eq!(
            ordered,
            vec![(10.0, 100.0), (100.0, 130.0), (200.0, 95.0), (10.0, 440.0), (300.0, 420.0)]
        );
    }

    #[test]
    fn reading_order_is_total() {
        let rects = vec![
            PixelRect::new(50.0, 10.0, 1.0, 1.0),
            PixelRect::new(50.0, 30.0, 1.0, 1.0),
            PixelRect::new(20.0, 200.0, 1.0, 1.0),
        ];
        let mut shuffled = rects.clone();
        shuffled.rotate_left(1);
        assert_eq!(reading_order(rects, 50.0), reading_order(shuffled, 50.0));
    }

    #[test]
    fn build_concatenates_rows_in_reading_order() {
        let groups = vec![bars(&[10, 110, 210], 300, 0, 40), bars(&[20, 120], 100, 0, 40)];
        let measures = build_measures(&groups, 50.0);
        let starts: Vec<(f64, f64)> = measures.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(starts, vec![(20.0, 100.0), (10.0, 300.0), (110.0, 300.0)]);
    }
}
