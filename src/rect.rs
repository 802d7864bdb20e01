use image::math::Rect;
use imageproc::point::Point;
use num_traits::{Num, ToPrimitive};

/// Calculates the pixel bounding box of a traced contour.
///
/// The box covers every pixel the points lie on, so a single point yields a
/// 1x1 box and a vertical run from `y = 10` to `y = 19` yields a height of 10.
/// This matches how bounding rectangles of contours are measured elsewhere
/// in image processing, and is what the bar height thresholds assume.
///
/// Generic over numeric types that implement `PartialOrd`, so both the
/// integer contours of `imageproc::contours::find_contours` and floating-point
/// polygons are accepted. Negative coordinates are clamped to 0.
///
/// # Returns
///
/// `None` for an empty slice.
///
/// # Examples
///
/// ```
/// use imageproc::point::Point;
/// use measure_hider::rect::bounding_box;
///
/// let points = [Point::new(5, 10), Point::new(6, 10), Point::new(6, 89), Point::new(5, 89)];
/// let bbox = bounding_box(&points).unwrap();
///
/// assert_eq!((bbox.x, bbox.y), (5, 10));
/// assert_eq!((bbox.width, bbox.height), (2, 80));
/// ```
pub fn bounding_box<T>(points: &[Point<T>]) -> Option<Rect>
where
    T: Copy + PartialOrd + Num + ToPrimitive,
{
    let (first, rest) = points.split_first()?;
    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;

    // `T` is only `PartialOrd`, so no `min`/`max` helpers.
    for p in rest {
        if p.x < min_x {
            min_x = p.x;
        }
        if p.x > max_x {
            max_x = p.x;
        }
        if p.y < min_y {
            min_y = p.y;
        }
        if p.y > max_y {
            max_y = p.y;
        }
    }

    let x = min_x.to_u32().unwrap_or(0);
    let y = min_y.to_u32().unwrap_or(0);

    let width = (max_x.to_u32().unwrap_or(0) + 1).saturating_sub(x);
    let height = (max_y.to_u32().unwrap_or(0) + 1).saturating_sub(y);

    Some(Rect {
        x,
        y,
        width,
        height,
    })
}

/// Center of a box in floating-point pixel coordinates.
pub fn center(rect: &Rect) -> (f64, f64) {
    (
        rect.x as f64 + rect.width as f64 / 2.0,
        rect.y as f64 + rect.height as f64 / 2.0,
    )
}
