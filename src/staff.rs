//! Clusters bar-line candidates into staff rows.

use log::debug;

use crate::{contours::BarCandidate, rect::center};

/// Bar lines of one staff system, sorted left to right, one per true bar.
#[derive(Debug, Clone, PartialEq)]
pub struct StaffGroup {
    pub bars: Vec<BarCandidate>,
}

impl StaffGroup {
    /// Top edge of the row, taken from its first bar.
    pub fn y(&self) -> u32 {
        self.bars.first().map_or(0, |b| b.y)
    }
}

/// Groups candidates into rows by their top edge, then sorts and
/// deduplicates each row.
///
/// Candidates are sorted by `y` first and swept once: a candidate joins the
/// current row when its `y` is within `row_tolerance` of the row's first
/// candidate, otherwise it opens a new row. The result does not depend on
/// the order the contours were traced in. Rows come out top to bottom.
pub fn group_into_staves(
    mut candidates: Vec<BarCandidate>,
    row_tolerance: u32,
    dedup_radius: f64,
) -> Vec<StaffGroup> {
    candidates.sort_by_key(|b| (b.y, b.x));

    let mut rows: Vec<Vec<BarCandidate>> = Vec::new();
    for candidate in candidates {
        match rows.last_mut() {
            Some(row) if candidate.y - row[0].y <= row_tolerance => row.push(candidate),
            _ => rows.push(vec![candidate]),
        }
    }

    let groups: Vec<StaffGroup> = rows
        .into_iter()
        .map(|mut row| {
            row.sort_by_key(|b| b.x);
            StaffGroup {
                bars: dedup_by_proximity(row, dedup_radius),
            }
        })
        .collect();
    debug!("staves: {} rows", groups.len());
    groups
}

/// Drops every bar whose center lies within `radius` of a bar already kept.
///
/// The opening step often leaves both edges of a thick bar line as separate
/// strokes; this collapses them into the leftmost one.
pub fn dedup_by_proximity(bars: Vec<BarCandidate>, radius: f64) -> Vec<BarCandidate> {
    let r2 = radius * radius;
    let mut kept: Vec<BarCandidate> = Vec::with_capacity(bars.len());
    for bar in bars {
        let (cx, cy) = center(&bar);
        let duplicate = kept.iter().any(|k| {
            let (kx, ky) = center(k);
            let (dx, dy) = (cx - kx, cy - ky);
            dx * dx + dy * dy < r2
        });
        if !duplicate {
            kept.push(bar);
        }
    }
    kept
}
