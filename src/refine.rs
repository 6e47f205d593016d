use cellshape_common::Vec2;
use std::collections::HashSet;

use crate::distance::DistanceMatrix;

/// One subdivision pass: every point contributes the midpoints towards each of
/// its nearest neighbours. The originals are kept first, in order, followed by
/// the new midpoints in discovery order. Duplicates, including midpoints that
/// coincide with an existing point, are dropped.
pub fn refine_once(points: &[Vec2]) -> Vec<Vec2> {
    let nearest = DistanceMatrix::pairwise(points).nearest_sets();

    let mut seen: HashSet<(u64, u64)> = points.iter().map(Vec2::bits).collect();
    let mut refined = points.to_vec();
    for (i, nbs) in nearest.iter().enumerate() {
        for &n in nbs {
            let mid = points[i].midpoint(points[n]);
            if seen.insert(mid.bits()) {
                refined.push(mid);
            }
        }
    }
    refined
}

/// Applies `passes` subdivision passes. Each pass roughly doubles the vertex
/// density of a closed outline; no point is ever removed.
pub fn refine_outline(points: &[Vec2], passes: u32) -> Vec<Vec2> {
    let mut refined = points.to_vec();
    for _ in 0..passes {
        refined = refine_once(&refined);
    }
    refined
}
