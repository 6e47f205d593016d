//! Aligning the current boundary (particle positions, in the persisted
//! boundary order) with a freshly derived target outline.
//!
//! Points that sit exactly on a target point are unchanged. Between two
//! consecutive unchanged points, whatever lies strictly between them on either
//! side forms a changed arc that has to be interpolated.

use cellshape_common::Vec2;
use log::debug;

use crate::distance::DistanceMatrix;
use crate::error::GeometryError;

/// A contiguous run of boundary that moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedArc {
    /// Current-side indices strictly between the anchors, in scan order.
    pub current: Vec<usize>,
    /// Target-side indices strictly between the anchors, walked from the
    /// start anchor towards the end anchor.
    pub target: Vec<usize>,
    /// Target indices of the unchanged points framing the arc, `(start, end)`.
    /// `None` when no point of the outline is unchanged.
    pub anchors: Option<(usize, usize)>,
}

impl ChangedArc {
    /// Target indices the interpolator walks along: the arc framed by its
    /// anchors, or closed back onto its first point when there are none.
    pub fn target_path(&self) -> Vec<usize> {
        match self.anchors {
            Some((start, end)) => std::iter::once(start)
                .chain(self.target.iter().copied())
                .chain(std::iter::once(end))
                .collect(),
            None => {
                let mut path = self.target.clone();
                if let Some(&first) = self.target.first() {
                    path.push(first);
                }
                path
            }
        }
    }
}

/// Partition of both outlines into unchanged pairs and changed arcs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrespondenceMap {
    /// `(current index, target index)` at distance zero, in current scan order.
    /// Only pairs that advance monotonically along the target outline are
    /// kept; other coincident points are treated as changed.
    pub unchanged: Vec<(usize, usize)>,
    pub changed: Vec<ChangedArc>,
    /// `1` when target indices advance with current indices, `-1` when the
    /// target outline winds the other way.
    pub orientation: isize,
}

impl CorrespondenceMap {
    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Number of steps from `a` to `b` walking `dir` around a cycle of `len`;
/// a full lap when `a == b`.
fn cyclic_steps(a: usize, b: usize, dir: isize, len: usize) -> usize {
    let d = ((b as isize - a as isize) * dir).rem_euclid(len as isize) as usize;
    if d == 0 { len } else { d }
}

fn cyclic_walk(start: usize, dir: isize, count: usize, len: usize) -> Vec<usize> {
    (1..=count)
        .map(|t| (start as isize + dir * t as isize).rem_euclid(len as isize) as usize)
        .collect()
}

/// Orientation implied by unchanged pairs that are neighbours on both sides.
fn orientation_from_pairs(unchanged: &[(usize, usize)], m: usize, n: usize) -> Option<isize> {
    if unchanged.len() < 2 {
        return None;
    }
    let (mut forward, mut backward) = (0usize, 0usize);
    for k in 0..unchanged.len() {
        let (ia, ja) = unchanged[k];
        let (ib, jb) = unchanged[(k + 1) % unchanged.len()];
        if ib != (ia + 1) % m {
            continue;
        }
        if jb == (ja + 1) % n {
            forward += 1;
        } else if jb == (ja + n - 1) % n {
            backward += 1;
        }
    }
    match forward.cmp(&backward) {
        std::cmp::Ordering::Greater => Some(1),
        std::cmp::Ordering::Less => Some(-1),
        std::cmp::Ordering::Equal => None,
    }
}

/// Twice the signed area of a closed polygon; positive when counter-clockwise.
fn signed_area2(points: &[Vec2]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|k| {
            let (a, b) = (points[k], points[(k + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

/// Orientation from the turning sense of both outlines, `None` if either is degenerate.
fn orientation_from_winding(current: &[Vec2], target: &[Vec2]) -> Option<isize> {
    let (a, b) = (signed_area2(current), signed_area2(target));
    if a == 0.0 || b == 0.0 {
        return None;
    }
    Some(if (a > 0.0) == (b > 0.0) { 1 } else { -1 })
}

/// Orientation from distances: the current point after the anchor should be
/// closer to the target neighbour on the same side of the anchor.
fn orientation_from_distance(current: &[Vec2], target: &[Vec2], i_anchor: usize, j_anchor: usize) -> isize {
    let (m, n) = (current.len(), target.len());
    let probe = current[(i_anchor + 1) % m];
    let ahead = probe.distance_squared(target[(j_anchor + 1) % n]);
    let behind = probe.distance_squared(target[(j_anchor + n - 1) % n]);
    if behind < ahead { -1 } else { 1 }
}

/// Longest subsequence of `unchanged` (cyclic, starting at `start`) whose
/// target indices advance strictly in `dir` within one lap of `n`.
fn monotone_pairs(unchanged: &[(usize, usize)], start: usize, dir: isize, n: usize) -> Vec<(usize, usize)> {
    let len = unchanged.len();
    let j0 = unchanged[start].1;
    let offset = |j: usize| ((j as isize - j0 as isize) * dir).rem_euclid(n as isize) as usize;
    let rest: Vec<(usize, (usize, usize))> = (1..len)
        .map(|k| unchanged[(start + k) % len])
        .filter_map(|pair| {
            let o = offset(pair.1);
            (o > 0).then_some((o, pair))
        })
        .collect();

    // tails[l]: index into `rest` ending the best run of length l + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; rest.len()];
    for (k, &(o, _)) in rest.iter().enumerate() {
        let pos = tails.partition_point(|&t| rest[t].0 < o);
        if pos > 0 {
            prev[k] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(k);
        } else {
            tails[pos] = k;
        }
    }

    let mut run = Vec::with_capacity(tails.len() + 1);
    let mut cursor = tails.last().copied();
    while let Some(k) = cursor {
        run.push(rest[k].1);
        cursor = prev[k];
    }
    run.push(unchanged[start]);
    run.reverse();
    run
}

/// Picks the orientation and the largest set of unchanged pairs that is
/// monotone along the target outline. Ties keep `preferred`. The result is
/// sorted by current index.
fn best_monotone_pairs(unchanged: &[(usize, usize)], preferred: isize, n: usize) -> (isize, Vec<(usize, usize)>) {
    let mut best: (isize, Vec<(usize, usize)>) = (preferred, Vec::new());
    'search: for dir in [preferred, -preferred] {
        for start in 0..unchanged.len() {
            let run = monotone_pairs(unchanged, start, dir, n);
            if run.len() > best.1.len() {
                best = (dir, run);
                if best.1.len() == unchanged.len() {
                    break 'search;
                }
            }
        }
    }
    best.1.sort_unstable();
    best
}

/// Matches `current` against `target`. Both must be non-empty and ordered.
pub fn match_outlines(current: &[Vec2], target: &[Vec2]) -> Result<CorrespondenceMap, GeometryError> {
    if current.is_empty() {
        return Err(GeometryError::EmptyOutline { stage: "correspondence (current)" });
    }
    if target.is_empty() {
        return Err(GeometryError::EmptyOutline { stage: "correspondence (target)" });
    }
    let (m, n) = (current.len(), target.len());
    let dist = DistanceMatrix::between(current, target);

    let unchanged: Vec<(usize, usize)> = (0..m)
        .filter_map(|i| match dist.row_min(i) {
            Some((j, d)) if d == 0.0 => Some((i, j)),
            _ => None,
        })
        .collect();

    if unchanged.is_empty() {
        // Nothing stayed put: one arc around the whole outline, started at the
        // target point nearest to the first current point.
        let start = dist.row_min(0).map_or(0, |(j, _)| j);
        let orientation = orientation_from_winding(current, target)
            .unwrap_or_else(|| orientation_from_distance(current, target, 0, start));
        let mut target_arc = vec![start];
        target_arc.extend(cyclic_walk(start, orientation, n - 1, n));
        return Ok(CorrespondenceMap {
            unchanged,
            changed: vec![ChangedArc { current: (0..m).collect(), target: target_arc, anchors: None }],
            orientation,
        });
    }

    let preferred = orientation_from_pairs(&unchanged, m, n)
        .or_else(|| orientation_from_winding(current, target))
        .unwrap_or_else(|| orientation_from_distance(current, target, unchanged[0].0, unchanged[0].1));
    let (orientation, kept) = best_monotone_pairs(&unchanged, preferred, n);
    if kept.len() < unchanged.len() {
        debug!(
            "Dropped {} of {} unchanged points that run against the outline orientation.",
            unchanged.len() - kept.len(),
            unchanged.len()
        );
    }
    let unchanged = kept;

    let mut changed = Vec::new();
    let len = unchanged.len();
    for k in 0..len {
        let (ia, ja) = unchanged[k];
        let (ib, jb) = unchanged[(k + 1) % len];

        let current_count = cyclic_steps(ia, ib, 1, m) - 1;
        let target_count = cyclic_steps(ja, jb, orientation, n) - 1;
        if current_count == 0 && target_count == 0 {
            continue;
        }
        changed.push(ChangedArc {
            current: cyclic_walk(ia, 1, current_count, m),
            target: cyclic_walk(ja, orientation, target_count, n),
            anchors: Some((ja, jb)),
        });
    }
    debug_assert_eq!(len + changed.iter().map(|arc| arc.target.len()).sum::<usize>(), n);

    Ok(CorrespondenceMap { unchanged, changed, orientation })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ring of lattice points around `[0, w] × [0, h]`, counter-clockwise from the origin.
    fn ring(x0: f64, w: usize, h: usize) -> Vec<Vec2> {
        let mut pts = Vec::new();
        for i in 0..w { pts.push(Vec2::new(x0 + i as f64, 0.0)); }
        for j in 0..h { pts.push(Vec2::new(x0 + w as f64, j as f64)); }
        for i in (1..=w).rev() { pts.push(Vec2::new(x0 + i as f64, h as f64)); }
        for j in (1..=h).rev() { pts.push(Vec2::new(x0, j as f64)); }
        pts
    }

    fn assert_partition(map: &CorrespondenceMap, m: usize, n: usize) {
        let mut cur = vec![0; m];
        let mut tgt = vec![0; n];
        for &(i, j) in &map.unchanged {
            cur[i] += 1;
            tgt[j] += 1;
        }
        for arc in &map.changed {
            arc.current.iter().for_each(|&i| cur[i] += 1);
            arc.target.iter().for_each(|&j| tgt[j] += 1);
        }
        assert!(cur.iter().all(|&c| c == 1), "current coverage {:?}", cur);
        assert!(tgt.iter().all(|&c| c == 1), "target coverage {:?}", tgt);
    }

    #[test]
    fn identical_outlines_are_unchanged() {
        let a = ring(0.0, 4, 3);
        let map = match_outlines(&a, &a).unwrap();
        assert!(map.is_unchanged());
        assert_eq!(map.unchanged.len(), a.len());
        assert_eq!(map.orientation, 1);
    }

    #[test]
    fn rotated_and_reversed_start_is_still_unchanged() {
        let a = ring(0.0, 4, 3);
        let mut b = a.clone();
        b.rotate_left(5);
        b.reverse();
        let map = match_outlines(&a, &b).unwrap();
        assert!(map.is_unchanged());
        assert_eq!(map.orientation, -1);
    }

    #[test]
    fn bulge_forms_one_arc() {
        // current: 4x3 box; target: same box with the right edge pushed out by one.
        let a = ring(0.0, 4, 3);
        let mut b = Vec::new();
        for i in 0..5 { b.push(Vec2::new(i as f64, 0.0)); }
        for j in 0..3 { b.push(Vec2::new(5.0, j as f64)); }
        for i in (1..=5).rev() { b.push(Vec2::new(i as f64, 3.0)); }
        for j in (1..=3).rev() { b.push(Vec2::new(0.0, j as f64)); }
        let map = match_outlines(&a, &b).unwrap();
        assert_eq!(map.changed.len(), 1);
        let arc = &map.changed[0];
        // (4,1), (4,2) moved; anchors are (4,0) and (4,3).
        assert_eq!(arc.current.iter().map(|&i| a[i]).collect::<Vec<_>>(), vec![Vec2::new(4.0, 1.0), Vec2::new(4.0, 2.0)]);
        let (s, e) = arc.anchors.unwrap();
        assert_eq!((b[s], b[e]), (Vec2::new(4.0, 0.0), Vec2::new(4.0, 3.0)));
        assert_eq!(
            arc.target.iter().map(|&j| b[j]).collect::<Vec<_>>(),
            vec![Vec2::new(5.0, 0.0), Vec2::new(5.0, 1.0), Vec2::new(5.0, 2.0), Vec2::new(5.0, 3.0)]
        );
        assert_eq!(arc.target_path().len(), 6);
        assert_partition(&map, a.len(), b.len());
    }

    #[test]
    fn two_pairs_split_the_rest() {
        let a = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];
        let b = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0), Vec2::new(1.0, 2.0), Vec2::new(-1.0, 1.0)];
        let map = match_outlines(&a, &b).unwrap();
        assert_eq!(map.unchanged, vec![(0, 0), (1, 1)]);
        assert_eq!(map.changed.len(), 1);
        assert_eq!(map.changed[0].current, vec![2, 3]);
        assert_eq!(map.changed[0].target, vec![2, 3, 4]);
        assert_partition(&map, a.len(), b.len());
    }

    #[test]
    fn disjoint_outlines_form_one_closed_arc() {
        let a = ring(0.0, 2, 2);
        let b = ring(10.0, 2, 2);
        let map = match_outlines(&a, &b).unwrap();
        assert!(map.unchanged.is_empty());
        assert_eq!(map.changed.len(), 1);
        let arc = &map.changed[0];
        assert_eq!(arc.anchors, None);
        assert_eq!(map.orientation, 1);
        assert_eq!(arc.current.len(), a.len());
        assert_eq!(arc.target.len(), b.len());
        assert_eq!(arc.target_path().first(), arc.target_path().last());
        assert_partition(&map, a.len(), b.len());
    }

    #[test]
    fn reversed_run_of_coincident_points_becomes_changed() {
        // Points 4 and 5 coincide with target points but run against the rest.
        let a = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(0.0, 1.0),
        ];
        let b = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(0.0, 1.0),
        ];
        let map = match_outlines(&a, &b).unwrap();
        assert_eq!(map.orientation, 1);
        assert_eq!(map.unchanged.len(), 6);
        assert_eq!(map.changed.len(), 2);
        assert_partition(&map, a.len(), b.len());
    }

    #[test]
    fn cell_stepping_back_over_its_own_edge_is_covered_once() {
        use crate::grid::{Grid, Lattice};
        use crate::pipeline::OutlinePipeline;

        let lattice = Lattice::new(12, 12);
        let pipeline = OutlinePipeline::new(1);
        let mut before = Grid::new(12, 12);
        before.fill_rect(3, 6, 2, 2, 1);
        before.fill_rect(5, 5, 2, 2, 1);
        let mut after = Grid::new(12, 12);
        after.fill_rect(5, 6, 2, 2, 1);

        let current = pipeline.generate(&before, 1, &lattice).unwrap();
        let target = pipeline.generate(&after, 1, &lattice).unwrap();
        let map = match_outlines(&current, &target).unwrap();
        assert_partition(&map, current.len(), target.len());
        for &(i, j) in &map.unchanged {
            assert_eq!(current[i], target[j]);
        }
        for arc in &map.changed {
            assert!(arc.target.len() < target.len());
        }
    }

    #[test]
    fn empty_sides_are_rejected() {
        let a = ring(0.0, 2, 2);
        assert!(matches!(match_outlines(&[], &a), Err(GeometryError::EmptyOutline { .. })));
        assert!(matches!(match_outlines(&a, &[]), Err(GeometryError::EmptyOutline { .. })));
    }
}
