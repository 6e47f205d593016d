use cellshape_common::Vec2;

use crate::correspondence::CorrespondenceMap;

/// Waypoints for `old_len` boundary particles moving onto `new_arc`.
///
/// Old member `k` sits at `k / (old_len + 1)` along its arc and new member `k`
/// at `k / (new_arc.len() + 1)`; each old member is placed by linear
/// interpolation between the two new members bracketing its position, and
/// clamped to the first or last new member outside their range.
pub fn interpolate_arc(old_len: usize, new_arc: &[Vec2]) -> Vec<Vec2> {
    let q = new_arc.len();
    if q == 0 {
        return Vec::new();
    }
    let new_pos: Vec<f64> = (1..=q).map(|k| k as f64 / (q + 1) as f64).collect();

    (1..=old_len)
        .map(|k| {
            let t = k as f64 / (old_len + 1) as f64;
            if t <= new_pos[0] {
                return new_arc[0];
            }
            if t >= new_pos[q - 1] {
                return new_arc[q - 1];
            }
            // First new member strictly past t; 1 <= hi <= q - 1 here.
            let hi = new_pos.partition_point(|&p| p <= t);
            let lo = hi - 1;
            let c = (t - new_pos[lo]) / (new_pos[hi] - new_pos[lo]);
            new_arc[lo].lerp(new_arc[hi], c)
        })
        .collect()
}

/// Waypoints for every changed arc of `map`, in arc order. Entry `a[k]` is the
/// destination of current boundary point `map.changed[a].current[k]`.
pub fn interpolate_changes(target: &[Vec2], map: &CorrespondenceMap) -> Vec<Vec<Vec2>> {
    map.changed
        .iter()
        .map(|arc| {
            let path: Vec<Vec2> = arc.target_path().into_iter().map(|j| target[j]).collect();
            interpolate_arc(arc.current.len(), &path)
        })
        .collect()
}
