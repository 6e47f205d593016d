//! Ordering an unordered outline point set into a single closed cycle.
//!
//! Consecutive points of the cycle are nearest neighbours: from each point the
//! walk may only continue to one of the points at its smallest non-zero
//! distance. Where several unvisited candidates tie, the search forks and
//! backtracks on dead ends. The first cycle that visits every point and closes
//! back onto the seed is accepted.

use cellshape_common::Vec2;
use log::{debug, trace, warn};

use crate::distance::DistanceMatrix;
use crate::error::GeometryError;

/// A branching point of the search: the path length at which the fork was
/// taken and the candidates not yet tried there.
struct Fork {
    depth: usize,
    alternatives: Vec<usize>,
    next: usize,
}

struct Search<'a> {
    nearest: &'a [Vec<usize>],
    /// `reverse[w]` lists every `u` with `w` in `nearest[u]`.
    reverse: Vec<Vec<usize>>,
    path: Vec<usize>,
    visited: Vec<bool>,
}

impl<'a> Search<'a> {
    fn new(nearest: &'a [Vec<usize>]) -> Self {
        let n = nearest.len();
        let mut reverse = vec![Vec::new(); n];
        for (u, nbs) in nearest.iter().enumerate() {
            for &w in nbs {
                reverse[w].push(u);
            }
        }
        Self { nearest, reverse, path: Vec::with_capacity(n), visited: vec![false; n] }
    }

    fn push(&mut self, v: usize) {
        self.visited[v] = true;
        self.path.push(v);
    }

    fn truncate(&mut self, depth: usize) {
        for v in self.path.drain(depth..) {
            self.visited[v] = false;
        }
    }

    fn end(&self) -> usize {
        self.path[self.path.len() - 1]
    }

    fn candidates(&self) -> Vec<usize> {
        self.nearest[self.end()]
            .iter()
            .copied()
            .filter(|&c| !self.visited[c])
            .collect()
    }

    /// After stepping from `prev` to `v`, true if a skipped neighbour of `prev`
    /// can no longer be entered: nothing unvisited (nor `v`) reaches it.
    fn strands(&self, prev: usize, v: usize) -> bool {
        self.nearest[prev]
            .iter()
            .filter(|&&w| !self.visited[w])
            .any(|&w| !self.reverse[w].iter().any(|&u| u == v || !self.visited[u]))
    }

    fn closes(&self, seed: usize) -> bool {
        self.nearest[self.end()].contains(&seed)
    }
}

/// Indices of `points` in winding order.
///
/// Fails with [`GeometryError::WindingOrder`] when no closed nearest-neighbour
/// cycle covers every point, which happens for self-touching (figure-eight),
/// disconnected or otherwise degenerate outlines.
pub fn winding_order(points: &[Vec2]) -> Result<Vec<usize>, GeometryError> {
    let n = points.len();
    if n == 0 {
        return Err(GeometryError::EmptyOutline { stage: "winding order" });
    }
    if n < 3 {
        return Err(GeometryError::TooFewPoints { count: n });
    }

    let nearest = DistanceMatrix::pairwise(points).nearest_sets();
    let seed = nearest
        .iter()
        .position(|nbs| nbs.len() == 2)
        .ok_or(GeometryError::WindingOrder { points: n })?;

    let mut search = Search::new(&nearest);
    let mut forks: Vec<Fork> = Vec::new();
    let mut fork_count = 0usize;
    let mut backtracks = 0usize;

    search.push(seed);
    search.push(nearest[seed][0]);

    loop {
        let advanced = if search.path.len() == n {
            if search.closes(seed) {
                if backtracks > 0 {
                    warn!(
                        "Winding order of {} points is ambiguous: {} forks, {} backtracks before the first closed cycle.",
                        n, fork_count, backtracks
                    );
                } else if fork_count > 0 {
                    debug!("Winding order of {} points passed {} equal-distance forks.", n, fork_count);
                }
                return Ok(search.path);
            }
            false
        } else {
            let prev = search.end();
            match search.candidates().as_slice() {
                [] => false,
                [only] => {
                    search.push(*only);
                    true
                }
                [first, rest @ ..] => {
                    trace!("Fork at point {} (path length {}): {} candidates.", prev, search.path.len(), rest.len() + 1);
                    fork_count += 1;
                    forks.push(Fork { depth: search.path.len(), alternatives: rest.to_vec(), next: 0 });
                    search.push(*first);
                    !search.strands(prev, *first)
                }
            }
        };

        if advanced {
            continue;
        }

        // Resume from the most recent fork with an untried alternative.
        loop {
            let Some(fork) = forks.last_mut() else {
                return Err(GeometryError::WindingOrder { points: n });
            };
            if fork.next >= fork.alternatives.len() {
                forks.pop();
                continue;
            }
            let alt = fork.alternatives[fork.next];
            fork.next += 1;
            let depth = fork.depth;

            backtracks += 1;
            search.truncate(depth);
            let prev = search.end();
            search.push(alt);
            if !search.strands(prev, alt) {
                break;
            }
        }
    }
}

/// Reorders `points` into winding order.
pub fn order_outline(points: &[Vec2]) -> Result<Vec<Vec2>, GeometryError> {
    Ok(winding_order(points)?.into_iter().map(|i| points[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_outline;
    use crate::grid::{Grid, Lattice};
    use crate::refine::refine_outline;

    fn assert_nearest_cycle(points: &[Vec2], order: &[usize]) {
        let m = DistanceMatrix::pairwise(points);
        let mut seen = vec![false; points.len()];
        for k in 0..order.len() {
            let a = order[k];
            let b = order[(k + 1) % order.len()];
            assert!(!seen[a], "point {} visited twice", a);
            seen[a] = true;
            assert!(m.nearest_nonzero(a).contains(&b), "{} -> {} is not a nearest-neighbour step", a, b);
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn orders_a_refined_square() {
        let mut grid = Grid::new(8, 8);
        grid.fill_rect(2, 3, 3, 2, 1);
        let pts = refine_outline(&extract_outline(&grid, 1, &Lattice::new(8, 8)), 2);
        let order = winding_order(&pts).unwrap();
        assert_eq!(order.len(), pts.len());
        assert_nearest_cycle(&pts, &order);
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut pts = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 2.0),
        ];
        let order = winding_order(&pts).unwrap();
        assert_nearest_cycle(&pts, &order);
        pts.reverse();
        let order = winding_order(&pts).unwrap();
        assert_nearest_cycle(&pts, &order);
    }

    #[test]
    fn backtracks_out_of_a_chord() {
        // (1,0) and (1,1) each see three neighbours at distance 1; the first
        // fork walks across the chord and has to be undone.
        let pts = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        assert_eq!(winding_order(&pts).unwrap(), vec![0, 1, 3, 4, 2, 5]);
    }

    #[test]
    fn figure_eight_has_no_winding() {
        let mut grid = Grid::new(4, 4);
        grid.set(0, 0, 1);
        grid.set(1, 1, 1);
        let pts = extract_outline(&grid, 1, &Lattice::new(4, 4));
        assert_eq!(pts.len(), 15);
        assert_eq!(winding_order(&pts), Err(GeometryError::WindingOrder { points: 15 }));
    }

    #[test]
    fn disconnected_outlines_fail() {
        let mut grid = Grid::new(10, 10);
        grid.set(1, 1, 1);
        grid.set(6, 6, 1);
        let pts = extract_outline(&grid, 1, &Lattice::new(10, 10));
        assert!(matches!(winding_order(&pts), Err(GeometryError::WindingOrder { .. })));
    }

    #[test]
    fn too_small_inputs_are_rejected() {
        assert_eq!(winding_order(&[]), Err(GeometryError::EmptyOutline { stage: "winding order" }));
        assert_eq!(
            winding_order(&[Vec2::zero(), Vec2::new(1.0, 0.0)]),
            Err(GeometryError::TooFewPoints { count: 2 })
        );
    }
}
