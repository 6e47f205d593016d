use cellshape_common::Vec2;
use rayon::prelude::*;

/// Dense row-major matrix of squared distances between two point sets.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    dist2: Vec<f64>,
}

impl DistanceMatrix {
    /// Squared distances from every point of `a` (rows) to every point of `b` (columns).
    pub fn between(a: &[Vec2], b: &[Vec2]) -> Self {
        let cols = b.len();
        let mut dist2 = vec![0.0; a.len() * cols];
        if cols > 0 {
            dist2
                .par_chunks_mut(cols)
                .zip(a.par_iter())
                .for_each(|(row, pa)| {
                    for (d, pb) in row.iter_mut().zip(b) {
                        *d = pa.distance_squared(*pb);
                    }
                });
        }
        Self { rows: a.len(), cols, dist2 }
    }

    /// Symmetric pairwise matrix of one point set.
    pub fn pairwise(points: &[Vec2]) -> Self {
        Self::between(points, points)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.dist2[i * self.cols + j]
    }

    #[inline(always)]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.dist2[i * self.cols..(i + 1) * self.cols]
    }

    /// Column of the smallest entry in row `i` (first on ties) and its value.
    pub fn row_min(&self, i: usize) -> Option<(usize, f64)> {
        self.row(i)
            .iter()
            .enumerate()
            .fold(None, |best, (j, &d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((j, d)),
            })
    }

    /// Columns at the smallest non-zero distance from row `i`, ascending.
    /// Zero entries (the point itself, or duplicates) are ignored.
    pub fn nearest_nonzero(&self, i: usize) -> Vec<usize> {
        let row = self.row(i);
        let min = row
            .iter()
            .copied()
            .filter(|&d| d != 0.0)
            .fold(f64::INFINITY, f64::min);
        if !min.is_finite() {
            return Vec::new();
        }
        row.iter()
            .enumerate()
            .filter(|(_, &d)| d == min)
            .map(|(j, _)| j)
            .collect()
    }

    /// `nearest_nonzero` for every row.
    pub fn nearest_sets(&self) -> Vec<Vec<usize>> {
        (0..self.rows).map(|i| self.nearest_nonzero(i)).collect()
    }
}
