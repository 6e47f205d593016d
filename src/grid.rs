use cellshape_common::{SimParams, Vec2};
use std::collections::BTreeSet;

use crate::error::DomainId;

/// A labelled mask: one domain id per lattice cell, 0 for background.
///
/// Indexed `(i, j)` with `i` along x and `j` along y, stored row-major over `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    dim_x: usize,
    dim_y: usize,
    cells: Vec<DomainId>,
}

impl Grid {
    /// An all-background grid.
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self { dim_x, dim_y, cells: vec![0; dim_x * dim_y] }
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    /// Label at `(i, j)`; out-of-range cells read as background.
    #[inline(always)]
    pub fn get(&self, i: isize, j: isize) -> DomainId {
        if i < 0 || j < 0 || i as usize >= self.dim_x || j as usize >= self.dim_y {
            return 0;
        }
        self.cells[i as usize * self.dim_y + j as usize]
    }

    pub fn set(&mut self, i: usize, j: usize, id: DomainId) {
        if i < self.dim_x && j < self.dim_y {
            self.cells[i * self.dim_y + j] = id;
        }
    }

    /// Labels the cells `[x0, x0 + width) × [y0, y0 + height)`, clipped to the grid.
    pub fn fill_rect(&mut self, x0: usize, y0: usize, width: usize, height: usize, id: DomainId) {
        for i in x0..(x0 + width).min(self.dim_x) {
            for j in y0..(y0 + height).min(self.dim_y) {
                self.cells[i * self.dim_y + j] = id;
            }
        }
    }

    /// Number of cells labelled `id`.
    pub fn count(&self, id: DomainId) -> usize {
        self.cells.iter().filter(|&&c| c == id).count()
    }

    /// Distinct non-background ids present, ascending.
    pub fn ids(&self) -> BTreeSet<DomainId> {
        self.cells.iter().copied().filter(|&c| c != 0).collect()
    }

    /// Iterates `(i, j)` over the cells labelled `id`.
    pub fn cells_of(&self, id: DomainId) -> impl Iterator<Item = (usize, usize)> + '_ {
        let dim_y = self.dim_y;
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, &c)| c == id)
            .map(move |(k, _)| (k / dim_y, k % dim_y))
    }
}

/// Maps lattice cells to world coordinates.
///
/// Cell `(i, j)` covers `origin + [i, i + 1) × [j, j + 1)` in units of `spacing`;
/// its centre sits half a cell in from the lower corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    pub dim_x: usize,
    pub dim_y: usize,
    pub spacing: f64,
    pub origin: Vec2,
}

impl Lattice {
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self { dim_x, dim_y, spacing: 1.0, origin: Vec2::zero() }
    }

    pub fn from_params(params: &SimParams) -> Self {
        Self {
            dim_x: params.grid_dim_x as usize,
            dim_y: params.grid_dim_y as usize,
            spacing: params.spacing,
            origin: Vec2::new(params.origin.0, params.origin.1),
        }
    }

    /// World position of fractional lattice coordinates `(a, b)`.
    #[inline(always)]
    pub fn point(&self, a: f64, b: f64) -> Vec2 {
        Vec2::new(self.origin.x + a * self.spacing, self.origin.y + b * self.spacing)
    }

    /// Centre of cell `(i, j)`.
    #[inline(always)]
    pub fn center(&self, i: usize, j: usize) -> Vec2 {
        self.point(i as f64 + 0.5, j as f64 + 0.5)
    }

    /// Cell containing `pos`, or `None` outside the lattice.
    #[inline(always)]
    pub fn cell_of(&self, pos: Vec2) -> Option<(usize, usize)> {
        if self.spacing <= 0.0 {
            return None;
        }
        let a = ((pos.x - self.origin.x) / self.spacing).floor();
        let b = ((pos.y - self.origin.y) / self.spacing).floor();
        if a < 0.0 || b < 0.0 || a >= self.dim_x as f64 || b >= self.dim_y as f64 {
            return None;
        }
        Some((a as usize, b as usize))
    }

    /// Label of the cell under `pos`, background when off the lattice.
    pub fn label_at(&self, grid: &Grid, pos: Vec2) -> DomainId {
        match self.cell_of(pos) {
            Some((i, j)) => grid.get(i as isize, j as isize),
            None => 0,
        }
    }

    /// Whether a grid has the dimensions this lattice describes.
    pub fn matches(&self, grid: &Grid) -> bool {
        grid.dim_x() == self.dim_x && grid.dim_y() == self.dim_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_reads_background() {
        let mut grid = Grid::new(3, 3);
        grid.fill_rect(0, 0, 3, 3, 4);
        assert_eq!(grid.get(-1, 0), 0);
        assert_eq!(grid.get(0, 3), 0);
        assert_eq!(grid.get(2, 2), 4);
        assert_eq!(grid.count(4), 9);
    }

    #[test]
    fn cell_lookup_uses_containing_cell() {
        let lattice = Lattice { dim_x: 4, dim_y: 4, spacing: 2.0, origin: Vec2::new(1.0, 1.0) };
        assert_eq!(lattice.center(0, 0), Vec2::new(2.0, 2.0));
        assert_eq!(lattice.cell_of(Vec2::new(2.9, 4.1)), Some((0, 1)));
        assert_eq!(lattice.cell_of(Vec2::new(0.9, 2.0)), None);
        assert_eq!(lattice.cell_of(Vec2::new(9.0, 2.0)), None);
    }

    #[test]
    fn ids_and_cells_of() {
        let mut grid = Grid::new(5, 4);
        grid.fill_rect(1, 1, 2, 1, 3);
        grid.set(4, 3, 1);
        assert_eq!(grid.ids().into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(grid.cells_of(3).collect::<Vec<_>>(), vec![(1, 1), (2, 1)]);
    }
}
