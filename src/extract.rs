//! Sampling a labelled mask: boundary points on the lattice between pixel
//! centres, and interior points on a sub-grid inside occupied pixels.

use cellshape_common::Vec2;

use crate::error::DomainId;
use crate::grid::{Grid, Lattice};

/// Unordered boundary points of domain `id`.
///
/// Every lattice edge separating a member cell from a non-member cell
/// contributes its two end corners and its midpoint. Corners are emitted once
/// each, in row-major lattice order, followed by the midpoints of edges
/// crossed along x and then along y. Cells off the grid count as background,
/// so domains touching the border still produce a closed outline.
///
/// Returns an empty vector when `id` has no pixels.
pub fn extract_outline(grid: &Grid, id: DomainId, lattice: &Lattice) -> Vec<Vec2> {
    let (nx, ny) = (grid.dim_x(), grid.dim_y());
    let member = |i: usize, j: usize, di: isize, dj: isize| -> bool {
        grid.get(i as isize + di, j as isize + dj) == id
    };

    let stride = ny + 1;
    let mut corners = vec![false; (nx + 1) * stride];
    let mut mid_x = Vec::new();
    let mut mid_y = Vec::new();

    // Edges on lattice line x = i, between cells (i - 1, j) and (i, j).
    for i in 0..=nx {
        for j in 0..ny {
            if member(i, j, -1, 0) != member(i, j, 0, 0) {
                corners[i * stride + j] = true;
                corners[i * stride + j + 1] = true;
                mid_x.push(lattice.point(i as f64, j as f64 + 0.5));
            }
        }
    }

    // Edges on lattice line y = j, between cells (i, j - 1) and (i, j).
    for i in 0..nx {
        for j in 0..=ny {
            if member(i, j, 0, -1) != member(i, j, 0, 0) {
                corners[i * stride + j] = true;
                corners[(i + 1) * stride + j] = true;
                mid_y.push(lattice.point(i as f64 + 0.5, j as f64));
            }
        }
    }

    let mut outline: Vec<Vec2> = corners
        .iter()
        .enumerate()
        .filter(|(_, &c)| c)
        .map(|(k, _)| lattice.point((k / stride) as f64, (k % stride) as f64))
        .collect();
    outline.extend(mid_x);
    outline.extend(mid_y);
    outline
}

/// Interior sample points of domain `id`: a `per_dim × per_dim` sub-grid
/// centred in every member cell.
pub fn interior_points(grid: &Grid, id: DomainId, lattice: &Lattice, per_dim: u32) -> Vec<Vec2> {
    let per_dim = per_dim.max(1);
    let dz = 1.0 / per_dim as f64;
    let z0 = dz / 2.0 - 0.5;
    let offsets: Vec<(f64, f64)> = (0..per_dim)
        .flat_map(|a| (0..per_dim).map(move |b| (z0 + a as f64 * dz, z0 + b as f64 * dz)))
        .collect();

    grid.cells_of(id)
        .flat_map(|(i, j)| {
            offsets
                .iter()
                .map(move |&(da, db)| lattice.point(i as f64 + 0.5 + da, j as f64 + 0.5 + db))
        })
        .collect()
}
