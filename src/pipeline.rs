//! Mask → target outline, and current outline → per-particle waypoints.

use cellshape_common::{SimParams, Vec2};
use log::trace;
use std::time::Instant;

use crate::correspondence::{match_outlines, CorrespondenceMap};
use crate::error::{DomainId, GeometryError};
use crate::extract::extract_outline;
use crate::grid::{Grid, Lattice};
use crate::interpolate::interpolate_changes;
use crate::refine::refine_outline;
use crate::winding::order_outline;

/// Extract, refine and order a domain's outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlinePipeline {
    pub num_refinements: u32,
}

impl OutlinePipeline {
    pub fn new(num_refinements: u32) -> Self {
        Self { num_refinements }
    }

    pub fn from_params(params: &SimParams) -> Self {
        Self::new(params.num_refinements)
    }

    /// Ordered outline of domain `id` in `grid`.
    ///
    /// Fails with [`GeometryError::DomainVanished`] when the id has no pixels
    /// and with [`GeometryError::WindingOrder`] when the outline does not close.
    pub fn generate(&self, grid: &Grid, id: DomainId, lattice: &Lattice) -> Result<Vec<Vec2>, GeometryError> {
        let start = Instant::now();
        let raw = extract_outline(grid, id, lattice);
        if raw.is_empty() {
            return Err(GeometryError::DomainVanished { id });
        }
        let refined = refine_outline(&raw, self.num_refinements);
        let ordered = order_outline(&refined)?;
        trace!(
            "Outline of domain {}: {} raw points, {} after {} refinements, ordered in {:.2} ms.",
            id,
            raw.len(),
            ordered.len(),
            self.num_refinements,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(ordered)
    }
}

/// How one domain's boundary particles get from the current outline to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphPlan {
    pub correspondence: CorrespondenceMap,
    /// One waypoint list per changed arc, parallel to `correspondence.changed`.
    pub waypoints: Vec<Vec<Vec2>>,
}

impl MorphPlan {
    pub fn is_unchanged(&self) -> bool {
        self.correspondence.is_unchanged()
    }

    pub fn changed_arc_count(&self) -> usize {
        self.correspondence.changed.len()
    }

    /// `(current boundary index, target position)` for every particle that moves.
    pub fn displacements(&self) -> impl Iterator<Item = (usize, Vec2)> + '_ {
        self.correspondence
            .changed
            .iter()
            .zip(&self.waypoints)
            .flat_map(|(arc, points)| arc.current.iter().copied().zip(points.iter().copied()))
    }
}

/// Matches `current` against `target` and interpolates every changed arc.
pub fn plan_morph(current: &[Vec2], target: &[Vec2]) -> Result<MorphPlan, GeometryError> {
    let correspondence = match_outlines(current, target)?;
    let waypoints = interpolate_changes(target, &correspondence);
    Ok(MorphPlan { correspondence, waypoints })
}
