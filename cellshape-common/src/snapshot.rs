use serde::{Serialize, Deserialize};

/// Geometry of a single domain at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSnapshot {
    pub id: u32,
    /// Boundary particle positions in winding order.
    pub boundary: Vec<(f64, f64)>,
    /// Interior particle positions, unordered.
    pub interior: Vec<(f64, f64)>,
    pub growth_rate: i32,
    /// Volume estimate from the interior particle count.
    pub volume: f64,
}

/// A snapshot of the simulation state at a specific step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The simulation step at which the snapshot was taken.
    pub step: u32,
    /// Total number of live particles in the engine.
    pub total_particle_count: u32,
    /// Number of changed arcs interpolated during the last step.
    pub changed_arc_count: u32,
    /// Domains ordered by id.
    pub domains: Vec<DomainSnapshot>,
}

impl Snapshot {
    /// Axis-aligned bounds of every recorded position, `None` for an empty snapshot.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let mut points = self
            .domains
            .iter()
            .flat_map(|d| d.boundary.iter().chain(d.interior.iter()));
        let first = *points.next()?;
        Some(points.fold((first, first), |((x0, y0), (x1, y1)), &(x, y)| {
            ((x0.min(x), y0.min(y)), (x1.max(x), y1.max(y)))
        }))
    }
}
