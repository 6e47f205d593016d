use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Lattice
    pub grid_dim_x: u32,
    pub grid_dim_y: u32,
    pub spacing: f64,
    pub origin: (f64, f64),

    // Time
    pub num_steps: u32,
    pub record_interval_steps: u32,

    // Geometry
    pub num_refinements: u32,
    pub per_dim: u32,
    pub split_distance: f64, // world units

    // Engine
    pub substeps: u32,
    pub equilibration_substeps: u32,

    // Output
    pub optimal_density: f64,
    pub seed: u64,
}
