use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

// Lattice the masks are defined on
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LatticeConfig {
    pub width: u32,  // cells along x (first grid axis)
    pub height: u32, // cells along y
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default)]
    pub origin: (f64, f64),
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub num_steps: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_steps: u32,
}

// Outline generation
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutlineConfig {
    #[serde(default = "default_refinements")]
    pub num_refinements: u32,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        OutlineConfig { num_refinements: default_refinements() }
    }
}

// Interior particle placement and growth
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InteriorConfig {
    #[serde(default = "default_per_dim")]
    pub per_dim: u32,
    /// Distance between a split interior particle and its offspring, in lattice units.
    #[serde(default = "default_split_distance")]
    pub split_distance: f64,
}

impl Default for InteriorConfig {
    fn default() -> Self {
        InteriorConfig {
            per_dim: default_per_dim(),
            split_distance: default_split_distance(),
        }
    }
}

// Physics sub-stepping handed to the particle engine
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhysicsConfig {
    #[serde(default = "default_substeps")]
    pub substeps: u32,
    #[serde(default)]
    pub equilibration_substeps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig { substeps: default_substeps(), equilibration_substeps: 0 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub seed: u64,
}

/// An initial rectangular domain and how the mask schedule moves it.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DomainConfig {
    pub id: u32,
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub velocity: (i32, i32), // cells per move
    #[serde(default = "default_move_interval")]
    pub move_interval_steps: u32, // 0 = never moves
    #[serde(default)]
    pub growth_rate: i32,
}

/// A scheduled division: at `step` the parent rectangle is halved and the
/// second half becomes `child`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DivisionConfig {
    pub step: u32,
    pub parent: u32,
    pub child: u32,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_positions: bool,
    pub save_stats: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default = "default_optimal_density")]
    pub optimal_density: f64, // volume per interior particle
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub lattice: LatticeConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub outline: OutlineConfig,
    #[serde(default)]
    pub interior: InteriorConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
    #[serde(default)]
    pub divisions: Vec<DivisionConfig>,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lattice.width == 0 || self.lattice.height == 0 {
            anyhow::bail!("lattice width and height must be greater than 0.");
        }
        if self.lattice.spacing <= 0.0 {
            anyhow::bail!("lattice spacing must be positive.");
        }
        if self.interior.per_dim == 0 {
            anyhow::bail!("interior per_dim must be greater than 0.");
        }
        if self.timing.record_interval_steps == 0 {
            anyhow::bail!("record_interval_steps must be greater than 0.");
        }
        let mut seen = std::collections::BTreeSet::new();
        for domain in &self.domains {
            if domain.id == 0 {
                anyhow::bail!("domain id 0 is reserved for the background.");
            }
            if !seen.insert(domain.id) {
                anyhow::bail!("domain id {} is configured twice.", domain.id);
            }
            if domain.width == 0 || domain.height == 0 {
                anyhow::bail!("domain {} has an empty rectangle.", domain.id);
            }
            if domain.x0 + domain.width > self.lattice.width || domain.y0 + domain.height > self.lattice.height {
                anyhow::bail!("domain {} does not fit on the lattice.", domain.id);
            }
        }
        for division in &self.divisions {
            if division.child == 0 || division.child == division.parent {
                anyhow::bail!("division at step {} has an invalid child id {}.", division.step, division.child);
            }
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            grid_dim_x: self.lattice.width,
            grid_dim_y: self.lattice.height,
            spacing: self.lattice.spacing,
            origin: self.lattice.origin,
            num_steps: self.timing.num_steps,
            record_interval_steps: self.timing.record_interval_steps,
            num_refinements: self.outline.num_refinements,
            per_dim: self.interior.per_dim,
            // Split distance is configured in lattice units.
            split_distance: self.interior.split_distance * self.lattice.spacing,
            substeps: self.physics.substeps.max(1),
            equilibration_substeps: self.physics.equilibration_substeps,
            optimal_density: self.output.optimal_density,
            seed: self.initial_conditions.seed,
        }
    }
}

fn default_spacing() -> f64 {
    1.0
}

fn default_record_interval() -> u32 {
    1
}

fn default_refinements() -> u32 {
    4
}

fn default_per_dim() -> u32 {
    2
}

fn default_split_distance() -> f64 {
    0.1
}

fn default_substeps() -> u32 {
    10
}

fn default_move_interval() -> u32 {
    1
}

fn default_optimal_density() -> f64 {
    1.0
}
