//! Keeps particle-based cell shapes in step with a labelled mask.
//!
//! Each step a domain's pixels are turned into an ordered outline, matched
//! against the boundary particles' current positions, and the changed arcs
//! are interpolated into displacement targets for the particle engine.

pub mod correspondence;
pub mod distance;
pub mod domain;
pub mod engine;
pub mod error;
pub mod extract;
pub mod grid;
pub mod interpolate;
pub mod particles;
pub mod pipeline;
pub mod refine;
pub mod schedule;
pub mod simulation;
pub mod winding;

pub use correspondence::{match_outlines, ChangedArc, CorrespondenceMap};
pub use domain::{Domain, DomainGeometry, DomainRegistry};
pub use engine::{ParticleEngine, ParticleId, ParticleKind};
pub use error::{DomainError, DomainId, GeometryError};
pub use extract::{extract_outline, interior_points};
pub use grid::{Grid, Lattice};
pub use interpolate::{interpolate_arc, interpolate_changes};
pub use particles::ParticleStore;
pub use pipeline::{plan_morph, MorphPlan, OutlinePipeline};
pub use refine::{refine_once, refine_outline};
pub use schedule::{MaskSchedule, ScheduledMask};
pub use simulation::{CellShapeSimulation, ParticleRecord, StepReport};
pub use winding::{order_outline, winding_order};
