//! The seam between outline bookkeeping and the particle-physics engine.
//!
//! The engine owns particles; the registry only keeps [`ParticleId`] handles
//! and talks to the engine through [`ParticleEngine`].

use cellshape_common::Vec2;
use serde::{Deserialize, Serialize};

/// Weak handle into the engine's particle table. A slot that is destroyed
/// and reused gets a new generation, so stale handles never alias new particles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleKind {
    Boundary,
    Interior,
}

pub trait ParticleEngine {
    /// Current position, `None` for a stale or destroyed handle.
    fn position(&self, id: ParticleId) -> Option<Vec2>;

    fn create_boundary_particle(&mut self, pos: Vec2) -> ParticleId;

    fn create_interior_particle(&mut self, pos: Vec2) -> ParticleId;

    /// Returns false if the handle was already stale.
    fn destroy_particle(&mut self, id: ParticleId) -> bool;

    /// Directs the particle to reach `target` over the next [`advance`](Self::advance).
    /// Returns false if the handle is stale.
    fn apply_displacement(&mut self, id: ParticleId, target: Vec2) -> bool;

    /// Drops any pending displacement of the particle.
    fn clear_displacement(&mut self, id: ParticleId);

    /// Runs `substeps` physics sub-steps.
    fn advance(&mut self, substeps: u32);

    /// Number of live particles.
    fn particle_count(&self) -> usize;
}
