use cellshape_common::Vec2;
use log::{info, trace};
use rayon::prelude::*;

use crate::engine::{ParticleEngine, ParticleId};

/// In-memory particle table implementing [`ParticleEngine`].
///
/// Slots are stored as parallel vectors; destroyed slots go on a free list and
/// bump their generation. There are no force laws: a displaced particle moves
/// along a straight line and lands on its target by the end of `advance`,
/// which is the kinematic limit of an overdamped boundary particle.
#[derive(Debug)]
pub struct ParticleStore {
    pub num_particles: u32,
    capacity: u32,

    // --- Per-slot state ---
    pub positions_x: Vec<f64>,
    pub positions_y: Vec<f64>,
    targets: Vec<Option<Vec2>>,
    generations: Vec<u32>,
    alive: Vec<u8>,

    free_slots: Vec<u32>,
    substeps_taken: u64,
}

impl ParticleStore {
    /// Creates an empty store with room for `initial_capacity` particles.
    pub fn new(initial_capacity: u32) -> Self {
        let cap = initial_capacity as usize;
        Self {
            num_particles: 0,
            capacity: initial_capacity,
            positions_x: Vec::with_capacity(cap),
            positions_y: Vec::with_capacity(cap),
            targets: Vec::with_capacity(cap),
            generations: Vec::with_capacity(cap),
            alive: Vec::with_capacity(cap),
            free_slots: Vec::new(),
            substeps_taken: 0,
        }
    }

    /// Ensures the slot vectors can hold `required_capacity` slots without reallocating.
    pub fn ensure_capacity(&mut self, required_capacity: u32) {
        if required_capacity > self.capacity {
            let new_capacity = (required_capacity as f32 * 1.2).ceil() as u32; // Grow by 20%
            info!("Resizing particle table from {} to {} slots.", self.capacity, new_capacity);
            let additional = new_capacity as usize - self.positions_x.len();
            self.positions_x.reserve(additional);
            self.positions_y.reserve(additional);
            self.targets.reserve(additional);
            self.generations.reserve(additional);
            self.alive.reserve(additional);
            self.capacity = new_capacity;
        }
    }

    fn insert(&mut self, pos: Vec2) -> ParticleId {
        self.num_particles += 1;
        if let Some(slot) = self.free_slots.pop() {
            let idx = slot as usize;
            self.positions_x[idx] = pos.x;
            self.positions_y[idx] = pos.y;
            self.targets[idx] = None;
            self.alive[idx] = 1;
            return ParticleId { index: slot, generation: self.generations[idx] };
        }
        let slot = self.positions_x.len() as u32;
        self.ensure_capacity(slot + 1);
        self.positions_x.push(pos.x);
        self.positions_y.push(pos.y);
        self.targets.push(None);
        self.generations.push(0);
        self.alive.push(1);
        ParticleId { index: slot, generation: 0 }
    }

    /// Slot index of a live handle.
    fn slot(&self, id: ParticleId) -> Option<usize> {
        let idx = id.index as usize;
        (idx < self.alive.len() && self.alive[idx] == 1 && self.generations[idx] == id.generation).then_some(idx)
    }

    /// Total sub-steps run so far.
    pub fn substeps_taken(&self) -> u64 {
        self.substeps_taken
    }
}

impl Default for ParticleStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ParticleEngine for ParticleStore {
    fn position(&self, id: ParticleId) -> Option<Vec2> {
        self.slot(id).map(|idx| Vec2::new(self.positions_x[idx], self.positions_y[idx]))
    }

    fn create_boundary_particle(&mut self, pos: Vec2) -> ParticleId {
        self.insert(pos)
    }

    fn create_interior_particle(&mut self, pos: Vec2) -> ParticleId {
        self.insert(pos)
    }

    fn destroy_particle(&mut self, id: ParticleId) -> bool {
        let Some(idx) = self.slot(id) else {
            return false;
        };
        self.alive[idx] = 0;
        self.targets[idx] = None;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_slots.push(idx as u32);
        self.num_particles -= 1;
        true
    }

    fn apply_displacement(&mut self, id: ParticleId, target: Vec2) -> bool {
        match self.slot(id) {
            Some(idx) => {
                self.targets[idx] = Some(target);
                true
            }
            None => false,
        }
    }

    fn clear_displacement(&mut self, id: ParticleId) {
        if let Some(idx) = self.slot(id) {
            self.targets[idx] = None;
        }
    }

    fn advance(&mut self, substeps: u32) {
        let moved: usize = self
            .positions_x
            .par_iter_mut()
            .zip(self.positions_y.par_iter_mut())
            .zip(self.targets.par_iter_mut())
            .map(|((x, y), target)| match target.take() {
                Some(t) => {
                    *x = t.x;
                    *y = t.y;
                    1
                }
                None => 0,
            })
            .sum();
        self.substeps_taken += substeps as u64;
        trace!("Advanced {} sub-steps, {} particles displaced.", substeps, moved);
    }

    fn particle_count(&self) -> usize {
        self.num_particles as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_slots_are_reused_with_new_generation() {
        let mut store = ParticleStore::new(2);
        let a = store.create_boundary_particle(Vec2::new(1.0, 1.0));
        let b = store.create_interior_particle(Vec2::new(2.0, 2.0));
        assert!(store.destroy_particle(a));
        assert!(!store.destroy_particle(a));
        let c = store.create_interior_particle(Vec2::new(3.0, 3.0));
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);
        assert_eq!(store.position(a), None);
        assert_eq!(store.position(c), Some(Vec2::new(3.0, 3.0)));
        assert_eq!(store.position(b), Some(Vec2::new(2.0, 2.0)));
        assert_eq!(store.particle_count(), 2);
    }

    #[test]
    fn advance_lands_displaced_particles_on_target() {
        let mut store = ParticleStore::default();
        let a = store.create_boundary_particle(Vec2::new(0.0, 0.0));
        let b = store.create_boundary_particle(Vec2::new(5.0, 0.0));
        assert!(store.apply_displacement(a, Vec2::new(1.0, 2.0)));
        store.apply_displacement(b, Vec2::new(9.0, 9.0));
        store.clear_displacement(b);
        store.advance(10);
        assert_eq!(store.position(a), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(store.position(b), Some(Vec2::new(5.0, 0.0)));
        assert_eq!(store.substeps_taken(), 10);
        // targets are consumed
        store.advance(1);
        assert_eq!(store.position(a), Some(Vec2::new(1.0, 2.0)));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut store = ParticleStore::new(1);
        let ids: Vec<_> = (0..10).map(|k| store.create_interior_particle(Vec2::new(k as f64, 0.0))).collect();
        assert_eq!(store.particle_count(), 10);
        assert_eq!(store.position(ids[9]), Some(Vec2::new(9.0, 0.0)));
    }
}
