//! Per-cell bookkeeping: which engine particles make up each domain.

use cellshape_common::{angle_to_vec, DomainSnapshot, Vec2};
use log::{debug, info, warn};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::{ParticleEngine, ParticleId};
use crate::error::{DomainError, DomainId, GeometryError};
use crate::grid::{Grid, Lattice};
use crate::pipeline::OutlinePipeline;

/// A cell as the registry sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: DomainId,
    /// Boundary particles in winding order.
    pub boundary_ids: Vec<ParticleId>,
    /// Interior particles, unordered.
    pub interior_ids: Vec<ParticleId>,
    /// Interior particles added (positive) or removed (negative) per step.
    pub growth_rate: i32,
}

/// Positions of a domain's particles, detached from the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainGeometry {
    pub boundary: Vec<Vec2>,
    pub interior: Vec<Vec2>,
}

#[derive(Debug, Default)]
pub struct DomainRegistry {
    domains: BTreeMap<DomainId, Domain>,
}

fn positions<E: ParticleEngine>(engine: &E, domain: DomainId, ids: &[ParticleId]) -> Result<Vec<Vec2>, DomainError> {
    ids.iter()
        .map(|&particle| engine.position(particle).ok_or(DomainError::StaleParticle { domain, particle }))
        .collect()
}

fn destroy_all<E: ParticleEngine>(engine: &mut E, ids: &[ParticleId]) -> usize {
    ids.iter().filter(|&&id| engine.destroy_particle(id)).count()
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn contains(&self, id: DomainId) -> bool {
        self.domains.contains_key(&id)
    }

    pub fn get(&self, id: DomainId) -> Option<&Domain> {
        self.domains.get(&id)
    }

    /// Domain ids, ascending.
    pub fn ids(&self) -> Vec<DomainId> {
        self.domains.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    fn domain(&self, id: DomainId) -> Result<&Domain, DomainError> {
        self.domains.get(&id).ok_or(DomainError::UnknownDomain(id))
    }

    /// Registers a new domain, creating one boundary particle per outline
    /// point (in order) and one interior particle per interior point.
    pub fn create_domain<E: ParticleEngine>(
        &mut self,
        engine: &mut E,
        id: DomainId,
        outline: &[Vec2],
        interior: &[Vec2],
        growth_rate: i32,
    ) -> Result<(), DomainError> {
        if self.domains.contains_key(&id) {
            return Err(DomainError::DomainExists(id));
        }
        if outline.len() < 3 {
            return Err(GeometryError::TooFewPoints { count: outline.len() }.into());
        }
        let boundary_ids = outline.iter().map(|&p| engine.create_boundary_particle(p)).collect();
        let interior_ids = interior.iter().map(|&p| engine.create_interior_particle(p)).collect();
        self.domains.insert(id, Domain { id, boundary_ids, interior_ids, growth_rate });
        debug!("Created domain {}: {} boundary, {} interior particles.", id, outline.len(), interior.len());
        Ok(())
    }

    /// Current boundary positions in winding order.
    pub fn boundary_positions<E: ParticleEngine>(&self, engine: &E, id: DomainId) -> Result<Vec<Vec2>, DomainError> {
        positions(engine, id, &self.domain(id)?.boundary_ids)
    }

    pub fn interior_positions<E: ParticleEngine>(&self, engine: &E, id: DomainId) -> Result<Vec<Vec2>, DomainError> {
        positions(engine, id, &self.domain(id)?.interior_ids)
    }

    pub fn geometry<E: ParticleEngine>(&self, engine: &E, id: DomainId) -> Result<DomainGeometry, DomainError> {
        Ok(DomainGeometry {
            boundary: self.boundary_positions(engine, id)?,
            interior: self.interior_positions(engine, id)?,
        })
    }

    /// Replaces a domain's boundary particles with fresh ones on `outline`.
    pub fn replace_boundary<E: ParticleEngine>(
        &mut self,
        engine: &mut E,
        id: DomainId,
        outline: &[Vec2],
    ) -> Result<(), DomainError> {
        if outline.len() < 3 {
            return Err(GeometryError::TooFewPoints { count: outline.len() }.into());
        }
        let domain = self.domains.get_mut(&id).ok_or(DomainError::UnknownDomain(id))?;
        destroy_all(engine, &domain.boundary_ids);
        domain.boundary_ids = outline.iter().map(|&p| engine.create_boundary_particle(p)).collect();
        Ok(())
    }

    pub fn set_growth_rate(&mut self, id: DomainId, growth_rate: i32) -> Result<(), DomainError> {
        let domain = self.domains.get_mut(&id).ok_or(DomainError::UnknownDomain(id))?;
        domain.growth_rate = growth_rate;
        Ok(())
    }

    /// Updates growth rates; ids the registry does not know are skipped.
    pub fn set_growth_rates(&mut self, rates: &BTreeMap<DomainId, i32>) {
        for (&id, &rate) in rates {
            if self.set_growth_rate(id, rate).is_err() {
                warn!("Ignoring growth rate {} for unknown domain {}.", rate, id);
            }
        }
    }

    /// Applies one step of growth to domain `id`.
    ///
    /// A negative rate removes `|rate|` random interior particles (all of them
    /// if there are fewer). A positive rate picks `rate` random interior
    /// particles without replacement and places a new particle `split_distance`
    /// away from each in a random direction. Returns the change in interior count.
    pub fn apply_growth<E: ParticleEngine, R: Rng>(
        &mut self,
        engine: &mut E,
        rng: &mut R,
        id: DomainId,
        split_distance: f64,
    ) -> i64 {
        let Some(domain) = self.domains.get_mut(&id) else {
            warn!("Ignoring growth for unknown domain {}.", id);
            return 0;
        };
        let n = domain.interior_ids.len();
        let rate = domain.growth_rate;
        if rate == 0 || n == 0 {
            return 0;
        }

        let amount = (rate.unsigned_abs() as usize).min(n);
        let mut picked = index::sample(rng, n, amount).into_vec();

        if rate < 0 {
            picked.sort_unstable_by(|a, b| b.cmp(a));
            for k in picked {
                let particle = domain.interior_ids.swap_remove(k);
                engine.destroy_particle(particle);
            }
            debug!("Domain {} shrank by {} interior particles.", id, amount);
            return -(amount as i64);
        }

        let mut created = 0i64;
        for k in picked {
            let Some(pos) = engine.position(domain.interior_ids[k]) else {
                warn!("Domain {} interior particle {:?} is stale, not splitting it.", id, domain.interior_ids[k]);
                continue;
            };
            let angle = rng.random_range(0.0..std::f64::consts::TAU);
            let child = engine.create_interior_particle(pos + angle_to_vec(angle) * split_distance);
            domain.interior_ids.push(child);
            created += 1;
        }
        debug!("Domain {} grew by {} interior particles.", id, created);
        created
    }

    /// Splits `child` off `parent` according to `mask`.
    ///
    /// Both outlines are regenerated from the mask before anything changes, so
    /// a geometry failure leaves the registry untouched. Parent interior
    /// particles lying in cells labelled `child` move to the child, which
    /// inherits the parent's growth rate.
    pub fn split_domain<E: ParticleEngine>(
        &mut self,
        engine: &mut E,
        parent: DomainId,
        child: DomainId,
        mask: &Grid,
        lattice: &Lattice,
        pipeline: &OutlinePipeline,
    ) -> Result<(), DomainError> {
        if self.domains.contains_key(&child) {
            return Err(DomainError::DomainExists(child));
        }
        let interior = self.interior_positions(engine, parent)?;
        let parent_outline = pipeline.generate(mask, parent, lattice)?;
        let child_outline = pipeline.generate(mask, child, lattice)?;

        let Some(domain) = self.domains.get_mut(&parent) else {
            return Err(DomainError::UnknownDomain(parent));
        };

        let (mut kept, mut moved) = (Vec::new(), Vec::new());
        for (&particle, &pos) in domain.interior_ids.iter().zip(&interior) {
            if lattice.label_at(mask, pos) == child {
                moved.push(particle);
            } else {
                kept.push(particle);
            }
        }
        domain.interior_ids = kept;
        let growth_rate = domain.growth_rate;

        destroy_all(engine, &domain.boundary_ids);
        domain.boundary_ids = parent_outline.iter().map(|&p| engine.create_boundary_particle(p)).collect();

        let boundary_ids = child_outline.iter().map(|&p| engine.create_boundary_particle(p)).collect();
        info!(
            "Domain {} divided: child {} takes {} of {} interior particles.",
            parent,
            child,
            moved.len(),
            interior.len()
        );
        self.domains.insert(child, Domain { id: child, boundary_ids, interior_ids: moved, growth_rate });
        Ok(())
    }

    /// Removes a domain, destroying its particles and returning where they were.
    pub fn remove_domain<E: ParticleEngine>(&mut self, engine: &mut E, id: DomainId) -> Result<DomainGeometry, DomainError> {
        let domain = self.domains.remove(&id).ok_or(DomainError::UnknownDomain(id))?;
        let geometry = DomainGeometry {
            boundary: domain.boundary_ids.iter().filter_map(|&p| engine.position(p)).collect(),
            interior: domain.interior_ids.iter().filter_map(|&p| engine.position(p)).collect(),
        };
        let destroyed = destroy_all(engine, &domain.boundary_ids) + destroy_all(engine, &domain.interior_ids);
        debug!("Removed domain {} ({} particles destroyed).", id, destroyed);
        Ok(geometry)
    }

    /// Splits `child` off `parent` and hands it over: the child's particles
    /// are released from the engine and its geometry returned.
    pub fn split_off<E: ParticleEngine>(
        &mut self,
        engine: &mut E,
        parent: DomainId,
        child: DomainId,
        mask: &Grid,
        lattice: &Lattice,
        pipeline: &OutlinePipeline,
    ) -> Result<DomainGeometry, DomainError> {
        self.split_domain(engine, parent, child, mask, lattice, pipeline)?;
        self.remove_domain(engine, child)
    }

    /// Volume estimate: interior particle count times the volume each one stands for.
    pub fn volume(&self, id: DomainId, optimal_density: f64) -> Option<f64> {
        self.domains.get(&id).map(|d| d.interior_ids.len() as f64 * optimal_density)
    }

    pub fn snapshots<E: ParticleEngine>(&self, engine: &E, optimal_density: f64) -> Result<Vec<DomainSnapshot>, DomainError> {
        self.domains
            .values()
            .map(|d| {
                let geometry = self.geometry(engine, d.id)?;
                Ok(DomainSnapshot {
                    id: d.id,
                    boundary: geometry.boundary.iter().map(Vec2::as_tuple).collect(),
                    interior: geometry.interior.iter().map(Vec2::as_tuple).collect(),
                    growth_rate: d.growth_rate,
                    volume: d.interior_ids.len() as f64 * optimal_density,
                })
            })
            .collect()
    }
}
