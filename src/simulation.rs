use anyhow::{bail, Result};
use cellshape_common::{SimParams, SimulationConfig, Snapshot, Vec2};
use log::{debug, info, trace, warn};
use rand::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::domain::{DomainGeometry, DomainRegistry};
use crate::engine::{ParticleEngine, ParticleKind};
use crate::error::DomainId;
use crate::extract::interior_points;
use crate::grid::{Grid, Lattice};
use crate::pipeline::{plan_morph, MorphPlan, OutlinePipeline};

/// What one call to [`CellShapeSimulation::step`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub step: u32,
    /// Domains whose boundary moved, ascending.
    pub changed_domains: Vec<DomainId>,
    pub changed_arcs: usize,
    /// Boundary particles given a displacement target.
    pub displaced: usize,
    /// Registered domains absent from the mask. They stay registered until removed.
    pub vanished: Vec<DomainId>,
    /// Net change in interior particles from growth.
    pub grown: i64,
}

/// A particle with the domain it belongs to, for flat exports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleRecord {
    pub domain: DomainId,
    pub kind: ParticleKind,
    pub x: f64,
    pub y: f64,
}

/// Drives mask-following cell shapes on top of a particle engine.
pub struct CellShapeSimulation<E: ParticleEngine> {
    /// The simulation configuration.
    pub config: SimulationConfig,
    params: SimParams,
    lattice: Lattice,
    pipeline: OutlinePipeline,
    registry: DomainRegistry,
    /// The particle engine the registry issues directives to.
    pub engine: E,
    /// Seeded RNG for growth sampling.
    pub rng: StdRng,
    next_mask: Option<Grid>,
    /// The number of completed steps.
    pub current_time_step: u32,
    last_changed_arcs: usize,
    recorded_snapshots: Vec<Snapshot>,
}

impl<E: ParticleEngine> CellShapeSimulation<E> {
    /// Creates a simulation with no domains on top of `engine`.
    pub fn new(config: SimulationConfig, engine: E) -> Result<Self> {
        let params = config.get_sim_params();
        let lattice = Lattice::from_params(&params);
        let pipeline = OutlinePipeline::from_params(&params);
        let rng = StdRng::seed_from_u64(params.seed);
        Ok(Self {
            config,
            params,
            lattice,
            pipeline,
            registry: DomainRegistry::new(),
            engine,
            rng,
            next_mask: None,
            current_time_step: 0,
            last_changed_arcs: 0,
            recorded_snapshots: Vec::new(),
        })
    }

    fn check_mask(&self, mask: &Grid) -> Result<()> {
        if !self.lattice.matches(mask) {
            bail!(
                "Mask is {}x{} but the lattice is {}x{}.",
                mask.dim_x(),
                mask.dim_y(),
                self.lattice.dim_x,
                self.lattice.dim_y
            );
        }
        Ok(())
    }

    /// Creates domain `id` from its pixels in `mask`: boundary particles on the
    /// ordered outline, interior particles on the per-cell sub-grid.
    pub fn add_domain(&mut self, mask: &Grid, id: DomainId, growth_rate: i32) -> Result<()> {
        self.check_mask(mask)?;
        let outline = self.pipeline.generate(mask, id, &self.lattice)?;
        let interior = interior_points(mask, id, &self.lattice, self.params.per_dim);
        self.registry
            .create_domain(&mut self.engine, id, &outline, &interior, growth_rate)?;
        info!(
            "Added domain {} with {} boundary and {} interior particles.",
            id,
            outline.len(),
            interior.len()
        );
        Ok(())
    }

    /// Creates a domain from precomputed positions. An id that is already
    /// registered is left alone; returns whether the domain was added.
    pub fn add_domain_with_geometry(&mut self, id: DomainId, geometry: &DomainGeometry, growth_rate: i32) -> Result<bool> {
        if self.registry.contains(id) {
            warn!("Domain {} already exists, ignoring the supplied geometry.", id);
            return Ok(false);
        }
        self.registry
            .create_domain(&mut self.engine, id, &geometry.boundary, &geometry.interior, growth_rate)?;
        Ok(true)
    }

    /// Mask the next [`step`](Self::step) morphs the boundaries towards.
    pub fn set_next_mask(&mut self, mask: Grid) -> Result<()> {
        self.check_mask(&mask)?;
        self.next_mask = Some(mask);
        Ok(())
    }

    pub fn set_growth_rates(&mut self, rates: &BTreeMap<DomainId, i32>) {
        self.registry.set_growth_rates(rates);
    }

    /// Advances one step.
    ///
    /// With a pending mask, every domain's target outline and morph are
    /// planned first; only when all of them succeed are displacements handed
    /// to the engine. The engine then advances, growth is applied, and domains
    /// that moved get fresh boundary particles on their target outline.
    pub fn step(&mut self) -> Result<StepReport> {
        let mut report = StepReport { step: self.current_time_step + 1, ..Default::default() };

        // --- 1. Plan every domain against the pending mask ---
        let plan_start = Instant::now();
        let mut plans: Vec<(DomainId, Vec<Vec2>, MorphPlan)> = Vec::new();
        if let Some(mask) = self.next_mask.take() {
            for id in self.registry.ids() {
                if mask.count(id) == 0 {
                    warn!("Domain {} has no pixels in the mask at step {}.", id, report.step);
                    report.vanished.push(id);
                    continue;
                }
                let target = self.pipeline.generate(&mask, id, &self.lattice)?;
                let current = self.registry.boundary_positions(&self.engine, id)?;
                let plan = plan_morph(&current, &target)?;
                if plan.is_unchanged() {
                    continue;
                }
                debug!(
                    "Domain {}: {} unchanged points, {} changed arcs.",
                    id,
                    plan.correspondence.unchanged.len(),
                    plan.changed_arc_count()
                );
                plans.push((id, target, plan));
            }
        }
        trace!("Planned {} domain morphs in {:.2} ms.", plans.len(), plan_start.elapsed().as_secs_f64() * 1000.0);

        // --- 2. Commit displacements ---
        for (id, _, plan) in &plans {
            let Some(domain) = self.registry.get(*id) else {
                continue;
            };
            for &particle in &domain.boundary_ids {
                self.engine.clear_displacement(particle);
            }
            for (k, waypoint) in plan.displacements() {
                if self.engine.apply_displacement(domain.boundary_ids[k], waypoint) {
                    report.displaced += 1;
                }
            }
            report.changed_domains.push(*id);
            report.changed_arcs += plan.changed_arc_count();
        }

        // --- 3. Physics ---
        self.engine.advance(self.params.substeps);

        // --- 4. Growth ---
        for id in self.registry.ids() {
            report.grown += self
                .registry
                .apply_growth(&mut self.engine, &mut self.rng, id, self.params.split_distance);
        }

        // --- 5. Refresh boundaries of the domains that moved ---
        for (id, target, _) in &plans {
            self.registry.replace_boundary(&mut self.engine, *id, target)?;
        }

        self.last_changed_arcs = report.changed_arcs;
        self.current_time_step += 1;
        Ok(report)
    }

    /// Divides every `(parent, child)` pair according to `mask`; both halves stay registered.
    pub fn divide_cells(&mut self, mask: &Grid, pairs: &[(DomainId, DomainId)]) -> Result<()> {
        self.check_mask(mask)?;
        for &(parent, child) in pairs {
            self.registry
                .split_domain(&mut self.engine, parent, child, mask, &self.lattice, &self.pipeline)?;
        }
        Ok(())
    }

    /// Divides `parent` and hands `child` over: its particles leave the engine
    /// and its geometry is returned.
    pub fn divide_cell_and_take(&mut self, mask: &Grid, parent: DomainId, child: DomainId) -> Result<DomainGeometry> {
        self.check_mask(mask)?;
        let geometry = self
            .registry
            .split_off(&mut self.engine, parent, child, mask, &self.lattice, &self.pipeline)?;
        info!("Domain {} handed over after dividing from {}.", child, parent);
        Ok(geometry)
    }

    pub fn remove_domain(&mut self, id: DomainId) -> Result<DomainGeometry> {
        let geometry = self.registry.remove_domain(&mut self.engine, id)?;
        info!("Removed domain {}.", id);
        Ok(geometry)
    }

    /// Runs the engine without touching any geometry.
    pub fn equilibrate(&mut self, substeps: u32) {
        if substeps == 0 {
            return;
        }
        info!("Equilibrating for {} sub-steps...", substeps);
        self.engine.advance(substeps);
    }

    /// Positions of every domain, keyed by id.
    pub fn domains(&self) -> Result<BTreeMap<DomainId, DomainGeometry>> {
        let mut out = BTreeMap::new();
        for id in self.registry.ids() {
            out.insert(id, self.registry.geometry(&self.engine, id)?);
        }
        Ok(out)
    }

    /// Volume of every domain from its interior particle count.
    pub fn volumes(&self) -> BTreeMap<DomainId, f64> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.volume(id, self.params.optimal_density).map(|v| (id, v)))
            .collect()
    }

    /// Every registered particle with its domain, boundary first within a domain.
    pub fn particle_records(&self) -> Result<Vec<ParticleRecord>> {
        let mut records = Vec::new();
        for (id, geometry) in self.domains()? {
            let boundary = geometry.boundary.iter().map(|p| (ParticleKind::Boundary, p));
            let interior = geometry.interior.iter().map(|p| (ParticleKind::Interior, p));
            records.extend(boundary.chain(interior).map(|(kind, p)| ParticleRecord { domain: id, kind, x: p.x, y: p.y }));
        }
        Ok(records)
    }

    pub fn record_snapshot(&mut self) -> Result<()> {
        let domains = self.registry.snapshots(&self.engine, self.params.optimal_density)?;
        let snapshot = Snapshot {
            step: self.current_time_step,
            total_particle_count: self.current_particle_count() as u32,
            changed_arc_count: self.last_changed_arcs as u32,
            domains,
        };
        trace!("Recorded snapshot at step {} ({} domains).", snapshot.step, snapshot.domains.len());
        self.recorded_snapshots.push(snapshot);
        Ok(())
    }

    pub fn get_recorded_snapshots(&self) -> &Vec<Snapshot> {
        &self.recorded_snapshots
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn current_particle_count(&self) -> usize {
        self.engine.particle_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::ParticleStore;

    fn config(refinements: u32) -> SimulationConfig {
        let text = format!(
            r#"
            [lattice]
            width = 30
            height = 30

            [timing]
            num_steps = 3

            [outline]
            num_refinements = {}

            [initial_conditions]
            seed = 11

            [output]
            base_filename = "t"
            save_positions = false
            save_stats = false
            "#,
            refinements
        );
        SimulationConfig::from_toml_str(&text).unwrap()
    }

    fn rect(x0: usize, y0: usize, w: usize, h: usize) -> Grid {
        let mut grid = Grid::new(30, 30);
        grid.fill_rect(x0, y0, w, h, 1);
        grid
    }

    #[test]
    fn unchanged_mask_moves_nothing() {
        let mut sim = CellShapeSimulation::new(config(1), ParticleStore::default()).unwrap();
        sim.add_domain(&rect(10, 10, 6, 6), 1, 0).unwrap();
        let before = sim.domains().unwrap();
        sim.set_next_mask(rect(10, 10, 6, 6)).unwrap();
        let report = sim.step().unwrap();
        assert!(report.changed_domains.is_empty());
        assert_eq!(report.displaced, 0);
        assert_eq!(sim.domains().unwrap(), before);
    }

    #[test]
    fn shifted_mask_lands_on_new_outline() {
        let mut sim = CellShapeSimulation::new(config(0), ParticleStore::default()).unwrap();
        sim.add_domain(&rect(10, 10, 10, 10), 1, 0).unwrap();
        sim.set_next_mask(rect(11, 10, 10, 10)).unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.changed_domains, vec![1]);
        assert_eq!(report.changed_arcs, 2);
        let outline = sim.pipeline.generate(&rect(11, 10, 10, 10), 1, &sim.lattice).unwrap();
        assert_eq!(sim.domains().unwrap()[&1].boundary, outline);
        assert_eq!(sim.current_time_step, 1);
    }

    #[test]
    fn vanished_domains_are_reported_not_removed() {
        let mut sim = CellShapeSimulation::new(config(0), ParticleStore::default()).unwrap();
        sim.add_domain(&rect(10, 10, 4, 4), 1, 0).unwrap();
        sim.set_next_mask(Grid::new(30, 30)).unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.vanished, vec![1]);
        assert!(sim.registry().contains(1));
        sim.remove_domain(1).unwrap();
        assert_eq!(sim.current_particle_count(), 0);
    }

    #[test]
    fn failed_plan_commits_nothing() {
        let mut sim = CellShapeSimulation::new(config(0), ParticleStore::default()).unwrap();
        let mut mask = rect(2, 2, 4, 4);
        mask.fill_rect(20, 20, 4, 4, 2);
        sim.add_domain(&mask, 1, 0).unwrap();
        sim.add_domain(&mask, 2, 0).unwrap();
        let before = sim.domains().unwrap();

        // domain 1 moves, domain 2 becomes a figure eight
        let mut next = rect(3, 2, 4, 4);
        next.set(20, 20, 2);
        next.set(21, 21, 2);
        sim.set_next_mask(next).unwrap();
        assert!(sim.step().is_err());
        assert_eq!(sim.domains().unwrap(), before);
        assert_eq!(sim.current_time_step, 0);
    }

    #[test]
    fn snapshots_carry_volume() {
        let mut sim = CellShapeSimulation::new(config(0), ParticleStore::default()).unwrap();
        sim.add_domain(&rect(0, 0, 3, 3), 1, 0).unwrap();
        sim.record_snapshot().unwrap();
        let snap = &sim.get_recorded_snapshots()[0];
        assert_eq!(snap.domains.len(), 1);
        assert_eq!(snap.domains[0].interior.len(), 36);
        assert_eq!(snap.domains[0].volume, 36.0);
        assert_eq!(snap.total_particle_count as usize, sim.current_particle_count());
        assert_eq!(sim.volumes(), BTreeMap::from([(1, 36.0)]));
    }

    #[test]
    fn geometry_hand_over_round_trips() {
        let mut sim = CellShapeSimulation::new(config(0), ParticleStore::default()).unwrap();
        let mut mask = rect(4, 4, 8, 4);
        sim.add_domain(&mask, 1, 2).unwrap();
        mask.fill_rect(8, 4, 4, 4, 2);
        let taken = sim.divide_cell_and_take(&mask, 1, 2).unwrap();
        assert!(!sim.registry().contains(2));
        assert!(sim.add_domain_with_geometry(2, &taken, 0).unwrap());
        assert!(!sim.add_domain_with_geometry(2, &taken, 0).unwrap());
        assert_eq!(sim.domains().unwrap()[&2], taken);
    }
}
