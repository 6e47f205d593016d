use cellshape_common::{SimulationConfig, Vec2};
use cellshape_engine::{
    extract_outline, match_outlines, CellShapeSimulation, Grid, Lattice, OutlinePipeline, ParticleEngine,
    ParticleStore,
};
use std::collections::BTreeSet;

fn square_mask(x0: usize, y0: usize) -> Grid {
    let mut grid = Grid::new(30, 30);
    grid.fill_rect(x0, y0, 10, 10, 1);
    grid
}

fn config(refinements: u32) -> SimulationConfig {
    let text = format!(
        r#"
        [lattice]
        width = 30
        height = 30

        [timing]
        num_steps = 1

        [outline]
        num_refinements = {}

        [initial_conditions]
        seed = 3

        [output]
        base_filename = "scenario"
        save_positions = false
        save_stats = false
        "#,
        refinements
    );
    SimulationConfig::from_toml_str(&text).unwrap()
}

#[test]
fn square_outline_has_lattice_corners_and_midpoints() {
    let points = extract_outline(&square_mask(10, 10), 1, &Lattice::new(30, 30));
    // 40 unit edges around the square: one corner and one midpoint each.
    assert_eq!(points.len(), 80);
    let corners: Vec<&Vec2> = points.iter().filter(|p| p.x.fract() == 0.0 && p.y.fract() == 0.0).collect();
    assert_eq!(corners.len(), 40);
    for p in &points {
        let on_x_edge = (p.x == 10.0 || p.x == 20.0) && (10.0..=20.0).contains(&p.y);
        let on_y_edge = (p.y == 10.0 || p.y == 20.0) && (10.0..=20.0).contains(&p.x);
        assert!(on_x_edge || on_y_edge, "{:?} is off the square", p);
    }
    let unique: BTreeSet<(u64, u64)> = points.iter().map(|p| p.bits()).collect();
    assert_eq!(unique.len(), points.len());
}

#[test]
fn identical_masks_match_completely() {
    let lattice = Lattice::new(30, 30);
    let pipeline = OutlinePipeline::new(2);
    let first = pipeline.generate(&square_mask(10, 10), 1, &lattice).unwrap();
    let second = pipeline.generate(&square_mask(10, 10), 1, &lattice).unwrap();
    let map = match_outlines(&first, &second).unwrap();
    assert!(map.changed.is_empty());
    assert_eq!(map.unchanged.len(), first.len());
}

#[test]
fn shifted_square_changes_leading_and_trailing_edges() {
    let lattice = Lattice::new(30, 30);
    let pipeline = OutlinePipeline::new(0);
    let current = pipeline.generate(&square_mask(10, 10), 1, &lattice).unwrap();
    let target = pipeline.generate(&square_mask(11, 10), 1, &lattice).unwrap();
    let map = match_outlines(&current, &target).unwrap();

    assert_eq!(map.changed.len(), 2);
    assert_eq!(map.unchanged.len(), 38);
    let mut arc_sizes: Vec<usize> = map.changed.iter().map(|a| a.current.len()).collect();
    arc_sizes.sort_unstable();
    assert_eq!(arc_sizes, vec![19, 23]);

    let waypoints = cellshape_engine::interpolate_changes(&target, &map);
    for (arc, points) in map.changed.iter().zip(&waypoints) {
        assert_eq!(arc.current.len(), points.len());
        let trailing = arc.current.iter().all(|&i| current[i].x <= 10.5);
        let leading = arc.current.iter().all(|&i| current[i].x == 20.0);
        assert!(trailing || leading);
        for p in points {
            if trailing {
                assert_eq!(p.x, 11.0);
            } else {
                assert!(p.x >= 20.0 && p.x <= 21.0, "{:?}", p);
            }
            assert!(p.y >= 10.0 && p.y <= 20.0, "{:?}", p);
        }
    }
}

#[test]
fn split_partitions_interior_particles() {
    let mut sim = CellShapeSimulation::new(config(1), ParticleStore::default()).unwrap();
    sim.add_domain(&square_mask(10, 10), 1, 0).unwrap();
    let original: BTreeSet<_> = sim.registry().get(1).unwrap().interior_ids.iter().copied().collect();
    assert_eq!(original.len(), 400);

    let mut halves = square_mask(10, 10);
    halves.fill_rect(10, 15, 10, 5, 2);
    sim.divide_cells(&halves, &[(1, 2)]).unwrap();

    let parent: BTreeSet<_> = sim.registry().get(1).unwrap().interior_ids.iter().copied().collect();
    let child: BTreeSet<_> = sim.registry().get(2).unwrap().interior_ids.iter().copied().collect();
    assert_eq!(parent.len(), 200);
    assert_eq!(child.len(), 200);
    assert!(parent.is_disjoint(&child));
    assert_eq!(parent.union(&child).copied().collect::<BTreeSet<_>>(), original);
}

#[test]
fn repeated_steps_on_a_still_mask_are_idempotent() {
    let mut sim = CellShapeSimulation::new(config(2), ParticleStore::default()).unwrap();
    sim.add_domain(&square_mask(10, 10), 1, 0).unwrap();
    for _ in 0..2 {
        sim.set_next_mask(square_mask(10, 10)).unwrap();
        let report = sim.step().unwrap();
        assert!(report.changed_domains.is_empty());
        assert_eq!(report.changed_arcs, 0);
    }
}

#[test]
fn moving_square_is_followed_over_several_steps() {
    let mut sim = CellShapeSimulation::new(config(1), ParticleStore::default()).unwrap();
    sim.add_domain(&square_mask(5, 10), 1, 0).unwrap();
    let lattice = *sim.lattice();
    let pipeline = OutlinePipeline::new(1);
    for x0 in 6..=10 {
        sim.set_next_mask(square_mask(x0, 10)).unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.changed_domains, vec![1]);
        let expected = pipeline.generate(&square_mask(x0, 10), 1, &lattice).unwrap();
        assert_eq!(sim.registry().boundary_positions(&sim.engine, 1).unwrap(), expected);
    }
    assert_eq!(sim.current_particle_count(), sim.engine.particle_count());
}

#[test]
fn cell_stepping_back_over_its_own_edge_lands_on_target() {
    let mut sim = CellShapeSimulation::new(config(1), ParticleStore::default()).unwrap();
    let mut before = Grid::new(30, 30);
    before.fill_rect(3, 6, 2, 2, 1);
    before.fill_rect(5, 5, 2, 2, 1);
    sim.add_domain(&before, 1, 0).unwrap();

    let mut after = Grid::new(30, 30);
    after.fill_rect(5, 6, 2, 2, 1);
    sim.set_next_mask(after.clone()).unwrap();
    let report = sim.step().unwrap();
    assert_eq!(report.changed_domains, vec![1]);

    let expected = OutlinePipeline::new(1).generate(&after, 1, sim.lattice()).unwrap();
    assert_eq!(sim.registry().boundary_positions(&sim.engine, 1).unwrap(), expected);
}
