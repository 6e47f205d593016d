//! A synthetic mask source: moving rectangles with scheduled divisions.

use cellshape_common::{DivisionConfig, SimulationConfig};
use log::{debug, info, warn};

use crate::error::DomainId;
use crate::grid::Grid;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rect {
    id: DomainId,
    x0: i64,
    y0: i64,
    width: i64,
    height: i64,
    velocity: (i64, i64),
    move_interval: u32,
}

/// Mask produced for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMask {
    pub grid: Grid,
    /// `(parent, child)` divisions that happen in this mask.
    pub divisions: Vec<(DomainId, DomainId)>,
}

#[derive(Debug, Clone)]
pub struct MaskSchedule {
    dim_x: i64,
    dim_y: i64,
    rects: Vec<Rect>,
    divisions: Vec<DivisionConfig>,
}

impl MaskSchedule {
    pub fn from_config(config: &SimulationConfig) -> Self {
        let rects = config
            .domains
            .iter()
            .map(|d| Rect {
                id: d.id,
                x0: d.x0 as i64,
                y0: d.y0 as i64,
                width: d.width as i64,
                height: d.height as i64,
                velocity: (d.velocity.0 as i64, d.velocity.1 as i64),
                move_interval: d.move_interval_steps,
            })
            .collect();
        let mut divisions = config.divisions.clone();
        divisions.sort_by_key(|d| d.step);
        Self {
            dim_x: config.lattice.width as i64,
            dim_y: config.lattice.height as i64,
            rects,
            divisions,
        }
    }

    /// The mask as it stands, later rectangles painted over earlier ones.
    pub fn current_mask(&self) -> Grid {
        let mut grid = Grid::new(self.dim_x as usize, self.dim_y as usize);
        for r in &self.rects {
            grid.fill_rect(r.x0 as usize, r.y0 as usize, r.width as usize, r.height as usize, r.id);
        }
        grid
    }

    /// Ids of the rectangles currently scheduled.
    pub fn ids(&self) -> Vec<DomainId> {
        self.rects.iter().map(|r| r.id).collect()
    }

    /// Advances to `step` (1-based): divides, then moves rectangles whose
    /// interval divides the step, and rasterises the result.
    pub fn advance(&mut self, step: u32) -> ScheduledMask {
        let mut divisions = Vec::new();
        let due: Vec<DivisionConfig> = self.divisions.iter().filter(|d| d.step == step).cloned().collect();
        for division in due {
            if self.divide(division.parent, division.child) {
                divisions.push((division.parent, division.child));
            }
        }

        for r in &mut self.rects {
            if r.move_interval == 0 || step % r.move_interval != 0 || r.velocity == (0, 0) {
                continue;
            }
            // Clip so the rectangle stays on the lattice.
            r.x0 = (r.x0 + r.velocity.0).clamp(0, (self.dim_x - r.width).max(0));
            r.y0 = (r.y0 + r.velocity.1).clamp(0, (self.dim_y - r.height).max(0));
            debug!("Rectangle {} moved to ({}, {}).", r.id, r.x0, r.y0);
        }

        ScheduledMask { grid: self.current_mask(), divisions }
    }

    /// Halves the parent along its longer side; the far half becomes the child.
    fn divide(&mut self, parent: DomainId, child: DomainId) -> bool {
        if self.rects.iter().any(|r| r.id == child) {
            warn!("Skipping division of {}: child id {} is already in use.", parent, child);
            return false;
        }
        let Some(r) = self.rects.iter_mut().find(|r| r.id == parent) else {
            warn!("Skipping division of unknown rectangle {}.", parent);
            return false;
        };
        let mut half = r.clone();
        half.id = child;
        if r.width >= r.height {
            if r.width < 2 {
                warn!("Rectangle {} is too small to divide.", parent);
                return false;
            }
            r.width /= 2;
            half.x0 = r.x0 + r.width;
            half.width -= r.width;
        } else {
            r.height /= 2;
            half.y0 = r.y0 + r.height;
            half.height -= r.height;
        }
        info!("Rectangle {} divides into {} and {}.", parent, parent, child);
        self.rects.push(half);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> SimulationConfig {
        let text = format!(
            r#"
            [lattice]
            width = 30
            height = 20

            [timing]
            num_steps = 5

            [initial_conditions]
            seed = 1

            [[domains]]
            id = 1
            x0 = 2
            y0 = 4
            width = 10
            height = 6
            velocity = [1, 0]
            move_interval_steps = 2

            {}

            [output]
            base_filename = "t"
            save_positions = false
            save_stats = false
            "#,
            extra
        );
        SimulationConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn rectangles_move_on_their_interval() {
        let mut schedule = MaskSchedule::from_config(&config(""));
        assert_eq!(schedule.current_mask().get(2, 4), 1);
        let m1 = schedule.advance(1);
        assert_eq!(m1.grid.get(2, 4), 1);
        let m2 = schedule.advance(2);
        assert_eq!(m2.grid.get(2, 4), 0);
        assert_eq!(m2.grid.get(12, 4), 1);
        assert_eq!(m2.grid.count(1), 60);
    }

    #[test]
    fn rectangles_stop_at_the_lattice_edge() {
        let mut schedule = MaskSchedule::from_config(&config(""));
        for step in 1..=100 {
            schedule.advance(step);
        }
        let grid = schedule.current_mask();
        assert_eq!(grid.count(1), 60);
        assert_eq!(grid.get(29, 4), 1);
    }

    #[test]
    fn division_halves_the_longer_side() {
        let mut schedule = MaskSchedule::from_config(&config(
            "[[divisions]]\nstep = 1\nparent = 1\nchild = 2\n",
        ));
        let m = schedule.advance(1);
        assert_eq!(m.divisions, vec![(1, 2)]);
        assert_eq!(m.grid.count(1), 30);
        assert_eq!(m.grid.count(2), 30);
        assert_eq!(m.grid.get(6, 4), 1);
        assert_eq!(m.grid.get(7, 4), 2);
        assert_eq!(schedule.ids(), vec![1, 2]);
    }
}
