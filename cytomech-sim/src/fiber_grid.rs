//! Divide-and-conquer search of fiber segments near a point.
//!
//! The grid is painted once per step: every segment is registered in all
//! cells within `H = max_range + cell_diagonal/2` of it, so the cell
//! containing any query point holds every segment whose distance to the
//! point could be below `max_range`. The per-query work is then linear in
//! the local density.

use cytomech_grids::{rasterizer, UniformGrid};
use cytomech_numerical::{SimRng, Vec3};
use log::debug;
use rand::seq::SliceRandom;

use crate::errors::SimError;
use crate::fiber::Fiber;
use crate::fiber_set::{BindingSite, FiberSet};
use crate::mecable::Mecable;

/// A fiber segment registered on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentKey {
    pub fiber: usize,
    pub seg: usize,
}

/// A candidate produced by a proximity query.
#[derive(Clone, Copy, Debug)]
pub struct SegmentHit {
    pub site: BindingSite,
    pub dist_sqr: f64,
}

pub struct FiberGrid {
    grid: Option<UniformGrid<Vec<SegmentKey>, 3>>,
    /// the distance guaranteed by the last paint; zero when unpainted
    range: f64,
}

const MAX_CELLS: usize = 1 << 20;

impl Default for FiberGrid {
    fn default() -> Self {
        FiberGrid::new()
    }
}

impl FiberGrid {
    pub fn new() -> FiberGrid {
        FiberGrid { grid: None, range: 0.0 }
    }

    pub fn has_grid(&self) -> bool {
        self.grid.is_some()
    }

    /// Creates the cell grid covering `[-extension, extension]` with cells
    /// no larger than `max_step`; the grid spills one cell beyond the
    /// borders so clamping stays conservative.
    pub fn set_grid(&mut self, extension: Vec3, max_step: f64) -> Result<(), SimError> {
        if max_step <= 0.0 {
            return Err(SimError::parameter("binding_grid_step must be > 0"));
        }
        // coarsen the step until the cell count is affordable
        let mut step = max_step;
        let (n, half) = loop {
            let mut n = [0usize; 3];
            let mut half = [0.0; 3];
            let mut total = 1usize;
            for d in 0..3 {
                // spill one cell beyond each border of the region
                n[d] = (2.0 * extension[d] / step).ceil().max(1.0) as usize + 2;
                half[d] = 0.5 * n[d] as f64 * step;
                total = total.saturating_mul(n[d]);
            }
            if total <= MAX_CELLS {
                break (n, half);
            }
            step *= 2.0;
        };
        debug!("fiber grid with {}x{}x{} cells of side {:.3}", n[0], n[1], n[2], step);
        self.grid = Some(UniformGrid::new(
            [-half[0], -half[1], -half[2]],
            [half[0], half[1], half[2]],
            n,
            [false, false, false],
        ));
        self.range = 0.0;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.range = 0.0;
        if let Some(g) = &mut self.grid {
            for cell in g.cells_mut() {
                cell.clear();
            }
        }
    }

    /// Registers every fiber segment, guaranteeing that queries within
    /// `max_range` are complete.
    pub fn paint(&mut self, fibers: &FiberSet, max_range: f64) {
        self.clear();
        let grid = self.grid.as_mut().expect("fiber grid was not initialized");
        self.range = max_range;
        let width = max_range + 0.5 * grid.diagonal_length();
        let inf = *grid.inf();
        let delta = *grid.delta();

        for (id, fib) in fibers.iter() {
            for seg in 0..fib.n_segments() {
                let p = fib.point(seg);
                let q = fib.point(seg + 1);
                let key = SegmentKey { fiber: id, seg };
                rasterizer::paint_fat_line_3d(
                    |xi, xs, y, z| {
                        grid.paint_row(xi, xs, y, z, |cell| cell.push(key));
                    },
                    &[p.x, p.y, p.z],
                    &[q.x, q.y, q.z],
                    width,
                    &inf,
                    &delta,
                );
            }
        }
    }

    /// Distance of `w` to one segment, with the clamped abscissa within the
    /// segment. Beyond an inner joint the neighbouring segment answers, so
    /// only terminal segments consider their free end point.
    fn project(fib: &Fiber, seg: usize, w: &Vec3) -> Option<(f64, f64)> {
        let p1 = fib.point(seg);
        let p2 = fib.point(seg + 1);
        let dx = p2 - p1;
        let aw = *w - p1;
        let ls = fib.segmentation();
        let t = aw.dot(&dx) / ls;
        if t < 0.0 {
            if seg == 0 {
                return Some((0.0, aw.norm_sqr()));
            }
            return None;
        }
        if t > ls {
            if seg + 1 == fib.n_segments() {
                return Some((ls, w.distance_sqr(&p2)));
            }
            return None;
        }
        Some((t, aw.norm_sqr() - t * t))
    }

    /// Collects the binding sites within `sqrt(range_sqr)` of `w`, in
    /// shuffled order so competing segments are drawn without bias.
    ///
    /// `sqrt(range_sqr)` must not exceed the painted range, or the query
    /// would be incomplete.
    pub fn candidates(&self, w: &Vec3, range_sqr: f64, fibers: &FiberSet, rng: &mut SimRng, out: &mut Vec<SegmentHit>) {
        out.clear();
        let grid = self.grid.as_ref().expect("fiber grid was not initialized");

        debug_assert!(range_sqr <= self.range * self.range * (1.0 + 1e-9) || range_sqr == 0.0);
        let cell = grid.cell_at(&[w.x, w.y, w.z]);
        for key in cell {
            if let Some(fib) = fibers.get(key.fiber) {
                if let Some((t, d2)) = Self::project(fib, key.seg, w) {
                    if d2 < range_sqr {
                        let abscissa = fib.abscissa_m() + key.seg as f64 * fib.segmentation() + t;
                        out.push(SegmentHit { site: BindingSite { fiber: key.fiber, abscissa }, dist_sqr: d2 });
                    }
                }
            }
        }
        out.shuffle(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::FiberProp;
    use std::sync::Arc;

    fn make_set() -> FiberSet {
        let mut set = FiberSet::new();
        let prop = Arc::new(FiberProp::new("f"));
        set.add(Fiber::new(prop.clone(), Vec3::new(-2.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 4.0));
        set.add(Fiber::new(prop, Vec3::new(-2.0, 0.3, 0.0), Vec3::new(1.0, 0.0, 0.0), 4.0));
        set
    }

    #[test]
    fn finds_segments_within_range() {
        let fibers = make_set();
        let mut grid = FiberGrid::new();
        grid.set_grid(Vec3::new(3.0, 3.0, 3.0), 0.4).unwrap();
        grid.paint(&fibers, 0.5);

        let mut rng = SimRng::seeded(8);
        let mut out = Vec::new();
        // a point 0.1 below the first fiber sees both fibers
        grid.candidates(&Vec3::new(0.5, -0.1, 0.0), 0.25, &fibers, &mut rng, &mut out);
        let hit_fibers: Vec<usize> = out.iter().map(|h| h.site.fiber).collect();
        assert!(hit_fibers.contains(&0));
        assert!(hit_fibers.contains(&1));
        for h in &out {
            assert!(h.dist_sqr < 0.25);
        }
    }

    #[test]
    fn query_is_complete() {
        // brute force comparison over random query points
        let fibers = make_set();
        let mut grid = FiberGrid::new();
        grid.set_grid(Vec3::new(3.0, 3.0, 3.0), 0.3).unwrap();
        let range = 0.4;
        grid.paint(&fibers, range);

        let mut rng = SimRng::seeded(77);
        let mut out = Vec::new();
        for _ in 0..300 {
            let w = Vec3::new(4.0 * rng.sreal(), 2.0 * rng.sreal(), 2.0 * rng.sreal());
            grid.candidates(&w, range * range, &fibers, &mut rng, &mut out);
            // reference: check every segment directly
            let mut expected = 0;
            for (_, fib) in fibers.iter() {
                for seg in 0..fib.n_segments() {
                    if let Some((_, d2)) = FiberGrid::project(fib, seg, &w) {
                        if d2 < range * range {
                            expected += 1;
                        }
                    }
                }
            }
            assert_eq!(out.len(), expected, "at {:?}", w);
        }
    }

    #[test]
    fn beyond_painted_range_nothing_guaranteed() {
        let fibers = make_set();
        let mut grid = FiberGrid::new();
        grid.set_grid(Vec3::new(3.0, 3.0, 3.0), 0.4).unwrap();
        grid.paint(&fibers, 0.2);
        let mut rng = SimRng::seeded(1);
        let mut out = Vec::new();
        grid.candidates(&Vec3::new(0.0, 0.1, 0.0), 0.04, &fibers, &mut rng, &mut out);
        assert!(!out.is_empty());
    }
}
