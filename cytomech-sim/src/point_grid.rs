//! Divide-and-conquer detection of steric contacts.
//!
//! Fat points (beads, solid and sphere points) are registered in the single
//! cell containing them; fat segments are painted into every cell their
//! inflated box intersects. Point-point pairs are found by scanning each
//! cell against its canonical half-shell of neighbours, so each pair comes
//! up exactly once; point-segment and segment-segment pairs are found
//! within shared cells, with a visited-set making multi-cell segments count
//! once. Overlapping pairs deposit a linearized push spring; pairs within
//! the attraction range deposit a pull spring when that stiffness is set.

use std::collections::HashSet;

use cytomech_grids::{rasterizer, UniformGrid};
use cytomech_numerical::Vec3;
use log::debug;

use crate::meca::Meca;
use crate::point_ref::{PointExact, PointInterpolated, PointRef};

/// A point entering steric interactions.
#[derive(Clone, Copy, Debug)]
pub struct FatPoint {
    /// global matrix index of the model point
    pub index: usize,
    pub pos: Vec3,
    /// equilibrium radius: force vanishes at this distance from the surface
    pub radius: f64,
    /// maximum distance at which an attractive force operates
    pub range: f64,
}

/// A fiber segment entering steric interactions.
#[derive(Clone, Copy, Debug)]
pub struct FatSegment {
    /// global matrix indices of the two end points
    pub i1: usize,
    pub i2: usize,
    pub p1: Vec3,
    pub p2: Vec3,
    pub radius: f64,
    pub range: f64,
    /// terminal segments also answer for their free end cap
    pub first: bool,
    pub last: bool,
}

#[derive(Clone, Debug, Default)]
struct StericCell {
    points: Vec<FatPoint>,
    segments: Vec<FatSegment>,
}

/// Stiffnesses of the steric springs.
#[derive(Clone, Copy, Debug)]
pub struct StericParam {
    pub stiff_push: f64,
    pub stiff_pull: f64,
}

pub struct PointGrid {
    grid: Option<UniformGrid<StericCell, 3>>,
    /// largest pair interaction distance; sets the painting inflation
    inflation: f64,
    /// canonical half-shell of neighbour offsets
    shell: Vec<[isize; 3]>,
}

impl Default for PointGrid {
    fn default() -> Self {
        PointGrid::new()
    }
}

impl PointGrid {
    pub fn new() -> PointGrid {
        // the 13 neighbours of the canonical half-shell in 3D
        let mut shell = Vec::with_capacity(13);
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if dz > 0 || (dz == 0 && dy > 0) || (dz == 0 && dy == 0 && dx > 0) {
                        shell.push([dx, dy, dz]);
                    }
                }
            }
        }
        PointGrid { grid: None, inflation: 0.0, shell }
    }

    pub fn has_grid(&self) -> bool {
        self.grid.is_some()
    }

    /// Creates the grid over `[-extension, extension]` with cells at least
    /// `min_step` wide; `max_diameter` is the largest interaction distance
    /// of any pair, which bounds the point-point search to one shell.
    pub fn set_grid(&mut self, extension: Vec3, min_step: f64, max_diameter: f64) {
        let step = min_step.max(max_diameter).max(1e-3);
        let mut n = [0usize; 3];
        let mut inf = [0.0; 3];
        let mut sup = [0.0; 3];
        for d in 0..3 {
            n[d] = ((2.0 * extension[d] / step).ceil().max(1.0) as usize) + 2;
            let half = 0.5 * n[d] as f64 * step;
            inf[d] = -half;
            sup[d] = half;
        }
        debug!("steric grid with {}x{}x{} cells of side {:.3}", n[0], n[1], n[2], step);
        self.inflation = max_diameter;
        self.grid = Some(UniformGrid::new(inf, sup, n, [false, false, false]));
    }

    pub fn clear(&mut self) {
        if let Some(g) = &mut self.grid {
            for cell in g.cells_mut() {
                cell.points.clear();
                cell.segments.clear();
            }
        }
    }

    /// Registers a point into the cell containing it.
    pub fn add_point(&mut self, p: FatPoint) {
        let g = self.grid.as_mut().expect("steric grid was not initialized");
        g.cell_at_mut(&[p.pos.x, p.pos.y, p.pos.z]).points.push(p);
    }

    /// Registers a segment into every cell its inflated box intersects.
    pub fn add_segment(&mut self, s: FatSegment) {
        let inflation = self.inflation;
        let g = self.grid.as_mut().expect("steric grid was not initialized");
        let inf = *g.inf();
        let delta = *g.delta();
        rasterizer::paint_fat_line_3d(
            |xi, xs, y, z| {
                g.paint_row(xi, xs, y, z, |cell| cell.segments.push(s));
            },
            &[s.p1.x, s.p1.y, s.p1.z],
            &[s.p2.x, s.p2.y, s.p2.z],
            inflation,
            &inf,
            &delta,
        );
    }

    fn point_ref(p: &FatPoint) -> PointRef {
        PointRef::Vertex(PointExact::new(p.index, p.pos))
    }

    fn segment_ref(s: &FatSegment, t: f64) -> PointRef {
        let len = (s.p2 - s.p1).norm();
        let coef = if len > 0.0 { (t / len).clamp(0.0, 1.0) } else { 0.0 };
        PointRef::Interpolated(PointInterpolated::new(s.i1, s.i2, coef, s.p1, s.p2))
    }

    /// Deposits the spring for one tested pair.
    fn deposit(meca: &mut Meca, pam: &StericParam, a: &PointRef, b: &PointRef, dist_sqr: f64, rad_sum: f64, range_sum: f64) {
        if dist_sqr < rad_sum * rad_sum {
            meca.inter_long_link(a, b, rad_sum, pam.stiff_push);
        } else if pam.stiff_pull > 0.0 && dist_sqr < range_sum * range_sum {
            meca.inter_long_link(a, b, rad_sum, pam.stiff_pull);
        }
    }

    fn check_pp(meca: &mut Meca, pam: &StericParam, a: &FatPoint, b: &FatPoint) {
        let d2 = a.pos.distance_sqr(&b.pos);
        Self::deposit(meca, pam, &Self::point_ref(a), &Self::point_ref(b), d2, a.radius + b.radius, a.range + b.range);
    }

    /// Point against segment; beyond an inner joint the neighbouring
    /// segment answers, so only terminal segments consider their caps.
    fn check_ps(meca: &mut Meca, pam: &StericParam, a: &FatPoint, s: &FatSegment) {
        let dx = s.p2 - s.p1;
        let len = dx.norm();
        if len < 1e-12 {
            return;
        }
        let aw = a.pos - s.p1;
        let t = aw.dot(&dx) / len;
        let (tc, d2) = if t < 0.0 {
            if !s.first {
                return;
            }
            (0.0, aw.norm_sqr())
        } else if t > len {
            if !s.last {
                return;
            }
            (len, a.pos.distance_sqr(&s.p2))
        } else {
            (t, aw.norm_sqr() - t * t)
        };
        Self::deposit(meca, pam, &Self::point_ref(a), &Self::segment_ref(s, tc), d2, a.radius + s.radius, a.range + s.range);
    }

    /// Closest approach of two segments, clamped to their extents.
    fn closest_approach(p1: Vec3, u: Vec3, p2: Vec3, v: Vec3) -> (f64, f64) {
        let w0 = p1 - p2;
        let a = u.dot(&u);
        let b = u.dot(&v);
        let c = v.dot(&v);
        let d = u.dot(&w0);
        let e = v.dot(&w0);
        let denom = a * c - b * b;

        let mut s = if denom > 1e-12 * a * c { (b * e - c * d) / denom } else { 0.0 };
        s = s.clamp(0.0, 1.0);
        let mut t = if c > 0.0 { (b * s + e) / c } else { 0.0 };
        if t < 0.0 {
            t = 0.0;
            s = (-d / a).clamp(0.0, 1.0);
        } else if t > 1.0 {
            t = 1.0;
            s = ((b - d) / a).clamp(0.0, 1.0);
        }
        (s, t)
    }

    fn check_ss(meca: &mut Meca, pam: &StericParam, s1: &FatSegment, s2: &FatSegment) {
        // consecutive segments of one fiber share a point and cannot
        // produce a correct matrix pattern
        if s1.i1 == s2.i1 || s1.i1 == s2.i2 || s1.i2 == s2.i1 || s1.i2 == s2.i2 {
            return;
        }
        let u = s1.p2 - s1.p1;
        let v = s2.p2 - s2.p1;
        let (s, t) = Self::closest_approach(s1.p1, u, s2.p1, v);
        let w1 = s1.p1 + u * s;
        let w2 = s2.p1 + v * t;
        let d2 = w1.distance_sqr(&w2);
        let r1 = Self::segment_ref(s1, s * u.norm());
        let r2 = Self::segment_ref(s2, t * v.norm());
        Self::deposit(meca, pam, &r1, &r2, d2, s1.radius + s2.radius, s1.range + s2.range);
    }

    /// Tests every nearby pair and deposits the contact springs.
    pub fn set_interactions(&self, meca: &mut Meca, pam: &StericParam) {
        let g = self.grid.as_ref().expect("steric grid was not initialized");
        let n_cells = *g.n_cells();
        // multi-cell segments must interact once per pair
        let mut seen: HashSet<(usize, usize)> = HashSet::new();

        for inx in 0..g.nb_cells() {
            let cell = g.cell(inx);
            if cell.points.is_empty() && cell.segments.is_empty() {
                continue;
            }

            // within the cell: upper-triangular point pairs
            for i in 0..cell.points.len() {
                for j in i + 1..cell.points.len() {
                    Self::check_pp(meca, pam, &cell.points[i], &cell.points[j]);
                }
                // points against segments sharing the cell: the point lives
                // in exactly one cell, so the pair shows up only here
                for s in &cell.segments {
                    Self::check_ps(meca, pam, &cell.points[i], s);
                }
            }

            // segment pairs sharing the cell, deduplicated
            for i in 0..cell.segments.len() {
                for j in i + 1..cell.segments.len() {
                    let s1 = &cell.segments[i];
                    let s2 = &cell.segments[j];
                    let key = if s1.i1 < s2.i1 { (s1.i1, s2.i1) } else { (s2.i1, s1.i1) };
                    if seen.insert(key) {
                        Self::check_ss(meca, pam, s1, s2);
                    }
                }
            }

            // point pairs across the canonical half-shell
            let coords = g.coords_of_index(inx);
            for off in &self.shell {
                let mut c = [0isize; 3];
                let mut ok = true;
                for d in 0..3 {
                    c[d] = coords[d] as isize + off[d];
                    if c[d] < 0 || c[d] >= n_cells[d] as isize {
                        ok = false;
                        break;
                    }
                }
                if !ok {
                    continue;
                }
                if let Some(ninx) = g.index_from_signed(&c) {
                    let other = g.cell(ninx);
                    for a in &cell.points {
                        for b in &other.points {
                            Self::check_pp(meca, pam, a, b);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_shell_has_13_offsets() {
        let pg = PointGrid::new();
        assert_eq!(pg.shell.len(), 13);
        // no offset and its negation are both present
        for o in &pg.shell {
            assert!(!pg.shell.contains(&[-o[0], -o[1], -o[2]]));
        }
    }

    #[test]
    fn closest_approach_crossing_segments() {
        let (s, t) = PointGrid::closest_approach(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.5),
            Vec3::new(0.0, 2.0, 0.0),
        );
        assert!((s - 0.5).abs() < 1e-12);
        assert!((t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn closest_approach_clamps_to_ends() {
        let (s, t) = PointGrid::closest_approach(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(5.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        );
        assert!((s - 1.0).abs() < 1e-12);
        assert!((t - 0.0).abs() < 1e-12);
    }
}
