//! Enumerates the grid cells covered by an inflated line segment.
//!
//! Given a segment `[P, Q]` and an inflation radius `W`, the entry points
//! below invoke a callback for every row of cells that the capsule of
//! radius `W` around the segment may intersect. The callback receives
//! `(x_inf, x_sup, y, z)`: an inclusive range of X cell coordinates within
//! the row `(y, z)`. Coordinates are *not* folded here; the grid folds or
//! clamps them when the row is painted, which also handles periodic axes.
//!
//! The cover is conservative: every cell whose box meets the capsule is
//! reported, and possibly a few more. Rows are narrowed by clipping the
//! segment parameter against the Y and Z slabs of each row, expanded by
//! `W`, so the cover tightens to the swept box aligned with the segment
//! rather than the full bounding box of the capsule.

/// Paints the 1D cell range covered by `[p, q]` inflated by `width`.
pub fn paint_fat_line_1d<F>(mut paint: F, p: f64, q: f64, width: f64, inf: f64, delta: f64)
where
    F: FnMut(isize, isize, isize, isize),
{
    let lo = p.min(q) - width;
    let hi = p.max(q) + width;
    let x_inf = ((lo - inf) / delta).floor() as isize;
    let x_sup = ((hi - inf) / delta).floor() as isize;
    paint(x_inf, x_sup, 0, 0);
}

/// Clips the parameter interval `[t0, t1]` of the segment `a + t*(b-a)`
/// against the slab `[lo, hi]` on one coordinate. Returns false if the
/// intersection is empty.
fn clip_axis(a: f64, b: f64, lo: f64, hi: f64, t0: &mut f64, t1: &mut f64) -> bool {
    let d = b - a;
    if d.abs() < 1e-30 {
        return a >= lo && a <= hi;
    }
    let mut ta = (lo - a) / d;
    let mut tb = (hi - a) / d;
    if ta > tb {
        std::mem::swap(&mut ta, &mut tb);
    }
    *t0 = t0.max(ta);
    *t1 = t1.min(tb);
    return t0 <= t1;
}

/// Paints the 2D cells covered by segment `[p, q]` inflated by `width`.
///
/// # Arguments
/// * `paint` - callback receiving `(x_inf, x_sup, y, 0)`
/// * `p`, `q` - segment end points, as `[x, y]`
/// * `width` - inflation radius
/// * `inf`, `delta` - grid origin and cell sides
pub fn paint_fat_line_2d<F>(mut paint: F, p: &[f64; 2], q: &[f64; 2], width: f64, inf: &[f64; 2], delta: &[f64; 2])
where
    F: FnMut(isize, isize, isize, isize),
{
    let y_inf = ((p[1].min(q[1]) - width - inf[1]) / delta[1]).floor() as isize;
    let y_sup = ((p[1].max(q[1]) + width - inf[1]) / delta[1]).floor() as isize;

    for iy in y_inf..=y_sup {
        // clip the segment against this row's Y slab, expanded by width
        let slab_lo = inf[1] + iy as f64 * delta[1] - width;
        let slab_hi = inf[1] + (iy + 1) as f64 * delta[1] + width;
        let mut t0 = 0.0;
        let mut t1 = 1.0;
        if !clip_axis(p[1], q[1], slab_lo, slab_hi, &mut t0, &mut t1) {
            continue;
        }
        let xa = p[0] + t0 * (q[0] - p[0]);
        let xb = p[0] + t1 * (q[0] - p[0]);
        let x_inf = ((xa.min(xb) - width - inf[0]) / delta[0]).floor() as isize;
        let x_sup = ((xa.max(xb) + width - inf[0]) / delta[0]).floor() as isize;
        paint(x_inf, x_sup, iy, 0);
    }
}

/// Paints the 3D cells covered by segment `[p, q]` inflated by `width`.
pub fn paint_fat_line_3d<F>(mut paint: F, p: &[f64; 3], q: &[f64; 3], width: f64, inf: &[f64; 3], delta: &[f64; 3])
where
    F: FnMut(isize, isize, isize, isize),
{
    let y_inf = ((p[1].min(q[1]) - width - inf[1]) / delta[1]).floor() as isize;
    let y_sup = ((p[1].max(q[1]) + width - inf[1]) / delta[1]).floor() as isize;
    let z_inf = ((p[2].min(q[2]) - width - inf[2]) / delta[2]).floor() as isize;
    let z_sup = ((p[2].max(q[2]) + width - inf[2]) / delta[2]).floor() as isize;

    for iz in z_inf..=z_sup {
        let zlab_lo = inf[2] + iz as f64 * delta[2] - width;
        let zlab_hi = inf[2] + (iz + 1) as f64 * delta[2] + width;
        let mut tz0 = 0.0;
        let mut tz1 = 1.0;
        if !clip_axis(p[2], q[2], zlab_lo, zlab_hi, &mut tz0, &mut tz1) {
            continue;
        }
        for iy in y_inf..=y_sup {
            let slab_lo = inf[1] + iy as f64 * delta[1] - width;
            let slab_hi = inf[1] + (iy + 1) as f64 * delta[1] + width;
            let mut t0 = tz0;
            let mut t1 = tz1;
            if !clip_axis(p[1], q[1], slab_lo, slab_hi, &mut t0, &mut t1) {
                continue;
            }
            let xa = p[0] + t0 * (q[0] - p[0]);
            let xb = p[0] + t1 * (q[0] - p[0]);
            let x_inf = ((xa.min(xb) - width - inf[0]) / delta[0]).floor() as isize;
            let x_sup = ((xa.max(xb) + width - inf[0]) / delta[0]).floor() as isize;
            paint(x_inf, x_sup, iy, iz);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn dist_point_segment(w: &[f64; 3], p: &[f64; 3], q: &[f64; 3]) -> f64 {
        let d = [q[0] - p[0], q[1] - p[1], q[2] - p[2]];
        let a = [w[0] - p[0], w[1] - p[1], w[2] - p[2]];
        let ls = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        if ls == 0.0 {
            return (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
        }
        let t = ((a[0] * d[0] + a[1] * d[1] + a[2] * d[2]) / (ls * ls)).clamp(0.0, 1.0);
        let c = [p[0] + t * d[0] - w[0], p[1] + t * d[1] - w[1], p[2] + t * d[2] - w[2]];
        (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt()
    }

    /// Every point within `width` of the segment must fall in a painted cell.
    #[test]
    fn cover_is_complete_3d() {
        let mut rng = SmallRng::seed_from_u64(12);
        let inf = [-5.0, -5.0, -5.0];
        let delta = [0.7, 0.9, 0.5];
        for _ in 0..30 {
            let p = [rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0)];
            let q = [rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0)];
            let width = rng.gen_range(0.1..0.8);

            let mut painted: HashSet<(isize, isize, isize)> = HashSet::new();
            paint_fat_line_3d(
                |xi, xs, y, z| {
                    for x in xi..=xs {
                        painted.insert((x, y, z));
                    }
                },
                &p,
                &q,
                width,
                &inf,
                &delta,
            );

            // sample points near the capsule and check the containing cell
            for _ in 0..200 {
                let t: f64 = rng.gen_range(0.0..1.0);
                let off = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
                let on = [p[0] + t * (q[0] - p[0]), p[1] + t * (q[1] - p[1]), p[2] + t * (q[2] - p[2])];
                let w = [on[0] + off[0] * width, on[1] + off[1] * width, on[2] + off[2] * width];
                if dist_point_segment(&w, &p, &q) <= width {
                    let cell = (
                        ((w[0] - inf[0]) / delta[0]).floor() as isize,
                        ((w[1] - inf[1]) / delta[1]).floor() as isize,
                        ((w[2] - inf[2]) / delta[2]).floor() as isize,
                    );
                    assert!(painted.contains(&cell), "missed cell {:?}", cell);
                }
            }
        }
    }

    #[test]
    fn cover_is_complete_2d() {
        let mut rng = SmallRng::seed_from_u64(3);
        let inf = [0.0, 0.0];
        let delta = [0.3, 0.3];
        for _ in 0..30 {
            let p = [rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0)];
            let q = [rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0)];
            let width = 0.25;

            let mut painted: HashSet<(isize, isize)> = HashSet::new();
            paint_fat_line_2d(
                |xi, xs, y, _| {
                    for x in xi..=xs {
                        painted.insert((x, y));
                    }
                },
                &p,
                &q,
                width,
                &inf,
                &delta,
            );

            for _ in 0..200 {
                let t: f64 = rng.gen_range(0.0..1.0);
                let a = rng.gen_range(0.0..std::f64::consts::TAU);
                let r = rng.gen_range(0.0..width);
                let w = [
                    p[0] + t * (q[0] - p[0]) + r * a.cos(),
                    p[1] + t * (q[1] - p[1]) + r * a.sin(),
                ];
                let cell = (
                    ((w[0] - inf[0]) / delta[0]).floor() as isize,
                    ((w[1] - inf[1]) / delta[1]).floor() as isize,
                );
                assert!(painted.contains(&cell));
            }
        }
    }

    #[test]
    fn fat_line_1d() {
        let mut cells = Vec::new();
        paint_fat_line_1d(|xi, xs, _, _| cells.push((xi, xs)), 1.0, 2.0, 0.5, 0.0, 1.0);
        assert_eq!(cells, vec![(0, 2)]);
    }
}
