use cytomech_numerical::Vec3;
use nalgebra as na;

use crate::mecable::Mecable;
use crate::point_ref::PointExact;
use crate::properties::ConfineProp;

/// A rigid cloud of points moving as one body.
///
/// The reference shape is recorded at construction by `fix_shape()`,
/// together with the scalar momenta needed to restore the size exactly.
/// After every integration step the cloud is brought back to its reference:
/// usually by the cheap isotropic rescale that cancels the dominant
/// second-order drift, periodically by a full rigid-body fit that cancels
/// accumulated rotation and translation errors.
pub struct Solid {
    points: Vec<f64>,
    n_points: usize,
    /// per-point drag radius; zero contributes no drag
    radii: Vec<f64>,
    /// reference shape, centered on its centroid
    shape: Vec<f64>,
    /// second momentum of the reference shape about its centroid
    shape_sqr: f64,
    reshape_timer: u8,
    pub confine: Option<ConfineProp>,
    pub steric_radius: f64,
    mat_index: usize,
}

impl Solid {
    /// Builds a solid from points and their drag radii.
    pub fn new(points: &[(Vec3, f64)]) -> Solid {
        assert!(!points.is_empty(), "a solid needs at least one point");
        let mut flat = Vec::with_capacity(3 * points.len());
        let mut radii = Vec::with_capacity(points.len());
        for (w, r) in points {
            flat.push(w.x);
            flat.push(w.y);
            flat.push(w.z);
            radii.push(*r);
        }
        let mut solid = Solid {
            points: flat,
            n_points: points.len(),
            radii,
            shape: Vec::new(),
            shape_sqr: 0.0,
            reshape_timer: 0,
            confine: None,
            steric_radius: 0.0,
            mat_index: 0,
        };
        solid.fix_shape();
        return solid;
    }

    pub fn centroid(&self) -> Vec3 {
        let mut c = Vec3::zero();
        for i in 0..self.n_points {
            c += self.point(i);
        }
        c / self.n_points as f64
    }

    /// Records the current shape as the reference.
    pub fn fix_shape(&mut self) {
        let c = self.centroid();
        self.shape.clear();
        self.shape_sqr = 0.0;
        for i in 0..self.n_points {
            let w = self.point(i) - c;
            self.shape.push(w.x);
            self.shape.push(w.y);
            self.shape.push(w.z);
            self.shape_sqr += w.norm_sqr();
        }
    }

    /// Isotropic rescale restoring the second momentum of the reference.
    pub fn rescale(&mut self) {
        if self.n_points < 2 {
            return;
        }
        let c = self.centroid();
        let mut sz = 0.0;
        for i in 0..self.n_points {
            sz += (self.point(i) - c).norm_sqr();
        }
        assert!(sz > 0.0, "solid has collapsed and cannot be rescaled");
        let scale = (self.shape_sqr / sz).sqrt();
        for i in 0..self.n_points {
            let w = c + (self.point(i) - c) * scale;
            self.set_point(i, &w);
        }
    }

    /// Rigid-body fit: replaces the points by the reference shape under the
    /// best isometric transformation.
    pub fn reshape_fit(&mut self) {
        assert_eq!(self.shape.len(), 3 * self.n_points, "reference shape was not recorded");
        if self.n_points < 2 {
            return;
        }
        let c = self.centroid();

        // covariance between the reference shape and the current points
        let mut h = na::Matrix3::<f64>::zeros();
        for i in 0..self.n_points {
            let s = Vec3::from_slice(&self.shape[3 * i..3 * i + 3]);
            let w = self.point(i) - c;
            for r in 0..3 {
                for k in 0..3 {
                    h[(r, k)] += w[r] * s[k];
                }
            }
        }

        let svd = h.svd(true, true);
        let u = svd.u.unwrap();
        let v_t = svd.v_t.unwrap();
        let mut rot = u * v_t;
        if rot.determinant() < 0.0 {
            // avoid a reflection: flip the axis of least variance
            let mut u2 = u;
            for r in 0..3 {
                u2[(r, 2)] = -u2[(r, 2)];
            }
            rot = u2 * v_t;
        }

        for i in 0..self.n_points {
            let s = self.shape_vec(i);
            let rs = Vec3::new(
                rot[(0, 0)] * s.x + rot[(0, 1)] * s.y + rot[(0, 2)] * s.z,
                rot[(1, 0)] * s.x + rot[(1, 1)] * s.y + rot[(1, 2)] * s.z,
                rot[(2, 0)] * s.x + rot[(2, 1)] * s.y + rot[(2, 2)] * s.z,
            );
            let w = c + rs;
            self.set_point(i, &w);
        }
    }

    fn shape_vec(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.shape[3 * i..3 * i + 3])
    }

    pub fn set_point(&mut self, i: usize, w: &Vec3) {
        w.store(&mut self.points[3 * i..3 * i + 3]);
    }

    /// Staggers the expensive fits across objects.
    pub fn set_reshape_phase(&mut self, phase: u8) {
        self.reshape_timer = phase % 8;
    }

    /// Total translational drag: the sum over the drag radii.
    pub fn drag_coefficient(&self, viscosity: f64) -> f64 {
        let sum: f64 = self.radii.iter().sum();
        let drag = 6.0 * std::f64::consts::PI * viscosity * sum;
        assert!(drag > 0.0, "solid has no drag radius");
        return drag;
    }

    /// Rotational drag about the centroid.
    pub fn rot_drag_coefficient(&self, viscosity: f64) -> f64 {
        let c = self.centroid();
        let mut sum = 0.0;
        for i in 0..self.n_points {
            let r = self.radii[i];
            if r > 0.0 {
                // own rotation of the sphere plus its arm about the center
                sum += 8.0 * r.powi(3) / 6.0 + r * (self.point(i) - c).norm_sqr();
            }
        }
        6.0 * std::f64::consts::PI * viscosity * sum.max(1e-9)
    }

    pub fn exact_point(&self, i: usize) -> PointExact {
        PointExact::new(self.mat_index + i, self.point(i))
    }

    pub fn radius(&self, i: usize) -> f64 {
        self.radii[i]
    }
}

impl Mecable for Solid {
    fn n_points(&self) -> usize {
        self.n_points
    }

    fn point(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.points[3 * i..3 * i + 3])
    }

    fn put_points(&self, dst: &mut [f64]) {
        dst[..3 * self.n_points].copy_from_slice(&self.points);
    }

    fn get_points(&mut self, src: &[f64]) {
        self.points.copy_from_slice(&src[..3 * self.n_points]);
        if self.n_points < 2 {
            return;
        }
        // cheap rescale usually, full fit on a longer period
        self.reshape_timer += 1;
        if self.reshape_timer > 7 {
            self.reshape_fit();
            self.reshape_timer = 0;
        } else {
            self.rescale();
        }
    }

    fn mat_index(&self) -> usize {
        self.mat_index
    }

    fn set_mat_index(&mut self, index: usize) {
        self.mat_index = index;
    }
}
