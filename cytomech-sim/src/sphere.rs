use cytomech_numerical::Vec3;

use crate::mecable::Mecable;
use crate::point_ref::PointExact;
use crate::properties::ConfineProp;

/// A rigid sphere: one central point plus anchoring points on the surface.
///
/// The surface points only serve to attach singles; mechanically the whole
/// object moves as a rigid body with the drag of a sphere of its radius.
/// The shape-restoring step projects the surface points back onto the
/// sphere around the center.
pub struct Sphere {
    points: Vec<f64>,
    n_points: usize,
    pub radius: f64,
    pub confine: Option<ConfineProp>,
    pub steric_radius: f64,
    mat_index: usize,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f64) -> Sphere {
        assert!(radius > 0.0);
        Sphere {
            points: vec![center.x, center.y, center.z],
            n_points: 1,
            radius,
            confine: None,
            steric_radius: 0.0,
            mat_index: 0,
        }
    }

    pub fn center(&self) -> Vec3 {
        self.point(0)
    }

    /// Adds an anchoring point on the surface, in the direction `dir` from
    /// the center. Returns its point index.
    pub fn add_surface_point(&mut self, dir: Vec3) -> usize {
        let w = self.center() + dir.normalized() * self.radius;
        self.points.push(w.x);
        self.points.push(w.y);
        self.points.push(w.z);
        self.n_points += 1;
        self.n_points - 1
    }

    fn set_point(&mut self, i: usize, w: &Vec3) {
        w.store(&mut self.points[3 * i..3 * i + 3]);
    }

    /// Brings the surface points back onto the sphere.
    pub fn reproject_surface(&mut self) {
        let c = self.center();
        for i in 1..self.n_points {
            let d = (self.point(i) - c).normalized();
            let w = c + d * self.radius;
            self.set_point(i, &w);
        }
    }

    pub fn drag_coefficient(&self, viscosity: f64) -> f64 {
        6.0 * std::f64::consts::PI * viscosity * self.radius
    }

    pub fn rot_drag_coefficient(&self, viscosity: f64) -> f64 {
        8.0 * std::f64::consts::PI * viscosity * self.radius.powi(3)
    }

    pub fn exact_point(&self, i: usize) -> PointExact {
        PointExact::new(self.mat_index + i, self.point(i))
    }
}

impl Mecable for Sphere {
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
        self.reproject_surface();
    }

    fn mat_index(&self) -> usize {
        self.mat_index
    }

    fn set_mat_index(&mut self, index: usize) {
        self.mat_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_points_stay_on_the_shell() {
        let mut sp = Sphere::new(Vec3::new(1.0, 0.0, 0.0), 0.5);
        sp.add_surface_point(Vec3::new(0.0, 1.0, 0.0));
        sp.add_surface_point(Vec3::new(1.0, 1.0, 0.0));
        // displace everything and reproject
        let src: Vec<f64> = (0..9).map(|k| sp.points[k] + 0.1 * (k as f64 % 3.0)).collect();
        sp.get_points(&src);
        let c = sp.center();
        for i in 1..sp.n_points() {
            assert!((sp.point(i).distance(&c) - 0.5).abs() < 1e-12);
        }
    }
}
