use cytomech_numerical::Vec3;

use crate::mecable::Mecable;
use crate::point_ref::PointExact;
use crate::properties::ConfineProp;

/// A single point with a hydrodynamic radius.
pub struct Bead {
    pos: Vec3,
    pub radius: f64,
    pub confine: Option<ConfineProp>,
    /// radius of the steric envelope; zero disables steric contacts
    pub steric_radius: f64,
    mat_index: usize,
}

impl Bead {
    pub fn new(pos: Vec3, radius: f64) -> Bead {
        assert!(radius > 0.0);
        Bead { pos, radius, confine: None, steric_radius: 0.0, mat_index: 0 }
    }

    pub fn position(&self) -> Vec3 {
        self.pos
    }

    pub fn set_position(&mut self, w: Vec3) {
        self.pos = w;
    }

    /// Stokes drag of a sphere of this radius.
    pub fn drag_coefficient(&self, viscosity: f64) -> f64 {
        6.0 * std::f64::consts::PI * viscosity * self.radius
    }

    pub fn exact(&self) -> PointExact {
        PointExact::new(self.mat_index, self.pos)
    }
}

impl Mecable for Bead {
    fn n_points(&self) -> usize {
        1
    }

    fn point(&self, i: usize) -> Vec3 {
        debug_assert_eq!(i, 0);
        self.pos
    }

    fn put_points(&self, dst: &mut [f64]) {
        self.pos.store(dst);
    }

    fn get_points(&mut self, src: &[f64]) {
        self.pos = Vec3::from_slice(src);
    }

    fn mat_index(&self) -> usize {
        self.mat_index
    }

    fn set_mat_index(&mut self, index: usize) {
        self.mat_index = index;
    }
}
