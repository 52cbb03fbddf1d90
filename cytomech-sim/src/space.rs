//! Confining geometries.
//!
//! A space answers geometric queries (`inside`, `project`) and can deposit a
//! confinement interaction into the assembler: a stiff spring towards the
//! nearest boundary point. Spaces are registered in the simulation and
//! referred to by index from the confinement parameters.

use cytomech_numerical::{SimRng, Vec3};

use crate::meca::Meca;
use crate::point_ref::PointExact;
use crate::properties::ConfineMode;

pub trait Space {
    /// Half-extent of the bounding box, used to size the spatial grids.
    fn extension(&self) -> Vec3;

    fn volume(&self) -> f64;

    fn inside(&self, w: &Vec3) -> bool;

    /// The closest point of the boundary.
    fn project(&self, w: &Vec3) -> Vec3;

    /// Uniform random position inside the space.
    fn random_place(&self, rng: &mut SimRng) -> Vec3;

    /// Outward unit normal at the boundary point closest to `w`.
    fn normal_to_edge(&self, w: &Vec3) -> Vec3 {
        let p = self.project(w);
        let n = if self.inside(w) { p - *w } else { *w - p };
        n.normalized()
    }

    /// Deposits the confinement spring for one model point.
    ///
    /// In `Inside` mode the spring engages only when the point has left the
    /// space; in `Surface` mode the point is always tied to the boundary.
    fn set_interaction(&self, pe: &PointExact, meca: &mut Meca, stiffness: f64, mode: ConfineMode) {
        match mode {
            ConfineMode::Inside => {
                if !self.inside(&pe.pos) {
                    meca.inter_clamp_exact(pe, &self.project(&pe.pos), stiffness);
                }
            }
            ConfineMode::Surface => {
                meca.inter_clamp_exact(pe, &self.project(&pe.pos), stiffness);
            }
        }
    }

    /// Confinement of a point carrying a radius: the surface of the object
    /// must stay within the space, so the center is held `radius` away from
    /// the boundary.
    fn set_interaction_rad(&self, pe: &PointExact, meca: &mut Meca, stiffness: f64, mode: ConfineMode, radius: f64) {
        if radius <= 0.0 {
            return self.set_interaction(pe, meca, stiffness, mode);
        }
        let prj = self.project(&pe.pos);
        let outward = self.normal_to_edge(&pe.pos);
        let target = prj - outward * radius;
        match mode {
            ConfineMode::Inside => {
                let engaged = !self.inside(&pe.pos) || pe.pos.distance(&prj) < radius;
                if engaged {
                    meca.inter_clamp_exact(pe, &target, stiffness);
                }
            }
            ConfineMode::Surface => {
                meca.inter_clamp_exact(pe, &target, stiffness);
            }
        }
    }

    /// Brings a diffusing position back when it escaped: mirror across the
    /// boundary, falling back onto the boundary for deep excursions.
    fn bounce(&self, w: &mut Vec3) {
        if !self.inside(w) {
            let p = self.project(w);
            let m = p * 2.0 - *w;
            *w = if self.inside(&m) { m } else { p };
        }
    }
}

/// A ball of given radius centered at the origin.
#[derive(Clone, Debug)]
pub struct SpaceSphere {
    pub radius: f64,
}

impl SpaceSphere {
    pub fn new(radius: f64) -> SpaceSphere {
        assert!(radius > 0.0);
        SpaceSphere { radius }
    }
}

impl Space for SpaceSphere {
    fn extension(&self) -> Vec3 {
        Vec3::new(self.radius, self.radius, self.radius)
    }

    fn volume(&self) -> f64 {
        4.0 / 3.0 * std::f64::consts::PI * self.radius.powi(3)
    }

    fn inside(&self, w: &Vec3) -> bool {
        w.norm_sqr() <= self.radius * self.radius
    }

    fn project(&self, w: &Vec3) -> Vec3 {
        let n = w.norm();
        if n > 0.0 {
            *w * (self.radius / n)
        } else {
            Vec3::new(self.radius, 0.0, 0.0)
        }
    }

    fn random_place(&self, rng: &mut SimRng) -> Vec3 {
        rng.ball_vector() * self.radius
    }

    fn normal_to_edge(&self, w: &Vec3) -> Vec3 {
        w.normalized()
    }
}

/// A cylinder along the X axis: `|x| <= half_length`, `y^2+z^2 <= radius^2`.
#[derive(Clone, Debug)]
pub struct SpaceCylinder {
    pub half_length: f64,
    pub radius: f64,
}

impl SpaceCylinder {
    pub fn new(half_length: f64, radius: f64) -> SpaceCylinder {
        assert!(half_length > 0.0 && radius > 0.0);
        SpaceCylinder { half_length, radius }
    }
}

impl Space for SpaceCylinder {
    fn extension(&self) -> Vec3 {
        Vec3::new(self.half_length, self.radius, self.radius)
    }

    fn volume(&self) -> f64 {
        2.0 * self.half_length * std::f64::consts::PI * self.radius * self.radius
    }

    fn inside(&self, w: &Vec3) -> bool {
        w.x.abs() <= self.half_length && w.y * w.y + w.z * w.z <= self.radius * self.radius
    }

    fn project(&self, w: &Vec3) -> Vec3 {
        let rad = (w.y * w.y + w.z * w.z).sqrt();
        let x = w.x.clamp(-self.half_length, self.half_length);

        if w.x.abs() <= self.half_length && rad <= self.radius {
            // inside: choose the closest of the side wall and the caps
            let to_side = self.radius - rad;
            let to_cap = self.half_length - w.x.abs();
            if to_side <= to_cap && rad > 0.0 {
                let s = self.radius / rad;
                return Vec3::new(w.x, w.y * s, w.z * s);
            }
            let cap = if w.x >= 0.0 { self.half_length } else { -self.half_length };
            return Vec3::new(cap, w.y, w.z);
        }

        // outside: clamp onto the finite cylinder
        if rad > self.radius {
            let s = self.radius / rad;
            Vec3::new(x, w.y * s, w.z * s)
        } else {
            Vec3::new(x, w.y, w.z)
        }
    }

    fn random_place(&self, rng: &mut SimRng) -> Vec3 {
        loop {
            let y = self.radius * rng.sreal();
            let z = self.radius * rng.sreal();
            if y * y + z * z <= self.radius * self.radius {
                return Vec3::new(self.half_length * rng.sreal(), y, z);
            }
        }
    }
}

/// An axis-aligned box centered at the origin.
#[derive(Clone, Debug)]
pub struct SpaceBox {
    pub half: Vec3,
}

impl SpaceBox {
    pub fn new(half: Vec3) -> SpaceBox {
        assert!(half.x > 0.0 && half.y > 0.0 && half.z > 0.0);
        SpaceBox { half }
    }
}

impl Space for SpaceBox {
    fn extension(&self) -> Vec3 {
        self.half
    }

    fn volume(&self) -> f64 {
        8.0 * self.half.x * self.half.y * self.half.z
    }

    fn inside(&self, w: &Vec3) -> bool {
        w.x.abs() <= self.half.x && w.y.abs() <= self.half.y && w.z.abs() <= self.half.z
    }

    fn project(&self, w: &Vec3) -> Vec3 {
        if !self.inside(w) {
            return Vec3::new(
                w.x.clamp(-self.half.x, self.half.x),
                w.y.clamp(-self.half.y, self.half.y),
                w.z.clamp(-self.half.z, self.half.z),
            );
        }
        // inside: push to the nearest face
        let mut p = *w;
        let mut best = f64::INFINITY;
        let mut axis = 0;
        let mut side = 1.0;
        for d in 0..3 {
            let h = self.half[d];
            if h - w[d] < best {
                best = h - w[d];
                axis = d;
                side = 1.0;
            }
            if w[d] + h < best {
                best = w[d] + h;
                axis = d;
                side = -1.0;
            }
        }
        p[axis] = side * self.half[axis];
        return p;
    }

    fn random_place(&self, rng: &mut SimRng) -> Vec3 {
        Vec3::new(
            self.half.x * rng.sreal(),
            self.half.y * rng.sreal(),
            self.half.z * rng.sreal(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_projection() {
        let sp = SpaceSphere::new(2.0);
        let p = sp.project(&Vec3::new(4.0, 0.0, 0.0));
        assert!(p.distance(&Vec3::new(2.0, 0.0, 0.0)) < 1e-12);
        assert!(sp.inside(&Vec3::new(1.0, 1.0, 1.0)));
        assert!(!sp.inside(&Vec3::new(2.0, 2.0, 0.0)));
    }

    #[test]
    fn cylinder_projection_outside() {
        let cy = SpaceCylinder::new(3.0, 1.0);
        let p = cy.project(&Vec3::new(0.0, 2.0, 0.0));
        assert!(p.distance(&Vec3::new(0.0, 1.0, 0.0)) < 1e-12);
        let p = cy.project(&Vec3::new(5.0, 0.5, 0.0));
        assert!(p.distance(&Vec3::new(3.0, 0.5, 0.0)) < 1e-12);
    }

    #[test]
    fn bounce_returns_inside() {
        let sp = SpaceSphere::new(1.0);
        let mut w = Vec3::new(1.2, 0.0, 0.0);
        sp.bounce(&mut w);
        assert!(sp.inside(&w));
    }

    #[test]
    fn random_place_inside() {
        let sp = SpaceBox::new(Vec3::new(1.0, 2.0, 0.5));
        let mut rng = SimRng::seeded(9);
        for _ in 0..100 {
            assert!(sp.inside(&sp.random_place(&mut rng)));
        }
    }
}
