use crate::matrix::Matrix3x3;
use crate::vec3::Vec3;

/// A rigid transformation: rotation around a center followed by a translation.
#[derive(Clone, Debug)]
pub struct Rototranslation {
    rot: Matrix3x3,
    center: Vec3,
    shift: Vec3,
}

impl Default for Rototranslation {
    fn default() -> Self {
        Rototranslation { rot: Matrix3x3::identity(), center: Vec3::zero(), shift: Vec3::zero() }
    }
}

impl Rototranslation {
    pub fn new(rot: Matrix3x3, center: Vec3, shift: Vec3) -> Rototranslation {
        Rototranslation { rot, center, shift }
    }

    /// Rotation by `angle` around the axis through `begin` and `end`.
    ///
    /// # Arguments
    /// * `begin` - rotation axis starts here
    /// * `end` - second point defining the axis of rotation
    /// * `angle` - angle of rotation in radians
    pub fn around_axis(begin: &Vec3, end: &Vec3, angle: f64) -> Rototranslation {
        let axis = (*end - *begin).normalized();
        Rototranslation {
            rot: Matrix3x3::rotation_around_axis(&axis, angle),
            center: *begin,
            shift: Vec3::zero(),
        }
    }

    pub fn rotation(&self) -> &Matrix3x3 {
        &self.rot
    }

    pub fn apply(&self, v: &Vec3) -> Vec3 {
        let mut w = *v;
        self.apply_mut(&mut w);
        return w;
    }

    pub fn apply_mut(&self, v: &mut Vec3) {
        *v = self.rot.mul_vec(&(*v - self.center)) + self.center + self.shift;
    }

    pub fn apply_inverse_mut(&self, v: &mut Vec3) {
        *v = self.rot.trans_mul_vec(&(*v - self.center - self.shift)) + self.center;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_vec3;

    #[test]
    fn axis_points_are_fixed() {
        let a = Vec3::new(1.0, 1.0, 0.0);
        let b = Vec3::new(1.0, 1.0, 5.0);
        let roto = Rototranslation::around_axis(&a, &b, 1.0);
        assert_eq_vec3!(roto.apply(&a), a, 1e-12);
        assert_eq_vec3!(roto.apply(&b), b, 1e-12);
    }

    #[test]
    fn inverse_undoes_transform() {
        let roto = Rototranslation::around_axis(&Vec3::new(0.0, 2.0, 1.0), &Vec3::new(1.0, 0.0, 0.0), -0.6);
        let v = Vec3::new(3.0, -1.0, 0.5);
        let mut w = roto.apply(&v);
        roto.apply_inverse_mut(&mut w);
        assert_eq_vec3!(w, v, 1e-12);
    }
}
