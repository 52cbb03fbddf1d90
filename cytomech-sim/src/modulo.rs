use cytomech_numerical::Vec3;

/// Periodic folding of positions, axis by axis.
///
/// An axis with a period folds coordinates into `[-period/2, period/2)`;
/// axes without a period are left untouched. One instance is shared by the
/// whole simulation through the context, so every distance calculation sees
/// the same boundary conditions.
#[derive(Clone, Debug, Default)]
pub struct Modulo {
    period: [Option<f64>; 3],
}

impl Modulo {
    pub fn new() -> Modulo {
        Modulo::default()
    }

    /// Periodic along every axis, with the given full periods.
    pub fn periodic(x: f64, y: f64, z: f64) -> Modulo {
        Modulo { period: [Some(x), Some(y), Some(z)] }
    }

    pub fn set_period(&mut self, axis: usize, period: Option<f64>) {
        self.period[axis] = period;
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.period[axis].is_some()
    }

    pub fn has_period(&self) -> bool {
        self.period.iter().any(|p| p.is_some())
    }

    /// Folds a displacement into the primary image.
    pub fn fold(&self, w: &mut Vec3) {
        for d in 0..3 {
            if let Some(p) = self.period[d] {
                let x = w[d];
                w[d] = x - p * (x / p).round();
            }
        }
    }

    pub fn folded(&self, w: &Vec3) -> Vec3 {
        let mut v = *w;
        self.fold(&mut v);
        return v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_into_primary_image() {
        let m = Modulo::periodic(10.0, 10.0, 10.0);
        let v = m.folded(&Vec3::new(12.0, -7.0, 4.9));
        assert!((v.x - 2.0).abs() < 1e-12);
        assert!((v.y - 3.0).abs() < 1e-12);
        assert!((v.z - 4.9).abs() < 1e-12);
    }

    #[test]
    fn open_axes_untouched() {
        let mut m = Modulo::new();
        m.set_period(0, Some(4.0));
        let v = m.folded(&Vec3::new(3.0, 100.0, -50.0));
        assert!((v.x + 1.0).abs() < 1e-12);
        assert_eq!(v.y, 100.0);
        assert_eq!(v.z, -50.0);
    }
}
