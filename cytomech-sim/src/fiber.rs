use std::sync::Arc;

use cytomech_numerical::{SimRng, Vec3};
use log::trace;

use crate::hand::HandRef;
use crate::mecable::{chunked_capacity, Mecable};
use crate::point_ref::{PointExact, PointInterpolated};
use crate::properties::{FiberDynamicsProp, FiberFate, FiberProp};

/// One of the two ends of a fiber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FiberEnd {
    Minus,
    Plus,
}

/// Assembly state of a fiber end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EndState {
    /// growing
    Green,
    /// shrinking
    Red,
    /// static
    #[default]
    White,
}

/// Mutable state of the assembly dynamics, matching the class of the
/// dynamics declared in the fiber property.
#[derive(Clone, Debug, Default)]
pub enum DynamicState {
    #[default]
    Static,
    Classic {
        state: EndState,
        /// length increment of the last step, in um
        growth: f64,
    },
    TwoState {
        /// the freshness of the two terminal units
        units: [u8; 2],
        /// Gillespie clocks for growth and hydrolysis, in units of events
        next_growth: f64,
        next_hydrol: f64,
        growth: f64,
    },
    Treadmill {
        plus: EndState,
        minus: EndState,
        growth_plus: f64,
        growth_minus: f64,
    },
}

/// What the caller should do with the fiber after a dynamics step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FiberAction {
    Keep,
    Destroy,
}

/// An inextensible jointed chain with bending elasticity.
///
/// The vertices are stored contiguously as `[x0,y0,z0, x1,...]`; consecutive
/// vertices are kept at the same distance `cut`, the current segment length.
/// An abscissa axis runs along the chain with its origin fixed in material
/// coordinates: `abs_minus` is the abscissa of vertex 0 and only changes
/// when the minus end grows or shrinks, so bound hands keep their position.
pub struct Fiber {
    pub prop: Arc<FiberProp>,
    points: Vec<f64>,
    n_points: usize,
    /// current (uniform) segment length
    cut: f64,
    /// abscissa of the minus end
    abs_minus: f64,
    /// hands currently attached to this fiber
    pub binders: Vec<HandRef>,
    pub dynamic: DynamicState,
    mat_index: usize,
    /// deferred deletion mark, swept at the end of the step
    pub marked: bool,
}

impl Fiber {
    /// A straight fiber starting at `pos` (minus end), in direction `dir`.
    pub fn new(prop: Arc<FiberProp>, pos: Vec3, dir: Vec3, length: f64) -> Fiber {
        assert!(length > 0.0);
        let n_seg = (length / prop.segmentation).round().max(1.0) as usize;
        let cut = length / n_seg as f64;
        let dir = dir.normalized();
        let n_points = n_seg + 1;

        let mut points = Vec::with_capacity(chunked_capacity(3 * n_points));
        points.resize(3 * n_points, 0.0);
        for i in 0..n_points {
            let p = pos + dir * (cut * i as f64);
            p.store(&mut points[3 * i..3 * i + 3]);
        }

        let dynamic = match prop.dynamics {
            FiberDynamicsProp::Static => DynamicState::Static,
            FiberDynamicsProp::Classic { .. } => DynamicState::Classic { state: EndState::Green, growth: 0.0 },
            FiberDynamicsProp::TwoState { .. } => DynamicState::TwoState {
                units: [1, 1],
                // clocks are armed lazily with the first exponential draws
                next_growth: -1.0,
                next_hydrol: -1.0,
                growth: 0.0,
            },
            FiberDynamicsProp::Treadmill { .. } => DynamicState::Treadmill {
                plus: EndState::Green,
                minus: EndState::Green,
                growth_plus: 0.0,
                growth_minus: 0.0,
            },
        };

        Fiber {
            prop,
            points,
            n_points,
            cut,
            abs_minus: 0.0,
            binders: Vec::new(),
            dynamic,
            mat_index: 0,
            marked: false,
        }
    }

    // ---------- geometry

    pub fn n_segments(&self) -> usize {
        self.n_points - 1
    }

    pub fn segmentation(&self) -> f64 {
        self.cut
    }

    pub fn length(&self) -> f64 {
        self.cut * self.n_segments() as f64
    }

    pub fn abscissa_m(&self) -> f64 {
        self.abs_minus
    }

    pub fn abscissa_p(&self) -> f64 {
        self.abs_minus + self.length()
    }

    pub fn set_point(&mut self, i: usize, w: &Vec3) {
        w.store(&mut self.points[3 * i..3 * i + 3]);
    }

    /// Unit direction of segment `i`, pointing towards the plus end.
    pub fn dir_segment(&self, i: usize) -> Vec3 {
        (self.point(i + 1) - self.point(i)).normalized()
    }

    /// Outward direction at an end.
    pub fn dir_end(&self, end: FiberEnd) -> Vec3 {
        match end {
            FiberEnd::Plus => self.dir_segment(self.n_segments() - 1),
            FiberEnd::Minus => -self.dir_segment(0),
        }
    }

    pub fn pos_end(&self, end: FiberEnd) -> Vec3 {
        match end {
            FiberEnd::Plus => self.point(self.n_points - 1),
            FiberEnd::Minus => self.point(0),
        }
    }

    pub fn abscissa_end(&self, end: FiberEnd) -> f64 {
        match end {
            FiberEnd::Plus => self.abscissa_p(),
            FiberEnd::Minus => self.abscissa_m(),
        }
    }

    /// Clamps an abscissa into the valid range of the fiber.
    pub fn clamped_abscissa(&self, abs: f64) -> f64 {
        abs.clamp(self.abscissa_m(), self.abscissa_p())
    }

    pub fn within_range(&self, abs: f64) -> bool {
        abs >= self.abscissa_m() && abs <= self.abscissa_p()
    }

    /// Segment index and coefficient for an abscissa.
    pub fn segment_of(&self, abs: f64) -> (usize, f64) {
        let s = (abs - self.abs_minus) / self.cut;
        let max_seg = self.n_segments() - 1;
        let i = (s.floor().max(0.0) as usize).min(max_seg);
        let c = (s - i as f64).clamp(0.0, 1.0);
        (i, c)
    }

    /// Position on the fiber at an abscissa (clamped into range).
    pub fn pos_at(&self, abs: f64) -> Vec3 {
        let (i, c) = self.segment_of(self.clamped_abscissa(abs));
        self.point(i) * (1.0 - c) + self.point(i + 1) * c
    }

    /// Unit direction of the fiber at an abscissa.
    pub fn dir_at(&self, abs: f64) -> Vec3 {
        let (i, _) = self.segment_of(self.clamped_abscissa(abs));
        self.dir_segment(i)
    }

    /// Interpolation carrying the global matrix indices, for the assembler.
    pub fn interpolate(&self, abs: f64) -> PointInterpolated {
        let (i, c) = self.segment_of(self.clamped_abscissa(abs));
        PointInterpolated::new(self.mat_index + i, self.mat_index + i + 1, c, self.point(i), self.point(i + 1))
    }

    /// The terminal model point, for forces applied at an end.
    pub fn exact_end(&self, end: FiberEnd) -> PointExact {
        match end {
            FiberEnd::Plus => PointExact::new(self.mat_index + self.n_points - 1, self.point(self.n_points - 1)),
            FiberEnd::Minus => PointExact::new(self.mat_index, self.point(0)),
        }
    }

    pub fn exact_point(&self, i: usize) -> PointExact {
        PointExact::new(self.mat_index + i, self.point(i))
    }

    // ---------- binder bookkeeping

    pub fn add_binder(&mut self, h: HandRef) {
        debug_assert!(!self.binders.contains(&h));
        self.binders.push(h);
    }

    pub fn remove_binder(&mut self, h: HandRef) {
        if let Some(k) = self.binders.iter().position(|b| *b == h) {
            self.binders.swap_remove(k);
        } else {
            debug_assert!(false, "removing a hand that is not a registered binder");
        }
    }

    // ---------- length changes

    /// Position along the chain at arc coordinate `arc` from vertex 0,
    /// extrapolating colinearly beyond the ends.
    fn sample_at(&self, arc: f64) -> Vec3 {
        let len = self.length();
        if arc <= 0.0 {
            return self.point(0) + self.dir_segment(0) * arc;
        }
        if arc >= len {
            let last = self.n_segments() - 1;
            return self.point(self.n_points - 1) + self.dir_segment(last) * (arc - len);
        }
        let s = arc / self.cut;
        let i = (s.floor() as usize).min(self.n_segments() - 1);
        let c = s - i as f64;
        self.point(i) * (1.0 - c) + self.point(i + 1) * c
    }

    /// Resamples the chain over the arc range `[a, b]` of the current
    /// parametrization, with `n_seg` equal segments.
    fn resample(&mut self, a: f64, b: f64, n_seg: usize) {
        assert!(b > a && n_seg >= 1);
        let n_points = n_seg + 1;
        let step = (b - a) / n_seg as f64;
        let mut fresh = Vec::with_capacity(chunked_capacity(3 * n_points));
        for i in 0..n_points {
            let w = self.sample_at(a + step * i as f64);
            fresh.push(w.x);
            fresh.push(w.y);
            fresh.push(w.z);
        }
        self.points = fresh;
        self.n_points = n_points;
        self.cut = step;
    }

    /// Number of segments that keeps the cut within its tolerated band
    /// around the target segmentation.
    fn fitting_segments(&self, len: f64) -> usize {
        let target = self.prop.segmentation;
        let n = self.n_segments();
        let cut = len / n as f64;
        if cut > 1.4 * target || cut < 0.6 * target {
            ((len / target).round().max(1.0)) as usize
        } else {
            n
        }
    }

    /// Changes the length at an end by `delta` (negative shrinks),
    /// preserving the shape of the rest of the chain.
    pub fn grow(&mut self, end: FiberEnd, delta: f64) {
        if delta == 0.0 {
            return;
        }
        let len = self.length();
        let new_len = (len + delta).max(1e-3);
        let n_seg = self.fitting_segments(new_len);
        match end {
            FiberEnd::Plus => {
                self.resample(0.0, new_len, n_seg);
            }
            FiberEnd::Minus => {
                let d = new_len - len;
                self.resample(-d, len, n_seg);
                self.abs_minus -= d;
            }
        }
        if n_seg != self.n_points - 1 {
            trace!("fiber resegmented to {} segments, cut {:.4}", n_seg, self.cut);
        }
    }

    /// Restores exact segment lengths after an integration step.
    ///
    /// A forward sweep rescales each segment onto `cut`; the centroid
    /// displacement introduced by the sweep is then removed.
    pub fn reshape(&mut self) {
        let n = self.n_points;
        if n < 2 {
            return;
        }
        let before = self.centroid();
        for i in 0..n - 1 {
            let p = self.point(i);
            let d = self.point(i + 1) - p;
            let norm = d.norm();
            if norm > 0.0 {
                let q = p + d * (self.cut / norm);
                self.set_point(i + 1, &q);
            }
        }
        let shift = before - self.centroid();
        for i in 0..n {
            let w = self.point(i) + shift;
            self.set_point(i, &w);
        }
    }

    pub fn centroid(&self) -> Vec3 {
        let mut c = Vec3::zero();
        for i in 0..self.n_points {
            c += self.point(i);
        }
        c / self.n_points as f64
    }

    /// Discrete bending energy of the chain.
    pub fn bending_energy(&self) -> f64 {
        if self.n_points < 3 || self.prop.rigidity <= 0.0 {
            return 0.0;
        }
        let w = self.prop.rigidity / self.cut.powi(3);
        let mut e = 0.0;
        for i in 1..self.n_points - 1 {
            let d = self.point(i - 1) - self.point(i) * 2.0 + self.point(i + 1);
            e += d.norm_sqr();
        }
        return 0.5 * w * e;
    }

    /// Translational drag coefficient of the whole filament.
    ///
    /// Slender-body approximation for a cylinder of length L and diameter d:
    /// `3.pi.viscosity.L / ( ln(L/d) + 0.312 )`, with the logarithm clamped
    /// for very short filaments.
    pub fn drag_coefficient(&self, viscosity: f64) -> f64 {
        let len = self.length();
        let slender = (len / (2.0 * self.prop.drag_radius)).max(1.05_f64);
        let denom = (slender.ln() + 0.312).max(0.1);
        3.0 * std::f64::consts::PI * viscosity * len / denom
    }

    // ---------- assembly dynamics

    /// Applies the stochastic assembly dynamics of the fiber ends.
    ///
    /// `force_plus` and `force_minus` are the components of the force on the
    /// terminal points, projected on the outward direction of each end
    /// (negative values oppose growth). Called after the mechanical step, so
    /// the chain geometry is quiescent. Returns [`FiberAction::Destroy`]
    /// when the configured fate of a collapsed fiber asks for removal.
    pub fn step_dynamics(&mut self, force_plus: f64, force_minus: f64, dt: f64, rng: &mut SimRng, fate: FiberFate) -> FiberAction {
        let prop = self.prop.clone();
        // the state is taken out so the chain can be modified while the
        // end-state variables are borrowed
        let mut dynamic = std::mem::take(&mut self.dynamic);
        let action = match (&prop.dynamics, &mut dynamic) {
            (FiberDynamicsProp::Static, DynamicState::Static) => FiberAction::Keep,

            (
                FiberDynamicsProp::Classic {
                    growing_speed,
                    growing_force,
                    catastrophe_rate,
                    rescue_rate,
                    shrinking_speed,
                    free_polymer,
                },
                DynamicState::Classic { state, growth },
            ) => {
                let mut action = FiberAction::Keep;
                match *state {
                    EndState::White => {}
                    EndState::Green => {
                        let spd = growing_speed[0] * free_polymer * dt;
                        // antagonistic force reduces assembly exponentially
                        *growth = if force_plus < 0.0 && growing_force.is_finite() {
                            spd * (force_plus / growing_force).exp() + growing_speed[1] * dt
                        } else {
                            spd + growing_speed[1] * dt
                        };
                        self.grow(FiberEnd::Plus, *growth);

                        // 1/rate is linear in the growth speed
                        let a = 1.0 / catastrophe_rate[1];
                        let b = if growing_speed[0] * dt > 0.0 {
                            (1.0 / catastrophe_rate[0] - a) / (growing_speed[0] * dt)
                        } else {
                            0.0
                        };
                        let cata_dt = dt / (a + b * *growth).max(1e-10);
                        if rng.test(cata_dt) {
                            *state = EndState::Red;
                        }
                    }
                    EndState::Red => {
                        *growth = shrinking_speed * dt;
                        if self.length() + *growth <= prop.min_length {
                            match fate {
                                FiberFate::None => {}
                                FiberFate::Destroy => action = FiberAction::Destroy,
                                FiberFate::Rescue => *state = EndState::Green,
                            }
                        } else {
                            self.grow(FiberEnd::Plus, *growth);
                        }
                        if rng.test(rescue_rate * dt) {
                            *state = EndState::Green;
                        }
                    }
                }
                action
            }

            (
                FiberDynamicsProp::TwoState {
                    unit_length,
                    growing_rate,
                    growing_force,
                    hydrolysis_rate,
                    shrinking_rate,
                    free_polymer,
                },
                DynamicState::TwoState { units, next_growth, next_hydrol, growth },
            ) => {
                if *next_growth < 0.0 {
                    *next_growth = rng.exponential();
                    *next_hydrol = rng.exponential();
                }

                // assembly scales with free monomer; antagonistic force
                // reduces it exponentially
                let spd = growing_rate[0] * free_polymer * dt;
                let rate = if force_plus < 0.0 && growing_force.is_finite() {
                    spd * (force_plus / growing_force).exp() + growing_rate[1] * dt
                } else {
                    spd + growing_rate[1] * dt
                };
                let shrinking = units[0] == 0 && units[1] == 0;
                let growth_r = if shrinking { shrinking_rate * dt } else { rate };
                let hydrol_r = 2.0 * hydrolysis_rate * dt;

                // two clocks compete: unit addition/removal and hydrolysis
                let mut added: i64 = 0;
                *next_growth -= growth_r;
                *next_hydrol -= hydrol_r;
                while *next_growth <= 0.0 || *next_hydrol <= 0.0 {
                    if *next_growth * hydrol_r < *next_hydrol * growth_r {
                        if units[0] == 0 && units[1] == 0 {
                            added -= 1;
                        } else {
                            units[1] = units[0];
                            units[0] = 1;
                            added += 1;
                        }
                        *next_growth += rng.exponential();
                    } else {
                        if rng.flip() {
                            units[0] = 0;
                        } else {
                            units[1] = 0;
                        }
                        *next_hydrol += rng.exponential();
                    }
                }

                *growth = added as f64 * unit_length;
                let mut action = FiberAction::Keep;
                if added != 0 {
                    if self.length() + *growth < prop.min_length {
                        match fate {
                            FiberFate::None => {}
                            FiberFate::Destroy => action = FiberAction::Destroy,
                            FiberFate::Rescue => {
                                *units = [1, 1];
                            }
                        }
                    } else {
                        self.grow(FiberEnd::Plus, *growth);
                    }
                }
                action
            }

            (
                FiberDynamicsProp::Treadmill {
                    plus_speed,
                    minus_speed,
                    growing_force,
                    catastrophe_rate,
                    rescue_rate,
                    plus_shrink,
                    minus_shrink,
                },
                DynamicState::Treadmill { plus, minus, growth_plus, growth_minus },
            ) => {
                let mut destroy = false;
                // the two ends assemble independently
                for (end, state, growth, speed, shrink, force, fscale) in [
                    (FiberEnd::Plus, plus, growth_plus, plus_speed, plus_shrink, force_plus, growing_force[0]),
                    (FiberEnd::Minus, minus, growth_minus, minus_speed, minus_shrink, force_minus, growing_force[1]),
                ] {
                    match *state {
                        EndState::White => {}
                        EndState::Green => {
                            *growth = if force < 0.0 && fscale.is_finite() {
                                speed * dt * (force / fscale).exp()
                            } else {
                                speed * dt
                            };
                            self.grow(end, *growth);
                            if rng.test(catastrophe_rate * dt) {
                                *state = EndState::Red;
                            }
                        }
                        EndState::Red => {
                            *growth = shrink * dt;
                            if self.length() + *growth <= prop.min_length {
                                destroy = fate == FiberFate::Destroy;
                                if fate == FiberFate::Rescue {
                                    *state = EndState::Green;
                                }
                            } else {
                                self.grow(end, *growth);
                            }
                            if rng.test(rescue_rate * dt) {
                                *state = EndState::Green;
                            }
                        }
                    }
                }
                if destroy {
                    FiberAction::Destroy
                } else {
                    FiberAction::Keep
                }
            }

            _ => unreachable!("dynamic state does not match the fiber class"),
        };
        self.dynamic = dynamic;
        return action;
    }

    /// Assembly state of an end.
    pub fn end_state(&self, end: FiberEnd) -> EndState {
        match &self.dynamic {
            DynamicState::Static => EndState::White,
            DynamicState::Classic { state, .. } => {
                if end == FiberEnd::Plus {
                    *state
                } else {
                    EndState::White
                }
            }
            DynamicState::TwoState { units, .. } => {
                if end == FiberEnd::Plus {
                    if units[0] == 0 && units[1] == 0 {
                        EndState::Red
                    } else {
                        EndState::Green
                    }
                } else {
                    EndState::White
                }
            }
            DynamicState::Treadmill { plus, minus, .. } => {
                if end == FiberEnd::Plus {
                    *plus
                } else {
                    *minus
                }
            }
        }
    }

    pub fn set_end_state(&mut self, end: FiberEnd, s: EndState) {
        match &mut self.dynamic {
            DynamicState::Classic { state, .. } => {
                if end == FiberEnd::Plus {
                    *state = s;
                }
            }
            DynamicState::Treadmill { plus, minus, .. } => {
                if end == FiberEnd::Plus {
                    *plus = s;
                } else {
                    *minus = s;
                }
            }
            _ => {}
        }
    }
}

impl Mecable for Fiber {
    fn n_points(&self) -> usize {
        self.n_points
    }

    fn point(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.points[3 * i..3 * i + 3])
    }

    fn put_points(&self, dst: &mut [f64]) {
        dst[..3 * self.n_points].copy_from_slice(&self.points[..3 * self.n_points]);
    }

    fn get_points(&mut self, src: &[f64]) {
        self.points[..3 * self.n_points].copy_from_slice(&src[..3 * self.n_points]);
        self.reshape();
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
    use crate::properties::FiberProp;

    fn straight(len: f64, seg: f64) -> Fiber {
        let mut prop = FiberProp::new("test");
        prop.segmentation = seg;
        Fiber::new(Arc::new(prop), Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), len)
    }

    #[test]
    fn construction_is_uniform() {
        let fib = straight(5.0, 0.5);
        assert_eq!(fib.n_segments(), 10);
        for i in 0..fib.n_segments() {
            let d = fib.point(i + 1).distance(&fib.point(i));
            assert!((d - 0.5).abs() < 1e-12);
        }
        assert!((fib.length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn abscissa_interpolation() {
        let fib = straight(2.0, 0.5);
        let w = fib.pos_at(0.75);
        assert!(w.distance(&Vec3::new(0.75, 0.0, 0.0)) < 1e-12);
        let ip = fib.interpolate(0.75);
        assert_eq!(ip.index1, 1);
        assert!((ip.coef - 0.5).abs() < 1e-12);
    }

    #[test]
    fn growth_extends_plus_end() {
        let mut fib = straight(2.0, 0.5);
        fib.grow(FiberEnd::Plus, 0.1);
        assert!((fib.length() - 2.1).abs() < 1e-12);
        assert_eq!(fib.abscissa_m(), 0.0);
        // plus end moved colinearly
        assert!(fib.pos_end(FiberEnd::Plus).distance(&Vec3::new(2.1, 0.0, 0.0)) < 1e-12);
    }

    #[test]
    fn growth_at_minus_end_shifts_origin() {
        let mut fib = straight(2.0, 0.5);
        fib.grow(FiberEnd::Minus, 0.2);
        assert!((fib.length() - 2.2).abs() < 1e-12);
        assert!((fib.abscissa_m() + 0.2).abs() < 1e-12);
        // the old material point at abscissa 0 is still at the origin
        assert!(fib.pos_at(0.0).distance(&Vec3::zero()) < 1e-9);
    }

    #[test]
    fn resegmentation_keeps_cut_in_band() {
        let mut fib = straight(2.0, 0.5);
        let n0 = fib.n_segments();
        // grow a lot in small increments
        for _ in 0..200 {
            fib.grow(FiberEnd::Plus, 0.01);
        }
        assert!(fib.n_segments() > n0);
        let cut = fib.segmentation();
        assert!(cut < 1.4 * 0.5 && cut > 0.6 * 0.5);
        for i in 0..fib.n_segments() {
            let d = fib.point(i + 1).distance(&fib.point(i));
            assert!((d - cut).abs() < 1e-9);
        }
    }

    #[test]
    fn reshape_restores_segment_lengths() {
        let mut fib = straight(2.0, 0.5);
        // perturb the points
        for i in 0..fib.n_points() {
            let w = fib.point(i) + Vec3::new(0.0, 0.01 * (i as f64), -0.02 * ((i % 2) as f64));
            fib.set_point(i, &w);
        }
        fib.reshape();
        let cut = fib.segmentation();
        for i in 0..fib.n_segments() {
            let d = fib.point(i + 1).distance(&fib.point(i));
            assert!((d - cut).abs() < 1e-12, "segment {} has length {}", i, d);
        }
    }

    #[test]
    fn bending_energy_zero_for_straight_chain() {
        let fib = straight(3.0, 0.3);
        assert!(fib.bending_energy() < 1e-20);
    }
}
