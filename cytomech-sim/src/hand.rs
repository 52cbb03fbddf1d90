use std::sync::Arc;

use cytomech_numerical::{SimRng, Vec3};

use crate::fiber::Fiber;
use crate::properties::{HandActivity, HandProp};

/// Back-reference from a fiber to a bound hand: the owner object and,
/// for a couple, which of its two hands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandRef {
    Single(usize),
    Couple(usize, u8),
}

/// A binding site that can attach to a fiber and detach from it.
///
/// When bound, the hand is located by `(fiber, abscissa)`; the interpolation
/// onto the fiber vertices is derived on demand, so it can never drift out
/// of sync with the chain. Invariant while bound: the abscissa lies within
/// the abscissa range of the fiber.
pub struct Hand {
    pub prop: Arc<HandProp>,
    fiber: Option<usize>,
    abscissa: f64,
}

impl Hand {
    pub fn new(prop: Arc<HandProp>) -> Hand {
        Hand { prop, fiber: None, abscissa: 0.0 }
    }

    pub fn attached(&self) -> bool {
        self.fiber.is_some()
    }

    pub fn fiber(&self) -> Option<usize> {
        self.fiber
    }

    pub fn abscissa(&self) -> f64 {
        self.abscissa
    }

    /// Position of the hand on its fiber.
    pub fn pos(&self, fib: &Fiber) -> Vec3 {
        debug_assert!(self.attached());
        fib.pos_at(self.abscissa)
    }

    /// Direction of the fiber under the hand, towards the plus end.
    pub fn dir(&self, fib: &Fiber) -> Vec3 {
        debug_assert!(self.attached());
        fib.dir_at(self.abscissa)
    }

    /// Binds to `fib` at the given abscissa and registers the binder.
    pub fn attach(&mut self, fib: &mut Fiber, fiber_id: usize, abs: f64, me: HandRef) {
        debug_assert!(!self.attached());
        self.fiber = Some(fiber_id);
        self.abscissa = fib.clamped_abscissa(abs);
        fib.add_binder(me);
    }

    /// Releases the fiber and unregisters the binder.
    pub fn detach(&mut self, fib: &mut Fiber, me: HandRef) {
        debug_assert!(self.attached());
        fib.remove_binder(me);
        self.fiber = None;
    }

    /// One step of a bound hand without load. Returns false if it detached.
    pub fn step_unloaded(&mut self, fib: &mut Fiber, me: HandRef, dt: f64, rng: &mut SimRng) -> bool {
        if rng.test(self.prop.unbinding_prob) {
            self.detach(fib, me);
            return false;
        }
        if let HandActivity::Move { unloaded_speed, .. } = self.prop.activity {
            return self.travel(fib, me, unloaded_speed * dt);
        }
        return true;
    }

    /// One step of a bound hand under the force `force`.
    /// Returns false if it detached.
    ///
    /// Detachment follows the force-accelerated law
    /// `p = 1 - exp( -dt * unbinding_rate * exp(|F| / unbinding_force) )`.
    pub fn step_loaded(&mut self, fib: &mut Fiber, me: HandRef, force: Vec3, dt: f64, rng: &mut SimRng) -> bool {
        let p = if self.prop.unbinding_force.is_finite() {
            let rate = self.prop.unbinding_rate * (force.norm() / self.prop.unbinding_force).exp();
            1.0 - (-dt * rate).exp()
        } else {
            self.prop.unbinding_prob
        };
        if rng.test(p) {
            self.detach(fib, me);
            return false;
        }

        if let HandActivity::Move { unloaded_speed, stall_force } = self.prop.activity {
            // linear force-velocity: the load is the force component along
            // the direction of motion
            let load = force.dot(&self.dir(fib)) * unloaded_speed.signum();
            let mut dabs = unloaded_speed * dt * (1.0 + load / stall_force);
            // clamp between zero and twice the unloaded speed
            let cap = 2.0 * unloaded_speed * dt;
            if unloaded_speed >= 0.0 {
                dabs = dabs.clamp(0.0, cap);
            } else {
                dabs = dabs.clamp(cap, 0.0);
            }
            return self.travel(fib, me, dabs);
        }
        return true;
    }

    /// Moves along the fiber, handling arrival at an end.
    fn travel(&mut self, fib: &mut Fiber, me: HandRef, dabs: f64) -> bool {
        self.abscissa += dabs;
        self.keep_in_range(fib, me)
    }

    /// Restores the range invariant after the hand or the fiber moved.
    ///
    /// A hand carried past an end either holds on to the tip or detaches,
    /// according to its class.
    pub fn keep_in_range(&mut self, fib: &mut Fiber, me: HandRef) -> bool {
        if fib.within_range(self.abscissa) {
            return true;
        }
        if self.prop.hold_fiber_end {
            self.abscissa = fib.clamped_abscissa(self.abscissa);
            return true;
        }
        self.detach(fib, me);
        return false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::FiberProp;
    use std::sync::Arc;

    fn test_fiber() -> Fiber {
        let mut prop = FiberProp::new("f");
        prop.segmentation = 0.5;
        Fiber::new(Arc::new(prop), Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), 2.0)
    }

    fn test_hand(speed: f64) -> Hand {
        let mut hp = HandProp::new("h");
        hp.unbinding_rate = 0.0;
        hp.unbinding_prob = 0.0;
        if speed != 0.0 {
            hp.activity = HandActivity::Move { unloaded_speed: speed, stall_force: 5.0 };
        }
        Hand::new(Arc::new(hp))
    }

    #[test]
    fn attach_and_detach_update_binders() {
        let mut fib = test_fiber();
        let mut hand = test_hand(0.0);
        let me = HandRef::Single(0);
        hand.attach(&mut fib, 0, 0.7, me);
        assert!(hand.attached());
        assert_eq!(fib.binders.len(), 1);
        hand.detach(&mut fib, me);
        assert!(!hand.attached());
        assert!(fib.binders.is_empty());
    }

    #[test]
    fn motor_walks_to_plus_end_and_detaches() {
        let mut fib = test_fiber();
        let mut hand = test_hand(1.0);
        let me = HandRef::Single(0);
        let mut rng = SimRng::seeded(3);
        hand.attach(&mut fib, 0, 1.9, me);
        // 1.0 um/s for 0.2 s reaches past the plus end at 2.0
        let mut attached = true;
        for _ in 0..20 {
            attached = hand.step_unloaded(&mut fib, me, 0.01, &mut rng);
            if !attached {
                break;
            }
        }
        assert!(!attached);
        assert!(fib.binders.is_empty());
    }

    #[test]
    fn holding_hand_stays_at_tip() {
        let mut fib = test_fiber();
        let mut hp = HandProp::new("h");
        hp.unbinding_prob = 0.0;
        hp.hold_fiber_end = true;
        hp.activity = HandActivity::Move { unloaded_speed: 1.0, stall_force: 5.0 };
        let mut hand = Hand::new(Arc::new(hp));
        let me = HandRef::Single(0);
        let mut rng = SimRng::seeded(3);
        hand.attach(&mut fib, 0, 1.95, me);
        for _ in 0..20 {
            assert!(hand.step_unloaded(&mut fib, me, 0.01, &mut rng));
        }
        assert!((hand.abscissa() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn stalled_motor_does_not_move() {
        let mut fib = test_fiber();
        let mut hand = test_hand(1.0);
        let me = HandRef::Single(0);
        let mut rng = SimRng::seeded(3);
        hand.attach(&mut fib, 0, 1.0, me);
        // force of -5 pN along the fiber stalls the motor exactly
        let force = Vec3::new(-5.0, 0.0, 0.0);
        hand.step_loaded(&mut fib, me, force, 0.01, &mut rng);
        assert!((hand.abscissa() - 1.0).abs() < 1e-12);
    }
}
