use std::sync::Arc;

use cytomech_numerical::Vec3;

use crate::fiber::Fiber;
use crate::hand::Hand;
use crate::meca::Meca;
use crate::point_ref::PointRef;
use crate::properties::{CoupleProp, CoupleSpecificity};

/// Attachment state of a couple, indexing the four state lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoupleState {
    /// both hands free
    FF = 0,
    /// first hand attached
    AF = 1,
    /// second hand attached
    FA = 2,
    /// both hands attached
    AA = 3,
}

impl CoupleState {
    pub fn from_hands(h1: bool, h2: bool) -> CoupleState {
        match (h1, h2) {
            (false, false) => CoupleState::FF,
            (true, false) => CoupleState::AF,
            (false, true) => CoupleState::FA,
            (true, true) => CoupleState::AA,
        }
    }
}

/// Two hands joined by an elastic element.
///
/// A free couple diffuses with its centroid `pos`; with one hand bound it
/// rides the fiber; with both bound it crosslinks two fibers and deposits
/// its link into the assembler.
pub struct Couple {
    pub prop: Arc<CoupleProp>,
    /// position of the free complex
    pub pos: Vec3,
    pub hand1: Hand,
    pub hand2: Hand,
}

impl Couple {
    pub fn new(prop: Arc<CoupleProp>, pos: Vec3) -> Couple {
        let hand1 = Hand::new(prop.hand1.clone());
        let hand2 = Hand::new(prop.hand2.clone());
        Couple { prop, pos, hand1, hand2 }
    }

    pub fn state(&self) -> CoupleState {
        CoupleState::from_hands(self.hand1.attached(), self.hand2.attached())
    }

    pub fn hand(&self, which: u8) -> &Hand {
        if which == 0 {
            &self.hand1
        } else {
            &self.hand2
        }
    }

    pub fn hand_mut(&mut self, which: u8) -> &mut Hand {
        if which == 0 {
            &mut self.hand1
        } else {
            &mut self.hand2
        }
    }

    /// Force exerted on hand1 by the link, with both hands attached.
    pub fn force1(&self, fib1: &Fiber, fib2: &Fiber) -> Vec3 {
        let r = self.hand2.pos(fib2) - self.hand1.pos(fib1);
        if self.prop.length > 0.0 {
            let n = r.norm();
            if n > 1e-12 {
                return r * (self.prop.stiffness * (n - self.prop.length) / n);
            }
            return Vec3::zero();
        }
        r * self.prop.stiffness
    }

    /// True if a second attachment at `(fib, abs)` is acceptable, given the
    /// position of the already-bound sister hand.
    pub fn allow_second_bond(&self, which: u8, fib: &Fiber, fiber_id: usize, abs: f64, other_fib: &Fiber) -> bool {
        let other = if which == 0 { &self.hand2 } else { &self.hand1 };
        debug_assert!(other.attached());

        // refuse a link that could not produce force
        if self.prop.stiff {
            if other.fiber() == Some(fiber_id) && (abs - other.abscissa()).abs() < 2.0 * fib.segmentation() {
                return false;
            }
        }

        match self.prop.specificity {
            CoupleSpecificity::None => true,
            CoupleSpecificity::Parallel => fib.dir_at(abs).dot(&other.dir(other_fib)) > 0.0,
            CoupleSpecificity::Antiparallel => fib.dir_at(abs).dot(&other.dir(other_fib)) < 0.0,
        }
    }

    /// Deposits the crosslink of a doubly-bound couple.
    pub fn set_interactions(&self, meca: &mut Meca, fib1: &Fiber, fib2: &Fiber) {
        debug_assert!(self.hand1.attached() && self.hand2.attached());
        let ia = fib1.interpolate(self.hand1.abscissa());
        let ib = fib2.interpolate(self.hand2.abscissa());
        if self.prop.length > 0.0 {
            meca.inter_side_link(&ia, &PointRef::Interpolated(ib), self.prop.length, self.prop.stiffness);
        } else {
            meca.inter_link(&PointRef::Interpolated(ia), &PointRef::Interpolated(ib), self.prop.stiffness);
        }
    }

    /// The position from which the free hands look for fibers.
    pub fn attach_origin(&self, fib1: Option<&Fiber>, fib2: Option<&Fiber>) -> Vec3 {
        match self.state() {
            CoupleState::FF => self.pos,
            CoupleState::AF => self.hand1.pos(fib1.expect("hand1 is attached")),
            CoupleState::FA => self.hand2.pos(fib2.expect("hand2 is attached")),
            CoupleState::AA => self.hand1.pos(fib1.expect("hand1 is attached")),
        }
    }
}
