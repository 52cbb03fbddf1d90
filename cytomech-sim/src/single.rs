use std::sync::Arc;

use cytomech_numerical::Vec3;

use crate::fiber::Fiber;
use crate::hand::Hand;
use crate::meca::Meca;
use crate::point_ref::{PointExact, PointRef};
use crate::properties::SingleProp;

/// The object carrying the base point of a wrist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorObject {
    Bead(usize),
    Solid(usize),
    Sphere(usize),
}

/// A base point on another mecable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub object: AnchorObject,
    pub point: usize,
}

/// The base of a single: fixed in the world, or riding another mecable.
#[derive(Clone, Copy, Debug)]
pub enum SingleBase {
    /// absolute position, outside the mechanical system
    Picket(Vec3),
    /// a model point of another mecable
    Wrist(Anchor),
}

/// One hand tethered to a base.
///
/// The base never moves by itself: a picket is a fixed point of the world,
/// a wrist follows the mecable it is anchored on. When the hand is bound,
/// the tether deposits its restoring link into the assembler; with a
/// non-zero resting length the link attaches on the side of the fiber.
pub struct Single {
    pub prop: Arc<SingleProp>,
    pub base: SingleBase,
    pub hand: Hand,
}

impl Single {
    pub fn picket(prop: Arc<SingleProp>, pos: Vec3) -> Single {
        let hand = Hand::new(prop.hand.clone());
        Single { prop, base: SingleBase::Picket(pos), hand }
    }

    pub fn wrist(prop: Arc<SingleProp>, anchor: Anchor) -> Single {
        let hand = Hand::new(prop.hand.clone());
        Single { prop, base: SingleBase::Wrist(anchor), hand }
    }

    /// Force exerted on the hand by the tether, given the resolved base
    /// position.
    pub fn force(&self, base_pos: &Vec3, fib: &Fiber) -> Vec3 {
        let r = *base_pos - self.hand.pos(fib);
        if self.prop.length > 0.0 {
            let n = r.norm();
            if n > 1e-12 {
                return r * (self.prop.stiffness * (n - self.prop.length) / n);
            }
            return Vec3::zero();
        }
        r * self.prop.stiffness
    }

    /// Deposits the tether of a bound single.
    ///
    /// `base` resolves the wrist anchor into the assembled system; it is
    /// None for a picket.
    pub fn set_interactions(&self, meca: &mut Meca, fib: &Fiber, base: Option<PointExact>) {
        debug_assert!(self.hand.attached());
        let ip = fib.interpolate(self.hand.abscissa());
        match (&self.base, base) {
            (SingleBase::Picket(g), _) => {
                if self.prop.length > 0.0 {
                    meca.inter_side_clamp(&ip, g, self.prop.length, self.prop.stiffness);
                } else {
                    meca.inter_clamp(&PointRef::Interpolated(ip), g, self.prop.stiffness);
                }
            }
            (SingleBase::Wrist(_), Some(pe)) => {
                let b = PointRef::Vertex(pe);
                if self.prop.length > 0.0 {
                    meca.inter_side_link(&ip, &b, self.prop.length, self.prop.stiffness);
                } else {
                    meca.inter_link(&PointRef::Interpolated(ip), &b, self.prop.stiffness);
                }
            }
            (SingleBase::Wrist(_), None) => {
                debug_assert!(false, "wrist base was not resolved");
            }
        }
    }
}
