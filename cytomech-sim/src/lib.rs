//! Mechanical core of cytomech.
//!
//! Flexible polymer fibers, rigid beads, solids and spheres are coupled by
//! molecular motors (hands), anchored singles and crosslinking couples.
//! Every time step the interactions are linearized into one sparse system
//! which is integrated implicitly with preconditioned BiCGStab, while the
//! binding and unbinding layer evolves stochastically.

pub mod bead;
pub mod context;
pub mod couple;
pub mod couple_set;
pub mod errors;
pub mod fiber;
pub mod fiber_grid;
pub mod fiber_set;
pub mod hand;
pub mod live;
pub mod meca;
pub mod mecable;
pub mod modulo;
pub mod observers;
pub mod point_grid;
pub mod point_ref;
pub mod properties;
pub mod simul;
pub mod single;
pub mod solid;
pub mod space;
pub mod sphere;

pub use bead::Bead;
pub use context::SimContext;
pub use couple::{Couple, CoupleState};
pub use couple_set::CoupleSet;
pub use errors::SimError;
pub use fiber::{DynamicState, EndState, Fiber, FiberEnd};
pub use fiber_grid::FiberGrid;
pub use fiber_set::{BindingSite, FiberSet};
pub use hand::{Hand, HandRef};
pub use live::SimHost;
pub use meca::Meca;
pub use mecable::Mecable;
pub use modulo::Modulo;
pub use point_grid::PointGrid;
pub use point_ref::{PointExact, PointInterpolated, PointRef};
pub use properties::{
    ConfineMode, ConfineProp, CoupleProp, CoupleSpecificity, FiberDynamicsProp, FiberFate, FiberProp, HandActivity,
    HandProp, Properties, SimulProp, SingleProp,
};
pub use simul::Simul;
pub use single::{Anchor, AnchorObject, Single, SingleBase};
pub use solid::Solid;
pub use space::{Space, SpaceBox, SpaceCylinder, SpaceSphere};
pub use sphere::Sphere;
