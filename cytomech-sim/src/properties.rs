//! Parameter records for the simulated object classes.
//!
//! A property is the only source of calibrated constants for the objects of
//! its class. It is identified by `(kind, name)` and carries a stable index
//! assigned when it is registered in the catalog. Rates given per second are
//! converted once per run into per-step quantities by `complete()`, which
//! must be called whenever the time step changes.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::errors::SimError;

/// Global parameters of the simulation engine.
#[derive(Clone, Debug)]
pub struct SimulProp {
    /// integration time step, in seconds
    pub time_step: f64,
    /// thermal energy kT, in pN.um
    pub kt: f64,
    /// viscosity of the medium, in pN.s/um^2
    pub viscosity: f64,
    /// residual threshold of the iterative solver
    pub tolerance: f64,
    /// iteration cap of the iterative solver
    pub max_iterations: usize,
    /// enable the block preconditioner
    pub precondition: bool,
    /// include the derivative of the projection in the system matrix
    pub projection_diff: bool,
    /// upper bound on the cell size of the attachment grid, in um
    pub binding_grid_step: f64,
    /// steric stiffness when objects overlap
    pub steric_stiff_push: f64,
    /// steric stiffness when objects are within range but not overlapping
    pub steric_stiff_pull: f64,
    /// largest dense block factored for preconditioning, in points
    pub precond_block_cap: usize,
    /// seed of the random number generator
    pub seed: u64,
}

impl Default for SimulProp {
    fn default() -> Self {
        SimulProp {
            time_step: 1e-3,
            kt: 0.0042,
            viscosity: 0.05,
            tolerance: 1e-4,
            max_iterations: 200,
            precondition: true,
            projection_diff: true,
            binding_grid_step: 0.2,
            steric_stiff_push: 100.0,
            steric_stiff_pull: 0.0,
            precond_block_cap: 160,
            seed: 1,
        }
    }
}

impl SimulProp {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.time_step <= 0.0 {
            return Err(SimError::parameter("simul:time_step must be > 0"));
        }
        if self.viscosity <= 0.0 {
            return Err(SimError::parameter("simul:viscosity must be > 0"));
        }
        if self.binding_grid_step <= 0.0 {
            return Err(SimError::parameter("simul:binding_grid_step must be > 0"));
        }
        if self.kt < 0.0 {
            return Err(SimError::parameter("simul:kt must be >= 0"));
        }
        Ok(())
    }
}

/// What happens to a fiber shrinking below its minimal length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FiberFate {
    #[default]
    None,
    Destroy,
    Rescue,
}

/// Assembly dynamics attached to a fiber class.
#[derive(Clone, Debug, Default)]
pub enum FiberDynamicsProp {
    /// the length never changes
    #[default]
    Static,
    /// two-state growth/shrinkage of the plus end with force-dependent
    /// assembly and an inverse-linear catastrophe law
    Classic {
        /// speed of assembly and disassembly while growing, in um/s
        growing_speed: [f64; 2],
        /// antagonistic force scale reducing assembly, in pN
        growing_force: f64,
        /// catastrophe rate at zero force and at stalling force, in 1/s
        catastrophe_rate: [f64; 2],
        /// rate of switching back to growth, in 1/s
        rescue_rate: f64,
        /// speed while shrinking, in um/s (negative)
        shrinking_speed: f64,
        /// fraction of free monomer, scaling the assembly speed
        free_polymer: f64,
    },
    /// microscopic two-unit cap model where catastrophe is emergent
    TwoState {
        /// length increment of one unit, in um
        unit_length: f64,
        /// rate of unit addition while growing, and a force-independent
        /// additive rate, in 1/s
        growing_rate: [f64; 2],
        /// antagonistic force scale, in pN
        growing_force: f64,
        /// rate of unit hydrolysis, in 1/s
        hydrolysis_rate: f64,
        /// unit removal rate while shrinking, in 1/s
        shrinking_rate: f64,
        /// fraction of free monomer, scaling the assembly rate
        free_polymer: f64,
    },
    /// independent stochastic assembly at both ends
    Treadmill {
        /// assembly speed at the plus end, in um/s
        plus_speed: f64,
        /// assembly speed at the minus end, in um/s
        minus_speed: f64,
        /// antagonistic force scale of each end, in pN
        growing_force: [f64; 2],
        /// switching rates grow->shrink and shrink->grow at either end, in 1/s
        catastrophe_rate: f64,
        rescue_rate: f64,
        /// shrinking speeds at plus and minus ends, in um/s (negative)
        plus_shrink: f64,
        minus_shrink: f64,
    },
}

/// Parameters of a fiber class.
#[derive(Clone, Debug)]
pub struct FiberProp {
    pub name: String,
    pub index: usize,
    /// bending elastic modulus, in pN.um^2
    pub rigidity: f64,
    /// target distance between model points, in um
    pub segmentation: f64,
    /// hydrodynamic diameter of the filament, in um
    pub drag_radius: f64,
    /// below this length the configured fate applies, in um
    pub min_length: f64,
    /// radius of the steric envelope; zero disables steric for this class
    pub steric_radius: f64,
    /// distance up to which the steric attraction operates
    pub steric_range: f64,
    /// what happens when the fiber shrinks below `min_length`
    pub fate: FiberFate,
    /// space confining the fiber points, if any
    pub confine: Option<ConfineProp>,
    pub dynamics: FiberDynamicsProp,
}

impl FiberProp {
    pub fn new(name: impl Into<String>) -> FiberProp {
        FiberProp {
            name: name.into(),
            index: 0,
            rigidity: 0.05,
            segmentation: 0.5,
            drag_radius: 0.0125,
            min_length: 0.1,
            steric_radius: 0.0,
            steric_range: 0.0,
            fate: FiberFate::None,
            confine: None,
            dynamics: FiberDynamicsProp::Static,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.segmentation <= 0.0 {
            return Err(SimError::parameter(format!("fiber:{}:segmentation must be > 0", self.name)));
        }
        if self.rigidity < 0.0 {
            return Err(SimError::parameter(format!("fiber:{}:rigidity must be >= 0", self.name)));
        }
        if self.drag_radius <= 0.0 {
            return Err(SimError::parameter(format!("fiber:{}:drag_radius must be > 0", self.name)));
        }
        Ok(())
    }
}

/// How a point is kept within a space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfineMode {
    /// spring towards the boundary applied only outside
    Inside,
    /// spring towards the boundary applied everywhere
    Surface,
}

#[derive(Clone, Copy, Debug)]
pub struct ConfineProp {
    pub space: usize,
    pub mode: ConfineMode,
    pub stiffness: f64,
}

/// The motility of a hand class.
#[derive(Clone, Copy, Debug, Default)]
pub enum HandActivity {
    /// binds and unbinds, but does not move
    #[default]
    Bind,
    /// walks along the fiber with a linear force-velocity relation
    Move {
        /// speed without load, in um/s; positive moves to the plus end
        unloaded_speed: f64,
        /// force that stalls the motor, in pN
        stall_force: f64,
    },
}

/// Parameters of a hand class.
#[derive(Clone, Debug)]
pub struct HandProp {
    pub name: String,
    pub index: usize,
    /// attachment rate of a hand within range, in 1/s
    pub binding_rate: f64,
    /// maximum distance at which a fiber can be grabbed, in um
    pub binding_range: f64,
    /// spontaneous detachment rate, in 1/s
    pub unbinding_rate: f64,
    /// force scale of detachment, in pN; INFINITY disables force sensitivity
    pub unbinding_force: f64,
    /// stay bound at the fiber tip instead of falling off
    pub hold_fiber_end: bool,
    pub activity: HandActivity,

    // ---------- derived by complete()
    pub binding_prob: f64,
    pub binding_range_sqr: f64,
    pub unbinding_prob: f64,
}

impl HandProp {
    pub fn new(name: impl Into<String>) -> HandProp {
        HandProp {
            name: name.into(),
            index: 0,
            binding_rate: 10.0,
            binding_range: 0.01,
            unbinding_rate: 0.1,
            unbinding_force: f64::INFINITY,
            hold_fiber_end: false,
            activity: HandActivity::Bind,
            binding_prob: 0.0,
            binding_range_sqr: 0.0,
            unbinding_prob: 0.0,
        }
    }

    /// Derives the per-step quantities.
    pub fn complete(&mut self, sp: &SimulProp) -> Result<(), SimError> {
        if self.binding_rate < 0.0 {
            return Err(SimError::parameter(format!("hand:{}:binding_rate must be >= 0", self.name)));
        }
        if self.binding_range < 0.0 {
            return Err(SimError::parameter(format!("hand:{}:binding_range must be >= 0", self.name)));
        }
        if self.unbinding_rate < 0.0 {
            return Err(SimError::parameter(format!("hand:{}:unbinding_rate must be >= 0", self.name)));
        }
        if self.unbinding_force <= 0.0 {
            return Err(SimError::parameter(format!("hand:{}:unbinding_force must be > 0", self.name)));
        }
        self.binding_prob = 1.0 - (-self.binding_rate * sp.time_step).exp();
        self.binding_range_sqr = self.binding_range * self.binding_range;
        self.unbinding_prob = 1.0 - (-self.unbinding_rate * sp.time_step).exp();
        Ok(())
    }

    /// Linear density of attachment events along a fiber, for one hand
    /// diffusing uniformly in a volume; used by the fast-diffusion draw.
    pub fn attach_density(&self, sp: &SimulProp) -> f64 {
        self.binding_rate * sp.time_step * PI * self.binding_range * self.binding_range
    }
}

/// Which relative orientation of the two fibers a couple accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CoupleSpecificity {
    #[default]
    None,
    Parallel,
    Antiparallel,
}

/// Parameters of a couple class.
#[derive(Clone, Debug)]
pub struct CoupleProp {
    pub name: String,
    pub index: usize,
    pub hand1: Arc<HandProp>,
    pub hand2: Arc<HandProp>,
    /// stiffness of the connecting link, in pN/um
    pub stiffness: f64,
    /// resting length of the link, in um; zero makes a plain Hookean link
    pub length: f64,
    /// diffusion constant of the free complex, in um^2/s
    pub diffusion: f64,
    /// replace explicit diffusion of free couples by a direct rate draw
    pub fast_diffusion: bool,
    pub specificity: CoupleSpecificity,
    /// binding adjacent to the sister hand is refused when set
    pub stiff: bool,
    /// space confining the free complex, if any
    pub confine: Option<ConfineProp>,

    // ---------- derived by complete()
    pub diffusion_dt: f64,
}

impl CoupleProp {
    pub fn new(name: impl Into<String>, hand1: Arc<HandProp>, hand2: Arc<HandProp>) -> CoupleProp {
        CoupleProp {
            name: name.into(),
            index: 0,
            hand1,
            hand2,
            stiffness: 100.0,
            length: 0.0,
            diffusion: 1.0,
            fast_diffusion: false,
            specificity: CoupleSpecificity::None,
            stiff: true,
            confine: None,
            diffusion_dt: 0.0,
        }
    }

    pub fn complete(&mut self, sp: &SimulProp) -> Result<(), SimError> {
        if self.stiffness < 0.0 {
            return Err(SimError::parameter(format!("couple:{}:stiffness must be >= 0", self.name)));
        }
        if self.diffusion < 0.0 {
            return Err(SimError::parameter(format!("couple:{}:diffusion must be >= 0", self.name)));
        }
        if self.fast_diffusion && self.confine.is_none() {
            return Err(SimError::parameter(format!(
                "couple:{}:fast_diffusion requires a confining space to define the volume",
                self.name
            )));
        }
        // amplitude of one diffusive displacement per axis
        self.diffusion_dt = (2.0 * self.diffusion * sp.time_step).sqrt();
        Ok(())
    }
}

/// The anchoring of a single.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SingleAnchor {
    /// base fixed at an absolute position
    #[default]
    Picket,
    /// base interpolated on another mecable
    Wrist,
}

/// Parameters of a single class.
#[derive(Clone, Debug)]
pub struct SingleProp {
    pub name: String,
    pub index: usize,
    pub hand: Arc<HandProp>,
    /// stiffness of the tether, in pN/um
    pub stiffness: f64,
    /// resting length of the tether; zero makes a plain Hookean link
    pub length: f64,
    pub anchor: SingleAnchor,
}

impl SingleProp {
    pub fn new(name: impl Into<String>, hand: Arc<HandProp>) -> SingleProp {
        SingleProp {
            name: name.into(),
            index: 0,
            hand,
            stiffness: 100.0,
            length: 0.0,
            anchor: SingleAnchor::Picket,
        }
    }
}

/// The catalog of registered properties.
///
/// Registration assigns the stable per-kind index that objects and stored
/// data refer to.
#[derive(Default)]
pub struct Properties {
    pub simul: SimulProp,
    pub fibers: Vec<Arc<FiberProp>>,
    pub hands: Vec<Arc<HandProp>>,
    pub couples: Vec<Arc<CoupleProp>>,
    pub singles: Vec<Arc<SingleProp>>,
}

impl Properties {
    pub fn new(simul: SimulProp) -> Properties {
        Properties { simul, ..Default::default() }
    }

    pub fn add_fiber(&mut self, mut p: FiberProp) -> Result<Arc<FiberProp>, SimError> {
        p.validate()?;
        p.index = self.fibers.len();
        let arc = Arc::new(p);
        self.fibers.push(arc.clone());
        Ok(arc)
    }

    pub fn add_hand(&mut self, mut p: HandProp) -> Result<Arc<HandProp>, SimError> {
        p.complete(&self.simul)?;
        p.index = self.hands.len();
        let arc = Arc::new(p);
        self.hands.push(arc.clone());
        Ok(arc)
    }

    pub fn add_couple(&mut self, mut p: CoupleProp) -> Result<Arc<CoupleProp>, SimError> {
        p.complete(&self.simul)?;
        p.index = self.couples.len();
        let arc = Arc::new(p);
        self.couples.push(arc.clone());
        Ok(arc)
    }

    pub fn add_single(&mut self, mut p: SingleProp) -> Result<Arc<SingleProp>, SimError> {
        p.index = self.singles.len();
        let arc = Arc::new(p);
        self.singles.push(arc.clone());
        Ok(arc)
    }

    pub fn find_fiber(&self, name: &str) -> Option<&Arc<FiberProp>> {
        self.fibers.iter().find(|p| p.name == name)
    }

    pub fn find_hand(&self, name: &str) -> Option<&Arc<HandProp>> {
        self.hands.iter().find(|p| p.name == name)
    }

    pub fn find_couple(&self, name: &str) -> Option<&Arc<CoupleProp>> {
        self.couples.iter().find(|p| p.name == name)
    }

    pub fn find_single(&self, name: &str) -> Option<&Arc<SingleProp>> {
        self.singles.iter().find(|p| p.name == name)
    }

    /// Largest binding range over all hand classes; sets the completeness
    /// radius of the attachment grid.
    pub fn max_binding_range(&self) -> f64 {
        self.hands.iter().map(|h| h.binding_range).fold(0.0, f64::max)
    }
}
