//! The simulation container and the per-step sequence.
//!
//! One step runs, in order: attachment/detachment and state updates of
//! singles and couples (with the fast-diffusion draw), assembly of the
//! mechanical system, the implicit solve, integration of positions with the
//! per-object shape restoration, the assembly dynamics of fiber ends, and
//! finally the deferred deletion sweep. The visit order of every phase is
//! deterministic, so a run is reproducible from its seed.

use cytomech_numerical::solver::Outcome;
use cytomech_numerical::Vec3;
use log::info;

use crate::bead::Bead;
use crate::context::SimContext;
use crate::couple::{Couple, CoupleState};
use crate::couple_set::CoupleSet;
use crate::errors::SimError;
use crate::fiber::{Fiber, FiberAction, FiberEnd};
use crate::fiber_grid::{FiberGrid, SegmentHit};
use crate::fiber_set::{BindingSite, FiberSet};
use crate::hand::HandRef;
use crate::meca::Meca;
use crate::mecable::Mecable;
use crate::point_grid::{FatPoint, FatSegment, PointGrid, StericParam};
use crate::point_ref::PointExact;
use crate::properties::{ConfineMode, Properties};
use crate::single::{Anchor, AnchorObject, Single, SingleBase};
use crate::space::Space;
use crate::sphere::Sphere;
use crate::solid::Solid;

pub struct Simul {
    pub properties: Properties,
    pub fibers: FiberSet,
    pub beads: Vec<Bead>,
    pub solids: Vec<Solid>,
    pub spheres: Vec<Sphere>,
    pub singles: Vec<Single>,
    pub couples: CoupleSet,
    pub spaces: Vec<Box<dyn Space + Send>>,
    pub meca: Meca,
    pub fiber_grid: FiberGrid,
    point_grid: PointGrid,
    time: f64,
    steps: u64,
    hits: Vec<SegmentHit>,
    sites: Vec<BindingSite>,
}

impl Simul {
    pub fn new(properties: Properties) -> Result<Simul, SimError> {
        properties.simul.validate()?;
        Ok(Simul {
            properties,
            fibers: FiberSet::new(),
            beads: Vec::new(),
            solids: Vec::new(),
            spheres: Vec::new(),
            singles: Vec::new(),
            couples: CoupleSet::new(),
            spaces: Vec::new(),
            meca: Meca::new(),
            fiber_grid: FiberGrid::new(),
            point_grid: PointGrid::new(),
            time: 0.0,
            steps: 0,
            hits: Vec::new(),
            sites: Vec::new(),
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps_done(&self) -> u64 {
        self.steps
    }

    // ---------- population

    pub fn add_space(&mut self, space: Box<dyn Space + Send>) -> usize {
        self.spaces.push(space);
        self.spaces.len() - 1
    }

    pub fn add_fiber(&mut self, fib: Fiber) -> usize {
        self.fibers.add(fib)
    }

    pub fn add_bead(&mut self, bead: Bead) -> usize {
        self.beads.push(bead);
        self.beads.len() - 1
    }

    pub fn add_solid(&mut self, mut solid: Solid) -> usize {
        let id = self.solids.len();
        solid.set_reshape_phase(id as u8);
        self.solids.push(solid);
        return id;
    }

    pub fn add_sphere(&mut self, sphere: Sphere) -> usize {
        self.spheres.push(sphere);
        self.spheres.len() - 1
    }

    pub fn add_single(&mut self, single: Single) -> usize {
        self.singles.push(single);
        self.singles.len() - 1
    }

    pub fn add_couple(&mut self, couple: Couple) -> usize {
        self.couples.add(couple)
    }

    /// Attaches one hand of a couple at a given site, as initial
    /// configurations do; the state lists are updated accordingly.
    pub fn attach_couple_hand(&mut self, id: usize, which: u8, fiber: usize, abs: f64) -> Result<(), SimError> {
        let Simul { couples, fibers, .. } = self;
        let c = couples
            .get_mut(id)
            .ok_or_else(|| SimError::parameter(format!("unknown couple {}", id)))?;
        let old = c.state();
        let fib = fibers
            .get_mut(fiber)
            .ok_or_else(|| SimError::parameter(format!("unknown fiber {}", fiber)))?;
        c.hand_mut(which).attach(fib, fiber, abs, HandRef::Couple(id, which));
        let new = c.state();
        if new != old {
            couples.relink(id, old, new);
        }
        Ok(())
    }

    /// Attaches the hand of a single at a given site.
    pub fn attach_single_hand(&mut self, id: usize, fiber: usize, abs: f64) -> Result<(), SimError> {
        let Simul { singles, fibers, .. } = self;
        let s = singles
            .get_mut(id)
            .ok_or_else(|| SimError::parameter(format!("unknown single {}", id)))?;
        let fib = fibers
            .get_mut(fiber)
            .ok_or_else(|| SimError::parameter(format!("unknown fiber {}", fiber)))?;
        s.hand.attach(fib, fiber, abs, HandRef::Single(id));
        Ok(())
    }

    /// Sprinkles `n` free couples of a class at random inside its
    /// confinement space, or at the origin without one.
    pub fn add_free_couples(&mut self, class: &str, n: usize, ctx: &mut SimContext) -> Result<(), SimError> {
        let prop = self
            .properties
            .find_couple(class)
            .ok_or_else(|| SimError::parameter(format!("unknown couple class `{}'", class)))?
            .clone();
        for _ in 0..n {
            let pos = match &prop.confine {
                Some(cf) => self.spaces[cf.space].random_place(&mut ctx.rng),
                None => Vec3::zero(),
            };
            self.couples.add(Couple::new(prop.clone(), pos));
        }
        Ok(())
    }

    // ---------- grids

    /// Half-extent of the region to index: the first space when one exists,
    /// otherwise a padded bounding box of the current content.
    fn grid_extension(&self) -> Vec3 {
        if let Some(space) = self.spaces.first() {
            return space.extension() + Vec3::new(0.5, 0.5, 0.5);
        }
        let mut h = Vec3::new(1.0, 1.0, 1.0);
        let mut grow = |w: Vec3| {
            h.x = h.x.max(w.x.abs() + 2.0);
            h.y = h.y.max(w.y.abs() + 2.0);
            h.z = h.z.max(w.z.abs() + 2.0);
        };
        for (_, fib) in self.fibers.iter() {
            grow(fib.pos_end(FiberEnd::Minus));
            grow(fib.pos_end(FiberEnd::Plus));
        }
        for b in &self.beads {
            grow(b.position());
        }
        for s in &self.solids {
            grow(s.centroid());
        }
        for s in &self.spheres {
            grow(s.center());
        }
        return h;
    }

    /// Largest steric interaction distance of any pair.
    fn steric_diameter(&self) -> f64 {
        let mut r: f64 = 0.0;
        for p in &self.properties.fibers {
            r = r.max(p.steric_radius.max(p.steric_range));
        }
        for b in &self.beads {
            r = r.max(b.steric_radius);
        }
        for s in &self.solids {
            r = r.max(s.steric_radius);
        }
        for s in &self.spheres {
            r = r.max(s.steric_radius);
        }
        2.0 * r
    }

    fn ensure_grids(&mut self) -> Result<(), SimError> {
        if !self.fiber_grid.has_grid() {
            let ext = self.grid_extension();
            self.fiber_grid.set_grid(ext, self.properties.simul.binding_grid_step)?;
        }
        let dia = self.steric_diameter();
        if dia > 0.0 && !self.point_grid.has_grid() {
            let ext = self.grid_extension();
            // cells have to hold the largest pair distance, but very small
            // radii do not warrant a fine grid
            self.point_grid.set_grid(ext, dia.max(0.25), dia);
        }
        Ok(())
    }

    // ---------- anchors

    fn anchor_exact(beads: &[Bead], solids: &[Solid], spheres: &[Sphere], a: &Anchor) -> Option<PointExact> {
        match a.object {
            AnchorObject::Bead(i) => beads.get(i).map(|b| b.exact()),
            AnchorObject::Solid(i) => solids.get(i).map(|s| s.exact_point(a.point)),
            AnchorObject::Sphere(i) => spheres.get(i).map(|s| s.exact_point(a.point)),
        }
    }

    fn base_position(beads: &[Bead], solids: &[Solid], spheres: &[Sphere], base: &SingleBase) -> Vec3 {
        match base {
            SingleBase::Picket(g) => *g,
            SingleBase::Wrist(a) => Self::anchor_exact(beads, solids, spheres, a).map(|p| p.pos).unwrap_or(Vec3::zero()),
        }
    }

    // ---------- stepping

    /// Runs one time step.
    pub fn step(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        if ctx.stop_requested() {
            self.relax();
            return Ok(());
        }
        self.ensure_grids()?;

        let max_range = self.properties.max_binding_range();
        self.fiber_grid.paint(&self.fibers, max_range);

        self.step_singles(ctx);
        self.step_couples(ctx)?;

        self.assemble(ctx)?;
        let outcome = self.meca.solve();
        match outcome {
            Outcome::Converged | Outcome::Stagnated => {}
            other => {
                self.relax();
                return Err(SimError::NumericDivergence {
                    outcome: other,
                    iterations: self.meca.iterations,
                    residual: self.meca.residual,
                });
            }
        }
        self.meca.integrate();
        self.fetch_positions();

        self.step_fiber_dynamics(ctx);
        self.update_binders();
        self.sweep_deleted();

        self.time += self.properties.simul.time_step;
        self.steps += 1;
        Ok(())
    }

    /// Restores the fast-diffusion reserves; called before teardown and
    /// when the run is interrupted.
    pub fn relax(&mut self) {
        self.couples.relax();
        debug_assert!(self.couples.lists_consistent());
    }

    fn step_singles(&mut self, ctx: &mut SimContext) {
        let dt = self.properties.simul.time_step;
        let Simul { singles, fibers, fiber_grid, beads, solids, spheres, hits, .. } = self;

        for id in 0..singles.len() {
            let me = HandRef::Single(id);
            let s = &mut singles[id];
            if let Some(fid) = s.hand.fiber() {
                let base_pos = Self::base_position(beads, solids, spheres, &s.base);
                let fib = fibers.get_mut(fid).expect("hand attached to a deleted fiber");
                let force = s.force(&base_pos, fib);
                s.hand.step_loaded(fib, me, force, dt, &mut ctx.rng);
            } else {
                if !ctx.rng.test(s.hand.prop.binding_prob) {
                    continue;
                }
                let base_pos = Self::base_position(beads, solids, spheres, &s.base);
                fiber_grid.candidates(&base_pos, s.hand.prop.binding_range_sqr, fibers, &mut ctx.rng, hits);
                if let Some(hit) = hits.first() {
                    let fib = fibers.get_mut(hit.site.fiber).expect("grid returned a deleted fiber");
                    s.hand.attach(fib, hit.site.fiber, hit.site.abscissa, me);
                }
            }
        }
    }

    /// Direct attachment draw replacing the explicit diffusion of free
    /// couples of fast-diffusing classes.
    ///
    /// The per-class total binding rate, spread uniformly over the polymer,
    /// gives an average site spacing of `volume / (reserve * density)`;
    /// sites are drawn as a Poisson process along the fibers and filled
    /// from the reserve.
    fn uni_attach(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        let sp = &self.properties.simul;

        // park the free fast-diffusing couples into their class reserves
        let ff: Vec<usize> = self.couples.list(CoupleState::FF).to_vec();
        for id in ff {
            let prop = self.couples.get(id).expect("stale free list").prop.clone();
            if prop.fast_diffusion {
                self.couples.park(id, prop.index);
            }
        }

        for prop in self.properties.couples.clone() {
            if !prop.fast_diffusion {
                continue;
            }
            let class = prop.index;
            let rsize = self.couples.reserve(class).len();
            if rsize == 0 {
                continue;
            }
            let cf = prop.confine.as_ref().expect("fast_diffusion requires a confinement space");
            let volume = self.spaces[cf.space].volume();
            if volume <= 0.0 {
                return Err(SimError::parameter("fast_diffusion requires a space of non-zero volume"));
            }

            for which in 0..2u8 {
                if self.couples.reserve(class).is_empty() {
                    break;
                }
                let hand_prop = if which == 0 { &prop.hand1 } else { &prop.hand2 };
                let density = rsize as f64 * hand_prop.attach_density(sp);
                if density <= 0.0 {
                    continue;
                }
                let Simul { fibers, couples, sites, .. } = self;
                fibers.uniform_sites(volume / density, &mut ctx.rng, sites);
                for site in sites.iter() {
                    let Some(&id) = couples.reserve(class).last() else {
                        break;
                    };
                    let fib = fibers.get_mut(site.fiber).expect("site on a deleted fiber");
                    couples
                        .get_mut(id)
                        .expect("reserve holds a deleted couple")
                        .hand_mut(which)
                        .attach(fib, site.fiber, site.abscissa, HandRef::Couple(id, which));
                    couples.pop_reserve(class);
                    couples.link(id);
                }
            }
        }
        Ok(())
    }

    fn step_couples(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        self.couples.prepare_reserves(self.properties.couples.len());
        self.uni_attach(ctx)?;

        // each couple is visited once, according to its membership before
        // any transition of this phase
        let aa: Vec<usize> = self.couples.list(CoupleState::AA).to_vec();
        let fa: Vec<usize> = self.couples.list(CoupleState::FA).to_vec();
        let af: Vec<usize> = self.couples.list(CoupleState::AF).to_vec();
        let ff: Vec<usize> = self.couples.list(CoupleState::FF).to_vec();

        for id in aa {
            self.step_couple_aa(id, ctx);
        }
        for id in fa {
            self.step_couple_half(id, 1, ctx);
        }
        for id in af {
            self.step_couple_half(id, 0, ctx);
        }
        for id in ff {
            self.step_couple_ff(id, ctx);
        }
        debug_assert!(self.couples.lists_consistent());
        Ok(())
    }

    fn step_couple_aa(&mut self, id: usize, ctx: &mut SimContext) {
        let dt = self.properties.simul.time_step;
        let Simul { couples, fibers, .. } = self;
        let c = couples.get_mut(id).expect("stale list entry");
        let old = c.state();
        debug_assert_eq!(old, CoupleState::AA);
        let f1 = c.hand1.fiber().unwrap();
        let f2 = c.hand2.fiber().unwrap();

        if f1 == f2 {
            let fib = fibers.get_mut(f1).expect("deleted fiber");
            let force = c.force1(fib, fib);
            c.hand1.step_loaded(fib, HandRef::Couple(id, 0), force, dt, &mut ctx.rng);
            if c.hand2.attached() {
                c.hand2.step_loaded(fib, HandRef::Couple(id, 1), -force, dt, &mut ctx.rng);
            }
        } else {
            let (fib1, fib2) = fibers.get_pair_mut(f1, f2);
            let force = c.force1(fib1, fib2);
            c.hand1.step_loaded(fib1, HandRef::Couple(id, 0), force, dt, &mut ctx.rng);
            if c.hand2.attached() {
                c.hand2.step_loaded(fib2, HandRef::Couple(id, 1), -force, dt, &mut ctx.rng);
            }
        }

        let new = c.state();
        if new != old {
            couples.relink(id, old, new);
        }
    }

    /// Step of a couple with exactly one bound hand; `free` designates the
    /// unbound one. The free hand tries to bind from the position of the
    /// bound hand, which then takes its unloaded step.
    fn step_couple_half(&mut self, id: usize, free: u8, ctx: &mut SimContext) {
        let dt = self.properties.simul.time_step;
        let Simul { couples, fibers, fiber_grid, hits, .. } = self;
        let c = couples.get_mut(id).expect("stale list entry");
        let old = c.state();
        let bound = 1 - free;
        let bound_fiber = c.hand(bound).fiber().expect("bound hand has no fiber");
        let origin = c.hand(bound).pos(fibers.get(bound_fiber).expect("deleted fiber"));

        // attachment attempt of the free hand
        if ctx.rng.test(c.hand(free).prop.binding_prob) {
            fiber_grid.candidates(&origin, c.hand(free).prop.binding_range_sqr, fibers, &mut ctx.rng, hits);
            for hit in hits.iter() {
                let ok = {
                    let fib = fibers.get(hit.site.fiber).expect("deleted fiber");
                    let ofib = fibers.get(bound_fiber).expect("deleted fiber");
                    c.allow_second_bond(free, fib, hit.site.fiber, hit.site.abscissa, ofib)
                };
                if ok {
                    let fib = fibers.get_mut(hit.site.fiber).expect("deleted fiber");
                    c.hand_mut(free).attach(fib, hit.site.fiber, hit.site.abscissa, HandRef::Couple(id, free));
                    break;
                }
            }
        }

        // unloaded step of the hand that was bound
        let fib = fibers.get_mut(bound_fiber).expect("deleted fiber");
        c.hand_mut(bound).step_unloaded(fib, HandRef::Couple(id, bound), dt, &mut ctx.rng);

        let new = c.state();
        if new != old {
            couples.relink(id, old, new);
        }
    }

    fn step_couple_ff(&mut self, id: usize, ctx: &mut SimContext) {
        let Simul { couples, fibers, fiber_grid, spaces, hits, .. } = self;
        let c = couples.get_mut(id).expect("stale list entry");
        let old = c.state();
        debug_assert_eq!(old, CoupleState::FF);

        // explicit diffusion of the free complex
        c.pos += ctx.rng.gauss_vector() * c.prop.diffusion_dt;
        if let Some(cf) = &c.prop.confine {
            let space = &spaces[cf.space];
            match cf.mode {
                ConfineMode::Inside => space.bounce(&mut c.pos),
                ConfineMode::Surface => c.pos = space.project(&c.pos),
            }
        }

        // both hands look for fibers around the current position
        for which in 0..2u8 {
            if c.hand(which).attached() {
                continue;
            }
            if !ctx.rng.test(c.hand(which).prop.binding_prob) {
                continue;
            }
            fiber_grid.candidates(&c.pos, c.hand(which).prop.binding_range_sqr, fibers, &mut ctx.rng, hits);
            for k in 0..hits.len() {
                let hit = hits[k];
                let other = 1 - which;
                let ok = if c.hand(other).attached() {
                    let fib = fibers.get(hit.site.fiber).expect("deleted fiber");
                    let ofib = fibers.get(c.hand(other).fiber().unwrap()).expect("deleted fiber");
                    c.allow_second_bond(which, fib, hit.site.fiber, hit.site.abscissa, ofib)
                } else {
                    true
                };
                if ok {
                    let fib = fibers.get_mut(hit.site.fiber).expect("deleted fiber");
                    c.hand_mut(which).attach(fib, hit.site.fiber, hit.site.abscissa, HandRef::Couple(id, which));
                    break;
                }
            }
        }

        let new = c.state();
        if new != old {
            couples.relink(id, old, new);
        }
    }

    // ---------- assembly

    fn assemble(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        let sp = self.properties.simul.clone();
        self.meca.reset(
            sp.time_step,
            sp.kt,
            sp.tolerance,
            sp.max_iterations,
            sp.precondition,
            sp.projection_diff,
            sp.precond_block_cap,
        );

        // registration, in deterministic list order
        {
            let Simul { meca, fibers, beads, solids, spheres, .. } = self;
            for (_, fib) in fibers.iter_mut() {
                meca.add_fiber(fib, sp.viscosity);
            }
            for bead in beads.iter_mut() {
                let drag = bead.drag_coefficient(sp.viscosity);
                meca.add_point_object(bead, drag);
            }
            for solid in solids.iter_mut() {
                let drag = solid.drag_coefficient(sp.viscosity);
                let rot = solid.rot_drag_coefficient(sp.viscosity);
                meca.add_rigid_object(solid, drag, rot);
            }
            for sphere in spheres.iter_mut() {
                let drag = sphere.drag_coefficient(sp.viscosity);
                let rot = sphere.rot_drag_coefficient(sp.viscosity);
                meca.add_rigid_object(sphere, drag, rot);
            }
            meca.commit();
        }

        self.add_confinements();
        self.add_links();
        self.add_steric();

        self.meca.prepare(&mut ctx.rng);
        Ok(())
    }

    fn add_confinements(&mut self) {
        let Simul { meca, fibers, beads, solids, spheres, spaces, .. } = self;
        for (_, fib) in fibers.iter() {
            if let Some(cf) = &fib.prop.confine {
                let space = &spaces[cf.space];
                for i in 0..fib.n_points() {
                    space.set_interaction(&fib.exact_point(i), meca, cf.stiffness, cf.mode);
                }
            }
        }
        for bead in beads.iter() {
            if let Some(cf) = &bead.confine {
                spaces[cf.space].set_interaction_rad(&bead.exact(), meca, cf.stiffness, cf.mode, bead.radius);
            }
        }
        for solid in solids.iter() {
            if let Some(cf) = &solid.confine {
                let space = &spaces[cf.space];
                for i in 0..solid.n_points() {
                    space.set_interaction(&solid.exact_point(i), meca, cf.stiffness, cf.mode);
                }
            }
        }
        for sphere in spheres.iter() {
            if let Some(cf) = &sphere.confine {
                spaces[cf.space].set_interaction(&sphere.exact_point(0), meca, cf.stiffness, cf.mode);
            }
        }
    }

    fn add_links(&mut self) {
        let Simul { meca, fibers, beads, solids, spheres, singles, couples, .. } = self;

        for s in singles.iter() {
            if let Some(fid) = s.hand.fiber() {
                let fib = fibers.get(fid).expect("deleted fiber");
                let base = match &s.base {
                    SingleBase::Picket(_) => None,
                    SingleBase::Wrist(a) => Self::anchor_exact(beads, solids, spheres, a),
                };
                s.set_interactions(meca, fib, base);
            }
        }

        for &id in couples.list(CoupleState::AA) {
            let c = couples.get(id).expect("stale list entry");
            let f1 = c.hand1.fiber().unwrap();
            let f2 = c.hand2.fiber().unwrap();
            let fib1 = fibers.get(f1).expect("deleted fiber");
            let fib2 = fibers.get(f2).expect("deleted fiber");
            c.set_interactions(meca, fib1, fib2);
        }
    }

    fn add_steric(&mut self) {
        let sp = &self.properties.simul;
        if sp.steric_stiff_push <= 0.0 || !self.point_grid.has_grid() {
            return;
        }
        let pam = StericParam { stiff_push: sp.steric_stiff_push, stiff_pull: sp.steric_stiff_pull };

        self.point_grid.clear();
        for (_, fib) in self.fibers.iter() {
            let rad = fib.prop.steric_radius;
            if rad <= 0.0 {
                continue;
            }
            let rng_ = fib.prop.steric_range.max(rad);
            let last = fib.n_segments() - 1;
            for seg in 0..fib.n_segments() {
                self.point_grid.add_segment(FatSegment {
                    i1: fib.mat_index() + seg,
                    i2: fib.mat_index() + seg + 1,
                    p1: fib.point(seg),
                    p2: fib.point(seg + 1),
                    radius: rad,
                    range: rng_,
                    first: seg == 0,
                    last: seg == last,
                });
            }
        }
        for bead in &self.beads {
            if bead.steric_radius > 0.0 {
                self.point_grid.add_point(FatPoint {
                    index: bead.mat_index(),
                    pos: bead.position(),
                    radius: bead.steric_radius,
                    range: bead.steric_radius,
                });
            }
        }
        for solid in &self.solids {
            if solid.steric_radius > 0.0 {
                for i in 0..solid.n_points() {
                    self.point_grid.add_point(FatPoint {
                        index: solid.mat_index() + i,
                        pos: solid.point(i),
                        radius: solid.steric_radius,
                        range: solid.steric_radius,
                    });
                }
            }
        }
        for sphere in &self.spheres {
            if sphere.steric_radius > 0.0 {
                self.point_grid.add_point(FatPoint {
                    index: sphere.mat_index(),
                    pos: sphere.center(),
                    radius: sphere.steric_radius,
                    range: sphere.steric_radius,
                });
            }
        }

        self.point_grid.set_interactions(&mut self.meca, &pam);
    }

    fn fetch_positions(&mut self) {
        let Simul { meca, fibers, beads, solids, spheres, .. } = self;
        for (_, fib) in fibers.iter_mut() {
            meca.fetch_points(fib);
        }
        for bead in beads.iter_mut() {
            meca.fetch_points(bead);
        }
        for solid in solids.iter_mut() {
            meca.fetch_points(solid);
        }
        for sphere in spheres.iter_mut() {
            meca.fetch_points(sphere);
        }
    }

    /// Applies the assembly dynamics after the mechanical step, using the
    /// force that was acting on the terminal points.
    fn step_fiber_dynamics(&mut self, ctx: &mut SimContext) {
        let dt = self.properties.simul.time_step;
        let Simul { meca, fibers, .. } = self;
        for (_, fib) in fibers.iter_mut() {
            let fp = meca
                .force_point(fib.exact_end(FiberEnd::Plus).index)
                .dot(&fib.dir_end(FiberEnd::Plus));
            let fm = meca
                .force_point(fib.exact_end(FiberEnd::Minus).index)
                .dot(&fib.dir_end(FiberEnd::Minus));
            if fib.step_dynamics(fp, fm, dt, &mut ctx.rng, fib.prop.fate) == FiberAction::Destroy {
                fib.marked = true;
            }
        }
    }

    /// Restores the range invariant of every bound hand after the fibers
    /// moved and changed length; relinks the couples whose state changed.
    fn update_binders(&mut self) {
        let ids = self.fibers.ids();
        for fid in ids {
            let snapshot = self.fibers.get(fid).map(|f| f.binders.clone()).unwrap_or_default();
            for r in snapshot {
                self.update_one_binder(fid, r);
            }
        }
        debug_assert!(self.couples.lists_consistent());
    }

    fn update_one_binder(&mut self, fid: usize, r: HandRef) {
        let Simul { fibers, singles, couples, .. } = self;
        let fib = fibers.get_mut(fid).expect("binder on a deleted fiber");
        match r {
            HandRef::Single(s) => {
                let hand = &mut singles[s].hand;
                if hand.fiber() == Some(fid) {
                    hand.keep_in_range(fib, r);
                }
            }
            HandRef::Couple(cid, which) => {
                let c = couples.get_mut(cid).expect("binder of a deleted couple");
                let old = c.state();
                if c.hand(which).fiber() == Some(fid) {
                    c.hand_mut(which).keep_in_range(fib, r);
                    let new = c.state();
                    if new != old {
                        couples.relink(cid, old, new);
                    }
                }
            }
        }
    }

    /// Removes the fibers marked for deletion, detaching their hands.
    fn sweep_deleted(&mut self) {
        let marked: Vec<usize> = self.fibers.iter().filter(|(_, f)| f.marked).map(|(i, _)| i).collect();
        for fid in marked {
            loop {
                let Some(r) = self.fibers.get(fid).and_then(|f| f.binders.first().copied()) else {
                    break;
                };
                self.detach_binder(fid, r);
            }
            self.fibers.remove(fid);
            info!("fiber {} destroyed", fid);
        }
    }

    fn detach_binder(&mut self, fid: usize, r: HandRef) {
        let Simul { fibers, singles, couples, .. } = self;
        let fib = fibers.get_mut(fid).expect("deleted fiber");
        match r {
            HandRef::Single(s) => {
                singles[s].hand.detach(fib, r);
            }
            HandRef::Couple(cid, which) => {
                let c = couples.get_mut(cid).expect("deleted couple");
                let old = c.state();
                c.hand_mut(which).detach(fib, r);
                let new = c.state();
                if new != old {
                    couples.relink(cid, old, new);
                }
            }
        }
    }

    // ---------- diagnostics

    /// Total discrete bending energy of all fibers.
    pub fn bending_energy(&self) -> f64 {
        self.fibers.iter().map(|(_, f)| f.bending_energy()).sum()
    }

    /// Number of attached hands over singles and couples.
    pub fn count_attached(&self) -> usize {
        let singles = self.singles.iter().filter(|s| s.hand.attached()).count();
        let couples: usize = self
            .couples
            .slots()
            .map(|(_, c)| c.hand1.attached() as usize + c.hand2.attached() as usize)
            .sum();
        singles + couples
    }

    pub fn couple_counts(&self) -> [usize; 4] {
        self.couples.counts()
    }
}
