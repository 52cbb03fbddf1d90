//! Assembly and implicit integration of the equations of motion.
//!
//! The motion of all mecables is governed by
//!
//! ```text
//! d vPTS/dt = M * ( vBAS + ( mB + mC + R + dP ) * vPTS )
//! ```
//!
//! where `vPTS` gathers every coordinate, `vBAS` the constant part of the
//! linearized forces (including the calibrated Brownian terms), `mB` the
//! isotropic and `mC` the anisotropic stiffness matrices, `R` the bending
//! rigidity of the chains, and `M` the block-diagonal mobility/projection
//! operator applied per mecable. `dP`, the derivative of the projection, is
//! an optional additive term improving stability.
//!
//! The implicit-Euler step solves
//!
//! ```text
//! ( I - dt * M * ( mB + mC + R + dP ) ) V  =  M * ( vBAS + (mB+mC+R) * vPTS )
//! ```
//!
//! with BiCGStab, after which positions are advanced by `dt * V`.
//!
//! Interactions never touch matrix elements directly: the `inter_*` family
//! below deposits the stiffness pattern and the matching base force in one
//! call, each in O(1), and every deposit is symmetric by construction.

use std::cell::RefCell;

use nalgebra as na;

use cytomech_numerical::solver::{self, Allocator, LinearOperator, Monitor, Outcome};
use cytomech_numerical::{blas, Matrix3x3, SimRng, TridiagLdl, Vec3};
use cytomech_sparse::SparseSymmetric;
use log::{debug, warn};

use crate::fiber::Fiber;
use crate::mecable::Mecable;
use crate::point_ref::{PointExact, PointInterpolated, PointRef};

/// Motion model of one registered mecable.
enum BlockKind {
    /// free point: speed = mobility * force
    Point { mobility: f64 },
    /// rigid cluster: forces reduce to one translation and one rotation
    Rigid {
        mobility: f64,
        rot_mobility: f64,
        /// arms of the points about the centroid, fixed during the solve
        arms: Vec<Vec3>,
    },
    /// inextensible chain with bending rigidity
    Chain {
        /// per-point mobility
        mobility: f64,
        /// bending prefactor, rigidity / cut^3
        rigidity: f64,
        /// segment length
        cut: f64,
        /// unit segment directions, fixed during the solve
        dir: Vec<Vec3>,
        /// factorization of J.J^T for the length constraints
        ldl: TridiagLdl,
        /// per-segment stiffness of the projection derivative
        proj_diff: Vec<f64>,
    },
}

struct MecaBlock {
    /// index of the first point in the assembled system
    index: usize,
    n_points: usize,
    kind: BlockKind,
}

/// The assembled mechanical system of one time step.
pub struct Meca {
    time_step: f64,
    kt: f64,
    tolerance: f64,
    max_iterations: usize,
    precondition: bool,
    projection_diff: bool,
    precond_block_cap: usize,

    n_points: usize,
    blocks: Vec<MecaBlock>,

    /// current coordinates of every point
    v_pts: Vec<f64>,
    /// speeds found by the previous solve, used as initial guess
    v_sol: Vec<f64>,
    /// constant term of the linearized forces
    v_bas: Vec<f64>,
    /// right hand side of the final system
    v_rhs: Vec<f64>,
    /// deterministic forces, for reports and fiber dynamics
    v_for: Vec<f64>,
    /// per-point drag coefficients, for the Brownian amplitude
    drags: Vec<f64>,

    /// isotropic stiffness terms, indexed by point
    pub m_b: SparseSymmetric,
    /// anisotropic stiffness terms, indexed by coordinate
    pub m_c: SparseSymmetric,
    use_mb: bool,
    use_mc: bool,

    /// factored preconditioner blocks, one per mecable when enabled
    precond_lu: Vec<Option<na::LU<f64, na::Dynamic, na::Dynamic>>>,

    /// workspace of multiply(), interior-mutable since the operator is
    /// borrowed immutably by the solver
    scratch: RefCell<Vec<f64>>,
    lambda: RefCell<Vec<f64>>,

    alloc: Allocator,
    /// statistics of the last solve
    pub iterations: usize,
    pub residual: f64,
}

impl Default for Meca {
    fn default() -> Self {
        Meca::new()
    }
}

impl Meca {
    pub fn new() -> Meca {
        Meca {
            time_step: 0.0,
            kt: 0.0,
            tolerance: 1e-4,
            max_iterations: 100,
            precondition: true,
            projection_diff: true,
            precond_block_cap: 160,
            n_points: 0,
            blocks: Vec::new(),
            v_pts: Vec::new(),
            v_sol: Vec::new(),
            v_bas: Vec::new(),
            v_rhs: Vec::new(),
            v_for: Vec::new(),
            drags: Vec::new(),
            m_b: SparseSymmetric::new(),
            m_c: SparseSymmetric::new(),
            use_mb: false,
            use_mc: false,
            precond_lu: Vec::new(),
            scratch: RefCell::new(Vec::new()),
            lambda: RefCell::new(Vec::new()),
            alloc: Allocator::new(),
            iterations: 0,
            residual: 0.0,
        }
    }

    /// Starts a new assembly: forgets all registered objects and clears the
    /// matrices, keeping allocated storage.
    pub fn reset(&mut self, time_step: f64, kt: f64, tolerance: f64, max_iterations: usize, precondition: bool, projection_diff: bool, precond_block_cap: usize) {
        assert!(time_step > 0.0);
        self.time_step = time_step;
        self.kt = kt;
        self.tolerance = tolerance;
        self.max_iterations = max_iterations;
        self.precondition = precondition;
        self.projection_diff = projection_diff;
        self.precond_block_cap = precond_block_cap;
        self.n_points = 0;
        self.blocks.clear();
        self.v_pts.clear();
        self.drags.clear();
        self.precond_lu.clear();
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    // ---------- registration

    fn push_points(&mut self, mec: &mut dyn Mecable) -> (usize, usize) {
        let n = mec.n_points();
        let index = self.n_points;
        mec.set_mat_index(index);
        self.v_pts.resize(3 * (index + n), 0.0);
        mec.put_points(&mut self.v_pts[3 * index..3 * (index + n)]);
        self.n_points += n;
        (index, n)
    }

    /// Registers a fiber: chain block with length constraints and bending.
    pub fn add_fiber(&mut self, fib: &mut Fiber, viscosity: f64) {
        let drag = fib.drag_coefficient(viscosity);
        let (index, n) = self.push_points(fib);
        let point_drag = drag / n as f64;
        for _ in 0..n {
            self.drags.push(point_drag);
        }

        let mut dir = Vec::with_capacity(n - 1);
        for i in 0..n - 1 {
            dir.push(fib.dir_segment(i));
        }

        // J.J^T for unit constraint directions is tridiagonal:
        // 2 on the diagonal, -d_i.d_{i+1} off it
        let diag = vec![2.0; n - 1];
        let mut off = Vec::with_capacity(n.saturating_sub(2));
        for i in 0..n - 2 {
            off.push(-dir[i].dot(&dir[i + 1]));
        }
        let mut ldl = TridiagLdl::new();
        if !ldl.factorize(&diag, &off) {
            // a collapsed chain leaves the constraints unusable
            panic!("degenerate fiber geometry: length constraints are singular");
        }

        let cut = fib.segmentation();
        self.blocks.push(MecaBlock {
            index,
            n_points: n,
            kind: BlockKind::Chain {
                mobility: 1.0 / point_drag,
                rigidity: fib.prop.rigidity / cut.powi(3),
                cut,
                dir,
                ldl,
                proj_diff: vec![0.0; n - 1],
            },
        });
    }

    /// Registers a free point object of the given drag coefficient.
    pub fn add_point_object(&mut self, mec: &mut dyn Mecable, drag: f64) {
        assert!(drag > 0.0);
        let (index, n) = self.push_points(mec);
        assert_eq!(n, 1);
        self.drags.push(drag);
        self.blocks.push(MecaBlock { index, n_points: 1, kind: BlockKind::Point { mobility: 1.0 / drag } });
    }

    /// Registers a rigid cluster with the given translational and
    /// rotational drag coefficients.
    pub fn add_rigid_object(&mut self, mec: &mut dyn Mecable, drag: f64, rot_drag: f64) {
        assert!(drag > 0.0 && rot_drag > 0.0);
        let (index, n) = self.push_points(mec);
        let point_drag = drag / n as f64;
        for _ in 0..n {
            self.drags.push(point_drag);
        }

        let mut centroid = Vec3::zero();
        for i in 0..n {
            centroid += mec.point(i);
        }
        centroid = centroid / n as f64;
        let arms = (0..n).map(|i| mec.point(i) - centroid).collect();

        self.blocks.push(MecaBlock {
            index,
            n_points: n,
            kind: BlockKind::Rigid { mobility: 1.0 / drag, rot_mobility: 1.0 / rot_drag, arms },
        });
    }

    /// Sizes the matrices and zeroes the force accumulators. Must be called
    /// after the last registration and before the first interaction.
    pub fn commit(&mut self) {
        let s = 3 * self.n_points;
        self.m_b.resize(self.n_points);
        self.m_b.make_zero();
        self.m_c.resize(s);
        self.m_c.make_zero();
        self.v_bas.resize(s, 0.0);
        blas::xzero(&mut self.v_bas);
        self.v_rhs.resize(s, 0.0);
        self.v_for.resize(s, 0.0);
        if self.v_sol.len() != s {
            self.v_sol.clear();
            self.v_sol.resize(s, 0.0);
        }
        self.scratch.borrow_mut().resize(s, 0.0);
        self.lambda.borrow_mut().resize(self.n_points, 0.0);
    }

    pub fn positions(&self) -> &[f64] {
        &self.v_pts
    }

    /// Deterministic force on a point, valid after `prepare()`.
    pub fn force_point(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.v_for[3 * index..3 * index + 3])
    }

    // ---------- interaction primitives
    //
    // Each primitive collects the involved points with signed interpolation
    // coefficients g (positive for the first side, negative for the second)
    // and deposits F = -weight * g * ( gᵀ X + offset ), which covers the
    // whole Hookean family. Links sharing a supporting point are refused,
    // since their matrix elements would be wrong.

    fn gather(a: &PointRef, b: Option<&PointRef>) -> Option<([(usize, f64); 4], usize)> {
        let mut pts = [(0usize, 0.0f64); 4];
        let (wa, na_) = a.weights();
        let mut n = 0;
        for k in 0..na_ {
            pts[n] = wa[k];
            n += 1;
        }
        if let Some(b) = b {
            let (wb, nb) = b.weights();
            for k in 0..nb {
                pts[n] = (wb[k].0, -wb[k].1);
                n += 1;
            }
        }
        // refuse degenerate links sharing a model point
        for i in 0..n {
            for j in i + 1..n {
                if pts[i].0 == pts[j].0 {
                    return None;
                }
            }
        }
        Some((pts, n))
    }

    /// Isotropic deposit: mB -= w g gᵀ and vBAS -= w g offset.
    fn deposit_iso(&mut self, pts: &[(usize, f64)], weight: f64, offset: Option<&Vec3>) {
        for i in 0..pts.len() {
            let (pi, gi) = pts[i];
            for j in i..pts.len() {
                let (pj, gj) = pts[j];
                self.m_b.add(pi, pj, -weight * gi * gj);
            }
            if let Some(h) = offset {
                for d in 0..3 {
                    self.v_bas[3 * pi + d] -= weight * gi * h[d];
                }
            }
        }
        self.use_mb = true;
    }

    /// Anisotropic deposit: mC -= w g gᵀ (x) T and vBAS -= w g h.
    fn deposit_aniso(&mut self, pts: &[(usize, f64)], weight: f64, tensor: &Matrix3x3, offset: Option<&Vec3>) {
        for i in 0..pts.len() {
            let (pi, gi) = pts[i];
            // diagonal 3x3 block: upper triangle only
            for d1 in 0..3 {
                for d2 in d1..3 {
                    let v = -weight * gi * gi * tensor.get(d1, d2);
                    if v != 0.0 {
                        self.m_c.add(3 * pi + d1, 3 * pi + d2, v);
                    }
                }
            }
            // off-diagonal blocks: full 3x3, once per unordered pair
            for j in i + 1..pts.len() {
                let (pj, gj) = pts[j];
                for d1 in 0..3 {
                    for d2 in 0..3 {
                        let v = -weight * gi * gj * tensor.get(d1, d2);
                        if v != 0.0 {
                            self.m_c.add(3 * pi + d1, 3 * pj + d2, v);
                        }
                    }
                }
            }
            if let Some(h) = offset {
                for d in 0..3 {
                    self.v_bas[3 * pi + d] -= weight * gi * h[d];
                }
            }
        }
        self.use_mc = true;
    }

    /// Adds a constant force at a point, distributed by interpolation.
    pub fn add_base_force(&mut self, p: &PointRef, force: &Vec3) {
        let (w, n) = p.weights();
        for k in 0..n {
            let (pi, gi) = w[k];
            for d in 0..3 {
                self.v_bas[3 * pi + d] += gi * force[d];
            }
        }
    }

    /// Hookean spring of zero resting length between two points.
    pub fn inter_link(&mut self, a: &PointRef, b: &PointRef, weight: f64) {
        if let Some((pts, n)) = Self::gather(a, Some(b)) {
            self.deposit_iso(&pts[..n], weight, None);
        }
    }

    /// Spring of resting length `len`, linearized along the current axis.
    pub fn inter_long_link(&mut self, a: &PointRef, b: &PointRef, len: f64, weight: f64) {
        let axis = (b.pos() - a.pos()).normalized();
        if let Some((pts, n)) = Self::gather(a, Some(b)) {
            let offset = axis * len;
            self.deposit_iso(&pts[..n], weight, Some(&offset));
        }
    }

    /// Spring between `b` and a point held at distance `len` on the side of
    /// the fiber supporting `a`, perpendicular to it. The arm is derived
    /// from the current configuration and fixed for the solve.
    pub fn inter_side_link(&mut self, a: &PointInterpolated, b: &PointRef, len: f64, weight: f64) {
        let t = a.dir();
        let to_b = b.pos() - a.pos();
        let perp = to_b - t * to_b.dot(&t);
        let arm = if perp.norm_sqr() > 1e-24 {
            perp.normalized() * len
        } else {
            // no transverse direction: fall back on any perpendicular
            t.orthogonal() * len
        };
        let ra = PointRef::Interpolated(*a);
        if let Some((pts, n)) = Self::gather(&ra, Some(b)) {
            self.deposit_iso(&pts[..n], weight, Some(&arm));
        }
    }

    /// Link forceless along the fiber supporting `a`: only the transverse
    /// components are constrained, leaving sliding freedom.
    pub fn inter_sliding_link(&mut self, a: &PointInterpolated, b: &PointRef, weight: f64) {
        let t = a.dir();
        let mut tensor = Matrix3x3::identity();
        let para = Matrix3x3::outer(&t, &t);
        for k in 0..9 {
            tensor[k] -= para[k];
        }
        let ra = PointRef::Interpolated(*a);
        if let Some((pts, n)) = Self::gather(&ra, Some(b)) {
            self.deposit_aniso(&pts[..n], weight, &tensor, None);
        }
    }

    /// Sliding link offset to the side of the fiber by `len`.
    pub fn inter_side_sliding_link(&mut self, a: &PointInterpolated, b: &PointRef, len: f64, weight: f64) {
        let t = a.dir();
        let to_b = b.pos() - a.pos();
        let perp = to_b - t * to_b.dot(&t);
        let arm = if perp.norm_sqr() > 1e-24 {
            perp.normalized() * len
        } else {
            t.orthogonal() * len
        };
        let mut tensor = Matrix3x3::identity();
        let para = Matrix3x3::outer(&t, &t);
        for k in 0..9 {
            tensor[k] -= para[k];
        }
        let ra = PointRef::Interpolated(*a);
        if let Some((pts, n)) = Self::gather(&ra, Some(b)) {
            // the arm is transverse, so T.arm == arm
            self.deposit_aniso(&pts[..n], weight, &tensor, Some(&arm));
        }
    }

    /// Spring to the fixed world position `g`.
    pub fn inter_clamp(&mut self, a: &PointRef, g: &Vec3, weight: f64) {
        if let Some((pts, n)) = Self::gather(a, None) {
            let offset = -*g;
            self.deposit_iso(&pts[..n], weight, Some(&offset));
        }
    }

    pub fn inter_clamp_exact(&mut self, a: &PointExact, g: &Vec3, weight: f64) {
        self.inter_clamp(&PointRef::Vertex(*a), g, weight);
    }

    /// Spring between `g` and a point held at distance `len` on the side of
    /// the fiber supporting `a`.
    pub fn inter_side_clamp(&mut self, a: &PointInterpolated, g: &Vec3, len: f64, weight: f64) {
        let t = a.dir();
        let to_g = *g - a.pos();
        let perp = to_g - t * to_g.dot(&t);
        let arm = if perp.norm_sqr() > 1e-24 {
            perp.normalized() * len
        } else {
            t.orthogonal() * len
        };
        let ra = PointRef::Interpolated(*a);
        if let Some((pts, n)) = Self::gather(&ra, None) {
            let offset = arm - *g;
            self.deposit_iso(&pts[..n], weight, Some(&offset));
        }
    }

    /// Spring towards the sphere of radius `len` around `center`.
    pub fn inter_long_clamp(&mut self, a: &PointRef, center: &Vec3, len: f64, weight: f64) {
        let dir = (a.pos() - *center).normalized();
        if let Some((pts, n)) = Self::gather(a, None) {
            let offset = -(*center + dir * len);
            self.deposit_iso(&pts[..n], weight, Some(&offset));
        }
    }

    /// Half-space penalty towards the plane through `g` with normal `dir`.
    pub fn inter_plane(&mut self, a: &PointRef, dir: &Vec3, g: &Vec3, weight: f64) {
        let n = dir.normalized();
        let tensor = Matrix3x3::outer(&n, &n);
        let offset = -n * n.dot(g);
        if let Some((pts, cnt)) = Self::gather(a, None) {
            self.deposit_aniso(&pts[..cnt], weight, &tensor, Some(&offset));
        }
    }

    /// Angular penalty between two fiber segments, acting in the XY plane.
    ///
    /// The target angle is given by its cosine and sine. An explicit couple
    /// of forces is applied on the four supporting points; the torque is
    /// held constant during the solve.
    pub fn inter_torque2d(&mut self, a: &PointInterpolated, b: &PointInterpolated, cosinus: f64, sinus: f64, weight: f64) {
        let da = {
            let d = a.pos2 - a.pos1;
            let n = (d.x * d.x + d.y * d.y).sqrt();
            if n < 1e-12 {
                return;
            }
            Vec3::new(d.x / n, d.y / n, 0.0)
        };
        let db = {
            let d = b.pos2 - b.pos1;
            let n = (d.x * d.x + d.y * d.y).sqrt();
            if n < 1e-12 {
                return;
            }
            Vec3::new(d.x / n, d.y / n, 0.0)
        };
        // signed deviation from the target angle
        let sin_t = da.x * db.y - da.y * db.x;
        let cos_t = da.x * db.x + da.y * db.y;
        let err = sin_t * cosinus - cos_t * sinus;
        let torque = -weight * err;

        // equal and opposite couples on the two segments
        let la = a.len().max(1e-9);
        let lb = b.len().max(1e-9);
        let fa = Vec3::new(-da.y, da.x, 0.0) * (torque / la);
        let fb = Vec3::new(-db.y, db.x, 0.0) * (torque / lb);
        for (idx, f) in [
            (a.index1, fa),
            (a.index2, -fa),
            (b.index1, -fb),
            (b.index2, fb),
        ] {
            for d in 0..3 {
                self.v_bas[3 * idx + d] += f[d];
            }
        }
    }

    /// Linearized short-range repulsion of strength `weight / r^2`.
    pub fn inter_coulomb(&mut self, a: &PointRef, b: &PointRef, weight: f64) {
        let r0 = (b.pos() - a.pos()).norm();
        if r0 < 1e-6 {
            return;
        }
        // the tangent spring of the 1/r^2 force at the current distance
        let ke = 2.0 * weight / (r0 * r0 * r0);
        self.inter_long_link(a, b, 1.5 * r0, ke);
    }

    // ---------- block operations

    /// Y <- Y + R * X on a chain block (bending elasticity).
    fn add_rigidity(rigidity: f64, n: usize, x: &[f64], y: &mut [f64]) {
        if rigidity <= 0.0 || n < 3 {
            return;
        }
        for i in 1..n - 1 {
            for d in 0..3 {
                let b = x[3 * (i - 1) + d] - 2.0 * x[3 * i + d] + x[3 * (i + 1) + d];
                let wb = rigidity * b;
                y[3 * (i - 1) + d] -= wb;
                y[3 * i + d] += 2.0 * wb;
                y[3 * (i + 1) + d] -= wb;
            }
        }
    }

    /// Y <- mobility * P * X on a chain block. When `lambda_out` is given,
    /// the Lagrange multipliers of the constraints are stored there.
    fn project_chain(mobility: f64, dir: &[Vec3], ldl: &TridiagLdl, x: &[f64], y: &mut [f64], lambda: &mut [f64]) {
        let ns = dir.len();
        // t = J x
        for i in 0..ns {
            let a = Vec3::from_slice(&x[3 * i..3 * i + 3]);
            let b = Vec3::from_slice(&x[3 * (i + 1)..3 * (i + 1) + 3]);
            lambda[i] = dir[i].dot(&(b - a));
        }
        ldl.solve(&mut lambda[..ns]);
        // y = mobility * ( x - Jᵀ lambda )
        y[..3 * (ns + 1)].copy_from_slice(&x[..3 * (ns + 1)]);
        for i in 0..ns {
            let d = dir[i];
            for c in 0..3 {
                y[3 * i + c] += lambda[i] * d[c];
                y[3 * (i + 1) + c] -= lambda[i] * d[c];
            }
        }
        blas::xscal(mobility, &mut y[..3 * (ns + 1)]);
    }

    /// Y <- Y + mobility * dP * X on a chain block, using the coefficients
    /// stored from the last force projection.
    fn add_projection_diff(mobility: f64, proj_diff: &[f64], x: &[f64], y: &mut [f64]) {
        for (i, s) in proj_diff.iter().enumerate() {
            if *s != 0.0 {
                for c in 0..3 {
                    let v = mobility * s * (x[3 * (i + 1) + c] - x[3 * i + c]);
                    y[3 * i + c] += v;
                    y[3 * (i + 1) + c] -= v;
                }
            }
        }
    }

    /// Y <- M * X on a rigid block: reduce to total force and torque, then
    /// move every point with the rigid velocity field.
    fn project_rigid(mobility: f64, rot_mobility: f64, arms: &[Vec3], x: &[f64], y: &mut [f64]) {
        let n = arms.len();
        let mut ftot = Vec3::zero();
        let mut torque = Vec3::zero();
        for i in 0..n {
            let f = Vec3::from_slice(&x[3 * i..3 * i + 3]);
            ftot += f;
            torque += arms[i].cross(&f);
        }
        let v = ftot * mobility;
        let w = torque * rot_mobility;
        for i in 0..n {
            let vi = v + w.cross(&arms[i]);
            vi.store(&mut y[3 * i..3 * i + 3]);
        }
    }

    /// Applies the mobility/projection operator of one block,
    /// with the optional projection-derivative term driven by `x_in`.
    fn apply_block(&self, block: &MecaBlock, forces: &[f64], x_in: Option<&[f64]>, out: &mut [f64], lambda: &mut [f64]) {
        match &block.kind {
            BlockKind::Point { mobility } => {
                for c in 0..3 {
                    out[c] = mobility * forces[c];
                }
            }
            BlockKind::Rigid { mobility, rot_mobility, arms } => {
                Self::project_rigid(*mobility, *rot_mobility, arms, forces, out);
            }
            BlockKind::Chain { mobility, dir, ldl, proj_diff, .. } => {
                Self::project_chain(*mobility, dir, ldl, forces, out, lambda);
                if self.projection_diff {
                    if let Some(x) = x_in {
                        Self::add_projection_diff(*mobility, proj_diff, x, out);
                    }
                }
            }
        }
    }

    /// Y <- ( mB + mC + R ) * X
    fn add_linear_forces(&self, x: &[f64], y: &mut [f64]) {
        if self.use_mb {
            self.m_b.vec_mul_add_iso3d(x, y);
        }
        if self.use_mc {
            self.m_c.vec_mul_add(x, y);
        }
        for block in &self.blocks {
            if let BlockKind::Chain { rigidity, .. } = &block.kind {
                let r = 3 * block.index..3 * (block.index + block.n_points);
                Self::add_rigidity(*rigidity, block.n_points, &x[r.clone()], &mut y[r]);
            }
        }
    }

    // ---------- preparation and solve

    /// Finalizes the system: compiles the matrices, computes deterministic
    /// forces, adds the Brownian terms, builds the right hand side and the
    /// preconditioner.
    pub fn prepare(&mut self, rng: &mut SimRng) {
        let s = 3 * self.n_points;
        self.use_mb = self.m_b.non_zero();
        self.use_mc = self.m_c.non_zero();
        if self.use_mb {
            self.m_b.prepare_for_multiply();
        }
        if self.use_mc {
            self.m_c.prepare_for_multiply();
        }

        // deterministic forces, kept for reports and fiber dynamics
        self.v_for.copy_from_slice(&self.v_bas);
        let mut tmp = std::mem::take(&mut self.v_for);
        self.add_linear_forces(&self.v_pts, &mut tmp);
        self.v_for = tmp;

        // calibrated Brownian contribution to the base forces
        if self.kt > 0.0 {
            for i in 0..self.n_points {
                let amp = (2.0 * self.kt * self.drags[i] / self.time_step).sqrt();
                for d in 0..3 {
                    self.v_bas[3 * i + d] += amp * rng.gauss();
                }
            }
        }

        // total force with noise: F = vBAS + (mB+mC+R) vPTS
        let mut vtmp = vec![0.0; s];
        vtmp.copy_from_slice(&self.v_bas);
        self.add_linear_forces(&self.v_pts, &mut vtmp);

        // project per block into the right hand side, harvesting the
        // Lagrange multipliers that drive the projection derivative
        let mut lambda = self.lambda.borrow_mut();
        for block in self.blocks.iter_mut() {
            let r = 3 * block.index..3 * (block.index + block.n_points);
            match &mut block.kind {
                BlockKind::Point { mobility } => {
                    for c in r.clone() {
                        self.v_rhs[c] = *mobility * vtmp[c];
                    }
                }
                BlockKind::Rigid { mobility, rot_mobility, arms } => {
                    Self::project_rigid(*mobility, *rot_mobility, arms, &vtmp[r.clone()], &mut self.v_rhs[r]);
                }
                BlockKind::Chain { mobility, cut, dir, ldl, proj_diff, .. } => {
                    Self::project_chain(*mobility, dir, ldl, &vtmp[r.clone()], &mut self.v_rhs[r], &mut lambda);
                    // tension stabilizes the transverse modes; compressive
                    // multipliers are discarded
                    for i in 0..proj_diff.len() {
                        proj_diff[i] = lambda[i].max(0.0) / *cut;
                    }
                }
            }
        }
        drop(lambda);

        if self.precondition {
            self.compute_preconditioner();
        } else {
            self.precond_lu.clear();
        }
    }

    /// Builds the dense diagonal block of the system for one mecable and
    /// factors it. Large blocks fall back on the identity.
    fn compute_preconditioner(&mut self) {
        self.precond_lu.clear();
        let dt = self.time_step;
        let mut lambda_buf = vec![0.0; self.n_points.max(1)];

        for block in &self.blocks {
            let n = block.n_points;
            if n > self.precond_block_cap {
                self.precond_lu.push(None);
                continue;
            }
            let s = 3 * n;

            // dense copy of ( mB + mC + R ) restricted to the block
            let mut amat = vec![0.0; s * s];
            if self.use_mb {
                let mut iso = vec![0.0; n * n];
                self.m_b.add_sym_block(&mut iso, block.index, n);
                for j in 0..n {
                    for i in 0..n {
                        let v = iso[i + n * j];
                        if v != 0.0 {
                            for d in 0..3 {
                                amat[(3 * i + d) + s * (3 * j + d)] += v;
                            }
                        }
                    }
                }
            }
            if self.use_mc {
                self.m_c.add_sym_block(&mut amat, 3 * block.index, s);
            }
            if let BlockKind::Chain { rigidity, .. } = &block.kind {
                if *rigidity > 0.0 && n >= 3 {
                    // columns of R via the stencil
                    let mut e = vec![0.0; s];
                    let mut col = vec![0.0; s];
                    for k in 0..s {
                        e[k] = 1.0;
                        blas::xzero(&mut col);
                        Self::add_rigidity(*rigidity, n, &e, &mut col);
                        for i in 0..s {
                            amat[i + s * k] += col[i];
                        }
                        e[k] = 0.0;
                    }
                }
            }

            // B = I - dt * M * A, column by column
            let mut bmat = na::DMatrix::<f64>::zeros(s, s);
            let mut e = vec![0.0; s];
            let mut proj = vec![0.0; s];
            for k in 0..s {
                let col = &amat[s * k..s * (k + 1)];
                e[k] = 1.0;
                self.apply_block(block, col, Some(&e), &mut proj, &mut lambda_buf);
                for i in 0..s {
                    bmat[(i, k)] = (i == k) as u8 as f64 - dt * proj[i];
                }
                e[k] = 0.0;
            }

            self.precond_lu.push(Some(bmat.lu()));
        }
    }

    /// Integrates the solved speeds: vPTS += dt * V.
    pub fn integrate(&mut self) {
        blas::xaxpy(self.time_step, &self.v_sol, &mut self.v_pts);
    }

    /// Writes the positions of one mecable back from the big vector.
    pub fn fetch_points(&self, mec: &mut dyn Mecable) {
        let i = mec.mat_index();
        mec.get_points(&self.v_pts[3 * i..3 * (i + mec.n_points())]);
    }

    /// Runs the iterative solver. Returns the termination code; speeds are
    /// left in the internal solution vector for `integrate()`.
    pub fn solve(&mut self) -> Outcome {
        let mut monitor = Monitor::new(self.max_iterations, self.tolerance);
        let mut x = std::mem::take(&mut self.v_sol);
        let rhs = std::mem::take(&mut self.v_rhs);
        let mut alloc = std::mem::take(&mut self.alloc);

        if self.precondition && !self.precond_lu.is_empty() {
            solver::bicgstab_precond(&*self, &rhs, &mut x, &mut monitor, &mut alloc);
        } else {
            solver::bicgstab(&*self, &rhs, &mut x, &mut monitor, &mut alloc);
        }

        self.v_sol = x;
        self.v_rhs = rhs;
        self.alloc = alloc;
        self.iterations = monitor.iterations();
        self.residual = monitor.residual();
        debug!("meca solve: {} points, {} iterations, residual {:.3e}", self.n_points, self.iterations, self.residual);
        if monitor.outcome() == Outcome::Stagnated {
            warn!("meca solve stagnated at residual {:.3e}", self.residual);
        }
        monitor.outcome()
    }

    /// Speeds found by the last solve.
    pub fn speeds(&self) -> &[f64] {
        &self.v_sol
    }
}

impl LinearOperator for Meca {
    fn size(&self) -> usize {
        3 * self.n_points
    }

    /// Y <- ( I - dt * M * ( mB + mC + R + dP ) ) X
    fn multiply(&self, x: &[f64], y: &mut [f64]) {
        let mut tmp = self.scratch.borrow_mut();
        let mut lambda = self.lambda.borrow_mut();
        blas::xzero(&mut tmp);
        self.add_linear_forces(x, &mut tmp);

        for block in &self.blocks {
            let r = 3 * block.index..3 * (block.index + block.n_points);
            self.apply_block(block, &tmp[r.clone()], Some(&x[r.clone()]), &mut y[r], &mut lambda);
        }
        for i in 0..y.len() {
            y[i] = x[i] - self.time_step * y[i];
        }
    }

    /// Y <- P * X with the block preconditioner.
    fn precondition(&self, x: &[f64], y: &mut [f64]) {
        for (bi, block) in self.blocks.iter().enumerate() {
            let r = 3 * block.index..3 * (block.index + block.n_points);
            match self.precond_lu.get(bi).and_then(|p| p.as_ref()) {
                Some(lu) => {
                    let b = na::DVector::<f64>::from_column_slice(&x[r.clone()]);
                    match lu.solve(&b) {
                        Some(sol) => y[r.clone()].copy_from_slice(sol.as_slice()),
                        None => y[r.clone()].copy_from_slice(&x[r.clone()]),
                    }
                }
                None => y[r.clone()].copy_from_slice(&x[r.clone()]),
            }
        }
    }
}
