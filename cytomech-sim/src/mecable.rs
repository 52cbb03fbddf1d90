use cytomech_numerical::Vec3;

/// An object participating in the mechanical system.
///
/// A mecable contributes model points (degrees of freedom), a drag model and
/// a motion constraint to the assembled step. The assembler addresses its
/// points through a base index assigned at registration; coordinates are
/// exchanged as flat `[x0, y0, z0, x1, ...]` slices.
pub trait Mecable {
    /// Number of model points.
    fn n_points(&self) -> usize;

    /// Position of point `i`.
    fn point(&self, i: usize) -> Vec3;

    /// Copies all coordinates into `dst`, of length `3 * n_points()`.
    fn put_points(&self, dst: &mut [f64]);

    /// Overwrites all coordinates from `src`, then restores the shape
    /// constraints of the object (segment lengths, rigid geometry).
    fn get_points(&mut self, src: &[f64]);

    /// Base index of the first point in the assembled system.
    fn mat_index(&self) -> usize;

    /// Called by the assembler at registration.
    fn set_mat_index(&mut self, index: usize);
}

/// Grows a flat coordinate vector in power-of-two chunks.
///
/// Keeps reallocation rare as chains gain and lose points.
pub fn chunked_capacity(n_doubles: usize) -> usize {
    let mut cap = 8;
    while cap < n_doubles {
        cap *= 2;
    }
    return cap;
}
