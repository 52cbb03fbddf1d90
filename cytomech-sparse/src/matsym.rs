/// One stored term of a column.
#[derive(Clone, Copy, Debug)]
struct Element {
    line: usize,
    val: f64,
}

/// Sparse symmetric real matrix, storing the lower triangle by column.
///
/// Within each column the terms are kept ordered by row index, with the
/// diagonal term always first; this keeps find-or-insert proportional to the
/// column depth. [`SparseSymmetric::make_zero`] empties the columns without
/// releasing their storage, so a matrix that is rebuilt every step settles
/// into a steady allocation.
#[derive(Clone, Debug, Default)]
pub struct SparseSymmetric {
    size: usize,
    /// authoring columns; `col[j]` holds the terms of column j with row >= j
    col: Vec<Vec<Element>>,

    // ---------- compiled multiply form
    /// `sa[j]` for j < size holds the diagonal; off-diagonal values follow
    sa: Vec<f64>,
    /// row indices matching `sa`; `ija[j]..ija[j+1]` brackets column j
    ija: Vec<usize>,
    /// `col_f[j]` is the next non-empty column at or after j
    col_f: Vec<usize>,
}

impl SparseSymmetric {
    pub fn new() -> SparseSymmetric {
        SparseSymmetric::default()
    }

    /// Sets the dimension of the matrix, keeping existing column storage.
    pub fn resize(&mut self, size: usize) {
        self.size = size;
        if self.col.len() < size {
            self.col.resize_with(size, Vec::new);
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Empties all columns without releasing memory.
    pub fn make_zero(&mut self) {
        for c in self.col.iter_mut() {
            c.clear();
        }
    }

    /// Reference to the term at `(ii, jj)`, inserted as zero if absent.
    ///
    /// The indices are swapped internally so only the lower triangle is
    /// touched; `element(i, j)` and `element(j, i)` address the same term.
    pub fn element(&mut self, ii: usize, jj: usize) -> &mut f64 {
        assert!(ii < self.size && jj < self.size);

        // swap to address the lower side
        let (ii, jj) = if jj > ii { (jj, ii) } else { (ii, jj) };

        if self.col[jj].is_empty() {
            let column = &mut self.col[jj];
            column.reserve(4);
            // diagonal term always first
            column.push(Element { line: jj, val: 0.0 });
            if ii != jj {
                column.push(Element { line: ii, val: 0.0 });
                return &mut column[1].val;
            }
            return &mut column[0].val;
        }

        if ii == jj {
            debug_assert_eq!(self.col[jj][0].line, jj);
            return &mut self.col[jj][0].val;
        }

        // the terms are ordered by row to speed up the scan
        let column = &self.col[jj];
        let mut k = 1;
        let mut found = false;
        while k < column.len() {
            if column[k].line == ii {
                found = true;
                break;
            }
            if column[k].line > ii {
                break;
            }
            k += 1;
        }

        let column = &mut self.col[jj];
        if !found {
            if column.len() == column.capacity() {
                column.reserve(4);
            }
            column.insert(k, Element { line: ii, val: 0.0 });
        }
        return &mut column[k].val;
    }

    /// Adds `val` at `(ii, jj)`.
    pub fn add(&mut self, ii: usize, jj: usize, val: f64) {
        *self.element(ii, jj) += val;
    }

    /// Value at `(ii, jj)`, or zero when the term is not stored.
    pub fn value(&self, ii: usize, jj: usize) -> f64 {
        let (ii, jj) = if jj > ii { (jj, ii) } else { (ii, jj) };
        if jj >= self.size {
            return 0.0;
        }
        for e in &self.col[jj] {
            if e.line == ii {
                return e.val;
            }
        }
        return 0.0;
    }

    pub fn scale(&mut self, a: f64) {
        for c in self.col.iter_mut() {
            for e in c.iter_mut() {
                e.val *= a;
            }
        }
    }

    /// True if any stored term is non-zero.
    pub fn non_zero(&self) -> bool {
        self.col.iter().any(|c| c.iter().any(|e| e.val != 0.0))
    }

    /// Number of stored terms, zero-valued ones included.
    pub fn nb_elements(&self) -> usize {
        self.col.iter().map(|c| c.len()).sum()
    }

    /// Adds the diagonal block `[x, x+sx)` of this matrix into the dense
    /// column-major matrix `m` of dimension `sx`. Both triangles of `m`
    /// receive the symmetric terms.
    pub fn add_sym_block(&self, m: &mut [f64], x: usize, sx: usize) {
        assert!(x + sx <= self.size);
        assert!(m.len() >= sx * sx);
        for jj in 0..sx {
            for e in &self.col[jj + x] {
                if e.line < x {
                    continue;
                }
                let ii = e.line - x;
                if ii < sx {
                    m[ii + sx * jj] += e.val;
                    if ii != jj {
                        m[jj + sx * ii] += e.val;
                    }
                }
            }
        }
    }

    /// Compiles the multiply form from the authoring columns.
    ///
    /// Must be called after the last insertion and before any of the
    /// `vec_mul_add*` products.
    pub fn prepare_for_multiply(&mut self) {
        let size = self.size;

        // update col_f, the pointer to the next non-empty column
        self.col_f.resize(size + 1, 0);
        self.col_f[size] = size;
        let mut inx = size;
        for jj in (0..size).rev() {
            if !self.col[jj].is_empty() {
                inx = jj;
            }
            self.col_f[jj] = inx;
        }

        // count stored terms, counting an implicit zero diagonal
        // for empty columns
        let mut nbe = 1 + size;
        for jj in 0..size {
            nbe += self.col[jj].len().saturating_sub(1);
        }

        self.sa.resize(nbe, 0.0);
        self.ija.resize(nbe, 0);

        // classic sparse layout: diagonal in sa[0..size], then the
        // off-diagonal runs of each column
        self.ija[0] = size + 1;
        let mut kk = size;
        for jj in 0..size {
            let column = &self.col[jj];
            if let Some(first) = column.first() {
                debug_assert_eq!(first.line, jj);
                self.sa[jj] = first.val;
                for e in &column[1..] {
                    kk += 1;
                    self.sa[kk] = e.val;
                    self.ija[kk] = e.line;
                }
            } else {
                self.sa[jj] = 0.0;
            }
            self.ija[jj + 1] = kk + 1;
        }
        debug_assert_eq!(kk + 1, nbe);
    }

    /// Y <- Y + M * X, using the compiled form.
    pub fn vec_mul_add(&self, x: &[f64], y: &mut [f64]) {
        let size = self.size;
        let mut jj = self.col_f[0];
        while jj < size {
            let x0 = x[jj];
            let mut y0 = y[jj] + self.sa[jj] * x0;
            for kk in self.ija[jj]..self.ija[jj + 1] {
                let a = self.sa[kk];
                let ii = self.ija[kk];
                y[ii] += a * x0;
                y0 += a * x[ii];
            }
            y[jj] = y0;
            jj = self.col_f[jj + 1];
        }
    }

    /// Y <- Y + M * X where X and Y are interleaved 2D coordinates and the
    /// matrix applies identically on both axes.
    pub fn vec_mul_add_iso2d(&self, x: &[f64], y: &mut [f64]) {
        let size = self.size;
        let mut jj = self.col_f[0];
        while jj < size {
            let djj = 2 * jj;
            let x0 = x[djj];
            let x1 = x[djj + 1];
            let mut y0 = y[djj] + self.sa[jj] * x0;
            let mut y1 = y[djj + 1] + self.sa[jj] * x1;
            for kk in self.ija[jj]..self.ija[jj + 1] {
                let dii = 2 * self.ija[kk];
                debug_assert_ne!(dii, djj);
                let a = self.sa[kk];
                y0 += a * x[dii];
                y1 += a * x[dii + 1];
                y[dii] += a * x0;
                y[dii + 1] += a * x1;
            }
            y[djj] = y0;
            y[djj + 1] = y1;
            jj = self.col_f[jj + 1];
        }
    }

    /// Y <- Y + M * X where X and Y are interleaved 3D coordinates and the
    /// matrix applies identically on the three axes.
    pub fn vec_mul_add_iso3d(&self, x: &[f64], y: &mut [f64]) {
        let size = self.size;
        let mut jj = self.col_f[0];
        while jj < size {
            let djj = 3 * jj;
            let x0 = x[djj];
            let x1 = x[djj + 1];
            let x2 = x[djj + 2];
            let mut y0 = y[djj] + self.sa[jj] * x0;
            let mut y1 = y[djj + 1] + self.sa[jj] * x1;
            let mut y2 = y[djj + 2] + self.sa[jj] * x2;
            for kk in self.ija[jj]..self.ija[jj + 1] {
                let dii = 3 * self.ija[kk];
                debug_assert_ne!(dii, djj);
                let a = self.sa[kk];
                y0 += a * x[dii];
                y1 += a * x[dii + 1];
                y2 += a * x[dii + 2];
                y[dii] += a * x0;
                y[dii + 1] += a * x1;
                y[dii + 2] += a * x2;
            }
            y[djj] = y0;
            y[djj + 1] = y1;
            y[djj + 2] = y2;
            jj = self.col_f[jj + 1];
        }
    }

    /// Consistency check: returns false if any column is out of order or
    /// holds an index outside the matrix.
    pub fn valid(&self) -> bool {
        for (jj, column) in self.col.iter().take(self.size).enumerate() {
            if let Some(first) = column.first() {
                if first.line != jj {
                    return false;
                }
            }
            for w in column.windows(2) {
                if w[0].line >= w[1].line {
                    return false;
                }
            }
            if column.iter().any(|e| e.line >= self.size) {
                return false;
            }
        }
        return true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut SmallRng, size: usize, terms: usize) -> (SparseSymmetric, Vec<f64>) {
        let mut mat = SparseSymmetric::new();
        mat.resize(size);
        let mut dense = vec![0.0; size * size];
        for _ in 0..terms {
            let i = rng.gen_range(0..size);
            let j = rng.gen_range(0..size);
            let v: f64 = rng.gen_range(-1.0..1.0);
            mat.add(i, j, v);
            dense[i * size + j] += v;
            if i != j {
                dense[j * size + i] += v;
            }
        }
        (mat, dense)
    }

    #[test]
    fn stored_terms_are_symmetric() {
        let mut rng = SmallRng::seed_from_u64(17);
        let (mat, _) = random_matrix(&mut rng, 12, 40);
        assert!(mat.valid());
        for i in 0..12 {
            for j in 0..12 {
                assert_eq!(mat.value(i, j), mat.value(j, i));
            }
        }
    }

    #[test]
    fn multiply_matches_dense() {
        let mut rng = SmallRng::seed_from_u64(5);
        let size = 15;
        let (mut mat, dense) = random_matrix(&mut rng, size, 60);
        mat.prepare_for_multiply();

        let x: Vec<f64> = (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut y = vec![0.0; size];
        mat.vec_mul_add(&x, &mut y);

        for i in 0..size {
            let mut yi = 0.0;
            for j in 0..size {
                yi += dense[i * size + j] * x[j];
            }
            assert!((y[i] - yi).abs() < 1e-12, "row {}: {} vs {}", i, y[i], yi);
        }
    }

    #[test]
    fn iso_multiplies_match_scalar() {
        let mut rng = SmallRng::seed_from_u64(99);
        let size = 10;
        let (mut mat, _) = random_matrix(&mut rng, size, 35);
        mat.prepare_for_multiply();

        // reference: apply the scalar multiply independently per axis
        for dim in [2usize, 3] {
            let x: Vec<f64> = (0..dim * size).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let mut expected = vec![0.0; dim * size];
            for d in 0..dim {
                let xd: Vec<f64> = (0..size).map(|i| x[dim * i + d]).collect();
                let mut yd = vec![0.0; size];
                mat.vec_mul_add(&xd, &mut yd);
                for i in 0..size {
                    expected[dim * i + d] = yd[i];
                }
            }
            let mut y = vec![0.0; dim * size];
            match dim {
                2 => mat.vec_mul_add_iso2d(&x, &mut y),
                _ => mat.vec_mul_add_iso3d(&x, &mut y),
            }
            for i in 0..dim * size {
                assert!((y[i] - expected[i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn make_zero_keeps_capacity() {
        let mut mat = SparseSymmetric::new();
        mat.resize(6);
        mat.add(3, 1, 2.0);
        mat.add(5, 5, 1.0);
        assert!(mat.non_zero());
        mat.make_zero();
        assert!(!mat.non_zero());
        assert_eq!(mat.nb_elements(), 0);
        // the matrix is reusable after make_zero
        mat.add(2, 0, -1.0);
        mat.prepare_for_multiply();
        let x = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut y = [0.0; 6];
        mat.vec_mul_add(&x, &mut y);
        assert_eq!(y[2], -1.0);
    }

    #[test]
    fn block_extraction() {
        let mut mat = SparseSymmetric::new();
        mat.resize(8);
        mat.add(2, 2, 4.0);
        mat.add(3, 2, -1.5);
        mat.add(4, 3, 0.5);
        let mut block = vec![0.0; 9];
        // block covering indices 2..5
        mat.add_sym_block(&mut block, 2, 3);
        assert_eq!(block[0], 4.0); // (2,2)
        assert_eq!(block[1], -1.5); // (3,2)
        assert_eq!(block[3], -1.5); // (2,3)
        assert_eq!(block[5], 0.5); // (4,3)
        assert_eq!(block[7], 0.5); // (3,4)
    }
}
