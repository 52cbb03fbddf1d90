use cytomech_numerical::Vec3;

/// A model point of a registered mecable, resolved to its global index.
///
/// The index addresses the assembled system: point `i` owns the coordinates
/// `3i..3i+3` of the big vectors. The current position is carried along so
/// interaction geometry can be derived without another lookup.
#[derive(Clone, Copy, Debug)]
pub struct PointExact {
    pub index: usize,
    pub pos: Vec3,
}

impl PointExact {
    pub fn new(index: usize, pos: Vec3) -> PointExact {
        PointExact { index, pos }
    }
}

/// A position interpolated between two consecutive model points.
///
/// The interpolation `pos = (1-coef)*p1 + coef*p2` stands for a point of a
/// fiber segment, with `coef` in `[0, 1]`.
#[derive(Clone, Copy, Debug)]
pub struct PointInterpolated {
    pub index1: usize,
    pub index2: usize,
    pub coef: f64,
    pub pos1: Vec3,
    pub pos2: Vec3,
}

impl PointInterpolated {
    pub fn new(index1: usize, index2: usize, coef: f64, pos1: Vec3, pos2: Vec3) -> PointInterpolated {
        PointInterpolated { index1, index2, coef, pos1, pos2 }
    }

    pub fn pos(&self) -> Vec3 {
        self.pos1 * (1.0 - self.coef) + self.pos2 * self.coef
    }

    /// Unit vector from the first to the second supporting point.
    pub fn dir(&self) -> Vec3 {
        (self.pos2 - self.pos1).normalized()
    }

    pub fn len(&self) -> f64 {
        (self.pos2 - self.pos1).norm()
    }

    /// True if the two interpolations share a supporting point.
    ///
    /// Links between overlapping interpolations are refused by the
    /// assembler, since their matrix elements would be wrong.
    pub fn overlaps(&self, rhs: &PointInterpolated) -> bool {
        self.index1 == rhs.index1
            || self.index1 == rhs.index2
            || self.index2 == rhs.index1
            || self.index2 == rhs.index2
    }

    pub fn has_point(&self, pe: &PointExact) -> bool {
        self.index1 == pe.index || self.index2 == pe.index
    }
}

/// Either an exact model point or an interpolated one.
///
/// The interaction primitives are polymorphic over point identity; this
/// variant carries the per-point matrix indices and signed interpolation
/// coefficients they dispatch on.
#[derive(Clone, Copy, Debug)]
pub enum PointRef {
    Vertex(PointExact),
    Interpolated(PointInterpolated),
}

impl PointRef {
    pub fn pos(&self) -> Vec3 {
        match self {
            PointRef::Vertex(p) => p.pos,
            PointRef::Interpolated(p) => p.pos(),
        }
    }

    /// The supporting points with their interpolation weights.
    pub fn weights(&self) -> ([(usize, f64); 2], usize) {
        match self {
            PointRef::Vertex(p) => ([(p.index, 1.0), (0, 0.0)], 1),
            PointRef::Interpolated(p) => ([(p.index1, 1.0 - p.coef), (p.index2, p.coef)], 2),
        }
    }
}

impl From<PointExact> for PointRef {
    fn from(p: PointExact) -> PointRef {
        PointRef::Vertex(p)
    }
}

impl From<PointInterpolated> for PointRef {
    fn from(p: PointInterpolated) -> PointRef {
        PointRef::Interpolated(p)
    }
}
