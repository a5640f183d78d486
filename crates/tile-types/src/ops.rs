/// Transpose operator applied lazily to a matrix or tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// No transpose.
    NoTrans,
    /// Transpose.
    Trans,
    /// Conjugate transpose.
    ConjTrans,
}

impl Op {
    /// Whether rows and columns are swapped.
    #[inline]
    pub fn is_trans(self) -> bool {
        !matches!(self, Op::NoTrans)
    }

    /// Apply `other` on top of `self`.
    ///
    /// Returns `None` when the result would be a conjugate without a
    /// transpose, which cannot be expressed as an `Op`. For real scalars
    /// `Trans` and `ConjTrans` coincide, so mixing them always succeeds.
    pub fn compose(self, other: Op, is_complex: bool) -> Option<Op> {
        match (self, other) {
            (op, Op::NoTrans) | (Op::NoTrans, op) => Some(op),
            (Op::Trans, Op::Trans) | (Op::ConjTrans, Op::ConjTrans) => Some(Op::NoTrans),
            _ if !is_complex => Some(Op::NoTrans),
            _ => None,
        }
    }

    /// BLAS character code.
    pub fn as_char(self) -> char {
        match self {
            Op::NoTrans => 'N',
            Op::Trans => 'T',
            Op::ConjTrans => 'C',
        }
    }
}

/// Which triangle of a symmetric or triangular matrix is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uplo {
    /// Lower triangle.
    Lower,
    /// Upper triangle.
    Upper,
    /// Full (general) storage.
    General,
}

impl Uplo {
    /// The triangle seen through a transpose.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Uplo::Lower => Uplo::Upper,
            Uplo::Upper => Uplo::Lower,
            Uplo::General => Uplo::General,
        }
    }
}

/// Whether a triangular matrix has an implicit unit diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diag {
    /// Diagonal entries are read from storage.
    NonUnit,
    /// Diagonal entries are assumed to be one.
    Unit,
}

/// Side on which a triangular operand is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// op(A) X = alpha B
    Left,
    /// X op(A) = alpha B
    Right,
}

impl Side {
    /// The opposite side.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Memory layout of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Column-major (Fortran/BLAS convention).
    ColMajor,
    /// Row-major (C convention).
    RowMajor,
}

impl Layout {
    /// The other layout.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Layout::ColMajor => Layout::RowMajor,
            Layout::RowMajor => Layout::ColMajor,
        }
    }
}
