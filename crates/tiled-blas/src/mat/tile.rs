use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tile_types::{Layout, Op, Scalar, Uplo};

/// Shared, lock-protected tile data.
pub type TileBuffer<T> = Arc<RwLock<Vec<T>>>;

/// Where a tile instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Host,
    Device(usize),
}

/// Coherence state of one tile instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Up to date.
    Valid,
    /// Up to date and newer than every other instance.
    Modified,
    /// Stale; must be refreshed before use.
    Invalid,
}

/// Handle to one instance of a tile.
///
/// Cloning is cheap; clones share the buffer. `rows`/`cols` are the stored
/// (physical) dimensions, `op` is applied lazily, and `uplo` is the stored
/// triangle for diagonal tiles of symmetric or triangular matrices.
#[derive(Debug, Clone)]
pub struct Tile<T> {
    pub(crate) data: TileBuffer<T>,
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) stride: usize,
    pub(crate) op: Op,
    pub(crate) uplo: Uplo,
    pub(crate) layout: Layout,
    pub(crate) location: Location,
}

impl<T: Scalar> Tile<T> {
    /// Rows of `op(tile)`.
    pub fn mb(&self) -> usize {
        if self.op == Op::NoTrans {
            self.rows
        } else {
            self.cols
        }
    }

    /// Columns of `op(tile)`.
    pub fn nb(&self) -> usize {
        if self.op == Op::NoTrans {
            self.cols
        } else {
            self.rows
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn uplo_physical(&self) -> Uplo {
        self.uplo
    }

    /// Triangle as seen through `op`.
    pub fn uplo(&self) -> Uplo {
        if self.op == Op::NoTrans {
            self.uplo
        } else {
            self.uplo.flip()
        }
    }

    pub fn buffer(&self) -> &TileBuffer<T> {
        &self.data
    }

    /// Whether two handles share one buffer.
    pub fn same_buffer(&self, other: &Tile<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    fn with_op(&self, outer: Op) -> Result<Self> {
        let op = self.op.compose(outer, T::IS_COMPLEX).ok_or_else(|| {
            Error::invalid(
                "op",
                format!("{:?} of a {:?} tile is not a transpose", outer, self.op),
            )
        })?;
        Ok(Tile { op, ..self.clone() })
    }

    /// Element `(i, j)` of `op(tile)`.
    pub fn at(&self, i: usize, j: usize) -> T {
        let (r, c) = if self.op == Op::NoTrans { (i, j) } else { (j, i) };
        let idx = match self.layout {
            Layout::ColMajor => r + c * self.stride,
            Layout::RowMajor => r * self.stride + c,
        };
        let v = self.data.read_recursive()[idx];
        if self.op == Op::ConjTrans {
            v.conj()
        } else {
            v
        }
    }
}

/// Transposed view of a tile; shares data.
pub fn transpose<T: Scalar>(tile: &Tile<T>) -> Result<Tile<T>> {
    tile.with_op(Op::Trans)
}

/// Conjugate-transposed view of a tile; shares data.
pub fn conj_transpose<T: Scalar>(tile: &Tile<T>) -> Result<Tile<T>> {
    tile.with_op(Op::ConjTrans)
}

/// Leading dimension of a compact `rows x cols` buffer in `layout`.
pub(crate) fn compact_stride(rows: usize, cols: usize, layout: Layout) -> usize {
    match layout {
        Layout::ColMajor => rows.max(1),
        Layout::RowMajor => cols.max(1),
    }
}

/// Copy a compact buffer into `to` layout.
pub(crate) fn convert_layout<T: Scalar>(
    data: &[T],
    rows: usize,
    cols: usize,
    from: Layout,
    to: Layout,
) -> Result<Vec<T>> {
    if from == to {
        return Ok(data.to_vec());
    }
    let mut out = vec![T::zero(); rows * cols];
    // a row-major r x c buffer is a column-major c x r buffer
    let (m, n) = match from {
        Layout::ColMajor => (rows, cols),
        Layout::RowMajor => (cols, rows),
    };
    tile_kernels::transpose(m, n, data, m.max(1), &mut out, n.max(1), false)?;
    Ok(out)
}
