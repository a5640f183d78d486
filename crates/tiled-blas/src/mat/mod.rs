//! Distributed tiled matrices.
//!
//! A [`Matrix`] is a cheap view (tile offsets, extent and a lazily applied
//! [`Op`]) onto shared [`Storage`](storage::Storage). All coordinates taken
//! by the public methods are tile indices of `op(view)`.

mod bcast;
mod distribution;
mod storage;
mod tile;
mod views;

pub use bcast::BcastList;
pub use distribution::{Context, Distribution};
pub use tile::{conj_transpose as conj_transpose_tile, transpose as transpose_tile};
pub use tile::{Location, Tile, TileBuffer, TileState};
pub use views::{conj_transpose, transpose, OpView, SymmetricMatrix, TriangularMatrix};

use crate::device::ComputeQueue;
use crate::error::{Error, Result};
use storage::Storage;
use std::sync::Arc;
use tile_types::{Layout, Op, Scalar, Uplo};

/// View of a block-cyclically distributed matrix.
#[derive(Clone)]
pub struct Matrix<T> {
    storage: Arc<Storage<T>>,
    ioffset: usize,
    joffset: usize,
    // extent in stored orientation
    mt: usize,
    nt: usize,
    op: Op,
}

impl<T: Scalar> Matrix<T> {
    /// Empty `m x n` matrix of `nb x nb` tiles. No tile is allocated.
    pub fn new(
        m: usize,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        Self::with_uplo(m, n, nb, Uplo::General, dist, ctx)
    }

    pub(crate) fn with_uplo(
        m: usize,
        n: usize,
        nb: usize,
        uplo: Uplo,
        dist: Distribution,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        let storage = Arc::new(Storage::new(m, n, nb, uplo, dist, ctx)?);
        Ok(Self {
            mt: storage.mt,
            nt: storage.nt,
            storage,
            ioffset: 0,
            joffset: 0,
            op: Op::NoTrans,
        })
    }

    /// Matrix whose local tiles hold `f(row, col)` for global element indices.
    pub fn from_fn<F>(
        m: usize,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
        f: F,
    ) -> Result<Self>
    where
        F: Fn(usize, usize) -> T,
    {
        let a = Self::new(m, n, nb, dist, ctx)?;
        a.insert_local_tiles_with(f)?;
        Ok(a)
    }

    /// Matrix with zeroed local tiles.
    pub fn zeros(
        m: usize,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        Self::from_fn(m, n, nb, dist, ctx, |_, _| T::zero())
    }

    /// Allocate every local tile of the stored triangle, zeroed.
    pub fn insert_local_tiles(&self) -> Result<()> {
        self.insert_local_tiles_with(|_, _| T::zero())
    }

    /// Allocate every local tile of the stored triangle with `f(row, col)`.
    /// Operates on the whole underlying matrix, not just this view.
    pub fn insert_local_tiles_with<F>(&self, f: F) -> Result<()>
    where
        F: Fn(usize, usize) -> T,
    {
        let s = &self.storage;
        for gj in 0..s.nt {
            for gi in 0..s.mt {
                if !s.in_triangle(gi, gj) || !s.tile_is_local(gi, gj) {
                    continue;
                }
                let (rows, cols) = (s.tile_mb(gi), s.tile_nb(gj));
                let mut data = Vec::with_capacity(rows * cols);
                for c in 0..cols {
                    for r in 0..rows {
                        data.push(f(gi * s.nb + r, gj * s.nb + c));
                    }
                }
                s.insert(gi, gj, rows, cols, data)?;
            }
        }
        Ok(())
    }

    /// Replace tile `(i, j)` with a column-major `rows x cols` buffer.
    ///
    /// The shape is not checked against the grid, so a tile of the wrong
    /// size can be planted on purpose.
    pub fn tile_insert(
        &self,
        i: usize,
        j: usize,
        rows: usize,
        cols: usize,
        data: Vec<T>,
    ) -> Result<()> {
        let (gi, gj) = self.global(i, j);
        self.storage.insert(gi, gj, rows, cols, data)
    }

    pub(crate) fn global(&self, i: usize, j: usize) -> (usize, usize) {
        if self.op == Op::NoTrans {
            (self.ioffset + i, self.joffset + j)
        } else {
            (self.ioffset + j, self.joffset + i)
        }
    }

    pub(crate) fn storage_id(&self) -> u64 {
        self.storage.id
    }

    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.storage.ctx
    }

    pub fn mt(&self) -> usize {
        if self.op == Op::NoTrans {
            self.mt
        } else {
            self.nt
        }
    }

    pub fn nt(&self) -> usize {
        if self.op == Op::NoTrans {
            self.nt
        } else {
            self.mt
        }
    }

    /// Rows in block row `i`.
    pub fn tile_mb(&self, i: usize) -> usize {
        if self.op == Op::NoTrans {
            self.storage.tile_mb(self.ioffset + i)
        } else {
            self.storage.tile_nb(self.joffset + i)
        }
    }

    /// Columns in block column `j`.
    pub fn tile_nb(&self, j: usize) -> usize {
        if self.op == Op::NoTrans {
            self.storage.tile_nb(self.joffset + j)
        } else {
            self.storage.tile_mb(self.ioffset + j)
        }
    }

    pub fn m(&self) -> usize {
        (0..self.mt()).map(|i| self.tile_mb(i)).sum()
    }

    pub fn n(&self) -> usize {
        (0..self.nt()).map(|j| self.tile_nb(j)).sum()
    }

    pub fn op(&self) -> Op {
        self.op
    }

    /// Layout of the origin tiles.
    pub fn layout(&self) -> Layout {
        Layout::ColMajor
    }

    /// Stored triangle of the underlying matrix.
    pub fn uplo_physical(&self) -> Uplo {
        self.storage.uplo
    }

    pub fn distribution(&self) -> Distribution {
        self.storage.dist
    }

    pub fn num_devices(&self) -> usize {
        self.storage.ctx.devices().num_devices()
    }

    pub fn compute_queue(&self, device: usize, index: usize) -> Result<Arc<ComputeQueue>> {
        self.storage.ctx.devices().queue(device, index)
    }

    /// Sub-matrix of block rows `i1..=i2` and block columns `j1..=j2`.
    pub fn sub(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        let rows = (i2 + 1).saturating_sub(i1);
        let cols = (j2 + 1).saturating_sub(j1);
        let mut view = self.clone();
        if self.op == Op::NoTrans {
            view.ioffset += i1;
            view.joffset += j1;
            view.mt = rows;
            view.nt = cols;
        } else {
            view.ioffset += j1;
            view.joffset += i1;
            view.mt = cols;
            view.nt = rows;
        }
        view
    }

    pub(crate) fn with_op(&self, outer: Op) -> Result<Self> {
        let op = self.op.compose(outer, T::IS_COMPLEX).ok_or_else(|| {
            Error::invalid(
                "op",
                format!("{:?} of a {:?} matrix is not a transpose", outer, self.op),
            )
        })?;
        Ok(Self { op, ..self.clone() })
    }

    pub fn tile_rank(&self, i: usize, j: usize) -> usize {
        let (gi, gj) = self.global(i, j);
        self.storage.tile_rank(gi, gj)
    }

    pub fn tile_is_local(&self, i: usize, j: usize) -> bool {
        let (gi, gj) = self.global(i, j);
        self.storage.tile_is_local(gi, gj)
    }

    pub fn tile_device(&self, i: usize, j: usize) -> usize {
        let (gi, gj) = self.global(i, j);
        self.storage.tile_device(gi, gj)
    }

    pub fn tile_exists(&self, i: usize, j: usize, location: Location) -> bool {
        let (gi, gj) = self.global(i, j);
        self.storage.exists(gi, gj, location)
    }

    pub fn tile_get_for_reading(
        &self,
        i: usize,
        j: usize,
        location: Location,
        layout: Layout,
    ) -> Result<()> {
        let (gi, gj) = self.global(i, j);
        self.storage.get_for_reading(gi, gj, location, layout)
    }

    pub fn tile_get_for_writing(
        &self,
        i: usize,
        j: usize,
        location: Location,
        layout: Layout,
    ) -> Result<()> {
        let (gi, gj) = self.global(i, j);
        self.storage.get_for_writing(gi, gj, location, layout)
    }

    /// Fetch a set of tiles for reading on `device`.
    pub fn tile_get_set_for_reading(
        &self,
        set: &[(usize, usize)],
        device: usize,
        layout: Layout,
    ) -> Result<()> {
        let loc = Location::Device(device);
        set.iter()
            .try_for_each(|&(i, j)| self.tile_get_for_reading(i, j, loc, layout))
    }

    /// Fetch a set of tiles for writing on `device`.
    pub fn tile_get_set_for_writing(
        &self,
        set: &[(usize, usize)],
        device: usize,
        layout: Layout,
    ) -> Result<()> {
        let loc = Location::Device(device);
        set.iter()
            .try_for_each(|&(i, j)| self.tile_get_for_writing(i, j, loc, layout))
    }

    /// Host handle of tile `(i, j)`, with this view's op applied.
    pub fn tile(&self, i: usize, j: usize) -> Result<Tile<T>> {
        self.tile_on(i, j, Location::Host)
    }

    /// Handle of the instance of tile `(i, j)` at `location`.
    pub fn tile_on(&self, i: usize, j: usize, location: Location) -> Result<Tile<T>> {
        let (gi, gj) = self.global(i, j);
        let mut tile = self.storage.handle(gi, gj, location)?;
        tile.op = self.op;
        Ok(tile)
    }

    /// Pending uses of a received remote copy.
    pub fn tile_life(&self, i: usize, j: usize) -> i64 {
        let (gi, gj) = self.global(i, j);
        self.storage.life(gi, gj)
    }

    /// Record one finished use of tile `(i, j)`.
    pub fn tile_tick(&self, i: usize, j: usize) {
        let (gi, gj) = self.global(i, j);
        self.storage.tick(gi, gj)
    }

    /// Ticks recorded against tile `(i, j)` since the last reset.
    pub fn tile_tick_count(&self, i: usize, j: usize) -> u64 {
        let (gi, gj) = self.global(i, j);
        self.storage.tick_count(gi, gj)
    }

    pub fn reset_tick_counts(&self) {
        self.storage.reset_tick_counts()
    }

    pub fn tile_release(&self, i: usize, j: usize, device: usize) {
        let (gi, gj) = self.global(i, j);
        self.storage.release(gi, gj, device)
    }

    /// Copy every modified device instance back to its host origin.
    pub fn tile_update_all_origin(&self) -> Result<()> {
        self.storage.update_all_origin()
    }

    /// Drop received remote copies and device copies.
    pub fn release_workspace(&self) {
        self.storage.release_workspace()
    }

    /// Convert every instance back to the matrix layout.
    pub fn tile_layout_reset(&self) -> Result<()> {
        self.storage.layout_reset()
    }

    /// Number of workspace instances currently held by this process.
    pub fn workspace_tiles(&self) -> usize {
        self.storage.workspace_count()
    }

    /// Column-major `m x n` copy of `op(view)` built from the tiles this
    /// process holds; everything else is zero. Summing the results of every
    /// rank gives the full matrix.
    pub fn to_dense(&self) -> Vec<T> {
        let (m, n) = (self.m(), self.n());
        let mut dense = vec![T::zero(); m * n];
        let mut col0 = 0;
        for j in 0..self.nt() {
            let mut row0 = 0;
            for i in 0..self.mt() {
                let (gi, gj) = self.global(i, j);
                if self.storage.tile_is_local(gi, gj) {
                    if let Some((rows, _, data)) = self.storage.snapshot(gi, gj) {
                        for c in 0..self.tile_nb(j) {
                            for r in 0..self.tile_mb(i) {
                                let v = match self.op {
                                    Op::NoTrans => data[r + c * rows],
                                    Op::Trans => data[c + r * rows],
                                    Op::ConjTrans => data[c + r * rows].conj(),
                                };
                                dense[row0 + r + (col0 + c) * m] = v;
                            }
                        }
                    }
                }
                row0 += self.tile_mb(i);
            }
            col0 += self.tile_nb(j);
        }
        dense
    }
}

impl<T> std::fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matrix")
            .field("id", &self.storage.id)
            .field("ioffset", &self.ioffset)
            .field("joffset", &self.joffset)
            .field("mt", &self.mt)
            .field("nt", &self.nt)
            .field("op", &self.op)
            .finish()
    }
}
