//! Distributed tiled dense linear algebra.
//!
//! Matrices are split into square tiles spread block-cyclically over a grid
//! of processes. An operation becomes a graph of per-panel tasks: panel `k`
//! of the inputs is broadcast to the ranks that need it, then every rank
//! updates its own output tiles. Broadcasts run up to `lookahead` panels
//! ahead of the computation.
//!
//! Tile-level work runs on one of four [`Target`]s:
//!
//! | Target | Execution |
//! |--------|-----------|
//! | [`Target::HostTask`] | one task per output tile |
//! | [`Target::HostNest`] | diagonal tasks, then a flat parallel loop |
//! | [`Target::HostBatch`] | one batched host call per tile shape |
//! | [`Target::Devices`] | batched kernels on per-device compute queues |
//!
//! The choice of target never changes the result.
//!
//! # Example
//!
//! ```
//! use tiled_blas::prelude::*;
//!
//! let ctx = Context::local();
//! let dist = Distribution::single();
//! let a = Matrix::from_fn(6, 4, 2, dist, ctx.clone(), |i, j| (i + j) as f64)?;
//! let c = SymmetricMatrix::from_fn(Uplo::Lower, 6, 2, dist, ctx, |_, _| 0.0)?;
//!
//! let opts = Options::new().with_target(Target::HostNest).with_lookahead(1);
//! syrk(1.0, &a, 0.0, &c, &opts)?;
//!
//! let dense = c.to_dense();
//! // C(1, 0) = sum_p A(1, p) A(0, p) = 1*0 + 2*1 + 3*2 + 4*3
//! assert_eq!(dense[1], 20.0);
//! # Ok::<(), tiled_blas::Error>(())
//! ```

pub mod comm;
pub mod device;
mod driver;
mod error;
pub mod internal;
pub mod mat;
mod options;
pub mod scheduler;
pub mod tile_blas;

pub use comm::{Communicator, SelfComm, ThreadComm};
pub use device::{ComputeQueue, DeviceSet};
pub use driver::{gemm, syrk};
pub use error::{Error, Result};
pub use mat::{
    conj_transpose, transpose, BcastList, Context, Distribution, Location, Matrix, OpView,
    SymmetricMatrix, Tile, TileState, TriangularMatrix,
};
pub use options::{OptionKey, OptionValue, Options, Target, TileReleaseStrategy};
pub use tile_types::{Complex, Diag, Layout, Op, Scalar, Side, Uplo, C32, C64};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        conj_transpose, gemm, syrk, transpose, Context, Diag, Distribution, Error, Layout, Matrix,
        Op, Options, Result, Side, SymmetricMatrix, Target, TileReleaseStrategy, TriangularMatrix,
        Uplo,
    };
}
