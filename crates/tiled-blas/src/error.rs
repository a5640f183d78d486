//! Error taxonomy of the engine.

use crate::mat::Location;
use crate::options::Target;
use thiserror::Error;
use tile_kernels::BlasError;

/// Errors raised by the tiled operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Illegal combination of triangle, transpose or shape. Raised at
    /// dispatch time, before any tile is touched.
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: &'static str, reason: String },

    /// The requested target is not available in this build. Raised before
    /// any tile is touched.
    #[error("target {target:?} not supported: {reason}")]
    NotSupported { target: Target, reason: String },

    /// One or more concurrent units failed. Raised once, after every unit of
    /// the enclosing join has finished.
    #[error("{failures} compute unit(s) failed, first in {unit}: {source}")]
    ComputeFailure {
        /// First failing unit, e.g. `syrk tile (2, 1)` or `device 0`.
        unit: String,
        /// Number of failing units.
        failures: usize,
        #[source]
        source: Box<Error>,
    },

    /// A tile kernel rejected its arguments.
    #[error("kernel error: {0}")]
    Kernel(#[from] BlasError),

    /// Tile-level shape or layout disagreement.
    #[error("tile mismatch: {0}")]
    TileMismatch(String),

    /// No valid instance of a tile exists where one was required.
    #[error("tile ({i}, {j}) has no valid instance for {location:?}")]
    TileNotFound {
        i: usize,
        j: usize,
        location: Location,
    },

    /// Message passing failed.
    #[error("communication error: {0}")]
    Comm(String),

    /// A device queue failed outside a kernel.
    #[error("device error: {0}")]
    Device(String),

    /// The worker pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(arg: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}

/// Bail out with `InvalidArgument` when `cond` holds.
macro_rules! invalid_if {
    ($cond:expr, $arg:literal) => {
        if $cond {
            return Err($crate::error::Error::invalid($arg, stringify!($cond)));
        }
    };
    ($cond:expr, $arg:literal, $($fmt:tt)+) => {
        if $cond {
            return Err($crate::error::Error::invalid($arg, format!($($fmt)+)));
        }
    };
}

pub(crate) use invalid_if;
