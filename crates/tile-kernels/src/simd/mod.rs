//! Runtime-dispatched SIMD microkernels for the tile multiply.

mod detect;
pub mod dispatch;
pub mod kernels;

pub use detect::{simd_level, SimdLevel};
pub use dispatch::KernelDispatch;
pub use kernels::*;
