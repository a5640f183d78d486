//! Scalar types and BLAS enumerations shared by the tiled linear-algebra crates.
//!
//! | Type | Role |
//! |------|------|
//! | [`Scalar`] | element type of a tile: `f32`, `f64`, `Complex<f32>`, `Complex<f64>` |
//! | [`Op`] | lazily applied transpose operator |
//! | [`Uplo`] | stored triangle |
//! | [`Diag`] | unit / non-unit diagonal |
//! | [`Side`] | side of a triangular operand |
//! | [`Layout`] | row- or column-major storage |
//!
//! # Example
//!
//! ```
//! use tile_types::{Complex, Op, Scalar};
//!
//! let z = Complex::<f64>::new(1.0, 2.0);
//! assert_eq!(z.conj().im, -2.0);
//!
//! // transpose of a transpose is the identity
//! assert_eq!(Op::Trans.compose(Op::Trans, true), Some(Op::NoTrans));
//! ```

mod ops;
mod scalar;

pub use num_complex::Complex;
pub use ops::{Diag, Layout, Op, Side, Uplo};
pub use scalar::{RealScalar, Scalar};

/// Single-precision complex scalar.
pub type C32 = Complex<f32>;
/// Double-precision complex scalar.
pub type C64 = Complex<f64>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::{Complex, Diag, Layout, Op, RealScalar, Scalar, Side, Uplo, C32, C64};
}
