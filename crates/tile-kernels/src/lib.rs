//! Single-tile dense kernels for the tiled BLAS engine.
//!
//! Every kernel works on one column-major tile (or a batch of same-shape
//! tiles) addressed by a slice and a leading dimension. Row-major requests
//! are folded onto the column-major code by the usual transpose identities.
//!
//! - [`gemm`]: BLIS-style blocked multiply with packed panels and a
//!   runtime-selected SIMD microkernel for `f32`/`f64`
//! - [`syrk`]: symmetric rank-k update of one triangle
//! - [`trsm`]: triangular solve against one tile
//! - [`transpose`], [`transpose_in_place`]: layout conversion
//! - [`gemm_batch`], [`syrk_batch`], [`trsm_batch`]: uniform-shape batches
//!
//! ```
//! use tile_kernels::gemm;
//! use tile_types::{Layout, Op};
//!
//! let a = [1.0f64, 3.0, 2.0, 4.0];
//! let b = [1.0f64, 0.0, 0.0, 1.0];
//! let mut c = [0.0f64; 4];
//! gemm(Layout::ColMajor, Op::NoTrans, Op::NoTrans, 2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2)?;
//! assert_eq!(c, a);
//! # Ok::<(), tile_kernels::BlasError>(())
//! ```

mod batch;
mod blocking;
mod error;
mod gemm;
mod kernel;
mod packing;
pub mod simd;
mod syrk;
mod transpose;
mod trsm;

pub use batch::{gemm_batch, syrk_batch, trsm_batch, GemmGroup, SyrkGroup, TrsmGroup};
pub use blocking::{blocks, CacheBlocking};
pub use error::{BlasError, Result};
pub use gemm::{gemm, gemm_inner, gemm_portable};
pub use kernel::{Microkernel, PortableMicrokernel};
pub use packing::{pack_a, pack_b, packed_a_size, packed_b_size};
pub use simd::KernelDispatch;
pub use syrk::syrk;
pub use transpose::{transpose, transpose_in_place};
pub use trsm::trsm;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use tile_types::{Layout, Op};

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::NoTrans), Just(Op::Trans)]
    }

    proptest! {
        #[test]
        fn gemm_layouts_agree(
            m in 1usize..9,
            n in 1usize..9,
            k in 1usize..9,
            opa in op_strategy(),
            opb in op_strategy(),
            seed in 0u32..1000,
        ) {
            let val = |i: usize| (((i as u32 * 7919 + seed) % 17) as f64) - 8.0;
            let (ar, ac) = if opa == Op::NoTrans { (m, k) } else { (k, m) };
            let (br, bc) = if opb == Op::NoTrans { (k, n) } else { (n, k) };
            let a_col: Vec<f64> = (0..ar * ac).map(val).collect();
            let b_col: Vec<f64> = (0..br * bc).map(|i| val(i + 1000)).collect();

            // same matrices stored row-major
            let mut a_row = vec![0.0; ar * ac];
            transpose(ar, ac, &a_col, ar, &mut a_row, ac, false).unwrap();
            let mut b_row = vec![0.0; br * bc];
            transpose(br, bc, &b_col, br, &mut b_row, bc, false).unwrap();

            let mut c_col = vec![0.0; m * n];
            let mut c_row = vec![0.0; m * n];
            gemm(
                Layout::ColMajor,
                opa,
                opb,
                m,
                n,
                k,
                1.0,
                &a_col,
                ar,
                &b_col,
                br,
                0.0,
                &mut c_col,
                m,
            )
            .unwrap();
            gemm(
                Layout::RowMajor,
                opa,
                opb,
                m,
                n,
                k,
                1.0,
                &a_row,
                ac,
                &b_row,
                bc,
                0.0,
                &mut c_row,
                n,
            )
            .unwrap();

            let mut c_back = vec![0.0; m * n];
            transpose(n, m, &c_row, n, &mut c_back, m, false).unwrap();
            prop_assert_eq!(c_col, c_back);
        }

        #[test]
        fn syrk_matches_gemm_lower(n in 1usize..8, k in 1usize..8, seed in 0u32..1000) {
            let a: Vec<f64> = (0..n * k)
                .map(|i| (((i as u32 * 31 + seed) % 13) as f64) - 6.0)
                .collect();
            let mut c_syrk = vec![0.0; n * n];
            let mut c_gemm = vec![0.0; n * n];
            syrk(
                Layout::ColMajor,
                tile_types::Uplo::Lower,
                Op::NoTrans,
                n,
                k,
                1.0,
                &a,
                n,
                0.0,
                &mut c_syrk,
                n,
            )
            .unwrap();
            gemm(
                Layout::ColMajor,
                Op::NoTrans,
                Op::Trans,
                n,
                n,
                k,
                1.0,
                &a,
                n,
                &a,
                n,
                0.0,
                &mut c_gemm,
                n,
            )
            .unwrap();
            for j in 0..n {
                for i in j..n {
                    prop_assert_eq!(c_syrk[i + j * n], c_gemm[i + j * n]);
                }
            }
        }
    }
}
