#[cfg(target_arch = "x86_64")]
use super::detect::simd_level;
#[cfg(target_arch = "x86_64")]
use super::kernels::*;
#[cfg(target_arch = "x86_64")]
use crate::gemm::gemm_inner;
use crate::gemm::gemm_portable;
#[cfg(target_arch = "x86_64")]
use crate::blocking::CacheBlocking;
use tile_types::{Complex, Op, Scalar};

/// Element types whose tile multiply can pick a microkernel at runtime.
///
/// Every engine entry point is bounded on this trait; it is implemented for
/// the four supported scalars.
pub trait KernelDispatch: Scalar {
    /// Column-major `C = alpha * op(A) * op(B) + beta * C` with the best
    /// kernel for this CPU.
    ///
    /// # Safety
    /// Same requirements as [`gemm_portable`].
    #[allow(clippy::too_many_arguments)]
    unsafe fn dispatch_gemm(
        opa: Op,
        opb: Op,
        m: usize,
        n: usize,
        k: usize,
        alpha: Self,
        a: *const Self,
        lda: usize,
        b: *const Self,
        ldb: usize,
        beta: Self,
        c: *mut Self,
        ldc: usize,
    );
}

macro_rules! impl_dispatch_simd {
    ($t:ty, $kernel:ident, $params:expr) => {
        impl KernelDispatch for $t {
            unsafe fn dispatch_gemm(
                opa: Op,
                opb: Op,
                m: usize,
                n: usize,
                k: usize,
                alpha: Self,
                a: *const Self,
                lda: usize,
                b: *const Self,
                ldb: usize,
                beta: Self,
                c: *mut Self,
                ldc: usize,
            ) {
                #[cfg(target_arch = "x86_64")]
                if simd_level().has_avx2() {
                    gemm_inner::<Self, _>(
                        opa, opb, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc, &$params,
                        &$kernel,
                    );
                    return;
                }
                gemm_portable(opa, opb, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc);
            }
        }
    };
}

impl_dispatch_simd!(f32, Avx2F32Kernel, CacheBlocking::AVX2_F32);
impl_dispatch_simd!(f64, Avx2F64Kernel, CacheBlocking::AVX2_F64);

macro_rules! impl_dispatch_portable {
    ($($t:ty),*) => {
        $(
            impl KernelDispatch for $t {
                unsafe fn dispatch_gemm(
                    opa: Op,
                    opb: Op,
                    m: usize,
                    n: usize,
                    k: usize,
                    alpha: Self,
                    a: *const Self,
                    lda: usize,
                    b: *const Self,
                    ldb: usize,
                    beta: Self,
                    c: *mut Self,
                    ldc: usize,
                ) {
                    gemm_portable(opa, opb, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc);
                }
            }
        )*
    };
}

impl_dispatch_portable!(Complex<f32>, Complex<f64>);
