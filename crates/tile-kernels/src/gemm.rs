use crate::error::{check_buffer, Result};
use crate::kernel::{Microkernel, PortableMicrokernel};
use crate::packing::{op_offset, pack_a, pack_b, packed_a_size, packed_b_size};
use crate::simd::KernelDispatch;
use crate::blocking::{blocks, CacheBlocking};
use tile_types::{Layout, Op, Scalar};

/// Tile multiply: `C = alpha * op(A) * op(B) + beta * C`.
///
/// `op(A)` is `m x k`, `op(B)` is `k x n`, `C` is `m x n`. Storage is
/// interpreted in `layout`; row-major requests are mapped onto the
/// column-major kernel through `C^T = op(B)^T op(A)^T`.
///
/// Selects a SIMD microkernel for real element types when the CPU supports
/// one.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: KernelDispatch>(
    layout: Layout,
    opa: Op,
    opb: Op,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    if layout == Layout::RowMajor {
        return gemm(
            Layout::ColMajor,
            opb,
            opa,
            n,
            m,
            k,
            alpha,
            b,
            ldb,
            a,
            lda,
            beta,
            c,
            ldc,
        );
    }

    let (a_rows, a_cols) = if opa == Op::NoTrans { (m, k) } else { (k, m) };
    let (b_rows, b_cols) = if opb == Op::NoTrans { (k, n) } else { (n, k) };
    check_buffer("A", a.len(), a_rows, a_cols, lda)?;
    check_buffer("B", b.len(), b_rows, b_cols, ldb)?;
    check_buffer("C", c.len(), m, n, ldc)?;

    unsafe {
        T::dispatch_gemm(
            opa,
            opb,
            m,
            n,
            k,
            alpha,
            a.as_ptr(),
            lda,
            b.as_ptr(),
            ldb,
            beta,
            c.as_mut_ptr(),
            ldc,
        );
    }
    Ok(())
}

/// Column-major tile multiply with the portable microkernel.
///
/// # Safety
/// All pointers must be valid for the given shapes and leading dimensions,
/// and `c` must not alias `a` or `b`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn gemm_portable<T: Scalar>(
    opa: Op,
    opb: Op,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    b: *const T,
    ldb: usize,
    beta: T,
    c: *mut T,
    ldc: usize,
) {
    gemm_inner::<T, PortableMicrokernel>(
        opa,
        opb,
        m,
        n,
        k,
        alpha,
        a,
        lda,
        b,
        ldb,
        beta,
        c,
        ldc,
        &CacheBlocking::PORTABLE,
        &PortableMicrokernel,
    );
}

/// Blocked column-major multiply with a caller-chosen microkernel.
///
/// # Safety
/// Same requirements as [`gemm_portable`].
#[allow(clippy::too_many_arguments)]
pub unsafe fn gemm_inner<T: Scalar, K: Microkernel<T>>(
    opa: Op,
    opb: Op,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    b: *const T,
    ldb: usize,
    beta: T,
    c: *mut T,
    ldc: usize,
    params: &CacheBlocking,
    kernel: &K,
) {
    if m == 0 || n == 0 {
        return;
    }
    if k == 0 || alpha.is_zero() {
        scale(m, n, beta, c, ldc);
        return;
    }

    let mut packed_a = vec![T::zero(); packed_a_size(params.mc, params.kc, K::MR)];
    let mut packed_b = vec![T::zero(); packed_b_size(params.kc, params.nc, K::NR)];

    for (jc, nc) in blocks(n, params.nc) {
        for (pc, kc) in blocks(k, params.kc) {
            // later k blocks accumulate onto the first
            let beta_k = if pc == 0 { beta } else { T::one() };

            pack_b(
                kc,
                nc,
                b.add(op_offset(pc, jc, ldb, opb)),
                ldb,
                opb,
                packed_b.as_mut_ptr(),
                K::NR,
            );

            for (ic, mc) in blocks(m, params.mc) {
                pack_a(
                    mc,
                    kc,
                    a.add(op_offset(ic, pc, lda, opa)),
                    lda,
                    opa,
                    packed_a.as_mut_ptr(),
                    K::MR,
                );

                for jr in 0..nc.div_ceil(K::NR) {
                    let j_start = jr * K::NR;
                    let nr = (nc - j_start).min(K::NR);

                    for ir in 0..mc.div_ceil(K::MR) {
                        let i_start = ir * K::MR;
                        let mr = (mc - i_start).min(K::MR);

                        let a_ptr = packed_a.as_ptr().add(ir * K::MR * kc);
                        let b_ptr = packed_b.as_ptr().add(jr * K::NR * kc);
                        let c_ptr = c.add((ic + i_start) + (jc + j_start) * ldc);

                        kernel.execute(mr, nr, kc, alpha, a_ptr, b_ptr, beta_k, c_ptr, ldc);
                    }
                }
            }
        }
    }
}

/// `C = beta * C`, writing zeros without reading when `beta == 0`.
unsafe fn scale<T: Scalar>(m: usize, n: usize, beta: T, c: *mut T, ldc: usize) {
    for j in 0..n {
        for i in 0..m {
            let p = c.add(i + j * ldc);
            *p = if beta.is_zero() { T::zero() } else { beta * *p };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlasError;
    use tile_types::Complex;

    /// Dense column-major reference with the same accumulation order.
    fn reference<T: Scalar>(
        opa: Op,
        opb: Op,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &[T],
        ldb: usize,
        beta: T,
        c: &mut [T],
        ldc: usize,
    ) {
        for j in 0..n {
            for i in 0..m {
                let mut acc = T::zero();
                for p in 0..k {
                    let av = unsafe { crate::packing::op_element(a.as_ptr(), i, p, lda, opa) };
                    let bv = unsafe { crate::packing::op_element(b.as_ptr(), p, j, ldb, opb) };
                    acc += av * bv;
                }
                let cij = &mut c[i + j * ldc];
                *cij = if beta.is_zero() {
                    alpha * acc
                } else {
                    alpha * acc + beta * *cij
                };
            }
        }
    }

    fn fill(len: usize, seed: f64) -> Vec<f64> {
        (0..len).map(|i| ((i as f64 + seed) * 0.37).sin()).collect()
    }

    #[test]
    fn test_gemm_small_exact() {
        // A = [[1, 2], [3, 4]], B = [[5, 6], [7, 8]] column-major
        let a = [1.0f64, 3.0, 2.0, 4.0];
        let b = [5.0f64, 7.0, 6.0, 8.0];
        let mut c = [0.0f64; 4];
        gemm(Layout::ColMajor, Op::NoTrans, Op::NoTrans, 2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2)
            .unwrap();
        assert_eq!(c, [19.0, 43.0, 22.0, 50.0]);
    }

    #[test]
    fn test_gemm_all_ops_match_reference() {
        let (m, n, k) = (7, 5, 9);
        for opa in [Op::NoTrans, Op::Trans] {
            for opb in [Op::NoTrans, Op::Trans] {
                let lda = if opa == Op::NoTrans { m } else { k };
                let ldb = if opb == Op::NoTrans { k } else { n };
                let a = fill(lda * if opa == Op::NoTrans { k } else { m }, 1.0);
                let b = fill(ldb * if opb == Op::NoTrans { n } else { k }, 2.0);
                let mut c = fill(m * n, 3.0);
                let mut expected = c.clone();

                gemm(Layout::ColMajor, opa, opb, m, n, k, 0.5, &a, lda, &b, ldb, -1.5, &mut c, m)
                    .unwrap();
                reference(opa, opb, m, n, k, 0.5, &a, lda, &b, ldb, -1.5, &mut expected, m);

                for (x, y) in c.iter().zip(&expected) {
                    assert!((x - y).abs() < 1e-12, "opa={:?} opb={:?}: {} vs {}", opa, opb, x, y);
                }
            }
        }
    }

    #[test]
    fn test_gemm_beta_zero_ignores_nan() {
        let a = [1.0f64; 4];
        let b = [1.0f64; 4];
        let mut c = [f64::NAN; 4];
        gemm(Layout::ColMajor, Op::NoTrans, Op::NoTrans, 2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2)
            .unwrap();
        assert_eq!(c, [2.0; 4]);
    }

    #[test]
    fn test_gemm_k_zero_scales() {
        let mut c = [2.0f64, 4.0];
        gemm::<f64>(
            Layout::ColMajor,
            Op::NoTrans,
            Op::NoTrans,
            2,
            1,
            0,
            1.0,
            &[],
            2,
            &[],
            1,
            0.5,
            &mut c,
            2,
        )
        .unwrap();
        assert_eq!(c, [1.0, 2.0]);
    }

    #[test]
    fn test_gemm_row_major() {
        // row-major A = [[1, 2], [3, 4]], B = [[5, 6], [7, 8]]
        let a = [1.0f64, 2.0, 3.0, 4.0];
        let b = [5.0f64, 6.0, 7.0, 8.0];
        let mut c = [0.0f64; 4];
        gemm(Layout::RowMajor, Op::NoTrans, Op::NoTrans, 2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2)
            .unwrap();
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_gemm_complex_conj_trans() {
        let a = [Complex::new(1.0f64, 2.0)];
        let b = [Complex::new(3.0f64, -1.0)];
        let mut c = [Complex::new(0.0f64, 0.0)];
        gemm(
            Layout::ColMajor,
            Op::ConjTrans,
            Op::NoTrans,
            1,
            1,
            1,
            Complex::new(1.0, 0.0),
            &a,
            1,
            &b,
            1,
            Complex::new(0.0, 0.0),
            &mut c,
            1,
        )
        .unwrap();
        // (1 - 2i)(3 - i) = 1 - 7i
        assert_eq!(c[0], Complex::new(1.0, -7.0));
    }

    #[test]
    fn test_gemm_rejects_short_buffer() {
        let a = [1.0f64; 3];
        let b = [1.0f64; 4];
        let mut c = [0.0f64; 4];
        let err = gemm(
            Layout::ColMajor,
            Op::NoTrans,
            Op::NoTrans,
            2,
            2,
            2,
            1.0,
            &a,
            2,
            &b,
            2,
            0.0,
            &mut c,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, BlasError::DimensionMismatch(_)));
    }

    #[test]
    fn test_gemm_multiple_k_blocks() {
        let params = CacheBlocking { mc: 4, nc: 4, kc: 3 };
        let (m, n, k) = (6, 6, 10);
        let a = fill(m * k, 0.5);
        let b = fill(k * n, 1.5);
        let mut c = vec![0.0; m * n];
        let mut expected = c.clone();
        unsafe {
            gemm_inner::<f64, PortableMicrokernel>(
                Op::NoTrans,
                Op::NoTrans,
                m,
                n,
                k,
                1.0,
                a.as_ptr(),
                m,
                b.as_ptr(),
                k,
                0.0,
                c.as_mut_ptr(),
                m,
                &params,
                &PortableMicrokernel,
            );
        }
        reference(Op::NoTrans, Op::NoTrans, m, n, k, 1.0, &a, m, &b, k, 0.0, &mut expected, m);
        for (x, y) in c.iter().zip(&expected) {
            assert!((x - y).abs() < 1e-12);
        }
    }
}
