use crate::error::{blas_error_if, check_buffer, Result};
use crate::packing::op_element;
use tile_types::{Diag, Layout, Op, Scalar, Side, Uplo};

/// Triangular solve against one tile, overwriting `B` with `X`:
/// `op(A) X = alpha B` (`Side::Left`) or `X op(A) = alpha B` (`Side::Right`).
///
/// `B` is `m x n`; `A` is `m x m` on the left and `n x n` on the right. Only
/// the `uplo` triangle of `A` is referenced.
#[allow(clippy::too_many_arguments)]
pub fn trsm<T: Scalar>(
    layout: Layout,
    side: Side,
    uplo: Uplo,
    trans: Op,
    diag: Diag,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &mut [T],
    ldb: usize,
) -> Result<()> {
    blas_error_if!(uplo == Uplo::General, "uplo");

    // row-major B is column-major B^T, which turns the solve around
    let (side, uplo, m, n) = match layout {
        Layout::ColMajor => (side, uplo, m, n),
        Layout::RowMajor => (side.flip(), uplo.flip(), n, m),
    };

    let order = if side == Side::Left { m } else { n };
    check_buffer("A", a.len(), order, order, lda)?;
    check_buffer("B", b.len(), m, n, ldb)?;

    // triangle of op(A) actually seen by the solve
    let lower = (uplo == Uplo::Lower) != trans.is_trans();
    let t = |i: usize, j: usize| -> T {
        // SAFETY: i, j < order, checked against `a` above
        unsafe { op_element(a.as_ptr(), i, j, lda, trans) }
    };
    let pivot = |i: usize| -> T {
        if diag == Diag::Unit {
            T::one()
        } else {
            t(i, i)
        }
    };

    if !alpha.is_zero() && alpha != T::one() {
        for j in 0..n {
            for i in 0..m {
                b[i + j * ldb] *= alpha;
            }
        }
    } else if alpha.is_zero() {
        for j in 0..n {
            for i in 0..m {
                b[i + j * ldb] = T::zero();
            }
        }
        return Ok(());
    }

    match side {
        Side::Left => {
            for col in 0..n {
                let x = &mut b[col * ldb..col * ldb + m];
                if lower {
                    for i in 0..m {
                        let mut s = x[i];
                        for p in 0..i {
                            s -= t(i, p) * x[p];
                        }
                        x[i] = s / pivot(i);
                    }
                } else {
                    for i in (0..m).rev() {
                        let mut s = x[i];
                        for p in i + 1..m {
                            s -= t(i, p) * x[p];
                        }
                        x[i] = s / pivot(i);
                    }
                }
            }
        }
        Side::Right => {
            for row in 0..m {
                if lower {
                    for j in (0..n).rev() {
                        let mut s = b[row + j * ldb];
                        for p in j + 1..n {
                            s -= b[row + p * ldb] * t(p, j);
                        }
                        b[row + j * ldb] = s / pivot(j);
                    }
                } else {
                    for j in 0..n {
                        let mut s = b[row + j * ldb];
                        for p in 0..j {
                            s -= b[row + p * ldb] * t(p, j);
                        }
                        b[row + j * ldb] = s / pivot(j);
                    }
                }
            }
        }
    }
    Ok(())
}
