use crate::error::{blas_error_if, check_buffer, Result};
use crate::packing::op_element;
use tile_types::{Layout, Op, Scalar, Uplo};

/// Symmetric rank-k update of one triangle:
/// `C = alpha * op(A) * op(A)^T + beta * C`.
///
/// `op(A)` is `n x k`. Only the `uplo` triangle of `C` is read or written.
/// `Trans` is the only transpose allowed for complex scalars; a conjugate
/// transpose would make the update Hermitian, which this kernel is not.
#[allow(clippy::too_many_arguments)]
pub fn syrk<T: Scalar>(
    layout: Layout,
    uplo: Uplo,
    trans: Op,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    blas_error_if!(uplo == Uplo::General, "uplo");
    blas_error_if!(T::IS_COMPLEX && trans == Op::ConjTrans, "trans");

    // for real scalars ConjTrans is Trans
    let trans = if trans == Op::ConjTrans { Op::Trans } else { trans };

    let (uplo, trans) = match layout {
        Layout::ColMajor => (uplo, trans),
        Layout::RowMajor => (
            uplo.flip(),
            if trans == Op::NoTrans { Op::Trans } else { Op::NoTrans },
        ),
    };

    let (a_rows, a_cols) = if trans == Op::NoTrans { (n, k) } else { (k, n) };
    check_buffer("A", a.len(), a_rows, a_cols, lda)?;
    check_buffer("C", c.len(), n, n, ldc)?;

    for j in 0..n {
        let rows = match uplo {
            Uplo::Lower => j..n,
            _ => 0..j + 1,
        };
        for i in rows {
            let mut acc = T::zero();
            for p in 0..k {
                // SAFETY: bounds checked against `a` above
                let (aip, ajp) = unsafe {
                    (
                        op_element(a.as_ptr(), i, p, lda, trans),
                        op_element(a.as_ptr(), j, p, lda, trans),
                    )
                };
                acc += aip * ajp;
            }
            let cij = &mut c[i + j * ldc];
            *cij = if beta.is_zero() {
                alpha * acc
            } else {
                alpha * acc + beta * *cij
            };
        }
    }
    Ok(())
}
