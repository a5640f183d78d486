use crate::error::{blas_error_if, check_buffer, Result};
use tile_types::Scalar;

/// Out-of-place transpose: `AT = A^T` (or `A^H` when `conj`).
///
/// `A` is `m x n` column-major with stride `lda`; `AT` is `n x m` with
/// stride `ldat`.
pub fn transpose<T: Scalar>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    at: &mut [T],
    ldat: usize,
    conj: bool,
) -> Result<()> {
    check_buffer("A", a.len(), m, n, lda)?;
    check_buffer("AT", at.len(), n, m, ldat)?;

    for j in 0..n {
        for i in 0..m {
            let v = a[i + j * lda];
            at[j + i * ldat] = if conj { v.conj() } else { v };
        }
    }
    Ok(())
}

/// In-place transpose of a square `n x n` tile.
///
/// Used to switch a tile between row- and column-major layout without a
/// second buffer.
pub fn transpose_in_place<T: Scalar>(n: usize, a: &mut [T], lda: usize, conj: bool) -> Result<()> {
    blas_error_if!(lda < n.max(1), "lda");
    check_buffer("A", a.len(), n, n, lda)?;

    for j in 0..n {
        for i in j + 1..n {
            a.swap(i + j * lda, j + i * lda);
        }
    }
    if conj {
        for j in 0..n {
            for i in 0..n {
                a[i + j * lda] = a[i + j * lda].conj();
            }
        }
    }
    Ok(())
}
