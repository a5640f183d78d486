use tile_types::{Op, Scalar};

/// Offset of element `(row, col)` of `op(X)` in column-major storage of `X`.
#[inline(always)]
pub fn op_offset(row: usize, col: usize, ld: usize, op: Op) -> usize {
    match op {
        Op::NoTrans => row + col * ld,
        Op::Trans | Op::ConjTrans => col + row * ld,
    }
}

/// Element `(row, col)` of `op(X)`, conjugated for `ConjTrans`.
///
/// # Safety
/// `ptr` must be valid for the offset computed by [`op_offset`].
#[inline(always)]
pub unsafe fn op_element<T: Scalar>(ptr: *const T, row: usize, col: usize, ld: usize, op: Op) -> T {
    let v = *ptr.add(op_offset(row, col, ld, op));
    if op == Op::ConjTrans {
        v.conj()
    } else {
        v
    }
}

/// Pack an `m x k` panel of `op(A)` into `mr`-row slivers.
///
/// Each sliver holds `mr` consecutive rows stored column by column, so the
/// microkernel reads one contiguous `mr`-vector per step of `k`. Rows past
/// `m` are zero padded.
///
/// ```text
/// op(A) (m=6, k=3, mr=4):         packed:
/// [ a00 a01 a02 ]                 sliver 0: a00 a10 a20 a30 | a01 a11 a21 a31 | a02 ...
/// [ a10 a11 a12 ]                 sliver 1: a40 a50 0   0   | a41 a51 0   0   | a42 ...
/// ...
/// ```
///
/// # Safety
/// - `a` points at element `(0, 0)` of the panel of `op(A)`
/// - `packed` holds at least [`packed_a_size`]`(m, k, mr)` elements
pub unsafe fn pack_a<T: Scalar>(
    m: usize,
    k: usize,
    a: *const T,
    lda: usize,
    op: Op,
    packed: *mut T,
    mr: usize,
) {
    let mut idx = 0;
    for row_start in (0..m).step_by(mr) {
        for col in 0..k {
            for r in 0..mr {
                let row = row_start + r;
                *packed.add(idx) = if row < m {
                    op_element(a, row, col, lda, op)
                } else {
                    T::zero()
                };
                idx += 1;
            }
        }
    }
}

/// Pack a `k x n` panel of `op(B)` into `nr`-column slivers.
///
/// Each sliver holds `nr` consecutive columns stored row by row. Columns
/// past `n` are zero padded.
///
/// # Safety
/// - `b` points at element `(0, 0)` of the panel of `op(B)`
/// - `packed` holds at least [`packed_b_size`]`(k, n, nr)` elements
pub unsafe fn pack_b<T: Scalar>(
    k: usize,
    n: usize,
    b: *const T,
    ldb: usize,
    op: Op,
    packed: *mut T,
    nr: usize,
) {
    let mut idx = 0;
    for col_start in (0..n).step_by(nr) {
        for row in 0..k {
            for c in 0..nr {
                let col = col_start + c;
                *packed.add(idx) = if col < n {
                    op_element(b, row, col, ldb, op)
                } else {
                    T::zero()
                };
                idx += 1;
            }
        }
    }
}

#[inline]
pub fn packed_a_size(m: usize, k: usize, mr: usize) -> usize {
    m.div_ceil(mr) * mr * k
}

#[inline]
pub fn packed_b_size(k: usize, n: usize, nr: usize) -> usize {
    k * n.div_ceil(nr) * nr
}
