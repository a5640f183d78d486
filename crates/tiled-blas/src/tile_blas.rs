//! Single-tile BLAS on tile handles.
//!
//! Each routine resolves the ops carried by the handles, checks shapes and
//! layouts, locks the buffers and calls the matching kernel. An output with
//! a non-trivial op is folded onto its stored orientation first:
//! `op(C) = alpha op(A) op(B) + beta op(C)` becomes
//! `C = alpha op(B)^T op(A)^T + beta C`, with conjugated scalars when `op(C)`
//! is a conjugate transpose.

use crate::error::{Error, Result};
use crate::mat::{conj_transpose_tile, transpose_tile, Tile};
use tile_kernels::KernelDispatch;
use tile_types::{Diag, Op, Scalar, Side, Uplo};

/// A gemm rewritten so that `c` has no op.
pub(crate) struct FoldedGemm<T> {
    pub alpha: T,
    pub beta: T,
    pub a: Tile<T>,
    pub b: Tile<T>,
    pub c: Tile<T>,
}

impl<T: Scalar> FoldedGemm<T> {
    pub fn k(&self) -> usize {
        self.a.nb()
    }
}

pub(crate) fn fold_gemm<T: Scalar>(
    alpha: T,
    a: &Tile<T>,
    b: &Tile<T>,
    beta: T,
    c: &Tile<T>,
) -> Result<FoldedGemm<T>> {
    let folded = match c.op() {
        Op::NoTrans => FoldedGemm {
            alpha,
            beta,
            a: a.clone(),
            b: b.clone(),
            c: c.clone(),
        },
        Op::Trans => FoldedGemm {
            alpha,
            beta,
            a: transpose_tile(b)?,
            b: transpose_tile(a)?,
            c: transpose_tile(c)?,
        },
        Op::ConjTrans => FoldedGemm {
            alpha: alpha.conj(),
            beta: beta.conj(),
            a: conj_transpose_tile(b)?,
            b: conj_transpose_tile(a)?,
            c: conj_transpose_tile(c)?,
        },
    };

    let (fa, fb, fc) = (&folded.a, &folded.b, &folded.c);
    if fa.mb() != fc.mb() || fb.nb() != fc.nb() || fa.nb() != fb.mb() {
        return Err(Error::TileMismatch(format!(
            "gemm: A is {}x{}, B is {}x{}, C is {}x{}",
            fa.mb(),
            fa.nb(),
            fb.mb(),
            fb.nb(),
            fc.mb(),
            fc.nb()
        )));
    }
    check_layouts("gemm", &[fa, fb, fc])?;
    check_no_alias("gemm", fc, &[fa, fb])?;
    Ok(folded)
}

/// A triangular solve rewritten so that `b` has no op.
pub(crate) struct FoldedTrsm<T> {
    pub side: Side,
    pub alpha: T,
    pub a: Tile<T>,
    pub b: Tile<T>,
}

pub(crate) fn fold_trsm<T: Scalar>(
    side: Side,
    alpha: T,
    a: &Tile<T>,
    b: &Tile<T>,
) -> Result<FoldedTrsm<T>> {
    let folded = match b.op() {
        Op::NoTrans => FoldedTrsm {
            side,
            alpha,
            a: a.clone(),
            b: b.clone(),
        },
        Op::Trans => FoldedTrsm {
            side: side.flip(),
            alpha,
            a: transpose_tile(a)?,
            b: transpose_tile(b)?,
        },
        Op::ConjTrans => FoldedTrsm {
            side: side.flip(),
            alpha: alpha.conj(),
            a: conj_transpose_tile(a)?,
            b: conj_transpose_tile(b)?,
        },
    };

    let (fa, fb) = (&folded.a, &folded.b);
    if fa.uplo_physical() == Uplo::General {
        return Err(Error::TileMismatch("trsm: A is not a triangular tile".into()));
    }
    let order = match folded.side {
        Side::Left => fb.mb(),
        Side::Right => fb.nb(),
    };
    if fa.mb() != fa.nb() || fa.mb() != order {
        return Err(Error::TileMismatch(format!(
            "trsm: A is {}x{}, B is {}x{} on the {:?}",
            fa.mb(),
            fa.nb(),
            fb.mb(),
            fb.nb(),
            folded.side
        )));
    }
    check_layouts("trsm", &[fa, fb])?;
    check_no_alias("trsm", fb, &[fa])?;
    Ok(folded)
}

/// Checks for a rank-k update into a triangle of `c`; returns `(n, k)`.
pub(crate) fn check_syrk<T: Scalar>(a: &Tile<T>, c: &Tile<T>) -> Result<(usize, usize)> {
    if c.uplo_physical() == Uplo::General {
        return Err(Error::TileMismatch("syrk: C is not a diagonal tile".into()));
    }
    if T::IS_COMPLEX && (c.op() == Op::ConjTrans || a.op() == Op::ConjTrans) {
        return Err(Error::invalid("op", "complex syrk with a conjugate transpose"));
    }
    if c.mb() != c.nb() || a.mb() != c.mb() {
        return Err(Error::TileMismatch(format!(
            "syrk: A is {}x{}, C is {}x{}",
            a.mb(),
            a.nb(),
            c.mb(),
            c.nb()
        )));
    }
    check_layouts("syrk", &[a, c])?;
    check_no_alias("syrk", c, &[a])?;
    Ok((c.mb(), a.nb()))
}

fn check_layouts<T: Scalar>(what: &str, tiles: &[&Tile<T>]) -> Result<()> {
    let layout = tiles[0].layout();
    if tiles.iter().any(|t| t.layout() != layout) {
        let layouts: Vec<_> = tiles.iter().map(|t| t.layout()).collect();
        return Err(Error::TileMismatch(format!("{}: mixed layouts {:?}", what, layouts)));
    }
    Ok(())
}

fn check_no_alias<T: Scalar>(what: &str, out: &Tile<T>, inputs: &[&Tile<T>]) -> Result<()> {
    if inputs.iter().any(|t| t.same_buffer(out)) {
        return Err(Error::TileMismatch(format!("{}: output aliases an input", what)));
    }
    Ok(())
}

/// `op(C) = alpha op(A) op(B) + beta op(C)` on one tile.
pub fn gemm<T: KernelDispatch>(
    alpha: T,
    a: &Tile<T>,
    b: &Tile<T>,
    beta: T,
    c: &Tile<T>,
) -> Result<()> {
    let f = fold_gemm(alpha, a, b, beta, c)?;
    let ad = f.a.data.read_recursive();
    let bd = f.b.data.read_recursive();
    let mut cd = f.c.data.write();
    tile_kernels::gemm(
        f.c.layout,
        f.a.op,
        f.b.op,
        f.c.mb(),
        f.c.nb(),
        f.k(),
        f.alpha,
        &ad,
        f.a.stride,
        &bd,
        f.b.stride,
        f.beta,
        &mut cd,
        f.c.stride,
    )?;
    Ok(())
}

/// `C = alpha op(A) op(A)^T + beta C` on the stored triangle of a diagonal tile.
pub fn syrk<T: Scalar>(alpha: T, a: &Tile<T>, beta: T, c: &Tile<T>) -> Result<()> {
    let (n, k) = check_syrk(a, c)?;
    let ad = a.data.read_recursive();
    let mut cd = c.data.write();
    // a transposed C is the same symmetric matrix, stored in the flipped triangle
    tile_kernels::syrk(
        c.layout,
        c.uplo_physical(),
        a.op,
        n,
        k,
        alpha,
        &ad,
        a.stride,
        beta,
        &mut cd,
        c.stride,
    )?;
    Ok(())
}

/// Solve `op(A) X = alpha op(B)` (left) or `X op(A) = alpha op(B)` (right),
/// overwriting `B`.
pub fn trsm<T: Scalar>(side: Side, diag: Diag, alpha: T, a: &Tile<T>, b: &Tile<T>) -> Result<()> {
    let f = fold_trsm(side, alpha, a, b)?;
    let ad = f.a.data.read_recursive();
    let mut bd = f.b.data.write();
    tile_kernels::trsm(
        f.b.layout,
        f.side,
        f.a.uplo_physical(),
        f.a.op,
        diag,
        f.b.mb(),
        f.b.nb(),
        f.alpha,
        &ad,
        f.a.stride,
        &mut bd,
        f.b.stride,
    )?;
    Ok(())
}
