//! Batched tile kernels.
//!
//! A batch is one parameter group shared by every entry plus per-entry
//! buffers. Entries run in parallel; each entry's status lands in `info`
//! (0 on success, -1 on failure) and the first failure is returned.

use crate::error::{BlasError, Result};
use crate::gemm::gemm;
use crate::simd::KernelDispatch;
use crate::syrk::syrk;
use crate::trsm::trsm;
use rayon::prelude::*;
use tile_types::{Diag, Layout, Op, Scalar, Side, Uplo};

/// Uniform parameters of a gemm batch.
#[derive(Debug, Clone, Copy)]
pub struct GemmGroup<T> {
    pub layout: Layout,
    pub opa: Op,
    pub opb: Op,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: T,
    pub lda: usize,
    pub ldb: usize,
    pub beta: T,
    pub ldc: usize,
}

/// Uniform parameters of a syrk batch.
#[derive(Debug, Clone, Copy)]
pub struct SyrkGroup<T> {
    pub layout: Layout,
    pub uplo: Uplo,
    pub trans: Op,
    pub n: usize,
    pub k: usize,
    pub alpha: T,
    pub lda: usize,
    pub beta: T,
    pub ldc: usize,
}

/// Uniform parameters of a trsm batch.
#[derive(Debug, Clone, Copy)]
pub struct TrsmGroup<T> {
    pub layout: Layout,
    pub side: Side,
    pub uplo: Uplo,
    pub trans: Op,
    pub diag: Diag,
    pub m: usize,
    pub n: usize,
    pub alpha: T,
    pub lda: usize,
    pub ldb: usize,
}

fn check_counts(what: &str, counts: &[usize]) -> Result<()> {
    if counts.windows(2).any(|w| w[0] != w[1]) {
        return Err(BlasError::DimensionMismatch(format!(
            "{} batch arrays have lengths {:?}",
            what, counts
        )));
    }
    Ok(())
}

fn finish(results: Vec<Result<()>>, info: &mut [i64]) -> Result<()> {
    for (status, r) in info.iter_mut().zip(&results) {
        *status = if r.is_ok() { 0 } else { -1 };
    }
    results.into_iter().find_map(|r| r.err()).map_or(Ok(()), Err)
}

/// `C[e] = alpha * op(A[e]) * op(B[e]) + beta * C[e]` for every entry `e`.
pub fn gemm_batch<T: KernelDispatch>(
    group: &GemmGroup<T>,
    a: &[&[T]],
    b: &[&[T]],
    c: &mut [&mut [T]],
    info: &mut [i64],
) -> Result<()> {
    check_counts("gemm", &[a.len(), b.len(), c.len(), info.len()])?;
    let g = *group;
    let results: Vec<Result<()>> = c
        .par_iter_mut()
        .enumerate()
        .map(|(e, ce)| {
            gemm(
                g.layout, g.opa, g.opb, g.m, g.n, g.k, g.alpha, a[e], g.lda, b[e], g.ldb, g.beta,
                ce, g.ldc,
            )
        })
        .collect();
    finish(results, info)
}

/// `C[e] = alpha * op(A[e]) * op(A[e])^T + beta * C[e]` on one triangle.
pub fn syrk_batch<T: Scalar>(
    group: &SyrkGroup<T>,
    a: &[&[T]],
    c: &mut [&mut [T]],
    info: &mut [i64],
) -> Result<()> {
    check_counts("syrk", &[a.len(), c.len(), info.len()])?;
    let g = *group;
    let results: Vec<Result<()>> = c
        .par_iter_mut()
        .enumerate()
        .map(|(e, ce)| {
            syrk(g.layout, g.uplo, g.trans, g.n, g.k, g.alpha, a[e], g.lda, g.beta, ce, g.ldc)
        })
        .collect();
    finish(results, info)
}

/// Triangular solve of every `B[e]` against its `A[e]`.
pub fn trsm_batch<T: Scalar>(
    group: &TrsmGroup<T>,
    a: &[&[T]],
    b: &mut [&mut [T]],
    info: &mut [i64],
) -> Result<()> {
    check_counts("trsm", &[a.len(), b.len(), info.len()])?;
    let g = *group;
    let results: Vec<Result<()>> = b
        .par_iter_mut()
        .enumerate()
        .map(|(e, be)| {
            trsm(
                g.layout, g.side, g.uplo, g.trans, g.diag, g.m, g.n, g.alpha, a[e], g.lda, be,
                g.ldb,
            )
        })
        .collect();
    finish(results, info)
}
