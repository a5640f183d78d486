//! Transient batch descriptors.
//!
//! A descriptor holds the tile handles of one batched call, each entry
//! labelled with the unit it computes. `execute` checks every entry on its
//! own, splits the valid entries into uniform groups and issues one batched
//! kernel per group. A malformed entry is reported under its own unit and
//! its siblings still run. The descriptor is dropped after the call.

use crate::error::{Error, Result};
use crate::mat::Tile;
use crate::scheduler::FailureCollector;
use crate::tile_blas::{check_syrk, fold_gemm, fold_trsm, FoldedGemm, FoldedTrsm};
use std::collections::HashSet;
use std::sync::Arc;
use tile_kernels::{
    gemm_batch, syrk_batch, trsm_batch, GemmGroup, KernelDispatch, SyrkGroup, TrsmGroup,
};
use tile_types::{Diag, Scalar, Side};
use tracing::debug;

/// Members sharing a key, in push order.
fn group_by<K: PartialEq, E>(items: Vec<(K, E)>) -> Vec<(K, Vec<E>)> {
    let mut groups: Vec<(K, Vec<E>)> = Vec::new();
    for (key, item) in items {
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups
}

/// Keep the members whose output is written once and read by nobody in the
/// group; every other member is reported under its unit.
fn disjoint<'u, T, E>(
    what: &str,
    members: Vec<(&'u str, E)>,
    output: impl Fn(&E) -> &Tile<T>,
    inputs: impl Fn(&E) -> Vec<&Tile<T>>,
    failures: &FailureCollector,
) -> Vec<(&'u str, E)> {
    let read: HashSet<*const _> = members
        .iter()
        .flat_map(|(_, e)| inputs(e))
        .map(|t| Arc::as_ptr(&t.data))
        .collect();
    let mut written = HashSet::new();
    let mut kept = Vec::with_capacity(members.len());
    for (unit, e) in members {
        let p = Arc::as_ptr(&output(&e).data);
        if read.contains(&p) || !written.insert(p) {
            let msg = format!("{} batch writes one buffer twice", what);
            failures.record(unit, Error::TileMismatch(msg));
        } else {
            kept.push((unit, e));
        }
    }
    kept
}

/// Map the kernel's per-entry status back to the units of the group.
fn report<E>(
    what: &str,
    members: &[(&str, E)],
    info: &[i64],
    result: tile_kernels::Result<()>,
    failures: &FailureCollector,
) {
    let Err(err) = result else {
        return;
    };
    let mut attributed = false;
    for ((unit, _), _) in members.iter().zip(info).filter(|(_, status)| **status != 0) {
        failures.record(*unit, Error::Kernel(err.clone()));
        attributed = true;
    }
    if !attributed {
        failures.record(format!("{} batch", what), Error::Kernel(err));
    }
}

/// `op(C) = alpha op(A) op(B) + beta op(C)` over many tiles.
pub(crate) struct GemmBatch<T> {
    alpha: T,
    beta: T,
    entries: Vec<(String, Tile<T>, Tile<T>, Tile<T>)>,
}

impl<T: KernelDispatch> GemmBatch<T> {
    pub fn new(alpha: T, beta: T) -> Self {
        Self {
            alpha,
            beta,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, unit: impl Into<String>, a: Tile<T>, b: Tile<T>, c: Tile<T>) {
        self.entries.push((unit.into(), a, b, c));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn execute(&self) -> Result<()> {
        let failures = FailureCollector::new();
        let mut valid = Vec::with_capacity(self.entries.len());
        for (unit, a, b, c) in &self.entries {
            match fold_gemm(self.alpha, a, b, self.beta, c) {
                // op(C) decides whether the scalars were conjugated
                Ok(f) => valid.push((
                    (
                        c.op(),
                        f.c.layout(),
                        (f.a.op(), f.b.op()),
                        (f.c.mb(), f.c.nb(), f.k()),
                        (f.a.stride(), f.b.stride(), f.c.stride()),
                    ),
                    (unit.as_str(), f),
                )),
                Err(err) => failures.record(unit.as_str(), err),
            }
        }

        for (key, members) in group_by(valid) {
            let members = disjoint(
                "gemm",
                members,
                |f: &FoldedGemm<T>| &f.c,
                |f| vec![&f.a, &f.b],
                &failures,
            );
            let Some((_, first)) = members.first() else {
                continue;
            };
            let (_, layout, (opa, opb), (m, n, k), (lda, ldb, ldc)) = key;
            let group = GemmGroup {
                layout,
                opa,
                opb,
                m,
                n,
                k,
                alpha: first.alpha,
                lda,
                ldb,
                beta: first.beta,
                ldc,
            };

            let a_guards: Vec<_> = members.iter().map(|(_, f)| f.a.data.read_recursive()).collect();
            let b_guards: Vec<_> = members.iter().map(|(_, f)| f.b.data.read_recursive()).collect();
            let mut c_guards: Vec<_> = members.iter().map(|(_, f)| f.c.data.write()).collect();
            let a: Vec<&[T]> = a_guards.iter().map(|g| g.as_slice()).collect();
            let b: Vec<&[T]> = b_guards.iter().map(|g| g.as_slice()).collect();
            let mut c: Vec<&mut [T]> = c_guards.iter_mut().map(|g| g.as_mut_slice()).collect();
            let mut info = vec![0; members.len()];

            debug!(entries = members.len(), m, n, k, "gemm batch");
            let result = gemm_batch(&group, &a, &b, &mut c, &mut info);
            report("gemm", &members, &info, result, &failures);
        }
        failures.into_result()
    }
}

/// `C = alpha op(A) op(A)^T + beta C` over many diagonal tiles.
pub(crate) struct SyrkBatch<T> {
    alpha: T,
    beta: T,
    entries: Vec<(String, Tile<T>, Tile<T>)>,
}

impl<T: Scalar> SyrkBatch<T> {
    pub fn new(alpha: T, beta: T) -> Self {
        Self {
            alpha,
            beta,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, unit: impl Into<String>, a: Tile<T>, c: Tile<T>) {
        self.entries.push((unit.into(), a, c));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn execute(&self) -> Result<()> {
        let failures = FailureCollector::new();
        let mut valid = Vec::with_capacity(self.entries.len());
        for (unit, a, c) in &self.entries {
            match check_syrk(a, c) {
                Ok((n, k)) => valid.push((
                    (c.layout(), c.uplo_physical(), a.op(), (n, k), (a.stride(), c.stride())),
                    (unit.as_str(), (a, c)),
                )),
                Err(err) => failures.record(unit.as_str(), err),
            }
        }

        for (key, members) in group_by(valid) {
            let members = disjoint("syrk", members, |e| e.1, |e| vec![e.0], &failures);
            if members.is_empty() {
                continue;
            }
            let (layout, uplo, trans, (n, k), (lda, ldc)) = key;
            let group = SyrkGroup {
                layout,
                uplo,
                trans,
                n,
                k,
                alpha: self.alpha,
                lda,
                beta: self.beta,
                ldc,
            };

            let a_guards: Vec<_> =
                members.iter().map(|(_, (a, _))| a.data.read_recursive()).collect();
            let mut c_guards: Vec<_> = members.iter().map(|(_, (_, c))| c.data.write()).collect();
            let a: Vec<&[T]> = a_guards.iter().map(|g| g.as_slice()).collect();
            let mut c: Vec<&mut [T]> = c_guards.iter_mut().map(|g| g.as_mut_slice()).collect();
            let mut info = vec![0; members.len()];

            debug!(entries = members.len(), n, k, "syrk batch");
            let result = syrk_batch(&group, &a, &mut c, &mut info);
            report("syrk", &members, &info, result, &failures);
        }
        failures.into_result()
    }
}

/// Triangular solves of many `B` tiles, each against its `A` tile.
pub(crate) struct TrsmBatch<T> {
    side: Side,
    diag: Diag,
    alpha: T,
    entries: Vec<(String, Tile<T>, Tile<T>)>,
}

impl<T: Scalar> TrsmBatch<T> {
    pub fn new(side: Side, diag: Diag, alpha: T) -> Self {
        Self {
            side,
            diag,
            alpha,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, unit: impl Into<String>, a: Tile<T>, b: Tile<T>) {
        self.entries.push((unit.into(), a, b));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn execute(&self) -> Result<()> {
        let failures = FailureCollector::new();
        let mut valid = Vec::with_capacity(self.entries.len());
        for (unit, a, b) in &self.entries {
            match fold_trsm(self.side, self.alpha, a, b) {
                // op(B) decides whether alpha was conjugated
                Ok(f) => valid.push((
                    (
                        b.op(),
                        f.b.layout(),
                        (f.side, f.a.uplo_physical(), f.a.op()),
                        (f.b.mb(), f.b.nb()),
                        (f.a.stride(), f.b.stride()),
                    ),
                    (unit.as_str(), f),
                )),
                Err(err) => failures.record(unit.as_str(), err),
            }
        }

        for (key, members) in group_by(valid) {
            let members = disjoint(
                "trsm",
                members,
                |f: &FoldedTrsm<T>| &f.b,
                |f| vec![&f.a],
                &failures,
            );
            let Some((_, first)) = members.first() else {
                continue;
            };
            let (_, layout, (side, uplo, trans), (m, n), (lda, ldb)) = key;
            let group = TrsmGroup {
                layout,
                side,
                uplo,
                trans,
                diag: self.diag,
                m,
                n,
                alpha: first.alpha,
                lda,
                ldb,
            };

            let a_guards: Vec<_> = members.iter().map(|(_, f)| f.a.data.read_recursive()).collect();
            let mut b_guards: Vec<_> = members.iter().map(|(_, f)| f.b.data.write()).collect();
            let a: Vec<&[T]> = a_guards.iter().map(|g| g.as_slice()).collect();
            let mut b: Vec<&mut [T]> = b_guards.iter_mut().map(|g| g.as_mut_slice()).collect();
            let mut info = vec![0; members.len()];

            debug!(entries = members.len(), m, n, "trsm batch");
            let result = trsm_batch(&group, &a, &mut b, &mut info);
            report("trsm", &members, &info, result, &failures);
        }
        failures.into_result()
    }
}
