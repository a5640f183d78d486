//! Distributed operations driven by a broadcast/compute lookahead pipeline.
//!
//! Panel `k` is broadcast by `bcast k` and consumed by `compute k`. Computes
//! run in order; a broadcast more than `lookahead` panels ahead of the
//! compute frontier waits for the compute that frees its slot.

mod gemm;
mod syrk;

pub use gemm::gemm;
pub use syrk::syrk;

use crate::error::Result;
use crate::mat::{Location, Matrix};
use crate::scheduler::{Dep, TaskGraph, Token};
use tile_types::{Layout, Op, Scalar};

type Stage<'a> = &'a (dyn Fn(usize) -> Result<()> + Sync);

/// Build and run the pipeline over `panels` panels.
///
/// `prologue`, when given, runs alongside `bcast 0` and must finish before
/// `compute 0`.
pub(crate) fn run_pipeline<'a>(
    pool: &rayon::ThreadPool,
    panels: usize,
    lookahead: usize,
    prologue: Option<Box<dyn FnOnce() -> Result<()> + Send + 'a>>,
    bcast: Stage<'a>,
    compute: Stage<'a>,
) -> Result<()> {
    if panels == 0 {
        return match prologue {
            Some(f) => f(),
            None => Ok(()),
        };
    }
    let bc = |k| Token::new("bcast", k);
    let gm = |k| Token::new("gemm", k);
    let ready = Token::new("c", 0);

    let mut g = TaskGraph::new();
    let mut first = vec![Dep::In(bc(0)), Dep::Out(gm(0))];
    if let Some(f) = prologue {
        g.add("prologue", &[Dep::Out(ready)], 1, f);
        first.push(Dep::In(ready));
    }

    g.add("bcast 0", &[Dep::Out(bc(0))], 1, move || bcast(0));
    for k in 1..=lookahead.min(panels - 1) {
        g.add(format!("bcast {}", k), &[Dep::In(bc(k - 1)), Dep::Out(bc(k))], 1, move || bcast(k));
    }
    g.add("compute 0", &first, 0, move || compute(0));

    for k in 1..panels {
        let ahead = k + lookahead;
        if ahead < panels {
            g.add(
                format!("bcast {}", ahead),
                &[Dep::In(gm(k - 1)), Dep::In(bc(ahead - 1)), Dep::Out(bc(ahead))],
                1,
                move || bcast(ahead),
            );
        }
        g.add(
            format!("compute {}", k),
            &[Dep::In(bc(k)), Dep::In(gm(k - 1)), Dep::Out(gm(k))],
            0,
            move || compute(k),
        );
    }
    g.run(pool)
}

/// Reconcile residency after an operation, whether or not it succeeded:
/// device results go back to their origins, workspace copies are dropped
/// and layouts are restored.
pub(crate) fn finish<T: Scalar>(
    result: Result<()>,
    output: &Matrix<T>,
    inputs: &[&Matrix<T>],
) -> Result<()> {
    let reconcile = (|| {
        output.tile_update_all_origin()?;
        for m in inputs.iter().copied().chain([output]) {
            m.release_workspace();
            m.tile_layout_reset()?;
        }
        Ok(())
    })();
    result.and(reconcile)
}

/// `C = beta C` on the local tiles of `C` selected by `keep`.
pub(crate) fn scale_local<T: Scalar>(
    c: &Matrix<T>,
    beta: T,
    keep: impl Fn(usize, usize) -> bool,
) -> Result<()> {
    // stored values of a conjugate-transposed view scale by conj(beta)
    let beta = if c.op() == Op::ConjTrans { beta.conj() } else { beta };
    for j in 0..c.nt() {
        for i in 0..c.mt() {
            if !keep(i, j) || !c.tile_is_local(i, j) {
                continue;
            }
            c.tile_get_for_writing(i, j, Location::Host, Layout::ColMajor)?;
            let tile = c.tile(i, j)?;
            let mut data = tile.buffer().write();
            for v in data.iter_mut() {
                *v = if beta.is_zero() { T::zero() } else { beta * *v };
            }
        }
    }
    Ok(())
}

/// Fetch every local tile of `c` selected by `keep` for writing on its device.
pub(crate) fn fetch_to_devices<T: Scalar>(
    c: &Matrix<T>,
    layout: Layout,
    keep: impl Fn(usize, usize) -> bool,
) -> Result<()> {
    for j in 0..c.nt() {
        for i in 0..c.mt() {
            if keep(i, j) && c.tile_is_local(i, j) {
                c.tile_get_for_writing(i, j, Location::Device(c.tile_device(i, j)), layout)?;
            }
        }
    }
    Ok(())
}
