//! Triangular solve of a block row (left) or block column (right) of `B`
//! against a single diagonal tile `A`.

use super::{check_target, local_tiles, ops_compose, TrsmBatch};
use crate::error::{invalid_if, Result};
use crate::mat::{Location, Matrix, TriangularMatrix};
use crate::options::{Options, Target};
use crate::scheduler::FailureCollector;
use crate::tile_blas;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tile_kernels::KernelDispatch;
use tile_types::{Layout, Side};
use tracing::{debug, trace};

/// Overwrite every local tile of `B` with the solution of
/// `op(A) X = alpha B` (`Side::Left`) or `X op(A) = alpha B` (`Side::Right`).
#[allow(clippy::too_many_arguments)]
pub fn trsm_a<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    priority: i64,
    layout: Layout,
    queue_index: usize,
    opts: &Options,
) -> Result<()> {
    let target = opts.get_target()?;
    invalid_if!(a.mt() != 1 || a.nt() != 1, "A", "{}x{} tiles", a.mt(), a.nt());
    match side {
        Side::Left => invalid_if!(a.mt() != b.mt(), "B", "{} block rows on the left", b.mt()),
        Side::Right => invalid_if!(a.mt() != b.nt(), "B", "{} block columns on the right", b.nt()),
    }
    let order = match side {
        Side::Left => b.tile_mb(0),
        Side::Right => b.tile_nb(0),
    };
    invalid_if!(a.tile_mb(0) != order, "A", "order {} against {}", a.tile_mb(0), order);
    invalid_if!(
        !ops_compose::<T>(a.op(), b.op()),
        "op",
        "op(B) = {:?} cannot absorb op(A) = {:?}",
        b.op(),
        a.op()
    );
    check_target(target, b.num_devices(), layout)?;

    trace!(?target, priority, ?side, "internal trsm_a");
    let tick = opts.ticks_internal()?;
    match target {
        Target::HostTask => host_task(side, alpha, a, b, tick),
        Target::HostNest => host_nest(side, alpha, a, b, tick),
        Target::HostBatch => host_batch(side, alpha, a, b, tick),
        Target::Devices => devices(side, alpha, a, b, queue_index, layout, tick),
    }
}

fn unit_name(i: usize, j: usize) -> String {
    format!("trsm tile ({}, {})", i, j)
}

fn solve_tile<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    i: usize,
    j: usize,
    tick: bool,
) -> Result<()> {
    let host = Location::Host;
    let result = (|| {
        a.tile_get_for_reading(0, 0, host, Layout::ColMajor)?;
        b.tile_get_for_writing(i, j, host, Layout::ColMajor)?;
        tile_blas::trsm(side, a.diag(), alpha, &a.tile(0, 0)?, &b.tile(i, j)?)
    })();
    if tick {
        a.tile_tick(0, 0);
    }
    result
}

fn host_task<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let tiles = local_tiles(b, |_, _| true);
    rayon::scope(|s| {
        for &(i, j) in &tiles {
            let failures = &failures;
            s.spawn(move |_| {
                failures.capture(|| unit_name(i, j), || solve_tile(side, alpha, a, b, i, j, tick));
            });
        }
    });
    failures.into_result()
}

fn host_nest<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    local_tiles(b, |_, _| true).into_par_iter().for_each(|(i, j)| {
        failures.capture(|| unit_name(i, j), || solve_tile(side, alpha, a, b, i, j, tick));
    });
    failures.into_result()
}

fn host_batch<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let host = Location::Host;
    let tiles = local_tiles(b, |_, _| true);

    let mut groups: BTreeMap<(usize, usize), TrsmBatch<T>> = BTreeMap::new();
    for &(i, j) in &tiles {
        failures.capture(
            || unit_name(i, j),
            || {
                a.tile_get_for_reading(0, 0, host, Layout::ColMajor)?;
                b.tile_get_for_writing(i, j, host, Layout::ColMajor)?;
                groups
                    .entry((b.tile_mb(i), b.tile_nb(j)))
                    .or_insert_with(|| TrsmBatch::new(side, a.diag(), alpha))
                    .push(unit_name(i, j), a.tile(0, 0)?, b.tile(i, j)?);
                Ok(())
            },
        );
    }
    for ((mb, nb), batch) in &groups {
        debug!(mb, nb, entries = batch.len(), "host trsm batch");
        failures.capture(|| format!("trsm batch {}x{}", mb, nb), || batch.execute());
    }
    if tick {
        for _ in &tiles {
            a.tile_tick(0, 0);
        }
    }
    failures.into_result()
}

#[allow(clippy::too_many_arguments)]
fn devices<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    queue_index: usize,
    layout: Layout,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    rayon::scope(|s| {
        for d in 0..b.num_devices() {
            let failures = &failures;
            s.spawn(move |_| {
                failures.capture(
                    || format!("device {}", d),
                    || device_task(side, alpha, a, b, d, queue_index, layout, tick),
                );
            });
        }
    });
    failures.into_result()
}

/// Interior tiles in one batch, the trailing (possibly ragged) tile in another.
#[allow(clippy::too_many_arguments)]
fn device_task<T: KernelDispatch>(
    side: Side,
    alpha: T,
    a: &TriangularMatrix<T>,
    b: &Matrix<T>,
    d: usize,
    queue_index: usize,
    layout: Layout,
    tick: bool,
) -> Result<()> {
    let mine = local_tiles(b, |i, j| b.tile_device(i, j) == d);
    if mine.is_empty() {
        return Ok(());
    }
    let loc = Location::Device(d);
    let is_last = |i: usize, j: usize| match side {
        Side::Left => j + 1 == b.nt(),
        Side::Right => i + 1 == b.mt(),
    };

    let result = (|| {
        a.tile_get_for_reading(0, 0, loc, layout)?;
        b.tile_get_set_for_writing(&mine, d, layout)?;

        let mut interior = TrsmBatch::new(side, a.diag(), alpha);
        let mut last = TrsmBatch::new(side, a.diag(), alpha);
        for &(i, j) in &mine {
            let group = if is_last(i, j) { &mut last } else { &mut interior };
            group.push(unit_name(i, j), a.tile_on(0, 0, loc)?, b.tile_on(i, j, loc)?);
        }
        debug!(device = d, interior = interior.len(), last = last.len(), "device trsm");

        let queue = b.compute_queue(d, queue_index)?;
        for batch in [interior, last] {
            if !batch.is_empty() {
                queue.submit(move || batch.execute())?;
            }
        }
        queue.sync()
    })();

    a.tile_release(0, 0, d);
    if tick {
        for _ in &mine {
            a.tile_tick(0, 0);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::on_one_worker;
    use crate::error::Error;
    use crate::mat::{transpose, Context, Distribution};
    use std::sync::Arc;
    use tile_types::{Diag, Uplo};

    // L = [[2, 0, 0], [1, 1, 0], [0, 1, 4]]
    fn lower(ctx: &Arc<Context>) -> TriangularMatrix<f64> {
        let l = [[2.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 4.0]];
        let dist = Distribution::single();
        TriangularMatrix::from_fn(Uplo::Lower, Diag::NonUnit, 3, 3, dist, Arc::clone(ctx), |i, j| {
            l[i][j]
        })
        .unwrap()
    }

    fn rhs(m: usize, n: usize, ctx: &Arc<Context>) -> Matrix<f64> {
        let dist = Distribution::single();
        Matrix::from_fn(m, n, 3, dist, Arc::clone(ctx), |i, j| (i + j + 1) as f64).unwrap()
    }

    fn check_left(x: &[f64], n: usize, alpha: f64) {
        let l = [[2.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 4.0]];
        for j in 0..n {
            for i in 0..3 {
                let lx: f64 = (0..3).map(|p| l[i][p] * x[p + 3 * j]).sum();
                assert!((lx - alpha * (i + j + 1) as f64).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_left_all_targets() {
        on_one_worker("trsm_a", || {
            for (target, ctx) in [
                (Target::HostTask, Context::local()),
                (Target::HostNest, Context::local()),
                (Target::HostBatch, Context::local()),
                (Target::Devices, Context::with_devices(2).unwrap()),
            ] {
                let a = lower(&ctx);
                // 3 x 8: two full tiles and a ragged one
                let b = rhs(3, 8, &ctx);
                let opts = Options::new().with_target(target);
                trsm_a(Side::Left, 2.0, &a, &b, 0, Layout::ColMajor, 0, &opts).unwrap();
                b.tile_update_all_origin().unwrap();
                check_left(&b.to_dense(), 8, 2.0);
                assert_eq!(a.tile_tick_count(0, 0), 3);
            }
        });
    }

    #[test]
    fn test_right_with_transposed_a() {
        // X L^T = B, i.e. L X^T = B^T
        let ctx = Context::local();
        let a = transpose(&lower(&ctx)).unwrap();
        let b = rhs(5, 3, &ctx);
        trsm_a(Side::Right, 1.0, &a, &b, 0, Layout::ColMajor, 0, &Options::new()).unwrap();
        let x = b.to_dense();
        let l = [[2.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 4.0]];
        for i in 0..5 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|p| x[i + 5 * p] * l[j][p]).sum();
                assert!((v - (i + j + 1) as f64).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let ctx = Context::local();
        let a = lower(&ctx);
        let b = rhs(6, 3, &ctx);
        let opts = Options::new();
        let err = trsm_a(Side::Left, 1.0, &a, &b, 0, Layout::ColMajor, 0, &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "B", .. }));
    }
}
