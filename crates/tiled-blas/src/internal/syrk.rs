//! Rank-k update `C = alpha A A^T + beta C` of one block column `A` into the
//! lower triangle of `C`.

use super::{check_target, local_tiles, GemmBatch, SyrkBatch};
use crate::error::{invalid_if, Result};
use crate::mat::{transpose_tile, Location, Matrix, SymmetricMatrix};
use crate::options::{Options, Target};
use crate::scheduler::FailureCollector;
use crate::tile_blas;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tile_kernels::KernelDispatch;
use tile_types::{Layout, Op, Uplo};
use tracing::{debug, trace};

/// Update the local lower tiles of `C` with the single block column `A`.
///
/// `C` must be lower in its logical orientation; complex scalars cannot use
/// a conjugate transpose on either operand.
#[allow(clippy::too_many_arguments)]
pub fn syrk<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &SymmetricMatrix<T>,
    priority: i64,
    queue_index: usize,
    layout: Layout,
    opts: &Options,
) -> Result<()> {
    let target = opts.get_target()?;
    invalid_if!(c.uplo() != Uplo::Lower, "C", "stored in the {:?} triangle", c.uplo());
    invalid_if!(
        T::IS_COMPLEX && (c.op() == Op::ConjTrans || a.op() == Op::ConjTrans),
        "op",
        "complex syrk with op(A) = {:?}, op(C) = {:?}",
        a.op(),
        c.op()
    );
    invalid_if!(a.nt() != 1, "A", "{} block columns", a.nt());
    invalid_if!(a.mt() != c.mt(), "A", "{} block rows for {} in C", a.mt(), c.mt());
    invalid_if!(c.mt() != c.nt(), "C", "{}x{} tiles", c.mt(), c.nt());
    check_target(target, c.num_devices(), layout)?;

    trace!(?target, priority, mt = c.mt(), "internal syrk");
    let c = c.as_matrix();
    let tick = opts.ticks_internal()?;
    match target {
        Target::HostTask => host_task(alpha, a, beta, c, tick),
        Target::HostNest => host_nest(alpha, a, beta, c, tick),
        Target::HostBatch => host_batch(alpha, a, beta, c, tick),
        Target::Devices => devices(alpha, a, beta, c, queue_index, layout, tick),
    }
}

fn unit_name(i: usize, j: usize) -> String {
    if i == j {
        format!("syrk tile ({}, {})", i, j)
    } else {
        format!("gemm tile ({}, {})", i, j)
    }
}

/// One output tile on the host. Inputs are ticked even when the kernel fails.
fn update_tile<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    i: usize,
    j: usize,
    tick: bool,
) -> Result<()> {
    let host = Location::Host;
    let result = (|| {
        a.tile_get_for_reading(i, 0, host, Layout::ColMajor)?;
        a.tile_get_for_reading(j, 0, host, Layout::ColMajor)?;
        c.tile_get_for_writing(i, j, host, Layout::ColMajor)?;
        if i == j {
            tile_blas::syrk(alpha, &a.tile(j, 0)?, beta, &c.tile(j, j)?)
        } else {
            let aj = transpose_tile(&a.tile(j, 0)?)?;
            tile_blas::gemm(alpha, &a.tile(i, 0)?, &aj, beta, &c.tile(i, j)?)
        }
    })();
    if tick {
        a.tile_tick(i, 0);
        a.tile_tick(j, 0);
    }
    result
}

fn host_task<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let tiles = local_tiles(c, |i, j| i >= j);
    rayon::scope(|s| {
        for &(i, j) in &tiles {
            let failures = &failures;
            s.spawn(move |_| {
                failures.capture(|| unit_name(i, j), || update_tile(alpha, a, beta, c, i, j, tick));
            });
        }
    });
    failures.into_result()
}

fn host_nest<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let (mt, nt) = (c.mt(), c.nt());

    rayon::scope(|s| {
        for j in 0..nt {
            if c.tile_is_local(j, j) {
                let failures = &failures;
                s.spawn(move |_| {
                    failures.capture(
                        || unit_name(j, j),
                        || update_tile(alpha, a, beta, c, j, j, tick),
                    );
                });
            }
        }
    });

    (0..mt * nt).into_par_iter().for_each(|ij| {
        let (i, j) = (ij % mt, ij / mt);
        if i > j && c.tile_is_local(i, j) {
            failures.capture(|| unit_name(i, j), || update_tile(alpha, a, beta, c, i, j, tick));
        }
    });
    failures.into_result()
}

fn host_batch<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let host = Location::Host;

    rayon::scope(|s| {
        for (j, _) in local_tiles(c, |i, j| i == j) {
            let failures = &failures;
            s.spawn(move |_| {
                failures.capture(|| unit_name(j, j), || update_tile(alpha, a, beta, c, j, j, tick));
            });
        }
    });

    // one batch per tile shape; boundary tiles land in their own group
    let mut groups: BTreeMap<(usize, usize), GemmBatch<T>> = BTreeMap::new();
    let off_diagonal = local_tiles(c, |i, j| i > j);
    for &(i, j) in &off_diagonal {
        failures.capture(
            || unit_name(i, j),
            || {
                a.tile_get_for_reading(i, 0, host, Layout::ColMajor)?;
                a.tile_get_for_reading(j, 0, host, Layout::ColMajor)?;
                c.tile_get_for_writing(i, j, host, Layout::ColMajor)?;
                let aj = transpose_tile(&a.tile(j, 0)?)?;
                groups
                    .entry((c.tile_mb(i), c.tile_nb(j)))
                    .or_insert_with(|| GemmBatch::new(alpha, beta))
                    .push(unit_name(i, j), a.tile(i, 0)?, aj, c.tile(i, j)?);
                Ok(())
            },
        );
    }
    for ((mb, nb), batch) in &groups {
        debug!(mb, nb, entries = batch.len(), "host gemm batch");
        failures.capture(|| format!("gemm batch {}x{}", mb, nb), || batch.execute());
    }
    if tick {
        for &(i, j) in &off_diagonal {
            a.tile_tick(i, 0);
            a.tile_tick(j, 0);
        }
    }
    failures.into_result()
}

#[allow(clippy::too_many_arguments)]
fn devices<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    queue_index: usize,
    layout: Layout,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    if c.mt() == 1 {
        if c.tile_is_local(0, 0) {
            let d = c.tile_device(0, 0);
            failures.capture(
                || format!("device {}", d),
                || single_tile(alpha, a, beta, c, d, queue_index, layout, tick),
            );
        }
        return failures.into_result();
    }

    rayon::scope(|s| {
        for d in 0..c.num_devices() {
            let failures = &failures;
            s.spawn(move |_| {
                failures.capture(
                    || format!("device {}", d),
                    || device_task(alpha, a, beta, c, d, queue_index, layout, tick),
                );
            });
        }
    });
    failures.into_result()
}

#[allow(clippy::too_many_arguments)]
fn single_tile<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    d: usize,
    queue_index: usize,
    layout: Layout,
    tick: bool,
) -> Result<()> {
    let loc = Location::Device(d);
    let result = (|| {
        a.tile_get_for_reading(0, 0, loc, layout)?;
        c.tile_get_for_writing(0, 0, loc, layout)?;
        let (at, ct) = (a.tile_on(0, 0, loc)?, c.tile_on(0, 0, loc)?);
        let queue = c.compute_queue(d, queue_index)?;
        queue.submit(move || tile_blas::syrk(alpha, &at, beta, &ct))?;
        queue.sync()
    })();
    a.tile_release(0, 0, d);
    if tick {
        a.tile_tick(0, 0);
        a.tile_tick(0, 0);
    }
    result
}

/// Everything device `d` owns: off-diagonal gemms first, then the diagonal
/// syrks, each phase split into interior tiles and the last block row.
#[allow(clippy::too_many_arguments)]
fn device_task<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    d: usize,
    queue_index: usize,
    layout: Layout,
    tick: bool,
) -> Result<()> {
    let mine = local_tiles(c, |i, j| i >= j && c.tile_device(i, j) == d);
    if mine.is_empty() {
        return Ok(());
    }
    let a_rows: BTreeSet<usize> = mine.iter().flat_map(|&(i, j)| [i, j]).collect();
    let last = c.mt() - 1;

    let result = (|| {
        let a_set: Vec<_> = a_rows.iter().map(|&i| (i, 0)).collect();
        a.tile_get_set_for_reading(&a_set, d, layout)?;
        c.tile_get_set_for_writing(&mine, d, layout)?;

        let loc = Location::Device(d);
        let mut gemm00 = GemmBatch::new(alpha, beta);
        let mut gemm10 = GemmBatch::new(alpha, beta);
        let mut syrk0 = SyrkBatch::new(alpha, beta);
        let mut syrk1 = SyrkBatch::new(alpha, beta);
        for &(i, j) in &mine {
            if i == j {
                let group = if j == last { &mut syrk1 } else { &mut syrk0 };
                group.push(unit_name(j, j), a.tile_on(j, 0, loc)?, c.tile_on(j, j, loc)?);
            } else {
                let group = if i == last { &mut gemm10 } else { &mut gemm00 };
                let aj = transpose_tile(&a.tile_on(j, 0, loc)?)?;
                group.push(unit_name(i, j), a.tile_on(i, 0, loc)?, aj, c.tile_on(i, j, loc)?);
            }
        }
        debug!(
            device = d,
            gemm = gemm00.len() + gemm10.len(),
            syrk = syrk0.len() + syrk1.len(),
            "device syrk"
        );

        // a failed gemm phase still lets the diagonal phase run
        let queue = c.compute_queue(d, queue_index)?;
        let phases = FailureCollector::new();
        for batch in [gemm00, gemm10] {
            if !batch.is_empty() {
                queue.submit(move || batch.execute())?;
            }
        }
        phases.capture(|| format!("device {}", d), || queue.sync());
        for batch in [syrk0, syrk1] {
            if !batch.is_empty() {
                queue.submit(move || batch.execute())?;
            }
        }
        phases.capture(|| format!("device {}", d), || queue.sync());
        phases.into_result()
    })();

    for &i in &a_rows {
        a.tile_release(i, 0, d);
    }
    if tick {
        for &(i, j) in &mine {
            a.tile_tick(i, 0);
            a.tile_tick(j, 0);
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
    use crate::options::TileReleaseStrategy;
    use std::sync::Arc;
    use tile_types::C64;

    fn inputs(n: usize, nb: usize, ctx: Arc<Context>) -> (Matrix<f64>, SymmetricMatrix<f64>) {
        let dist = Distribution::single();
        let a = Matrix::from_fn(n, nb, nb, dist, Arc::clone(&ctx), |i, j| {
            (i + 2 * j) as f64 * 0.5 - 1.0
        })
        .unwrap();
        let c = SymmetricMatrix::from_fn(Uplo::Lower, n, nb, dist, ctx, |i, j| (i * j) as f64)
            .unwrap();
        (a, c)
    }

    fn lower(c: &SymmetricMatrix<f64>) -> Vec<f64> {
        let n = c.n();
        let d = c.to_dense();
        let mut out = Vec::new();
        for j in 0..n {
            for i in j..n {
                out.push(d[i + j * n]);
            }
        }
        out
    }

    fn run(target: Target, ctx: Arc<Context>) -> Vec<f64> {
        let (a, c) = inputs(7, 2, ctx);
        let opts = Options::new().with_target(target);
        syrk(1.5, &a, 0.5, &c, 0, 0, Layout::ColMajor, &opts).unwrap();
        c.tile_update_all_origin().unwrap();
        lower(&c)
    }

    #[test]
    fn test_targets_agree() {
        on_one_worker("syrk", || {
            let reference = run(Target::HostTask, Context::local());
            assert_eq!(run(Target::HostNest, Context::local()), reference);
            assert_eq!(run(Target::HostBatch, Context::local()), reference);
            let dev = run(Target::Devices, Context::with_devices(2).unwrap());
            for (x, y) in dev.iter().zip(&reference) {
                assert!((x - y).abs() < 1e-12, "{} vs {}", x, y);
            }
        });
    }

    #[test]
    fn test_device_single_tile() {
        on_one_worker("single tile syrk", || {
            let ctx = Context::with_devices(1).unwrap();
            let (a, c) = inputs(2, 2, ctx);
            let opts = Options::new().with_target(Target::Devices);
            syrk(1.0, &a, 0.0, &c, 0, 0, Layout::RowMajor, &opts).unwrap();
            assert_eq!(a.tile_tick_count(0, 0), 2);
            c.tile_update_all_origin().unwrap();
            c.tile_layout_reset().unwrap();
            // A = [[-1, 0], [-0.5, 0.5]]
            assert_eq!(lower(&c), vec![1.0, 0.5, 0.5]);
        });
    }

    #[test]
    fn test_ticks_per_consumer() {
        let (a, c) = inputs(6, 2, Context::local());
        syrk(1.0, &a, 0.0, &c, 0, 0, Layout::ColMajor, &Options::new()).unwrap();
        // row i of A feeds C(i, 0..=i) and C(i..3, i), counting the diagonal twice
        for i in 0..3 {
            assert_eq!(a.tile_tick_count(i, 0), 4);
        }

        let (a, c) = inputs(6, 2, Context::local());
        let opts = Options::new().with_release_strategy(TileReleaseStrategy::None);
        syrk(1.0, &a, 0.0, &c, 0, 0, Layout::ColMajor, &opts).unwrap();
        assert_eq!(a.tile_tick_count(0, 0), 0);
    }

    #[test]
    fn test_upper_rejected() {
        let ctx = Context::local();
        let dist = Distribution::single();
        let a = Matrix::<f64>::zeros(4, 2, 2, dist, Arc::clone(&ctx)).unwrap();
        let c = SymmetricMatrix::from_fn(Uplo::Upper, 4, 2, dist, ctx, |_, _| 0.0).unwrap();
        let err = syrk(1.0, &a, 0.0, &c, 0, 0, Layout::ColMajor, &Options::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "C", .. }));
        // the transposed view of an upper matrix is lower
        let ct = transpose(&c).unwrap();
        assert!(syrk(1.0, &a, 0.0, &ct, 0, 0, Layout::ColMajor, &Options::new()).is_ok());
    }

    #[test]
    fn test_complex_conj_trans_rejected() {
        let ctx = Context::local();
        let dist = Distribution::single();
        let a = Matrix::<C64>::zeros(2, 4, 2, dist, Arc::clone(&ctx)).unwrap();
        let c = SymmetricMatrix::<C64>::new(Uplo::Lower, 4, 2, dist, ctx).unwrap();
        let ah = crate::mat::conj_transpose(&a).unwrap();
        let one = C64::new(1.0, 0.0);
        let err = syrk(one, &ah, one, &c, 0, 0, Layout::ColMajor, &Options::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "op", .. }));
    }

    #[test]
    fn test_zero_devices() {
        let (a, c) = inputs(4, 2, Context::local());
        let opts = Options::new().with_target(Target::Devices);
        let err = syrk(1.0, &a, 0.0, &c, 0, 0, Layout::ColMajor, &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "target", .. }));
    }
}
