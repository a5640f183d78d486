//! General multiply `C = alpha A B + beta C` of one block column `A` by one
//! block row `B`.

use super::{check_target, local_tiles, ops_compose, GemmBatch};
use crate::error::{invalid_if, Result};
use crate::mat::{Location, Matrix};
use crate::options::{Options, Target};
use crate::scheduler::FailureCollector;
use crate::tile_blas;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tile_kernels::KernelDispatch;
use tile_types::Layout;
use tracing::{debug, trace};

/// Update every local tile of `C` with the outer product of `A` and `B`.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    layout: Layout,
    priority: i64,
    queue_index: usize,
    opts: &Options,
) -> Result<()> {
    let target = opts.get_target()?;
    check(a, b, c)?;
    check_target(target, c.num_devices(), layout)?;

    trace!(?target, priority, mt = c.mt(), nt = c.nt(), "internal gemm");
    let tick = opts.ticks_internal()?;
    match target {
        Target::HostTask => host_task(alpha, a, b, beta, c, tick),
        Target::HostNest => host_nest(alpha, a, b, beta, c, tick),
        Target::HostBatch => host_batch(alpha, a, b, beta, c, tick),
        Target::Devices => {
            let plan = gemm_prep(alpha, a, b, beta, c, layout)?;
            gemm_exec(plan, queue_index, tick)
        }
    }
}

/// Shape and op checks shared with the distributed driver.
pub(crate) fn check<T: KernelDispatch>(a: &Matrix<T>, b: &Matrix<T>, c: &Matrix<T>) -> Result<()> {
    invalid_if!(a.nt() != 1, "A", "{} block columns", a.nt());
    invalid_if!(b.mt() != 1, "B", "{} block rows", b.mt());
    invalid_if!(a.mt() != c.mt(), "A", "{} block rows for {} in C", a.mt(), c.mt());
    invalid_if!(b.nt() != c.nt(), "B", "{} block columns for {} in C", b.nt(), c.nt());
    invalid_if!(
        a.nt() == 1 && b.mt() == 1 && a.tile_nb(0) != b.tile_mb(0),
        "B",
        "inner dimensions {} and {}",
        a.tile_nb(0),
        b.tile_mb(0)
    );
    invalid_if!(
        !ops_compose::<T>(a.op(), c.op()) || !ops_compose::<T>(b.op(), c.op()),
        "op",
        "op(C) = {:?} cannot absorb op(A) = {:?}, op(B) = {:?}",
        c.op(),
        a.op(),
        b.op()
    );
    Ok(())
}

fn unit_name(i: usize, j: usize) -> String {
    format!("gemm tile ({}, {})", i, j)
}

#[allow(clippy::too_many_arguments)]
fn update_tile<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    i: usize,
    j: usize,
    tick: bool,
) -> Result<()> {
    let host = Location::Host;
    let result = (|| {
        a.tile_get_for_reading(i, 0, host, Layout::ColMajor)?;
        b.tile_get_for_reading(0, j, host, Layout::ColMajor)?;
        c.tile_get_for_writing(i, j, host, Layout::ColMajor)?;
        tile_blas::gemm(alpha, &a.tile(i, 0)?, &b.tile(0, j)?, beta, &c.tile(i, j)?)
    })();
    if tick {
        a.tile_tick(i, 0);
        b.tile_tick(0, j);
    }
    result
}

fn host_task<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let tiles = local_tiles(c, |_, _| true);
    rayon::scope(|s| {
        for &(i, j) in &tiles {
            let failures = &failures;
            s.spawn(move |_| {
                failures.capture(
                    || unit_name(i, j),
                    || update_tile(alpha, a, b, beta, c, i, j, tick),
                );
            });
        }
    });
    failures.into_result()
}

fn host_nest<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let mt = c.mt();
    (0..mt * c.nt()).into_par_iter().for_each(|ij| {
        let (i, j) = (ij % mt, ij / mt);
        if c.tile_is_local(i, j) {
            failures.capture(|| unit_name(i, j), || update_tile(alpha, a, b, beta, c, i, j, tick));
        }
    });
    failures.into_result()
}

fn host_batch<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let host = Location::Host;
    let tiles = local_tiles(c, |_, _| true);

    let mut groups: BTreeMap<(usize, usize), GemmBatch<T>> = BTreeMap::new();
    for &(i, j) in &tiles {
        failures.capture(
            || unit_name(i, j),
            || {
                a.tile_get_for_reading(i, 0, host, Layout::ColMajor)?;
                b.tile_get_for_reading(0, j, host, Layout::ColMajor)?;
                c.tile_get_for_writing(i, j, host, Layout::ColMajor)?;
                groups
                    .entry((c.tile_mb(i), c.tile_nb(j)))
                    .or_insert_with(|| GemmBatch::new(alpha, beta))
                    .push(unit_name(i, j), a.tile(i, 0)?, b.tile(0, j)?, c.tile(i, j)?);
                Ok(())
            },
        );
    }
    for ((mb, nb), batch) in &groups {
        debug!(mb, nb, entries = batch.len(), "host gemm batch");
        failures.capture(|| format!("gemm batch {}x{}", mb, nb), || batch.execute());
    }
    if tick {
        for &(i, j) in &tiles {
            a.tile_tick(i, 0);
            b.tile_tick(0, j);
        }
    }
    failures.into_result()
}

struct DeviceGemm<T> {
    device: usize,
    tiles: Vec<(usize, usize)>,
    batches: Vec<GemmBatch<T>>,
}

/// Device batches of one panel, staged ahead of their execution.
pub(crate) struct PreparedGemm<T> {
    a: Matrix<T>,
    b: Matrix<T>,
    c: Matrix<T>,
    devices: Vec<DeviceGemm<T>>,
}

/// Fetch the tiles of every device and build its batches: interior tiles,
/// the last block row, the last block column and the corner.
pub(crate) fn gemm_prep<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    layout: Layout,
) -> Result<PreparedGemm<T>> {
    let (last_i, last_j) = (c.mt().saturating_sub(1), c.nt().saturating_sub(1));
    let mut devices = Vec::new();
    for d in 0..c.num_devices() {
        let tiles = local_tiles(c, |i, j| c.tile_device(i, j) == d);
        if tiles.is_empty() {
            continue;
        }
        let row_set: BTreeSet<usize> = tiles.iter().map(|&(i, _)| i).collect();
        let col_set: BTreeSet<usize> = tiles.iter().map(|&(_, j)| j).collect();
        let rows: Vec<_> = row_set.into_iter().map(|i| (i, 0)).collect();
        let cols: Vec<_> = col_set.into_iter().map(|j| (0, j)).collect();
        a.tile_get_set_for_reading(&rows, d, layout)?;
        b.tile_get_set_for_reading(&cols, d, layout)?;
        c.tile_get_set_for_writing(&tiles, d, layout)?;

        let loc = Location::Device(d);
        let mut groups: [GemmBatch<T>; 4] = std::array::from_fn(|_| GemmBatch::new(alpha, beta));
        for &(i, j) in &tiles {
            let g = usize::from(i == last_i) + 2 * usize::from(j == last_j);
            let (ai, bj) = (a.tile_on(i, 0, loc)?, b.tile_on(0, j, loc)?);
            groups[g].push(unit_name(i, j), ai, bj, c.tile_on(i, j, loc)?);
        }
        debug!(device = d, tiles = tiles.len(), "device gemm staged");
        devices.push(DeviceGemm {
            device: d,
            tiles,
            batches: groups.into_iter().filter(|g| !g.is_empty()).collect(),
        });
    }
    Ok(PreparedGemm {
        a: a.clone(),
        b: b.clone(),
        c: c.clone(),
        devices,
    })
}

/// Issue staged batches, one task per device; release and tick the inputs
/// once the device queue has drained.
pub(crate) fn gemm_exec<T: KernelDispatch>(
    plan: PreparedGemm<T>,
    queue_index: usize,
    tick: bool,
) -> Result<()> {
    let failures = FailureCollector::new();
    let PreparedGemm { a, b, c, devices } = plan;
    let (a, b, c) = (&a, &b, &c);
    rayon::scope(|s| {
        for dev in devices {
            let failures = &failures;
            s.spawn(move |_| {
                let d = dev.device;
                failures.capture(
                    || format!("device {}", d),
                    || {
                        let result = (|| {
                            let queue = c.compute_queue(d, queue_index)?;
                            for batch in dev.batches {
                                queue.submit(move || batch.execute())?;
                            }
                            queue.sync()
                        })();
                        for &(i, j) in &dev.tiles {
                            a.tile_release(i, 0, d);
                            b.tile_release(0, j, d);
                            if tick {
                                a.tile_tick(i, 0);
                                b.tile_tick(0, j);
                            }
                        }
                        result
                    },
                );
            });
        }
    });
    failures.into_result()
}
