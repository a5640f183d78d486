use super::{fetch_to_devices, finish, run_pipeline, scale_local};
use crate::error::{invalid_if, Error, Result};
use crate::internal::{self, check_target, gemm_exec, gemm_prep, ops_compose, PreparedGemm};
use crate::mat::Matrix;
use crate::options::{Options, Target};
use crate::scheduler::build_pool;
use parking_lot::Mutex;
use tile_kernels::KernelDispatch;
use tile_types::Layout;

/// Distributed `C = alpha op(A) op(B) + beta C`.
///
/// Panel `k` is block column `k` of `op(A)` and block row `k` of `op(B)`;
/// each is broadcast along the block rows (columns) of `C` that use it.
/// On failure the output holds whatever the completed panels wrote, and the
/// first failing unit is reported once every task has drained.
#[tracing::instrument(skip_all, fields(m = c.m(), n = c.n(), k = a.n()))]
pub fn gemm<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &Matrix<T>,
    opts: &Options,
) -> Result<()> {
    let target = opts.get_target()?;
    let lookahead = opts.get_lookahead()?;
    let threads = opts.get_max_threads()?;
    let queue_index = opts.get_queue_index()?;
    let priority = opts.get_priority()?;
    let tick = opts.ticks_internal()?;
    let layout = Layout::ColMajor;

    invalid_if!(a.mt() != c.mt(), "A", "{} block rows for {} in C", a.mt(), c.mt());
    invalid_if!(b.nt() != c.nt(), "B", "{} block columns for {} in C", b.nt(), c.nt());
    invalid_if!(a.nt() != b.mt(), "B", "{} block rows for {} block columns in A", b.mt(), a.nt());
    if let Some(k) = (0..a.nt()).find(|&k| a.tile_nb(k) != b.tile_mb(k)) {
        return Err(Error::invalid(
            "B",
            format!("panel {}: {} columns in A, {} rows in B", k, a.tile_nb(k), b.tile_mb(k)),
        ));
    }
    invalid_if!(
        !ops_compose::<T>(a.op(), c.op()) || !ops_compose::<T>(b.op(), c.op()),
        "op",
        "op(C) = {:?} cannot absorb op(A) = {:?}, op(B) = {:?}",
        c.op(),
        a.op(),
        b.op()
    );
    check_target(target, c.num_devices(), layout)?;

    let (mt, nt, panels) = (c.mt(), c.nt(), a.nt());
    if mt == 0 || nt == 0 {
        return Ok(());
    }
    if panels == 0 {
        return scale_local(c, beta, |_, _| true);
    }

    let pool = build_pool(threads)?;
    let devices = target == Target::Devices;
    let slots: Vec<Mutex<Option<PreparedGemm<T>>>> =
        (0..=lookahead).map(|_| Mutex::new(None)).collect();
    let panel_a = |k: usize| a.sub(0, mt - 1, k, k);
    let panel_b = |k: usize| b.sub(k, k, 0, nt - 1);
    let beta_k = |k: usize| if k == 0 { beta } else { T::one() };

    let bcast = |k: usize| -> Result<()> {
        let a_list: Vec<_> = (0..mt).map(|i| (i, k, vec![c.sub(i, i, 0, nt - 1)])).collect();
        a.list_bcast(&a_list, layout, target)?;
        let b_list: Vec<_> = (0..nt).map(|j| (k, j, vec![c.sub(0, mt - 1, j, j)])).collect();
        b.list_bcast(&b_list, layout, target)?;
        if devices {
            let plan = gemm_prep(alpha, &panel_a(k), &panel_b(k), beta_k(k), c, layout)?;
            *slots[k % (lookahead + 1)].lock() = Some(plan);
        }
        Ok(())
    };

    let compute = |k: usize| -> Result<()> {
        if devices {
            let plan = slots[k % (lookahead + 1)]
                .lock()
                .take()
                .ok_or_else(|| Error::Device(format!("panel {} was not staged", k)))?;
            gemm_exec(plan, queue_index, tick)
        } else {
            internal::gemm(
                alpha,
                &panel_a(k),
                &panel_b(k),
                beta_k(k),
                c,
                layout,
                priority,
                queue_index,
                opts,
            )
        }
    };

    let prologue: Option<Box<dyn FnOnce() -> Result<()> + Send + '_>> = if devices {
        Some(Box::new(move || fetch_to_devices(c, layout, |_, _| true)))
    } else {
        None
    };

    let result = run_pipeline(&pool, panels, lookahead, prologue, &bcast, &compute);
    finish(result, c, &[a, b])
}
