use super::{fetch_to_devices, finish, run_pipeline, scale_local};
use crate::error::{invalid_if, Error, Result};
use crate::internal::{self, check_target};
use crate::mat::{transpose, Matrix, SymmetricMatrix};
use crate::options::{Options, Target};
use crate::scheduler::build_pool;
use tile_kernels::KernelDispatch;
use tile_types::{Layout, Op, Uplo};

/// Distributed symmetric rank-k update `C = alpha op(A) op(A)^T + beta C`.
///
/// Only the stored triangle of `C` is written. An upper `C` is updated
/// through its transpose, which is lower and holds the same values.
#[tracing::instrument(skip_all, fields(n = c.n(), k = a.n()))]
pub fn syrk<T: KernelDispatch>(
    alpha: T,
    a: &Matrix<T>,
    beta: T,
    c: &SymmetricMatrix<T>,
    opts: &Options,
) -> Result<()> {
    let target = opts.get_target()?;
    let lookahead = opts.get_lookahead()?;
    let threads = opts.get_max_threads()?;
    let queue_index = opts.get_queue_index()?;
    let priority = opts.get_priority()?;
    let layout = Layout::ColMajor;

    let c = match c.uplo() {
        Uplo::Upper => transpose(c)?,
        _ => c.clone(),
    };
    invalid_if!(
        T::IS_COMPLEX && (c.op() == Op::ConjTrans || a.op() == Op::ConjTrans),
        "op",
        "complex syrk with op(A) = {:?}, op(C) = {:?}",
        a.op(),
        c.op()
    );
    invalid_if!(a.mt() != c.mt(), "A", "{} block rows for {} in C", a.mt(), c.mt());
    if let Some(i) = (0..a.mt()).find(|&i| a.tile_mb(i) != c.tile_mb(i)) {
        return Err(Error::invalid(
            "A",
            format!("block row {}: {} rows in A, {} in C", i, a.tile_mb(i), c.tile_mb(i)),
        ));
    }
    check_target(target, c.num_devices(), layout)?;

    let (mt, panels) = (c.mt(), a.nt());
    if mt == 0 {
        return Ok(());
    }
    if panels == 0 {
        return scale_local(&c, beta, |i, j| i >= j);
    }

    let pool = build_pool(threads)?;
    let c_ref = &c;

    let bcast = |k: usize| -> Result<()> {
        // A(i, k) feeds block row i and block column i of the lower triangle
        let list: Vec<_> = (0..mt)
            .map(|i| (i, k, vec![c_ref.sub(i, i, 0, i), c_ref.sub(i, mt - 1, i, i)]))
            .collect();
        a.list_bcast(&list, layout, target)
    };

    let compute = |k: usize| -> Result<()> {
        let beta_k = if k == 0 { beta } else { T::one() };
        let panel = a.sub(0, mt - 1, k, k);
        internal::syrk(alpha, &panel, beta_k, c_ref, priority, queue_index, layout, opts)
    };

    let prologue: Option<Box<dyn FnOnce() -> Result<()> + Send + '_>> =
        if target == Target::Devices {
            Some(Box::new(move || fetch_to_devices(c_ref, layout, |i, j| i >= j)))
        } else {
            None
        };

    let result = run_pipeline(&pool, panels, lookahead, prologue, &bcast, &compute);
    let c_mat: &Matrix<T> = c_ref;
    finish(result, c_mat, &[a])
}
