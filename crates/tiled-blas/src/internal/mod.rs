//! Whole-matrix tile operations, one implementation per [`Target`].
//!
//! Each entry point checks its arguments, then forwards to exactly one
//! backend. The checks never touch a tile, so an illegal call fails before
//! any data moves.

mod batch;
mod gemm;
mod syrk;
mod trsm_a;

pub(crate) use batch::{GemmBatch, SyrkBatch, TrsmBatch};
pub(crate) use gemm::{gemm_exec, gemm_prep, PreparedGemm};
pub use gemm::gemm;
pub use syrk::syrk;
pub use trsm_a::trsm_a;

use crate::error::{Error, Result};
use crate::mat::Matrix;
use crate::options::Target;
use tile_types::{Layout, Op, Scalar};

/// Common target checks: devices present, host layout, backend compiled in.
pub(crate) fn check_target(target: Target, num_devices: usize, layout: Layout) -> Result<()> {
    match target {
        Target::Devices if num_devices == 0 => Err(Error::invalid(
            "target",
            "Devices requested but no device is available",
        )),
        Target::Devices => Ok(()),
        _ if layout != Layout::ColMajor => Err(Error::invalid(
            "layout",
            format!("{:?} host tiles must be column-major", target),
        )),
        Target::HostNest if !cfg!(feature = "host-nest") => Err(Error::NotSupported {
            target,
            reason: "built without the host-nest feature".into(),
        }),
        Target::HostBatch if !cfg!(feature = "host-batch") => Err(Error::NotSupported {
            target,
            reason: "built without the host-batch feature".into(),
        }),
        _ => Ok(()),
    }
}

/// Whether `inner` under `outer` is still a transpose operator.
pub(crate) fn ops_compose<T: Scalar>(inner: Op, outer: Op) -> bool {
    inner.compose(outer, T::IS_COMPLEX).is_some()
}

/// Local tiles of `c` satisfying `keep`, column by column.
pub(crate) fn local_tiles<T: Scalar>(
    c: &Matrix<T>,
    keep: impl Fn(usize, usize) -> bool,
) -> Vec<(usize, usize)> {
    let mut tiles = Vec::new();
    for j in 0..c.nt() {
        for i in 0..c.mt() {
            if keep(i, j) && c.tile_is_local(i, j) {
                tiles.push((i, j));
            }
        }
    }
    tiles
}

/// Run `f` on a one-worker pool off the test thread; panic if it stalls.
#[cfg(test)]
pub(crate) fn on_one_worker<F>(what: &str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    use std::sync::mpsc::{channel, RecvTimeoutError};
    use std::time::Duration;

    let (done, finished) = channel();
    std::thread::spawn(move || {
        let pool = crate::scheduler::build_pool(1).unwrap();
        pool.install(f);
        let _ = done.send(());
    });
    match finished.recv_timeout(Duration::from_secs(60)) {
        Ok(()) => {}
        Err(RecvTimeoutError::Timeout) => panic!("{} stalled on a one-worker pool", what),
        Err(RecvTimeoutError::Disconnected) => panic!("{} panicked", what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devices_without_devices() {
        let err = check_target(Target::Devices, 0, Layout::ColMajor).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "target", .. }));
        assert!(check_target(Target::Devices, 2, Layout::RowMajor).is_ok());
    }

    #[test]
    fn test_host_needs_col_major() {
        let err = check_target(Target::HostTask, 0, Layout::RowMajor).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "layout", .. }));
    }

    #[test]
    fn test_feature_gated_targets() {
        let nest = check_target(Target::HostNest, 0, Layout::ColMajor);
        assert_eq!(nest.is_ok(), cfg!(feature = "host-nest"));
        let batch = check_target(Target::HostBatch, 0, Layout::ColMajor);
        if !cfg!(feature = "host-batch") {
            assert!(matches!(batch, Err(Error::NotSupported { .. })));
        }
    }

    #[test]
    fn test_ops_compose() {
        assert!(ops_compose::<f64>(Op::Trans, Op::ConjTrans));
        assert!(!ops_compose::<tile_types::C64>(Op::Trans, Op::ConjTrans));
        assert!(ops_compose::<tile_types::C64>(Op::ConjTrans, Op::ConjTrans));
    }
}
