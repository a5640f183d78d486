use crate::comm::{Communicator, SelfComm};
use crate::device::DeviceSet;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 2-D block-cyclic map of tiles onto a `p x q` process grid.
///
/// Tile `(i, j)` lives on rank `(i % p) + (j % q) * p`; on that rank its
/// device is chosen row-cyclically over the local block rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    p: usize,
    q: usize,
}

impl Distribution {
    pub fn new(p: usize, q: usize) -> Result<Self> {
        if p == 0 || q == 0 {
            return Err(Error::invalid("grid", format!("{}x{} process grid", p, q)));
        }
        Ok(Self { p, q })
    }

    /// The 1x1 grid.
    pub fn single() -> Self {
        Self { p: 1, q: 1 }
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn q(&self) -> usize {
        self.q
    }

    pub fn num_ranks(&self) -> usize {
        self.p * self.q
    }

    pub fn tile_rank(&self, i: usize, j: usize) -> usize {
        (i % self.p) + (j % self.q) * self.p
    }

    pub fn tile_device(&self, i: usize, _j: usize, num_devices: usize) -> usize {
        if num_devices == 0 {
            0
        } else {
            (i / self.p) % num_devices
        }
    }
}

/// Per-process execution context shared by the matrices of one process.
pub struct Context {
    comm: Arc<dyn Communicator>,
    devices: DeviceSet,
    next_id: AtomicU64,
}

impl Context {
    pub fn new(comm: Arc<dyn Communicator>, devices: DeviceSet) -> Arc<Self> {
        Arc::new(Self {
            comm,
            devices,
            next_id: AtomicU64::new(0),
        })
    }

    /// Single process, no devices.
    pub fn local() -> Arc<Self> {
        Self::new(Arc::new(SelfComm), DeviceSet::none())
    }

    /// Single process with `num_devices` devices of two queues each.
    pub fn with_devices(num_devices: usize) -> Result<Arc<Self>> {
        Ok(Self::new(Arc::new(SelfComm), DeviceSet::new(num_devices, 2)?))
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    /// Matrix identifiers agree across ranks as long as every rank creates
    /// its matrices in the same order.
    pub(crate) fn next_matrix_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
