//! Device compute queues.
//!
//! Each device owns a few in-order queues. A queue runs submitted jobs on
//! its own worker thread inside the device's kernel pool, never on the
//! pool of the host task waiting in [`ComputeQueue::sync`]. `sync` waits for everything
//! submitted so far and reports the failures since the previous sync as one
//! `ComputeFailure` carrying the first failing unit and the count.
//! Device memory is modeled by the `Location::Device` tile instances kept
//! in matrix storage.

use crate::error::{Error, Result};
use crate::options::DEFAULT_MAX_THREADS;
use crate::scheduler::FailureCollector;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace};

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

#[derive(Default)]
struct Progress {
    submitted: u64,
    completed: u64,
}

#[derive(Default)]
struct Fence {
    progress: Mutex<Progress>,
    done: Condvar,
    failures: FailureCollector,
}

/// In-order asynchronous queue of one device.
pub struct ComputeQueue {
    device: usize,
    index: usize,
    sender: Option<Sender<Job>>,
    fence: Arc<Fence>,
    worker: Option<JoinHandle<()>>,
}

impl ComputeQueue {
    fn spawn(device: usize, index: usize, pool: Arc<rayon::ThreadPool>) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let fence = Arc::new(Fence::default());
        let worker_fence = Arc::clone(&fence);

        let worker = std::thread::Builder::new()
            .name(format!("device-{}-queue-{}", device, index))
            .spawn(move || {
                for job in receiver {
                    let outcome = pool
                        .install(|| catch_unwind(AssertUnwindSafe(job)))
                        .unwrap_or_else(|_| {
                            Err(Error::Device(format!(
                                "job panicked on device {} queue {}",
                                device, index
                            )))
                        });
                    if let Err(err) = outcome {
                        let unit = format!("device {} queue {}", device, index);
                        worker_fence.failures.record(unit, err);
                    }
                    let mut progress = worker_fence.progress.lock();
                    progress.completed += 1;
                    worker_fence.done.notify_all();
                }
            })
            .map_err(|e| Error::Device(format!("cannot start queue thread: {}", e)))?;

        Ok(Self {
            device,
            index,
            sender: Some(sender),
            fence,
            worker: Some(worker),
        })
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Enqueue `job`; returns immediately.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(|| {
            Error::Device(format!("queue {} of device {} closed", self.index, self.device))
        })?;
        self.fence.progress.lock().submitted += 1;
        if sender.send(Box::new(job)).is_err() {
            let mut progress = self.fence.progress.lock();
            progress.submitted -= 1;
            return Err(Error::Device(format!(
                "queue {} of device {} has no worker",
                self.index, self.device
            )));
        }
        trace!(device = self.device, queue = self.index, "job submitted");
        Ok(())
    }

    /// Wait for every submitted job; report the failures since the last sync.
    pub fn sync(&self) -> Result<()> {
        let mut progress = self.fence.progress.lock();
        while progress.completed < progress.submitted {
            self.fence.done.wait(&mut progress);
        }
        drop(progress);
        self.fence.failures.take()
    }
}

impl Drop for ComputeQueue {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The devices attached to one process.
pub struct DeviceSet {
    queues: Vec<Vec<Arc<ComputeQueue>>>,
}

impl DeviceSet {
    /// A process without devices.
    pub fn none() -> Self {
        Self { queues: Vec::new() }
    }

    /// `num_devices` devices with `queues_per_device` queues each.
    ///
    /// The queues of one device share a kernel pool sized to the host's
    /// available parallelism.
    pub fn new(num_devices: usize, queues_per_device: usize) -> Result<Self> {
        Self::with_kernel_threads(num_devices, queues_per_device, *DEFAULT_MAX_THREADS)
    }

    /// Like [`DeviceSet::new`], with `kernel_threads` workers per device pool.
    pub fn with_kernel_threads(
        num_devices: usize,
        queues_per_device: usize,
        kernel_threads: usize,
    ) -> Result<Self> {
        let queues_per_device = queues_per_device.max(1);
        let queues = (0..num_devices)
            .map(|d| {
                let pool = Arc::new(kernel_pool(d, kernel_threads.max(1))?);
                (0..queues_per_device)
                    .map(|q| ComputeQueue::spawn(d, q, Arc::clone(&pool)).map(Arc::new))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(num_devices, queues_per_device, kernel_threads, "device set created");
        Ok(Self { queues })
    }

    pub fn num_devices(&self) -> usize {
        self.queues.len()
    }

    /// Queue `index` of `device`.
    pub fn queue(&self, device: usize, index: usize) -> Result<Arc<ComputeQueue>> {
        let per_device = self.queues.get(device).ok_or_else(|| {
            Error::invalid("device", format!("{} of {}", device, self.queues.len()))
        })?;
        per_device.get(index).cloned().ok_or_else(|| {
            Error::invalid("queue_index", format!("{} of {}", index, per_device.len()))
        })
    }
}

fn kernel_pool(device: usize, threads: usize) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("device-{}-kernel-{}", device, i))
        .build()?)
}
