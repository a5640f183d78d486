//! Message passing between processes.
//!
//! The engine only needs point-to-point sends and blocking receives keyed
//! by `(source, tag)`, plus a barrier. [`SelfComm`] is the single-process
//! communicator; [`ThreadComm`] runs several ranks as threads of one
//! process, which is how the multi-rank paths are exercised.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier};

/// Message payload.
pub type Message = Box<dyn Any + Send>;

pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Send `msg` to `dest`. Never blocks.
    fn send(&self, dest: usize, tag: u64, msg: Message) -> Result<()>;

    /// Block until a message from `src` with `tag` arrives.
    fn recv(&self, src: usize, tag: u64) -> Result<Message>;

    fn barrier(&self) -> Result<()>;
}

/// Communicator of a single process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, _tag: u64, _msg: Message) -> Result<()> {
        Err(Error::Comm(format!("rank 0 of 1 cannot send to rank {}", dest)))
    }

    fn recv(&self, src: usize, _tag: u64) -> Result<Message> {
        Err(Error::Comm(format!("rank 0 of 1 cannot receive from rank {}", src)))
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}

struct Mailboxes {
    // (src, dest, tag) -> FIFO
    queues: Mutex<HashMap<(usize, usize, u64), VecDeque<Message>>>,
    arrived: Condvar,
    barrier: Barrier,
    size: usize,
}

/// One rank of an in-process world.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Mailboxes>,
}

impl ThreadComm {
    /// Create `size` connected ranks.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Mailboxes {
            queues: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
            barrier: Barrier::new(size.max(1)),
            size,
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn send(&self, dest: usize, tag: u64, msg: Message) -> Result<()> {
        if dest >= self.shared.size {
            return Err(Error::Comm(format!(
                "destination {} out of range for {} ranks",
                dest, self.shared.size
            )));
        }
        let mut queues = self.shared.queues.lock();
        queues
            .entry((self.rank, dest, tag))
            .or_default()
            .push_back(msg);
        self.shared.arrived.notify_all();
        Ok(())
    }

    fn recv(&self, src: usize, tag: u64) -> Result<Message> {
        if src >= self.shared.size {
            return Err(Error::Comm(format!(
                "source {} out of range for {} ranks",
                src, self.shared.size
            )));
        }
        let key = (src, self.rank, tag);
        let mut queues = self.shared.queues.lock();
        loop {
            if let Some(msg) = queues.get_mut(&key).and_then(|q| q.pop_front()) {
                return Ok(msg);
            }
            self.shared.arrived.wait(&mut queues);
        }
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }
}
