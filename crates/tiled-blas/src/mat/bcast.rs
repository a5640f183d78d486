//! Tile broadcast to the ranks that consume it.

use super::{Location, Matrix};
use crate::error::{Error, Result};
use crate::options::Target;
use std::collections::BTreeSet;
use tile_types::{Layout, Scalar};
use tracing::{trace, warn};

/// Source tile `(i, j)` and the sub-matrices whose tiles consume it.
pub type BcastList<T> = Vec<(usize, usize, Vec<Matrix<T>>)>;

struct TilePayload<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// What an owner posts for one tile: the copy, or why it has none.
type Posted<T> = std::result::Result<TilePayload<T>, String>;

impl<T: Scalar> Matrix<T> {
    fn bcast_tag(&self, gi: usize, gj: usize) -> u64 {
        (self.storage_id() << 48) | ((gi as u64) << 24) | gj as u64
    }

    /// Send each listed tile from its owner to every other rank owning a
    /// tile of one of its destinations.
    ///
    /// A receiver keeps the copy with one pending use per local destination
    /// tile. Every send of the list is posted before any receive, so ranks
    /// calling this with the same list cannot wait on each other. An owner
    /// missing a listed tile still posts a failure to each receiver, which
    /// then returns `Error::Comm` instead of waiting. With
    /// `Target::Devices` the tile is also fetched to the devices of the
    /// local destination tiles.
    pub fn list_bcast(
        &self,
        list: &[(usize, usize, Vec<Matrix<T>>)],
        layout: Layout,
        target: Target,
    ) -> Result<()> {
        let ctx = self.context();
        let comm = ctx.comm();
        let me = comm.rank();

        let plans: Vec<_> = list
            .iter()
            .map(|(i, j, dests)| {
                let mut ranks = BTreeSet::new();
                let mut local = Vec::new();
                for dest in dests {
                    for jj in 0..dest.nt() {
                        for ii in 0..dest.mt() {
                            let rank = dest.tile_rank(ii, jj);
                            ranks.insert(rank);
                            if rank == me {
                                local.push(dest.tile_device(ii, jj));
                            }
                        }
                    }
                }
                let owner = self.tile_rank(*i, *j);
                ranks.remove(&owner);
                (*i, *j, owner, ranks, local)
            })
            .collect();

        // every message of the list is consumed, even after a failure
        let mut first_err = None;
        for (i, j, owner, ranks, _) in &plans {
            if *owner != me || ranks.is_empty() {
                continue;
            }
            let (gi, gj) = self.global(*i, *j);
            let snapshot = self.storage.snapshot(gi, gj);
            for &dest in ranks {
                let posted: Posted<T> = match &snapshot {
                    Some((rows, cols, data)) => Ok(TilePayload {
                        rows: *rows,
                        cols: *cols,
                        data: data.clone(),
                    }),
                    None => Err(format!("rank {} holds no tile ({}, {})", me, gi, gj)),
                };
                comm.send(dest, self.bcast_tag(gi, gj), Box::new(posted))?;
            }
            if snapshot.is_none() {
                warn!(matrix = self.storage_id(), gi, gj, "broadcast source missing");
                first_err.get_or_insert(Error::TileNotFound {
                    i: gi,
                    j: gj,
                    location: Location::Host,
                });
                continue;
            }
            trace!(matrix = self.storage_id(), gi, gj, ranks = ?ranks, "tile sent");
        }

        for (i, j, owner, ranks, local) in &plans {
            let (gi, gj) = self.global(*i, *j);
            if ranks.contains(&me) {
                let msg = comm.recv(*owner, self.bcast_tag(gi, gj))?;
                let posted = match msg.downcast::<Posted<T>>() {
                    Ok(posted) => *posted,
                    Err(_) => Err(format!("unexpected payload for tile ({}, {})", gi, gj)),
                };
                match posted {
                    Ok(payload) => {
                        let life = local.len() as i64;
                        let TilePayload { rows, cols, data } = payload;
                        self.storage.insert_workspace(gi, gj, rows, cols, data, life);
                    }
                    Err(reason) => {
                        first_err.get_or_insert(Error::Comm(reason));
                        continue;
                    }
                }
            }
            if target == Target::Devices && !local.is_empty() {
                let devices: BTreeSet<usize> = local.iter().copied().collect();
                for d in devices {
                    let fetched = self.storage.get_for_reading(gi, gj, Location::Device(d), layout);
                    if let Err(err) = fetched {
                        first_err.get_or_insert(err);
                    }
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{Communicator, ThreadComm};
    use crate::device::DeviceSet;
    use crate::mat::{Context, Distribution};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_rank_bcast_is_local() {
        let a = Matrix::<f64>::zeros(4, 4, 2, Distribution::single(), Context::local()).unwrap();
        let c = Matrix::<f64>::zeros(4, 4, 2, Distribution::single(), Context::local()).unwrap();
        a.list_bcast(&[(0, 0, vec![c.sub(0, 0, 0, 1)])], Layout::ColMajor, Target::HostTask)
            .unwrap();
        assert_eq!(a.workspace_tiles(), 0);
        assert_eq!(a.tile_life(0, 0), 0);
    }

    #[test]
    fn test_devices_prefetch() {
        let ctx = Context::with_devices(2).unwrap();
        let a = Matrix::<f64>::zeros(4, 4, 2, Distribution::single(), Arc::clone(&ctx)).unwrap();
        let c = Matrix::<f64>::zeros(4, 4, 2, Distribution::single(), ctx).unwrap();
        a.list_bcast(&[(1, 0, vec![c.sub(0, 1, 0, 0)])], Layout::ColMajor, Target::Devices)
            .unwrap();
        assert!(a.tile_exists(1, 0, Location::Device(0)));
        assert!(a.tile_exists(1, 0, Location::Device(1)));
    }

    #[test]
    fn test_two_rank_bcast_sets_life() {
        // 2x1 grid: even block rows on rank 0, odd on rank 1
        let handles: Vec<_> = ThreadComm::world(2)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    let ctx = Context::new(Arc::new(comm), DeviceSet::none());
                    let dist = Distribution::new(2, 1).unwrap();
                    let a = Matrix::<f64>::from_fn(4, 2, 2, dist, Arc::clone(&ctx), |i, j| {
                        (i * 10 + j) as f64
                    })
                    .unwrap();
                    let c = Matrix::<f64>::zeros(4, 4, 2, dist, ctx).unwrap();
                    // A(0, 0) feeds block row 0 and block column 0 of C
                    let list = vec![(0, 0, vec![c.sub(0, 0, 0, 1), c.sub(0, 1, 0, 0)])];
                    a.list_bcast(&list, Layout::ColMajor, Target::HostTask).unwrap();
                    let exists = a.tile_exists(0, 0, Location::Host);
                    (rank, a.tile_life(0, 0), exists, a.workspace_tiles())
                })
            })
            .collect();

        for h in handles {
            let (rank, life, exists, workspace) = h.join().unwrap();
            if rank == 0 {
                assert_eq!((life, workspace), (0, 0));
            } else {
                // only C(1, 0) lives on rank 1
                assert_eq!((life, workspace), (1, 1));
            }
            assert!(exists);
        }
    }

    #[test]
    fn test_missing_source_fails_every_rank() {
        let handles: Vec<_> = ThreadComm::world(2)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    let ctx = Context::new(Arc::new(comm), DeviceSet::none());
                    let dist = Distribution::new(2, 1).unwrap();
                    // no tile allocated: the owner of A(0, 0) has nothing to send
                    let a = Matrix::<f64>::new(4, 2, 2, dist, Arc::clone(&ctx)).unwrap();
                    let c = Matrix::<f64>::zeros(4, 4, 2, dist, ctx).unwrap();
                    let list = vec![(0, 0, vec![c.sub(0, 1, 0, 0)])];
                    let err = a.list_bcast(&list, Layout::ColMajor, Target::HostTask).unwrap_err();
                    (rank, err, a.workspace_tiles())
                })
            })
            .collect();

        for h in handles {
            let (rank, err, workspace) = h.join().unwrap();
            assert_eq!(workspace, 0);
            match (rank, err) {
                (0, Error::TileNotFound { i: 0, j: 0, .. }) => {}
                (1, Error::Comm(reason)) => {
                    assert!(reason.contains("holds no tile (0, 0)"), "{}", reason)
                }
                (rank, other) => panic!("rank {}: unexpected {:?}", rank, other),
            }
        }
    }
}
