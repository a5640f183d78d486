//! Tile storage shared by every view of one matrix.
//!
//! Coordinates here are global block indices of the stored (untransposed)
//! matrix. One [`TileNode`] per tile known to this process holds its
//! instances (host and device copies) and the bookkeeping behind the tile
//! lifecycle: `life` for received remote copies and a tick counter.

use super::distribution::{Context, Distribution};
use super::tile::{compact_stride, convert_layout, Location, Tile, TileBuffer, TileState};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tile_types::{Layout, Op, Scalar, Uplo};
use tracing::trace;

struct Instance<T> {
    data: TileBuffer<T>,
    state: TileState,
    layout: Layout,
}

struct TileNode<T> {
    rows: usize,
    cols: usize,
    instances: BTreeMap<Location, Instance<T>>,
    /// Received from another rank; dropped when `life` reaches zero.
    workspace: bool,
    life: i64,
}

const ORIGIN: Location = Location::Host;

impl<T: Scalar> TileNode<T> {
    /// Freshest instance: a modified one, else the origin, else any valid one.
    fn source(&self) -> Option<Location> {
        let usable = |s: TileState| s != TileState::Invalid;
        self.instances
            .iter()
            .find(|(_, inst)| inst.state == TileState::Modified)
            .or_else(|| {
                self.instances
                    .get_key_value(&ORIGIN)
                    .filter(|(_, inst)| usable(inst.state))
            })
            .or_else(|| self.instances.iter().find(|(_, inst)| usable(inst.state)))
            .map(|(&loc, _)| loc)
    }

    fn copy_from(&self, src: Location, layout: Layout) -> Result<Vec<T>> {
        let inst = &self.instances[&src];
        let data = inst.data.read_recursive();
        convert_layout(&data, self.rows, self.cols, inst.layout, layout)
    }
}

pub(crate) struct Storage<T> {
    pub(crate) id: u64,
    pub(crate) m: usize,
    pub(crate) n: usize,
    pub(crate) nb: usize,
    pub(crate) mt: usize,
    pub(crate) nt: usize,
    pub(crate) uplo: Uplo,
    pub(crate) dist: Distribution,
    pub(crate) ctx: Arc<Context>,
    tiles: Mutex<HashMap<(usize, usize), TileNode<T>>>,
    ticks: Mutex<HashMap<(usize, usize), u64>>,
}

impl<T: Scalar> Storage<T> {
    pub(crate) fn new(
        m: usize,
        n: usize,
        nb: usize,
        uplo: Uplo,
        dist: Distribution,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        if nb == 0 {
            return Err(Error::invalid("nb", "tile size must be positive"));
        }
        if dist.num_ranks() != ctx.comm().size() {
            return Err(Error::invalid(
                "dist",
                format!(
                    "{}x{} grid for {} ranks",
                    dist.p(),
                    dist.q(),
                    ctx.comm().size()
                ),
            ));
        }
        Ok(Self {
            id: ctx.next_matrix_id(),
            m,
            n,
            nb,
            mt: m.div_ceil(nb),
            nt: n.div_ceil(nb),
            uplo,
            dist,
            ctx,
            tiles: Mutex::new(HashMap::new()),
            ticks: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn tile_mb(&self, gi: usize) -> usize {
        if gi + 1 == self.mt {
            self.m - gi * self.nb
        } else {
            self.nb
        }
    }

    pub(crate) fn tile_nb(&self, gj: usize) -> usize {
        if gj + 1 == self.nt {
            self.n - gj * self.nb
        } else {
            self.nb
        }
    }

    pub(crate) fn tile_rank(&self, gi: usize, gj: usize) -> usize {
        self.dist.tile_rank(gi, gj)
    }

    pub(crate) fn tile_is_local(&self, gi: usize, gj: usize) -> bool {
        self.tile_rank(gi, gj) == self.ctx.comm().rank()
    }

    pub(crate) fn tile_device(&self, gi: usize, gj: usize) -> usize {
        self.dist
            .tile_device(gi, gj, self.ctx.devices().num_devices())
    }

    /// Whether `(gi, gj)` lies in the stored triangle.
    pub(crate) fn in_triangle(&self, gi: usize, gj: usize) -> bool {
        match self.uplo {
            Uplo::Lower => gi >= gj,
            Uplo::Upper => gi <= gj,
            Uplo::General => true,
        }
    }

    /// Insert (or replace) the origin instance of a tile on the host.
    pub(crate) fn insert(
        &self,
        gi: usize,
        gj: usize,
        rows: usize,
        cols: usize,
        data: Vec<T>,
    ) -> Result<()> {
        if data.len() != rows * cols {
            return Err(Error::TileMismatch(format!(
                "tile ({}, {}): {} elements for {}x{}",
                gi,
                gj,
                data.len(),
                rows,
                cols
            )));
        }
        let mut instances = BTreeMap::new();
        instances.insert(
            ORIGIN,
            Instance {
                data: Arc::new(RwLock::new(data)),
                state: TileState::Valid,
                layout: Layout::ColMajor,
            },
        );
        self.tiles.lock().insert(
            (gi, gj),
            TileNode {
                rows,
                cols,
                instances,
                workspace: false,
                life: 0,
            },
        );
        Ok(())
    }

    /// Store a copy received from the owner, adding `life` pending uses.
    pub(crate) fn insert_workspace(
        &self,
        gi: usize,
        gj: usize,
        rows: usize,
        cols: usize,
        data: Vec<T>,
        life: i64,
    ) {
        let mut tiles = self.tiles.lock();
        let node = tiles.entry((gi, gj)).or_insert_with(|| TileNode {
            rows,
            cols,
            instances: BTreeMap::new(),
            workspace: true,
            life: 0,
        });
        node.rows = rows;
        node.cols = cols;
        node.life += life;
        // a fresh copy supersedes any device copies left from earlier
        node.instances.clear();
        node.instances.insert(
            ORIGIN,
            Instance {
                data: Arc::new(RwLock::new(data)),
                state: TileState::Valid,
                layout: Layout::ColMajor,
            },
        );
        trace!(matrix = self.id, gi, gj, life = node.life, "workspace tile stored");
    }

    pub(crate) fn exists(&self, gi: usize, gj: usize, loc: Location) -> bool {
        self.tiles
            .lock()
            .get(&(gi, gj))
            .is_some_and(|node| node.instances.contains_key(&loc))
    }

    /// Make a valid instance at `loc` in `layout`.
    pub(crate) fn get_for_reading(
        &self,
        gi: usize,
        gj: usize,
        loc: Location,
        layout: Layout,
    ) -> Result<()> {
        let mut tiles = self.tiles.lock();
        let node = tiles
            .get_mut(&(gi, gj))
            .ok_or(Error::TileNotFound { i: gi, j: gj, location: loc })?;

        if let Some(inst) = node.instances.get_mut(&loc) {
            if inst.state != TileState::Invalid {
                if inst.layout != layout {
                    let mut data = inst.data.write();
                    *data = convert_layout(&data, node.rows, node.cols, inst.layout, layout)?;
                    inst.layout = layout;
                }
                return Ok(());
            }
        }

        let src = node
            .source()
            .ok_or(Error::TileNotFound { i: gi, j: gj, location: loc })?;
        let data = node.copy_from(src, layout)?;
        trace!(matrix = self.id, gi, gj, from = ?src, to = ?loc, "tile copy");

        match node.instances.get_mut(&loc) {
            Some(inst) => {
                // refresh in place so outstanding handles see the new data
                *inst.data.write() = data;
                inst.state = TileState::Valid;
                inst.layout = layout;
            }
            None => {
                node.instances.insert(
                    loc,
                    Instance {
                        data: Arc::new(RwLock::new(data)),
                        state: TileState::Valid,
                        layout,
                    },
                );
            }
        }
        Ok(())
    }

    /// As [`Self::get_for_reading`], then mark `loc` modified and every other
    /// instance invalid.
    pub(crate) fn get_for_writing(
        &self,
        gi: usize,
        gj: usize,
        loc: Location,
        layout: Layout,
    ) -> Result<()> {
        self.get_for_reading(gi, gj, loc, layout)?;
        let mut tiles = self.tiles.lock();
        if let Some(node) = tiles.get_mut(&(gi, gj)) {
            for (&l, inst) in node.instances.iter_mut() {
                inst.state = if l == loc {
                    TileState::Modified
                } else {
                    TileState::Invalid
                };
            }
        }
        Ok(())
    }

    pub(crate) fn handle(&self, gi: usize, gj: usize, loc: Location) -> Result<Tile<T>> {
        let tiles = self.tiles.lock();
        let node = tiles
            .get(&(gi, gj))
            .ok_or(Error::TileNotFound { i: gi, j: gj, location: loc })?;
        let inst = node
            .instances
            .get(&loc)
            .filter(|inst| inst.state != TileState::Invalid)
            .ok_or(Error::TileNotFound { i: gi, j: gj, location: loc })?;
        Ok(Tile {
            data: Arc::clone(&inst.data),
            rows: node.rows,
            cols: node.cols,
            stride: compact_stride(node.rows, node.cols, inst.layout),
            op: Op::NoTrans,
            uplo: if gi == gj { self.uplo } else { Uplo::General },
            layout: inst.layout,
            location: loc,
        })
    }

    /// Column-major copy of the freshest instance.
    pub(crate) fn snapshot(&self, gi: usize, gj: usize) -> Option<(usize, usize, Vec<T>)> {
        let tiles = self.tiles.lock();
        let node = tiles.get(&(gi, gj))?;
        let src = node.source()?;
        let data = node.copy_from(src, Layout::ColMajor).ok()?;
        Some((node.rows, node.cols, data))
    }

    pub(crate) fn life(&self, gi: usize, gj: usize) -> i64 {
        self.tiles.lock().get(&(gi, gj)).map_or(0, |node| node.life)
    }

    /// Record one finished use. Remote copies are erased when their life
    /// reaches zero; local tiles only count.
    pub(crate) fn tick(&self, gi: usize, gj: usize) {
        *self.ticks.lock().entry((gi, gj)).or_default() += 1;
        if self.tile_is_local(gi, gj) {
            return;
        }
        let mut tiles = self.tiles.lock();
        if let Some(node) = tiles.get_mut(&(gi, gj)) {
            node.life -= 1;
            if node.life <= 0 {
                tiles.remove(&(gi, gj));
                trace!(matrix = self.id, gi, gj, "workspace tile evicted");
            }
        }
    }

    pub(crate) fn tick_count(&self, gi: usize, gj: usize) -> u64 {
        self.ticks.lock().get(&(gi, gj)).copied().unwrap_or(0)
    }

    pub(crate) fn reset_tick_counts(&self) {
        self.ticks.lock().clear();
    }

    /// Drop the device copy unless it holds the only fresh data.
    pub(crate) fn release(&self, gi: usize, gj: usize, device: usize) {
        let loc = Location::Device(device);
        let mut tiles = self.tiles.lock();
        if let Some(node) = tiles.get_mut(&(gi, gj)) {
            let releasable = node
                .instances
                .get(&loc)
                .is_some_and(|inst| inst.state != TileState::Modified);
            if releasable {
                node.instances.remove(&loc);
                trace!(matrix = self.id, gi, gj, device, "device copy released");
            }
        }
    }

    /// Copy every modified non-origin instance back to the origin.
    pub(crate) fn update_all_origin(&self) -> Result<()> {
        let mut tiles = self.tiles.lock();
        for (&(gi, gj), node) in tiles.iter_mut() {
            let Some(origin) = node.instances.get(&ORIGIN) else {
                continue;
            };
            if origin.state != TileState::Invalid {
                continue;
            }
            let Some(src) = node.source() else {
                continue;
            };
            let origin_layout = origin.layout;
            let data = node.copy_from(src, origin_layout)?;
            if let Some(origin) = node.instances.get_mut(&ORIGIN) {
                *origin.data.write() = data;
                origin.state = TileState::Valid;
            }
            if let Some(inst) = node.instances.get_mut(&src) {
                inst.state = TileState::Valid;
            }
            trace!(matrix = self.id, gi, gj, from = ?src, "origin updated");
        }
        Ok(())
    }

    /// Drop received remote copies and every non-origin instance that does
    /// not hold the only fresh data.
    pub(crate) fn release_workspace(&self) {
        let mut tiles = self.tiles.lock();
        tiles.retain(|_, node| !node.workspace);
        for node in tiles.values_mut() {
            let origin_fresh = node
                .instances
                .get(&ORIGIN)
                .is_some_and(|inst| inst.state != TileState::Invalid);
            node.instances.retain(|&loc, inst| {
                loc == ORIGIN || (!origin_fresh && inst.state == TileState::Modified)
            });
        }
    }

    /// Convert every instance back to column-major.
    pub(crate) fn layout_reset(&self) -> Result<()> {
        let mut tiles = self.tiles.lock();
        for node in tiles.values_mut() {
            let (rows, cols) = (node.rows, node.cols);
            for inst in node.instances.values_mut() {
                if inst.layout != Layout::ColMajor {
                    let mut data = inst.data.write();
                    *data = convert_layout(&data, rows, cols, inst.layout, Layout::ColMajor)?;
                    inst.layout = Layout::ColMajor;
                }
            }
        }
        Ok(())
    }

    /// Received remote copies plus non-origin instances currently held.
    pub(crate) fn workspace_count(&self) -> usize {
        let tiles = self.tiles.lock();
        tiles
            .values()
            .map(|node| {
                if node.workspace {
                    node.instances.len()
                } else {
                    node.instances.keys().filter(|&&l| l != ORIGIN).count()
                }
            })
            .sum()
    }
}
