//! Execution options passed through every call.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Execution target of the tile-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// One concurrent task per output tile on the host.
    HostTask,
    /// Diagonal tasks, then a flattened nested parallel loop.
    HostNest,
    /// One batched host call for the uniform off-diagonal tiles.
    HostBatch,
    /// Batched kernels on the device compute queues.
    Devices,
}

/// When input tiles are ticked after use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileReleaseStrategy {
    /// Never tick; workspace is dropped only by `release_workspace`.
    None,
    /// Tick inside the tile-level operations.
    Internal,
    /// Tick inside the tile-level operations and release at the driver level.
    All,
}

/// Recognized option keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Target,
    Lookahead,
    TileReleaseStrategy,
    QueueIndex,
    MaxThreads,
    Priority,
}

/// A typed option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    Target(Target),
    Release(TileReleaseStrategy),
    Int(i64),
}

impl From<Target> for OptionValue {
    fn from(t: Target) -> Self {
        OptionValue::Target(t)
    }
}

impl From<TileReleaseStrategy> for OptionValue {
    fn from(r: TileReleaseStrategy) -> Self {
        OptionValue::Release(r)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

pub(crate) static DEFAULT_MAX_THREADS: Lazy<usize> = Lazy::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
});

/// Immutable option set.
///
/// Built with the `with_*` methods, each of which returns a new set:
///
/// ```
/// use tiled_blas::{Options, Target};
///
/// let opts = Options::new().with_target(Target::HostNest).with_lookahead(2);
/// assert_eq!(opts.get_target().unwrap(), Target::HostNest);
/// assert_eq!(opts.get_lookahead().unwrap(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    map: HashMap<OptionKey, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary key. Values are type-checked by the getters.
    pub fn with(mut self, key: OptionKey, value: impl Into<OptionValue>) -> Self {
        self.map.insert(key, value.into());
        self
    }

    pub fn with_target(self, target: Target) -> Self {
        self.with(OptionKey::Target, target)
    }

    pub fn with_lookahead(self, lookahead: usize) -> Self {
        self.with(OptionKey::Lookahead, lookahead as i64)
    }

    pub fn with_release_strategy(self, strategy: TileReleaseStrategy) -> Self {
        self.with(OptionKey::TileReleaseStrategy, strategy)
    }

    pub fn with_queue_index(self, index: usize) -> Self {
        self.with(OptionKey::QueueIndex, index as i64)
    }

    pub fn with_max_threads(self, threads: usize) -> Self {
        self.with(OptionKey::MaxThreads, threads as i64)
    }

    pub fn with_priority(self, priority: i64) -> Self {
        self.with(OptionKey::Priority, priority)
    }

    pub fn get(&self, key: OptionKey) -> Option<OptionValue> {
        self.map.get(&key).copied()
    }

    fn get_int(&self, key: OptionKey, arg: &'static str, default: i64) -> Result<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(OptionValue::Int(v)) => Ok(v),
            Some(other) => Err(Error::invalid(
                arg,
                format!("expected an integer, got {:?}", other),
            )),
        }
    }

    fn get_count(&self, key: OptionKey, arg: &'static str, default: usize) -> Result<usize> {
        let v = self.get_int(key, arg, default as i64)?;
        usize::try_from(v).map_err(|_| Error::invalid(arg, format!("{} is negative", v)))
    }

    /// Target, default `HostTask`.
    pub fn get_target(&self) -> Result<Target> {
        match self.get(OptionKey::Target) {
            None => Ok(Target::HostTask),
            Some(OptionValue::Target(t)) => Ok(t),
            Some(other) => Err(Error::invalid(
                "Target",
                format!("expected a target, got {:?}", other),
            )),
        }
    }

    /// Lookahead depth, default 1.
    pub fn get_lookahead(&self) -> Result<usize> {
        self.get_count(OptionKey::Lookahead, "Lookahead", 1)
    }

    /// Release strategy, default `All`.
    pub fn get_release_strategy(&self) -> Result<TileReleaseStrategy> {
        match self.get(OptionKey::TileReleaseStrategy) {
            None => Ok(TileReleaseStrategy::All),
            Some(OptionValue::Release(r)) => Ok(r),
            Some(other) => Err(Error::invalid(
                "TileReleaseStrategy",
                format!("expected a release strategy, got {:?}", other),
            )),
        }
    }

    /// Whether tile-level operations tick their inputs.
    pub fn ticks_internal(&self) -> Result<bool> {
        Ok(matches!(
            self.get_release_strategy()?,
            TileReleaseStrategy::Internal | TileReleaseStrategy::All
        ))
    }

    /// Device compute-queue index, default 0.
    pub fn get_queue_index(&self) -> Result<usize> {
        self.get_count(OptionKey::QueueIndex, "QueueIndex", 0)
    }

    /// Worker pool size, default the available parallelism.
    pub fn get_max_threads(&self) -> Result<usize> {
        let n = self.get_count(OptionKey::MaxThreads, "MaxThreads", *DEFAULT_MAX_THREADS)?;
        if n == 0 {
            return Err(Error::invalid("MaxThreads", "must be at least 1"));
        }
        Ok(n)
    }

    /// Scheduling priority hint, default 0.
    pub fn get_priority(&self) -> Result<i64> {
        self.get_int(OptionKey::Priority, "Priority", 0)
    }
}
