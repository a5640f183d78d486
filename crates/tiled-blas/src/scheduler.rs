//! Dependency-driven task graph on a bounded worker pool.
//!
//! Tasks declare `In`/`Out` dependencies on [`Token`]s. Edges are resolved
//! when a task is added, in submission order: a reader waits for the last
//! writer of its token, a writer waits for the last writer and every reader
//! since. [`TaskGraph::run`] releases ready tasks onto a rayon pool and
//! returns once every task has finished.
//!
//! There is no cancellation. A failing task is recorded in a
//! [`FailureCollector`]; its successors still run, and the failure is
//! raised once after the join.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{trace, warn};

/// A named dependency slot, e.g. `bcast[3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub space: &'static str,
    pub index: usize,
}

impl Token {
    pub const fn new(space: &'static str, index: usize) -> Self {
        Self { space, index }
    }
}

/// Dependency of a task on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dep {
    In(Token),
    Out(Token),
}

type Body<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

struct TaskNode<'a> {
    name: String,
    priority: i64,
    body: Body<'a>,
    predecessors: BTreeSet<usize>,
}

/// A graph of tasks with token dependencies.
#[derive(Default)]
pub struct TaskGraph<'a> {
    tasks: Vec<TaskNode<'a>>,
    last_writer: HashMap<Token, usize>,
    readers: HashMap<Token, Vec<usize>>,
}

impl<'a> TaskGraph<'a> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            last_writer: HashMap::new(),
            readers: HashMap::new(),
        }
    }

    /// Add a task; returns its index.
    pub fn add<F>(&mut self, name: impl Into<String>, deps: &[Dep], priority: i64, body: F) -> usize
    where
        F: FnOnce() -> Result<()> + Send + 'a,
    {
        let id = self.tasks.len();
        let mut predecessors = BTreeSet::new();

        for dep in deps {
            match *dep {
                Dep::In(token) => {
                    if let Some(&w) = self.last_writer.get(&token) {
                        predecessors.insert(w);
                    }
                    self.readers.entry(token).or_default().push(id);
                }
                Dep::Out(token) => {
                    if let Some(&w) = self.last_writer.get(&token) {
                        predecessors.insert(w);
                    }
                    if let Some(readers) = self.readers.remove(&token) {
                        predecessors.extend(readers.into_iter().filter(|&r| r != id));
                    }
                    self.last_writer.insert(token, id);
                }
            }
        }

        self.tasks.push(TaskNode {
            name: name.into(),
            priority,
            body: Box::new(body),
            predecessors,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Predecessors of task `id`, for inspection.
    pub fn predecessors(&self, id: usize) -> Vec<usize> {
        self.tasks[id].predecessors.iter().copied().collect()
    }

    /// Run every task on `pool` and join.
    pub fn run(self, pool: &rayon::ThreadPool) -> Result<()> {
        let n = self.tasks.len();
        let mut successors = vec![Vec::new(); n];
        let mut pending = Vec::with_capacity(n);
        let mut names = Vec::with_capacity(n);
        let mut bodies = Vec::with_capacity(n);
        let mut ready = Vec::new();

        for (id, task) in self.tasks.into_iter().enumerate() {
            for &p in &task.predecessors {
                successors[p].push(id);
            }
            if task.predecessors.is_empty() {
                ready.push((task.priority, id));
            }
            pending.push(AtomicUsize::new(task.predecessors.len()));
            names.push(task.name);
            bodies.push(Mutex::new(Some(task.body)));
        }
        // higher priority first, then submission order
        ready.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let run = Run {
            names,
            bodies,
            successors,
            pending,
            failures: FailureCollector::new(),
        };

        pool.scope(|s| {
            for &(_, id) in &ready {
                launch(s, &run, id);
            }
        });

        run.failures.into_result()
    }
}

struct Run<'a> {
    names: Vec<String>,
    bodies: Vec<Mutex<Option<Body<'a>>>>,
    successors: Vec<Vec<usize>>,
    pending: Vec<AtomicUsize>,
    failures: FailureCollector,
}

impl Run<'_> {
    fn execute(&self, id: usize) {
        let body = self.bodies[id].lock().take();
        if let Some(body) = body {
            trace!(task = %self.names[id], "start");
            if let Err(err) = body() {
                self.failures.record(self.names[id].clone(), err);
            }
        }
    }
}

fn launch<'s, 'a: 's>(scope: &rayon::Scope<'s>, run: &'s Run<'a>, id: usize) {
    scope.spawn(move |scope| {
        run.execute(id);
        for &succ in &run.successors[id] {
            if run.pending[succ].fetch_sub(1, Ordering::AcqRel) == 1 {
                launch(scope, run, succ);
            }
        }
    });
}

/// Concurrency-safe first-error slot plus failure count.
///
/// Nested `ComputeFailure`s are flattened so one top-level failure reports
/// the innermost failing unit and the total count.
#[derive(Default)]
pub struct FailureCollector {
    first: Mutex<Option<(String, Error)>>,
    count: AtomicUsize,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure of `unit`.
    pub fn record(&self, unit: impl Into<String>, err: Error) {
        let (unit, err, n) = match err {
            Error::ComputeFailure {
                unit,
                failures,
                source,
            } => (unit, *source, failures),
            other => (unit.into(), other, 1),
        };
        warn!(unit = %unit, error = %err, "compute unit failed");
        let mut first = self.first.lock();
        self.count.fetch_add(n, Ordering::AcqRel);
        if first.is_none() {
            *first = Some((unit, err));
        }
    }

    /// Run `f` and record its error, if any, under `unit`.
    pub fn capture(&self, unit: impl FnOnce() -> String, f: impl FnOnce() -> Result<()>) {
        if let Err(err) = f() {
            self.record(unit(), err);
        }
    }

    pub fn failures(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Report everything recorded so far and start over.
    pub fn take(&self) -> Result<()> {
        let mut first = self.first.lock();
        let failures = self.count.swap(0, Ordering::AcqRel);
        match first.take() {
            None => Ok(()),
            Some((unit, source)) => Err(Error::ComputeFailure {
                unit,
                failures,
                source: Box::new(source),
            }),
        }
    }

    /// Drain into a single result.
    pub fn into_result(self) -> Result<()> {
        self.take()
    }
}

/// Build the bounded worker pool for one operation.
pub(crate) fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("tiled-blas-{}", i))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> rayon::ThreadPool {
        build_pool(n).unwrap()
    }

    #[test]
    fn test_edges_reader_writer() {
        let t = Token::new("x", 0);
        let mut g = TaskGraph::new();
        let w0 = g.add("w0", &[Dep::Out(t)], 0, || Ok(()));
        let r1 = g.add("r1", &[Dep::In(t)], 0, || Ok(()));
        let r2 = g.add("r2", &[Dep::In(t)], 0, || Ok(()));
        let w3 = g.add("w3", &[Dep::Out(t)], 0, || Ok(()));
        let r4 = g.add("r4", &[Dep::In(t)], 0, || Ok(()));

        assert!(g.predecessors(w0).is_empty());
        assert_eq!(g.predecessors(r1), vec![w0]);
        assert_eq!(g.predecessors(r2), vec![w0]);
        assert_eq!(g.predecessors(w3), vec![w0, r1, r2]);
        assert_eq!(g.predecessors(r4), vec![w3]);
    }

    #[test]
    fn test_in_and_out_same_token() {
        let t = Token::new("x", 0);
        let mut g = TaskGraph::new();
        let a = g.add("a", &[Dep::In(t), Dep::Out(t)], 0, || Ok(()));
        assert!(g.predecessors(a).is_empty());
        let b = g.add("b", &[Dep::In(t), Dep::Out(t)], 0, || Ok(()));
        assert_eq!(g.predecessors(b), vec![a]);
    }

    #[test]
    fn test_chain_runs_in_order() {
        let log = Mutex::new(Vec::new());
        let mut g = TaskGraph::new();
        for k in 0..20 {
            let log = &log;
            let mut deps = vec![Dep::Out(Token::new("step", k))];
            if k > 0 {
                deps.push(Dep::In(Token::new("step", k - 1)));
            }
            g.add(format!("step {}", k), &deps, 0, move || {
                log.lock().push(k);
                Ok(())
            });
        }
        g.run(&pool(4)).unwrap();
        assert_eq!(*log.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_independent_tasks_all_run() {
        let counter = AtomicUsize::new(0);
        let mut g = TaskGraph::new();
        for k in 0..64 {
            let counter = &counter;
            g.add(format!("t{}", k), &[Dep::Out(Token::new("t", k))], 0, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        g.run(&pool(3)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn test_failure_does_not_cancel_successors() {
        let ran = AtomicUsize::new(0);
        let t = Token::new("x", 0);
        let mut g = TaskGraph::new();
        g.add("bad", &[Dep::Out(t)], 0, || Err(Error::Comm("boom".into())));
        let ran_ref = &ran;
        g.add("after", &[Dep::In(t)], 0, move || {
            ran_ref.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let err = g.run(&pool(2)).unwrap_err();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        match err {
            Error::ComputeFailure { unit, failures, .. } => {
                assert_eq!(unit, "bad");
                assert_eq!(failures, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_thread_pool() {
        let sum = AtomicUsize::new(0);
        let mut g = TaskGraph::new();
        for k in 0..8 {
            let sum = &sum;
            g.add("t", &[Dep::In(Token::new("shared", 0))], 0, move || {
                sum.fetch_add(k, Ordering::SeqCst);
                Ok(())
            });
        }
        g.run(&pool(1)).unwrap();
        assert_eq!(sum.load(Ordering::SeqCst), 28);
    }

    #[test]
    fn test_collector_flattens_nested() {
        let c = FailureCollector::new();
        c.record(
            "panel 0",
            Error::ComputeFailure {
                unit: "gemm tile (1, 1)".into(),
                failures: 2,
                source: Box::new(Error::Comm("x".into())),
            },
        );
        c.record("panel 1", Error::Comm("y".into()));
        assert_eq!(c.failures(), 3);
        match c.into_result() {
            Err(Error::ComputeFailure { unit, failures, .. }) => {
                assert_eq!(unit, "gemm tile (1, 1)");
                assert_eq!(failures, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_collector_take_resets() {
        let c = FailureCollector::new();
        c.record("a", Error::Comm("x".into()));
        c.record("b", Error::Comm("y".into()));
        match c.take() {
            Err(Error::ComputeFailure { unit, failures, .. }) => {
                assert_eq!(unit, "a");
                assert_eq!(failures, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.failures(), 0);
        assert!(c.take().is_ok());
    }

    #[test]
    fn test_collector_empty_is_ok() {
        let c = FailureCollector::new();
        c.capture(|| "unit".to_string(), || Ok(()));
        assert!(c.into_result().is_ok());
    }
}
