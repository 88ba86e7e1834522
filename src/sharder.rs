//! Partitions `[0, N)` into mass-balanced shards and dispatches work over
//! them. Grounded directly in `ortools/pdlp/sharder.h`/`sharder.cc`:
//! `Sharder`, `Shard`, and the `Scheduler`/`ParallelFor` split of
//! `ortools/pdlp/scheduler.h`.
//!
//! `faer`/BLAS own sharding internally for factorization; the scheduler
//! split below follows a general preference for a plain trait with a
//! small, boxable set of implementations (see `terminators::Terminator`).

use crate::params::SchedulerType;
use crate::sparse::CscMatrix;

/// Builds the scheduler named by `scheduler_type`, used wherever a fresh
/// `ShardedQuadraticProgram` needs its own scheduler (e.g. the
/// feasibility-polishing subsolves).
pub fn build_scheduler(scheduler_type: SchedulerType, num_threads: usize) -> Box<dyn Scheduler> {
    match scheduler_type {
        SchedulerType::SingleThread => Box::new(SingleThreadScheduler),
        SchedulerType::ThreadPool => Box::new(ThreadPoolScheduler::new(num_threads)),
    }
}

/// Runs `do_func(i)` for `i` in `[start, end)`, optionally in parallel.
/// Grounded in `ortools/pdlp/scheduler.h`.
pub trait Scheduler: Send + Sync {
    fn num_threads(&self) -> usize;

    /// Calls `do_func(i)` for every `i` in `[start, end)` and blocks until
    /// all calls have returned (barrier join).
    fn parallel_for(&self, start: usize, end: usize, do_func: &(dyn Fn(usize) + Sync));
}

/// Runs everything inline on the calling thread. The "cooperative"
/// scheduler; equivalent to passing a null `ThreadPool*` in
/// `ortools/pdlp/sharder.h`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleThreadScheduler;

impl Scheduler for SingleThreadScheduler {
    fn num_threads(&self) -> usize {
        1
    }

    fn parallel_for(&self, start: usize, end: usize, do_func: &(dyn Fn(usize) + Sync)) {
        for i in start..end {
            do_func(i);
        }
    }
}

/// An OS-thread-pool scheduler built on `std::thread::scope`, playing the
/// role of `ortools/pdlp/scheduler.h`'s `GoogleThreadPoolScheduler`/
/// `EigenThreadPoolScheduler`: worker threads process disjoint slices of
/// `[start, end)` and the scope exit is the barrier join.
pub struct ThreadPoolScheduler {
    num_threads: usize,
}

impl ThreadPoolScheduler {
    pub fn new(num_threads: usize) -> Self {
        Self { num_threads: num_threads.max(1) }
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn parallel_for(&self, start: usize, end: usize, do_func: &(dyn Fn(usize) + Sync)) {
        let total = end.saturating_sub(start);
        if total == 0 {
            return;
        }
        let workers = self.num_threads.min(total);
        if workers <= 1 {
            for i in start..end {
                do_func(i);
            }
            return;
        }
        std::thread::scope(|scope| {
            let chunk = total.div_ceil(workers);
            for w in 0..workers {
                let lo = start + w * chunk;
                let hi = (lo + chunk).min(end);
                if lo >= hi {
                    continue;
                }
                scope.spawn(move || {
                    for i in lo..hi {
                        do_func(i);
                    }
                });
            }
        });
    }
}

/// A single shard: the half-open range `[start, start + size)` of `[0, N)`
/// that this shard owns, plus its index among `NumShards()` siblings.
#[derive(Debug, Clone, Copy)]
pub struct Shard {
    index: usize,
    start: usize,
    size: usize,
}

impl Shard {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.size
    }

    /// This shard's contiguous slice of a dense vector of length `N`.
    pub fn slice<'a>(&self, v: &'a [f64]) -> &'a [f64] {
        &v[self.range()]
    }

    pub fn slice_mut<'a>(&self, v: &'a mut [f64]) -> &'a mut [f64] {
        &mut v[self.range()]
    }

    /// This shard's contiguous block of columns of a column-major sparse
    /// matrix whose column count equals `N`.
    pub fn cols(&self, _m: &CscMatrix) -> std::ops::Range<usize> {
        self.range()
    }
}

/// Partitions `[0, num_elements)` into mass-balanced shards. Construction follows `ortools/pdlp/sharder.cc`:
/// elements are grouped greedily so each shard's mass is within half an
/// element's mass of `total_mass / num_shards`.
#[derive(Debug, Clone)]
pub struct Sharder {
    /// Length `num_shards + 1`; shard `s` owns `[starts[s], starts[s+1])`.
    starts: Vec<usize>,
    masses: Vec<i64>,
}

impl Sharder {
    /// Unit-mass construction: `N` elements, roughly `num_shards` shards,
    /// each of mass 1. Boundaries are `floor(N * s / num_shards)`; empty
    /// shards are dropped.
    pub fn new(num_elements: usize, num_shards: usize) -> Self {
        let num_shards = num_shards.max(1).min(num_elements.max(1));
        let mut starts = Vec::with_capacity(num_shards + 1);
        for s in 0..=num_shards {
            starts.push((num_elements * s) / num_shards);
        }
        starts.dedup();
        let masses = starts.windows(2).map(|w| (w[1] - w[0]) as i64).collect();
        Self { starts, masses }
    }

    /// Mass-weighted construction: places
    /// elements into the current shard until `current_mass + mass(i)/2 >=
    /// total/num_shards`, then flushes.
    pub fn with_mass(num_elements: usize, num_shards: usize, mass: impl Fn(usize) -> i64) -> Self {
        if num_elements == 0 {
            return Self { starts: vec![0], masses: vec![] };
        }
        let num_shards = num_shards.max(1);
        let total: i64 = (0..num_elements).map(&mass).sum();
        let target = (total as f64 / num_shards as f64).max(1.0);

        let mut starts = vec![0usize];
        let mut masses = Vec::new();
        let mut current_mass: i64 = 0;
        let mut shard_start = 0usize;

        for i in 0..num_elements {
            let m = mass(i);
            if i > shard_start && (current_mass as f64 + m as f64 / 2.0) >= target {
                starts.push(i);
                masses.push(current_mass);
                shard_start = i;
                current_mass = 0;
            }
            current_mass += m;
        }
        starts.push(num_elements);
        masses.push(current_mass);

        Self { starts, masses }
    }

    /// A sharder over the columns of `matrix`, with `mass(col) = 1 +
    /// nnz(matrix[:, col])`.
    pub fn for_matrix_columns(matrix: &CscMatrix, num_shards: usize) -> Self {
        Self::with_mass(matrix.ncols(), num_shards, |j| 1 + matrix.col_nnz(j) as i64)
    }

    pub fn num_shards(&self) -> usize {
        self.starts.len().saturating_sub(1)
    }

    pub fn num_elements(&self) -> usize {
        *self.starts.last().unwrap_or(&0)
    }

    pub fn shard_start(&self, i: usize) -> usize {
        self.starts[i]
    }

    pub fn shard_size(&self, i: usize) -> usize {
        self.starts[i + 1] - self.starts[i]
    }

    pub fn shard_mass(&self, i: usize) -> i64 {
        self.masses[i]
    }

    pub fn shard(&self, i: usize) -> Shard {
        Shard { index: i, start: self.shard_start(i), size: self.shard_size(i) }
    }

    pub fn shards(&self) -> impl Iterator<Item = Shard> + '_ {
        (0..self.num_shards()).map(move |i| self.shard(i))
    }

    /// Runs `f` on each shard, in parallel if `scheduler` has more than one
    /// thread.
    pub fn for_each_shard(&self, scheduler: &dyn Scheduler, f: impl Fn(&Shard) + Sync) {
        let n = self.num_shards();
        scheduler.parallel_for(0, n, &|i| f(&self.shard(i)));
    }

    /// Sums `f(shard)` across shards.
    pub fn parallel_sum(&self, scheduler: &dyn Scheduler, f: impl Fn(&Shard) -> f64 + Sync) -> f64 {
        let n = self.num_shards();
        if n == 0 {
            return 0.0;
        }
        let partials: Vec<std::sync::Mutex<f64>> = (0..n).map(|_| std::sync::Mutex::new(0.0)).collect();
        scheduler.parallel_for(0, n, &|i| {
            let v = f(&self.shard(i));
            *partials[i].lock().unwrap() = v;
        });
        // Sequential final reduction: fixed order given a fixed `Sharder`
        // shape, so floating-point sums are reproducible.
        partials.iter().map(|m| *m.lock().unwrap()).sum()
    }

    /// Logical AND of `f(shard)` across shards.
    pub fn parallel_all(&self, scheduler: &dyn Scheduler, f: impl Fn(&Shard) -> bool + Sync) -> bool {
        let n = self.num_shards();
        if n == 0 {
            return true;
        }
        let partials: Vec<std::sync::atomic::AtomicBool> =
            (0..n).map(|_| std::sync::atomic::AtomicBool::new(true)).collect();
        scheduler.parallel_for(0, n, &|i| {
            let v = f(&self.shard(i));
            partials[i].store(v, std::sync::atomic::Ordering::Relaxed);
        });
        partials.iter().all(|b| b.load(std::sync::atomic::Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sharder_covers_range_exactly() {
        for n in [0usize, 1, 7, 100, 257] {
            for k in [1usize, 2, 3, 16, 1000] {
                let s = Sharder::new(n, k);
                let mut covered = 0usize;
                for shard in s.shards() {
                    assert_eq!(shard.start(), covered);
                    covered += shard.size();
                }
                assert_eq!(covered, n);
            }
        }
    }

    #[test]
    fn uniform_sharder_one_shard_per_element_when_k_ge_n() {
        let s = Sharder::new(5, 100);
        assert_eq!(s.num_shards(), 5);
        for shard in s.shards() {
            assert_eq!(shard.size(), 1);
        }
    }

    #[test]
    fn mass_weighted_sharder_balances_mass() {
        let n = 1000;
        let k = 8;
        let s = Sharder::with_mass(n, k, |_| 1);
        let total: i64 = (0..s.num_shards()).map(|i| s.shard_mass(i)).sum();
        assert_eq!(total, n as i64);
        let max_element_mass = 1i64;
        let target = total as f64 / s.num_shards() as f64;
        for i in 0..s.num_shards() {
            assert!((s.shard_mass(i) as f64 - target).abs() <= max_element_mass as f64 + target);
        }
    }

    #[test]
    fn parallel_sum_matches_sequential_sum_on_both_schedulers() {
        let n = 4321;
        let s = Sharder::new(n, 13);
        let data: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
        let expected: f64 = data.iter().sum();

        for sched in [Box::new(SingleThreadScheduler) as Box<dyn Scheduler>, Box::new(ThreadPoolScheduler::new(4))] {
            let got = s.parallel_sum(sched.as_ref(), |shard| shard.slice(&data).iter().sum());
            assert!((got - expected).abs() < 1e-9);
        }
    }
}
