//! Sharded dense/sparse linear-algebra kernels: `dot`, norms, weighted
//! norms, `Aᵀx`, and column-scaled matrix norms, plus `ShardedWeightedAverage`.
//!
//! Each kernel here is a thin `Sharder::parallel_sum`/`parallel_for` wrapper:
//! small composable numeric primitives, unit-tested in isolation, with the
//! sharding dimension grounded in `ortools/pdlp/sharder.h`'s kernel helpers.

use crate::sharder::{Scheduler, Sharder};
use crate::sparse::CscMatrix;

/// `Σ u_i v_i`, reduced across `sharder`'s shards of `u`/`v`.
pub fn dot(sharder: &Sharder, scheduler: &dyn Scheduler, u: &[f64], v: &[f64]) -> f64 {
    debug_assert_eq!(u.len(), v.len());
    sharder.parallel_sum(scheduler, |shard| {
        shard
            .slice(u)
            .iter()
            .zip(shard.slice(v).iter())
            .map(|(a, b)| a * b)
            .sum()
    })
}

/// `Σ w_i u_i v_i` — the weighted inner product used by the trust-region
/// norm `‖z‖_W = √Σ w_i z_i²`.
pub fn weighted_dot(sharder: &Sharder, scheduler: &dyn Scheduler, u: &[f64], v: &[f64], w: &[f64]) -> f64 {
    sharder.parallel_sum(scheduler, |shard| {
        let rng = shard.range();
        (rng.start..rng.end).map(|i| w[i] * u[i] * v[i]).sum()
    })
}

/// `Σ |v_i|`.
pub fn l1_norm(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64]) -> f64 {
    sharder.parallel_sum(scheduler, |shard| shard.slice(v).iter().map(|x| x.abs()).sum())
}

/// `Σ v_i²` (the squared L2 norm, used where callers want to avoid an
/// extra `sqrt`).
pub fn l2_norm_squared(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64]) -> f64 {
    sharder.parallel_sum(scheduler, |shard| shard.slice(v).iter().map(|x| x * x).sum())
}

/// `√Σ v_i²`.
pub fn l2_norm(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64]) -> f64 {
    l2_norm_squared(sharder, scheduler, v).sqrt()
}

/// `max_i |v_i|`, reduced via per-shard maxima folded sequentially
/// (`Sharder` has no `parallel_max`, only `parallel_sum`/`parallel_all`
///.1, so this folds shard-local maxima through
/// `for_each_shard` into a `Mutex`-free sequential combine).
pub fn linf_norm(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64]) -> f64 {
    shard_reduce_max(sharder, scheduler, |shard| {
        shard.slice(v).iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
    })
}

/// `Σ (w_i v_i)²`.
pub fn weighted_l2_norm_squared(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64], w: &[f64]) -> f64 {
    sharder.parallel_sum(scheduler, |shard| {
        let rng = shard.range();
        (rng.start..rng.end).map(|i| (w[i] * v[i]) * (w[i] * v[i])).sum()
    })
}

/// `√Σ (w_i v_i)²`.
pub fn weighted_l2_norm(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64], w: &[f64]) -> f64 {
    weighted_l2_norm_squared(sharder, scheduler, v, w).sqrt()
}

/// `max_i |w_i v_i|`.
pub fn weighted_linf_norm(sharder: &Sharder, scheduler: &dyn Scheduler, v: &[f64], w: &[f64]) -> f64 {
    shard_reduce_max(sharder, scheduler, |shard| {
        let rng = shard.range();
        (rng.start..rng.end).fold(0.0_f64, |acc, i| acc.max((w[i] * v[i]).abs()))
    })
}

/// Shared helper: runs `per_shard` on every shard and folds the results
/// with `max`, sequentially, so the result never depends on scheduling
/// order.
fn shard_reduce_max(sharder: &Sharder, scheduler: &dyn Scheduler, per_shard: impl Fn(&crate::sharder::Shard) -> f64 + Sync) -> f64 {
    let n = sharder.num_shards();
    if n == 0 {
        return 0.0;
    }
    let partials: Vec<std::sync::Mutex<f64>> = (0..n).map(|_| std::sync::Mutex::new(0.0)).collect();
    scheduler.parallel_for(0, n, &|i| {
        let v = per_shard(&sharder.shard(i));
        *partials[i].lock().unwrap() = v;
    });
    partials.iter().fold(0.0_f64, |acc, m| acc.max(*m.lock().unwrap()))
}

/// `A x`, sharded over `A`'s columns: each shard accumulates its columns'
/// contribution into a private length-`m` buffer, then buffers are summed
/// sequentially (fixed order, so the result is reproducible regardless of
/// thread count).
pub fn matvec(sharder: &Sharder, scheduler: &dyn Scheduler, a: &CscMatrix, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(x.len(), a.ncols());
    let m = a.nrows();
    let n = sharder.num_shards();
    let partials: Vec<std::sync::Mutex<Vec<f64>>> = (0..n).map(|_| std::sync::Mutex::new(vec![0.0; m])).collect();
    scheduler.parallel_for(0, n, &|i| {
        let shard = sharder.shard(i);
        let mut buf = partials[i].lock().unwrap();
        for j in shard.range() {
            let xj = x[j];
            if xj == 0.0 {
                continue;
            }
            for (row, val) in a.col(j) {
                buf[row as usize] += val * xj;
            }
        }
    });
    let mut out = vec![0.0; m];
    for p in &partials {
        let buf = p.lock().unwrap();
        for (o, b) in out.iter_mut().zip(buf.iter()) {
            *o += b;
        }
    }
    out
}

/// `Aᵀ x` against a matrix already stored in transposed CSC form (so this
/// is literally `matvec` over `at`); kept as a distinct name because
/// callers reach for it via the cached `ShardedQuadraticProgram::at`
/// rather than transposing on the fly.
pub fn transpose_matvec(sharder: &Sharder, scheduler: &dyn Scheduler, at: &CscMatrix, x: &[f64]) -> Vec<f64> {
    matvec(sharder, scheduler, at, x)
}

/// The Linf norm of column `j` of `a`, under row scaling `d_row` and column
/// scaling `d_col[j]`.
pub fn scaled_col_linf_norm(a: &CscMatrix, j: usize, d_row: &[f64], d_col_j: f64) -> f64 {
    a.col(j)
        .fold(0.0_f64, |acc, (row, val)| acc.max((val * d_row[row as usize] * d_col_j).abs()))
}

/// The L2 norm of column `j` of `a`, under row scaling `d_row` and column
/// scaling `d_col[j]`.
pub fn scaled_col_l2_norm(a: &CscMatrix, j: usize, d_row: &[f64], d_col_j: f64) -> f64 {
    a.col(j)
        .map(|(row, val)| {
            let s = val * d_row[row as usize] * d_col_j;
            s * s
        })
        .sum::<f64>()
        .sqrt()
}

/// Columnwise scaled Linf norms of every column of `a`, sharded over
/// `a`'s columns.
pub fn scaled_col_linf_norms(sharder: &Sharder, scheduler: &dyn Scheduler, a: &CscMatrix, d_row: &[f64], d_col: &[f64]) -> Vec<f64> {
    shard_map_cols(sharder, scheduler, a.ncols(), |j| scaled_col_linf_norm(a, j, d_row, d_col[j]))
}

/// Columnwise scaled L2 norms of every column of `a`.
pub fn scaled_col_l2_norms(sharder: &Sharder, scheduler: &dyn Scheduler, a: &CscMatrix, d_row: &[f64], d_col: &[f64]) -> Vec<f64> {
    shard_map_cols(sharder, scheduler, a.ncols(), |j| scaled_col_l2_norm(a, j, d_row, d_col[j]))
}

fn shard_map_cols(sharder: &Sharder, scheduler: &dyn Scheduler, ncols: usize, f: impl Fn(usize) -> f64 + Sync) -> Vec<f64> {
    let mut out = vec![0.0; ncols];
    let n = sharder.num_shards();
    let mut rest = out.as_mut_slice();
    let mut slices = Vec::with_capacity(n);
    for shard in sharder.shards() {
        let (head, tail) = rest.split_at_mut(shard.size());
        slices.push(std::sync::Mutex::new((shard, head)));
        rest = tail;
    }
    scheduler.parallel_for(0, n, &|i| {
        let mut guard = slices[i].lock().unwrap();
        let (shard, buf) = &mut *guard;
        for (local, j) in shard.range().enumerate() {
            buf[local] = f(j);
        }
    });
    out
}

/// An online weighted running average that never drifts when every
/// contribution at an index is identical.
#[derive(Debug, Clone)]
pub struct ShardedWeightedAverage {
    avg: Vec<f64>,
    sum_weights: f64,
    num_terms: u64,
}

impl ShardedWeightedAverage {
    pub fn new(n: usize) -> Self {
        Self { avg: vec![0.0; n], sum_weights: 0.0, num_terms: 0 }
    }

    pub fn avg(&self) -> &[f64] {
        &self.avg
    }

    pub fn sum_weights(&self) -> f64 {
        self.sum_weights
    }

    pub fn num_terms(&self) -> u64 {
        self.num_terms
    }

    /// Folds in `x` with weight `w`: `avg += (w / (W + w)) * (x - avg)`.
    /// `w == 0.0` only advances `num_terms`.
    pub fn add(&mut self, sharder: &Sharder, scheduler: &dyn Scheduler, x: &[f64], w: f64) {
        debug_assert_eq!(x.len(), self.avg.len());
        self.num_terms += 1;
        if w == 0.0 {
            return;
        }
        let new_total = self.sum_weights + w;
        let alpha = w / new_total;

        let n = sharder.num_shards();
        let mut rest = self.avg.as_mut_slice();
        let mut slices = Vec::with_capacity(n);
        for shard in sharder.shards() {
            let (head, tail) = rest.split_at_mut(shard.size());
            slices.push(std::sync::Mutex::new((shard, head)));
            rest = tail;
        }
        scheduler.parallel_for(0, n, &|i| {
            let mut guard = slices[i].lock().unwrap();
            let (shard, buf) = &mut *guard;
            for (local, j) in shard.range().enumerate() {
                buf[local] += alpha * (x[j] - buf[local]);
            }
        });
        self.sum_weights = new_total;
    }

    pub fn clear(&mut self) {
        self.avg.iter_mut().for_each(|v| *v = 0.0);
        self.sum_weights = 0.0;
        self.num_terms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharder::SingleThreadScheduler;
    use crate::sparse::Triplet;

    fn sched() -> SingleThreadScheduler {
        SingleThreadScheduler
    }

    #[test]
    fn dot_matches_naive() {
        let u = vec![1.0, 2.0, 3.0, 4.0];
        let v = vec![4.0, 3.0, 2.0, 1.0];
        let sharder = Sharder::new(u.len(), 2);
        let got = dot(&sharder, &sched(), &u, &v);
        assert!((got - 20.0).abs() < 1e-12);
    }

    #[test]
    fn norms_match_naive() {
        let v = vec![-3.0, 4.0, -1.0, 0.0];
        let sharder = Sharder::new(v.len(), 3);
        assert!((l1_norm(&sharder, &sched(), &v) - 8.0).abs() < 1e-12);
        assert!((l2_norm(&sharder, &sched(), &v) - 5.0990195135927845).abs() < 1e-9);
        assert!((linf_norm(&sharder, &sched(), &v) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn matvec_matches_dense() {
        let a = CscMatrix::from_triplets(
            2,
            3,
            &[
                Triplet::new(0, 0, 1.0),
                Triplet::new(1, 0, 2.0),
                Triplet::new(0, 1, 3.0),
                Triplet::new(1, 2, 4.0),
            ],
        );
        let x = vec![1.0, 2.0, 3.0];
        let sharder = Sharder::for_matrix_columns(&a, 2);
        let y = matvec(&sharder, &sched(), &a, &x);
        assert_eq!(y, vec![1.0 * 1.0 + 3.0 * 2.0, 2.0 * 1.0 + 4.0 * 3.0]);
    }

    #[test]
    fn weighted_average_is_exact_for_constant_input() {
        let sharder = Sharder::new(5, 2);
        let mut avg = ShardedWeightedAverage::new(5);
        let x = vec![3.25; 5];
        for _ in 0..10 {
            avg.add(&sharder, &sched(), &x, 1.0);
        }
        for v in avg.avg() {
            assert_eq!(*v, 3.25);
        }
        assert_eq!(avg.num_terms(), 10);
    }

    #[test]
    fn weighted_average_zero_weight_only_bumps_count() {
        let sharder = Sharder::new(3, 1);
        let mut avg = ShardedWeightedAverage::new(3);
        avg.add(&sharder, &sched(), &[1.0, 2.0, 3.0], 1.0);
        let before = avg.avg().to_vec();
        avg.add(&sharder, &sched(), &[9.0, 9.0, 9.0], 0.0);
        assert_eq!(avg.avg(), before.as_slice());
        assert_eq!(avg.num_terms(), 2);
    }

    #[test]
    fn scaled_col_norms_match_naive() {
        let a = CscMatrix::from_triplets(2, 2, &[Triplet::new(0, 0, 2.0), Triplet::new(1, 0, -3.0)]);
        let d_row = vec![1.0, 2.0];
        let d_col = vec![1.0, 1.0];
        assert!((scaled_col_linf_norm(&a, 0, &d_row, d_col[0]) - 6.0).abs() < 1e-12);
        assert!((scaled_col_l2_norm(&a, 0, &d_row, d_col[0]) - (4.0f64 + 36.0).sqrt()).abs() < 1e-9);
    }
}
