//! `ShardedQuadraticProgram`: a `QuadraticProgram` plus the cached
//! transpose, scheduler, and four sharders the rest of the engine reads
//! from; `ScalingVectors` and the Ruiz/L2 rescaling passes
//! and large-bound clamp.

use crate::linalg;
use crate::qp::QuadraticProgram;
use crate::sharder::{Scheduler, Sharder};
use crate::sparse::CscMatrix;

/// A column of `A` or `Aᵀ` whose nonzero count exceeds this fraction of
/// its dimension is "dense" for sharding-density warning purposes.
pub const DENSE_COLUMN_THRESHOLD: f64 = 0.1;

/// `(D_col, D_row)`, both strictly positive. Relate the original and
/// working (scaled) problems: `A_work = diag(D_row)·A·diag(D_col)`,
/// `c_work = diag(D_col)·c`, `x_work = x / D_col`, `y_work = y·D_row`.
#[derive(Debug, Clone)]
pub struct ScalingVectors {
    pub d_col: Vec<f64>,
    pub d_row: Vec<f64>,
}

impl ScalingVectors {
    pub fn identity(n: usize, m: usize) -> Self {
        Self { d_col: vec![1.0; n], d_row: vec![1.0; m] }
    }
}

/// Owns a `QuadraticProgram` exclusively, plus its transpose, a
/// `Scheduler`, and sharders over `A`'s columns, `Aᵀ`'s columns, primal
/// indices, and dual indices.
pub struct ShardedQuadraticProgram {
    qp: QuadraticProgram,
    at: CscMatrix,
    scheduler: Box<dyn Scheduler>,
    col_sharder: Sharder,
    row_sharder: Sharder,
    primal_sharder: Sharder,
    dual_sharder: Sharder,
}

impl ShardedQuadraticProgram {
    pub fn new(qp: QuadraticProgram, scheduler: Box<dyn Scheduler>, num_shards: usize) -> Self {
        let at = qp.constraint_matrix.transpose();
        let col_sharder = Sharder::for_matrix_columns(&qp.constraint_matrix, num_shards);
        let row_sharder = Sharder::for_matrix_columns(&at, num_shards);
        let primal_sharder = Sharder::new(qp.num_variables(), num_shards);
        let dual_sharder = Sharder::new(qp.num_constraints(), num_shards);
        Self { qp, at, scheduler, col_sharder, row_sharder, primal_sharder, dual_sharder }
    }

    pub fn qp(&self) -> &QuadraticProgram {
        &self.qp
    }

    pub fn qp_mut(&mut self) -> &mut QuadraticProgram {
        &mut self.qp
    }

    pub fn at(&self) -> &CscMatrix {
        &self.at
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn col_sharder(&self) -> &Sharder {
        &self.col_sharder
    }

    pub fn row_sharder(&self) -> &Sharder {
        &self.row_sharder
    }

    pub fn primal_sharder(&self) -> &Sharder {
        &self.primal_sharder
    }

    pub fn dual_sharder(&self) -> &Sharder {
        &self.dual_sharder
    }

    /// `true` if any column of `A` or `Aᵀ` exceeds [`DENSE_COLUMN_THRESHOLD`]
    /// of its dimension's worth of nonzeros.
    pub fn has_dense_columns(&self) -> bool {
        let a = &self.qp.constraint_matrix;
        let dense_in = |m: &CscMatrix, limit: usize| (0..m.ncols()).any(|j| m.col_nnz(j) > limit);
        dense_in(a, (a.nrows() as f64 * DENSE_COLUMN_THRESHOLD).ceil() as usize)
            || dense_in(&self.at, (self.at.nrows() as f64 * DENSE_COLUMN_THRESHOLD).ceil() as usize)
    }

    /// Rebuilds `at` after `qp.constraint_matrix` has been mutated in
    /// place (used after rescaling).
    fn resync_transpose(&mut self) {
        self.at = self.qp.constraint_matrix.transpose();
    }

    /// `A x`.
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        linalg::matvec(&self.col_sharder, self.scheduler.as_ref(), &self.qp.constraint_matrix, x)
    }

    /// `Aᵀ y`.
    pub fn transpose_matvec(&self, y: &[f64]) -> Vec<f64> {
        linalg::transpose_matvec(&self.row_sharder, self.scheduler.as_ref(), &self.at, y)
    }

    /// Constraint bounds with absolute value `>= threshold` replaced by
    /// `±∞`.
    pub fn clamp_large_bounds(&mut self, threshold: f64) {
        for l in self.qp.constraint_lower_bounds.iter_mut() {
            if l.is_finite() && l.abs() >= threshold {
                *l = f64::NEG_INFINITY;
            }
        }
        for u in self.qp.constraint_upper_bounds.iter_mut() {
            if u.is_finite() && u.abs() >= threshold {
                *u = f64::INFINITY;
            }
        }
    }

    /// Applies `r` rounds of L∞ Ruiz rescaling followed by one L2
    /// rescaling pass, in place, returning the accumulated
    /// `ScalingVectors`.
    pub fn rescale(&mut self, ruiz_iterations: usize) -> ScalingVectors {
        let n = self.qp.num_variables();
        let m = self.qp.num_constraints();
        let mut scaling = ScalingVectors::identity(n, m);

        for _ in 0..ruiz_iterations {
            self.ruiz_round(&mut scaling);
        }
        self.l2_round(&mut scaling);
        scaling
    }

    /// One L∞ Ruiz round: compute row/col Linf norms of the *current*
    /// working matrix (unit row/col scale, since the matrix already
    /// embodies every prior round's scaling), derive this round's
    /// `1/√norm` increment, fold it into both the cumulative `scaling`
    /// and the stored working matrix.
    fn ruiz_round(&mut self, scaling: &mut ScalingVectors) {
        let ones_row = vec![1.0; self.qp.num_constraints()];
        let ones_col = vec![1.0; self.qp.num_variables()];
        let row_norms = row_linf_norms(&self.qp.constraint_matrix, &ones_row, &ones_col);
        let col_norms =
            linalg::scaled_col_linf_norms(&self.col_sharder, self.scheduler.as_ref(), &self.qp.constraint_matrix, &ones_row, &ones_col);
        self.apply_round(scaling, &row_norms, &col_norms);
    }

    /// One L2 rescaling round, same increment structure as
    /// [`Self::ruiz_round`] but over L2 norms (not iterated).
    fn l2_round(&mut self, scaling: &mut ScalingVectors) {
        let ones_row = vec![1.0; self.qp.num_constraints()];
        let ones_col = vec![1.0; self.qp.num_variables()];
        let row_norms = row_l2_norms(&self.qp.constraint_matrix, &ones_row, &ones_col);
        let col_norms =
            linalg::scaled_col_l2_norms(&self.col_sharder, self.scheduler.as_ref(), &self.qp.constraint_matrix, &ones_row, &ones_col);
        self.apply_round(scaling, &row_norms, &col_norms);
    }

    /// Derives `row_scale = 1/√row_norm`, `col_scale = 1/√col_norm`
    /// (components with zero norm left at 1), folds them into `scaling`
    /// multiplicatively and rescales `qp.constraint_matrix` in place by
    /// the same increment.
    fn apply_round(&mut self, scaling: &mut ScalingVectors, row_norms: &[f64], col_norms: &[f64]) {
        let row_scale: Vec<f64> = row_norms.iter().map(|n| if *n > 0.0 { 1.0 / n.sqrt() } else { 1.0 }).collect();
        let col_scale: Vec<f64> = col_norms.iter().map(|n| if *n > 0.0 { 1.0 / n.sqrt() } else { 1.0 }).collect();

        for (d, s) in scaling.d_row.iter_mut().zip(row_scale.iter()) {
            *d *= s;
        }
        for (d, s) in scaling.d_col.iter_mut().zip(col_scale.iter()) {
            *d *= s;
        }

        let a = &mut self.qp.constraint_matrix;
        for j in 0..a.ncols() {
            let cs = col_scale[j];
            for idx in a.col_range(j) {
                let row = a.row_idx()[idx] as usize;
                a.values_mut()[idx] *= row_scale[row] * cs;
            }
        }
        for (c, s) in self.qp.objective.iter_mut().zip(col_scale.iter()) {
            *c *= s;
        }
        self.resync_transpose();
    }
}

fn row_linf_norms(a: &CscMatrix, d_row: &[f64], d_col: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0_f64; a.nrows()];
    for j in 0..a.ncols() {
        for (row, val) in a.col(j) {
            let scaled = (val * d_row[row as usize] * d_col[j]).abs();
            let slot = &mut out[row as usize];
            if scaled > *slot {
                *slot = scaled;
            }
        }
    }
    out
}

fn row_l2_norms(a: &CscMatrix, d_row: &[f64], d_col: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0_f64; a.nrows()];
    for j in 0..a.ncols() {
        for (row, val) in a.col(j) {
            let scaled = val * d_row[row as usize] * d_col[j];
            out[row as usize] += scaled * scaled;
        }
    }
    out.iter_mut().for_each(|v| *v = v.sqrt());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qp::QuadraticProgram;
    use crate::sharder::SingleThreadScheduler;
    use crate::sparse::Triplet;

    fn toy() -> ShardedQuadraticProgram {
        let qp = QuadraticProgram {
            objective: vec![1.0, 2.0],
            quadratic_diag: None,
            constraint_matrix: CscMatrix::from_triplets(
                2,
                2,
                &[
                    Triplet::new(0, 0, 4.0),
                    Triplet::new(1, 0, 1.0),
                    Triplet::new(0, 1, 1.0),
                    Triplet::new(1, 1, 8.0),
                ],
            ),
            constraint_lower_bounds: vec![0.0, 0.0],
            constraint_upper_bounds: vec![10.0, 10.0],
            variable_lower_bounds: vec![0.0, 0.0],
            variable_upper_bounds: vec![5.0, 5.0],
            objective_offset: 0.0,
            objective_scale: 1.0,
            problem_name: None,
            variable_names: None,
            constraint_names: None,
        };
        ShardedQuadraticProgram::new(qp, Box::new(SingleThreadScheduler), 2)
    }

    #[test]
    fn matvec_and_transpose_matvec_agree_with_dense() {
        let s = toy();
        let x = vec![1.0, 1.0];
        assert_eq!(s.matvec(&x), vec![5.0, 9.0]);
        let y = vec![1.0, 0.0];
        assert_eq!(s.transpose_matvec(&y), vec![4.0, 1.0]);
    }

    #[test]
    fn clamp_large_bounds_makes_bound_infinite() {
        let mut s = toy();
        s.qp_mut().constraint_upper_bounds[0] = 1e9;
        s.clamp_large_bounds(1e8);
        assert_eq!(s.qp().constraint_upper_bounds[0], f64::INFINITY);
        assert_eq!(s.qp().constraint_upper_bounds[1], 10.0);
    }

    #[test]
    fn ruiz_rescaling_reduces_dynamic_range() {
        let mut s = toy();
        let before = s.qp().constraint_matrix.abs_max() / s.qp().constraint_matrix.abs_min_nonzero();
        let _scaling = s.rescale(10);
        let after = s.qp().constraint_matrix.abs_max() / s.qp().constraint_matrix.abs_min_nonzero();
        assert!(after <= before + 1e-9);
    }
}
