//! A compressed, column-major sparse matrix with 64-bit row indices: a
//! sparse m×n matrix, column-major, compressed, nonzeros stored with
//! 64-bit row indices.
//!
//! The teacher crate reaches for `faer::sparse::SparseColMat` for matrices it
//! later factorizes (Cholesky/LU). This core never factorizes `A` — only
//! matvecs with `A` and `Aᵀ` — so a small self-contained type keeps the
//! sharded substrate (`sharder.rs`, `linalg.rs`) in full control of its own
//! memory layout, which the sharding scheme depends on.

use crate::I;

/// A triplet `(row, col, value)` used to build a [`CscMatrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub row: I,
    pub col: I,
    pub value: f64,
}

impl Triplet {
    pub fn new(row: I, col: I, value: f64) -> Self {
        Self { row, col, value }
    }
}

/// A column-major compressed-sparse matrix. Duplicate `(row, col)` triplets
/// are summed at construction time, matching the usual CSC-from-COO
/// convention.
#[derive(Debug, Clone)]
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    /// Length `ncols + 1`. Column `j`'s nonzeros live in `row_idx`/`values`
    /// at indices `[col_ptr[j], col_ptr[j+1])`.
    col_ptr: Vec<usize>,
    row_idx: Vec<I>,
    values: Vec<f64>,
}

impl CscMatrix {
    /// An `nrows x ncols` matrix with no nonzeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            col_ptr: vec![0; ncols + 1],
            row_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a matrix from triplets, summing duplicates and dropping
    /// explicit zeros produced by cancellation.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[Triplet]) -> Self {
        let mut by_col: Vec<Vec<(I, f64)>> = vec![Vec::new(); ncols];
        for t in triplets {
            assert!((t.row as usize) < nrows, "row index out of bounds");
            assert!((t.col as usize) < ncols, "col index out of bounds");
            by_col[t.col as usize].push((t.row, t.value));
        }

        let mut col_ptr = Vec::with_capacity(ncols + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        col_ptr.push(0);

        for col in by_col.iter_mut() {
            col.sort_by_key(|(r, _)| *r);
            let mut i = 0;
            while i < col.len() {
                let row = col[i].0;
                let mut sum = 0.0;
                while i < col.len() && col[i].0 == row {
                    sum += col[i].1;
                    i += 1;
                }
                row_idx.push(row);
                values.push(sum);
            }
            col_ptr.push(row_idx.len());
        }

        Self { nrows, ncols, col_ptr, row_idx, values }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Nonzeros of column `j` as `(row, value)` pairs.
    pub fn col(&self, j: usize) -> impl Iterator<Item = (I, f64)> + '_ {
        let start = self.col_ptr[j];
        let end = self.col_ptr[j + 1];
        self.row_idx[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    pub fn col_nnz(&self, j: usize) -> usize {
        self.col_ptr[j + 1] - self.col_ptr[j]
    }

    pub fn col_range(&self, j: usize) -> std::ops::Range<usize> {
        self.col_ptr[j]..self.col_ptr[j + 1]
    }

    pub fn row_idx(&self) -> &[I] {
        &self.row_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    /// The transpose, materialized as its own `CscMatrix` (i.e. the original
    /// matrix in row-major / CSR form, relabeled column-major over rows).
    /// `ShardedQuadraticProgram` caches this once at construction time.
    pub fn transpose(&self) -> CscMatrix {
        let mut triplets = Vec::with_capacity(self.nnz());
        for j in 0..self.ncols {
            for (row, value) in self.col(j) {
                triplets.push(Triplet::new(row, j as I, value));
            }
        }
        CscMatrix::from_triplets(self.ncols, self.nrows, &triplets)
    }

    /// The max absolute value over the whole matrix (0.0 if empty).
    pub fn abs_max(&self) -> f64 {
        self.values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }

    /// The min absolute value over explicitly-stored nonzeros (`f64::INFINITY`
    /// if there are none).
    pub fn abs_min_nonzero(&self) -> f64 {
        self.values
            .iter()
            .map(|v| v.abs())
            .filter(|v| *v > 0.0)
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_triplets_are_summed() {
        let m = CscMatrix::from_triplets(
            2,
            2,
            &[
                Triplet::new(0, 0, 1.0),
                Triplet::new(0, 0, 2.0),
                Triplet::new(1, 1, 5.0),
            ],
        );
        assert_eq!(m.nnz(), 2);
        let col0: Vec<_> = m.col(0).collect();
        assert_eq!(col0, vec![(0, 3.0)]);
    }

    #[test]
    fn transpose_round_trips() {
        let m = CscMatrix::from_triplets(
            2,
            3,
            &[
                Triplet::new(0, 0, 1.0),
                Triplet::new(1, 0, 2.0),
                Triplet::new(0, 2, 3.0),
            ],
        );
        let t = m.transpose();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        assert_eq!(t.col(0).collect::<Vec<_>>(), vec![(0, 1.0), (2, 3.0)]);
        let tt = t.transpose();
        assert_eq!(tt.nrows(), m.nrows());
        assert_eq!(tt.ncols(), m.ncols());
        assert_eq!(tt.col(0).collect::<Vec<_>>(), m.col(0).collect::<Vec<_>>());
    }
}
