//! `QuadraticProgram`: the value type the whole engine is built around,
//! plus its validation and objective recovery.
//!
//! Grounded in `ortools/pdlp/quadratic_program.h`'s field layout;
//! error reporting follows `linalg::solver`'s convention of a small
//! leaf error enum fed through `problemo`.

use crate::error::InvalidProblemError;
use crate::sparse::CscMatrix;

/// `minimize c·x + ½ x·Q·x  s.t.  l_c ≤ A x ≤ u_c,  l_v ≤ x ≤ u_v`.
///
/// `Q` is represented only by its diagonal (`quadratic_diag`); absence
/// means `Q = 0`, i.e. a pure LP.
#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    pub objective: Vec<f64>,
    pub quadratic_diag: Option<Vec<f64>>,
    pub constraint_matrix: CscMatrix,
    pub constraint_lower_bounds: Vec<f64>,
    pub constraint_upper_bounds: Vec<f64>,
    pub variable_lower_bounds: Vec<f64>,
    pub variable_upper_bounds: Vec<f64>,
    pub objective_offset: f64,
    pub objective_scale: f64,
    pub problem_name: Option<String>,
    pub variable_names: Option<Vec<String>>,
    pub constraint_names: Option<Vec<String>>,
}

/// Magnitudes above this are a fatal `ExcessiveMagnitude` error.
pub const MAX_FINITE_MAGNITUDE: f64 = 1e50;

/// Matrix dynamic range (max / min nonzero magnitude) above this triggers
/// a warning, surfaced through the logger callback rather than failing
/// validation.
pub const DYNAMIC_RANGE_WARNING_THRESHOLD: f64 = 1e20;

impl QuadraticProgram {
    pub fn num_variables(&self) -> usize {
        self.objective.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraint_lower_bounds.len()
    }

    pub fn is_lp(&self) -> bool {
        self.quadratic_diag.is_none()
    }

    /// Dimension consistency, bound ordering, `Q ⪰ 0` (diagonal
    /// nonnegative), `obj_scale ≠ 0`, and magnitude checks.
    pub fn validate(&self) -> Result<(), InvalidProblemError> {
        let n = self.num_variables();
        let m = self.num_constraints();

        if self.constraint_matrix.ncols() != n || self.constraint_matrix.nrows() != m {
            return Err(InvalidProblemError::DimensionMismatch {
                rows: self.constraint_matrix.nrows(),
                cols: self.constraint_matrix.ncols(),
                n_vars: n,
            });
        }
        if self.constraint_upper_bounds.len() != m
            || self.variable_lower_bounds.len() != n
            || self.variable_upper_bounds.len() != n
        {
            return Err(InvalidProblemError::DimensionMismatch { rows: m, cols: n, n_vars: n });
        }
        if let Some(q) = &self.quadratic_diag {
            if q.len() != n {
                return Err(InvalidProblemError::DimensionMismatch { rows: m, cols: n, n_vars: n });
            }
        }

        for i in 0..m {
            let (l, u) = (self.constraint_lower_bounds[i], self.constraint_upper_bounds[i]);
            check_finite_magnitude("constraint_lower_bounds", l)?;
            check_finite_magnitude("constraint_upper_bounds", u)?;
            if l > u {
                return Err(InvalidProblemError::InconsistentBounds { index: i, lower: l, upper: u });
            }
        }
        for j in 0..n {
            let (l, u) = (self.variable_lower_bounds[j], self.variable_upper_bounds[j]);
            check_finite_magnitude("variable_lower_bounds", l)?;
            check_finite_magnitude("variable_upper_bounds", u)?;
            if l > u {
                return Err(InvalidProblemError::InconsistentBounds { index: j, lower: l, upper: u });
            }
            check_finite_magnitude("objective", self.objective[j])?;
        }

        if let Some(q) = &self.quadratic_diag {
            for (j, &qj) in q.iter().enumerate() {
                if qj.is_nan() {
                    return Err(InvalidProblemError::NotFinite { field: "quadratic_diag" });
                }
                if qj < 0.0 {
                    return Err(InvalidProblemError::NegativeQuadraticDiagonal { index: j, value: qj });
                }
                check_finite_magnitude("quadratic_diag", qj)?;
            }
        }

        for &v in self.constraint_matrix.values() {
            check_finite_magnitude("constraint_matrix", v)?;
        }

        if self.objective_scale == 0.0 {
            return Err(InvalidProblemError::ZeroObjectiveScale);
        }
        check_finite_magnitude("objective_offset", self.objective_offset)?;

        Ok(())
    }

    /// `true` if the constraint matrix's dynamic range (`max |A_ij| / min
    /// nonzero |A_ij|`) exceeds the warning threshold.
    pub fn has_poor_dynamic_range(&self) -> bool {
        let max = self.constraint_matrix.abs_max();
        let min = self.constraint_matrix.abs_min_nonzero();
        min.is_finite() && min > 0.0 && max / min > DYNAMIC_RANGE_WARNING_THRESHOLD
    }

    /// `obj_scale · (value + obj_offset)`.
    pub fn apply_obj(&self, value: f64) -> f64 {
        self.objective_scale * (value + self.objective_offset)
    }
}

fn check_finite_magnitude(field: &'static str, value: f64) -> Result<(), InvalidProblemError> {
    if value.is_nan() {
        return Err(InvalidProblemError::NotFinite { field });
    }
    if value.is_infinite() {
        return Ok(());
    }
    if value.abs() > MAX_FINITE_MAGNITUDE {
        return Err(InvalidProblemError::ExcessiveMagnitude { field, value });
    }
    Ok(())
}

/// Magnitude/density diagnostics computed once by `PreprocessSolver` and
/// surfaced through the logger callback as warnings, grounded in
/// `quadratic_program.h`'s logging helper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticProgramStats {
    pub num_variables: usize,
    pub num_constraints: usize,
    pub num_nonzeros: usize,
    pub constraint_matrix_abs_max: f64,
    pub constraint_matrix_abs_min: f64,
    pub objective_vector_abs_max: f64,
    pub objective_vector_abs_min: f64,
}

impl QuadraticProgramStats {
    pub fn compute(qp: &QuadraticProgram) -> Self {
        let obj_abs_max = qp.objective.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let obj_abs_min = qp
            .objective
            .iter()
            .map(|v| v.abs())
            .filter(|v| *v > 0.0)
            .fold(f64::INFINITY, f64::min);
        Self {
            num_variables: qp.num_variables(),
            num_constraints: qp.num_constraints(),
            num_nonzeros: qp.constraint_matrix.nnz(),
            constraint_matrix_abs_max: qp.constraint_matrix.abs_max(),
            constraint_matrix_abs_min: qp.constraint_matrix.abs_min_nonzero(),
            objective_vector_abs_max: obj_abs_max,
            objective_vector_abs_min: obj_abs_min,
        }
    }

    pub fn matrix_dynamic_range(&self) -> f64 {
        if self.constraint_matrix_abs_min.is_finite() && self.constraint_matrix_abs_min > 0.0 {
            self.constraint_matrix_abs_max / self.constraint_matrix_abs_min
        } else {
            f64::INFINITY
        }
    }
}
