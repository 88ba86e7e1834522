//! The presolve boundary: an opaque external collaborator with two hooks,
//! `Presolve(qp) -> (reduced_qp, recovery_handle)` and
//! `RecoverSolution(handle, sol) -> sol`. This core
//! ships only the trait and a pass-through no-op implementation; a real
//! Simplex-style presolver is deliberately out of scope.

use crate::error::InvalidProblemError;
use crate::params::PresolveOptions;
use crate::qp::QuadraticProgram;

/// One candidate solution (primal, dual) being threaded through
/// presolve/recovery.
#[derive(Debug, Clone)]
pub struct PresolveSolution {
    pub primal: Vec<f64>,
    pub dual: Vec<f64>,
}

/// `Presolve`/`RecoverSolution` as a trait boundary, so the solver core
/// never depends on a concrete presolver implementation.
pub trait Presolve {
    /// A handle returned by [`Self::presolve`] that [`Self::recover`]
    /// uses to undo whatever substitutions presolve made. Opaque to the
    /// solver core.
    type RecoveryHandle;

    fn presolve(&mut self, qp: QuadraticProgram, options: &PresolveOptions) -> Result<(QuadraticProgram, Self::RecoveryHandle), InvalidProblemError>;

    fn recover(&self, handle: &Self::RecoveryHandle, solution: PresolveSolution) -> PresolveSolution;
}

/// The identity presolver: returns the problem unchanged and recovers
/// solutions unchanged. Used whenever `PresolveOptions::enabled` is
/// `false`, and as the default when no external presolver is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPresolve;

impl Presolve for IdentityPresolve {
    type RecoveryHandle = ();

    fn presolve(&mut self, qp: QuadraticProgram, _options: &PresolveOptions) -> Result<(QuadraticProgram, ()), InvalidProblemError> {
        Ok((qp, ()))
    }

    fn recover(&self, _handle: &(), solution: PresolveSolution) -> PresolveSolution {
        solution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::CscMatrix;

    fn toy() -> QuadraticProgram {
        QuadraticProgram {
            objective: vec![1.0],
            quadratic_diag: None,
            constraint_matrix: CscMatrix::zeros(0, 1),
            constraint_lower_bounds: vec![],
            constraint_upper_bounds: vec![],
            variable_lower_bounds: vec![0.0],
            variable_upper_bounds: vec![1.0],
            objective_offset: 0.0,
            objective_scale: 1.0,
            problem_name: None,
            variable_names: None,
            constraint_names: None,
        }
    }

    #[test]
    fn identity_presolve_round_trips() {
        let mut presolve = IdentityPresolve;
        let options = PresolveOptions::default();
        let (qp, handle) = presolve.presolve(toy(), &options).unwrap();
        assert_eq!(qp.num_variables(), 1);
        let sol = PresolveSolution { primal: vec![0.5], dual: vec![] };
        let recovered = presolve.recover(&handle, sol.clone());
        assert_eq!(recovered.primal, sol.primal);
    }
}
