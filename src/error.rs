//! Error classification, mirroring `linalg::solver::LinearSolverError`'s
//! (`derive_more::{Display, Error}`) composition with `problemo::Problem` at the
//! boundary where the solver driver reports a failure to the caller.

use derive_more::{Display, Error};

/// The problem data failed validation.
#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum InvalidProblemError {
    #[display("constraint matrix A is {rows}x{cols} but c has {n_vars} entries")]
    DimensionMismatch { rows: usize, cols: usize, n_vars: usize },
    #[display("lower bound exceeds upper bound at index {index}: {lower} > {upper}")]
    InconsistentBounds { index: usize, lower: f64, upper: f64 },
    #[display("quadratic_diag[{index}] = {value} is negative")]
    NegativeQuadraticDiagonal { index: usize, value: f64 },
    #[display("obj_scale is zero")]
    ZeroObjectiveScale,
    #[display("non-finite value (NaN) encountered in {field}")]
    NotFinite { field: &'static str },
    #[display("magnitude {value} in {field} exceeds the 1e50 fatal threshold")]
    ExcessiveMagnitude { field: &'static str, value: f64 },
    #[display("presolve returned a general constraint unsupported by this core")]
    UnsupportedPresolveOutput,
}

/// A requested parameter combination is not meaningful.
#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum InvalidParameterError {
    #[display("eps {name} must be nonnegative, got {value}")]
    NegativeEpsilon { name: &'static str, value: f64 },
    #[display("feasibility polishing was requested but the problem is not an LP (quadratic_diag is present)")]
    PolishingRequiresLp,
    #[display("num_shards and num_threads must both be at least 1")]
    NonPositiveParallelism,
}

/// The caller-supplied initial iterate is malformed.
#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum InvalidInitialSolutionError {
    #[display("initial {which} has {got} entries, expected {expected}")]
    WrongLength { which: &'static str, got: usize, expected: usize },
    #[display("initial {which} contains a NaN at index {index}")]
    NotFinite { which: &'static str, index: usize },
    #[display("initial {which}[{index}] = {value} exceeds the magnitude threshold")]
    ExcessiveMagnitude { which: &'static str, index: usize, value: f64 },
}

/// The iteration itself broke down numerically.
#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum NumericalError {
    #[display("movement M was exactly zero at iteration {iteration}: iterate is stuck")]
    NoMovement { iteration: usize },
    #[display("movement M = {value:e} exceeded the divergence threshold at iteration {iteration}")]
    Diverged { iteration: usize, value: f64 },
    #[display("Malitsky-Pock line search failed to accept a step within 60 inner iterations")]
    LineSearchStalled,
    #[display("presolve reported optimal but the recovered solution does not satisfy optimality")]
    PresolveRecoveryMismatch,
}

/// The top-level error type returned by [`crate::preprocess::PreprocessSolver`].
#[derive(Debug, Display, Error, Clone)]
pub enum SolverError {
    #[display("invalid problem: {_0}")]
    InvalidProblem(InvalidProblemError),
    #[display("invalid parameter: {_0}")]
    InvalidParameter(InvalidParameterError),
    #[display("invalid initial solution: {_0}")]
    InvalidInitialSolution(InvalidInitialSolutionError),
    #[display("numerical error: {_0}")]
    Numerical(NumericalError),
}

impl From<InvalidProblemError> for SolverError {
    fn from(e: InvalidProblemError) -> Self {
        SolverError::InvalidProblem(e)
    }
}
impl From<InvalidParameterError> for SolverError {
    fn from(e: InvalidParameterError) -> Self {
        SolverError::InvalidParameter(e)
    }
}
impl From<InvalidInitialSolutionError> for SolverError {
    fn from(e: InvalidInitialSolutionError) -> Self {
        SolverError::InvalidInitialSolution(e)
    }
}
impl From<NumericalError> for SolverError {
    fn from(e: NumericalError) -> Self {
        SolverError::Numerical(e)
    }
}

/// Converts a leaf [`SolverError`] into the [`crate::result::TerminationReason`]
/// it corresponds to.
impl SolverError {
    pub fn termination_reason(&self) -> crate::result::TerminationReason {
        use crate::result::TerminationReason as T;
        match self {
            SolverError::InvalidProblem(_) => T::InvalidProblem,
            SolverError::InvalidParameter(_) => T::InvalidParameter,
            SolverError::InvalidInitialSolution(_) => T::InvalidInitialSolution,
            SolverError::Numerical(_) => T::NumericalError,
        }
    }
}
