//! The solver's public output types: [`SolverResult`], [`TerminationReason`],
//! [`PointType`]. Mirrors `qp::QPSolverResult`/`nlp::NLPSolverResult`'s
//! shape: a status, the winning point, and the iteration trace that
//! produced it.

use crate::qp::QuadraticProgram;
use crate::stats::IterationStats;
use crate::Status;

/// Tags which kind of candidate a set of statistics was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PointType {
    Current,
    Average,
    PrimalFeasibilityPolishing,
    DualFeasibilityPolishing,
    /// The merged candidate produced by combining a converged polished
    /// primal with a converged polished dual.
    FeasibilityPolishingSolution,
    /// Returned when an external presolver already solved the problem
    /// before PDHG ran a single iteration.
    PresolverSolution,
}

/// Why the solve loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TerminationReason {
    Optimal,
    PrimalInfeasible,
    DualInfeasible,
    IterationLimit,
    TimeLimit,
    KktMatrixPassLimit,
    Interrupted,
    InvalidProblem,
    InvalidParameter,
    InvalidInitialSolution,
    NumericalError,
}

impl TerminationReason {
    pub fn to_status(self) -> Status {
        match self {
            TerminationReason::Optimal => Status::Optimal,
            TerminationReason::PrimalInfeasible => Status::PrimalInfeasible,
            TerminationReason::DualInfeasible => Status::DualInfeasible,
            TerminationReason::IterationLimit => Status::IterationLimit,
            TerminationReason::TimeLimit => Status::TimeLimit,
            TerminationReason::KktMatrixPassLimit => Status::IterationLimit,
            TerminationReason::Interrupted => Status::Interrupted,
            TerminationReason::InvalidProblem
            | TerminationReason::InvalidParameter
            | TerminationReason::InvalidInitialSolution
            | TerminationReason::NumericalError => Status::NumericalError,
        }
    }
}

/// The solver's final answer: a status, the chosen primal/dual point (an
/// optimum, an infeasibility ray, or the best candidate seen under a work
/// limit), and the full iteration trace.
#[derive(Debug, Clone)]
pub struct SolverResult {
    pub termination_reason: TerminationReason,
    pub primal_solution: Vec<f64>,
    pub dual_solution: Vec<f64>,
    pub reduced_costs: Vec<f64>,
    pub objective_value: f64,
    pub point_type: PointType,
    pub iteration_stats: Vec<IterationStats>,
    pub solve_time_seconds: f64,
}

impl SolverResult {
    pub fn status(&self) -> Status {
        self.termination_reason.to_status()
    }

    pub fn last_iteration_stats(&self) -> Option<&IterationStats> {
        self.iteration_stats.last()
    }

    /// Recovers the original-space objective value via `qp.apply_obj`, for
    /// callers that only have the working-problem objective.
    pub fn recovered_objective(&self, qp: &QuadraticProgram, working_objective: f64) -> f64 {
        qp.apply_obj(working_objective)
    }
}
