//! `PreprocessSolver`: the end-to-end driver — validate, hand the problem
//! to an external presolver, rescale, run [`crate::solver::Solver`], then
//! map the working-space solution back to the caller's original units.
//! Plays the same "thin orchestration layer over a reusable core" role as
//! `nlp::NLPSolver`'s outer driver sits over the inner Newton loop.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use problemo::common::GlossError;
use problemo::{Problem, ProblemResult};

use crate::callback::Callback;
use crate::params::SolverParams;
use crate::presolve::{IdentityPresolve, Presolve, PresolveSolution};
use crate::qp::QuadraticProgram;
use crate::result::{PointType, SolverResult, TerminationReason};
use crate::sharded_qp::ShardedQuadraticProgram;
use crate::sharder::build_scheduler;
use crate::solver::Solver;

/// Drives one end-to-end solve: validate, presolve, rescale, iterate,
/// recover. Generic over the presolver so callers can plug in a real
/// implementation; defaults to [`IdentityPresolve`].
pub struct PreprocessSolver<P: Presolve = IdentityPresolve> {
    presolve: P,
    callback: Option<Box<dyn Callback>>,
}

impl Default for PreprocessSolver<IdentityPresolve> {
    fn default() -> Self {
        Self { presolve: IdentityPresolve, callback: None }
    }
}

impl<P: Presolve> PreprocessSolver<P> {
    pub fn with_presolve(presolve: P) -> Self {
        Self { presolve, callback: None }
    }

    pub fn with_callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Runs presolve, rescaling, and PDHG to termination, returning a
    /// result whose `primal_solution`/`dual_solution`/`objective_value`
    /// are all in the caller's original problem units.
    pub fn solve(mut self, qp: QuadraticProgram, params: SolverParams, interrupted: Arc<AtomicBool>) -> Result<SolverResult, Problem> {
        qp.validate().via(GlossError::new("validating the input problem"))?;
        params.validate().via(GlossError::new("validating solver parameters"))?;

        let (reduced_qp, recovery_handle) = self.presolve.presolve(qp, &params.presolve_options).via(GlossError::new("running presolve"))?;
        reduced_qp.validate().via(GlossError::new("validating the presolved problem"))?;

        if reduced_qp.num_variables() == 0 {
            let solution = self.presolve.recover(&recovery_handle, PresolveSolution { primal: vec![], dual: vec![] });
            return Ok(SolverResult {
                termination_reason: TerminationReason::Optimal,
                objective_value: reduced_qp.apply_obj(0.0),
                primal_solution: solution.primal,
                dual_solution: solution.dual,
                reduced_costs: vec![],
                point_type: PointType::PresolverSolution,
                iteration_stats: vec![],
                solve_time_seconds: 0.0,
            });
        }

        let unscaled_objective = reduced_qp.objective.clone();
        let unscaled_quadratic_diag = reduced_qp.quadratic_diag.clone();
        let objective_scale = reduced_qp.objective_scale;
        let objective_offset = reduced_qp.objective_offset;

        let scheduler = build_scheduler(params.scheduler_type, params.num_threads);
        let mut sqp = ShardedQuadraticProgram::new(reduced_qp, scheduler, params.num_shards);
        sqp.clamp_large_bounds(params.infinite_constraint_bound_threshold);

        let scaling = if params.l_inf_ruiz_iterations > 0 || params.l2_norm_rescaling {
            sqp.rescale(params.l_inf_ruiz_iterations)
        } else {
            crate::sharded_qp::ScalingVectors::identity(sqp.qp().num_variables(), sqp.qp().num_constraints())
        };

        let n = sqp.qp().num_variables();
        let m = sqp.qp().num_constraints();
        let mut solver = Solver::with_scaling(&sqp, params, vec![0.0; n], vec![0.0; m], scaling.clone(), Arc::clone(&interrupted))
            .via(GlossError::new("constructing the PDHG solver"))?;
        if let Some(cb) = self.callback.take() {
            solver = solver.with_callback(cb);
        }
        let working_result = solver.solve().via(GlossError::new("running the PDHG solve"))?;

        let x_original: Vec<f64> = working_result.primal_solution.iter().zip(scaling.d_col.iter()).map(|(x, d)| x * d).collect();
        let y_original: Vec<f64> = working_result.dual_solution.iter().zip(scaling.d_row.iter()).map(|(y, d)| y / d).collect();

        let cx: f64 = unscaled_objective.iter().zip(x_original.iter()).map(|(c, x)| c * x).sum();
        let quad: f64 = unscaled_quadratic_diag
            .as_ref()
            .map(|q| q.iter().zip(x_original.iter()).map(|(qj, x)| 0.5 * qj * x * x).sum())
            .unwrap_or(0.0);
        let objective_value = objective_scale * (cx + quad + objective_offset);

        let recovered = self.presolve.recover(&recovery_handle, PresolveSolution { primal: x_original, dual: y_original });
        let reduced_costs: Vec<f64> = working_result
            .reduced_costs
            .iter()
            .zip(scaling.d_col.iter())
            .map(|(r, d)| r * d)
            .collect();

        Ok(SolverResult {
            termination_reason: working_result.termination_reason,
            primal_solution: recovered.primal,
            dual_solution: recovered.dual,
            reduced_costs,
            objective_value,
            point_type: working_result.point_type,
            iteration_stats: working_result.iteration_stats,
            solve_time_seconds: working_result.solve_time_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LinesearchRule;
    use crate::sparse::{CscMatrix, Triplet};

    fn bounded_lp() -> QuadraticProgram {
        QuadraticProgram {
            objective: vec![1.0, 1.0],
            quadratic_diag: None,
            constraint_matrix: CscMatrix::from_triplets(1, 2, &[Triplet::new(0, 0, 1.0), Triplet::new(0, 1, 1.0)]),
            constraint_lower_bounds: vec![1.0],
            constraint_upper_bounds: vec![1.0],
            variable_lower_bounds: vec![0.0, 0.0],
            variable_upper_bounds: vec![1.0, 1.0],
            objective_offset: 0.0,
            objective_scale: 1.0,
            problem_name: None,
            variable_names: None,
            constraint_names: None,
        }
    }

    #[test]
    fn preprocess_solves_a_trivial_lp() {
        let qp = bounded_lp();
        let mut params = SolverParams { linesearch_rule: LinesearchRule::Adaptive, iteration_limit: 2000, ..SolverParams::default() };
        params.termination_check_frequency = 20;
        params.major_iteration_frequency = 20;

        let result = PreprocessSolver::default().solve(qp, params, Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(result.primal_solution.len(), 2);
        assert!(result.primal_solution[0] + result.primal_solution[1] > 0.9);
    }

    #[test]
    fn invalid_problem_is_rejected_before_presolve_runs() {
        let mut qp = bounded_lp();
        qp.variable_lower_bounds[0] = 5.0;
        qp.variable_upper_bounds[0] = 1.0;
        let result = PreprocessSolver::default().solve(qp, SolverParams::default(), Arc::new(AtomicBool::new(false)));
        assert!(result.is_err());
    }
}
