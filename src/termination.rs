//! `TerminationCriteria`: the four termination checks, evaluated at
//! `termination_check_frequency` and before each major iteration.

use crate::params::{OptimalityNorm, SolverParams};
use crate::result::TerminationReason;
use crate::stats::{relative_optimality_gap, relative_residual, ConvergenceInformation, InfeasibilityInformation};

/// The outcome of one termination check: either "keep going" or a reason
/// to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCheckResult {
    Continue,
    Stop(TerminationReason),
}

/// Bundles the norms a termination check needs, already reduced to the
/// requested [`OptimalityNorm`] flavor.
#[derive(Debug, Clone, Copy)]
pub struct BoundNorms {
    pub l_inf_combined_bounds: f64,
    pub l2_combined_bounds: f64,
    pub l_inf_componentwise_bound: f64,
}

fn select_norms(info: &ConvergenceInformation, norm: OptimalityNorm, bounds: &BoundNorms) -> (f64, f64, f64) {
    match norm {
        OptimalityNorm::LInf => (info.l_inf_primal_residual, info.l_inf_dual_residual, bounds.l_inf_combined_bounds),
        OptimalityNorm::L2 => (info.l2_primal_residual, info.l2_dual_residual, bounds.l2_combined_bounds),
        OptimalityNorm::ComponentwiseLInf => (
            info.l_inf_componentwise_primal_residual,
            info.l_inf_componentwise_dual_residual,
            bounds.l_inf_componentwise_bound,
        ),
    }
}

/// Check 1: optimality. Residuals and gap all below `eps_abs + eps_rel *
/// norm`, under the chosen norm.
pub fn check_optimality(info: &ConvergenceInformation, params: &SolverParams, bounds: &BoundNorms) -> bool {
    let eps_ratio = params.eps_ratio();
    let (primal_res, dual_res, norm) = select_norms(info, params.optimality_norm, bounds);

    let rel_primal = relative_residual(primal_res, eps_ratio, norm);
    let rel_dual = relative_residual(dual_res, eps_ratio, norm);
    let rel_gap = relative_optimality_gap(info.primal_objective, info.dual_objective, eps_ratio);

    let threshold = params.eps_optimal_relative;
    let absolute_threshold_met = |residual: f64| residual <= params.eps_optimal_absolute + params.eps_optimal_relative * norm;

    let primal_ok = params.disable_primal_residual_check || (rel_primal <= threshold && absolute_threshold_met(primal_res));
    let dual_ok = params.disable_dual_residual_check || (rel_dual <= threshold && absolute_threshold_met(dual_res));
    let gap_ok = (params.disable_primal_residual_check || params.disable_dual_residual_check) || rel_gap <= threshold;

    primal_ok && dual_ok && gap_ok
}

/// Check 2: primal infeasibility. The dual ray has a finite, strictly
/// negative objective and its scaled infeasibility is below
/// `eps_primal_infeasible`.
pub fn check_primal_infeasibility(info: &InfeasibilityInformation, params: &SolverParams) -> bool {
    info.dual_ray_objective.is_finite()
        && info.dual_ray_objective < 0.0
        && info.max_dual_ray_infeasibility < params.eps_primal_infeasible
}

/// Check 3: dual infeasibility. The primal ray linear objective is
/// strictly negative (or the quadratic-norm part is nonzero and the
/// linear part is `<= 0`), and its max infeasibility is below
/// `eps_dual_infeasible`.
pub fn check_dual_infeasibility(info: &InfeasibilityInformation, params: &SolverParams) -> bool {
    let objective_condition = info.primal_ray_linear_objective < 0.0
        || (info.primal_ray_quadratic_norm > 0.0 && info.primal_ray_linear_objective <= 0.0);
    objective_condition && info.max_primal_ray_infeasibility < params.eps_dual_infeasible
}

/// Check 4: work limits — iteration count, KKT-matrix passes, wall time,
/// or an external interrupt flag.
pub fn check_work_limits(
    iteration: u64,
    cumulative_kkt_matrix_passes: f64,
    cumulative_time_seconds: f64,
    interrupted: bool,
    params: &SolverParams,
) -> Option<TerminationReason> {
    if interrupted {
        return Some(TerminationReason::Interrupted);
    }
    if iteration >= params.iteration_limit {
        return Some(TerminationReason::IterationLimit);
    }
    if cumulative_kkt_matrix_passes >= params.kkt_matrix_pass_limit {
        return Some(TerminationReason::KktMatrixPassLimit);
    }
    if cumulative_time_seconds >= params.time_sec_limit {
        return Some(TerminationReason::TimeLimit);
    }
    None
}

/// Runs all four checks in order and returns the first that fires.
#[allow(clippy::too_many_arguments)]
pub fn check_termination(
    convergence: &ConvergenceInformation,
    primal_infeasibility: Option<&InfeasibilityInformation>,
    dual_infeasibility: Option<&InfeasibilityInformation>,
    bounds: &BoundNorms,
    iteration: u64,
    cumulative_kkt_matrix_passes: f64,
    cumulative_time_seconds: f64,
    interrupted: bool,
    params: &SolverParams,
) -> TerminationCheckResult {
    if check_optimality(convergence, params, bounds) {
        return TerminationCheckResult::Stop(TerminationReason::Optimal);
    }
    if let Some(info) = primal_infeasibility {
        if check_primal_infeasibility(info, params) {
            return TerminationCheckResult::Stop(TerminationReason::PrimalInfeasible);
        }
    }
    if let Some(info) = dual_infeasibility {
        if check_dual_infeasibility(info, params) {
            return TerminationCheckResult::Stop(TerminationReason::DualInfeasible);
        }
    }
    if let Some(reason) = check_work_limits(iteration, cumulative_kkt_matrix_passes, cumulative_time_seconds, interrupted, params) {
        return TerminationCheckResult::Stop(reason);
    }
    TerminationCheckResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::PointType;

    fn converged_info() -> ConvergenceInformation {
        ConvergenceInformation {
            candidate_type: PointType::Average,
            primal_objective: 10.0,
            dual_objective: 10.0,
            corrected_dual_objective: 10.0,
            l_inf_primal_residual: 0.0,
            l2_primal_residual: 0.0,
            l_inf_componentwise_primal_residual: 0.0,
            l_inf_dual_residual: 0.0,
            l2_dual_residual: 0.0,
            l_inf_componentwise_dual_residual: 0.0,
            l_inf_primal_variable: 1.0,
            l2_primal_variable: 1.0,
        }
    }

    fn bounds() -> BoundNorms {
        BoundNorms { l_inf_combined_bounds: 1.0, l2_combined_bounds: 1.0, l_inf_componentwise_bound: 1.0 }
    }

    #[test]
    fn exact_optimum_satisfies_optimality_check() {
        let params = SolverParams::default();
        assert!(check_optimality(&converged_info(), &params, &bounds()));
    }

    #[test]
    fn large_residual_fails_optimality_check() {
        let mut info = converged_info();
        info.l2_primal_residual = 100.0;
        let params = SolverParams::default();
        assert!(!check_optimality(&info, &params, &bounds()));
    }

    #[test]
    fn iteration_limit_fires_work_limit() {
        let params = SolverParams { iteration_limit: 10, ..SolverParams::default() };
        assert_eq!(check_work_limits(10, 0.0, 0.0, false, &params), Some(TerminationReason::IterationLimit));
        assert_eq!(check_work_limits(9, 0.0, 0.0, false, &params), None);
    }

    #[test]
    fn interrupt_flag_takes_priority() {
        let params = SolverParams::default();
        assert_eq!(check_work_limits(0, 0.0, 0.0, true, &params), Some(TerminationReason::Interrupted));
    }

    #[test]
    fn primal_infeasibility_requires_negative_finite_dual_ray_objective() {
        let params = SolverParams::default();
        let info = InfeasibilityInformation {
            candidate_type: PointType::Average,
            primal_ray_quadratic_norm: 0.0,
            primal_ray_linear_objective: 0.0,
            max_primal_ray_infeasibility: 0.0,
            dual_ray_objective: -1.0,
            max_dual_ray_infeasibility: 1e-12,
        };
        assert!(check_primal_infeasibility(&info, &params));

        let mut not_infeasible = info;
        not_infeasible.dual_ray_objective = f64::NEG_INFINITY;
        assert!(!check_primal_infeasibility(&not_infeasible, &params));
    }
}
