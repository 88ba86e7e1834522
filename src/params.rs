//! `SolverParams`: the full enumerated solver parameter set.
//!
//! The teacher drives its solver families through a proc-macro options
//! registry (`macros::build_options!` in `amadavan-copters`'s `options`
//! crate) so that many solver families can share option plumbing
//! dynamically. This crate has exactly one solver family and one
//! parameter set, so the registry's dynamic typing buys nothing; a plain
//! `#[derive(Serialize, Deserialize)]` struct — the same plain-struct-plus-serde
//! shape that leaf option structs like `nlp::NLPSolverOptions` settle into
//! once a family's options have stabilized — does the job with far less risk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimalityNorm {
    LInf,
    L2,
    ComponentwiseLInf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerType {
    SingleThread,
    ThreadPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinesearchRule {
    Constant,
    Adaptive,
    MalitskyPock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartStrategy {
    None,
    EveryMajor,
    AdaptiveHeuristic,
    AdaptiveDistance,
}

/// Opaque passthrough handed to the external presolver without
/// interpretation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresolveOptions {
    pub enabled: bool,
    pub extra: std::collections::BTreeMap<String, String>,
}

/// The full parameter set accepted by [`crate::solver::Solver`] and
/// [`crate::preprocess::PreprocessSolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    pub eps_optimal_absolute: f64,
    pub eps_optimal_relative: f64,
    pub eps_primal_infeasible: f64,
    pub eps_dual_infeasible: f64,
    pub optimality_norm: OptimalityNorm,

    pub time_sec_limit: f64,
    pub iteration_limit: u64,
    pub kkt_matrix_pass_limit: f64,

    pub num_threads: usize,
    pub num_shards: usize,
    pub scheduler_type: SchedulerType,

    pub l_inf_ruiz_iterations: usize,
    pub l2_norm_rescaling: bool,

    pub linesearch_rule: LinesearchRule,
    pub initial_step_size_scaling: f64,
    pub initial_primal_weight: Option<f64>,
    pub primal_weight_update_smoothing: f64,

    pub restart_strategy: RestartStrategy,
    pub major_iteration_frequency: u64,
    pub termination_check_frequency: u64,
    pub sufficient_reduction_for_restart: f64,
    pub necessary_reduction_for_restart: f64,

    pub use_feasibility_polishing: bool,
    pub apply_feasibility_polishing_after_limits_reached: bool,
    pub apply_feasibility_polishing_if_solver_is_interrupted: bool,

    pub presolve_options: PresolveOptions,

    pub use_diagonal_qp_trust_region_solver: bool,
    pub diagonal_qp_trust_region_solver_tolerance: f64,

    pub handle_some_primal_gradients_on_finite_bounds_as_residuals: bool,
    pub infinite_constraint_bound_threshold: f64,

    pub record_iteration_stats: bool,
    pub verbosity_level: u32,
    pub log_interval_seconds: f64,

    /// Disables the dual-residual and objective-gap parts of the
    /// optimality check (treats them as always satisfied), used by the
    /// primal-feasibility-polishing subsolve which only cares about
    /// driving the primal residual to zero.
    pub disable_dual_residual_check: bool,
    /// Disables the primal-residual and objective-gap parts of the
    /// optimality check, used by the dual-feasibility-polishing subsolve.
    pub disable_primal_residual_check: bool,
}

impl Default for SolverParams {
    /// OR-Tools' PDLP defaults (`ortools/pdlp/solvers.proto`):
    /// `l_inf_ruiz_iterations = 5`,
    /// `major_iteration_frequency = 40`, `termination_check_frequency =
    /// 40`, `restart_strategy = adaptive-heuristic`.
    fn default() -> Self {
        Self {
            eps_optimal_absolute: 1e-6,
            eps_optimal_relative: 1e-6,
            eps_primal_infeasible: 1e-8,
            eps_dual_infeasible: 1e-8,
            optimality_norm: OptimalityNorm::L2,

            time_sec_limit: f64::INFINITY,
            iteration_limit: u64::MAX,
            kkt_matrix_pass_limit: f64::INFINITY,

            num_threads: 1,
            num_shards: 1,
            scheduler_type: SchedulerType::SingleThread,

            l_inf_ruiz_iterations: 5,
            l2_norm_rescaling: true,

            linesearch_rule: LinesearchRule::Adaptive,
            initial_step_size_scaling: 1.0,
            initial_primal_weight: None,
            primal_weight_update_smoothing: 0.5,

            restart_strategy: RestartStrategy::AdaptiveHeuristic,
            major_iteration_frequency: 40,
            termination_check_frequency: 40,
            sufficient_reduction_for_restart: 0.2,
            necessary_reduction_for_restart: 0.8,

            use_feasibility_polishing: false,
            apply_feasibility_polishing_after_limits_reached: false,
            apply_feasibility_polishing_if_solver_is_interrupted: false,

            presolve_options: PresolveOptions::default(),

            use_diagonal_qp_trust_region_solver: false,
            diagonal_qp_trust_region_solver_tolerance: 1e-6,

            handle_some_primal_gradients_on_finite_bounds_as_residuals: false,
            infinite_constraint_bound_threshold: 1e20,

            record_iteration_stats: false,
            verbosity_level: 0,
            log_interval_seconds: 0.0,

            disable_dual_residual_check: false,
            disable_primal_residual_check: false,
        }
    }
}

impl SolverParams {
    pub fn validate(&self) -> Result<(), crate::error::InvalidParameterError> {
        use crate::error::InvalidParameterError as E;
        if self.eps_optimal_absolute < 0.0 {
            return Err(E::NegativeEpsilon { name: "eps_optimal_absolute", value: self.eps_optimal_absolute });
        }
        if self.eps_optimal_relative < 0.0 {
            return Err(E::NegativeEpsilon { name: "eps_optimal_relative", value: self.eps_optimal_relative });
        }
        if self.eps_primal_infeasible < 0.0 {
            return Err(E::NegativeEpsilon { name: "eps_primal_infeasible", value: self.eps_primal_infeasible });
        }
        if self.eps_dual_infeasible < 0.0 {
            return Err(E::NegativeEpsilon { name: "eps_dual_infeasible", value: self.eps_dual_infeasible });
        }
        if self.num_threads == 0 || self.num_shards == 0 {
            return Err(E::NonPositiveParallelism);
        }
        Ok(())
    }

    pub fn eps_ratio(&self) -> f64 {
        crate::stats::eps_ratio(self.eps_optimal_absolute, self.eps_optimal_relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_or_tools_pdlp() {
        let p = SolverParams::default();
        assert_eq!(p.l_inf_ruiz_iterations, 5);
        assert_eq!(p.major_iteration_frequency, 40);
        assert_eq!(p.termination_check_frequency, 40);
        assert_eq!(p.restart_strategy, RestartStrategy::AdaptiveHeuristic);
    }

    #[test]
    fn negative_epsilon_is_rejected() {
        let mut p = SolverParams::default();
        p.eps_optimal_absolute = -1.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut p = SolverParams::default();
        p.num_threads = 0;
        assert!(matches!(p.validate(), Err(crate::error::InvalidParameterError::NonPositiveParallelism)));
    }
}
