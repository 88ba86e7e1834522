//! Iteration-stats callback, generalizing a `callback::Callback`
//! trait (`NoOpCallback`, `ConvergenceOutput`) from an IPM's per-iterate
//! `SolverState` to the PDHG loop's `IterationStats`.

use crate::stats::IterationStats;
use crate::termination::BoundNorms;

/// What kind of check produced this callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationType {
    TerminationCheck,
    Restart,
    FeasibilityPolishing,
}

/// Invoked at every termination check with `{iteration_type,
/// iteration_stats, bound_norms}`.
pub trait Callback {
    fn call(&mut self, iteration_type: IterationType, stats: &IterationStats, bounds: &BoundNorms);
}

/// A callback that does nothing.
#[derive(Debug, Default)]
pub struct NoOpCallback;

impl Callback for NoOpCallback {
    fn call(&mut self, _iteration_type: IterationType, _stats: &IterationStats, _bounds: &BoundNorms) {}
}

/// Prints a one-line convergence summary per check.
#[derive(Debug, Default)]
pub struct ConvergenceOutput;

impl Callback for ConvergenceOutput {
    fn call(&mut self, iteration_type: IterationType, stats: &IterationStats, _bounds: &BoundNorms) {
        let primal_res = stats.convergence_information.first().map(|c| c.l2_primal_residual).unwrap_or(f64::NAN);
        let dual_res = stats.convergence_information.first().map(|c| c.l2_dual_residual).unwrap_or(f64::NAN);
        println!(
            "| {:?} | iter {:>7} | step {:<8.2e} | primal_res {:<8.2e} | dual_res {:<8.2e} |",
            iteration_type, stats.iteration_number, stats.step_size, primal_res, dual_res
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> IterationStats {
        IterationStats {
            iteration_number: 0,
            cumulative_kkt_matrix_passes: 0.0,
            cumulative_time_seconds: 0.0,
            cumulative_rejected_steps: 0,
            step_size: 1.0,
            primal_weight: 1.0,
            restart_used: false,
            convergence_information: Vec::new(),
            infeasibility_information: Vec::new(),
            point_metadata: Vec::new(),
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let mut cb = NoOpCallback;
        let bounds = BoundNorms { l_inf_combined_bounds: 1.0, l2_combined_bounds: 1.0, l_inf_componentwise_bound: 1.0 };
        cb.call(IterationType::TerminationCheck, &stats(), &bounds);
    }

    #[test]
    fn convergence_output_handles_empty_convergence_info() {
        let mut cb = ConvergenceOutput;
        let bounds = BoundNorms { l_inf_combined_bounds: 1.0, l2_combined_bounds: 1.0, l_inf_componentwise_bound: 1.0 };
        cb.call(IterationType::Restart, &stats(), &bounds);
    }
}
