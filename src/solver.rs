//! `Solver`: runs PDHG iterations on a working `ShardedQuadraticProgram`,
//! dispatching restarts and (optionally) feasibility polishing.
//!
//! `Solver` takes a shared, read-only borrow of the
//! `ShardedQuadraticProgram` it iterates over (never a back-pointer) and
//! owns all mutable iteration state itself; `preprocess.rs`'s
//! `PreprocessSolver` driver owns both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::callback::{Callback, IterationType};
use crate::error::{InvalidParameterError, NumericalError, SolverError};
use crate::params::{LinesearchRule, RestartStrategy, SolverParams};
use crate::qp::QuadraticProgram;
use crate::restart::{apply_restart, decide_restart, update_primal_weight, RestartChoice, RestartDecisionInputs};
use crate::result::{PointType, SolverResult, TerminationReason};
use crate::sharded_qp::{ScalingVectors, ShardedQuadraticProgram};
use crate::sharder::build_scheduler;
use crate::stats::{
    compute_infeasibility_information, dual_residuals_and_correction, primal_residuals, ConvergenceInformation, EffectiveBoundPolicy,
    IterationStats, PointMetadata,
};
use crate::step::{AdaptiveStep, ConstantStep, MalitskyPockStep, PdhgState, StepPolicy, StepRule};
use crate::termination::{check_optimality, check_termination, BoundNorms, TerminationCheckResult};
use crate::trust_region::{euclidean_localized_bounds, LocalizedLagrangianBounds};

/// The first iteration at which feasibility polishing is attempted; the
/// interval between attempts doubles after each failed attempt.
const FIRST_POLISH_ITERATION: u64 = 100;

/// Drives PDHG iterations on a working (scaled) problem.
pub struct Solver<'a> {
    qp: &'a ShardedQuadraticProgram,
    params: SolverParams,
    state: PdhgState,
    step_rule: StepPolicy,
    interrupted: Arc<AtomicBool>,
    cumulative_kkt_matrix_passes: f64,
    started_at: Instant,
    previous_trial_potential: Option<f64>,
    normalized_distance_last_period: f64,
    /// Maps the working-space iterate back to the original problem's units
    /// for residual/objective reporting. Identity unless the caller
    /// (`preprocess::PreprocessSolver`) rescaled the problem first.
    scaling: ScalingVectors,
    callback: Option<Box<dyn Callback>>,
    next_polish_iteration: u64,
}

impl<'a> Solver<'a> {
    pub fn new(
        qp: &'a ShardedQuadraticProgram,
        params: SolverParams,
        x0: Vec<f64>,
        y0: Vec<f64>,
        interrupted: Arc<AtomicBool>,
    ) -> Result<Self, SolverError> {
        let scaling = ScalingVectors::identity(qp.qp().num_variables(), qp.qp().num_constraints());
        Self::with_scaling(qp, params, x0, y0, scaling, interrupted)
    }

    /// Like [`Self::new`] but with an explicit [`ScalingVectors`], used by
    /// `preprocess::PreprocessSolver` after it has rescaled the working
    /// problem so that residuals can be reported in original-problem units.
    pub fn with_scaling(
        qp: &'a ShardedQuadraticProgram,
        params: SolverParams,
        x0: Vec<f64>,
        y0: Vec<f64>,
        scaling: ScalingVectors,
        interrupted: Arc<AtomicBool>,
    ) -> Result<Self, SolverError> {
        params.validate().map_err(SolverError::from)?;
        if params.use_feasibility_polishing && !qp.qp().is_lp() {
            return Err(SolverError::from(InvalidParameterError::PolishingRequiresLp));
        }

        let aty = qp.transpose_matvec(&y0);
        let initial_primal_weight = params.initial_primal_weight.unwrap_or(1.0);
        let state = PdhgState::new(x0, y0, aty, 1.0, initial_primal_weight);

        let step_rule = match params.linesearch_rule {
            LinesearchRule::Constant => {
                StepPolicy::Constant(ConstantStep::estimate(qp, params.initial_step_size_scaling, 20))
            }
            LinesearchRule::Adaptive => StepPolicy::Adaptive(AdaptiveStep::default()),
            LinesearchRule::MalitskyPock => StepPolicy::MalitskyPock(MalitskyPockStep::default()),
        };

        Ok(Self {
            qp,
            params,
            state,
            step_rule,
            interrupted,
            cumulative_kkt_matrix_passes: 0.0,
            started_at: Instant::now(),
            previous_trial_potential: None,
            normalized_distance_last_period: f64::INFINITY,
            scaling,
            callback: None,
            next_polish_iteration: FIRST_POLISH_ITERATION,
        })
    }

    /// Installs a callback invoked after every termination check.
    pub fn with_callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn state(&self) -> &PdhgState {
        &self.state
    }

    /// Runs the PDHG loop to termination, returning the working-problem
    /// `SolverResult` (caller is responsible for un-scaling via
    /// `ScalingVectors` and `QuadraticProgram::apply_obj`).
    pub fn solve(&mut self) -> Result<SolverResult, SolverError> {
        let mut history = Vec::new();
        let mut iteration: u64 = 0;

        loop {
            match self.take_step(iteration as usize) {
                Ok(()) => {}
                Err(NumericalError::NoMovement { .. }) | Err(NumericalError::Diverged { .. }) | Err(NumericalError::LineSearchStalled) => {
                    let stats = self.snapshot(iteration, false);
                    return Ok(self.finish(TerminationReason::NumericalError, PointType::Current, stats, history));
                }
                Err(e) => return Err(SolverError::from(e)),
            }
            iteration += 1;
            self.cumulative_kkt_matrix_passes += 2.0;

            let is_major = self.params.major_iteration_frequency > 0 && iteration % self.params.major_iteration_frequency == 0;
            if is_major {
                self.maybe_restart(iteration);
            }

            let should_check = self.params.termination_check_frequency > 0 && iteration % self.params.termination_check_frequency == 0;
            if should_check || is_major {
                let mut stats = self.snapshot(iteration, is_major);
                let bounds = self.bound_norms();
                let interrupted = self.interrupted.load(Ordering::SeqCst);

                let avg_x = self.state.primal_avg.avg().to_vec();
                let avg_y = self.state.dual_avg.avg().to_vec();
                let avg_aty = self.qp.transpose_matvec(&avg_y);
                let current_infeasibility =
                    compute_infeasibility_information(self.qp, &self.scaling, &self.state.x, &self.state.y, &self.state.aty, PointType::Current);
                let average_infeasibility = compute_infeasibility_information(self.qp, &self.scaling, &avg_x, &avg_y, &avg_aty, PointType::Average);
                stats.infeasibility_information = vec![average_infeasibility, current_infeasibility];

                // Average is checked for optimality/primal-infeasibility; current for
                // dual-infeasibility, matching the convergence_information ordering
                // (`[average, current]`).
                let average_convergence = stats.convergence_information[0];
                let mut outcome = check_termination(
                    &average_convergence,
                    Some(&average_infeasibility),
                    Some(&current_infeasibility),
                    &bounds,
                    iteration,
                    self.cumulative_kkt_matrix_passes,
                    self.started_at.elapsed().as_secs_f64(),
                    interrupted,
                    &self.params,
                );

                if let Some(cb) = self.callback.as_mut() {
                    cb.call(IterationType::TerminationCheck, &stats, &bounds);
                }
                history.push(stats.clone());

                let mut polished_point: Option<(Vec<f64>, Vec<f64>)> = None;

                if self.params.use_feasibility_polishing && self.qp.qp().is_lp() && iteration >= self.next_polish_iteration {
                    self.next_polish_iteration = self.next_polish_iteration.saturating_mul(2);
                    if let Some((px, py)) = self.try_feasibility_polishing(&avg_x, &avg_y, iteration) {
                        let paty = self.qp.transpose_matvec(&py);
                        let polished = self.convergence_info(&px, &py, &paty, &self.scaling, PointType::FeasibilityPolishingSolution);
                        if check_optimality(&polished, &self.params, &bounds) {
                            outcome = TerminationCheckResult::Stop(TerminationReason::Optimal);
                            polished_point = Some((px, py));
                        }
                    }
                }

                let wants_last_resort_polish = polished_point.is_none()
                    && matches!(outcome, TerminationCheckResult::Stop(reason)
                        if (matches!(reason, TerminationReason::IterationLimit | TerminationReason::TimeLimit | TerminationReason::KktMatrixPassLimit)
                            && self.params.apply_feasibility_polishing_after_limits_reached)
                            || (reason == TerminationReason::Interrupted && self.params.apply_feasibility_polishing_if_solver_is_interrupted));

                if wants_last_resort_polish && self.params.use_feasibility_polishing && self.qp.qp().is_lp() {
                    if let Some((px, py)) = self.try_feasibility_polishing(&avg_x, &avg_y, iteration) {
                        let paty = self.qp.transpose_matvec(&py);
                        let polished = self.convergence_info(&px, &py, &paty, &self.scaling, PointType::FeasibilityPolishingSolution);
                        if check_optimality(&polished, &self.params, &bounds) {
                            outcome = TerminationCheckResult::Stop(TerminationReason::Optimal);
                            polished_point = Some((px, py));
                        }
                    }
                }

                if let TerminationCheckResult::Stop(reason) = outcome {
                    if let Some((px, py)) = polished_point {
                        self.state.x = px;
                        self.state.y = py;
                        return Ok(self.finish(reason, PointType::FeasibilityPolishingSolution, stats, history));
                    }
                    let point_type = if reason == TerminationReason::Optimal { PointType::Average } else { PointType::Current };
                    return Ok(self.finish(reason, point_type, stats, history));
                }
            }
        }
    }

    /// Runs the primal- and dual-feasibility-polishing subsolves and returns
    /// the polished `(primal, dual)` point if both subsolves reach their own
    /// optimality criterion. The primal subsolve starts from the running
    /// average primal and a zero dual; the dual subsolve starts from a zero
    /// primal and the running average dual. Rather than mutating `self.qp`'s
    /// bounds/objective in place and restoring them afterward, each subsolve
    /// runs against an independent cloned `ShardedQuadraticProgram`, avoiding
    /// the need for `Solver` to hold a mutable borrow of its problem.
    fn try_feasibility_polishing(&self, primal_avg: &[f64], dual_avg: &[f64], iteration: u64) -> Option<(Vec<f64>, Vec<f64>)> {
        let scheduler_type = self.params.scheduler_type;
        let num_threads = self.params.num_threads;
        let num_shards = self.params.num_shards;
        let sub_iteration_limit = (iteration / 8).max(1);
        let n = primal_avg.len();
        let m = dual_avg.len();

        let mut primal_params = self.params.clone();
        primal_params.use_feasibility_polishing = false;
        primal_params.disable_dual_residual_check = true;
        primal_params.iteration_limit = sub_iteration_limit;
        let primal_sqp = ShardedQuadraticProgram::new(primal_feasibility_subproblem(self.qp.qp()), build_scheduler(scheduler_type, num_threads), num_shards);
        let mut primal_solver = Solver::new(&primal_sqp, primal_params, primal_avg.to_vec(), vec![0.0; m], Arc::clone(&self.interrupted)).ok()?;
        let primal_result = primal_solver.solve().ok()?;
        if primal_result.termination_reason != TerminationReason::Optimal {
            return None;
        }

        let mut dual_params = self.params.clone();
        dual_params.use_feasibility_polishing = false;
        dual_params.disable_primal_residual_check = true;
        dual_params.iteration_limit = sub_iteration_limit;
        let dual_sqp = ShardedQuadraticProgram::new(dual_feasibility_subproblem(self.qp.qp()), build_scheduler(scheduler_type, num_threads), num_shards);
        let mut dual_solver = Solver::new(&dual_sqp, dual_params, vec![0.0; n], dual_avg.to_vec(), Arc::clone(&self.interrupted)).ok()?;
        let dual_result = dual_solver.solve().ok()?;
        if dual_result.termination_reason != TerminationReason::Optimal {
            return None;
        }

        Some((primal_result.primal_solution, dual_result.dual_solution))
    }

    fn take_step(&mut self, iteration: usize) -> Result<(), NumericalError> {
        self.step_rule.take_step(self.qp, &mut self.state, iteration).map(|_| ())
    }

    fn maybe_restart(&mut self, iteration: u64) {
        if self.params.restart_strategy == RestartStrategy::None && iteration == 0 {
            return;
        }
        let lagrangian_value = self.lagrangian_value();
        let radius = self.distance_from_restart();
        let current_bounds = self.localized_bounds(radius.max(1e-12), lagrangian_value);

        let avg_x = self.state.primal_avg.avg().to_vec();
        let avg_y = self.state.dual_avg.avg().to_vec();
        let avg_aty = self.qp.transpose_matvec(&avg_y);
        let average_radius = self.distance_from_restart_at(&avg_x, &avg_y);
        let average_lagrangian_value = self.lagrangian_value_at(&avg_x, &avg_y);
        let average_bounds = self.localized_bounds_at(&avg_x, &avg_y, &avg_aty, average_radius.max(1e-12), average_lagrangian_value);

        let inputs = RestartDecisionInputs {
            current_bounds,
            average_bounds,
            normalized_distance_this_period: radius,
            normalized_distance_last_period: self.normalized_distance_last_period,
            previous_trial_potential: self.previous_trial_potential,
        };

        let choice = decide_restart(
            self.params.restart_strategy,
            iteration,
            self.params.major_iteration_frequency,
            &inputs,
            self.params.sufficient_reduction_for_restart,
            self.params.necessary_reduction_for_restart,
        );

        if choice != RestartChoice::NoRestart {
            let qp = self.qp;
            apply_restart(choice, &mut self.state, |y| qp.transpose_matvec(y));
            let d_p = l2(&diff(&self.state.x, &self.state.x0));
            let d_d = l2(&diff(&self.state.y, &self.state.y0));
            self.state.primal_weight = update_primal_weight(d_p, d_d, self.state.primal_weight, self.params.primal_weight_update_smoothing);
        }

        self.normalized_distance_last_period = radius;
        self.previous_trial_potential = Some(self.normalized_potential(&current_bounds));
    }

    fn normalized_potential(&self, bounds: &LocalizedLagrangianBounds) -> f64 {
        if bounds.radius > 0.0 {
            (bounds.upper_bound - bounds.lower_bound) / (bounds.radius * bounds.radius)
        } else {
            f64::INFINITY
        }
    }

    fn lagrangian_value(&self) -> f64 {
        self.lagrangian_value_at(&self.state.x, &self.state.y)
    }

    fn lagrangian_value_at(&self, x: &[f64], y: &[f64]) -> f64 {
        let data = self.qp.qp();
        let cx: f64 = data.objective.iter().zip(x.iter()).map(|(c, x)| c * x).sum();
        let quad: f64 = data.quadratic_diag.as_ref().map(|q| q.iter().zip(x.iter()).map(|(qj, x)| 0.5 * qj * x * x).sum()).unwrap_or(0.0);
        let yax: f64 = y.iter().zip(self.qp.matvec(x).iter()).map(|(y, ax)| y * ax).sum();
        cx + quad - yax
    }

    fn distance_from_restart(&self) -> f64 {
        self.distance_from_restart_at(&self.state.x, &self.state.y)
    }

    fn distance_from_restart_at(&self, x: &[f64], y: &[f64]) -> f64 {
        let omega = self.state.primal_weight;
        let dp2: f64 = diff(x, &self.state.x0).iter().map(|v| v * v).sum();
        let dd2: f64 = diff(y, &self.state.y0).iter().map(|v| v * v).sum();
        (0.5 * omega * dp2 + 0.5 * dd2 / omega).sqrt()
    }

    fn localized_bounds(&self, radius: f64, lagrangian_value: f64) -> LocalizedLagrangianBounds {
        self.localized_bounds_at(&self.state.x, &self.state.y, &self.state.aty, radius, lagrangian_value)
    }

    fn localized_bounds_at(&self, x: &[f64], y: &[f64], aty: &[f64], radius: f64, lagrangian_value: f64) -> LocalizedLagrangianBounds {
        let data = self.qp.qp();
        let g_x: Vec<f64> = (0..data.num_variables())
            .map(|j| {
                let q_jj = data.quadratic_diag.as_ref().map_or(0.0, |q| q[j]);
                data.objective[j] + q_jj * x[j] - aty[j]
            })
            .collect();
        let g_y: Vec<f64> = self.qp.matvec(x);

        euclidean_localized_bounds(
            x,
            y,
            &g_x,
            &g_y,
            &data.variable_lower_bounds,
            &data.variable_upper_bounds,
            &data.constraint_lower_bounds,
            &data.constraint_upper_bounds,
            data.quadratic_diag.as_deref(),
            lagrangian_value,
            self.state.primal_weight,
            radius,
            self.params.diagonal_qp_trust_region_solver_tolerance,
        )
    }

    fn bound_norms(&self) -> BoundNorms {
        let data = self.qp.qp();
        let combined = |l: f64, u: f64| finite_abs(l).max(finite_abs(u));
        let l_inf = (0..data.num_constraints()).fold(0.0_f64, |acc, i| {
            acc.max(combined(data.constraint_lower_bounds[i], data.constraint_upper_bounds[i]))
        });
        let l2 = (0..data.num_constraints())
            .map(|i| {
                let c = combined(data.constraint_lower_bounds[i], data.constraint_upper_bounds[i]);
                c * c
            })
            .sum::<f64>()
            .sqrt();
        BoundNorms { l_inf_combined_bounds: l_inf, l2_combined_bounds: l2, l_inf_componentwise_bound: 1.0 }
    }

    /// Computes a full `IterationStats` snapshot for the current iterate
    /// and running average.
    fn snapshot(&self, iteration: u64, restart_used: bool) -> IterationStats {
        let current = self.convergence_info(&self.state.x, &self.state.y, &self.state.aty, &self.scaling, PointType::Current);
        let avg_x = self.state.primal_avg.avg().to_vec();
        let avg_y = self.state.dual_avg.avg().to_vec();
        let avg_aty = self.qp.transpose_matvec(&avg_y);
        let average = self.convergence_info(&avg_x, &avg_y, &avg_aty, &self.scaling, PointType::Average);

        IterationStats {
            iteration_number: iteration,
            cumulative_kkt_matrix_passes: self.cumulative_kkt_matrix_passes,
            cumulative_time_seconds: self.started_at.elapsed().as_secs_f64(),
            cumulative_rejected_steps: self.state.cumulative_rejected_steps,
            step_size: self.state.step_size,
            primal_weight: self.state.primal_weight,
            restart_used,
            convergence_information: vec![average, current],
            infeasibility_information: Vec::new(),
            point_metadata: vec![PointMetadata {
                active_primal_variable_count: self.state.x.iter().filter(|v| v.is_finite() && **v != 0.0).count(),
                active_dual_variable_count: self.state.y.iter().filter(|v| **v != 0.0).count(),
                active_primal_variable_change: 0,
                active_dual_variable_change: 0,
                random_primal_projection: Vec::new(),
                random_dual_projection: Vec::new(),
            }],
        }
    }

    fn convergence_info(&self, x: &[f64], y: &[f64], aty: &[f64], scaling: &ScalingVectors, candidate_type: PointType) -> ConvergenceInformation {
        let data = self.qp.qp();
        let ax = self.qp.matvec(x);
        let eps_ratio = self.params.eps_ratio();
        let _ = eps_ratio;

        let primal = primal_residuals(self.qp, scaling, &ax, 1.0);

        let gradient: Vec<f64> = (0..data.num_variables())
            .map(|j| {
                let q_jj = data.quadratic_diag.as_ref().map_or(0.0, |q| q[j]);
                data.objective[j] + q_jj * x[j] - aty[j]
            })
            .collect();
        let (dual_l_inf, dual_l2, dual_l_inf_cw, correction) = dual_residuals_and_correction(
            self.qp,
            scaling,
            x,
            &gradient,
            if self.params.handle_some_primal_gradients_on_finite_bounds_as_residuals {
                EffectiveBoundPolicy::Lazy
            } else {
                EffectiveBoundPolicy::Strict
            },
            1.0,
        );
        let (_, _, _, strict_correction) = dual_residuals_and_correction(self.qp, scaling, x, &gradient, EffectiveBoundPolicy::Strict, 1.0);

        let cx: f64 = data.objective.iter().zip(x.iter()).map(|(c, xv)| c * xv).sum();
        let quad: f64 = data.quadratic_diag.as_ref().map(|q| q.iter().zip(x.iter()).map(|(qj, xv)| 0.5 * qj * xv * xv).sum()).unwrap_or(0.0);
        let primal_objective = cx + quad;

        let y_bound_term: f64 = (0..data.num_constraints())
            .map(|i| {
                if data.constraint_lower_bounds[i].is_finite() && y[i] > 0.0 {
                    y[i] * data.constraint_lower_bounds[i]
                } else if data.constraint_upper_bounds[i].is_finite() && y[i] < 0.0 {
                    y[i] * data.constraint_upper_bounds[i]
                } else {
                    0.0
                }
            })
            .sum();
        let dual_objective = y_bound_term + correction - quad;
        let corrected_dual_objective = y_bound_term + strict_correction - quad;

        ConvergenceInformation {
            candidate_type,
            primal_objective,
            dual_objective,
            corrected_dual_objective,
            l_inf_primal_residual: primal.l_inf,
            l2_primal_residual: primal.l2,
            l_inf_componentwise_primal_residual: primal.l_inf_componentwise,
            l_inf_dual_residual: dual_l_inf,
            l2_dual_residual: dual_l2,
            l_inf_componentwise_dual_residual: dual_l_inf_cw,
            l_inf_primal_variable: x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())),
            l2_primal_variable: x.iter().map(|v| v * v).sum::<f64>().sqrt(),
        }
    }

    fn finish(&self, reason: TerminationReason, point_type: PointType, last: IterationStats, history: Vec<IterationStats>) -> SolverResult {
        let (x, y) = match point_type {
            PointType::Average => (self.state.primal_avg.avg().to_vec(), self.state.dual_avg.avg().to_vec()),
            _ => (self.state.x.clone(), self.state.y.clone()),
        };
        let objective_value = last.convergence_information.last().map(|c| c.primal_objective).unwrap_or(f64::NAN);
        let reduced_costs = (0..self.qp.qp().num_variables())
            .map(|j| {
                let q_jj = self.qp.qp().quadratic_diag.as_ref().map_or(0.0, |q| q[j]);
                self.qp.qp().objective[j] + q_jj * x[j] - self.qp.transpose_matvec(&y)[j]
            })
            .collect();

        SolverResult {
            termination_reason: reason,
            primal_solution: x,
            dual_solution: y,
            reduced_costs,
            objective_value,
            point_type,
            iteration_stats: history,
            solve_time_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

/// The primal-feasibility-polishing subproblem: same feasible region, zero
/// objective, so PDHG is driven purely to kill the primal residual.
fn primal_feasibility_subproblem(qp: &QuadraticProgram) -> QuadraticProgram {
    QuadraticProgram {
        objective: vec![0.0; qp.num_variables()],
        quadratic_diag: None,
        constraint_matrix: qp.constraint_matrix.clone(),
        constraint_lower_bounds: qp.constraint_lower_bounds.clone(),
        constraint_upper_bounds: qp.constraint_upper_bounds.clone(),
        variable_lower_bounds: qp.variable_lower_bounds.clone(),
        variable_upper_bounds: qp.variable_upper_bounds.clone(),
        objective_offset: 0.0,
        objective_scale: 1.0,
        problem_name: qp.problem_name.clone(),
        variable_names: qp.variable_names.clone(),
        constraint_names: qp.constraint_names.clone(),
    }
}

/// The dual-feasibility-polishing subproblem: same objective, but every
/// finite bound is "homogenized" to zero (infinite bounds stay infinite),
/// so a dual solution that's feasible here corresponds to a dual ray of
/// the original problem.
fn dual_feasibility_subproblem(qp: &QuadraticProgram) -> QuadraticProgram {
    let homogenize = |v: &[f64]| v.iter().map(|b| if b.is_finite() { 0.0 } else { *b }).collect::<Vec<f64>>();
    QuadraticProgram {
        objective: qp.objective.clone(),
        quadratic_diag: qp.quadratic_diag.clone(),
        constraint_matrix: qp.constraint_matrix.clone(),
        constraint_lower_bounds: homogenize(&qp.constraint_lower_bounds),
        constraint_upper_bounds: homogenize(&qp.constraint_upper_bounds),
        variable_lower_bounds: homogenize(&qp.variable_lower_bounds),
        variable_upper_bounds: homogenize(&qp.variable_upper_bounds),
        objective_offset: 0.0,
        objective_scale: 1.0,
        problem_name: qp.problem_name.clone(),
        variable_names: qp.variable_names.clone(),
        constraint_names: qp.constraint_names.clone(),
    }
}

fn diff(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

fn l2(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn finite_abs(v: f64) -> f64 {
    if v.is_finite() {
        v.abs()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LinesearchRule;
    use crate::sharder::SingleThreadScheduler;
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
    fn solver_runs_a_few_iterations_without_panicking() {
        let qp = bounded_lp();
        let sqp = ShardedQuadraticProgram::new(qp, Box::new(SingleThreadScheduler), 1);
        let mut params = SolverParams { linesearch_rule: LinesearchRule::Adaptive, iteration_limit: 50, ..SolverParams::default() };
        params.termination_check_frequency = 10;
        params.major_iteration_frequency = 10;

        let mut solver = Solver::new(&sqp, params, vec![0.0, 0.0], vec![0.0], Arc::new(AtomicBool::new(false))).unwrap();
        let result = solver.solve().unwrap();
        assert!(result.primal_solution.len() == 2);
    }

    #[test]
    fn polishing_on_qp_is_rejected() {
        let mut qp = bounded_lp();
        qp.quadratic_diag = Some(vec![1.0, 1.0]);
        let sqp = ShardedQuadraticProgram::new(qp, Box::new(SingleThreadScheduler), 1);
        let params = SolverParams { use_feasibility_polishing: true, ..SolverParams::default() };
        let result = Solver::new(&sqp, params, vec![0.0, 0.0], vec![0.0], Arc::new(AtomicBool::new(false)));
        assert!(matches!(result, Err(SolverError::InvalidParameter(InvalidParameterError::PolishingRequiresLp))));
    }
}
