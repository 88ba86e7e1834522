//! Restart policies and the primal-weight update evaluated at every major
//! iteration.

use crate::params::RestartStrategy;
use crate::step::PdhgState;
use crate::trust_region::LocalizedLagrangianBounds;

/// What the restart check decided to do this major iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartChoice {
    NoRestart,
    RestartToCurrent,
    RestartToAverage,
}

/// Inputs the adaptive strategies need: localized-Lagrangian-bound
/// potentials for the current iterate and the running average, plus the
/// normalized distance moved this period and last period (distance-based
/// only).
pub struct RestartDecisionInputs {
    pub current_bounds: LocalizedLagrangianBounds,
    pub average_bounds: LocalizedLagrangianBounds,
    pub normalized_distance_this_period: f64,
    pub normalized_distance_last_period: f64,
    pub previous_trial_potential: Option<f64>,
}

fn normalized_potential(bounds: &LocalizedLagrangianBounds) -> f64 {
    let gap = bounds.upper_bound - bounds.lower_bound;
    if bounds.radius > 0.0 {
        gap / (bounds.radius * bounds.radius)
    } else {
        f64::INFINITY
    }
}

/// Evaluates the restart strategy named by `params`.
pub fn decide_restart(
    strategy: RestartStrategy,
    iteration: u64,
    major_iteration_frequency: u64,
    inputs: &RestartDecisionInputs,
    sufficient_reduction: f64,
    necessary_reduction: f64,
) -> RestartChoice {
    let is_major = major_iteration_frequency > 0 && iteration % major_iteration_frequency == 0 && iteration > 0;
    if !is_major {
        return RestartChoice::NoRestart;
    }

    match strategy {
        RestartStrategy::None => RestartChoice::RestartToCurrent,
        RestartStrategy::EveryMajor => RestartChoice::RestartToAverage,
        RestartStrategy::AdaptiveHeuristic => adaptive_heuristic(inputs, sufficient_reduction, necessary_reduction),
        RestartStrategy::AdaptiveDistance => adaptive_distance(inputs, sufficient_reduction, necessary_reduction),
    }
}

fn best_candidate(inputs: &RestartDecisionInputs) -> (RestartChoice, f64) {
    let current_potential = normalized_potential(&inputs.current_bounds);
    let average_potential = normalized_potential(&inputs.average_bounds);
    if current_potential <= average_potential {
        (RestartChoice::RestartToCurrent, current_potential)
    } else {
        (RestartChoice::RestartToAverage, average_potential)
    }
}

/// *Adaptive heuristic*: restart iff the normalized gap has shrunk by at
/// least `sufficient_reduction`, or by `necessary_reduction` and it is
/// worse than the previous trial.
fn adaptive_heuristic(inputs: &RestartDecisionInputs, sufficient_reduction: f64, necessary_reduction: f64) -> RestartChoice {
    let (candidate, potential) = best_candidate(inputs);
    let baseline = inputs.previous_trial_potential.unwrap_or(f64::INFINITY);
    if baseline <= 0.0 {
        return RestartChoice::NoRestart;
    }

    let reduction = 1.0 - potential / baseline;
    let should_restart = reduction >= sufficient_reduction
        || (reduction >= necessary_reduction && potential > inputs.previous_trial_potential.unwrap_or(f64::INFINITY));

    if should_restart {
        candidate
    } else {
        RestartChoice::NoRestart
    }
}

/// *Adaptive distance-based*: compares the normalized distance moved this
/// period against the previous period; restarts at the potential-test
/// winner if it shrank by at least `sufficient_reduction`.
fn adaptive_distance(inputs: &RestartDecisionInputs, sufficient_reduction: f64, _necessary_reduction: f64) -> RestartChoice {
    if inputs.normalized_distance_last_period <= 0.0 {
        return RestartChoice::NoRestart;
    }
    let reduction = 1.0 - inputs.normalized_distance_this_period / inputs.normalized_distance_last_period;
    if reduction >= sufficient_reduction {
        best_candidate(inputs).0
    } else {
        RestartChoice::NoRestart
    }
}

/// Applies `choice` to `state`: restart-to-average replaces `x`/`y` with
/// the running averages and recomputes `Aᵀy`; either kind of restart
/// resets the averages and moves `x0`/`y0` to the post-restart point.
pub fn apply_restart(choice: RestartChoice, state: &mut PdhgState, recompute_aty: impl FnOnce(&[f64]) -> Vec<f64>) {
    match choice {
        RestartChoice::NoRestart => {}
        RestartChoice::RestartToCurrent => {
            state.x0 = state.x.clone();
            state.y0 = state.y.clone();
            state.primal_avg.clear();
            state.dual_avg.clear();
        }
        RestartChoice::RestartToAverage => {
            state.x = state.primal_avg.avg().to_vec();
            state.y = state.dual_avg.avg().to_vec();
            state.aty = recompute_aty(&state.y);
            state.x0 = state.x.clone();
            state.y0 = state.y.clone();
            state.primal_avg.clear();
            state.dual_avg.clear();
        }
    }
}

/// `ω_new = exp(s·ln(d_d/d_p) + (1-s)·ln(ω_old))` when both `d_p =
/// ‖x-x0‖₂` and `d_d = ‖y-y0‖₂` lie in `(1e-10, 1e10)`; otherwise `ω`
/// is left unchanged.
pub fn update_primal_weight(d_p: f64, d_d: f64, omega_old: f64, smoothing: f64) -> f64 {
    const LO: f64 = 1e-10;
    const HI: f64 = 1e10;
    if d_p > LO && d_p < HI && d_d > LO && d_d < HI {
        (smoothing * (d_d / d_p).ln() + (1.0 - smoothing) * omega_old.ln()).exp()
    } else {
        omega_old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(gap: f64, radius: f64) -> LocalizedLagrangianBounds {
        LocalizedLagrangianBounds { lagrangian_value: 0.0, lower_bound: 0.0, upper_bound: gap, radius }
    }

    #[test]
    fn non_major_iteration_never_restarts() {
        let inputs = RestartDecisionInputs {
            current_bounds: bounds(0.0, 1.0),
            average_bounds: bounds(0.0, 1.0),
            normalized_distance_this_period: 1.0,
            normalized_distance_last_period: 1.0,
            previous_trial_potential: None,
        };
        assert_eq!(decide_restart(RestartStrategy::EveryMajor, 5, 40, &inputs, 0.2, 0.8), RestartChoice::NoRestart);
    }

    #[test]
    fn every_major_always_restarts_to_average_on_major_iteration() {
        let inputs = RestartDecisionInputs {
            current_bounds: bounds(0.0, 1.0),
            average_bounds: bounds(0.0, 1.0),
            normalized_distance_this_period: 1.0,
            normalized_distance_last_period: 1.0,
            previous_trial_potential: None,
        };
        assert_eq!(decide_restart(RestartStrategy::EveryMajor, 40, 40, &inputs, 0.2, 0.8), RestartChoice::RestartToAverage);
    }

    #[test]
    fn none_strategy_restarts_to_current() {
        let inputs = RestartDecisionInputs {
            current_bounds: bounds(0.0, 1.0),
            average_bounds: bounds(0.0, 1.0),
            normalized_distance_this_period: 1.0,
            normalized_distance_last_period: 1.0,
            previous_trial_potential: None,
        };
        assert_eq!(decide_restart(RestartStrategy::None, 40, 40, &inputs, 0.2, 0.8), RestartChoice::RestartToCurrent);
    }

    #[test]
    fn primal_weight_unchanged_outside_valid_range() {
        assert_eq!(update_primal_weight(0.0, 1.0, 5.0, 0.5), 5.0);
        assert_eq!(update_primal_weight(1.0, 1e20, 5.0, 0.5), 5.0);
    }

    #[test]
    fn primal_weight_update_moves_toward_ratio() {
        let w = update_primal_weight(1.0, 1.0, 2.0, 1.0);
        assert!((w - 1.0).abs() < 1e-9);
    }
}
