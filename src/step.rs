//! PDHG inner step: primal/dual coordinate updates and
//! the three step-size policies, dispatched via `enum_dispatch` as a
//! sealed enum rather than a `Box<dyn Trait>` virtual-dispatched per
//! iteration.

use enum_dispatch::enum_dispatch;

use crate::error::NumericalError;
use crate::linalg::ShardedWeightedAverage;
use crate::rng::{Mt19937, DETERMINISTIC_SEED};
use crate::sharded_qp::ShardedQuadraticProgram;

/// Iteration state mutated in place by every accepted step.
pub struct PdhgState {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub aty: Vec<f64>,
    pub step_size: f64,
    pub primal_weight: f64,
    pub x0: Vec<f64>,
    pub y0: Vec<f64>,
    pub primal_avg: ShardedWeightedAverage,
    pub dual_avg: ShardedWeightedAverage,
    pub ratio_last_two_step_sizes: f64,
    pub cumulative_rejected_steps: u64,
    pub attempted_step_index: u64,
}

impl PdhgState {
    pub fn new(x: Vec<f64>, y: Vec<f64>, aty: Vec<f64>, step_size: f64, primal_weight: f64) -> Self {
        let n = x.len();
        let m = y.len();
        Self {
            x0: x.clone(),
            y0: y.clone(),
            primal_avg: ShardedWeightedAverage::new(n),
            dual_avg: ShardedWeightedAverage::new(m),
            x,
            y,
            aty,
            step_size,
            primal_weight,
            ratio_last_two_step_sizes: 1.0,
            cumulative_rejected_steps: 0,
            attempted_step_index: 0,
        }
    }
}

/// `x⁺_j = clamp(x_j - η_p (c_j + Q_jj x_j - (Aᵀy)_j)) / (1 + η_p Q_jj)`,
/// the closed-form diagonal-QP primal coordinate update.
pub fn primal_update(qp: &ShardedQuadraticProgram, x: &[f64], aty: &[f64], eta_p: f64) -> Vec<f64> {
    let data = qp.qp();
    (0..data.num_variables())
        .map(|j| {
            let q_jj = data.quadratic_diag.as_ref().map_or(0.0, |q| q[j]);
            let raw = x[j] - eta_p * (data.objective[j] - aty[j]);
            let denom = 1.0 + eta_p * q_jj;
            (raw / denom).clamp(data.variable_lower_bounds[j], data.variable_upper_bounds[j])
        })
        .collect()
}

/// `y⁺ = min(0, tmp + η_d u_c) + max(0, tmp + η_d l_c)` where `tmp = y -
/// η_d (A x̃)`. The two terms never overlap
/// (at most one is nonzero), so the sum is exactly the two-sided clamp;
/// an infinite bound makes its own term vanish.
pub fn dual_update(qp: &ShardedQuadraticProgram, y: &[f64], x_tilde: &[f64], eta_d: f64) -> Vec<f64> {
    let data = qp.qp();
    let ax_tilde = qp.matvec(x_tilde);
    (0..data.num_constraints())
        .map(|i| {
            let tmp = y[i] - eta_d * ax_tilde[i];
            let (l, u) = (data.constraint_lower_bounds[i], data.constraint_upper_bounds[i]);
            let upper_part = if u.is_finite() { (tmp + eta_d * u).min(0.0) } else { 0.0 };
            let lower_part = if l.is_finite() { (tmp + eta_d * l).max(0.0) } else { 0.0 };
            upper_part + lower_part
        })
        .collect()
}

/// `M = ½ω‖Δx‖² + ½ω⁻¹‖Δy‖²`.
pub fn movement(dx: &[f64], dy: &[f64], omega: f64) -> f64 {
    let dx2: f64 = dx.iter().map(|v| v * v).sum();
    let dy2: f64 = dy.iter().map(|v| v * v).sum();
    0.5 * omega * dx2 + 0.5 * dy2 / omega
}

/// `N = -Δx · (Aᵀy⁺ - Aᵀy)`.
pub fn nonlinearity(dx: &[f64], d_aty: &[f64]) -> f64 {
    -dx.iter().zip(d_aty.iter()).map(|(a, b)| a * b).sum::<f64>()
}

/// Above this movement, the iteration is declared numerically divergent.
pub const DIVERGENCE_THRESHOLD: f64 = 1e100;

fn check_movement(m: f64, iteration: usize) -> Result<(), NumericalError> {
    if m == 0.0 {
        return Err(NumericalError::NoMovement { iteration });
    }
    if m > DIVERGENCE_THRESHOLD {
        return Err(NumericalError::Diverged { iteration, value: m });
    }
    Ok(())
}

/// The outcome of one accepted step, folded into `PdhgState` averages by
/// the caller.
pub struct StepOutcome {
    pub eta_used: f64,
}

#[enum_dispatch]
pub trait StepRule {
    /// Performs one full accepted step (retrying internally for adaptive
    /// rules), mutating `state` in place.
    fn take_step(&mut self, qp: &ShardedQuadraticProgram, state: &mut PdhgState, iteration: usize) -> Result<StepOutcome, NumericalError>;
}

/// Folds an accepted step's `(x, y, Aᵀy)` into `state`, updating both
/// running averages with weight `eta` and advancing `x0`/`y0` bookkeeping
/// is left to the restart logic in `restart.rs`.
pub fn commit_step_with(
    primal_sharder: &crate::sharder::Sharder,
    dual_sharder: &crate::sharder::Sharder,
    scheduler: &dyn crate::sharder::Scheduler,
    state: &mut PdhgState,
    x_new: Vec<f64>,
    y_new: Vec<f64>,
    aty_new: Vec<f64>,
    eta: f64,
) {
    state.primal_avg.add(primal_sharder, scheduler, &x_new, eta);
    state.dual_avg.add(dual_sharder, scheduler, &y_new, eta);
    state.x = x_new;
    state.y = y_new;
    state.aty = aty_new;
    state.step_size = eta;
}

/// Rule 1: constant step size, `η = initial_step_size_scaling /
/// σ_max(A)`, with `σ_max` estimated once via randomized power iteration
/// and never revisited.
pub struct ConstantStep {
    pub eta: f64,
}

impl ConstantStep {
    /// Estimates `σ_max(A)` via `iterations` rounds of randomized power
    /// iteration seeded deterministically, then sets `η = scaling / σ_max`.
    pub fn estimate(qp: &ShardedQuadraticProgram, scaling: f64, iterations: usize) -> Self {
        let n = qp.qp().num_variables();
        let mut rng = Mt19937::new(DETERMINISTIC_SEED);
        let mut v = rng.standard_normal_vector(n);
        normalize(&mut v);
        let mut sigma = 1.0;
        for _ in 0..iterations.max(1) {
            let av = qp.matvec(&v);
            let ata_v = qp.transpose_matvec(&av);
            let norm = ata_v.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm == 0.0 {
                sigma = 0.0;
                break;
            }
            sigma = norm.sqrt();
            v = ata_v.iter().map(|x| x / norm).collect();
        }
        let eta = if sigma > 0.0 { scaling / sigma } else { scaling };
        Self { eta }
    }
}

fn normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

impl StepRule for ConstantStep {
    fn take_step(&mut self, qp: &ShardedQuadraticProgram, state: &mut PdhgState, iteration: usize) -> Result<StepOutcome, NumericalError> {
        let eta = self.eta;
        let eta_p = eta / state.primal_weight;
        let eta_d = eta * state.primal_weight;

        let x_new = primal_update(qp, &state.x, &state.aty, eta_p);
        let x_tilde: Vec<f64> = x_new.iter().zip(state.x.iter()).map(|(xn, xo)| xn + (xn - xo)).collect();
        let y_new = dual_update(qp, &state.y, &x_tilde, eta_d);
        let aty_new = qp.transpose_matvec(&y_new);

        let dx: Vec<f64> = x_new.iter().zip(state.x.iter()).map(|(a, b)| a - b).collect();
        let dy: Vec<f64> = y_new.iter().zip(state.y.iter()).map(|(a, b)| a - b).collect();
        let m = movement(&dx, &dy, state.primal_weight);
        check_movement(m, iteration)?;

        commit_step_with(qp.primal_sharder(), qp.dual_sharder(), qp.scheduler(), state, x_new, y_new, aty_new, eta);
        Ok(StepOutcome { eta_used: eta })
    }
}

/// Rule 2: adaptive (Auslender-Teboulle) step size. A trial is accepted
/// iff `η ≤ M/N` (unconditionally when `N ≤ 0`); `η` is always updated
/// after the trial toward `min((1-(k+1)^-α_red)·(M/N), (1+(k+1)^-α_grow)·η)`.
pub struct AdaptiveStep {
    pub alpha_reduce: f64,
    pub alpha_grow: f64,
}

impl Default for AdaptiveStep {
    fn default() -> Self {
        Self { alpha_reduce: 0.3, alpha_grow: 0.3 }
    }
}

impl StepRule for AdaptiveStep {
    fn take_step(&mut self, qp: &ShardedQuadraticProgram, state: &mut PdhgState, iteration: usize) -> Result<StepOutcome, NumericalError> {
        loop {
            let eta = state.step_size;
            let eta_p = eta / state.primal_weight;
            let eta_d = eta * state.primal_weight;

            let x_new = primal_update(qp, &state.x, &state.aty, eta_p);
            let x_tilde: Vec<f64> = x_new.iter().zip(state.x.iter()).map(|(xn, xo)| xn + (xn - xo)).collect();
            let y_new = dual_update(qp, &state.y, &x_tilde, eta_d);
            let aty_new = qp.transpose_matvec(&y_new);

            let dx: Vec<f64> = x_new.iter().zip(state.x.iter()).map(|(a, b)| a - b).collect();
            let dy: Vec<f64> = y_new.iter().zip(state.y.iter()).map(|(a, b)| a - b).collect();
            let d_aty: Vec<f64> = aty_new.iter().zip(state.aty.iter()).map(|(a, b)| a - b).collect();

            let m = movement(&dx, &dy, state.primal_weight);
            let n = nonlinearity(&dx, &d_aty);

            let k = state.attempted_step_index;
            state.attempted_step_index += 1;
            let k1 = (k + 1) as f64;

            let accepted = n <= 0.0 || eta <= m / n;

            let m_over_n = if n > 0.0 { m / n } else { f64::INFINITY };
            let candidate_shrunk = (1.0 - k1.powf(-self.alpha_reduce)) * m_over_n;
            let candidate_grown = (1.0 + k1.powf(-self.alpha_grow)) * eta;
            let next_step_size = candidate_shrunk.min(candidate_grown).max(f64::MIN_POSITIVE);
            state.step_size = next_step_size;

            if accepted {
                check_movement(m, iteration)?;
                commit_step_with(qp.primal_sharder(), qp.dual_sharder(), qp.scheduler(), state, x_new, y_new, aty_new, eta);
                state.step_size = next_step_size;
                return Ok(StepOutcome { eta_used: eta });
            }
            state.cumulative_rejected_steps += 1;
        }
    }
}

/// Rule 3: Malitsky-Pock linesearch. Tries `η⁺ = η(1 + s(√(1+ratio) -
/// 1))`, solves only the dual update with extrapolation factor `η⁺/η`,
/// accepts iff `ω η⁺ ‖Aᵀy⁺ - Aᵀy‖ ≤ c‖Δy‖`, else shrinks `η⁺ ← β η⁺` and
/// retries (cap 60).
pub struct MalitskyPockStep {
    pub s: f64,
    pub c: f64,
    pub beta: f64,
}

impl Default for MalitskyPockStep {
    fn default() -> Self {
        Self { s: 0.7, c: 0.99, beta: 0.7 }
    }
}

const MALITSKY_POCK_MAX_INNER_ITERATIONS: usize = 60;

impl StepRule for MalitskyPockStep {
    fn take_step(&mut self, qp: &ShardedQuadraticProgram, state: &mut PdhgState, iteration: usize) -> Result<StepOutcome, NumericalError> {
        let eta = state.step_size;
        let eta_p = eta / state.primal_weight;
        let x_new = primal_update(qp, &state.x, &state.aty, eta_p);
        let dx: Vec<f64> = x_new.iter().zip(state.x.iter()).map(|(a, b)| a - b).collect();

        let mut eta_plus = eta * (1.0 + self.s * ((1.0 + state.ratio_last_two_step_sizes).sqrt() - 1.0));

        for _ in 0..MALITSKY_POCK_MAX_INNER_ITERATIONS {
            let theta = eta_plus / eta;
            let x_tilde: Vec<f64> = x_new.iter().zip(dx.iter()).map(|(xn, d)| xn + theta * d).collect();
            let eta_d = eta_plus * state.primal_weight;
            let y_new = dual_update(qp, &state.y, &x_tilde, eta_d);
            let aty_new = qp.transpose_matvec(&y_new);

            let dy: Vec<f64> = y_new.iter().zip(state.y.iter()).map(|(a, b)| a - b).collect();
            let d_aty: Vec<f64> = aty_new.iter().zip(state.aty.iter()).map(|(a, b)| a - b).collect();

            let lhs = state.primal_weight * eta_plus * d_aty.iter().map(|v| v * v).sum::<f64>().sqrt();
            let rhs = self.c * dy.iter().map(|v| v * v).sum::<f64>().sqrt();

            if lhs <= rhs {
                let m = movement(&dx, &dy, state.primal_weight);
                check_movement(m, iteration)?;
                state.ratio_last_two_step_sizes = eta_plus / eta;
                commit_step_with(qp.primal_sharder(), qp.dual_sharder(), qp.scheduler(), state, x_new, y_new, aty_new, eta_plus);
                return Ok(StepOutcome { eta_used: eta_plus });
            }
            eta_plus *= self.beta;
        }
        Err(NumericalError::LineSearchStalled)
    }
}

#[enum_dispatch(StepRule)]
pub enum StepPolicy {
    Constant(ConstantStep),
    Adaptive(AdaptiveStep),
    MalitskyPock(MalitskyPockStep),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qp::QuadraticProgram;
    use crate::sharder::SingleThreadScheduler;
    use crate::sparse::{CscMatrix, Triplet};

    fn toy_lp() -> ShardedQuadraticProgram {
        let qp = QuadraticProgram {
            objective: vec![1.0, -1.0],
            quadratic_diag: None,
            constraint_matrix: CscMatrix::from_triplets(1, 2, &[Triplet::new(0, 0, 1.0), Triplet::new(0, 1, 1.0)]),
            constraint_lower_bounds: vec![0.0],
            constraint_upper_bounds: vec![5.0],
            variable_lower_bounds: vec![0.0, 0.0],
            variable_upper_bounds: vec![10.0, 10.0],
            objective_offset: 0.0,
            objective_scale: 1.0,
            problem_name: None,
            variable_names: None,
            constraint_names: None,
        };
        ShardedQuadraticProgram::new(qp, Box::new(SingleThreadScheduler), 1)
    }

    #[test]
    fn primal_update_clamps_to_bounds() {
        let sqp = toy_lp();
        let x = vec![0.0, 0.0];
        let aty = vec![0.0, 0.0];
        let x_new = primal_update(&sqp, &x, &aty, 100.0);
        assert!(x_new[0] >= 0.0 && x_new[0] <= 10.0);
        assert!(x_new[1] >= 0.0 && x_new[1] <= 10.0);
    }

    #[test]
    fn movement_is_zero_only_when_no_change() {
        assert_eq!(movement(&[0.0, 0.0], &[0.0, 0.0], 1.0), 0.0);
        assert!(movement(&[1.0], &[0.0], 1.0) > 0.0);
    }

    #[test]
    fn constant_step_estimate_is_positive() {
        let sqp = toy_lp();
        let step = ConstantStep::estimate(&sqp, 1.0, 20);
        assert!(step.eta > 0.0);
    }

    #[test]
    fn constant_step_take_step_commits_without_error() {
        let sqp = toy_lp();
        let mut step = ConstantStep::estimate(&sqp, 0.1, 10);
        let aty0 = sqp.transpose_matvec(&[0.0]);
        let mut state = PdhgState::new(vec![1.0, 1.0], vec![0.0], aty0, step.eta, 1.0);
        let outcome = step.take_step(&sqp, &mut state, 0);
        assert!(outcome.is_ok());
    }
}
