//! Convergence/infeasibility diagnostics and residual computation.
//! Grounded in `ortools/pdlp/iteration_stats.h`; struct-of-getters style
//! follows `qp::QPSolverResult` / `nlp::NLPSolverResult`'s result types.

use crate::result::PointType;
use crate::sharded_qp::{ScalingVectors, ShardedQuadraticProgram};

/// How a finite variable bound is treated when splitting the primal
/// gradient into a dual residual vs. a reduced-cost correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectiveBoundPolicy {
    #[default]
    Strict,
    /// A finite bound `b` is treated as infinite when `|x_j - b| > |x_j|`.
    Lazy,
}

/// Per-iterate convergence diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceInformation {
    pub candidate_type: PointType,
    pub primal_objective: f64,
    pub dual_objective: f64,
    pub corrected_dual_objective: f64,
    pub l_inf_primal_residual: f64,
    pub l2_primal_residual: f64,
    pub l_inf_componentwise_primal_residual: f64,
    pub l_inf_dual_residual: f64,
    pub l2_dual_residual: f64,
    pub l_inf_componentwise_dual_residual: f64,
    pub l_inf_primal_variable: f64,
    pub l2_primal_variable: f64,
}

/// Residuals of a candidate infeasibility ray.
#[derive(Debug, Clone, Copy)]
pub struct InfeasibilityInformation {
    pub candidate_type: PointType,
    pub primal_ray_quadratic_norm: f64,
    pub primal_ray_linear_objective: f64,
    pub max_primal_ray_infeasibility: f64,
    pub dual_ray_objective: f64,
    pub max_dual_ray_infeasibility: f64,
}

/// Per-iteration bookkeeping: active-set sizes and their drift since the
/// last restart, plus random projections of the iterate used by the
/// adaptive restart heuristics.
#[derive(Debug, Clone)]
pub struct PointMetadata {
    pub active_primal_variable_count: usize,
    pub active_dual_variable_count: usize,
    pub active_primal_variable_change: i64,
    pub active_dual_variable_change: i64,
    pub random_primal_projection: Vec<f64>,
    pub random_dual_projection: Vec<f64>,
}

/// Snapshot emitted after every termination check or restart.
#[derive(Debug, Clone)]
pub struct IterationStats {
    pub iteration_number: u64,
    pub cumulative_kkt_matrix_passes: f64,
    pub cumulative_time_seconds: f64,
    pub cumulative_rejected_steps: u64,
    pub step_size: f64,
    pub primal_weight: f64,
    pub restart_used: bool,
    pub convergence_information: Vec<ConvergenceInformation>,
    pub infeasibility_information: Vec<InfeasibilityInformation>,
    pub point_metadata: Vec<PointMetadata>,
}

/// `distance(value, [lo, hi])`: 0 inside the interval, signed excess
/// outside it.
fn bound_distance(value: f64, lo: f64, hi: f64) -> f64 {
    if value < lo {
        value - lo
    } else if value > hi {
        value - hi
    } else {
        0.0
    }
}

/// `residual / (offset + |bound|)`, with the exact-zero numerator case
/// handled so a `0/0` never occurs.
fn componentwise_ratio(residual: f64, bound_magnitude: f64, offset: f64) -> f64 {
    if residual == 0.0 {
        0.0
    } else {
        residual / (offset + bound_magnitude)
    }
}

/// The scaled→unscaled primal residual vector `(Ax - proj_{[l_c,u_c]}(Ax))
/// / D_row`, plus its L∞/L2/componentwise-L∞ reductions.
pub struct PrimalResiduals {
    pub l_inf: f64,
    pub l2: f64,
    pub l_inf_componentwise: f64,
}

pub fn primal_residuals(
    sharded_qp: &ShardedQuadraticProgram,
    scaling: &ScalingVectors,
    ax: &[f64],
    componentwise_offset: f64,
) -> PrimalResiduals {
    let qp = sharded_qp.qp();
    let m = qp.num_constraints();
    let mut l_inf = 0.0_f64;
    let mut l2_sq = 0.0_f64;
    let mut l_inf_cw = 0.0_f64;
    for i in 0..m {
        let raw = bound_distance(ax[i], qp.constraint_lower_bounds[i], qp.constraint_upper_bounds[i]);
        let unscaled = raw / scaling.d_row[i];
        l_inf = l_inf.max(unscaled.abs());
        l2_sq += unscaled * unscaled;
        let combined_bound = finite_abs(qp.constraint_lower_bounds[i]).max(finite_abs(qp.constraint_upper_bounds[i]));
        l_inf_cw = l_inf_cw.max(componentwise_ratio(unscaled, combined_bound, componentwise_offset).abs());
    }
    PrimalResiduals { l_inf, l2: l2_sq.sqrt(), l_inf_componentwise: l_inf_cw }
}

fn finite_abs(v: f64) -> f64 {
    if v.is_finite() {
        v.abs()
    } else {
        0.0
    }
}

/// Splits the primal gradient `g = c + Q x - Aᵀ y` into a dual-residual
/// contribution and a dual-objective correction, per the effective bound
/// policy.
///
/// Returns `(l_inf_dual_residual, l2_dual_residual, l_inf_componentwise,
/// objective_correction)`.
pub fn dual_residuals_and_correction(
    sharded_qp: &ShardedQuadraticProgram,
    scaling: &ScalingVectors,
    x: &[f64],
    gradient: &[f64],
    policy: EffectiveBoundPolicy,
    componentwise_offset: f64,
) -> (f64, f64, f64, f64) {
    let qp = sharded_qp.qp();
    let n = qp.num_variables();
    let mut l_inf = 0.0_f64;
    let mut l2_sq = 0.0_f64;
    let mut l_inf_cw = 0.0_f64;
    let mut correction = 0.0_f64;

    for j in 0..n {
        let g = gradient[j];
        if g == 0.0 {
            continue;
        }
        let (lo, hi) = (qp.variable_lower_bounds[j], qp.variable_upper_bounds[j]);
        // The gradient's direction: g > 0 pressures x toward its lower
        // bound, g < 0 toward its upper bound.
        let (bound, bound_is_finite) = if g > 0.0 { (lo, lo.is_finite()) } else { (hi, hi.is_finite()) };

        let effective_infinite = match policy {
            EffectiveBoundPolicy::Strict => !bound_is_finite,
            EffectiveBoundPolicy::Lazy => !bound_is_finite || (x[j] - bound).abs() > x[j].abs(),
        };

        if effective_infinite {
            let unscaled = g / scaling.d_col[j];
            l_inf = l_inf.max(unscaled.abs());
            l2_sq += unscaled * unscaled;
            l_inf_cw = l_inf_cw.max(componentwise_ratio(unscaled, finite_abs(bound), componentwise_offset).abs());
        } else {
            correction += bound * g;
        }
    }

    (l_inf, l2_sq.sqrt(), l_inf_cw, correction)
}

/// A feasible recession direction must point away from any finite bound:
/// nonnegative where only `lo` is finite, nonpositive where only `hi` is
/// finite, zero where both are finite, unconstrained where neither is.
fn ray_bound_violation(value: f64, lo: f64, hi: f64) -> f64 {
    if lo.is_finite() && hi.is_finite() {
        value
    } else if lo.is_finite() {
        value.min(0.0)
    } else if hi.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Computes [`InfeasibilityInformation`] by treating the raw iterate
/// `(x, y)` itself as a candidate recession-cone direction, normalized by
/// its own unscaled L-infinity norm so the reported quantities do not grow
/// with how far PDHG has drifted along the ray. Grounded in
/// `ortools/pdlp/iteration_stats.cc`'s `ComputeInfeasibilityInformation`.
/// Whether the candidate actually clears the infeasibility bar is decided
/// separately by `check_primal_infeasibility`/`check_dual_infeasibility`.
pub fn compute_infeasibility_information(
    sharded_qp: &ShardedQuadraticProgram,
    scaling: &ScalingVectors,
    x: &[f64],
    y: &[f64],
    aty: &[f64],
    candidate_type: PointType,
) -> InfeasibilityInformation {
    let qp = sharded_qp.qp();

    let x_unscaled: Vec<f64> = x.iter().zip(scaling.d_col.iter()).map(|(v, d)| v / d).collect();
    let l_inf_primal = x_unscaled.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(f64::MIN_POSITIVE);

    let primal_ray_linear_objective = qp.objective.iter().zip(x_unscaled.iter()).map(|(c, v)| c * v).sum::<f64>() / l_inf_primal;
    let primal_ray_quadratic_norm = qp
        .quadratic_diag
        .as_ref()
        .map(|q| q.iter().zip(x_unscaled.iter()).fold(0.0_f64, |acc, (qj, v)| acc.max((qj * v).abs())))
        .unwrap_or(0.0)
        / l_inf_primal;

    let ax = sharded_qp.matvec(x);
    let max_primal_ray_infeasibility = (0..qp.num_constraints())
        .fold(0.0_f64, |acc, i| {
            let unscaled = ax[i] / scaling.d_row[i];
            acc.max(ray_bound_violation(unscaled, qp.constraint_lower_bounds[i], qp.constraint_upper_bounds[i]).abs())
        })
        / l_inf_primal;

    let y_unscaled: Vec<f64> = y.iter().zip(scaling.d_row.iter()).map(|(v, d)| v * d).collect();
    let l_inf_dual = y_unscaled.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(f64::MIN_POSITIVE);

    let y_bound_term: f64 = (0..qp.num_constraints())
        .map(|i| {
            if qp.constraint_lower_bounds[i].is_finite() && y_unscaled[i] > 0.0 {
                y_unscaled[i] * qp.constraint_lower_bounds[i]
            } else if qp.constraint_upper_bounds[i].is_finite() && y_unscaled[i] < 0.0 {
                y_unscaled[i] * qp.constraint_upper_bounds[i]
            } else {
                0.0
            }
        })
        .sum();
    let gradient: Vec<f64> = (0..qp.num_variables()).map(|j| -aty[j]).collect();
    let (dual_l_inf, _, _, correction) = dual_residuals_and_correction(sharded_qp, scaling, x, &gradient, EffectiveBoundPolicy::Strict, 1.0);
    let dual_ray_objective = (y_bound_term + correction) / l_inf_dual;
    let max_dual_ray_infeasibility = dual_l_inf / l_inf_dual;

    InfeasibilityInformation {
        candidate_type,
        primal_ray_quadratic_norm,
        primal_ray_linear_objective,
        max_primal_ray_infeasibility,
        dual_ray_objective,
        max_dual_ray_infeasibility,
    }
}

/// `eps_ratio = eps_abs / eps_rel`.
pub fn eps_ratio(eps_abs: f64, eps_rel: f64) -> f64 {
    eps_abs / eps_rel
}

pub fn relative_residual(absolute: f64, eps_ratio: f64, norm: f64) -> f64 {
    absolute / (eps_ratio + norm)
}

pub fn relative_optimality_gap(primal_obj: f64, dual_obj: f64, eps_ratio: f64) -> f64 {
    (primal_obj - dual_obj).abs() / (eps_ratio + primal_obj.abs() + dual_obj.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_distance_is_zero_inside_interval() {
        assert_eq!(bound_distance(5.0, 0.0, 10.0), 0.0);
        assert_eq!(bound_distance(-1.0, 0.0, 10.0), -1.0);
        assert_eq!(bound_distance(11.0, 0.0, 10.0), 1.0);
    }

    #[test]
    fn componentwise_ratio_avoids_zero_over_zero() {
        assert_eq!(componentwise_ratio(0.0, 0.0, 0.0), 0.0);
        assert!(componentwise_ratio(1.0, 0.0, 0.0).is_finite());
    }

    #[test]
    fn eps_ratio_divides_abs_by_rel() {
        assert_eq!(eps_ratio(1e-6, 1e-4), 1e-2);
    }

    #[test]
    fn relative_optimality_gap_is_symmetric() {
        let g1 = relative_optimality_gap(10.0, 9.0, 0.1);
        let g2 = relative_optimality_gap(9.0, 10.0, 0.1);
        assert!((g1 - g2).abs() < 1e-12);
    }

    #[test]
    fn primal_ray_detects_unbounded_direction() {
        use crate::sharded_qp::ShardedQuadraticProgram;
        use crate::sharder::SingleThreadScheduler;
        use crate::sparse::CscMatrix;

        let qp = crate::qp::QuadraticProgram {
            objective: vec![-1.0],
            quadratic_diag: None,
            constraint_matrix: CscMatrix::zeros(0, 1),
            constraint_lower_bounds: vec![],
            constraint_upper_bounds: vec![],
            variable_lower_bounds: vec![0.0],
            variable_upper_bounds: vec![f64::INFINITY],
            objective_offset: 0.0,
            objective_scale: 1.0,
            problem_name: None,
            variable_names: None,
            constraint_names: None,
        };
        let sqp = ShardedQuadraticProgram::new(qp, Box::new(SingleThreadScheduler), 1);
        let scaling = ScalingVectors::identity(1, 0);
        let info = compute_infeasibility_information(&sqp, &scaling, &[1.0], &[], &[0.0], PointType::Current);
        assert!(info.primal_ray_linear_objective < 0.0);
        assert_eq!(info.max_primal_ray_infeasibility, 0.0);
    }
}
