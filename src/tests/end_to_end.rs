use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use problemo::Problem;

use crate::params::SolverParams;
use crate::preprocess::PreprocessSolver;
use crate::qp::QuadraticProgram;
use crate::result::TerminationReason;
use crate::sparse::{CscMatrix, Triplet};

fn params(iteration_limit: u64) -> SolverParams {
    SolverParams { iteration_limit, termination_check_frequency: 20, major_iteration_frequency: 20, ..SolverParams::default() }
}

fn solve(qp: QuadraticProgram, params: SolverParams) -> Result<crate::result::SolverResult, Problem> {
    PreprocessSolver::default().solve(qp, params, Arc::new(AtomicBool::new(false)))
}

fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want.iter()) {
        assert!((g - w).abs() < tol, "got {got:?}, want {want:?}");
    }
}

/// `min 5.5 x0 - 2x1 - x2 + x3 - 14`, one equality and three general
/// inequalities plus box bounds on x1, x2, x3.
#[test]
fn s1_bounded_lp_reaches_the_known_optimum() {
    let triplets = [
        Triplet::new(0, 0, 2.0),
        Triplet::new(0, 1, 1.0),
        Triplet::new(0, 2, 1.0),
        Triplet::new(0, 3, 2.0),
        Triplet::new(1, 0, 1.0),
        Triplet::new(1, 2, 1.0),
        Triplet::new(2, 0, 4.0),
        Triplet::new(3, 2, 1.5),
        Triplet::new(3, 3, -1.0),
    ];
    let qp = QuadraticProgram {
        objective: vec![5.5, -2.0, -1.0, 1.0],
        quadratic_diag: None,
        constraint_matrix: CscMatrix::from_triplets(4, 4, &triplets),
        constraint_lower_bounds: vec![12.0, f64::NEG_INFINITY, -4.0, -1.0],
        constraint_upper_bounds: vec![12.0, 7.0, f64::INFINITY, 1.0],
        variable_lower_bounds: vec![f64::NEG_INFINITY, -2.0, f64::NEG_INFINITY, 2.5],
        variable_upper_bounds: vec![f64::INFINITY, f64::INFINITY, 6.0, 3.5],
        objective_offset: -14.0,
        objective_scale: 1.0,
        problem_name: None,
        variable_names: None,
        constraint_names: None,
    };

    let result = solve(qp, params(20_000)).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Optimal);
    assert_close(&result.primal_solution, &[-1.0, 8.0, 1.0, 2.5], 1e-4);
    assert!((result.objective_value - (-34.0)).abs() < 1e-4);
}

/// Three `<=` constraints, all four variables boxed, two constraints tight
/// at the optimum and one slack.
#[test]
fn s2_small_lp_with_slack_constraint() {
    let triplets = [
        Triplet::new(0, 0, 1.0),
        Triplet::new(0, 3, 1.0),
        Triplet::new(1, 0, 1.0),
        Triplet::new(1, 2, 1.0),
        Triplet::new(2, 1, 1.0),
        Triplet::new(2, 2, 1.0),
    ];
    let qp = QuadraticProgram {
        objective: vec![4.5, 1.0, 3.0, -0.5],
        quadratic_diag: None,
        constraint_matrix: CscMatrix::from_triplets(3, 4, &triplets),
        constraint_lower_bounds: vec![f64::NEG_INFINITY; 3],
        constraint_upper_bounds: vec![3.0, 7.0, 20.0],
        variable_lower_bounds: vec![0.0, 0.0, 0.0, 0.0],
        variable_upper_bounds: vec![2.0, 5.0, 6.0, 2.0],
        objective_offset: -22.5,
        objective_scale: 1.0,
        problem_name: None,
        variable_names: None,
        constraint_names: None,
    };

    let result = solve(qp, params(20_000)).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Optimal);
    assert_close(&result.primal_solution, &[1.0, 0.0, 6.0, 2.0], 1e-4);
    assert!((result.objective_value - (-1.0)).abs() < 1e-4);
}

/// Diagonal QP: `min 2x0^2 + 0.5x1^2 - x0 - x1 + 5` with one general
/// constraint and box bounds, the bound on x0 active at the optimum.
#[test]
fn s3_diagonal_qp_reaches_the_known_optimum() {
    let triplets = [Triplet::new(0, 0, 1.0), Triplet::new(0, 1, 1.0)];
    let qp = QuadraticProgram {
        objective: vec![-1.0, -1.0],
        quadratic_diag: Some(vec![4.0, 1.0]),
        constraint_matrix: CscMatrix::from_triplets(1, 2, &triplets),
        constraint_lower_bounds: vec![f64::NEG_INFINITY],
        constraint_upper_bounds: vec![1.0],
        variable_lower_bounds: vec![1.0, -2.0],
        variable_upper_bounds: vec![2.0, 4.0],
        objective_offset: 5.0,
        objective_scale: 1.0,
        problem_name: None,
        variable_names: None,
        constraint_names: None,
    };

    let result = solve(qp, params(20_000)).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Optimal);
    assert_close(&result.primal_solution, &[1.0, 0.0], 1e-4);
    assert!((result.objective_value - 6.0).abs() < 1e-4);
    assert_close(&result.reduced_costs, &[4.0, 0.0], 1e-3);
}

/// `x0 - x1 <= 1` and `-x0 + x1 <= -2` together force `x0 - x1 >= 2` and
/// `x0 - x1 <= 1` at once: primal infeasible for any `x >= 0`.
#[test]
fn s4_contradictory_bounds_are_primal_infeasible() {
    let triplets = [
        Triplet::new(0, 0, 1.0),
        Triplet::new(0, 1, -1.0),
        Triplet::new(1, 0, -1.0),
        Triplet::new(1, 1, 1.0),
    ];
    let qp = QuadraticProgram {
        objective: vec![1.0, 1.0],
        quadratic_diag: None,
        constraint_matrix: CscMatrix::from_triplets(2, 2, &triplets),
        constraint_lower_bounds: vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
        constraint_upper_bounds: vec![1.0, -2.0],
        variable_lower_bounds: vec![0.0, 0.0],
        variable_upper_bounds: vec![f64::INFINITY, f64::INFINITY],
        objective_offset: 0.0,
        objective_scale: 1.0,
        problem_name: None,
        variable_names: None,
        constraint_names: None,
    };

    let result = solve(qp, params(20_000)).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::PrimalInfeasible);
}

/// `min -x0 - x1` is unbounded below along `x0 = x1 -> infinity`, which
/// both constraints tolerate: dual infeasible.
#[test]
fn s5_unbounded_objective_is_dual_infeasible() {
    let triplets = [
        Triplet::new(0, 0, 1.0),
        Triplet::new(0, 1, -1.0),
        Triplet::new(1, 0, -1.0),
        Triplet::new(1, 1, 1.0),
    ];
    let qp = QuadraticProgram {
        objective: vec![-1.0, -1.0],
        quadratic_diag: None,
        constraint_matrix: CscMatrix::from_triplets(2, 2, &triplets),
        constraint_lower_bounds: vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
        constraint_upper_bounds: vec![1.0, 2.0],
        variable_lower_bounds: vec![0.0, 0.0],
        variable_upper_bounds: vec![f64::INFINITY, f64::INFINITY],
        objective_offset: 0.0,
        objective_scale: 1.0,
        problem_name: None,
        variable_names: None,
        constraint_names: None,
    };

    let result = solve(qp, params(20_000)).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::DualInfeasible);
}

/// A constraint-matrix entry past the fatal magnitude threshold is
/// rejected by validation before a single PDHG iteration runs.
#[test]
fn s6_excessive_matrix_magnitude_is_rejected_immediately() {
    let triplets = [Triplet::new(0, 0, 1e51), Triplet::new(0, 1, 1.0)];
    let qp = QuadraticProgram {
        objective: vec![1.0, 1.0],
        quadratic_diag: None,
        constraint_matrix: CscMatrix::from_triplets(1, 2, &triplets),
        constraint_lower_bounds: vec![f64::NEG_INFINITY],
        constraint_upper_bounds: vec![1.0],
        variable_lower_bounds: vec![0.0, 0.0],
        variable_upper_bounds: vec![f64::INFINITY, f64::INFINITY],
        objective_offset: 0.0,
        objective_scale: 1.0,
        problem_name: None,
        variable_names: None,
        constraint_names: None,
    };

    let result = solve(qp, params(20_000));
    assert!(result.is_err());
}
