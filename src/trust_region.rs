//! Trust-region sub-solvers used for restart decisions and feasibility
//! polishing warm-ups: the linear-time LP trust region,
//! the binary-search diagonal-QP trust region, and
//! `LocalizedLagrangianBounds`.

/// `min gᵀ(x - x0)  s.t.  l ≤ x ≤ u,  ‖x - x0‖_W ≤ r`.
///
/// Solved by processing coordinates in order of increasing "critical step
/// size" `δ_j` (the `δ` at which coordinate `j`'s projection hits its
/// bound): each coordinate is either fixed at its bound (if its `δ_j`
/// lies inside the feasible radius) or stays free. Sorting the critical
/// steps gives an `O(n log n)` solve.
pub struct LinearTrustRegionResult {
    pub x: Vec<f64>,
    pub delta: f64,
}

pub fn solve_linear_trust_region(x0: &[f64], g: &[f64], w: &[f64], l: &[f64], u: &[f64], r: f64) -> LinearTrustRegionResult {
    let n = x0.len();
    let mut x = x0.to_vec();
    if r <= 0.0 {
        return LinearTrustRegionResult { x, delta: 0.0 };
    }

    // critical_delta[j] = Some(delta_j, bound_j) if coordinate j has a
    // finite critical step (g_j != 0 and the bound in its descent
    // direction is finite); None if it is "variable" (g_j == 0, or an
    // infinite bound in the descent direction).
    let mut finite: Vec<(usize, f64, f64)> = Vec::new();
    let mut always_active_coef = 0.0_f64;

    for j in 0..n {
        if g[j] == 0.0 {
            continue;
        }
        let bound = if g[j] > 0.0 { l[j] } else { u[j] };
        if !bound.is_finite() {
            always_active_coef += (g[j] * g[j]) / w[j];
            continue;
        }
        let delta_j = w[j] * (x0[j] - bound) / g[j];
        finite.push((j, delta_j.max(0.0), bound));
        always_active_coef += (g[j] * g[j]) / w[j];
    }

    finite.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let mut coef = always_active_coef;
    let mut fixed = vec![false; n];
    let mut break_coef = coef;
    let mut solved_delta = None;

    for &(j, delta_j, _bound) in &finite {
        let candidate_radius_sq = coef * delta_j * delta_j;
        if candidate_radius_sq > r * r {
            break_coef = coef;
            solved_delta = Some(delta_j);
            break;
        }
        coef -= (g[j] * g[j]) / w[j];
        fixed[j] = true;
    }

    let delta_star = match solved_delta {
        Some(_) => {
            if break_coef > 0.0 {
                r / break_coef.sqrt()
            } else {
                0.0
            }
        }
        None => {
            if coef > 0.0 {
                r / coef.sqrt()
            } else {
                0.0
            }
        }
    };

    for j in 0..n {
        if g[j] == 0.0 {
            x[j] = x0[j];
        } else if fixed[j] {
            x[j] = if g[j] > 0.0 { l[j] } else { u[j] };
        } else {
            x[j] = (x0[j] - delta_star * g[j] / w[j]).clamp(l[j], u[j]);
        }
    }

    LinearTrustRegionResult { x, delta: delta_star }
}

/// `min ½(x-x0)ᵀQ(x-x0) + gᵀ(x-x0)  s.t.  l ≤ x ≤ u,  ‖x-x0‖_W ≤ r`, `Q`
/// diagonal and nonnegative. Solved via the substitution `u = √W(x-x0)`,
/// reducing to the scalar root-find `‖u(λ)‖₂ = r` over `λ ≥ 0`.
pub struct DiagonalQpTrustRegionResult {
    pub x: Vec<f64>,
    pub lambda: f64,
}

pub fn solve_diagonal_qp_trust_region(
    x0: &[f64],
    g: &[f64],
    q: &[f64],
    w: &[f64],
    l: &[f64],
    u: &[f64],
    r: f64,
    tol: f64,
) -> DiagonalQpTrustRegionResult {
    let n = x0.len();

    let u_of = |lambda: f64| -> Vec<f64> {
        (0..n)
            .map(|i| {
                let sqrt_w = w[i].sqrt();
                let denom = q[i] / w[i] + lambda;
                let raw = if denom > 0.0 { -g[i] / sqrt_w / denom } else { 0.0 };
                let lo = sqrt_w * (l[i] - x0[i]);
                let hi = sqrt_w * (u[i] - x0[i]);
                raw.clamp(lo, hi)
            })
            .collect()
    };
    let norm_of = |u: &[f64]| -> f64 { u.iter().map(|v| v * v).sum::<f64>().sqrt() };

    // Unconstrained-in-lambda check: lambda = 0 already inside the radius.
    let u0 = u_of(0.0);
    if norm_of(&u0) <= r {
        let x = (0..n).map(|i| x0[i] + u0[i] / w[i].sqrt()).collect();
        return DiagonalQpTrustRegionResult { x, lambda: 0.0 };
    }

    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    while norm_of(&u_of(hi)) >= r {
        hi *= 2.0;
        if hi > 1e300 {
            break;
        }
    }

    while hi - lo > tol * lo.max(1.0) {
        let mid = 0.5 * (lo + hi);
        if norm_of(&u_of(mid)) >= r {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let lambda = hi;
    let u_star = u_of(lambda);
    let x = (0..n).map(|i| (x0[i] + u_star[i] / w[i].sqrt()).clamp(l[i], u[i])).collect();
    DiagonalQpTrustRegionResult { x, lambda }
}

/// The three trust-region problem instantiations: `PrimalTR`, `DualTR`,
/// `JointTR`. Each just picks the objective
/// gradient, bounds, and per-coordinate weights fed to
/// [`solve_linear_trust_region`] / [`solve_diagonal_qp_trust_region`].
pub struct TrustRegionProblem {
    pub x0: Vec<f64>,
    pub g: Vec<f64>,
    pub w: Vec<f64>,
    pub l: Vec<f64>,
    pub u: Vec<f64>,
}

impl TrustRegionProblem {
    pub fn primal(x: &[f64], g_x: &[f64], l_v: &[f64], u_v: &[f64]) -> Self {
        Self { x0: x.to_vec(), g: g_x.to_vec(), w: vec![1.0; x.len()], l: l_v.to_vec(), u: u_v.to_vec() }
    }

    /// `DualTR(qp, y, g)`: implicit dual bounds per PDLP math — one-sided,
    /// `lower = 0` when the upper constraint bound is finite, `upper = 0`
    /// when the lower constraint bound is finite (both finite => `y_i =
    /// 0` is forced, i.e. equality row).
    pub fn dual(y: &[f64], g_y: &[f64], l_c: &[f64], u_c: &[f64]) -> Self {
        let m = y.len();
        let mut l = vec![f64::NEG_INFINITY; m];
        let mut u = vec![f64::INFINITY; m];
        for i in 0..m {
            if u_c[i].is_finite() {
                l[i] = 0.0;
            }
            if l_c[i].is_finite() {
                u[i] = 0.0;
            }
        }
        let neg_g: Vec<f64> = g_y.iter().map(|v| -v).collect();
        Self { x0: y.to_vec(), g: neg_g, w: vec![1.0; m], l, u }
    }

    pub fn joint(x: &[f64], y: &[f64], g_x: &[f64], g_y: &[f64], l_v: &[f64], u_v: &[f64], l_c: &[f64], u_c: &[f64], omega: f64) -> Self {
        let primal = Self::primal(x, g_x, l_v, u_v);
        let dual = Self::dual(y, g_y, l_c, u_c);
        let mut x0 = primal.x0;
        x0.extend(dual.x0);
        let mut g = primal.g;
        g.extend(dual.g);
        let mut w = vec![0.5 * omega; x.len()];
        w.extend(vec![0.5 / omega; y.len()]);
        let mut l = primal.l;
        l.extend(dual.l);
        let mut u = primal.u;
        u.extend(dual.u);
        Self { x0, g, w, l, u }
    }
}

/// `{lagrangian_value, lower_bound, upper_bound, radius}` returned by
/// [`max_norm_localized_bounds`] / [`euclidean_localized_bounds`].
#[derive(Debug, Clone, Copy)]
pub struct LocalizedLagrangianBounds {
    pub lagrangian_value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub radius: f64,
}

/// Max-norm flavor: primal and dual sub-problems decouple, each solved
/// with [`solve_linear_trust_region`] at its own rescaled radius.
#[allow(clippy::too_many_arguments)]
pub fn max_norm_localized_bounds(
    x: &[f64],
    y: &[f64],
    g_x: &[f64],
    g_y: &[f64],
    l_v: &[f64],
    u_v: &[f64],
    l_c: &[f64],
    u_c: &[f64],
    lagrangian_value: f64,
    omega: f64,
    r: f64,
) -> LocalizedLagrangianBounds {
    let primal_radius = r * std::f64::consts::SQRT_2 / omega.sqrt();
    let dual_radius = r * std::f64::consts::SQRT_2 * omega.sqrt();

    let primal = TrustRegionProblem::primal(x, g_x, l_v, u_v);
    let primal_sol = solve_linear_trust_region(&primal.x0, &primal.g, &primal.w, &primal.l, &primal.u, primal_radius);
    let primal_min: f64 = g_x.iter().zip(primal_sol.x.iter().zip(x.iter())).map(|(g, (xs, x0))| g * (xs - x0)).sum();

    let dual = TrustRegionProblem::dual(y, g_y, l_c, u_c);
    let neg_g_y_min_sol = solve_linear_trust_region(&dual.x0, &dual.g, &dual.w, &dual.l, &dual.u, dual_radius);
    let neg_g_y_min: f64 = dual.g.iter().zip(neg_g_y_min_sol.x.iter().zip(y.iter())).map(|(g, (ys, y0))| g * (ys - y0)).sum();

    LocalizedLagrangianBounds {
        lagrangian_value,
        lower_bound: lagrangian_value + primal_min,
        upper_bound: lagrangian_value - neg_g_y_min,
        radius: r,
    }
}

/// Euclidean-norm flavor: a single `JointTR` solved with squared-norm
/// weights `(½ω, ½/ω)`; if `q` (the diagonal of `Q`) is supplied the
/// diagonal-QP trust region is used instead, so the quadratic term
/// contributes to the bound.
#[allow(clippy::too_many_arguments)]
pub fn euclidean_localized_bounds(
    x: &[f64],
    y: &[f64],
    g_x: &[f64],
    g_y: &[f64],
    l_v: &[f64],
    u_v: &[f64],
    l_c: &[f64],
    u_c: &[f64],
    q: Option<&[f64]>,
    lagrangian_value: f64,
    omega: f64,
    r: f64,
    tol: f64,
) -> LocalizedLagrangianBounds {
    let joint = TrustRegionProblem::joint(x, y, g_x, g_y, l_v, u_v, l_c, u_c, omega);
    let n = x.len();

    let (xy_star, objective_min) = if let Some(qd) = q {
        let mut q_joint = qd.to_vec();
        q_joint.extend(vec![0.0; y.len()]);
        let sol = solve_diagonal_qp_trust_region(&joint.x0, &joint.g, &q_joint, &joint.w, &joint.l, &joint.u, r, tol);
        let quad: f64 = (0..n).map(|i| 0.5 * qd[i] * (sol.x[i] - x[i]) * (sol.x[i] - x[i])).sum();
        let lin: f64 = joint.g.iter().zip(sol.x.iter().zip(joint.x0.iter())).map(|(g, (s, x0))| g * (s - x0)).sum();
        (sol.x, quad + lin)
    } else {
        let sol = solve_linear_trust_region(&joint.x0, &joint.g, &joint.w, &joint.l, &joint.u, r);
        let lin: f64 = joint.g.iter().zip(sol.x.iter().zip(joint.x0.iter())).map(|(g, (s, x0))| g * (s - x0)).sum();
        (sol.x, lin)
    };
    let _ = xy_star;

    LocalizedLagrangianBounds {
        lagrangian_value,
        lower_bound: lagrangian_value + objective_min,
        upper_bound: lagrangian_value - objective_min,
        radius: r,
    }
}
