//! Primal-dual interior point solver.
//!
//! Solves the OPF problem
//!
//! ```text
//! min f(x)  s.t.  g(x) = 0,  h(x) ≤ 0,  l ≤ A·x ≤ u,  xmin ≤ x ≤ xmax
//! ```
//!
//! by a path-following Newton method on the perturbed KKT conditions. The
//! variable bounds are folded into the linear rows as `[I; A]` and split
//! into equalities (`|u − l| ≤ ε`), one-sided and two-sided inequalities;
//! rows that are unbounded on both sides (beyond ±1e10) are dropped.
//!
//! Each iteration factors the reduced system
//!
//! ```text
//! [ M   Jgᵀ ] [ dx   ]   [ −N ]      M = Lxx + Jhᵀ·diag(μ/z)·Jh
//! [ Jg  0   ] [ dlam ] = [ −g ]      N = Lx + Jhᵀ·((μ∘h + γ)/z)
//! ```
//!
//! through the configured [`SparseSolver`], recovers the slack and
//! multiplier steps, and takes the largest step that keeps `z` and `μ`
//! strictly positive (fraction-to-boundary `ξ`). The barrier parameter is
//! recentered every iteration as `γ = σ·zᵀμ / niq`.
//!
//! Termination:
//! - all four residual conditions below tolerance: converged
//! - iteration cap: best iterate, `converged = false`
//! - NaN iterate, collapsed step, or runaway barrier: [`VoltError::Numeric`]

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use tracing::{debug, info, warn};
use volt_core::{SparseSolver, VoltError, VoltResult};

use super::ac_equations::AcEquations;
use super::costs::QuadraticCost;
use super::model::OpfModel;
use super::types::{Multipliers, OpfSolution};
use crate::sparse::{mul_vec, mul_vec_transpose};

/// Bounds at or beyond this magnitude are treated as infinite
const INFINITE_BOUND: f64 = 1e10;

/// Interior point settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipsOptions {
    /// Primal feasibility tolerance
    pub feastol: f64,
    /// Lagrangian gradient tolerance
    pub gradtol: f64,
    /// Complementarity tolerance
    pub comptol: f64,
    /// Relative objective change tolerance
    pub costtol: f64,
    pub max_iterations: usize,
    /// Objective scaling applied inside the solver
    pub cost_mult: f64,
    /// Centering parameter
    pub sigma: f64,
    /// Fraction-to-boundary factor
    pub xi: f64,
    /// Initial slack / multiplier value
    pub z0: f64,
    /// Smallest step length before the solve is declared failed
    pub alpha_min: f64,
    /// Multipliers of slack inequalities below this are zeroed
    pub mu_threshold: f64,
}

impl Default for PipsOptions {
    fn default() -> Self {
        Self {
            feastol: 1e-6,
            gradtol: 1e-6,
            comptol: 1e-6,
            costtol: 1e-6,
            max_iterations: 150,
            cost_mult: 1.0,
            sigma: 0.1,
            xi: 0.99995,
            z0: 1.0,
            alpha_min: 1e-8,
            mu_threshold: 1e-5,
        }
    }
}

impl PipsOptions {
    /// Set all four termination tolerances
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.feastol = tol;
        self.gradtol = tol;
        self.comptol = tol;
        self.costtol = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_cost_mult(mut self, cost_mult: f64) -> Self {
        self.cost_mult = cost_mult;
        self
    }

    pub fn validate(&self) -> VoltResult<()> {
        let positive = [
            ("feastol", self.feastol),
            ("gradtol", self.gradtol),
            ("comptol", self.comptol),
            ("costtol", self.costtol),
            ("cost_mult", self.cost_mult),
            ("z0", self.z0),
            ("alpha_min", self.alpha_min),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(VoltError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.sigma > 0.0 && self.sigma < 1.0) || !(self.xi > 0.0 && self.xi < 1.0) {
            return Err(VoltError::Config(
                "sigma and xi must lie strictly between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Nonlinear constraint interface
// ============================================================================

/// Values and Jacobians of `g(x) = 0` and `h(x) ≤ 0` at one point.
///
/// Jacobians are row-major: `jac_g` is `n_eq × nx`, `jac_h` is `n_ineq × nx`.
#[derive(Debug, Clone)]
pub struct NonlinearEval {
    pub g: Vec<f64>,
    pub h: Vec<f64>,
    pub jac_g: CsMat<f64>,
    pub jac_h: CsMat<f64>,
}

/// Nonlinear constraints re-evaluated at every iterate.
pub trait NonlinearConstraints {
    fn n_eq(&self) -> usize;
    fn n_ineq(&self) -> usize;
    fn evaluate(&self, x: &[f64]) -> NonlinearEval;
    /// `Σ λᵢ·∇²gᵢ(x) + Σ μⱼ·∇²hⱼ(x)`, `nx × nx`
    fn hessian(&self, x: &[f64], lam: &[f64], mu: &[f64]) -> CsMat<f64>;
}

/// Problem data handed to [`pips`].
pub struct PipsProblem<'a> {
    pub cost: &'a QuadraticCost,
    pub x0: Vec<f64>,
    pub xmin: Vec<f64>,
    pub xmax: Vec<f64>,
    pub a: &'a CsMat<f64>,
    pub l: &'a [f64],
    pub u: &'a [f64],
    pub nonlinear: Option<&'a dyn NonlinearConstraints>,
}

#[derive(Debug, Clone)]
pub struct PipsResult {
    pub x: Vec<f64>,
    /// Unscaled objective
    pub f: f64,
    pub converged: bool,
    pub iterations: usize,
    pub multipliers: Multipliers,
}

// ============================================================================
// Row classification of [I; A]
// ============================================================================

struct RowSplit {
    ieq: Vec<usize>,
    igt: Vec<usize>,
    ilt: Vec<usize>,
    ibx: Vec<usize>,
}

impl RowSplit {
    fn classify(ll: &[f64], uu: &[f64]) -> Self {
        let mut split = RowSplit {
            ieq: Vec::new(),
            igt: Vec::new(),
            ilt: Vec::new(),
            ibx: Vec::new(),
        };
        for (k, (&lo, &hi)) in ll.iter().zip(uu).enumerate() {
            let lo_finite = lo > -INFINITE_BOUND;
            let hi_finite = hi < INFINITE_BOUND;
            if (hi - lo).abs() <= f64::EPSILON {
                split.ieq.push(k);
            } else if lo_finite && hi_finite {
                split.ibx.push(k);
            } else if lo_finite {
                split.igt.push(k);
            } else if hi_finite {
                split.ilt.push(k);
            }
        }
        split
    }
}

/// Rows of `m` as `(column, value)` lists.
fn row_lists(m: &CsMat<f64>) -> Vec<Vec<(usize, f64)>> {
    let mut rows = vec![Vec::new(); m.rows()];
    for (&v, (r, c)) in m.iter() {
        rows[r].push((c, v));
    }
    rows
}

fn stack(top: &CsMat<f64>, bottom: &CsMat<f64>, n_cols: usize) -> CsMat<f64> {
    let mut tri = TriMat::with_capacity((top.rows() + bottom.rows(), n_cols), top.nnz() + bottom.nnz());
    for (&v, (r, c)) in top.iter() {
        tri.add_triplet(r, c, v);
    }
    for (&v, (r, c)) in bottom.iter() {
        tri.add_triplet(top.rows() + r, c, v);
    }
    tri.to_csr()
}

fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Everything that changes with `x`
struct Point {
    f: f64,
    df: Vec<f64>,
    g: Vec<f64>,
    h: Vec<f64>,
    jac_g: CsMat<f64>,
    jac_h: CsMat<f64>,
}

struct Residuals {
    feascond: f64,
    gradcond: f64,
    compcond: f64,
    costcond: f64,
}

impl Residuals {
    fn converged(&self, opt: &PipsOptions) -> bool {
        self.feascond < opt.feastol
            && self.gradcond < opt.gradtol
            && self.compcond < opt.comptol
            && self.costcond < opt.costtol
    }
}

/// Run the interior point method on `problem`.
pub fn pips(
    problem: &PipsProblem<'_>,
    opt: &PipsOptions,
    solver: &dyn SparseSolver,
) -> VoltResult<PipsResult> {
    opt.validate()?;
    let nx = problem.x0.len();
    let n_a = problem.a.rows();
    if problem.xmin.len() != nx
        || problem.xmax.len() != nx
        || problem.l.len() != n_a
        || problem.u.len() != n_a
        || (n_a > 0 && problem.a.cols() != nx)
        || problem.cost.cc.len() != nx
    {
        return Err(VoltError::Numeric(format!(
            "inconsistent problem dimensions for {nx} variables and {n_a} linear rows"
        )));
    }

    // ========================================================================
    // Linear rows: AA = [I; A]
    // ========================================================================
    let ll: Vec<f64> = problem.xmin.iter().chain(problem.l).copied().collect();
    let uu: Vec<f64> = problem.xmax.iter().chain(problem.u).copied().collect();
    let a_rows = row_lists(problem.a);
    let aa_row = |k: usize| -> Vec<(usize, f64)> {
        if k < nx {
            vec![(k, 1.0)]
        } else {
            a_rows[k - nx].clone()
        }
    };
    let split = RowSplit::classify(&ll, &uu);
    let (nlt, ngt, nbx) = (split.ilt.len(), split.igt.len(), split.ibx.len());

    let mut ae = TriMat::new((split.ieq.len(), nx));
    let mut be = Vec::with_capacity(split.ieq.len());
    for (r, &k) in split.ieq.iter().enumerate() {
        for (c, v) in aa_row(k) {
            ae.add_triplet(r, c, v);
        }
        be.push(uu[k]);
    }
    let ae: CsMat<f64> = ae.to_csr();

    let niq_lin = nlt + ngt + 2 * nbx;
    let mut ai = TriMat::new((niq_lin, nx));
    let mut bi = Vec::with_capacity(niq_lin);
    let sides = split
        .ilt
        .iter()
        .map(|&k| (k, 1.0, uu[k]))
        .chain(split.igt.iter().map(|&k| (k, -1.0, -ll[k])))
        .chain(split.ibx.iter().map(|&k| (k, 1.0, uu[k])))
        .chain(split.ibx.iter().map(|&k| (k, -1.0, -ll[k])));
    for (r, (k, sign, rhs)) in sides.enumerate() {
        for (c, v) in aa_row(k) {
            ai.add_triplet(r, c, sign * v);
        }
        bi.push(rhs);
    }
    let ai: CsMat<f64> = ai.to_csr();

    let (neq_nln, niq_nln) = problem
        .nonlinear
        .map(|n| (n.n_eq(), n.n_ineq()))
        .unwrap_or((0, 0));
    debug!(
        nx,
        eq_linear = split.ieq.len(),
        ineq_linear = niq_lin,
        eq_nonlinear = neq_nln,
        ineq_nonlinear = niq_nln,
        "interior point problem"
    );

    let evaluate = |x: &[f64]| -> Point {
        let f = problem.cost.evaluate(x) * opt.cost_mult;
        let df: Vec<f64> = problem
            .cost
            .gradient(x)
            .into_iter()
            .map(|d| d * opt.cost_mult)
            .collect();

        let mut g = Vec::with_capacity(neq_nln + be.len());
        let mut h = Vec::with_capacity(niq_nln + bi.len());
        let (jac_g, jac_h) = match problem.nonlinear {
            Some(nonlinear) => {
                let eval = nonlinear.evaluate(x);
                g.extend(eval.g);
                h.extend(eval.h);
                (stack(&eval.jac_g, &ae, nx), stack(&eval.jac_h, &ai, nx))
            }
            None => (ae.clone(), ai.clone()),
        };
        g.extend(mul_vec(&ae, x).iter().zip(&be).map(|(ax, b)| ax - b));
        h.extend(mul_vec(&ai, x).iter().zip(&bi).map(|(ax, b)| ax - b));
        Point {
            f,
            df,
            g,
            h,
            jac_g,
            jac_h,
        }
    };

    let lagrangian_gradient = |p: &Point, lam: &[f64], mu: &[f64]| -> Vec<f64> {
        let jg_lam = mul_vec_transpose(&p.jac_g, lam);
        let jh_mu = mul_vec_transpose(&p.jac_h, mu);
        p.df
            .iter()
            .zip(jg_lam)
            .zip(jh_mu)
            .map(|((d, a), b)| d + a + b)
            .collect()
    };

    let residuals = |x: &[f64], p: &Point, lx: &[f64], lam: &[f64], z: &[f64], mu: &[f64], f0: f64| {
        let maxh = p.h.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let infeasibility = norm_inf(&p.g).max(maxh);
        let x_norm = norm_inf(x);
        Residuals {
            feascond: infeasibility / (1.0 + x_norm.max(norm_inf(z))),
            gradcond: norm_inf(lx) / (1.0 + norm_inf(lam).max(norm_inf(mu))),
            compcond: dot(z, mu) / (1.0 + x_norm),
            costcond: cost_condition(p.f, f0),
        }
    };

    // ========================================================================
    // Initialization
    // ========================================================================
    let mut x = problem.x0.clone();
    let mut point = evaluate(&x);
    let neq = point.g.len();
    let niq = point.h.len();

    let mut gamma = 1.0;
    let mut lam = vec![0.0; neq];
    let mut z = vec![opt.z0; niq];
    let mut mu = vec![opt.z0; niq];
    for k in 0..niq {
        if point.h[k] < -opt.z0 {
            z[k] = -point.h[k];
        }
        if gamma / z[k] > opt.z0 {
            mu[k] = gamma / z[k];
        }
    }

    let mut f0 = point.f;
    let mut lx = lagrangian_gradient(&point, &lam, &mu);
    let mut res = residuals(&x, &point, &lx, &lam, &z, &mu, f0);
    let mut converged = res.converged(opt);
    let mut iterations = 0;
    debug!(
        iter = 0,
        f = point.f / opt.cost_mult,
        feascond = res.feascond,
        gradcond = res.gradcond,
        compcond = res.compcond,
        "interior point start"
    );

    // ========================================================================
    // Newton iterations
    // ========================================================================
    while !converged && iterations < opt.max_iterations {
        iterations += 1;

        let jh_rows = row_lists(&point.jac_h);
        let n_kkt = nx + neq;
        let mut kkt = TriMat::new((n_kkt, n_kkt));

        // Lxx
        for (&v, (r, c)) in problem.cost.hh.iter() {
            kkt.add_triplet(r, c, v * opt.cost_mult);
        }
        if let Some(nonlinear) = problem.nonlinear {
            let hess = nonlinear.hessian(&x, &lam[..neq_nln], &mu[..niq_nln]);
            for (&v, (r, c)) in hess.iter() {
                kkt.add_triplet(r, c, v);
            }
        }
        // Jhᵀ·diag(μ/z)·Jh
        let mut n_vec = lx.clone();
        for (k, row) in jh_rows.iter().enumerate() {
            let w = mu[k] / z[k];
            for &(c1, v1) in row {
                for &(c2, v2) in row {
                    kkt.add_triplet(c1, c2, w * v1 * v2);
                }
            }
            let s = (mu[k] * point.h[k] + gamma) / z[k];
            for &(c, v) in row {
                n_vec[c] += v * s;
            }
        }
        for (&v, (r, c)) in point.jac_g.iter() {
            kkt.add_triplet(nx + r, c, v);
            kkt.add_triplet(c, nx + r, v);
        }
        let kkt: CsMat<f64> = kkt.to_csr();

        let rhs: Vec<f64> = n_vec
            .iter()
            .chain(&point.g)
            .map(|v| -v)
            .collect();
        let step = solver.solve(&kkt, &rhs).map_err(|e| match e {
            VoltError::Numeric(msg) => {
                VoltError::Numeric(format!("KKT factorization failed at iteration {iterations}: {msg}"))
            }
            other => other,
        })?;
        if step.iter().any(|v| !v.is_finite()) {
            return Err(VoltError::Numeric(format!(
                "Newton step is not finite at iteration {iterations}"
            )));
        }
        let (dx, dlam) = step.split_at(nx);

        let jh_dx = mul_vec(&point.jac_h, dx);
        let dz: Vec<f64> = (0..niq).map(|k| -point.h[k] - z[k] - jh_dx[k]).collect();
        let dmu: Vec<f64> = (0..niq)
            .map(|k| -mu[k] + (gamma - mu[k] * dz[k]) / z[k])
            .collect();

        // fraction to boundary
        let step_length = |v: &[f64], dv: &[f64]| -> f64 {
            let ratio = v
                .iter()
                .zip(dv)
                .filter(|(_, &d)| d < 0.0)
                .map(|(&v, &d)| -v / d)
                .fold(f64::INFINITY, f64::min);
            if ratio.is_finite() {
                (opt.xi * ratio).min(1.0)
            } else {
                1.0
            }
        };
        let alphap = step_length(&z, &dz);
        let alphad = step_length(&mu, &dmu);

        for (xi, d) in x.iter_mut().zip(dx) {
            *xi += alphap * d;
        }
        for (zi, d) in z.iter_mut().zip(&dz) {
            *zi += alphap * d;
        }
        for (li, d) in lam.iter_mut().zip(dlam) {
            *li += alphad * d;
        }
        for (mi, d) in mu.iter_mut().zip(&dmu) {
            *mi += alphad * d;
        }
        if niq > 0 {
            gamma = opt.sigma * dot(&z, &mu) / niq as f64;
        }

        point = evaluate(&x);
        lx = lagrangian_gradient(&point, &lam, &mu);
        res = residuals(&x, &point, &lx, &lam, &z, &mu, f0);
        debug!(
            iter = iterations,
            f = point.f / opt.cost_mult,
            feascond = res.feascond,
            gradcond = res.gradcond,
            compcond = res.compcond,
            costcond = res.costcond,
            gamma,
            alphap,
            alphad,
            "interior point iteration"
        );

        if res.converged(opt) {
            converged = true;
            break;
        }
        if x.iter().any(|v| v.is_nan())
            || alphap < opt.alpha_min
            || alphad < opt.alpha_min
            || gamma < f64::EPSILON
            || gamma > 1.0 / f64::EPSILON
        {
            return Err(VoltError::Numeric(format!(
                "interior point failed at iteration {iterations} \
                 (alpha_p {alphap:.3e}, alpha_d {alphad:.3e}, gamma {gamma:.3e})"
            )));
        }
        f0 = point.f;
    }

    // ========================================================================
    // Unscale and unpack multipliers
    // ========================================================================
    for k in 0..niq {
        if point.h[k] < -opt.feastol && mu[k] < opt.mu_threshold {
            mu[k] = 0.0;
        }
    }
    let f = point.f / opt.cost_mult;
    for v in lam.iter_mut().chain(mu.iter_mut()) {
        *v /= opt.cost_mult;
    }

    let lam_lin = &lam[neq_nln..];
    let mu_lin = &mu[niq_nln..];
    let mut mu_l = vec![0.0; nx + n_a];
    let mut mu_u = vec![0.0; nx + n_a];
    for (j, &k) in split.ieq.iter().enumerate() {
        if lam_lin[j] < 0.0 {
            mu_l[k] = -lam_lin[j];
        } else if lam_lin[j] > 0.0 {
            mu_u[k] = lam_lin[j];
        }
    }
    for (j, &k) in split.ilt.iter().enumerate() {
        mu_u[k] = mu_lin[j];
    }
    for (j, &k) in split.igt.iter().enumerate() {
        mu_l[k] = mu_lin[nlt + j];
    }
    for (j, &k) in split.ibx.iter().enumerate() {
        mu_u[k] = mu_lin[nlt + ngt + j];
        mu_l[k] = mu_lin[nlt + ngt + nbx + j];
    }

    let multipliers = Multipliers {
        lower: mu_l[..nx].to_vec(),
        upper: mu_u[..nx].to_vec(),
        mu_l: mu_l[nx..].to_vec(),
        mu_u: mu_u[nx..].to_vec(),
        eq_nonlin: lam[..neq_nln].to_vec(),
        ineq_nonlin: mu[..niq_nln].to_vec(),
    };

    Ok(PipsResult {
        x,
        f,
        converged,
        iterations,
        multipliers,
    })
}

/// Solve an assembled OPF model.
pub fn solve(
    model: &OpfModel,
    options: &PipsOptions,
    solver: &dyn SparseSolver,
) -> VoltResult<OpfSolution> {
    let start = Instant::now();

    let ac;
    let nonlinear: Option<&dyn NonlinearConstraints> = if model.method.is_ac() {
        ac = AcEquations::new(model)?;
        Some(&ac)
    } else {
        None
    };

    let problem = PipsProblem {
        cost: &model.cost,
        x0: model.initial_point(),
        xmin: model.variables.lower(),
        xmax: model.variables.upper(),
        a: &model.a,
        l: &model.l,
        u: &model.u,
        nonlinear,
    };
    let result = pips(&problem, options, solver)?;
    let solve_time_ms = start.elapsed().as_millis();

    if result.converged {
        info!(
            method = %model.method,
            iterations = result.iterations,
            objective = result.f,
            solver = solver.name(),
            time_ms = solve_time_ms as u64,
            "OPF converged"
        );
    } else {
        warn!(
            method = %model.method,
            iterations = result.iterations,
            objective = result.f,
            "OPF did not converge within the iteration limit"
        );
    }

    Ok(OpfSolution {
        converged: result.converged,
        method: model.method,
        iterations: result.iterations,
        solve_time_ms,
        objective: result.f,
        x: result.x,
        multipliers: result.multipliers,
    })
}

/// Relative change in objective between iterates.
fn cost_condition(f: f64, f0: f64) -> f64 {
    (f - f0).abs() / f0.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use volt_core::{FaerSolver, GaussSolver};

    fn quadratic(h: &[(usize, usize, f64)], cc: Vec<f64>, c0: f64) -> QuadraticCost {
        let n = cc.len();
        let mut tri = TriMat::new((n, n));
        for &(r, c, v) in h {
            tri.add_triplet(r, c, v);
        }
        QuadraticCost {
            hh: tri.to_csr(),
            cc,
            c0,
        }
    }

    fn one_row(coefs: &[(usize, f64)], n: usize) -> CsMat<f64> {
        let mut tri = TriMat::new((1, n));
        for &(c, v) in coefs {
            tri.add_triplet(0, c, v);
        }
        tri.to_csr()
    }

    #[test]
    fn test_equality_constrained_qp_with_active_bound() {
        // (x0 − 2)² + (x1 − 2)²  s.t.  x0 + x1 = 1,  x0 ≤ 0.25
        let cost = quadratic(&[(0, 0, 2.0), (1, 1, 2.0)], vec![-4.0, -4.0], 8.0);
        let a = one_row(&[(0, 1.0), (1, 1.0)], 2);
        let problem = PipsProblem {
            cost: &cost,
            x0: vec![0.0, 0.0],
            xmin: vec![f64::NEG_INFINITY; 2],
            xmax: vec![0.25, f64::INFINITY],
            a: &a,
            l: &[1.0],
            u: &[1.0],
            nonlinear: None,
        };
        let result = pips(&problem, &PipsOptions::default(), &FaerSolver).unwrap();

        assert!(result.converged);
        assert!((result.x[0] - 0.25).abs() < 1e-5, "x0 = {}", result.x[0]);
        assert!((result.x[1] - 0.75).abs() < 1e-5, "x1 = {}", result.x[1]);
        assert!((result.f - 4.625).abs() < 1e-5, "f = {}", result.f);
        assert!((result.multipliers.mu_u[0] - 2.5).abs() < 1e-4);
        assert_eq!(result.multipliers.mu_l[0], 0.0);
        assert!((result.multipliers.upper[0] - 1.0).abs() < 1e-4);
        assert!(result.multipliers.upper[1].abs() < 1e-6);
    }

    struct UnitDisk;

    impl NonlinearConstraints for UnitDisk {
        fn n_eq(&self) -> usize {
            0
        }

        fn n_ineq(&self) -> usize {
            1
        }

        fn evaluate(&self, x: &[f64]) -> NonlinearEval {
            NonlinearEval {
                g: vec![],
                h: vec![x[0] * x[0] + x[1] * x[1] - 1.0],
                jac_g: TriMat::new((0, 2)).to_csr(),
                jac_h: one_row(&[(0, 2.0 * x[0]), (1, 2.0 * x[1])], 2),
            }
        }

        fn hessian(&self, _x: &[f64], _lam: &[f64], mu: &[f64]) -> CsMat<f64> {
            let mut tri = TriMat::new((2, 2));
            tri.add_triplet(0, 0, 2.0 * mu[0]);
            tri.add_triplet(1, 1, 2.0 * mu[0]);
            tri.to_csr()
        }
    }

    #[test]
    fn test_linear_objective_on_disk() {
        let cost = quadratic(&[], vec![1.0, 1.0], 0.0);
        let a = TriMat::new((0, 2)).to_csr();
        let problem = PipsProblem {
            cost: &cost,
            x0: vec![0.0, 0.0],
            xmin: vec![f64::NEG_INFINITY; 2],
            xmax: vec![f64::INFINITY; 2],
            a: &a,
            l: &[],
            u: &[],
            nonlinear: Some(&UnitDisk),
        };
        let result = pips(&problem, &PipsOptions::default(), &GaussSolver).unwrap();

        let r = -std::f64::consts::FRAC_1_SQRT_2;
        assert!(result.converged);
        assert!((result.x[0] - r).abs() < 1e-5, "x0 = {}", result.x[0]);
        assert!((result.x[1] - r).abs() < 1e-5, "x1 = {}", result.x[1]);
        assert!((result.f + std::f64::consts::SQRT_2).abs() < 1e-5);
        // ∇f + μ∇h = 0  →  μ = 1/√2
        assert!((result.multipliers.ineq_nonlin[0] + r).abs() < 1e-4);
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let cost = quadratic(&[(0, 0, 2.0), (1, 1, 2.0)], vec![-4.0, -4.0], 8.0);
        let a = one_row(&[(0, 1.0), (1, 1.0)], 2);
        let problem = PipsProblem {
            cost: &cost,
            x0: vec![0.0, 0.0],
            xmin: vec![f64::NEG_INFINITY; 2],
            xmax: vec![0.25, f64::INFINITY],
            a: &a,
            l: &[1.0],
            u: &[1.0],
            nonlinear: None,
        };
        let options = PipsOptions::default().with_max_iterations(1);
        let result = pips(&problem, &options, &FaerSolver).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let opts = PipsOptions::default().with_tolerance(0.0);
        assert!(matches!(opts.validate(), Err(VoltError::Config(_))));
        assert!(PipsOptions::default().validate().is_ok());
    }

    #[test]
    fn test_row_split() {
        let inf = f64::INFINITY;
        let split = RowSplit::classify(
            &[0.0, -inf, 1.0, -1.0, -inf],
            &[0.0, 2.0, inf, 1.0, inf],
        );
        assert_eq!(split.ieq, vec![0]);
        assert_eq!(split.ilt, vec![1]);
        assert_eq!(split.igt, vec![2]);
        assert_eq!(split.ibx, vec![3]);
    }

    #[test]
    fn test_cost_condition_scales_by_larger_of_one_and_previous_cost() {
        assert!((cost_condition(0.6, 0.5) - 0.1).abs() < 1e-15);
        assert!((cost_condition(3046.0, 3000.0) - 46.0 / 3000.0).abs() < 1e-15);
        assert!((cost_condition(-2.0, -4.0) - 0.5).abs() < 1e-15);
        assert_eq!(cost_condition(7.0, 7.0), 0.0);
    }
}
