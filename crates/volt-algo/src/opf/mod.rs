//! Optimal Power Flow
//!
//! The OPF pipeline has three stages:
//!
//! 1. [`build_opf_model`]: network → fixed-structure optimization model
//!    (variables, linear blocks, nonlinear AC blocks, w-space costs)
//! 2. [`pips::solve`]: primal-dual interior point on the model
//! 3. [`integrate`]: write dispatch, voltages, flows and prices back
//!
//! Only the last stage mutates the network. [`OpfSolver`] runs all three
//! and integrates only converged solutions.
//!
//! | Method | Variables | Network |
//! |--------|-----------|---------|
//! | [`OpfMethod::Dc`] | `Va, Pg, y` | linear `Bbus·Va + Pbusinj + Pd + Gs = Pg` |
//! | [`OpfMethod::Ac`] | `Va, Vm, Pg, Qg, y` | polar power balance, `|Sf|,|St| ≤ rate_a` |

pub mod ac_equations;
pub mod constraints;
pub mod costs;
pub mod integrate;
pub mod model;
pub mod pips;
pub mod types;
pub mod variables;

pub use constraints::{ConstraintKind, ConstraintSet};
pub use costs::{assemble_costs, QuadraticCost, WCosts};
pub use integrate::integrate;
pub use model::{build_opf_model, DispatchUnit, IndexMapping, OpfModel, UnitSource};
pub use pips::{pips, NonlinearConstraints, PipsOptions, PipsProblem, PipsResult};
pub use types::{Multipliers, OpfMethod, OpfSolution};
pub use variables::{VarKind, VariableSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use volt_core::{Network, SparseSolverKind, VoltResult};

/// OPF settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpfOptions {
    pub method: OpfMethod,
    /// Enforce branch angle-difference limits
    pub angle_limits: bool,
    /// Linear solver for the Newton (KKT) systems
    pub solver: SparseSolverKind,
    pub pips: PipsOptions,
}

impl OpfOptions {
    pub fn with_method(mut self, method: OpfMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_angle_limits(mut self, enable: bool) -> Self {
        self.angle_limits = enable;
        self
    }

    pub fn with_solver(mut self, solver: SparseSolverKind) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.pips = self.pips.with_max_iterations(max_iter);
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.pips = self.pips.with_tolerance(tol);
        self
    }

    pub fn with_pips(mut self, pips: PipsOptions) -> Self {
        self.pips = pips;
        self
    }
}

/// Unified OPF solver: build, solve and integrate.
#[derive(Debug, Clone, Default)]
pub struct OpfSolver {
    options: OpfOptions,
}

impl OpfSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: OpfOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OpfOptions {
        &self.options
    }

    /// Build the optimization model without solving it.
    pub fn build(&self, network: &Network) -> VoltResult<OpfModel> {
        build_opf_model(network, &self.options)
    }

    /// Solve a previously built model.
    pub fn solve_model(&self, model: &OpfModel) -> VoltResult<OpfSolution> {
        self.options.pips.validate()?;
        let solver = self.options.solver.build_solver();
        pips::solve(model, &self.options.pips, solver.as_ref())
    }

    /// Build, solve, and write a converged solution back into `network`.
    ///
    /// A solve that stops without converging is returned as-is and the
    /// network is left untouched.
    pub fn solve(&self, network: &mut Network) -> VoltResult<OpfSolution> {
        let model = self.build(network)?;
        let solution = self.solve_model(&model)?;
        if solution.converged {
            integrate(network, &model, &solution)?;
            info!(
                method = %solution.method,
                objective = solution.objective,
                "OPF solution integrated"
            );
        } else {
            warn!(
                method = %solution.method,
                iterations = solution.iterations,
                "OPF solution not integrated"
            );
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::case6ww;

    #[test]
    fn test_options_builders() {
        let options = OpfOptions::default()
            .with_method(OpfMethod::Ac)
            .with_angle_limits(true)
            .with_solver(SparseSolverKind::Gauss)
            .with_max_iterations(40)
            .with_tolerance(1e-8);
        assert_eq!(options.method, OpfMethod::Ac);
        assert!(options.angle_limits);
        assert_eq!(options.pips.max_iterations, 40);
        assert_eq!(options.pips.feastol, 1e-8);
        assert_eq!(options.pips.costtol, 1e-8);
    }

    #[test]
    fn test_cost_scaling_leaves_solution_unchanged() {
        let mut plain = case6ww();
        let mut scaled = case6ww();
        let reference = OpfSolver::with_options(OpfOptions::default().with_tolerance(1e-9))
            .solve(&mut plain)
            .unwrap();
        let options = OpfOptions::default()
            .with_pips(PipsOptions::default().with_cost_mult(1e-2))
            .with_tolerance(1e-9);
        assert_eq!(options.pips.cost_mult, 1e-2);
        let solution = OpfSolver::with_options(options).solve(&mut scaled).unwrap();

        assert!(solution.converged);
        assert!((solution.objective - reference.objective).abs() < 1e-4);
        for (a, b) in plain.buses().iter().zip(scaled.buses()) {
            assert!((a.lam_p - b.lam_p).abs() < 1e-4, "price {} vs {}", a.lam_p, b.lam_p);
        }
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: OpfOptions =
            serde_json::from_str(r#"{"method":"ac","pips":{"max_iterations":25}}"#).unwrap();
        assert_eq!(options.method, OpfMethod::Ac);
        assert!(!options.angle_limits);
        assert_eq!(options.pips.max_iterations, 25);
        assert_eq!(options.pips.feastol, 1e-6);
    }

    #[test]
    fn test_unconverged_solve_leaves_network_untouched() {
        let mut network = case6ww();
        let before: Vec<f64> = network.generators().iter().map(|g| g.active_power.value()).collect();
        let solver = OpfSolver::with_options(OpfOptions::default().with_max_iterations(1));
        let solution = solver.solve(&mut network).unwrap();
        assert!(!solution.converged);
        let after: Vec<f64> = network.generators().iter().map(|g| g.active_power.value()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_dc_solve_integrates() {
        let mut network = case6ww();
        let solution = OpfSolver::new().solve(&mut network).unwrap();
        assert!(solution.converged);
        let total: f64 = network.generators().iter().map(|g| g.active_power.value()).sum();
        assert!((total - 210.0).abs() < 1e-4, "total generation {}", total);
    }
}
