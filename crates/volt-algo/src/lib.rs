//! # volt-algo: Power Flow and Optimal Power Flow
//!
//! Network analysis on top of the [`volt_core`] graph model.
//!
//! ## DC Power Flow
//!
//! [`DcPowerFlow`] solves the linearized network for bus angles with the
//! slack bus as reference and writes angles, branch flows and the slack
//! generator's balancing set-point back with [`solve_dc`].
//!
//! ## Optimal Power Flow (OPF)
//!
//! [`OpfSolver`] minimizes total generation cost subject to the network
//! equations:
//!
//! | Method | Description | Problem Class |
//! |--------|-------------|---------------|
//! | [`OpfMethod::Dc`] | Linearized network, line ratings on MW flow | Quadratic |
//! | [`OpfMethod::Ac`] | Polar AC network, MVA ratings, voltage limits | Nonlinear |
//!
//! Both are solved by the same primal-dual interior point method
//! ([`opf::pips`]). Polynomial and piecewise-linear generator costs,
//! price-responsive loads, generator capability curves, branch
//! angle-difference limits and phase-shifting transformers are supported.
//!
//! ### Architecture
//!
//! - **[`opf::build_opf_model`]**: network → variables, constraint blocks, costs
//! - **[`opf::pips`]**: interior point solve over any [`volt_core::SparseSolver`]
//! - **[`opf::integrate`]**: dispatch, voltages, flows and shadow prices back
//!   onto the network
//!
//! ## Example
//!
//! ```ignore
//! use volt_algo::{OpfMethod, OpfOptions, OpfSolver};
//!
//! let mut network = volt_algo::test_utils::case6ww();
//! let solver = OpfSolver::with_options(OpfOptions::default().with_method(OpfMethod::Ac));
//!
//! let solution = solver.solve(&mut network)?;
//! println!("Cost: ${:.2}/hr", solution.objective);
//! ```

pub mod opf;
pub mod power_flow;
pub mod sparse;
pub mod test_utils;

pub use opf::{
    build_opf_model, integrate, Multipliers, OpfMethod, OpfModel, OpfOptions, OpfSolution,
    OpfSolver, PipsOptions,
};
pub use power_flow::{solve_dc, DcPowerFlow, DcPowerFlowOptions, DcPowerFlowSolution};
pub use sparse::{
    AdmittanceError, BranchTerminals, SparseAdmittance, SparseSusceptance, SusceptanceError,
};
