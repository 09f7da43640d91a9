//! Linear-system solvers used by the power-flow and OPF algorithms.
//!
//! Algorithms never factor matrices themselves; they hand a sparse square
//! matrix and a right-hand side to a [`SparseSolver`] picked through
//! [`SparseSolverKind`]. Both bundled backends densify the matrix, which is
//! fine at the network sizes this workspace targets.

mod backend;
mod registry;

pub use backend::{FaerSolver, GaussSolver, SparseSolver};
pub use registry::SparseSolverKind;
