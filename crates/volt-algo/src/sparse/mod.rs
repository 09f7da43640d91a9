//! # Sparse Matrix Infrastructure for Power System Analysis
//!
//! Power grids are inherently sparse: a 10,000-bus network might have only
//! 15,000 branches, yielding ~0.03% matrix density. Every network matrix in
//! this crate is assembled from triplets and stored in CSR form.
//!
//! ## Module Organization
//!
//! - [`susceptance`]: Bbus, Bf and the phase-shifter injections for DC
//!   power flow and DC-OPF
//! - [`admittance`]: complex Ybus, Yf and Yt for AC OPF
//!
//! Both builders work on internal bus indices: callers resolve branch
//! terminals first (see [`BranchTerminals`]) so that the same matrices serve
//! the full network in DC power flow and the isolated-element-free network
//! inside an OPF model.
//!
//! ## Usage
//!
//! ```ignore
//! use volt_algo::sparse::{BranchTerminals, SparseSusceptance};
//!
//! let terminals: Vec<BranchTerminals> = /* online branches */;
//! let b = SparseSusceptance::from_branches(n_bus, &terminals)?;
//! let flows = b.branch_flows(&theta);
//! ```

pub mod admittance;
pub mod susceptance;

pub use admittance::{AdmittanceError, ComplexCsr, SparseAdmittance};
pub use susceptance::{branch_susceptance, SparseSusceptance, SusceptanceError};

use sprs::{CsMat, CsVec};
use volt_core::Branch;

/// A branch with its terminals resolved to internal bus indices.
#[derive(Debug, Clone, Copy)]
pub struct BranchTerminals<'a> {
    pub from: usize,
    pub to: usize,
    pub branch: &'a Branch,
}

fn dense_as_sparse(x: &[f64]) -> CsVec<f64> {
    CsVec::new(x.len(), (0..x.len()).collect(), x.to_vec())
}

/// `y = A·x` for a sparse matrix in either storage order.
pub fn mul_vec(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    (a * &dense_as_sparse(x)).to_dense().to_vec()
}

/// `y = Aᵀ·x` through a transposed view.
pub fn mul_vec_transpose(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    (&a.transpose_view() * &dense_as_sparse(x)).to_dense().to_vec()
}
