//! Power Flow Solvers
//!
//! - [`dc`]: linearized DC power flow over the bus susceptance matrix
//!
//! The AC network equations live with the AC OPF formulation in
//! [`crate::opf::ac_equations`].

pub mod dc;

pub use dc::{solve_dc, DcPowerFlow, DcPowerFlowOptions, DcPowerFlowSolution};
