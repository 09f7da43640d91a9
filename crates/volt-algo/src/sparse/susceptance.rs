//! Sparse susceptance matrices for DC power flow and DC-OPF.
//!
//! Under the DC assumptions (flat magnitudes, small angle differences,
//! lossless branches) bus injections and branch flows are linear in the
//! voltage angles:
//!
//! ```text
//! P_bus = Bbus × θ + Pbusinj
//! P_f   = Bf   × θ + Pfinj
//!
//! where, for a branch l from bus f to bus t with b_l = 1 / (x_l · τ_l):
//!   Bbus[f,f] += b_l   Bbus[t,t] += b_l   Bbus[f,t] -= b_l   Bbus[t,f] -= b_l
//!   Bf[l,f]    = b_l   Bf[l,t]    = -b_l
//!   Pfinj[l]   = -b_l · φ_l          (phase shift φ_l in radians)
//!   Pbusinj    = Cftᵀ × Pfinj        (Cft = Cf − Ct)
//! ```
//!
//! A tap ratio of zero stands for a nominal (1.0) transformer or a plain line.

use sprs::{CsMat, TriMat};
use thiserror::Error;
use volt_core::{Branch, VoltError};

use super::{mul_vec, BranchTerminals};

/// Errors from susceptance matrix assembly
#[derive(Debug, Error)]
pub enum SusceptanceError {
    #[error("No buses found in network")]
    NoBuses,

    #[error("Branch {0} has zero or non-finite reactance")]
    ZeroReactance(String),

    #[error("Branch {name} references bus index {index} outside 0..{n_bus}")]
    BusOutOfRange {
        name: String,
        index: usize,
        n_bus: usize,
    },
}

impl From<SusceptanceError> for VoltError {
    fn from(err: SusceptanceError) -> Self {
        VoltError::Topology(err.to_string())
    }
}

/// Branch susceptance `1 / (x · τ)` with the nominal-tap convention applied.
pub fn branch_susceptance(branch: &Branch) -> Result<f64, SusceptanceError> {
    let x_eff = branch.reactance * branch.effective_tap();
    if x_eff == 0.0 || !x_eff.is_finite() {
        return Err(SusceptanceError::ZeroReactance(branch.name.clone()));
    }
    Ok(1.0 / x_eff)
}

/// Bbus/Bf pair plus the phase-shifter injection vectors, in CSR format.
#[derive(Debug, Clone)]
pub struct SparseSusceptance {
    /// n_bus × n_bus nodal susceptance
    bbus: CsMat<f64>,
    /// n_branch × n_bus source-side susceptance
    bf: CsMat<f64>,
    /// Bus injections caused by phase shifters (p.u.)
    pbusinj: Vec<f64>,
    /// Source-end flow offsets caused by phase shifters (p.u.)
    pfinj: Vec<f64>,
}

impl SparseSusceptance {
    /// Build the matrices for `n_bus` buses from branches whose terminals are
    /// already internal indices. Every branch passed in is treated as online;
    /// row `l` of `Bf` belongs to `branches[l]`.
    pub fn from_branches(
        n_bus: usize,
        branches: &[BranchTerminals<'_>],
    ) -> Result<Self, SusceptanceError> {
        if n_bus == 0 {
            return Err(SusceptanceError::NoBuses);
        }
        let n_branch = branches.len();

        let mut b_triplets = TriMat::new((n_bus, n_bus));
        let mut bf_triplets = TriMat::new((n_branch, n_bus));
        let mut pbusinj = vec![0.0; n_bus];
        let mut pfinj = vec![0.0; n_branch];

        for (l, terminals) in branches.iter().enumerate() {
            let BranchTerminals { from, to, branch } = *terminals;
            for index in [from, to] {
                if index >= n_bus {
                    return Err(SusceptanceError::BusOutOfRange {
                        name: branch.name.clone(),
                        index,
                        n_bus,
                    });
                }
            }

            let b = branch_susceptance(branch)?;

            b_triplets.add_triplet(from, from, b);
            b_triplets.add_triplet(to, to, b);
            b_triplets.add_triplet(from, to, -b);
            b_triplets.add_triplet(to, from, -b);

            bf_triplets.add_triplet(l, from, b);
            bf_triplets.add_triplet(l, to, -b);

            let shift = branch.phase_shift.value();
            if shift != 0.0 {
                pfinj[l] = -b * shift;
                pbusinj[from] += pfinj[l];
                pbusinj[to] -= pfinj[l];
            }
        }

        Ok(Self {
            bbus: b_triplets.to_csr(),
            bf: bf_triplets.to_csr(),
            pbusinj,
            pfinj,
        })
    }

    pub fn bbus(&self) -> &CsMat<f64> {
        &self.bbus
    }

    pub fn bf(&self) -> &CsMat<f64> {
        &self.bf
    }

    pub fn pbusinj(&self) -> &[f64] {
        &self.pbusinj
    }

    pub fn pfinj(&self) -> &[f64] {
        &self.pfinj
    }

    /// Get element Bbus[i,j] by matrix indices.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.bbus.get(i, j).copied().unwrap_or(0.0)
    }

    /// Number of buses (matrix dimension).
    pub fn n_bus(&self) -> usize {
        self.bbus.rows()
    }

    pub fn n_branch(&self) -> usize {
        self.bf.rows()
    }

    /// Number of non-zero elements of Bbus.
    pub fn nnz(&self) -> usize {
        self.bbus.nnz()
    }

    /// Net bus injections `Bbus·θ + Pbusinj` (p.u.)
    pub fn injections(&self, theta: &[f64]) -> Vec<f64> {
        let mut p = mul_vec(&self.bbus, theta);
        for (pi, inj) in p.iter_mut().zip(&self.pbusinj) {
            *pi += inj;
        }
        p
    }

    /// Source-end branch flows `Bf·θ + Pfinj` (p.u.)
    pub fn branch_flows(&self, theta: &[f64]) -> Vec<f64> {
        let mut pf = mul_vec(&self.bf, theta);
        for (p, inj) in pf.iter_mut().zip(&self.pfinj) {
            *p += inj;
        }
        pf
    }

    /// Remove the slack row and column from Bbus and move the slack column
    /// to the right-hand side: returns `(B_red, rhs_red)` with
    /// `rhs_red = rhs[pvpq] − Bbus[pvpq, slack]·θ_slack`.
    pub fn reduced_system(
        &self,
        slack: usize,
        theta_slack: f64,
        rhs: &[f64],
    ) -> (CsMat<f64>, Vec<f64>) {
        let n = self.n_bus();
        let reduce = |idx: usize| if idx < slack { idx } else { idx - 1 };

        let mut triplets = TriMat::new((n - 1, n - 1));
        let mut rhs_red: Vec<f64> = rhs
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != slack)
            .map(|(_, &p)| p)
            .collect();

        for (i, row) in self.bbus.outer_iterator().enumerate() {
            if i == slack {
                continue;
            }
            for (j, &val) in row.iter() {
                if j == slack {
                    rhs_red[reduce(i)] -= val * theta_slack;
                } else {
                    triplets.add_triplet(reduce(i), reduce(j), val);
                }
            }
        }

        (triplets.to_csr(), rhs_red)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volt_core::{BranchId, BusId};

    fn line(id: usize, x: f64) -> Branch {
        Branch::new(
            BranchId::new(id),
            format!("Line {id}"),
            BusId::new(0),
            BusId::new(0),
            0.0,
            x,
        )
    }

    fn triangle() -> Vec<Branch> {
        vec![line(1, 0.1), line(2, 0.1), line(3, 0.2)]
    }

    fn terminals(branches: &[Branch]) -> Vec<BranchTerminals<'_>> {
        let ends = [(0, 1), (1, 2), (0, 2)];
        branches
            .iter()
            .zip(ends)
            .map(|(branch, (from, to))| BranchTerminals { from, to, branch })
            .collect()
    }

    #[test]
    fn test_susceptance_symmetry_and_row_sums() {
        let branches = triangle();
        let b = SparseSusceptance::from_branches(3, &terminals(&branches)).unwrap();

        assert_eq!(b.n_bus(), 3);
        assert_eq!(b.nnz(), 9);
        for i in 0..3 {
            let row_sum: f64 = (0..3).map(|j| b.get(i, j)).sum();
            assert!(row_sum.abs() < 1e-10, "Row {} sum = {}", i, row_sum);
            for j in 0..3 {
                assert!((b.get(i, j) - b.get(j, i)).abs() < 1e-12);
            }
        }
        assert!((b.get(0, 0) - 15.0).abs() < 1e-12);
        assert!((b.get(0, 2) + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_source_side_matrix() {
        let branches = triangle();
        let b = SparseSusceptance::from_branches(3, &terminals(&branches)).unwrap();
        let flows = b.branch_flows(&[0.0, -0.1, -0.2]);
        assert!((flows[0] - 1.0).abs() < 1e-12);
        assert!((flows[1] - 1.0).abs() < 1e-12);
        assert!((flows[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tap_scales_susceptance() {
        let mut branches = triangle();
        branches[0].tap_ratio = 0.0;
        branches[1].tap_ratio = 2.0;
        let b = SparseSusceptance::from_branches(3, &terminals(&branches)).unwrap();
        assert!((b.get(0, 1) + 10.0).abs() < 1e-12);
        assert!((b.get(1, 2) + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_phase_shift_injections() {
        let mut branches = triangle();
        branches[0].phase_shift = volt_core::Radians(0.05);
        let b = SparseSusceptance::from_branches(3, &terminals(&branches)).unwrap();

        assert!((b.pfinj()[0] + 0.5).abs() < 1e-12);
        assert!((b.pbusinj()[0] + 0.5).abs() < 1e-12);
        assert!((b.pbusinj()[1] - 0.5).abs() < 1e-12);
        assert_eq!(b.pbusinj()[2], 0.0);
    }

    #[test]
    fn test_zero_reactance_is_topology_error() {
        let mut branches = triangle();
        branches[2].reactance = 0.0;
        let err = SparseSusceptance::from_branches(3, &terminals(&branches)).unwrap_err();
        assert!(matches!(err, SusceptanceError::ZeroReactance(_)));
        assert!(matches!(VoltError::from(err), VoltError::Topology(_)));

        branches[2].reactance = f64::NAN;
        assert!(SparseSusceptance::from_branches(3, &terminals(&branches)).is_err());
    }

    #[test]
    fn test_reduced_system() {
        let branches = triangle();
        let b = SparseSusceptance::from_branches(3, &terminals(&branches)).unwrap();

        let (reduced, rhs) = b.reduced_system(1, 0.1, &[1.0, 2.0, 3.0]);
        assert_eq!(reduced.rows(), 2);
        assert_eq!(reduced.cols(), 2);
        assert!((reduced.get(0, 0).copied().unwrap() - 15.0).abs() < 1e-12);
        assert!((reduced.get(0, 1).copied().unwrap() + 5.0).abs() < 1e-12);
        // B[0,1] = B[2,1] = -10 move across with θ_slack = 0.1
        assert!((rhs[0] - 2.0).abs() < 1e-12);
        assert!((rhs[1] - 4.0).abs() < 1e-12);
    }
}
