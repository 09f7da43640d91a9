//! Complex admittance matrices for the AC OPF formulation.
//!
//! ```text
//! I_bus = Ybus × V      I_f = Yf × V      I_t = Yt × V
//! ```
//!
//! Each branch is the standard π model with a series admittance
//! `ys = 1/(r + jx)`, total charging `jb`, and a complex tap
//! `a = τ·e^{jφ}` on the from side:
//!
//! ```text
//!   Ytt = ys + jb/2        Yff = Ytt / |a|²
//!   Yft = -ys / conj(a)    Ytf = -ys / a
//! ```
//!
//! Bus shunts add `(Gs + jBs) / base_mva` on the Ybus diagonal.
//!
//! Real and imaginary parts are stored as two CSR matrices sharing one
//! sparsity pattern, the same split the G/B conductance and susceptance
//! matrices have in textbook power-flow equations.

use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use thiserror::Error;
use volt_core::VoltError;

use super::BranchTerminals;

/// Errors from admittance matrix assembly
#[derive(Debug, Error)]
pub enum AdmittanceError {
    #[error("No buses found in network")]
    NoBuses,

    #[error("Branch {0} has zero or non-finite impedance")]
    ZeroImpedance(String),

    #[error("Branch {name} references bus index {index} outside 0..{n_bus}")]
    BusOutOfRange {
        name: String,
        index: usize,
        n_bus: usize,
    },

    #[error("Shunt vector has {got} entries for {n_bus} buses")]
    ShuntLength { got: usize, n_bus: usize },
}

impl From<AdmittanceError> for VoltError {
    fn from(err: AdmittanceError) -> Self {
        VoltError::Topology(err.to_string())
    }
}

/// Complex sparse matrix stored as separate real/imaginary CSR parts.
#[derive(Debug, Clone)]
pub struct ComplexCsr {
    re: CsMat<f64>,
    im: CsMat<f64>,
}

impl ComplexCsr {
    fn from_triplets(shape: (usize, usize), entries: &[(usize, usize, Complex64)]) -> Self {
        let mut re = TriMat::new(shape);
        let mut im = TriMat::new(shape);
        for &(r, c, v) in entries {
            re.add_triplet(r, c, v.re);
            im.add_triplet(r, c, v.im);
        }
        Self {
            re: re.to_csr(),
            im: im.to_csr(),
        }
    }

    pub fn rows(&self) -> usize {
        self.re.rows()
    }

    pub fn cols(&self) -> usize {
        self.re.cols()
    }

    /// Real part (conductance for Ybus)
    pub fn real(&self) -> &CsMat<f64> {
        &self.re
    }

    /// Imaginary part (susceptance for Ybus)
    pub fn imag(&self) -> &CsMat<f64> {
        &self.im
    }

    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        Complex64::new(
            self.re.get(i, j).copied().unwrap_or(0.0),
            self.im.get(i, j).copied().unwrap_or(0.0),
        )
    }

    /// Non-zero entries of row `i`, in ascending column order.
    pub fn row(&self, i: usize) -> Vec<(usize, Complex64)> {
        let mut entries: Vec<(usize, Complex64)> = Vec::new();
        if let Some(row) = self.re.outer_view(i) {
            entries.extend(row.iter().map(|(j, &v)| (j, Complex64::new(v, 0.0))));
        }
        if let Some(row) = self.im.outer_view(i) {
            for (j, &v) in row.iter() {
                match entries.binary_search_by_key(&j, |&(c, _)| c) {
                    Ok(pos) => entries[pos].1.im = v,
                    Err(pos) => entries.insert(pos, (j, Complex64::new(0.0, v))),
                }
            }
        }
        entries
    }

    /// Matrix-vector product
    pub fn mul_vec(&self, v: &[Complex64]) -> Vec<Complex64> {
        (0..self.rows())
            .map(|i| self.row(i).into_iter().map(|(j, y)| y * v[j]).sum())
            .collect()
    }
}

/// Ybus, Yf and Yt for the online branches of a network.
#[derive(Debug, Clone)]
pub struct SparseAdmittance {
    ybus: ComplexCsr,
    yf: ComplexCsr,
    yt: ComplexCsr,
    from: Vec<usize>,
    to: Vec<usize>,
}

impl SparseAdmittance {
    /// Build from internal branch terminals and per-bus shunt admittances
    /// already in per-unit.
    pub fn from_branches(
        n_bus: usize,
        branches: &[BranchTerminals<'_>],
        bus_shunts: &[Complex64],
    ) -> Result<Self, AdmittanceError> {
        if n_bus == 0 {
            return Err(AdmittanceError::NoBuses);
        }
        if bus_shunts.len() != n_bus {
            return Err(AdmittanceError::ShuntLength {
                got: bus_shunts.len(),
                n_bus,
            });
        }
        let n_branch = branches.len();

        let mut ybus = Vec::with_capacity(4 * n_branch + n_bus);
        let mut yf = Vec::with_capacity(2 * n_branch);
        let mut yt = Vec::with_capacity(2 * n_branch);
        let mut from = Vec::with_capacity(n_branch);
        let mut to = Vec::with_capacity(n_branch);

        for (l, terminals) in branches.iter().enumerate() {
            let BranchTerminals { from: f, to: t, branch } = *terminals;
            for index in [f, t] {
                if index >= n_bus {
                    return Err(AdmittanceError::BusOutOfRange {
                        name: branch.name.clone(),
                        index,
                        n_bus,
                    });
                }
            }

            let z = Complex64::new(branch.resistance, branch.reactance);
            if z.norm() == 0.0 || !z.is_finite() {
                return Err(AdmittanceError::ZeroImpedance(branch.name.clone()));
            }
            let ys = z.inv();
            let tap = Complex64::from_polar(branch.effective_tap(), branch.phase_shift.value());

            let ytt = ys + Complex64::new(0.0, branch.charging_b.value() / 2.0);
            let yff = ytt / tap.norm_sqr();
            let yft = -ys / tap.conj();
            let ytf = -ys / tap;

            yf.push((l, f, yff));
            yf.push((l, t, yft));
            yt.push((l, f, ytf));
            yt.push((l, t, ytt));

            ybus.push((f, f, yff));
            ybus.push((f, t, yft));
            ybus.push((t, f, ytf));
            ybus.push((t, t, ytt));

            from.push(f);
            to.push(t);
        }

        for (i, &ysh) in bus_shunts.iter().enumerate() {
            if ysh != Complex64::new(0.0, 0.0) {
                ybus.push((i, i, ysh));
            }
        }

        Ok(Self {
            ybus: ComplexCsr::from_triplets((n_bus, n_bus), &ybus),
            yf: ComplexCsr::from_triplets((n_branch, n_bus), &yf),
            yt: ComplexCsr::from_triplets((n_branch, n_bus), &yt),
            from,
            to,
        })
    }

    pub fn ybus(&self) -> &ComplexCsr {
        &self.ybus
    }

    pub fn yf(&self) -> &ComplexCsr {
        &self.yf
    }

    pub fn yt(&self) -> &ComplexCsr {
        &self.yt
    }

    pub fn n_bus(&self) -> usize {
        self.ybus.rows()
    }

    pub fn n_branch(&self) -> usize {
        self.yf.rows()
    }

    /// Complex branch flows at both ends `(Sf, St)` (p.u.)
    pub fn branch_flows(&self, v: &[Complex64]) -> (Vec<Complex64>, Vec<Complex64>) {
        let i_f = self.yf.mul_vec(v);
        let i_t = self.yt.mul_vec(v);
        let sf = self.from.iter().zip(&i_f).map(|(&f, i)| v[f] * i.conj()).collect();
        let st = self.to.iter().zip(&i_t).map(|(&t, i)| v[t] * i.conj()).collect();
        (sf, st)
    }
}
