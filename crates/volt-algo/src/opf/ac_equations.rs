//! Polar AC network equations and their derivatives.
//!
//! With `V = Vm·e^{j·Va}` and `S = V∘conj(Ybus·V)`:
//!
//! ```text
//! g(x) = [ Re(S − Cg·(Pg + j·Qg) + Sd) ]      (Pmis)
//!        [ Im(S − Cg·(Pg + j·Qg) + Sd) ]      (Qmis)
//! h(x) = [ |Sf|² − Fmax² ]                    (Sf, rated branches)
//!        [ |St|² − Fmax² ]                    (St)
//! ```
//!
//! First derivatives follow the standard polar expressions
//!
//! ```text
//! ∂S/∂Va = j·diag(V)·conj(diag(I) − Ybus·diag(V))
//! ∂S/∂Vm = diag(V)·conj(Ybus·diag(V/|V|)) + conj(diag(I))·diag(V/|V|)
//! ```
//!
//! and the Hessian terms are accumulated entry by entry from the products
//! of those derivatives with the current multipliers, so no dense matrix is
//! ever formed.

use std::collections::BTreeMap;

use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use volt_core::{VoltError, VoltResult};

use super::model::OpfModel;
use super::pips::{NonlinearConstraints, NonlinearEval};
use super::variables::VarKind;

const J: Complex64 = Complex64::new(0.0, 1.0);

/// Sparse complex accumulator with deterministic iteration order.
#[derive(Debug, Default)]
struct ComplexEntries(BTreeMap<(usize, usize), Complex64>);

impl ComplexEntries {
    fn add(&mut self, i: usize, k: usize, value: Complex64) {
        *self.0.entry((i, k)).or_default() += value;
    }

    #[cfg(test)]
    fn get(&self, i: usize, k: usize) -> Complex64 {
        self.0.get(&(i, k)).copied().unwrap_or_default()
    }

    fn iter(&self) -> impl Iterator<Item = (usize, usize, Complex64)> + '_ {
        self.0.iter().map(|(&(i, k), &v)| (i, k, v))
    }
}

/// Second-derivative blocks w.r.t. (Va, Va), (Va, Vm), (Vm, Va), (Vm, Vm)
#[derive(Default)]
struct SecondDerivatives {
    aa: ComplexEntries,
    av: ComplexEntries,
    va: ComplexEntries,
    vv: ComplexEntries,
}

/// Flow at one end of a branch with its voltage derivatives.
struct BranchEnd {
    s: Complex64,
    dva: Vec<(usize, Complex64)>,
    dvm: Vec<(usize, Complex64)>,
}

/// Which end of the rated branches a block refers to
#[derive(Clone, Copy)]
enum Side {
    From,
    To,
}

/// AC power balance and branch flow limits for one OPF model.
pub struct AcEquations<'a> {
    model: &'a OpfModel,
    n_bus: usize,
    nx: usize,
    va: usize,
    vm: usize,
    pg: usize,
    qg: usize,
    ybus_rows: Vec<Vec<(usize, Complex64)>>,
    yf_rows: Vec<Vec<(usize, Complex64)>>,
    yt_rows: Vec<Vec<(usize, Complex64)>>,
    /// Fixed demand per bus (p.u.)
    sd: Vec<Complex64>,
    /// Squared flow limit per rated branch (p.u.)
    flow_max_sq: Vec<f64>,
}

impl<'a> AcEquations<'a> {
    pub fn new(model: &'a OpfModel) -> VoltResult<Self> {
        let admittance = model.admittance.as_ref().ok_or_else(|| {
            VoltError::Config("AC equations need a model built with the AC method".into())
        })?;
        let vars = &model.variables;
        if vars.block(VarKind::Vm).is_none() || vars.block(VarKind::Qg).is_none() {
            return Err(VoltError::Config(
                "AC equations need Vm and Qg variables".into(),
            ));
        }

        let n_bus = model.n_bus();
        let ybus_rows = (0..n_bus).map(|i| admittance.ybus().row(i)).collect();
        let yf_rows = model
            .flow_limited
            .iter()
            .map(|&l| admittance.yf().row(l))
            .collect();
        let yt_rows = model
            .flow_limited
            .iter()
            .map(|&l| admittance.yt().row(l))
            .collect();
        let flow_max_sq = model
            .flow_limited
            .iter()
            .map(|&l| {
                let rate = model.branches[l]
                    .branch
                    .limit_pu(model.base_mva)
                    .unwrap_or(f64::INFINITY);
                rate * rate
            })
            .collect();

        Ok(Self {
            model,
            n_bus,
            nx: vars.len(),
            va: vars.offset(VarKind::Va),
            vm: vars.offset(VarKind::Vm),
            pg: vars.offset(VarKind::Pg),
            qg: vars.offset(VarKind::Qg),
            ybus_rows,
            yf_rows,
            yt_rows,
            sd: model
                .buses
                .iter()
                .map(|b| Complex64::new(b.pd, b.qd))
                .collect(),
            flow_max_sq,
        })
    }

    /// Complex bus voltages at `x`.
    pub fn voltages(&self, x: &[f64]) -> Vec<Complex64> {
        (0..self.n_bus)
            .map(|i| Complex64::from_polar(x[self.vm + i], x[self.va + i]))
            .collect()
    }

    fn magnitudes<'x>(&self, x: &'x [f64]) -> &'x [f64] {
        &x[self.vm..self.vm + self.n_bus]
    }

    fn bus_currents(&self, v: &[Complex64]) -> Vec<Complex64> {
        self.ybus_rows
            .iter()
            .map(|row| row.iter().map(|&(k, y)| y * v[k]).sum())
            .collect()
    }

    fn rated_ends(&self, side: Side) -> (&[Vec<(usize, Complex64)>], Vec<usize>) {
        let rows = match side {
            Side::From => &self.yf_rows,
            Side::To => &self.yt_rows,
        }
        .as_slice();
        let ends = self
            .model
            .flow_limited
            .iter()
            .map(|&l| match side {
                Side::From => self.model.branches[l].from,
                Side::To => self.model.branches[l].to,
            })
            .collect();
        (rows, ends)
    }

    /// Flow `S = V_e·conj(Ybr_l·V)` at end `e` and its derivatives.
    fn branch_end(
        row: &[(usize, Complex64)],
        end: usize,
        v: &[Complex64],
        vm: &[f64],
    ) -> BranchEnd {
        let current: Complex64 = row.iter().map(|&(k, y)| y * v[k]).sum();
        let ve = v[end];
        let mut dva = Vec::with_capacity(row.len() + 1);
        let mut dvm = Vec::with_capacity(row.len() + 1);
        for &(k, y) in row {
            let yv = y * v[k];
            dva.push((k, -J * ve * yv.conj()));
            dvm.push((k, ve * (yv / vm[k]).conj()));
        }
        dva.push((end, J * current.conj() * ve));
        dvm.push((end, current.conj() * ve / vm[end]));
        BranchEnd {
            s: ve * current.conj(),
            dva,
            dvm,
        }
    }

    /// Second derivatives of `λᵀ·S(V)` for a real multiplier vector.
    fn bus_power_second_derivatives(
        &self,
        v: &[Complex64],
        vm: &[f64],
        current: &[Complex64],
        lam: &[f64],
    ) -> SecondDerivatives {
        let n = self.n_bus;
        let mut c = ComplexEntries::default();
        let mut e = ComplexEntries::default();
        let mut col_sum = vec![Complex64::default(); n];
        for (i, row) in self.ybus_rows.iter().enumerate() {
            for &(k, y) in row {
                c.add(i, k, lam[i] * v[i] * (y * v[k]).conj());
                let d = y.conj() * v[i] * lam[i];
                e.add(k, i, v[k].conj() * d);
                col_sum[k] += d;
            }
        }
        for i in 0..n {
            e.add(i, i, -v[i].conj() * col_sum[i]);
        }

        // F = C − diag(λ∘V∘conj(I))
        let mut f = ComplexEntries::default();
        for (i, k, value) in c.iter() {
            f.add(i, k, value);
        }
        for i in 0..n {
            f.add(i, i, -lam[i] * v[i] * current[i].conj());
        }

        let mut out = SecondDerivatives::default();
        for (i, k, value) in e.iter() {
            out.aa.add(i, k, value);
            out.va.add(i, k, J * value / vm[i]);
            out.av.add(k, i, J * value / vm[i]);
        }
        for (i, k, value) in f.iter() {
            out.aa.add(i, k, value);
            out.va.add(i, k, -J * value / vm[i]);
            out.av.add(k, i, -J * value / vm[i]);
        }
        for (i, k, value) in c.iter() {
            let scaled = value / (vm[i] * vm[k]);
            out.vv.add(i, k, scaled);
            out.vv.add(k, i, scaled);
        }
        out
    }

    /// Second derivatives of `Σ μ_l·|S_l|²` for one end of the rated branches.
    fn flow_second_derivatives(
        &self,
        side: Side,
        v: &[Complex64],
        vm: &[f64],
        mu: &[f64],
    ) -> SecondDerivatives {
        let (rows, ends) = self.rated_ends(side);

        // A = Ybrᴴ·diag(conj(S)∘μ)·Cbr, plus the first-derivative outer products
        let mut a = ComplexEntries::default();
        let mut out = SecondDerivatives::default();
        for (k, (row, &end)) in rows.iter().zip(&ends).enumerate() {
            if mu[k] == 0.0 {
                continue;
            }
            let flow = Self::branch_end(row, end, v, vm);
            let weight = flow.s.conj() * mu[k];
            for &(i, y) in row {
                a.add(i, end, y.conj() * weight);
            }
            for &(i, di) in &flow.dva {
                for &(j, dj) in &flow.dva {
                    out.aa.add(i, j, di * mu[k] * dj.conj());
                }
                for &(j, dj) in &flow.dvm {
                    out.av.add(i, j, di * mu[k] * dj.conj());
                }
            }
            for &(i, di) in &flow.dvm {
                for &(j, dj) in &flow.dva {
                    out.va.add(i, j, di * mu[k] * dj.conj());
                }
                for &(j, dj) in &flow.dvm {
                    out.vv.add(i, j, di * mu[k] * dj.conj());
                }
            }
        }

        let n = self.n_bus;
        let mut b = ComplexEntries::default();
        let mut d = vec![Complex64::default(); n];
        let mut e = vec![Complex64::default(); n];
        for (i, k, value) in a.iter() {
            b.add(i, k, v[i].conj() * value * v[k]);
            d[i] += value * v[k];
            e[k] += value * v[i].conj();
        }
        for i in 0..n {
            d[i] *= v[i].conj();
            e[i] *= v[i];
        }

        for (i, k, value) in b.iter() {
            // F = B + Bᵀ
            out.aa.add(i, k, value);
            out.aa.add(k, i, value);
            out.vv.add(i, k, value / (vm[i] * vm[k]));
            out.vv.add(k, i, value / (vm[i] * vm[k]));
            // B − Bᵀ, scaled by j/|V| on the Vm row
            out.va.add(i, k, J * value / vm[i]);
            out.va.add(k, i, -J * value / vm[k]);
            out.av.add(k, i, J * value / vm[i]);
            out.av.add(i, k, -J * value / vm[k]);
        }
        for i in 0..n {
            out.aa.add(i, i, -d[i] - e[i]);
            let diag = J * (e[i] - d[i]) / vm[i];
            out.va.add(i, i, diag);
            out.av.add(i, i, diag);
        }
        out
    }

    /// Push `Re(blocks)` (or `Im` when `imag`) scaled by `factor` into `tri`.
    fn push_blocks(&self, tri: &mut TriMat<f64>, blocks: &SecondDerivatives, imag: bool, factor: f64) {
        let part = |c: Complex64| if imag { c.im } else { c.re };
        let placements = [
            (&blocks.aa, self.va, self.va),
            (&blocks.av, self.va, self.vm),
            (&blocks.va, self.vm, self.va),
            (&blocks.vv, self.vm, self.vm),
        ];
        for (entries, row0, col0) in placements {
            for (i, k, value) in entries.iter() {
                let v = factor * part(value);
                if v != 0.0 {
                    tri.add_triplet(row0 + i, col0 + k, v);
                }
            }
        }
    }

    #[cfg(test)]
    fn block_entry(blocks: &SecondDerivatives, which: usize, i: usize, k: usize) -> Complex64 {
        match which {
            0 => blocks.aa.get(i, k),
            1 => blocks.av.get(i, k),
            2 => blocks.va.get(i, k),
            _ => blocks.vv.get(i, k),
        }
    }
}

impl NonlinearConstraints for AcEquations<'_> {
    fn n_eq(&self) -> usize {
        2 * self.n_bus
    }

    fn n_ineq(&self) -> usize {
        2 * self.flow_max_sq.len()
    }

    fn evaluate(&self, x: &[f64]) -> NonlinearEval {
        let n = self.n_bus;
        let v = self.voltages(x);
        let vm = self.magnitudes(x);
        let current = self.bus_currents(&v);

        // ====================================================================
        // Power balance
        // ====================================================================
        let mut mismatch: Vec<Complex64> = (0..n)
            .map(|i| v[i] * current[i].conj() + self.sd[i])
            .collect();
        for (u, unit) in self.model.units.iter().enumerate() {
            mismatch[unit.bus] -= Complex64::new(x[self.pg + u], x[self.qg + u]);
        }
        let g: Vec<f64> = mismatch
            .iter()
            .map(|s| s.re)
            .chain(mismatch.iter().map(|s| s.im))
            .collect();

        let mut jac_g = TriMat::new((2 * n, self.nx));
        let mut push_bus = |i: usize, k: usize, dva: Complex64, dvm: Complex64| {
            jac_g.add_triplet(i, self.va + k, dva.re);
            jac_g.add_triplet(n + i, self.va + k, dva.im);
            jac_g.add_triplet(i, self.vm + k, dvm.re);
            jac_g.add_triplet(n + i, self.vm + k, dvm.im);
        };
        for (i, row) in self.ybus_rows.iter().enumerate() {
            for &(k, y) in row {
                let yv = y * v[k];
                push_bus(i, k, -J * v[i] * yv.conj(), v[i] * (yv / vm[k]).conj());
            }
            push_bus(
                i,
                i,
                J * v[i] * current[i].conj(),
                current[i].conj() * v[i] / vm[i],
            );
        }
        for (u, unit) in self.model.units.iter().enumerate() {
            jac_g.add_triplet(unit.bus, self.pg + u, -1.0);
            jac_g.add_triplet(n + unit.bus, self.qg + u, -1.0);
        }

        // ====================================================================
        // Branch flow limits
        // ====================================================================
        let n_lim = self.flow_max_sq.len();
        let mut h = vec![0.0; 2 * n_lim];
        let mut jac_h = TriMat::new((2 * n_lim, self.nx));
        for (side, offset) in [(Side::From, 0), (Side::To, n_lim)] {
            let (rows, ends) = self.rated_ends(side);
            for (k, (row, &end)) in rows.iter().zip(&ends).enumerate() {
                let flow = Self::branch_end(row, end, &v, vm);
                h[offset + k] = flow.s.norm_sqr() - self.flow_max_sq[k];
                for &(c, d) in &flow.dva {
                    let value = 2.0 * (flow.s.re * d.re + flow.s.im * d.im);
                    jac_h.add_triplet(offset + k, self.va + c, value);
                }
                for &(c, d) in &flow.dvm {
                    let value = 2.0 * (flow.s.re * d.re + flow.s.im * d.im);
                    jac_h.add_triplet(offset + k, self.vm + c, value);
                }
            }
        }

        NonlinearEval {
            g,
            h,
            jac_g: jac_g.to_csr(),
            jac_h: jac_h.to_csr(),
        }
    }

    fn hessian(&self, x: &[f64], lam: &[f64], mu: &[f64]) -> CsMat<f64> {
        let n = self.n_bus;
        let v = self.voltages(x);
        let vm = self.magnitudes(x);
        let current = self.bus_currents(&v);
        let mut tri = TriMat::new((self.nx, self.nx));

        let gp = self.bus_power_second_derivatives(&v, vm, &current, &lam[..n]);
        let gq = self.bus_power_second_derivatives(&v, vm, &current, &lam[n..2 * n]);
        self.push_blocks(&mut tri, &gp, false, 1.0);
        self.push_blocks(&mut tri, &gq, true, 1.0);

        let n_lim = self.flow_max_sq.len();
        if n_lim > 0 {
            let hf = self.flow_second_derivatives(Side::From, &v, vm, &mu[..n_lim]);
            let ht = self.flow_second_derivatives(Side::To, &v, vm, &mu[n_lim..2 * n_lim]);
            self.push_blocks(&mut tri, &hf, false, 2.0);
            self.push_blocks(&mut tri, &ht, false, 2.0);
        }
        tri.to_csr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::{build_opf_model, OpfMethod, OpfOptions};
    use crate::test_utils::case6ww;

    fn ac_model() -> OpfModel {
        let options = OpfOptions::default().with_method(OpfMethod::Ac);
        build_opf_model(&case6ww(), &options).unwrap()
    }

    /// A point away from the flat start so every derivative term is active.
    fn perturbed_point(model: &OpfModel) -> Vec<f64> {
        let mut x = model.initial_point();
        for (k, value) in x.iter_mut().enumerate() {
            *value += 0.01 * ((k * 7 % 5) as f64 - 2.0);
        }
        x
    }

    fn dense(m: &CsMat<f64>) -> Vec<Vec<f64>> {
        let mut out = vec![vec![0.0; m.cols()]; m.rows()];
        for (&v, (r, c)) in m.iter() {
            out[r][c] += v;
        }
        out
    }

    #[test]
    fn test_jacobians_match_finite_differences() {
        let model = ac_model();
        let eq = AcEquations::new(&model).unwrap();
        let x = perturbed_point(&model);
        let base = eq.evaluate(&x);
        let jg = dense(&base.jac_g);
        let jh = dense(&base.jac_h);

        let step = 1e-7;
        for col in 0..x.len() {
            let mut xp = x.clone();
            xp[col] += step;
            let shifted = eq.evaluate(&xp);
            for row in 0..base.g.len() {
                let fd = (shifted.g[row] - base.g[row]) / step;
                assert!(
                    (fd - jg[row][col]).abs() < 1e-4,
                    "dg[{row}]/dx[{col}]: analytic {} vs fd {}",
                    jg[row][col],
                    fd
                );
            }
            for row in 0..base.h.len() {
                let fd = (shifted.h[row] - base.h[row]) / step;
                assert!(
                    (fd - jh[row][col]).abs() < 1e-4,
                    "dh[{row}]/dx[{col}]: analytic {} vs fd {}",
                    jh[row][col],
                    fd
                );
            }
        }
    }

    #[test]
    fn test_hessian_matches_finite_differences_of_jacobian() {
        let model = ac_model();
        let eq = AcEquations::new(&model).unwrap();
        let x = perturbed_point(&model);
        let lam: Vec<f64> = (0..eq.n_eq()).map(|k| 0.5 + 0.1 * k as f64).collect();
        let mu: Vec<f64> = (0..eq.n_ineq()).map(|k| 0.2 + 0.05 * k as f64).collect();

        // ∇ₓ(λᵀ∇g + μᵀ∇h)
        let gradient = |x: &[f64]| -> Vec<f64> {
            let e = eq.evaluate(x);
            let mut out = crate::sparse::mul_vec_transpose(&e.jac_g, &lam);
            for (o, v) in out.iter_mut().zip(crate::sparse::mul_vec_transpose(&e.jac_h, &mu)) {
                *o += v;
            }
            out
        };
        let hess = dense(&eq.hessian(&x, &lam, &mu));
        let g0 = gradient(&x);
        let step = 1e-7;
        for col in 0..x.len() {
            let mut xp = x.clone();
            xp[col] += step;
            let g1 = gradient(&xp);
            for row in 0..x.len() {
                let fd = (g1[row] - g0[row]) / step;
                assert!(
                    (fd - hess[row][col]).abs() < 1e-3 * (1.0 + fd.abs()),
                    "H[{row}][{col}]: analytic {} vs fd {}",
                    hess[row][col],
                    fd
                );
            }
        }
    }

    #[test]
    fn test_power_balance_second_derivatives_are_symmetric() {
        let model = ac_model();
        let eq = AcEquations::new(&model).unwrap();
        let x = perturbed_point(&model);
        let v = eq.voltages(&x);
        let vm = eq.magnitudes(&x).to_vec();
        let current = eq.bus_currents(&v);
        let lam = vec![1.0; eq.n_bus];
        let blocks = eq.bus_power_second_derivatives(&v, &vm, &current, &lam);
        for i in 0..eq.n_bus {
            for k in 0..eq.n_bus {
                let av = AcEquations::block_entry(&blocks, 1, i, k);
                let va = AcEquations::block_entry(&blocks, 2, k, i);
                assert!((av - va).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn test_dc_model_is_rejected() {
        let model = build_opf_model(&case6ww(), &OpfOptions::default()).unwrap();
        assert!(matches!(AcEquations::new(&model), Err(VoltError::Config(_))));
    }
}
