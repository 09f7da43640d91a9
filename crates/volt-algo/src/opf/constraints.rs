//! Constraint blocks of the OPF model.
//!
//! Linear constraints are stacked into a single sparse system
//! `l ≤ A·x ≤ u` in a fixed block order:
//!
//! | Block  | Mode | Meaning |
//! |--------|------|---------|
//! | `Pmis` | DC   | nodal active power balance `[B, −Cg]·[Va; Pg] = −(Pd + Gs) − Pbusinj` |
//! | `Pf`   | DC   | source-end flow limit `Bf·Va ≤ rate − Pfinj` |
//! | `Pt`   | DC   | target-end flow limit `−Bf·Va ≤ rate + Pfinj` |
//! | `ang`  | both | angle difference limits `θf − θt ∈ [angmin, angmax]` |
//! | `vl`   | AC   | constant power factor of dispatchable loads |
//! | `PQh`  | AC   | upper generator capability hyperplane |
//! | `PQl`  | AC   | lower generator capability hyperplane |
//! | `ycon` | both | piecewise-linear cost envelope (see [`super::costs`]) |
//!
//! AC adds nonlinear `Pmis`/`Qmis` equalities and `Sf`/`St` inequalities
//! that are evaluated by [`super::ac_equations`]; here they only reserve
//! their row ranges.
//!
//! A block with zero rows keeps its place in the list (with an empty row
//! range) so that every block can be looked up the same way regardless of
//! which features the network uses.

use std::fmt;
use std::ops::Range;

use serde::Serialize;
use sprs::{CsMat, TriMat};
use volt_core::{VoltError, VoltResult};

use super::model::{DispatchUnit, OpfBranch};
use super::variables::{VarKind, VariableSet};
use crate::sparse::SparseSusceptance;

/// Name of a constraint block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConstraintKind {
    Pmis,
    Qmis,
    Pf,
    Pt,
    Sf,
    St,
    Ang,
    Vl,
    PQh,
    PQl,
    Ycon,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Pmis => "Pmis",
            ConstraintKind::Qmis => "Qmis",
            ConstraintKind::Pf => "Pf",
            ConstraintKind::Pt => "Pt",
            ConstraintKind::Sf => "Sf",
            ConstraintKind::St => "St",
            ConstraintKind::Ang => "ang",
            ConstraintKind::Vl => "vl",
            ConstraintKind::PQh => "PQh",
            ConstraintKind::PQl => "PQl",
            ConstraintKind::Ycon => "ycon",
        };
        f.write_str(name)
    }
}

/// Rows of a linear block before they are placed in the stacked matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockData {
    pub rows: usize,
    /// `(row, column, value)` with rows local to the block
    pub entries: Vec<(usize, usize, f64)>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BlockData {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append one row; returns its local index.
    pub fn push_row(&mut self, coefficients: &[(usize, f64)], lower: f64, upper: f64) -> usize {
        let row = self.rows;
        self.entries
            .extend(coefficients.iter().map(|&(col, value)| (row, col, value)));
        self.lower.push(lower);
        self.upper.push(upper);
        self.rows += 1;
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearBlock {
    pub kind: ConstraintKind,
    pub offset: usize,
    pub data: BlockData,
}

impl LinearBlock {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.data.rows
    }
}

/// Row reservation for a nonlinear block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonlinearBlock {
    pub kind: ConstraintKind,
    pub offset: usize,
    pub rows: usize,
}

/// Ordered linear and nonlinear constraint blocks
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    n_cols: usize,
    linear: Vec<LinearBlock>,
    n_linear: usize,
    nonlinear_eq: Vec<NonlinearBlock>,
    n_nonlinear_eq: usize,
    nonlinear_ineq: Vec<NonlinearBlock>,
    n_nonlinear_ineq: usize,
}

impl ConstraintSet {
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            linear: Vec::new(),
            n_linear: 0,
            nonlinear_eq: Vec::new(),
            n_nonlinear_eq: 0,
            nonlinear_ineq: Vec::new(),
            n_nonlinear_ineq: 0,
        }
    }

    pub fn add_linear(&mut self, kind: ConstraintKind, data: BlockData) -> VoltResult<()> {
        if data.lower.len() != data.rows || data.upper.len() != data.rows {
            return Err(VoltError::Numeric(format!(
                "constraint block {kind} has {} rows but {}/{} bounds",
                data.rows,
                data.lower.len(),
                data.upper.len()
            )));
        }
        if let Some(&(r, c, _)) = data
            .entries
            .iter()
            .find(|&&(r, c, _)| r >= data.rows || c >= self.n_cols)
        {
            return Err(VoltError::Numeric(format!(
                "constraint block {kind} entry ({r}, {c}) outside {}x{}",
                data.rows, self.n_cols
            )));
        }
        let offset = self.n_linear;
        self.n_linear += data.rows;
        self.linear.push(LinearBlock { kind, offset, data });
        Ok(())
    }

    pub fn add_nonlinear_eq(&mut self, kind: ConstraintKind, rows: usize) {
        self.nonlinear_eq.push(NonlinearBlock {
            kind,
            offset: self.n_nonlinear_eq,
            rows,
        });
        self.n_nonlinear_eq += rows;
    }

    pub fn add_nonlinear_ineq(&mut self, kind: ConstraintKind, rows: usize) {
        self.nonlinear_ineq.push(NonlinearBlock {
            kind,
            offset: self.n_nonlinear_ineq,
            rows,
        });
        self.n_nonlinear_ineq += rows;
    }

    pub fn linear_blocks(&self) -> &[LinearBlock] {
        &self.linear
    }

    /// Number of linear rows
    pub fn n_linear(&self) -> usize {
        self.n_linear
    }

    pub fn n_nonlinear_eq(&self) -> usize {
        self.n_nonlinear_eq
    }

    pub fn n_nonlinear_ineq(&self) -> usize {
        self.n_nonlinear_ineq
    }

    /// Rows of a linear block in `A`; empty when absent.
    pub fn range(&self, kind: ConstraintKind) -> Range<usize> {
        self.linear
            .iter()
            .find(|b| b.kind == kind)
            .map(|b| b.range())
            .unwrap_or(0..0)
    }

    /// Rows of a nonlinear block among the equalities or inequalities.
    pub fn nonlinear_range(&self, kind: ConstraintKind) -> Range<usize> {
        self.nonlinear_eq
            .iter()
            .chain(&self.nonlinear_ineq)
            .find(|b| b.kind == kind)
            .map(|b| b.offset..b.offset + b.rows)
            .unwrap_or(0..0)
    }

    /// Stack every linear block into `(A, l, u)`.
    pub fn assemble(&self) -> (CsMat<f64>, Vec<f64>, Vec<f64>) {
        let nnz = self.linear.iter().map(|b| b.data.entries.len()).sum();
        let mut triplets = TriMat::with_capacity((self.n_linear, self.n_cols), nnz);
        let mut lower = Vec::with_capacity(self.n_linear);
        let mut upper = Vec::with_capacity(self.n_linear);
        for block in &self.linear {
            for &(r, c, v) in &block.data.entries {
                triplets.add_triplet(block.offset + r, c, v);
            }
            lower.extend_from_slice(&block.data.lower);
            upper.extend_from_slice(&block.data.upper);
        }
        (triplets.to_csr(), lower, upper)
    }
}

// ============================================================================
// Block builders
// ============================================================================

/// DC nodal balance: `B·Va − Cg·Pg = −(Pd + Gs)/base − Pbusinj`.
///
/// `demand_pu` already holds `(Pd + Gs)/base` for every bus.
pub fn dc_power_balance(
    susceptance: &SparseSusceptance,
    units: &[DispatchUnit],
    vars: &VariableSet,
    demand_pu: &[f64],
) -> BlockData {
    let n_bus = susceptance.n_bus();
    let va = vars.offset(VarKind::Va);
    let pg = vars.offset(VarKind::Pg);

    let mut entries: Vec<(usize, usize, f64)> = susceptance
        .bbus()
        .iter()
        .map(|(&v, (r, c))| (r, va + c, v))
        .collect();
    entries.extend(
        units
            .iter()
            .enumerate()
            .map(|(u, unit)| (unit.bus, pg + u, -1.0)),
    );

    let rhs: Vec<f64> = demand_pu
        .iter()
        .zip(susceptance.pbusinj())
        .map(|(d, inj)| -d - inj)
        .collect();

    BlockData {
        rows: n_bus,
        entries,
        lower: rhs.clone(),
        upper: rhs,
    }
}

/// DC thermal limits at both ends of every rated branch.
///
/// Returns `(Pf, Pt)`; row `k` of each belongs to `limited[k]`.
pub fn dc_branch_flow_limits(
    susceptance: &SparseSusceptance,
    branches: &[OpfBranch],
    limited: &[usize],
    vars: &VariableSet,
    base_mva: f64,
) -> (BlockData, BlockData) {
    let va = vars.offset(VarKind::Va);
    let mut pf = BlockData::empty();
    let mut pt = BlockData::empty();

    for &l in limited {
        let rate = branches[l].branch.limit_pu(base_mva).unwrap_or(f64::INFINITY);
        let pfinj = susceptance.pfinj()[l];
        let row: Vec<(usize, f64)> = susceptance
            .bf()
            .outer_view(l)
            .map(|r| r.iter().map(|(c, &v)| (va + c, v)).collect())
            .unwrap_or_default();
        let negated: Vec<(usize, f64)> = row.iter().map(|&(c, v)| (c, -v)).collect();

        pf.push_row(&row, f64::NEG_INFINITY, rate - pfinj);
        pt.push_row(&negated, f64::NEG_INFINITY, rate + pfinj);
    }
    (pf, pt)
}

/// Branches whose angle-difference limits produce `ang` rows.
///
/// Limits at or beyond ±360° are treated as absent.
pub fn angle_limited_branches(branches: &[OpfBranch]) -> Vec<usize> {
    let full_turn = 2.0 * std::f64::consts::PI;
    branches
        .iter()
        .enumerate()
        .filter(|(_, b)| {
            let min = b.branch.angle_min.map(|a| a.value()).filter(|a| *a > -full_turn);
            let max = b.branch.angle_max.map(|a| a.value()).filter(|a| *a < full_turn);
            min.is_some() || max.is_some()
        })
        .map(|(l, _)| l)
        .collect()
}

/// `θf − θt ∈ [angmin, angmax]` for the given branches.
pub fn angle_difference_limits(
    branches: &[OpfBranch],
    limited: &[usize],
    vars: &VariableSet,
) -> VoltResult<BlockData> {
    let va = vars.offset(VarKind::Va);
    let full_turn = 2.0 * std::f64::consts::PI;
    let mut block = BlockData::empty();
    for &l in limited {
        let b = &branches[l];
        let lower = b
            .branch
            .angle_min
            .map(|a| a.value())
            .filter(|a| *a > -full_turn)
            .unwrap_or(f64::NEG_INFINITY);
        let upper = b
            .branch
            .angle_max
            .map(|a| a.value())
            .filter(|a| *a < full_turn)
            .unwrap_or(f64::INFINITY);
        if lower > upper {
            return Err(VoltError::Bounds(format!(
                "branch '{}' has angle_min > angle_max",
                b.branch.name
            )));
        }
        block.push_row(&[(va + b.from, 1.0), (va + b.to, -1.0)], lower, upper);
    }
    Ok(block)
}

/// Units held at a constant power factor by the `vl` block.
pub fn constant_pf_units(units: &[DispatchUnit]) -> Vec<usize> {
    units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.is_load() && (u.qmin != 0.0 || u.qmax != 0.0))
        .map(|(i, _)| i)
        .collect()
}

/// `sin(θ)·Pg − cos(θ)·Qg = 0` with `θ = atan2(Q, Pmin)` for each
/// dispatchable load, `Q` being whichever of Qmin/Qmax is non-zero.
pub fn load_power_factor(
    units: &[DispatchUnit],
    vl_units: &[usize],
    vars: &VariableSet,
) -> VoltResult<BlockData> {
    let pg = vars.offset(VarKind::Pg);
    let qg = vars.offset(VarKind::Qg);
    let mut block = BlockData::empty();
    for &u in vl_units {
        let unit = &units[u];
        let q = if unit.qmin != 0.0 { unit.qmin } else { unit.qmax };
        if unit.pmin == 0.0 {
            return Err(VoltError::Bounds(format!(
                "dispatchable load {u} has reactive limits but zero Pmin"
            )));
        }
        let theta = q.atan2(unit.pmin);
        block.push_row(&[(pg + u, theta.sin()), (qg + u, -theta.cos())], 0.0, 0.0);
    }
    Ok(block)
}

/// Units with a sloped upper (`PQh`) or lower (`PQl`) capability side.
pub fn capability_units(units: &[DispatchUnit]) -> VoltResult<(Vec<usize>, Vec<usize>)> {
    let mut upper = Vec::new();
    let mut lower = Vec::new();
    for (u, unit) in units.iter().enumerate() {
        let Some(cap) = &unit.capability else {
            continue;
        };
        if cap.pc1.value() >= cap.pc2.value() {
            return Err(VoltError::Bounds(format!(
                "unit {u} capability curve needs Pc1 < Pc2 (got {} and {})",
                cap.pc1, cap.pc2
            )));
        }
        if cap.qc1_max != cap.qc2_max {
            upper.push(u);
        }
        if cap.qc1_min != cap.qc2_min {
            lower.push(u);
        }
    }
    Ok((upper, lower))
}

/// Normalized capability hyperplanes `a·Pg + b·Qg ≤ c`. Returns `(PQh, PQl)`.
pub fn capability_curve(
    units: &[DispatchUnit],
    upper_units: &[usize],
    lower_units: &[usize],
    vars: &VariableSet,
    base_mva: f64,
) -> (BlockData, BlockData) {
    let pg = vars.offset(VarKind::Pg);
    let qg = vars.offset(VarKind::Qg);

    let hyperplane = |u: usize, a: f64, b: f64, p1: f64, q1: f64, block: &mut BlockData| {
        let norm = (a * a + b * b).sqrt();
        let (a, b) = (a / norm, b / norm);
        let rhs = (a * p1 + b * q1) / base_mva;
        block.push_row(&[(pg + u, a), (qg + u, b)], f64::NEG_INFINITY, rhs);
    };

    let mut pqh = BlockData::empty();
    for &u in upper_units {
        if let Some(cap) = &units[u].capability {
            hyperplane(
                u,
                cap.qc1_max.value() - cap.qc2_max.value(),
                cap.pc2.value() - cap.pc1.value(),
                cap.pc1.value(),
                cap.qc1_max.value(),
                &mut pqh,
            );
        }
    }
    let mut pql = BlockData::empty();
    for &u in lower_units {
        if let Some(cap) = &units[u].capability {
            hyperplane(
                u,
                cap.qc2_min.value() - cap.qc1_min.value(),
                cap.pc1.value() - cap.pc2.value(),
                cap.pc1.value(),
                cap.qc1_min.value(),
                &mut pql,
            );
        }
    }
    (pqh, pql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_row_and_assemble() {
        let mut vars = VariableSet::new();
        vars.add(VarKind::Va, vec![-1.0; 2], vec![1.0; 2]);

        let mut first = BlockData::empty();
        first.push_row(&[(0, 1.0), (1, -1.0)], -0.5, 0.5);
        let mut set = ConstraintSet::new(vars.len());
        set.add_linear(ConstraintKind::Ang, first).unwrap();
        set.add_linear(ConstraintKind::Vl, BlockData::empty()).unwrap();
        let mut second = BlockData::empty();
        second.push_row(&[(1, 2.0)], f64::NEG_INFINITY, 3.0);
        set.add_linear(ConstraintKind::Ycon, second).unwrap();

        assert_eq!(set.n_linear(), 2);
        assert_eq!(set.range(ConstraintKind::Vl), 1..1);
        assert_eq!(set.range(ConstraintKind::Ycon), 1..2);
        assert_eq!(set.range(ConstraintKind::PQh), 0..0);

        let (a, l, u) = set.assemble();
        assert_eq!(a.rows(), 2);
        assert_eq!(a.cols(), 2);
        assert_eq!(a.get(1, 1).copied(), Some(2.0));
        assert_eq!(l, vec![-0.5, f64::NEG_INFINITY]);
        assert_eq!(u, vec![0.5, 3.0]);
    }

    #[test]
    fn test_out_of_range_entry_is_rejected() {
        let mut set = ConstraintSet::new(2);
        let mut block = BlockData::empty();
        block.push_row(&[(5, 1.0)], 0.0, 0.0);
        assert!(set.add_linear(ConstraintKind::Ang, block).is_err());
    }

    #[test]
    fn test_nonlinear_ranges() {
        let mut set = ConstraintSet::new(4);
        set.add_nonlinear_eq(ConstraintKind::Pmis, 3);
        set.add_nonlinear_eq(ConstraintKind::Qmis, 3);
        set.add_nonlinear_ineq(ConstraintKind::Sf, 2);
        set.add_nonlinear_ineq(ConstraintKind::St, 2);
        assert_eq!(set.nonlinear_range(ConstraintKind::Qmis), 3..6);
        assert_eq!(set.nonlinear_range(ConstraintKind::St), 2..4);
        assert_eq!(set.n_nonlinear_ineq(), 4);
    }
}
