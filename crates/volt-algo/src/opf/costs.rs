//! Objective assembly.
//!
//! Unit costs are gathered into an intermediate "w-space" and mapped back
//! onto `x` with the general quadratic transform
//!
//! ```text
//! w   = NN·x
//! f   = ½·wᵀ·HHw·w + CCwᵀ·w                (fparm = [1, 0, 0, 1] per row)
//! HH  = NNᵀ·HHw·NN
//! CC  = NNᵀ·CCw
//! C0  = Σ c0
//! ```
//!
//! `NN` has one row summing every `y` helper (only when a piecewise-linear
//! unit exists) followed by one row per polynomial unit picking its `Pg`.
//! Quadratic and linear coefficients are rescaled from $/MW to $/p.u.
//!
//! Piecewise-linear units get a `y` variable bounded from below by every
//! segment of their curve (the `ycon` rows), which is the epigraph form of
//! a convex piecewise cost.

use sprs::{CsMat, TriMat};
use tracing::debug;
use volt_core::{CostModel, VoltError, VoltResult};

use super::constraints::BlockData;
use super::model::DispatchUnit;
use super::variables::{VarKind, VariableSet};
use crate::sparse::mul_vec;

/// Quadratic objective `f(x) = ½·xᵀ·HH·x + CCᵀ·x + C0`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticCost {
    pub hh: CsMat<f64>,
    pub cc: Vec<f64>,
    pub c0: f64,
}

impl QuadraticCost {
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let hx = mul_vec(&self.hh, x);
        let quad: f64 = hx.iter().zip(x).map(|(h, xi)| h * xi).sum();
        let lin: f64 = self.cc.iter().zip(x).map(|(c, xi)| c * xi).sum();
        0.5 * quad + lin + self.c0
    }

    /// `HH·x + CC`
    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut g = mul_vec(&self.hh, x);
        for (gi, ci) in g.iter_mut().zip(&self.cc) {
            *gi += ci;
        }
        g
    }
}

/// Intermediate w-space representation of the unit costs.
#[derive(Debug, Clone, PartialEq)]
pub struct WCosts {
    /// nw × nx selector
    pub nn: CsMat<f64>,
    /// nw × nw
    pub hhw: CsMat<f64>,
    pub ccw: Vec<f64>,
    /// `[d, r̂, k, m]` per w-row
    pub fparm: Vec<[f64; 4]>,
    /// Σ c0 over polynomial units
    pub c0: f64,
}

impl WCosts {
    pub fn n_w(&self) -> usize {
        self.ccw.len()
    }

    /// Apply the general transform. Only the quadratic (`d = 1`) form is
    /// produced by [`WCosts::build`]; the dead-zone shift `r̂` and scale `m`
    /// are still honored.
    pub fn transform(&self) -> QuadraticCost {
        let nx = self.nn.cols();
        let mm: Vec<f64> = self.fparm.iter().map(|p| p[3]).collect();
        let mr: Vec<f64> = self.fparm.iter().zip(&mm).map(|(p, m)| m * p[1]).collect();
        let hmr = mul_vec(&self.hhw, &mr);

        // MN = diag(m)·NN, grouped per row
        let mut mn_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.n_w()];
        for (&v, (r, c)) in self.nn.iter() {
            mn_rows[r].push((c, mm[r] * v));
        }

        let mut hh = TriMat::new((nx, nx));
        for (&h, (a, b)) in self.hhw.iter() {
            for &(c1, v1) in &mn_rows[a] {
                for &(c2, v2) in &mn_rows[b] {
                    hh.add_triplet(c1, c2, v1 * h * v2);
                }
            }
        }

        let mut cc = vec![0.0; nx];
        for (r, row) in mn_rows.iter().enumerate() {
            for &(c, v) in row {
                cc[c] += v * (self.ccw[r] - hmr[r]);
            }
        }

        let c0 = 0.5 * mr.iter().zip(&hmr).map(|(a, b)| a * b).sum::<f64>() + self.c0;
        QuadraticCost {
            hh: hh.to_csr(),
            cc,
            c0,
        }
    }

    /// Gather polynomial and piecewise-linear unit costs.
    pub fn build(units: &[DispatchUnit], vars: &VariableSet, base_mva: f64) -> VoltResult<Self> {
        let nx = vars.len();
        let pg = vars.offset(VarKind::Pg);
        let y = vars.range(VarKind::Y);

        let mut rows: Vec<(usize, f64, f64)> = Vec::new(); // (row, 2·c2·base², c1·base)
        let mut nn_entries = Vec::new();
        let mut c0 = 0.0;

        if !y.is_empty() {
            for col in y.clone() {
                nn_entries.push((0, col, 1.0));
            }
            rows.push((0, 0.0, 1.0));
        }

        for (u, unit) in units.iter().enumerate() {
            if let CostModel::Polynomial { c0: k0, c1, c2 } = unit.cost {
                if !(k0.is_finite() && c1.is_finite() && c2.is_finite()) {
                    return Err(VoltError::Bounds(format!(
                        "unit {u} has non-finite cost coefficients"
                    )));
                }
                let row = rows.len();
                nn_entries.push((row, pg + u, 1.0));
                rows.push((row, 2.0 * c2 * base_mva * base_mva, c1 * base_mva));
                c0 += k0;
            }
        }

        let nw = rows.len();
        let mut nn = TriMat::with_capacity((nw, nx), nn_entries.len());
        for (r, c, v) in nn_entries {
            nn.add_triplet(r, c, v);
        }

        let mut hhw = TriMat::new((nw, nw));
        let mut ccw = vec![0.0; nw];
        for &(r, h, c) in &rows {
            if h != 0.0 {
                hhw.add_triplet(r, r, h);
            }
            ccw[r] = c;
        }

        Ok(Self {
            nn: nn.to_csr(),
            hhw: hhw.to_csr(),
            ccw,
            fparm: vec![[1.0, 0.0, 0.0, 1.0]; nw],
            c0,
        })
    }
}

/// Build the full objective for the model's units.
pub fn assemble_costs(
    units: &[DispatchUnit],
    vars: &VariableSet,
    base_mva: f64,
) -> VoltResult<QuadraticCost> {
    let w = WCosts::build(units, vars, base_mva)?;
    let cost = w.transform();
    debug!(
        w_rows = w.n_w(),
        hh_nnz = cost.hh.nnz(),
        c0 = cost.c0,
        "assembled quadratic objective"
    );
    Ok(cost)
}

/// Units with piecewise-linear costs, in unit order. Unit `pwl[k]` owns
/// the `k`-th `y` variable.
pub fn piecewise_units(units: &[DispatchUnit]) -> Vec<usize> {
    units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.cost.is_piecewise_linear())
        .map(|(i, _)| i)
        .collect()
}

/// Segment slopes ($/h per p.u.) and intercepts of a convex curve.
fn segments(unit: usize, points: &[(f64, f64)], base_mva: f64) -> VoltResult<Vec<(f64, f64)>> {
    if points.len() < 2 {
        return Err(VoltError::Bounds(format!(
            "unit {unit} piecewise cost needs at least two breakpoints"
        )));
    }
    let mut out = Vec::with_capacity(points.len() - 1);
    for w in points.windows(2) {
        let (p0, c0) = (w[0].0 / base_mva, w[0].1);
        let (p1, c1) = (w[1].0 / base_mva, w[1].1);
        if !(p0.is_finite() && p1.is_finite() && c0.is_finite() && c1.is_finite()) {
            return Err(VoltError::Bounds(format!(
                "unit {unit} piecewise cost has non-finite breakpoints"
            )));
        }
        if p1 <= p0 {
            return Err(VoltError::Bounds(format!(
                "unit {unit} piecewise cost breakpoints must increase in MW"
            )));
        }
        let m = (c1 - c0) / (p1 - p0);
        out.push((m, m * p0 - c0));
    }
    for pair in out.windows(2) {
        let (m0, m1) = (pair[0].0, pair[1].0);
        if m1 < m0 - 1e-10 * m0.abs().max(1.0) {
            return Err(VoltError::Bounds(format!(
                "unit {unit} piecewise cost is not convex"
            )));
        }
    }
    Ok(out)
}

/// `ycon` rows: `m_k·Pg − y ≤ m_k·p_k − c_k` for every segment.
pub fn piecewise_envelope(
    units: &[DispatchUnit],
    pwl: &[usize],
    vars: &VariableSet,
    base_mva: f64,
) -> VoltResult<BlockData> {
    let pg = vars.offset(VarKind::Pg);
    let y = vars.offset(VarKind::Y);
    let mut block = BlockData::empty();
    for (k, &u) in pwl.iter().enumerate() {
        let CostModel::PiecewiseLinear { points } = &units[u].cost else {
            continue;
        };
        for (slope, intercept) in segments(u, points, base_mva)? {
            block.push_row(
                &[(pg + u, slope), (y + k, -1.0)],
                f64::NEG_INFINITY,
                intercept,
            );
        }
    }
    Ok(block)
}

/// Starting value for the `y` helpers: just above the most expensive
/// last breakpoint.
pub fn piecewise_start(units: &[DispatchUnit], pwl: &[usize]) -> f64 {
    let c = pwl
        .iter()
        .filter_map(|&u| match &units[u].cost {
            CostModel::PiecewiseLinear { points } => points.last().map(|&(_, c)| c),
            CostModel::Polynomial { .. } => None,
        })
        .fold(f64::NEG_INFINITY, f64::max);
    if c.is_finite() {
        c + 0.1 * c.abs()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::model::{DispatchUnit, UnitSource};
    use crate::sparse::mul_vec_transpose;
    use petgraph::graph::NodeIndex;

    fn unit(cost: CostModel) -> DispatchUnit {
        DispatchUnit {
            source: UnitSource::Generator(NodeIndex::new(0)),
            bus: 0,
            pmin: 0.0,
            pmax: 100.0,
            qmin: 0.0,
            qmax: 0.0,
            cost,
            capability: None,
        }
    }

    fn vars(n_units: usize, n_y: usize) -> VariableSet {
        let mut v = VariableSet::new();
        v.add(VarKind::Va, vec![0.0], vec![0.0]);
        v.add(VarKind::Pg, vec![0.0; n_units], vec![1.0; n_units]);
        v.add(VarKind::Y, vec![f64::NEG_INFINITY; n_y], vec![f64::INFINITY; n_y]);
        v
    }

    #[test]
    fn test_polynomial_costs_scale_to_per_unit() {
        let units = vec![
            unit(CostModel::quadratic(100.0, 10.0, 0.01)),
            unit(CostModel::linear(5.0, 20.0)),
        ];
        let v = vars(2, 0);
        let cost = assemble_costs(&units, &v, 100.0).unwrap();

        // 2·c2·base² on the Pg diagonal
        assert!((cost.hh.get(1, 1).copied().unwrap_or(0.0) - 200.0).abs() < 1e-9);
        assert!(cost.hh.get(2, 2).is_none());
        assert!((cost.cc[1] - 1000.0).abs() < 1e-9);
        assert!((cost.cc[2] - 2000.0).abs() < 1e-9);
        assert!((cost.c0 - 105.0).abs() < 1e-12);

        // 50 MW and 30 MW
        let x = [0.0, 0.5, 0.3];
        let expected = units[0].cost.evaluate(50.0) + units[1].cost.evaluate(30.0);
        assert!((cost.evaluate(&x) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_w_rows_put_piecewise_sum_first() {
        let units = vec![
            unit(CostModel::quadratic(0.0, 10.0, 0.0)),
            unit(CostModel::piecewise(vec![(0.0, 0.0), (50.0, 500.0)])),
            unit(CostModel::piecewise(vec![(0.0, 0.0), (50.0, 1000.0)])),
        ];
        let v = vars(3, 2);
        let w = WCosts::build(&units, &v, 100.0).unwrap();

        assert_eq!(w.n_w(), 2);
        assert_eq!(w.ccw, vec![1.0, 1000.0]);
        // y columns 4 and 5 feed the first row
        assert_eq!(w.nn.get(0, 4).copied(), Some(1.0));
        assert_eq!(w.nn.get(0, 5).copied(), Some(1.0));
        assert_eq!(w.nn.get(1, 1).copied(), Some(1.0));

        let cost = w.transform();
        assert_eq!(cost.cc[4], 1.0);
        assert_eq!(cost.cc[5], 1.0);
        assert_eq!(mul_vec_transpose(&w.nn, &[1.0, 0.0])[4], 1.0);
    }

    #[test]
    fn test_envelope_rows() {
        let units = vec![unit(CostModel::piecewise(vec![
            (0.0, 0.0),
            (50.0, 1000.0),
            (100.0, 3000.0),
        ]))];
        let v = vars(1, 1);
        let block = piecewise_envelope(&units, &[0], &v, 100.0).unwrap();

        assert_eq!(block.rows, 2);
        // slopes in $/h per p.u.
        assert!(block.entries.contains(&(0, 1, 2000.0)));
        assert!(block.entries.contains(&(1, 1, 4000.0)));
        assert!(block.entries.contains(&(0, 2, -1.0)));
        assert!((block.upper[0] - 0.0).abs() < 1e-9);
        // 4000·0.5 − 1000
        assert!((block.upper[1] - 1000.0).abs() < 1e-9);
        assert!(block.lower.iter().all(|l| *l == f64::NEG_INFINITY));
        assert!((piecewise_start(&units, &[0]) - 3300.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_piecewise_costs_rejected() {
        let flat = vec![unit(CostModel::piecewise(vec![(50.0, 0.0), (50.0, 10.0)]))];
        let v = vars(1, 1);
        assert!(matches!(
            piecewise_envelope(&flat, &[0], &v, 100.0),
            Err(VoltError::Bounds(_))
        ));

        let concave = vec![unit(CostModel::piecewise(vec![
            (0.0, 0.0),
            (50.0, 2000.0),
            (100.0, 3000.0),
        ]))];
        assert!(matches!(
            piecewise_envelope(&concave, &[0], &v, 100.0),
            Err(VoltError::Bounds(_))
        ));
    }
}
