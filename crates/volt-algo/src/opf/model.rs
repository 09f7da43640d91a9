//! OPF model builder.
//!
//! Turns a [`Network`] into the fixed-structure optimization problem solved
//! by [`super::pips`]:
//!
//! ```text
//! min  ½·xᵀ·HH·x + CCᵀ·x + C0
//! s.t. g(x) = 0            (AC power balance)
//!      h(x) ≤ 0            (AC branch flow limits)
//!      l ≤ A·x ≤ u         (linear blocks, see super::constraints)
//!      xmin ≤ x ≤ xmax
//! ```
//!
//! Building is a pure function of the network. Everything in the model uses
//! internal indices: isolated buses, offline branches, and units that are
//! offline or sit on an isolated bus are dropped, and [`IndexMapping`]
//! records where the kept elements live in the network graph so that
//! [`super::integrate`] can write the results back.

use std::collections::HashMap;
use std::f64::consts::PI;

use num_complex::Complex64;
use petgraph::graph::{EdgeIndex, NodeIndex};
use sprs::CsMat;
use tracing::{debug, info};
use volt_core::{
    find_islands, Branch, BusId, CapabilityCurve, CostModel, Edge, Network, Node, VoltError,
    VoltResult,
};

use super::constraints::{
    angle_difference_limits, angle_limited_branches, capability_curve, capability_units,
    constant_pf_units, dc_branch_flow_limits, dc_power_balance, load_power_factor, BlockData,
    ConstraintKind, ConstraintSet,
};
use super::costs::{
    assemble_costs, piecewise_envelope, piecewise_start, piecewise_units, QuadraticCost,
};
use super::variables::{VarKind, VariableSet};
use super::{OpfMethod, OpfOptions};
use crate::sparse::{BranchTerminals, SparseAdmittance, SparseSusceptance};

/// Where a dispatch unit comes from in the network graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSource {
    Generator(NodeIndex),
    /// Price-responsive load, modeled as a negative generator
    Load(NodeIndex),
}

/// A generator or dispatchable load as seen by the optimizer.
///
/// Limits are in MW / MVAr; the variable blocks carry them in per-unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchUnit {
    pub source: UnitSource,
    /// Internal bus index
    pub bus: usize,
    pub pmin: f64,
    pub pmax: f64,
    pub qmin: f64,
    pub qmax: f64,
    pub cost: CostModel,
    pub capability: Option<CapabilityCurve>,
}

impl DispatchUnit {
    /// Dispatchable loads only ever consume: `Pmin < 0 = Pmax`.
    pub fn is_load(&self) -> bool {
        self.pmin < 0.0 && self.pmax == 0.0
    }
}

/// A kept bus with its fixed demand and shunt in per-unit.
#[derive(Debug, Clone, PartialEq)]
pub struct OpfBus {
    pub id: BusId,
    pub vmin: f64,
    pub vmax: f64,
    /// Non-dispatchable demand
    pub pd: f64,
    pub qd: f64,
    pub gs: f64,
    pub bs: f64,
    pub is_ref: bool,
}

/// A kept online branch with internal terminal indices.
#[derive(Debug, Clone)]
pub struct OpfBranch {
    pub from: usize,
    pub to: usize,
    pub branch: Branch,
}

/// Graph positions of the kept buses and branches, in internal order.
/// Units carry their own [`UnitSource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMapping {
    pub buses: Vec<NodeIndex>,
    pub branches: Vec<EdgeIndex>,
    /// Buses dropped as isolated
    pub isolated_buses: Vec<BusId>,
}

/// Fully assembled OPF problem.
#[derive(Debug, Clone)]
pub struct OpfModel {
    pub method: OpfMethod,
    pub base_mva: f64,
    pub mapping: IndexMapping,
    pub buses: Vec<OpfBus>,
    pub branches: Vec<OpfBranch>,
    pub units: Vec<DispatchUnit>,
    /// Internal indices of reference buses
    pub ref_buses: Vec<usize>,
    pub variables: VariableSet,
    pub constraints: ConstraintSet,
    pub a: CsMat<f64>,
    pub l: Vec<f64>,
    pub u: Vec<f64>,
    pub cost: QuadraticCost,
    /// DC only
    pub susceptance: Option<SparseSusceptance>,
    /// AC only
    pub admittance: Option<SparseAdmittance>,
    /// Branches with a thermal limit; row `k` of `Pf`/`Pt`/`Sf`/`St`
    pub flow_limited: Vec<usize>,
    /// Branches with an `ang` row
    pub angle_limited: Vec<usize>,
    /// Units with a `y` helper, in `y` order
    pub piecewise: Vec<usize>,
}

impl OpfModel {
    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    pub fn n_units(&self) -> usize {
        self.units.len()
    }

    pub fn terminals(&self) -> Vec<BranchTerminals<'_>> {
        self.branches
            .iter()
            .map(|b| BranchTerminals {
                from: b.from,
                to: b.to,
                branch: &b.branch,
            })
            .collect()
    }

    /// Strictly interior starting point: [`VariableSet::initial`] with
    /// angles at the reference angle and `y` just above the dearest
    /// piecewise cost.
    pub fn initial_point(&self) -> Vec<f64> {
        let mut x = self.variables.initial();
        for v in &mut x[self.variables.range(VarKind::Va)] {
            *v = 0.0;
        }
        let y0 = piecewise_start(&self.units, &self.piecewise);
        for v in &mut x[self.variables.range(VarKind::Y)] {
            *v = y0;
        }
        x
    }
}

/// Build the OPF problem for `network`.
pub fn build_opf_model(network: &Network, options: &OpfOptions) -> VoltResult<OpfModel> {
    let base_mva = network.base_mva;
    if !(base_mva > 0.0 && base_mva.is_finite()) {
        return Err(VoltError::Config(format!(
            "base_mva must be positive, got {base_mva}"
        )));
    }
    let method = options.method;

    // ========================================================================
    // Kept buses (connected to a reference bus)
    // ========================================================================
    let islands = find_islands(network);
    let mut mapping = IndexMapping::default();
    let mut buses = Vec::new();
    let mut bus_index: HashMap<BusId, usize> = HashMap::new();
    for node in network.graph.node_indices() {
        let Node::Bus(bus) = &network.graph[node] else {
            continue;
        };
        let referenced = islands
            .island_of(bus.id)
            .and_then(|k| islands.islands.get(k))
            .map(|s| s.has_slack)
            .unwrap_or(false);
        if !referenced {
            mapping.isolated_buses.push(bus.id);
            continue;
        }
        let (vmin, vmax) = (bus.vmin_pu.value(), bus.vmax_pu.value());
        if !(vmin <= vmax) {
            return Err(VoltError::Bounds(format!(
                "bus {} has Vmin {vmin} > Vmax {vmax}",
                bus.id.value()
            )));
        }
        bus_index.insert(bus.id, buses.len());
        mapping.buses.push(node);
        buses.push(OpfBus {
            id: bus.id,
            vmin,
            vmax,
            pd: 0.0,
            qd: 0.0,
            gs: bus.gs_mw.to_pu(base_mva),
            bs: bus.bs_mvar.to_pu(base_mva),
            is_ref: bus.is_slack(),
        });
    }
    if buses.is_empty() {
        return Err(VoltError::Topology(
            "no bus is connected to a reference bus".into(),
        ));
    }

    let ref_buses: Vec<usize> = buses
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_ref)
        .map(|(i, _)| i)
        .collect();
    match (method, ref_buses.len()) {
        (_, 0) => return Err(VoltError::Topology("OPF requires a reference bus".into())),
        (OpfMethod::Dc, n) if n > 1 => {
            return Err(VoltError::Topology(format!(
                "DC OPF requires a single reference bus, found {n}"
            )))
        }
        _ => {}
    }

    // ========================================================================
    // Online branches between kept buses
    // ========================================================================
    let mut branches = Vec::new();
    for edge in network.graph.edge_indices() {
        let Edge::Branch(branch) = &network.graph[edge];
        if !branch.status {
            continue;
        }
        let (Some(&from), Some(&to)) =
            (bus_index.get(&branch.from_bus), bus_index.get(&branch.to_bus))
        else {
            continue;
        };
        mapping.branches.push(edge);
        branches.push(OpfBranch {
            from,
            to,
            branch: branch.clone(),
        });
    }

    // ========================================================================
    // Dispatch units: generators first, then price-responsive loads
    // ========================================================================
    let mut units = Vec::new();
    for node in network.graph.node_indices() {
        let Node::Gen(gen) = &network.graph[node] else {
            continue;
        };
        if !gen.status {
            continue;
        }
        let Some(&bus) = bus_index.get(&gen.bus) else {
            continue;
        };
        let unit = DispatchUnit {
            source: UnitSource::Generator(node),
            bus,
            pmin: gen.pmin.value(),
            pmax: gen.pmax.value(),
            qmin: gen.qmin.value(),
            qmax: gen.qmax.value(),
            cost: gen.cost_model.clone(),
            capability: gen.capability,
        };
        check_unit_limits(&gen.name, &unit)?;
        units.push(unit);
    }
    for node in network.graph.node_indices() {
        let Node::Load(load) = &network.graph[node] else {
            continue;
        };
        if !load.status {
            continue;
        }
        let Some(&bus) = bus_index.get(&load.bus) else {
            continue;
        };
        let (pd, qd) = (load.active_power.value(), load.reactive_power.value());
        let Some(bid) = &load.bid else {
            buses[bus].pd += pd / base_mva;
            buses[bus].qd += qd / base_mva;
            continue;
        };
        let p_max = bid.p_max.map(|p| p.value()).unwrap_or(pd);
        if !(p_max >= 0.0 && p_max.is_finite()) {
            return Err(VoltError::Bounds(format!(
                "load '{}' bid p_max must be a finite non-negative MW value",
                load.name
            )));
        }
        // Reactive consumption scales with the active one
        let q_full = if pd != 0.0 { qd * p_max / pd } else { qd };
        let (qmin, qmax) = if q_full > 0.0 {
            (-q_full, 0.0)
        } else {
            (0.0, -q_full)
        };
        let unit = DispatchUnit {
            source: UnitSource::Load(node),
            bus,
            pmin: -p_max,
            pmax: 0.0,
            qmin,
            qmax,
            cost: bid.cost.clone(),
            capability: None,
        };
        check_unit_limits(&load.name, &unit)?;
        units.push(unit);
    }

    // ========================================================================
    // Variables
    // ========================================================================
    let is_ac = method.is_ac();
    let n_bus = buses.len();
    let mut variables = VariableSet::new();
    variables.add(
        VarKind::Va,
        buses.iter().map(|b| if b.is_ref { 0.0 } else { -PI }).collect(),
        buses.iter().map(|b| if b.is_ref { 0.0 } else { PI }).collect(),
    );
    if is_ac {
        variables.add(
            VarKind::Vm,
            buses.iter().map(|b| b.vmin).collect(),
            buses.iter().map(|b| b.vmax).collect(),
        );
    }
    variables.add(
        VarKind::Pg,
        units.iter().map(|u| u.pmin / base_mva).collect(),
        units.iter().map(|u| u.pmax / base_mva).collect(),
    );
    if is_ac {
        variables.add(
            VarKind::Qg,
            units.iter().map(|u| u.qmin / base_mva).collect(),
            units.iter().map(|u| u.qmax / base_mva).collect(),
        );
    }
    let piecewise = piecewise_units(&units);
    let n_y = piecewise.len();
    variables.add(
        VarKind::Y,
        vec![f64::NEG_INFINITY; n_y],
        vec![f64::INFINITY; n_y],
    );

    // ========================================================================
    // Constraints
    // ========================================================================
    let flow_limited: Vec<usize> = branches
        .iter()
        .enumerate()
        .filter(|(_, b)| b.branch.limit_pu(base_mva).is_some())
        .map(|(l, _)| l)
        .collect();
    let terminals: Vec<BranchTerminals<'_>> = branches
        .iter()
        .map(|b| BranchTerminals {
            from: b.from,
            to: b.to,
            branch: &b.branch,
        })
        .collect();

    let mut constraints = ConstraintSet::new(variables.len());
    let mut susceptance = None;
    let mut admittance = None;
    match method {
        OpfMethod::Dc => {
            let b = SparseSusceptance::from_branches(n_bus, &terminals)?;
            let demand: Vec<f64> = buses.iter().map(|bus| bus.pd + bus.gs).collect();
            constraints.add_linear(
                ConstraintKind::Pmis,
                dc_power_balance(&b, &units, &variables, &demand),
            )?;
            let (pf, pt) =
                dc_branch_flow_limits(&b, &branches, &flow_limited, &variables, base_mva);
            constraints.add_linear(ConstraintKind::Pf, pf)?;
            constraints.add_linear(ConstraintKind::Pt, pt)?;
            susceptance = Some(b);
        }
        OpfMethod::Ac => {
            let shunts: Vec<Complex64> = buses
                .iter()
                .map(|bus| Complex64::new(bus.gs, bus.bs))
                .collect();
            admittance = Some(SparseAdmittance::from_branches(n_bus, &terminals, &shunts)?);
            constraints.add_nonlinear_eq(ConstraintKind::Pmis, n_bus);
            constraints.add_nonlinear_eq(ConstraintKind::Qmis, n_bus);
            constraints.add_nonlinear_ineq(ConstraintKind::Sf, flow_limited.len());
            constraints.add_nonlinear_ineq(ConstraintKind::St, flow_limited.len());
        }
    }

    let angle_limited = if options.angle_limits {
        angle_limited_branches(&branches)
    } else {
        Vec::new()
    };
    constraints.add_linear(
        ConstraintKind::Ang,
        angle_difference_limits(&branches, &angle_limited, &variables)?,
    )?;

    if is_ac {
        let vl_units = constant_pf_units(&units);
        constraints.add_linear(
            ConstraintKind::Vl,
            load_power_factor(&units, &vl_units, &variables)?,
        )?;
        let (upper_units, lower_units) = capability_units(&units)?;
        let (pqh, pql) =
            capability_curve(&units, &upper_units, &lower_units, &variables, base_mva);
        constraints.add_linear(ConstraintKind::PQh, pqh)?;
        constraints.add_linear(ConstraintKind::PQl, pql)?;
    } else {
        constraints.add_linear(ConstraintKind::Vl, BlockData::empty())?;
        constraints.add_linear(ConstraintKind::PQh, BlockData::empty())?;
        constraints.add_linear(ConstraintKind::PQl, BlockData::empty())?;
    }

    constraints.add_linear(
        ConstraintKind::Ycon,
        piecewise_envelope(&units, &piecewise, &variables, base_mva)?,
    )?;

    let (a, l, u) = constraints.assemble();
    let cost = assemble_costs(&units, &variables, base_mva)?;

    for block in constraints.linear_blocks() {
        debug!(block = %block.kind, rows = block.data.rows, offset = block.offset, "linear block");
    }
    info!(
        method = %method,
        buses = n_bus,
        branches = branches.len(),
        units = units.len(),
        isolated = mapping.isolated_buses.len(),
        variables = variables.len(),
        linear_rows = constraints.n_linear(),
        nonlinear_eq = constraints.n_nonlinear_eq(),
        nonlinear_ineq = constraints.n_nonlinear_ineq(),
        "built OPF model"
    );

    Ok(OpfModel {
        method,
        base_mva,
        mapping,
        buses,
        branches,
        units,
        ref_buses,
        variables,
        constraints,
        a,
        l,
        u,
        cost,
        susceptance,
        admittance,
        flow_limited,
        angle_limited,
        piecewise,
    })
}

fn check_unit_limits(name: &str, unit: &DispatchUnit) -> VoltResult<()> {
    if !(unit.pmin <= unit.pmax) {
        return Err(VoltError::Bounds(format!(
            "'{name}' has Pmin {} > Pmax {}",
            unit.pmin, unit.pmax
        )));
    }
    if !(unit.qmin <= unit.qmax) {
        return Err(VoltError::Bounds(format!(
            "'{name}' has Qmin {} > Qmax {}",
            unit.qmin, unit.qmax
        )));
    }
    Ok(())
}
