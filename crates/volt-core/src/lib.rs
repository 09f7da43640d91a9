//! # volt-core: Transmission Network Model
//!
//! Data structures shared by the power-flow and optimal-power-flow
//! algorithms in `volt-algo`.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as **undirected multigraphs** where:
//! - **Nodes**: Buses, Generators, Loads
//! - **Edges**: Branches (lines and transformers, including phase shifters)
//!
//! Generators and loads are free-standing nodes that name their host bus by
//! [`BusId`]. The external ordering of every element kind is its insertion
//! order in the graph; solvers renumber internally and map their results
//! back onto that order.
//!
//! Solved quantities (angles, flows, dispatch, shadow prices) live on the
//! same structs as their inputs. They are only ever written by an explicit
//! integration step that holds `&mut Network`; the builders and solvers take
//! `&Network`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use volt_core::*;
//!
//! let mut network = Network::new();
//!
//! let bus1 = network.graph.add_node(Node::Bus(Bus {
//!     id: BusId::new(1),
//!     name: "Bus 1".to_string(),
//!     bus_type: BusType::Slack,
//!     ..Bus::default()
//! }));
//! let bus2 = network.graph.add_node(Node::Bus(Bus {
//!     id: BusId::new(2),
//!     name: "Bus 2".to_string(),
//!     ..Bus::default()
//! }));
//!
//! network.graph.add_node(Node::Gen(
//!     Gen::new(GenId::new(1), "Gen 1".to_string(), BusId::new(1))
//!         .with_p_limits(0.0, 100.0)
//!         .with_cost(CostModel::quadratic(0.0, 10.0, 0.01)),
//! ));
//! network.graph.add_node(Node::Load(Load::new(
//!     LoadId::new(1),
//!     "Load 1".to_string(),
//!     BusId::new(2),
//!     50.0,
//!     10.0,
//! )));
//!
//! network.graph.add_edge(
//!     bus1,
//!     bus2,
//!     Edge::Branch(Branch::new(
//!         BranchId::new(1),
//!         "Line 1-2".to_string(),
//!         BusId::new(1),
//!         BusId::new(2),
//!         0.01,
//!         0.1,
//!     )),
//! );
//! ```
//!
//! ## Modules
//!
//! - [`error`] - [`VoltError`] kinds shared by every algorithm
//! - [`units`] - MW/MVAr/MVA/degree newtypes and per-unit conversion
//! - [`graph_utils`] - island detection over online branches
//! - [`solver`] - the [`SparseSolver`] capability and its backends

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub mod error;
pub mod graph_utils;
pub mod solver;
pub mod units;

pub use error::{VoltError, VoltResult};
pub use graph_utils::{find_islands, IslandAnalysis, IslandSummary};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use solver::{FaerSolver, GaussSolver, SparseSolver, SparseSolverKind};
pub use units::{Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, PerUnit, Radians};

/// Default system MVA base
pub const DEFAULT_BASE_MVA: f64 = 100.0;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl BranchId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BranchId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl GenId {
    #[inline]
    pub fn new(value: usize) -> Self {
        GenId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl LoadId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LoadId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Power-flow role of a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    /// Reference bus: fixed angle, absorbs the power balance
    Slack,
    /// Voltage-controlled bus
    PV,
    /// Load bus
    #[default]
    PQ,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Base voltage
    pub base_kv: Kilovolts,
    pub bus_type: BusType,
    /// Voltage magnitude: initial guess on input, solved value after integration
    pub voltage_pu: PerUnit,
    /// Voltage angle: initial guess on input, solved value after integration
    pub angle: Degrees,
    pub vmin_pu: PerUnit,
    pub vmax_pu: PerUnit,
    /// Shunt conductance, MW consumed at 1.0 p.u.
    pub gs_mw: Megawatts,
    /// Shunt susceptance, MVAr injected at 1.0 p.u.
    pub bs_mvar: Megavars,
    /// Solved net active injection
    pub p_injection: Megawatts,
    /// Active power-balance shadow price ($/MWh)
    pub lam_p: f64,
    /// Reactive power-balance shadow price ($/MVArh)
    pub lam_q: f64,
    pub mu_vmax: f64,
    pub mu_vmin: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId::new(0),
            name: String::new(),
            base_kv: Kilovolts(138.0),
            bus_type: BusType::PQ,
            voltage_pu: PerUnit(1.0),
            angle: Degrees(0.0),
            vmin_pu: PerUnit(0.9),
            vmax_pu: PerUnit(1.1),
            gs_mw: Megawatts(0.0),
            bs_mvar: Megavars(0.0),
            p_injection: Megawatts(0.0),
            lam_p: 0.0,
            lam_q: 0.0,
            mu_vmax: 0.0,
            mu_vmin: 0.0,
        }
    }
}

impl Bus {
    pub fn is_slack(&self) -> bool {
        self.bus_type == BusType::Slack
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (p.u.)
    pub resistance: f64,
    /// Series reactance (p.u.)
    pub reactance: f64,
    /// Total line charging susceptance (p.u.)
    pub charging_b: PerUnit,
    /// Off-nominal tap ratio on the from side; 0 means nominal (1.0)
    pub tap_ratio: f64,
    /// Phase shift angle (positive delays the to side)
    pub phase_shift: Radians,
    /// Long-term thermal rating; `None` or zero means unlimited
    pub rating_a: Option<MegavoltAmperes>,
    /// In service
    pub status: bool,
    /// Minimum angle difference θf − θt
    pub angle_min: Option<Radians>,
    /// Maximum angle difference θf − θt
    pub angle_max: Option<Radians>,
    pub p_from: Megawatts,
    pub q_from: Megavars,
    pub p_to: Megawatts,
    pub q_to: Megavars,
    /// Shadow price of the from-end flow limit ($/MVAh)
    pub mu_s_from: f64,
    /// Shadow price of the to-end flow limit ($/MVAh)
    pub mu_s_to: f64,
    pub mu_angmin: f64,
    pub mu_angmax: f64,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId::new(0),
            name: String::new(),
            from_bus: BusId::new(0),
            to_bus: BusId::new(0),
            resistance: 0.0,
            reactance: 0.0,
            charging_b: PerUnit(0.0),
            tap_ratio: 1.0,
            phase_shift: Radians(0.0),
            rating_a: None,
            status: true,
            angle_min: None,
            angle_max: None,
            p_from: Megawatts(0.0),
            q_from: Megavars(0.0),
            p_to: Megawatts(0.0),
            q_to: Megavars(0.0),
            mu_s_from: 0.0,
            mu_s_to: 0.0,
            mu_angmin: 0.0,
            mu_angmax: 0.0,
        }
    }
}

impl Branch {
    pub fn new(
        id: BranchId,
        name: String,
        from_bus: BusId,
        to_bus: BusId,
        resistance: f64,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name,
            from_bus,
            to_bus,
            resistance,
            reactance,
            ..Self::default()
        }
    }

    /// Set charging susceptance (p.u.)
    pub fn with_charging(mut self, b_pu: f64) -> Self {
        self.charging_b = PerUnit(b_pu);
        self
    }

    /// Set the long-term thermal rating (MVA)
    pub fn with_rating(mut self, rating_mva: f64) -> Self {
        self.rating_a = Some(MegavoltAmperes(rating_mva));
        self
    }

    /// Set tap ratio and phase shift (degrees)
    pub fn with_transformer(mut self, tap_ratio: f64, shift_deg: f64) -> Self {
        self.tap_ratio = tap_ratio;
        self.phase_shift = Degrees(shift_deg).to_radians();
        self
    }

    /// Tap ratio with the "0 means nominal" convention resolved
    #[inline]
    pub fn effective_tap(&self) -> f64 {
        if self.tap_ratio == 0.0 {
            1.0
        } else {
            self.tap_ratio
        }
    }

    /// Thermal limit in per-unit, or `None` when the branch is unconstrained
    pub fn limit_pu(&self, base_mva: f64) -> Option<f64> {
        self.rating_a
            .filter(|r| r.value() > 0.0 && r.value() < 1e10)
            .map(|r| r.to_pu(base_mva))
    }
}

/// Generator cost model for OPF.
///
/// Costs are in $/h as a function of active output in MW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CostModel {
    /// `cost = c0 + c1*P + c2*P^2`
    Polynomial { c0: f64, c1: f64, c2: f64 },
    /// Breakpoints `(MW, $/h)` in increasing MW order. The curve must be
    /// convex (non-decreasing segment slopes); outside the first/last
    /// breakpoint the end segments extend linearly.
    PiecewiseLinear { points: Vec<(f64, f64)> },
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel::Polynomial {
            c0: 0.0,
            c1: 0.0,
            c2: 0.0,
        }
    }
}

impl CostModel {
    /// Create quadratic cost: c0 + c1*P + c2*P^2
    pub fn quadratic(c0: f64, c1: f64, c2: f64) -> Self {
        CostModel::Polynomial { c0, c1, c2 }
    }

    /// Create linear cost: c0 + c1*P (marginal cost c1 in $/MWh)
    pub fn linear(c0: f64, c1: f64) -> Self {
        CostModel::Polynomial { c0, c1, c2: 0.0 }
    }

    pub fn piecewise(points: Vec<(f64, f64)>) -> Self {
        CostModel::PiecewiseLinear { points }
    }

    pub fn is_piecewise_linear(&self) -> bool {
        matches!(self, CostModel::PiecewiseLinear { .. })
    }

    /// Evaluate cost at given power output ($/h)
    pub fn evaluate(&self, p_mw: f64) -> f64 {
        match self {
            CostModel::Polynomial { c0, c1, c2 } => c0 + c1 * p_mw + c2 * p_mw * p_mw,
            CostModel::PiecewiseLinear { points } => match Self::segment_at(points, p_mw) {
                Some(((x0, y0), (x1, y1))) => y0 + (p_mw - x0) * (y1 - y0) / (x1 - x0),
                None => points.first().map(|&(_, y)| y).unwrap_or(0.0),
            },
        }
    }

    /// Marginal cost at given power output ($/MWh)
    pub fn marginal_cost(&self, p_mw: f64) -> f64 {
        match self {
            CostModel::Polynomial { c1, c2, .. } => c1 + 2.0 * c2 * p_mw,
            CostModel::PiecewiseLinear { points } => match Self::segment_at(points, p_mw) {
                Some(((x0, y0), (x1, y1))) => (y1 - y0) / (x1 - x0),
                None => 0.0,
            },
        }
    }

    /// Segment containing `p_mw`, clamped to the first/last segment.
    fn segment_at(points: &[(f64, f64)], p_mw: f64) -> Option<((f64, f64), (f64, f64))> {
        let last = points.len().checked_sub(2)?;
        let k = points
            .windows(2)
            .position(|w| p_mw <= w[1].0)
            .unwrap_or(last);
        Some((points[k], points[k + 1]))
    }
}

/// Linear approximation of a generator's P-Q capability curve.
///
/// The upper reactive limit runs linearly from `qc1_max` at `pc1` to
/// `qc2_max` at `pc2`; the lower limit likewise between the min values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCurve {
    pub pc1: Megawatts,
    pub pc2: Megawatts,
    pub qc1_min: Megavars,
    pub qc1_max: Megavars,
    pub qc2_min: Megavars,
    pub qc2_max: Megavars,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Active power output: initial dispatch on input, solved value after integration
    pub active_power: Megawatts,
    /// Reactive power output
    pub reactive_power: Megavars,
    #[serde(deserialize_with = "lower_mw")]
    pub pmin: Megawatts,
    #[serde(deserialize_with = "upper_mw")]
    pub pmax: Megawatts,
    #[serde(deserialize_with = "lower_mvar")]
    pub qmin: Megavars,
    #[serde(deserialize_with = "upper_mvar")]
    pub qmax: Megavars,
    /// In service
    pub status: bool,
    pub voltage_setpoint: PerUnit,
    pub cost_model: CostModel,
    pub capability: Option<CapabilityCurve>,
    pub mu_pmax: f64,
    pub mu_pmin: f64,
    pub mu_qmax: f64,
    pub mu_qmin: f64,
}

// Open limits are stored as ±∞, which serde_json writes as `null`.
fn lower_mw<'de, D: Deserializer<'de>>(d: D) -> Result<Megawatts, D::Error> {
    Ok(Megawatts(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY)))
}

fn upper_mw<'de, D: Deserializer<'de>>(d: D) -> Result<Megawatts, D::Error> {
    Ok(Megawatts(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY)))
}

fn lower_mvar<'de, D: Deserializer<'de>>(d: D) -> Result<Megavars, D::Error> {
    Ok(Megavars(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY)))
}

fn upper_mvar<'de, D: Deserializer<'de>>(d: D) -> Result<Megavars, D::Error> {
    Ok(Megavars(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY)))
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            id: GenId::new(0),
            name: String::new(),
            bus: BusId::new(0),
            active_power: Megawatts(0.0),
            reactive_power: Megavars(0.0),
            pmin: Megawatts(0.0),
            pmax: Megawatts(f64::INFINITY),
            qmin: Megavars(f64::NEG_INFINITY),
            qmax: Megavars(f64::INFINITY),
            status: true,
            voltage_setpoint: PerUnit(1.0),
            cost_model: CostModel::default(),
            capability: None,
            mu_pmax: 0.0,
            mu_pmin: 0.0,
            mu_qmax: 0.0,
            mu_qmin: 0.0,
        }
    }
}

impl Gen {
    /// Create a new generator with default values
    pub fn new(id: GenId, name: String, bus: BusId) -> Self {
        Self {
            id,
            name,
            bus,
            ..Self::default()
        }
    }

    /// Set active power limits (MW)
    pub fn with_p_limits(mut self, pmin: f64, pmax: f64) -> Self {
        self.pmin = Megawatts(pmin);
        self.pmax = Megawatts(pmax);
        self
    }

    /// Set reactive power limits (MVAr)
    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin = Megavars(qmin);
        self.qmax = Megavars(qmax);
        self
    }

    /// Set initial dispatch (MW)
    pub fn with_dispatch(mut self, p_mw: f64) -> Self {
        self.active_power = Megawatts(p_mw);
        self
    }

    pub fn with_voltage_setpoint(mut self, vm_pu: f64) -> Self {
        self.voltage_setpoint = PerUnit(vm_pu);
        self
    }

    pub fn with_cost(mut self, cost: CostModel) -> Self {
        self.cost_model = cost;
        self
    }

    pub fn with_capability(mut self, curve: CapabilityCurve) -> Self {
        self.capability = Some(curve);
        self
    }
}

/// Price-responsive demand bid attached to a [`Load`].
///
/// The OPF treats the load as a negative generator that may consume between
/// zero and `p_max` MW at a constant power factor. The cost curve is
/// expressed over the injected power, which is negative for consumption, so
/// a willingness to pay of $50/MWh up to 100 MW reads
/// `PiecewiseLinear { points: [(-100.0, -5000.0), (0.0, 0.0)] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBid {
    /// Largest consumption the load will take; defaults to its nominal demand
    pub p_max: Option<Megawatts>,
    pub cost: CostModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    /// Demand: nominal on input, dispatched consumption for price-responsive loads
    pub active_power: Megawatts,
    pub reactive_power: Megavars,
    /// In service
    pub status: bool,
    pub bid: Option<LoadBid>,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            id: LoadId::new(0),
            name: String::new(),
            bus: BusId::new(0),
            active_power: Megawatts(0.0),
            reactive_power: Megavars(0.0),
            status: true,
            bid: None,
        }
    }
}

impl Load {
    pub fn new(id: LoadId, name: String, bus: BusId, p_mw: f64, q_mvar: f64) -> Self {
        Self {
            id,
            name,
            bus,
            active_power: Megawatts(p_mw),
            reactive_power: Megavars(q_mvar),
            ..Self::default()
        }
    }

    pub fn with_bid(mut self, bid: LoadBid) -> Self {
        self.bid = Some(bid);
        self
    }

    pub fn is_dispatchable(&self) -> bool {
        self.bid.is_some()
    }
}

// Enum to represent different types of nodes in the graph
#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    Load(Load),
}

// Enum to represent different types of edges in the graph
#[derive(Debug, Clone)]
pub enum Edge {
    Branch(Branch),
}

/// The core power network graph
#[derive(Debug, Clone)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
    /// System MVA base used for per-unit conversion
    pub base_mva: f64,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
            base_mva: DEFAULT_BASE_MVA,
        }
    }

    pub fn with_base_mva(mut self, base_mva: f64) -> Self {
        self.base_mva = base_mva;
        self
    }

    /// Add a bus node and return its graph index
    pub fn add_bus(&mut self, bus: Bus) -> NodeIndex {
        self.graph.add_node(Node::Bus(bus))
    }

    pub fn add_gen(&mut self, gen: Gen) -> NodeIndex {
        self.graph.add_node(Node::Gen(gen))
    }

    pub fn add_load(&mut self, load: Load) -> NodeIndex {
        self.graph.add_node(Node::Load(load))
    }

    /// Add a branch between the buses it names.
    pub fn add_branch(&mut self, branch: Branch) -> VoltResult<EdgeIndex> {
        let lookup = self.bus_node_map();
        let from = *lookup.get(&branch.from_bus).ok_or_else(|| {
            VoltError::Topology(format!(
                "branch '{}' references unknown from bus {}",
                branch.name,
                branch.from_bus.value()
            ))
        })?;
        let to = *lookup.get(&branch.to_bus).ok_or_else(|| {
            VoltError::Topology(format!(
                "branch '{}' references unknown to bus {}",
                branch.name,
                branch.to_bus.value()
            ))
        })?;
        Ok(self.graph.add_edge(from, to, Edge::Branch(branch)))
    }

    /// Map from bus ID to its graph node
    pub fn bus_node_map(&self) -> HashMap<BusId, NodeIndex> {
        self.graph
            .node_indices()
            .filter_map(|idx| match &self.graph[idx] {
                Node::Bus(bus) => Some((bus.id, idx)),
                _ => None,
            })
            .collect()
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();

        for node in self.graph.node_weights() {
            match node {
                Node::Bus(_) => stats.num_buses += 1,
                Node::Gen(g) => {
                    stats.num_gens += 1;
                    if g.status {
                        stats.total_gen_capacity_mw += g.pmax.value();
                        stats.total_generation_mw += g.active_power.value();
                    }
                }
                Node::Load(l) => {
                    stats.num_loads += 1;
                    if l.status {
                        stats.total_load_mw += l.active_power.value();
                        stats.total_load_mvar += l.reactive_power.value();
                    }
                }
            }
        }

        for edge in self.graph.edge_weights() {
            let Edge::Branch(branch) = edge;
            stats.num_branches += 1;
            if branch.status {
                stats.num_online_branches += 1;
            }
        }
        stats
    }

    /// Get total active power load of online loads (MW)
    pub fn total_load_mw(&self) -> f64 {
        self.stats().total_load_mw
    }

    /// Buses designated as slack, in network order
    pub fn slack_buses(&self) -> Vec<&Bus> {
        self.buses().into_iter().filter(|b| b.is_slack()).collect()
    }

    /// Find generators at a specific bus
    pub fn generators_at_bus(&self, bus_id: BusId) -> Vec<&Gen> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) if g.bus == bus_id => Some(g),
                _ => None,
            })
            .collect()
    }

    /// Get all buses as a vector
    pub fn buses(&self) -> Vec<&Bus> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Get all generators as a vector
    pub fn generators(&self) -> Vec<&Gen> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    /// Get all loads as a vector
    pub fn loads(&self) -> Vec<&Load> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Load(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    /// Get all branches as a vector
    pub fn branches(&self) -> Vec<&Branch> {
        self.graph
            .edge_weights()
            .map(|e| match e {
                Edge::Branch(b) => b,
            })
            .collect()
    }

    /// Flatten into a serializable snapshot
    pub fn to_data(&self) -> NetworkData {
        NetworkData {
            base_mva: self.base_mva,
            buses: self.buses().into_iter().cloned().collect(),
            branches: self.branches().into_iter().cloned().collect(),
            generators: self.generators().into_iter().cloned().collect(),
            loads: self.loads().into_iter().cloned().collect(),
        }
    }
}

/// Flat, serializable snapshot of a [`Network`].
///
/// Element order within each vector is the network's external order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkData {
    #[serde(default = "default_base_mva")]
    pub base_mva: f64,
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub generators: Vec<Gen>,
    #[serde(default)]
    pub loads: Vec<Load>,
}

fn default_base_mva() -> f64 {
    DEFAULT_BASE_MVA
}

impl NetworkData {
    /// Build the graph. Branches naming unknown buses are a topology error.
    pub fn into_network(self) -> VoltResult<Network> {
        if !(self.base_mva > 0.0 && self.base_mva.is_finite()) {
            return Err(VoltError::Config(format!(
                "base_mva must be positive, got {}",
                self.base_mva
            )));
        }
        let mut network = Network::new().with_base_mva(self.base_mva);
        for bus in self.buses {
            network.add_bus(bus);
        }
        for gen in self.generators {
            network.add_gen(gen);
        }
        for load in self.loads {
            network.add_load(load);
        }
        for branch in self.branches {
            network.add_branch(branch)?;
        }
        Ok(network)
    }

    pub fn from_json(json: &str) -> VoltResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Statistics about a network's size and capacity
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_gens: usize,
    pub num_loads: usize,
    pub num_branches: usize,
    pub num_online_branches: usize,
    pub total_load_mw: f64,
    pub total_load_mvar: f64,
    pub total_generation_mw: f64,
    pub total_gen_capacity_mw: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} branches ({} online), {} generators, {} loads; \
             load {:.1} MW / {:.1} MVAr, generation {:.1} MW, capacity {:.1} MW",
            self.num_buses,
            self.num_branches,
            self.num_online_branches,
            self.num_gens,
            self.num_loads,
            self.total_load_mw,
            self.total_load_mvar,
            self.total_generation_mw,
            self.total_gen_capacity_mw
        )
    }
}
