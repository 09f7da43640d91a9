//! DC power flow.
//!
//! Solves the linearized network equations for bus voltage angles:
//!
//! ```text
//! B_red × θ_red = P_red − B[pvpq, slack] × θ_slack
//!
//! P = (P_gen − P_load − G_shunt) / base_mva − Pbusinj
//! ```
//!
//! where `B_red` is Bbus with the slack row and column removed. The solve is
//! pure (`&Network`); [`DcPowerFlow::integrate`] writes angles, flows, bus
//! injections and the slack generator's balancing set-point back.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use volt_core::{
    find_islands, BranchId, BusId, Degrees, Edge, EdgeIndex, GenId, Megavars, Megawatts, Network,
    Node, NodeIndex, PerUnit, SparseSolver, SparseSolverKind, VoltError, VoltResult,
};

use crate::sparse::{BranchTerminals, SparseSusceptance};

/// DC power-flow settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcPowerFlowOptions {
    /// Linear solver used for the reduced susceptance system
    pub solver: SparseSolverKind,
}

impl DcPowerFlowOptions {
    pub fn with_solver(mut self, solver: SparseSolverKind) -> Self {
        self.solver = solver;
        self
    }
}

/// Result of a DC power-flow solve, in network order.
#[derive(Debug, Clone, Serialize)]
pub struct DcPowerFlowSolution {
    pub bus_ids: Vec<BusId>,
    /// Voltage angles (radians), slack included
    pub angles_rad: Vec<f64>,
    /// Net injection into the branches at each bus (MW)
    pub bus_injection_mw: Vec<f64>,
    /// Online branches only
    pub branch_ids: Vec<BranchId>,
    /// Source-end active flow of each online branch (MW)
    pub branch_flow_mw: Vec<f64>,
    pub slack_bus: BusId,
    /// Slack generator and its balancing set-point (MW)
    pub slack_generation: Option<(GenId, f64)>,
    #[serde(skip)]
    bus_nodes: Vec<NodeIndex>,
    #[serde(skip)]
    branch_edges: Vec<EdgeIndex>,
    #[serde(skip)]
    slack_gen_node: Option<NodeIndex>,
}

/// DC power-flow solver bound to one linear solver backend
pub struct DcPowerFlow {
    solver: Arc<dyn SparseSolver>,
}

impl Default for DcPowerFlow {
    fn default() -> Self {
        Self::new(&DcPowerFlowOptions::default())
    }
}

impl DcPowerFlow {
    pub fn new(options: &DcPowerFlowOptions) -> Self {
        Self {
            solver: options.solver.build_solver(),
        }
    }

    pub fn with_solver(solver: Arc<dyn SparseSolver>) -> Self {
        Self { solver }
    }

    /// Solve for bus angles and branch flows without touching the network.
    pub fn solve(&self, network: &Network) -> VoltResult<DcPowerFlowSolution> {
        let base_mva = network.base_mva;
        if !(base_mva > 0.0 && base_mva.is_finite()) {
            return Err(VoltError::Config(format!(
                "base_mva must be positive, got {base_mva}"
            )));
        }

        // ====================================================================
        // Bus indexing and slack selection
        // ====================================================================
        let mut bus_nodes = Vec::new();
        let mut bus_ids = Vec::new();
        let mut bus_index: HashMap<BusId, usize> = HashMap::new();
        let mut slacks = Vec::new();
        for node in network.graph.node_indices() {
            if let Node::Bus(bus) = &network.graph[node] {
                if bus.is_slack() {
                    slacks.push(bus_ids.len());
                }
                bus_index.insert(bus.id, bus_ids.len());
                bus_ids.push(bus.id);
                bus_nodes.push(node);
            }
        }
        let n_bus = bus_ids.len();
        if n_bus == 0 {
            return Err(VoltError::Topology("network has no buses".into()));
        }
        let slack = match slacks.as_slice() {
            [only] => *only,
            [] => return Err(VoltError::Topology("DC power flow requires a slack bus".into())),
            many => {
                return Err(VoltError::Topology(format!(
                    "DC power flow requires a single slack bus, found {}",
                    many.len()
                )))
            }
        };

        let islands = find_islands(network);
        let unreferenced = islands.unreferenced_buses();
        if !unreferenced.is_empty() {
            let ids: Vec<String> = unreferenced.iter().map(|b| b.value().to_string()).collect();
            return Err(VoltError::Topology(format!(
                "buses not connected to the slack bus: {}",
                ids.join(", ")
            )));
        }

        // ====================================================================
        // Susceptance matrices over online branches
        // ====================================================================
        let mut terminals = Vec::new();
        let mut branch_edges = Vec::new();
        let mut branch_ids = Vec::new();
        for edge in network.graph.edge_indices() {
            let Edge::Branch(branch) = &network.graph[edge];
            if !branch.status {
                continue;
            }
            let from = *bus_index.get(&branch.from_bus).ok_or_else(|| {
                VoltError::Topology(format!("branch '{}' has unknown from bus", branch.name))
            })?;
            let to = *bus_index.get(&branch.to_bus).ok_or_else(|| {
                VoltError::Topology(format!("branch '{}' has unknown to bus", branch.name))
            })?;
            terminals.push(BranchTerminals { from, to, branch });
            branch_edges.push(edge);
            branch_ids.push(branch.id);
        }
        let susceptance = SparseSusceptance::from_branches(n_bus, &terminals)?;
        debug!(
            buses = n_bus,
            branches = terminals.len(),
            nnz = susceptance.nnz(),
            "assembled DC susceptance"
        );

        // ====================================================================
        // Scheduled injections (p.u.)
        // ====================================================================
        let mut p_sched = vec![0.0; n_bus];
        let mut slack_gen_node = None;
        for node in network.graph.node_indices() {
            match &network.graph[node] {
                Node::Gen(gen) if gen.status => {
                    if let Some(&i) = bus_index.get(&gen.bus) {
                        p_sched[i] += gen.active_power.to_pu(base_mva);
                        if i == slack && slack_gen_node.is_none() {
                            slack_gen_node = Some(node);
                        }
                    }
                }
                Node::Load(load) if load.status => {
                    if let Some(&i) = bus_index.get(&load.bus) {
                        p_sched[i] -= load.active_power.to_pu(base_mva);
                    }
                }
                Node::Bus(bus) => {
                    if let Some(&i) = bus_index.get(&bus.id) {
                        p_sched[i] -= bus.gs_mw.to_pu(base_mva);
                    }
                }
                _ => {}
            }
        }
        for (p, inj) in p_sched.iter_mut().zip(susceptance.pbusinj()) {
            *p -= inj;
        }

        // ====================================================================
        // Reduced solve and slack reinsertion
        // ====================================================================
        let theta_slack = match &network.graph[bus_nodes[slack]] {
            Node::Bus(bus) => bus.angle.to_radians().value(),
            _ => 0.0,
        };
        let (b_red, rhs) = susceptance.reduced_system(slack, theta_slack, &p_sched);
        let theta_red = self.solver.solve(&b_red, &rhs).map_err(|err| match err {
            VoltError::Numeric(msg) => {
                VoltError::Numeric(format!("reduced susceptance matrix is singular: {msg}"))
            }
            other => other,
        })?;

        let mut angles_rad = Vec::with_capacity(n_bus);
        angles_rad.extend_from_slice(&theta_red[..slack]);
        angles_rad.push(theta_slack);
        angles_rad.extend_from_slice(&theta_red[slack..]);

        let bus_injection_mw: Vec<f64> = susceptance
            .injections(&angles_rad)
            .into_iter()
            .map(|p| p * base_mva)
            .collect();
        let branch_flow_mw: Vec<f64> = susceptance
            .branch_flows(&angles_rad)
            .into_iter()
            .map(|p| p * base_mva)
            .collect();

        // Slack generator covers whatever the scheduled injection misses
        let slack_generation = match slack_gen_node.map(|node| &network.graph[node]) {
            Some(Node::Gen(gen)) => {
                let scheduled_pu = p_sched[slack] + susceptance.pbusinj()[slack];
                let mismatch_mw = bus_injection_mw[slack] - scheduled_pu * base_mva;
                Some((gen.id, gen.active_power.value() + mismatch_mw))
            }
            _ => {
                warn!(
                    slack_bus = bus_ids[slack].value(),
                    "slack bus has no online generator; balance left unassigned"
                );
                None
            }
        };

        let slack_bus = bus_ids[slack];
        info!(
            buses = n_bus,
            branches = branch_ids.len(),
            solver = self.solver.name(),
            slack_mw = slack_generation.map(|(_, p)| p).unwrap_or(0.0),
            "DC power flow solved"
        );

        Ok(DcPowerFlowSolution {
            bus_ids,
            angles_rad,
            bus_injection_mw,
            branch_ids,
            branch_flow_mw,
            slack_bus,
            slack_generation,
            bus_nodes,
            branch_edges,
            slack_gen_node,
        })
    }

    /// Write a solution back into the network it was computed from.
    pub fn integrate(network: &mut Network, solution: &DcPowerFlowSolution) -> VoltResult<()> {
        let mismatch = || VoltError::Topology("solution does not match this network".into());

        for ((&node, &theta), &p_inj) in solution
            .bus_nodes
            .iter()
            .zip(&solution.angles_rad)
            .zip(&solution.bus_injection_mw)
        {
            match network.graph.node_weight_mut(node) {
                Some(Node::Bus(bus)) => {
                    bus.voltage_pu = PerUnit(1.0);
                    bus.angle = Degrees(theta.to_degrees());
                    bus.p_injection = Megawatts(p_inj);
                }
                _ => return Err(mismatch()),
            }
        }

        for (&edge, &p_from) in solution.branch_edges.iter().zip(&solution.branch_flow_mw) {
            match network.graph.edge_weight_mut(edge) {
                Some(Edge::Branch(branch)) => {
                    branch.p_from = Megawatts(p_from);
                    branch.p_to = Megawatts(-p_from);
                    branch.q_from = Megavars(0.0);
                    branch.q_to = Megavars(0.0);
                }
                None => return Err(mismatch()),
            }
        }

        if let (Some(node), Some((_, p_mw))) = (solution.slack_gen_node, solution.slack_generation)
        {
            match network.graph.node_weight_mut(node) {
                Some(Node::Gen(gen)) => gen.active_power = Megawatts(p_mw),
                _ => return Err(mismatch()),
            }
        }
        Ok(())
    }
}

/// Solve DC power flow and integrate the result into `network`.
///
/// On error the network is left untouched.
pub fn solve_dc(
    network: &mut Network,
    options: &DcPowerFlowOptions,
) -> VoltResult<DcPowerFlowSolution> {
    let solution = DcPowerFlow::new(options).solve(network)?;
    DcPowerFlow::integrate(network, &solution)?;
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::case6ww;
    use volt_core::{Bus, BusType, GenId};

    fn set_bus_type(network: &mut Network, id: usize, bus_type: BusType) {
        for node in network.graph.node_weights_mut() {
            if let Node::Bus(bus) = node {
                if bus.id == BusId::new(id) {
                    bus.bus_type = bus_type;
                }
            }
        }
    }

    #[test]
    fn test_slack_angle_and_kirchhoff() {
        let network = case6ww();
        let solution = DcPowerFlow::default().solve(&network).unwrap();

        assert_eq!(solution.slack_bus, BusId::new(1));
        assert_eq!(solution.angles_rad[0], 0.0);
        // Injections sum to zero on a lossless network
        let total: f64 = solution.bus_injection_mw.iter().sum();
        assert!(total.abs() < 1e-9, "total injection {}", total);
        let (gen, p) = solution.slack_generation.unwrap();
        assert_eq!(gen, GenId::new(1));
        assert!((p - 100.0).abs() < 1e-4, "slack set-point {}", p);
    }

    #[test]
    fn test_requires_single_slack() {
        let mut network = case6ww();
        set_bus_type(&mut network, 2, BusType::Slack);
        let err = DcPowerFlow::default().solve(&network).unwrap_err();
        assert!(matches!(err, VoltError::Topology(_)));

        set_bus_type(&mut network, 1, BusType::PV);
        set_bus_type(&mut network, 2, BusType::PV);
        let err = solve_dc(&mut network, &DcPowerFlowOptions::default()).unwrap_err();
        assert!(matches!(err, VoltError::Topology(_)));
        // Failure leaves the network untouched
        assert!(network.branches().iter().all(|b| b.p_from.value() == 0.0));
    }

    #[test]
    fn test_island_is_reported() {
        let mut network = case6ww();
        network.add_bus(Bus {
            id: BusId::new(7),
            name: "Bus 7".into(),
            ..Bus::default()
        });
        let err = DcPowerFlow::default().solve(&network).unwrap_err();
        assert!(err.to_string().contains('7'), "{}", err);
    }

    #[test]
    fn test_backends_agree() {
        let network = case6ww();
        let faer = DcPowerFlow::new(&DcPowerFlowOptions::default())
            .solve(&network)
            .unwrap();
        let gauss = DcPowerFlow::new(&DcPowerFlowOptions::default().with_solver(SparseSolverKind::Gauss))
            .solve(&network)
            .unwrap();
        for (a, b) in faer.angles_rad.iter().zip(&gauss.angles_rad) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
