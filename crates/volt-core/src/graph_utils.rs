use crate::{BusId, Edge, Network, Node};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};

/// One electrically connected group of buses.
#[derive(Debug, Clone)]
pub struct IslandSummary {
    pub island_id: usize,
    pub bus_count: usize,
    /// Whether any bus in the island is a slack bus
    pub has_slack: bool,
}

/// Aggregated island analysis result.
#[derive(Debug, Clone)]
pub struct IslandAnalysis {
    pub islands: Vec<IslandSummary>,
    /// Island of every bus, keyed by bus ID
    pub assignments: HashMap<BusId, usize>,
}

impl IslandAnalysis {
    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    pub fn island_of(&self, bus: BusId) -> Option<usize> {
        self.assignments.get(&bus).copied()
    }

    /// Buses whose island contains no slack bus. Every such bus is
    /// unreachable from a reference bus through online branches.
    pub fn unreferenced_buses(&self) -> Vec<BusId> {
        let mut buses: Vec<BusId> = self
            .assignments
            .iter()
            .filter(|(_, &island)| !self.islands[island].has_slack)
            .map(|(&bus, _)| bus)
            .collect();
        buses.sort_by_key(|b| b.value());
        buses
    }
}

/// Labels bus islands by breadth-first search over online branches only.
///
/// Generator and load nodes never join buses in the graph, so they are
/// skipped; out-of-service branches do not connect their ends.
pub fn find_islands(network: &Network) -> IslandAnalysis {
    let mut island_of_node: HashMap<NodeIndex, usize> = HashMap::new();
    let mut islands = Vec::new();
    let mut assignments = HashMap::new();

    for start in network.graph.node_indices() {
        if island_of_node.contains_key(&start) || !matches!(network.graph[start], Node::Bus(_)) {
            continue;
        }
        let island_id = islands.len();
        let mut summary = IslandSummary {
            island_id,
            bus_count: 0,
            has_slack: false,
        };
        let mut queue = VecDeque::from([start]);
        island_of_node.insert(start, island_id);
        while let Some(node) = queue.pop_front() {
            if let Node::Bus(bus) = &network.graph[node] {
                summary.bus_count += 1;
                summary.has_slack |= bus.is_slack();
                assignments.insert(bus.id, island_id);
            }
            for edge in network.graph.edges(node) {
                let Edge::Branch(branch) = edge.weight();
                if !branch.status {
                    continue;
                }
                let next = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if !island_of_node.contains_key(&next) {
                    island_of_node.insert(next, island_id);
                    queue.push_back(next);
                }
            }
        }
        islands.push(summary);
    }

    IslandAnalysis {
        islands,
        assignments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Branch, BranchId, Bus, BusType};

    fn bus(id: usize, bus_type: BusType) -> Bus {
        Bus {
            id: BusId::new(id),
            name: format!("Bus {id}"),
            bus_type,
            ..Bus::default()
        }
    }

    fn line(id: usize, from: usize, to: usize) -> Branch {
        Branch::new(
            BranchId::new(id),
            format!("Line {from}-{to}"),
            BusId::new(from),
            BusId::new(to),
            0.01,
            0.1,
        )
    }

    #[test]
    fn test_single_island() {
        let mut network = Network::new();
        network.add_bus(bus(1, BusType::Slack));
        network.add_bus(bus(2, BusType::PQ));
        network.add_bus(bus(3, BusType::PQ));
        network.add_branch(line(1, 1, 2)).unwrap();
        network.add_branch(line(2, 2, 3)).unwrap();

        let analysis = find_islands(&network);
        assert_eq!(analysis.island_count(), 1);
        assert_eq!(analysis.islands[0].bus_count, 3);
        assert!(analysis.unreferenced_buses().is_empty());
    }

    #[test]
    fn test_offline_branch_splits_island() {
        let mut network = Network::new();
        network.add_bus(bus(1, BusType::Slack));
        network.add_bus(bus(2, BusType::PQ));
        network.add_bus(bus(3, BusType::PQ));
        network.add_branch(line(1, 1, 2)).unwrap();
        let mut open = line(2, 2, 3);
        open.status = false;
        network.add_branch(open).unwrap();

        let analysis = find_islands(&network);
        assert_eq!(analysis.island_count(), 2);
        assert_eq!(
            analysis.island_of(BusId::new(1)),
            analysis.island_of(BusId::new(2))
        );
        assert_eq!(analysis.unreferenced_buses(), vec![BusId::new(3)]);
    }
}
