//! Shared fixtures for unit tests, integration tests and the CLI.

use volt_core::{
    Branch, BranchId, Bus, BusId, BusType, CostModel, Edge, Gen, GenId, Kilovolts, Load, LoadId,
    Network, PerUnit,
};

/// Wood & Wollenberg 6-bus system on a 100 MVA base.
///
/// Bus 1 is the slack; buses 2 and 3 regulate voltage; buses 4-6 each carry
/// a 70 MW / 70 MVAr load. Every branch has a thermal rating and every
/// generator a quadratic cost.
pub fn case6ww() -> Network {
    let mut network = Network::new().with_base_mva(100.0);

    let buses = [
        (1, BusType::Slack, 1.05, 1.05, 1.05),
        (2, BusType::PV, 1.05, 1.05, 1.05),
        (3, BusType::PV, 1.07, 1.07, 1.07),
        (4, BusType::PQ, 1.0, 0.95, 1.05),
        (5, BusType::PQ, 1.0, 0.95, 1.05),
        (6, BusType::PQ, 1.0, 0.95, 1.05),
    ];
    let mut bus_nodes = Vec::with_capacity(buses.len());
    for (id, bus_type, vm, vmin, vmax) in buses {
        bus_nodes.push(network.add_bus(Bus {
            id: BusId::new(id),
            name: format!("Bus {id}"),
            base_kv: Kilovolts(230.0),
            bus_type,
            voltage_pu: PerUnit(vm),
            vmin_pu: PerUnit(vmin),
            vmax_pu: PerUnit(vmax),
            ..Bus::default()
        }));
    }

    let gens = [
        (1, 0.0, 50.0, 200.0, 1.05, (213.1, 11.669, 0.00533)),
        (2, 50.0, 37.5, 150.0, 1.05, (200.0, 10.333, 0.00889)),
        (3, 60.0, 45.0, 180.0, 1.07, (240.0, 10.833, 0.00741)),
    ];
    for (id, pg, pmin, pmax, vg, (c0, c1, c2)) in gens {
        network.add_gen(
            Gen::new(GenId::new(id), format!("Gen {id}"), BusId::new(id))
                .with_dispatch(pg)
                .with_p_limits(pmin, pmax)
                .with_q_limits(-100.0, 100.0)
                .with_voltage_setpoint(vg)
                .with_cost(CostModel::quadratic(c0, c1, c2)),
        );
    }

    for id in 4..=6 {
        network.add_load(Load::new(
            LoadId::new(id),
            format!("Load {id}"),
            BusId::new(id),
            70.0,
            70.0,
        ));
    }

    let branches = [
        (1, 2, 0.10, 0.20, 0.04, 40.0),
        (1, 4, 0.05, 0.20, 0.04, 60.0),
        (1, 5, 0.08, 0.30, 0.06, 40.0),
        (2, 3, 0.05, 0.25, 0.06, 40.0),
        (2, 4, 0.05, 0.10, 0.02, 60.0),
        (2, 5, 0.10, 0.30, 0.04, 30.0),
        (2, 6, 0.07, 0.20, 0.05, 90.0),
        (3, 5, 0.12, 0.26, 0.05, 70.0),
        (3, 6, 0.02, 0.10, 0.02, 80.0),
        (4, 5, 0.20, 0.40, 0.08, 20.0),
        (5, 6, 0.10, 0.30, 0.06, 40.0),
    ];
    for (k, (from, to, r, x, b, rate)) in branches.into_iter().enumerate() {
        let branch = Branch::new(
            BranchId::new(k + 1),
            format!("Line {from}-{to}"),
            BusId::new(from),
            BusId::new(to),
            r,
            x,
        )
        .with_charging(b)
        .with_rating(rate);
        network.graph.add_edge(
            bus_nodes[from - 1],
            bus_nodes[to - 1],
            Edge::Branch(branch),
        );
    }

    network
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case6ww_shape() {
        let stats = case6ww().stats();
        assert_eq!(stats.num_buses, 6);
        assert_eq!(stats.num_gens, 3);
        assert_eq!(stats.num_loads, 3);
        assert_eq!(stats.num_branches, 11);
        assert!((stats.total_load_mw - 210.0).abs() < 1e-12);
    }
}
