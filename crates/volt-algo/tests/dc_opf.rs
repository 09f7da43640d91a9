//! DC-OPF solver tests
//!
//! Unconstrained case6ww reference: every line is below its rating at the
//! economic dispatch, so all buses clear at one price. With gen 1 on its
//! 50 MW minimum the equal-marginal-cost point is
//! P2 = 2.8712 / 0.0326 MW, P3 = 160 − P2, λ = 10.333 + 0.01778·P2.

use volt_algo::test_utils::case6ww;
use volt_algo::{OpfMethod, OpfOptions, OpfSolver};
use volt_core::{BusId, Degrees, Edge, MegavoltAmperes, Network, SparseSolverKind};

fn bus_price(network: &Network, bus: BusId) -> f64 {
    network
        .buses()
        .into_iter()
        .find(|b| b.id == bus)
        .map(|b| b.lam_p)
        .unwrap()
}

fn with_branch<F: Fn(&mut volt_core::Branch)>(network: &mut Network, from: usize, to: usize, f: F) {
    for edge in network.graph.edge_weights_mut() {
        let Edge::Branch(branch) = edge;
        if branch.from_bus == BusId::new(from) && branch.to_bus == BusId::new(to) {
            f(branch);
        }
    }
}

/// Marginal cost − λ + μ_pmax − μ_pmin must vanish for every generator.
fn assert_dispatch_stationary(network: &Network, tol: f64) {
    for gen in network.generators() {
        let mc = gen.cost_model.marginal_cost(gen.active_power.value());
        let residual = mc - bus_price(network, gen.bus) + gen.mu_pmax - gen.mu_pmin;
        assert!(
            residual.abs() < tol,
            "gen {} stationarity residual {}",
            gen.id.value(),
            residual
        );
    }
}

const P2_OPT: f64 = 88.073_619_631_901_83;
const P3_OPT: f64 = 71.926_380_368_098_17;
const LAMBDA_OPT: f64 = 11.898_948_957_055_214;
const OBJECTIVE_OPT: f64 = 3_046.412_511_656_442;
const MU_PMIN_OPT: f64 = 0.303_051_042_944_785_3;

#[test]
fn test_economic_dispatch_without_congestion() {
    let mut network = case6ww();
    let solver = OpfSolver::with_options(OpfOptions::default().with_tolerance(1e-10));
    let solution = solver.solve(&mut network).unwrap();

    assert!(solution.converged);
    assert_eq!(solution.method, OpfMethod::Dc);
    assert!(
        (solution.objective - OBJECTIVE_OPT).abs() < 1e-6,
        "objective {}",
        solution.objective
    );
    assert!(
        ((solution.objective - OBJECTIVE_OPT) / OBJECTIVE_OPT).abs() < 1e-9,
        "relative objective error {}",
        (solution.objective - OBJECTIVE_OPT) / OBJECTIVE_OPT
    );

    let pg: Vec<f64> = network
        .generators()
        .iter()
        .map(|g| g.active_power.value())
        .collect();
    let expected = [50.0, P2_OPT, P3_OPT];
    for (p, e) in pg.iter().zip(expected) {
        assert!((p - e).abs() < 1e-6, "dispatch {:?}", pg);
    }
    let total: f64 = pg.iter().sum();
    assert!((total - 210.0).abs() < 1e-8);

    for bus in network.buses() {
        assert!(
            (bus.lam_p - LAMBDA_OPT).abs() < 1e-6,
            "bus {} price {}",
            bus.id.value(),
            bus.lam_p
        );
    }
    // gen 1 sits on its minimum
    let gen1 = network.generators()[0].clone();
    assert!((gen1.mu_pmin - MU_PMIN_OPT).abs() < 1e-6, "mu_pmin {}", gen1.mu_pmin);
    assert!(gen1.mu_pmax.abs() < 1e-6);
    for gen in &network.generators()[1..] {
        assert!(gen.mu_pmin.abs() < 1e-6 && gen.mu_pmax.abs() < 1e-6);
    }

    assert_dispatch_stationary(&network, 1e-6);
}

#[test]
fn test_congestion_separates_prices() {
    let mut network = case6ww();
    with_branch(&mut network, 2, 4, |b| b.rating_a = Some(MegavoltAmperes(40.0)));

    let solution = OpfSolver::new().solve(&mut network).unwrap();
    assert!(solution.converged);
    assert!(solution.objective > 3046.4125);

    let line = network
        .branches()
        .into_iter()
        .find(|b| b.from_bus == BusId::new(2) && b.to_bus == BusId::new(4))
        .cloned()
        .unwrap();
    assert!(line.p_from.value() <= 40.0 + 1e-3, "flow {}", line.p_from);
    assert!(line.mu_s_from > 1e-3, "mu_s_from {}", line.mu_s_from);

    let spread = bus_price(&network, BusId::new(4)) - bus_price(&network, BusId::new(2));
    assert!(spread > 1e-2, "price spread {}", spread);
    for branch in network.branches() {
        if let Some(rate) = branch.rating_a {
            assert!(branch.p_from.value().abs() <= rate.value() + 1e-3);
        }
    }
    assert_dispatch_stationary(&network, 5e-3);
}

#[test]
fn test_angle_difference_limit_binds() {
    let mut network = case6ww();
    let limit = Degrees(2.5).to_radians();
    with_branch(&mut network, 2, 4, |b| b.angle_max = Some(limit));

    // Limits are ignored unless enabled
    let mut unlimited = network.clone();
    OpfSolver::new().solve(&mut unlimited).unwrap();
    let angle = |n: &Network, id: usize| {
        n.buses()
            .into_iter()
            .find(|b| b.id == BusId::new(id))
            .map(|b| b.angle.value())
            .unwrap()
    };
    assert!(angle(&unlimited, 2) - angle(&unlimited, 4) > 2.5);

    let solver = OpfSolver::with_options(OpfOptions::default().with_angle_limits(true));
    let solution = solver.solve(&mut network).unwrap();
    assert!(solution.converged);
    assert!(angle(&network, 2) - angle(&network, 4) <= 2.5 + 1e-4);

    let line = network
        .branches()
        .into_iter()
        .find(|b| b.from_bus == BusId::new(2) && b.to_bus == BusId::new(4))
        .cloned()
        .unwrap();
    assert!(line.mu_angmax > 0.0);
    assert!(line.mu_angmin.abs() < 1e-6);
}

#[test]
fn test_solvers_and_runs_agree() {
    let mut first = case6ww();
    let mut second = case6ww();
    let faer = OpfSolver::new().solve(&mut first).unwrap();
    let gauss = OpfSolver::with_options(OpfOptions::default().with_solver(SparseSolverKind::Gauss))
        .solve(&mut second)
        .unwrap();

    assert!(gauss.converged);
    for (a, b) in faer.x.iter().zip(&gauss.x) {
        assert!((a - b).abs() < 1e-6);
    }

    let mut third = case6ww();
    let again = OpfSolver::new().solve(&mut third).unwrap();
    assert_eq!(faer.x, again.x);
    assert_eq!(faer.objective, again.objective);
}
