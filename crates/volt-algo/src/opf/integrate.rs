//! Write an OPF solution back onto the network.
//!
//! The only step of the OPF pipeline that mutates the network. Results are
//! converted from solver units (p.u., rad, $/h per p.u.) to the model's
//! engineering units:
//!
//! | Field | Source |
//! |-------|--------|
//! | bus angle / magnitude | `Va` (deg), `Vm` (1.0 in DC) |
//! | bus `lam_p` / `lam_q` | `Pmis`/`Qmis` multipliers / base ($/MWh) |
//! | bus `mu_vmax` / `mu_vmin` | `Vm` bound multipliers |
//! | gen P / Q, `mu_p*`, `mu_q*` | `Pg`/`Qg` and their bound multipliers / base |
//! | branch flows | `Bf·Va + Pfinj` (DC) or `Sf`/`St` (AC), in MW/MVAr |
//! | branch `mu_s_from` / `mu_s_to` | `Pf`/`Pt` rows (DC) or `Sf`/`St` (AC) |
//! | branch `mu_angmin` / `mu_angmax` | `ang` rows, per degree |
//!
//! Elements dropped while building the model are left untouched.

use std::f64::consts::PI;

use num_complex::Complex64;
use volt_core::{
    Edge, Megavars, Megawatts, Network, Node, PerUnit, Radians, VoltError, VoltResult,
};

use super::constraints::ConstraintKind;
use super::model::{OpfModel, UnitSource};
use super::types::OpfSolution;
use super::variables::VarKind;
use crate::sparse::SparseAdmittance;

/// Apply `solution` (computed from `model`) to `network`.
pub fn integrate(network: &mut Network, model: &OpfModel, solution: &OpfSolution) -> VoltResult<()> {
    let vars = &model.variables;
    if solution.x.len() != vars.len() {
        return Err(VoltError::Config(format!(
            "solution has {} variables, model expects {}",
            solution.x.len(),
            vars.len()
        )));
    }
    let base = model.base_mva;
    let x = &solution.x;
    let lambda = &solution.multipliers;
    let n_bus = model.n_bus();
    let is_ac = model.method.is_ac();

    let va = &x[vars.range(VarKind::Va)];
    let vm: Vec<f64> = if is_ac {
        x[vars.range(VarKind::Vm)].to_vec()
    } else {
        vec![1.0; n_bus]
    };
    let pg = &x[vars.range(VarKind::Pg)];
    let qg: Vec<f64> = if is_ac {
        x[vars.range(VarKind::Qg)].to_vec()
    } else {
        vec![0.0; model.n_units()]
    };
    let multiplier = |v: &[f64], k: usize| v.get(k).copied().unwrap_or(0.0);

    // ========================================================================
    // Branch flows (p.u.) and flow multipliers
    // ========================================================================
    let n_branch = model.branches.len();
    let mut s_from = vec![Complex64::default(); n_branch];
    let mut s_to = vec![Complex64::default(); n_branch];
    let mut mu_s_from = vec![0.0; n_branch];
    let mut mu_s_to = vec![0.0; n_branch];
    let mut lam_p = vec![0.0; n_bus];
    let mut lam_q = vec![0.0; n_bus];

    if is_ac {
        let admittance: &SparseAdmittance = model.admittance.as_ref().ok_or_else(|| {
            VoltError::Config("AC model has no admittance matrices".into())
        })?;
        let v: Vec<Complex64> = vm
            .iter()
            .zip(va)
            .map(|(&m, &a)| Complex64::from_polar(m, a))
            .collect();
        (s_from, s_to) = admittance.branch_flows(&v);

        let n_lim = model.flow_limited.len();
        for (k, &l) in model.flow_limited.iter().enumerate() {
            // ∂(|S|² − Fmax²)/∂|S| = 2·Fmax at a binding limit
            let rate = model.branches[l].branch.limit_pu(base).unwrap_or(0.0);
            mu_s_from[l] = 2.0 * multiplier(&lambda.ineq_nonlin, k) * rate / base;
            mu_s_to[l] = 2.0 * multiplier(&lambda.ineq_nonlin, n_lim + k) * rate / base;
        }
        for i in 0..n_bus {
            lam_p[i] = multiplier(&lambda.eq_nonlin, i) / base;
            lam_q[i] = multiplier(&lambda.eq_nonlin, n_bus + i) / base;
        }
    } else {
        let susceptance = model.susceptance.as_ref().ok_or_else(|| {
            VoltError::Config("DC model has no susceptance matrices".into())
        })?;
        let flows = susceptance.branch_flows(va);
        for (l, &p) in flows.iter().enumerate() {
            s_from[l] = Complex64::new(p, 0.0);
            s_to[l] = Complex64::new(-p, 0.0);
        }

        let pf = model.constraints.range(ConstraintKind::Pf);
        let pt = model.constraints.range(ConstraintKind::Pt);
        for (k, &l) in model.flow_limited.iter().enumerate() {
            mu_s_from[l] = multiplier(&lambda.mu_u, pf.start + k) / base;
            mu_s_to[l] = multiplier(&lambda.mu_u, pt.start + k) / base;
        }
        let pmis = model.constraints.range(ConstraintKind::Pmis);
        for i in 0..n_bus {
            let row = pmis.start + i;
            lam_p[i] = (multiplier(&lambda.mu_u, row) - multiplier(&lambda.mu_l, row)) / base;
        }
    }

    let mut mu_angmin = vec![0.0; n_branch];
    let mut mu_angmax = vec![0.0; n_branch];
    let ang = model.constraints.range(ConstraintKind::Ang);
    for (k, &l) in model.angle_limited.iter().enumerate() {
        mu_angmin[l] = multiplier(&lambda.mu_l, ang.start + k) * PI / 180.0;
        mu_angmax[l] = multiplier(&lambda.mu_u, ang.start + k) * PI / 180.0;
    }

    let mut injection = vec![0.0; n_bus];
    for (l, b) in model.branches.iter().enumerate() {
        injection[b.from] += s_from[l].re;
        injection[b.to] += s_to[l].re;
    }

    // ========================================================================
    // Write back
    // ========================================================================
    let vm_block = vars.offset(VarKind::Vm);
    for (i, &node) in model.mapping.buses.iter().enumerate() {
        let Some(Node::Bus(bus)) = network.graph.node_weight_mut(node) else {
            return Err(VoltError::Topology(format!(
                "bus node {} missing from network",
                node.index()
            )));
        };
        bus.angle = Radians(va[i]).to_degrees();
        bus.voltage_pu = PerUnit(vm[i]);
        bus.p_injection = Megawatts::from_pu(injection[i], base);
        bus.lam_p = lam_p[i];
        bus.lam_q = lam_q[i];
        if is_ac {
            bus.mu_vmax = multiplier(&lambda.upper, vm_block + i);
            bus.mu_vmin = multiplier(&lambda.lower, vm_block + i);
        } else {
            bus.mu_vmax = 0.0;
            bus.mu_vmin = 0.0;
        }
    }

    for (l, &edge) in model.mapping.branches.iter().enumerate() {
        let Some(Edge::Branch(branch)) = network.graph.edge_weight_mut(edge) else {
            return Err(VoltError::Topology(format!(
                "branch edge {} missing from network",
                edge.index()
            )));
        };
        branch.p_from = Megawatts::from_pu(s_from[l].re, base);
        branch.q_from = Megavars::from_pu(s_from[l].im, base);
        branch.p_to = Megawatts::from_pu(s_to[l].re, base);
        branch.q_to = Megavars::from_pu(s_to[l].im, base);
        branch.mu_s_from = mu_s_from[l];
        branch.mu_s_to = mu_s_to[l];
        branch.mu_angmin = mu_angmin[l];
        branch.mu_angmax = mu_angmax[l];
    }

    let pg_block = vars.offset(VarKind::Pg);
    let qg_block = vars.offset(VarKind::Qg);
    for (u, unit) in model.units.iter().enumerate() {
        match unit.source {
            UnitSource::Generator(node) => {
                let Some(Node::Gen(gen)) = network.graph.node_weight_mut(node) else {
                    return Err(VoltError::Topology(format!(
                        "generator node {} missing from network",
                        node.index()
                    )));
                };
                gen.active_power = Megawatts::from_pu(pg[u], base);
                gen.mu_pmax = multiplier(&lambda.upper, pg_block + u) / base;
                gen.mu_pmin = multiplier(&lambda.lower, pg_block + u) / base;
                if is_ac {
                    gen.reactive_power = Megavars::from_pu(qg[u], base);
                    gen.mu_qmax = multiplier(&lambda.upper, qg_block + u) / base;
                    gen.mu_qmin = multiplier(&lambda.lower, qg_block + u) / base;
                }
            }
            UnitSource::Load(node) => {
                let Some(Node::Load(load)) = network.graph.node_weight_mut(node) else {
                    return Err(VoltError::Topology(format!(
                        "load node {} missing from network",
                        node.index()
                    )));
                };
                let consumed = -pg[u] * base;
                if is_ac {
                    load.reactive_power = Megavars(-qg[u] * base);
                } else if load.active_power.value() != 0.0 {
                    // constant power factor
                    let ratio = consumed / load.active_power.value();
                    load.reactive_power = load.reactive_power * ratio;
                }
                load.active_power = Megawatts(consumed);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::{build_opf_model, pips, OpfOptions, PipsOptions};
    use crate::test_utils::case6ww;
    use volt_core::{BusId, CostModel, FaerSolver, LoadBid};

    #[test]
    fn test_rejects_mismatched_solution() {
        let mut network = case6ww();
        let model = build_opf_model(&network, &OpfOptions::default()).unwrap();
        let solution = OpfSolution {
            x: vec![0.0; 3],
            ..OpfSolution::default()
        };
        let err = integrate(&mut network, &model, &solution).unwrap_err();
        assert!(matches!(err, VoltError::Config(_)));
    }

    #[test]
    fn test_dc_flows_are_antisymmetric() {
        let mut network = case6ww();
        let model = build_opf_model(&network, &OpfOptions::default()).unwrap();
        let solution = pips::solve(&model, &PipsOptions::default(), &FaerSolver).unwrap();
        assert!(solution.converged);
        integrate(&mut network, &model, &solution).unwrap();

        for branch in network.branches() {
            assert!((branch.p_from.value() + branch.p_to.value()).abs() < 1e-9);
            assert_eq!(branch.q_from.value(), 0.0);
        }
        for bus in network.buses() {
            assert_eq!(bus.voltage_pu.value(), 1.0);
            assert!(bus.lam_p > 0.0, "bus {} price {}", bus.id.value(), bus.lam_p);
        }
        let slack = network.slack_buses()[0].angle.value();
        assert!(slack.abs() < 1e-12);
    }

    #[test]
    fn test_dc_dispatchable_load_keeps_power_factor() {
        let mut network = case6ww();
        for node in network.graph.node_indices() {
            if let Node::Load(load) = &mut network.graph[node] {
                if load.bus == BusId::new(6) {
                    load.reactive_power = Megavars(35.0);
                    load.bid = Some(LoadBid {
                        p_max: None,
                        cost: CostModel::piecewise(vec![(-70.0, -7000.0), (0.0, 0.0)]),
                    });
                }
            }
        }
        let model = build_opf_model(&network, &OpfOptions::default()).unwrap();
        let solution = pips::solve(&model, &PipsOptions::default(), &FaerSolver).unwrap();
        assert!(solution.converged);
        integrate(&mut network, &model, &solution).unwrap();

        let load = network
            .loads()
            .into_iter()
            .find(|l| l.bus == BusId::new(6))
            .unwrap();
        // 100 $/MWh bid clears far above the generators' marginal cost
        assert!((load.active_power.value() - 70.0).abs() < 1e-3, "{}", load.active_power);
        assert!((load.reactive_power.value() - 35.0).abs() < 1e-3, "{}", load.reactive_power);
    }
}
