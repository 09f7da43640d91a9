use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use volt_algo::{OpfMethod, OpfOptions, OpfSolution, OpfSolver};
use volt_cli::cli::OpfArgs;
use volt_cli::common::{read_network, write_json, write_network};
use volt_core::{Network, SparseSolverKind};

// ============================================================================
// JSON Output Types for `opf`
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct SolutionStatus {
    converged: bool,
    iterations: usize,
    solve_time_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
struct BusResult {
    id: usize,
    vm_pu: f64,
    va_deg: f64,
    lam_p: f64,
    lam_q: f64,
}

#[derive(Debug, Clone, Serialize)]
struct GenResult {
    id: usize,
    bus: usize,
    p_mw: f64,
    q_mvar: f64,
    mu_pmax: f64,
    mu_pmin: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BranchResult {
    id: usize,
    from_bus: usize,
    to_bus: usize,
    p_from_mw: f64,
    q_from_mvar: f64,
    p_to_mw: f64,
    q_to_mvar: f64,
    mu_s_from: f64,
    mu_s_to: f64,
}

/// Full JSON output for `opf`
#[derive(Debug, Clone, Serialize)]
struct OpfRunOutput {
    method: OpfMethod,
    solver: SparseSolverKind,
    status: SolutionStatus,
    objective: f64,
    buses: Vec<BusResult>,
    generators: Vec<GenResult>,
    branches: Vec<BranchResult>,
}

impl OpfRunOutput {
    fn new(options: &OpfOptions, solution: &OpfSolution, network: &Network) -> Self {
        let buses = network
            .buses()
            .into_iter()
            .map(|b| BusResult {
                id: b.id.value(),
                vm_pu: b.voltage_pu.value(),
                va_deg: b.angle.value(),
                lam_p: b.lam_p,
                lam_q: b.lam_q,
            })
            .collect();
        let generators = network
            .generators()
            .into_iter()
            .map(|g| GenResult {
                id: g.id.value(),
                bus: g.bus.value(),
                p_mw: g.active_power.value(),
                q_mvar: g.reactive_power.value(),
                mu_pmax: g.mu_pmax,
                mu_pmin: g.mu_pmin,
            })
            .collect();
        let branches = network
            .branches()
            .into_iter()
            .map(|br| BranchResult {
                id: br.id.value(),
                from_bus: br.from_bus.value(),
                to_bus: br.to_bus.value(),
                p_from_mw: br.p_from.value(),
                q_from_mvar: br.q_from.value(),
                p_to_mw: br.p_to.value(),
                q_to_mvar: br.q_to.value(),
                mu_s_from: br.mu_s_from,
                mu_s_to: br.mu_s_to,
            })
            .collect();

        Self {
            method: solution.method,
            solver: options.solver,
            status: SolutionStatus {
                converged: solution.converged,
                iterations: solution.iterations,
                solve_time_ms: solution.solve_time_ms,
            },
            objective: solution.objective,
            buses,
            generators,
            branches,
        }
    }
}

/// Config file first, then command-line overrides.
fn resolve_options(args: &OpfArgs) -> Result<OpfOptions> {
    let mut options = match &args.config {
        Some(path) => load_config(path)?,
        None => OpfOptions::default(),
    };
    if let Some(method) = args.method {
        options = options.with_method(method);
    }
    if let Some(solver) = args.solver {
        options = options.with_solver(solver);
    }
    if let Some(max_iter) = args.max_iterations {
        options = options.with_max_iterations(max_iter);
    }
    if let Some(tol) = args.tol {
        options = options.with_tolerance(tol);
    }
    if args.angle_limits {
        options = options.with_angle_limits(true);
    }
    Ok(options)
}

fn load_config(path: &Path) -> Result<OpfOptions> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading OPF config {}", path.display()))?;
    let options = toml::from_str(&text)
        .with_context(|| format!("parsing OPF config {}", path.display()))?;
    Ok(options)
}

pub fn handle(args: &OpfArgs) -> Result<()> {
    let options = resolve_options(args)?;
    let mut network = read_network(&args.network)?;
    info!("Loaded {}", network.stats());

    let solver = OpfSolver::with_options(options.clone());
    let solution = solver
        .solve(&mut network)
        .with_context(|| format!("{} OPF on {}", options.method, args.network.display()))?;

    if solution.converged {
        write_network(&network, args.out.as_deref())?;
    } else {
        warn!("not writing the network: solve did not converge");
    }
    write_json(&OpfRunOutput::new(&options, &solution, &network), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use volt_cli::Cli;
    use volt_cli::Commands;

    fn opf_args(argv: &[&str]) -> OpfArgs {
        let mut full = vec!["volt", "opf", "case.json"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Opf(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "method = \"ac\"\nangle_limits = false\n[pips]\nmax_iterations = 25").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let options = resolve_options(&opf_args(&["--config", &path])).unwrap();
        assert_eq!(options.method, OpfMethod::Ac);
        assert_eq!(options.pips.max_iterations, 25);

        let options =
            resolve_options(&opf_args(&["--config", &path, "--method", "dc", "--max-iter", "60"]))
                .unwrap();
        assert_eq!(options.method, OpfMethod::Dc);
        assert_eq!(options.pips.max_iterations, 60);
    }

    #[test]
    fn test_defaults_without_config() {
        let options = resolve_options(&opf_args(&[])).unwrap();
        assert_eq!(options, OpfOptions::default());
    }
}
