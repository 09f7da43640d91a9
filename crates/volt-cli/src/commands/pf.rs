use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;
use volt_algo::{solve_dc, DcPowerFlowOptions};
use volt_cli::cli::PowerFlowCommands;
use volt_cli::common::{read_network, write_json, write_network};

pub fn handle(command: &PowerFlowCommands) -> Result<()> {
    match command {
        PowerFlowCommands::Dc {
            network: path,
            solver,
            out,
        } => {
            let start = Instant::now();
            let mut network = read_network(path)?;
            info!("Loaded {}", network.stats());

            let options = DcPowerFlowOptions::default().with_solver(*solver);
            let solution = solve_dc(&mut network, &options)
                .with_context(|| format!("DC power flow on {}", path.display()))?;
            info!(
                solver = %solver,
                time_ms = start.elapsed().as_millis() as u64,
                "DC power flow solved"
            );

            write_network(&network, out.as_deref())?;
            write_json(&solution, None)
        }
    }
}
