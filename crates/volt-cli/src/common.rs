//! File helpers shared by the subcommands.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use volt_core::{Network, NetworkData};

/// Read a JSON network snapshot and build the graph.
pub fn read_network(path: &Path) -> Result<Network> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading network from {}", path.display()))?;
    let data = NetworkData::from_json(&json)
        .with_context(|| format!("parsing network JSON in {}", path.display()))?;
    let network = data
        .into_network()
        .with_context(|| format!("building network from {}", path.display()))?;
    Ok(network)
}

/// Pretty-print `value` as JSON to a file, or to stdout when `out` is `None`.
pub fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            serde_json::to_writer_pretty(io::BufWriter::new(file), value)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

/// Write the solved network snapshot when an output path was given.
pub fn write_network(network: &Network, out: Option<&Path>) -> Result<()> {
    if let Some(path) = out {
        write_json(&network.to_data(), Some(path))?;
    }
    Ok(())
}
