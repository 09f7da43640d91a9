use std::path::Path;

use anyhow::Result;
use tracing::info;
use volt_algo::test_utils::case6ww;
use volt_cli::common::write_json;

pub fn handle(out: Option<&Path>) -> Result<()> {
    let network = case6ww();
    info!("case6ww: {}", network.stats());
    write_json(&network.to_data(), out)
}
