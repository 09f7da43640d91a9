use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::FmtSubscriber;
use volt_cli::{Cli, Commands};

mod commands;

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Pf { command } => commands::pf::handle(command),
        Commands::Opf(args) => commands::opf::handle(args),
        Commands::Case6ww { out } => commands::case::handle(out.as_deref()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries JSON results; logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
