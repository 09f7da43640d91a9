use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use volt_algo::OpfMethod;
use volt_core::SparseSolverKind;

#[derive(Parser, Debug)]
#[command(author, version, about = "Power flow and optimal power flow", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Power flow solvers
    Pf {
        #[command(subcommand)]
        command: PowerFlowCommands,
    },
    /// Optimal power flow
    Opf(OpfArgs),
    /// Write the built-in Wood & Wollenberg 6-bus case as JSON
    Case6ww {
        /// Write to a file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PowerFlowCommands {
    /// Run DC power flow
    Dc {
        /// Network snapshot (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        network: PathBuf,
        /// Linear solver (faer, gauss)
        #[arg(long, default_value = "faer")]
        solver: SparseSolverKind,
        /// Write the solved network to this file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
pub struct OpfArgs {
    /// Network snapshot (JSON)
    #[arg(value_hint = ValueHint::FilePath)]
    pub network: PathBuf,
    /// OPF options (TOML); flags below override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Formulation (dc, ac)
    #[arg(long)]
    pub method: Option<OpfMethod>,
    /// Linear solver for the Newton steps (faer, gauss)
    #[arg(long)]
    pub solver: Option<SparseSolverKind>,
    /// Interior point iteration limit
    #[arg(long = "max-iter")]
    pub max_iterations: Option<usize>,
    /// Convergence tolerance applied to all termination criteria
    #[arg(long)]
    pub tol: Option<f64>,
    /// Enforce branch angle-difference limits
    #[arg(long)]
    pub angle_limits: bool,
    /// Write the solved network to this file
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
