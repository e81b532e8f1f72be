// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Command Line
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `gwadj`: drives the adjoint workflow against the in-process synthetic
//! flow model.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gwadj")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forward snapshots and sensitivity checks for groundwater adjoints", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the simulation and performance-measure files
    Check(commands::check::CheckArgs),
    /// Run the forward model and write the snapshot store
    Forward(commands::forward::ForwardArgs),
    /// Finite-difference sensitivities of every performance measure
    Perturb(commands::perturb::PerturbArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Check(args) => commands::check::execute(args),
        Commands::Forward(args) => commands::forward::execute(args),
        Commands::Perturb(args) => commands::perturb::execute(args),
    }
}
