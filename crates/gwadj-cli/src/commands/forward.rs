// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Forward Command
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{load_config, open_model};

#[derive(Args)]
pub struct ForwardArgs {
    /// Adjoint configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Snapshot store path, overriding the config and spec file
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Nonlinear iteration budget per time step, overriding MXITER
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Log only failed time steps
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn execute(args: ForwardArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(store) = &args.store {
        config.driver.snapshot_name = Some(store.to_string_lossy().into_owned());
    }
    if args.max_iterations.is_some() {
        config.driver.max_iterations = args.max_iterations;
    }
    if args.quiet {
        config.driver.verbose = false;
    }

    let mut model = open_model(config)?;
    let report = model.solve_gwf().context("forward run failed")?;
    info!(
        "{} time steps written to {} in {:.3} s",
        report.steps,
        report.store_path.display(),
        report.elapsed.as_secs_f64()
    );
    if report.num_fails > 0 {
        warn!("{} time steps did not converge", report.num_fails);
    }
    println!("store: {}", report.store_path.display());
    println!("steps: {}", report.steps);
    Ok(())
}
