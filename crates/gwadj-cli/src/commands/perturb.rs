// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Perturbation Command
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Brute-force sensitivities, one forward run per perturbed input.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::{load_config, open_model};

#[derive(Args)]
pub struct PerturbArgs {
    /// Adjoint configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// CSV output, overriding the config
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Relative perturbation size, overriding the config
    #[arg(long)]
    pub fraction: Option<f64>,

    /// Scratch directory, overriding the config; removed and recreated
    #[arg(long)]
    pub scratch: Option<PathBuf>,
}

pub fn execute(args: PerturbArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(output) = &args.output {
        config.harness.output = output.to_string_lossy().into_owned();
    }
    if let Some(fraction) = args.fraction {
        config.harness.perturbation_fraction = fraction;
    }
    if let Some(scratch) = &args.scratch {
        config.harness.scratch_dir = scratch.to_string_lossy().into_owned();
    }
    config.harness.validate()?;

    let model = open_model(config)?;
    let start = Instant::now();
    let table = model
        .perturbation_test()
        .context("perturbation test failed")?;
    info!(
        "{} sensitivities for {} measures in {:.3} s",
        table.rows().len(),
        table.measures().len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
