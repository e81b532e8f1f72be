// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Check Command
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Loads everything a run needs without running it.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::{load_config, open_model};

#[derive(Args)]
pub struct CheckArgs {
    /// Adjoint configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let model = open_model(config)?;

    let manifest = model.manifest();
    println!("model:    {} ({})", manifest.model.name, manifest.model.model_type);
    println!("grid:     {:?}", model.topology());
    println!(
        "nodes:    {} active of {}",
        model.reduction().nodes(),
        model.topology().nodes_user()
    );
    for (ptype, names) in manifest.packages.iter() {
        println!("package:  {ptype:<8} {}", names.join(", "));
    }
    if let Some(name) = &model.spec().options.hdf5_name {
        println!("store:    {name}");
    }
    for pm in model.measures() {
        println!(
            "measure:  {:<12} {} records, {} {}",
            pm.name(),
            pm.records().len(),
            pm.kind(),
            pm.form()
        );
    }
    info!("configuration is valid");
    Ok(())
}
