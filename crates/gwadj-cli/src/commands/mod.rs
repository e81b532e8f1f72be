pub mod check;
pub mod forward;
pub mod perturb;

use std::path::Path;

use anyhow::{Context, Result};
use gwadj_core::adjoint::AdjointModel;
use gwadj_synthetic::SyntheticFactory;
use gwadj_types::config::AdjConfig;

pub fn load_config(path: &Path) -> Result<AdjConfig> {
    AdjConfig::from_file(&path.to_string_lossy())
        .with_context(|| format!("failed to load config '{}'", path.display()))
}

pub fn open_model(config: AdjConfig) -> Result<AdjointModel<SyntheticFactory>> {
    let sim_ws = config.sim_ws.clone();
    AdjointModel::new(SyntheticFactory::new(), config)
        .with_context(|| format!("failed to set up the adjoint model in '{sim_ws}'"))
}
