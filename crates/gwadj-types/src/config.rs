// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{AdjError, AdjResult};

/// Top-level run configuration.
/// Everything except `adj_file` has a default, so a one-line JSON file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjConfig {
    /// Performance-measure specification file, relative to `sim_ws` unless absolute.
    pub adj_file: String,
    /// Simulation working directory holding `mfsim.nam`.
    #[serde(default = "default_sim_ws")]
    pub sim_ws: String,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
}

/// Forward-solution driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Report every converged step at info level (debug otherwise).
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// Numerical solution addressed as `SLN_<id>`.
    #[serde(default = "default_solution_id")]
    pub solution_id: usize,
    /// Overrides the solver's own `MXITER` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    /// Overrides the `hdf5_name` option of the spec file when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
}

/// Finite-difference validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Relative perturbation: inputs are multiplied by `1 + perturbation_fraction`.
    #[serde(default = "default_perturbation_fraction")]
    pub perturbation_fraction: f64,
    /// Leading bound columns perturbed per boundary entry.
    #[serde(default = "default_max_bound_fields")]
    pub max_bound_fields: usize,
    /// Scratch copy of the simulation used for storage perturbations.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// Combined sensitivity table.
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_sim_ws() -> String {
    ".".to_string()
}
fn default_verbose() -> bool {
    true
}
fn default_solution_id() -> usize {
    1
}
fn default_perturbation_fraction() -> f64 {
    0.01
}
fn default_max_bound_fields() -> usize {
    2
}
fn default_scratch_dir() -> String {
    "pert_temp".to_string()
}
fn default_output() -> String {
    "pert_results.csv".to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            verbose: default_verbose(),
            solution_id: default_solution_id(),
            max_iterations: None,
            snapshot_name: None,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            perturbation_fraction: default_perturbation_fraction(),
            max_bound_fields: default_max_bound_fields(),
            scratch_dir: default_scratch_dir(),
            output: default_output(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> AdjResult<()> {
        if !self.perturbation_fraction.is_finite() || self.perturbation_fraction == 0.0 {
            return Err(AdjError::Config(format!(
                "perturbation_fraction must be finite and non-zero, got {}",
                self.perturbation_fraction
            )));
        }
        if self.max_bound_fields == 0 {
            return Err(AdjError::Config(
                "max_bound_fields must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl AdjConfig {
    /// Load from JSON file.
    pub fn from_file(path: &str) -> AdjResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.harness.validate()?;
        Ok(config)
    }

    /// Spec file path resolved against the simulation directory.
    pub fn adj_path(&self) -> std::path::PathBuf {
        let adj = std::path::Path::new(&self.adj_file);
        if adj.is_absolute() {
            adj.to_path_buf()
        } else {
            std::path::Path::new(&self.sim_ws).join(adj)
        }
    }
}
