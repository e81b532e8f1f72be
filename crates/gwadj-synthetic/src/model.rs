// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Synthetic Model Definition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `model.json`: a structured, confined groundwater-flow model, plus the
//! nam files that make a directory look like a MODFLOW 6 simulation.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use gwadj_types::constants::{bound_field_names, GWF_MODEL_TYPE};
use gwadj_types::error::{AdjError, AdjResult};
use serde::{Deserialize, Serialize};

pub const MODEL_FILE: &str = "model.json";

/// Package types the synthetic model can simulate.
pub const SUPPORTED_PACKAGES: [&str; 5] = ["wel6", "ghb6", "riv6", "drn6", "rch6"];

/// A scalar for every cell or one value per user node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Property {
    Constant(f64),
    Array(Vec<f64>),
}

impl Property {
    pub fn expand(&self, n: usize, what: &str) -> AdjResult<Vec<f64>> {
        match self {
            Property::Constant(v) => Ok(vec![*v; n]),
            Property::Array(values) if values.len() == n => Ok(values.clone()),
            Property::Array(values) => Err(AdjError::Config(format!(
                "{what} has {} values, expected {n}",
                values.len()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub perlen: f64,
    #[serde(default = "default_nstp")]
    pub nstp: usize,
    #[serde(default)]
    pub steady: bool,
}

/// One boundary entry: one-based `[layer, row, column]` and its bound columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDef {
    pub cell: [usize; 3],
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDef {
    pub ptype: String,
    /// Explicit tag; auto-named by type and ordinal when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub entries: Vec<EntryDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    pub nlay: usize,
    pub nrow: usize,
    pub ncol: usize,
    #[serde(default = "default_spacing")]
    pub delr: f64,
    #[serde(default = "default_spacing")]
    pub delc: f64,
    pub top: f64,
    /// Bottom elevation of each layer.
    pub botm: Vec<f64>,
    /// Per user node; zero marks an inactive cell. All active when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idomain: Option<Vec<i64>>,
    pub k11: Property,
    /// Defaults to `k11`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k33: Option<Property>,
    /// Specific storage; its presence adds a storage package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ss: Option<Property>,
    #[serde(default)]
    pub iconvert: i64,
    pub strt: f64,
    pub periods: Vec<Period>,
    #[serde(default)]
    pub packages: Vec<PackageDef>,
    #[serde(default = "default_mxiter")]
    pub mxiter: usize,
    #[serde(default = "default_hclose")]
    pub hclose: f64,
}

fn default_nstp() -> usize {
    1
}
fn default_spacing() -> f64 {
    1.0
}
fn default_mxiter() -> usize {
    50
}
fn default_hclose() -> f64 {
    1e-9
}

impl ModelDef {
    pub fn nodes_user(&self) -> usize {
        self.nlay * self.nrow * self.ncol
    }

    /// Zero-based user node of a one-based `[layer, row, column]`.
    pub fn user_node(&self, cell: [usize; 3]) -> AdjResult<usize> {
        let [k, i, j] = cell;
        if k < 1 || i < 1 || j < 1 || k > self.nlay || i > self.nrow || j > self.ncol {
            return Err(AdjError::Config(format!(
                "cell ({k}, {i}, {j}) outside grid {}x{}x{}",
                self.nlay, self.nrow, self.ncol
            )));
        }
        Ok((k - 1) * self.nrow * self.ncol + (i - 1) * self.ncol + (j - 1))
    }

    pub fn is_active(&self, user: usize) -> bool {
        match &self.idomain {
            Some(idomain) => idomain.get(user).is_some_and(|&d| d > 0),
            None => user < self.nodes_user(),
        }
    }

    pub fn validate(&self) -> AdjResult<()> {
        if self.name.trim().is_empty() || self.name.contains(char::is_whitespace) {
            return Err(AdjError::Config(format!("invalid model name '{}'", self.name)));
        }
        if self.nlay == 0 || self.nrow == 0 || self.ncol == 0 {
            return Err(AdjError::Config("grid dimensions must be >= 1".to_string()));
        }
        if self.delr <= 0.0 || self.delc <= 0.0 {
            return Err(AdjError::Config("delr and delc must be > 0".to_string()));
        }
        if self.botm.len() != self.nlay {
            return Err(AdjError::Config(format!(
                "botm has {} layers, expected {}",
                self.botm.len(),
                self.nlay
            )));
        }
        let mut upper = self.top;
        for (k, &b) in self.botm.iter().enumerate() {
            if b >= upper {
                return Err(AdjError::Config(format!(
                    "layer {} has non-positive thickness",
                    k + 1
                )));
            }
            upper = b;
        }
        let n = self.nodes_user();
        if let Some(idomain) = &self.idomain {
            if idomain.len() != n {
                return Err(AdjError::Config(format!(
                    "idomain has {} values, expected {n}",
                    idomain.len()
                )));
            }
            if !idomain.iter().any(|&d| d > 0) {
                return Err(AdjError::Config("no active cells".to_string()));
            }
        }
        self.k11.expand(n, "k11")?;
        if let Some(k33) = &self.k33 {
            k33.expand(n, "k33")?;
        }
        if let Some(ss) = &self.ss {
            ss.expand(n, "ss")?;
        }
        if self.periods.is_empty() {
            return Err(AdjError::Config("at least one stress period is required".to_string()));
        }
        for (p, period) in self.periods.iter().enumerate() {
            if period.perlen <= 0.0 || period.nstp == 0 {
                return Err(AdjError::Config(format!(
                    "stress period {} needs perlen > 0 and nstp >= 1",
                    p + 1
                )));
            }
        }
        if self.mxiter == 0 || self.hclose <= 0.0 {
            return Err(AdjError::Config("mxiter and hclose must be positive".to_string()));
        }

        for pkg in &self.packages {
            let ptype = pkg.ptype.to_ascii_lowercase();
            if !SUPPORTED_PACKAGES.contains(&ptype.as_str()) {
                return Err(AdjError::Config(format!(
                    "package type '{}' is not supported by the synthetic model",
                    pkg.ptype
                )));
            }
            let ncol = bound_field_names(&ptype).len();
            for entry in &pkg.entries {
                if entry.values.len() != ncol {
                    return Err(AdjError::Config(format!(
                        "{ptype} entry at {:?} needs {ncol} values, found {}",
                        entry.cell,
                        entry.values.len()
                    )));
                }
                let user = self.user_node(entry.cell)?;
                if !self.is_active(user) {
                    return Err(AdjError::Config(format!(
                        "{ptype} entry at {:?} is in an inactive cell",
                        entry.cell
                    )));
                }
            }
        }
        Ok(())
    }

    /// Explicit storage array that replaces `ss` when present in `sim_ws`.
    pub fn storage_override_path(&self, sim_ws: &Path) -> PathBuf {
        sim_ws.join(format!("{}.sto_ss.txt", self.name.to_ascii_lowercase()))
    }

    /// Reads `model.json` from `sim_ws` and applies any storage override.
    pub fn load(sim_ws: &Path) -> AdjResult<Self> {
        let path = sim_ws.join(MODEL_FILE);
        let text = fs::read_to_string(&path).map_err(|e| {
            AdjError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let mut def: ModelDef = serde_json::from_str(&text)?;

        let override_path = def.storage_override_path(sim_ws);
        if override_path.exists() {
            let text = fs::read_to_string(&override_path)?;
            let values = text
                .split_whitespace()
                .map(|t| {
                    t.parse::<f64>().map_err(|_| {
                        AdjError::Config(format!(
                            "bad value '{t}' in '{}'",
                            override_path.display()
                        ))
                    })
                })
                .collect::<AdjResult<Vec<f64>>>()?;
            def.ss = Some(Property::Array(values));
        }
        def.validate()?;
        Ok(def)
    }

    /// Writes `mfsim.nam`, the model nam file and `model.json` into `dir`.
    pub fn write_simulation(&self, dir: &Path) -> AdjResult<()> {
        self.validate()?;
        fs::create_dir_all(dir)?;
        let name = self.name.to_ascii_lowercase();

        let mut sim = String::new();
        let _ = writeln!(sim, "BEGIN options\nEND options\n");
        let _ = writeln!(sim, "BEGIN timing\n  TDIS6  {name}.tdis\nEND timing\n");
        let _ = writeln!(sim, "BEGIN models\n  {GWF_MODEL_TYPE}  {name}.nam  {name}\nEND models\n");
        let _ = writeln!(sim, "BEGIN solutiongroup  1\n  ims6  {name}.ims  {name}\nEND solutiongroup");
        fs::write(dir.join("mfsim.nam"), sim)?;

        let mut nam = String::new();
        let _ = writeln!(nam, "BEGIN options\nEND options\n");
        let _ = writeln!(nam, "BEGIN packages");
        let _ = writeln!(nam, "  DIS6  {name}.dis");
        let _ = writeln!(nam, "  NPF6  {name}.npf");
        let _ = writeln!(nam, "  IC6   {name}.ic");
        if self.ss.is_some() {
            let _ = writeln!(nam, "  STO6  {name}.sto");
        }
        for (p, pkg) in self.packages.iter().enumerate() {
            let ptype = pkg.ptype.to_ascii_uppercase();
            let ext = pkg.ptype.to_ascii_lowercase().replace('6', "");
            match &pkg.name {
                Some(tag) => {
                    let _ = writeln!(nam, "  {ptype}  {name}_{}.{ext}  {tag}", p + 1);
                }
                None => {
                    let _ = writeln!(nam, "  {ptype}  {name}_{}.{ext}", p + 1);
                }
            }
        }
        let _ = writeln!(nam, "END packages");
        fs::write(dir.join(format!("{name}.nam")), nam)?;

        let json = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(MODEL_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwadj_core::manifest::SimulationManifest;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn small_def() -> ModelDef {
        serde_json::from_str(
            r#"{
                "name": "flow",
                "nlay": 1, "nrow": 2, "ncol": 3,
                "delr": 10.0, "delc": 10.0,
                "top": 10.0, "botm": [0.0],
                "k11": 1.0,
                "ss": 1e-5,
                "strt": 5.0,
                "periods": [{"perlen": 1.0, "steady": true}],
                "packages": [
                    {"ptype": "ghb6", "name": "ghb_1",
                     "entries": [{"cell": [1, 1, 1], "values": [4.0, 2.0]}]},
                    {"ptype": "wel6",
                     "entries": [{"cell": [1, 2, 3], "values": [-0.5]}]}
                ]
            }"#,
        )
        .unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let epoch_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("gwadj_model_{tag}_{}_{}", std::process::id(), epoch_ns))
    }

    #[test]
    fn test_defaults_and_validation() {
        let def = small_def();
        assert_eq!(def.mxiter, 50);
        assert!(def.k33.is_none());
        assert_eq!(def.nodes_user(), 6);
        assert_eq!(def.user_node([1, 2, 3]).unwrap(), 5);
        assert!(def.user_node([1, 3, 1]).is_err());
        def.validate().unwrap();

        let mut bad = small_def();
        bad.botm = vec![11.0];
        assert!(bad.validate().is_err());

        let mut bad = small_def();
        bad.packages[0].entries[0].values.pop();
        assert!(bad.validate().is_err());

        let mut bad = small_def();
        bad.packages[0].ptype = "sfr6".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_property_expand() {
        assert_eq!(Property::Constant(2.0).expand(3, "k").unwrap(), vec![2.0; 3]);
        assert!(Property::Array(vec![1.0, 2.0]).expand(3, "k").is_err());
    }

    #[test]
    fn test_written_simulation_is_discoverable() {
        let dir = temp_dir("nam");
        let def = small_def();
        def.write_simulation(&dir).unwrap();

        let manifest = SimulationManifest::load(&dir).unwrap();
        assert_eq!(manifest.model.name, "flow");
        assert!(manifest.packages.is_structured());
        assert!(manifest.packages.has_storage());
        assert_eq!(manifest.packages.names("ghb6"), &["ghb_1".to_string()]);
        assert_eq!(manifest.packages.names("wel6"), &["wel-1".to_string()]);

        let back = ModelDef::load(&dir).unwrap();
        assert_eq!(back, def);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_storage_override_applied() {
        let dir = temp_dir("ss");
        let def = small_def();
        def.write_simulation(&dir).unwrap();
        let values: String = (0..6).map(|i| format!("{:15.6E}\n", 1e-5 * (i + 1) as f64)).collect();
        fs::write(def.storage_override_path(&dir), values).unwrap();

        let back = ModelDef::load(&dir).unwrap();
        let ss = back.ss.unwrap().expand(6, "ss").unwrap();
        assert!((ss[5] - 6e-5).abs() < 1e-12);
        fs::remove_dir_all(dir).ok();
    }
}
