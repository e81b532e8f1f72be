// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Simulation Manifest
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Model and package discovery from `mfsim.nam` and the model nam file.

use std::path::Path;

use gwadj_types::constants::{GWF_MODEL_TYPE, STO_PACKAGE_TYPE, STRUCTURED_DIS_TYPE};
use gwadj_types::error::{AdjError, AdjResult};

/// One entry of the `models` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub model_type: String,
    pub nam_file: String,
    pub name: String,
}

/// Package type -> instance names, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRegistry {
    entries: Vec<(String, Vec<String>)>,
}

impl PackageRegistry {
    /// Adds an instance; a missing tag becomes `<type without '6'>-<ordinal>`.
    pub fn push(&mut self, package_type: &str, tag: Option<&str>) {
        let package_type = package_type.to_ascii_lowercase();
        let pos = match self.entries.iter().position(|(t, _)| *t == package_type) {
            Some(pos) => pos,
            None => {
                self.entries.push((package_type.clone(), Vec::new()));
                self.entries.len() - 1
            }
        };
        let names = &mut self.entries[pos].1;
        let name = match tag {
            Some(tag) => tag.to_ascii_lowercase(),
            None => format!("{}-{}", package_type.replace('6', ""), names.len() + 1),
        };
        names.push(name);
    }

    pub fn contains_type(&self, package_type: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == package_type)
    }

    pub fn names(&self, package_type: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(t, _)| t == package_type)
            .map(|(_, n)| n.as_slice())
            .unwrap_or(&[])
    }

    /// Package type of an instance name (case-insensitive).
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(t, _)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(t, n)| (t.as_str(), n.as_slice()))
    }

    pub fn is_structured(&self) -> bool {
        self.contains_type(STRUCTURED_DIS_TYPE)
    }

    pub fn has_storage(&self) -> bool {
        self.contains_type(STO_PACKAGE_TYPE)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn is_block_line(line: &str, keyword: &str, block: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    lower.starts_with(keyword) && lower.contains(block)
}

/// Parses the `models` block of `mfsim.nam` text.
pub fn parse_models(text: &str) -> AdjResult<Vec<ModelEntry>> {
    let mut lines = text.lines();
    loop {
        let line = lines.next().ok_or_else(|| {
            AdjError::Config("EOF when looking for 'models' block".to_string())
        })?;
        if is_block_line(line, "begin", "models") {
            break;
        }
    }

    let mut models: Vec<ModelEntry> = Vec::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| AdjError::Config("EOF when reading 'models' block".to_string()))?;
        if is_block_line(line, "end", "models") {
            break;
        }
        let raw: Vec<String> = strip_comment(line)
            .split_whitespace()
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if raw.is_empty() {
            continue;
        }
        if raw.len() < 3 {
            return Err(AdjError::Config(format!(
                "models block line needs type, nam file and name: '{}'",
                line.trim()
            )));
        }
        if models.iter().any(|m| m.name == raw[2]) {
            return Err(AdjError::Config(format!(
                "duplicate model name found: '{}'",
                raw[2]
            )));
        }
        models.push(ModelEntry {
            model_type: raw[0].clone(),
            nam_file: raw[1].clone(),
            name: raw[2].clone(),
        });
    }
    Ok(models)
}

/// Parses the `packages` block of a model nam file.
pub fn parse_packages(text: &str) -> AdjResult<PackageRegistry> {
    let mut lines = text.lines();
    loop {
        let line = lines.next().ok_or_else(|| {
            AdjError::Config("EOF when looking for 'packages' block".to_string())
        })?;
        if is_block_line(line, "begin", "packages") {
            break;
        }
    }

    let mut registry = PackageRegistry::default();
    loop {
        let line = lines.next().ok_or_else(|| {
            AdjError::Config("EOF when reading 'packages' block".to_string())
        })?;
        if is_block_line(line, "end", "packages") {
            break;
        }
        let raw: Vec<&str> = strip_comment(line).split_whitespace().collect();
        if raw.is_empty() {
            continue;
        }
        if raw.len() < 2 {
            return Err(AdjError::Config(format!(
                "wrong number of items on line: '{}'",
                line.trim()
            )));
        }
        registry.push(raw[0], raw.get(2).copied());
    }
    Ok(registry)
}

pub fn read_models(sim_ws: &Path) -> AdjResult<Vec<ModelEntry>> {
    let sim_nam = sim_ws.join("mfsim.nam");
    if !sim_nam.exists() {
        return Err(AdjError::Config(format!(
            "simulation nam file '{}' not found",
            sim_nam.display()
        )));
    }
    parse_models(&std::fs::read_to_string(sim_nam)?)
}

pub fn read_packages(nam_file: &Path) -> AdjResult<PackageRegistry> {
    if !nam_file.exists() {
        return Err(AdjError::Config(format!(
            "gwf nam file '{}' not found",
            nam_file.display()
        )));
    }
    parse_packages(&std::fs::read_to_string(nam_file)?)
}

/// The single groundwater-flow model of a simulation and its packages.
#[derive(Debug, Clone)]
pub struct SimulationManifest {
    pub model: ModelEntry,
    pub packages: PackageRegistry,
}

impl SimulationManifest {
    /// Reads both nam files; exactly one `gwf6` model is supported.
    pub fn load(sim_ws: &Path) -> AdjResult<Self> {
        let mut models = read_models(sim_ws)?;
        if models.len() != 1 {
            return Err(AdjError::Config(format!(
                "only one model is currently supported, found {}",
                models.len()
            )));
        }
        let model = models.remove(0);
        if model.model_type != GWF_MODEL_TYPE {
            return Err(AdjError::Config(format!(
                "model is not a gwf6 type: {}",
                model.model_type
            )));
        }
        let packages = read_packages(&sim_ws.join(&model.nam_file))?;
        Ok(SimulationManifest { model, packages })
    }
}
