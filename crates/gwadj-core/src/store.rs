// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Snapshot Store
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Group-keyed persistence of a forward run as a NumPy `.npz` archive.
//!
//! Every dataset is an archive entry named `<group>/<dataset>`. Scalar
//! attributes are one-element arrays whose last path segment starts with
//! `@`, e.g. `solution_kper:00000_kstp:00000/@ctime`. String-valued tags
//! (package type, registry membership) are folded into the attribute name.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::StepKey;
use ndarray::{arr1, Array, Array1, Array2, Dimension, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};
use tracing::debug;

use crate::solver::{SolverValue, VarAddress};

pub const AUX_GROUP: &str = "aux";
pub const INFO_GROUP: &str = "gwf_info";

const NPY_EXT: &str = ".npy";

/// `<model>_<YYYY-mm-dd_HH-MM-SS>.npz`, stamped with local time.
pub fn default_store_name(model: &str) -> String {
    format!("{}_{}.npz", model, Local::now().format("%Y-%m-%d_%H-%M-%S"))
}

/// Named datasets and scalar attributes of one store group.
///
/// Keys may contain `/` to address a nested sub-group such as a boundary
/// package instance (`ghb_1/nodelist`, attribute `ghb_1/ptype:ghb6`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    datasets: BTreeMap<String, SolverValue>,
    attrs: BTreeMap<String, SolverValue>,
}

impl Group {
    pub fn insert(&mut self, name: impl Into<String>, value: SolverValue) {
        self.datasets.insert(name.into(), value);
    }

    pub fn insert_f64<D: Dimension>(&mut self, name: impl Into<String>, value: Array<f64, D>) {
        self.insert(name, SolverValue::Float(value.into_dyn()));
    }

    pub fn insert_i64<D: Dimension>(&mut self, name: impl Into<String>, value: Array<i64, D>) {
        self.insert(name, SolverValue::Int(value.into_dyn()));
    }

    pub fn set_attr_f64(&mut self, name: impl Into<String>, value: f64) {
        self.attrs
            .insert(name.into(), SolverValue::Float(arr1(&[value]).into_dyn()));
    }

    pub fn set_attr_i64(&mut self, name: impl Into<String>, value: i64) {
        self.attrs
            .insert(name.into(), SolverValue::Int(arr1(&[value]).into_dyn()));
    }

    pub fn get(&self, name: &str) -> Option<&SolverValue> {
        self.datasets.get(name)
    }

    pub fn attr(&self, name: &str) -> Option<&SolverValue> {
        self.attrs.get(name)
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &SolverValue)> {
        self.datasets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &SolverValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.attrs.is_empty()
    }

    fn require(&self, group: &str, name: &str) -> AdjResult<&SolverValue> {
        self.get(name)
            .ok_or_else(|| AdjError::Store(format!("group '{group}' has no dataset '{name}'")))
    }

    pub fn vector_f64(&self, group: &str, name: &str) -> AdjResult<Array1<f64>> {
        Ok(self.require(group, name)?.to_f64_1d())
    }

    pub fn vector_i64(&self, group: &str, name: &str) -> AdjResult<Array1<i64>> {
        let addr = VarAddress::new(name, group, None);
        self.require(group, name)?.clone().into_i64_1d(&addr)
    }

    pub fn attr_f64(&self, group: &str, name: &str) -> AdjResult<f64> {
        let addr = VarAddress::new(name, group, None);
        self.attr(name)
            .ok_or_else(|| AdjError::Store(format!("group '{group}' has no attribute '{name}'")))?
            .scalar_f64(&addr)
    }
}

/// Archive entry name of an attribute key.
fn attr_entry(group: &str, key: &str) -> String {
    match key.rsplit_once('/') {
        Some((sub, leaf)) => format!("{group}/{sub}/@{leaf}"),
        None => format!("{group}/@{key}"),
    }
}

/// Inverse of [`attr_entry`] for the part of an entry after `<group>/`.
fn split_attr_key(rest: &str) -> Option<String> {
    match rest.rsplit_once('/') {
        Some((sub, leaf)) => leaf.strip_prefix('@').map(|leaf| format!("{sub}/{leaf}")),
        None => rest.strip_prefix('@').map(str::to_string),
    }
}

/// Append-only writer; every group name may be written once.
///
/// Dropping an unclosed writer still finishes the archive, so groups written
/// before a fatal error stay readable.
pub struct SnapshotWriter {
    path: PathBuf,
    npz: Option<NpzWriter<File>>,
    written: HashSet<String>,
}

impl SnapshotWriter {
    /// Creates the archive, replacing any existing file at `path`.
    pub fn create(path: impl AsRef<Path>) -> AdjResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            debug!("removing existing snapshot store {}", path.display());
            std::fs::remove_file(&path)?;
        }
        let file = File::create(&path)?;
        Ok(SnapshotWriter {
            path,
            npz: Some(NpzWriter::new(file)),
            written: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains_group(&self, name: &str) -> bool {
        self.written.contains(name)
    }

    pub fn write_group(&mut self, name: &str, group: &Group) -> AdjResult<()> {
        if !self.written.insert(name.to_string()) {
            return Err(AdjError::Store(format!("group '{name}' already written")));
        }
        let npz = self
            .npz
            .as_mut()
            .ok_or_else(|| AdjError::Store("snapshot store already closed".to_string()))?;
        for (key, value) in group.datasets() {
            add_value(npz, format!("{name}/{key}"), value)?;
        }
        for (key, value) in group.attrs() {
            add_value(npz, attr_entry(name, key), value)?;
        }
        Ok(())
    }

    /// Finishes the archive and returns its path.
    pub fn close(mut self) -> AdjResult<PathBuf> {
        if let Some(npz) = self.npz.take() {
            npz.finish()
                .map_err(|e| AdjError::Store(format!("failed to finish '{}': {e}", self.path.display())))?;
        }
        Ok(self.path.clone())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if let Some(npz) = self.npz.take() {
            if let Err(e) = npz.finish() {
                debug!("ignoring failure to finish {}: {e}", self.path.display());
            }
        }
    }
}

fn add_value(npz: &mut NpzWriter<File>, entry: String, value: &SolverValue) -> AdjResult<()> {
    let res = match value {
        SolverValue::Float(a) => npz.add_array(entry.clone(), a),
        SolverValue::Int(a) => npz.add_array(entry.clone(), a),
    };
    res.map_err(|e| AdjError::Store(format!("failed to write '{entry}': {e}")))
}

/// Cumulative time, step length and zero-based (kper, kstp) of every step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxRecord {
    pub totime: Vec<f64>,
    pub dt: Vec<f64>,
    pub kper: Vec<i64>,
    pub kstp: Vec<i64>,
}

impl AuxRecord {
    pub fn push(&mut self, totime: f64, dt: f64, key: StepKey) {
        self.totime.push(totime);
        self.dt.push(dt);
        self.kper.push(key.kper as i64);
        self.kstp.push(key.kstp as i64);
    }

    pub fn len(&self) -> usize {
        self.totime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totime.is_empty()
    }

    pub fn to_group(&self) -> Group {
        let mut g = Group::default();
        g.insert_f64("totime", Array1::from(self.totime.clone()));
        g.insert_f64("dt", Array1::from(self.dt.clone()));
        g.insert_i64("kper", Array1::from(self.kper.clone()));
        g.insert_i64("kstp", Array1::from(self.kstp.clone()));
        g
    }

    pub fn from_group(group: &Group) -> AdjResult<Self> {
        Ok(AuxRecord {
            totime: group.vector_f64(AUX_GROUP, "totime")?.to_vec(),
            dt: group.vector_f64(AUX_GROUP, "dt")?.to_vec(),
            kper: group.vector_i64(AUX_GROUP, "kper")?.to_vec(),
            kstp: group.vector_i64(AUX_GROUP, "kstp")?.to_vec(),
        })
    }
}

/// One boundary package instance within a solution group.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySnapshot {
    pub ptype: String,
    /// Zero-based reduced nodes; `-1` for detached entries.
    pub nodelist: Array1<i64>,
    pub bound: Array2<f64>,
    pub hcof: Array1<f64>,
    pub rhs: Array1<f64>,
    pub simvals: Array1<f64>,
}

impl BoundarySnapshot {
    pub fn write_into(&self, group: &mut Group, tag: &str) {
        group.insert_i64(format!("{tag}/nodelist"), self.nodelist.clone());
        group.insert_f64(format!("{tag}/bound"), self.bound.clone());
        group.insert_f64(format!("{tag}/hcof"), self.hcof.clone());
        group.insert_f64(format!("{tag}/rhs"), self.rhs.clone());
        group.insert_f64(format!("{tag}/simvals"), self.simvals.clone());
        group.set_attr_i64(format!("{tag}/ptype:{}", self.ptype), 1);
    }
}

/// A solution group read back from the store.
#[derive(Debug, Clone)]
pub struct SolutionSnapshot {
    pub key: StepKey,
    pub ctime: f64,
    pub dt: f64,
    pub is_newton: bool,
    pub has_sto: bool,
    pub group: Group,
    pub boundaries: BTreeMap<String, BoundarySnapshot>,
}

impl SolutionSnapshot {
    pub fn from_group(key: StepKey, group: Group) -> AdjResult<Self> {
        let name = key.group_name();
        let ctime = group.attr_f64(&name, "ctime")?;
        let dt = group.attr_f64(&name, "dt")?;
        let is_newton = group.attr_f64(&name, "is_newton")? != 0.0;
        let has_sto = group.attr_f64(&name, "has_sto")? != 0.0;

        let mut boundaries = BTreeMap::new();
        for (attr, _) in group.attrs() {
            let Some((tag, ptype)) = attr
                .split_once('/')
                .and_then(|(tag, leaf)| leaf.strip_prefix("ptype:").map(|p| (tag, p)))
            else {
                continue;
            };
            let addr = VarAddress::new("bound", &name, Some(tag));
            let bound = group
                .get(&format!("{tag}/bound"))
                .ok_or_else(|| AdjError::Store(format!("{addr} missing")))?
                .clone()
                .into_f64_2d(&addr)?;
            boundaries.insert(
                tag.to_string(),
                BoundarySnapshot {
                    ptype: ptype.to_string(),
                    nodelist: group.vector_i64(&name, &format!("{tag}/nodelist"))?,
                    bound,
                    hcof: group.vector_f64(&name, &format!("{tag}/hcof"))?,
                    rhs: group.vector_f64(&name, &format!("{tag}/rhs"))?,
                    simvals: group.vector_f64(&name, &format!("{tag}/simvals"))?,
                },
            );
        }

        Ok(SolutionSnapshot {
            key,
            ctime,
            dt,
            is_newton,
            has_sto,
            group,
            boundaries,
        })
    }

    pub fn head(&self) -> AdjResult<Array1<f64>> {
        self.group.vector_f64(&self.key.group_name(), "head")
    }

    pub fn array(&self, name: &str) -> AdjResult<Array1<f64>> {
        self.group.vector_f64(&self.key.group_name(), name)
    }
}

/// Read access to a closed store.
pub struct SnapshotReader {
    path: PathBuf,
    npz: NpzReader<File>,
    /// (name without `.npy`, raw archive name), in archive order.
    entries: Vec<(String, String)>,
}

impl SnapshotReader {
    pub fn open(path: impl AsRef<Path>) -> AdjResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut npz = NpzReader::new(file).map_err(|e| {
            AdjError::Store(format!("failed to open npz '{}': {e}", path.display()))
        })?;
        let raw = npz
            .names()
            .map_err(|e| AdjError::Store(format!("failed to list '{}': {e}", path.display())))?;
        let entries = raw
            .into_iter()
            .map(|r| {
                let name = r.strip_suffix(NPY_EXT).unwrap_or(&r).to_string();
                (name, r)
            })
            .collect();
        Ok(SnapshotReader { path, npz, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Distinct top-level group names in write order.
    pub fn groups(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (name, _) in &self.entries {
            let group = name.split('/').next().unwrap_or(name);
            if seen.insert(group.to_string()) {
                out.push(group.to_string());
            }
        }
        out
    }

    /// Solution steps present in the store, ordered by (kper, kstp).
    pub fn solution_steps(&self) -> Vec<StepKey> {
        let mut steps: Vec<StepKey> = self
            .groups()
            .iter()
            .filter_map(|g| StepKey::from_group_name(g))
            .collect();
        steps.sort();
        steps
    }

    fn read_entry(&mut self, raw: &str) -> AdjResult<SolverValue> {
        if let Ok(a) = self.npz.by_name::<OwnedRepr<f64>, IxDyn>(raw) {
            return Ok(SolverValue::Float(a));
        }
        self.npz
            .by_name::<OwnedRepr<i64>, IxDyn>(raw)
            .map(SolverValue::Int)
            .map_err(|e| AdjError::Store(format!("failed to read '{raw}': {e}")))
    }

    pub fn read_group(&mut self, name: &str) -> AdjResult<Group> {
        let prefix = format!("{name}/");
        let selected: Vec<(String, String)> = self
            .entries
            .iter()
            .filter_map(|(n, raw)| n.strip_prefix(&prefix).map(|rest| (rest.to_string(), raw.clone())))
            .collect();
        if selected.is_empty() {
            return Err(AdjError::Store(format!(
                "group '{name}' not found in '{}'",
                self.path.display()
            )));
        }

        let mut group = Group::default();
        for (rest, raw) in selected {
            let value = self.read_entry(&raw)?;
            match split_attr_key(&rest) {
                Some(attr) => {
                    group.attrs.insert(attr, value);
                }
                None => group.insert(rest, value),
            }
        }
        Ok(group)
    }

    pub fn read_solution(&mut self, key: StepKey) -> AdjResult<SolutionSnapshot> {
        let group = self.read_group(&key.group_name())?;
        SolutionSnapshot::from_group(key, group)
    }

    pub fn read_aux(&mut self) -> AdjResult<AuxRecord> {
        let group = self.read_group(AUX_GROUP)?;
        AuxRecord::from_group(&group)
    }

    pub fn read_info(&mut self) -> AdjResult<Group> {
        self.read_group(INFO_GROUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store(tag: &str) -> PathBuf {
        let epoch_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "gwadj_store_{}_{}_{}.npz",
            tag,
            std::process::id(),
            epoch_ns
        ))
    }

    fn solution_group(head: f64) -> Group {
        let mut g = Group::default();
        g.insert_f64("head", array![head, head + 1.0]);
        g.insert_f64("amat", array![1.0, -1.0, -1.0, 1.0]);
        g.insert_i64("iss", array![0]);
        g.set_attr_f64("ctime", 1.0);
        g.set_attr_f64("dt", 1.0);
        g.set_attr_i64("kper", 0);
        g.set_attr_i64("kstp", 0);
        g.set_attr_i64("is_newton", 0);
        g.set_attr_i64("has_sto", 1);
        BoundarySnapshot {
            ptype: "ghb6".to_string(),
            nodelist: array![1, -1],
            bound: array![[5.0, 2.0], [6.0, 3.0]],
            hcof: array![-2.0, -3.0],
            rhs: array![-10.0, -18.0],
            simvals: array![0.5, 0.0],
        }
        .write_into(&mut g, "ghb_1");
        g
    }

    #[test]
    fn test_group_write_and_read_back() {
        let path = temp_store("rw");
        let mut writer = SnapshotWriter::create(&path).unwrap();
        let key = StepKey::new(0, 0);
        writer.write_group(&key.group_name(), &solution_group(3.0)).unwrap();
        let mut aux = AuxRecord::default();
        aux.push(1.0, 1.0, key);
        writer.write_group(AUX_GROUP, &aux.to_group()).unwrap();
        let closed = writer.close().unwrap();
        assert_eq!(closed, path);

        let mut reader = SnapshotReader::open(&path).unwrap();
        assert_eq!(
            reader.groups(),
            vec![key.group_name(), AUX_GROUP.to_string()]
        );
        assert_eq!(reader.solution_steps(), vec![key]);

        let snap = reader.read_solution(key).unwrap();
        assert!((snap.ctime - 1.0).abs() < 1e-15);
        assert!(snap.has_sto);
        assert!(!snap.is_newton);
        assert_eq!(snap.head().unwrap(), array![3.0, 4.0]);
        let ghb = &snap.boundaries["ghb_1"];
        assert_eq!(ghb.ptype, "ghb6");
        assert_eq!(ghb.nodelist, array![1, -1]);
        assert_eq!(ghb.bound.dim(), (2, 2));

        let aux_back = reader.read_aux().unwrap();
        assert_eq!(aux_back, aux);
        assert!(reader.read_info().is_err());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let path = temp_store("dup");
        let mut writer = SnapshotWriter::create(&path).unwrap();
        let name = StepKey::new(2, 1).group_name();
        writer.write_group(&name, &solution_group(1.0)).unwrap();
        assert!(writer.contains_group(&name));
        let err = writer
            .write_group(&name, &solution_group(2.0))
            .expect_err("second write of a group must fail");
        assert!(err.to_string().contains("already written"));
        drop(writer);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_dropped_writer_keeps_written_groups() {
        let path = temp_store("partial");
        {
            let mut writer = SnapshotWriter::create(&path).unwrap();
            writer
                .write_group(&StepKey::new(0, 0).group_name(), &solution_group(1.0))
                .unwrap();
            writer
                .write_group(&StepKey::new(0, 1).group_name(), &solution_group(2.0))
                .unwrap();
        }
        let reader = SnapshotReader::open(&path).unwrap();
        assert_eq!(
            reader.solution_steps(),
            vec![StepKey::new(0, 0), StepKey::new(0, 1)]
        );
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_existing_store_replaced() {
        let path = temp_store("replace");
        std::fs::write(&path, b"not an archive").unwrap();
        let mut writer = SnapshotWriter::create(&path).unwrap();
        writer.write_group(INFO_GROUP, &{
            let mut g = Group::default();
            g.insert_i64("ia", array![0, 2, 4]);
            g.set_attr_i64("registry:ghb6:ghb_1", 1);
            g
        })
        .unwrap();
        writer.close().unwrap();

        let mut reader = SnapshotReader::open(&path).unwrap();
        let info = reader.read_info().unwrap();
        assert_eq!(info.vector_i64(INFO_GROUP, "ia").unwrap(), array![0, 2, 4]);
        assert!(info.attr("registry:ghb6:ghb_1").is_some());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_attr_entry_names() {
        assert_eq!(attr_entry("aux", "ctime"), "aux/@ctime");
        assert_eq!(attr_entry("g", "wel-1/ptype:wel6"), "g/wel-1/@ptype:wel6");
        assert_eq!(split_attr_key("@ctime").as_deref(), Some("ctime"));
        assert_eq!(
            split_attr_key("wel-1/@ptype:wel6").as_deref(),
            Some("wel-1/ptype:wel6")
        );
        assert_eq!(split_attr_key("wel-1/bound"), None);
    }

    #[test]
    fn test_default_store_name_shape() {
        let name = default_store_name("flow");
        assert!(name.starts_with("flow_"));
        assert!(name.ends_with(".npz"));
        assert_eq!(name.len(), "flow_".len() + 19 + ".npz".len());
    }
}
