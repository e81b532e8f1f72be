// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Perturbation Validation Harness
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Finite-difference sensitivities by brute-force reruns of the forward model.
//!
//! Every perturbed input gets its own fresh solver session and a full forward
//! run; the baseline measure values are computed once. The resulting table
//! is the reference the adjoint sensitivities are checked against.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use gwadj_types::config::HarnessConfig;
use gwadj_types::constants::bound_label;
use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::GridTopology;
use ndarray::Array1;
use tracing::{debug, info};

use crate::capture::ForwardCapture;
use crate::driver::{BoundPerturbation, DriverOptions, ForwardDriver, PropertyPerturbation};
use crate::index::{node_to_lrc, NodeReduction};
use crate::manifest::PackageRegistry;
use crate::measure::PerformanceMeasure;
use crate::solver::{get_f64, FlowSolver, SessionFactory};

/// Label of the storage perturbation rows.
pub const STORAGE_LABEL: &str = "sto_ss";

/// One perturbed input and the sensitivity of every measure to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityRow {
    /// Zero-based user node.
    pub node: usize,
    pub addr: String,
    pub epsilon: f64,
    /// One entry per measure, in table order.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct PerturbationTable {
    topology: GridTopology,
    measures: Vec<String>,
    rows: Vec<SensitivityRow>,
}

impl PerturbationTable {
    pub fn new(topology: GridTopology, measures: Vec<String>) -> Self {
        PerturbationTable {
            topology,
            measures,
            rows: Vec::new(),
        }
    }

    pub fn measures(&self) -> &[String] {
        &self.measures
    }

    pub fn rows(&self) -> &[SensitivityRow] {
        &self.rows
    }

    pub fn push(&mut self, row: SensitivityRow) {
        self.rows.push(row);
    }

    /// Sums rows sharing (node, addr); epsilon is taken from the last one.
    pub fn push_aggregated(&mut self, rows: Vec<SensitivityRow>) {
        let mut merged: BTreeMap<(usize, String), SensitivityRow> = BTreeMap::new();
        for row in rows {
            match merged.get_mut(&(row.node, row.addr.clone())) {
                Some(acc) => {
                    for (a, v) in acc.values.iter_mut().zip(&row.values) {
                        *a += v;
                    }
                    acc.epsilon = row.epsilon;
                }
                None => {
                    merged.insert((row.node, row.addr.clone()), row);
                }
            }
        }
        self.rows.extend(merged.into_values());
    }

    /// Orders rows by node, then label.
    pub fn sort(&mut self) {
        self.rows
            .sort_by(|a, b| a.node.cmp(&b.node).then_with(|| a.addr.cmp(&b.addr)));
    }

    /// Sensitivity of one measure to one (node, label) input.
    pub fn value(&self, node: usize, addr: &str, measure: &str) -> Option<f64> {
        let col = self.measures.iter().position(|m| m == measure)?;
        self.rows
            .iter()
            .find(|r| r.node == node && r.addr == addr)
            .and_then(|r| r.values.get(col).copied())
    }

    /// CSV text; nodes and k,i,j are one-based.
    pub fn to_csv(&self) -> String {
        let structured = self.topology.is_structured();
        let mut out = String::from("node,addr,epsilon");
        for m in &self.measures {
            out.push(',');
            out.push_str(m);
        }
        if structured {
            out.push_str(",k,i,j");
        }
        out.push('\n');

        for row in &self.rows {
            let _ = write!(out, "{},{},{:e}", row.node + 1, row.addr, row.epsilon);
            for v in &row.values {
                let _ = write!(out, ",{v:e}");
            }
            if structured {
                match node_to_lrc(&self.topology, row.node) {
                    Some(lrc) => {
                        let _ = write!(out, ",{},{},{}", lrc.k + 1, lrc.i + 1, lrc.j + 1);
                    }
                    None => out.push_str(",,,"),
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> AdjResult<()> {
        fs::write(path, self.to_csv())?;
        Ok(())
    }
}

/// What the harness needs to know about the simulation under test.
pub struct HarnessContext<'a> {
    pub sim_ws: &'a Path,
    pub model: &'a str,
    pub packages: &'a PackageRegistry,
    pub topology: GridTopology,
    pub reduction: &'a NodeReduction,
    pub measures: &'a [PerformanceMeasure],
}

/// Writes an explicit, non-layered specific-storage array in user numbering
/// as `<model>.sto_ss.txt`, one value per line.
pub fn write_storage_array(dir: &Path, model: &str, ss: &Array1<f64>) -> AdjResult<PathBuf> {
    let path = dir.join(format!("{}.sto_ss.txt", model.to_ascii_lowercase()));
    let mut text = String::with_capacity(ss.len() * 16);
    for v in ss {
        let _ = writeln!(text, "{v:15.6E}");
    }
    fs::write(&path, text)?;
    Ok(path)
}

/// Copies a simulation directory, skipping `skip` if it lies inside `src`.
fn copy_dir(src: &Path, dst: &Path, skip: &Path) -> AdjResult<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            if fs::canonicalize(&path)? == skip {
                continue;
            }
            copy_dir(&path, &target, skip)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

/// Baseline property arrays read from a probe session.
struct Baseline {
    k11: Array1<f64>,
    k33: Array1<f64>,
    ss: Option<Array1<f64>>,
    values: Vec<f64>,
    capture: ForwardCapture,
}

pub struct PerturbationHarness<'a, F: SessionFactory> {
    factory: &'a F,
    ctx: HarnessContext<'a>,
    driver: DriverOptions,
    config: HarnessConfig,
}

impl<'a, F: SessionFactory> PerturbationHarness<'a, F> {
    pub fn new(
        factory: &'a F,
        ctx: HarnessContext<'a>,
        driver: DriverOptions,
        config: HarnessConfig,
    ) -> AdjResult<Self> {
        config.validate()?;
        if ctx.measures.is_empty() {
            return Err(AdjError::Config(
                "perturbation test needs at least one performance measure".to_string(),
            ));
        }
        Ok(PerturbationHarness {
            factory,
            ctx,
            driver,
            config,
        })
    }

    fn run_options(&self) -> DriverOptions {
        DriverOptions {
            verbose: false,
            capture: true,
            force_k_update: false,
            bound_perturbation: None,
            property_perturbation: None,
            ..self.driver.clone()
        }
    }

    fn run_capture(&self, ws: &Path, options: DriverOptions, store: &Path) -> AdjResult<ForwardCapture> {
        let driver = ForwardDriver::new(self.ctx.model, self.ctx.packages, options);
        let report = driver.run(self.factory.open(ws)?, store)?;
        report
            .capture
            .ok_or_else(|| AdjError::Config("forward run did not capture its state".to_string()))
    }

    fn score(&self, capture: &ForwardCapture) -> AdjResult<Vec<f64>> {
        self.ctx
            .measures
            .iter()
            .map(|pm| pm.solve_forward(capture))
            .collect()
    }

    fn sensitivities(&self, capture: &ForwardCapture, base: &[f64], epsilon: f64) -> AdjResult<Vec<f64>> {
        Ok(self
            .score(capture)?
            .iter()
            .zip(base)
            .map(|(p, b)| (p - b) / epsilon)
            .collect())
    }

    fn baseline(&self, store: &Path) -> AdjResult<Baseline> {
        let m = self.ctx.model.to_ascii_uppercase();
        let probe = self.factory.open(self.ctx.sim_ws)?;
        let k11 = get_f64(probe.solver(), "K11", &m, Some("NPF"))?;
        let k33 = get_f64(probe.solver(), "K33", &m, Some("NPF"))?;
        let ss = if self.ctx.packages.has_storage()
            && probe.solver().has_variable("ICONVERT", &m, Some("STO"))
        {
            Some(get_f64(probe.solver(), "SS", &m, Some("STO"))?)
        } else {
            None
        };
        probe.close()?;

        let capture = self.run_capture(self.ctx.sim_ws, self.run_options(), store)?;
        let values = self.score(&capture)?;
        for (pm, v) in self.ctx.measures.iter().zip(&values) {
            info!("baseline {} = {v:.6e}", pm.name());
        }
        Ok(Baseline {
            k11,
            k33,
            ss,
            values,
            capture,
        })
    }

    /// Runs every perturbation class and returns the combined, sorted table.
    pub fn run(&self) -> AdjResult<PerturbationTable> {
        let scratch = PathBuf::from(&self.config.scratch_dir);
        if scratch.exists() {
            fs::remove_dir_all(&scratch)?;
        }
        fs::create_dir_all(&scratch)?;
        let store = scratch.join("pert_run.npz");

        let base = self.baseline(&store)?;
        let mut table = PerturbationTable::new(
            self.ctx.topology,
            self.ctx.measures.iter().map(|pm| pm.name().to_string()).collect(),
        );
        self.bound_perturbations(&base, &store, &mut table)?;
        self.property_perturbations(&base, &store, &mut table)?;
        if let Some(ss) = &base.ss {
            self.storage_perturbations(&base, ss, &scratch, &store, &mut table)?;
        }
        table.sort();
        Ok(table)
    }

    fn bound_perturbations(
        &self,
        base: &Baseline,
        store: &Path,
        table: &mut PerturbationTable,
    ) -> AdjResult<()> {
        let fraction = self.config.perturbation_fraction;
        for (ptype, by_step) in &base.capture.boundaries {
            info!("running perturbations for {ptype}");
            let mut rows = Vec::new();
            for (key, entries) in by_step {
                for entry in entries {
                    let Some(node) = entry.node else {
                        continue;
                    };
                    let nfields = entry.bound.len().min(self.config.max_bound_fields);
                    for field in 0..nfields {
                        let org = entry.bound[field];
                        let new = org * (1.0 + fraction);
                        let epsilon = new - org;
                        if epsilon == 0.0 {
                            debug!("skipping zero-valued {} field {field} at {key}", entry.package_name);
                            continue;
                        }
                        debug!("{} field {field} at {key}: {org} -> {new}, node {}", entry.package_name, node + 1);
                        let options = DriverOptions {
                            bound_perturbation: Some(BoundPerturbation {
                                key: *key,
                                package: entry.package_name.clone(),
                                node,
                                field,
                                value: new,
                            }),
                            ..self.run_options()
                        };
                        let capture = self.run_capture(self.ctx.sim_ws, options, store)?;
                        rows.push(SensitivityRow {
                            node: self.ctx.reduction.to_user(node),
                            addr: bound_label(ptype, &entry.package_name, field),
                            epsilon,
                            values: self.sensitivities(&capture, &base.values, epsilon)?,
                        });
                    }
                }
            }
            table.push_aggregated(rows);
        }
        Ok(())
    }

    fn property_perturbations(
        &self,
        base: &Baseline,
        store: &Path,
        table: &mut PerturbationTable,
    ) -> AdjResult<()> {
        let model = self.ctx.model.to_ascii_lowercase();
        let mut fields = vec![("K11", &base.k11)];
        if self.ctx.topology.nlay() > 1 {
            fields.push(("K33", &base.k33));
        }
        for (name, values) in fields {
            let addr = format!("{}_{model}_npf", name.to_ascii_lowercase());
            info!("running perturbations for {addr}");
            for (inode, &org) in values.iter().enumerate() {
                let new = org * (1.0 + self.config.perturbation_fraction);
                let epsilon = new - org;
                if epsilon == 0.0 {
                    debug!("skipping zero-valued {name} at node {}", inode + 1);
                    continue;
                }
                let options = DriverOptions {
                    force_k_update: true,
                    property_perturbation: Some(PropertyPerturbation {
                        name: name.to_string(),
                        node: inode,
                        value: new,
                    }),
                    ..self.run_options()
                };
                let capture = self.run_capture(self.ctx.sim_ws, options, store)?;
                table.push(SensitivityRow {
                    node: self.ctx.reduction.to_user(inode),
                    addr: addr.clone(),
                    epsilon,
                    values: self.sensitivities(&capture, &base.values, epsilon)?,
                });
            }
        }
        Ok(())
    }

    fn storage_perturbations(
        &self,
        base: &Baseline,
        ss: &Array1<f64>,
        scratch: &Path,
        store: &Path,
        table: &mut PerturbationTable,
    ) -> AdjResult<()> {
        info!("running perturbations for {STORAGE_LABEL}");
        let sim_copy = scratch.join("sim");
        copy_dir(self.ctx.sim_ws, &sim_copy, &fs::canonicalize(scratch)?)?;

        let mut ss_user = Array1::<f64>::zeros(self.ctx.topology.nodes_user());
        for (inode, &v) in ss.iter().enumerate() {
            let user = self.ctx.reduction.to_user(inode);
            if user < ss_user.len() {
                ss_user[user] = v;
            }
        }

        for inode in 0..ss.len() {
            let user = self.ctx.reduction.to_user(inode);
            let org = ss[inode];
            let new = org * (1.0 + self.config.perturbation_fraction);
            let epsilon = new - org;
            if epsilon == 0.0 || user >= ss_user.len() {
                continue;
            }
            let mut pert = ss_user.clone();
            pert[user] = new;
            write_storage_array(&sim_copy, self.ctx.model, &pert)?;

            let options = DriverOptions {
                force_k_update: true,
                ..self.run_options()
            };
            let capture = self.run_capture(&sim_copy, options, store)?;
            table.push(SensitivityRow {
                node: user,
                addr: STORAGE_LABEL.to_string(),
                epsilon,
                values: self.sensitivities(&capture, &base.values, epsilon)?,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn row(node: usize, addr: &str, epsilon: f64, values: Vec<f64>) -> SensitivityRow {
        SensitivityRow {
            node,
            addr: addr.to_string(),
            epsilon,
            values,
        }
    }

    fn table() -> PerturbationTable {
        PerturbationTable::new(
            GridTopology::Structured {
                nlay: 1,
                nrow: 2,
                ncol: 3,
            },
            vec!["pm1".to_string(), "pm2".to_string()],
        )
    }

    #[test]
    fn test_aggregation_sums_and_keeps_last_epsilon() {
        let mut t = table();
        t.push_aggregated(vec![
            row(4, "ghb_1_bhead", 0.1, vec![1.0, 2.0]),
            row(4, "ghb_1_bhead", 0.2, vec![0.5, -1.0]),
            row(4, "ghb_1_cond", 0.3, vec![3.0, 3.0]),
            row(1, "ghb_1_bhead", 0.4, vec![7.0, 7.0]),
        ]);
        assert_eq!(t.rows().len(), 3);
        assert_eq!(t.value(4, "ghb_1_bhead", "pm1"), Some(1.5));
        assert_eq!(t.value(4, "ghb_1_bhead", "pm2"), Some(1.0));
        let r = t
            .rows()
            .iter()
            .find(|r| r.node == 4 && r.addr == "ghb_1_bhead")
            .unwrap();
        assert!((r.epsilon - 0.2).abs() < 1e-15);
        assert_eq!(t.value(4, "nope", "pm1"), None);
        assert_eq!(t.value(4, "ghb_1_cond", "pm3"), None);
    }

    #[test]
    fn test_csv_layout_one_based() {
        let mut t = table();
        t.push(row(5, "k11_flow_npf", 0.01, vec![2.0, -0.5]));
        t.push(row(0, "sto_ss", 1e-7, vec![0.0, 1.0]));
        t.sort();
        let csv = t.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "node,addr,epsilon,pm1,pm2,k,i,j");
        assert!(lines[1].starts_with("1,sto_ss,"));
        assert!(lines[1].ends_with(",1,1,1"));
        assert!(lines[2].starts_with("6,k11_flow_npf,"));
        assert!(lines[2].ends_with(",1,2,3"));
        let fields: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(fields.len(), 8);
        assert!((fields[3].parse::<f64>().unwrap() - 2.0).abs() < 1e-15);
    }

    #[test]
    fn test_csv_unstructured_has_no_lrc() {
        let mut t = PerturbationTable::new(
            GridTopology::Unstructured { nlay: 2, ncpl: 4 },
            vec!["pm".to_string()],
        );
        t.push(row(7, "wel6_q", 0.5, vec![1.0]));
        let csv = t.to_csv();
        assert_eq!(csv.lines().next(), Some("node,addr,epsilon,pm"));
        assert_eq!(csv.lines().nth(1).map(|l| l.split(',').count()), Some(4));
    }

    #[test]
    fn test_storage_array_format() {
        let epoch_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("gwadj_ss_{}_{}", std::process::id(), epoch_ns));
        fs::create_dir_all(&dir).unwrap();
        let path = write_storage_array(&dir, "Flow", &array![1e-5, 2.5e-4]).unwrap();
        assert_eq!(path.file_name().unwrap(), "flow.sto_ss.txt");
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 15);
        assert!((lines[1].trim().parse::<f64>().unwrap() - 2.5e-4).abs() < 1e-12);
        fs::remove_dir_all(dir).ok();
    }
}
