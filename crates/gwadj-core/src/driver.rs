// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Forward-Solution Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Steps an external flow solver through the whole simulation and persists
//! the linear-system state of every converged time step.
//!
//! One run consumes one [`Session`]: the solver is finalised when the run
//! ends, whether it ends normally or with an error. Groups written before a
//! fatal error stay readable in the partial store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use gwadj_types::config::DriverConfig;
use gwadj_types::constants::{BOUNDARY_PACKAGE_TYPES, SFR_PACKAGE_TYPE, TDIS_COMPONENT};
use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::StepKey;
use ndarray::{s, Array1, Array2};
use tracing::{debug, info, warn};

use crate::capture::{BoundaryEntry, ForwardCapture};
use crate::manifest::PackageRegistry;
use crate::solver::{get_f64, get_i64, get_scalar_i64, FlowSolver, Session};
use crate::storage::{dresdss_h, drhsdh, CellGeometry, StepState};
use crate::store::{AuxRecord, BoundarySnapshot, Group, SnapshotWriter, AUX_GROUP, INFO_GROUP};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Overwrites one bound column of one boundary entry at one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPerturbation {
    pub key: StepKey,
    /// Package instance name as registered.
    pub package: String,
    /// Zero-based reduced node.
    pub node: usize,
    pub field: usize,
    pub value: f64,
}

/// Overwrites one node of an `NPF` property array before the first step.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPerturbation {
    /// `K11` or `K33`.
    pub name: String,
    /// Zero-based reduced node.
    pub node: usize,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub verbose: bool,
    pub solution_id: usize,
    pub max_iterations: Option<usize>,
    /// Make the solver re-derive conductances from K11/K33 on the first step.
    pub force_k_update: bool,
    /// Keep heads and boundary entries in memory for the caller.
    pub capture: bool,
    pub bound_perturbation: Option<BoundPerturbation>,
    pub property_perturbation: Option<PropertyPerturbation>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}

impl DriverOptions {
    pub fn from_config(cfg: &DriverConfig) -> Self {
        DriverOptions {
            verbose: cfg.verbose,
            solution_id: cfg.solution_id,
            max_iterations: cfg.max_iterations,
            force_k_update: false,
            capture: false,
            bound_perturbation: None,
            property_perturbation: None,
        }
    }
}

#[derive(Debug)]
pub struct ForwardReport {
    pub store_path: PathBuf,
    pub steps: usize,
    /// Time steps that exhausted the iteration budget.
    pub num_fails: usize,
    pub elapsed: Duration,
    pub capture: Option<ForwardCapture>,
}

struct StorageInputs {
    geom: CellGeometry,
    iconvert: Array1<i64>,
    ss: Array1<f64>,
}

pub struct ForwardDriver<'a> {
    model: String,
    packages: &'a PackageRegistry,
    options: DriverOptions,
}

impl<'a> ForwardDriver<'a> {
    pub fn new(model: &str, packages: &'a PackageRegistry, options: DriverOptions) -> Self {
        ForwardDriver {
            model: model.to_ascii_uppercase(),
            packages,
            options,
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Runs the simulation to its end time and writes the store at `store_path`.
    pub fn run<S: FlowSolver>(
        &self,
        mut session: Session<S>,
        store_path: &Path,
    ) -> AdjResult<ForwardReport> {
        let start = Instant::now();
        info!(
            "starting flow solution at {}",
            Local::now().format(DT_FMT)
        );
        let mut writer = SnapshotWriter::create(store_path)?;
        let (steps, num_fails, capture) = self.drive(session.solver_mut(), &mut writer)?;
        let store_path = writer.close()?;
        session.close()?;

        let elapsed = start.elapsed();
        info!(
            "flow solution finished at {}, took {:.3} s",
            Local::now().format(DT_FMT),
            elapsed.as_secs_f64()
        );
        if num_fails > 0 {
            warn!("failed to converge {num_fails} times");
        }
        Ok(ForwardReport {
            store_path,
            steps,
            num_fails,
            elapsed,
            capture,
        })
    }

    fn drive<S: FlowSolver>(
        &self,
        solver: &mut S,
        writer: &mut SnapshotWriter,
    ) -> AdjResult<(usize, usize, Option<ForwardCapture>)> {
        let m = self.model.as_str();
        let sln = format!("SLN_{}", self.options.solution_id);
        let max_iter = match self.options.max_iterations {
            Some(n) => n,
            None => get_scalar_i64(solver, "MXITER", &sln, None)?.max(0) as usize,
        };
        let is_newton = get_scalar_i64(solver, "INEWTON", m, None)? != 0;
        let has_sto = self.packages.has_storage() && solver.has_variable("ICONVERT", m, Some("STO"));
        let storage = if has_sto {
            Some(StorageInputs {
                geom: CellGeometry::new(
                    get_f64(solver, "TOP", m, Some("DIS"))?,
                    get_f64(solver, "BOT", m, Some("DIS"))?,
                    get_f64(solver, "AREA", m, Some("DIS"))?,
                )?,
                iconvert: get_i64(solver, "ICONVERT", m, Some("STO"))?,
                ss: get_f64(solver, "SS", m, Some("STO"))?,
            })
        } else {
            None
        };

        if let Some(p) = &self.options.property_perturbation {
            let addr = solver.address(&p.name, m, Some("NPF"))?;
            solver.write(&addr, p.node, p.value)?;
        }

        let mut capture = self.options.capture.then(ForwardCapture::default);
        let mut visited: HashSet<StepKey> = HashSet::new();
        let mut aux = AuxRecord::default();
        let mut sat_old: Option<Array1<f64>> = None;
        let mut num_fails = 0;

        let mut ctime = solver.current_time()?;
        let etime = solver.end_time()?;
        while ctime < etime {
            let sol_start = Instant::now();
            let dt = solver.time_step_length()?;
            solver.prepare_time_step(dt)?;
            let stress_period = get_scalar_i64(solver, "KPER", TDIS_COMPONENT, None)?;
            let time_step = get_scalar_i64(solver, "KSTP", TDIS_COMPONENT, None)?;
            if stress_period < 1 || time_step < 1 {
                return Err(AdjError::Solver(format!(
                    "solver reported stress period {stress_period}, time step {time_step}"
                )));
            }
            let key = StepKey::new(stress_period as usize - 1, time_step as usize - 1);

            if self.options.force_k_update && visited.is_empty() {
                self.force_k_update(solver, stress_period, time_step)?;
            }
            if let Some(p) = &self.options.bound_perturbation {
                if p.key == key {
                    self.apply_bound_perturbation(solver, p)?;
                }
            }

            solver.prepare_solve(1)?;
            if sat_old.is_none() {
                sat_old = Some(get_f64(solver, "SAT", m, Some("NPF"))?);
            }

            let mut kiter = 0;
            let mut converged = false;
            while kiter < max_iter {
                if solver.solve(1)? {
                    converged = true;
                    break;
                }
                kiter += 1;
            }
            let took = sol_start.elapsed().as_secs_f64();
            if converged {
                if self.options.verbose {
                    info!("flow stress period,time step {stress_period},{time_step} converged with {kiter} iters, took {took:.5} s");
                } else {
                    debug!("flow stress period,time step {stress_period},{time_step} converged with {kiter} iters, took {took:.5} s");
                }
            } else {
                warn!("flow stress period,time step {stress_period},{time_step} did not converge, {kiter} iters, took {took:.5} s");
                num_fails += 1;
            }
            if let Err(e) = solver.finalize_solve(1) {
                debug!("ignoring finalize_solve failure at {key}: {e}");
            }
            solver.finalize_time_step()?;

            ctime = solver.current_time()?;
            let dt1 = solver.time_step_length()?;
            if !visited.insert(key) {
                return Err(AdjError::DuplicateStep {
                    kper: key.kper,
                    kstp: key.kstp,
                });
            }
            aux.push(ctime, dt1, key);

            let mut group = Group::default();
            let amat_addr = solver.address("AMAT", &sln, None)?;
            group.insert("amat", solver.get_value(&amat_addr)?);
            let head = get_f64(solver, "X", m, None)?;
            let head_old = get_f64(solver, "XOLD", m, None)?;
            group.insert_f64("head", head.clone());
            group.insert_f64("head_old", head_old.clone());
            group.insert_f64("k11", get_f64(solver, "K11", m, Some("NPF"))?);
            group.insert_f64("k33", get_f64(solver, "K33", m, Some("NPF"))?);
            group.insert_f64("condsat", get_f64(solver, "CONDSAT", m, Some("NPF"))?);
            group.insert_i64("iss", get_i64(solver, "ISS", m, None)?);

            let sat = get_f64(solver, "SAT", m, Some("NPF"))?;
            let sat_prev = sat_old.take().unwrap_or_else(|| sat.clone());
            match &storage {
                Some(sto) => {
                    let state = StepState {
                        head: &head,
                        head_old: &head_old,
                        sat: &sat,
                        sat_old: &sat_prev,
                    };
                    group.insert_f64("dresdss_h", dresdss_h(&sto.geom, &sto.iconvert, state, dt1)?);
                    group.insert_f64("drhsdh", drhsdh(&sto.geom, &sto.ss, dt1)?);
                }
                None => {
                    group.insert_f64("dresdss_h", Array1::<f64>::zeros(sat.len()));
                    group.insert_f64("drhsdh", Array1::<f64>::zeros(sat.len()));
                }
            }
            group.insert_f64("sat", sat.clone());
            group.insert_f64("sat_old", sat_prev);
            sat_old = Some(sat);

            self.harvest_boundaries(solver, key, &mut group, capture.as_mut())?;
            if let Some(cap) = capture.as_mut() {
                cap.insert_head(key, head);
            }

            group.set_attr_f64("ctime", ctime);
            group.set_attr_f64("dt", dt1);
            group.set_attr_i64("kper", key.kper as i64);
            group.set_attr_i64("kstp", key.kstp as i64);
            group.set_attr_i64("is_newton", is_newton as i64);
            group.set_attr_i64("has_sto", has_sto as i64);
            writer.write_group(&key.group_name(), &group)?;
        }

        writer.write_group(AUX_GROUP, &aux.to_group())?;
        writer.write_group(INFO_GROUP, &self.model_info(solver, has_sto)?)?;
        Ok((aux.len(), num_fails, capture))
    }

    fn force_k_update<S: FlowSolver>(
        &self,
        solver: &mut S,
        stress_period: i64,
        time_step: i64,
    ) -> AdjResult<()> {
        let m = self.model.as_str();
        let per = solver.address("KCHANGEPER", m, Some("NPF"))?;
        solver.write(&per, 0, stress_period as f64)?;
        let stp = solver.address("KCHANGESTP", m, Some("NPF"))?;
        solver.write(&stp, 0, time_step as f64)?;
        let nodes = solver.address("NODEKCHANGE", m, Some("NPF"))?;
        let n = solver.get_value(&nodes)?.len();
        for i in 0..n {
            solver.write(&nodes, i, 1.0)?;
        }
        Ok(())
    }

    fn apply_bound_perturbation<S: FlowSolver>(
        &self,
        solver: &mut S,
        p: &BoundPerturbation,
    ) -> AdjResult<()> {
        let m = self.model.as_str();
        let tag = p.package.to_ascii_uppercase();
        let nbound = get_scalar_i64(solver, "NBOUND", m, Some(&tag))?.max(0) as usize;
        let nodelist = get_i64(solver, "NODELIST", m, Some(&tag))?;
        let addr = solver.address("BOUND", m, Some(&tag))?;
        let ncol = solver.get_value(&addr)?.into_f64_2d(&addr)?.ncols();
        if p.field >= ncol {
            return Err(AdjError::Solver(format!(
                "bound field {} outside {} columns of {}",
                p.field, ncol, p.package
            )));
        }

        let target = p.node as i64 + 1;
        let hits: Vec<usize> = nodelist
            .iter()
            .take(nbound)
            .enumerate()
            .filter(|(_, &n)| n == target)
            .map(|(i, _)| i)
            .collect();
        if hits.is_empty() {
            return Err(AdjError::Solver(format!(
                "perturbation node {} not found in {} at {}",
                p.node + 1,
                p.package,
                p.key
            )));
        }
        for i in hits {
            solver.write(&addr, i * ncol + p.field, p.value)?;
        }
        Ok(())
    }

    fn harvest_boundaries<S: FlowSolver>(
        &self,
        solver: &S,
        key: StepKey,
        group: &mut Group,
        mut capture: Option<&mut ForwardCapture>,
    ) -> AdjResult<()> {
        let m = self.model.as_str();
        for ptype in BOUNDARY_PACKAGE_TYPES {
            let tags = self.packages.names(ptype);
            let single_instance = tags.len() == 1;
            for tag in tags {
                let tag_u = tag.to_ascii_uppercase();
                let nbound = get_scalar_i64(solver, "NBOUND", m, Some(&tag_u))?;
                if nbound <= 0 {
                    continue;
                }
                let n = nbound as usize;
                let nodelist = get_i64(solver, "NODELIST", m, Some(&tag_u))?;
                let bound_addr = solver.address("BOUND", m, Some(&tag_u))?;
                let bound = solver.get_value(&bound_addr)?.into_f64_2d(&bound_addr)?;
                let hcof = get_f64(solver, "HCOF", m, Some(&tag_u))?;
                let rhs = get_f64(solver, "RHS", m, Some(&tag_u))?;
                let simvals = get_f64(solver, "SIMVALS", m, Some(&tag_u))?;
                if nodelist.len() < n
                    || bound.nrows() < n
                    || hcof.len() < n
                    || rhs.len() < n
                    || simvals.len() < n
                {
                    return Err(AdjError::Solver(format!(
                        "{tag} reports {n} active entries but its arrays are shorter"
                    )));
                }

                let mut bound: Array2<f64> = bound.slice(s![..n, ..]).to_owned();
                let hcof = hcof.slice(s![..n]).to_owned();
                if ptype == SFR_PACKAGE_TYPE {
                    let stage = get_f64(solver, "STAGE", m, Some(&tag_u))?;
                    if bound.ncols() < 2 || stage.len() < n {
                        return Err(AdjError::Solver(format!(
                            "{tag} stage or bound layout too small for {n} reaches"
                        )));
                    }
                    for i in 0..n {
                        bound[[i, 0]] = stage[i];
                        bound[[i, 1]] = -hcof[i];
                    }
                }

                let snap = BoundarySnapshot {
                    ptype: ptype.to_string(),
                    nodelist: nodelist
                        .slice(s![..n])
                        .mapv(|v| if v > 0 { v - 1 } else { -1 }),
                    bound,
                    hcof,
                    rhs: rhs.slice(s![..n]).to_owned(),
                    simvals: simvals.slice(s![..n]).to_owned(),
                };

                if let Some(cap) = capture.as_deref_mut() {
                    let entries = (0..n)
                        .map(|i| BoundaryEntry {
                            node: usize::try_from(snap.nodelist[i]).ok(),
                            bound: snap.bound.row(i).to_owned(),
                            hcof: snap.hcof[i],
                            rhs: snap.rhs[i],
                            simval: snap.simvals[i],
                            package_name: tag.clone(),
                        })
                        .collect();
                    cap.insert_entries(ptype, key, single_instance, entries)?;
                }
                snap.write_into(group, tag);
            }
        }
        Ok(())
    }

    /// Static connectivity and geometry, written once after the last step.
    fn model_info<S: FlowSolver>(&self, solver: &S, has_sto: bool) -> AdjResult<Group> {
        let m = self.model.as_str();
        let mut g = Group::default();
        let ia = get_i64(solver, "IA", m, Some("CON"))? - 1;
        let iac: Array1<i64> = ia.windows(2).into_iter().map(|w| w[1] - w[0]).collect();
        g.insert_i64("ihc", get_i64(solver, "IHC", m, Some("CON"))?);
        g.insert_i64("ia", ia);
        g.insert_i64("ja", get_i64(solver, "JA", m, Some("CON"))? - 1);
        g.insert_i64("jas", get_i64(solver, "JAS", m, Some("CON"))? - 1);
        g.insert_f64("cl1", get_f64(solver, "CL1", m, Some("CON"))?);
        g.insert_f64("cl2", get_f64(solver, "CL2", m, Some("CON"))?);
        g.insert_f64("hwva", get_f64(solver, "HWVA", m, Some("CON"))?);
        g.insert_f64("top", get_f64(solver, "TOP", m, Some("DIS"))?);
        g.insert_f64("bot", get_f64(solver, "BOT", m, Some("DIS"))?);
        g.insert_i64("iac", iac);
        g.insert_i64("icelltype", get_i64(solver, "ICELLTYPE", m, Some("NPF"))?);
        g.insert_f64("area", get_f64(solver, "AREA", m, Some("DIS"))?);
        if has_sto {
            g.insert_i64("iconvert", get_i64(solver, "ICONVERT", m, Some("STO"))?);
            g.insert_f64("storage", get_f64(solver, "SS", m, Some("STO"))?);
        }
        g.insert_i64("nodeuser", get_i64(solver, "NODEUSER", m, Some("DIS"))? - 1);
        g.insert_i64("nodereduced", get_i64(solver, "NODEREDUCED", m, Some("DIS"))? - 1);
        g.insert_i64("ndim", get_i64(solver, "NDIM", m, Some("DIS"))?);
        g.insert_i64("nnodes", get_i64(solver, "NODES", m, Some("CON"))?);
        g.insert_i64("idomain", get_i64(solver, "IDOMAIN", m, Some("DIS"))?);
        if self.packages.is_structured() {
            for name in ["NLAY", "NROW", "NCOL"] {
                g.insert_i64(name.to_ascii_lowercase(), get_i64(solver, name, m, Some("DIS"))?);
            }
        }
        for (ptype, names) in self.packages.iter() {
            for (i, name) in names.iter().enumerate() {
                g.set_attr_i64(format!("registry:{ptype}:{name}"), i as i64 + 1);
            }
        }
        Ok(g)
    }
}
