// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Adjoint Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Session-level orchestration: manifest, grid, measures, forward run,
//! hand-off to the adjoint solve and the perturbation cross-check.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gwadj_types::config::AdjConfig;
use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::GridTopology;
use tracing::info;

use crate::driver::{DriverOptions, ForwardDriver, ForwardReport};
use crate::harness::{HarnessContext, PerturbationHarness, PerturbationTable};
use crate::index::NodeReduction;
use crate::manifest::SimulationManifest;
use crate::measure::PerformanceMeasure;
use crate::solver::{get_i64, get_scalar_i64, FlowSolver, SessionFactory};
use crate::spec_file::{read_adj_spec, AdjSpec, SpecContext};
use crate::store::default_store_name;

/// Backward solve of one measure against a closed snapshot store.
pub trait AdjointSolver {
    type Output;

    fn solve_adjoint(&mut self, store: &Path, measure: &PerformanceMeasure)
        -> AdjResult<Self::Output>;
}

/// Grid topology and node reduction as reported by an initialised solver.
pub fn read_grid<S: FlowSolver + ?Sized>(
    solver: &S,
    model: &str,
    structured: bool,
) -> AdjResult<(GridTopology, NodeReduction)> {
    let m = model.to_ascii_uppercase();
    let dim = |name: &str| -> AdjResult<usize> {
        let v = get_scalar_i64(solver, name, &m, Some("DIS"))?;
        usize::try_from(v)
            .map_err(|_| AdjError::Solver(format!("{name} is negative ({v})")))
    };
    let topology = if structured {
        GridTopology::Structured {
            nlay: dim("NLAY")?,
            nrow: dim("NROW")?,
            ncol: dim("NCOL")?,
        }
    } else {
        GridTopology::Unstructured {
            nlay: dim("NLAY")?,
            ncpl: dim("NCPL")?,
        }
    };
    let nodes = dim("NODES")?;
    let nodeuser = get_i64(solver, "NODEUSER", &m, Some("DIS"))?;
    let reduction = NodeReduction::from_nodeuser(topology.nodes_user(), nodes, &nodeuser.to_vec())?;
    Ok((topology, reduction))
}

pub struct AdjointModel<F: SessionFactory> {
    factory: F,
    config: AdjConfig,
    sim_ws: PathBuf,
    manifest: SimulationManifest,
    topology: GridTopology,
    reduction: NodeReduction,
    spec: AdjSpec,
    store_path: Option<PathBuf>,
}

impl<F: SessionFactory> AdjointModel<F> {
    /// Checks the performance-measure file exists, reads the manifest, probes
    /// the grid with a short-lived session and parses the file.
    pub fn new(factory: F, config: AdjConfig) -> AdjResult<Self> {
        let adj_path = config.adj_path();
        if !adj_path.exists() {
            return Err(AdjError::Config(format!(
                "adj input file '{}' not found",
                adj_path.display()
            )));
        }
        let sim_ws = PathBuf::from(&config.sim_ws);
        let manifest = SimulationManifest::load(&sim_ws)?;

        let probe = factory.open(&sim_ws)?;
        let (topology, reduction) = read_grid(
            probe.solver(),
            &manifest.model.name,
            manifest.packages.is_structured(),
        )?;
        probe.close()?;

        let spec = read_adj_spec(
            &adj_path,
            &SpecContext {
                topology,
                reduction: &reduction,
                packages: &manifest.packages,
            },
        )?;
        info!(
            "model '{}': {:?}, {} active nodes, {} performance measures",
            manifest.model.name,
            topology,
            reduction.nodes(),
            spec.measures.len()
        );

        Ok(AdjointModel {
            factory,
            config,
            sim_ws,
            manifest,
            topology,
            reduction,
            spec,
            store_path: None,
        })
    }

    /// Re-parses a performance-measure file, replacing all current measures.
    pub fn reload_spec(&mut self, path: &Path) -> AdjResult<()> {
        let spec = read_adj_spec(
            path,
            &SpecContext {
                topology: self.topology,
                reduction: &self.reduction,
                packages: &self.manifest.packages,
            },
        )?;
        self.spec = spec;
        Ok(())
    }

    pub fn manifest(&self) -> &SimulationManifest {
        &self.manifest
    }

    pub fn topology(&self) -> GridTopology {
        self.topology
    }

    pub fn reduction(&self) -> &NodeReduction {
        &self.reduction
    }

    pub fn measures(&self) -> &[PerformanceMeasure] {
        &self.spec.measures
    }

    pub fn spec(&self) -> &AdjSpec {
        &self.spec
    }

    /// Store written by the last [`AdjointModel::solve_gwf`].
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Config override, then the spec file option, then a time-stamped name.
    fn next_store_path(&self) -> PathBuf {
        let name = self
            .config
            .driver
            .snapshot_name
            .clone()
            .or_else(|| self.spec.options.hdf5_name.clone())
            .unwrap_or_else(|| default_store_name(&self.manifest.model.name));
        PathBuf::from(name)
    }

    /// Runs the forward model once and persists its snapshot store.
    pub fn solve_gwf(&mut self) -> AdjResult<ForwardReport> {
        let driver = ForwardDriver::new(
            &self.manifest.model.name,
            &self.manifest.packages,
            DriverOptions::from_config(&self.config.driver),
        );
        let session = self.factory.open(&self.sim_ws)?;
        let report = driver.run(session, &self.next_store_path())?;
        self.store_path = Some(report.store_path.clone());
        Ok(report)
    }

    /// Hands the closed store to an adjoint solver, one measure at a time.
    pub fn solve_adjoint<A: AdjointSolver>(
        &self,
        solver: &mut A,
    ) -> AdjResult<BTreeMap<String, A::Output>> {
        let store = match &self.store_path {
            Some(p) if p.exists() => p,
            _ => {
                return Err(AdjError::Config(
                    "need to call solve_gwf() first".to_string(),
                ))
            }
        };
        let mut out = BTreeMap::new();
        for pm in &self.spec.measures {
            out.insert(pm.name().to_string(), solver.solve_adjoint(store, pm)?);
        }
        Ok(out)
    }

    /// Finite-difference sensitivities of every measure; writes the CSV table.
    pub fn perturbation_test(&self) -> AdjResult<PerturbationTable> {
        let harness = PerturbationHarness::new(
            &self.factory,
            HarnessContext {
                sim_ws: &self.sim_ws,
                model: &self.manifest.model.name,
                packages: &self.manifest.packages,
                topology: self.topology,
                reduction: &self.reduction,
                measures: &self.spec.measures,
            },
            DriverOptions::from_config(&self.config.driver),
            self.config.harness.clone(),
        )?;
        let table = harness.run()?;
        let output = Path::new(&self.config.harness.output);
        table.write_csv(output)?;
        info!(
            "wrote {} perturbation rows to {}",
            table.rows().len(),
            output.display()
        );
        Ok(table)
    }
}
