// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Perturbation Harness Integration Tests
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
mod common;

use std::path::Path;

use gwadj_core::adjoint::{AdjointModel, AdjointSolver};
use gwadj_core::driver::DriverOptions;
use gwadj_core::harness::{HarnessContext, PerturbationHarness, PerturbationTable};
use gwadj_core::index::NodeReduction;
use gwadj_core::manifest::SimulationManifest;
use gwadj_core::measure::PerformanceMeasure;
use gwadj_core::spec_file::{parse_adj_spec, SpecContext};
use gwadj_core::store::SnapshotReader;
use gwadj_synthetic::SyntheticFactory;
use gwadj_types::config::{AdjConfig, DriverConfig, HarnessConfig};
use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::GridTopology;

use common::{single_cell_ghb, single_cell_storage, temp_dir, HEAD_PM};

// ── Helpers ──────────────────────────────────────────────────────────

fn harness_config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        scratch_dir: dir.join("pert_temp").to_string_lossy().into_owned(),
        output: dir.join("pert_results.csv").to_string_lossy().into_owned(),
        ..HarnessConfig::default()
    }
}

fn one_cell() -> GridTopology {
    GridTopology::Structured {
        nlay: 1,
        nrow: 1,
        ncol: 1,
    }
}

fn run_harness(dir: &Path, topology: GridTopology, pm_text: &str) -> (PerturbationTable, usize) {
    let manifest = SimulationManifest::load(dir).unwrap();
    let reduction = NodeReduction::identity(topology.nodes_user());
    let spec = parse_adj_spec(
        pm_text,
        &SpecContext {
            topology,
            reduction: &reduction,
            packages: &manifest.packages,
        },
    )
    .unwrap();
    let factory = SyntheticFactory::new();
    let harness = PerturbationHarness::new(
        &factory,
        HarnessContext {
            sim_ws: dir,
            model: &manifest.model.name,
            packages: &manifest.packages,
            topology,
            reduction: &reduction,
            measures: &spec.measures,
        },
        DriverOptions::default(),
        harness_config(dir),
    )
    .unwrap();
    let table = harness.run().unwrap();
    (table, factory.sessions_created())
}

fn assert_close(actual: Option<f64>, expected: f64, rel: f64) {
    let actual = actual.expect("missing sensitivity row");
    let scale = expected.abs().max(1e-12);
    assert!(
        (actual - expected).abs() / scale < rel,
        "sensitivity {actual} differs from {expected}"
    );
}

// ── Finite differences ───────────────────────────────────────────────

#[test]
fn test_bound_sensitivities_match_closed_form() {
    let dir = temp_dir("fd_bound");
    let (bhead, cond, q) = (10.0, 2.0, -1.0);
    single_cell_ghb(bhead, cond, q).write_simulation(&dir).unwrap();
    let (table, sessions) = run_harness(&dir, one_cell(), HEAD_PM);

    // h = bhead + q / cond
    assert_close(table.value(0, "wel6_q", "pm1"), 1.0 / cond, 1e-6);
    assert_close(table.value(0, "ghb-1_bhead", "pm1"), 1.0, 1e-6);
    assert_close(table.value(0, "ghb-1_cond", "pm1"), -q / (cond * cond), 0.02);
    // A lone cell has no conductances to perturb.
    let k = table.value(0, "k11_cell_npf", "pm1").unwrap();
    assert!(k.abs() < 1e-9);
    assert!(table.value(0, "sto_ss", "pm1").is_none());

    // probe, baseline, three bound fields and one K11 node
    assert_eq!(sessions, 6);
    std::fs::remove_dir_all(dir).ok();
}

/// Relative step of 1% on one of two unit conductivities: the connection
/// conductance `C = K1 K2 / (K1 / 2 + K2 / 2)` moves from 1 to `1.01 / 1.005`,
/// and `h2 = bhead + q / cond + q / C` with `q = -1`.
fn unit_pair_forward_difference() -> f64 {
    (1.0 - 1.005 / 1.01) / 0.01
}

#[test]
fn test_horizontal_conductivity_sensitivity() {
    let dir = temp_dir("fd_k11");
    let mut def = single_cell_ghb(10.0, 2.0, -1.0);
    def.ncol = 2;
    def.packages[1].entries[0].cell = [1, 1, 2];
    def.write_simulation(&dir).unwrap();
    let pm = "\
begin performance_measure far
  1 1 1 1 2 head direct 1.0 -999
end performance_measure
";
    let topology = GridTopology::Structured {
        nlay: 1,
        nrow: 1,
        ncol: 2,
    };
    let (table, _) = run_harness(&dir, topology, pm);

    // dh2/dK = 0.5 analytically for either cell.
    let expected = unit_pair_forward_difference();
    assert!((expected - 0.5).abs() < 0.01);
    assert_close(table.value(0, "k11_cell_npf", "far"), expected, 1e-5);
    assert_close(table.value(1, "k11_cell_npf", "far"), expected, 1e-5);
    // Single layer: no vertical rows.
    assert!(table.rows().iter().all(|r| !r.addr.starts_with("k33")));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_vertical_conductivity_sensitivity() {
    let dir = temp_dir("fd_k33");
    let mut def = single_cell_ghb(10.0, 2.0, -1.0);
    def.nlay = 2;
    def.top = 2.0;
    def.botm = vec![1.0, 0.0];
    def.packages[1].entries[0].cell = [2, 1, 1];
    def.write_simulation(&dir).unwrap();
    let pm = "\
begin performance_measure deep
  1 1 2 1 1 head direct 1.0 -999
end performance_measure
";
    let topology = GridTopology::Structured {
        nlay: 2,
        nrow: 1,
        ncol: 1,
    };
    let (table, _) = run_harness(&dir, topology, pm);

    let expected = unit_pair_forward_difference();
    assert_close(table.value(0, "k33_cell_npf", "deep"), expected, 1e-5);
    assert_close(table.value(1, "k33_cell_npf", "deep"), expected, 1e-5);
    // Stacked cells share no horizontal face.
    for node in 0..2 {
        let k = table.value(node, "k11_cell_npf", "deep").unwrap();
        assert!(k.abs() < 1e-9);
    }
    let csv = table.to_csv();
    assert!(csv.lines().any(|l| l.starts_with("2,k33_cell_npf,") && l.ends_with(",2,1,1")));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_storage_sensitivity_through_deck() {
    let dir = temp_dir("fd_ss");
    let (bhead, cond, ss, h0) = (10.0, 1.0, 0.5, 0.0);
    single_cell_storage(bhead, cond, ss, h0).write_simulation(&dir).unwrap();
    let (table, _) = run_harness(&dir, one_cell(), HEAD_PM);

    let h = (cond * bhead + ss * h0) / (cond + ss);
    let dh_dss = (h0 - h) / (cond + ss);
    assert_close(table.value(0, "sto_ss", "pm1"), dh_dss, 0.01);
    assert!(dir.join("pert_temp").join("sim").join("store.sto_ss.txt").exists());
    // The original simulation is never modified.
    assert!(!dir.join("store.sto_ss.txt").exists());
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_residual_measure_scaled_by_weight() {
    let dir = temp_dir("fd_res");
    single_cell_ghb(10.0, 2.0, -1.0).write_simulation(&dir).unwrap();
    let pm = "\
begin performance_measure fit
  1 1 1 1 1 head residual 2.0 9.0
end performance_measure
";
    let (table, _) = run_harness(&dir, one_cell(), pm);
    // Forward difference of 4 (h - 9)^2 for h: 9.5 -> 9.6
    let eps = 10.0 * 1.01 - 10.0;
    let expected = 4.0 * ((0.5f64 + eps).powi(2) - 0.25) / eps;
    assert_close(table.value(0, "ghb-1_bhead", "fit"), expected, 1e-5);
    std::fs::remove_dir_all(dir).ok();
}

// ── End to end ───────────────────────────────────────────────────────

struct StepCounter;

impl AdjointSolver for StepCounter {
    type Output = (usize, f64);

    fn solve_adjoint(&mut self, store: &Path, measure: &PerformanceMeasure) -> AdjResult<(usize, f64)> {
        let mut reader = SnapshotReader::open(store)?;
        let steps = reader.solution_steps();
        let rec = &measure.records()[0];
        let head = reader.read_solution(rec.step)?.head()?;
        Ok((steps.len(), head[rec.node]))
    }
}

fn adjoint_config(dir: &Path) -> AdjConfig {
    AdjConfig {
        adj_file: "model.adj".to_string(),
        sim_ws: dir.to_string_lossy().into_owned(),
        driver: DriverConfig {
            verbose: false,
            snapshot_name: Some(dir.join("fwd.npz").to_string_lossy().into_owned()),
            ..DriverConfig::default()
        },
        harness: harness_config(dir),
    }
}

#[test]
fn test_adjoint_model_end_to_end() {
    let dir = temp_dir("e2e");
    single_cell_ghb(10.0, 2.0, -1.0).write_simulation(&dir).unwrap();
    std::fs::write(dir.join("model.adj"), HEAD_PM).unwrap();

    let mut model = AdjointModel::new(SyntheticFactory::new(), adjoint_config(&dir)).unwrap();
    assert_eq!(model.measures().len(), 1);
    assert!(!model.reduction().is_reduced());

    match model.solve_adjoint(&mut StepCounter) {
        Err(AdjError::Config(msg)) => assert!(msg.contains("solve_gwf")),
        other => panic!("Unexpected result: {other:?}"),
    }

    let report = model.solve_gwf().unwrap();
    assert_eq!(report.store_path, dir.join("fwd.npz"));
    let out = model.solve_adjoint(&mut StepCounter).unwrap();
    let (steps, head) = out["pm1"];
    assert_eq!(steps, 1);
    assert!((head - 9.5).abs() < 1e-9);

    let table = model.perturbation_test().unwrap();
    assert_eq!(table.measures(), &["pm1".to_string()]);
    let csv = std::fs::read_to_string(dir.join("pert_results.csv")).unwrap();
    assert!(csv.starts_with("node,addr,epsilon,pm1,k,i,j"));
    assert!(csv.lines().any(|l| l.starts_with("1,ghb-1_bhead,")));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_missing_adj_file_is_a_config_error() {
    let dir = temp_dir("noadj");
    single_cell_ghb(10.0, 2.0, -1.0).write_simulation(&dir).unwrap();
    let factory = SyntheticFactory::new();
    match AdjointModel::new(&factory, adjoint_config(&dir)) {
        Err(AdjError::Config(msg)) => assert!(msg.contains("model.adj")),
        Err(other) => panic!("Unexpected error: {other}"),
        Ok(_) => panic!("expected a config error"),
    }
    // Rejected before any solver session is opened.
    assert_eq!(factory.sessions_created(), 0);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_reduced_grid_rows_use_user_numbering() {
    let dir = temp_dir("reduced");
    let mut def = single_cell_ghb(10.0, 2.0, -1.0);
    def.ncol = 3;
    def.idomain = Some(vec![0, 1, 1]);
    def.packages[0].entries[0].cell = [1, 1, 2];
    def.packages[1].entries[0].cell = [1, 1, 3];
    def.write_simulation(&dir).unwrap();
    std::fs::write(
        dir.join("model.adj"),
        "begin performance_measure far\n  1 1 1 1 3 head direct 1.0 -999\nend performance_measure\n",
    )
    .unwrap();

    let mut model = AdjointModel::new(SyntheticFactory::new(), adjoint_config(&dir)).unwrap();
    assert!(model.reduction().is_reduced());
    assert_eq!(model.measures()[0].records()[0].node, 1);

    let table = model.perturbation_test().unwrap();
    assert!(table.rows().iter().all(|r| r.node != 0));
    let k_nodes: Vec<usize> = table
        .rows()
        .iter()
        .filter(|r| r.addr == "k11_cell_npf")
        .map(|r| r.node)
        .collect();
    assert_eq!(k_nodes, vec![1, 2]);
    // Well at the far cell: h3 = bhead + q/cond + q/C, C = 1
    assert_close(table.value(2, "wel6_q", "far"), 1.0 / 2.0 + 1.0, 1e-6);

    // Inactive cell cannot carry a record.
    std::fs::write(
        dir.join("bad.adj"),
        "begin performance_measure bad\n  1 1 1 1 1 head direct 1.0 -999\nend performance_measure\n",
    )
    .unwrap();
    match model.reload_spec(&dir.join("bad.adj")) {
        Err(AdjError::Syntax { line, .. }) => assert_eq!(line, 2),
        other => panic!("Unexpected result: {other:?}"),
    }
    std::fs::remove_dir_all(dir).ok();
}
