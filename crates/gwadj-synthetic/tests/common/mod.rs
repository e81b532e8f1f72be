// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Integration Test Fixtures
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use gwadj_synthetic::model::{EntryDef, Period, Property};
use gwadj_synthetic::{ModelDef, PackageDef};

pub fn temp_dir(tag: &str) -> PathBuf {
    let epoch_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "gwadj_it_{tag}_{}_{}",
        std::process::id(),
        epoch_ns
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn package(ptype: &str, name: Option<&str>, entries: &[([usize; 3], &[f64])]) -> PackageDef {
    PackageDef {
        ptype: ptype.to_string(),
        name: name.map(str::to_string),
        entries: entries
            .iter()
            .map(|(cell, values)| EntryDef {
                cell: *cell,
                values: values.to_vec(),
            })
            .collect(),
    }
}

fn base(name: &str, nrow: usize, ncol: usize) -> ModelDef {
    ModelDef {
        name: name.to_string(),
        nlay: 1,
        nrow,
        ncol,
        delr: 1.0,
        delc: 1.0,
        top: 1.0,
        botm: vec![0.0],
        idomain: None,
        k11: Property::Constant(1.0),
        k33: None,
        ss: None,
        iconvert: 0,
        strt: 0.0,
        periods: vec![Period {
            perlen: 1.0,
            nstp: 1,
            steady: true,
        }],
        packages: Vec::new(),
        mxiter: 25,
        hclose: 1e-10,
    }
}

/// 2x3 cells, steady period then a two-step transient period.
/// Three time steps in total.
pub fn transient_model() -> ModelDef {
    let mut def = base("trans", 2, 3);
    def.delr = 10.0;
    def.delc = 10.0;
    def.top = 10.0;
    def.k11 = Property::Constant(5.0);
    def.ss = Some(Property::Constant(1e-3));
    def.strt = 8.0;
    def.periods.push(Period {
        perlen: 10.0,
        nstp: 2,
        steady: false,
    });
    def.packages = vec![
        package("ghb6", None, &[([1, 1, 1], &[8.0, 50.0])]),
        package("wel6", None, &[([1, 2, 3], &[-2.0])]),
        package("rch6", None, &[([1, 1, 2], &[0.001])]),
    ];
    def
}

/// One cell, a general-head boundary and a well: `h = bhead + q / cond`.
pub fn single_cell_ghb(bhead: f64, cond: f64, q: f64) -> ModelDef {
    let mut def = base("cell", 1, 1);
    def.packages = vec![
        package("ghb6", None, &[([1, 1, 1], &[bhead, cond])]),
        package("wel6", None, &[([1, 1, 1], &[q])]),
    ];
    def
}

/// One transient cell with storage:
/// `h = (cond * bhead + ss * h0) / (cond + ss)` for unit area, thickness and step.
pub fn single_cell_storage(bhead: f64, cond: f64, ss: f64, h0: f64) -> ModelDef {
    let mut def = base("store", 1, 1);
    def.ss = Some(Property::Constant(ss));
    def.strt = h0;
    def.periods[0].steady = false;
    def.packages = vec![package("ghb6", Some("ghb_a"), &[([1, 1, 1], &[bhead, cond])])];
    def
}

pub const HEAD_PM: &str = "\
begin performance_measure pm1
  1 1 1 1 1 head direct 1.0 -999
end performance_measure
";
