// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Boundary package types harvested every time step, in harvest order.
pub const BOUNDARY_PACKAGE_TYPES: [&str; 7] =
    ["wel6", "ghb6", "riv6", "drn6", "sfr6", "rch6", "recha6"];

/// Streamflow routing: its bound layout is rebuilt from `STAGE` and `HCOF`.
pub const SFR_PACKAGE_TYPE: &str = "sfr6";

/// The only model type the adjoint supports.
pub const GWF_MODEL_TYPE: &str = "gwf6";

/// Presence of this package marks a structured (layer/row/column) grid.
pub const STRUCTURED_DIS_TYPE: &str = "dis6";

/// Storage package type.
pub const STO_PACKAGE_TYPE: &str = "sto6";

/// Time discretization component name.
pub const TDIS_COMPONENT: &str = "TDIS";

/// Names of the leading bound columns per package type.
/// `wel6` and `rch6` carry a single rate column.
pub fn bound_field_names(package_type: &str) -> &'static [&'static str] {
    match package_type {
        "wel6" => &["q"],
        "ghb6" => &["bhead", "cond"],
        "riv6" => &["stage", "cond", "rbot"],
        "drn6" => &["elev", "cond"],
        "sfr6" => &["stage", "cond"],
        "rch6" | "recha6" => &["recharge"],
        _ => &[],
    }
}

/// Label of one perturbed bound column in the sensitivity table.
pub fn bound_label(package_type: &str, package_name: &str, field: usize) -> String {
    match package_type {
        "wel6" => "wel6_q".to_string(),
        "rch6" | "recha6" => "rch6_recharge".to_string(),
        _ => match bound_field_names(package_type).get(field) {
            Some(name) => format!("{package_name}_{name}"),
            None => format!("{package_name}_bound{field}"),
        },
    }
}
