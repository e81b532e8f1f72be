// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt;

use serde::{Deserialize, Serialize};

/// Grid discretization of the flow model. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridTopology {
    /// DIS: layer/row/column.
    Structured { nlay: usize, nrow: usize, ncol: usize },
    /// DISV: layer/cell-in-layer.
    Unstructured { nlay: usize, ncpl: usize },
}

impl GridTopology {
    pub fn nlay(&self) -> usize {
        match *self {
            GridTopology::Structured { nlay, .. } | GridTopology::Unstructured { nlay, .. } => {
                nlay
            }
        }
    }

    /// Cells per layer.
    pub fn ncpl(&self) -> usize {
        match *self {
            GridTopology::Structured { nrow, ncol, .. } => nrow * ncol,
            GridTopology::Unstructured { ncpl, .. } => ncpl,
        }
    }

    /// Node count in user numbering (inactive cells included).
    pub fn nodes_user(&self) -> usize {
        self.nlay() * self.ncpl()
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, GridTopology::Structured { .. })
    }

    /// Positional field count of one performance-measure record line.
    pub fn record_field_count(&self) -> usize {
        match self {
            GridTopology::Structured { .. } => 9,
            GridTopology::Unstructured { .. } => 8,
        }
    }
}

/// Composite (stress period, time step) key, both zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepKey {
    pub kper: usize,
    pub kstp: usize,
}

impl StepKey {
    pub fn new(kper: usize, kstp: usize) -> Self {
        StepKey { kper, kstp }
    }

    /// Snapshot store group holding this step's solution.
    pub fn group_name(&self) -> String {
        format!("solution_kper:{:05}_kstp:{:05}", self.kper, self.kstp)
    }

    /// Inverse of [`StepKey::group_name`].
    pub fn from_group_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("solution_kper:")?;
        let (kper, kstp) = rest.split_once("_kstp:")?;
        Some(StepKey {
            kper: kper.parse().ok()?,
            kstp: kstp.parse().ok()?,
        })
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.kper, self.kstp)
    }
}

/// Zero-based structured cell coordinate, used for diagnostics and table output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lrc {
    pub k: usize,
    pub i: usize,
    pub j: usize,
}
