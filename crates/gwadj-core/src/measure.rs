// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Performance Measures
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Performance measures and their scalar evaluation against a forward run.

use std::collections::HashSet;
use std::fmt;

use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::StepKey;

use crate::capture::ForwardCapture;
use crate::index::CellCoordinate;

/// Simulated quantity a record reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuantityKind {
    Head,
    /// Flux exchanged with the named boundary package instance.
    Flux { package: String },
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityKind::Head => write!(f, "head"),
            QuantityKind::Flux { package } => write!(f, "{package}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasureForm {
    /// Weighted simulated value.
    Direct,
    /// Weighted squared residual against an observed value.
    Residual,
}

impl MeasureForm {
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "direct" => Some(MeasureForm::Direct),
            "residual" => Some(MeasureForm::Residual),
            _ => None,
        }
    }
}

impl fmt::Display for MeasureForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureForm::Direct => write!(f, "direct"),
            MeasureForm::Residual => write!(f, "residual"),
        }
    }
}

/// One space-time-weighted term of a performance measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureRecord {
    pub step: StepKey,
    /// Zero-based reduced node.
    pub node: usize,
    pub kind: QuantityKind,
    pub form: MeasureForm,
    pub weight: f64,
    /// Observed value; only meaningful for the residual form.
    pub obsval: f64,
    /// Cell as written in the spec file, kept for diagnostics.
    pub coordinate: Option<CellCoordinate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMeasure {
    name: String,
    records: Vec<MeasureRecord>,
}

/// Reason a record list cannot form a single performance measure, if any.
pub(crate) fn uniformity_error(records: &[MeasureRecord]) -> Option<String> {
    let first = records.first()?;
    let kinds: HashSet<&QuantityKind> = records.iter().map(|r| &r.kind).collect();
    if kinds.len() > 1 {
        let mut names: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        names.sort();
        return Some(format!(
            "mixed quantity kinds ({}) are not supported",
            names.join(", ")
        ));
    }
    let forms: HashSet<MeasureForm> = records.iter().map(|r| r.form).collect();
    if forms.len() > 1 {
        return Some("mixed 'direct' and 'residual' forms are not supported".to_string());
    }
    if first.kind != QuantityKind::Head && first.form == MeasureForm::Residual {
        return Some(format!(
            "flux quantity '{}' cannot use the residual form",
            first.kind
        ));
    }
    None
}

impl PerformanceMeasure {
    /// Name is stored lower-case; records must be non-empty and uniform.
    pub fn new(name: &str, records: Vec<MeasureRecord>) -> AdjResult<Self> {
        if records.is_empty() {
            return Err(AdjError::Config(format!(
                "performance measure '{name}' has no records"
            )));
        }
        if let Some(msg) = uniformity_error(&records) {
            return Err(AdjError::Config(format!(
                "performance measure '{name}': {msg}"
            )));
        }
        Ok(PerformanceMeasure {
            name: name.to_ascii_lowercase(),
            records,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[MeasureRecord] {
        &self.records
    }

    pub fn kind(&self) -> &QuantityKind {
        &self.records[0].kind
    }

    pub fn form(&self) -> MeasureForm {
        self.records[0].form
    }

    /// Scalar value of the measure for one forward run.
    pub fn solve_forward(&self, capture: &ForwardCapture) -> AdjResult<f64> {
        let mut total = 0.0;
        for rec in &self.records {
            match &rec.kind {
                QuantityKind::Head => {
                    let head = capture.head(&rec.step).ok_or_else(|| {
                        AdjError::Config(format!(
                            "performance measure '{}' references step {} which was not simulated",
                            self.name, rec.step
                        ))
                    })?;
                    let h = *head.get(rec.node).ok_or_else(|| {
                        AdjError::Config(format!(
                            "performance measure '{}' references node {} beyond {} heads",
                            self.name,
                            rec.node + 1,
                            head.len()
                        ))
                    })?;
                    total += match rec.form {
                        MeasureForm::Direct => rec.weight * h,
                        MeasureForm::Residual => (rec.weight * (h - rec.obsval)).powi(2),
                    };
                }
                QuantityKind::Flux { package } => {
                    if capture.head(&rec.step).is_none() {
                        return Err(AdjError::Config(format!(
                            "performance measure '{}' references step {} which was not simulated",
                            self.name, rec.step
                        )));
                    }
                    // A simulated step with no active entries contributes nothing.
                    let q: f64 = capture
                        .entries_for(package, &rec.step)
                        .filter(|e| e.node == Some(rec.node))
                        .map(|e| e.simval)
                        .sum();
                    total += rec.weight * q;
                }
            }
        }
        Ok(total)
    }
}
