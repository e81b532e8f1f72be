// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — In-Memory Forward Capture
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Heads and boundary entries of one forward run, kept in memory so the
//! perturbation harness can score a run without reading the store back.

use std::collections::BTreeMap;

use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::StepKey;
use ndarray::Array1;

/// One active entry of a boundary package at one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryEntry {
    /// Zero-based reduced node; `None` for entries detached from the grid.
    pub node: Option<usize>,
    pub bound: Array1<f64>,
    pub hcof: f64,
    pub rhs: f64,
    pub simval: f64,
    pub package_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ForwardCapture {
    pub heads: BTreeMap<StepKey, Array1<f64>>,
    /// package type -> step -> entries of every instance of that type.
    pub boundaries: BTreeMap<String, BTreeMap<StepKey, Vec<BoundaryEntry>>>,
}

impl ForwardCapture {
    pub fn head(&self, key: &StepKey) -> Option<&Array1<f64>> {
        self.heads.get(key)
    }

    pub(crate) fn insert_head(&mut self, key: StepKey, head: Array1<f64>) {
        self.heads.insert(key, head);
    }

    /// Appends entries for one package instance. A step may only be filled once
    /// when the package type has a single instance.
    pub(crate) fn insert_entries(
        &mut self,
        package_type: &str,
        key: StepKey,
        single_instance: bool,
        entries: Vec<BoundaryEntry>,
    ) -> AdjResult<()> {
        let by_step = self.boundaries.entry(package_type.to_string()).or_default();
        if single_instance && by_step.contains_key(&key) {
            return Err(AdjError::DuplicateStep {
                kper: key.kper,
                kstp: key.kstp,
            });
        }
        by_step.entry(key).or_default().extend(entries);
        Ok(())
    }

    /// Entries of one named package instance at one step.
    pub fn entries_for<'a>(
        &'a self,
        package_name: &'a str,
        key: &'a StepKey,
    ) -> impl Iterator<Item = &'a BoundaryEntry> + 'a {
        self.boundaries
            .values()
            .filter_map(move |by_step| by_step.get(key))
            .flatten()
            .filter(move |e| e.package_name.eq_ignore_ascii_case(package_name))
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepKey> {
        self.heads.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn entry(node: usize, name: &str, simval: f64) -> BoundaryEntry {
        BoundaryEntry {
            node: Some(node),
            bound: array![1.0, 2.0],
            hcof: -2.0,
            rhs: -2.0,
            simval,
            package_name: name.to_string(),
        }
    }

    #[test]
    fn test_single_instance_duplicate_step_rejected() {
        let mut cap = ForwardCapture::default();
        let key = StepKey::new(0, 0);
        cap.insert_entries("ghb6", key, true, vec![entry(1, "ghb-1", 0.5)])
            .unwrap();
        let err = cap
            .insert_entries("ghb6", key, true, vec![entry(2, "ghb-1", 0.5)])
            .expect_err("second fill of a single-instance package must fail");
        assert!(matches!(err, AdjError::DuplicateStep { kper: 0, kstp: 0 }));
    }

    #[test]
    fn test_multi_instance_entries_accumulate() {
        let mut cap = ForwardCapture::default();
        let key = StepKey::new(1, 0);
        cap.insert_entries("wel6", key, false, vec![entry(1, "wel_a", 1.0)])
            .unwrap();
        cap.insert_entries("wel6", key, false, vec![entry(4, "wel_b", -3.0)])
            .unwrap();
        assert_eq!(cap.boundaries["wel6"][&key].len(), 2);
        let b: Vec<_> = cap.entries_for("WEL_B", &key).collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].node, Some(4));
    }
}
