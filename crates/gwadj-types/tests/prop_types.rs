// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Property-Based Tests (proptest) for gwadj-types
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for gwadj-types using proptest.
//!
//! Covers: step-key group naming, topology node counts.

use gwadj_types::state::{GridTopology, StepKey};
use proptest::prelude::*;

proptest! {
    /// Group names parse back to the key that produced them.
    #[test]
    fn step_key_group_name_roundtrip(kper in 0usize..99_999, kstp in 0usize..99_999) {
        let key = StepKey::new(kper, kstp);
        prop_assert_eq!(StepKey::from_group_name(&key.group_name()), Some(key));
    }

    /// Lexicographic order of group names matches key order.
    #[test]
    fn step_key_group_names_sort_like_keys(
        a in (0usize..99_999, 0usize..99_999),
        b in (0usize..99_999, 0usize..99_999),
    ) {
        let ka = StepKey::new(a.0, a.1);
        let kb = StepKey::new(b.0, b.1);
        prop_assert_eq!(ka.cmp(&kb), ka.group_name().cmp(&kb.group_name()));
    }

    /// User node count is layers times cells per layer.
    #[test]
    fn structured_nodes_user(nlay in 1usize..10, nrow in 1usize..50, ncol in 1usize..50) {
        let topo = GridTopology::Structured { nlay, nrow, ncol };
        prop_assert_eq!(topo.nodes_user(), nlay * nrow * ncol);
        prop_assert_eq!(topo.ncpl(), nrow * ncol);
    }
}
