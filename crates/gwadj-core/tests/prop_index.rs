// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Property-Based Tests (proptest) for gwadj-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for index resolution and spec parsing.

use gwadj_core::index::{node_to_lrc, resolve_node, CellCoordinate, NodeReduction};
use gwadj_core::manifest::PackageRegistry;
use gwadj_core::spec_file::{parse_adj_spec, SpecContext};
use gwadj_types::error::AdjError;
use gwadj_types::state::{GridTopology, Lrc};
use proptest::prelude::*;

// ── Index Resolver ───────────────────────────────────────────────────

proptest! {
    /// Without reduction, resolve + to_reduced is the affine formula and
    /// node_to_lrc inverts it.
    #[test]
    fn structured_formula_and_inverse(
        nlay in 1usize..6, nrow in 1usize..40, ncol in 1usize..40,
        fk in 0.0f64..1.0, fi in 0.0f64..1.0, fj in 0.0f64..1.0,
    ) {
        let topo = GridTopology::Structured { nlay, nrow, ncol };
        let k = ((nlay as f64) * fk) as usize % nlay;
        let i = ((nrow as f64) * fi) as usize % nrow;
        let j = ((ncol as f64) * fj) as usize % ncol;
        let user = resolve_node(&topo, &CellCoordinate::Lrc(Lrc { k, i, j })).unwrap();
        let reduction = NodeReduction::identity(topo.nodes_user());
        prop_assert_eq!(reduction.to_reduced(user).unwrap(), k * nrow * ncol + i * ncol + j);
        prop_assert_eq!(node_to_lrc(&topo, user), Some(Lrc { k, i, j }));
    }

    /// Coordinates outside the grid never resolve.
    #[test]
    fn out_of_grid_rejected(nlay in 1usize..4, nrow in 1usize..20, ncol in 1usize..20, over in 0usize..5) {
        let topo = GridTopology::Structured { nlay, nrow, ncol };
        let coord = CellCoordinate::Lrc(Lrc { k: 0, i: nrow + over, j: 0 });
        let is_oob = matches!(resolve_node(&topo, &coord), Err(AdjError::NodeOutOfBounds(_)));
        prop_assert!(is_oob);
    }

    /// Every active user node maps to the reduced node that lists it, and back.
    #[test]
    fn reduction_roundtrip(nodes_user in 2usize..200, stride in 2usize..7) {
        let nodeuser: Vec<i64> = (1..=nodes_user as i64)
            .filter(|n| (*n as usize) % stride != 0)
            .collect();
        prop_assume!(!nodeuser.is_empty() && nodeuser.len() < nodes_user);
        let red = NodeReduction::from_nodeuser(nodes_user, nodeuser.len(), &nodeuser).unwrap();
        prop_assert!(red.is_reduced());
        for (r, &u) in nodeuser.iter().enumerate() {
            let user = u as usize - 1;
            prop_assert_eq!(red.to_reduced(user).unwrap(), r);
            prop_assert_eq!(red.to_user(r), user);
        }
        for user in (stride - 1..nodes_user).step_by(stride) {
            prop_assert!(red.to_reduced(user).is_err());
        }
    }
}

// ── Spec Parser ──────────────────────────────────────────────────────

proptest! {
    /// N well-formed blocks give N uniform measures with lower-cased names.
    #[test]
    fn n_blocks_give_n_measures(n in 1usize..8, records in 1usize..6) {
        let topology = GridTopology::Structured { nlay: 1, nrow: 10, ncol: 10 };
        let reduction = NodeReduction::identity(100);
        let packages = PackageRegistry::default();
        let ctx = SpecContext { topology, reduction: &reduction, packages: &packages };

        let mut text = String::new();
        for b in 0..n {
            text.push_str(&format!("BEGIN performance_measure PM{b}\n"));
            for r in 0..records {
                text.push_str(&format!("  1 1 1 {} {} head residual 1.0 {}.5\n", r + 1, b + 1, r));
            }
            text.push_str("END performance_measure\n");
        }
        let spec = parse_adj_spec(&text, &ctx).unwrap();
        prop_assert_eq!(spec.measures.len(), n);
        for (b, pm) in spec.measures.iter().enumerate() {
            let expected = format!("pm{}", b);
            prop_assert_eq!(pm.name(), expected.as_str());
            prop_assert_eq!(pm.records().len(), records);
            prop_assert!(pm.records().iter().all(|r| r.form == pm.form() && r.kind == *pm.kind()));
        }
    }
}
