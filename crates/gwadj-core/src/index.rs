// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Spatial Index Resolver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Grid coordinates to canonical node numbers.
//!
//! Two numbering spaces exist. *User* nodes are dense over the whole grid
//! (`nlay * ncpl`, inactive cells included). *Reduced* nodes number only the
//! active cells, in the same order; the solver's linear system lives in
//! reduced space. [`NodeReduction`] maps between the two.

use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::{GridTopology, Lrc};

/// A zero-based cell address in the numbering scheme of its topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellCoordinate {
    Lrc(Lrc),
    LayerCell { layer: usize, cell: usize },
}

/// User node number of a cell, by the affine layout of the topology.
pub fn resolve_node(topology: &GridTopology, coord: &CellCoordinate) -> AdjResult<usize> {
    match (*topology, *coord) {
        (GridTopology::Structured { nlay, nrow, ncol }, CellCoordinate::Lrc(Lrc { k, i, j })) => {
            if k >= nlay || i >= nrow || j >= ncol {
                return Err(AdjError::NodeOutOfBounds(format!(
                    "(k={}, i={}, j={}) outside grid {}x{}x{}",
                    k + 1,
                    i + 1,
                    j + 1,
                    nlay,
                    nrow,
                    ncol
                )));
            }
            Ok(k * nrow * ncol + i * ncol + j)
        }
        (GridTopology::Unstructured { nlay, ncpl }, CellCoordinate::LayerCell { layer, cell }) => {
            if layer >= nlay || cell >= ncpl {
                return Err(AdjError::NodeOutOfBounds(format!(
                    "(layer={}, cell={}) outside grid of {} layers x {} cells",
                    layer + 1,
                    cell + 1,
                    nlay,
                    ncpl
                )));
            }
            Ok(ncpl * layer + cell)
        }
        (topo, c) => Err(AdjError::Config(format!(
            "coordinate {c:?} does not match grid topology {topo:?}"
        ))),
    }
}

/// Structured coordinate of a user node. `None` for unstructured grids.
pub fn node_to_lrc(topology: &GridTopology, node: usize) -> Option<Lrc> {
    match *topology {
        GridTopology::Structured { nrow, ncol, .. } => {
            let ncpl = nrow * ncol;
            let k = node / ncpl;
            let rem = node % ncpl;
            Some(Lrc {
                k,
                i: rem / ncol,
                j: rem % ncol,
            })
        }
        GridTopology::Unstructured { .. } => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReducedSlot {
    Inactive,
    Active(usize),
    Ambiguous(usize),
}

/// User-to-reduced node map.
///
/// Whether reduction is in effect is decided once, from node counts, when the
/// map is built; it is never inferred from the contents of `nodeuser`.
#[derive(Debug, Clone)]
pub struct NodeReduction {
    reduced: bool,
    nodes: usize,
    /// reduced -> user, zero-based. Empty when not reduced.
    nodeuser: Vec<usize>,
    /// user -> reduced slot. Empty when not reduced.
    user_to_reduced: Vec<ReducedSlot>,
}

impl NodeReduction {
    /// No inactive cells: reduced and user numbering coincide.
    pub fn identity(nodes: usize) -> Self {
        NodeReduction {
            reduced: false,
            nodes,
            nodeuser: Vec::new(),
            user_to_reduced: Vec::new(),
        }
    }

    /// Build from the solver's `NODEUSER` array (one-based user node per reduced node).
    ///
    /// Reduction is active iff the solver's node count is below the user node
    /// count of the topology.
    pub fn from_nodeuser(nodes_user: usize, nodes: usize, nodeuser: &[i64]) -> AdjResult<Self> {
        if nodes > nodes_user {
            return Err(AdjError::Config(format!(
                "solver reports {nodes} nodes but the grid has only {nodes_user} cells"
            )));
        }
        if nodes == nodes_user {
            return Ok(Self::identity(nodes));
        }
        if nodeuser.len() != nodes {
            return Err(AdjError::Config(format!(
                "NODEUSER has {} entries, expected one per reduced node ({nodes})",
                nodeuser.len()
            )));
        }

        let mut map = Vec::with_capacity(nodes);
        let mut user_to_reduced = vec![ReducedSlot::Inactive; nodes_user];
        for (reduced, &raw) in nodeuser.iter().enumerate() {
            if raw < 1 || raw as usize > nodes_user {
                return Err(AdjError::Config(format!(
                    "NODEUSER entry {raw} at reduced node {} outside 1..={nodes_user}",
                    reduced + 1
                )));
            }
            let user = raw as usize - 1;
            map.push(user);
            user_to_reduced[user] = match user_to_reduced[user] {
                ReducedSlot::Inactive => ReducedSlot::Active(reduced),
                ReducedSlot::Active(_) => ReducedSlot::Ambiguous(2),
                ReducedSlot::Ambiguous(n) => ReducedSlot::Ambiguous(n + 1),
            };
        }

        Ok(NodeReduction {
            reduced: true,
            nodes,
            nodeuser: map,
            user_to_reduced,
        })
    }

    pub fn is_reduced(&self) -> bool {
        self.reduced
    }

    /// Reduced (active) node count.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Reduced node of a user node; fails unless exactly one reduced node maps to it.
    pub fn to_reduced(&self, user: usize) -> AdjResult<usize> {
        if !self.reduced {
            if user < self.nodes {
                return Ok(user);
            }
            return Err(AdjError::IndexResolution {
                node: user,
                matches: 0,
            });
        }
        match self.user_to_reduced.get(user) {
            Some(ReducedSlot::Active(r)) => Ok(*r),
            Some(ReducedSlot::Ambiguous(n)) => Err(AdjError::IndexResolution {
                node: user,
                matches: *n,
            }),
            Some(ReducedSlot::Inactive) | None => Err(AdjError::IndexResolution {
                node: user,
                matches: 0,
            }),
        }
    }

    /// User node of a reduced node. Out-of-range input is returned unchanged.
    pub fn to_user(&self, reduced: usize) -> usize {
        if self.reduced {
            self.nodeuser.get(reduced).copied().unwrap_or(reduced)
        } else {
            reduced
        }
    }
}
