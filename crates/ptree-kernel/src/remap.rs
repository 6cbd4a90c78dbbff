//! Identity remapper
//!
//! Every save re-identifies the whole tree. Pass one mints a new id for
//! every node; pass two rewrites nodes and edges against the finished
//! mapping. The passes never interleave.

use crate::error::KernelError;
use ptree_model::{Edge, EdgeId, Node, NodeId};
use std::collections::HashMap;
use tracing::debug;

/// A re-identified node and edge set, plus the mapping that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Remapped {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// old id -> new id
    pub mapping: HashMap<NodeId, NodeId>,
}

impl Remapped {
    /// New id for an old one
    #[must_use]
    pub fn resolve(&self, old: &NodeId) -> Option<&NodeId> {
        self.mapping.get(old)
    }
}

/// Two-pass re-identification of a node and edge set
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRemapper;

impl IdentityRemapper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Re-identify `nodes` and regenerate `edges` against the new ids
    ///
    /// A parent or edge endpoint outside `nodes` is a
    /// [`KernelError::DanglingReference`]; nothing is produced in that case.
    pub fn remap(&self, nodes: &[Node], edges: &[Edge]) -> Result<Remapped, KernelError> {
        // Pass 1: complete mapping before any rewrite.
        let mapping: HashMap<NodeId, NodeId> = nodes
            .iter()
            .map(|n| (n.id.clone(), NodeId::new()))
            .collect();

        let lookup = |old: &NodeId| {
            mapping
                .get(old)
                .cloned()
                .ok_or_else(|| KernelError::DanglingReference(old.clone()))
        };

        // Pass 2: nodes and edges, independently.
        let remapped_nodes = nodes
            .iter()
            .map(|node| {
                let mut out = node.clone();
                out.id = lookup(&node.id)?;
                out.parent_id = node.parent_id.as_ref().map(lookup).transpose()?;
                Ok(out)
            })
            .collect::<Result<Vec<_>, KernelError>>()?;

        let remapped_edges = edges
            .iter()
            .map(|edge| {
                Ok(Edge {
                    id: EdgeId::new(),
                    source: lookup(&edge.source)?,
                    target: lookup(&edge.target)?,
                })
            })
            .collect::<Result<Vec<_>, KernelError>>()?;

        debug!(
            nodes = remapped_nodes.len(),
            edges = remapped_edges.len(),
            "remapped tree identities"
        );
        Ok(Remapped {
            nodes: remapped_nodes,
            edges: remapped_edges,
            mapping,
        })
    }
}

/// Check that no node in `nodes` belongs to a tenant other than `tenant`
///
/// `owner_of` reports the owning tenant of an already stored node, or
/// `None` for a node the store has never seen (a new node, always allowed).
/// The first foreign node aborts the check.
pub fn verify_ownership<'a, I, F, T>(nodes: I, tenant: &str, mut owner_of: F) -> Result<(), KernelError>
where
    I: IntoIterator<Item = &'a NodeId>,
    F: FnMut(&NodeId) -> Option<T>,
    T: AsRef<str>,
{
    for node in nodes {
        if let Some(owner) = owner_of(node) {
            if owner.as_ref() != tenant {
                return Err(KernelError::Unauthorized {
                    node: node.clone(),
                    tenant: tenant.to_string(),
                });
            }
        }
    }
    Ok(())
}
