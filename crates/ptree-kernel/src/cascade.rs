//! Cascade delete
//!
//! The caller guarantees the target is not the root.

use ptree_model::{NodeId, Tree};
use std::collections::HashSet;
use tracing::debug;

/// What a cascade delete removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Removed node ids, target first
    pub removed_nodes: Vec<NodeId>,
    pub removed_edges: usize,
}

impl CascadeReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed_nodes.is_empty() && self.removed_edges == 0
    }
}

/// All descendants of `id`, expanded one level at a time
#[must_use]
pub fn collect_descendants(tree: &Tree, id: &NodeId) -> Vec<NodeId> {
    let mut seen: HashSet<&NodeId> = HashSet::from([id]);
    let mut descendants = Vec::new();
    let mut frontier = vec![id];

    while let Some(current) = frontier.pop() {
        for child in tree.children(current) {
            if seen.insert(&child.id) {
                descendants.push(child.id.clone());
                frontier.push(&child.id);
            }
        }
    }
    descendants
}

/// Remove `id`, its descendants, and every edge touching them
///
/// Deleting an id that is no longer present removes nothing.
pub fn delete_subtree(tree: &mut Tree, id: &NodeId) -> CascadeReport {
    if !tree.contains(id) {
        debug!(node_id = %id, "cascade delete of absent node is a no-op");
        return CascadeReport::default();
    }

    let mut removed_nodes = vec![id.clone()];
    removed_nodes.extend(collect_descendants(tree, id));
    let removal: HashSet<&NodeId> = removed_nodes.iter().collect();

    tree.nodes.retain(|n| !removal.contains(&n.id));
    let before = tree.edges.len();
    tree.edges
        .retain(|e| !removal.contains(&e.source) && !removal.contains(&e.target));
    let removed_edges = before - tree.edges.len();

    debug!(
        node_id = %id,
        nodes = removed_nodes.len(),
        edges = removed_edges,
        "cascade delete"
    );
    CascadeReport {
        removed_nodes,
        removed_edges,
    }
}
