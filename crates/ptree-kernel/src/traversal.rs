//! Traversal engine
//!
//! Breadth-first materialization of a flat node set from its unique root.
//! The output order (root, then each generation in input order) is relied
//! on by persistence and by layout tie-breaking.

use crate::error::KernelError;
use ptree_model::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// What to do with nodes unreachable from the root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Exclude and report
    #[default]
    Drop,
    /// Re-attach nodes whose parent is absent to the root, then retry
    Reparent,
}

/// Why a node was not reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    /// The declared parent is not in the set
    DanglingParent,
    /// The parent exists but is itself unreachable
    BrokenChain,
    /// A second parentless node
    ExtraRoot,
}

/// A node excluded from the materialized tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orphan {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub reason: OrphanReason,
}

/// Result of a materialization
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    /// Reachable nodes in BFS order
    pub nodes: Vec<Node>,
    pub orphans: Vec<Orphan>,
    /// Nodes re-attached to the root under [`OrphanPolicy::Reparent`]
    pub reparented: Vec<NodeId>,
}

impl Materialized {
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.reparented.is_empty()
    }

    /// Ids of every materialized node
    #[must_use]
    pub fn ids(&self) -> HashSet<&NodeId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }
}

/// The first node without a parent
pub fn find_root(nodes: &[Node]) -> Result<&Node, KernelError> {
    nodes
        .iter()
        .find(|n| n.is_root())
        .ok_or(KernelError::MissingRoot)
}

/// Node indices in BFS order from `root`, children in input order
fn bfs_order(nodes: &[Node], root: usize) -> Vec<usize> {
    let mut children: HashMap<&NodeId, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if let Some(parent) = &node.parent_id {
            children.entry(parent).or_default().push(index);
        }
    }

    let mut visited: HashSet<&NodeId> = HashSet::with_capacity(nodes.len());
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue = VecDeque::from([root]);
    visited.insert(&nodes[root].id);

    while let Some(current) = queue.pop_front() {
        order.push(current);
        if let Some(kids) = children.get(&nodes[current].id) {
            for &kid in kids {
                if visited.insert(&nodes[kid].id) {
                    queue.push_back(kid);
                }
            }
        }
    }
    order
}

/// Materialize a flat node set into BFS order from its root
///
/// Fails only when there is no root. Unreached nodes are reported as
/// orphans and, under [`OrphanPolicy::Reparent`], first given a second
/// chance by hanging them off the root.
pub fn materialize(nodes: &[Node], policy: OrphanPolicy) -> Result<Materialized, KernelError> {
    let root_index = nodes
        .iter()
        .position(Node::is_root)
        .ok_or(KernelError::MissingRoot)?;

    let mut working: Vec<Node> = nodes.to_vec();
    let mut reparented = Vec::new();

    if policy == OrphanPolicy::Reparent {
        let known: HashSet<NodeId> = working.iter().map(|n| n.id.clone()).collect();
        let root_id = working[root_index].id.clone();
        for (index, node) in working.iter_mut().enumerate() {
            let absent_parent = node.parent_id.as_ref().is_some_and(|p| !known.contains(p));
            let extra_root = node.parent_id.is_none() && index != root_index;
            if absent_parent || extra_root {
                debug!(node_id = %node.id, root_id = %root_id, "re-attaching orphan to root");
                node.parent_id = Some(root_id.clone());
                reparented.push(node.id.clone());
            }
        }
    }

    let order = bfs_order(&working, root_index);
    let reached: HashSet<usize> = order.iter().copied().collect();
    let known: HashSet<&NodeId> = working.iter().map(|n| &n.id).collect();

    let orphans: Vec<Orphan> = working
        .iter()
        .enumerate()
        .filter(|(index, _)| !reached.contains(index))
        .map(|(_, node)| {
            let reason = match &node.parent_id {
                None => OrphanReason::ExtraRoot,
                Some(parent) if !known.contains(parent) => OrphanReason::DanglingParent,
                Some(_) => OrphanReason::BrokenChain,
            };
            Orphan {
                id: node.id.clone(),
                parent_id: node.parent_id.clone(),
                reason,
            }
        })
        .collect();

    for orphan in &orphans {
        warn!(
            node_id = %orphan.id,
            parent_id = ?orphan.parent_id,
            reason = ?orphan.reason,
            "orphan excluded from tree"
        );
    }

    let reparented = reparented
        .into_iter()
        .filter(|id| !orphans.iter().any(|o| &o.id == id))
        .collect();

    let nodes = order.into_iter().map(|index| working[index].clone()).collect();
    Ok(Materialized {
        nodes,
        orphans,
        reparented,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(id: &str, parent: Option<&str>) -> Node {
        let mut n = Node::root(format!("text {id}"));
        n.id = NodeId::from_raw(id);
        n.parent_id = parent.map(NodeId::from_raw);
        n
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn missing_root_is_fatal() {
        let nodes = vec![node("a", Some("b")), node("b", Some("a"))];
        assert_eq!(materialize(&nodes, OrphanPolicy::Drop), Err(KernelError::MissingRoot));
        assert_eq!(find_root(&[]).err(), Some(KernelError::MissingRoot));
    }

    #[test]
    fn bfs_order_is_by_generation_then_input_order() {
        // Input deliberately out of order.
        let nodes = vec![
            node("c1", Some("b")),
            node("b", Some("r")),
            node("r", None),
            node("a", Some("r")),
            node("a1", Some("a")),
        ];
        let m = materialize(&nodes, OrphanPolicy::Drop).unwrap();
        assert_eq!(ids(&m.nodes), vec!["r", "b", "a", "c1", "a1"]);
        assert!(m.is_clean());
    }

    #[test]
    fn orphans_are_reported_with_reason() {
        let nodes = vec![
            node("r", None),
            node("x", Some("ghost")),
            node("y", Some("x")),
            node("r2", None),
        ];
        let m = materialize(&nodes, OrphanPolicy::Drop).unwrap();
        assert_eq!(ids(&m.nodes), vec!["r"]);

        let reasons: Vec<(&str, OrphanReason)> =
            m.orphans.iter().map(|o| (o.id.as_str(), o.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("x", OrphanReason::DanglingParent),
                ("y", OrphanReason::BrokenChain),
                ("r2", OrphanReason::ExtraRoot),
            ]
        );
    }

    #[test]
    fn reparent_policy_rescues_dangling_subtrees() {
        let nodes = vec![node("r", None), node("x", Some("ghost")), node("y", Some("x"))];
        let m = materialize(&nodes, OrphanPolicy::Reparent).unwrap();
        assert_eq!(ids(&m.nodes), vec!["r", "x", "y"]);
        assert!(m.orphans.is_empty());
        assert_eq!(m.reparented, vec![NodeId::from_raw("x")]);
        assert_eq!(m.nodes[1].parent_id, Some(NodeId::from_raw("r")));
    }

    #[test]
    fn reparent_policy_still_drops_cycles() {
        let nodes = vec![node("r", None), node("p", Some("q")), node("q", Some("p"))];
        let m = materialize(&nodes, OrphanPolicy::Reparent).unwrap();
        assert_eq!(ids(&m.nodes), vec!["r"]);
        assert_eq!(m.orphans.len(), 2);
        assert!(m.orphans.iter().all(|o| o.reason == OrphanReason::BrokenChain));
    }
}
