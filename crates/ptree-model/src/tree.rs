//! The tree aggregate
//!
//! A [`Tree`] is a single-root out-tree addressed by `parent_id`. Edges are
//! a redundant encoding of the parent relation; [`Tree::rebuild_edges`]
//! re-derives them and [`Tree::check_invariants`] verifies everything a
//! committed tree must satisfy.

use crate::error::{InvariantViolation, ModelError};
use crate::ids::{EdgeId, FeedbackId, NodeId, TreeId};
use crate::node::{Candidate, Feedback, Node};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Derived parent -> child link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    /// Link `parent` to `child` under a fresh edge id
    #[inline]
    #[must_use]
    pub fn link(parent: &NodeId, child: &NodeId) -> Self {
        Self {
            id: EdgeId::new(),
            source: parent.clone(),
            target: child.clone(),
        }
    }

    /// True when either endpoint is `node`
    #[inline]
    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// One prompt's improvement history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    /// `None` until the tree is first persisted
    #[serde(default)]
    pub id: Option<TreeId>,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Tree {
    /// Start a tree from the user's initial prompt
    pub fn from_prompt(text: impl Into<String>) -> Result<Self, ModelError> {
        let root = Node::root(text);
        if !root.has_text() {
            return Err(ModelError::EmptyText);
        }
        Ok(Self {
            id: None,
            name: String::new(),
            nodes: vec![root],
            edges: Vec::new(),
        })
    }

    /// Assemble a tree from already loaded parts
    #[must_use]
    pub fn from_parts(id: Option<TreeId>, name: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            edges,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// First node without a parent
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_root())
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// Direct children of `id`, in insertion order
    pub fn children<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_ref() == Some(id))
    }

    fn require_mut(&mut self, id: &NodeId) -> Result<&mut Node, ModelError> {
        self.node_mut(id)
            .ok_or_else(|| ModelError::NodeNotFound(id.clone()))
    }

    /// Attach parsed candidates as children of `parent`, one edge each
    ///
    /// All-or-nothing: if any candidate has blank text the tree is left
    /// untouched.
    pub fn attach_candidates(
        &mut self,
        parent: &NodeId,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<NodeId>, ModelError> {
        if !self.contains(parent) {
            return Err(ModelError::NodeNotFound(parent.clone()));
        }
        if let Some(blank) = candidates.iter().find(|c| c.text.trim().is_empty()) {
            return Err(InvariantViolation::EmptyText(blank.id.clone()).into());
        }

        let mut attached = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let child = candidate.into_child(parent);
            self.edges.push(Edge::link(parent, &child.id));
            attached.push(child.id.clone());
            self.nodes.push(child);
        }
        Ok(attached)
    }

    /// Replace a node's text
    ///
    /// Blank text is accepted here; it is rejected when the tree is saved.
    pub fn edit_text(&mut self, id: &NodeId, text: impl Into<String>) -> Result<(), ModelError> {
        self.require_mut(id)?.text = text.into();
        Ok(())
    }

    pub fn add_feedback(&mut self, id: &NodeId, text: impl Into<String>) -> Result<FeedbackId, ModelError> {
        Ok(self.require_mut(id)?.add_feedback(text))
    }

    pub fn update_feedback(
        &mut self,
        id: &NodeId,
        feedback_id: &FeedbackId,
        text: impl Into<String>,
    ) -> Result<(), ModelError> {
        self.require_mut(id)?.update_feedback(feedback_id, text)
    }

    pub fn remove_feedback(&mut self, id: &NodeId, feedback_id: &FeedbackId) -> Result<Feedback, ModelError> {
        self.require_mut(id)?.remove_feedback(feedback_id)
    }

    /// Feedback left on the ancestors of `id`, nearest ancestor first
    #[must_use]
    pub fn inherited_feedback(&self, id: &NodeId) -> Vec<Feedback> {
        let mut inherited = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.node(id).and_then(|n| n.parent_id.as_ref());

        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = self.node(parent_id) else {
                break;
            };
            inherited.extend(parent.feedback.iter().cloned());
            current = parent.parent_id.as_ref();
        }
        inherited
    }

    /// `(parent, child)` pairs implied by the parent references
    #[must_use]
    pub fn derived_links(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .filter_map(|n| n.parent_id.as_ref().map(|p| (p.clone(), n.id.clone())))
            .collect()
    }

    /// Re-derive the edge set from parent references
    ///
    /// Edges whose `(source, target)` pair survives keep their id.
    pub fn rebuild_edges(&mut self) {
        let mut existing: HashMap<(NodeId, NodeId), EdgeId> = self
            .edges
            .drain(..)
            .map(|e| ((e.source, e.target), e.id))
            .collect();

        self.edges = self
            .derived_links()
            .into_iter()
            .map(|(source, target)| {
                let id = existing
                    .remove(&(source.clone(), target.clone()))
                    .unwrap_or_default();
                Edge { id, source, target }
            })
            .collect();
    }

    /// Verify every invariant of a committed tree
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let roots: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.is_root())
            .map(|n| n.id.clone())
            .collect();
        match roots.len() {
            0 => return Err(InvariantViolation::NoRoot),
            1 => {}
            _ => return Err(InvariantViolation::MultipleRoots(roots)),
        }

        let mut parents: HashMap<&NodeId, Option<&NodeId>> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if parents.insert(&node.id, node.parent_id.as_ref()).is_some() {
                return Err(InvariantViolation::DuplicateNode(node.id.clone()));
            }
        }

        for node in &self.nodes {
            if let Some(parent) = &node.parent_id {
                if !parents.contains_key(parent) {
                    return Err(InvariantViolation::DanglingParent {
                        node: node.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        // A chain longer than the node count must revisit a node.
        for node in &self.nodes {
            let mut steps = 0usize;
            let mut current = node.parent_id.as_ref();
            while let Some(parent) = current {
                steps += 1;
                if steps > self.nodes.len() {
                    return Err(InvariantViolation::Cycle(node.id.clone()));
                }
                current = parents.get(parent).copied().flatten();
            }
        }

        let derived: HashSet<(&NodeId, &NodeId)> = self
            .nodes
            .iter()
            .filter_map(|n| n.parent_id.as_ref().map(|p| (p, &n.id)))
            .collect();
        let mut actual: HashSet<(&NodeId, &NodeId)> = HashSet::with_capacity(self.edges.len());
        let mut extra = 0usize;
        for edge in &self.edges {
            if !actual.insert((&edge.source, &edge.target)) {
                extra += 1;
            }
        }
        extra += actual.difference(&derived).count();
        let missing = derived.difference(&actual).count();
        if missing > 0 || extra > 0 {
            return Err(InvariantViolation::EdgeMismatch { missing, extra });
        }

        for node in &self.nodes {
            if !node.has_text() {
                return Err(InvariantViolation::EmptyText(node.id.clone()));
            }
            let mut seen = HashSet::with_capacity(node.feedback.len());
            for feedback in &node.feedback {
                if !seen.insert(&feedback.id) {
                    return Err(InvariantViolation::DuplicateFeedback {
                        node: node.id.clone(),
                        feedback: feedback.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Change;
    use pretty_assertions::assert_eq;

    fn candidates(n: usize) -> Vec<Candidate> {
        (1..=n)
            .map(|i| Candidate::new(format!("improvement {i}"), "analysis", vec![Change::new("d", "r")]))
            .collect()
    }

    #[test]
    fn singleton_tree_from_prompt() {
        let tree = Tree::from_prompt("Summarize this article").unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.edges.is_empty());
        assert!(tree.root().is_some());
        tree.check_invariants().unwrap();
    }

    #[test]
    fn blank_prompt_rejected() {
        assert_eq!(Tree::from_prompt("   "), Err(ModelError::EmptyText));
    }

    #[test]
    fn attach_candidates_adds_nodes_and_edges() {
        let mut tree = Tree::from_prompt("prompt").unwrap();
        let root = tree.root().unwrap().id.clone();

        let ids = tree.attach_candidates(&root, candidates(3)).unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.edges.len(), 3);
        assert_eq!(tree.children(&root).count(), 3);
        assert!(tree.root().unwrap().parent_id.is_none());
        tree.check_invariants().unwrap();
    }

    #[test]
    fn attach_to_missing_parent_leaves_tree_untouched() {
        let mut tree = Tree::from_prompt("prompt").unwrap();
        let before = tree.clone();

        let result = tree.attach_candidates(&NodeId::from_raw("ghost"), candidates(2));

        assert!(matches!(result, Err(ModelError::NodeNotFound(_))));
        assert_eq!(tree, before);
    }

    #[test]
    fn attach_blank_candidate_is_all_or_nothing() {
        let mut tree = Tree::from_prompt("prompt").unwrap();
        let root = tree.root().unwrap().id.clone();
        let mut batch = candidates(2);
        batch.push(Candidate::new(" ", "", vec![]));
        let before = tree.clone();

        assert!(tree.attach_candidates(&root, batch).is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn inherited_feedback_walks_ancestors() {
        let mut tree = Tree::from_prompt("prompt").unwrap();
        let root = tree.root().unwrap().id.clone();
        tree.add_feedback(&root, "too verbose").unwrap();
        let child = tree.attach_candidates(&root, candidates(1)).unwrap()[0].clone();
        tree.add_feedback(&child, "more formal").unwrap();
        let grandchild = tree.attach_candidates(&child, candidates(1)).unwrap()[0].clone();

        let inherited: Vec<String> = tree
            .inherited_feedback(&grandchild)
            .into_iter()
            .map(|f| f.text)
            .collect();
        assert_eq!(inherited, vec!["more formal".to_string(), "too verbose".to_string()]);
        assert!(tree.inherited_feedback(&root).is_empty());
    }

    #[test]
    fn rebuild_edges_keeps_surviving_ids() {
        let mut tree = Tree::from_prompt("prompt").unwrap();
        let root = tree.root().unwrap().id.clone();
        tree.attach_candidates(&root, candidates(2)).unwrap();
        let kept = tree.edges[0].id.clone();
        tree.edges.pop();
        tree.edges.push(Edge::link(&NodeId::from_raw("x"), &NodeId::from_raw("y")));

        tree.rebuild_edges();

        assert_eq!(tree.edges.len(), 2);
        assert_eq!(tree.edges[0].id, kept);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn invariant_checks_detect_breakage() {
        let mut tree = Tree::from_prompt("prompt").unwrap();
        let root = tree.root().unwrap().id.clone();
        let ids = tree.attach_candidates(&root, candidates(2)).unwrap();

        let mut no_edges = tree.clone();
        no_edges.edges.clear();
        assert_eq!(
            no_edges.check_invariants(),
            Err(InvariantViolation::EdgeMismatch { missing: 2, extra: 0 })
        );

        let mut dangling = tree.clone();
        dangling.node_mut(&ids[0]).unwrap().parent_id = Some(NodeId::from_raw("ghost"));
        assert!(matches!(
            dangling.check_invariants(),
            Err(InvariantViolation::DanglingParent { .. })
        ));

        let mut cyclic = tree.clone();
        cyclic.node_mut(&ids[0]).unwrap().parent_id = Some(ids[1].clone());
        cyclic.node_mut(&ids[1]).unwrap().parent_id = Some(ids[0].clone());
        cyclic.rebuild_edges();
        assert!(matches!(cyclic.check_invariants(), Err(InvariantViolation::Cycle(_))));

        let mut blank = tree.clone();
        blank.edit_text(&ids[1], "").unwrap();
        assert_eq!(blank.check_invariants(), Err(InvariantViolation::EmptyText(ids[1].clone())));

        let mut duplicate = tree;
        let fid = duplicate.add_feedback(&root, "a").unwrap();
        duplicate.node_mut(&root).unwrap().feedback.push(Feedback {
            id: fid,
            text: "b".into(),
        });
        assert!(matches!(
            duplicate.check_invariants(),
            Err(InvariantViolation::DuplicateFeedback { .. })
        ));
    }
}
