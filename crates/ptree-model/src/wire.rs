//! Storage wire shape
//!
//! Stored nodes carry `position`, `changes` and `feedback` as JSON text.
//! Encoding then decoding a node yields the same node.

use crate::error::ModelError;
use crate::ids::{EdgeId, NodeId, TreeId};
use crate::node::{Change, Feedback, Node, Position};
use crate::tree::{Edge, Tree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node type tag written for every stored node
pub const NODE_TYPE: &str = "promptNode";

/// A node as it crosses the storage boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: String,
    /// JSON object `{"x":..,"y":..}`
    pub position: String,
    pub text: String,
    pub analysis: Option<String>,
    /// JSON array of changes
    pub changes: String,
    /// JSON array of feedback records
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

impl StoredNode {
    pub fn encode(node: &Node) -> Result<Self, ModelError> {
        Ok(Self {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
            node_type: NODE_TYPE.to_string(),
            position: serde_json::to_string(&node.position).map_err(|e| ModelError::wire("position", &e))?,
            text: node.text.clone(),
            analysis: (!node.analysis.is_empty()).then(|| node.analysis.clone()),
            changes: serde_json::to_string(&node.changes).map_err(|e| ModelError::wire("changes", &e))?,
            feedback: serde_json::to_string(&node.feedback).map_err(|e| ModelError::wire("feedback", &e))?,
            created_at: node.created_at,
        })
    }

    pub fn decode(&self) -> Result<Node, ModelError> {
        let position: Position =
            serde_json::from_str(&self.position).map_err(|e| ModelError::wire("position", &e))?;
        let changes: Vec<Change> =
            serde_json::from_str(&self.changes).map_err(|e| ModelError::wire("changes", &e))?;
        let feedback: Vec<Feedback> =
            serde_json::from_str(&self.feedback).map_err(|e| ModelError::wire("feedback", &e))?;

        Ok(Node {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            text: self.text.clone(),
            analysis: self.analysis.clone().unwrap_or_default(),
            changes,
            feedback,
            created_at: self.created_at,
            position,
        })
    }
}

/// An edge as it crosses the storage boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl From<&Edge> for StoredEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
        }
    }
}

impl From<StoredEdge> for Edge {
    fn from(edge: StoredEdge) -> Self {
        Self {
            id: edge.id,
            source: edge.source,
            target: edge.target,
        }
    }
}

/// A persisted tree with its full node and edge set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTree {
    pub id: TreeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub nodes: Vec<StoredNode>,
    pub edges: Vec<StoredEdge>,
}

impl StoredTree {
    /// Decode into an in-memory tree, keeping stored order
    pub fn to_tree(&self) -> Result<Tree, ModelError> {
        let nodes = self
            .nodes
            .iter()
            .map(StoredNode::decode)
            .collect::<Result<Vec<_>, _>>()?;
        let edges = self.edges.iter().cloned().map(Edge::from).collect();
        Ok(Tree::from_parts(Some(self.id.clone()), self.name.clone(), nodes, edges))
    }

    #[must_use]
    pub fn summary(&self) -> TreeSummary {
        TreeSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}

/// Listing entry for a stored tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSummary {
    pub id: TreeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_node() -> Node {
        let mut node = Node::root("Summarize this article");
        node.analysis = "tighter".into();
        node.changes = vec![Change::new("shorter", "reader asked")];
        node.add_feedback("too verbose");
        node.position = Position::new(120.5, -40.0);
        node
    }

    #[test]
    fn node_round_trips_through_wire() {
        let node = sample_node();
        let stored = StoredNode::encode(&node).unwrap();
        assert_eq!(stored.node_type, NODE_TYPE);
        assert_eq!(stored.decode().unwrap(), node);
    }

    #[test]
    fn empty_analysis_is_stored_as_null() {
        let node = Node::root("x");
        let stored = StoredNode::encode(&node).unwrap();
        assert_eq!(stored.analysis, None);
        assert_eq!(stored.decode().unwrap().analysis, "");
    }

    #[test]
    fn corrupt_field_is_a_wire_error() {
        let mut stored = StoredNode::encode(&sample_node()).unwrap();
        stored.changes = "{not json".into();
        assert!(matches!(
            stored.decode(),
            Err(ModelError::Wire { field: "changes", .. })
        ));
    }

    #[test]
    fn stored_node_json_field_names() {
        let stored = StoredNode::encode(&sample_node()).unwrap();
        let value = serde_json::to_value(&stored).unwrap();
        for key in ["id", "parentId", "type", "position", "text", "analysis", "changes", "feedback", "createdAt"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    proptest! {
        #[test]
        fn prop_text_fields_round_trip(
            text in "\\PC{1,40}",
            analysis in "\\PC{0,40}",
            description in "\\PC{0,20}",
            x in -100_000i32..100_000,
            y in -100_000i32..100_000,
        ) {
            let mut node = Node::root(text);
            node.analysis = analysis;
            node.changes = vec![Change::new(description, "why")];
            node.add_feedback("note \"quoted\"");
            node.position = Position::new(f64::from(x) / 2.0, f64::from(y) / 2.0);

            let decoded = StoredNode::encode(&node).unwrap().decode().unwrap();
            prop_assert_eq!(decoded, node);
        }
    }
}
