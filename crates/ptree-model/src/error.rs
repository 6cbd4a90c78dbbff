//! Error types for the tree model

use crate::ids::{FeedbackId, NodeId};

/// Errors raised by tree mutations and wire decoding
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Node does not exist in the tree
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Feedback entry does not exist on the node
    #[error("feedback {feedback} not found on node {node}")]
    FeedbackNotFound { node: NodeId, feedback: FeedbackId },

    /// Prompt text is blank
    #[error("prompt text must not be empty")]
    EmptyText,

    /// A committed tree broke one of its structural invariants
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    /// A stored field could not be encoded or decoded
    #[error("wire field `{field}` is malformed: {message}")]
    Wire { field: &'static str, message: String },
}

impl ModelError {
    pub(crate) fn wire(field: &'static str, err: &serde_json::Error) -> Self {
        Self::Wire {
            field,
            message: err.to_string(),
        }
    }
}

/// Structural invariant violations, in the order they are checked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// No node has a null parent
    #[error("tree has no root")]
    NoRoot,

    /// More than one node has a null parent
    #[error("tree has {} roots", .0.len())]
    MultipleRoots(Vec<NodeId>),

    /// Two nodes share an identifier
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),

    /// A parent reference points outside the tree
    #[error("node {node} references missing parent {parent}")]
    DanglingParent { node: NodeId, parent: NodeId },

    /// Following parents from this node never reaches the root
    #[error("parent chain of {0} is cyclic")]
    Cycle(NodeId),

    /// Edge set differs from the set derived from parent references
    #[error("edges out of sync with parents: {missing} missing, {extra} extra")]
    EdgeMismatch { missing: usize, extra: usize },

    /// Node text is blank
    #[error("node {0} has empty text")]
    EmptyText(NodeId),

    /// Two feedback entries on one node share an identifier
    #[error("node {node} has duplicate feedback id {feedback}")]
    DuplicateFeedback { node: NodeId, feedback: FeedbackId },
}
