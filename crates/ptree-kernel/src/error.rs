//! Error types for the tree kernel

use ptree_model::NodeId;

/// Structural failures of kernel operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// No node without a parent; the tree has no valid state
    #[error("tree has no root node")]
    MissingRoot,

    /// A node being replaced belongs to another tenant
    #[error("node {node} is not owned by tenant {tenant}")]
    Unauthorized {
        /// Offending node
        node: NodeId,
        /// Tenant that attempted the replace
        tenant: String,
    },

    /// An edge or parent reference points outside the remapped set
    #[error("reference to unknown node {0}")]
    DanglingReference(NodeId),

    /// The edge set contains a cycle and cannot be ranked
    #[error("edge set is cyclic at node {0}")]
    Cyclic(NodeId),

    /// An edge endpoint is not in the node set being laid out
    #[error("edge endpoint {0} is not a known node")]
    UnknownEndpoint(NodeId),
}
