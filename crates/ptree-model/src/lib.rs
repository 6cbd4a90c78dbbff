//! ptree model - prompt refinement trees
//!
//! The canonical entities of a refinement tree:
//! - [`Node`]: one version of a prompt with its analysis, changes and feedback
//! - [`Edge`]: parent -> child link, always derived from `parent_id`
//! - [`Tree`]: the aggregate, with invariant checking
//! - [`Candidate`]: a parsed rewrite not yet attached to a tree
//!
//! The [`wire`] module holds the storage shape where structured fields
//! travel as JSON text.

#![warn(unreachable_pub)]

pub mod error;
pub mod ids;
pub mod node;
pub mod tree;
pub mod wire;

pub use error::{InvariantViolation, ModelError};
pub use ids::{EdgeId, FeedbackId, NodeId, TreeId};
pub use node::{Candidate, Change, Feedback, Node, Position};
pub use tree::{Edge, Tree};
pub use wire::{StoredEdge, StoredNode, StoredTree, TreeSummary, NODE_TYPE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
