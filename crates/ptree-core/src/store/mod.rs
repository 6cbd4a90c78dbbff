//! Persistence collaborator
//!
//! Stores re-identify every tree they write (see
//! [`IdentityRemapper`](ptree_kernel::IdentityRemapper)) and replace a
//! tree's full node and edge set in one step, so readers see either the
//! old tree or the new one. Tenancy is by organisation.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ptree_kernel::{verify_ownership, IdentityRemapper};
use ptree_model::{Edge, Node, NodeId, StoredEdge, StoredNode, StoredTree, TreeId, TreeSummary};
use serde::{Deserialize, Serialize};

/// Caller identity for tenant-scoped storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub user_id: String,
    pub org_id: String,
}

impl Tenant {
    #[must_use]
    pub fn new(user_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: org_id.into(),
        }
    }
}

/// Tree persistence
///
/// Writes return the stored tree with its nodes in the order they were
/// given: `returned.nodes[i]` is the stored form of `nodes[i]`. Callers
/// pair their own ids with the stored ones by position.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Persist a new tree under fresh identities
    async fn create_tree(&self, tenant: &Tenant, name: &str, nodes: &[Node], edges: &[Edge]) -> Result<StoredTree>;

    /// Replace the full node and edge set of an existing tree
    ///
    /// Fails with [`CoreError::Unauthorized`] if any incoming node is
    /// already stored under another tenant.
    async fn replace_tree(
        &self,
        tenant: &Tenant,
        id: &TreeId,
        name: &str,
        nodes: &[Node],
        edges: &[Edge],
    ) -> Result<StoredTree>;

    async fn load_tree(&self, tenant: &Tenant, id: &TreeId) -> Result<StoredTree>;

    async fn delete_tree(&self, tenant: &Tenant, id: &TreeId) -> Result<()>;

    /// The tenant's trees, newest first
    async fn list_trees(&self, tenant: &Tenant) -> Result<Vec<TreeSummary>>;
}

/// Ownership check, remap and wire encoding shared by every store
pub(crate) fn prepare_write<F, T>(
    tenant: &Tenant,
    id: TreeId,
    name: &str,
    created_at: DateTime<Utc>,
    nodes: &[Node],
    edges: &[Edge],
    owner_of: F,
) -> Result<StoredTree>
where
    F: FnMut(&NodeId) -> Option<T>,
    T: AsRef<str>,
{
    verify_ownership(nodes.iter().map(|n| &n.id), &tenant.org_id, owner_of)?;
    let remapped = IdentityRemapper::new().remap(nodes, edges)?;

    let nodes = remapped
        .nodes
        .iter()
        .map(StoredNode::encode)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let edges = remapped.edges.iter().map(StoredEdge::from).collect();

    Ok(StoredTree {
        id,
        name: name.to_string(),
        created_at,
        nodes,
        edges,
    })
}

/// Newest first; equal timestamps fall back to id order
pub(crate) fn sort_newest_first(summaries: &mut [TreeSummary]) {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

pub(crate) fn foreign_tree(id: &TreeId) -> CoreError {
    CoreError::Unauthorized(format!("tree {id} belongs to another tenant"))
}

pub(crate) fn missing_tree(id: &TreeId) -> CoreError {
    CoreError::not_found(format!("tree {id}"))
}
