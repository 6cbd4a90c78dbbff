//! In-process store

use super::{foreign_tree, missing_tree, prepare_write, sort_newest_first, Tenant, TreeStore};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use ptree_model::{Edge, Node, NodeId, StoredTree, TreeId, TreeSummary};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
struct Record {
    owner: Tenant,
    tree: Arc<StoredTree>,
}

#[derive(Debug, Default)]
struct Inner {
    trees: HashMap<TreeId, Record>,
    /// node id -> owning organisation
    node_owners: HashMap<NodeId, String>,
}

impl Inner {
    fn index(&mut self, tree: &StoredTree, org: &str) {
        for node in &tree.nodes {
            self.node_owners.insert(node.id.clone(), org.to_string());
        }
    }

    fn unindex(&mut self, tree: &StoredTree) {
        for node in &tree.nodes {
            self.node_owners.remove(&node.id);
        }
    }
}

/// Store backed by a map; every write is a single swap under one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trees across all tenants
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().trees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn create_tree(&self, tenant: &Tenant, name: &str, nodes: &[Node], edges: &[Edge]) -> Result<StoredTree> {
        let mut inner = self.inner.write();
        let stored = prepare_write(tenant, TreeId::new(), name, Utc::now(), nodes, edges, |id| {
            inner.node_owners.get(id).cloned()
        })?;

        inner.index(&stored, &tenant.org_id);
        inner.trees.insert(
            stored.id.clone(),
            Record {
                owner: tenant.clone(),
                tree: Arc::new(stored.clone()),
            },
        );
        info!(tree_id = %stored.id, nodes = stored.nodes.len(), "tree created");
        Ok(stored)
    }

    async fn replace_tree(
        &self,
        tenant: &Tenant,
        id: &TreeId,
        name: &str,
        nodes: &[Node],
        edges: &[Edge],
    ) -> Result<StoredTree> {
        let mut inner = self.inner.write();
        let (created_at, previous) = match inner.trees.get(id) {
            None => return Err(missing_tree(id)),
            Some(record) if record.owner.org_id != tenant.org_id => return Err(foreign_tree(id)),
            Some(record) => (record.tree.created_at, Arc::clone(&record.tree)),
        };

        let stored = prepare_write(tenant, id.clone(), name, created_at, nodes, edges, |node| {
            inner.node_owners.get(node).cloned()
        })?;

        inner.unindex(&previous);
        inner.index(&stored, &tenant.org_id);
        inner.trees.insert(
            id.clone(),
            Record {
                owner: tenant.clone(),
                tree: Arc::new(stored.clone()),
            },
        );
        info!(tree_id = %id, nodes = stored.nodes.len(), "tree replaced");
        Ok(stored)
    }

    async fn load_tree(&self, tenant: &Tenant, id: &TreeId) -> Result<StoredTree> {
        let tree = {
            let inner = self.inner.read();
            match inner.trees.get(id) {
                None => return Err(missing_tree(id)),
                Some(record) if record.owner.org_id != tenant.org_id => return Err(foreign_tree(id)),
                Some(record) => Arc::clone(&record.tree),
            }
        };
        Ok(StoredTree::clone(&tree))
    }

    async fn delete_tree(&self, tenant: &Tenant, id: &TreeId) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.trees.get(id) {
            None => return Err(missing_tree(id)),
            Some(record) if record.owner.org_id != tenant.org_id => return Err(foreign_tree(id)),
            Some(_) => {}
        }
        if let Some(record) = inner.trees.remove(id) {
            inner.unindex(&record.tree);
        }
        info!(tree_id = %id, "tree deleted");
        Ok(())
    }

    async fn list_trees(&self, tenant: &Tenant) -> Result<Vec<TreeSummary>> {
        let mut summaries: Vec<TreeSummary> = self
            .inner
            .read()
            .trees
            .values()
            .filter(|r| r.owner.org_id == tenant.org_id)
            .map(|r| r.tree.summary())
            .collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}
