//! File-backed store
//!
//! One JSON document per tree under a root directory. Writes go to a
//! temp file that is then renamed over the target, so a reader opening the
//! file sees either the previous document or the new one.

use super::{foreign_tree, missing_tree, prepare_write, sort_newest_first, Tenant, TreeStore};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::Utc;
use ptree_model::{Edge, Node, NodeId, StoredTree, TreeId, TreeSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const EXTENSION: &str = "json";

/// What a directory scan does with a file it cannot read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unreadable {
    Skip,
    Fail,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    owner: Tenant,
    tree: StoredTree,
}

/// Store writing one JSON file per tree
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "opened file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &TreeId) -> Result<PathBuf> {
        let raw = id.as_str();
        let safe = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(CoreError::not_found(format!("tree {id}")));
        }
        Ok(self.root.join(format!("{raw}.{EXTENSION}")))
    }

    async fn read(&self, path: &Path) -> Result<Option<Document>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_owned(&self, tenant: &Tenant, id: &TreeId) -> Result<Document> {
        let document = self
            .read(&self.path_for(id)?)
            .await?
            .ok_or_else(|| missing_tree(id))?;
        if document.owner.org_id != tenant.org_id {
            return Err(foreign_tree(id));
        }
        Ok(document)
    }

    /// Every document in the store
    async fn scan(&self, unreadable: Unreadable) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => {}
                Err(err) if unreadable == Unreadable::Skip => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable tree file");
                }
                Err(err) => {
                    error!(path = %path.display(), error = %err, "unreadable tree file");
                    return Err(err);
                }
            }
        }
        Ok(documents)
    }

    /// Owning organisation of every stored node
    ///
    /// A file that cannot be read could hide any owner, so it fails the
    /// lookup instead of being skipped.
    async fn node_owners(&self) -> Result<HashMap<NodeId, String>> {
        Ok(self
            .scan(Unreadable::Fail)
            .await?
            .into_iter()
            .flat_map(|doc| {
                let org = doc.owner.org_id;
                doc.tree
                    .nodes
                    .into_iter()
                    .map(move |n| (n.id, org.clone()))
            })
            .collect())
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let path = self.path_for(&document.tree.id)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let body = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl TreeStore for FileStore {
    async fn create_tree(&self, tenant: &Tenant, name: &str, nodes: &[Node], edges: &[Edge]) -> Result<StoredTree> {
        let _guard = self.write_lock.lock().await;
        let owners = self.node_owners().await?;
        let tree = prepare_write(tenant, TreeId::new(), name, Utc::now(), nodes, edges, |id| owners.get(id))?;

        let document = Document {
            owner: tenant.clone(),
            tree,
        };
        self.write(&document).await?;
        info!(tree_id = %document.tree.id, nodes = document.tree.nodes.len(), "tree created");
        Ok(document.tree)
    }

    async fn replace_tree(
        &self,
        tenant: &Tenant,
        id: &TreeId,
        name: &str,
        nodes: &[Node],
        edges: &[Edge],
    ) -> Result<StoredTree> {
        let _guard = self.write_lock.lock().await;
        let previous = self.read_owned(tenant, id).await?;
        let owners = self.node_owners().await?;
        let tree = prepare_write(
            tenant,
            id.clone(),
            name,
            previous.tree.created_at,
            nodes,
            edges,
            |node| owners.get(node),
        )?;

        let document = Document {
            owner: tenant.clone(),
            tree,
        };
        self.write(&document).await?;
        info!(tree_id = %id, nodes = document.tree.nodes.len(), "tree replaced");
        Ok(document.tree)
    }

    async fn load_tree(&self, tenant: &Tenant, id: &TreeId) -> Result<StoredTree> {
        Ok(self.read_owned(tenant, id).await?.tree)
    }

    async fn delete_tree(&self, tenant: &Tenant, id: &TreeId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.read_owned(tenant, id).await?;
        tokio::fs::remove_file(self.path_for(id)?).await?;
        info!(tree_id = %id, "tree deleted");
        Ok(())
    }

    async fn list_trees(&self, tenant: &Tenant) -> Result<Vec<TreeSummary>> {
        let mut summaries: Vec<TreeSummary> = self
            .scan(Unreadable::Skip)
            .await?
            .iter()
            .filter(|doc| doc.owner.org_id == tenant.org_id)
            .map(|doc| doc.tree.summary())
            .collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptree_model::{Candidate, Tree};

    fn tree_with_child() -> Tree {
        let mut tree = Tree::from_prompt("R").unwrap();
        let root = tree.root().unwrap().id.clone();
        tree.attach_candidates(&root, vec![Candidate::new("C", "", Vec::new())])
            .unwrap();
        tree
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = Tenant::new("u", "acme");
        let tree = tree_with_child();

        let stored = {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.create_tree(&tenant, "t", &tree.nodes, &tree.edges).await.unwrap()
        };

        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.load_tree(&tenant, &stored.id).await.unwrap(), stored);
        assert!(!dir.path().join(format!("{}.json.tmp", stored.id)).exists());
    }

    #[tokio::test]
    async fn replace_keeps_creation_time_and_reidentifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let tenant = Tenant::new("u", "acme");
        let tree = tree_with_child();

        let first = store.create_tree(&tenant, "t", &tree.nodes, &tree.edges).await.unwrap();
        let reloaded = first.to_tree().unwrap();
        let second = store
            .replace_tree(&tenant, &first.id, "renamed", &reloaded.nodes, &reloaded.edges)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.name, "renamed");
        assert_ne!(second.nodes[0].id, first.nodes[0].id);
    }

    #[tokio::test]
    async fn unreadable_file_blocks_writes_but_not_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let tenant = Tenant::new("u", "acme");
        let tree = tree_with_child();
        let kept = store.create_tree(&tenant, "kept", &tree.nodes, &tree.edges).await.unwrap();
        tokio::fs::write(dir.path().join("garbage.json"), "{ not a tree").await.unwrap();

        let fresh = Tree::from_prompt("new").unwrap();
        assert!(store.create_tree(&tenant, "new", &fresh.nodes, &fresh.edges).await.is_err());
        let reloaded = kept.to_tree().unwrap();
        assert!(store
            .replace_tree(&tenant, &kept.id, "kept", &reloaded.nodes, &reloaded.edges)
            .await
            .is_err());

        assert_eq!(store.load_tree(&tenant, &kept.id).await.unwrap(), kept);
        let listed = store.list_trees(&tenant).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "kept");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn written_nodes_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let tenant = Tenant::new("u", "acme");
        let mut tree = tree_with_child();
        let root = tree.root().unwrap().id.clone();
        tree.attach_candidates(&root, vec![Candidate::new("D", "", Vec::new())])
            .unwrap();

        let stored = store.create_tree(&tenant, "t", &tree.nodes, &tree.edges).await.unwrap();
        let texts: Vec<_> = stored.to_tree().unwrap().nodes.into_iter().map(|n| n.text).collect();
        assert_eq!(texts, vec!["R", "C", "D"]);
    }

    #[tokio::test]
    async fn hostile_ids_never_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let tenant = Tenant::new("u", "acme");
        assert!(matches!(
            store.load_tree(&tenant, &TreeId::from_raw("../etc/passwd")).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_is_tenant_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let tree = tree_with_child();
        store
            .create_tree(&Tenant::new("u", "acme"), "a", &tree.nodes, &tree.edges)
            .await
            .unwrap();
        let theirs = tree_with_child();
        store
            .create_tree(&Tenant::new("v", "other"), "b", &theirs.nodes, &theirs.edges)
            .await
            .unwrap();

        let listed = store.list_trees(&Tenant::new("u", "acme")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
    }
}
