//! Tree sessions
//!
//! A [`Workspace`] bundles the collaborators for one tenant. A
//! [`TreeSession`] owns one in-memory tree and runs every user action
//! against it as a single unit of work: the tree is mutated on a copy
//! and only committed once the whole action (including any save it
//! triggers) has succeeded.
//!
//! Selection and other presentation state never live here; every
//! operation takes the node it acts on as an argument.

use crate::autosave::Debouncer;
use crate::config::PtreeConfig;
use crate::error::{CoreError, Result};
use crate::gate::MutationGate;
use crate::generator::{Generator, SamplingParams};
use crate::naming;
use crate::store::{Tenant, TreeStore};
use ptree_kernel::{delete_subtree, materialize, CascadeReport, LayoutEngine, Orphan};
use ptree_model::{Feedback, FeedbackId, NodeId, Tree, TreeId, TreeSummary};
use ptree_parser::ResponseParser;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every session of one tenant
#[derive(Clone)]
pub struct Workspace {
    tenant: Tenant,
    config: Arc<PtreeConfig>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn TreeStore>,
    gate: Arc<MutationGate>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("tenant", &self.tenant)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(
        tenant: Tenant,
        config: PtreeConfig,
        generator: Arc<dyn Generator>,
        store: Arc<dyn TreeStore>,
    ) -> Self {
        Self {
            tenant,
            config: Arc::new(config),
            generator,
            store,
            gate: Arc::new(MutationGate::new()),
        }
    }

    /// Share a gate with other workspaces over the same store
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<MutationGate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    #[must_use]
    pub fn config(&self) -> &PtreeConfig {
        &self.config
    }

    /// Start an unsaved tree from the user's initial prompt
    pub fn start(&self, prompt: &str) -> Result<TreeSession> {
        let mut tree = Tree::from_prompt(prompt)?;
        LayoutEngine::new(self.config.layout.clone()).apply(&mut tree)?;
        info!("tree started");
        Ok(TreeSession::new(self.clone(), tree))
    }

    /// Load a stored tree, materialize it from its root and lay it out
    pub async fn open(&self, id: &TreeId) -> Result<Opened> {
        let stored = self.store.load_tree(&self.tenant, id).await?;
        let loaded = stored.to_tree()?;
        let materialized = materialize(&loaded.nodes, self.config.orphan_policy)?;
        if !materialized.orphans.is_empty() {
            warn!(tree_id = %id, count = materialized.orphans.len(), "stored tree has orphans");
        }

        let mut tree = Tree::from_parts(Some(stored.id.clone()), stored.name, materialized.nodes, loaded.edges);
        tree.rebuild_edges();
        LayoutEngine::new(self.config.layout.clone()).apply(&mut tree)?;

        info!(tree_id = %id, nodes = tree.len(), "tree opened");
        Ok(Opened {
            session: TreeSession::new(self.clone(), tree),
            orphans: materialized.orphans,
        })
    }

    /// Run a prompt through the generator without touching any tree
    pub async fn run(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let output = self.generator.run(prompt, params).await.map_err(|err| {
            error!(error = %err, "prompt run failed");
            err
        })?;
        info!(chars = output.len(), "prompt run finished");
        Ok(output)
    }

    /// The tenant's trees, newest first
    pub async fn list(&self) -> Result<Vec<TreeSummary>> {
        self.store.list_trees(&self.tenant).await
    }

    /// Delete a stored tree with all its nodes and edges
    pub async fn delete(&self, id: &TreeId) -> Result<()> {
        let _guard = self.gate.lock(id).await;
        self.store.delete_tree(&self.tenant, id).await.map_err(|err| {
            error!(tree_id = %id, error = %err, "tree deletion failed");
            err
        })?;
        self.gate.forget(id);
        info!(tree_id = %id, "tree deleted");
        Ok(())
    }
}

/// A loaded tree and what was left out of it
#[derive(Debug)]
pub struct Opened {
    pub session: TreeSession,
    pub orphans: Vec<Orphan>,
}

/// Outcome of a save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    pub tree_id: TreeId,
    pub name: String,
    /// Session node id -> stored node id
    pub mapping: HashMap<NodeId, NodeId>,
    /// Nodes excluded from the save
    pub orphans: Vec<Orphan>,
}

impl SaveReceipt {
    /// Stored id of a session node
    #[must_use]
    pub fn resolve(&self, old: &NodeId) -> Option<&NodeId> {
        self.mapping.get(old)
    }
}

struct Shared {
    workspace: Workspace,
    parser: ResponseParser,
    layout: LayoutEngine,
    autosave: Debouncer,
    tree: Mutex<Tree>,
}

/// One tree being worked on
#[derive(Clone)]
pub struct TreeSession {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TreeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSession")
            .field("tenant", &self.shared.workspace.tenant)
            .finish_non_exhaustive()
    }
}

impl TreeSession {
    fn new(workspace: Workspace, tree: Tree) -> Self {
        let config = &workspace.config;
        let shared = Shared {
            parser: ResponseParser::new(),
            layout: LayoutEngine::new(config.layout.clone()),
            autosave: Debouncer::new(config.autosave_delay()),
            tree: Mutex::new(tree),
            workspace,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    fn config(&self) -> &PtreeConfig {
        &self.shared.workspace.config
    }

    /// Copy of the current tree
    pub async fn snapshot(&self) -> Tree {
        self.shared.tree.lock().await.clone()
    }

    /// Stored id, once the tree has been saved
    pub async fn tree_id(&self) -> Option<TreeId> {
        self.shared.tree.lock().await.id.clone()
    }

    pub async fn add_feedback(&self, node: &NodeId, text: &str) -> Result<FeedbackId> {
        let id = self.shared.tree.lock().await.add_feedback(node, text)?;
        debug!(node_id = %node, feedback_id = %id, "feedback added");
        Ok(id)
    }

    pub async fn update_feedback(&self, node: &NodeId, feedback: &FeedbackId, text: &str) -> Result<()> {
        self.shared
            .tree
            .lock()
            .await
            .update_feedback(node, feedback, text)?;
        Ok(())
    }

    pub async fn remove_feedback(&self, node: &NodeId, feedback: &FeedbackId) -> Result<Feedback> {
        Ok(self.shared.tree.lock().await.remove_feedback(node, feedback)?)
    }

    /// Feedback left on the node's ancestors, nearest first
    pub async fn inherited_feedback(&self, node: &NodeId) -> Vec<Feedback> {
        self.shared.tree.lock().await.inherited_feedback(node)
    }

    /// Replace a node's text and, for a saved tree, schedule a debounced save
    ///
    /// Returns the handle of the scheduled save, if any.
    pub async fn edit_text(&self, node: &NodeId, text: &str) -> Result<Option<JoinHandle<bool>>> {
        let persisted = {
            let mut tree = self.shared.tree.lock().await;
            tree.edit_text(node, text)?;
            tree.id.is_some()
        };
        if !persisted {
            return Ok(None);
        }

        let session = self.clone();
        let handle = self.shared.autosave.schedule(move || async move {
            if let Err(err) = session.save().await {
                error!(error = %err, "autosave failed");
            }
        });
        Ok(Some(handle))
    }

    /// Ask the generator for improved versions of `node` and attach them
    ///
    /// No lock is held while the generator runs. If the call fails or
    /// nothing usable comes back, the tree is left exactly as it was.
    pub async fn improve(&self, node: &NodeId) -> Result<Vec<NodeId>> {
        let (prompt, feedback) = {
            let tree = self.shared.tree.lock().await;
            let target = tree
                .node(node)
                .ok_or_else(|| CoreError::not_found(format!("node {node}")))?;
            (target.text.clone(), target.feedback.clone())
        };

        let raw = self
            .shared
            .workspace
            .generator
            .generate(&self.config().metaprompt, &prompt, &feedback)
            .await
            .map_err(|err| {
                error!(node_id = %node, error = %err, "generator call failed");
                err
            })?;

        let report = self.shared.parser.parse_detailed(&raw);
        if report.candidates.is_empty() {
            warn!(node_id = %node, "generator response yielded no candidates");
            return Err(CoreError::ParseYieldedNothing { node: node.clone() });
        }

        let mut tree = self.shared.tree.lock().await;
        let mut next = tree.clone();
        let children = next.attach_candidates(node, report.candidates)?;
        self.shared.layout.apply(&mut next)?;
        *tree = next;

        info!(node_id = %node, count = children.len(), "improvements attached");
        Ok(children)
    }

    /// Try out a node's prompt as is; the tree is not changed
    pub async fn run(&self, node: &NodeId, params: &SamplingParams) -> Result<String> {
        let prompt = {
            let tree = self.shared.tree.lock().await;
            tree.node(node)
                .ok_or_else(|| CoreError::not_found(format!("node {node}")))?
                .text
                .clone()
        };
        debug!(node_id = %node, "running node prompt");
        self.shared.workspace.run(&prompt, params).await
    }

    /// Delete a node with its whole subtree
    ///
    /// A saved tree is saved again before the deletion is committed in
    /// memory. Deleting an absent node is a no-op.
    pub async fn delete_node(&self, node: &NodeId) -> Result<CascadeReport> {
        let mut tree = self.shared.tree.lock().await;
        match tree.node(node) {
            None => return Ok(CascadeReport::default()),
            Some(target) if target.is_root() => return Err(CoreError::RootDeletion),
            Some(_) => {}
        }

        let mut next = tree.clone();
        let report = delete_subtree(&mut next, node);
        self.shared.layout.apply(&mut next)?;
        if next.id.is_some() {
            self.save_locked(&mut next, None).await?;
        }
        *tree = next;

        info!(node_id = %node, removed = report.removed_nodes.len(), "subtree deleted");
        Ok(report)
    }

    /// Persist the tree, creating it on first save
    pub async fn save(&self) -> Result<SaveReceipt> {
        self.save_named(None).await
    }

    /// Persist under an explicit name
    pub async fn save_as(&self, name: &str) -> Result<SaveReceipt> {
        self.save_named(Some(name)).await
    }

    async fn save_named(&self, name: Option<&str>) -> Result<SaveReceipt> {
        let mut tree = self.shared.tree.lock().await;
        let mut next = tree.clone();
        let receipt = self.save_locked(&mut next, name).await?;
        *tree = next;
        Ok(receipt)
    }

    /// Validate, name and store `tree`
    ///
    /// On success `tree` becomes the materialized form that was written,
    /// carrying the stored tree id and name. Its node ids are the ones it
    /// had before the save; the receipt maps them to their stored ids.
    async fn save_locked(&self, tree: &mut Tree, name: Option<&str>) -> Result<SaveReceipt> {
        let workspace = &self.shared.workspace;
        if tree.is_empty() {
            return Err(CoreError::InvalidTree("tree has no nodes".into()));
        }

        let materialized = materialize(&tree.nodes, self.config().orphan_policy)?;
        if let Some(blank) = materialized.nodes.iter().find(|n| !n.has_text()) {
            return Err(CoreError::InvalidTree(format!("node {} has no text", blank.id)));
        }

        let reachable: HashSet<&NodeId> = materialized.ids();
        let edges: Vec<_> = tree
            .edges
            .iter()
            .filter(|e| reachable.contains(&e.source) && reachable.contains(&e.target))
            .cloned()
            .collect();
        let mut candidate = Tree::from_parts(tree.id.clone(), tree.name.clone(), materialized.nodes, edges);
        if !materialized.reparented.is_empty() {
            candidate.rebuild_edges();
        }

        let name = match (name, &tree.id) {
            (Some(explicit), _) => explicit.trim().to_string(),
            (None, Some(_)) if !tree.name.is_empty() => tree.name.clone(),
            (None, _) => naming::name_tree(workspace.generator.as_ref(), &candidate).await,
        };

        let stored = match &tree.id {
            Some(id) => {
                let _guard = workspace.gate.lock(id).await;
                workspace
                    .store
                    .replace_tree(&workspace.tenant, id, &name, &candidate.nodes, &candidate.edges)
                    .await
            }
            None => {
                workspace
                    .store
                    .create_tree(&workspace.tenant, &name, &candidate.nodes, &candidate.edges)
                    .await
            }
        }
        .map_err(|err| {
            error!(error = %err, "tree save failed");
            err
        })?;

        if stored.nodes.len() != candidate.nodes.len() {
            return Err(CoreError::InvalidTree(format!(
                "store returned {} nodes for {} written",
                stored.nodes.len(),
                candidate.nodes.len()
            )));
        }
        // TreeStore keeps input order, so position pairs local ids with stored ones.
        let mapping: HashMap<NodeId, NodeId> = candidate
            .nodes
            .iter()
            .zip(&stored.nodes)
            .map(|(local, new)| (local.id.clone(), new.id.clone()))
            .collect();

        // Node ids in memory stay put; callers holding one across a save keep working.
        candidate.id = Some(stored.id.clone());
        candidate.name.clone_from(&stored.name);
        *tree = candidate;
        info!(tree_id = %stored.id, nodes = tree.len(), "tree saved");

        Ok(SaveReceipt {
            tree_id: stored.id,
            name,
            mapping,
            orphans: materialized.orphans,
        })
    }

    /// Delete the stored tree; the in-memory tree becomes unsaved again
    pub async fn delete_tree(&self) -> Result<()> {
        let mut tree = self.shared.tree.lock().await;
        let id = tree
            .id
            .clone()
            .ok_or_else(|| CoreError::not_found("tree has not been saved"))?;
        self.shared.autosave.cancel_pending();
        self.shared.workspace.delete(&id).await?;
        tree.id = None;
        Ok(())
    }
}
