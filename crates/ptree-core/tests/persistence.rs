use ptree_core::{CoreError, FileStore, MemoryStore, PtreeConfig, Tenant, TreeStore, Workspace};
use ptree_kernel::OrphanPolicy;
use ptree_model::{Candidate, Node, NodeId, Tree};
use ptree_test_utils::{improvement_response, two_level_tree, ScriptedGenerator};
use std::sync::Arc;

fn acme() -> Tenant {
    Tenant::new("u", "acme")
}

#[tokio::test]
async fn file_store_round_trips_through_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_response(improvement_response(3))
            .with_title("Docs"),
    );

    let tree_id = {
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let workspace = Workspace::new(acme(), PtreeConfig::default(), generator.clone(), store);
        let session = workspace.start("Explain lifetimes").unwrap();
        let root = session.snapshot().await.root().unwrap().id.clone();
        session.improve(&root).await.unwrap();
        session.save().await.unwrap().tree_id
    };

    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let workspace = Workspace::new(acme(), PtreeConfig::default(), generator, store);
    let listed = workspace.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Docs");

    let tree = workspace.open(&tree_id).await.unwrap().session.snapshot().await;
    assert_eq!(tree.len(), 4);
    assert_eq!(tree.nodes[0].text, "Explain lifetimes");
    assert!(tree.check_invariants().is_ok());
}

#[tokio::test]
async fn stores_reject_dangling_edges_without_writing() {
    let store = MemoryStore::new();
    let mut tree = Tree::from_prompt("p").unwrap();
    tree.edges.push(ptree_model::Edge::link(
        &tree.nodes[0].id,
        &NodeId::from_raw("nowhere"),
    ));

    assert!(store.create_tree(&acme(), "t", &tree.nodes, &tree.edges).await.is_err());
    assert!(store.is_empty());
}

#[tokio::test]
async fn smuggled_node_is_unauthorized_in_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();

    let theirs = two_level_tree("theirs", 1);
    let theirs = store
        .create_tree(&Tenant::new("v", "other"), "theirs", &theirs.nodes, &theirs.edges)
        .await
        .unwrap();
    let ours = Tree::from_prompt("ours").unwrap();
    let ours = store.create_tree(&acme(), "ours", &ours.nodes, &ours.edges).await.unwrap();

    let mut smuggled = ours.to_tree().unwrap();
    let mut foreign = theirs.to_tree().unwrap().nodes[1].clone();
    foreign.parent_id = Some(smuggled.nodes[0].id.clone());
    smuggled.nodes.push(foreign);
    smuggled.rebuild_edges();

    let err = store
        .replace_tree(&acme(), &ours.id, "ours", &smuggled.nodes, &smuggled.edges)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
    assert_eq!(store.load_tree(&acme(), &ours.id).await.unwrap(), ours);
}

#[tokio::test]
async fn opening_corrupt_tree_reports_orphans() {
    let store = Arc::new(MemoryStore::new());
    let mut tree = Tree::from_prompt("root").unwrap();
    let root = tree.nodes[0].id.clone();
    tree.attach_candidates(&root, vec![Candidate::new("child", "", Vec::new())])
        .unwrap();
    // A second parentless node survives the store but not traversal.
    tree.nodes.push(Node::root("stray"));
    let stored = store.create_tree(&acme(), "t", &tree.nodes, &tree.edges).await.unwrap();

    let drop = Workspace::new(acme(), PtreeConfig::default(), Arc::new(ScriptedGenerator::new()), store.clone());
    let opened = drop.open(&stored.id).await.unwrap();
    assert_eq!(opened.orphans.len(), 1);
    assert_eq!(opened.session.snapshot().await.len(), 2);

    let reparent = Workspace::new(
        acme(),
        PtreeConfig::default().with_orphan_policy(OrphanPolicy::Reparent),
        Arc::new(ScriptedGenerator::new()),
        store,
    );
    let opened = reparent.open(&stored.id).await.unwrap();
    let tree = opened.session.snapshot().await;
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.edges.len(), 2);
    assert!(tree.check_invariants().is_ok());
}

#[tokio::test]
async fn missing_tree_is_not_found() {
    let workspace = Workspace::new(
        acme(),
        PtreeConfig::default(),
        Arc::new(ScriptedGenerator::new()),
        Arc::new(MemoryStore::new()),
    );
    let err = workspace
        .open(&ptree_model::TreeId::from_raw("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}
