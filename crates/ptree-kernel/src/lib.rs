//! ptree kernel - structural operations on prompt trees
//!
//! Four pieces that must agree on the same tree:
//! - [`traversal`]: breadth-first materialization from the root, with
//!   orphan reporting
//! - [`cascade`]: delete a node together with its descendants
//! - [`remap`]: two-pass re-identification for persistence
//! - [`layout`]: deterministic layered layout with overlap repair
//!
//! # Example
//!
//! ```rust
//! use ptree_kernel::{materialize, IdentityRemapper, LayoutEngine, OrphanPolicy};
//! use ptree_model::{Candidate, Tree};
//!
//! let mut tree = Tree::from_prompt("Summarize this article").unwrap();
//! let root = tree.root().unwrap().id.clone();
//! tree.attach_candidates(&root, vec![Candidate::new("Summarize in 3 bullets", "", vec![])]).unwrap();
//!
//! let materialized = materialize(&tree.nodes, OrphanPolicy::Drop).unwrap();
//! assert!(materialized.orphans.is_empty());
//!
//! let remapped = IdentityRemapper::new().remap(&materialized.nodes, &tree.edges).unwrap();
//! let layout = LayoutEngine::default().layout(&remapped.nodes, &remapped.edges).unwrap();
//! assert_eq!(layout.depth(), 2);
//! ```

#![warn(unreachable_pub)]

pub mod cascade;
pub mod error;
pub mod layout;
pub mod remap;
pub mod traversal;

pub use cascade::{collect_descendants, delete_subtree, CascadeReport};
pub use error::KernelError;
pub use layout::{Direction, Layout, LayoutConfig, LayoutEngine, Placement};
pub use remap::{verify_ownership, IdentityRemapper, Remapped};
pub use traversal::{find_root, materialize, Materialized, Orphan, OrphanPolicy, OrphanReason};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
