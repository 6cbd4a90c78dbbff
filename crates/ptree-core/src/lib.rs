//! ptree core - prompt refinement sessions
//!
//! Ties the parser, the kernel and two external collaborators together:
//! - a [`Generator`] that turns a prompt plus feedback into raw text
//! - a [`TreeStore`] that persists whole trees, re-identified on every write
//!
//! Each user action (start, improve, edit, delete, save) runs as one unit
//! of work through a [`TreeSession`]. Saves of the same tree are serialized
//! by a [`MutationGate`]; text edits on a saved tree are coalesced by a
//! [`Debouncer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ptree_core::{MemoryStore, OpenAiGenerator, PtreeConfig, Tenant, Workspace};
//! use std::sync::Arc;
//!
//! # async fn example() -> ptree_core::Result<()> {
//! let config = PtreeConfig::new().with_env_overrides()?;
//! let generator = Arc::new(OpenAiGenerator::new(config.generator.clone())?);
//! let workspace = Workspace::new(Tenant::new("me", "acme"), config, generator, Arc::new(MemoryStore::new()));
//!
//! let session = workspace.start("Summarize this article")?;
//! let root = session.snapshot().await.root().unwrap().id.clone();
//! session.add_feedback(&root, "too verbose").await?;
//! let children = session.improve(&root).await?;
//! let receipt = session.save().await?;
//!
//! println!("saved {} as {} with {} improvements", receipt.tree_id, receipt.name, children.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod autosave;
pub mod config;
pub mod error;
pub mod gate;
pub mod generator;
pub mod naming;
pub mod session;
pub mod store;

pub use autosave::Debouncer;
pub use config::{GeneratorConfig, PtreeConfig, DEFAULT_METAPROMPT};
pub use error::{CoreError, Result};
pub use gate::MutationGate;
pub use generator::{improvement_request, naming_request, Generator, OpenAiGenerator, SamplingParams};
pub use naming::{fallback_name, name_tree, UNTITLED};
pub use session::{Opened, SaveReceipt, TreeSession, Workspace};
pub use store::{FileStore, MemoryStore, Tenant, TreeStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with ptree sessions
    pub use crate::{
        CoreError, Generator, MemoryStore, PtreeConfig, Result, Tenant, TreeSession, TreeStore, Workspace,
    };
    pub use ptree_model::{Feedback, Node, NodeId, Tree, TreeId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
