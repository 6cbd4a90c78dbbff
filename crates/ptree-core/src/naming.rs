//! Tree naming
//!
//! First saves get a generated title. Naming is best effort: any failure
//! falls back to the start of the root prompt.

use crate::generator::Generator;
use ptree_model::Tree;
use tracing::warn;

/// Name used when nothing better is available
pub const UNTITLED: &str = "Untitled Tree";

const FALLBACK_CHARS: usize = 50;

/// First characters of the root prompt, or [`UNTITLED`]
#[must_use]
pub fn fallback_name(tree: &Tree) -> String {
    let text = tree.root().map(|r| r.text.trim()).unwrap_or_default();
    let name: String = text.chars().take(FALLBACK_CHARS).collect();
    let name = name.trim();
    if name.is_empty() {
        UNTITLED.to_string()
    } else {
        name.to_string()
    }
}

/// Strip quotes and whitespace a generator may wrap around a title
fn clean(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Ask the generator for a title, falling back on failure or blank output
pub async fn name_tree(generator: &dyn Generator, tree: &Tree) -> String {
    let Some(root) = tree.root() else {
        return UNTITLED.to_string();
    };
    let analyses: Vec<String> = tree
        .nodes
        .iter()
        .filter(|n| !n.is_root() && !n.analysis.trim().is_empty())
        .map(|n| n.analysis.clone())
        .collect();

    match generator.name_tree(&root.text, &analyses).await {
        Ok(raw) => {
            let name = clean(&raw);
            if name.is_empty() {
                warn!("generator returned a blank tree name");
                fallback_name(tree)
            } else {
                name
            }
        }
        Err(err) => {
            warn!(error = %err, "tree naming failed");
            fallback_name(tree)
        }
    }
}
