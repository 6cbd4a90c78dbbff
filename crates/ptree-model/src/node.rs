//! Nodes and their annotations
//!
//! A [`Node`] is one version of the prompt. Its [`Change`] list is written
//! once by the response parser; its [`Feedback`] list belongs to the user.

use crate::error::ModelError;
use crate::ids::{FeedbackId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One change the generator made, with its rationale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// What changed
    #[serde(default)]
    pub description: String,
    /// Why it changed
    #[serde(default)]
    pub rationale: String,
}

impl Change {
    /// Create new change
    #[inline]
    #[must_use]
    pub fn new(description: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            rationale: rationale.into(),
        }
    }
}

/// User annotation on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Unique within the owning node
    pub id: FeedbackId,
    /// Annotation text
    pub text: String,
}

impl Feedback {
    /// Create feedback with a fresh id
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: FeedbackId::new(),
            text: text.into(),
        }
    }
}

/// Top-left corner of a node on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One version of the prompt text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    /// `None` only for the root
    pub parent_id: Option<NodeId>,
    pub text: String,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Create a root node holding the initial prompt
    #[must_use]
    pub fn root(text: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: None,
            text: text.into(),
            analysis: String::new(),
            changes: Vec::new(),
            feedback: Vec::new(),
            created_at: Utc::now(),
            position: Position::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True when the text is non-blank
    #[inline]
    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Append feedback and return its id
    pub fn add_feedback(&mut self, text: impl Into<String>) -> FeedbackId {
        let feedback = Feedback::new(text);
        let id = feedback.id.clone();
        self.feedback.push(feedback);
        id
    }

    /// Replace the text of one feedback entry
    pub fn update_feedback(
        &mut self,
        feedback_id: &FeedbackId,
        text: impl Into<String>,
    ) -> Result<(), ModelError> {
        match self.feedback.iter_mut().find(|f| &f.id == feedback_id) {
            Some(entry) => {
                entry.text = text.into();
                Ok(())
            }
            None => Err(self.missing_feedback(feedback_id)),
        }
    }

    /// Remove one feedback entry, returning it
    pub fn remove_feedback(&mut self, feedback_id: &FeedbackId) -> Result<Feedback, ModelError> {
        match self.feedback.iter().position(|f| &f.id == feedback_id) {
            Some(index) => Ok(self.feedback.remove(index)),
            None => Err(self.missing_feedback(feedback_id)),
        }
    }

    fn missing_feedback(&self, feedback_id: &FeedbackId) -> ModelError {
        ModelError::FeedbackNotFound {
            node: self.id.clone(),
            feedback: feedback_id.clone(),
        }
    }
}

/// A rewrite produced by the response parser, not yet part of any tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: NodeId,
    /// Always `None` until attached
    pub parent_id: Option<NodeId>,
    pub text: String,
    pub analysis: String,
    pub changes: Vec<Change>,
    /// Always empty: feedback only comes from the user
    pub feedback: Vec<Feedback>,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    /// Create candidate with a freshly minted id
    #[must_use]
    pub fn new(text: impl Into<String>, analysis: impl Into<String>, changes: Vec<Change>) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: None,
            text: text.into(),
            analysis: analysis.into(),
            changes,
            feedback: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Turn the candidate into a child node of `parent`
    #[must_use]
    pub fn into_child(self, parent: &NodeId) -> Node {
        Node {
            id: self.id,
            parent_id: Some(parent.clone()),
            text: self.text,
            analysis: self.analysis,
            changes: self.changes,
            feedback: Vec::new(),
            created_at: self.created_at,
            position: Position::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_node_is_bare() {
        let node = Node::root("Summarize this article");
        assert!(node.is_root());
        assert!(node.has_text());
        assert!(node.changes.is_empty());
        assert!(node.feedback.is_empty());
    }

    #[test]
    fn feedback_lifecycle() {
        let mut node = Node::root("prompt");
        let id = node.add_feedback("too verbose");
        node.update_feedback(&id, "way too verbose").unwrap();
        assert_eq!(node.feedback[0].text, "way too verbose");

        let removed = node.remove_feedback(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(node.feedback.is_empty());
        assert!(matches!(
            node.remove_feedback(&id),
            Err(ModelError::FeedbackNotFound { .. })
        ));
    }

    #[test]
    fn candidate_becomes_child_without_feedback() {
        let candidate = Candidate::new("better", "clearer", vec![Change::new("a", "b")]);
        let parent = NodeId::from_raw("p");
        let id = candidate.id.clone();

        let node = candidate.into_child(&parent);
        assert_eq!(node.id, id);
        assert_eq!(node.parent_id, Some(parent));
        assert_eq!(node.changes.len(), 1);
        assert!(node.feedback.is_empty());
    }

    #[test]
    fn node_json_uses_camel_case() {
        let node = Node::root("x");
        let value = serde_json::to_value(&node).unwrap();
        assert!(value.get("parentId").is_some());
        assert!(value.get("createdAt").is_some());
    }
}
