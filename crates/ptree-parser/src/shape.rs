//! Raw response shapes
//!
//! The generator is free to send one `option` or many, one `change` or
//! many. [`OneOrMany`] captures that at the boundary and is normalized to
//! a `Vec` before anything leaves this crate.

use serde::{Deserialize, Deserializer};

/// A field that may hold a bare item or a list of items
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Arrived as a list
    Many(Vec<T>),
    /// Arrived as a bare item
    Single(T),
}

impl<T> OneOrMany<T> {
    /// Coerce to a list; a bare item becomes a single-element list
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::Single(item) => vec![item],
        }
    }

    /// Build from collected items: one item is `Single`, otherwise `Many`
    #[must_use]
    pub fn from_vec(mut items: Vec<T>) -> Self {
        if items.len() == 1 {
            if let Some(item) = items.pop() {
                return Self::Single(item);
            }
        }
        Self::Many(items)
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            Self::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
            Self::Single(item) => OneOrMany::Single(f(item)),
        }
    }
}

/// Normalize an optional list field: missing becomes empty
#[must_use]
pub fn normalize<T>(field: Option<OneOrMany<T>>) -> Vec<T> {
    field.map(OneOrMany::into_vec).unwrap_or_default()
}

/// One `result` wrapper
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawResult {
    pub options: RawOptions,
}

/// The `options` collection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawOptions {
    pub option: OneOrMany<RawOption>,
}

/// One `option` entry as sent by the generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawOption {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub changes: Option<RawChanges>,
}

/// Option ids arrive as `"improvement-1"` or as a bare `1`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(text) => text,
        Id::Integer(n) => n.to_string(),
        Id::Float(n) => n.to_string(),
    }))
}

/// The `changes` wrapper of an option
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawChanges {
    #[serde(default)]
    pub change: Option<OneOrMany<RawChange>>,
}

/// One `change` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawChange {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}
