//! Opaque identifiers
//!
//! Every identifier is an opaque string. Fresh identifiers are UUID v4
//! strings, but loaded data may carry any non-empty string.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an identifier that already exists
            #[inline]
            #[must_use]
            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::from_raw(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a node within a tree
    NodeId
);
opaque_id!(
    /// Identifier of a derived parent -> child edge
    EdgeId
);
opaque_id!(
    /// Identifier of a persisted tree
    TreeId
);
opaque_id!(
    /// Identifier of a feedback entry, unique within its node
    FeedbackId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(NodeId::new(), NodeId::new());
        assert_ne!(EdgeId::new(), EdgeId::new());
    }

    #[test]
    fn raw_ids_round_trip_as_plain_strings() {
        let id = NodeId::from_raw("node-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"node-1\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.to_string(), "node-1");
    }
}
