//! Error types for ptree core
//!
//! One taxonomy for every user action:
//! - recoverable: [`CoreError::ParseYieldedNothing`]
//! - retryable by the caller: [`CoreError::TransportFailure`]
//! - fatal, operation aborted: [`CoreError::MissingRoot`],
//!   [`CoreError::Unauthorized`], [`CoreError::InvalidTree`]
//!
//! Orphans are not errors; they travel in reports.

use ptree_kernel::KernelError;
use ptree_model::{InvariantViolation, ModelError, NodeId};

/// Main ptree error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The generator answered but no usable candidate came out of it
    #[error("no improvements produced for node {node}")]
    ParseYieldedNothing { node: NodeId },

    /// The tree has no root node
    #[error("tree has no root node")]
    MissingRoot,

    /// Cross-tenant reference
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Generator or storage call failed below the application layer
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Tree or node does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The root cannot be deleted
    #[error("the root node cannot be deleted")]
    RootDeletion,

    /// Tree fails its structural invariants
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Entity-level failure (missing node, missing feedback, corrupt wire field)
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Check if the caller may retry the operation as is
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }

    /// Check if the error signals corruption or a policy breach
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingRoot | Self::Unauthorized(_) | Self::InvalidTree(_)
        )
    }

    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure(message.into())
    }

    #[inline]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<KernelError> for CoreError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::MissingRoot => Self::MissingRoot,
            KernelError::Unauthorized { .. } => Self::Unauthorized(err.to_string()),
            KernelError::DanglingReference(_)
            | KernelError::Cyclic(_)
            | KernelError::UnknownEndpoint(_) => Self::InvalidTree(err.to_string()),
        }
    }
}

impl From<InvariantViolation> for CoreError {
    fn from(err: InvariantViolation) -> Self {
        match err {
            InvariantViolation::NoRoot => Self::MissingRoot,
            other => Self::InvalidTree(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::TransportFailure(format!("storage i/o: {err}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransportFailure(format!("generator request: {err}"))
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
