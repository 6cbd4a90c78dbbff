//! Error types for response parsing
//!
//! These never escape [`ResponseParser::parse`](crate::ResponseParser::parse);
//! they explain why a response degraded to zero candidates.

/// Why a response could not be read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Empty or whitespace-only response
    #[error("response is empty")]
    Empty,

    /// No registered format claims the input
    #[error("no response format recognised the input")]
    UnrecognizedFormat,

    /// XML syntax error
    #[error("malformed xml: {0}")]
    Xml(String),

    /// JSON syntax or shape error
    #[error("malformed json: {0}")]
    Json(String),

    /// A required wrapper element is absent
    #[error("result wrapper is missing `{0}`")]
    MissingField(&'static str),
}
