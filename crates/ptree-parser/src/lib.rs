//! ptree parser - generator responses into candidates
//!
//! The generator answers with semi-structured text: a `result` wrapper
//! holding `options.option` entries, where any list may arrive as a bare
//! item. This crate reads that text (XML, or the equivalent JSON), folds
//! every singular-or-list field through [`OneOrMany`], and produces
//! [`Candidate`](ptree_model::Candidate) records.
//!
//! Malformed input never raises: [`ResponseParser::parse`] degrades to an
//! empty list and logs why.
//!
//! # Example
//!
//! ```rust
//! use ptree_parser::ResponseParser;
//!
//! let raw = r#"<options>
//!   <option id="original"><text>old</text></option>
//!   <option id="improvement-1">
//!     <text>Summarize this article in three bullet points</text>
//!     <changes><change><description>format</description><rationale>scannable</rationale></change></changes>
//!   </option>
//! </options>"#;
//!
//! let candidates = ResponseParser::new().parse(raw);
//! assert_eq!(candidates.len(), 1);
//! assert_eq!(candidates[0].changes.len(), 1);
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod json;
pub mod response;
pub mod shape;
pub mod xml;

pub use error::ParseError;
pub use json::JsonFormat;
pub use response::{ParseReport, ResponseFormat, ResponseParser, RESERVED_OPTION_IDS};
pub use shape::{OneOrMany, RawChange, RawChanges, RawOption, RawOptions, RawResult};
pub use xml::{Element, XmlFormat};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
