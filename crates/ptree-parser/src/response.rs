//! Response parser
//!
//! Formats are tried in priority order (higher first). The first one that
//! both claims the input and reads it wins; if none does, the response
//! degrades to zero candidates.

use crate::error::ParseError;
use crate::json::JsonFormat;
use crate::shape::{normalize, RawChanges, RawOption, RawResult};
use crate::xml::XmlFormat;
use ptree_model::{Candidate, Change};
use std::fmt;
use tracing::{debug, warn};

/// Option identifiers that mark scaffolding rather than improvements
pub const RESERVED_OPTION_IDS: [&str; 3] = ["original", "implementation", "verification"];

/// A wire format the generator may answer in
pub trait ResponseFormat: Send + Sync + fmt::Debug {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Cheap check whether the input looks like this format
    fn detect(&self, raw: &str) -> bool;

    /// Read every `result` wrapper in the input
    fn read(&self, raw: &str) -> Result<Vec<RawResult>, ParseError>;

    /// Higher is tried first
    fn priority(&self) -> i32 {
        0
    }
}

/// Outcome of one parse, with what was left out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub candidates: Vec<Candidate>,
    /// Options dropped for carrying a reserved id
    pub skipped_reserved: usize,
    /// Options dropped for blank text
    pub skipped_blank: usize,
    /// Format that read the input, if any did
    pub format: Option<&'static str>,
}

/// Turns raw generator output into candidates
pub struct ResponseParser {
    formats: Vec<Box<dyn ResponseFormat>>,
    reserved: Vec<String>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseParser")
            .field("formats", &self.formats.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("reserved", &self.reserved)
            .finish()
    }
}

impl ResponseParser {
    /// Parser with the XML and JSON formats registered
    #[must_use]
    pub fn new() -> Self {
        let mut parser = Self::empty();
        parser.register(XmlFormat);
        parser.register(JsonFormat);
        parser
    }

    /// Parser with no formats and the default reserved ids
    #[must_use]
    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
            reserved: RESERVED_OPTION_IDS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Register a format
    pub fn register<F: ResponseFormat + 'static>(&mut self, format: F) {
        self.formats.push(Box::new(format));
        self.formats.sort_by_key(|f| std::cmp::Reverse(f.priority()));
    }

    /// Replace the reserved id list
    #[must_use]
    pub fn with_reserved_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a response; malformed input yields an empty list
    #[must_use]
    pub fn parse(&self, raw: &str) -> Vec<Candidate> {
        self.parse_detailed(raw).candidates
    }

    /// Like [`parse`](Self::parse) but keeps the counts of dropped options
    #[must_use]
    pub fn parse_detailed(&self, raw: &str) -> ParseReport {
        match self.try_parse(raw) {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, len = raw.len(), "generator response degraded to zero candidates");
                ParseReport::default()
            }
        }
    }

    /// Parse, surfacing why malformed input was rejected
    pub fn try_parse(&self, raw: &str) -> Result<ParseReport, ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut last_err = ParseError::UnrecognizedFormat;
        for format in self.formats.iter().filter(|f| f.detect(raw)) {
            match format.read(raw) {
                Ok(results) => {
                    let mut report = self.collect(results);
                    report.format = Some(format.name());
                    debug!(
                        format = format.name(),
                        count = report.candidates.len(),
                        skipped_reserved = report.skipped_reserved,
                        skipped_blank = report.skipped_blank,
                        "parsed generator response"
                    );
                    return Ok(report);
                }
                Err(err) => {
                    debug!(format = format.name(), error = %err, "format rejected response");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn is_reserved(&self, id: &str) -> bool {
        self.reserved.iter().any(|r| r == id)
    }

    fn collect(&self, results: Vec<RawResult>) -> ParseReport {
        let mut report = ParseReport::default();
        let options = results
            .into_iter()
            .flat_map(|result| result.options.option.into_vec());

        for option in options {
            if option
                .id
                .as_deref()
                .is_some_and(|id| self.is_reserved(id.trim()))
            {
                report.skipped_reserved += 1;
                continue;
            }
            match into_candidate(option) {
                Some(candidate) => report.candidates.push(candidate),
                None => {
                    debug!("dropping option with blank text");
                    report.skipped_blank += 1;
                }
            }
        }
        report
    }
}

fn into_candidate(option: RawOption) -> Option<Candidate> {
    let text = option.text.map(|t| t.trim().to_string()).unwrap_or_default();
    if text.is_empty() {
        return None;
    }
    let analysis = option
        .analysis
        .map(|a| a.trim().to_string())
        .unwrap_or_default();
    let changes = option.changes.map(into_changes).unwrap_or_default();
    Some(Candidate::new(text, analysis, changes))
}

fn into_changes(changes: RawChanges) -> Vec<Change> {
    normalize(changes.change)
        .into_iter()
        .map(|c| {
            Change::new(
                c.description.unwrap_or_default().trim(),
                c.rationale.unwrap_or_default().trim(),
            )
        })
        .collect()
}
