//! JSON response format
//!
//! Same shape as the XML form: `{"result": {"options": {"option": ...}}}`,
//! with the `result` wrapper optional and any list allowed to be bare.

use crate::error::ParseError;
use crate::response::ResponseFormat;
use crate::shape::{OneOrMany, RawResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    Wrapped { result: OneOrMany<RawResult> },
    Bare(OneOrMany<RawResult>),
}

/// JSON generator responses
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl ResponseFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn detect(&self, raw: &str) -> bool {
        let trimmed = raw.trim_start();
        trimmed.starts_with('{') || trimmed.starts_with('[')
    }

    fn read(&self, raw: &str) -> Result<Vec<RawResult>, ParseError> {
        let document: Document =
            serde_json::from_str(raw.trim()).map_err(|e| ParseError::Json(e.to_string()))?;
        Ok(match document {
            Document::Wrapped { result } | Document::Bare(result) => result.into_vec(),
        })
    }

    fn priority(&self) -> i32 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_and_bare_documents() {
        let wrapped = r#"{"result":{"options":{"option":{"id":"a","text":"t"}}}}"#;
        let bare = r#"{"options":{"option":[{"id":"a","text":"t"},{"id":"b","text":"u"}]}}"#;

        let results = JsonFormat.read(wrapped).unwrap();
        assert_eq!(results[0].options.option.clone().into_vec().len(), 1);

        let results = JsonFormat.read(bare).unwrap();
        assert_eq!(results[0].options.option.clone().into_vec().len(), 2);
    }

    #[test]
    fn numeric_option_ids_are_read() {
        let raw = r#"{"options":{"option":[{"id":1,"text":"A"},{"id":"original","text":"B"}]}}"#;
        let options = JsonFormat.read(raw).unwrap()[0].options.option.clone().into_vec();
        assert_eq!(options[0].id.as_deref(), Some("1"));

        let candidates = crate::ResponseParser::new().parse(raw);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "A");
    }

    #[test]
    fn detection_is_by_leading_brace() {
        assert!(JsonFormat.detect("  {\"result\":1}"));
        assert!(JsonFormat.detect("[]"));
        assert!(!JsonFormat.detect("<result/>"));
    }

    #[test]
    fn missing_options_is_an_error() {
        assert!(matches!(
            JsonFormat.read(r#"{"result":{"note":"none"}}"#),
            Err(ParseError::Json(_))
        ));
    }
}
