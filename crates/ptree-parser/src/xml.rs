//! XML response format
//!
//! Reads the response with `quick-xml` into a small element tree, then
//! walks `result > options > option` the way the generator was asked to
//! write it. Field contents keep any nested markup as text, since improved
//! prompts often contain tags of their own.

use crate::error::ParseError;
use crate::response::ResponseFormat;
use crate::shape::{OneOrMany, RawChange, RawChanges, RawOption, RawOptions, RawResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use tracing::debug;

const DOCUMENT: &str = "#document";

/// One piece of element content, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Child(Element),
}

/// A parsed XML element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub content: Vec<Content>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            content: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.content.iter().filter_map(|c| match c {
            Content::Child(child) => Some(child),
            Content::Text(_) => None,
        })
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> + 'n
    where
        'a: 'n,
    {
        self.children().filter(move |c| c.name == name)
    }

    /// Children named `name`, as one-or-many; `None` when there are none
    #[must_use]
    pub fn field(&self, name: &str) -> Option<OneOrMany<&Element>> {
        let found: Vec<&Element> = self.children().filter(|c| c.name == name).collect();
        if found.is_empty() {
            None
        } else {
            Some(OneOrMany::from_vec(found))
        }
    }

    /// Inner content as a string, nested markup written back out
    #[must_use]
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for piece in &self.content {
            match piece {
                Content::Text(text) => out.push_str(text),
                Content::Child(child) => child.write_markup(&mut out),
            }
        }
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        if self.content.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&self.inner_markup());
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Trimmed inner markup of the first child named `name`
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.children_named(name)
            .next()
            .map(|c| c.inner_markup().trim().to_string())
    }
}

/// Parse a whole document under a synthetic root element
pub fn parse_document(input: &str) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(input);
    let mut stack = vec![Element::new(DOCUMENT.to_string(), Vec::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(open(&start)),
            Ok(Event::Empty(start)) => attach(&mut stack, Content::Child(open(&start))),
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(ParseError::Xml("closing tag without opening tag".into()));
                }
                if let Some(done) = stack.pop() {
                    attach(&mut stack, Content::Child(done));
                }
            }
            Ok(Event::Text(text)) => {
                // Stray `&` in prose is common; keep the raw text rather than fail.
                let value = text
                    .unescape()
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                attach(&mut stack, Content::Text(value));
            }
            Ok(Event::CData(data)) => {
                attach(&mut stack, Content::Text(String::from_utf8_lossy(&data).into_owned()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(ParseError::Xml(err.to_string())),
        }
    }

    if stack.len() > 1 {
        let open_name = stack.last().map(|e| e.name.clone()).unwrap_or_default();
        return Err(ParseError::Xml(format!("unclosed element <{open_name}>")));
    }
    stack
        .pop()
        .ok_or_else(|| ParseError::Xml("empty document".into()))
}

fn open(start: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    Element::new(name, attributes)
}

fn attach(stack: &mut [Element], content: Content) {
    if let Some(parent) = stack.last_mut() {
        parent.content.push(content);
    }
}

/// Escape every `<` that cannot start markup
///
/// Generated prose often carries comparisons such as `x < 5`, which no XML
/// reader accepts. Returns `None` when there is nothing to escape.
fn escape_stray_angles(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut changed = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        let starts_markup = matches!(chars.peek(), Some(&n) if n.is_alphabetic() || matches!(n, '/' | '!' | '?' | '_'));
        if c == '<' && !starts_markup {
            out.push_str("&lt;");
            changed = true;
        } else {
            out.push(c);
        }
    }
    changed.then_some(out)
}

/// True when the response already carries its own `<result>` wrapper
fn has_result_wrapper(raw: &str) -> bool {
    raw.match_indices("<result").any(|(index, tag)| {
        matches!(
            raw[index + tag.len()..].chars().next(),
            Some(c) if c == '>' || c == '/' || c.is_whitespace()
        )
    })
}

fn read_results(document: &Element) -> Result<Vec<RawResult>, ParseError> {
    let results = document
        .field("result")
        .ok_or(ParseError::MissingField("result"))?;
    results.into_vec().into_iter().map(read_result).collect()
}

fn read_result(result: &Element) -> Result<RawResult, ParseError> {
    let options = result
        .children_named("options")
        .next()
        .ok_or(ParseError::MissingField("options"))?;
    let option = options
        .field("option")
        .ok_or(ParseError::MissingField("option"))?;
    Ok(RawResult {
        options: RawOptions {
            option: option.map(read_option),
        },
    })
}

fn read_option(option: &Element) -> RawOption {
    RawOption {
        id: option
            .attribute("id")
            .map(|id| id.trim().to_string())
            .or_else(|| option.child_text("id")),
        text: option.child_text("text"),
        analysis: option.child_text("analysis"),
        changes: option.children_named("changes").next().map(|changes| RawChanges {
            change: changes.field("change").map(|found| found.map(read_change)),
        }),
    }
}

fn read_change(change: &Element) -> RawChange {
    RawChange {
        description: change.child_text("description"),
        rationale: change.child_text("rationale"),
    }
}

/// XML generator responses
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormat;

impl ResponseFormat for XmlFormat {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn detect(&self, raw: &str) -> bool {
        raw.contains('<')
    }

    fn read(&self, raw: &str) -> Result<Vec<RawResult>, ParseError> {
        let wrapped;
        let raw = if has_result_wrapper(raw) {
            raw
        } else {
            wrapped = format!("<result>{raw}</result>");
            &wrapped
        };

        let document = match parse_document(raw) {
            Ok(document) => document,
            Err(err) => {
                let Some(repaired) = escape_stray_angles(raw) else {
                    return Err(err);
                };
                debug!(error = %err, "retrying xml with stray '<' escaped");
                parse_document(&repaired)?
            }
        };
        read_results(&document)
    }
}
