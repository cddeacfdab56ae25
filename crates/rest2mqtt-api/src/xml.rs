// Minimal XML support for login bodies and token lookup.
//
// Writing produces `<root><key>value</key>…</root>`. Lookup supports a
// small path language: slash-separated element names, `//` at the start
// to match anywhere, and an optional final `text()` or `@attribute` step.
// Namespace prefixes are ignored on both sides.

use std::fmt::Display;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::Error;

fn xml_error(e: &impl Display) -> Error {
    Error::Encoding {
        message: format!("XML: {e}"),
    }
}

/// Serialize a flat map as a single XML element with one child per key.
pub(crate) fn write_document(
    root: &str,
    body: &IndexMap<String, String>,
) -> Result<Vec<u8>, Error> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| xml_error(&e))?;
    writer
        .write_event(Event::Start(BytesStart::new(root)))
        .map_err(|e| xml_error(&e))?;
    for (key, value) in body {
        writer
            .write_event(Event::Start(BytesStart::new(key.as_str())))
            .map_err(|e| xml_error(&e))?;
        writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(|e| xml_error(&e))?;
        writer
            .write_event(Event::End(BytesEnd::new(key.as_str())))
            .map_err(|e| xml_error(&e))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(root)))
        .map_err(|e| xml_error(&e))?;
    Ok(writer.into_inner())
}

// ── Path lookup ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Text,
    Attribute(String),
}

#[derive(Debug)]
struct NodePath {
    anywhere: bool,
    elements: Vec<String>,
    target: Target,
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

impl NodePath {
    fn parse(path: &str) -> Result<Self, Error> {
        let trimmed = path.trim();
        let anywhere = trimmed.starts_with("//");
        let mut steps: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

        let target = match steps.last() {
            Some(&"text()") => {
                steps.pop();
                Target::Text
            }
            Some(step) if step.starts_with('@') => {
                let name = local(step.trim_start_matches('@')).to_owned();
                steps.pop();
                Target::Attribute(name)
            }
            _ => Target::Text,
        };

        if steps.is_empty() {
            return Err(Error::Selector {
                selector: path.to_owned(),
                message: "path names no element".into(),
            });
        }

        Ok(Self {
            anywhere,
            elements: steps.into_iter().map(|s| local(s).to_owned()).collect(),
            target,
        })
    }

    fn matches(&self, stack: &[String]) -> bool {
        if self.anywhere {
            stack.ends_with(&self.elements)
        } else {
            stack == self.elements.as_slice()
        }
    }
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attribute(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, Error> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(&e))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr.unescape_value().map_err(|e| xml_error(&e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Find the first node addressed by `path` in `document`.
///
/// Element targets yield their direct text content; `None` means the path
/// matched nothing (or an element without text).
pub(crate) fn select_single(document: &str, path: &str) -> Result<Option<String>, Error> {
    let path = NodePath::parse(path)?;
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut capture: Option<(usize, String)> = None;

    loop {
        match reader.read_event().map_err(|e| xml_error(&e))? {
            Event::Start(start) => {
                stack.push(element_name(start.local_name().as_ref()));
                if capture.is_none() && path.matches(&stack) {
                    match &path.target {
                        Target::Attribute(name) => {
                            if let Some(value) = attribute(&start, name)? {
                                return Ok(Some(value));
                            }
                        }
                        Target::Text => capture = Some((stack.len(), String::new())),
                    }
                }
            }
            Event::Empty(start) => {
                stack.push(element_name(start.local_name().as_ref()));
                if let Target::Attribute(name) = &path.target {
                    if path.matches(&stack) {
                        if let Some(value) = attribute(&start, name)? {
                            return Ok(Some(value));
                        }
                    }
                }
                stack.pop();
            }
            Event::Text(text) => {
                if let Some((depth, buf)) = capture.as_mut() {
                    if *depth == stack.len() {
                        buf.push_str(&text.unescape().map_err(|e| xml_error(&e))?);
                    }
                }
            }
            Event::CData(data) => {
                if let Some((depth, buf)) = capture.as_mut() {
                    if *depth == stack.len() {
                        buf.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
            }
            Event::End(_) => {
                if let Some((depth, buf)) = capture.take() {
                    if depth == stack.len() {
                        if !buf.is_empty() {
                            return Ok(Some(buf));
                        }
                    } else {
                        capture = Some((depth, buf));
                    }
                }
                stack.pop();
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
