//! Body encodings: serializing login bodies, extracting tokens, and
//! evaluating response selectors.
//!
//! Each [`BodyEncoding`] variant is handled by an explicit match arm;
//! there is no dynamic registry of formats.

use indexmap::IndexMap;
use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::Error;
use crate::model::BodyEncoding;
use crate::xml;

// ── Request bodies ───────────────────────────────────────────────────

/// The `Content-Type` of a body in `encoding`.
pub fn content_type(encoding: BodyEncoding) -> &'static str {
    match encoding {
        BodyEncoding::Json => "application/json",
        BodyEncoding::Yaml => "application/yaml",
        BodyEncoding::Xml => "application/xml",
    }
}

/// Serialize a flat key/value body in `encoding`.
///
/// XML bodies are wrapped in a `root` element.
pub fn encode_body(
    encoding: BodyEncoding,
    body: &IndexMap<String, String>,
    root: &str,
) -> Result<Vec<u8>, Error> {
    match encoding {
        BodyEncoding::Json => serde_json::to_vec(body).map_err(|e| Error::Encoding {
            message: format!("JSON: {e}"),
        }),
        BodyEncoding::Yaml => serde_yaml::to_string(body)
            .map(String::into_bytes)
            .map_err(|e| Error::Encoding {
                message: format!("YAML: {e}"),
            }),
        BodyEncoding::Xml => xml::write_document(root, body),
    }
}

// ── Selectors ────────────────────────────────────────────────────────

/// Compile a JSON selector.
///
/// Accepts RFC 9535 JSONPath (`$.data[*]`) as well as the bare dotted form
/// (`data.token`), which is read relative to the root.
pub fn json_path(selector: &str) -> Result<JsonPath, Error> {
    let trimmed = selector.trim();
    let normalized = if trimmed.is_empty() {
        "$".to_owned()
    } else if trimmed.starts_with('$') {
        trimmed.to_owned()
    } else if trimmed.starts_with('[') {
        format!("${trimmed}")
    } else {
        format!("$.{trimmed}")
    };

    JsonPath::parse(&normalized).map_err(|e| Error::Selector {
        selector: selector.to_owned(),
        message: e.to_string(),
    })
}

/// Parse a JSON response body.
pub fn parse_json(body: &str) -> Result<Value, Error> {
    serde_json::from_str(body).map_err(|e| Error::Encoding {
        message: format!("JSON: {e}"),
    })
}

/// Render a selected node as text: strings verbatim, everything else as JSON.
fn node_text(node: &Value) -> Option<String> {
    match node {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ── Token extraction ─────────────────────────────────────────────────

/// Extract a token from a login response body.
///
/// - JSON: `path` is a selector; the first matching node wins.
/// - YAML: `path` is a top-level key.
/// - XML: `path` is a node path (see the `xml` module).
///
/// `Ok(None)` means the body parsed but the path matched nothing.
pub fn extract_token(
    encoding: BodyEncoding,
    body: &str,
    path: &str,
) -> Result<Option<String>, Error> {
    match encoding {
        BodyEncoding::Json => {
            let document = parse_json(body)?;
            let selector = json_path(path)?;
            Ok(selector.query(&document).first().and_then(node_text))
        }
        BodyEncoding::Yaml => {
            let document: serde_yaml::Value =
                serde_yaml::from_str(body).map_err(|e| Error::Encoding {
                    message: format!("YAML: {e}"),
                })?;
            Ok(document.get(path.trim()).and_then(yaml_scalar))
        }
        BodyEncoding::Xml => {
            if body.trim().is_empty() {
                return Ok(None);
            }
            xml::select_single(body, path)
        }
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        other => serde_yaml::to_string(other)
            .ok()
            .map(|s| s.trim_end().to_owned()),
    }
}
