//! Topic template compilation.
//!
//! A template such as `get/%city%/%unit%` compiles into:
//!
//! - a match expression with one named capture per placeholder,
//!   `get/(?P<city>[A-Za-z0-9_-]+)/(?P<unit>[A-Za-z0-9_-]+)`, and
//! - a subscribe filter with every placeholder replaced by the single-level
//!   wildcard, `get/+/+`.
//!
//! Placeholders never match a level separator, so each one binds exactly
//! one topic level.

use std::collections::HashSet;

use thiserror::Error;

/// Character class a placeholder value is matched against.
pub const PLACEHOLDER_VALUE: &str = "[A-Za-z0-9_-]+";

/// Why a topic template failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("Unterminated placeholder in topic template '{template}'")]
    Unterminated { template: String },

    #[error("Invalid placeholder name '{name}' in topic template '{template}'")]
    InvalidName { template: String, name: String },

    #[error("Placeholder '{name}' appears more than once in topic template '{template}'")]
    Duplicate { template: String, name: String },

    #[error("Placeholder '{name}' must span a whole level in topic template '{template}'")]
    PartialLevel { template: String, name: String },

    #[error("Topic template '{template}' contains an MQTT wildcard")]
    Wildcard { template: String },

    #[error("Cannot build matcher for topic template '{template}': {message}")]
    Matcher { template: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// A compiled topic template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    template: String,
    pattern: String,
    filter: String,
    placeholders: Vec<String>,
}

impl TopicPattern {
    /// Compile `template`.
    ///
    /// Compilation is deterministic: the same template always yields the
    /// same pattern and filter.
    pub fn compile(template: &str) -> Result<Self, TopicError> {
        if template.contains(['+', '#']) {
            return Err(TopicError::Wildcard {
                template: template.to_owned(),
            });
        }

        let pieces = split(template)?;
        let mut pattern = String::with_capacity(template.len() * 2);
        let mut filter = String::with_capacity(template.len());
        let mut placeholders = Vec::new();
        let mut seen = HashSet::new();

        for (i, piece) in pieces.iter().enumerate() {
            match *piece {
                Piece::Literal(text) => {
                    pattern.push_str(&regex::escape(text));
                    filter.push_str(text);
                }
                Piece::Placeholder(name) => {
                    if !is_identifier(name) {
                        return Err(TopicError::InvalidName {
                            template: template.to_owned(),
                            name: name.to_owned(),
                        });
                    }
                    if !seen.insert(name) {
                        return Err(TopicError::Duplicate {
                            template: template.to_owned(),
                            name: name.to_owned(),
                        });
                    }
                    let starts_level = i == 0 || ends_with_separator(pieces.get(i - 1));
                    let ends_level = starts_with_separator(pieces.get(i + 1));
                    if !(starts_level && ends_level) {
                        return Err(TopicError::PartialLevel {
                            template: template.to_owned(),
                            name: name.to_owned(),
                        });
                    }

                    pattern.push_str(&format!("(?P<{name}>{PLACEHOLDER_VALUE})"));
                    filter.push('+');
                    placeholders.push(name.to_owned());
                }
            }
        }

        Ok(Self {
            template: template.to_owned(),
            pattern,
            filter,
            placeholders,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The match expression, unanchored and relative to the API base topic.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The subscribe filter, relative to the API base topic.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Whether the template contains no placeholders.
    pub fn is_constant(&self) -> bool {
        self.placeholders.is_empty()
    }

    /// The full expression for a topic under `base`, anchored at both ends.
    pub fn anchored(&self, base: &str) -> String {
        format!("^{}/{}$", regex::escape(base), self.pattern)
    }
}

fn split(template: &str) -> Result<Vec<Piece<'_>>, TopicError> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('%') {
        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let Some(close) = after.find('%') else {
            return Err(TopicError::Unterminated {
                template: template.to_owned(),
            });
        };
        pieces.push(Piece::Placeholder(&after[..close]));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn ends_with_separator(piece: Option<&Piece<'_>>) -> bool {
    matches!(piece, Some(Piece::Literal(text)) if text.ends_with('/'))
}

fn starts_with_separator(piece: Option<&Piece<'_>>) -> bool {
    match piece {
        None => true,
        Some(Piece::Literal(text)) => text.starts_with('/'),
        Some(Piece::Placeholder(_)) => false,
    }
}
