//! Line fragment templates with `{{ name }}` placeholders.
//!
//! A fragment such as `Do you want to create {{ fileName }}?` compiles to a
//! regex where every literal character is escaped and each placeholder
//! becomes a capture group:
//!
//! - placeholder followed by literal text: lazy `(.*?)`, bounded by that text
//! - placeholder followed by another placeholder: lazy `(.*?)`, so the
//!   earlier one takes the shortest possible span
//! - placeholder at the end of the fragment: `(.*)`, to end of line
//!
//! Regex named groups are not used because the same name may appear twice in
//! one fragment; names are tracked by group index instead and the last
//! occurrence wins.

use regex::{Regex, RegexBuilder};

use crate::error::PatternError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A compiled line fragment.
#[derive(Debug, Clone)]
pub struct LineTemplate {
    regex: Regex,
    names: Vec<String>,
}

impl LineTemplate {
    /// Compile a fragment. `pattern_id` and `index` only feed error messages.
    pub fn compile(
        pattern_id: &str,
        index: usize,
        fragment: &str,
        case_sensitive: bool,
    ) -> Result<Self, PatternError> {
        let segments = parse(fragment).map_err(|err| match err {
            ParseError::Unbalanced => PatternError::UnbalancedPlaceholder {
                id: pattern_id.to_string(),
                index,
                fragment: fragment.to_string(),
            },
            ParseError::BadName(name) => PatternError::InvalidPlaceholderName {
                id: pattern_id.to_string(),
                index,
                name,
            },
        })?;

        let mut expr = String::with_capacity(fragment.len() + 16);
        let mut names = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => expr.push_str(&regex::escape(text)),
                Segment::Placeholder(name) => {
                    names.push(name.clone());
                    if i + 1 == segments.len() {
                        expr.push_str("(.*)");
                    } else {
                        expr.push_str("(.*?)");
                    }
                }
            }
        }

        let regex = RegexBuilder::new(&expr)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| PatternError::Compile {
                id: pattern_id.to_string(),
                index,
                message: e.to_string(),
            })?;

        Ok(Self { regex, names })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Match a line and return the captured `(name, value)` pairs, trimmed.
    pub fn captures(&self, line: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(line)?;
        let fields = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = caps.get(i + 1).map_or("", |m| m.as_str()).trim();
                (name.clone(), value.to_string())
            })
            .collect();
        Some(fields)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ParseError {
    Unbalanced,
    BadName(String),
}

fn parse(fragment: &str) -> Result<Vec<Segment>, ParseError> {
    let mut segments = Vec::new();
    let mut rest = fragment;

    while !rest.is_empty() {
        let open = rest.find(OPEN);
        let close = rest.find(CLOSE);
        match (open, close) {
            (None, None) => {
                segments.push(Segment::Literal(rest.to_string()));
                break;
            }
            // A closing brace pair before any opening one.
            (None, Some(_)) => return Err(ParseError::Unbalanced),
            (Some(o), Some(c)) if c < o => return Err(ParseError::Unbalanced),
            (Some(_), None) => return Err(ParseError::Unbalanced),
            (Some(o), Some(c)) => {
                if o > 0 {
                    segments.push(Segment::Literal(rest[..o].to_string()));
                }
                let inner = &rest[o + OPEN.len()..c];
                if inner.contains(OPEN) {
                    return Err(ParseError::Unbalanced);
                }
                let name = inner.trim();
                if !is_identifier(name) {
                    return Err(ParseError::BadName(name.to_string()));
                }
                segments.push(Segment::Placeholder(name.to_string()));
                rest = &rest[c + CLOSE.len()..];
            }
        }
    }

    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
