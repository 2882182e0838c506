//! Ordered multi-line pattern matching with bottommost-wins and deduplication.
//!
//! # Algorithm
//!
//! For each registered pattern, over the ANSI-stripped lines of a snapshot:
//!
//! 1. Quick reject: the last fragment must match some line.
//! 2. Walk fragments in order. Fragment *i* is satisfied by the first line at
//!    or after the line that satisfied fragment *i-1*. A table of next
//!    matching lines per fragment keeps each walk linear in fragments.
//! 3. The first fragment is anchored at its lowest occurrence from which the
//!    remaining fragments still complete, so an answered prompt left in
//!    scrollback does not shadow a fresh copy of it below.
//! 4. The span runs from the first fragment's line to the last fragment's line.
//!
//! When several patterns match, the one whose span ends lowest on screen wins:
//! in a scrolling terminal the newest content is at the bottom, so that is the
//! prompt currently waiting for input. Ties go to the pattern registered first.
//!
//! The winner is then checked against the remembered dedup key for its
//! classification tag. An identical key yields no result.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::ansi;
use crate::dedup::DedupKey;
use crate::error::{MatchError, PatternError};
use crate::pattern::template::LineTemplate;
use crate::pattern::{PatternKind, PatternSpec};
use crate::response::{EngineContext, ResponseContext, ResponsePayload};

/// A recognized pattern on the current screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub pattern_id: String,
    pub title: String,
    /// Index of the line that satisfied the first fragment.
    pub first_line_index: usize,
    /// Index of the line that satisfied the last fragment.
    pub last_line_index: usize,
    /// Lines `first_line_index..=last_line_index` joined with `\n`.
    pub matched_text: String,
    pub extracted_data: BTreeMap<String, String>,
    pub kind: Option<PatternKind>,
    /// Keystrokes to send, if the pattern has a response.
    pub response: Option<ResponsePayload>,
}

#[derive(Debug)]
struct CompiledPattern {
    spec: PatternSpec,
    templates: Vec<LineTemplate>,
}

struct Candidate<'a> {
    pattern: &'a CompiledPattern,
    first: usize,
    last: usize,
    extracted: BTreeMap<String, String>,
}

impl CompiledPattern {
    fn compile(spec: PatternSpec) -> Result<Self, PatternError> {
        if spec.id.trim().is_empty() {
            return Err(PatternError::EmptyId);
        }
        if spec.lines.is_empty() {
            return Err(PatternError::EmptyFragments { id: spec.id });
        }
        let templates = spec
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| LineTemplate::compile(&spec.id, i, line, spec.case_sensitive))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { spec, templates })
    }

    fn find_in<'a>(&'a self, lines: &[String]) -> Option<Candidate<'a>> {
        let (first_template, rest) = self.templates.split_first()?;

        // next[k][i]: first line at or after `i` that satisfies `rest[k]`.
        let next: Vec<Vec<Option<usize>>> =
            rest.iter().map(|t| next_matches(t, lines)).collect();
        if next.last().is_some_and(|table| table[0].is_none()) {
            return None;
        }

        // The lowest start that still completes is the newest instance.
        let (start, path) = (0..lines.len()).rev().find_map(|start| {
            if !first_template.is_match(&lines[start]) {
                return None;
            }
            walk(start, &next).map(|path| (start, path))
        })?;

        let mut extracted: BTreeMap<String, String> =
            first_template.captures(&lines[start])?.into_iter().collect();
        for (template, &index) in rest.iter().zip(&path) {
            // Later fragments overwrite earlier values for the same name.
            extracted.extend(template.captures(&lines[index])?);
        }

        Some(Candidate {
            pattern: self,
            first: start,
            last: path.last().copied().unwrap_or(start),
            extracted,
        })
    }
}

/// For each line index, the first line at or after it that `template` matches.
fn next_matches(template: &LineTemplate, lines: &[String]) -> Vec<Option<usize>> {
    let mut table = vec![None; lines.len() + 1];
    for i in (0..lines.len()).rev() {
        table[i] = if template.is_match(&lines[i]) {
            Some(i)
        } else {
            table[i + 1]
        };
    }
    table
}

/// Line indices satisfying each later fragment, starting from `start`.
fn walk(start: usize, next: &[Vec<Option<usize>>]) -> Option<Vec<usize>> {
    let mut cursor = start;
    next.iter()
        .map(|table| {
            cursor = table[cursor]?;
            Some(cursor)
        })
        .collect()
}

/// Registry of compiled patterns plus per-tag dedup memory.
#[derive(Debug, Default)]
pub struct PatternMatcher {
    patterns: Vec<CompiledPattern>,
    /// Dedup memory for [`process_data`](Self::process_data).
    last_emitted: HashMap<Option<PatternKind>, DedupKey>,
    /// Dedup memory for [`process_data_by_type`](Self::process_data_by_type).
    last_emitted_by_type: HashMap<PatternKind, DedupKey>,
    context: EngineContext,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a matcher whose computed responses see `context`.
    pub fn with_context(context: EngineContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Compile and register a pattern.
    ///
    /// Rejects empty fragment lists, malformed placeholders and duplicate ids.
    /// Already-registered patterns are untouched on error.
    pub fn add_pattern(&mut self, spec: PatternSpec) -> Result<(), PatternError> {
        if self.patterns.iter().any(|p| p.spec.id == spec.id) {
            return Err(PatternError::DuplicateId { id: spec.id });
        }
        let compiled = CompiledPattern::compile(spec)?;
        self.patterns.push(compiled);
        Ok(())
    }

    /// Unregister a pattern. Returns false if no pattern had this id.
    pub fn remove_pattern(&mut self, id: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.spec.id != id);
        self.patterns.len() != before
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern_ids(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.spec.id.as_str())
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PatternSpec> {
        self.patterns.iter().map(|p| &p.spec)
    }

    /// Trigger texts of all patterns that have one, with their tags.
    pub fn trigger_texts(&self) -> Vec<(String, Option<PatternKind>)> {
        self.patterns
            .iter()
            .filter_map(|p| p.spec.trigger_text.clone().map(|t| (t, p.spec.kind)))
            .collect()
    }

    /// Forget every remembered dedup key, e.g. when a new child session starts.
    pub fn reset_dedup(&mut self) {
        self.last_emitted.clear();
        self.last_emitted_by_type.clear();
    }

    /// Match a snapshot against all patterns.
    ///
    /// Returns at most one result: the bottommost match, unless its dedup key
    /// equals the one last emitted for its tag.
    pub fn process_data(&mut self, screen_text: &str) -> Result<Vec<MatchResult>, MatchError> {
        let lines = ansi::to_lines(screen_text);
        let Some(candidate) = Self::bottommost(self.patterns.iter(), &lines) else {
            return Ok(Vec::new());
        };

        let kind = candidate.pattern.spec.kind;
        let matched_text = lines[candidate.first..=candidate.last].join("\n");
        let key = DedupKey::new(kind, &matched_text);
        if self.last_emitted.get(&kind) == Some(&key) {
            return Ok(Vec::new());
        }

        let result = Self::build_result(&self.context, candidate, matched_text)?;
        self.last_emitted.insert(kind, key);
        Ok(vec![result])
    }

    /// Like [`process_data`](Self::process_data), restricted to one tag and
    /// with its own dedup memory.
    pub fn process_data_by_type(
        &mut self,
        screen_text: &str,
        kind: PatternKind,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let lines = ansi::to_lines(screen_text);
        let pool = self.patterns.iter().filter(|p| p.spec.kind == Some(kind));
        let Some(candidate) = Self::bottommost(pool, &lines) else {
            return Ok(Vec::new());
        };

        let matched_text = lines[candidate.first..=candidate.last].join("\n");
        let key = DedupKey::new(Some(kind), &matched_text);
        if self.last_emitted_by_type.get(&kind) == Some(&key) {
            return Ok(Vec::new());
        }

        let result = Self::build_result(&self.context, candidate, matched_text)?;
        self.last_emitted_by_type.insert(kind, key);
        Ok(vec![result])
    }

    fn bottommost<'a>(
        pool: impl Iterator<Item = &'a CompiledPattern>,
        lines: &[String],
    ) -> Option<Candidate<'a>> {
        pool.filter_map(|p| p.find_in(lines))
            .fold(None, |best: Option<Candidate<'a>>, c| match best {
                Some(b) if b.last >= c.last => Some(b),
                _ => Some(c),
            })
    }

    fn build_result(
        context: &EngineContext,
        candidate: Candidate<'_>,
        matched_text: String,
    ) -> Result<MatchResult, MatchError> {
        let spec = &candidate.pattern.spec;
        let response = match &spec.response {
            Some(response) => {
                let ctx = ResponseContext {
                    pattern_id: &spec.id,
                    matched_text: &matched_text,
                    extracted: &candidate.extracted,
                    engine: context,
                };
                response
                    .resolve(&ctx)
                    .map_err(|source| MatchError::Response {
                        pattern_id: spec.id.clone(),
                        source,
                    })?
            }
            None => None,
        };

        Ok(MatchResult {
            pattern_id: spec.id.clone(),
            title: spec.title.clone(),
            first_line_index: candidate.first,
            last_line_index: candidate.last,
            matched_text,
            extracted_data: candidate.extracted,
            kind: spec.kind,
            response,
        })
    }
}
