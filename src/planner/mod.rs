pub mod fast_path;
pub mod playbook;
pub mod timecode;

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::model::{ContextSnapshot, PlannedCommand, Thought};
use crate::registry::ToolCatalog;

pub use fast_path::{match_fast_path, DEFAULT_MIN_CONFIDENCE};
pub use playbook::build_playbook;

/// Opening and closing marks of a quoted segment.
const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('“', '”'), ('「', '」'), ('\'', '\'')];

pub(crate) fn keyword_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn char_before(text: &str, at: usize) -> Option<char> {
    text.get(..at).and_then(|s| s.chars().next_back())
}

fn char_after(text: &str, at: usize) -> Option<char> {
    text.get(at..).and_then(|s| s.chars().next())
}

/// A quoted segment: `outer` includes the marks, `inner` is the text between.
struct QuotedSpan {
    outer: Range<usize>,
    inner: Range<usize>,
}

/// Where the segment opened before `from` closes. A single quote only
/// closes when no word character follows it (`'Let's go'`).
fn find_closer(text: &str, from: usize, close: char) -> Option<usize> {
    text.get(from..)?
        .char_indices()
        .map(|(i, c)| (from + i, c))
        .find(|&(at, c)| {
            c == close
                && (close != '\'' || !char_after(text, at + c.len_utf8()).is_some_and(is_word_char))
        })
        .map(|(at, _)| at)
}

/// Quoted segments in order. An apostrophe inside a word (`director's`)
/// never opens a single-quoted segment, and a mark without a partner is
/// plain text.
fn quoted_spans(text: &str) -> Vec<QuotedSpan> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while let Some(c) = char_after(text, pos) {
        let next = pos + c.len_utf8();
        let closer = QUOTE_PAIRS
            .iter()
            .find(|(open, _)| *open == c)
            .map(|&(_, close)| close)
            .filter(|_| c != '\'' || !char_before(text, pos).is_some_and(is_word_char));
        if let Some(close_at) = closer.and_then(|close| find_closer(text, next, close)) {
            let end = close_at + char_after(text, close_at).map_or(1, char::len_utf8);
            spans.push(QuotedSpan {
                outer: pos..end,
                inner: next..close_at,
            });
            pos = end;
        } else {
            pos = next;
        }
    }
    spans
}

/// First non-blank quoted substring, trimmed.
pub fn first_quoted(text: &str) -> Option<String> {
    quoted_spans(text)
        .into_iter()
        .filter_map(|span| text.get(span.inner))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// `text` with every quoted substring removed.
pub fn strip_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in quoted_spans(text) {
        out.push_str(text.get(last..span.outer.start).unwrap_or_default());
        out.push(' ');
        last = span.outer.end;
    }
    out.push_str(text.get(last..).unwrap_or_default());
    out
}

/// Knobs for [`plan_command`], normally taken from the orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerOptions {
    pub min_confidence: f64,
    pub playbooks_enabled: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            playbooks_enabled: true,
        }
    }
}

/// Planning entry point: the fast path first, then the playbooks.
pub fn plan_command<C: ToolCatalog + ?Sized>(
    command: &str,
    context: &ContextSnapshot,
    catalog: &C,
    options: PlannerOptions,
) -> Option<PlannedCommand> {
    if let Some(m) = match_fast_path(command, context, catalog, options.min_confidence) {
        return Some(PlannedCommand::FastPath(m));
    }
    if !options.playbooks_enabled {
        debug!("no fast-path match and playbooks are disabled");
        return None;
    }
    let thought = Thought::from_command(command);
    let planned = build_playbook(&thought, context, catalog).map(PlannedCommand::Playbook);
    if planned.is_none() {
        debug!(command, "no planner claimed the command");
    }
    planned
}
