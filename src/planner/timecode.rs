//! Time-literal grammar shared by the planners.
//!
//! Grammars are applied in priority order (timecodes, shared-unit ranges,
//! composites, unit-suffixed values). A later grammar never claims text
//! already claimed by an earlier one.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

const SECONDS_UNIT: &str = r"seconds|second|secs|sec|s|초";
const MINUTES_UNIT: &str = r"minutes|minute|mins|min|m|분";
const NUMBER: &str = r"\d+(?:\.\d+)?";

static TIMECODE_HMS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}):(\d{2}):(\d{2}(?:\.\d+)?)").ok());
static TIMECODE_MS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}):(\d{2}(?:\.\d+)?)").ok());
static RANGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"({NUMBER})\s*(?:-|~|–|to|and|through)\s*({NUMBER})\s*({SECONDS_UNIT}|{MINUTES_UNIT})"
    ))
    .ok()
});
static COMPOSITE_KO: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"(\d+)\s*분\s*({NUMBER})\s*초")).ok());
static COMPOSITE_LATIN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(\d+)\s*(?:minutes|minute|mins|min|m)\s*({NUMBER})\s*(?:seconds|second|secs|sec|s)"
    ))
    .ok()
});
static UNIT_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"({NUMBER})\s*({SECONDS_UNIT}|{MINUTES_UNIT})")).ok()
});

/// Which grammar produced a [`TimeLiteral`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLiteralKind {
    /// `HH:MM:SS` or `MM:SS`, always a timeline position.
    Timecode,
    /// One end of a `5-10s` range.
    Range,
    /// `1m30s`, `1분 30초`.
    Composite,
    /// `12.5s`, `2 min`.
    Unit,
}

/// One time value found in text. `start..end` is the byte span of the
/// literal in the lower-cased text (just the number for range ends).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeLiteral {
    pub start: usize,
    pub end: usize,
    pub seconds: f64,
    pub kind: TimeLiteralKind,
}

impl TimeLiteral {
    /// Composite and unit-suffixed literals can state a length; timecodes
    /// and range ends cannot.
    pub fn can_be_duration(&self) -> bool {
        matches!(self.kind, TimeLiteralKind::Composite | TimeLiteralKind::Unit)
    }
}

fn unit_multiplier(unit: &str) -> f64 {
    if MINUTES_UNIT.split('|').any(|u| u == unit) {
        60.0
    } else {
        1.0
    }
}

fn number(caps: &Captures<'_>, group: usize) -> Option<(f64, usize, usize)> {
    let m = caps.get(group)?;
    let value = m.as_str().parse::<f64>().ok()?;
    value.is_finite().then_some((value, m.start(), m.end()))
}

fn char_before(text: &str, at: usize) -> Option<char> {
    text.get(..at).and_then(|s| s.chars().next_back())
}

fn char_after(text: &str, at: usize) -> Option<char> {
    text.get(at..).and_then(|s| s.chars().next())
}

/// The number must not continue a word, another number or a timecode.
fn starts_cleanly(text: &str, at: usize) -> bool {
    !char_before(text, at).is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == ':')
}

/// A unit must end the word: `5s` and `5 sec.` qualify, `5 small` does not.
/// A minute marker directly followed by digits belongs to a composite.
fn unit_ends_cleanly(text: &str, unit_end: usize, unit: &str) -> bool {
    match char_after(text, unit_end) {
        None => true,
        Some(c) if unit == "분" => !c.is_ascii_digit(),
        Some(c) if unit.is_ascii() => !c.is_ascii_alphabetic(),
        Some(_) => true,
    }
}

struct Claims {
    spans: Vec<(usize, usize)>,
}

impl Claims {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.spans.iter().any(|&(s, e)| start < e && s < end)
    }

    fn try_claim(&mut self, start: usize, end: usize) -> bool {
        if self.overlaps(start, end) {
            return false;
        }
        self.spans.push((start, end));
        true
    }
}

fn each_match<'t>(re: &LazyLock<Option<Regex>>, text: &'t str) -> Vec<Captures<'t>> {
    re.as_ref()
        .map(|r| r.captures_iter(text).collect())
        .unwrap_or_default()
}

/// Every time value in `text`, ordered by position, duplicates (to 3
/// decimal places) removed.
pub fn extract_time_literals(text: &str) -> Vec<TimeLiteral> {
    let text = text.to_lowercase();
    let mut claims = Claims { spans: Vec::new() };
    let mut found: Vec<TimeLiteral> = Vec::new();

    for caps in each_match(&TIMECODE_HMS, &text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(((h, _, _), (m, _, _), (s, _, _))) =
            number(&caps, 1).zip(number(&caps, 2)).zip(number(&caps, 3)).map(|((a, b), c)| (a, b, c))
        else {
            continue;
        };
        if m >= 60.0 || s >= 60.0 || !starts_cleanly(&text, whole.start()) {
            continue;
        }
        if char_after(&text, whole.end()).is_some_and(|c| c.is_ascii_digit() || c == ':') {
            continue;
        }
        if claims.try_claim(whole.start(), whole.end()) {
            found.push(TimeLiteral {
                start: whole.start(),
                end: whole.end(),
                seconds: h * 3600.0 + m * 60.0 + s,
                kind: TimeLiteralKind::Timecode,
            });
        }
    }

    for caps in each_match(&TIMECODE_MS, &text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(((m, _, _), (s, _, _))) = number(&caps, 1).zip(number(&caps, 2)) else {
            continue;
        };
        if s >= 60.0 || !starts_cleanly(&text, whole.start()) {
            continue;
        }
        if char_after(&text, whole.end()).is_some_and(|c| c.is_ascii_digit() || c == ':') {
            continue;
        }
        if claims.try_claim(whole.start(), whole.end()) {
            found.push(TimeLiteral {
                start: whole.start(),
                end: whole.end(),
                seconds: m * 60.0 + s,
                kind: TimeLiteralKind::Timecode,
            });
        }
    }

    for caps in each_match(&RANGE, &text) {
        let (Some(whole), Some(unit)) = (caps.get(0), caps.get(3)) else {
            continue;
        };
        let Some(((a, a_start, a_end), (b, b_start, b_end))) = number(&caps, 1).zip(number(&caps, 2))
        else {
            continue;
        };
        if !starts_cleanly(&text, whole.start())
            || !unit_ends_cleanly(&text, unit.end(), unit.as_str())
        {
            continue;
        }
        if claims.try_claim(whole.start(), whole.end()) {
            let mult = unit_multiplier(unit.as_str());
            for (seconds, start, end) in [(a * mult, a_start, a_end), (b * mult, b_start, b_end)] {
                found.push(TimeLiteral { start, end, seconds, kind: TimeLiteralKind::Range });
            }
        }
    }

    for re in [&COMPOSITE_KO, &COMPOSITE_LATIN] {
        for caps in each_match(re, &text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(((m, _, _), (s, _, _))) = number(&caps, 1).zip(number(&caps, 2)) else {
                continue;
            };
            if !starts_cleanly(&text, whole.start())
                || char_after(&text, whole.end()).is_some_and(|c| c.is_ascii_alphabetic())
            {
                continue;
            }
            if claims.try_claim(whole.start(), whole.end()) {
                found.push(TimeLiteral {
                    start: whole.start(),
                    end: whole.end(),
                    seconds: m * 60.0 + s,
                    kind: TimeLiteralKind::Composite,
                });
            }
        }
    }

    for caps in each_match(&UNIT_VALUE, &text) {
        let (Some(whole), Some(unit)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let Some((value, _, _)) = number(&caps, 1) else {
            continue;
        };
        if !starts_cleanly(&text, whole.start())
            || !unit_ends_cleanly(&text, unit.end(), unit.as_str())
        {
            continue;
        }
        if claims.try_claim(whole.start(), whole.end()) {
            found.push(TimeLiteral {
                start: whole.start(),
                end: whole.end(),
                seconds: value * unit_multiplier(unit.as_str()),
                kind: TimeLiteralKind::Unit,
            });
        }
    }

    found.sort_by_key(|t| t.start);
    let mut seen = HashSet::new();
    found.retain(|t| seen.insert(round_millis(t.seconds)));
    found
}

#[allow(clippy::cast_possible_truncation)]
fn round_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Time values in `text`, in order of appearance.
pub fn extract_time_values(text: &str) -> Vec<f64> {
    extract_time_literals(text)
        .into_iter()
        .map(|t| t.seconds)
        .collect()
}

/// The first two values as an ascending `(start, end)` window.
pub fn extract_time_range(text: &str) -> Option<(f64, f64)> {
    let values = extract_time_values(text);
    match values.as_slice() {
        [a, b, ..] => Some((a.min(*b), a.max(*b))),
        _ => None,
    }
}

/// `HH:MM:SS.mmm`. Negative or non-finite input renders as zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_timecode(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{ms:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}

/// Compact seconds form: `12.5s`, `90s`.
pub fn format_seconds(seconds: f64) -> String {
    let value = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };
    let fixed = format!("{value:.3}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}s")
}
