//! Deterministic single-step shortcuts for unambiguous commands.
//!
//! Recognizers run in a fixed order and the first one that yields a
//! schema-valid plan wins. There is no score competition between them.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::timecode::{extract_time_range, extract_time_values, format_seconds};
use super::{first_quoted, keyword_match, strip_quoted};
use crate::model::{
    arg_map, ArgMap, ArgValue, ContextSnapshot, FastPathIntent, FastPathMatch, Plan, PlanStep,
};
use crate::registry::params::TrimEdge;
use crate::registry::ToolCatalog;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.85;

/// Seconds covered by a caption when only its start is known.
const CAPTION_DEFAULT_SECS: f64 = 3.0;
const FAST_PATH_STEP_MS: u64 = 200;

static SPLIT_KEYWORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\bsplit\b|\bslice\b|\bcut\s+(?:it\s+|the\s+clip\s+)?(?:at|here)\b|분할|자르|잘라").ok()
});
static TRIM_KEYWORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\btrim\b|\bshorten\b|\bcut\s+(?:off\s+)?the\s+(?:first|last)\b|트림|다듬|줄여").ok()
});
static TRIM_END_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(?:end|tail|last|out)\b|끝|뒤|뒷부분").ok());
static MOVE_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bmove\b|\bshift\b|\bslide\b|이동|옮겨|옮기").ok());
static CAPTION_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bcaptions?\b|\bsubtitles?\b|\btitle\s+text\b|자막").ok());
static DELETE_KEYWORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\bdelete\b|\bremove\b|\bcut\s+out\b|\bripple\b|삭제|지워|제거").ok()
});

struct Request<'a> {
    /// Original command, used for quoted text.
    text: &'a str,
    lower: String,
    context: &'a ContextSnapshot,
    sequence_id: &'a str,
}

struct Recognizer {
    intent: FastPathIntent,
    confidence: f64,
    keywords: &'static LazyLock<Option<Regex>>,
    build: fn(&Request<'_>) -> Option<(ArgMap, String)>,
}

static RECOGNIZERS: &[Recognizer] = &[
    Recognizer {
        intent: FastPathIntent::Split,
        confidence: 0.95,
        keywords: &SPLIT_KEYWORDS,
        build: build_split,
    },
    Recognizer {
        intent: FastPathIntent::Trim,
        confidence: 0.92,
        keywords: &TRIM_KEYWORDS,
        build: build_trim,
    },
    Recognizer {
        intent: FastPathIntent::Move,
        confidence: 0.90,
        keywords: &MOVE_KEYWORDS,
        build: build_move,
    },
    Recognizer {
        intent: FastPathIntent::AddCaption,
        confidence: 0.90,
        keywords: &CAPTION_KEYWORDS,
        build: build_caption,
    },
    Recognizer {
        intent: FastPathIntent::DeleteRange,
        confidence: 0.88,
        keywords: &DELETE_KEYWORDS,
        build: build_delete_range,
    },
];

/// Match `input` against the fast-path recognizers.
///
/// Returns the first recognizer (in fixed order) whose confidence is at
/// least `min_confidence` and whose plan passes the tool's schema.
pub fn match_fast_path<C: ToolCatalog + ?Sized>(
    input: &str,
    context: &ContextSnapshot,
    catalog: &C,
    min_confidence: f64,
) -> Option<FastPathMatch> {
    let sequence_id = context.sequence_id.as_deref()?;
    let request = Request {
        text: input,
        lower: input.to_lowercase(),
        context,
        sequence_id,
    };

    for recognizer in RECOGNIZERS {
        if recognizer.confidence < min_confidence || !keyword_match(recognizer.keywords, &request.lower)
        {
            continue;
        }
        let tool = recognizer.intent.tool();
        if !catalog.has_tool(tool) {
            debug!(tool, "fast path: tool not registered");
            continue;
        }
        let Some((args, description)) = (recognizer.build)(&request) else {
            debug!(tool, "fast path: keywords matched but arguments incomplete");
            continue;
        };
        let json = ArgValue::Object(args.clone()).to_json();
        if let Err(e) = catalog.validate_args(tool, &json) {
            debug!(tool, error = %e, "fast path: candidate failed schema validation");
            continue;
        }

        let risk = catalog
            .tool_definition(tool)
            .map(|d| d.risk_level)
            .unwrap_or_default();
        let step = PlanStep::new(format!("fast_path_{tool}"), tool, args)
            .describe(description)
            .risk(risk)
            .duration_ms(FAST_PATH_STEP_MS);
        let plan = Plan::new(input.trim(), vec![step]).rollback(format!("Undo the {tool} edit."));
        debug!(tool, confidence = recognizer.confidence, "fast path matched");
        return Some(FastPathMatch {
            intent: recognizer.intent,
            confidence: recognizer.confidence,
            plan,
        });
    }
    None
}

fn first_time(req: &Request<'_>) -> Option<f64> {
    extract_time_values(&req.lower).first().copied()
}

fn build_split(req: &Request<'_>) -> Option<(ArgMap, String)> {
    let (clip_id, track_id) = req.context.selection.single_clip()?;
    let at = first_time(req).unwrap_or_else(|| req.context.timeline_start());
    let args = arg_map([
        ("sequenceId", ArgValue::from(req.sequence_id)),
        ("trackId", track_id.into()),
        ("clipId", clip_id.into()),
        ("splitTime", at.into()),
    ]);
    Some((args, format!("Split clip {clip_id} at {}", format_seconds(at))))
}

fn build_trim(req: &Request<'_>) -> Option<(ArgMap, String)> {
    let (clip_id, track_id) = req.context.selection.single_clip()?;
    let amount = first_time(req)?;
    let edge = if keyword_match(&TRIM_END_KEYWORDS, &req.lower) {
        TrimEdge::End
    } else {
        TrimEdge::Start
    };
    let edge_name = match edge {
        TrimEdge::Start => "start",
        TrimEdge::End => "end",
    };
    let args = arg_map([
        ("sequenceId", ArgValue::from(req.sequence_id)),
        ("trackId", track_id.into()),
        ("clipId", clip_id.into()),
        ("edge", edge_name.into()),
        ("amount", amount.into()),
    ]);
    Some((
        args,
        format!("Trim {} off the {edge_name} of clip {clip_id}", format_seconds(amount)),
    ))
}

fn build_move(req: &Request<'_>) -> Option<(ArgMap, String)> {
    let (clip_id, track_id) = req.context.selection.single_clip()?;
    let to = first_time(req)?;
    let args = arg_map([
        ("sequenceId", ArgValue::from(req.sequence_id)),
        ("trackId", track_id.into()),
        ("clipId", clip_id.into()),
        ("newTimelineIn", to.into()),
    ]);
    Some((args, format!("Move clip {clip_id} to {}", format_seconds(to))))
}

fn build_caption(req: &Request<'_>) -> Option<(ArgMap, String)> {
    let text = first_quoted(req.text)?;
    // Times inside the caption text itself are not timing instructions
    let residual = strip_quoted(&req.lower);
    let values = extract_time_values(&residual);
    let (start, end) = match values.as_slice() {
        [a, b, ..] => (a.min(*b), a.max(*b)),
        [a] => (*a, a + CAPTION_DEFAULT_SECS),
        [] => {
            let at = req.context.timeline_start();
            (at, at + CAPTION_DEFAULT_SECS)
        }
    };
    let description = format!(
        "Add caption \"{text}\" from {} to {}",
        format_seconds(start),
        format_seconds(end)
    );
    let args = arg_map([
        ("sequenceId", ArgValue::from(req.sequence_id)),
        ("text", text.into()),
        ("startTime", start.into()),
        ("endTime", end.into()),
    ]);
    Some((args, description))
}

fn build_delete_range(req: &Request<'_>) -> Option<(ArgMap, String)> {
    let (start, end) = extract_time_range(&req.lower)?;
    let args = arg_map([
        ("sequenceId", ArgValue::from(req.sequence_id)),
        ("startTime", start.into()),
        ("endTime", end.into()),
    ]);
    Some((
        args,
        format!("Delete {} to {}", format_seconds(start), format_seconds(end)),
    ))
}
