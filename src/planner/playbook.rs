//! Multi-step plans for compound requests.
//!
//! Each playbook is a trigger predicate plus a builder. They are tried in a
//! fixed priority order; the first one whose plan validates wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::keyword_match;
use super::timecode::{extract_time_literals, TimeLiteral};
use crate::model::{
    arg_map, ArgValue, AssetKind, ContextSnapshot, Plan, PlanStep, PlaybookMatch, RiskLevel,
    StepValueReference, Thought, TrackKind,
};
use crate::reference::validate_plan;
use crate::registry::ToolCatalog;

const SUBTITLE_WINDOW_SECS: f64 = 3.0;
const MIN_SUBTITLE_SECS: f64 = 1.0;
const MUSIC_DUCK_VOLUME: f64 = 0.55;
const DEFAULT_GENERATED_SECS: f64 = 6.0;
const MIN_GENERATED_SECS: f64 = 5.0;
const MAX_GENERATED_SECS: f64 = 120.0;
const SUBTITLE_FALLBACK_TEXT: &str = "Subtitle";
const PROMPT_FALLBACK: &str = "Cinematic b-roll shot";
/// A time right after one of these words is where to put the clip, not how long it is.
const PLACEMENT_WORDS: &[&str] = &["at", "from", "after", "to", "until", "@"];

static BROLL_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bb[\s-]?roll\b|\bcutaways?\b|비롤|인서트\s*컷|인서트").ok());
static MUSIC_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bmusic\b|\bsoundtrack\b|\bbgm\b|음악|배경음").ok());
static SUBTITLE_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bsubtitles?\b|\bcaptions?\b|자막").ok());
static GENERATE_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bgenerate[ds]?\b|\bcreate\b|\bai\b|생성|만들").ok());
static VIDEO_KEYWORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bvideos?\b|\bclips?\b|\bfootage\b|\bshot\b|영상|비디오").ok());
static PLACE_KEYWORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\binsert\b|\bplace\b|\bput\b|\btimeline\b|\bplayhead\b|삽입|배치|넣어|타임라인")
        .ok()
});

struct Playbook {
    id: &'static str,
    confidence: f64,
    requires: &'static [&'static str],
    triggers: &'static [&'static LazyLock<Option<Regex>>],
    build: fn(&Thought, &ContextSnapshot, &str, &dyn Fn(&str) -> bool) -> Option<Plan>,
}

static PLAYBOOKS: &[Playbook] = &[
    Playbook {
        id: "generate_and_place",
        confidence: 0.89,
        requires: &["generate_video", "check_generation_status", "insert_clip"],
        triggers: &[&GENERATE_KEYWORDS, &VIDEO_KEYWORDS, &PLACE_KEYWORDS],
        build: build_generate_and_place,
    },
    Playbook {
        id: "broll_music_subtitles",
        confidence: 0.9,
        requires: &["get_unused_assets", "insert_clip", "add_caption"],
        triggers: &[&BROLL_KEYWORDS, &MUSIC_KEYWORDS, &SUBTITLE_KEYWORDS],
        build: build_broll_music_subtitles,
    },
];

/// Pick a playbook for `thought`, or `None` when nothing applies.
pub fn build_playbook<C: ToolCatalog + ?Sized>(
    thought: &Thought,
    context: &ContextSnapshot,
    catalog: &C,
) -> Option<PlaybookMatch> {
    let sequence_id = context.sequence_id.as_deref()?;
    let text = thought.search_text();
    let has_tool = |name: &str| catalog.has_tool(name);

    for playbook in PLAYBOOKS {
        if !playbook.triggers.iter().all(|re| keyword_match(re, &text)) {
            continue;
        }
        if let Some(missing) = playbook.requires.iter().find(|t| !catalog.has_tool(t)) {
            debug!(playbook = playbook.id, missing, "playbook: required tool not registered");
            continue;
        }
        let Some(plan) = (playbook.build)(thought, context, sequence_id, &has_tool) else {
            debug!(playbook = playbook.id, "playbook: context lacks a track or asset");
            continue;
        };
        let validation = validate_plan(&plan, catalog);
        if !validation.is_valid() {
            let summary: Vec<String> = validation.errors.iter().map(ToString::to_string).collect();
            debug!(playbook = playbook.id, issues = %summary.join("; "), "playbook: plan discarded");
            continue;
        }
        debug!(playbook = playbook.id, steps = plan.steps.len(), "playbook matched");
        return Some(PlaybookMatch {
            playbook_id: playbook.id.to_string(),
            confidence: playbook.confidence,
            plan,
        });
    }
    None
}

fn reference(step: &str, path: &str) -> ArgValue {
    StepValueReference::new(step, path).into()
}

fn reference_or(step: &str, path: &str, default: &str) -> ArgValue {
    StepValueReference::new(step, path).with_default(default).into()
}

/// Caption window starting at `start`, clamped to the timeline end. Only a
/// clamp that leaves nothing (start at or past the end) widens it.
fn subtitle_window(context: &ContextSnapshot, start: f64) -> (f64, f64) {
    let mut end = start + SUBTITLE_WINDOW_SECS;
    if let Some(limit) = context.timeline_end() {
        end = end.min(limit);
    }
    if end <= start {
        end = start + MIN_SUBTITLE_SECS;
    }
    (start, end)
}

fn is_placement(text: &str, literal: &TimeLiteral) -> bool {
    let before = text.get(..literal.start).unwrap_or_default();
    let after = text.get(literal.end..).unwrap_or_default().trim_start();
    let preceding = before.split_whitespace().next_back().unwrap_or_default();
    PLACEMENT_WORDS.contains(&preceding) || after.starts_with('에') || after.starts_with("부터")
}

/// Length asked for in `text`: the first unit-suffixed value that is not a
/// placement ("a 10 second video", "30초 영상"). Timecodes never count.
fn requested_duration(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    extract_time_literals(&lower)
        .into_iter()
        .filter(TimeLiteral::can_be_duration)
        .find(|t| !is_placement(&lower, t))
        .map(|t| t.seconds)
}

fn build_broll_music_subtitles(
    thought: &Thought,
    context: &ContextSnapshot,
    sequence_id: &str,
    has_tool: &dyn Fn(&str) -> bool,
) -> Option<Plan> {
    let video_track = context.preferred_track(TrackKind::Video)?;
    let fallback_video = context.preferred_asset(AssetKind::Video)?;
    let at = context.timeline_start();

    let mut steps = vec![
        PlanStep::new(
            "playbook_get_unused_video",
            "get_unused_assets",
            arg_map([("assetType", "video")]),
        )
        .describe("Find an unused video asset for B-roll")
        .duration_ms(150),
        PlanStep::new(
            "playbook_insert_broll",
            "insert_clip",
            arg_map([
                ("sequenceId", ArgValue::from(sequence_id)),
                ("trackId", video_track.id.as_str().into()),
                (
                    "assetId",
                    reference_or("playbook_get_unused_video", "data[0].id", &fallback_video.id),
                ),
                ("timelineStart", at.into()),
            ]),
        )
        .describe(format!("Insert B-roll on {}", video_track.name))
        .risk(RiskLevel::Medium)
        .duration_ms(400)
        .after("playbook_get_unused_video"),
    ];

    let audio_track = context.preferred_track(TrackKind::Audio);
    let fallback_audio = context.preferred_asset(AssetKind::Audio);
    if let (Some(track), Some(asset), true) =
        (audio_track, fallback_audio, has_tool("adjust_volume"))
    {
        steps.push(
            PlanStep::new(
                "playbook_get_unused_audio",
                "get_unused_assets",
                arg_map([("assetType", "audio")]),
            )
            .describe("Find an unused music asset")
            .duration_ms(150),
        );
        steps.push(
            PlanStep::new(
                "playbook_insert_music",
                "insert_clip",
                arg_map([
                    ("sequenceId", ArgValue::from(sequence_id)),
                    ("trackId", track.id.as_str().into()),
                    (
                        "assetId",
                        reference_or("playbook_get_unused_audio", "data[0].id", &asset.id),
                    ),
                    ("timelineStart", at.into()),
                ]),
            )
            .describe(format!("Insert background music on {}", track.name))
            .risk(RiskLevel::Medium)
            .duration_ms(400)
            .after("playbook_get_unused_audio"),
        );
        steps.push(
            PlanStep::new(
                "playbook_duck_music",
                "adjust_volume",
                arg_map([
                    ("sequenceId", ArgValue::from(sequence_id)),
                    ("clipId", reference("playbook_insert_music", "data.clipId")),
                    ("volume", MUSIC_DUCK_VOLUME.into()),
                ]),
            )
            .describe("Lower the music under dialogue")
            .duration_ms(100)
            .after("playbook_insert_music"),
        );
    }

    let (start, end) = subtitle_window(context, at);
    let text = super::first_quoted(&thought.understanding)
        .unwrap_or_else(|| SUBTITLE_FALLBACK_TEXT.to_string());
    steps.push(
        PlanStep::new(
            "playbook_add_subtitles",
            "add_caption",
            arg_map([
                ("sequenceId", ArgValue::from(sequence_id)),
                ("text", text.into()),
                ("startTime", start.into()),
                ("endTime", end.into()),
            ]),
        )
        .describe("Add a subtitle over the B-roll")
        .duration_ms(150)
        .after("playbook_insert_broll"),
    );

    Some(
        Plan::new(thought.understanding.clone(), steps).rollback(
            "Undo the inserted clips and caption, then restore the previous music level.",
        ),
    )
}

fn build_generate_and_place(
    thought: &Thought,
    context: &ContextSnapshot,
    sequence_id: &str,
    _has_tool: &dyn Fn(&str) -> bool,
) -> Option<Plan> {
    let video_track = context.preferred_track(TrackKind::Video)?;
    let prompt = if thought.understanding.trim().is_empty() {
        PROMPT_FALLBACK.to_string()
    } else {
        thought.understanding.split_whitespace().collect::<Vec<_>>().join(" ")
    };
    let duration = requested_duration(&thought.understanding).map_or(DEFAULT_GENERATED_SECS, |d| {
        d.clamp(MIN_GENERATED_SECS, MAX_GENERATED_SECS)
    });

    let steps = vec![
        PlanStep::new(
            "playbook_generate_video",
            "generate_video",
            arg_map([
                ("prompt", ArgValue::from(prompt)),
                ("quality", "standard".into()),
                ("durationSec", duration.into()),
            ]),
        )
        .describe("Generate a video clip")
        .risk(RiskLevel::High)
        .duration_ms(30_000),
        PlanStep::new(
            "playbook_check_generation_status",
            "check_generation_status",
            arg_map([("jobId", reference("playbook_generate_video", "data.jobId"))]),
        )
        .describe("Wait for the generation job")
        .duration_ms(1_000)
        .after("playbook_generate_video"),
        PlanStep::new(
            "playbook_insert_generated",
            "insert_clip",
            arg_map([
                ("sequenceId", ArgValue::from(sequence_id)),
                ("trackId", video_track.id.as_str().into()),
                (
                    "assetId",
                    reference("playbook_check_generation_status", "data.assetId"),
                ),
                ("timelineStart", context.timeline_start().into()),
            ]),
        )
        .describe(format!("Place the generated clip on {}", video_track.name))
        .risk(RiskLevel::Medium)
        .duration_ms(400)
        .after("playbook_check_generation_status"),
    ];

    Some(
        Plan::new(thought.understanding.clone(), steps)
            .requiring_approval(true)
            .rollback("Cancel the generation job if it is still running, or undo the inserted clip."),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{AssetSummary, SelectionSnapshot, TrackSummary};
    use crate::registry::catalog::standard_definitions;
    use crate::registry::ToolDefinition;

    fn track(id: &str, kind: TrackKind) -> TrackSummary {
        TrackSummary {
            id: id.into(),
            name: id.to_uppercase(),
            kind,
            clip_count: 0,
        }
    }

    fn asset(id: &str, kind: AssetKind) -> AssetSummary {
        AssetSummary {
            id: id.into(),
            name: format!("{id}.file"),
            kind,
            duration: Some(10.0),
        }
    }

    fn context() -> ContextSnapshot {
        ContextSnapshot {
            sequence_id: Some("seq_1".into()),
            playhead: 2.0,
            timeline_duration: 30.0,
            tracks: vec![track("v1", TrackKind::Video), track("a1", TrackKind::Audio)],
            assets: vec![
                asset("fallback_video", AssetKind::Video),
                asset("fallback_music", AssetKind::Audio),
            ],
            selection: SelectionSnapshot::default(),
        }
    }

    fn build(command: &str, context: &ContextSnapshot, catalog: &[ToolDefinition]) -> Option<PlaybookMatch> {
        build_playbook(&Thought::from_command(command), context, catalog)
    }

    #[test]
    fn broll_music_and_subtitles() {
        let m = build(
            "Please add B-roll with background music and subtitles",
            &context(),
            &standard_definitions(),
        )
        .unwrap();
        assert_eq!(m.playbook_id, "broll_music_subtitles");
        assert_eq!(m.confidence, 0.9);
        assert!(!m.plan.requires_approval);

        let ids: Vec<&str> = m.plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "playbook_get_unused_video",
                "playbook_insert_broll",
                "playbook_get_unused_audio",
                "playbook_insert_music",
                "playbook_duck_music",
                "playbook_add_subtitles",
            ]
        );

        let insert = m.plan.step("playbook_insert_broll").unwrap();
        let r = insert.args["assetId"].as_reference().unwrap();
        assert_eq!(r.from_step, "playbook_get_unused_video");
        assert_eq!(r.path, "data[0].id");
        assert_eq!(r.default, Some(serde_json::json!("fallback_video")));
        assert_eq!(insert.depends_on, ["playbook_get_unused_video"]);

        let duck = m.plan.step("playbook_duck_music").unwrap();
        assert_eq!(duck.args["volume"].as_f64(), Some(0.55));
        assert_eq!(duck.args["clipId"].as_reference().unwrap().path, "data.clipId");

        let caption = m.plan.step("playbook_add_subtitles").unwrap();
        assert_eq!(caption.args["text"].as_str(), Some("Subtitle"));
        assert_eq!(caption.args["startTime"].as_f64(), Some(2.0));
        assert_eq!(caption.args["endTime"].as_f64(), Some(5.0));
    }

    #[test]
    fn music_steps_need_audio_track_and_volume_tool() {
        let mut ctx = context();
        ctx.tracks.retain(|t| t.kind == TrackKind::Video);
        let m = build(
            "add b-roll with music and subtitles",
            &ctx,
            &standard_definitions(),
        )
        .unwrap();
        assert_eq!(m.plan.steps.len(), 3);

        let catalog: Vec<ToolDefinition> = standard_definitions()
            .into_iter()
            .filter(|d| d.name != "adjust_volume")
            .collect();
        let m = build("add b-roll with music and subtitles", &context(), &catalog).unwrap();
        assert!(m.plan.step("playbook_duck_music").is_none());
    }

    fn caption_window(playhead: f64) -> (Option<f64>, Option<f64>) {
        let mut ctx = context();
        ctx.playhead = playhead;
        let m = build(
            "b-roll, music and subtitles saying \"Sunset\"",
            &ctx,
            &standard_definitions(),
        )
        .unwrap();
        let caption = m.plan.step("playbook_add_subtitles").unwrap();
        assert_eq!(caption.args["text"].as_str(), Some("Sunset"));
        (caption.args["startTime"].as_f64(), caption.args["endTime"].as_f64())
    }

    #[test]
    fn subtitle_window_clamps_to_timeline_end() {
        // [29.5, 32.5] is cut short at the 30 s end and stays inside the timeline
        assert_eq!(caption_window(29.5), (Some(29.5), Some(30.0)));
        assert_eq!(caption_window(28.0), (Some(28.0), Some(30.0)));
    }

    #[test]
    fn subtitle_window_widens_only_when_clamp_empties_it() {
        // The insertion point is clamped to the end, so nothing is left to clamp into
        assert_eq!(caption_window(30.0), (Some(30.0), Some(31.0)));
        assert_eq!(caption_window(45.0), (Some(30.0), Some(31.0)));
    }

    #[test]
    fn generate_and_place() {
        let m = build(
            "Generate a video and insert it on timeline at playhead",
            &context(),
            &standard_definitions(),
        )
        .unwrap();
        assert_eq!(m.playbook_id, "generate_and_place");
        assert!(m.plan.requires_approval);
        assert!(!m.plan.rollback_strategy.is_empty());

        let generate = m.plan.step("playbook_generate_video").unwrap();
        assert_eq!(generate.args["quality"].as_str(), Some("standard"));
        assert_eq!(generate.args["durationSec"].as_f64(), Some(6.0));

        let status = m.plan.step("playbook_check_generation_status").unwrap();
        let r = status.args["jobId"].as_reference().unwrap();
        assert_eq!(r.from_step, "playbook_generate_video");
        assert_eq!(r.path, "data.jobId");

        let insert = m.plan.step("playbook_insert_generated").unwrap();
        assert_eq!(
            insert.args["assetId"].as_reference().unwrap().from_step,
            "playbook_check_generation_status"
        );
    }

    #[test]
    fn generated_duration_is_clamped() {
        let m = build(
            "generate a 300 second video and place it on the timeline",
            &context(),
            &standard_definitions(),
        )
        .unwrap();
        let generate = m.plan.step("playbook_generate_video").unwrap();
        assert_eq!(generate.args["durationSec"].as_f64(), Some(120.0));

        let m = build(
            "generate a 2s video and place it on the timeline",
            &context(),
            &standard_definitions(),
        )
        .unwrap();
        let generate = m.plan.step("playbook_generate_video").unwrap();
        assert_eq!(generate.args["durationSec"].as_f64(), Some(5.0));
    }

    fn generated_duration(command: &str) -> Option<f64> {
        let m = build(command, &context(), &standard_definitions()).unwrap();
        assert_eq!(m.playbook_id, "generate_and_place");
        m.plan.step("playbook_generate_video").unwrap().args["durationSec"].as_f64()
    }

    #[test]
    fn generated_duration_ignores_timecodes_and_positions() {
        assert_eq!(
            generated_duration("Generate a video and insert it on the timeline at 00:45"),
            Some(6.0)
        );
        assert_eq!(
            generated_duration("Generate a video and place it at 20s on the timeline"),
            Some(6.0)
        );
        assert_eq!(
            generated_duration("Generate a 10 second video and place it at 20s on the timeline"),
            Some(10.0)
        );
        assert_eq!(
            generated_duration("place a generated video at 00:05 that is 1m30s long"),
            Some(90.0)
        );
        assert_eq!(generated_duration("30초 영상 생성해서 10초에 타임라인에 넣어줘"), Some(30.0));
    }

    #[test]
    fn no_tracks_means_no_playbook() {
        let mut ctx = context();
        ctx.tracks.clear();
        assert!(build(
            "Generate a video and insert it on timeline at playhead",
            &ctx,
            &standard_definitions(),
        )
        .is_none());
    }

    #[test]
    fn missing_tools_or_sequence_disqualify() {
        let catalog: Vec<ToolDefinition> = standard_definitions()
            .into_iter()
            .filter(|d| d.name != "check_generation_status")
            .collect();
        assert!(build(
            "Generate a video and insert it on timeline at playhead",
            &context(),
            &catalog,
        )
        .is_none());

        let mut ctx = context();
        ctx.sequence_id = None;
        assert!(build(
            "Please add B-roll with background music and subtitles",
            &ctx,
            &standard_definitions(),
        )
        .is_none());
    }

    #[test]
    fn unrelated_command_matches_nothing() {
        assert!(build("make it pop", &context(), &standard_definitions()).is_none());
    }
}
