//! In-memory demo backend: a small project plus handlers for every
//! standard tool, operating on a [`ProjectStore`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::model::{AssetKind, SelectionSnapshot, TrackKind};
use crate::project::{
    Asset, Caption, Clip, GenerationJob, JobStatus, Project, ProjectStore, Sequence, Track,
};
use crate::registry::catalog::standard_definitions;
use crate::registry::params::{
    AddCaptionParams, AdjustVolumeParams, CheckGenerationStatusParams, DeleteRangeParams,
    GenerateVideoParams, GetTimelineInfoParams, GetUnusedAssetsParams, InsertClipParams,
    MoveClipParams, SplitClipParams, TrimClipParams, TrimEdge,
};
use crate::registry::validation::{validate_positive_finite, validate_time_range};
use crate::registry::{sync_handler, ToolHandler, ToolRegistry};

/// Clip length used when an asset has no known duration (stills).
const STILL_DURATION_SECS: f64 = 5.0;

/// Creates a demo project: one sequence with a video, audio and text track,
/// two placed clips and a few unused assets.
pub fn create_demo_project() -> Project {
    let asset = |id: &str, name: &str, kind: AssetKind, duration: Option<f64>| Asset {
        id: id.into(),
        name: name.into(),
        kind,
        duration,
    };
    let mut project = Project::new("demo_project", "Demo Project");
    project.assets = vec![
        asset("asset_intro", "intro.mp4", AssetKind::Video, Some(8.0)),
        asset("asset_interview", "interview.mp4", AssetKind::Video, Some(20.0)),
        asset("asset_city", "city_broll.mp4", AssetKind::Video, Some(6.0)),
        asset("asset_music", "ambient_bed.wav", AssetKind::Audio, Some(90.0)),
        asset("asset_logo", "logo.png", AssetKind::Image, None),
    ];
    project.sequences = vec![Sequence {
        id: "seq_main".into(),
        name: "Main Edit".into(),
        tracks: vec![
            Track {
                id: "track_v1".into(),
                name: "Video 1".into(),
                kind: TrackKind::Video,
                clips: vec![
                    Clip {
                        id: "clip_intro".into(),
                        asset_id: "asset_intro".into(),
                        timeline_in: 0.0,
                        source_in: 0.0,
                        source_out: 8.0,
                        volume: 1.0,
                    },
                    Clip {
                        id: "clip_interview".into(),
                        asset_id: "asset_interview".into(),
                        timeline_in: 8.0,
                        source_in: 2.0,
                        source_out: 20.0,
                        volume: 1.0,
                    },
                ],
            },
            Track {
                id: "track_a1".into(),
                name: "Music".into(),
                kind: TrackKind::Audio,
                clips: Vec::new(),
            },
            Track {
                id: "track_t1".into(),
                name: "Titles".into(),
                kind: TrackKind::Text,
                clips: Vec::new(),
            },
        ],
        captions: Vec::new(),
    }];
    project.active_sequence_id = Some("seq_main".into());
    project.selection = SelectionSnapshot {
        clip_ids: vec!["clip_interview".into()],
        track_ids: vec!["track_v1".into()],
        asset_ids: Vec::new(),
    };
    project.playhead = 12.0;
    project.next_id = 100;
    project
}

/// Registry with a demo handler registered for every standard tool.
pub fn demo_registry(store: &Arc<ProjectStore>) -> Result<ToolRegistry, AppError> {
    let mut registry = ToolRegistry::new();
    for definition in standard_definitions() {
        let handler = demo_handler(&definition.name, Arc::clone(store))
            .ok_or_else(|| AppError::tool_not_found(&definition.name))?;
        registry.register(definition, handler)?;
    }
    Ok(registry)
}

fn demo_handler(tool: &str, store: Arc<ProjectStore>) -> Option<Arc<dyn ToolHandler>> {
    let run: fn(&ProjectStore, Value) -> Result<Value, AppError> = match tool {
        "split_clip" => split_clip,
        "trim_clip" => trim_clip,
        "move_clip" => move_clip,
        "delete_range" => delete_range,
        "insert_clip" => insert_clip,
        "add_caption" => add_caption,
        "adjust_volume" => adjust_volume,
        "get_unused_assets" => get_unused_assets,
        "generate_video" => generate_video,
        "check_generation_status" => check_generation_status,
        "get_timeline_info" => get_timeline_info,
        _ => return None,
    };
    Some(sync_handler(move |args, _ctx| run(&store, args)))
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, AppError> {
    Ok(serde_json::from_value(args)?)
}

fn clip_not_found(clip_id: &str) -> AppError {
    AppError::NotFound {
        what: format!("Clip '{clip_id}'"),
    }
}

fn track_not_found(track_id: &str) -> AppError {
    AppError::NotFound {
        what: format!("Track '{track_id}'"),
    }
}

fn clip_on_track<'a>(
    sequence: &'a mut Sequence,
    track_id: &str,
    clip_id: &str,
) -> Result<&'a mut Clip, AppError> {
    sequence
        .track_mut(track_id)
        .ok_or_else(|| track_not_found(track_id))?
        .clips
        .iter_mut()
        .find(|c| c.id == clip_id)
        .ok_or_else(|| clip_not_found(clip_id))
}

// ── Clip edits ──────────────────────────────────────────────────────

fn split_clip(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: SplitClipParams = parse(args)?;
    store.with_project_mut(|project| {
        let right_id = project.fresh_id("clip");
        let sequence = project.sequence_mut(&p.sequence_id)?;
        let clip = clip_on_track(sequence, &p.track_id, &p.clip_id)?;
        if p.split_time <= clip.timeline_in || p.split_time >= clip.timeline_out() {
            return Err(AppError::ValidationError {
                message: format!(
                    "split time {:.3} is outside clip '{}' ({:.3}..{:.3})",
                    p.split_time,
                    clip.id,
                    clip.timeline_in,
                    clip.timeline_out()
                ),
            });
        }
        let cut = clip.source_in + (p.split_time - clip.timeline_in);
        let right = Clip {
            id: right_id.clone(),
            asset_id: clip.asset_id.clone(),
            timeline_in: p.split_time,
            source_in: cut,
            source_out: clip.source_out,
            volume: clip.volume,
        };
        clip.source_out = cut;
        if let Some(track) = sequence.track_mut(&p.track_id) {
            track.clips.push(right);
        }
        Ok(json!({ "clipIds": [p.clip_id, right_id] }))
    })
}

fn trim_clip(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: TrimClipParams = parse(args)?;
    validate_positive_finite(p.amount, "amount")?;
    store.with_project_mut(|project| {
        let sequence = project.sequence_mut(&p.sequence_id)?;
        let clip = clip_on_track(sequence, &p.track_id, &p.clip_id)?;
        if p.amount >= clip.duration() {
            return Err(AppError::ValidationError {
                message: format!(
                    "cannot trim {:.3}s from clip '{}' of length {:.3}s",
                    p.amount,
                    clip.id,
                    clip.duration()
                ),
            });
        }
        match p.edge {
            TrimEdge::Start => {
                clip.source_in += p.amount;
                clip.timeline_in += p.amount;
            }
            TrimEdge::End => clip.source_out -= p.amount,
        }
        Ok(json!({ "clipId": clip.id, "duration": clip.duration() }))
    })
}

fn move_clip(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: MoveClipParams = parse(args)?;
    if !p.new_timeline_in.is_finite() || p.new_timeline_in < 0.0 {
        return Err(AppError::ValidationError {
            message: "newTimelineIn must be finite and non-negative".into(),
        });
    }
    store.with_project_mut(|project| {
        let sequence = project.sequence_mut(&p.sequence_id)?;
        let target_id = p.target_track_id.clone().unwrap_or_else(|| p.track_id.clone());
        let source_kind = sequence
            .track(&p.track_id)
            .map(|t| t.kind)
            .ok_or_else(|| track_not_found(&p.track_id))?;
        let target_kind = sequence
            .track(&target_id)
            .map(|t| t.kind)
            .ok_or_else(|| track_not_found(&target_id))?;
        if source_kind != target_kind {
            return Err(AppError::ValidationError {
                message: format!("cannot move a clip from a {source_kind:?} track to a {target_kind:?} track"),
            });
        }

        let source = sequence
            .track_mut(&p.track_id)
            .ok_or_else(|| track_not_found(&p.track_id))?;
        let index = source
            .clips
            .iter()
            .position(|c| c.id == p.clip_id)
            .ok_or_else(|| clip_not_found(&p.clip_id))?;
        let mut clip = source.clips.remove(index);
        clip.timeline_in = p.new_timeline_in;
        let target = sequence
            .track_mut(&target_id)
            .ok_or_else(|| track_not_found(&target_id))?;
        target.clips.push(clip);
        Ok(json!({ "clipId": p.clip_id, "trackId": target_id, "timelineIn": p.new_timeline_in }))
    })
}

fn adjust_volume(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: AdjustVolumeParams = parse(args)?;
    store.with_project_mut(|project| {
        let sequence = project.sequence_mut(&p.sequence_id)?;
        let clip = sequence
            .tracks
            .iter_mut()
            .flat_map(|t| t.clips.iter_mut())
            .find(|c| c.id == p.clip_id)
            .ok_or_else(|| clip_not_found(&p.clip_id))?;
        clip.volume = p.volume;
        Ok(json!({ "clipId": p.clip_id, "volume": p.volume }))
    })
}

// ── Timeline edits ──────────────────────────────────────────────────

/// Ripple-delete `[start, end)` from one clip list. Returns (removed, shifted).
fn ripple_clips(
    clips: &mut Vec<Clip>,
    start: f64,
    end: f64,
    fresh_id: &mut dyn FnMut() -> String,
) -> (usize, usize) {
    let gap = end - start;
    let mut removed = 0;
    let mut shifted = 0;
    let mut tails = Vec::new();
    clips.retain_mut(|clip| {
        let (cin, cout) = (clip.timeline_in, clip.timeline_out());
        if cout <= start {
            return true;
        }
        if cin >= end {
            clip.timeline_in -= gap;
            shifted += 1;
            return true;
        }
        if cin >= start && cout <= end {
            removed += 1;
            return false;
        }
        if cin < start && cout > end {
            // Keep the head in place and ripple the tail up to the cut
            tails.push(Clip {
                id: fresh_id(),
                asset_id: clip.asset_id.clone(),
                timeline_in: start,
                source_in: clip.source_in + (end - cin),
                source_out: clip.source_out,
                volume: clip.volume,
            });
            clip.source_out = clip.source_in + (start - cin);
        } else if cin < start {
            clip.source_out -= cout - start;
        } else {
            clip.source_in += end - cin;
            clip.timeline_in = start;
        }
        shifted += 1;
        true
    });
    clips.extend(tails);
    (removed, shifted)
}

fn delete_range(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: DeleteRangeParams = parse(args)?;
    validate_time_range(p.start_time, p.end_time)?;
    store.with_project_mut(|project| {
        let mut next_id = project.next_id;
        let mut fresh = || {
            let id = format!("clip_{next_id}");
            next_id += 1;
            id
        };
        let sequence = project.sequence_mut(&p.sequence_id)?;
        if let Some(track_id) = &p.track_id {
            if sequence.track(track_id).is_none() {
                return Err(track_not_found(track_id));
            }
        }

        let (mut removed, mut shifted) = (0, 0);
        for track in &mut sequence.tracks {
            if p.track_id.as_ref().is_some_and(|id| *id != track.id) {
                continue;
            }
            let (r, s) = ripple_clips(&mut track.clips, p.start_time, p.end_time, &mut fresh);
            removed += r;
            shifted += s;
        }

        let gap = p.end_time - p.start_time;
        let before = sequence.captions.len();
        sequence
            .captions
            .retain(|c| c.end_time <= p.start_time || c.start_time >= p.end_time);
        let removed_captions = before - sequence.captions.len();
        for caption in &mut sequence.captions {
            if caption.start_time >= p.end_time {
                caption.start_time -= gap;
                caption.end_time -= gap;
            }
        }

        project.next_id = next_id;
        Ok(json!({
            "removedClips": removed,
            "shiftedClips": shifted,
            "removedCaptions": removed_captions,
        }))
    })
}

fn insert_clip(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: InsertClipParams = parse(args)?;
    store.with_project_mut(|project| {
        let asset = project
            .asset(&p.asset_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                what: format!("Asset '{}'", p.asset_id),
            })?;
        let clip_id = project.fresh_id("clip");
        let sequence = project.sequence_mut(&p.sequence_id)?;
        let track = sequence
            .track_mut(&p.track_id)
            .ok_or_else(|| track_not_found(&p.track_id))?;
        if asset.kind.track_kind() != track.kind {
            return Err(AppError::ValidationError {
                message: format!(
                    "asset '{}' ({:?}) cannot be placed on {:?} track '{}'",
                    asset.id, asset.kind, track.kind, track.id
                ),
            });
        }
        track.clips.push(Clip {
            id: clip_id.clone(),
            asset_id: asset.id.clone(),
            timeline_in: p.timeline_start,
            source_in: 0.0,
            source_out: asset.duration.unwrap_or(STILL_DURATION_SECS),
            volume: 1.0,
        });
        Ok(json!({ "clipId": clip_id, "trackId": p.track_id, "assetId": asset.id }))
    })
}

fn add_caption(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: AddCaptionParams = parse(args)?;
    validate_time_range(p.start_time, p.end_time)?;
    if p.text.trim().is_empty() {
        return Err(AppError::ValidationError {
            message: "caption text must not be blank".into(),
        });
    }
    store.with_project_mut(|project| {
        let caption_id = project.fresh_id("caption");
        let sequence = project.sequence_mut(&p.sequence_id)?;
        if let Some(track_id) = &p.track_id {
            if sequence.track(track_id).is_none() {
                return Err(track_not_found(track_id));
            }
        }
        sequence.captions.push(Caption {
            id: caption_id.clone(),
            text: p.text.trim().to_string(),
            start_time: p.start_time,
            end_time: p.end_time,
            track_id: p.track_id.clone(),
        });
        Ok(json!({ "captionId": caption_id }))
    })
}

// ── Queries ─────────────────────────────────────────────────────────

fn get_unused_assets(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: GetUnusedAssetsParams = parse(args)?;
    let limit = p.limit.map_or(usize::MAX, |n| n as usize);
    store.with_project(|project| {
        let assets: Vec<Value> = project
            .unused_assets()
            .into_iter()
            .filter(|a| p.asset_type.is_none_or(|kind| a.kind == kind))
            .take(limit)
            .map(|a| json!({ "id": a.id, "name": a.name, "kind": a.kind, "duration": a.duration }))
            .collect();
        Ok(Value::Array(assets))
    })
}

fn get_timeline_info(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: GetTimelineInfoParams = parse(args)?;
    store.with_project(|project| {
        let sequence = match p.sequence_id.as_deref() {
            Some(id) => project.sequence(id),
            None => project.active_sequence(),
        }
        .ok_or_else(|| AppError::NotFound {
            what: "Sequence".into(),
        })?;
        let tracks: Vec<Value> = sequence
            .tracks
            .iter()
            .map(|t| {
                let clips: Vec<Value> = t
                    .clips
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "assetId": c.asset_id,
                            "timelineIn": c.timeline_in,
                            "duration": c.duration(),
                            "volume": c.volume,
                        })
                    })
                    .collect();
                json!({ "id": t.id, "name": t.name, "kind": t.kind, "clips": clips })
            })
            .collect();
        Ok(json!({
            "sequenceId": sequence.id,
            "name": sequence.name,
            "duration": sequence.duration(),
            "playhead": project.playhead,
            "tracks": tracks,
            "captionCount": sequence.captions.len(),
        }))
    })
}

// ── Generation ──────────────────────────────────────────────────────

/// The demo backend renders instantly: the job completes as it is created.
fn generate_video(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: GenerateVideoParams = parse(args)?;
    store.with_project_mut(|project| {
        let job_id = project.fresh_id("job");
        let asset_id = project.fresh_id("asset_gen");
        project.assets.push(Asset {
            id: asset_id.clone(),
            name: format!("{job_id}.mp4"),
            kind: AssetKind::Video,
            duration: Some(p.duration_sec),
        });
        project.jobs.push(GenerationJob {
            id: job_id.clone(),
            prompt: p.prompt.clone(),
            status: JobStatus::Completed,
            asset_id: Some(asset_id),
        });
        Ok(json!({ "jobId": job_id, "status": JobStatus::Completed, "quality": p.quality }))
    })
}

fn check_generation_status(store: &ProjectStore, args: Value) -> Result<Value, AppError> {
    let p: CheckGenerationStatusParams = parse(args)?;
    store.with_project(|project| {
        let job = project
            .jobs
            .iter()
            .find(|j| j.id == p.job_id)
            .ok_or_else(|| AppError::NotFound {
                what: format!("Generation job '{}'", p.job_id),
            })?;
        Ok(json!({ "jobId": job.id, "status": job.status, "assetId": job.asset_id }))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::registry::ToolCallContext;

    fn store() -> Arc<ProjectStore> {
        Arc::new(ProjectStore::new(create_demo_project()))
    }

    async fn call(registry: &ToolRegistry, tool: &str, args: Value) -> Result<Value, AppError> {
        registry
            .handler(tool)
            .unwrap()
            .call(args, ToolCallContext::default())
            .await
    }

    #[test]
    fn every_standard_tool_has_a_demo_handler() {
        let registry = demo_registry(&store()).unwrap();
        assert_eq!(registry.len(), crate::registry::STANDARD_TOOLS.len());
    }

    #[tokio::test]
    async fn split_then_trim() {
        let store = store();
        let registry = demo_registry(&store).unwrap();
        let out = call(
            &registry,
            "split_clip",
            json!({ "sequenceId": "seq_main", "trackId": "track_v1", "clipId": "clip_interview", "splitTime": 12.0 }),
        )
        .await
        .unwrap();
        let right = out["clipIds"][1].as_str().unwrap().to_string();
        assert_eq!(store.with_project(|p| p.version), 1);

        store.with_project(|p| {
            let (_, left) = p.active_sequence().unwrap().find_clip("clip_interview").unwrap();
            assert_eq!(left.timeline_out(), 12.0);
            let (_, r) = p.active_sequence().unwrap().find_clip(&right).unwrap();
            assert_eq!(r.timeline_in, 12.0);
            assert_eq!(r.source_in, 6.0);
        });

        let err = call(
            &registry,
            "trim_clip",
            json!({ "sequenceId": "seq_main", "trackId": "track_v1", "clipId": "clip_interview", "edge": "end", "amount": 10.0 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        // Failed edits do not bump the version
        assert_eq!(store.with_project(|p| p.version), 1);
    }

    #[tokio::test]
    async fn split_outside_clip_is_rejected() {
        let registry = demo_registry(&store()).unwrap();
        let err = call(
            &registry,
            "split_clip",
            json!({ "sequenceId": "seq_main", "trackId": "track_v1", "clipId": "clip_intro", "splitTime": 20.0 }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("outside clip"));
    }

    #[tokio::test]
    async fn insert_respects_track_kind() {
        let store = store();
        let registry = demo_registry(&store).unwrap();
        let out = call(
            &registry,
            "insert_clip",
            json!({ "sequenceId": "seq_main", "trackId": "track_a1", "assetId": "asset_music", "timelineStart": 0.0 }),
        )
        .await
        .unwrap();
        assert_eq!(out["clipId"], "clip_100");

        let err = call(
            &registry,
            "insert_clip",
            json!({ "sequenceId": "seq_main", "trackId": "track_a1", "assetId": "asset_city", "timelineStart": 0.0 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn delete_range_ripples_later_clips() {
        let store = store();
        let registry = demo_registry(&store).unwrap();
        let out = call(
            &registry,
            "delete_range",
            json!({ "sequenceId": "seq_main", "startTime": 0.0, "endTime": 8.0 }),
        )
        .await
        .unwrap();
        assert_eq!(out["removedClips"], 1);
        assert_eq!(out["shiftedClips"], 1);
        store.with_project(|p| {
            let (_, clip) = p.active_sequence().unwrap().find_clip("clip_interview").unwrap();
            assert_eq!(clip.timeline_in, 0.0);
            assert_eq!(p.active_sequence().unwrap().duration(), 18.0);
        });
    }

    #[tokio::test]
    async fn delete_range_inside_a_clip_keeps_head_and_tail() {
        let store = store();
        let registry = demo_registry(&store).unwrap();
        call(
            &registry,
            "delete_range",
            json!({ "sequenceId": "seq_main", "startTime": 10.0, "endTime": 14.0, "trackId": "track_v1" }),
        )
        .await
        .unwrap();
        store.with_project(|p| {
            let seq = p.active_sequence().unwrap();
            assert_eq!(seq.tracks[0].clips.len(), 3);
            assert_eq!(seq.duration(), 22.0);
        });
    }

    #[tokio::test]
    async fn unused_assets_filter_and_limit() {
        let registry = demo_registry(&store()).unwrap();
        let videos = call(&registry, "get_unused_assets", json!({ "assetType": "video" }))
            .await
            .unwrap();
        assert_eq!(videos[0]["id"], "asset_city");
        assert_eq!(videos.as_array().unwrap().len(), 1);

        let all = call(&registry, "get_unused_assets", json!({ "limit": 2 })).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn generation_produces_a_placeable_asset() {
        let store = store();
        let registry = demo_registry(&store).unwrap();
        let job = call(
            &registry,
            "generate_video",
            json!({ "prompt": "city at night", "durationSec": 6.0 }),
        )
        .await
        .unwrap();
        let status = call(
            &registry,
            "check_generation_status",
            json!({ "jobId": job["jobId"] }),
        )
        .await
        .unwrap();
        assert_eq!(status["status"], "completed");
        let asset_id = status["assetId"].as_str().unwrap();
        assert!(store.with_project(|p| p.asset(asset_id).is_some()));
    }

    #[tokio::test]
    async fn timeline_info_summarizes_active_sequence() {
        let registry = demo_registry(&store()).unwrap();
        let info = call(&registry, "get_timeline_info", json!({})).await.unwrap();
        assert_eq!(info["sequenceId"], "seq_main");
        assert_eq!(info["duration"], 26.0);
        assert_eq!(info["tracks"][0]["clips"].as_array().unwrap().len(), 2);
    }
}
