use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::AssetKind;

// ── Clip params ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SplitClipParams {
    pub sequence_id: String,
    pub track_id: String,
    pub clip_id: String,
    /// Timeline position of the cut, in seconds.
    #[schemars(range(min = 0.0))]
    pub split_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum TrimEdge {
    Start,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct TrimClipParams {
    pub sequence_id: String,
    pub track_id: String,
    pub clip_id: String,
    pub edge: TrimEdge,
    /// Seconds removed from the chosen edge.
    #[schemars(range(min = 0.0))]
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct MoveClipParams {
    pub sequence_id: String,
    pub track_id: String,
    pub clip_id: String,
    #[schemars(range(min = 0.0))]
    pub new_timeline_in: f64,
    /// Move onto another track. Defaults to the clip's current track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_track_id: Option<String>,
}

// ── Timeline params ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AddCaptionParams {
    pub sequence_id: String,
    #[schemars(length(min = 1))]
    pub text: String,
    #[schemars(range(min = 0.0))]
    pub start_time: f64,
    #[schemars(range(min = 0.0))]
    pub end_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct DeleteRangeParams {
    pub sequence_id: String,
    #[schemars(range(min = 0.0))]
    pub start_time: f64,
    #[schemars(range(min = 0.0))]
    pub end_time: f64,
    /// Restrict the ripple delete to one track. All tracks when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct InsertClipParams {
    pub sequence_id: String,
    pub track_id: String,
    pub asset_id: String,
    #[schemars(range(min = 0.0))]
    pub timeline_start: f64,
}

// ── Asset / audio params ────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct GetUnusedAssetsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AdjustVolumeParams {
    pub sequence_id: String,
    pub clip_id: String,
    /// Linear gain: 1.0 is unity, 0.0 is silent.
    #[schemars(range(min = 0.0, max = 2.0))]
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct GetTimelineInfoParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<String>,
}

// ── Generation params ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Draft,
    #[default]
    Standard,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoParams {
    #[schemars(length(min = 1))]
    pub prompt: String,
    #[serde(default)]
    pub quality: VideoQuality,
    #[schemars(range(min = 5.0, max = 120.0))]
    pub duration_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CheckGenerationStatusParams {
    pub job_id: String,
}
