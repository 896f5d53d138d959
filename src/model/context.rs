use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

impl AssetKind {
    /// The track kind this asset is placed on.
    pub fn track_kind(self) -> TrackKind {
        match self {
            AssetKind::Video | AssetKind::Image => TrackKind::Video,
            AssetKind::Audio => TrackKind::Audio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub id: String,
    pub name: String,
    pub kind: TrackKind,
    pub clip_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: String,
    pub name: String,
    pub kind: AssetKind,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    #[serde(default)]
    pub clip_ids: Vec<String>,
    #[serde(default)]
    pub track_ids: Vec<String>,
    #[serde(default)]
    pub asset_ids: Vec<String>,
}

impl SelectionSnapshot {
    /// The selected clip and track when exactly one of each is selected.
    pub fn single_clip(&self) -> Option<(&str, &str)> {
        match (self.clip_ids.as_slice(), self.track_ids.as_slice()) {
            ([clip], [track]) => Some((clip.as_str(), track.as_str())),
            _ => None,
        }
    }
}

/// Read-only view of the editing state at planning time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    #[serde(default)]
    pub sequence_id: Option<String>,
    #[serde(default)]
    pub playhead: f64,
    #[serde(default)]
    pub timeline_duration: f64,
    #[serde(default)]
    pub tracks: Vec<TrackSummary>,
    #[serde(default)]
    pub assets: Vec<AssetSummary>,
    #[serde(default)]
    pub selection: SelectionSnapshot,
}

impl ContextSnapshot {
    /// A track of `kind`, preferring one in the current selection.
    pub fn preferred_track(&self, kind: TrackKind) -> Option<&TrackSummary> {
        self.tracks
            .iter()
            .filter(|t| t.kind == kind)
            .find(|t| self.selection.track_ids.contains(&t.id))
            .or_else(|| self.tracks.iter().find(|t| t.kind == kind))
    }

    /// An asset of `kind`, preferring one in the current selection.
    pub fn preferred_asset(&self, kind: AssetKind) -> Option<&AssetSummary> {
        self.assets
            .iter()
            .filter(|a| a.kind == kind)
            .find(|a| self.selection.asset_ids.contains(&a.id))
            .or_else(|| self.assets.iter().find(|a| a.kind == kind))
    }

    /// Insertion point on the timeline derived from the playhead.
    ///
    /// A negative or non-finite playhead clamps to 0. A non-positive or
    /// non-finite duration means there is no upper bound.
    pub fn timeline_start(&self) -> f64 {
        let playhead = if self.playhead.is_finite() && self.playhead > 0.0 {
            self.playhead
        } else {
            0.0
        };
        if self.timeline_duration.is_finite() && self.timeline_duration > 0.0 {
            playhead.min(self.timeline_duration)
        } else {
            playhead
        }
    }

    /// Upper bound of the timeline, if it has one.
    pub fn timeline_end(&self) -> Option<f64> {
        (self.timeline_duration.is_finite() && self.timeline_duration > 0.0)
            .then_some(self.timeline_duration)
    }
}

/// Per-call execution envelope. `expected_state_version` enables the
/// optimistic-concurrency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub project_id: String,
    #[serde(default)]
    pub sequence_id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub expected_state_version: Option<u64>,
}

impl ExecutionContext {
    pub fn new(project_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            sequence_id: None,
            session_id: session_id.into(),
            expected_state_version: None,
        }
    }

    pub fn with_sequence(mut self, sequence_id: impl Into<String>) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self
    }

    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_state_version = Some(version);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn context(playhead: f64, duration: f64) -> ContextSnapshot {
        ContextSnapshot {
            playhead,
            timeline_duration: duration,
            ..ContextSnapshot::default()
        }
    }

    #[test]
    fn timeline_start_clamps() {
        assert_eq!(context(-4.0, 30.0).timeline_start(), 0.0);
        assert_eq!(context(f64::NAN, 30.0).timeline_start(), 0.0);
        assert_eq!(context(45.0, 30.0).timeline_start(), 30.0);
        assert_eq!(context(12.5, 30.0).timeline_start(), 12.5);
        // No upper clamp without a usable duration
        assert_eq!(context(45.0, 0.0).timeline_start(), 45.0);
        assert_eq!(context(45.0, f64::INFINITY).timeline_start(), 45.0);
    }

    #[test]
    fn preferred_track_uses_selection_first() {
        let mut ctx = ContextSnapshot::default();
        for id in ["v1", "v2"] {
            ctx.tracks.push(TrackSummary {
                id: id.into(),
                name: id.into(),
                kind: TrackKind::Video,
                clip_count: 0,
            });
        }
        assert_eq!(ctx.preferred_track(TrackKind::Video).unwrap().id, "v1");
        ctx.selection.track_ids.push("v2".into());
        assert_eq!(ctx.preferred_track(TrackKind::Video).unwrap().id, "v2");
        assert!(ctx.preferred_track(TrackKind::Audio).is_none());
    }

    #[test]
    fn single_clip_requires_exactly_one_of_each() {
        let mut sel = SelectionSnapshot::default();
        assert!(sel.single_clip().is_none());
        sel.clip_ids.push("c1".into());
        sel.track_ids.push("t1".into());
        assert_eq!(sel.single_clip(), Some(("c1", "t1")));
        sel.clip_ids.push("c2".into());
        assert!(sel.single_clip().is_none());
    }
}
