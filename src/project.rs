use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{
    AssetKind, AssetSummary, ContextSnapshot, SelectionSnapshot, TrackKind, TrackSummary,
};

/// Project file format version.
const PROJECT_VERSION: u32 = 1;

// ── Project model ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub kind: AssetKind,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub asset_id: String,
    /// Position on the timeline, in seconds.
    pub timeline_in: f64,
    pub source_in: f64,
    pub source_out: f64,
    #[serde(default = "unity_gain")]
    pub volume: f64,
}

fn unity_gain() -> f64 {
    1.0
}

impl Clip {
    pub fn duration(&self) -> f64 {
        (self.source_out - self.source_in).max(0.0)
    }

    pub fn timeline_out(&self) -> f64 {
        self.timeline_in + self.duration()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub kind: TrackKind,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub id: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub track_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub captions: Vec<Caption>,
}

impl Sequence {
    /// End of the last clip or caption.
    pub fn duration(&self) -> f64 {
        let clips = self
            .tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(Clip::timeline_out);
        let captions = self.captions.iter().map(|c| c.end_time);
        clips.chain(captions).fold(0.0, f64::max)
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// The clip with `id` and the id of the track holding it.
    pub fn find_clip(&self, id: &str) -> Option<(&Track, &Clip)> {
        self.tracks
            .iter()
            .find_map(|t| t.clips.iter().find(|c| c.id == id).map(|c| (t, c)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub prompt: String,
    pub status: JobStatus,
    #[serde(default)]
    pub asset_id: Option<String>,
}

/// The editable project: media pool, sequences, selection and playhead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active_sequence_id: Option<String>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub selection: SelectionSnapshot,
    #[serde(default)]
    pub playhead: f64,
    #[serde(default)]
    pub jobs: Vec<GenerationJob>,
    /// Incremented by every committed mutation.
    #[serde(default)]
    pub version: u64,
    /// Monotonic counter for generated ids.
    #[serde(default)]
    pub next_id: u64,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active_sequence_id: None,
            sequences: Vec::new(),
            assets: Vec::new(),
            selection: SelectionSnapshot::default(),
            playhead: 0.0,
            jobs: Vec::new(),
            version: 0,
            next_id: 1,
        }
    }

    /// Allocate a fresh id like `clip_7`.
    pub fn fresh_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn sequence(&self, id: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.id == id)
    }

    pub fn sequence_mut(&mut self, id: &str) -> Result<&mut Sequence, AppError> {
        self.sequences
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound {
                what: format!("Sequence '{id}'"),
            })
    }

    pub fn active_sequence(&self) -> Option<&Sequence> {
        self.active_sequence_id
            .as_deref()
            .and_then(|id| self.sequence(id))
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Assets not referenced by any clip in any sequence.
    pub fn unused_assets(&self) -> Vec<&Asset> {
        self.assets
            .iter()
            .filter(|a| {
                !self
                    .sequences
                    .iter()
                    .flat_map(|s| s.tracks.iter())
                    .flat_map(|t| t.clips.iter())
                    .any(|c| c.asset_id == a.id)
            })
            .collect()
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        let active = self.active_sequence();
        let tracks = active
            .map(|s| {
                s.tracks
                    .iter()
                    .map(|t| TrackSnapshot {
                        id: t.id.clone(),
                        name: t.name.clone(),
                        kind: t.kind,
                        clip_ids: t.clips.iter().map(|c| c.id.clone()).collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        ProjectSnapshot {
            project_id: self.id.clone(),
            version: self.version,
            active_sequence_id: self.active_sequence_id.clone(),
            assets: self
                .assets
                .iter()
                .map(|a| AssetSummary {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    kind: a.kind,
                    duration: a.duration,
                })
                .collect(),
            tracks,
            selection: self.selection.clone(),
            playhead: self.playhead,
            duration: active.map_or(0.0, Sequence::duration),
        }
    }
}

// ── Read-only view ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub id: String,
    pub name: String,
    pub kind: TrackKind,
    pub clip_ids: Vec<String>,
}

/// Point-in-time copy of the project state used for checks and planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub project_id: String,
    pub version: u64,
    pub active_sequence_id: Option<String>,
    pub assets: Vec<AssetSummary>,
    /// Tracks of the active sequence.
    pub tracks: Vec<TrackSnapshot>,
    pub selection: SelectionSnapshot,
    pub playhead: f64,
    pub duration: f64,
}

impl ProjectSnapshot {
    pub fn has_asset(&self, id: &str) -> bool {
        self.assets.iter().any(|a| a.id == id)
    }

    pub fn has_track(&self, id: &str) -> bool {
        self.tracks.iter().any(|t| t.id == id)
    }

    pub fn has_clip(&self, id: &str) -> bool {
        self.tracks.iter().any(|t| t.clip_ids.iter().any(|c| c == id))
    }

    /// Planner-facing summary of the active sequence.
    pub fn context_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            sequence_id: self.active_sequence_id.clone(),
            playhead: self.playhead,
            timeline_duration: self.duration,
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackSummary {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    kind: t.kind,
                    clip_count: t.clip_ids.len(),
                })
                .collect(),
            assets: self.assets.clone(),
            selection: self.selection.clone(),
        }
    }
}

/// Read access to the live project, injected into the execution adapter.
pub trait ProjectView: Send + Sync {
    fn snapshot(&self) -> ProjectSnapshot;

    fn version(&self) -> u64 {
        self.snapshot().version
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// Shared project state. Mutations that succeed bump the version.
pub struct ProjectStore {
    project: RwLock<Project>,
}

impl ProjectStore {
    pub fn new(project: Project) -> Self {
        Self {
            project: RwLock::new(project),
        }
    }

    /// Read-only access to the project. Holds the read lock for the duration of `f`.
    pub fn with_project<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Project) -> R,
    {
        let guard = self.project.read();
        f(&guard)
    }

    /// Mutating access. The version is bumped only when `f` succeeds, and a
    /// failed mutation leaves the project untouched.
    pub fn with_project_mut<F, R>(&self, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut Project) -> Result<R, AppError>,
    {
        let mut guard = self.project.write();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        draft.version += 1;
        *guard = draft;
        Ok(out)
    }

    pub fn project(&self) -> Project {
        self.with_project(Clone::clone)
    }
}

impl ProjectView for ProjectStore {
    fn snapshot(&self) -> ProjectSnapshot {
        self.with_project(Project::snapshot)
    }

    fn version(&self) -> u64 {
        self.with_project(|p| p.version)
    }
}

// ── File helpers ────────────────────────────────────────────────────

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Atomically write bytes to a file using write-to-temp-then-rename.
///
/// Writes go to a `.tmp` sibling which is fsynced and then renamed over the
/// target. The previous file is kept as `.bak` when possible.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AppError> {
    let lock = FILE_LOCKS
        .lock()
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock();

    let file_name = path.file_name().unwrap_or_default();

    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut bak_name = OsString::from(file_name);
    bak_name.push(".bak");
    let bak_path = path.with_file_name(&bak_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    // Best-effort backup
    if path.exists() {
        let _ = fs::rename(path, &bak_path);
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

// ── Save / Load ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    format_version: u32,
    project: Project,
}

/// Save a project as a single JSON document.
pub fn save_project(project: &Project, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_json(
        path,
        &ProjectFile {
            format_version: PROJECT_VERSION,
            project: project.clone(),
        },
    )
}

pub fn load_project(path: &Path) -> Result<Project, AppError> {
    let file: ProjectFile = read_json(path)?;
    if file.format_version > PROJECT_VERSION {
        return Err(AppError::InvalidConfig {
            message: format!(
                "project file version {} is newer than supported version {PROJECT_VERSION}",
                file.format_version
            ),
        });
    }
    Ok(file.project)
}
