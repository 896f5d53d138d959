pub mod catalog;
pub mod params;
pub mod validation;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::model::RiskLevel;

use params::{
    AddCaptionParams, AdjustVolumeParams, CheckGenerationStatusParams, DeleteRangeParams,
    GenerateVideoParams, GetTimelineInfoParams, GetUnusedAssetsParams, InsertClipParams,
    MoveClipParams, SplitClipParams, TrimClipParams,
};

// ── Tool metadata ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Clip,
    Timeline,
    Caption,
    Audio,
    Asset,
    Generation,
    Query,
}

impl ToolCategory {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::Timeline => "timeline",
            Self::Caption => "caption",
            Self::Audio => "audio",
            Self::Asset => "asset",
            Self::Generation => "generation",
            Self::Query => "query",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clip => "Split, trim and move individual clips",
            Self::Timeline => "Insert clips and ripple-delete ranges",
            Self::Caption => "Caption and subtitle text",
            Self::Audio => "Clip gain and mix levels",
            Self::Asset => "Media library lookups",
            Self::Generation => "Generative video jobs",
            Self::Query => "Inspect timeline state",
        }
    }

    pub fn all() -> &'static [ToolCategory] {
        &[
            Self::Clip,
            Self::Timeline,
            Self::Caption,
            Self::Audio,
            Self::Asset,
            Self::Generation,
            Self::Query,
        ]
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.slug() == s)
    }
}

pub(crate) struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ToolCategory,
    pub risk_level: RiskLevel,
    pub supports_undo: bool,
    pub parallelizable: bool,
    pub read_only: bool,
}

/// A registered tool's metadata plus the JSON schema of its arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    #[cfg_attr(feature = "ts-bindings", ts(type = "unknown"))]
    pub parameters: Value,
    pub required: Vec<String>,
    pub risk_level: RiskLevel,
    pub supports_undo: bool,
    pub parallelizable: bool,
    /// Read-only tools skip the state-version check.
    pub read_only: bool,
}

// ── Handlers ────────────────────────────────────────────────────

/// Context forwarded to a handler. Selection and playhead are only populated
/// when the caller's sequence is the project's active one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallContext {
    pub project_id: String,
    pub session_id: String,
    pub sequence_id: Option<String>,
    pub selected_clip_ids: Vec<String>,
    pub selected_track_ids: Vec<String>,
    pub playhead: f64,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, ctx: ToolCallContext) -> Result<Value, AppError>;
}

struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for AsyncFnHandler<F>
where
    F: Fn(Value, ToolCallContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    async fn call(&self, args: Value, ctx: ToolCallContext) -> Result<Value, AppError> {
        (self.0)(args, ctx).await
    }
}

struct SyncFnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for SyncFnHandler<F>
where
    F: Fn(Value, ToolCallContext) -> Result<Value, AppError> + Send + Sync,
{
    async fn call(&self, args: Value, ctx: ToolCallContext) -> Result<Value, AppError> {
        (self.0)(args, ctx)
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value, ToolCallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    Arc::new(AsyncFnHandler(f))
}

/// Wrap a synchronous closure as a handler.
pub fn sync_handler<F>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value, ToolCallContext) -> Result<Value, AppError> + Send + Sync + 'static,
{
    Arc::new(SyncFnHandler(f))
}

// ── Catalog queries ─────────────────────────────────────────────

/// Capability and schema queries used by planners.
pub trait ToolCatalog {
    fn tool_definition(&self, name: &str) -> Option<&ToolDefinition>;

    fn has_tool(&self, name: &str) -> bool {
        self.tool_definition(name).is_some()
    }

    fn validate_args(&self, name: &str, args: &Value) -> Result<(), AppError> {
        let def = self
            .tool_definition(name)
            .ok_or_else(|| AppError::tool_not_found(name))?;
        validation::validate_against_schema(name, &def.parameters, args)
    }
}

impl ToolCatalog for [ToolDefinition] {
    fn tool_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.iter().find(|d| d.name == name)
    }
}

impl ToolCatalog for Vec<ToolDefinition> {
    fn tool_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.as_slice().tool_definition(name)
    }
}

// ── Registry ────────────────────────────────────────────────────

struct RegisteredTool {
    definition: ToolDefinition,
    validator: Validator,
    handler: Arc<dyn ToolHandler>,
}

/// Tool definitions with their handlers, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier tool of the same name. The
    /// parameter schema is compiled here and reused for every call.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), AppError> {
        let validator = validation::compile_schema(&definition.name, &definition.parameters)?;
        if self.tools.contains_key(&definition.name) {
            tracing::warn!(tool = %definition.name, "replacing registered tool");
        }
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                validator,
                handler,
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.shift_remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|t| Arc::clone(&t.handler))
    }

    pub fn available_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(|t| &t.definition)
    }

    pub fn tools_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        self.available_tools()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Tools whose risk is at or below `max`.
    pub fn tools_by_risk(&self, max: RiskLevel) -> Vec<&ToolDefinition> {
        self.available_tools()
            .filter(|d| d.risk_level <= max)
            .collect()
    }
}

impl ToolCatalog for ToolRegistry {
    fn tool_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definition(name)
    }

    fn validate_args(&self, name: &str, args: &Value) -> Result<(), AppError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AppError::tool_not_found(name))?;
        validation::validate_with(name, &tool.validator, args)
    }
}

// ── define_tools! macro ─────────────────────────────────────────

/// Single source of truth for the standard editing tools. Generates the
/// definition list (with JSON schemas from the param structs) and the
/// `STANDARD_TOOLS` name table.
macro_rules! define_tools {
    (
        $(
            [ $cat:expr, $risk:expr $(, $flag:ident)* ]
            $name:literal ( $params:ty ) : $desc:literal ;
        )*
    ) => {
        pub const STANDARD_TOOLS: &[&str] = &[ $( $name, )* ];

        pub(crate) fn standard_tool_entries() -> Vec<ToolDefinition> {
            vec![
                $( catalog::entry(
                    ToolInfo {
                        name: $name,
                        description: $desc,
                        category: $cat,
                        risk_level: $risk,
                        supports_undo: define_tools!(@has_flag undoable; $($flag)*),
                        parallelizable: define_tools!(@has_flag parallel; $($flag)*),
                        read_only: define_tools!(@has_flag read_only; $($flag)*),
                    },
                    catalog::schema_value::<$params>(),
                ), )*
            ]
        }
    };

    // Literal tokens match before metavariables, so the flag name matches the
    // first arm and any other ident falls through to the recursive arm.
    (@has_flag undoable; undoable $($rest:ident)*) => { true };
    (@has_flag undoable; $_other:ident $($rest:ident)*) => { define_tools!(@has_flag undoable; $($rest)*) };
    (@has_flag undoable;) => { false };

    (@has_flag parallel; parallel $($rest:ident)*) => { true };
    (@has_flag parallel; $_other:ident $($rest:ident)*) => { define_tools!(@has_flag parallel; $($rest)*) };
    (@has_flag parallel;) => { false };

    (@has_flag read_only; read_only $($rest:ident)*) => { true };
    (@has_flag read_only; $_other:ident $($rest:ident)*) => { define_tools!(@has_flag read_only; $($rest)*) };
    (@has_flag read_only;) => { false };
}

define_tools! {
    // ── Clip ──
    [ToolCategory::Clip, RiskLevel::Medium, undoable]
    "split_clip"(SplitClipParams): "Split a clip into two at a timeline position.";

    [ToolCategory::Clip, RiskLevel::Medium, undoable]
    "trim_clip"(TrimClipParams): "Trim seconds off the start or end edge of a clip.";

    [ToolCategory::Clip, RiskLevel::Low, undoable]
    "move_clip"(MoveClipParams): "Move a clip to a new timeline position, optionally onto another track.";

    // ── Timeline ──
    [ToolCategory::Timeline, RiskLevel::High, undoable]
    "delete_range"(DeleteRangeParams): "Ripple-delete a time range from the sequence.";

    [ToolCategory::Timeline, RiskLevel::Medium, undoable]
    "insert_clip"(InsertClipParams): "Insert an asset as a new clip on a track. Returns the new clip id.";

    // ── Caption ──
    [ToolCategory::Caption, RiskLevel::Low, undoable]
    "add_caption"(AddCaptionParams): "Add a caption over a time window.";

    // ── Audio ──
    [ToolCategory::Audio, RiskLevel::Low, undoable, parallel]
    "adjust_volume"(AdjustVolumeParams): "Set the linear gain of a clip.";

    // ── Asset ──
    [ToolCategory::Asset, RiskLevel::Low, parallel, read_only]
    "get_unused_assets"(GetUnusedAssetsParams): "List library assets not yet placed on the timeline.";

    // ── Generation ──
    [ToolCategory::Generation, RiskLevel::High]
    "generate_video"(GenerateVideoParams): "Start a generative video job. Returns a job id.";

    [ToolCategory::Generation, RiskLevel::Low, parallel, read_only]
    "check_generation_status"(CheckGenerationStatusParams): "Poll a generation job. Returns the produced asset id once complete.";

    // ── Query ──
    [ToolCategory::Query, RiskLevel::Low, parallel, read_only]
    "get_timeline_info"(GetTimelineInfoParams): "Summarize the active sequence: tracks, clips, playhead.";
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for def in catalog::standard_definitions() {
            registry
                .register(def, sync_handler(|_, _| Ok(json!({}))))
                .unwrap();
        }
        registry
    }

    #[test]
    fn standard_table_matches_definitions() {
        let defs = catalog::standard_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, STANDARD_TOOLS);
    }

    #[test]
    fn flags_from_macro() {
        let reg = registry();
        let volume = reg.definition("adjust_volume").unwrap();
        assert!(volume.supports_undo && volume.parallelizable && !volume.read_only);
        let generate = reg.definition("generate_video").unwrap();
        assert!(!generate.supports_undo && !generate.read_only);
        assert!(reg.definition("check_generation_status").unwrap().read_only);
    }

    #[test]
    fn risk_filter_is_inclusive() {
        let reg = registry();
        let low: Vec<&str> = reg
            .tools_by_risk(RiskLevel::Low)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert!(low.contains(&"move_clip"));
        assert!(!low.contains(&"split_clip"));
        assert_eq!(reg.tools_by_risk(RiskLevel::Critical).len(), reg.len());
        assert!(reg
            .tools_by_risk(RiskLevel::Medium)
            .iter()
            .all(|d| d.risk_level <= RiskLevel::Medium));
    }

    #[test]
    fn category_and_validation_queries() {
        let reg = registry();
        assert_eq!(reg.tools_by_category(ToolCategory::Clip).len(), 3);
        assert!(reg.has_tool("insert_clip"));
        assert!(!reg.has_tool("explode"));
        assert!(reg
            .validate_args(
                "insert_clip",
                &json!({ "sequenceId": "s", "trackId": "t", "assetId": "a", "timelineStart": 1.5 })
            )
            .is_ok());
        let err = reg
            .validate_args("insert_clip", &json!({ "sequenceId": "s" }))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(
            reg.validate_args("explode", &json!({})).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn registered_tools_validate_with_their_compiled_schema() {
        let reg = registry();
        let args = json!({ "sequenceId": "s", "clipId": "c", "volume": 0.5 });
        let compiled = &reg.tools["adjust_volume"].validator;
        assert!(compiled.is_valid(&args));
        assert!(!compiled.is_valid(&json!({ "volume": "loud" })));

        // Repeated calls reuse the same validator and agree with a fresh compile
        let schema = &reg.definition("adjust_volume").unwrap().parameters;
        for candidate in [args.clone(), json!({ "volume": "loud" }), json!({})] {
            assert_eq!(
                reg.validate_args("adjust_volume", &candidate).is_ok(),
                validation::validate_against_schema("adjust_volume", schema, &candidate).is_ok()
            );
        }
    }

    #[test]
    fn register_rejects_bad_schema_and_replaces_duplicates() {
        let mut reg = registry();
        let mut bad = reg.definition("split_clip").unwrap().clone();
        bad.name = "broken".into();
        bad.parameters = json!({ "type": 12 });
        assert_eq!(
            reg.register(bad, sync_handler(|_, _| Ok(json!(null))))
                .unwrap_err()
                .code(),
            "INVALID_CONFIG"
        );

        let before = reg.len();
        let again = reg.definition("split_clip").unwrap().clone();
        reg.register(again, sync_handler(|_, _| Ok(json!(null)))).unwrap();
        assert_eq!(reg.len(), before);
        assert!(reg.unregister("split_clip"));
        assert!(!reg.has_tool("split_clip"));
    }

    #[test]
    fn help_text_tiers() {
        let reg = registry();
        assert!(catalog::help_text(&reg, None).contains("clip (3)"));
        assert!(catalog::help_text(&reg, Some("caption")).contains("add_caption"));
        assert!(catalog::help_text(&reg, Some("split_clip")).contains("splitTime"));
        assert!(catalog::help_text(&reg, Some("nonsense")).starts_with("Unknown topic"));
        assert_eq!(catalog::to_json_schema(&reg).as_array().unwrap().len(), reg.len());
    }
}
