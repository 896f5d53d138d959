//! Tool execution adapter: the single gate between plans and tool handlers.
//!
//! Every call goes through the same checks in order: the tool must exist,
//! the caller's expected state version must be current (mutating tools
//! only), entity ids must be real (mutating tools only), and the arguments
//! must match the schema. Only then is the handler invoked. Failures of any
//! kind come back as a [`ToolExecutionResult`], never as an `Err`.

pub mod batch;
pub mod preconditions;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audit;
use crate::error::AppError;
use crate::model::{ArgValue, ExecutionContext, PlanStep, RiskLevel, ToolExecutionResult};
use crate::project::{ProjectSnapshot, ProjectView};
use crate::reference::{resolve_from_results, StepResults};
use crate::registry::{ToolCatalog, ToolCallContext, ToolCategory, ToolDefinition, ToolRegistry};

pub struct ToolExecutionAdapter {
    registry: Arc<ToolRegistry>,
    project: Arc<dyn ProjectView>,
    /// App config dir for the JSONL audit log. No audit log when `None`.
    audit_dir: Option<PathBuf>,
}

impl ToolExecutionAdapter {
    pub fn new(registry: Arc<ToolRegistry>, project: Arc<dyn ProjectView>) -> Self {
        Self {
            registry,
            project,
            audit_dir: None,
        }
    }

    pub fn with_audit_dir(mut self, app_config_dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = Some(app_config_dir.into());
        self
    }

    /// Live project version, as seen through the injected view.
    pub fn state_version(&self) -> u64 {
        self.project.version()
    }

    pub fn project_snapshot(&self) -> ProjectSnapshot {
        self.project.snapshot()
    }

    // ── Execution ───────────────────────────────────────────────

    /// Execute one tool call. Never returns an error: every failure is
    /// reported in the result.
    pub async fn execute(&self, tool: &str, args: Value, ctx: &ExecutionContext) -> ToolExecutionResult {
        let started = Instant::now();
        let outcome = self.checked_call(tool, &args, ctx).await;
        let duration_ms = millis(started.elapsed());

        let result = match outcome {
            Ok(data) => {
                info!(tool, duration_ms, "tool call succeeded");
                ToolExecutionResult::ok(data, duration_ms)
            }
            Err(e) => {
                warn!(tool, code = e.code(), error = %e, "tool call failed");
                ToolExecutionResult::failure(e.to_string(), duration_ms)
            }
        };
        self.audit(ctx, tool, &args, &result);
        result
    }

    /// Resolve a plan step's references against earlier results, then
    /// execute it. An unresolved reference fails without calling the tool.
    pub async fn execute_step(
        &self,
        step: &PlanStep,
        prior_results: &StepResults,
        ctx: &ExecutionContext,
    ) -> ToolExecutionResult {
        match resolve_step_args(step, prior_results) {
            Ok(args) => self.execute(&step.tool, args, ctx).await,
            Err(e) => {
                warn!(step = %step.id, tool = %step.tool, error = %e, "step references unresolved");
                let result = ToolExecutionResult::failure(e.to_string(), 0);
                self.audit(ctx, &step.tool, &ArgValue::Object(step.args.clone()).to_json(), &result);
                result
            }
        }
    }

    async fn checked_call(&self, tool: &str, args: &Value, ctx: &ExecutionContext) -> Result<Value, AppError> {
        let definition = self
            .registry
            .definition(tool)
            .ok_or_else(|| AppError::tool_not_found(tool))?;
        let handler = self
            .registry
            .handler(tool)
            .ok_or_else(|| AppError::tool_not_found(tool))?;
        let snapshot = self.project.snapshot();

        if let Some(expected) = ctx.expected_state_version {
            if !definition.read_only && expected != snapshot.version {
                return Err(AppError::RevConflict {
                    expected,
                    actual: snapshot.version,
                });
            }
        }
        if !definition.read_only {
            preconditions::check_entity_args(tool, args, &snapshot)?;
        }
        self.registry.validate_args(tool, args)?;

        let call_ctx = handler_context(ctx, &snapshot);
        debug!(tool, sequence = ?call_ctx.sequence_id, "invoking tool handler");
        match AssertUnwindSafe(handler.call(args.clone(), call_ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(AppError::handler(format!(
                "tool '{tool}' panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn audit(&self, ctx: &ExecutionContext, tool: &str, args: &Value, result: &ToolExecutionResult) {
        if let Some(dir) = &self.audit_dir {
            audit::log_tool_call(dir, Some(&ctx.session_id), tool, args, result);
        }
    }

    // ── Introspection ───────────────────────────────────────────

    pub fn available_tools(&self) -> Vec<&ToolDefinition> {
        self.registry.available_tools().collect()
    }

    pub fn tool_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.registry.definition(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.has_tool(name)
    }

    pub fn validate_args(&self, name: &str, args: &Value) -> Result<(), AppError> {
        self.registry.validate_args(name, args)
    }

    pub fn tools_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        self.registry.tools_by_category(category)
    }

    pub fn tools_by_risk(&self, max: RiskLevel) -> Vec<&ToolDefinition> {
        self.registry.tools_by_risk(max)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl ToolCatalog for ToolExecutionAdapter {
    fn tool_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.registry.definition(name)
    }

    fn validate_args(&self, name: &str, args: &Value) -> Result<(), AppError> {
        self.registry.validate_args(name, args)
    }
}

/// Resolved JSON arguments for `step`, or `REFERENCE_UNRESOLVED`.
pub fn resolve_step_args(step: &PlanStep, prior_results: &StepResults) -> Result<Value, AppError> {
    let resolved = resolve_from_results(&step.args, prior_results);
    if resolved.is_complete() {
        Ok(resolved.value)
    } else {
        Err(AppError::ReferenceUnresolved {
            message: format!("step '{}': {}", step.id, resolved.error_summary()),
        })
    }
}

/// Selection and playhead are forwarded only when the caller is working in
/// the active sequence.
fn handler_context(ctx: &ExecutionContext, snapshot: &ProjectSnapshot) -> ToolCallContext {
    let in_active = ctx.sequence_id.is_some() && ctx.sequence_id == snapshot.active_sequence_id;
    let mut call_ctx = ToolCallContext {
        project_id: ctx.project_id.clone(),
        session_id: ctx.session_id.clone(),
        sequence_id: ctx.sequence_id.clone(),
        ..ToolCallContext::default()
    };
    if in_active {
        call_ctx.selected_clip_ids.clone_from(&snapshot.selection.clip_ids);
        call_ctx.selected_track_ids.clone_from(&snapshot.selection.track_ids);
        call_ctx.playhead = snapshot.playhead;
    }
    call_ctx
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::demo::{create_demo_project, demo_registry};
    use crate::model::{arg_map, StepValueReference};
    use crate::project::ProjectStore;
    use crate::registry::catalog::standard_definitions;
    use crate::registry::{handler_fn, sync_handler};
    use serde_json::json;

    /// Standard definitions with handlers that count calls and echo their context.
    pub(crate) fn counting_adapter() -> (ToolExecutionAdapter, Arc<AtomicUsize>, Arc<ProjectStore>) {
        let store = Arc::new(ProjectStore::new(create_demo_project()));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        for def in standard_definitions() {
            let calls = Arc::clone(&calls);
            registry
                .register(
                    def,
                    sync_handler(move |_, ctx| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!({ "playhead": ctx.playhead, "selected": ctx.selected_clip_ids }))
                    }),
                )
                .unwrap();
        }
        let adapter = ToolExecutionAdapter::new(Arc::new(registry), store.clone());
        (adapter, calls, store)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("demo_project", "session_1").with_sequence("seq_main")
    }

    fn move_args() -> Value {
        json!({ "sequenceId": "seq_main", "trackId": "track_v1", "clipId": "clip_intro", "newTimelineIn": 30.0 })
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (adapter, calls, _) = counting_adapter();
        let result = adapter.execute("explode_timeline", json!({}), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_version_blocks_mutating_tools() {
        let (adapter, calls, store) = counting_adapter();
        store.with_project_mut(|p| {
            p.playhead = 1.0;
            Ok(())
        })
        .unwrap();
        let stale = ctx().expecting_version(0);

        let result = adapter.execute("move_clip", move_args(), &stale).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("REV_CONFLICT"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Read-only tools ignore the version
        let result = adapter.execute("get_timeline_info", json!({}), &stale).await;
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let fresh = ctx().expecting_version(1);
        assert!(adapter.execute("move_clip", move_args(), &fresh).await.success);
    }

    #[tokio::test]
    async fn placeholder_ids_never_reach_the_handler() {
        let (adapter, calls, _) = counting_adapter();
        let result = adapter
            .execute(
                "insert_clip",
                json!({ "sequenceId": "seq_main", "trackId": "track_v1", "assetId": "ASSET_ID_PLACEHOLDER", "timelineStart": 0.0 }),
                &ctx(),
            )
            .await;
        let error = result.error.unwrap();
        assert!(error.contains("PRECONDITION_FAILED"));
        assert!(error.contains("placeholder"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn schema_mismatch_is_validation_error() {
        let (adapter, calls, _) = counting_adapter();
        let result = adapter
            .execute(
                "adjust_volume",
                json!({ "sequenceId": "seq_main", "clipId": "clip_intro", "volume": 7.0 }),
                &ctx(),
            )
            .await;
        assert!(result.error.unwrap().starts_with("VALIDATION_ERROR"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn selection_forwarded_only_for_active_sequence() {
        let (adapter, _, _) = counting_adapter();
        let result = adapter.execute("get_timeline_info", json!({}), &ctx()).await;
        let data = result.data.unwrap();
        assert_eq!(data["playhead"], 12.0);
        assert_eq!(data["selected"][0], "clip_interview");

        let other = ExecutionContext::new("demo_project", "s").with_sequence("seq_other");
        let data = adapter
            .execute("get_timeline_info", json!({}), &other)
            .await
            .data
            .unwrap();
        assert_eq!(data["playhead"], 0.0);
        assert_eq!(data["selected"], json!([]));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_failures() {
        let store = Arc::new(ProjectStore::new(create_demo_project()));
        let mut registry = ToolRegistry::new();
        let mut defs = standard_definitions().into_iter();
        let info = defs.find(|d| d.name == "get_timeline_info").unwrap();
        let mut boom = info.clone();
        boom.name = "boom".into();
        registry
            .register(info, sync_handler(|_, _| Err(AppError::handler("renderer offline"))))
            .unwrap();
        registry
            .register(
                boom,
                handler_fn(|_, _| async {
                    if true {
                        panic!("render thread died");
                    }
                    Ok(json!({}))
                }),
            )
            .unwrap();
        let adapter = ToolExecutionAdapter::new(Arc::new(registry), store);

        let failed = adapter.execute("get_timeline_info", json!({}), &ctx()).await;
        assert_eq!(failed.error.as_deref(), Some("HANDLER_ERROR: renderer offline"));

        let panicked = adapter.execute("boom", json!({}), &ctx()).await;
        let error = panicked.error.unwrap();
        assert!(error.contains("panicked"));
        assert!(error.contains("render thread died"));
    }

    #[tokio::test]
    async fn step_references_resolve_before_execution() {
        let store = Arc::new(ProjectStore::new(create_demo_project()));
        let adapter = ToolExecutionAdapter::new(Arc::new(demo_registry(&store).unwrap()), store.clone());

        let step = PlanStep::new(
            "insert",
            "insert_clip",
            arg_map([
                ("sequenceId", ArgValue::from("seq_main")),
                ("trackId", "track_v1".into()),
                ("assetId", StepValueReference::new("lookup", "data[0].id").into()),
                ("timelineStart", 26.0.into()),
            ]),
        );

        let missing = adapter.execute_step(&step, &StepResults::new(), &ctx()).await;
        assert!(missing.error.unwrap().starts_with("REFERENCE_UNRESOLVED"));

        let mut prior = StepResults::new();
        prior.insert(
            "lookup".into(),
            ToolExecutionResult::ok(json!([{ "id": "asset_city" }]), 1),
        );
        let result = adapter.execute_step(&step, &prior, &ctx()).await;
        assert!(result.success, "{:?}", result.error);
        let clip_id = result.data.unwrap()["clipId"].as_str().unwrap().to_string();
        assert!(store.snapshot().has_clip(&clip_id));
    }

    #[tokio::test]
    async fn audit_log_records_calls() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _, _) = counting_adapter();
        let adapter = adapter.with_audit_dir(dir.path());
        adapter.execute("get_timeline_info", json!({}), &ctx()).await;
        adapter.execute("nope", json!({}), &ctx()).await;

        let logs = crate::paths::audit_logs_dir(dir.path());
        let file = std::fs::read_dir(&logs).unwrap().next().unwrap().unwrap().path();
        let text = std::fs::read_to_string(file).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"session_id\":\"session_1\""));
    }

    #[test]
    fn introspection_delegates_to_registry() {
        let (adapter, _, _) = counting_adapter();
        assert_eq!(adapter.available_tools().len(), crate::registry::STANDARD_TOOLS.len());
        assert!(adapter.has_tool("split_clip"));
        assert!(adapter.tool_definition("split_clip").is_some());
        assert_eq!(adapter.tools_by_category(ToolCategory::Generation).len(), 2);
        assert!(adapter
            .tools_by_risk(RiskLevel::Low)
            .iter()
            .all(|d| d.risk_level == RiskLevel::Low));
        assert!(adapter.validate_args("split_clip", &json!({})).is_err());
    }
}
