use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plan::Plan;

/// Outcome of one tool invocation. Serialized form (`success`, `data`,
/// `error`, `durationMs`) is what step references read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts-bindings", ts(type = "unknown"))]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolExecutionResult {
    pub fn ok(data: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    #[cfg_attr(feature = "ts-bindings", ts(type = "Record<string, unknown>"))]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub calls: Vec<ToolCall>,
    #[serde(default)]
    pub mode: BatchMode,
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
pub struct BatchItemResult {
    pub tool: String,
    pub result: ToolExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct BatchExecutionResult {
    pub results: Vec<BatchItemResult>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_duration_ms: u64,
    pub success: bool,
}

impl BatchExecutionResult {
    pub fn from_results(results: Vec<BatchItemResult>, total_duration_ms: u64) -> Self {
        let success_count = results.iter().filter(|r| r.result.success).count();
        let failure_count = results.len() - success_count;
        Self {
            results,
            success_count,
            failure_count,
            total_duration_ms,
            success: failure_count == 0,
        }
    }
}

/// Single-action shortcut recognized by the fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum FastPathIntent {
    Split,
    Trim,
    Move,
    AddCaption,
    DeleteRange,
}

impl FastPathIntent {
    pub fn tool(self) -> &'static str {
        match self {
            Self::Split => "split_clip",
            Self::Trim => "trim_clip",
            Self::Move => "move_clip",
            Self::AddCaption => "add_caption",
            Self::DeleteRange => "delete_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FastPathMatch {
    pub intent: FastPathIntent,
    pub confidence: f64,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PlaybookMatch {
    pub playbook_id: String,
    pub confidence: f64,
    pub plan: Plan,
}

/// Whichever planner claimed the command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PlannedCommand {
    FastPath(FastPathMatch),
    Playbook(PlaybookMatch),
}

impl PlannedCommand {
    pub fn plan(&self) -> &Plan {
        match self {
            Self::FastPath(m) => &m.plan,
            Self::Playbook(m) => &m.plan,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::FastPath(m) => m.confidence,
            Self::Playbook(m) => m.confidence,
        }
    }

    /// `fast_path:<intent>` or `playbook:<id>`.
    pub fn label(&self) -> String {
        match self {
            Self::FastPath(m) => format!("fast_path:{}", m.intent.tool()),
            Self::Playbook(m) => format!("playbook:{}", m.playbook_id),
        }
    }
}
