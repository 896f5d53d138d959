use serde::{Deserialize, Serialize};

use super::args::ArgMap;

/// Ordered risk scale. `Ord` follows declaration order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn all() -> &'static [RiskLevel] {
        &[Self::Low, Self::Medium, Self::High, Self::Critical]
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|r| r.slug() == s)
    }
}

/// Requirement tags and the keywords (English and Korean) that raise them.
const REQUIREMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("split", &["split", "cut at", "자르", "분할"]),
    ("trim", &["trim", "트림", "다듬"]),
    ("move", &["move", "shift", "이동", "옮"]),
    ("caption", &["caption", "subtitle", "자막"]),
    ("delete", &["delete", "remove", "삭제", "지워"]),
    ("broll", &["b-roll", "broll", "b roll", "cutaway", "비롤", "인서트"]),
    ("music", &["music", "soundtrack", "bgm", "음악", "배경음"]),
    ("generate", &["generate", "create", "생성", "만들"]),
    ("place", &["insert", "place", "timeline", "playhead", "삽입", "배치", "타임라인"]),
];

/// The planner's reading of one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub understanding: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub uncertainties: Vec<String>,
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub needs_more_info: bool,
}

impl Thought {
    /// Deterministic interpretation of a raw command: the trimmed text plus
    /// requirement tags for every keyword group it mentions.
    pub fn from_command(command: &str) -> Self {
        let understanding = command.split_whitespace().collect::<Vec<_>>().join(" ");
        let lower = understanding.to_lowercase();
        let requirements: Vec<String> = REQUIREMENT_KEYWORDS
            .iter()
            .filter(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
            .map(|(tag, _)| (*tag).to_string())
            .collect();

        let mut uncertainties = Vec::new();
        if understanding.is_empty() {
            uncertainties.push("empty command".to_string());
        } else if requirements.is_empty() {
            uncertainties.push("no recognizable editing action".to_string());
        }

        let approach = if requirements.len() > 1 {
            "multi-step orchestration".to_string()
        } else {
            "single tool call".to_string()
        };

        Self {
            needs_more_info: understanding.is_empty(),
            understanding,
            requirements,
            uncertainties,
            approach,
        }
    }

    /// All fields joined and lower-cased, used for keyword triggers.
    pub fn search_text(&self) -> String {
        let mut parts = vec![self.understanding.as_str(), self.approach.as_str()];
        parts.extend(self.requirements.iter().map(String::as_str));
        parts.extend(self.uncertainties.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: String,
    pub tool: String,
    #[cfg_attr(feature = "ts-bindings", ts(type = "Record<string, unknown>"))]
    pub args: ArgMap,
    pub description: String,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default)]
    pub estimated_duration_ms: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, args: ArgMap) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            args,
            description: String::new(),
            risk: RiskLevel::Low,
            estimated_duration_ms: 0,
            depends_on: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = ms;
        self
    }

    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub estimated_total_duration_ms: u64,
    pub requires_approval: bool,
    pub rollback_strategy: String,
}

impl Plan {
    /// Build a plan; the total duration is the sum of the step estimates.
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        let estimated_total_duration_ms = steps.iter().map(|s| s.estimated_duration_ms).sum();
        Self {
            goal: goal.into(),
            steps,
            estimated_total_duration_ms,
            requires_approval: false,
            rollback_strategy: String::new(),
        }
    }

    pub fn requiring_approval(mut self, requires: bool) -> Self {
        self.requires_approval = requires;
        self
    }

    pub fn rollback(mut self, strategy: impl Into<String>) -> Self {
        self.rollback_strategy = strategy.into();
        self
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Highest risk level among the steps.
    pub fn max_risk(&self) -> RiskLevel {
        self.steps.iter().map(|s| s.risk).max().unwrap_or_default()
    }
}
