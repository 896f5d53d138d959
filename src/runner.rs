//! Caller-side execution loop for a plan: validation and approval gates,
//! step-by-step execution with reference chaining and doom-loop detection.

use serde::Serialize;
use tracing::{info, warn};

use crate::adapter::{resolve_step_args, ToolExecutionAdapter};
use crate::doom_loop::DoomLoopDetector;
use crate::error::AppError;
use crate::model::{ExecutionContext, Plan, PlanStep, ToolExecutionResult};
use crate::proposal::ProposalStore;
use crate::reference::{validate_plan, PlanValidation, StepResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    InvalidPlan,
    ApprovalRequired,
    StepFailed,
    DoomLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step_id: String,
    pub tool: String,
    pub result: ToolExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRunReport {
    pub steps: Vec<StepReport>,
    /// `None` when every step ran and succeeded.
    pub halted: Option<HaltReason>,
    pub final_state_version: u64,
    /// Errors stop the run before any step; warnings are informational.
    pub validation: PlanValidation,
}

impl PlanRunReport {
    pub fn completed(&self) -> bool {
        self.halted.is_none()
    }

    /// One line on why the run stopped, `None` when it completed.
    pub fn failure_summary(&self) -> Option<String> {
        let reason = self.halted?;
        Some(match reason {
            HaltReason::InvalidPlan => {
                let errors: Vec<String> = self.validation.errors.iter().map(ToString::to_string).collect();
                format!("plan is invalid: {}", errors.join("; "))
            }
            HaltReason::ApprovalRequired => "plan needs approval".to_string(),
            HaltReason::StepFailed => match self.steps.last() {
                Some(step) => format!(
                    "step '{}' failed: {}",
                    step.step_id,
                    step.result.error.as_deref().unwrap_or("unknown error")
                ),
                None => "a step failed".to_string(),
            },
            HaltReason::DoomLoop => "repeated identical tool calls".to_string(),
        })
    }
}

pub struct PlanRunner<'a> {
    adapter: &'a ToolExecutionAdapter,
    context: ExecutionContext,
    detector: DoomLoopDetector,
}

impl<'a> PlanRunner<'a> {
    /// `context.expected_state_version` should hold the version the plan was
    /// made against; when unset the live version at start is used.
    pub fn new(adapter: &'a ToolExecutionAdapter, context: ExecutionContext, detector: DoomLoopDetector) -> Self {
        Self {
            adapter,
            context,
            detector,
        }
    }

    pub async fn run(&mut self, plan: &Plan, approved: bool) -> PlanRunReport {
        let ctx = self.context.clone();
        self.run_in(plan, approved, ctx).await
    }

    /// Runs an approved proposal against the version it was planned on and
    /// records the outcome on it.
    pub async fn run_proposal(&mut self, proposals: &ProposalStore, id: &str) -> Result<PlanRunReport, AppError> {
        let proposal = proposals.get(id)?;
        if !proposal.is_runnable() {
            return Err(AppError::PreconditionFailed {
                message: format!("proposal '{id}' is {} and cannot run", proposal.status),
            });
        }
        let mut ctx = self.context.clone();
        ctx.expected_state_version = Some(proposal.base_version);
        let report = self.run_in(proposal.planned.plan(), true, ctx).await;
        proposals.record_outcome(id, &report)?;
        Ok(report)
    }

    async fn run_in(&mut self, plan: &Plan, approved: bool, mut ctx: ExecutionContext) -> PlanRunReport {
        let validation = validate_plan(plan, self.adapter);
        if !validation.is_valid() {
            warn!(goal = %plan.goal, errors = validation.errors.len(), "plan rejected before running");
            return self.halted_before_start(HaltReason::InvalidPlan, validation);
        }
        for warning in &validation.warnings {
            info!(%warning, "plan warning");
        }
        if plan.requires_approval && !approved {
            info!(goal = %plan.goal, "plan needs approval before it can run");
            return self.halted_before_start(HaltReason::ApprovalRequired, validation);
        }

        if ctx.expected_state_version.is_none() {
            ctx.expected_state_version = Some(self.adapter.state_version());
        }
        self.detector.reset();

        let mut results = StepResults::new();
        let mut steps = Vec::with_capacity(plan.steps.len());
        let mut halted = None;

        for step in &plan.steps {
            info!(step = %step.id, tool = %step.tool, "running plan step");
            let result = self.adapter.execute_step(step, &results, &ctx).await;
            let success = result.success;
            steps.push(StepReport {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                result: result.clone(),
            });
            results.insert(step.id.clone(), result);

            if !success {
                warn!(step = %step.id, "plan halted: step failed");
                halted = Some(HaltReason::StepFailed);
                break;
            }
            ctx.expected_state_version = Some(self.next_expected_version(step, ctx.expected_state_version));

            let args = resolve_step_args(step, &results).unwrap_or_default();
            if self.detector.check(&step.tool, &args) {
                warn!(step = %step.id, tool = %step.tool, "plan halted: repeated identical tool calls");
                halted = Some(HaltReason::DoomLoop);
                break;
            }
        }

        if halted.is_none() {
            info!(steps = steps.len(), "plan completed");
        }
        PlanRunReport {
            steps,
            halted,
            final_state_version: self.adapter.state_version(),
            validation,
        }
    }

    fn halted_before_start(&self, reason: HaltReason, validation: PlanValidation) -> PlanRunReport {
        PlanRunReport {
            steps: Vec::new(),
            halted: Some(reason),
            final_state_version: self.adapter.state_version(),
            validation,
        }
    }

    /// Version the next step must see. A mutating step accounts for exactly
    /// one commit of its own; anything beyond that was written by someone
    /// else and makes the next mutating step fail with `REV_CONFLICT`.
    fn next_expected_version(&self, step: &PlanStep, expected: Option<u64>) -> u64 {
        let live = self.adapter.state_version();
        let expected = expected.unwrap_or(live);
        let mutating = self
            .adapter
            .tool_definition(&step.tool)
            .is_some_and(|d| !d.read_only);
        let next = if mutating && live > expected { expected + 1 } else { expected };
        if live > next {
            warn!(step = %step.id, expected = next, live, "project changed outside the plan while a step ran");
        }
        next
    }
}
