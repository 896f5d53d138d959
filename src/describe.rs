use crate::model::{ArgValue, ContextSnapshot, Plan, PlannedCommand};
use crate::planner::timecode::format_timecode;
use crate::runner::{HaltReason, PlanRunReport};

/// Human-readable summary of the editing context a planner sees.
pub fn describe_context(ctx: &ContextSnapshot) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Sequence: {}",
        ctx.sequence_id.as_deref().unwrap_or("(none active)")
    ));
    lines.push(format!(
        "Playhead: {} / {}",
        format_timecode(ctx.playhead),
        format_timecode(ctx.timeline_duration)
    ));

    lines.push(format!("\nTracks ({})", ctx.tracks.len()));
    for t in &ctx.tracks {
        let selected = if ctx.selection.track_ids.contains(&t.id) { " *" } else { "" };
        lines.push(format!(
            "  - {} (id: {}, {:?}, {} clips){selected}",
            t.name, t.id, t.kind, t.clip_count
        ));
    }

    lines.push(format!("\nAssets ({})", ctx.assets.len()));
    for a in &ctx.assets {
        let duration = a
            .duration
            .map_or_else(|| "still".to_string(), |d| format!("{d:.1}s"));
        lines.push(format!("  - {} (id: {}, {:?}, {duration})", a.name, a.id, a.kind));
    }

    if !ctx.selection.clip_ids.is_empty() {
        lines.push(format!("\nSelected clips: {}", ctx.selection.clip_ids.join(", ")));
    }

    lines.join("\n")
}

fn describe_arg(value: &ArgValue) -> String {
    match value.as_reference() {
        Some(r) => match &r.default {
            Some(d) => format!("<{}.{} or {d}>", r.from_step, r.path),
            None => format!("<{}.{}>", r.from_step, r.path),
        },
        None => value.to_json().to_string(),
    }
}

/// Numbered step list with arguments, dependencies and approval status.
pub fn describe_plan(plan: &Plan) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Goal: {}", plan.goal));
    lines.push(format!(
        "Steps: {} (~{} ms, max risk {})",
        plan.steps.len(),
        plan.estimated_total_duration_ms,
        plan.max_risk().slug()
    ));
    if plan.requires_approval {
        lines.push("Requires approval before running".to_string());
    }

    for (i, step) in plan.steps.iter().enumerate() {
        lines.push(format!("\n  [{}] {} -> {}", i + 1, step.id, step.tool));
        if !step.description.is_empty() {
            lines.push(format!("      {}", step.description));
        }
        for (key, value) in &step.args {
            lines.push(format!("      {key} = {}", describe_arg(value)));
        }
        if !step.depends_on.is_empty() {
            lines.push(format!("      after: {}", step.depends_on.join(", ")));
        }
    }

    if !plan.rollback_strategy.is_empty() {
        lines.push(format!("\nRollback: {}", plan.rollback_strategy));
    }

    lines.join("\n")
}

pub fn describe_planned(planned: &PlannedCommand) -> String {
    format!(
        "Planner: {} (confidence {:.2})\n{}",
        planned.label(),
        planned.confidence(),
        describe_plan(planned.plan())
    )
}

pub fn describe_run(report: &PlanRunReport) -> String {
    let mut lines = Vec::new();
    for step in &report.steps {
        let status = if step.result.success { "ok" } else { "FAILED" };
        let mut line = format!(
            "  {} {} ({}ms) {status}",
            step.step_id, step.tool, step.result.duration_ms
        );
        if let Some(error) = &step.result.error {
            line.push_str(&format!(": {error}"));
        }
        lines.push(line);
    }
    for warning in &report.validation.warnings {
        lines.push(format!("  warning: {warning}"));
    }
    lines.push(match report.halted {
        None => "Plan completed".to_string(),
        Some(HaltReason::InvalidPlan) => {
            let mut text = "Halted: plan is invalid".to_string();
            for error in &report.validation.errors {
                text.push_str(&format!("\n  error: {error}"));
            }
            text
        }
        Some(HaltReason::ApprovalRequired) => "Halted: approval required (re-run with --approve)".to_string(),
        Some(HaltReason::StepFailed) => "Halted: a step failed".to_string(),
        Some(HaltReason::DoomLoop) => "Halted: repeated identical tool calls".to_string(),
    });
    lines.push(format!("State version: {}", report.final_state_version));
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::demo::create_demo_project;
    use crate::model::{arg_map, PlanStep, StepValueReference};

    #[test]
    fn context_lists_tracks_and_assets() {
        let text = describe_context(&create_demo_project().snapshot().context_snapshot());
        assert!(text.contains("Sequence: seq_main"));
        assert!(text.contains("Video 1 (id: track_v1, Video, 2 clips) *"));
        assert!(text.contains("logo.png (id: asset_logo, Image, still)"));
        assert!(text.contains("Selected clips: clip_interview"));
    }

    #[test]
    fn plan_shows_references_and_approval() {
        let plan = Plan::new(
            "place generated clip",
            vec![PlanStep::new(
                "insert",
                "insert_clip",
                arg_map([(
                    "assetId",
                    StepValueReference::new("gen", "data.assetId").with_default("asset_x"),
                )]),
            )
            .after("gen")],
        )
        .requiring_approval(true);
        let text = describe_plan(&plan);
        assert!(text.contains("Requires approval"));
        assert!(text.contains("assetId = <gen.data.assetId or \"asset_x\">"));
        assert!(text.contains("after: gen"));
    }
}
