//! Step value references: detection, collection, validation
//! normalization, resolution and path lookup.
//!
//! Locations use dot/bracket notation relative to the argument object
//! (`items[0].assetId`); the root itself is `$`.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{ArgMap, ArgValue, Plan, RiskLevel, StepValueReference, ToolExecutionResult};
use crate::registry::ToolCatalog;

/// Results of already-executed steps, keyed by step id.
pub type StepResults = IndexMap<String, ToolExecutionResult>;

/// True iff `value` is a non-array object with non-empty string `fromStep`
/// and `path` fields.
pub fn is_step_reference(value: &Value) -> bool {
    StepValueReference::from_json(value).is_some()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedReference {
    pub location: String,
    pub reference: StepValueReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceError {
    pub location: String,
    pub step_id: String,
    pub reason: String,
}

/// Best-effort resolution output. `value` is usable only when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedArgs {
    pub value: Value,
    pub referenced_steps: BTreeSet<String>,
    pub errors: Vec<ReferenceError>,
}

impl ResolvedArgs {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// One line per failed reference, for error messages.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{} (from step '{}'): {}", e.location, e.step_id, e.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn child_location(parent: &str, key: &str) -> String {
    if parent == "$" {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn index_location(parent: &str, index: usize) -> String {
    let mut loc = if parent == "$" {
        String::new()
    } else {
        parent.to_string()
    };
    let _ = write!(loc, "[{index}]");
    loc
}

// ── Collection ──────────────────────────────────────────────────

/// Every reference in `args`, in document order.
pub fn collect_references(args: &ArgMap) -> Vec<LocatedReference> {
    let mut found = Vec::new();
    for (key, value) in args {
        collect_into(value, key, &mut found);
    }
    found
}

/// Every reference in an arbitrary value; a reference at the root is at `$`.
pub fn collect_references_in(value: &ArgValue) -> Vec<LocatedReference> {
    let mut found = Vec::new();
    collect_into(value, "$", &mut found);
    found
}

fn collect_into(value: &ArgValue, location: &str, found: &mut Vec<LocatedReference>) {
    match value {
        ArgValue::Reference(r) => found.push(LocatedReference {
            location: location.to_string(),
            reference: r.clone(),
        }),
        ArgValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_into(item, &index_location(location, i), found);
            }
        }
        ArgValue::Object(map) => {
            for (key, item) in map {
                collect_into(item, &child_location(location, key), found);
            }
        }
        _ => {}
    }
}

// ── Validation normalization ────────────────────────────────────

/// Copy of `args` as plain JSON with each reference replaced by a value of
/// the type its schema slot expects, so an unexecuted step can still be
/// schema-checked.
pub fn normalize_for_validation(args: &ArgMap, schema: &Value) -> Value {
    let root = ArgValue::Object(args.clone());
    normalize_value(&root, Some(schema), schema)
}

fn normalize_value(value: &ArgValue, slot: Option<&Value>, root: &Value) -> Value {
    let slot = slot.map(|s| follow_refs(s, root));
    match value {
        ArgValue::Reference(r) => placeholder_for(r, slot, root),
        ArgValue::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| normalize_value(item, slot.and_then(|s| item_schema(s, i, root)), root))
                .collect(),
        ),
        ArgValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let child = slot.and_then(|s| property_schema(s, k, root));
                    (k.clone(), normalize_value(v, child, root))
                })
                .collect::<Map<_, _>>(),
        ),
        other => other.to_json(),
    }
}

fn placeholder_for(reference: &StepValueReference, slot: Option<&Value>, root: &Value) -> Value {
    match slot.and_then(|s| schema_type(s, root)).as_deref() {
        Some("number" | "integer") => Value::from(0),
        Some("boolean") => Value::Bool(false),
        Some("array") => Value::Array(Vec::new()),
        Some("object") => Value::Object(Map::new()),
        _ => Value::String(format!(
            "ref:{}:{}",
            reference.from_step, reference.path
        )),
    }
}

/// Resolve local `$ref` pointers (`#/definitions/X`, `#/$defs/X`) against the root.
fn follow_refs<'a>(schema: &'a Value, root: &'a Value) -> &'a Value {
    let mut current = schema;
    // Bounded to avoid cycling on self-referential schemas
    for _ in 0..16 {
        let Some(target) = current
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix('#'))
            .and_then(|pointer| root.pointer(pointer))
        else {
            break;
        };
        current = target;
    }
    current
}

/// First non-null branch of `anyOf`/`oneOf`/`allOf`, if any.
fn first_branch<'a>(schema: &'a Value, root: &'a Value) -> Option<&'a Value> {
    ["anyOf", "oneOf", "allOf"]
        .iter()
        .filter_map(|k| schema.get(*k).and_then(Value::as_array))
        .flatten()
        .map(|b| follow_refs(b, root))
        .find(|b| b.get("type").and_then(Value::as_str) != Some("null"))
}

fn schema_type(schema: &Value, root: &Value) -> Option<String> {
    let schema = follow_refs(schema, root);
    match schema.get("type") {
        Some(Value::String(t)) => Some(t.clone()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .map(str::to_string),
        _ => {
            if schema.get("properties").is_some() {
                Some("object".to_string())
            } else if schema.get("items").is_some() {
                Some("array".to_string())
            } else {
                first_branch(schema, root).and_then(|b| schema_type(b, root))
            }
        }
    }
}

fn property_schema<'a>(schema: &'a Value, key: &str, root: &'a Value) -> Option<&'a Value> {
    let schema = follow_refs(schema, root);
    schema
        .get("properties")
        .and_then(|p| p.get(key))
        .or_else(|| first_branch(schema, root).and_then(|b| property_schema(b, key, root)))
}

fn item_schema<'a>(schema: &'a Value, index: usize, root: &'a Value) -> Option<&'a Value> {
    let schema = follow_refs(schema, root);
    match schema.get("items") {
        Some(Value::Array(tuple)) => tuple.get(index),
        Some(items) => Some(items),
        None => first_branch(schema, root).and_then(|b| item_schema(b, index, root)),
    }
}

// ── Resolution ──────────────────────────────────────────────────

/// Replace every reference in `args` with the resolver's value.
///
/// A failed reference is recorded in `errors` and left out of the result:
/// its key is omitted from the enclosing object, an array slot becomes `null`.
pub fn resolve_references<F>(args: &ArgMap, mut resolver: F) -> ResolvedArgs
where
    F: FnMut(&StepValueReference) -> Result<Value, String>,
{
    let mut referenced_steps = BTreeSet::new();
    let mut errors = Vec::new();
    let mut out = Map::new();
    for (key, value) in args {
        if let Some(resolved) =
            resolve_into(value, key, &mut resolver, &mut referenced_steps, &mut errors)
        {
            out.insert(key.clone(), resolved);
        }
    }
    ResolvedArgs {
        value: Value::Object(out),
        referenced_steps,
        errors,
    }
}

/// Resolution over an arbitrary value. A failed root reference yields `null`.
pub fn resolve_value<F>(value: &ArgValue, mut resolver: F) -> ResolvedArgs
where
    F: FnMut(&StepValueReference) -> Result<Value, String>,
{
    let mut referenced_steps = BTreeSet::new();
    let mut errors = Vec::new();
    let resolved = resolve_into(value, "$", &mut resolver, &mut referenced_steps, &mut errors);
    ResolvedArgs {
        value: resolved.unwrap_or(Value::Null),
        referenced_steps,
        errors,
    }
}

fn resolve_into<F>(
    value: &ArgValue,
    location: &str,
    resolver: &mut F,
    referenced: &mut BTreeSet<String>,
    errors: &mut Vec<ReferenceError>,
) -> Option<Value>
where
    F: FnMut(&StepValueReference) -> Result<Value, String>,
{
    match value {
        ArgValue::Reference(r) => {
            referenced.insert(r.from_step.clone());
            match resolver(r) {
                Ok(v) => Some(v),
                Err(reason) => {
                    errors.push(ReferenceError {
                        location: location.to_string(),
                        step_id: r.from_step.clone(),
                        reason,
                    });
                    None
                }
            }
        }
        ArgValue::Array(items) => Some(Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    resolve_into(item, &index_location(location, i), resolver, referenced, errors)
                        .unwrap_or(Value::Null)
                })
                .collect(),
        )),
        ArgValue::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                let loc = child_location(location, key);
                if let Some(v) = resolve_into(item, &loc, resolver, referenced, errors) {
                    out.insert(key.clone(), v);
                }
            }
            Some(Value::Object(out))
        }
        other => Some(other.to_json()),
    }
}

/// Resolve against the serialized results of earlier steps, falling back to
/// each reference's default.
pub fn resolve_from_results(args: &ArgMap, results: &StepResults) -> ResolvedArgs {
    resolve_references(args, |r| lookup_in_results(r, results))
}

fn lookup_in_results(reference: &StepValueReference, results: &StepResults) -> Result<Value, String> {
    let found = results.get(&reference.from_step).and_then(|result| {
        let source = result.to_json();
        match lookup_path(&source, &reference.path) {
            PathLookup::Found(v) => Some(v.clone()),
            PathLookup::Missing { .. } => None,
        }
    });
    if let Some(v) = found {
        return Ok(v);
    }
    if let Some(default) = &reference.default {
        return Ok(default.clone());
    }
    if results.contains_key(&reference.from_step) {
        Err(format!(
            "path '{}' not found in result of step '{}'",
            reference.path, reference.from_step
        ))
    } else {
        Err(format!("step '{}' has no result yet", reference.from_step))
    }
}

// ── Path lookup ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PathLookup<'a> {
    Found(&'a Value),
    Missing { at: String },
}

impl PathLookup<'_> {
    pub fn is_found(&self) -> bool {
        matches!(self, PathLookup::Found(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn tokenize(path: &str) -> Result<Vec<Segment>, String> {
    let trimmed = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let digits: String = chars.by_ref().take_while(|c| *c != ']').collect();
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid index '[{digits}]'"))?;
                segments.push(Segment::Index(index));
            }
            _ => key.push(c),
        }
    }
    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }
    Ok(segments)
}

/// Walk `source` along `path` (`data[0].id`, `$.data.clipId`). An empty path
/// (or bare `$`) finds the source itself.
pub fn lookup_path<'a>(source: &'a Value, path: &str) -> PathLookup<'a> {
    let segments = match tokenize(path) {
        Ok(s) => s,
        Err(reason) => return PathLookup::Missing { at: reason },
    };
    let mut current = source;
    let mut walked = String::from("$");
    for segment in segments {
        let next = match (&segment, current) {
            (Segment::Key(k), Value::Object(obj)) => obj.get(k),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        };
        match &segment {
            Segment::Key(k) => {
                walked.push('.');
                walked.push_str(k);
            }
            Segment::Index(i) => {
                let _ = write!(walked, "[{i}]");
            }
        }
        match next {
            Some(v) => current = v,
            None => return PathLookup::Missing { at: walked },
        }
    }
    PathLookup::Found(current)
}

// ── Plan validation ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanIssue {
    pub code: &'static str,
    /// `None` for issues with the plan as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub message: String,
}

impl PlanIssue {
    fn plan(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            step_id: None,
            message: message.into(),
        }
    }

    fn step(code: &'static str, step_id: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            step_id: Some(step_id.to_string()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.step_id {
            Some(id) => write!(f, "{} [{id}]: {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Errors make a plan unrunnable; warnings are surfaced and the plan still runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanValidation {
    pub errors: Vec<PlanIssue>,
    pub warnings: Vec<PlanIssue>,
}

impl PlanValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural check of a plan against a catalog. Collects every issue
/// rather than stopping at the first.
pub fn validate_plan<C: ToolCatalog + ?Sized>(plan: &Plan, catalog: &C) -> PlanValidation {
    let mut out = PlanValidation::default();

    if plan.goal.trim().is_empty() {
        out.errors
            .push(PlanIssue::plan("EMPTY_GOAL", "plan must state a goal"));
    }
    if plan.steps.is_empty() {
        out.errors
            .push(PlanIssue::plan("NO_STEPS", "plan must have at least one step"));
    }

    let mut seen: Vec<&str> = Vec::new();
    let mut risky: Vec<&str> = Vec::new();

    for step in &plan.steps {
        let mut error = |code: &'static str, message: String| {
            out.errors.push(PlanIssue::step(code, &step.id, message));
        };

        if seen.contains(&step.id.as_str()) {
            error("DUPLICATE_STEP", format!("duplicate step id '{}'", step.id));
        }
        for dep in &step.depends_on {
            if !seen.contains(&dep.as_str()) {
                error(
                    "UNKNOWN_DEPENDENCY",
                    format!("depends on '{dep}', which is not an earlier step"),
                );
            }
        }
        for located in collect_references(&step.args) {
            if !seen.contains(&located.reference.from_step.as_str()) {
                error(
                    "FORWARD_REFERENCE",
                    format!(
                        "{} references '{}', which is not an earlier step",
                        located.location, located.reference.from_step
                    ),
                );
            }
        }

        let mut risk = step.risk;
        match catalog.tool_definition(&step.tool) {
            None => error(
                "TOOL_NOT_FOUND",
                format!("tool '{}' is not registered", step.tool),
            ),
            Some(def) => {
                risk = risk.max(def.risk_level);
                let normalized = normalize_for_validation(&step.args, &def.parameters);
                if let Err(e) = catalog.validate_args(&step.tool, &normalized) {
                    error("INVALID_ARGS", e.to_string());
                }
            }
        }
        if risk >= RiskLevel::High {
            risky.push(&step.id);
        }

        seen.push(&step.id);
    }

    for id in risky {
        let message = if plan.requires_approval {
            "high-risk step; review before approving".to_string()
        } else {
            "high-risk step in a plan that runs without approval".to_string()
        };
        out.warnings.push(PlanIssue::step("HIGH_RISK", id, message));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::PlanStep;
    use crate::registry::catalog::standard_definitions;
    use serde_json::json;

    fn arg_map(value: Value) -> ArgMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn collects_nested_locations() {
        let args = arg_map(json!({
            "assetId": { "fromStep": "s1", "path": "data[0].id" },
            "items": [1, { "clip": { "fromStep": "s2", "path": "data.clipId" } }],
            "plain": { "fromStep": "", "path": "x" }
        }));
        let refs = collect_references(&args);
        let locations: Vec<&str> = refs.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(locations, vec!["assetId", "items[1].clip"]);

        let root = ArgValue::from(json!({ "fromStep": "s1", "path": "data" }));
        assert_eq!(collect_references_in(&root)[0].location, "$");
    }

    #[test]
    fn normalization_uses_schema_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "volume": { "type": "number" },
                "muted": { "type": ["boolean", "null"] },
                "ids": { "type": "array", "items": { "type": "string" } },
                "meta": { "$ref": "#/definitions/Meta" },
                "name": { "type": "string" }
            },
            "definitions": { "Meta": { "type": "object", "properties": {} } }
        });
        let r = json!({ "fromStep": "s1", "path": "data.x" });
        let args = arg_map(json!({
            "volume": r, "muted": r, "ids": r, "meta": r, "name": r, "extra": r
        }));
        let normalized = normalize_for_validation(&args, &schema);
        assert_eq!(normalized["volume"], json!(0));
        assert_eq!(normalized["muted"], json!(false));
        assert_eq!(normalized["ids"], json!([]));
        assert_eq!(normalized["meta"], json!({}));
        assert_eq!(normalized["name"], json!("ref:s1:data.x"));
        assert!(normalized["extra"].is_string());
    }

    #[test]
    fn literal_only_resolution_is_identity() {
        let original = json!({ "a": 1, "b": [true, "x", null], "c": { "d": 2.5 } });
        let mut calls = 0;
        let resolved = resolve_references(&arg_map(original.clone()), |_| {
            calls += 1;
            Err("unexpected".into())
        });
        assert_eq!(calls, 0);
        assert_eq!(resolved.value, original);
        assert!(resolved.referenced_steps.is_empty());
        assert!(resolved.errors.is_empty());
    }

    #[test]
    fn missing_path_without_default_omits_key() {
        let args = arg_map(json!({
            "sequenceId": "seq_1",
            "assetId": { "fromStep": "lookup", "path": "data[3].id" },
            "list": [{ "fromStep": "lookup", "path": "data[9]" }]
        }));
        let mut results = StepResults::new();
        results.insert(
            "lookup".into(),
            ToolExecutionResult::ok(json!([{ "id": "a1" }]), 3),
        );
        let resolved = resolve_from_results(&args, &results);
        assert_eq!(resolved.value, json!({ "sequenceId": "seq_1", "list": [null] }));
        assert_eq!(resolved.errors.len(), 2);
        assert_eq!(resolved.errors[0].location, "assetId");
        assert_eq!(resolved.errors[1].location, "list[0]");
        assert!(resolved.errors[0].reason.contains("not found"));
        assert!(resolved.referenced_steps.contains("lookup"));
    }

    #[test]
    fn resolves_from_results_with_default_fallback() {
        let args = arg_map(json!({
            "assetId": { "fromStep": "lookup", "path": "data[0].id", "default": "fallback" },
            "jobId": { "fromStep": "gen", "path": "$.data.jobId" }
        }));
        let mut results = StepResults::new();
        results.insert("lookup".into(), ToolExecutionResult::ok(json!([]), 1));
        results.insert(
            "gen".into(),
            ToolExecutionResult::ok(json!({ "jobId": "job_7" }), 1),
        );
        let resolved = resolve_from_results(&args, &results);
        assert!(resolved.is_complete());
        assert_eq!(
            resolved.value,
            json!({ "assetId": "fallback", "jobId": "job_7" })
        );
    }

    #[test]
    fn unknown_step_reports_reason() {
        let args = arg_map(json!({ "x": { "fromStep": "ghost", "path": "data" } }));
        let resolved = resolve_from_results(&args, &StepResults::new());
        assert!(resolved.errors[0].reason.contains("ghost"));
        assert!(resolved.error_summary().starts_with("x (from step 'ghost')"));
    }

    #[test]
    fn root_reference_failure_is_null() {
        let root = ArgValue::from(json!({ "fromStep": "s", "path": "p" }));
        let resolved = resolve_value(&root, |_| Err("nope".into()));
        assert_eq!(resolved.value, Value::Null);
        assert_eq!(resolved.errors[0].location, "$");
    }

    #[test]
    fn path_lookup_cases() {
        let source = json!({ "data": [{ "id": "a1" }, { "id": "a2" }], "n": 0 });
        assert_eq!(lookup_path(&source, "data[1].id"), PathLookup::Found(&json!("a2")));
        assert_eq!(lookup_path(&source, "$.n"), PathLookup::Found(&json!(0)));
        assert_eq!(lookup_path(&source, "$data[0].id"), PathLookup::Found(&json!("a1")));
        assert_eq!(lookup_path(&source, "$"), PathLookup::Found(&source));
        assert!(!lookup_path(&source, "data[2].id").is_found());
        assert!(!lookup_path(&source, "data.id").is_found());
        assert!(!lookup_path(&source, "n.deeper").is_found());
        assert!(!lookup_path(&source, "data[x]").is_found());
        assert_eq!(
            lookup_path(&source, "data[5]"),
            PathLookup::Missing { at: "$.data[5]".into() }
        );
    }

    fn codes(issues: &[PlanIssue]) -> Vec<&'static str> {
        issues.iter().map(|i| i.code).collect()
    }

    fn volume_step(id: &str) -> PlanStep {
        PlanStep::new(
            id,
            "adjust_volume",
            arg_map(json!({ "sequenceId": "seq_1", "clipId": "c1", "volume": 0.5 })),
        )
    }

    #[test]
    fn empty_plan_and_blank_goal_are_errors() {
        let catalog = standard_definitions();
        let validation = validate_plan(&Plan::new("   ", Vec::new()), &catalog);
        assert!(!validation.is_valid());
        assert_eq!(codes(&validation.errors), vec!["EMPTY_GOAL", "NO_STEPS"]);
        assert!(validation.errors.iter().all(|i| i.step_id.is_none()));

        let validation = validate_plan(&Plan::new("lower it", vec![volume_step("s1")]), &catalog);
        assert!(validation.is_valid());
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn structural_errors_name_their_step() {
        let catalog = standard_definitions();
        let plan = Plan::new(
            "mixed",
            vec![
                volume_step("s1"),
                volume_step("s1"),
                volume_step("s2").after("s9"),
                PlanStep::new(
                    "s3",
                    "adjust_volume",
                    arg_map(json!({
                        "sequenceId": "seq_1",
                        "clipId": { "fromStep": "s4", "path": "data.clipId" },
                        "volume": 0.5
                    })),
                ),
                PlanStep::new("s4", "explode_timeline", ArgMap::new()),
                PlanStep::new(
                    "s5",
                    "adjust_volume",
                    arg_map(json!({ "sequenceId": "seq_1", "clipId": "c1", "volume": "loud" })),
                ),
            ],
        );
        let validation = validate_plan(&plan, &catalog);
        assert_eq!(
            codes(&validation.errors),
            vec![
                "DUPLICATE_STEP",
                "UNKNOWN_DEPENDENCY",
                "FORWARD_REFERENCE",
                "TOOL_NOT_FOUND",
                "INVALID_ARGS"
            ]
        );
        let ids: Vec<&str> = validation.errors.iter().filter_map(|i| i.step_id.as_deref()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3", "s4", "s5"]);
        assert!(validation.errors[2].to_string().starts_with("FORWARD_REFERENCE [s3]: clipId"));
    }

    #[test]
    fn references_to_earlier_steps_validate_after_normalization() {
        let catalog = standard_definitions();
        let plan = Plan::new(
            "chain",
            vec![
                volume_step("s1"),
                PlanStep::new(
                    "s2",
                    "adjust_volume",
                    arg_map(json!({
                        "sequenceId": "seq_1",
                        "clipId": "c1",
                        "volume": { "fromStep": "s1", "path": "data.volume", "default": 1.0 }
                    })),
                )
                .after("s1"),
            ],
        );
        assert!(validate_plan(&plan, &catalog).is_valid());
    }

    #[test]
    fn high_risk_steps_warn_without_blocking() {
        let catalog = standard_definitions();
        let delete = PlanStep::new(
            "cut",
            "delete_range",
            arg_map(json!({ "sequenceId": "seq_1", "startTime": 2.0, "endTime": 4.0 })),
        );
        let flagged = volume_step("loud").risk(RiskLevel::Critical);

        let plan = Plan::new("tidy", vec![volume_step("s1"), delete.clone(), flagged]);
        let validation = validate_plan(&plan, &catalog);
        assert!(validation.is_valid());
        assert_eq!(codes(&validation.warnings), vec!["HIGH_RISK", "HIGH_RISK"]);
        let ids: Vec<&str> = validation.warnings.iter().filter_map(|i| i.step_id.as_deref()).collect();
        assert_eq!(ids, vec!["cut", "loud"]);
        assert!(validation.warnings[0].message.contains("without approval"));

        let reviewed = Plan::new("tidy", vec![delete]).requiring_approval(true);
        let validation = validate_plan(&reviewed, &catalog);
        assert!(validation.warnings[0].message.contains("review"));
    }
}
