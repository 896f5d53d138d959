use schemars::schema_for;
use serde_json::Value;

use super::{ToolCategory, ToolDefinition, ToolInfo, ToolRegistry};

pub(super) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub(super) fn schema_value<T: schemars::JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or_else(|_| empty_object_schema())
}

pub(super) fn entry(info: ToolInfo, parameters: Value) -> ToolDefinition {
    let required = parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    ToolDefinition {
        name: info.name.to_string(),
        description: info.description.to_string(),
        category: info.category,
        parameters,
        required,
        risk_level: info.risk_level,
        supports_undo: info.supports_undo,
        parallelizable: info.parallelizable,
        read_only: info.read_only,
    }
}

/// Every standard editing tool definition, generated from the param structs.
pub fn standard_definitions() -> Vec<ToolDefinition> {
    super::standard_tool_entries()
}

/// Tool discovery text. No topic lists categories, a category lists its tools,
/// a tool name shows its full parameter schema.
pub fn help_text(registry: &ToolRegistry, topic: Option<&str>) -> String {
    match topic {
        None => {
            let mut lines = vec!["Available tool categories:".to_string()];
            for cat in ToolCategory::all() {
                let count = registry.tools_by_category(*cat).len();
                if count > 0 {
                    lines.push(format!("  {} ({count}): {}", cat.slug(), cat.description()));
                }
            }
            lines.push(String::new());
            lines.push("Use `tools <category>` to list tools in a category.".to_string());
            lines.push("Use `tools <tool_name>` for full parameter details.".to_string());
            lines.join("\n")
        }
        Some(topic) => {
            if let Some(def) = registry.definition(topic) {
                let schema_str = serde_json::to_string_pretty(&def.parameters)
                    .unwrap_or_else(|_| "{}".to_string());
                return format!(
                    "{}: {}\nCategory: {} | Risk: {} | Undoable: {} | Read-only: {}\n\nParameters:\n{}",
                    def.name,
                    def.description,
                    def.category.slug(),
                    def.risk_level.slug(),
                    if def.supports_undo { "yes" } else { "no" },
                    if def.read_only { "yes" } else { "no" },
                    schema_str,
                );
            }

            let Some(cat) = ToolCategory::from_slug(&topic.to_lowercase()) else {
                return format!("Unknown topic: \"{topic}\". Run `tools` to see categories.");
            };
            let matching = registry.tools_by_category(cat);
            if matching.is_empty() {
                return format!("No tools registered in category \"{}\".", cat.slug());
            }
            let mut lines = vec![format!("{} tools:", cat.slug())];
            for def in matching {
                lines.push(format!("  - {}: {}", def.name, def.description));
            }
            lines.join("\n")
        }
    }
}

/// JSON Schema formatted tool list.
pub fn to_json_schema(registry: &ToolRegistry) -> Value {
    Value::Array(
        registry
            .available_tools()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "description": d.description,
                    "category": d.category,
                    "riskLevel": d.risk_level,
                    "readOnly": d.read_only,
                    "inputSchema": d.parameters,
                })
            })
            .collect(),
    )
}
