//! Entity checks for mutating tools: ids passed as `assetId`, `trackId`,
//! `targetTrackId` and `clipId` must name something in the live project.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::AppError;
use crate::project::ProjectSnapshot;

/// Values an LLM tends to emit when it has no real id to hand.
static PLACEHOLDER_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^(?:
            \s*
          | <[^>]*>
          | \{\{?[^}]*\}?\}
          | \[[^\]]*\]
          | \$\{[^}]*\}
          | \.{2,}
          | .*placeholder.*
          | todo | tbd | xxx+ | unknown | none | null | undefined | n/?a
          | (?:asset|clip|track|target[_-]?track)[_-]?id
          | (?:your|some|example|sample|dummy|fake)[_-].*
          | ref:.*
        )$",
    )
    .ok()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entity {
    Asset,
    Track,
    Clip,
}

const ENTITY_ARGS: &[(&str, Entity)] = &[
    ("assetId", Entity::Asset),
    ("trackId", Entity::Track),
    ("targetTrackId", Entity::Track),
    ("clipId", Entity::Clip),
];

pub fn looks_like_placeholder(id: &str) -> bool {
    PLACEHOLDER_ID.as_ref().is_some_and(|re| re.is_match(id))
}

/// Check the top-level entity arguments of a mutating call. Non-string
/// values are left to schema validation.
pub fn check_entity_args(tool: &str, args: &Value, project: &ProjectSnapshot) -> Result<(), AppError> {
    let Some(object) = args.as_object() else {
        return Ok(());
    };
    for (key, entity) in ENTITY_ARGS {
        let Some(id) = object.get(*key).and_then(Value::as_str) else {
            continue;
        };
        if looks_like_placeholder(id) {
            return Err(AppError::PreconditionFailed {
                message: format!(
                    "{tool}: {key} \"{id}\" looks like a placeholder, not a real id; look it up first"
                ),
            });
        }
        let exists = match entity {
            Entity::Asset => project.has_asset(id),
            Entity::Track => project.has_track(id),
            Entity::Clip => project.has_clip(id),
        };
        if !exists {
            return Err(AppError::PreconditionFailed {
                message: format!(
                    "{tool}: {key} \"{id}\" does not exist in the active sequence (unknown or placeholder id)"
                ),
            });
        }
    }
    Ok(())
}
