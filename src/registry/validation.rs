//! Shared validation helpers for tool arguments.
//!
//! Tool schemas are compiled once with [`compile_schema`] and checked with
//! [`validate_with`]; the numeric checks are used by handlers so they all
//! produce consistent error messages.

use jsonschema::{validator_for, Validator};
use serde_json::Value;

use crate::error::AppError;

/// Errors reported per call before the message is truncated.
const MAX_REPORTED_ERRORS: usize = 3;

/// Compile a tool's parameter schema, so a bad definition is rejected at registration.
pub fn compile_schema(tool: &str, schema: &Value) -> Result<Validator, AppError> {
    validator_for(schema).map_err(|e| AppError::InvalidConfig {
        message: format!("invalid JSON schema for '{tool}': {e}"),
    })
}

/// Validate `args` with a compiled tool schema.
pub fn validate_with(tool: &str, validator: &Validator, args: &Value) -> Result<(), AppError> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .take(MAX_REPORTED_ERRORS)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(AppError::ValidationError {
        message: format!("invalid arguments for '{tool}': {}", errors.join("; ")),
    })
}

/// One-off validation against an uncompiled schema, for catalogs that hold
/// bare definitions.
pub fn validate_against_schema(tool: &str, schema: &Value, args: &Value) -> Result<(), AppError> {
    validate_with(tool, &compile_schema(tool, schema)?, args)
}

/// Validate a time range: both values must be finite, non-negative, and start < end.
pub fn validate_time_range(start: f64, end: f64) -> Result<(), AppError> {
    if start.is_finite() && end.is_finite() && start >= 0.0 && start < end {
        return Ok(());
    }
    Err(AppError::ValidationError {
        message: format!(
            "Invalid time range: start={start:.3}, end={end:.3}. Must be finite, start >= 0, start < end"
        ),
    })
}

/// Validate that a value is finite and positive.
pub fn validate_positive_finite(value: f64, name: &str) -> Result<(), AppError> {
    if !value.is_finite() {
        return Err(AppError::ValidationError {
            message: format!("{name} must be finite"),
        });
    }
    if value <= 0.0 {
        return Err(AppError::ValidationError {
            message: format!("{name} must be positive"),
        });
    }
    Ok(())
}
