//! JSON Schema validation for externally produced payloads.
//!
//! Model-backed providers return verdicts and summaries as JSON. Those
//! payloads are validated against `schema/verdict.schema.json` and
//! `schema/summary.schema.json` before they are turned into typed values.

use std::sync::OnceLock;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::{AuditTypeLabel, Summary, Verdict};

/// Embedded schemas (loaded at compile time).
const VERDICT_SCHEMA_JSON: &str = include_str!("../schema/verdict.schema.json");
const SUMMARY_SCHEMA_JSON: &str = include_str!("../schema/summary.schema.json");

/// Compiled validators (initialized once, reused).
static VERDICT_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static SUMMARY_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),

    #[error("Payload does not match schema: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Payload could not be decoded: {0}")]
    Decode(String),
}

fn compile(
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    source: &str,
) -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = cell.get_or_init(|| {
        let schema_value: Value = match serde_json::from_str(source) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

fn check(validator: &jsonschema::Validator, payload: &Value) -> Result<(), SchemaError> {
    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid(errors))
    }
}

/// Validate and decode a verdict payload.
pub fn parse_verdict(payload: &Value) -> Result<Verdict, SchemaError> {
    let validator = compile(&VERDICT_SCHEMA, VERDICT_SCHEMA_JSON)?;
    check(validator, payload)?;

    let verdict: Verdict =
        serde_json::from_value(payload.clone()).map_err(|e| SchemaError::Decode(e.to_string()))?;
    verdict
        .validate()
        .map_err(|e| SchemaError::Invalid(vec![e.to_string()]))?;
    Ok(verdict)
}

#[derive(Deserialize)]
struct SummaryPayload {
    bullets: Vec<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

/// Validate and decode a summary payload for `label`.
pub fn parse_summary(payload: &Value, label: AuditTypeLabel) -> Result<Summary, SchemaError> {
    let validator = compile(&SUMMARY_SCHEMA, SUMMARY_SCHEMA_JSON)?;
    check(validator, payload)?;

    let decoded: SummaryPayload =
        serde_json::from_value(payload.clone()).map_err(|e| SchemaError::Decode(e.to_string()))?;
    Ok(Summary {
        audit_type: label,
        bullets: decoded.bullets,
        recommendation: decoded.recommendation.filter(|r| !r.trim().is_empty()),
    })
}

/// Check a verdict payload without decoding it.
pub fn is_valid_verdict(payload: &Value) -> bool {
    compile(&VERDICT_SCHEMA, VERDICT_SCHEMA_JSON)
        .map(|v| v.is_valid(payload))
        .unwrap_or(false)
}
