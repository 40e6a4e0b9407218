//! Default prompts for the model-backed agents.
//!
//! Prompts are split so the static part stays identical across calls:
//! 1. Base prompt (shared by every agent)
//! 2. Step-specific instructions and output format
//! 3. Dynamic content (facts, label, prior attempts)

use rate_audit_core::{AuditTypeLabel, FactSet, ReasoningAttempt, Verdict};

/// Base system prompt shared by every audit agent.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You are a parcel rate analyst auditing one shipment.

You compare what the carrier billed against what the rate engine calculated.
You only use the facts you are given. You never invent values.
When a fact you need is missing, you say so by naming it.
Field names are snake_case and must match the names used in the facts.
"#;

/// Reasoning step instructions.
pub const REASONING_PROMPT: &str = r#"
## Task: Causal reasoning

Decide whether the facts are sufficient to explain the audit discrepancy.

- If they are, explain the cause in one or two sentences, quoting the
  billed and expected values, and give a short case name.
- If they are not, list the fields that would settle it. List only fields
  that are not present in the facts. Never return an empty list.

## Output Format (JSON only, no prose)
{"status": "sufficient", "explanation": "...", "case": "..."}
or
{"status": "insufficient", "missing_fields": ["field_name", ...]}
"#;

/// Summary step instructions.
pub const SUMMARY_PROMPT: &str = r#"
## Task: Audit summary

Write the findings for a billing analyst. One bullet per discrepancy, each
citing the billed value, the expected value and the difference. Add a
recommendation only when the net charge shows a recoverable overcharge.

## Output Format (JSON only, no prose)
{"bullets": ["..."], "recommendation": "..." | null}
"#;

/// System prompt for the reasoning step.
pub fn reasoning_system_prompt() -> String {
    format!("{}{}", BASE_SYSTEM_PROMPT, REASONING_PROMPT)
}

/// System prompt for the summary step.
pub fn summary_system_prompt() -> String {
    format!("{}{}", BASE_SYSTEM_PROMPT, SUMMARY_PROMPT)
}

fn render_facts(facts: &FactSet) -> String {
    serde_json::to_string_pretty(facts.as_map()).unwrap_or_else(|_| "{}".to_string())
}

/// User message for the reasoning step.
pub fn reasoning_user_prompt(
    facts: &FactSet,
    label: AuditTypeLabel,
    prior: &[ReasoningAttempt],
) -> String {
    let mut prompt = format!(
        "## Audit type\n{} ({})\n\n## Facts\n{}\n",
        label,
        label.description(),
        render_facts(facts)
    );

    if !prior.is_empty() {
        prompt.push_str("\n## Earlier requests\n");
        for attempt in prior {
            let fields: Vec<&str> = attempt.missing_fields.iter().map(String::as_str).collect();
            prompt.push_str(&format!(
                "- iteration {}: asked for {}\n",
                attempt.iteration,
                fields.join(", ")
            ));
        }
        prompt.push_str(
            "\nFields asked for earlier and still absent could not be retrieved.\n",
        );
    }

    prompt
}

/// User message for the summary step.
pub fn summary_user_prompt(facts: &FactSet, label: AuditTypeLabel, verdict: &Verdict) -> String {
    format!(
        "## Audit type\n{}\n\n## Finding\n{}\n\n## Facts\n{}\n",
        label,
        verdict.explanation().unwrap_or("(none)"),
        render_facts(facts)
    )
}
