//! Rule-based reasoning: required-field check plus a causal explanation
//! built from the label's primary comparison.

use super::catalog::{self, describe, disagrees};
use crate::facts::FactSet;
use crate::types::{AuditTypeLabel, ReasoningAttempt, Verdict};

/// Deterministic reasoner.
///
/// Always re-evaluates the full fact set, so repeated calls over a growing
/// fact set move from Insufficient to Sufficient and never back.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleReasoner;

impl RuleReasoner {
    pub fn new() -> Self {
        Self
    }

    /// Required facts for `label` that are not yet known.
    pub fn missing_fields(&self, facts: &FactSet, label: AuditTypeLabel) -> Vec<String> {
        facts
            .absent(catalog::profile(label).required.iter().copied())
            .into_iter()
            .collect()
    }

    pub fn reason(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        _prior: &[ReasoningAttempt],
    ) -> Verdict {
        let missing = self.missing_fields(facts, label);
        if let Ok(verdict) = Verdict::insufficient(missing) {
            return verdict;
        }

        let (explanation, case) = explain(facts, label);
        Verdict::sufficient(explanation).with_case(case)
    }
}

fn explain(facts: &FactSet, label: AuditTypeLabel) -> (String, String) {
    if label == AuditTypeLabel::DuplicateCharge {
        let count = facts.number("duplicate_invoice_count").unwrap_or(0.0);
        let explanation = format!(
            "Shipment appears on {} invoices",
            catalog::render(count, catalog::Unit::Plain)
        );
        let case = if count > 1.0 {
            "Shipment billed more than once"
        } else {
            "No duplicate billing found"
        };
        return (explanation, case.to_string());
    }

    let comparisons = catalog::profile(label).comparisons;
    let primary = comparisons
        .iter()
        .find(|c| disagrees(facts, c))
        .or_else(|| comparisons.first());

    let explanation = primary
        .and_then(|c| describe(facts, c))
        .unwrap_or_else(|| format!("{} found no discrepancy", label.description()));

    let case = match primary.and_then(|c| catalog::delta(facts, c)) {
        Some(d) if d > f64::EPSILON => "Carrier overbilled",
        Some(d) if d < -f64::EPSILON => "Carrier underbilled",
        Some(_) => "Billing matches expectation",
        None if primary.is_some_and(|c| disagrees(facts, c)) => "Carrier billed a different value",
        None => "Billing matches expectation",
    };

    (explanation, case.to_string())
}
