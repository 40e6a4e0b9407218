//! Rule-based summaries.

use super::catalog::{self, describe, disagrees, NET_CHARGE};
use crate::facts::FactSet;
use crate::types::{AuditTypeLabel, Summary, Verdict};

/// Builds a summary from the label's comparisons.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSummarizer;

impl RuleSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// One bullet per disagreeing comparison; the verdict explanation when
    /// none disagree.
    pub fn summarize(&self, facts: &FactSet, label: AuditTypeLabel, verdict: &Verdict) -> Summary {
        let mut bullets: Vec<String> = catalog::profile(label)
            .comparisons
            .iter()
            .filter(|c| disagrees(facts, c))
            .filter_map(|c| describe(facts, c))
            .collect();
        bullets.dedup();

        if bullets.is_empty() {
            let fallback = verdict
                .explanation()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} found no discrepancy", label.description()));
            bullets.push(fallback);
        }

        Summary {
            audit_type: label,
            bullets,
            recommendation: recommendation(facts),
        }
    }
}

/// Dispute recommendation from the net charge pair, when both are known.
pub fn recommendation(facts: &FactSet) -> Option<String> {
    let overcharge = catalog::delta(facts, &NET_CHARGE)?;
    Some(if overcharge > 0.005 {
        format!(
            "File a dispute with the carrier; potential recovery {}",
            catalog::render(overcharge, catalog::Unit::Dollars)
        )
    } else {
        "No action required; net charge is at or below the calculated amount".to_string()
    })
}
