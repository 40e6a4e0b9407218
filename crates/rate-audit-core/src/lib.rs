//! # rate-audit-core
//!
//! Deterministic core of shipping-rate audit analysis.
//!
//! This crate holds everything about an analysis run that does not perform
//! I/O:
//! - the data model (requests, verdicts, summaries, results)
//! - the fact set and its merge policy
//! - the per-run state and the routing decision after reasoning
//! - rule-based classification, reasoning and summary engines
//! - schema validation for externally produced verdicts and summaries
//!
//! ## Key Guarantees
//!
//! 1. **Bounded**: an Insufficient verdict routes to enrichment only while
//!    the iteration counter is below the bound
//! 2. **Monotonic**: merging facts never removes a key
//! 3. **Single label**: the audit type is set once per run
//!
//! ## Example
//!
//! ```rust,ignore
//! use rate_audit_core::{AuditRequest, AuditState, Phase, RuleReasoner};
//!
//! let request = AuditRequest::new("1Z999AA10123456784", "CLIENT001", "UPS")?;
//! let mut state = AuditState::new(request);
//! state.merge_facts(initial_facts);
//! state.set_audit_type(label)?;
//! state.record_verdict(RuleReasoner::new().reason(state.facts(), label, state.attempts()))?;
//!
//! match state.route_after_reasoning(3)? {
//!     Phase::Summarize => { /* build the summary */ }
//!     Phase::Enrich => { /* fetch state.missing_fields() */ }
//!     _ => { /* bound exceeded */ }
//! }
//! ```

pub mod facts;
pub mod rules;
pub mod schema;
pub mod state;
pub mod types;

// Re-export main types at crate root
pub use facts::{FactSet, MergeReport};
pub use rules::{ClassificationError, RuleClassifier, RuleReasoner, RuleSummarizer};
pub use schema::{parse_summary, parse_verdict, SchemaError};
pub use state::{AuditState, Phase, StateError};
pub use types::{
    AnalysisResult, AnalysisStatus, AuditRequest, AuditTypeLabel, FactMap, Outcome,
    ReasoningAttempt, RecordKey, RequestError, Summary, UnknownLabel, Verdict, VerdictError,
};

/// Default bound on enrichment iterations per run.
pub const DEFAULT_MAX_ENRICHMENT_ITERATIONS: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Drive a full run through the rule engines with facts supplied up front.
    #[test]
    fn test_rule_pipeline_completes() {
        let request = AuditRequest::new("1Z999AA10123456784", "CLIENT001", "UPS").unwrap();
        let mut state = AuditState::new(request);
        state.merge_facts(
            serde_json::from_value(json!({"billed_weight": 12, "actual_weight": 10})).unwrap(),
        );

        let label = RuleClassifier::new().classify(state.facts()).unwrap();
        state.set_audit_type(label).unwrap();

        let verdict = RuleReasoner::new().reason(state.facts(), label, state.attempts());
        state.record_verdict(verdict).unwrap();
        assert_eq!(
            state.route_after_reasoning(DEFAULT_MAX_ENRICHMENT_ITERATIONS),
            Ok(Phase::Summarize)
        );

        let verdict = state.verdict().cloned().unwrap();
        let summary = RuleSummarizer::new().summarize(state.facts(), label, &verdict);
        state.set_summary(summary).unwrap();

        let result = state.into_result().unwrap();
        assert!(result.is_completed());
        assert_eq!(result.iterations_used, 0);
        assert_eq!(result.summary().unwrap().bullets.len(), 1);
    }
}
