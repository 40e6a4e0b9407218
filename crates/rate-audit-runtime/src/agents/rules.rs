//! Rule-backed agents: the deterministic engines from `rate-audit-core`
//! exposed through the capability contracts.

use async_trait::async_trait;
use rate_audit_core::{
    AuditTypeLabel, FactSet, ReasoningAttempt, RuleClassifier, RuleReasoner, RuleSummarizer,
    Summary, Verdict,
};

use super::traits::{AgentError, Classifier, Reasoner, Summarizer};

#[async_trait]
impl Classifier for RuleClassifier {
    async fn classify(&self, facts: &FactSet) -> Result<AuditTypeLabel, AgentError> {
        Ok(RuleClassifier::classify(self, facts)?)
    }

    fn name(&self) -> &str {
        "rule-classifier"
    }
}

#[async_trait]
impl Reasoner for RuleReasoner {
    async fn reason(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        prior: &[ReasoningAttempt],
    ) -> Result<Verdict, AgentError> {
        Ok(RuleReasoner::reason(self, facts, label, prior))
    }

    fn name(&self) -> &str {
        "rule-reasoner"
    }
}

#[async_trait]
impl Summarizer for RuleSummarizer {
    async fn summarize(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        verdict: &Verdict,
    ) -> Result<Summary, AgentError> {
        Ok(RuleSummarizer::summarize(self, facts, label, verdict))
    }

    fn name(&self) -> &str {
        "rule-summarizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rate_audit_core::ClassificationError;
    use serde_json::json;

    fn facts(value: serde_json::Value) -> FactSet {
        FactSet::from_map(serde_json::from_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_rule_agents_through_traits() {
        let f = facts(json!({"billed_weight": 12, "actual_weight": 10}));

        let classifier: &dyn Classifier = &RuleClassifier::new();
        let label = classifier.classify(&f).await.unwrap();
        assert_eq!(label, AuditTypeLabel::BillWeight);

        let reasoner: &dyn Reasoner = &RuleReasoner::new();
        let verdict = reasoner.reason(&f, label, &[]).await.unwrap();
        assert!(verdict.is_sufficient());

        let summarizer: &dyn Summarizer = &RuleSummarizer::new();
        let summary = summarizer.summarize(&f, label, &verdict).await.unwrap();
        assert_eq!(summary.bullets.len(), 1);
    }

    #[tokio::test]
    async fn test_classification_failure_is_permanent() {
        let classifier: &dyn Classifier = &RuleClassifier::new();
        let err = classifier.classify(&FactSet::new()).await.unwrap_err();
        assert_eq!(err, AgentError::ClassificationFailed(ClassificationError::NoSignal));
        assert!(!err.is_transient());
    }
}
