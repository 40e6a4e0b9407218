//! Model-backed agents.
//!
//! The model's reply is never trusted as-is: the JSON object is extracted,
//! validated against the schema in `rate-audit-core`, and only then turned
//! into a typed value.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use rate_audit_core::{
    parse_summary, parse_verdict, AuditTypeLabel, FactSet, ReasoningAttempt, RuleReasoner,
    RuleSummarizer, Summary, Verdict,
};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{AgentError, Reasoner, Summarizer};
use crate::prompts;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
    static ref BARE_JSON: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// Pull the JSON object out of a model reply (fenced or bare).
pub fn extract_json(reply: &str) -> Result<Value, AgentError> {
    let candidate = FENCED_JSON
        .captures(reply)
        .and_then(|c| c.get(1))
        .or_else(|| BARE_JSON.find(reply))
        .map(|m| m.as_str())
        .ok_or_else(|| AgentError::InvalidOutput("reply contains no JSON object".to_string()))?;

    serde_json::from_str(candidate).map_err(|e| AgentError::InvalidOutput(e.to_string()))
}

/// Reasoner that asks a model for the verdict.
///
/// While required facts are missing it answers from the rules, with no
/// model call.
pub struct LlmReasoner {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    rules: RuleReasoner,
}

impl LlmReasoner {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            completion: CompletionConfig::default(),
            rules: RuleReasoner::new(),
        }
    }

    pub fn with_completion_config(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn reason(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        prior: &[ReasoningAttempt],
    ) -> Result<Verdict, AgentError> {
        let missing = self.rules.missing_fields(facts, label);
        if !missing.is_empty() {
            debug!(label = %label, missing = ?missing, "Required facts missing, skipping model call");
            return Verdict::insufficient(missing).map_err(|e| AgentError::Internal(e.to_string()));
        }

        let messages = vec![
            ChatMessage::system(prompts::reasoning_system_prompt()),
            ChatMessage::user(prompts::reasoning_user_prompt(facts, label, prior)),
        ];
        let response = self.provider.complete(messages, &self.completion).await?;
        debug!(
            provider = self.provider.name(),
            tokens = response.usage.total(),
            "Reasoning completion received"
        );

        let payload = extract_json(&response.content)?;
        parse_verdict(&payload).map_err(|e| AgentError::InvalidOutput(e.to_string()))
    }

    fn name(&self) -> &str {
        "llm-reasoner"
    }
}

/// Summarizer that asks a model for the bullets and falls back to the rule
/// summary on any failure.
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    fallback: RuleSummarizer,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            completion: CompletionConfig::default(),
            fallback: RuleSummarizer::new(),
        }
    }

    pub fn with_completion_config(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }

    async fn ask(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        verdict: &Verdict,
    ) -> Result<Summary, AgentError> {
        let messages = vec![
            ChatMessage::system(prompts::summary_system_prompt()),
            ChatMessage::user(prompts::summary_user_prompt(facts, label, verdict)),
        ];
        let response = self.provider.complete(messages, &self.completion).await?;
        let payload = extract_json(&response.content)?;
        parse_summary(&payload, label).map_err(|e| AgentError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        verdict: &Verdict,
    ) -> Result<Summary, AgentError> {
        match self.ask(facts, label, verdict).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Model summary failed, using rule summary");
                Ok(self.fallback.summarize(facts, label, verdict))
            }
        }
    }

    fn name(&self) -> &str {
        "llm-summarizer"
    }
}
