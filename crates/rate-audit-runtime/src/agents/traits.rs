//! Capability contracts for the classification, reasoning and summary steps.

use async_trait::async_trait;
use rate_audit_core::{
    AuditTypeLabel, ClassificationError, FactSet, ReasoningAttempt, Summary, Verdict,
};
use thiserror::Error;

use crate::providers::ProviderError;

/// Errors from agents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("classification failed: {0}")]
    ClassificationFailed(#[from] ClassificationError),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("invalid provider output: {0}")]
    InvalidOutput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Only `Unavailable` is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Unavailable(_))
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        if err.is_transient() {
            return AgentError::Unavailable(err.to_string());
        }
        match err {
            ProviderError::Unauthenticated => AgentError::Unauthorized(err.to_string()),
            ProviderError::MalformedReply(_) => AgentError::InvalidOutput(err.to_string()),
            _ => AgentError::Internal(err.to_string()),
        }
    }
}

/// Produces exactly one audit type label for a fact set.
///
/// # Contract
/// - MUST return a label from the closed set or fail; there is no "unknown"
/// - MUST return the same label for the same facts
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, facts: &FactSet) -> Result<AuditTypeLabel, AgentError>;

    /// Agent name for logs.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Decides whether the known facts explain the audit.
///
/// # Contract
/// - evaluates the full fact set on every call, not only new facts
/// - an Insufficient verdict names at least one field, and should name only
///   fields that are not already in `facts`
/// - `prior` lists every earlier Insufficient verdict of the run, oldest first
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        prior: &[ReasoningAttempt],
    ) -> Result<Verdict, AgentError>;

    fn name(&self) -> &str {
        "reasoner"
    }
}

/// Turns a sufficient verdict and the facts into a human-readable summary.
///
/// Pure function of its inputs.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        verdict: &Verdict,
    ) -> Result<Summary, AgentError>;

    fn name(&self) -> &str {
        "summarizer"
    }
}
