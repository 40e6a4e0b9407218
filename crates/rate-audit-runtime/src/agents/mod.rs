//! Agents for the classification, reasoning and summary steps.
//!
//! Each step is a capability contract. Rule-backed implementations come
//! from `rate-audit-core`; model-backed ones go through an `LlmProvider`.

mod llm;
mod rules;
mod traits;

pub use llm::{extract_json, LlmReasoner, LlmSummarizer};
pub use traits::{AgentError, Classifier, Reasoner, Summarizer};
