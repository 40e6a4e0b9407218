//! # rate-audit-runtime
//!
//! Async orchestration for shipping-rate audit analysis.
//!
//! `rate-audit-core` holds the deterministic parts: the state, the verdict
//! contract and the rule catalog. This crate drives them against a data
//! source with timeouts, retries, cancellation and bounded enrichment.
//!
//! ## Flow
//!
//! ```text
//! FETCH_INITIAL → CLASSIFY → REASON ─┬─ sufficient ──────────→ SUMMARIZE → DONE
//!                               ↑    ├─ insufficient, i < max → ENRICH ─┐
//!                               │    └─ insufficient, i = max → BOUND_EXCEEDED
//!                               └───────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rate_audit_runtime::{run_audit_analysis, AuditOrchestrator, InMemoryGateway};
//!
//! let orchestrator = AuditOrchestrator::builder()
//!     .gateway(Arc::new(InMemoryGateway::demo()))
//!     .build()?;
//!
//! let result = run_audit_analysis(
//!     &orchestrator,
//!     "1Z999AA10123456784",
//!     "CLIENT001",
//!     "UPS",
//!     None,
//! )
//! .await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod telemetry;

pub use agents::{
    extract_json, AgentError, Classifier, LlmReasoner, LlmSummarizer, Reasoner, Summarizer,
};
pub use config::{CacheConfig, ConfigError, RuntimeConfig};
pub use error::{CallError, RunError, Step};
pub use gateway::{
    ApiCredential, CachedGateway, CredentialError, CredentialSource, DataGateway, GatewayError,
    InMemoryGateway, DEMO_TRACKING_NUMBER, STANDARD_INITIAL_FIELDS,
};
#[cfg(feature = "http")]
pub use gateway::HttpGateway;
pub use orchestrator::{AuditOrchestrator, AuditOrchestratorBuilder, ProgressEvent, ProgressSender};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, Role,
    TokenUsage,
};
pub use resilience::{call_with_retry, RetryPolicy};
pub use telemetry::{init_tracing, init_tracing_with};

pub use rate_audit_core::{AnalysisResult, AnalysisStatus, AuditRequest, AuditTypeLabel, Outcome};

/// Run one audit analysis for a tracking record.
///
/// `max_enrichment_iterations` overrides the orchestrator's configured
/// bound for this call only.
#[tracing::instrument(skip(orchestrator))]
pub async fn run_audit_analysis(
    orchestrator: &AuditOrchestrator,
    tracking_number: &str,
    client_id: &str,
    carrier_id: &str,
    max_enrichment_iterations: Option<u32>,
) -> Result<AnalysisResult, RunError> {
    let mut request = AuditRequest::new(tracking_number, client_id, carrier_id)?;
    if let Some(max) = max_enrichment_iterations {
        request = request.with_max_enrichment_iterations(max)?;
    }
    orchestrator.run(request).await
}
