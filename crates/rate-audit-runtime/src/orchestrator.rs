//! Audit orchestrator: the analysis state machine.
//!
//! The orchestrator owns the control loop:
//! - `FetchInitial → Classify → Reason`, then
//! - `Reason → Summarize → Done` on a Sufficient verdict, or
//! - `Reason → Enrich → Reason` on an Insufficient one while the iteration
//!   counter is below the bound, and `Reason → BoundExceeded` once it is not
//!
//! Each run owns exactly one [`AuditState`]. Steps receive shared borrows of
//! it and hand their outputs back; the loop commits them. Every collaborator
//! call carries a timeout, transient failures are retried, and cancellation
//! is observed before every transition and while every call is in flight.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rate_audit_core::{
    AnalysisResult, AuditRequest, AuditState, AuditTypeLabel, FactMap, FactSet, Phase,
    ReasoningAttempt, RecordKey, RuleClassifier, RuleReasoner, RuleSummarizer, StateError,
    Summary, Verdict,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::{Classifier, Reasoner, Summarizer};
use crate::config::{ConfigError, RuntimeConfig};
use crate::error::{CallError, RunError, Step};
use crate::gateway::{DataGateway, GatewayError};
use crate::resilience::call_with_retry;

/// Channel end that receives progress events.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// One event per completed phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    FetchedInitial {
        facts: usize,
    },
    Classified {
        audit_type: AuditTypeLabel,
    },
    Reasoned {
        iteration: u32,
        verdict: Verdict,
    },
    Enriched {
        iteration: u32,
        added: Vec<String>,
        updated: Vec<String>,
    },
    Summarized {
        bullets: usize,
    },
    BoundExceeded {
        iterations_used: u32,
        missing_fields: BTreeSet<String>,
    },
}

/// Runs audit analyses.
///
/// Cheap to clone; clones share the gateway and agents, never run state.
#[derive(Clone)]
pub struct AuditOrchestrator {
    gateway: Arc<dyn DataGateway>,
    classifier: Arc<dyn Classifier>,
    reasoner: Arc<dyn Reasoner>,
    summarizer: Arc<dyn Summarizer>,
    config: RuntimeConfig,
}

impl std::fmt::Debug for AuditOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditOrchestrator")
            .field("gateway", &self.gateway.name())
            .field("classifier", &self.classifier.name())
            .field("reasoner", &self.reasoner.name())
            .field("summarizer", &self.summarizer.name())
            .field("config", &self.config)
            .finish()
    }
}

impl AuditOrchestrator {
    pub fn builder() -> AuditOrchestratorBuilder {
        AuditOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run one analysis to a terminal state.
    pub async fn run(&self, request: AuditRequest) -> Result<AnalysisResult, RunError> {
        self.run_with(request, &CancellationToken::new(), None).await
    }

    /// Run one analysis with cancellation and optional progress reporting.
    ///
    /// A cancelled run returns [`RunError::Cancelled`] and discards its
    /// state; the output of an interrupted call is never merged.
    #[tracing::instrument(
        name = "audit_run",
        skip_all,
        fields(
            tracking_number = %request.key.tracking_number,
            client_id = %request.key.client_id,
            carrier_id = %request.key.carrier_id,
        )
    )]
    pub async fn run_with(
        &self,
        request: AuditRequest,
        cancel: &CancellationToken,
        progress: Option<ProgressSender>,
    ) -> Result<AnalysisResult, RunError> {
        request.validate()?;
        let max_iterations = request
            .max_enrichment_iterations
            .unwrap_or(self.config.max_enrichment_iterations);

        let mut state = AuditState::new(request);
        let mut phase = Phase::FetchInitial;
        info!(max_iterations, "Starting audit analysis");

        while !phase.is_terminal() {
            if cancel.is_cancelled() {
                info!(phase = %phase, "Run cancelled");
                return Err(RunError::Cancelled { phase });
            }
            debug!(phase = %phase, iteration = state.iteration(), "Entering phase");

            phase = match phase {
                Phase::FetchInitial => {
                    let fields = &self.config.initial_fields;
                    let facts = guarded(
                        phase,
                        cancel,
                        self.fetch(Step::FetchInitial, state.key(), fields),
                    )
                    .await?;

                    let report = state.merge_facts(facts);
                    info!(facts = report.added.len(), "Fetched initial facts");
                    emit(&progress, ProgressEvent::FetchedInitial {
                        facts: state.facts().len(),
                    });
                    Phase::Classify
                }

                Phase::Classify => {
                    let label = guarded(phase, cancel, self.classify(state.facts())).await?;
                    state.set_audit_type(label)?;

                    info!(audit_type = %label, "Classified");
                    emit(&progress, ProgressEvent::Classified { audit_type: label });
                    Phase::Reason
                }

                Phase::Reason => {
                    let label = state.require_audit_type()?;
                    let verdict = guarded(
                        phase,
                        cancel,
                        self.reason(state.facts(), label, state.attempts()),
                    )
                    .await?;

                    state.record_verdict(verdict).map_err(|e| match e {
                        StateError::Verdict(violation) => RunError::ContractViolation {
                            step: Step::Reason,
                            reason: violation.to_string(),
                        },
                        other => RunError::State(other),
                    })?;

                    let already_known = state.already_known();
                    if !already_known.is_empty() {
                        warn!(
                            fields = ?already_known,
                            "Reasoner asked for facts that are already known"
                        );
                    }

                    let next = state.route_after_reasoning(max_iterations)?;
                    info!(
                        iteration = state.iteration(),
                        reasoning_calls = state.reasoning_calls(),
                        sufficient = next == Phase::Summarize,
                        "Reasoned"
                    );
                    if let Some(verdict) = state.verdict() {
                        emit(&progress, ProgressEvent::Reasoned {
                            iteration: state.iteration(),
                            verdict: verdict.clone(),
                        });
                    }

                    if next == Phase::BoundExceeded {
                        warn!(
                            iterations_used = state.iteration(),
                            missing_fields = ?state.missing_fields(),
                            "Iteration bound reached without a sufficient verdict"
                        );
                        emit(&progress, ProgressEvent::BoundExceeded {
                            iterations_used: state.iteration(),
                            missing_fields: state.missing_fields().clone(),
                        });
                    }
                    next
                }

                Phase::Enrich => {
                    let wanted = state.missing_fields().clone();
                    let incoming = guarded(phase, cancel, self.enrich(state.key(), &wanted)).await?;

                    let report = state.merge_facts(incoming);
                    state.complete_enrichment(&report);

                    if !report.made_progress() {
                        warn!(
                            iteration = state.iteration(),
                            requested = ?wanted,
                            "Enrichment made no progress"
                        );
                    }
                    info!(
                        iteration = state.iteration(),
                        added = report.added.len(),
                        updated = report.updated.len(),
                        "Enriched"
                    );
                    emit(&progress, ProgressEvent::Enriched {
                        iteration: state.iteration(),
                        added: report.added,
                        updated: report.updated,
                    });
                    Phase::Reason
                }

                Phase::Summarize => {
                    let label = state.require_audit_type()?;
                    let verdict = state.verdict().cloned().ok_or(StateError::NoVerdict)?;
                    let summary = guarded(
                        phase,
                        cancel,
                        self.summarize(state.facts(), label, &verdict),
                    )
                    .await?;

                    check_summary(&summary, label)?;
                    let bullets = summary.bullets.len();
                    state.set_summary(summary)?;

                    info!(bullets, "Summarized");
                    emit(&progress, ProgressEvent::Summarized { bullets });
                    Phase::Done
                }

                Phase::Done | Phase::BoundExceeded => phase,
            };
        }

        let result = state.into_result()?;
        info!(
            status = result.status().as_str(),
            iterations_used = result.iterations_used,
            reasoning_calls = result.reasoning_calls,
            "Audit analysis finished"
        );
        Ok(result)
    }

    /// Run independent analyses concurrently.
    ///
    /// Each request gets its own state. Results come back in input order.
    pub async fn run_batch(
        &self,
        requests: Vec<AuditRequest>,
        concurrency: usize,
    ) -> Vec<Result<AnalysisResult, RunError>> {
        stream::iter(requests)
            .map(|request| self.run(request))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn fetch(
        &self,
        step: Step,
        key: &RecordKey,
        fields: &BTreeSet<String>,
    ) -> Result<FactMap, RunError> {
        let gateway = &self.gateway;
        call_with_retry(step, &self.config.retry, self.config.call_timeout, || async move {
            gateway.fetch(key, fields).await.map_err(CallError::from)
        })
        .await
    }

    /// Fetch exactly the missing fields. A `NotFound` here means the data
    /// is not available, which is an empty response rather than a failure.
    async fn enrich(&self, key: &RecordKey, fields: &BTreeSet<String>) -> Result<FactMap, RunError> {
        match self.fetch(Step::Enrich, key, fields).await {
            Err(RunError::Permanent {
                source: CallError::Gateway(GatewayError::NotFound(reason)),
                ..
            }) => {
                info!(reason = %reason, "Requested fields are not available");
                Ok(FactMap::new())
            }
            other => other,
        }
    }

    async fn classify(&self, facts: &FactSet) -> Result<AuditTypeLabel, RunError> {
        let classifier = &self.classifier;
        call_with_retry(Step::Classify, &self.config.retry, self.config.call_timeout, || async move {
            classifier.classify(facts).await.map_err(CallError::from)
        })
        .await
    }

    async fn reason(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        prior: &[ReasoningAttempt],
    ) -> Result<Verdict, RunError> {
        let reasoner = &self.reasoner;
        call_with_retry(Step::Reason, &self.config.retry, self.config.call_timeout, || async move {
            reasoner.reason(facts, label, prior).await.map_err(CallError::from)
        })
        .await
    }

    async fn summarize(
        &self,
        facts: &FactSet,
        label: AuditTypeLabel,
        verdict: &Verdict,
    ) -> Result<Summary, RunError> {
        let summarizer = &self.summarizer;
        call_with_retry(Step::Summarize, &self.config.retry, self.config.call_timeout, || async move {
            summarizer
                .summarize(facts, label, verdict)
                .await
                .map_err(CallError::from)
        })
        .await
    }
}

/// Race a step against cancellation.
async fn guarded<T, F>(phase: Phase, cancel: &CancellationToken, call: F) -> Result<T, RunError>
where
    F: Future<Output = Result<T, RunError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled { phase }),
        result = call => result,
    }
}

fn check_summary(summary: &Summary, label: AuditTypeLabel) -> Result<(), RunError> {
    let reason = if summary.audit_type != label {
        format!(
            "summary is labelled {} but the run is {}",
            summary.audit_type, label
        )
    } else if summary.bullets.is_empty() {
        "summary has no bullets".to_string()
    } else {
        return Ok(());
    };
    Err(RunError::ContractViolation {
        step: Step::Summarize,
        reason,
    })
}

fn emit(progress: &Option<ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = progress {
        if tx.send(event).is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

/// Builder for AuditOrchestrator.
pub struct AuditOrchestratorBuilder {
    gateway: Option<Arc<dyn DataGateway>>,
    classifier: Option<Arc<dyn Classifier>>,
    reasoner: Option<Arc<dyn Reasoner>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: RuntimeConfig,
}

impl AuditOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            gateway: None,
            classifier: None,
            reasoner: None,
            summarizer: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Set the data gateway (required).
    pub fn gateway(mut self, gateway: Arc<dyn DataGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator. Agents not set default to the rule-backed ones.
    pub fn build(self) -> Result<AuditOrchestrator, RunError> {
        let gateway = self.gateway.ok_or(ConfigError::MissingGateway)?;
        self.config.validate()?;

        let classifier: Arc<dyn Classifier> = match self.classifier {
            Some(classifier) => classifier,
            None => Arc::new(RuleClassifier::new()),
        };
        let reasoner: Arc<dyn Reasoner> = match self.reasoner {
            Some(reasoner) => reasoner,
            None => Arc::new(RuleReasoner::new()),
        };
        let summarizer: Arc<dyn Summarizer> = match self.summarizer {
            Some(summarizer) => summarizer,
            None => Arc::new(RuleSummarizer::new()),
        };

        Ok(AuditOrchestrator {
            gateway,
            classifier,
            reasoner,
            summarizer,
            config: self.config,
        })
    }
}

impl Default for AuditOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
