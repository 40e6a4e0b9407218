//! Per-run audit state and the state-machine phases.
//!
//! `AuditState` is the single accumulator threaded through a run. It is
//! owned by exactly one orchestrator invocation; steps only ever see it
//! through shared borrows and hand their outputs back for the owner to
//! commit. The routing decision after reasoning lives here as a pure
//! function so the termination bound is testable without any I/O.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::facts::{FactSet, MergeReport};
use crate::types::{
    AnalysisResult, AuditRequest, AuditTypeLabel, FactMap, Outcome, ReasoningAttempt, RecordKey,
    Summary, Verdict, VerdictError,
};

static NO_MISSING_FIELDS: BTreeSet<String> = BTreeSet::new();

/// States of the analysis state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    FetchInitial,
    Classify,
    Reason,
    Enrich,
    Summarize,
    Done,
    BoundExceeded,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::BoundExceeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::FetchInitial => "fetch_initial",
            Phase::Classify => "classify",
            Phase::Reason => "reason",
            Phase::Enrich => "enrich",
            Phase::Summarize => "summarize",
            Phase::Done => "done",
            Phase::BoundExceeded => "bound_exceeded",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Illegal state mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("audit type already set to {current}; refusing to change it to {attempted}")]
    LabelAlreadySet {
        current: AuditTypeLabel,
        attempted: AuditTypeLabel,
    },

    #[error("no audit type has been set")]
    NoAuditType,

    #[error("no verdict has been recorded")]
    NoVerdict,

    #[error("a summary requires a sufficient verdict")]
    NotSufficient,

    #[error("run has not reached a terminal state")]
    NotTerminal,

    #[error(transparent)]
    Verdict(#[from] VerdictError),
}

/// Mutable accumulator for one analysis run.
#[derive(Debug, Clone)]
pub struct AuditState {
    request: AuditRequest,
    facts: FactSet,
    audit_type: Option<AuditTypeLabel>,
    verdict: Option<Verdict>,
    attempts: Vec<ReasoningAttempt>,
    iteration: u32,
    reasoning_calls: u32,
    no_progress_iterations: u32,
    summary: Option<Summary>,
}

impl AuditState {
    /// Fresh state: no facts, iteration 0.
    pub fn new(request: AuditRequest) -> Self {
        Self {
            request,
            facts: FactSet::new(),
            audit_type: None,
            verdict: None,
            attempts: Vec::new(),
            iteration: 0,
            reasoning_calls: 0,
            no_progress_iterations: 0,
            summary: None,
        }
    }

    pub fn request(&self) -> &AuditRequest {
        &self.request
    }

    pub fn key(&self) -> &RecordKey {
        &self.request.key
    }

    pub fn facts(&self) -> &FactSet {
        &self.facts
    }

    pub fn audit_type(&self) -> Option<AuditTypeLabel> {
        self.audit_type
    }

    /// The committed label; reasoning and summary steps need it.
    pub fn require_audit_type(&self) -> Result<AuditTypeLabel, StateError> {
        self.audit_type.ok_or(StateError::NoAuditType)
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    /// Every Insufficient verdict so far, oldest first.
    pub fn attempts(&self) -> &[ReasoningAttempt] {
        &self.attempts
    }

    /// Completed enrichment cycles.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn reasoning_calls(&self) -> u32 {
        self.reasoning_calls
    }

    pub fn no_progress_iterations(&self) -> u32 {
        self.no_progress_iterations
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Current missing-fields list; empty unless the verdict is Insufficient.
    pub fn missing_fields(&self) -> &BTreeSet<String> {
        self.verdict
            .as_ref()
            .and_then(Verdict::missing_fields)
            .unwrap_or(&NO_MISSING_FIELDS)
    }

    /// Missing fields the reasoner asked for that are in fact already known.
    pub fn already_known(&self) -> BTreeSet<String> {
        self.facts
            .present(self.missing_fields().iter().map(String::as_str))
    }

    pub fn merge_facts(&mut self, incoming: FactMap) -> MergeReport {
        self.facts.merge(incoming)
    }

    /// Commit the classification. The label is set once per run.
    pub fn set_audit_type(&mut self, label: AuditTypeLabel) -> Result<(), StateError> {
        match self.audit_type {
            Some(current) if current != label => Err(StateError::LabelAlreadySet {
                current,
                attempted: label,
            }),
            _ => {
                self.audit_type = Some(label);
                Ok(())
            }
        }
    }

    /// Commit a reasoning verdict. Invalid verdicts are refused and leave
    /// the state untouched.
    pub fn record_verdict(&mut self, verdict: Verdict) -> Result<(), StateError> {
        verdict.validate()?;

        self.reasoning_calls += 1;
        if let Verdict::Insufficient { missing_fields } = &verdict {
            self.attempts.push(ReasoningAttempt {
                iteration: self.iteration,
                missing_fields: missing_fields.clone(),
            });
        }
        self.verdict = Some(verdict);
        Ok(())
    }

    /// Where to go after a verdict has been recorded.
    ///
    /// Sufficient goes to Summarize. Insufficient goes to Enrich while the
    /// iteration counter is below `max_iterations`, and to BoundExceeded
    /// once it is not.
    pub fn route_after_reasoning(&self, max_iterations: u32) -> Result<Phase, StateError> {
        match &self.verdict {
            None => Err(StateError::NoVerdict),
            Some(Verdict::Sufficient { .. }) => Ok(Phase::Summarize),
            Some(Verdict::Insufficient { .. }) if self.iteration < max_iterations => {
                Ok(Phase::Enrich)
            }
            Some(Verdict::Insufficient { .. }) => Ok(Phase::BoundExceeded),
        }
    }

    /// Close one Enrich traversal. The counter advances by exactly one
    /// whether or not the merge made progress.
    pub fn complete_enrichment(&mut self, report: &MergeReport) {
        self.iteration += 1;
        if !report.made_progress() {
            self.no_progress_iterations += 1;
        }
    }

    pub fn set_summary(&mut self, summary: Summary) -> Result<(), StateError> {
        match &self.verdict {
            Some(Verdict::Sufficient { .. }) => {
                self.summary = Some(summary);
                Ok(())
            }
            Some(Verdict::Insufficient { .. }) => Err(StateError::NotSufficient),
            None => Err(StateError::NoVerdict),
        }
    }

    /// Consume the state into the terminal result.
    pub fn into_result(self) -> Result<AnalysisResult, StateError> {
        let outcome = match (self.verdict, self.summary) {
            (Some(Verdict::Sufficient { explanation, .. }), Some(summary)) => Outcome::Completed {
                summary,
                explanation,
            },
            (Some(Verdict::Insufficient { missing_fields }), _) => Outcome::BoundExceeded {
                missing_fields,
                attempts: self.attempts,
            },
            (Some(Verdict::Sufficient { .. }), None) => return Err(StateError::NotTerminal),
            (None, _) => return Err(StateError::NoVerdict),
        };

        Ok(AnalysisResult {
            key: self.request.key,
            outcome,
            audit_type: self.audit_type,
            facts: self.facts.into_map(),
            iterations_used: self.iteration,
            reasoning_calls: self.reasoning_calls,
            no_progress_iterations: self.no_progress_iterations,
            finished_at: Utc::now(),
        })
    }
}
