//! Error taxonomy for a run.
//!
//! A call into a collaborator fails with a [`CallError`]. The retry layer
//! turns that into a [`RunError`], which is what a caller sees. Business
//! non-convergence is not an error: it is the `bound_exceeded` outcome.

use std::fmt;
use std::time::Duration;

use rate_audit_core::{Phase, RequestError, StateError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::AgentError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;

/// The step a collaborator call was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    FetchInitial,
    Classify,
    Reason,
    Enrich,
    Summarize,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::FetchInitial => "fetch_initial",
            Step::Classify => "classify",
            Step::Reason => "reason",
            Step::Enrich => "enrich",
            Step::Summarize => "summarize",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single collaborator call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl CallError {
    /// Unavailable collaborators and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Gateway(e) => e.is_transient(),
            CallError::Agent(e) => e.is_transient(),
            CallError::Timeout(_) => true,
        }
    }
}

/// Errors that end a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{step} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        step: Step,
        attempts: u32,
        source: CallError,
    },

    #[error("{step} failed: {source}")]
    Permanent { step: Step, source: CallError },

    #[error("{step} broke its contract: {reason}")]
    ContractViolation { step: Step, reason: String },

    #[error("run cancelled before {phase}")]
    Cancelled { phase: Phase },

    #[error("illegal state transition: {0}")]
    State(#[from] StateError),
}

impl RunError {
    /// Step the failure originated from, when it came from a collaborator.
    pub fn step(&self) -> Option<Step> {
        match self {
            RunError::RetriesExhausted { step, .. }
            | RunError::Permanent { step, .. }
            | RunError::ContractViolation { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The underlying call failure, if any.
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            RunError::RetriesExhausted { source, .. } | RunError::Permanent { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled { .. })
    }
}
