//! Core types for audit analysis.
//!
//! These types cross the boundary between the core, the runtime and the
//! outer layers (CLI/UI), so every one of them is serde-serializable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mapping from fact name to fact value.
///
/// BTreeMap (not HashMap) so serialized results are byte-stable.
pub type FactMap = BTreeMap<String, serde_json::Value>;

lazy_static! {
    static ref TRACKING_NUMBER: Regex = Regex::new(r"^[A-Za-z0-9]{6,40}$").unwrap();
    static ref PARTY_ID: Regex = Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").unwrap();
}

/// Errors for malformed audit requests.
///
/// These are input errors: surfaced before any fetch, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is malformed: '{value}'")]
    Malformed { field: &'static str, value: String },

    #[error("max_enrichment_iterations must be a positive integer")]
    ZeroIterationBound,
}

/// Identifies one tracking record at the data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Carrier tracking number (e.g. "1Z999AA10123456784")
    pub tracking_number: String,

    /// Client the shipment was billed to
    pub client_id: String,

    /// Carrier identifier (e.g. "UPS" or a numeric id)
    pub carrier_id: String,
}

impl RecordKey {
    /// Build a validated record key. Surrounding whitespace is trimmed.
    pub fn new(
        tracking_number: impl Into<String>,
        client_id: impl Into<String>,
        carrier_id: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let key = Self {
            tracking_number: tracking_number.into().trim().to_string(),
            client_id: client_id.into().trim().to_string(),
            carrier_id: carrier_id.into().trim().to_string(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Check every part of the key.
    ///
    /// Keys can be deserialized or built by hand, so the orchestrator calls
    /// this again before the first fetch.
    pub fn validate(&self) -> Result<(), RequestError> {
        check_part("tracking_number", &self.tracking_number, &TRACKING_NUMBER)?;
        check_part("client_id", &self.client_id, &PARTY_ID)?;
        check_part("carrier_id", &self.carrier_id, &PARTY_ID)
    }
}

fn check_part(field: &'static str, value: &str, pattern: &Regex) -> Result<(), RequestError> {
    if value.trim().is_empty() {
        return Err(RequestError::Empty { field });
    }
    if !pattern.is_match(value) {
        return Err(RequestError::Malformed {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tracking_number, self.client_id, self.carrier_id
        )
    }
}

/// Immutable input to one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequest {
    /// The record under audit
    pub key: RecordKey,

    /// Per-request override of the enrichment iteration bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_enrichment_iterations: Option<u32>,
}

impl AuditRequest {
    /// Create a request that uses the configured iteration bound.
    pub fn new(
        tracking_number: impl Into<String>,
        client_id: impl Into<String>,
        carrier_id: impl Into<String>,
    ) -> Result<Self, RequestError> {
        Ok(Self {
            key: RecordKey::new(tracking_number, client_id, carrier_id)?,
            max_enrichment_iterations: None,
        })
    }

    /// Override the enrichment iteration bound for this request only.
    pub fn with_max_enrichment_iterations(mut self, max: u32) -> Result<Self, RequestError> {
        if max == 0 {
            return Err(RequestError::ZeroIterationBound);
        }
        self.max_enrichment_iterations = Some(max);
        Ok(self)
    }

    /// Validate the key and the optional bound.
    pub fn validate(&self) -> Result<(), RequestError> {
        self.key.validate()?;
        if self.max_enrichment_iterations == Some(0) {
            return Err(RequestError::ZeroIterationBound);
        }
        Ok(())
    }
}

/// Error for a string that names no audit type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown audit type label: '{0}'")]
pub struct UnknownLabel(pub String);

/// Audit type, from a closed set. There is no `Unknown` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditTypeLabel {
    BillWeight,
    DimWeight,
    ServiceType,
    ZoneMismatch,
    Surcharge,
    Accessorial,
    DuplicateCharge,
    RateDiscount,
    FuelSurcharge,
    ResidentialSurcharge,
}

impl AuditTypeLabel {
    /// Every label, in declaration order.
    pub const ALL: [AuditTypeLabel; 10] = [
        AuditTypeLabel::BillWeight,
        AuditTypeLabel::DimWeight,
        AuditTypeLabel::ServiceType,
        AuditTypeLabel::ZoneMismatch,
        AuditTypeLabel::Surcharge,
        AuditTypeLabel::Accessorial,
        AuditTypeLabel::DuplicateCharge,
        AuditTypeLabel::RateDiscount,
        AuditTypeLabel::FuelSurcharge,
        AuditTypeLabel::ResidentialSurcharge,
    ];

    /// Wire name (e.g. `BILL_WEIGHT`).
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditTypeLabel::BillWeight => "BILL_WEIGHT",
            AuditTypeLabel::DimWeight => "DIM_WEIGHT",
            AuditTypeLabel::ServiceType => "SERVICE_TYPE",
            AuditTypeLabel::ZoneMismatch => "ZONE_MISMATCH",
            AuditTypeLabel::Surcharge => "SURCHARGE",
            AuditTypeLabel::Accessorial => "ACCESSORIAL",
            AuditTypeLabel::DuplicateCharge => "DUPLICATE_CHARGE",
            AuditTypeLabel::RateDiscount => "RATE_DISCOUNT",
            AuditTypeLabel::FuelSurcharge => "FUEL_SURCHARGE",
            AuditTypeLabel::ResidentialSurcharge => "RESIDENTIAL_SURCHARGE",
        }
    }

    /// Human-readable name.
    pub fn description(&self) -> &'static str {
        match self {
            AuditTypeLabel::BillWeight => "Bill weight audit",
            AuditTypeLabel::DimWeight => "Dimensional weight audit",
            AuditTypeLabel::ServiceType => "Service type audit",
            AuditTypeLabel::ZoneMismatch => "Zone mismatch audit",
            AuditTypeLabel::Surcharge => "Surcharge audit",
            AuditTypeLabel::Accessorial => "Accessorial charge audit",
            AuditTypeLabel::DuplicateCharge => "Duplicate charge audit",
            AuditTypeLabel::RateDiscount => "Rate discount audit",
            AuditTypeLabel::FuelSurcharge => "Fuel surcharge audit",
            AuditTypeLabel::ResidentialSurcharge => "Residential surcharge audit",
        }
    }
}

impl fmt::Display for AuditTypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditTypeLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// Errors for verdicts that break the reasoning contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerdictError {
    #[error("insufficient verdict must name at least one missing field")]
    NoMissingFields,

    #[error("sufficient verdict must carry a non-empty explanation")]
    EmptyExplanation,
}

/// Outcome of one Reasoning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// Enough evidence; carries the causal explanation.
    Sufficient {
        explanation: String,

        /// Short case name for the finding
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case: Option<String>,
    },

    /// Not enough evidence; names the facts that would settle it.
    Insufficient { missing_fields: BTreeSet<String> },
}

impl Verdict {
    /// Sufficient verdict without a case name.
    pub fn sufficient(explanation: impl Into<String>) -> Self {
        Verdict::Sufficient {
            explanation: explanation.into(),
            case: None,
        }
    }

    /// Insufficient verdict. Blank names are dropped; an empty set is refused.
    pub fn insufficient<I, S>(fields: I) -> Result<Self, VerdictError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let missing_fields: BTreeSet<String> = fields
            .into_iter()
            .map(|f| f.into().trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        if missing_fields.is_empty() {
            return Err(VerdictError::NoMissingFields);
        }
        Ok(Verdict::Insufficient { missing_fields })
    }

    /// Attach a case name. No-op on an insufficient verdict.
    pub fn with_case(self, name: impl Into<String>) -> Self {
        match self {
            Verdict::Sufficient { explanation, .. } => Verdict::Sufficient {
                explanation,
                case: Some(name.into()),
            },
            other => other,
        }
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, Verdict::Sufficient { .. })
    }

    /// Missing fields, for an insufficient verdict.
    pub fn missing_fields(&self) -> Option<&BTreeSet<String>> {
        match self {
            Verdict::Insufficient { missing_fields } => Some(missing_fields),
            Verdict::Sufficient { .. } => None,
        }
    }

    /// Explanation, for a sufficient verdict.
    pub fn explanation(&self) -> Option<&str> {
        match self {
            Verdict::Sufficient { explanation, .. } => Some(explanation),
            Verdict::Insufficient { .. } => None,
        }
    }

    /// Check the structural invariants of the variant.
    pub fn validate(&self) -> Result<(), VerdictError> {
        match self {
            Verdict::Sufficient { explanation, .. } if explanation.trim().is_empty() => {
                Err(VerdictError::EmptyExplanation)
            }
            Verdict::Insufficient { missing_fields } if missing_fields.is_empty() => {
                Err(VerdictError::NoMissingFields)
            }
            _ => Ok(()),
        }
    }
}

/// One Insufficient verdict, as seen by later reasoning calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningAttempt {
    /// Enrichment iteration the verdict was produced at (0 = before any enrichment)
    pub iteration: u32,

    /// Fields the verdict asked for
    pub missing_fields: BTreeSet<String>,
}

/// Human-readable result of the Summary step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub audit_type: AuditTypeLabel,

    /// Ordered explanation bullets
    pub bullets: Vec<String>,

    /// Suggested follow-up, when the facts support one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    BoundExceeded,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::BoundExceeded => "bound_exceeded",
        }
    }
}

/// Status-specific part of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        summary: Summary,
        explanation: String,
    },

    /// Reasoning never became sufficient within the iteration bound.
    /// Carries what a human needs to take over.
    BoundExceeded {
        missing_fields: BTreeSet<String>,
        attempts: Vec<ReasoningAttempt>,
    },
}

/// Terminal output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub key: RecordKey,

    #[serde(flatten)]
    pub outcome: Outcome,

    pub audit_type: Option<AuditTypeLabel>,

    /// Every fact gathered, initial and enriched
    pub facts: FactMap,

    /// Enrichment cycles traversed
    pub iterations_used: u32,

    /// Reasoning invocations made
    pub reasoning_calls: u32,

    /// Enrichment cycles that added or changed nothing
    pub no_progress_iterations: u32,

    pub finished_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn status(&self) -> AnalysisStatus {
        match self.outcome {
            Outcome::Completed { .. } => AnalysisStatus::Completed,
            Outcome::BoundExceeded { .. } => AnalysisStatus::BoundExceeded,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status() == AnalysisStatus::Completed
    }

    pub fn summary(&self) -> Option<&Summary> {
        match &self.outcome {
            Outcome::Completed { summary, .. } => Some(summary),
            Outcome::BoundExceeded { .. } => None,
        }
    }

    /// Last missing-fields list, for a bound-exceeded run.
    pub fn missing_fields(&self) -> Option<&BTreeSet<String>> {
        match &self.outcome {
            Outcome::BoundExceeded { missing_fields, .. } => Some(missing_fields),
            Outcome::Completed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_trims_and_validates() {
        let key = RecordKey::new(" 1Z999AA10123456784 ", "CLIENT001", "UPS").unwrap();
        assert_eq!(key.tracking_number, "1Z999AA10123456784");
        assert_eq!(key.to_string(), "1Z999AA10123456784/CLIENT001/UPS");
    }

    #[test]
    fn test_record_key_rejects_malformed_parts() {
        assert_eq!(
            RecordKey::new("", "CLIENT001", "UPS"),
            Err(RequestError::Empty {
                field: "tracking_number"
            })
        );
        assert!(matches!(
            RecordKey::new("1Z 999", "CLIENT001", "UPS"),
            Err(RequestError::Malformed {
                field: "tracking_number",
                ..
            })
        ));
        assert!(matches!(
            RecordKey::new("1Z999AA10123456784", "CLIENT 001", "UPS"),
            Err(RequestError::Malformed {
                field: "client_id",
                ..
            })
        ));
    }

    #[test]
    fn test_request_rejects_zero_bound() {
        let request = AuditRequest::new("1Z999AA10123456784", "CLIENT001", "1").unwrap();
        assert_eq!(
            request.clone().with_max_enrichment_iterations(0),
            Err(RequestError::ZeroIterationBound)
        );

        let mut forged = request;
        forged.max_enrichment_iterations = Some(0);
        assert_eq!(forged.validate(), Err(RequestError::ZeroIterationBound));
    }

    #[test]
    fn test_label_round_trips_through_wire_name() {
        for label in AuditTypeLabel::ALL {
            assert_eq!(label.as_str().parse::<AuditTypeLabel>(), Ok(label));
            let json = serde_json::to_value(label).unwrap();
            assert_eq!(json, serde_json::json!(label.as_str()));
        }
        assert!("UNKNOWN".parse::<AuditTypeLabel>().is_err());
    }

    #[test]
    fn test_insufficient_refuses_empty_set() {
        assert_eq!(
            Verdict::insufficient(Vec::<String>::new()),
            Err(VerdictError::NoMissingFields)
        );
        assert_eq!(
            Verdict::insufficient(["  ", ""]),
            Err(VerdictError::NoMissingFields)
        );

        let forged = Verdict::Insufficient {
            missing_fields: BTreeSet::new(),
        };
        assert_eq!(forged.validate(), Err(VerdictError::NoMissingFields));
    }

    #[test]
    fn test_verdict_wire_format() {
        let verdict = Verdict::insufficient(["zone_code"]).unwrap();
        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            serde_json::json!({"status": "insufficient", "missing_fields": ["zone_code"]})
        );

        let verdict = Verdict::sufficient("Billed 2 lbs over actual").with_case("Overbilled");
        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            serde_json::json!({
                "status": "sufficient",
                "explanation": "Billed 2 lbs over actual",
                "case": "Overbilled"
            })
        );
    }

    #[test]
    fn test_analysis_result_shape() {
        let result = AnalysisResult {
            key: RecordKey::new("1Z999AA10123456784", "CLIENT001", "UPS").unwrap(),
            outcome: Outcome::BoundExceeded {
                missing_fields: BTreeSet::from(["carrier_agreement".to_string()]),
                attempts: vec![],
            },
            audit_type: Some(AuditTypeLabel::RateDiscount),
            facts: FactMap::new(),
            iterations_used: 3,
            reasoning_calls: 4,
            no_progress_iterations: 3,
            finished_at: Utc::now(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "bound_exceeded");
        assert_eq!(json["audit_type"], "RATE_DISCOUNT");
        assert_eq!(json["iterations_used"], 3);
        assert_eq!(json["missing_fields"], serde_json::json!(["carrier_agreement"]));

        let back: AnalysisResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.status(), AnalysisStatus::BoundExceeded);
        assert!(back.summary().is_none());
    }
}
