//! Rule-based audit type classification.
//!
//! An explicit `category` fact wins. Without one, the label is inferred from
//! the first carrier vs calculated pair that disagrees.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::catalog::{self, dim_weight, disagrees};
use crate::facts::FactSet;
use crate::types::AuditTypeLabel;

lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[^A-Z0-9]+").unwrap();
}

/// Fact carrying the audit category assigned upstream.
pub const CATEGORY_FACT: &str = "category";

/// Classification failures. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("category '{0}' does not name an audit type")]
    UnrecognisedCategory(String),

    #[error("facts carry no category and no discrepancy signal")]
    NoSignal,
}

/// Deterministic classifier over a fact set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, facts: &FactSet) -> Result<AuditTypeLabel, ClassificationError> {
        if let Some(category) = facts.text(CATEGORY_FACT) {
            let label = normalise_category(&category)
                .ok_or(ClassificationError::UnrecognisedCategory(category))?;
            debug!(label = %label, "classified from category");
            return Ok(label);
        }

        let label = infer_from_signals(facts).ok_or(ClassificationError::NoSignal)?;
        debug!(label = %label, "classified from discrepancy signals");
        Ok(label)
    }
}

/// Map a free-form category to a label.
///
/// Case and separators are ignored, a trailing `_AUDIT` is dropped, and the
/// category names used by audit feeds are accepted as aliases.
pub fn normalise_category(raw: &str) -> Option<AuditTypeLabel> {
    let upper = raw.trim().to_ascii_uppercase();
    let cleaned = SEPARATORS.replace_all(&upper, "_");
    let cleaned = cleaned.trim_matches('_');
    let cleaned = cleaned.strip_suffix("_AUDIT").unwrap_or(cleaned);

    if let Ok(label) = cleaned.parse() {
        return Some(label);
    }

    let label = match cleaned {
        "WEIGHT" | "BILLED_WEIGHT" => AuditTypeLabel::BillWeight,
        "DIM" | "DIMENSIONAL_WEIGHT" | "DIMENSIONS" => AuditTypeLabel::DimWeight,
        "SERVICE" | "SERVICE_LEVEL" => AuditTypeLabel::ServiceType,
        "ZONE" => AuditTypeLabel::ZoneMismatch,
        "SURCHARGES" | "SURCHARGE_APPLICABILITY" | "SURCHARGE_NULL" => AuditTypeLabel::Surcharge,
        "ACCESSORIALS" => AuditTypeLabel::Accessorial,
        "DUPLICATE" | "DUPLICATES" | "DUPLICATE_INVOICE" => AuditTypeLabel::DuplicateCharge,
        "DISCOUNTS_PERCENTAGE"
        | "BASE_DISCOUNT"
        | "EARNED_DISCOUNT"
        | "DISCOUNT"
        | "LIST_RATE"
        | "LIST_RATE_NULL"
        | "MWT_LIST_RATE"
        | "NET_TRANSPORTATION" => AuditTypeLabel::RateDiscount,
        "FUEL" => AuditTypeLabel::FuelSurcharge,
        "RESIDENTIAL" => AuditTypeLabel::ResidentialSurcharge,
        _ => return None,
    };
    Some(label)
}

/// Priority order for signal inference. Weight is handled separately
/// because it splits into bill weight and DIM weight.
const SIGNAL_ORDER: [AuditTypeLabel; 7] = [
    AuditTypeLabel::ZoneMismatch,
    AuditTypeLabel::ServiceType,
    AuditTypeLabel::RateDiscount,
    AuditTypeLabel::FuelSurcharge,
    AuditTypeLabel::ResidentialSurcharge,
    AuditTypeLabel::Accessorial,
    AuditTypeLabel::Surcharge,
];

fn infer_from_signals(facts: &FactSet) -> Option<AuditTypeLabel> {
    if facts
        .number("duplicate_invoice_count")
        .is_some_and(|n| n > 1.0)
    {
        return Some(AuditTypeLabel::DuplicateCharge);
    }

    if let Some(label) = weight_signal(facts) {
        return Some(label);
    }

    SIGNAL_ORDER.into_iter().find(|label| {
        catalog::profile(*label)
            .comparisons
            .iter()
            .any(|c| disagrees(facts, c))
    })
}

fn weight_signal(facts: &FactSet) -> Option<AuditTypeLabel> {
    let weight = catalog::profile(AuditTypeLabel::BillWeight);
    if !weight.comparisons.iter().any(|c| disagrees(facts, c)) {
        return None;
    }

    let actual = facts.number("actual_weight");
    match (dim_weight(facts), actual) {
        (Some(dim), Some(actual)) if dim > actual => Some(AuditTypeLabel::DimWeight),
        _ => Some(AuditTypeLabel::BillWeight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts(value: serde_json::Value) -> FactSet {
        FactSet::from_map(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_category_normalisation() {
        assert_eq!(normalise_category("BILL_WEIGHT"), Some(AuditTypeLabel::BillWeight));
        assert_eq!(normalise_category("zone mismatch"), Some(AuditTypeLabel::ZoneMismatch));
        assert_eq!(normalise_category("Dim-Weight Audit"), Some(AuditTypeLabel::DimWeight));
        assert_eq!(normalise_category("LIST_RATE"), Some(AuditTypeLabel::RateDiscount));
        assert_eq!(
            normalise_category("Surcharge Applicability"),
            Some(AuditTypeLabel::Surcharge)
        );
        assert_eq!(normalise_category("something else"), None);
    }

    #[test]
    fn test_bill_weight_from_signals() {
        let f = facts(json!({"billed_weight": 12, "actual_weight": 10}));
        assert_eq!(RuleClassifier::new().classify(&f), Ok(AuditTypeLabel::BillWeight));
    }

    #[test]
    fn test_dim_weight_when_dimensions_dominate() {
        let f = facts(json!({
            "billed_weight": 12,
            "actual_weight": 5,
            "length": 20,
            "width": 10,
            "height": 8
        }));
        // 1600 / 139 -> 12 lbs, above the 5 lbs actual weight
        assert_eq!(RuleClassifier::new().classify(&f), Ok(AuditTypeLabel::DimWeight));
    }

    #[test]
    fn test_duplicate_wins_over_weight() {
        let f = facts(json!({
            "duplicate_invoice_count": 2,
            "billed_weight": 12,
            "actual_weight": 10
        }));
        assert_eq!(
            RuleClassifier::new().classify(&f),
            Ok(AuditTypeLabel::DuplicateCharge)
        );
    }

    #[test]
    fn test_zone_signal() {
        let f = facts(json!({"carrier_zone": "5", "zone_code": "4", "billed_weight": 3}));
        assert_eq!(
            RuleClassifier::new().classify(&f),
            Ok(AuditTypeLabel::ZoneMismatch)
        );
    }

    #[test]
    fn test_category_fact_wins() {
        let f = facts(json!({
            "category": "Residential",
            "billed_weight": 12,
            "actual_weight": 10
        }));
        assert_eq!(
            RuleClassifier::new().classify(&f),
            Ok(AuditTypeLabel::ResidentialSurcharge)
        );
    }

    #[test]
    fn test_failures_are_surfaced() {
        let f = facts(json!({"category": "mystery"}));
        assert_eq!(
            RuleClassifier::new().classify(&f),
            Err(ClassificationError::UnrecognisedCategory("mystery".into()))
        );

        let f = facts(json!({"billed_weight": 10, "actual_weight": 10}));
        assert_eq!(RuleClassifier::new().classify(&f), Err(ClassificationError::NoSignal));
    }

    #[test]
    fn test_classification_is_stable() {
        let f = facts(json!({"carrier_service": "Next Day Air", "calc_service": "Ground"}));
        let classifier = RuleClassifier::new();
        let first = classifier.classify(&f);
        for _ in 0..5 {
            assert_eq!(classifier.classify(&f), first);
        }
    }
}
