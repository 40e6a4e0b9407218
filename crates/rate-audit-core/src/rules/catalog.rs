//! Per-label knowledge: which facts a label needs and which carrier vs
//! calculated pairs describe its discrepancy.

use crate::facts::FactSet;
use crate::types::AuditTypeLabel;

/// Standard DIM divisor used when the agreement does not name one.
pub const DEFAULT_DIM_DIVISOR: f64 = 139.0;

/// How a compared value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Pounds,
    Dollars,
    Percent,
    Plain,
}

/// A billed value and the value it should have been.
#[derive(Debug, Clone, Copy)]
pub struct Comparison {
    /// Fact holding the carrier's value
    pub carrier: &'static str,
    /// Fact holding the expected value
    pub expected: &'static str,
    pub carrier_label: &'static str,
    pub expected_label: &'static str,
    pub unit: Unit,
}

/// Required facts and comparisons for one label.
#[derive(Debug)]
pub struct LabelProfile {
    pub label: AuditTypeLabel,
    pub required: &'static [&'static str],
    pub comparisons: &'static [Comparison],
}

const fn cmp(
    carrier: &'static str,
    expected: &'static str,
    carrier_label: &'static str,
    expected_label: &'static str,
    unit: Unit,
) -> Comparison {
    Comparison {
        carrier,
        expected,
        carrier_label,
        expected_label,
        unit,
    }
}

const WEIGHT: &[Comparison] = &[
    cmp("billed_weight", "actual_weight", "billed weight", "actual weight", Unit::Pounds),
    cmp("billed_weight", "calc_bill_weight", "billed weight", "calculated billable weight", Unit::Pounds),
];

const DIM: &[Comparison] = &[cmp(
    "billed_weight",
    "calc_bill_weight",
    "billed weight",
    "calculated billable weight",
    Unit::Pounds,
)];

const SERVICE: &[Comparison] = &[cmp(
    "carrier_service",
    "calc_service",
    "billed service",
    "shipped service",
    Unit::Plain,
)];

const ZONE: &[Comparison] = &[cmp(
    "carrier_zone",
    "zone_code",
    "billed zone",
    "calculated zone",
    Unit::Plain,
)];

const SURCHARGE: &[Comparison] = &[cmp(
    "carrier_surcharges_total",
    "calc_surcharges_total",
    "billed surcharges",
    "expected surcharges",
    Unit::Dollars,
)];

const ACCESSORIAL: &[Comparison] = &[cmp(
    "carrier_accessorial_total",
    "calc_accessorial_total",
    "billed accessorials",
    "expected accessorials",
    Unit::Dollars,
)];

const DISCOUNT: &[Comparison] = &[cmp(
    "carrier_discount_pct",
    "calc_discount_pct",
    "applied discount",
    "contracted discount",
    Unit::Percent,
)];

const FUEL: &[Comparison] = &[cmp(
    "carrier_fuel_amount",
    "calc_fuel_amount",
    "billed fuel surcharge",
    "expected fuel surcharge",
    Unit::Dollars,
)];

const RESIDENTIAL: &[Comparison] = &[cmp(
    "carrier_residential_amount",
    "calc_residential_amount",
    "billed residential surcharge",
    "expected residential surcharge",
    Unit::Dollars,
)];

/// Net charge pair, used for the dispute recommendation.
pub const NET_CHARGE: Comparison = cmp(
    "carrier_net_charge",
    "calc_net_charge",
    "billed net charge",
    "calculated net charge",
    Unit::Dollars,
);

static PROFILES: [LabelProfile; 10] = [
    LabelProfile {
        label: AuditTypeLabel::BillWeight,
        required: &["billed_weight", "actual_weight"],
        comparisons: WEIGHT,
    },
    LabelProfile {
        label: AuditTypeLabel::DimWeight,
        required: &["billed_weight", "calc_bill_weight", "length", "width", "height"],
        comparisons: DIM,
    },
    LabelProfile {
        label: AuditTypeLabel::ServiceType,
        required: &["carrier_service", "calc_service"],
        comparisons: SERVICE,
    },
    LabelProfile {
        label: AuditTypeLabel::ZoneMismatch,
        required: &["carrier_zone", "zone_code"],
        comparisons: ZONE,
    },
    LabelProfile {
        label: AuditTypeLabel::Surcharge,
        required: &["carrier_surcharges_total", "calc_surcharges_total"],
        comparisons: SURCHARGE,
    },
    LabelProfile {
        label: AuditTypeLabel::Accessorial,
        required: &["carrier_accessorial_total", "calc_accessorial_total"],
        comparisons: ACCESSORIAL,
    },
    LabelProfile {
        label: AuditTypeLabel::DuplicateCharge,
        required: &["duplicate_invoice_count"],
        comparisons: &[],
    },
    LabelProfile {
        label: AuditTypeLabel::RateDiscount,
        required: &["carrier_discount_pct", "calc_discount_pct", "carrier_agreement"],
        comparisons: DISCOUNT,
    },
    LabelProfile {
        label: AuditTypeLabel::FuelSurcharge,
        required: &["fuel_percentage", "carrier_fuel_amount", "calc_fuel_amount"],
        comparisons: FUEL,
    },
    LabelProfile {
        label: AuditTypeLabel::ResidentialSurcharge,
        required: &[
            "carrier_residential_amount",
            "calc_residential_amount",
            "address_type",
        ],
        comparisons: RESIDENTIAL,
    },
];

/// Profile for a label.
pub fn profile(label: AuditTypeLabel) -> &'static LabelProfile {
    // PROFILES is declared in AuditTypeLabel::ALL order
    let index = AuditTypeLabel::ALL
        .iter()
        .position(|l| *l == label)
        .unwrap_or_default();
    &PROFILES[index]
}

/// Signed difference between carrier and expected values, when both are numeric.
pub fn delta(facts: &FactSet, comparison: &Comparison) -> Option<f64> {
    Some(facts.number(comparison.carrier)? - facts.number(comparison.expected)?)
}

/// True when both values are present and disagree.
pub fn disagrees(facts: &FactSet, comparison: &Comparison) -> bool {
    if let Some(d) = delta(facts, comparison) {
        return d.abs() > f64::EPSILON;
    }
    match (facts.text(comparison.carrier), facts.text(comparison.expected)) {
        (Some(a), Some(b)) => !a.eq_ignore_ascii_case(&b),
        _ => false,
    }
}

/// DIM weight from the dimensions in `facts`, rounded up to the next pound.
pub fn dim_weight(facts: &FactSet) -> Option<f64> {
    let volume = facts.number("length")? * facts.number("width")? * facts.number("height")?;
    let divisor = facts
        .number("dim_divisor")
        .filter(|d| *d > 0.0)
        .unwrap_or(DEFAULT_DIM_DIVISOR);
    Some((volume / divisor).ceil())
}

/// Render a value in its unit.
pub fn render(value: f64, unit: Unit) -> String {
    match unit {
        Unit::Pounds => format!("{} lbs", trim_number(value)),
        Unit::Dollars => format!("${:.2}", value),
        Unit::Percent => format!("{}%", trim_number(value)),
        Unit::Plain => trim_number(value),
    }
}

fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// One sentence describing a comparison, or None when a value is missing.
pub fn describe(facts: &FactSet, comparison: &Comparison) -> Option<String> {
    if let Some(d) = delta(facts, comparison) {
        let carrier = facts.number(comparison.carrier)?;
        let expected = facts.number(comparison.expected)?;
        let (c, e) = (render(carrier, comparison.unit), render(expected, comparison.unit));
        let sentence = if d > f64::EPSILON {
            format!(
                "{} {} exceeds {} {} by {}",
                capitalize(comparison.carrier_label),
                c,
                comparison.expected_label,
                e,
                render(d, comparison.unit)
            )
        } else if d < -f64::EPSILON {
            format!(
                "{} {} is below {} {} by {}",
                capitalize(comparison.carrier_label),
                c,
                comparison.expected_label,
                e,
                render(-d, comparison.unit)
            )
        } else {
            format!(
                "{} {} matches {}",
                capitalize(comparison.carrier_label),
                c,
                comparison.expected_label
            )
        };
        return Some(sentence);
    }

    let carrier = facts.text(comparison.carrier)?;
    let expected = facts.text(comparison.expected)?;
    Some(if carrier.eq_ignore_ascii_case(&expected) {
        format!(
            "{} '{}' matches {}",
            capitalize(comparison.carrier_label),
            carrier,
            comparison.expected_label
        )
    } else {
        format!(
            "{} '{}' differs from {} '{}'",
            capitalize(comparison.carrier_label),
            carrier,
            comparison.expected_label,
            expected
        )
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
