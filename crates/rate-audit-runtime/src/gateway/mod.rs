//! Data fetch gateway abstractions.
//!
//! The gateway is the only way facts enter a run. This module defines the
//! capability contract plus an in-memory fixture gateway, a caching
//! decorator and (behind the `http` feature) a remote gateway.
//!
//! ## Security
//!
//! Remote gateways hold their credentials in [`ApiCredential`], which never
//! prints its value.

use std::collections::BTreeSet;

use async_trait::async_trait;
use rate_audit_core::{FactMap, RecordKey};
use thiserror::Error;

mod cache;
mod memory;
pub mod secrets;

#[cfg(feature = "http")]
mod http;

pub use cache::CachedGateway;
pub use memory::{InMemoryGateway, DEMO_TRACKING_NUMBER};
pub use secrets::{ApiCredential, CredentialError, CredentialSource};

#[cfg(feature = "http")]
pub use http::HttpGateway;

/// Typed gateway failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The record, or every requested field of it, does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure, overload, or a data source that is down
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl GatewayError {
    /// Only `Unavailable` is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Gateway abstraction allows swapping data sources.
///
/// # Contract
/// - `fetch` returns values only for fields in `fields`; absent fields are
///   simply left out of the mapping
/// - calls are idempotent: overlapping field sets may be requested any
///   number of times with no side effects
/// - implementations are shared across concurrent runs and must not keep
///   per-record state that could leak between records
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Fetch the named fields of one record.
    async fn fetch(&self, key: &RecordKey, fields: &BTreeSet<String>)
        -> Result<FactMap, GatewayError>;

    /// Gateway name for logs.
    fn name(&self) -> &str;
}

/// Field names requested by the initial fetch: rated shipment data, parcel
/// characteristics and the client's carrier agreement.
pub const STANDARD_INITIAL_FIELDS: &[&str] = &[
    "category",
    "billed_weight",
    "actual_weight",
    "calc_bill_weight",
    "length",
    "width",
    "height",
    "carrier_service",
    "calc_service",
    "carrier_zone",
    "carrier_net_charge",
    "calc_net_charge",
    "carrier_surcharges_total",
    "calc_surcharges_total",
    "duplicate_invoice_count",
];
