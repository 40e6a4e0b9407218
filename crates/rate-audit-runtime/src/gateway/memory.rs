//! Fixture-backed gateway for demos and tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rate_audit_core::{FactMap, RecordKey};
use serde_json::json;

use super::{DataGateway, GatewayError};

/// Tracking number of the built-in demo record.
pub const DEMO_TRACKING_NUMBER: &str = "1Z999AA10123456784";

/// Gateway over in-memory records keyed by tracking number.
///
/// Failures can be scripted: queued errors are returned, oldest first,
/// before any lookup happens. A request for fields none of which the record
/// holds fails with `NotFound`.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    records: BTreeMap<String, FactMap>,
    failures: Mutex<VecDeque<GatewayError>>,
    requests: Mutex<Vec<BTreeSet<String>>>,
    calls: AtomicU32,
    delay: Option<Duration>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway holding one weight-audit record with parcel and agreement data.
    pub fn demo() -> Self {
        Self::new().with_record(
            DEMO_TRACKING_NUMBER,
            json!({
                "category": "BILL_WEIGHT_AUDIT",
                "billed_weight": 15.0,
                "calc_bill_weight": 10.0,
                "actual_weight": 10.0,
                "carrier_net_charge": 25.82,
                "calc_net_charge": 21.53,
                "length": 12.0,
                "width": 10.0,
                "height": 8.0,
                "sender_postal": "90210",
                "receiver_postal": "10001",
                "dim_divisor": 139,
                "carrier_agreement": "BASE-45",
                "base_discount_percent": 45.0
            }),
        )
    }

    /// Add a record. Non-object values are ignored.
    pub fn with_record(mut self, tracking_number: impl Into<String>, facts: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = facts {
            self.records
                .insert(tracking_number.into(), map.into_iter().collect());
        }
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an error for the next call.
    pub fn push_failure(&self, error: GatewayError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Queue the same error for the next `times` calls.
    pub fn fail_times(self, error: GatewayError, times: usize) -> Self {
        for _ in 0..times {
            self.push_failure(error.clone());
        }
        self
    }

    /// Number of fetch calls received, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Field sets requested so far, in call order.
    pub fn requests(&self) -> Vec<BTreeSet<String>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DataGateway for InMemoryGateway {
    async fn fetch(
        &self,
        key: &RecordKey,
        fields: &BTreeSet<String>,
    ) -> Result<FactMap, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fields.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        let record = self
            .records
            .get(&key.tracking_number)
            .ok_or_else(|| GatewayError::NotFound(format!("record {}", key)))?;

        let found: FactMap = fields
            .iter()
            .filter_map(|name| record.get(name).map(|v| (name.clone(), v.clone())))
            .collect();

        if found.is_empty() && !fields.is_empty() {
            let wanted: Vec<&str> = fields.iter().map(String::as_str).collect();
            return Err(GatewayError::NotFound(format!(
                "fields [{}] of {}",
                wanted.join(", "),
                key
            )));
        }
        Ok(found)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
