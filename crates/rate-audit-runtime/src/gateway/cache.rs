//! Caching decorator for gateways.
//!
//! Fetches are idempotent, so a response can be reused for the same record
//! and the same field set. The key carries the full record key, so cached
//! facts never cross between records.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rate_audit_core::{FactMap, RecordKey};
use tracing::debug;

use super::{DataGateway, GatewayError};
use crate::config::CacheConfig;

/// Cache key: the record plus the sorted requested field names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchKey {
    record: RecordKey,
    fields: Vec<String>,
}

impl FetchKey {
    pub fn new(record: &RecordKey, fields: &BTreeSet<String>) -> Self {
        Self {
            record: record.clone(),
            fields: fields.iter().cloned().collect(),
        }
    }
}

/// Gateway decorator that caches successful responses using moka.
pub struct CachedGateway<G> {
    inner: G,
    cache: Cache<FetchKey, FactMap>,
}

impl<G: DataGateway> CachedGateway<G> {
    /// Wrap `inner` with a cache of the given size and entry lifetime.
    pub fn new(inner: G, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }

    pub fn from_config(inner: G, config: &CacheConfig) -> Self {
        Self::new(inner, config.max_entries, config.ttl)
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of cached responses.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<G: DataGateway> DataGateway for CachedGateway<G> {
    async fn fetch(
        &self,
        key: &RecordKey,
        fields: &BTreeSet<String>,
    ) -> Result<FactMap, GatewayError> {
        let cache_key = FetchKey::new(key, fields);
        if let Some(hit) = self.cache.get(&cache_key).await {
            debug!(record = %key, gateway = self.inner.name(), "gateway cache hit");
            return Ok(hit);
        }

        // Errors are never cached
        let facts = self.inner.fetch(key, fields).await?;
        self.cache.insert(cache_key, facts.clone()).await;
        Ok(facts)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{InMemoryGateway, DEMO_TRACKING_NUMBER};
    use serde_json::json;

    fn fields(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_inner_gateway() {
        let gateway = CachedGateway::new(InMemoryGateway::demo(), 100, Duration::from_secs(60));
        let key = RecordKey::new(DEMO_TRACKING_NUMBER, "CLIENT001", "UPS").unwrap();
        let wanted = fields(&["billed_weight"]);

        let first = gateway.fetch(&key, &wanted).await.unwrap();
        let second = gateway.fetch(&key, &wanted).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_records_do_not_share_entries() {
        let inner = InMemoryGateway::new()
            .with_record("1ZAAAAAA0001", json!({"billed_weight": 5}))
            .with_record("1ZBBBBBB0002", json!({"billed_weight": 9}));
        let gateway = CachedGateway::new(inner, 100, Duration::from_secs(60));
        let wanted = fields(&["billed_weight"]);

        let a = RecordKey::new("1ZAAAAAA0001", "CLIENT001", "UPS").unwrap();
        let b = RecordKey::new("1ZBBBBBB0002", "CLIENT001", "UPS").unwrap();

        assert_eq!(gateway.fetch(&a, &wanted).await.unwrap()["billed_weight"], json!(5));
        assert_eq!(gateway.fetch(&b, &wanted).await.unwrap()["billed_weight"], json!(9));
        assert_eq!(gateway.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = InMemoryGateway::demo().fail_times(GatewayError::Unavailable("503".into()), 1);
        let gateway = CachedGateway::new(inner, 100, Duration::from_secs(60));
        let key = RecordKey::new(DEMO_TRACKING_NUMBER, "CLIENT001", "UPS").unwrap();
        let wanted = fields(&["actual_weight"]);

        assert!(gateway.fetch(&key, &wanted).await.is_err());
        assert!(gateway.fetch(&key, &wanted).await.is_ok());
        assert_eq!(gateway.inner().calls(), 2);
    }
}
