//! End-to-end analysis scenarios.
//!
//! Every run goes through the public API against an in-memory gateway and
//! the rule-backed agents unless a test swaps one in.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rate_audit_core::{FactSet, ReasoningAttempt, Verdict};
use rate_audit_runtime::{
    run_audit_analysis, AgentError, AnalysisStatus, AuditOrchestrator, AuditRequest,
    AuditTypeLabel, CachedGateway, CacheConfig, CallError, GatewayError, InMemoryGateway,
    Reasoner, RetryPolicy, RunError, RuntimeConfig, Step,
};
use serde_json::json;

const CLIENT: &str = "CLIENT001";
const CARRIER: &str = "UPS";

fn orchestrator(gateway: Arc<InMemoryGateway>) -> AuditOrchestrator {
    AuditOrchestrator::builder()
        .gateway(gateway)
        .build()
        .unwrap()
}

fn fields(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// Reasoner that always asks for the same field
struct AlwaysMissing(&'static str);

#[async_trait]
impl Reasoner for AlwaysMissing {
    async fn reason(
        &self,
        _facts: &FactSet,
        _label: AuditTypeLabel,
        _prior: &[ReasoningAttempt],
    ) -> Result<Verdict, AgentError> {
        Verdict::insufficient([self.0]).map_err(|e| AgentError::Internal(e.to_string()))
    }
}

// ============================================================================
// Scenario A: sufficient on the first pass
// ============================================================================

#[tokio::test]
async fn test_weight_discrepancy_completes_in_one_pass() {
    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_record("1ZWEIGHT00001", json!({"billed_weight": 12, "actual_weight": 10})),
    );
    let orchestrator = orchestrator(gateway.clone());

    let result = run_audit_analysis(&orchestrator, "1ZWEIGHT00001", CLIENT, CARRIER, None)
        .await
        .unwrap();

    assert_eq!(result.status(), AnalysisStatus::Completed);
    assert_eq!(result.audit_type, Some(AuditTypeLabel::BillWeight));
    assert_eq!(result.iterations_used, 0);
    assert_eq!(result.reasoning_calls, 1);

    let summary = result.summary().unwrap();
    assert_eq!(summary.audit_type, AuditTypeLabel::BillWeight);
    assert_eq!(summary.bullets.len(), 1);
    assert!(summary.bullets[0].contains("by 2 lbs"), "{}", summary.bullets[0]);

    // Only the initial fetch reached the gateway
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_completed_result_serializes_with_status() {
    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_record("1ZWEIGHT00001", json!({"billed_weight": 12, "actual_weight": 10})),
    );
    let result = run_audit_analysis(&orchestrator(gateway), "1ZWEIGHT00001", CLIENT, CARRIER, None)
        .await
        .unwrap();

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["status"], "completed");
    assert_eq!(value["audit_type"], "BILL_WEIGHT");
    assert_eq!(value["facts"]["billed_weight"], 12);
}

// ============================================================================
// Scenario B: one enrichment cycle
// ============================================================================

#[tokio::test]
async fn test_missing_zone_code_is_enriched() {
    let gateway = Arc::new(InMemoryGateway::new().with_record(
        "1ZZONE000002",
        json!({"category": "ZONE_MISMATCH", "carrier_zone": "6", "zone_code": "4"}),
    ));
    let orchestrator = orchestrator(gateway.clone());

    let result = run_audit_analysis(&orchestrator, "1ZZONE000002", CLIENT, CARRIER, None)
        .await
        .unwrap();

    assert_eq!(result.status(), AnalysisStatus::Completed);
    assert_eq!(result.iterations_used, 1);
    assert_eq!(result.reasoning_calls, 2);
    assert_eq!(result.no_progress_iterations, 0);
    assert_eq!(result.facts["zone_code"], json!("4"));

    // The enrichment fetch asked for exactly the missing field
    let requests = gateway.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], fields(&["zone_code"]));
}

#[tokio::test]
async fn test_enrichment_through_cached_gateway() {
    let inner = InMemoryGateway::new().with_record(
        "1ZZONE000002",
        json!({"category": "ZONE_MISMATCH", "carrier_zone": "6", "zone_code": "4"}),
    );
    let cached = Arc::new(CachedGateway::from_config(inner, &CacheConfig::default()));
    let orchestrator = AuditOrchestrator::builder()
        .gateway(cached.clone())
        .build()
        .unwrap();

    for _ in 0..2 {
        let result = run_audit_analysis(&orchestrator, "1ZZONE000002", CLIENT, CARRIER, None)
            .await
            .unwrap();
        assert_eq!(result.iterations_used, 1);
    }

    // The second run was served from the cache
    assert_eq!(cached.inner().calls(), 2);
}

// ============================================================================
// Scenario C: the iteration bound
// ============================================================================

#[tokio::test]
async fn test_unavailable_agreement_exceeds_bound() {
    let gateway = Arc::new(InMemoryGateway::new().with_record(
        "1ZDISC000003",
        json!({
            "category": "RATE_DISCOUNT",
            "carrier_discount_pct": 40,
            "calc_discount_pct": 45,
            "carrier_net_charge": 30.0,
            "calc_net_charge": 27.5
        }),
    ));
    let orchestrator = orchestrator(gateway.clone());

    let result = run_audit_analysis(&orchestrator, "1ZDISC000003", CLIENT, CARRIER, None)
        .await
        .unwrap();

    assert_eq!(result.status(), AnalysisStatus::BoundExceeded);
    assert_eq!(result.missing_fields(), Some(&fields(&["carrier_agreement"])));
    assert_eq!(result.iterations_used, 3);
    assert_eq!(result.reasoning_calls, 4);
    // First enrichment found the discount percentages, the rest found nothing
    assert_eq!(result.no_progress_iterations, 2);
    assert!(result.summary().is_none());

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["status"], "bound_exceeded");
    assert_eq!(value["missing_fields"], json!(["carrier_agreement"]));
    assert_eq!(value["attempts"].as_array().unwrap().len(), 4);

    let requests = gateway.requests();
    assert_eq!(
        requests[1],
        fields(&["calc_discount_pct", "carrier_agreement", "carrier_discount_pct"])
    );
    assert_eq!(requests[2], fields(&["carrier_agreement"]));
}

#[tokio::test]
async fn test_bound_is_reasoning_calls_minus_one() {
    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_record("1ZWEIGHT00001", json!({"billed_weight": 12, "actual_weight": 10})),
    );
    let orchestrator = AuditOrchestrator::builder()
        .gateway(gateway.clone())
        .reasoner(Arc::new(AlwaysMissing("carrier_agreement")))
        .config(RuntimeConfig::default().with_max_enrichment_iterations(5))
        .build()
        .unwrap();

    // The per-request override wins over the configured bound
    let result = run_audit_analysis(&orchestrator, "1ZWEIGHT00001", CLIENT, CARRIER, Some(2))
        .await
        .unwrap();

    assert_eq!(result.status(), AnalysisStatus::BoundExceeded);
    assert_eq!(result.iterations_used, 2);
    assert_eq!(result.reasoning_calls, 3);
    assert_eq!(gateway.calls(), 3);
}

// ============================================================================
// Scenario D: transient failures within the retry bound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unavailable_twice_then_success() {
    let gateway = Arc::new(
        InMemoryGateway::demo().fail_times(GatewayError::Unavailable("503".into()), 2),
    );
    let orchestrator = orchestrator(gateway.clone());

    let result = run_audit_analysis(
        &orchestrator,
        rate_audit_runtime::DEMO_TRACKING_NUMBER,
        CLIENT,
        CARRIER,
        None,
    )
    .await
    .unwrap();

    assert_eq!(result.status(), AnalysisStatus::Completed);
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried_then_fatal() {
    let gateway = Arc::new(InMemoryGateway::demo().with_delay(Duration::from_secs(20)));
    let orchestrator = AuditOrchestrator::builder()
        .gateway(gateway.clone())
        .config(
            RuntimeConfig::default()
                .with_call_timeout(Duration::from_secs(1))
                .with_retry(RetryPolicy {
                    max_retries: 1,
                    initial_backoff: Duration::from_millis(100),
                    ..RetryPolicy::default()
                }),
        )
        .build()
        .unwrap();

    let err = orchestrator
        .run(AuditRequest::new(rate_audit_runtime::DEMO_TRACKING_NUMBER, CLIENT, CARRIER).unwrap())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RunError::RetriesExhausted {
            step: Step::FetchInitial,
            attempts: 2,
            source: CallError::Timeout(Duration::from_secs(1)),
        }
    );
    assert_eq!(gateway.calls(), 2);
}

// ============================================================================
// Scenario E: permanent failures are never retried
// ============================================================================

#[tokio::test]
async fn test_unauthorized_is_fatal_without_retry() {
    let gateway = Arc::new(
        InMemoryGateway::demo().fail_times(GatewayError::Unauthorized("bad key".into()), 1),
    );
    let orchestrator = orchestrator(gateway.clone());

    let err = run_audit_analysis(
        &orchestrator,
        rate_audit_runtime::DEMO_TRACKING_NUMBER,
        CLIENT,
        CARRIER,
        None,
    )
    .await
    .unwrap_err();

    assert_eq!(err.step(), Some(Step::FetchInitial));
    assert!(matches!(
        err,
        RunError::Permanent {
            source: CallError::Gateway(GatewayError::Unauthorized(_)),
            ..
        }
    ));
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_unknown_record_is_fatal() {
    let orchestrator = orchestrator(Arc::new(InMemoryGateway::demo()));

    let err = run_audit_analysis(&orchestrator, "1ZNOSUCHREC9", CLIENT, CARRIER, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.call_error(),
        Some(CallError::Gateway(GatewayError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_malformed_tracking_number_is_rejected() {
    let gateway = Arc::new(InMemoryGateway::demo());
    let orchestrator = orchestrator(gateway.clone());

    let err = run_audit_analysis(&orchestrator, "", CLIENT, CARRIER, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::InvalidRequest(_)));
    assert_eq!(gateway.calls(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_do_not_share_state() {
    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_record("1ZWEIGHT00001", json!({"billed_weight": 12, "actual_weight": 10}))
            .with_record(
                "1ZZONE000002",
                json!({"category": "ZONE_MISMATCH", "carrier_zone": "6", "zone_code": "4"}),
            ),
    );
    let orchestrator = orchestrator(gateway);

    let weight = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            run_audit_analysis(&orchestrator, "1ZWEIGHT00001", CLIENT, CARRIER, None).await
        })
    };
    let zone = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            run_audit_analysis(&orchestrator, "1ZZONE000002", CLIENT, CARRIER, None).await
        })
    };

    let weight = weight.await.unwrap().unwrap();
    let zone = zone.await.unwrap().unwrap();

    assert_eq!(weight.audit_type, Some(AuditTypeLabel::BillWeight));
    assert!(!weight.facts.contains_key("carrier_zone"));
    assert_eq!(zone.audit_type, Some(AuditTypeLabel::ZoneMismatch));
    assert!(!zone.facts.contains_key("billed_weight"));
}
