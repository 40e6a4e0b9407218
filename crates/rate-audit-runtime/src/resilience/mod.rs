//! Resilience patterns for rate-audit-runtime.
//!
//! This module provides:
//! - Per-call timeouts
//! - Bounded retry with exponential backoff for transient failures

mod retry;

pub use retry::{call_with_retry, RetryPolicy};
