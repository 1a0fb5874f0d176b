//! Caller-side retry with backoff for conflicted updates.
//!
//! The store reports a conflict and stops; whether to try again is the
//! caller's decision. This module is that decision packaged as a small
//! combinator: attempt the operation, and on conflict (or a retryable error
//! such as pool exhaustion) sleep an exponentially growing backoff and try
//! again, up to a bounded number of attempts. The operation closure is
//! responsible for re-reading the record so each attempt submits a fresh
//! version.

use crate::error::StoreResult;
use crate::service::UpdateOutcome;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// How often and how patiently to retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubles after each conflict.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
        }
    }
}

/// Run `op` until it reports success, attempts run out, or it fails with a
/// non-retryable error.
///
/// `op` receives the 1-based attempt number. Returning
/// [`UpdateOutcome::Conflict`] triggers a backoff and another attempt; the
/// final conflict is returned as-is when attempts are exhausted. Errors for
/// which [`StoreError::is_retryable`](crate::StoreError::is_retryable) holds
/// (pool exhaustion, connection failures) are retried the same way.
pub async fn retry_on_conflict<F, Fut>(policy: &RetryPolicy, mut op: F) -> StoreResult<UpdateOutcome>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StoreResult<UpdateOutcome>>,
{
    let mut backoff = policy.initial_backoff;
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let last = attempt >= attempts;
        match op(attempt).await {
            Ok(UpdateOutcome::Updated(product)) => {
                return Ok(UpdateOutcome::Updated(product));
            }
            Ok(conflict @ UpdateOutcome::Conflict { .. }) => {
                if last {
                    return Ok(conflict);
                }
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "conflict, retrying");
            }
            Err(e) if e.is_retryable() && !last => {
                debug!(attempt, error = %e, "retryable error, retrying");
            }
            Err(e) => return Err(e),
        }
        sleep(backoff).await;
        backoff *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::Product;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_product(version: i64) -> Product {
        Product {
            id: 1,
            name: "Widget".to_string(),
            description: None,
            price: 10.0,
            stock_quantity: 5,
            version,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_returns_immediately_on_success() {
        let calls = AtomicU32::new(0);
        let outcome = retry_on_conflict(&fast_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(UpdateOutcome::Updated(sample_product(1))) }
        })
        .await
        .unwrap();

        assert!(outcome.is_updated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_conflicts_then_succeeds() {
        let calls = AtomicU32::new(0);
        let outcome = retry_on_conflict(&fast_policy(5), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Ok(UpdateOutcome::Conflict {
                        id: 1,
                        submitted_version: 0,
                    })
                } else {
                    Ok(UpdateOutcome::Updated(sample_product(1)))
                }
            }
        })
        .await
        .unwrap();

        assert!(outcome.is_updated());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = retry_on_conflict(&fast_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Ok(UpdateOutcome::Conflict {
                    id: 1,
                    submitted_version: 0,
                })
            }
        })
        .await
        .unwrap();

        assert!(!outcome.is_updated());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(&fast_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::validation("bad input")) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_error_is_retried() {
        let calls = AtomicU32::new(0);
        let outcome = retry_on_conflict(&fast_policy(4), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Err(StoreError::pool_exhausted(2))
                } else {
                    Ok(UpdateOutcome::Updated(sample_product(2)))
                }
            }
        })
        .await
        .unwrap();

        assert!(outcome.is_updated());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retryable_error_on_last_attempt_propagates() {
        let result = retry_on_conflict(&fast_policy(1), |_| async {
            Err(StoreError::pool_exhausted(2))
        })
        .await;

        assert!(matches!(result, Err(StoreError::PoolExhausted { .. })));
    }
}
