//! Ports and HTTP adapters for the external collaborators: the payment
//! processor and the domain registrar / hosting platform.

pub mod payments;
pub mod registrar;

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::errors::ServiceError;

/// Retry policy for idempotent external reads (availability, price, verify).
/// Mutating calls must never be routed through the retry helper unless the
/// remote end is idempotency-keyed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }
}

fn is_transient(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::RegistrarUnavailable(_) | ServiceError::PaymentUnavailable(_)
    )
}

/// Runs `f` with exponential backoff and jitter, up to `policy.retries`
/// additional attempts, retrying only transient external failures.
pub(crate) async fn retry_idempotent<T, F, Fut>(
    op: &str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.retries && is_transient(&err) => {
                let backoff = policy.base_delay * 2u32.saturating_pow(attempt);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
                warn!(op, attempt, error = %err, "Transient external failure, retrying");
                tokio::time::sleep(backoff + jitter).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
