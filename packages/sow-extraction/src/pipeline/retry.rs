//! Bounded retry with exponential backoff around capability calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::error::{CapabilityError, CapabilityResult};
use crate::types::config::RetryPolicy;

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or the attempt ceiling
    /// is reached. Each attempt is bounded by `call_timeout`; an elapsed
    /// timeout counts as a transient failure.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        call_timeout: Option<Duration>,
        mut op: F,
    ) -> CapabilityResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CapabilityResult<T>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;

        loop {
            let result = match call_timeout {
                Some(limit) => match timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(CapabilityError::Timeout {
                        after_ms: limit.as_millis() as u64,
                    }),
                },
                None => op().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        error = %e,
                        retry = attempt,
                        max_retries = max_attempts - 1,
                        "Capability call failed, retrying..."
                    );
                    sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        error = %e,
                        attempts = attempt,
                        "Capability call failed, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}
