//! Retry handling for explorer reads

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::domain::errors::ErrorType;
use crate::domain::models::UtxoRecord;
use crate::domain::services::parse_error_type;
use crate::infrastructure::explorer::{ExplorerClientError, UtxoSource};
use crate::utils::logging;

/// Retries operations that fail with transient network errors.
///
/// Only reads go through here. Prove and broadcast calls are never retried:
/// a repeated prove request with the same funding UTXO is rejected by the
/// prover's attempt cache.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    max_attempts: u32,
    base_delay_ms: u64,
}

impl RetryHandler {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }

    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-network error, or
    /// runs out of attempts
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        operation_name: &str,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        logging::log_info(&format!(
                            "{} succeeded after {} attempts",
                            operation_name, attempt
                        ));
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let message = e.to_string();
                    if parse_error_type(&message) != ErrorType::NetworkError {
                        return Err(e);
                    }
                    if attempt >= self.max_attempts {
                        logging::log_error(&format!(
                            "{} failed after {} attempts: {}",
                            operation_name, attempt, message
                        ));
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    logging::log_warning(&format!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        operation_name, attempt, self.max_attempts, message, delay
                    ));
                    sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Exponential backoff: base, 2*base, 4*base, ...
    fn calculate_delay(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// [`UtxoSource`] decorator that retries transient fetch failures
pub struct RetryingUtxoSource {
    inner: Arc<dyn UtxoSource>,
    retry: RetryHandler,
}

impl RetryingUtxoSource {
    pub fn new(inner: Arc<dyn UtxoSource>, retry: RetryHandler) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl UtxoSource for RetryingUtxoSource {
    async fn fetch_utxos(&self, address: &str) -> Result<Vec<UtxoRecord>, ExplorerClientError> {
        self.retry
            .execute_with_retry(|| self.inner.fetch_utxos(address), "UTXO fetch")
            .await
    }
}
