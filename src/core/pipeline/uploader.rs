//! Drain loop that moves samples from the delivery queue into the sink.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::queue::DeliveryQueue;
use super::status::StatusBoard;
use crate::core::config::{DeliveryConfig, DeliverySemantics, SharedConfig};
use crate::core::sample::SheetRow;
use crate::core::sink::{SheetSink, SinkError};
use crate::error::MonitorError;

/// Exponential backoff without jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(delivery: &DeliveryConfig) -> Self {
        Self {
            max_attempts: delivery.max_attempts.max(1),
            base_delay: Duration::from_millis(delivery.base_delay_ms),
            max_delay: Duration::from_millis(delivery.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1 = the second attempt)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

/// How a single batch was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Delivered {
        attempts: u32,
        /// An earlier attempt failed in a way that may have stored the rows
        after_ambiguous_failure: bool,
    },
    Fatal {
        attempts: u32,
        error: SinkError,
    },
    Exhausted {
        attempts: u32,
        error: SinkError,
    },
}

/// Consumer side of the delivery queue
pub struct SheetUploader {
    queue: Arc<DeliveryQueue>,
    sink: Arc<dyn SheetSink>,
    config: SharedConfig,
    status: Arc<StatusBoard>,
}

impl SheetUploader {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        sink: Arc<dyn SheetSink>,
        config: SharedConfig,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            queue,
            sink,
            config,
            status,
        }
    }

    /// Deliver batches until the queue is closed and drained
    pub async fn run(self) {
        log::debug!("Uploader started (sink: {})", self.sink.name());

        loop {
            // Batch and retry settings follow the latest reload
            let config = self.config.snapshot();
            let delivery = &config.delivery;

            let Some(lease) = self.queue.lease(delivery.batch_size).await else {
                break;
            };

            let rows: Vec<SheetRow> = lease
                .samples()
                .iter()
                .map(|sample| SheetRow::from(sample.as_ref()))
                .collect();

            let outcome = self
                .deliver(
                    &rows,
                    &RetryPolicy::from_config(delivery),
                    Duration::from_secs(delivery.request_timeout_secs),
                )
                .await;

            self.record(&rows, outcome, delivery.semantics);
            self.queue.commit(lease);
        }

        log::debug!("Uploader drained, exiting");
    }

    /// Try to append `rows`, retrying transient failures per `policy`.
    pub async fn deliver(
        &self,
        rows: &[SheetRow],
        policy: &RetryPolicy,
        request_timeout: Duration,
    ) -> BatchOutcome {
        let mut attempts = 0;
        let mut ambiguous = false;

        loop {
            attempts += 1;

            let result = match timeout(request_timeout, self.sink.append(rows)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::transient(
                    format!("request timed out after {:?}", request_timeout),
                    true,
                )),
            };

            let error = match result {
                Ok(()) => {
                    return BatchOutcome::Delivered {
                        attempts,
                        after_ambiguous_failure: ambiguous,
                    }
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return BatchOutcome::Fatal { attempts, error };
            }

            if attempts >= policy.max_attempts {
                return BatchOutcome::Exhausted { attempts, error };
            }

            ambiguous |= error.maybe_applied();

            let delay = policy.delay_for(attempts);
            log::warn!(
                "{} append failed (attempt {}/{}): {}; retrying in {:?}",
                self.sink.name(),
                attempts,
                policy.max_attempts,
                error,
                delay
            );
            sleep(delay).await;
        }
    }

    fn record(&self, rows: &[SheetRow], outcome: BatchOutcome, semantics: DeliverySemantics) {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return;
        };
        let (first, last) = (first.sequence_id, last.sequence_id);
        let count = rows.len() as u64;

        match outcome {
            BatchOutcome::Delivered {
                attempts,
                after_ambiguous_failure,
            } => {
                if after_ambiguous_failure {
                    match semantics {
                        DeliverySemantics::AtLeastOnce => {
                            log::warn!(
                                "Samples {}..={} may have been appended more than once",
                                first,
                                last
                            );
                            self.status.record_possible_duplicates(count);
                        }
                        DeliverySemantics::SinkDeduplicates => {
                            log::debug!("Samples {}..={} re-sent; sink deduplicates", first, last);
                        }
                    }
                }

                log::debug!(
                    "Delivered samples {}..={} in {} attempt(s)",
                    first,
                    last,
                    attempts
                );
                self.status.record_delivered(first, last, count, attempts);
            }
            BatchOutcome::Fatal { attempts, error } => {
                let error = MonitorError::from(error).to_string();
                log::error!(
                    "Dropping samples {}..={} after {} attempt(s): {}",
                    first,
                    last,
                    attempts,
                    error
                );
                self.status.record_fatal(error, count);
            }
            BatchOutcome::Exhausted { attempts, error } => {
                let error = MonitorError::RetryExhausted {
                    attempts,
                    last_error: error.to_string(),
                }
                .to_string();
                log::error!("Dropping samples {}..={}: {}", first, last, error);
                self.status.record_exhausted(attempts, error, count);
            }
        }
    }
}
