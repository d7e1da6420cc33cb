// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry and backoff middleware shared by every stage that makes an
//! external call (chat completion, embeddings, dimensionality reduction).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use bl_error::PipelineError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Retry and backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial one. `0` means
    /// only the initial attempt.
    pub max_retries: u32,
    /// Base delay for the exponential schedule.
    #[serde(with = "bl_duration_serde_shim::duration_millis")]
    pub base_delay: Duration,
    /// Hard cap on any single backoff delay.
    #[serde(with = "bl_duration_serde_shim::duration_millis")]
    pub max_delay: Duration,
    /// Overall wall-clock budget across all attempts.
    #[serde(with = "bl_duration_serde_shim::duration_millis")]
    pub overall_timeout: Duration,
    /// Jitter factor in `[0.0, 1.0]`; `0.0` disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    /// Matches §5's `RETRY_DELAY × attempt` schedule with up to 3 retries.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(60),
            jitter_factor: 0.2,
        }
    }
}

/// Local `Duration`-as-milliseconds serde shim, kept private to this crate
/// so `bl-retry` does not need a dependency edge onto `bl-duration-serde`
/// for a single field pair.
mod bl_duration_serde_shim {
    pub mod duration_millis {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
            ser.serialize_u64(val.as_millis() as u64)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
            let ms = u64::deserialize(de)?;
            Ok(Duration::from_millis(ms))
        }
    }
}

/// Record of one failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-indexed attempt number.
    pub attempt: u32,
    /// The error's display string.
    pub error: String,
    /// Backoff delay applied before the next attempt.
    pub delay: Duration,
}

/// Metadata accumulated across all attempts of one retried call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Total attempts made, including the successful one.
    pub total_attempts: u32,
    /// Each attempt that failed before the eventual outcome.
    pub failed_attempts: Vec<RetryAttempt>,
    /// Wall-clock time spent across all attempts.
    pub total_duration: Duration,
}

/// Outcome of a retried call: the value plus bookkeeping about how many
/// attempts it took. Token usage accounting (§4.5, §4.8-4.10) reads
/// `metadata.total_attempts` to decide whether a stage's per-comment
/// failure-after-retries recovery path was taken.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The successfully produced value.
    pub value: T,
    /// Bookkeeping about the attempts it took to get here.
    pub metadata: RetryMetadata,
}

/// Compute the backoff delay for a zero-indexed `attempt`, following the
/// `RETRY_DELAY × attempt` schedule from §5 with an exponential shape and
/// jitter layered on top.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let delay_ms = (config.base_delay.as_millis() as u64).saturating_mul(exp);
    let capped_ms = delay_ms.min(config.max_delay.as_millis() as u64);

    let jitter_factor = config.jitter_factor.clamp(0.0, 1.0);
    if jitter_factor > 0.0 && capped_ms > 0 {
        let jitter_range = (capped_ms as f64 * jitter_factor) as u64;
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        let pseudo = nanos.wrapping_mul(attempt as u64 + 1);
        let jitter = if jitter_range > 0 { pseudo % jitter_range } else { 0 };
        Duration::from_millis(capped_ms.saturating_sub(jitter))
    } else {
        Duration::from_millis(capped_ms)
    }
}

/// Default retryability policy: 4xx-flagged errors are non-retryable,
/// everything else is. Callers (the `bl-llm` HTTP-bound clients) flag a
/// non-retryable failure by attaching `.with_context("retryable", false)`
/// to the `PipelineError` they return; absence of that key defaults to
/// retryable, matching "network/timeout/5xx are retryable" from §5.
pub fn is_retryable(err: &PipelineError) -> bool {
    match err.context.get("retryable").and_then(|v| v.as_bool()) {
        Some(flag) => flag,
        None => true,
    }
}

/// Run `op` up to `config.max_retries + 1` times with exponential backoff,
/// returning the first success along with attempt bookkeeping.
///
/// `retryable` decides whether a given error should trigger another
/// attempt; pass [`is_retryable`] for the default §5 policy.
pub async fn retry_async<T, F, Fut>(
    config: &RetryConfig,
    mut op: F,
    retryable: fn(&PipelineError) -> bool,
) -> Result<RetryOutcome<T>, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let start = Instant::now();
    let max_attempts = config.max_retries + 1;
    let mut failed_attempts = Vec::new();

    for attempt in 0..max_attempts {
        if start.elapsed() >= config.overall_timeout {
            warn!(target: "bl.retry", attempt, "overall timeout exceeded");
            return Err(PipelineError::internal("retry overall timeout exceeded")
                .with_context("attempts", attempt));
        }

        debug!(target: "bl.retry", attempt, max_attempts, "attempting operation");

        match op().await {
            Ok(value) => {
                let total_duration = start.elapsed();
                debug!(
                    target: "bl.retry",
                    attempt,
                    total_duration_ms = total_duration.as_millis() as u64,
                    "operation succeeded"
                );
                return Ok(RetryOutcome {
                    value,
                    metadata: RetryMetadata {
                        total_attempts: attempt + 1,
                        failed_attempts,
                        total_duration,
                    },
                });
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;

                if !retryable(&err) {
                    debug!(target: "bl.retry", error = %err, "non-retryable error, giving up");
                    return Err(err);
                }

                if is_last {
                    warn!(target: "bl.retry", error = %err, attempt, "retries exhausted");
                    return Err(err.with_context("attempts", attempt + 1));
                }

                let delay = compute_delay(config, attempt);
                warn!(
                    target: "bl.retry",
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable error, backing off"
                );

                failed_attempts.push(RetryAttempt {
                    attempt,
                    error: err.to_string(),
                    delay,
                });

                let remaining = config.overall_timeout.saturating_sub(start.elapsed());
                if delay > remaining {
                    return Err(PipelineError::internal("retry overall timeout exceeded")
                        .with_context("attempts", attempt + 1));
                }
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(PipelineError::internal("retry loop exited unexpectedly"))
}
