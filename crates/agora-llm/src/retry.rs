//! Backoff configuration and transient-error classification.
//!
//! The retry loop itself lives in [`LlmClient`](crate::client::LlmClient)
//! as an explicit attempt state machine (so cancellation can interrupt
//! both the request and the backoff sleep). This module provides the
//! pieces it is built from: [`RetryConfig`], [`is_retryable`],
//! [`compute_delay`], and the [`LlmEvent`] vocabulary published to
//! observers instead of being swallowed.

use std::time::Duration;

use crate::error::ProviderError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    pub max_retries: u32,
    /// Base delay between retries (default: 1 second).
    pub base_delay: Duration,
    /// Maximum delay between retries (default: 30 seconds).
    pub max_delay: Duration,
    /// Jitter factor: random 0..jitter_fraction of the delay is added
    /// (default: 0.25).
    pub jitter_fraction: f64,
    /// Per-attempt request timeout (default: 120 seconds).
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.25,
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

/// Events published by the LLM call state machine.
///
/// Consumers (the runtime event stream, the UI) subscribe so that
/// retries and final failures are visible rather than silent.
#[derive(Debug, Clone)]
pub enum LlmEvent {
    /// A transient failure occurred and a retry was scheduled.
    RetryScheduled {
        /// Service id the call targeted.
        service: String,
        /// Zero-indexed attempt that failed.
        attempt: u32,
        /// Backoff before the next attempt, in milliseconds.
        delay_ms: u64,
        /// Description of the failure.
        error: String,
    },
    /// The call failed for good (retries exhausted or non-retryable).
    CallFailed {
        /// Service id the call targeted.
        service: String,
        /// Stable error code (`network_error`, `api_error`, ...).
        code: &'static str,
        /// Description of the failure.
        error: String,
    },
    /// The call was aborted by its cancellation token.
    CallAborted {
        /// Service id the call targeted.
        service: String,
    },
}

/// Determines whether a [`ProviderError`] should be retried.
///
/// Transient: rate limits, timeouts, transport failures, and 5xx
/// responses. Everything else (auth, bad request, context overflow,
/// abort) fails immediately.
pub fn is_retryable(err: &ProviderError) -> bool {
    match err {
        ProviderError::RateLimited { .. } => true,
        ProviderError::Timeout => true,
        ProviderError::Http(_) => true,
        ProviderError::RequestFailed(msg) => {
            msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 504")
        }
        _ => false,
    }
}

/// Calculate the delay for attempt `n` (0-indexed) with exponential
/// backoff plus jitter.
///
/// The delay is `min(base_delay * 2^n, max_delay)` plus a random jitter
/// of `0..jitter_fraction * delay`.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let base_ms = config.base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp);
    let capped_ms = raw_ms.min(config.max_delay.as_millis() as u64);

    let jitter_max_ms = (capped_ms as f64 * config.jitter_fraction) as u64;
    let jitter_ms = if jitter_max_ms > 0 {
        // Cheap pseudo-randomness from the clock's subsecond nanos.
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        seed % (jitter_max_ms + 1)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}

/// Pick the backoff for a failed attempt, honoring a provider-suggested
/// retry-after when it is larger than the computed delay.
pub fn delay_for(config: &RetryConfig, attempt: u32, err: &ProviderError) -> Duration {
    let computed = compute_delay(config, attempt);
    if let ProviderError::RateLimited { retry_after_ms } = err {
        computed.max(Duration::from_millis(*retry_after_ms))
    } else {
        computed
    }
}
