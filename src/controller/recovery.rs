//! Reconnection backoff and operation deadlines
//!
//! [`ReconnectionPolicy`] is the state machine that gates re-initialization
//! after recoverable faults: exponential delays from a configurable base,
//! capped at a configurable maximum, with a hard attempt ceiling. At the
//! ceiling the controller stops retrying and surfaces a terminal failure.
//!
//! The policy itself owns no timer; the controller arms its `reconnect` slot
//! with the delay this module computes, so exactly one reconnection timer can
//! be pending at a time.

use std::time::Duration;

use tracing::error;

use crate::error::{ClientError, ClientResult};

/// Backoff parameters for reconnection
///
/// The ceiling and cap mirror the observed production values but stay
/// configurable rather than hard-coded.
///
/// # Examples
///
/// ```rust
/// use softphone_core::controller::recovery::BackoffConfig;
/// use std::time::Duration;
///
/// let config = BackoffConfig::default();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.base_delay, Duration::from_secs(1));
/// assert_eq!(config.max_delay, Duration::from_secs(30));
/// assert!(!config.use_jitter);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum consecutive attempts before the failure becomes terminal
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling applied to the exponential delay
    pub max_delay: Duration,
    /// Add ±10% jitter to computed delays
    pub use_jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            use_jitter: false,
        }
    }
}

/// Exponential-backoff state machine for endpoint re-initialization
///
/// The k-th consecutive fault (1-based) yields a delay of
/// `min(max_delay, base_delay × 2^(k−1))` and leaves `attempt() == k`. Once
/// the ceiling is reached, [`next_delay`](Self::next_delay) returns `None`
/// and no further retry may be scheduled.
#[derive(Debug)]
pub struct ReconnectionPolicy {
    attempt: u32,
    config: BackoffConfig,
}

impl ReconnectionPolicy {
    /// Create a policy with the given backoff parameters
    pub fn new(config: BackoffConfig) -> Self {
        Self { attempt: 0, config }
    }

    /// Consecutive recoverable faults since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the attempt ceiling has been reached
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    /// Register a fault and compute the delay before the next attempt
    ///
    /// Returns `None` when the ceiling would be exceeded; the caller must
    /// surface a terminal failure instead of scheduling another attempt.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        let exponential = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(self.attempt));
        let delay = exponential.min(self.config.max_delay);
        self.attempt += 1;

        if self.config.use_jitter {
            let jitter = (rand::random::<f64>() - 0.5) * 0.2; // ±10%
            let millis = delay.as_millis() as f64;
            return Some(Duration::from_millis((millis * (1.0 + jitter)) as u64));
        }
        Some(delay)
    }

    /// Reset after a successful registration or an external recovery trigger
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Run a future against a deadline, mapping expiry to `OperationTimeout`
pub async fn with_timeout<T, F>(
    operation_name: &str,
    timeout: Duration,
    future: F,
) -> ClientResult<T>
where
    F: std::future::Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis(),
                "Operation timed out"
            );
            Err(ClientError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
