//! Per-key push with a fixed-delay retry budget.

use crate::cancel::{CancelToken, WaitOutcome};
use crate::error::TransportError;
use crate::transport::ListLink;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry knobs applied to each destination key independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total push attempts per key, first try included.
    pub max_attempts: u32,
    /// Fixed wait between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay_ms: retry_delay.as_millis() as u64,
        }
    }

    /// Attempt budget; never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Result of pushing one payload to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The push was accepted.
    Delivered { attempts: u32 },
    /// Every attempt failed with a command error.
    Exhausted { attempts: u32, last_error: String },
    /// The wait before the next attempt was cancelled.
    Cancelled { attempts: u32 },
    /// The connection became unusable. Not counted against the budget.
    ConnectionLost { reason: String },
}

/// Push `payload` to `key`, retrying command failures on the same link.
///
/// There is no wait after the final attempt. A connection-level error ends
/// the loop immediately; the caller decides what else to abandon.
pub fn push_with_retry<L: ListLink>(
    link: &mut L,
    key: &str,
    payload: &[u8],
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> KeyOutcome {
    let max_attempts = policy.attempts();
    let mut attempts = 0;

    loop {
        let error = match link.push(key, payload) {
            Ok(()) => {
                debug!(key = %key, attempts = attempts + 1, "Pushed record");
                return KeyOutcome::Delivered {
                    attempts: attempts + 1,
                };
            }
            Err(TransportError::Connection(reason)) => {
                return KeyOutcome::ConnectionLost { reason };
            }
            Err(TransportError::Command(e)) => e,
        };

        attempts += 1;

        if attempts >= max_attempts {
            error!(
                key = %key,
                attempts = attempts,
                error = %error,
                "Unable to send a log record after {} tries",
                attempts
            );
            return KeyOutcome::Exhausted {
                attempts,
                last_error: error,
            };
        }

        warn!(
            key = %key,
            attempt = attempts,
            delay_ms = policy.retry_delay_ms,
            error = %error,
            "Failed to push record, retrying"
        );

        if cancel.wait_for(policy.delay()) == WaitOutcome::Cancelled {
            info!(
                key = %key,
                attempts = attempts,
                "Retry wait cancelled, aborting remaining retries for key"
            );
            return KeyOutcome::Cancelled { attempts };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_retry_policy_json() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retry_delay_ms, 100);
    }
}
