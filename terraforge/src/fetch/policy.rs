//! Retry policy for transient fetch failures.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use terraforge::fetch::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_attempts(), 4);
//! assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
//! assert_eq!(policy.delay_for_attempt(4), None);
//! ```

use std::time::Duration;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default initial delay for exponential backoff (200ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 200;

/// Default maximum delay for exponential backoff (5 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 5;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a fetch task handles transient failures.
///
/// Permanent failures (HTTP 4xx, undecodable bodies) are never retried
/// regardless of policy.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between retry attempts.
        delay: Duration,
    },

    /// Exponential backoff: the delay doubles after each failed attempt, up
    /// to a cap.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Initial delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap (delay won't exceed this).
        max_delay: Duration,
        /// Multiplier applied to delay after each failure (typically 2.0).
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Creates an exponential backoff policy with the default delays.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Calculates the delay before retry number `attempt`.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The retry number (1-based, where 1 is the first retry)
    ///
    /// # Returns
    ///
    /// The delay to wait before the retry, or `None` if no more attempts are
    /// allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt == 0 || attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt as i32 - 1);
                let delay_ms = (initial_delay.as_millis() as f64 * factor)
                    .min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_retries() {
        assert_eq!(RetryPolicy::None.delay_for_attempt(1), None);
        assert_eq!(RetryPolicy::None.max_attempts(), 1);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn test_exponential_doubles() {
        let policy = RetryPolicy::exponential(10);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_exponential_is_capped() {
        let policy = RetryPolicy::exponential(20);
        assert_eq!(policy.delay_for_attempt(9), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for_attempt(19), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_default_allows_four_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert!(policy.delay_for_attempt(3).is_some());
        assert!(policy.delay_for_attempt(4).is_none());
    }
}
