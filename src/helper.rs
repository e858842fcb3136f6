//! Helper utilities for Sshgate
//!
//! This module provides common utility functions used throughout the application.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default buffer size for IO operations
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default keep-alive interval for the SSH session in seconds
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 30;

fn default_max_attempts() -> u32 {
    3
}

fn default_step_ms() -> u64 {
    1000
}

/// Delay schedule between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// `step * (attempt + 1)`: 1s, 2s, 3s, ... for a one second step
    Linear {
        /// Step in milliseconds
        #[serde(default = "default_step_ms")]
        step_ms: u64,
    },
    /// `initial * multiplier^attempt`, capped at `max`
    Exponential {
        /// First delay in milliseconds
        initial_ms: u64,
        /// Upper bound in milliseconds
        max_ms: u64,
        /// Growth factor per attempt
        multiplier: f64,
        /// Randomize each delay into `[delay / 2, delay]`
        #[serde(default)]
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            step_ms: default_step_ms(),
        }
    }
}

/// Retry policy for operations that wait on the SSH session
///
/// `max_attempts` counts every attempt, including the first one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay schedule
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a linear policy with the given attempt count and step
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Linear {
                step_ms: step.as_millis() as u64,
            },
        }
    }

    /// Create an exponential policy
    pub fn exponential(
        max_attempts: u32,
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: bool,
    ) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Exponential {
                initial_ms: initial.as_millis() as u64,
                max_ms: max.as_millis() as u64,
                multiplier,
                jitter,
            },
        }
    }

    /// Calculate the delay to wait after the given zero-based attempt failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear { step_ms } => {
                Duration::from_millis(step_ms.saturating_mul(u64::from(attempt) + 1))
            }
            Backoff::Exponential {
                initial_ms,
                max_ms,
                multiplier,
                jitter,
            } => {
                let delay_ms = initial_ms as f64 * multiplier.powi(attempt as i32);
                let capped = if delay_ms.is_finite() {
                    (delay_ms as u64).min(max_ms)
                } else {
                    max_ms
                };

                if jitter && capped > 1 {
                    let jittered = rand::thread_rng().gen_range(capped / 2..=capped);
                    Duration::from_millis(jittered)
                } else {
                    Duration::from_millis(capped)
                }
            }
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if let Backoff::Exponential {
            initial_ms,
            max_ms,
            multiplier,
            ..
        } = self.backoff
        {
            if multiplier < 1.0 {
                return Err("retry multiplier must be >= 1.0".to_string());
            }
            if initial_ms > max_ms {
                return Err("retry initial_ms cannot be greater than max_ms".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default_is_one_two_three_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_policy_linear() {
        let policy = RetryPolicy::linear(5, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_retry_policy_exponential_capped() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(100),
            Duration::from_secs(1),
            2.0,
            false,
        );

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        // Should be capped at max
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_policy_exponential_jitter_bounds() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(400),
            Duration::from_secs(10),
            1.0,
            true,
        );

        for attempt in 0..20 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_retry_policy_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::linear(0, Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(RetryPolicy::exponential(
            3,
            Duration::from_secs(5),
            Duration::from_secs(1),
            2.0,
            false
        )
        .validate()
        .is_err());
        assert!(RetryPolicy::exponential(
            3,
            Duration::from_secs(1),
            Duration::from_secs(5),
            0.5,
            false
        )
        .validate()
        .is_err());
    }

    #[test]
    fn test_retry_policy_deserialize() {
        let policy: RetryPolicy = toml::from_str(
            r#"
max_attempts = 4

[backoff]
strategy = "exponential"
initial_ms = 50
max_ms = 5000
multiplier = 3.0
jitter = true
"#,
        )
        .unwrap();

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                initial_ms: 50,
                max_ms: 5000,
                multiplier: 3.0,
                jitter: true,
            }
        );
    }

    #[test]
    fn test_retry_policy_deserialize_defaults() {
        let policy: RetryPolicy = toml::from_str("").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }
}
