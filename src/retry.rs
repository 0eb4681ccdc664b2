//! Generic retry with exponential backoff for blocking oracle calls.

use std::thread;
use std::time::Duration;

use tracing::warn;

/// How many times to attempt an operation and how long to wait between
/// attempts. The delay doubles (or whatever `multiplier` says) after each
/// failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

/// Run `op` under `policy`, retrying only when `is_transient` says the
/// error is worth another attempt. Non-transient errors are returned
/// immediately; the last transient error is returned once the attempt
/// budget is spent.
pub fn retry_with_backoff<T, E, F, P>(policy: &RetryPolicy, is_transient: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut delay = policy.base_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_transient(&err) => {
                warn!(
                    "request failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt, policy.max_attempts, err, delay
                );
                thread::sleep(delay);
                delay *= policy.multiplier;
            }
            Err(err) => return Err(err),
        }
    }
}
