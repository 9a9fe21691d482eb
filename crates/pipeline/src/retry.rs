use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry with a linearly increasing delay between attempts.
///
/// Used by the temp-file ledger, whose deletions can fail while the renderer
/// still holds a file open on filesystems that lock files on read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_delay_step_ms")]
    pub delay_step_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    100
}

fn default_delay_step_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            delay_step_ms: default_delay_step_ms(),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping. Useful where the failure is not
    /// time-dependent, and in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
            delay_step_ms: 0,
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms + self.delay_step_ms * (attempt.saturating_sub(1)) as u64)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping between attempts.
/// Returns the first success or the last error once attempts are exhausted.
pub fn with_retries<T, E>(
    policy: &RetryPolicy,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(_) => {
                thread::sleep(policy.delay_after(attempt));
                attempt += 1;
            }
        }
    }
}
