use crate::gateway::GatewayError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Where pauses go. Feedback and "thinking" delays as well as retry backoff
/// are routed through this so tests can run them at zero cost.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Returns immediately
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

/// Records requested pauses without sleeping
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .map(|pauses| pauses.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push(duration);
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_backoff_ms: u64, multiplier: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            multiplier,
        }
    }

    /// A single try
    pub const fn none() -> Self {
        Self::new(1, 0, 1)
    }

    /// Pause before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Run `op` until it succeeds or the attempts are used up; returns the last error
    pub fn run<T>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut op: impl FnMut() -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let attempts = self.max_attempts.max(1);
        let mut retry = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if retry + 1 < attempts => {
                    retry += 1;
                    let pause = self.backoff(retry);
                    warn!(
                        "{label} failed ({err}), retry {retry}/{} in {}ms",
                        attempts - 1,
                        pause.as_millis()
                    );
                    sleeper.sleep(pause);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
