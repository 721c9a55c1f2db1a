//! Reconnect policy and the reconnect timer
//!
//! `ReconnectPolicy` is a pure attempt → delay mapping:
//! `min(base * 2^attempt, cap)`. There is no attempt ceiling; retries go
//! on forever at the cap. `ReconnectTimer` is the single pending-reconnect
//! slot owned by a session.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Sleep};

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Default ceiling for any retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential backoff without jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay for attempt 0
    pub base: Duration,
    /// Upper bound for every delay
    pub cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            cap: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with the given base and cap
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the `(attempt + 1)`-th reconnect
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let cap_ms = self.cap.as_millis() as u64;
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
    }
}

/// Pending reconnect, at most one at a time
///
/// Arming replaces any earlier deadline. A disarmed timer never fires.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ReconnectTimer {
    pub fn new() -> Self {
        Self { sleep: None }
    }

    /// Schedule the reconnect `delay` from now
    pub fn arm(&mut self, delay: Duration) {
        self.sleep = Some(Box::pin(sleep(delay)));
    }

    /// Drop the pending reconnect, if any
    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolve when the armed deadline passes; pend forever when disarmed
    ///
    /// Callers must `cancel` after this resolves, or it resolves again.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => future::pending().await,
        }
    }
}
