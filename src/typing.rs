//! Typing debouncer
//!
//! Turns a stream of local keystrokes into at most one "typing started"
//! and one "typing stopped" per burst. A burst ends after the idle window
//! passes with no further keystroke.

use std::future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Default inactivity window before "typing stopped"
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(2);

/// Signal the debouncer asks the connection to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Started,
    Stopped,
}

impl TypingSignal {
    pub fn is_typing(self) -> bool {
        matches!(self, TypingSignal::Started)
    }
}

/// Keystroke debouncer for one composer
#[derive(Debug)]
pub struct TypingDebouncer {
    idle: Duration,
    active: bool,
    deadline: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            active: false,
            deadline: None,
        }
    }

    /// Record a keystroke at `now`
    ///
    /// Returns `Started` only for the first keystroke of a burst.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        self.deadline = Some(now + self.idle);
        if self.active {
            return None;
        }
        self.active = true;
        Some(TypingSignal::Started)
    }

    /// Close the burst if its idle deadline has passed by `now`
    pub fn expire(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.active = false;
                Some(TypingSignal::Stopped)
            }
            _ => None,
        }
    }

    /// Forget the current burst without emitting anything
    pub fn reset(&mut self) {
        self.active = false;
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolve when the idle deadline passes; pend forever with no burst
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}
