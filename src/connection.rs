//! Connection state machine
//!
//! Pure transition core for one channel connection. Every input returns
//! the effects the owner must carry out (open/close the transport, start
//! or stop the heartbeat, arm or cancel the reconnect timer). No I/O and
//! no timers live here, so every transition is testable synchronously.
//!
//! ```text
//! Idle -> Connecting -> Open
//!            ^   |       |
//!            |   v       v
//!          Reconnecting <-
//!
//! any --teardown / terminal close--> Closed
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::close::{classify, CloseClass};
use crate::error::ConnectionError;
use crate::types::{ChannelId, ConnectionSnapshot, ConnectionStatus};

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start a transport handshake to the channel endpoint
    OpenTransport,
    /// Close and release the current transport (or abandon a handshake)
    CloseTransport,
    StartHeartbeat,
    StopHeartbeat,
    /// Arm the reconnect timer, replacing any pending one
    ScheduleReconnect(Duration),
    CancelReconnect,
}

/// Lifecycle of one channel connection
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    channel_id: ChannelId,
    status: ConnectionStatus,
    reconnect_attempt: u32,
    error: Option<ConnectionError>,
    policy: ReconnectPolicy,
}

impl ConnectionStateMachine {
    pub fn new(channel_id: ChannelId, policy: ReconnectPolicy) -> Self {
        Self {
            channel_id,
            status: ConnectionStatus::Idle,
            reconnect_attempt: 0,
            error: None,
            policy,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn error(&self) -> Option<&ConnectionError> {
        self.error.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Open
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            channel_id: self.channel_id,
            status: self.status,
            reconnect_attempt: self.reconnect_attempt,
            error: self.error.clone(),
        }
    }

    /// Idle -> Connecting
    pub fn activate(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Idle {
            debug!("Channel {} already activated ({})", self.channel_id, self.status);
            return Vec::new();
        }
        self.status = ConnectionStatus::Connecting;
        vec![Effect::OpenTransport]
    }

    /// Connecting -> Open
    pub fn on_open(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Connecting {
            // Handshake finished after we stopped caring about it
            debug!(
                "Channel {} opened while {}, releasing transport",
                self.channel_id, self.status
            );
            return vec![Effect::CloseTransport];
        }
        info!("Channel {} connection open", self.channel_id);
        self.status = ConnectionStatus::Open;
        self.reconnect_attempt = 0;
        self.error = None;
        vec![Effect::StartHeartbeat]
    }

    /// Transport could not be constructed at all
    ///
    /// Retried like any transient failure, with the error flag raised.
    pub fn on_connect_failed(&mut self, reason: impl Into<String>) -> Vec<Effect> {
        if self.status != ConnectionStatus::Connecting {
            return Vec::new();
        }
        let reason = reason.into();
        warn!("Channel {} connect failed: {}", self.channel_id, reason);
        self.error = Some(ConnectionError::ConnectFailed(reason));
        self.fail(None)
    }

    /// Transport closed or errored (`code` is `None` for network errors)
    pub fn on_closed(&mut self, code: Option<u16>) -> Vec<Effect> {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Open => self.fail(code),
            _ => {
                debug!(
                    "Channel {} ignoring close {:?} while {}",
                    self.channel_id, code, self.status
                );
                Vec::new()
            }
        }
    }

    /// Reconnecting -> Connecting
    pub fn on_reconnect_timer(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Reconnecting {
            return Vec::new();
        }
        info!(
            "Channel {} reconnecting (attempt {})",
            self.channel_id, self.reconnect_attempt
        );
        self.status = ConnectionStatus::Connecting;
        vec![Effect::OpenTransport]
    }

    /// any -> Closed; idempotent
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.status == ConnectionStatus::Closed {
            return Vec::new();
        }
        info!("Channel {} torn down from {}", self.channel_id, self.status);
        self.status = ConnectionStatus::Closed;
        vec![
            Effect::CancelReconnect,
            Effect::StopHeartbeat,
            Effect::CloseTransport,
        ]
    }

    fn fail(&mut self, code: Option<u16>) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(3);
        if self.status == ConnectionStatus::Open {
            effects.push(Effect::StopHeartbeat);
        }
        effects.push(Effect::CloseTransport);

        match classify(code) {
            CloseClass::Terminal(error) => {
                warn!(
                    "Channel {} closed with terminal code {:?}: {}",
                    self.channel_id, code, error
                );
                self.status = ConnectionStatus::Closed;
                self.error = Some(error);
                effects.push(Effect::CancelReconnect);
            }
            CloseClass::Retryable => {
                let delay = self.policy.delay(self.reconnect_attempt);
                self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
                self.status = ConnectionStatus::Reconnecting;
                info!(
                    "Channel {} disconnected (code {:?}), retry {} in {}ms",
                    self.channel_id,
                    code,
                    self.reconnect_attempt,
                    delay.as_millis()
                );
                effects.push(Effect::ScheduleReconnect(delay));
            }
        }
        effects
    }
}
