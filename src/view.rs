//! Channel view
//!
//! Holds the one live session for whatever channel is on screen.
//! Switching channels tears the previous session down completely before
//! the next one is activated, so a stale reconnect can never fire against
//! a channel the user has left.

use tracing::info;

use crate::config::ClientConfig;
use crate::dispatcher::EventDispatcher;
use crate::session::ChannelSession;
use crate::transport::Connector;
use crate::types::{ChannelId, ConnectionStatus};

/// At most one live channel session
pub struct ChannelView<C> {
    config: ClientConfig,
    connector: C,
    active: Option<ChannelSession>,
}

impl<C: Connector + Clone> ChannelView<C> {
    pub fn new(config: ClientConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            active: None,
        }
    }

    /// Session for the channel on view, if any
    pub fn active(&self) -> Option<&ChannelSession> {
        self.active.as_ref()
    }

    /// Show `channel_id`, replacing whatever was on view
    ///
    /// Switching to the channel already on view keeps its session (and its
    /// callbacks) unless that session has closed. `dispatcher` is only
    /// called when a new session is activated.
    pub async fn switch_to<F>(&mut self, channel_id: ChannelId, dispatcher: F) -> &ChannelSession
    where
        F: FnOnce() -> EventDispatcher,
    {
        let session = match self.active.take() {
            Some(current)
                if current.channel_id() == channel_id
                    && current.snapshot().status != ConnectionStatus::Closed =>
            {
                current
            }
            previous => {
                if let Some(previous) = previous {
                    info!(
                        "Switching from channel {} to {}",
                        previous.channel_id(),
                        channel_id
                    );
                    previous.teardown().await;
                }
                ChannelSession::activate(
                    channel_id,
                    &self.config,
                    self.connector.clone(),
                    dispatcher(),
                )
            }
        };
        self.active.insert(session)
    }

    /// Leave the view entirely; idempotent
    pub async fn unmount(&mut self) {
        if let Some(session) = self.active.take() {
            session.teardown().await;
        }
    }
}
