//! Client configuration
//!
//! Base URL and local identity come from the environment; timing defaults
//! come from the component modules.

use std::env;
use std::time::Duration;

use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::error::AppError;
use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::typing::DEFAULT_TYPING_IDLE;
use crate::types::ChannelId;

/// Environment variable holding the WebSocket base URL
pub const BASE_URL_ENV: &str = "CHAT_WS_BASE_URL";

/// Environment variables holding the local identity
pub const USER_ID_ENV: &str = "CHAT_USER_ID";
pub const USERNAME_ENV: &str = "CHAT_USERNAME";

/// Default base URL
const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8080";

/// Local user, stamped on outbound typing frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new("anonymous", "Anonymous")
    }
}

/// Everything a channel session needs besides its channel id
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket base; channel endpoints hang off it
    pub base_url: Url,
    pub identity: Identity,
    pub heartbeat_interval: Duration,
    pub typing_idle: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Build a config for the given base URL with default timings
    ///
    /// `http`/`https` bases are mapped to `ws`/`wss`.
    pub fn new(base_url: &str, identity: Identity) -> Result<Self, AppError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            identity,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            typing_idle: DEFAULT_TYPING_IDLE,
            reconnect: ReconnectPolicy::default(),
        })
    }

    /// Read `CHAT_WS_BASE_URL`, `CHAT_USER_ID` and `CHAT_USERNAME`
    ///
    /// Missing variables fall back to defaults; a present but invalid base
    /// URL is an error.
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let defaults = Identity::default();
        let identity = Identity {
            user_id: env::var(USER_ID_ENV).unwrap_or(defaults.user_id),
            username: env::var(USERNAME_ENV).unwrap_or(defaults.username),
        };
        Self::new(&base_url, identity)
    }

    /// Channel-scoped endpoint: `{base}/ws/channels/{channel_id}`
    pub fn endpoint(&self, channel_id: ChannelId) -> Result<Url, AppError> {
        let id = channel_id.to_string();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::CannotBeABase(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["ws", "channels", id.as_str()]);
        Ok(url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(raw)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(AppError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|_| AppError::UnsupportedScheme(scheme.to_string()))?;
    }
    Ok(url)
}
