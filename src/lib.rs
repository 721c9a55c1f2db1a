//! Channel Connection Lifecycle Client Library
//!
//! Keeps one persistent WebSocket connection per chat channel on view,
//! built with tokio-tungstenite using the Actor pattern for state
//! management.
//!
//! # Features
//! - Channel-scoped WebSocket connections (`{base}/ws/channels/{id}`)
//! - Automatic reconnection with capped exponential backoff (1s .. 30s)
//! - Terminal close codes (authorization denied, forbidden) that stop retries
//! - 30-second keep-alive pings while open
//! - Debounced typing indicators
//! - Ordered, typed callbacks for messages, typing and join/leave
//!
//! # Architecture
//! - `ConnectionStateMachine` is a pure transition core returning effects
//! - Each `ChannelSession` runs one actor task owning the state machine,
//!   the transport and every timer
//! - No locks needed - all state access goes through message passing
//! - `ChannelView` guarantees at most one live session per view
//!
//! # Example
//! ```ignore
//! use chat_client_v1::{ChannelId, ChannelView, ClientConfig, EventDispatcher, WsConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env()?;
//!     let mut view = ChannelView::new(config, WsConnector);
//!
//!     let session = view
//!         .switch_to(ChannelId(1), || {
//!             EventDispatcher::new()
//!                 .on_message(|msg| println!("{}: {}", msg.username, msg.content))
//!         })
//!         .await;
//!     session.keystroke().await;
//!
//!     view.unmount().await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod close;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod presence;
pub mod session;
pub mod transport;
pub mod types;
pub mod typing;
pub mod view;

// Re-export main types for convenience
pub use backoff::ReconnectPolicy;
pub use config::{ClientConfig, Identity};
pub use connection::{ConnectionStateMachine, Effect};
pub use dispatcher::{Dispatch, EventDispatcher};
pub use error::{AppError, ConnectionError, SendError};
pub use message::{ChatMessage, Envelope, PresenceEvent, TypingEvent};
pub use presence::TypingRoster;
pub use session::ChannelSession;
pub use transport::{Connector, TransportEvent, TransportLink, WsConnector};
pub use types::{ChannelId, ConnectionSnapshot, ConnectionStatus, SessionId};
pub use view::ChannelView;
