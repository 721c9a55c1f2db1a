//! Event dispatcher
//!
//! Decodes inbound frames and routes them to registered consumer
//! callbacks. Frames are handled one at a time in arrival order; nothing
//! is buffered or reordered. Malformed and unknown frames are logged and
//! dropped, never surfaced as errors.

use tracing::{debug, trace, warn};

use crate::message::{self, ChatMessage, Envelope, PresenceEvent, TypingEvent};

/// Callback for `new_message`
pub type MessageHandler = Box<dyn FnMut(ChatMessage) + Send>;

/// Callback for `typing`
pub type TypingHandler = Box<dyn FnMut(TypingEvent) + Send>;

/// Callback for `user_joined` / `user_left`
pub type PresenceHandler = Box<dyn FnMut(PresenceEvent) + Send>;

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Routed to a registered callback
    Delivered,
    /// Known type, but no callback registered for it
    Unhandled,
    /// Heartbeat traffic, discarded
    Discarded,
    /// Unrecognized `type`, dropped
    Unknown,
    /// Could not be decoded, dropped
    Malformed,
}

/// Routes decoded frames to consumer callbacks
///
/// Build with the `on_*` methods:
/// ```ignore
/// let dispatcher = EventDispatcher::new()
///     .on_message(|msg| println!("{}: {}", msg.username, msg.content))
///     .on_typing(|ev| println!("{} typing={}", ev.username, ev.is_typing));
/// ```
#[derive(Default)]
pub struct EventDispatcher {
    on_message: Option<MessageHandler>,
    on_typing: Option<TypingHandler>,
    on_user_joined: Option<PresenceHandler>,
    on_user_left: Option<PresenceHandler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(mut self, handler: impl FnMut(ChatMessage) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    pub fn on_typing(mut self, handler: impl FnMut(TypingEvent) + Send + 'static) -> Self {
        self.on_typing = Some(Box::new(handler));
        self
    }

    pub fn on_user_joined(mut self, handler: impl FnMut(PresenceEvent) + Send + 'static) -> Self {
        self.on_user_joined = Some(Box::new(handler));
        self
    }

    pub fn on_user_left(mut self, handler: impl FnMut(PresenceEvent) + Send + 'static) -> Self {
        self.on_user_left = Some(Box::new(handler));
        self
    }

    /// Decode one raw text frame and route it
    pub fn dispatch(&mut self, text: &str) -> Dispatch {
        match message::decode(text) {
            Ok(frame) => self.route(frame),
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                Dispatch::Malformed
            }
        }
    }

    /// Route an already decoded envelope
    pub fn route(&mut self, frame: Envelope) -> Dispatch {
        match frame {
            Envelope::NewMessage { message } => deliver(&mut self.on_message, message, "new_message"),
            Envelope::Typing(event) => deliver(&mut self.on_typing, event, "typing"),
            Envelope::UserJoined(event) => deliver(&mut self.on_user_joined, event, "user_joined"),
            Envelope::UserLeft(event) => deliver(&mut self.on_user_left, event, "user_left"),
            Envelope::Pong => {
                trace!("Pong received");
                Dispatch::Discarded
            }
            Envelope::Ping => {
                debug!("Ignoring inbound ping frame");
                Dispatch::Discarded
            }
            Envelope::Unknown => {
                warn!("Dropping frame with unrecognized type");
                Dispatch::Unknown
            }
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("on_message", &self.on_message.is_some())
            .field("on_typing", &self.on_typing.is_some())
            .field("on_user_joined", &self.on_user_joined.is_some())
            .field("on_user_left", &self.on_user_left.is_some())
            .finish()
    }
}

fn deliver<T>(handler: &mut Option<Box<dyn FnMut(T) + Send>>, event: T, kind: &str) -> Dispatch {
    match handler {
        Some(handler) => {
            handler(event);
            Dispatch::Delivered
        }
        None => {
            trace!("No handler registered for {}", kind);
            Dispatch::Unhandled
        }
    }
}
