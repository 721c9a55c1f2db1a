//! Channel Client - Entry Point
//!
//! Joins one chat channel and logs everything that happens on it.
//! Each stdin line counts as a keystroke in the composer; `/join <id>`
//! switches channels. Ctrl-C leaves the view.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_client_v1::{
    ChannelId, ChannelSession, ChannelView, ChatMessage, ClientConfig, EventDispatcher,
    PresenceEvent, TypingEvent, TypingRoster, WsConnector,
};

/// Channel joined when none is given on the command line
const DEFAULT_CHANNEL: u64 = 1;

/// Decoded events forwarded from callbacks to the consumer task
#[derive(Debug)]
enum ViewEvent {
    Message(ChatMessage),
    Typing(TypingEvent),
    Joined(PresenceEvent),
    Left(PresenceEvent),
    /// A different channel is now on view
    Switched(ChannelId),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_client_v1=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_client_v1=info")),
        )
        .init();

    // Get channel from command line or use default
    let channel_id = match env::args().nth(1) {
        Some(arg) => ChannelId(arg.parse()?),
        None => ChannelId(DEFAULT_CHANNEL),
    };

    let config = ClientConfig::from_env()?;
    info!(
        "Connecting as '{}' to {}",
        config.identity.username, config.base_url
    );

    // Consumer task owns the typing roster; callbacks only forward
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(consume_events(event_rx));

    let mut view = ChannelView::new(config, WsConnector);
    let session = view.switch_to(channel_id, || dispatcher(&event_tx)).await;
    watch_status(session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(arg) = line.trim().strip_prefix("/join ") {
                        match arg.trim().parse::<u64>() {
                            Ok(id) => {
                                let channel_id = ChannelId(id);
                                let previous = view.active().map(|s| s.id());
                                let session = view.switch_to(channel_id, || dispatcher(&event_tx)).await;
                                if previous != Some(session.id()) {
                                    let _ = event_tx.send(ViewEvent::Switched(channel_id));
                                    watch_status(session);
                                }
                            }
                            Err(e) => warn!("Invalid channel id '{}': {}", arg, e),
                        }
                    } else if let Some(session) = view.active() {
                        session.keystroke().await;
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    view.unmount().await;
    info!("Channel view closed");

    Ok(())
}

/// Build a dispatcher that forwards every event to the consumer task
fn dispatcher(tx: &mpsc::UnboundedSender<ViewEvent>) -> EventDispatcher {
    let (tx1, tx2, tx3, tx4) = (tx.clone(), tx.clone(), tx.clone(), tx.clone());
    EventDispatcher::new()
        .on_message(move |m| {
            let _ = tx1.send(ViewEvent::Message(m));
        })
        .on_typing(move |t| {
            let _ = tx2.send(ViewEvent::Typing(t));
        })
        .on_user_joined(move |p| {
            let _ = tx3.send(ViewEvent::Joined(p));
        })
        .on_user_left(move |p| {
            let _ = tx4.send(ViewEvent::Left(p));
        })
}

/// Log snapshot changes until the session ends
fn watch_status(session: &ChannelSession) {
    let mut status = session.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            match &snapshot.error {
                Some(error) if error.is_terminal() => warn!(
                    "Channel {} closed for good: {}",
                    snapshot.channel_id, error
                ),
                Some(error) => warn!(
                    "Channel {} {} (attempt {}): {}",
                    snapshot.channel_id, snapshot.status, snapshot.reconnect_attempt, error
                ),
                None => info!(
                    "Channel {} {} (attempt {})",
                    snapshot.channel_id, snapshot.status, snapshot.reconnect_attempt
                ),
            }
        }
    });
}

async fn consume_events(mut rx: mpsc::UnboundedReceiver<ViewEvent>) {
    let mut roster = TypingRoster::new();

    while let Some(event) = rx.recv().await {
        handle_event(&mut roster, event);
    }
}

fn handle_event(roster: &mut TypingRoster, event: ViewEvent) {
    match event {
        ViewEvent::Message(message) => {
            info!("[{}] {}: {}", message.channel_id, message.username, message.content);
        }
        ViewEvent::Typing(event) => {
            if roster.apply(&event) {
                info!("Typing: {:?}", roster.usernames());
            }
        }
        ViewEvent::Joined(event) => {
            info!("{} joined", event.username);
        }
        ViewEvent::Left(event) => {
            roster.user_left(&event);
            info!("{} left", event.username);
        }
        ViewEvent::Switched(channel_id) => {
            // Typing state belongs to the channel that was on view
            roster.clear();
            info!("Now viewing channel {}", channel_id);
        }
    }
}
