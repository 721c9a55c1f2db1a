//! Transport layer
//!
//! A `Connector` opens a channel-scoped transport and hands back a
//! `TransportLink`: an outbound command channel and an inbound event
//! channel. For WebSockets, the link is bridged to a spawned read task
//! (WebSocket -> TransportEvent) and write task (TransportCommand ->
//! WebSocket).

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::{AppError, SendError};

/// Buffer size for both directions of a link
const LINK_BUFFER_SIZE: usize = 32;

/// Something that happened on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame
    Frame(String),
    /// Peer closed; `code` is `None` when no close frame arrived
    Closed { code: Option<u16>, reason: String },
    /// Network or protocol error; the transport is gone
    Failed(String),
}

/// Instruction for the write side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send one text frame
    Send(String),
    /// Close the transport
    Close,
}

/// Open transport owned by exactly one connection
///
/// Dropping the link stops its read task and lets the write task close
/// the socket.
#[derive(Debug)]
pub struct TransportLink {
    commands: mpsc::Sender<TransportCommand>,
    events: mpsc::Receiver<TransportEvent>,
    reader: Option<JoinHandle<()>>,
}

impl TransportLink {
    /// Assemble a link from its two channel ends
    pub fn new(
        commands: mpsc::Sender<TransportCommand>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            commands,
            events,
            reader: None,
        }
    }

    fn with_reader(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Queue one outbound text frame without waiting
    ///
    /// Outbound traffic is best-effort: a full buffer drops the frame.
    pub fn send(&self, text: String) -> Result<(), SendError> {
        match self.commands.try_send(TransportCommand::Send(text)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Outbound buffer full, dropping frame");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SendError::ChannelClosed),
        }
    }

    /// Next inbound event; `None` once the transport side is gone
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Ask the write side to close, then release the link
    pub fn close(self) {
        let _ = self.commands.try_send(TransportCommand::Close);
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Opens transports to a channel endpoint
///
/// A successful connect means the handshake completed.
pub trait Connector: Send + 'static {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<TransportLink, AppError>>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<TransportLink, AppError>> {
        Box::pin(async move {
            debug!("Connecting to {}", url);
            if url.scheme() == "wss" {
                // Err only means a provider is already installed
                let _ = rustls::crypto::ring::default_provider().install_default();
            }
            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
            debug!("WebSocket handshake completed with {}", url);
            Ok(spawn_link(ws_stream))
        })
    }
}

/// Bridge a WebSocket stream to a `TransportLink`
///
/// Spawns the read task and the write task.
pub fn spawn_link<S>(ws_stream: WebSocketStream<S>) -> TransportLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<TransportCommand>(LINK_BUFFER_SIZE);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(LINK_BUFFER_SIZE);

    // Read task (WebSocket -> TransportEvent)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            let event = match msg_result {
                Ok(Message::Text(text)) => TransportEvent::Frame(text.to_string()),
                Ok(Message::Close(frame)) => {
                    debug!("Server sent close frame: {:?}", frame);
                    let _ = event_tx.send(closed_event(frame)).await;
                    return;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    continue;
                }
                Ok(_) => {
                    // Binary, pong or raw frames - ignore
                    continue;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    let _ = event_tx.send(TransportEvent::Failed(e.to_string())).await;
                    return;
                }
            };
            if event_tx.send(event).await.is_err() {
                debug!("Link dropped, ending read task");
                return;
            }
        }
        let _ = event_tx
            .send(TransportEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            })
            .await;
        debug!("Read task ended");
    });

    // Write task (TransportCommand -> WebSocket)
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                TransportCommand::Send(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                TransportCommand::Close => break,
            }
        }
        debug!("Write task ended");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    TransportLink::new(cmd_tx, event_rx).with_reader(read_task)
}

fn closed_event(frame: Option<CloseFrame>) -> TransportEvent {
    match frame {
        Some(frame) => TransportEvent::Closed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => TransportEvent::Closed {
            code: None,
            reason: String::new(),
        },
    }
}

/// In-memory connector for exercising sessions without a network
#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;

    /// Server side of one fake transport
    pub(crate) struct RemoteEnd {
        pub url: Url,
        pub outbound: mpsc::Receiver<TransportCommand>,
        pub events: mpsc::Sender<TransportEvent>,
    }

    /// One connect call, refused or accepted
    pub(crate) struct Attempt {
        pub at: Instant,
        pub remote: Option<RemoteEnd>,
    }

    /// Accepts every connect unless told to refuse the next few
    #[derive(Clone)]
    pub(crate) struct FakeConnector {
        attempts: mpsc::UnboundedSender<Attempt>,
        refusals: Arc<AtomicUsize>,
    }

    impl FakeConnector {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Attempt>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Self {
                attempts: tx,
                refusals: Arc::new(AtomicUsize::new(0)),
            };
            (connector, rx)
        }

        /// Refuse the next `n` connect calls
        pub(crate) fn refuse_next(&self, n: usize) {
            self.refusals.store(n, Ordering::SeqCst);
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self, url: Url) -> BoxFuture<'static, Result<TransportLink, AppError>> {
            let attempts = self.attempts.clone();
            let refusals = Arc::clone(&self.refusals);
            Box::pin(async move {
                let refused = refusals
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if refused {
                    let _ = attempts.send(Attempt {
                        at: Instant::now(),
                        remote: None,
                    });
                    return Err(AppError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "refused",
                    )));
                }

                let (cmd_tx, cmd_rx) = mpsc::channel(LINK_BUFFER_SIZE);
                let (event_tx, event_rx) = mpsc::channel(LINK_BUFFER_SIZE);
                let _ = attempts.send(Attempt {
                    at: Instant::now(),
                    remote: Some(RemoteEnd {
                        url,
                        outbound: cmd_rx,
                        events: event_tx,
                    }),
                });
                Ok(TransportLink::new(cmd_tx, event_rx))
            })
        }
    }
}
