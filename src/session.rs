//! Channel session actor
//!
//! One tokio task per active channel owns the connection state machine,
//! the transport, and all three timers (reconnect, heartbeat, typing).
//! Everything runs on that task's `select!` loop, so no locks are needed:
//! mutual exclusion is structural. The public `ChannelSession` handle
//! talks to the actor over an `mpsc` command channel and observes it
//! through a `watch` snapshot.

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::backoff::ReconnectTimer;
use crate::config::{ClientConfig, Identity};
use crate::connection::{ConnectionStateMachine, Effect};
use crate::dispatcher::EventDispatcher;
use crate::error::AppError;
use crate::heartbeat::Heartbeat;
use crate::message::{self, Envelope, TypingEvent};
use crate::transport::{Connector, TransportEvent, TransportLink};
use crate::typing::{TypingDebouncer, TypingSignal};
use crate::types::{ChannelId, ConnectionSnapshot, ConnectionStatus, SessionId};

/// Channel buffer size for session commands
const COMMAND_BUFFER_SIZE: usize = 64;

/// Commands sent from handles to the session actor
#[derive(Debug)]
enum SessionCommand {
    /// Local keystroke in the composer
    Keystroke,
    /// Tear the connection down; acknowledged once nothing else will fire
    Teardown { done: oneshot::Sender<()> },
}

/// Handle to one live channel connection
///
/// Cloneable. Dropping every handle tears the session down.
#[derive(Debug, Clone)]
pub struct ChannelSession {
    id: SessionId,
    channel_id: ChannelId,
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<ConnectionSnapshot>,
}

impl ChannelSession {
    /// Activate a channel: spawn its actor and start connecting
    pub fn activate<C: Connector>(
        channel_id: ChannelId,
        config: &ClientConfig,
        connector: C,
        dispatcher: EventDispatcher,
    ) -> Self {
        let id = SessionId::new();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (status_tx, status_rx) = watch::channel(ConnectionSnapshot::idle(channel_id));

        let endpoint = config.endpoint(channel_id);
        let actor = SessionActor {
            id,
            machine: ConnectionStateMachine::new(channel_id, config.reconnect),
            endpoint,
            identity: config.identity.clone(),
            connector,
            dispatcher,
            link: None,
            pending_connect: None,
            reconnect_timer: ReconnectTimer::new(),
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            typing: TypingDebouncer::new(config.typing_idle),
            commands: cmd_rx,
            status: status_tx,
        };
        tokio::spawn(actor.run());

        info!("Session {} activated for channel {}", id, channel_id);

        Self {
            id,
            channel_id,
            commands: cmd_tx,
            status: status_rx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.status.borrow().clone()
    }

    /// Subscribe to snapshot changes
    pub fn status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.status.clone()
    }

    /// Report a local keystroke
    ///
    /// Best-effort: a session that has ended ignores it.
    pub async fn keystroke(&self) {
        if self.commands.send(SessionCommand::Keystroke).await.is_err() {
            trace!("Session {} ended, keystroke ignored", self.id);
        }
    }

    /// Tear the connection down
    ///
    /// Idempotent and safe to call from several handles at once. Once this
    /// returns, no callback, timer or reconnect of this session fires.
    pub async fn teardown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Teardown { done: done_tx })
            .await
            .is_err()
        {
            debug!("Session {} already torn down", self.id);
            return;
        }
        // Err means the actor exited through an earlier teardown
        let _ = done_rx.await;
    }

    /// Whether the actor has exited
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// The actor that owns one channel connection
struct SessionActor<C> {
    id: SessionId,
    machine: ConnectionStateMachine,
    endpoint: Result<Url, AppError>,
    identity: Identity,
    connector: C,
    dispatcher: EventDispatcher,
    /// Open transport, present only after a successful handshake
    link: Option<TransportLink>,
    /// Handshake in flight
    pending_connect: Option<BoxFuture<'static, Result<TransportLink, AppError>>>,
    reconnect_timer: ReconnectTimer,
    heartbeat: Heartbeat,
    typing: TypingDebouncer,
    commands: mpsc::Receiver<SessionCommand>,
    status: watch::Sender<ConnectionSnapshot>,
}

impl<C: Connector> SessionActor<C> {
    /// Run the session event loop until teardown
    async fn run(mut self) {
        debug!("Session {} started", self.id);

        let effects = self.machine.activate();
        self.apply(effects);

        loop {
            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Keystroke) => self.handle_keystroke(),
                    Some(SessionCommand::Teardown { done }) => {
                        self.teardown();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        debug!("Session {} lost all handles", self.id);
                        self.teardown();
                        break;
                    }
                },
                result = next_connect(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    self.handle_connect_result(result);
                }
                event = next_event(&mut self.link) => {
                    self.handle_transport_event(event);
                }
                _ = self.reconnect_timer.fired() => {
                    self.reconnect_timer.cancel();
                    let effects = self.machine.on_reconnect_timer();
                    self.apply(effects);
                }
                _ = self.heartbeat.tick() => {
                    trace!("Session {} heartbeat", self.id);
                    self.send_frame(&Envelope::Ping);
                }
                _ = self.typing.expired() => {
                    if let Some(signal) = self.typing.expire(Instant::now()) {
                        self.send_typing(signal);
                    }
                }
            }
        }

        // Acknowledge teardowns that raced the one we handled
        self.commands.close();
        while let Ok(cmd) = self.commands.try_recv() {
            if let SessionCommand::Teardown { done } = cmd {
                let _ = done.send(());
            }
        }

        debug!("Session {} stopped", self.id);
    }

    fn handle_keystroke(&mut self) {
        // A burst only starts on an open connection
        if !self.machine.is_open() {
            trace!("Session {} not open, ignoring keystroke", self.id);
            return;
        }
        if let Some(signal) = self.typing.keystroke(Instant::now()) {
            self.send_typing(signal);
        }
    }

    fn handle_connect_result(&mut self, result: Result<TransportLink, AppError>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                let effects = self.machine.on_open();
                self.apply(effects);
            }
            Err(e) => {
                let effects = self.machine.on_connect_failed(e.to_string());
                self.apply(effects);
            }
        }
    }

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(text)) => {
                let outcome = self.dispatcher.dispatch(&text);
                trace!("Session {} frame: {:?}", self.id, outcome);
            }
            Some(TransportEvent::Closed { code, reason }) => {
                info!(
                    "Session {} transport closed (code {:?}, reason '{}')",
                    self.id, code, reason
                );
                let effects = self.machine.on_closed(code);
                self.apply(effects);
            }
            Some(TransportEvent::Failed(e)) => {
                warn!("Session {} transport error: {}", self.id, e);
                let effects = self.machine.on_closed(None);
                self.apply(effects);
            }
            None => {
                debug!("Session {} transport vanished", self.id);
                let effects = self.machine.on_closed(None);
                self.apply(effects);
            }
        }
    }

    fn teardown(&mut self) {
        let effects = self.machine.teardown();
        self.apply(effects);
    }

    /// Carry out transition effects, then publish the new snapshot
    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenTransport => self.open_transport(),
                Effect::CloseTransport => {
                    self.pending_connect = None;
                    if let Some(link) = self.link.take() {
                        link.close();
                    }
                }
                Effect::StartHeartbeat => self.heartbeat.start(),
                Effect::StopHeartbeat => self.heartbeat.stop(),
                Effect::ScheduleReconnect(delay) => self.reconnect_timer.arm(delay),
                Effect::CancelReconnect => self.reconnect_timer.cancel(),
            }
        }
        // A burst never outlives the link it was announced on
        if !self.machine.is_open() {
            self.typing.reset();
        }
        self.status.send_replace(self.machine.snapshot());
    }

    fn open_transport(&mut self) {
        match &self.endpoint {
            Ok(url) => {
                debug!("Session {} opening {}", self.id, url);
                self.pending_connect = Some(self.connector.connect(url.clone()));
            }
            Err(e) => {
                // Counts as a construction failure and goes through backoff
                let reason = e.to_string();
                let effects = self.machine.on_connect_failed(reason);
                self.apply(effects);
            }
        }
    }

    fn send_typing(&mut self, signal: TypingSignal) {
        let frame = Envelope::Typing(TypingEvent {
            user_id: self.identity.user_id.clone(),
            username: self.identity.username.clone(),
            is_typing: signal.is_typing(),
        });
        self.send_frame(&frame);
    }

    /// Send one frame if the connection is open; otherwise drop it silently
    fn send_frame(&mut self, frame: &Envelope) {
        if self.machine.status() != ConnectionStatus::Open {
            trace!("Session {} not open, dropping {}", self.id, frame.kind());
            return;
        }
        let Some(link) = self.link.as_ref() else {
            return;
        };
        match message::encode(frame) {
            Ok(text) => {
                if link.send(text).is_err() {
                    debug!("Session {} link closed, dropping {}", self.id, frame.kind());
                }
            }
            Err(e) => warn!("Session {} failed to encode {}: {}", self.id, frame.kind(), e),
        }
    }
}

/// Await the handshake in flight; pend forever when there is none
async fn next_connect(
    pending: &mut Option<BoxFuture<'static, Result<TransportLink, AppError>>>,
) -> Result<TransportLink, AppError> {
    match pending.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Await the next transport event; pend forever without a transport
async fn next_event(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link.as_mut() {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::close::CLOSE_UNAUTHORIZED;
    use crate::error::ConnectionError;
    use crate::transport::fake::{Attempt, FakeConnector, RemoteEnd};
    use crate::transport::TransportCommand;

    fn config() -> ClientConfig {
        ClientConfig::new("ws://chat.test", Identity::new("me", "Me")).unwrap()
    }

    fn start(
        dispatcher: EventDispatcher,
    ) -> (ChannelSession, FakeConnector, UnboundedReceiver<Attempt>) {
        let (connector, attempts) = FakeConnector::new();
        let session = ChannelSession::activate(ChannelId(7), &config(), connector.clone(), dispatcher);
        (session, connector, attempts)
    }

    async fn accepted(attempts: &mut UnboundedReceiver<Attempt>) -> (Instant, RemoteEnd) {
        let attempt = attempts.recv().await.unwrap();
        (attempt.at, attempt.remote.expect("connect was refused"))
    }

    async fn wait_status(session: &ChannelSession, status: ConnectionStatus) -> ConnectionSnapshot {
        let mut rx = session.status();
        let snapshot = rx.wait_for(|s| s.status == status).await.unwrap().clone();
        snapshot
    }

    async fn close(remote: &RemoteEnd, code: Option<u16>) {
        remote
            .events
            .send(TransportEvent::Closed {
                code,
                reason: String::new(),
            })
            .await
            .unwrap();
    }

    fn assert_elapsed(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(1),
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    fn typing_frame(is_typing: bool) -> TransportCommand {
        TransportCommand::Send(
            message::encode(&Envelope::Typing(TypingEvent {
                user_id: "me".to_string(),
                username: "Me".to_string(),
                is_typing,
            }))
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_to_channel_endpoint() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, remote) = accepted(&mut attempts).await;

        assert_eq!(remote.url.as_str(), "ws://chat.test/ws/channels/7");
        let snapshot = wait_status(&session, ConnectionStatus::Open).await;
        assert_eq!(snapshot.reconnect_attempt, 0);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_back_off() {
        let (session, connector, mut attempts) = start(EventDispatcher::new());
        let (_, remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        connector.refuse_next(2);
        let closed_at = Instant::now();
        close(&remote, Some(1006)).await;

        let first = attempts.recv().await.unwrap();
        let second = attempts.recv().await.unwrap();
        let (third_at, _remote) = accepted(&mut attempts).await;

        assert!(first.remote.is_none());
        assert!(second.remote.is_none());
        assert_elapsed(first.at - closed_at, Duration::from_millis(1_000));
        assert_elapsed(second.at - first.at, Duration::from_millis(2_000));
        assert_elapsed(third_at - second.at, Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_resets_backoff() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        let closed_at = Instant::now();
        close(&remote, None).await;
        let (reopened_at, remote) = accepted(&mut attempts).await;
        assert_elapsed(reopened_at - closed_at, Duration::from_millis(1_000));
        wait_status(&session, ConnectionStatus::Open).await;

        let closed_at = Instant::now();
        close(&remote, None).await;
        let (reopened_at, _remote) = accepted(&mut attempts).await;
        assert_elapsed(reopened_at - closed_at, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_close_never_reconnects() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        close(&remote, Some(CLOSE_UNAUTHORIZED)).await;
        let snapshot = wait_status(&session, ConnectionStatus::Closed).await;
        assert_eq!(snapshot.error, Some(ConnectionError::Unauthorized));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_sets_error_flag() {
        let (connector, mut attempts) = FakeConnector::new();
        connector.refuse_next(1);
        let session =
            ChannelSession::activate(ChannelId(7), &config(), connector, EventDispatcher::new());

        let refused = attempts.recv().await.unwrap();
        assert!(refused.remote.is_none());
        let snapshot = wait_status(&session, ConnectionStatus::Reconnecting).await;
        assert!(matches!(snapshot.error, Some(ConnectionError::ConnectFailed(_))));

        let (_, _remote) = accepted(&mut attempts).await;
        let snapshot = wait_status(&session, ConnectionStatus::Open).await;
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_every_thirty_seconds() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (opened_at, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        let ping = TransportCommand::Send(r#"{"type":"ping"}"#.to_string());
        assert_eq!(remote.outbound.recv().await, Some(ping.clone()));
        assert_elapsed(opened_at.elapsed(), Duration::from_secs(30));
        assert_eq!(remote.outbound.recv().await, Some(ping));
        assert_elapsed(opened_at.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_is_discarded_and_connection_stays_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new().on_message(move |m| {
            let _ = tx.send(m.id);
        });
        let (session, _connector, mut attempts) = start(dispatcher);
        let (_, remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        for frame in [r#"{"type":"pong"}"#, r#"{"type":"unknown_frobnicate"}"#, "garbage"] {
            remote
                .events
                .send(TransportEvent::Frame(frame.to_string()))
                .await
                .unwrap();
        }
        remote
            .events
            .send(TransportEvent::Frame(
                r#"{"type":"new_message","message":{"id":5,"channel_id":7,"user_id":"u","username":"U","content":"x"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();

        // Only the real message reaches a callback
        assert_eq!(rx.recv().await, Some(5));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.snapshot().status, ConnectionStatus::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_sends_one_pair() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        session.keystroke().await;
        assert_eq!(remote.outbound.recv().await, Some(typing_frame(true)));

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            session.keystroke().await;
        }
        let last_keystroke = Instant::now();

        assert_eq!(remote.outbound.recv().await, Some(typing_frame(false)));
        assert_elapsed(last_keystroke.elapsed(), Duration::from_millis(2_000));
        assert!(remote.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_dropped_while_not_open() {
        let (connector, mut attempts) = FakeConnector::new();
        connector.refuse_next(1);
        let session =
            ChannelSession::activate(ChannelId(7), &config(), connector, EventDispatcher::new());
        attempts.recv().await.unwrap();
        wait_status(&session, ConnectionStatus::Reconnecting).await;

        // No transport and no error
        session.keystroke().await;

        let (_, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;
        assert!(remote.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_restarts_on_new_link() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        session.keystroke().await;
        assert_eq!(remote.outbound.recv().await, Some(typing_frame(true)));

        close(&remote, None).await;
        let (_, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        session.keystroke().await;
        assert_eq!(remote.outbound.recv().await, Some(typing_frame(true)));
        assert_eq!(remote.outbound.recv().await, Some(typing_frame(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_while_reconnecting_starts_nothing() {
        let (connector, mut attempts) = FakeConnector::new();
        connector.refuse_next(1);
        let session =
            ChannelSession::activate(ChannelId(7), &config(), connector, EventDispatcher::new());
        attempts.recv().await.unwrap();
        wait_status(&session, ConnectionStatus::Reconnecting).await;
        session.keystroke().await;

        let (_, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;
        session.keystroke().await;

        assert_eq!(remote.outbound.recv().await, Some(typing_frame(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_endpoint_retries_as_connect_failure() {
        let mut config = config();
        config.base_url = Url::parse("mailto:chat@example.com").unwrap();
        let (connector, mut attempts) = FakeConnector::new();
        let session =
            ChannelSession::activate(ChannelId(7), &config, connector, EventDispatcher::new());

        let snapshot = wait_status(&session, ConnectionStatus::Reconnecting).await;
        assert_eq!(snapshot.reconnect_attempt, 1);
        assert!(matches!(snapshot.error, Some(ConnectionError::ConnectFailed(_))));

        // Second failure after the first backoff step
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert_eq!(session.snapshot().reconnect_attempt, 2);
        assert_eq!(session.snapshot().status, ConnectionStatus::Reconnecting);
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_reconnect_and_callbacks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new().on_user_joined(move |p| {
            let _ = tx.send(p.user_id);
        });
        let (session, _connector, mut attempts) = start(dispatcher);
        let (_, remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        close(&remote, None).await;
        wait_status(&session, ConnectionStatus::Reconnecting).await;

        session.teardown().await;
        assert_eq!(session.snapshot().status, ConnectionStatus::Closed);

        // Reconnect would have fired after 1s
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(attempts.try_recv().is_err());

        // Late frames on the old transport go nowhere
        let late = TransportEvent::Frame(
            r#"{"type":"user_joined","user_id":"u9","username":"Late"}"#.to_string(),
        );
        let _ = remote.events.send(late).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_heartbeat_and_closes_transport() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, mut remote) = accepted(&mut attempts).await;
        wait_status(&session, ConnectionStatus::Open).await;

        session.teardown().await;
        assert_eq!(remote.outbound.recv().await, Some(TransportCommand::Close));
        // Link released: no pings ever follow
        assert_eq!(remote.outbound.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_idempotent() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        accepted(&mut attempts).await;

        let other = session.clone();
        tokio::join!(session.teardown(), other.teardown());
        session.teardown().await;

        assert!(session.is_closed());
        assert_eq!(session.snapshot().status, ConnectionStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_tears_down() {
        let (session, _connector, mut attempts) = start(EventDispatcher::new());
        let (_, mut remote) = accepted(&mut attempts).await;
        let mut status = session.status();
        status.wait_for(|s| s.status == ConnectionStatus::Open).await.unwrap();

        drop(session);
        status
            .wait_for(|s| s.status == ConnectionStatus::Closed)
            .await
            .unwrap();
        assert_eq!(remote.outbound.recv().await, Some(TransportCommand::Close));
    }
}
