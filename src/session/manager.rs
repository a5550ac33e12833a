use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, interval_at};
use url::Url;

use super::config::SessionConfig;
use super::delegate::{NoopDelegate, SessionDelegate};
use super::error::SessionError;
use crate::Result;
use crate::transport::traits::{
    NORMAL_CLOSURE, Payload, Transport, TransportEvent, TransportFactory,
};
use crate::transport::websocket::WebSocketFactory;

/// Connection phase, mirrored from the current transport.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Transport created, handshake not completed
    Connecting,
    /// Connection established and usable
    Open,
    /// Close requested, closing handshake in flight
    Closing,
    /// Connection is down (cleanly or not)
    Closed,
}

impl ReadyState {
    /// Check if the connection is currently usable.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Commands accepted by the session task.
#[derive(Debug)]
enum Command {
    Open,
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
    Reconnect {
        path: String,
    },
    Send(Payload),
    SendHeartbeat(Option<Payload>),
    StartHeartbeat,
    StopHeartbeat,
}

/// Manages one logical WebSocket connection: bounded automatic reconnect,
/// periodic heartbeat, and delegate notification.
///
/// The session owns its transport exclusively and replaces it on every
/// reconnect. A failure streak is bounded by the configured reconnect
/// ceiling; once exhausted, the next failure or closure is surfaced to the
/// delegate as terminal and the caller decides whether to resume via
/// [`open`](Self::open) or [`reconnect`](Self::reconnect).
///
/// Handles are cheap to clone; all clones drive the same session. The
/// session task winds down when the last handle is dropped, cancelling the
/// heartbeat and detaching the transport.
#[derive(Clone)]
pub struct Session {
    command_tx: mpsc::UnboundedSender<Command>,
    state_tx: watch::Sender<ReadyState>,
    state_rx: watch::Receiver<ReadyState>,
}

impl Session {
    /// Create a session targeting `base_url + "/" + path` with the stock
    /// `tokio-tungstenite` transport, default configuration, and no delegate.
    ///
    /// The transport is created immediately but not opened; call
    /// [`open`](Self::open) to connect.
    pub fn new(base_url: &str, path: &str) -> Result<Self> {
        Self::with_transport(
            base_url,
            path,
            SessionConfig::default(),
            WebSocketFactory,
            Arc::new(NoopDelegate),
        )
    }

    /// Create a session with an explicit configuration, transport factory,
    /// and delegate.
    ///
    /// This is the constructor embedders and tests use; [`new`](Self::new)
    /// is a shorthand for the production stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the computed target URL does not parse.
    pub fn with_transport<F: TransportFactory>(
        base_url: &str,
        path: &str,
        config: SessionConfig,
        factory: F,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Self> {
        let target_url = join_url(base_url, path);
        Url::parse(&target_url)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);

        let base_url = base_url.to_owned();
        let task_state_tx = state_tx.clone();
        tokio::spawn(async move {
            SessionTask::new(
                base_url,
                target_url,
                config,
                factory,
                delegate,
                task_state_tx,
                command_rx,
            )
            .run()
            .await;
        });

        Ok(Self {
            command_tx,
            state_tx,
            state_rx,
        })
    }

    /// Open the connection.
    ///
    /// Acts only when the session is idle: a freshly created (or freshly
    /// replaced) transport in `Connecting`, or a `Closed` session after a
    /// terminal failure streak. In the latter case the reconnect counter is
    /// reset and a new transport is built for the current target URL. A call
    /// in any other state is silently ignored.
    pub fn open(&self) -> Result<()> {
        self.command(Command::Open)
    }

    /// Close the connection at the caller's request.
    ///
    /// `code` defaults to normal closure (1000). The resulting close or error
    /// events are treated as user-intended and never trigger a reconnect.
    /// Ignored when the session is already closed, so a repeated `close()`
    /// never blocks a later [`open`](Self::open) from resuming.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        self.command(Command::Close { code, reason })
    }

    /// Tear down the current connection and connect to
    /// `base_url + "/" + new_path`.
    ///
    /// The old transport is detached first, so none of its late events reach
    /// the delegate. The reconnect counter is reset.
    pub fn reconnect(&self, new_path: &str) -> Result<()> {
        self.command(Command::Reconnect {
            path: new_path.to_owned(),
        })
    }

    /// Send an application payload, fire-and-forget.
    ///
    /// A transport-level send failure (for example while not open) is logged
    /// and swallowed; it is never surfaced to the caller or the delegate.
    /// The returned error only reports a dead session task.
    pub fn send_message<P: Into<Payload>>(&self, payload: P) -> Result<()> {
        self.command(Command::Send(payload.into()))
    }

    /// Send a single heartbeat, with `payload` or the configured default.
    pub fn send_heartbeat(&self, payload: Option<Payload>) -> Result<()> {
        self.command(Command::SendHeartbeat(payload))
    }

    /// Start the periodic heartbeat.
    ///
    /// Always replaces any running timer, so repeated calls leave exactly one
    /// active schedule. A zero configured interval disables the heartbeat and
    /// this call stops any running timer instead.
    pub fn start_auto_heartbeat(&self) -> Result<()> {
        self.command(Command::StartHeartbeat)
    }

    /// Stop the periodic heartbeat. No tick is delivered after the stop is
    /// processed.
    pub fn stop_heartbeat(&self) -> Result<()> {
        self.command(Command::StopHeartbeat)
    }

    /// Get the current connection state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the session's [`ReadyState`]
    /// changes, useful for gating sends or observing reconnects.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ReadyState> {
        self.state_tx.subscribe()
    }

    fn command(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_e| SessionError::Detached)?;
        Ok(())
    }
}

/// The task that exclusively owns the transport, counters, and heartbeat.
///
/// All mutation is serialized here: caller commands, transport events, and
/// heartbeat ticks are multiplexed through one `select!` loop, so no lock is
/// needed and a failure event can never race a caller-initiated reconnect.
struct SessionTask<F: TransportFactory> {
    base_url: String,
    target_url: String,
    config: SessionConfig,
    factory: F,
    delegate: Arc<dyn SessionDelegate>,
    state_tx: watch::Sender<ReadyState>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    /// Events from all transport generations, tagged by generation
    event_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    event_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    transport: F::Transport,
    /// Bumped on every transport replacement; stale-generation events are
    /// dropped before they can touch session state
    generation: u64,
    reconnect_attempts: u32,
    user_initiated_close: bool,
    heartbeat: Option<Interval>,
}

enum Action {
    Command(Option<Command>),
    Event(u64, TransportEvent),
    HeartbeatTick,
}

impl<F: TransportFactory> SessionTask<F> {
    fn new(
        base_url: String,
        target_url: String,
        config: SessionConfig,
        factory: F,
        delegate: Arc<dyn SessionDelegate>,
        state_tx: watch::Sender<ReadyState>,
        command_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (transport, events) = factory.create(&target_url);

        let task = Self {
            base_url,
            target_url,
            config,
            factory,
            delegate,
            state_tx,
            command_rx,
            event_tx,
            event_rx,
            transport,
            generation: 0,
            reconnect_attempts: 0,
            user_initiated_close: false,
            heartbeat: None,
        };
        task.spawn_forwarder(events);
        task
    }

    async fn run(mut self) {
        loop {
            let action = {
                let command_rx = &mut self.command_rx;
                let event_rx = &mut self.event_rx;
                let heartbeat = self.heartbeat.as_mut();

                tokio::select! {
                    command = command_rx.recv() => Action::Command(command),
                    Some((generation, event)) = event_rx.recv() => {
                        Action::Event(generation, event)
                    }
                    () = heartbeat_tick(heartbeat) => Action::HeartbeatTick,
                }
            };

            match action {
                Action::Command(Some(command)) => self.handle_command(command),
                // Last handle dropped: tear down, cancelling the heartbeat
                // and detaching the transport with it.
                Action::Command(None) => break,
                Action::Event(generation, event) => {
                    if generation == self.generation {
                        self.handle_event(event);
                    } else {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(
                            generation,
                            current = self.generation,
                            "Dropping event from superseded transport"
                        );
                    }
                }
                Action::HeartbeatTick => self.send_heartbeat(None),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open => self.open(),
            Command::Close { code, reason } => self.close(code, reason),
            Command::Reconnect { path } => self.reconnect_to(&path),
            Command::Send(payload) => self.send(payload),
            Command::SendHeartbeat(payload) => self.send_heartbeat(payload),
            Command::StartHeartbeat => self.start_heartbeat(),
            Command::StopHeartbeat => self.stop_heartbeat(),
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.set_state(ReadyState::Open);
                self.delegate.on_opened();
                self.reconnect_attempts = 0;
            }
            TransportEvent::Message(payload) => {
                self.delegate.on_message(&payload);
                match &payload {
                    Payload::Text(text) => self.delegate.on_text(text),
                    Payload::Binary(data) => self.delegate.on_binary(data),
                }
            }
            TransportEvent::Ping(_data) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(data = ?_data, "Received PING");
            }
            TransportEvent::Pong(_data) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(data = ?_data, "Received PONG");
            }
            TransportEvent::Failed(error) => {
                self.set_state(ReadyState::Closed);
                if self.exhausted() {
                    self.delegate.on_failed(&error);
                    return;
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %error, attempt = self.reconnect_attempts, "Connection failed, reconnecting");
                self.try_reconnect();
            }
            TransportEvent::Closed {
                code,
                reason,
                was_clean,
            } => {
                self.set_state(ReadyState::Closed);
                if self.user_initiated_close || self.exhausted() {
                    self.delegate.on_closed(code, reason.as_deref(), was_clean);
                    return;
                }
                self.try_reconnect();
            }
        }
    }

    /// Open only from idle: a not-yet-opened transport, or a dead session
    /// resuming after an exhausted failure streak.
    fn open(&mut self) {
        let state = *self.state_tx.borrow();
        match state {
            ReadyState::Connecting => self.transport.open(),
            ReadyState::Closed => {
                self.reconnect_attempts = 0;
                self.user_initiated_close = false;
                self.replace_transport();
                self.transport.open();
            }
            ReadyState::Open | ReadyState::Closing => {}
        }
    }

    fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        // Already down: there is no transport task left to confirm the close,
        // so entering `Closing` here would strand the session there.
        if *self.state_tx.borrow() == ReadyState::Closed {
            return;
        }
        self.user_initiated_close = true;
        self.set_state(ReadyState::Closing);
        self.transport.close(code.unwrap_or(NORMAL_CLOSURE), reason);
    }

    fn reconnect_to(&mut self, path: &str) {
        self.user_initiated_close = true;
        self.transport.close(NORMAL_CLOSURE, None);

        self.target_url = join_url(&self.base_url, path);
        self.reconnect_attempts = 0;
        self.user_initiated_close = false;
        self.replace_transport();
        self.transport.open();
    }

    /// Automatic reconnect for the same target URL, guarded by the ceiling.
    fn try_reconnect(&mut self) {
        if self.exhausted() {
            return;
        }
        self.user_initiated_close = false;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.replace_transport();
        self.transport.open();
    }

    /// Whether the current failure streak has used up its reconnect budget.
    fn exhausted(&self) -> bool {
        if self.config.reconnect.extra_attempt {
            self.reconnect_attempts > self.config.reconnect.max_attempts
        } else {
            self.reconnect_attempts >= self.config.reconnect.max_attempts
        }
    }

    /// Swap in a fresh transport for the current target URL.
    ///
    /// Bumping the generation first means any event the old transport still
    /// produces is dropped in `run()`; dropping the old handle lets its task
    /// wind down on its own.
    fn replace_transport(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        let (transport, events) = self.factory.create(&self.target_url);
        self.spawn_forwarder(events);
        self.transport = transport;
        self.set_state(ReadyState::Connecting);
    }

    fn spawn_forwarder(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let generation = self.generation;
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event_tx.send((generation, event)).is_err() {
                    break;
                }
            }
        });
    }

    fn send(&mut self, payload: Payload) {
        if let Err(e) = self.transport.send(payload) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Dropping outgoing message");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }
    }

    fn send_heartbeat(&mut self, payload: Option<Payload>) {
        if self.config.heartbeat.require_open && !self.state_tx.borrow().is_open() {
            #[cfg(feature = "tracing")]
            tracing::trace!("Skipping heartbeat while not open");
            return;
        }
        let payload = payload.unwrap_or_else(|| self.config.heartbeat.payload.clone());
        self.send(payload);
    }

    fn start_heartbeat(&mut self) {
        // Replace any running timer so there is never more than one
        self.heartbeat = None;

        let period = self.config.heartbeat.interval;
        if period.is_zero() {
            return;
        }
        // First tick fires one full period after start, not immediately
        self.heartbeat = Some(interval_at(Instant::now() + period, period));
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat = None;
    }

    fn set_state(&self, state: ReadyState) {
        _ = self.state_tx.send(state);
    }
}

/// Await the next heartbeat tick, or forever if the heartbeat is stopped.
async fn heartbeat_tick(heartbeat: Option<&mut Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{base_url}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_inserts_single_slash() {
        assert_eq!(
            join_url("wss://example.com", "chat"),
            "wss://example.com/chat"
        );
    }

    #[test]
    fn ready_state_open_check() {
        assert!(ReadyState::Open.is_open());
        assert!(!ReadyState::Connecting.is_open());
        assert!(!ReadyState::Closing.is_open());
        assert!(!ReadyState::Closed.is_open());
    }

    #[tokio::test]
    async fn rejects_unparseable_target_url() {
        let result = Session::new("not a url", "chat");
        assert!(result.is_err());
    }
}
