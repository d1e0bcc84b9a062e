//! Async client for the four-in-a-row game protocol.
//!
//! [`ConnectFourClient`] is a thin handle that communicates with a background
//! session loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<ConnectFourEvent>`])
//! returned from [`ConnectFourClient::start`].
//!
//! The session loop serializes every input — inbound server messages,
//! countdown ticks, outbound intents, shutdown — onto one `tokio::select!`
//! queue and feeds them to the [`SessionStateMachine`] in arrival order, so
//! the machine is mutated from exactly one place and never races the clock.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:8080/ws").await?;
//! let config = ConnectFourConfig::new("alice");
//! let (client, mut events) = ConnectFourClient::start(transport, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ConnectFourEvent::BoardUpdated { .. } => {
//!             if client.request_move(3).is_ok() {
//!                 client.play(3)?;
//!             }
//!         }
//!         ConnectFourEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::clock::{ClockEvent, TokioClock};
use crate::error::{ConnectFourError, Result};
use crate::event::ConnectFourEvent;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{MoveDenied, SessionStateMachine, SessionView, DEFAULT_WAIT_SECONDS};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ConnectFourClient`] connection.
///
/// Must be supplied to [`ConnectFourClient::start`]. The only required field
/// is `username`; all others have sensible defaults.
///
/// # Example
///
/// ```
/// use connect_four_client::client::ConnectFourConfig;
///
/// let config = ConnectFourConfig::new("alice");
/// assert_eq!(config.username, "alice");
/// ```
///
/// # Tuning
///
/// ```
/// use connect_four_client::client::ConnectFourConfig;
/// use std::time::Duration;
///
/// let config = ConnectFourConfig::new("alice")
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectFourConfig {
    /// Display name sent in the join intent.
    pub username: String,
    /// Length of the opponent-waiting window in seconds.
    ///
    /// Matches the server's bot-fallback window. Defaults to **10**.
    pub wait_seconds: u32,
    /// Session state carried over from a dropped connection, enabling the
    /// server's `reconnected` message to restore an in-flight game.
    pub resume_from: Option<SessionView>,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the session
    /// loop. The `Disconnected` event is always delivered regardless of
    /// capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`ConnectFourClient::shutdown`] is called, the background session
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the session loop
    /// immediately without waiting for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl ConnectFourConfig {
    /// Create a new configuration with the given username and default values.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            wait_seconds: DEFAULT_WAIT_SECONDS,
            resume_from: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the length of the opponent-waiting window in seconds.
    #[must_use]
    pub fn with_wait_seconds(mut self, wait_seconds: u32) -> Self {
        self.wait_seconds = wait_seconds;
        self
    }

    /// Carry the state of a previous session into this connection so a
    /// server `reconnected` can restore the game (take the view from the
    /// old client after its `Disconnected` event).
    #[must_use]
    pub fn with_resume(mut self, prior: SessionView) -> Self {
        self.resume_from = Some(prior);
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the session loop
    /// immediately without waiting for graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the session loop.
///
/// The loop is the single writer; the handle (and any presentation layer)
/// reads snapshots at will.
struct SharedState {
    connected: AtomicBool,
    view: StdMutex<SessionView>,
}

impl SharedState {
    fn new(view: SessionView) -> Self {
        Self {
            connected: AtomicBool::new(true),
            view: StdMutex::new(view),
        }
    }

    fn view(&self) -> SessionView {
        // A poisoned lock means a panic while publishing; fall back to the
        // inner value either way since writes are whole-view replacements.
        match self.view.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, view: SessionView) {
        match self.view.lock() {
            Ok(mut guard) => *guard = view,
            Err(poisoned) => *poisoned.into_inner() = view,
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the four-in-a-row game protocol.
///
/// Created via [`ConnectFourClient::start`], which spawns a background
/// session loop and returns this handle together with an event receiver.
///
/// Outbound intents are queued to the session loop over an unbounded channel
/// and return immediately (no round-trip await). State reads
/// ([`view`](Self::view), [`request_move`](Self::request_move)) take a cheap
/// snapshot and are safe to call from any thread at any time.
pub struct ConnectFourClient {
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the session loop.
    state: Arc<SharedState>,
    /// Handle to the background session loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the session loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl ConnectFourClient {
    /// Start the session loop and return a handle plus event receiver.
    ///
    /// The loop immediately queues a [`Join`](ClientMessage::Join) intent
    /// carrying the configured username as the very first outgoing message.
    ///
    /// # Arguments
    ///
    /// * `transport` — A connected [`Transport`] implementation.
    /// * `config` — Client configuration including the username.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The event receiver
    /// yields [`ConnectFourEvent`]s until the transport closes or the client
    /// shuts down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: ConnectFourConfig,
    ) -> (Self, mpsc::Receiver<ConnectFourEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ConnectFourEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (clock_tx, clock_rx) = mpsc::unbounded_channel::<ClockEvent>();

        let clock = TokioClock::new(clock_tx);
        let machine = match &config.resume_from {
            Some(prior) => SessionStateMachine::resume(clock, config.wait_seconds, prior),
            None => SessionStateMachine::new(clock, config.wait_seconds),
        };

        let state = Arc::new(SharedState::new(machine.view()));
        let loop_state = Arc::clone(&state);

        // Queue the join intent so the session loop picks it up as the very
        // first outgoing message.
        // This cannot fail because we just created the channel.
        let _ = cmd_tx.send(ClientMessage::Join {
            username: config.username,
        });

        let task = tokio::spawn(session_loop(
            transport,
            machine,
            cmd_rx,
            clock_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// The move guard: check whether dropping a disc into `column` would be
    /// permitted right now, without sending anything.
    ///
    /// Presentation layers should disable input whenever this denies.
    ///
    /// # Errors
    ///
    /// Returns the first [`MoveDenied`] reason that applies.
    pub fn request_move(&self, column: usize) -> std::result::Result<(), MoveDenied> {
        self.state.view().request_move(column)
    }

    /// Submit a move for the local player.
    ///
    /// The move is transmitted only when the guard allows it; the board does
    /// not change until the server echoes the authoritative result back as a
    /// `board` event.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectFourError::MoveNotAllowed`] when the guard denies
    /// (nothing is transmitted), or [`ConnectFourError::NotConnected`] if the
    /// transport has closed.
    pub fn play(&self, column: usize) -> Result<()> {
        let view = self.state.view();
        if let Err(denied) = view.request_move(column) {
            warn!(column, %denied, "refusing to send a denied move");
            return Err(ConnectFourError::MoveNotAllowed(denied));
        }
        // The guard just passed, so an assignment exists.
        let player = view.local_player.ok_or(ConnectFourError::NotConnected)?;
        self.send(ClientMessage::Move {
            column,
            player: player.number(),
        })
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the session loop exits.
    pub async fn shutdown(&mut self) {
        debug!("ConnectFourClient: shutdown requested");

        // Signal the session loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the session loop with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// A snapshot of the current session state for presentation.
    pub fn view(&self) -> SessionView {
        self.state.view()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a `ClientMessage` to the session loop.
    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(ConnectFourError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| ConnectFourError::NotConnected)
    }
}

impl std::fmt::Debug for ConnectFourClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectFourClient")
            .field("connected", &self.is_connected())
            .field("phase", &self.state.view().phase)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ConnectFourClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the session loop future to be dropped immediately.  The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background session loop that serializes every input onto one queue.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
async fn session_loop(
    mut transport: impl Transport,
    mut machine: SessionStateMachine<TokioClock>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut clock_rx: mpsc::UnboundedReceiver<ClockEvent>,
    event_tx: mpsc::Sender<ConnectFourEvent>,
    state: Arc<SharedState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session loop started");

    // The synthetic connection-opened transition, before any traffic.
    if let Some(event) = machine.connection_opened() {
        state.publish(machine.view());
        emit_event(&event_tx, event).await;
    }

    loop {
        tokio::select! {
            // Branch 1: outgoing intent from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match msg.encode() {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    finish_disconnected(
                                        &event_tx,
                                        &state,
                                        &mut machine,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize client message: {e}");
                                // Serialization errors are programming bugs; don't kill the loop.
                            }
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        let _ = transport.close().await;
                        finish_disconnected(&event_tx, &state, &mut machine, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                finish_disconnected(&event_tx, &state, &mut machine, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: countdown tick from the waiting-window clock
            tick = clock_rx.recv() => {
                // The sender lives inside the machine's clock, so the channel
                // cannot close while this loop runs.
                if let Some(tick) = tick {
                    if let Some(event) = machine.handle_clock(tick) {
                        state.publish(machine.view());
                        emit_event(&event_tx, event).await;
                    }
                }
            }

            // Branch 4: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match ServerMessage::decode(&text) {
                            Ok(msg) => {
                                if let Some(event) = machine.handle_message(msg) {
                                    // Publish before emitting so a consumer
                                    // reacting to the event reads the new view.
                                    state.publish(machine.view());
                                    emit_event(&event_tx, event).await;
                                }
                            }
                            Err(e) => {
                                warn!("dropping malformed message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        finish_disconnected(
                            &event_tx,
                            &state,
                            &mut machine,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        finish_disconnected(&event_tx, &state, &mut machine, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("session loop exited");
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the session loop.
async fn emit_event(event_tx: &mpsc::Sender<ConnectFourEvent>, event: ConnectFourEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Apply the transport-closed transition and emit the final
/// [`Disconnected`](ConnectFourEvent::Disconnected) event.
///
/// Uses `send().await` (blocking) instead of `try_send` because
/// `Disconnected` is always the last event on the channel and must never be
/// silently dropped.
async fn finish_disconnected(
    event_tx: &mpsc::Sender<ConnectFourEvent>,
    state: &SharedState,
    machine: &mut SessionStateMachine<TokioClock>,
    reason: Option<String>,
) {
    machine.transport_closed();
    state.connected.store(false, Ordering::Release);
    state.publish(machine.view());
    let event = ConnectFourEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::board::{Board, Player};
    use crate::session::Phase;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, ConnectFourError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, ConnectFourError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ConnectFourError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ConnectFourError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages have been delivered — hang forever
                // so the session loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ConnectFourError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn connected_json(player: u8) -> String {
        format!(r#"{{"type":"connected","player":{player}}}"#)
    }

    fn matched_json(player: u8) -> String {
        format!(r#"{{"type":"matched","player":{player}}}"#)
    }

    fn board_json(current_player: u8) -> String {
        let grid = vec![vec![0u8; 7]; 6];
        serde_json::to_string(&ServerMessage::Board {
            board: grid,
            current_player,
        })
        .unwrap()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_join_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json(1)))]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        // First event should be Connected.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::Connected));

        // Wait for the assignment event.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::PlayerAssigned { .. }));

        // The first sent message should be the join intent.
        {
            let messages = sent.lock().unwrap();
            assert!(!messages.is_empty());
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            assert_eq!(
                first,
                ClientMessage::Join {
                    username: "alice".into()
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn view_updates_on_assignment() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json(2)))]);

        let config = ConnectFourConfig::new("bob");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned

        let view = client.view();
        assert_eq!(view.phase, Phase::WaitingForOpponent);
        assert_eq!(view.local_player, Some(Player::Two));
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn play_sends_move_with_local_player_number() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(1))),
            Some(Ok(matched_json(1))),
        ]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let _ = events.recv().await; // Matched

        // Player 1 on an empty board: it is our turn.
        client.play(3).unwrap();

        // Give the loop a moment to process.
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(last, ClientMessage::Move { column: 3, player: 1 });
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn denied_move_is_never_transmitted() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(2))),
            Some(Ok(matched_json(2))),
        ]);

        let config = ConnectFourConfig::new("bob");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let _ = events.recv().await; // Matched

        // Player 2 on a fresh board: player 1 moves first.
        let err = client.play(3).unwrap_err();
        assert!(matches!(
            err,
            ConnectFourError::MoveNotAllowed(MoveDenied::NotYourTurn)
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            // Only the join intent went out.
            assert_eq!(messages.len(), 1);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn turn_flip_gates_moves_through_the_full_loop() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(1))),
            Some(Ok(matched_json(1))),
            Some(Ok(board_json(2))),
        ]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let _ = events.recv().await; // Matched
        let _ = events.recv().await; // BoardUpdated with turn = 2
        assert_eq!(client.request_move(0), Err(MoveDenied::NotYourTurn));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(1))),
            // Explicit None signals clean transport close.
            None,
        ]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let event = events.recv().await.unwrap(); // Disconnected
        assert!(matches!(event, ConnectFourEvent::Disconnected { .. }));

        assert!(!client.is_connected());
        let view = client.view();
        assert_eq!(view.phase, Phase::Disconnected);
        assert_eq!(view.local_player, None);
        assert_eq!(view.last_assignment, Some(Player::One));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn resumed_session_restores_the_game_on_reconnected() {
        let mut grid = vec![vec![0u8; 7]; 6];
        grid[5][3] = 1;
        let reconnect_json = serde_json::to_string(&ServerMessage::Reconnected {
            board: grid.clone(),
            current_player: 1,
        })
        .unwrap();

        let prior = SessionView {
            board: Some(Board::from_wire(&grid, 1).unwrap()),
            last_assignment: Some(Player::One),
            ..SessionView::default()
        };

        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(0))),
            Some(Ok(reconnect_json)),
        ]);

        let config = ConnectFourConfig::new("alice").with_resume(prior);
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::GameResumed { .. }));

        let view = client.view();
        assert_eq!(view.phase, Phase::InProgress);
        assert_eq!(view.local_player, Some(Player::One));
        assert_eq!(client.request_move(3), Ok(()));

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_ticks_flow_through_the_event_channel() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(1))),
            Some(Ok(r#"{"type":"waiting"}"#.to_string())),
        ]);

        let config = ConnectFourConfig::new("alice").with_wait_seconds(3);
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let event = events.recv().await.unwrap();
        assert_eq!(event, ConnectFourEvent::WaitingForOpponent { seconds: 3 });

        // Paused time auto-advances: the countdown drains tick by tick.
        for remaining in (0..3).rev() {
            let event = events.recv().await.unwrap();
            assert_eq!(event, ConnectFourEvent::CountdownTick { remaining });
        }
        let event = events.recv().await.unwrap();
        assert_eq!(event, ConnectFourEvent::WaitWindowElapsed);
        assert_eq!(client.view().phase, Phase::WaitingForOpponent);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn bot_start_is_accepted_without_ticks() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(1))),
            Some(Ok(r#"{"type":"waiting"}"#.to_string())),
            Some(Ok(r#"{"type":"bot_start","player":1}"#.to_string())),
        ]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        let _ = events.recv().await; // WaitingForOpponent
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            ConnectFourEvent::BotGameStarted {
                player: Player::One
            }
        );
        assert_eq!(client.view().phase, Phase::InProgress);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_message_is_dropped_and_session_continues() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(connected_json(1))),
            Some(Ok("{not json".to_string())),
            Some(Ok(r#"{"type":"unknown_kind"}"#.to_string())),
            Some(Ok(matched_json(1))),
        ]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned
        // Both bad payloads are dropped without an event; Matched follows.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::Matched { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json(1)))]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned

        client.shutdown().await;

        let result = client.send(ClientMessage::Join {
            username: "alice".into(),
        });
        assert!(matches!(result, Err(ConnectFourError::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (transport, _sent, closed) = MockTransport::new(vec![Some(Ok(connected_json(1)))]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned

        client.shutdown().await;

        // After shutdown, a Disconnected event should have been emitted.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::Disconnected { .. }));
        if let ConnectFourEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }

        // The transport should have been closed.
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn transport_recv_error_emits_disconnected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            ConnectFourError::TransportReceive("boom".into()),
        ))]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::Disconnected { .. }));
        if let ConnectFourEvent::Disconnected { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = ConnectFourConfig::new("alice");
        assert_eq!(config.username, "alice");
        assert_eq!(config.wait_seconds, DEFAULT_WAIT_SECONDS);
        assert!(config.resume_from.is_none());
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn config_builder_methods() {
        let config = ConnectFourConfig::new("alice")
            .with_wait_seconds(5)
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.wait_seconds, 5);
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = ConnectFourConfig::new("alice").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json(1)))]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned

        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json(1)))]);

        let config = ConnectFourConfig::new("alice");
        let (client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerAssigned

        // Drop the client without calling shutdown.
        drop(client);

        // The session loop should eventually exit; the event channel will
        // close. We just verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        // More board updates than the event channel can hold.
        let mut incoming: Vec<Option<std::result::Result<String, ConnectFourError>>> = Vec::new();
        incoming.push(Some(Ok(connected_json(1))));
        incoming.push(Some(Ok(matched_json(1))));
        for turn in 0..20 {
            incoming.push(Some(Ok(board_json(1 + (turn % 2)))));
        }
        incoming.push(None);

        let (transport, _sent, _closed) = MockTransport::new(incoming);

        let config = ConnectFourConfig::new("alice").with_event_channel_capacity(1);
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        // Let the channel fill up and events get dropped.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        let mut saw_disconnected = false;
        while let Some(event) = events.recv().await {
            count += 1;
            saw_disconnected = matches!(event, ConnectFourEvent::Disconnected { .. });
        }
        // Backpressure drops intermediate events, but Disconnected is always
        // delivered last.
        assert!(count < 23, "expected dropped events, got all {count}");
        assert!(saw_disconnected, "final event must be Disconnected");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json(1)))]);

        let config = ConnectFourConfig::new("alice");
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        let _ = events.recv().await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("ConnectFourClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    /// Transport that hangs forever in `close()` so shutdown timeout/abort can be tested.
    struct HangingCloseTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl HangingCloseTransport {
        fn new() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
            let close_called = Arc::new(AtomicBool::new(false));
            let dropped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    close_called: Arc::clone(&close_called),
                    dropped: Arc::clone(&dropped),
                },
                close_called,
                dropped,
            )
        }
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), ConnectFourError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ConnectFourError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ConnectFourError> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_session_task() {
        let (transport, close_called, dropped) = HangingCloseTransport::new();
        let config =
            ConnectFourConfig::new("alice").with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = ConnectFourClient::start(transport, config);

        // Drain Connected so the channel remains uncongested.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectFourEvent::Connected));

        client.shutdown().await;

        assert!(
            close_called.load(Ordering::Acquire),
            "transport.close() should have been attempted during graceful shutdown"
        );
        assert!(
            dropped.load(Ordering::Acquire),
            "timed-out shutdown should abort and drop the session loop task"
        );
        assert!(!client.is_connected());
    }
}
