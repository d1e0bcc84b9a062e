#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Connect Four client integration tests.
//!
//! Provides a channel-based [`MockTransport`] and helper functions for
//! constructing server response JSON in the deployed server's flat format
//! (every message is one struct, so zero-valued extra fields are present).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use connect_four_client::{ConnectFourError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport for integration testing.
///
/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    /// Scripted server responses (consumed in order by `recv`).
    incoming: VecDeque<Option<Result<String, ConnectFourError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming messages.
    ///
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, ConnectFourError>>>,
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
    async fn send(&mut self, message: String) -> Result<(), ConnectFourError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectFourError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages — hang forever so the session loop
            // stays alive until shutdown is called.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ConnectFourError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ChannelTransport ────────────────────────────────────────────────

/// A mock transport fed from the test over a channel.
///
/// Unlike [`MockTransport`], which replays its whole script as fast as the
/// session loop can drain it, this lets a test deliver each server message at
/// a chosen point — necessary when asserting state between messages of a
/// turn-based exchange.
pub struct ChannelTransport {
    incoming: tokio::sync::mpsc::UnboundedReceiver<Option<Result<String, ConnectFourError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

/// Feeder handle for a [`ChannelTransport`]. Send `Some(Ok(json))` to deliver
/// a message, `Some(Err(e))` a transport error, `None` a clean close.
pub type TransportFeeder =
    tokio::sync::mpsc::UnboundedSender<Option<Result<String, ConnectFourError>>>;

impl ChannelTransport {
    pub fn new() -> (Self, TransportFeeder, Arc<StdMutex<Vec<String>>>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (transport, tx, sent)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), ConnectFourError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectFourError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Feeder dropped — hang like an idle connection until shutdown.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ConnectFourError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── JSON helper functions ───────────────────────────────────────────
//
// These emit the deployed server's actual wire shape: one flat struct with
// zero values for fields the variant does not use.

/// A `connected` message. Pass `0` to omit a meaningful player number, as
/// the deployed server does.
pub fn connected_json(player: u8) -> String {
    format!(
        r#"{{"type":"connected","column":0,"player":{player},"board":null,"currentPlayer":0,"username":""}}"#
    )
}

/// A `waiting` message echoing the joining username.
pub fn waiting_json(username: &str) -> String {
    format!(
        r#"{{"type":"waiting","column":0,"player":0,"board":null,"currentPlayer":0,"username":"{username}"}}"#
    )
}

/// A `bot_start` message with an explicit player assignment.
pub fn bot_start_json(player: u8) -> String {
    format!(
        r#"{{"type":"bot_start","column":0,"player":{player},"board":null,"currentPlayer":0,"username":"BOT"}}"#
    )
}

/// A `matched` message with an explicit player assignment.
pub fn matched_json(player: u8) -> String {
    format!(
        r#"{{"type":"matched","column":0,"player":{player},"board":null,"currentPlayer":0,"username":"opponent"}}"#
    )
}

/// A `board` message for the given grid and next player.
pub fn board_json(grid: &[Vec<u8>], current_player: u8) -> String {
    format!(
        r#"{{"type":"board","column":0,"player":0,"board":{},"currentPlayer":{current_player},"username":""}}"#,
        serde_json::to_string(grid).unwrap()
    )
}

/// A `reconnected` message restoring the given grid.
pub fn reconnected_json(grid: &[Vec<u8>], current_player: u8) -> String {
    format!(
        r#"{{"type":"reconnected","column":0,"player":0,"board":{},"currentPlayer":{current_player},"username":""}}"#,
        serde_json::to_string(grid).unwrap()
    )
}

/// A `game_over` message carrying the final board.
pub fn game_over_json(winner: u8, grid: &[Vec<u8>]) -> String {
    format!(
        r#"{{"type":"game_over","column":0,"player":0,"board":{},"currentPlayer":0,"username":"","winner":{winner}}}"#,
        serde_json::to_string(grid).unwrap()
    )
}

/// The server's bare rejection message.
pub fn error_json() -> String {
    r#"{"type":"error","column":0,"player":0,"board":null,"currentPlayer":0,"username":""}"#.into()
}

// ── Grid helpers ────────────────────────────────────────────────────

/// An all-empty 6×7 grid in wire form.
pub fn empty_grid() -> Vec<Vec<u8>> {
    vec![vec![0u8; 7]; 6]
}

/// A grid with single discs dropped for both players.
pub fn mid_game_grid() -> Vec<Vec<u8>> {
    let mut grid = empty_grid();
    grid[5][3] = 1;
    grid[5][4] = 2;
    grid
}
