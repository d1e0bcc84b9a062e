//! # Connect Four Client
//!
//! Transport-agnostic Rust client for the four-in-a-row realtime game
//! protocol.
//!
//! This crate provides a high-level async client that talks to a game server
//! using JSON text messages over any bidirectional transport, and derives the
//! single authoritative "what can the user do right now" state from the
//! stream of server events, countdown ticks, and user actions.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any backend
//! - **WebSocket built-in** — default `transport-websocket` feature provides [`WebSocketTransport`]
//! - **Event-driven** — receive typed [`ConnectFourEvent`]s via a channel
//! - **Strict input gating** — moves are guarded by the session phase and
//!   turn, never by UI state
//! - **Bot fallback aware** — tracks the opponent-waiting countdown and the
//!   server's bot substitution
//! - **Leaderboard** — optional `leaderboard` feature fetches standings over HTTP
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use connect_four_client::{ConnectFourClient, ConnectFourConfig, WebSocketTransport};
//!
//! let transport = WebSocketTransport::connect("ws://localhost:8080/ws").await?;
//! let (client, mut events) = ConnectFourClient::start(transport, ConnectFourConfig::new("alice"));
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod board;
pub mod clock;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(feature = "tokio-runtime")]
pub mod client;

#[cfg(feature = "leaderboard")]
pub mod leaderboard;

pub mod transports;

// Re-export primary types for ergonomic imports.
pub use board::{Board, Cell, Player};
pub use error::ConnectFourError;
pub use event::ConnectFourEvent;
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{MoveDenied, Phase, SessionStateMachine, SessionView};
pub use transport::Transport;

#[cfg(feature = "tokio-runtime")]
pub use client::{ConnectFourClient, ConnectFourConfig};

#[cfg(feature = "leaderboard")]
pub use leaderboard::{LeaderboardClient, LeaderboardEntry};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
