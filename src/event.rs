//! Events emitted to the consumer of a [`ConnectFourClient`](crate::ConnectFourClient).
//!
//! Events are derived from session-state transitions, not echoed from raw
//! server messages: stale or phase-inconsistent messages produce no event,
//! and [`GameConcluded`](ConnectFourEvent::GameConcluded) fires exactly once
//! per concluded game — it is the notification hook a leaderboard display
//! refreshes on.

use crate::board::{Board, Player};

/// Event delivered on the channel returned by
/// [`ConnectFourClient::start`](crate::ConnectFourClient::start).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectFourEvent {
    /// The transport is up and the join intent has been queued. Synthetic —
    /// emitted by the session loop, not received from the server.
    Connected,

    /// The server assigned this client its player number.
    PlayerAssigned {
        /// The local player for this session.
        player: Player,
    },

    /// No opponent yet; the bot-fallback waiting window was (re-)opened.
    WaitingForOpponent {
        /// Full length of the window in seconds.
        seconds: u32,
    },

    /// One second of the waiting window passed.
    CountdownTick {
        /// Seconds left before the server's bot fallback is due.
        remaining: u32,
    },

    /// The waiting window ran out locally. The bot fallback is server-driven;
    /// a `bot_start` may still arrive at any moment after this.
    WaitWindowElapsed,

    /// A bot game is starting on an empty board.
    BotGameStarted {
        /// The local player number for the new game.
        player: Player,
    },

    /// A human opponent was found; a fresh game is starting on an empty board.
    Matched {
        /// The local player number for the new game.
        player: Player,
    },

    /// The server delivered an authoritative board snapshot.
    BoardUpdated {
        /// The replacement snapshot.
        board: Board,
    },

    /// An in-flight game was restored after a transport drop.
    GameResumed {
        /// The snapshot the game resumes from.
        board: Board,
    },

    /// The game ended. Fires exactly once per game.
    GameConcluded {
        /// The winning player as reported by the server.
        winner: Player,
        /// Whether the local player won; `None` when no assignment is known.
        you_won: Option<bool>,
    },

    /// The server rejected the last intent (wrong turn, full column).
    MoveRejected,

    /// An inbound payload was dropped for violating protocol shape
    /// (e.g. a malformed board). The previous state is retained.
    ProtocolAnomaly {
        /// Human-readable description for observability.
        detail: String,
    },

    /// The transport closed. Always the final event of a session; never
    /// dropped by channel backpressure.
    Disconnected {
        /// Close reason, if one is known.
        reason: Option<String>,
    },
}
