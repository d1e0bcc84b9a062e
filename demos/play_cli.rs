//! # Terminal Player Example
//!
//! Demonstrates a complete Connect Four client lifecycle:
//!
//! 1. Connect to a game server via WebSocket
//! 2. Join matchmaking under a username
//! 3. Watch the opponent-waiting countdown (bot fallback after 10 s)
//! 4. Play moves whenever the session guard allows
//! 5. Refresh the leaderboard once when the game concludes
//! 6. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a game server on localhost:8080, then:
//! cargo run --example play_cli --features leaderboard
//!
//! # Override the server URL or username:
//! CONNECT_FOUR_URL=ws://my-server:8080/ws CONNECT_FOUR_USER=alice \
//!     cargo run --example play_cli
//! ```

use connect_four_client::{
    Cell, ConnectFourClient, ConnectFourConfig, ConnectFourEvent, Player, WebSocketTransport,
};

/// Default server URL when `CONNECT_FOUR_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080/ws";

/// Print the board the way the server sees it, top row first.
fn render(board: &connect_four_client::Board) {
    for row in board.cells() {
        let line: String = row
            .iter()
            .map(|cell| match cell {
                Cell::Empty => '.',
                Cell::Disc(Player::One) => 'X',
                Cell::Disc(Player::Two) => 'O',
            })
            .collect();
        println!("  {line}");
    }
    println!("  0123456");
}

/// Pick the leftmost column whose top cell is still open.
///
/// Legality is ultimately the server's call; a rejected pick comes back as
/// a `MoveRejected` event and we simply try again on the next board.
fn pick_column(board: &connect_four_client::Board) -> Option<usize> {
    (0..7).find(|&col| matches!(board.cell(0, col), Some(Cell::Empty)))
}

/// If the guard allows, play into the first open column.
fn try_play(client: &ConnectFourClient) -> Result<(), connect_four_client::ConnectFourError> {
    let view = client.view();
    let Some(board) = view.board.as_ref() else {
        return Ok(());
    };
    let Some(column) = pick_column(board) else {
        return Ok(());
    };
    if view.request_move(column).is_ok() {
        tracing::info!("playing column {column}");
        client.play(column)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("CONNECT_FOUR_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let username =
        std::env::var("CONNECT_FOUR_USER").unwrap_or_else(|_| "RustPlayer".to_string());
    tracing::info!("Connecting to {url} as {username}");

    #[cfg(feature = "leaderboard")]
    let leaderboard = {
        let base = url
            .replacen("ws://", "http://", 1)
            .replacen("wss://", "https://", 1);
        let base = base.trim_end_matches("/ws").to_string();
        connect_four_client::LeaderboardClient::new(base)
    };

    // ── Connect ─────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&url).await?;
    let config = ConnectFourConfig::new(username);
    let (mut client, mut event_rx) = ConnectFourClient::start(transport, config);

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the session.
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    ConnectFourEvent::Connected => {
                        tracing::info!("Transport connected, joining matchmaking…");
                    }

                    ConnectFourEvent::PlayerAssigned { player } => {
                        tracing::info!("We are player {player}");
                    }

                    ConnectFourEvent::WaitingForOpponent { seconds } => {
                        tracing::info!("Finding opponent… bot starts in {seconds}s");
                    }

                    ConnectFourEvent::CountdownTick { remaining } => {
                        tracing::info!("…{remaining}s");
                    }

                    ConnectFourEvent::WaitWindowElapsed => {
                        tracing::info!("Starting bot game…");
                    }

                    ConnectFourEvent::BotGameStarted { player } => {
                        tracing::info!("Bot game started; we are player {player}");
                        try_play(&client)?;
                    }

                    ConnectFourEvent::Matched { player } => {
                        tracing::info!("Matched against a human; we are player {player}");
                        try_play(&client)?;
                    }

                    ConnectFourEvent::BoardUpdated { board }
                    | ConnectFourEvent::GameResumed { board } => {
                        render(&board);
                        try_play(&client)?;
                    }

                    ConnectFourEvent::GameConcluded { winner, you_won } => {
                        match you_won {
                            Some(true) => tracing::info!("🎉 You win!"),
                            Some(false) => tracing::info!("Player {winner} wins."),
                            None => tracing::info!("Game over, winner: player {winner}"),
                        }

                        #[cfg(feature = "leaderboard")]
                        match leaderboard.fetch().await {
                            Ok(rows) => {
                                tracing::info!("Leaderboard:");
                                for row in rows.iter().take(10) {
                                    tracing::info!(
                                        "  {}: {} wins / {} games",
                                        row.username, row.wins, row.games_played
                                    );
                                }
                            }
                            Err(e) => tracing::warn!("leaderboard refresh failed: {e}"),
                        }
                        break;
                    }

                    ConnectFourEvent::MoveRejected => {
                        tracing::warn!("server rejected our move; waiting for the next board");
                    }

                    ConnectFourEvent::ProtocolAnomaly { detail } => {
                        tracing::warn!("protocol anomaly: {detail}");
                    }

                    ConnectFourEvent::Disconnected { reason } => {
                        tracing::info!("Disconnected: {reason:?}");
                        break;
                    }
                }
            }

            // Branch 2: Ctrl+C — leave cleanly.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
