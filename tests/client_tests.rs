#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the Connect Four client.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! responses in the deployed server's wire format and verify that
//! `ConnectFourClient` processes them correctly: phase transitions, move
//! gating, countdown behavior, disconnect, and resume.

mod common;

use connect_four_client::protocol::ClientMessage;
use connect_four_client::{
    Cell, ConnectFourClient, ConnectFourConfig, ConnectFourError, ConnectFourEvent, MoveDenied,
    Phase, Player,
};

use common::{
    board_json, bot_start_json, connected_json, empty_grid, error_json, game_over_json,
    matched_json, mid_game_grid, reconnected_json, waiting_json, ChannelTransport, MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Start a client with the given scripted server responses.
#[allow(clippy::type_complexity)]
fn start_client(
    incoming: Vec<Option<Result<String, ConnectFourError>>>,
) -> (
    ConnectFourClient,
    tokio::sync::mpsc::Receiver<ConnectFourEvent>,
    std::sync::Arc<std::sync::Mutex<Vec<String>>>,
) {
    let (transport, sent, _closed) = MockTransport::new(incoming);
    let config = ConnectFourConfig::new("integration");
    let (client, events) = ConnectFourClient::start(transport, config);
    (client, events, sent)
}

/// Consume events up to and including the first `PlayerAssigned` event.
async fn drain_until_assigned(rx: &mut tokio::sync::mpsc::Receiver<ConnectFourEvent>) -> Player {
    let ev = rx.recv().await.expect("expected Connected event");
    assert!(
        matches!(ev, ConnectFourEvent::Connected),
        "first event should be Connected, got {ev:?}"
    );
    let ev = rx.recv().await.expect("expected PlayerAssigned event");
    if let ConnectFourEvent::PlayerAssigned { player } = ev {
        player
    } else {
        panic!("second event should be PlayerAssigned, got {ev:?}");
    }
}

// ════════════════════════════════════════════════════════════════════
// Join and assignment
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_flow_connected_then_assigned() {
    let (mut client, mut events, sent) = start_client(vec![Some(Ok(connected_json(1)))]);

    let player = drain_until_assigned(&mut events).await;
    assert_eq!(player, Player::One);

    let view = client.view();
    assert_eq!(view.phase, Phase::WaitingForOpponent);
    assert_eq!(view.local_player, Some(Player::One));

    // Verify the join intent went out first.
    {
        let messages = sent.lock().unwrap();
        assert!(!messages.is_empty());
        let first: ClientMessage = serde_json::from_str(&messages[0]).expect("parse join");
        assert_eq!(
            first,
            ClientMessage::Join {
                username: "integration".into()
            }
        );
    }

    client.shutdown().await;
}

#[tokio::test]
async fn bare_connected_defaults_the_assignment_to_player_one() {
    // The deployed server omits the player field entirely.
    let (mut client, mut events, _sent) = start_client(vec![Some(Ok(connected_json(0)))]);
    let player = drain_until_assigned(&mut events).await;
    assert_eq!(player, Player::One);
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Full game against the bot
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_bot_game_flow() {
    let mut after_move = empty_grid();
    after_move[5][3] = 1;
    let mut after_bot = after_move.clone();
    after_bot[5][0] = 2;
    let mut final_grid = after_bot.clone();
    final_grid[4][3] = 1;

    // Feed each server message at the matching point of the exchange so the
    // guard can be asserted between turns.
    let (transport, feeder, sent) = ChannelTransport::new();
    let config = ConnectFourConfig::new("integration");
    let (mut client, mut events) = ConnectFourClient::start(transport, config);

    feeder.send(Some(Ok(connected_json(1)))).unwrap();
    feeder.send(Some(Ok(waiting_json("integration")))).unwrap();
    drain_until_assigned(&mut events).await;
    let ev = events.recv().await.unwrap();
    assert_eq!(ev, ConnectFourEvent::WaitingForOpponent { seconds: 10 });

    feeder.send(Some(Ok(bot_start_json(1)))).unwrap();
    let ev = events.recv().await.unwrap();
    assert_eq!(
        ev,
        ConnectFourEvent::BotGameStarted {
            player: Player::One
        }
    );
    // Fresh game: empty board, our turn as player 1.
    assert_eq!(client.request_move(3), Ok(()));
    client.play(3).unwrap();
    // Let the loop drain the queued move intent.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Server resolves our move; turn flips to the bot.
    feeder.send(Some(Ok(board_json(&after_move, 2)))).unwrap();
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::BoardUpdated { .. }));
    assert_eq!(client.request_move(3), Err(MoveDenied::NotYourTurn));

    // Bot replies; our turn again.
    feeder.send(Some(Ok(board_json(&after_bot, 1)))).unwrap();
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::BoardUpdated { .. }));
    assert_eq!(client.request_move(3), Ok(()));

    // We win.
    feeder.send(Some(Ok(game_over_json(1, &final_grid)))).unwrap();
    let ev = events.recv().await.unwrap();
    assert_eq!(
        ev,
        ConnectFourEvent::GameConcluded {
            winner: Player::One,
            you_won: Some(true),
        }
    );
    let view = client.view();
    assert_eq!(view.phase, Phase::Concluded);
    assert_eq!(
        view.board.unwrap().cell(4, 3),
        Some(Cell::Disc(Player::One)),
        "final board from game_over is displayed"
    );
    assert_eq!(client.request_move(0), Err(MoveDenied::NotInProgress));

    client.shutdown().await;

    // Exactly one move intent was transmitted (after the join).
    {
        let messages = sent.lock().unwrap();
        let moves: Vec<ClientMessage> = messages
            .iter()
            .map(|m| serde_json::from_str(m).unwrap())
            .filter(|m| matches!(m, ClientMessage::Move { .. }))
            .collect();
        assert_eq!(
            moves,
            vec![ClientMessage::Move {
                column: 3,
                player: 1
            }]
        );
    }
}

// ════════════════════════════════════════════════════════════════════
// PvP match as player 2
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn matched_as_player_two_waits_for_the_turn() {
    let (transport, feeder, _sent) = ChannelTransport::new();
    let config = ConnectFourConfig::new("integration");
    let (mut client, mut events) = ConnectFourClient::start(transport, config);

    feeder.send(Some(Ok(connected_json(2)))).unwrap();
    drain_until_assigned(&mut events).await;

    feeder.send(Some(Ok(matched_json(2)))).unwrap();
    let ev = events.recv().await.unwrap();
    assert_eq!(
        ev,
        ConnectFourEvent::Matched {
            player: Player::Two
        }
    );
    // Empty board, player 1 to move: we are gated.
    assert_eq!(client.request_move(0), Err(MoveDenied::NotYourTurn));

    feeder.send(Some(Ok(board_json(&mid_game_grid(), 2)))).unwrap();
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::BoardUpdated { .. }));
    assert_eq!(client.request_move(0), Ok(()));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Countdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn countdown_drains_the_window_and_stays_waiting() {
    // Script ends after `waiting`, so the clock runs the window dry before
    // anything else happens; the machine must still accept a bot_start.
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(connected_json(1))),
        Some(Ok(waiting_json("integration"))),
    ]);
    let config = ConnectFourConfig::new("integration").with_wait_seconds(2);
    let (mut client, mut events) = ConnectFourClient::start(transport, config);

    drain_until_assigned(&mut events).await;
    let ev = events.recv().await.unwrap();
    assert_eq!(ev, ConnectFourEvent::WaitingForOpponent { seconds: 2 });

    assert_eq!(
        events.recv().await.unwrap(),
        ConnectFourEvent::CountdownTick { remaining: 1 }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectFourEvent::CountdownTick { remaining: 0 }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectFourEvent::WaitWindowElapsed
    );

    let view = client.view();
    assert_eq!(view.phase, Phase::WaitingForOpponent);
    assert_eq!(view.countdown_seconds_remaining, 0);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_waiting_rearms_the_full_window() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(connected_json(1))),
        Some(Ok(waiting_json("integration"))),
        Some(Ok(waiting_json("integration"))),
    ]);
    let config = ConnectFourConfig::new("integration").with_wait_seconds(5);
    let (mut client, mut events) = ConnectFourClient::start(transport, config);

    drain_until_assigned(&mut events).await;
    let ev = events.recv().await.unwrap();
    assert_eq!(ev, ConnectFourEvent::WaitingForOpponent { seconds: 5 });
    let ev = events.recv().await.unwrap();
    assert_eq!(ev, ConnectFourEvent::WaitingForOpponent { seconds: 5 });
    assert_eq!(client.view().countdown_seconds_remaining, 5);
    assert_eq!(client.view().phase, Phase::WaitingForOpponent);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Server-side move rejection
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn server_rejection_surfaces_as_move_rejected() {
    let (mut client, mut events, _sent) = start_client(vec![
        Some(Ok(connected_json(1))),
        Some(Ok(matched_json(1))),
        Some(Ok(error_json())),
    ]);

    drain_until_assigned(&mut events).await;
    let _ = events.recv().await; // Matched

    let ev = events.recv().await.unwrap();
    assert_eq!(ev, ConnectFourEvent::MoveRejected);
    // Rejection does not change the session state.
    assert_eq!(client.view().phase, Phase::InProgress);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Stale events through the full loop
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stale_matched_after_game_over_is_ignored() {
    let (mut client, mut events, _sent) = start_client(vec![
        Some(Ok(connected_json(1))),
        Some(Ok(matched_json(1))),
        Some(Ok(game_over_json(2, &mid_game_grid()))),
        Some(Ok(matched_json(1))),
        Some(Ok(error_json())),
    ]);

    drain_until_assigned(&mut events).await;
    let _ = events.recv().await; // Matched
    let ev = events.recv().await.unwrap();
    assert_eq!(
        ev,
        ConnectFourEvent::GameConcluded {
            winner: Player::Two,
            you_won: Some(false),
        }
    );

    // The stale matched produces no event; the next event is the scripted
    // error passthrough.
    let ev = events.recv().await.unwrap();
    assert_eq!(ev, ConnectFourEvent::MoveRejected);
    assert_eq!(client.view().phase, Phase::Concluded);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Disconnect and resume (Scenario E end-to-end)
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn disconnect_then_resume_restores_the_game() {
    // First connection: play into a mid-game position, then the transport
    // drops.
    let (mut client, mut events, _sent) = start_client(vec![
        Some(Ok(connected_json(1))),
        Some(Ok(matched_json(1))),
        Some(Ok(board_json(&mid_game_grid(), 1))),
        None,
    ]);

    drain_until_assigned(&mut events).await;
    let _ = events.recv().await; // Matched
    let _ = events.recv().await; // BoardUpdated
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::Disconnected { .. }));

    let prior = client.view();
    assert_eq!(prior.phase, Phase::Disconnected);
    assert_eq!(prior.local_player, None, "assignment is not live anymore");
    assert_eq!(prior.last_assignment, Some(Player::One));
    assert!(prior.board.is_some(), "board retained for display");
    client.shutdown().await;

    // Fresh connection seeded with the prior view; the server resumes via
    // `reconnected` without a new `matched`.
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(connected_json(0))),
        Some(Ok(reconnected_json(&mid_game_grid(), 1))),
    ]);
    let config = ConnectFourConfig::new("integration").with_resume(prior);
    let (mut client, mut events) = ConnectFourClient::start(transport, config);

    drain_until_assigned(&mut events).await;
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::GameResumed { .. }));

    let view = client.view();
    assert_eq!(view.phase, Phase::InProgress);
    assert_eq!(view.local_player, Some(Player::One));
    assert_eq!(
        view.board.as_ref().unwrap().cell(5, 3),
        Some(Cell::Disc(Player::One)),
        "the exact board is restored"
    );
    assert_eq!(client.request_move(3), Ok(()));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Malformed payloads through the full loop
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn malformed_board_surfaces_an_anomaly_and_keeps_the_last_board() {
    let mut bad_grid = empty_grid();
    bad_grid[0][0] = 9;

    let (mut client, mut events, _sent) = start_client(vec![
        Some(Ok(connected_json(1))),
        Some(Ok(matched_json(1))),
        Some(Ok(board_json(&mid_game_grid(), 2))),
        Some(Ok(board_json(&bad_grid, 1))),
    ]);

    drain_until_assigned(&mut events).await;
    let _ = events.recv().await; // Matched
    let _ = events.recv().await; // BoardUpdated

    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::ProtocolAnomaly { .. }));
    assert_eq!(
        client.view().board.unwrap().cell(5, 3),
        Some(Cell::Disc(Player::One)),
        "last valid board retained"
    );

    client.shutdown().await;
}

#[tokio::test]
async fn undecodable_payloads_are_dropped_silently() {
    let (mut client, mut events, _sent) = start_client(vec![
        Some(Ok(connected_json(1))),
        Some(Ok("garbage".to_string())),
        Some(Ok(r#"{"type":"board","board":null,"currentPlayer":1}"#.to_string())),
        Some(Ok(matched_json(1))),
    ]);

    drain_until_assigned(&mut events).await;
    // Both undecodable payloads vanish; the next event is Matched.
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ConnectFourEvent::Matched { .. }));

    client.shutdown().await;
}
