//! Session protocol controller for the four-in-a-row client.
//!
//! [`SessionStateMachine`] is the single writer of session state. It consumes
//! the serialized stream of inbound protocol events and countdown events,
//! applies the phase transition table, and exposes the one authoritative
//! "can the user move right now" predicate. It owns the waiting-window
//! [`Clock`] and is the only component that arms or cancels it, so no
//! countdown ever outlives the phase that started it.
//!
//! The machine itself is synchronous and runs entirely inside the session
//! loop (see [`client`](crate::client)); presentation layers read it through
//! the [`SessionView`] projection.

use thiserror::Error;
use tracing::{debug, warn};

use crate::board::{Board, Player, COLS};
use crate::clock::{Clock, ClockEvent, ClockEventKind, CountdownId};
use crate::event::ConnectFourEvent;
use crate::protocol::ServerMessage;

/// Default length of the opponent-waiting window, matching server policy.
pub const DEFAULT_WAIT_SECONDS: u32 = 10;

/// Discrete stage of a session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No live transport. Initial state; re-entered on transport close.
    Disconnected,
    /// Transport is up, join intent sent, no player number yet.
    AwaitingAssignment,
    /// Assigned and waiting for an opponent; the countdown is running.
    WaitingForOpponent,
    /// A game is being played (against a human or the server's bot).
    InProgress,
    /// The server declared a winner. Terminal for this game.
    Concluded,
}

/// What kind of opponent the current game is against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentKind {
    /// A matched human player.
    Human,
    /// The server-controlled bot that substitutes after the waiting window.
    Bot,
}

/// Result of a concluded game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// The winner as reported by the server's `game_over`.
    pub winner: Player,
}

/// Why [`SessionStateMachine::request_move`] denied a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveDenied {
    /// No game is in progress (still waiting, concluded, or disconnected).
    #[error("no game in progress")]
    NotInProgress,

    /// No player number has been assigned for this game.
    #[error("no player assignment yet")]
    NotAssigned,

    /// It is the opponent's turn.
    #[error("not your turn")]
    NotYourTurn,

    /// The game already has an outcome.
    #[error("the game is over")]
    GameOver,

    /// The column index is outside 0–6.
    #[error("column {0} is off the board")]
    ColumnOutOfRange(usize),
}

/// Read-only projection of session state for presentation layers.
///
/// Obtained from [`SessionStateMachine::view`] (or
/// [`ConnectFourClient::view`](crate::ConnectFourClient::view)); safe to hold
/// and inspect from any thread at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Last known board snapshot; `None` before the first game starts.
    /// Retained across disconnects and game conclusion for display.
    pub board: Option<Board>,
    /// Seconds left in the waiting window. Meaningful only while
    /// [`Phase::WaitingForOpponent`].
    pub countdown_seconds_remaining: u32,
    /// The player number assigned on the live connection, if any.
    /// Cleared when the transport closes.
    pub local_player: Option<Player>,
    /// Opponent kind of the current (or last) game.
    pub opponent: Option<OpponentKind>,
    /// Present once the game concluded; never reverted by later events.
    pub outcome: Option<Outcome>,
    /// Most recent assignment known for this session, surviving transport
    /// drops. Feed the whole view back through the client config's resume
    /// option so a server `reconnected` can restore an in-flight game.
    pub last_assignment: Option<Player>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            phase: Phase::Disconnected,
            board: None,
            countdown_seconds_remaining: 0,
            local_player: None,
            opponent: None,
            outcome: None,
            last_assignment: None,
        }
    }
}

impl SessionView {
    /// The move guard: allowed exactly when a game is in progress, it is the
    /// local player's turn, and no outcome has been recorded.
    ///
    /// Pure — never mutates anything. A permitted move still only takes
    /// effect when the server echoes it back through a `board` event.
    ///
    /// # Errors
    ///
    /// Returns the first [`MoveDenied`] reason that applies.
    pub fn request_move(&self, column: usize) -> Result<(), MoveDenied> {
        if column >= COLS {
            return Err(MoveDenied::ColumnOutOfRange(column));
        }
        if self.phase != Phase::InProgress {
            return Err(MoveDenied::NotInProgress);
        }
        if self.outcome.is_some() {
            return Err(MoveDenied::GameOver);
        }
        let local = self.local_player.ok_or(MoveDenied::NotAssigned)?;
        // Once InProgress the board is always present; a hand-built view
        // without one is simply not a playable game.
        let board = self.board.as_ref().ok_or(MoveDenied::NotInProgress)?;
        if board.turn() != local {
            return Err(MoveDenied::NotYourTurn);
        }
        Ok(())
    }
}

/// The session state machine. See the [module docs](self) for the role it
/// plays and [`Phase`] for the lifecycle it walks through.
pub struct SessionStateMachine<C> {
    clock: C,
    wait_seconds: u32,
    phase: Phase,
    board: Option<Board>,
    countdown: u32,
    local_player: Option<Player>,
    /// Assignment retained across a transport drop, used to restore identity
    /// when the server resumes the game on a fresh connection.
    retained_player: Option<Player>,
    opponent: Option<OpponentKind>,
    outcome: Option<Outcome>,
    /// Id of the live countdown; events from any other countdown are stale.
    live_countdown: Option<CountdownId>,
}

impl<C: Clock> SessionStateMachine<C> {
    /// Create a machine for a brand-new session, in [`Phase::Disconnected`].
    pub fn new(clock: C, wait_seconds: u32) -> Self {
        Self {
            clock,
            wait_seconds,
            phase: Phase::Disconnected,
            board: None,
            countdown: 0,
            local_player: None,
            retained_player: None,
            opponent: None,
            outcome: None,
            live_countdown: None,
        }
    }

    /// Create a machine that carries the board, outcome, and assignment of a
    /// previous session into a fresh connection, so that a server
    /// `reconnected` can restore the game.
    pub fn resume(clock: C, wait_seconds: u32, prior: &SessionView) -> Self {
        let mut machine = Self::new(clock, wait_seconds);
        machine.board = prior.board.clone();
        machine.outcome = prior.outcome;
        machine.opponent = prior.opponent;
        machine.retained_player = prior.local_player.or(prior.last_assignment);
        machine
    }

    /// The transport is up and the join intent is on its way.
    pub fn connection_opened(&mut self) -> Option<ConnectFourEvent> {
        match self.phase {
            Phase::Disconnected => {
                self.phase = Phase::AwaitingAssignment;
                Some(ConnectFourEvent::Connected)
            }
            phase => {
                warn!(?phase, "connection_opened in unexpected phase, ignoring");
                None
            }
        }
    }

    /// The transport closed. Board and outcome are preserved for display;
    /// the assignment's association to the live connection is cleared (but
    /// retained for resume). Any countdown is cancelled.
    pub fn transport_closed(&mut self) {
        self.cancel_countdown();
        self.countdown = 0;
        if let Some(player) = self.local_player.take() {
            self.retained_player = Some(player);
        }
        self.phase = Phase::Disconnected;
    }

    /// Single entry point for all server-originated events.
    ///
    /// Applies the phase transition table; an event that is not valid for
    /// the current phase is logged and ignored, never an error.
    pub fn handle_message(&mut self, msg: ServerMessage) -> Option<ConnectFourEvent> {
        match msg {
            ServerMessage::Connected { player } => self.on_connected(player),
            ServerMessage::Waiting {} => self.on_waiting(),
            ServerMessage::BotStart { player } => self.on_game_start(player, OpponentKind::Bot),
            ServerMessage::Matched { player } => self.on_game_start(player, OpponentKind::Human),
            ServerMessage::Board {
                board,
                current_player,
            } => self.on_board(&board, current_player, false),
            ServerMessage::Reconnected {
                board,
                current_player,
            } => self.on_reconnected(&board, current_player),
            ServerMessage::GameOver { winner, board } => self.on_game_over(winner, board.as_deref()),
            ServerMessage::Error {} => {
                debug!(phase = ?self.phase, "server rejected the last intent");
                Some(ConnectFourEvent::MoveRejected)
            }
        }
    }

    /// Apply a countdown event. Events from anything but the live countdown
    /// are stale (their countdown was cancelled) and are discarded.
    pub fn handle_clock(&mut self, event: ClockEvent) -> Option<ConnectFourEvent> {
        if self.live_countdown != Some(event.id) {
            debug!(?event, "discarding tick from cancelled countdown");
            return None;
        }
        match event.kind {
            ClockEventKind::Tick(remaining) => {
                self.countdown = remaining;
                Some(ConnectFourEvent::CountdownTick { remaining })
            }
            ClockEventKind::Elapsed => {
                // The bot fallback is server-driven; stay in the waiting
                // phase and accept bot_start whenever it arrives.
                self.countdown = 0;
                self.live_countdown = None;
                Some(ConnectFourEvent::WaitWindowElapsed)
            }
        }
    }

    /// The move guard. See [`SessionView::request_move`].
    ///
    /// # Errors
    ///
    /// Returns the first [`MoveDenied`] reason that applies.
    pub fn request_move(&self, column: usize) -> Result<(), MoveDenied> {
        self.view().request_move(column)
    }

    /// Read-only projection of the current state.
    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            board: self.board.clone(),
            countdown_seconds_remaining: self.countdown,
            local_player: self.local_player,
            opponent: self.opponent,
            outcome: self.outcome,
            last_assignment: self.local_player.or(self.retained_player),
        }
    }

    /// The player number assigned on the live connection, if any.
    pub fn local_player(&self) -> Option<Player> {
        self.local_player
    }

    // ── Transition handlers ─────────────────────────────────────────

    fn on_connected(&mut self, raw_player: u8) -> Option<ConnectFourEvent> {
        if self.phase != Phase::AwaitingAssignment {
            debug!(phase = ?self.phase, "ignoring stale connected");
            return None;
        }
        let Some(player) = assignment_from_wire(raw_player, self.local_player) else {
            return self.anomaly(format!("connected with invalid player {raw_player}"));
        };
        // Assigned once per connection; duplicates never get this far
        // because the phase has already moved on.
        self.local_player = Some(player);
        self.phase = Phase::WaitingForOpponent;
        self.arm_countdown();
        Some(ConnectFourEvent::PlayerAssigned { player })
    }

    fn on_waiting(&mut self) -> Option<ConnectFourEvent> {
        if self.phase != Phase::WaitingForOpponent {
            debug!(phase = ?self.phase, "ignoring stale waiting");
            return None;
        }
        // The server may legitimately re-announce waiting status; re-arm
        // the countdown to its full value.
        self.arm_countdown();
        Some(ConnectFourEvent::WaitingForOpponent {
            seconds: self.wait_seconds,
        })
    }

    fn on_game_start(&mut self, raw_player: u8, opponent: OpponentKind) -> Option<ConnectFourEvent> {
        if self.phase != Phase::WaitingForOpponent {
            debug!(phase = ?self.phase, ?opponent, "ignoring stale game start");
            return None;
        }
        let Some(player) = assignment_from_wire(raw_player, self.local_player) else {
            return self.anomaly(format!("game start with invalid player {raw_player}"));
        };
        self.cancel_countdown();
        self.countdown = 0;
        self.board = Some(Board::empty());
        self.local_player = Some(player);
        self.opponent = Some(opponent);
        self.outcome = None;
        self.phase = Phase::InProgress;
        match opponent {
            OpponentKind::Bot => Some(ConnectFourEvent::BotGameStarted { player }),
            OpponentKind::Human => Some(ConnectFourEvent::Matched { player }),
        }
    }

    fn on_board(
        &mut self,
        grid: &[Vec<u8>],
        current_player: u8,
        resumed: bool,
    ) -> Option<ConnectFourEvent> {
        match self.phase {
            Phase::InProgress | Phase::Concluded => {}
            phase => {
                debug!(?phase, "ignoring stale board");
                return None;
            }
        }
        let board = match Board::from_wire(grid, current_player) {
            Ok(board) => board,
            Err(err) => return self.anomaly(format!("board payload rejected: {err}")),
        };
        // Wholesale replacement; the previous snapshot is discarded.
        self.board = Some(board.clone());
        if resumed && self.phase == Phase::InProgress {
            Some(ConnectFourEvent::GameResumed { board })
        } else {
            // While Concluded this only reconciles the displayed board;
            // phase and outcome stay untouched.
            Some(ConnectFourEvent::BoardUpdated { board })
        }
    }

    fn on_reconnected(&mut self, grid: &[Vec<u8>], current_player: u8) -> Option<ConnectFourEvent> {
        match self.phase {
            // Resume on a fresh connection: the server disambiguates resume
            // from a fresh match by message type, so no `matched` is needed.
            Phase::AwaitingAssignment | Phase::WaitingForOpponent => {
                let board = match Board::from_wire(grid, current_player) {
                    Ok(board) => board,
                    Err(err) => return self.anomaly(format!("reconnect payload rejected: {err}")),
                };
                self.cancel_countdown();
                self.countdown = 0;
                if self.local_player.is_none() {
                    self.local_player = self.retained_player;
                }
                self.board = Some(board.clone());
                self.outcome = None;
                self.phase = Phase::InProgress;
                Some(ConnectFourEvent::GameResumed { board })
            }
            Phase::InProgress | Phase::Concluded => self.on_board(grid, current_player, true),
            Phase::Disconnected => {
                debug!("ignoring reconnected without a live transport");
                None
            }
        }
    }

    fn on_game_over(&mut self, raw_winner: u8, grid: Option<&[Vec<u8>]>) -> Option<ConnectFourEvent> {
        if self.phase != Phase::InProgress {
            debug!(phase = ?self.phase, "ignoring stale game_over");
            return None;
        }
        let Some(winner) = Player::from_number(raw_winner) else {
            return self.anomaly(format!("game_over with invalid winner {raw_winner}"));
        };
        self.cancel_countdown();
        // The server includes the final position; use it when it is sound.
        if let Some(grid) = grid {
            match Board::from_wire(grid, raw_winner) {
                Ok(board) => self.board = Some(board),
                Err(err) => warn!(%err, "keeping previous board: final board payload rejected"),
            }
        }
        self.outcome = Some(Outcome { winner });
        self.phase = Phase::Concluded;
        Some(ConnectFourEvent::GameConcluded {
            winner,
            you_won: self.local_player.map(|p| p == winner),
        })
    }

    // ── Countdown plumbing ──────────────────────────────────────────

    fn arm_countdown(&mut self) {
        self.countdown = self.wait_seconds;
        self.live_countdown = Some(self.clock.arm(self.wait_seconds));
    }

    fn cancel_countdown(&mut self) {
        if self.live_countdown.take().is_some() {
            self.clock.cancel();
        }
    }

    fn anomaly(&self, detail: String) -> Option<ConnectFourEvent> {
        warn!(%detail, phase = ?self.phase, "protocol anomaly");
        Some(ConnectFourEvent::ProtocolAnomaly { detail })
    }
}

impl<C> std::fmt::Debug for SessionStateMachine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("phase", &self.phase)
            .field("local_player", &self.local_player)
            .field("countdown", &self.countdown)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Interpret a wire player number in an assignment position.
///
/// The deployed server often omits the field (decoded as 0): fall back to
/// the current assignment, defaulting to player 1 for a brand-new session.
/// Nonzero values outside {1, 2} are invalid.
fn assignment_from_wire(raw: u8, current: Option<Player>) -> Option<Player> {
    match raw {
        0 => Some(current.unwrap_or(Player::One)),
        n => Player::from_number(n),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::board::{Cell, ROWS};

    // ── Manual clock ────────────────────────────────────────────────

    /// A fake clock that records arms and cancels; tests inject ticks
    /// directly through `handle_clock`.
    #[derive(Default)]
    struct ManualClock {
        next_id: u64,
        armed: Vec<(CountdownId, u32)>,
        cancels: usize,
    }

    impl Clock for ManualClock {
        fn arm(&mut self, seconds: u32) -> CountdownId {
            self.next_id += 1;
            let id = CountdownId(self.next_id);
            self.armed.push((id, seconds));
            id
        }

        fn cancel(&mut self) {
            self.cancels += 1;
        }
    }

    type Machine = SessionStateMachine<ManualClock>;

    fn machine() -> Machine {
        SessionStateMachine::new(ManualClock::default(), DEFAULT_WAIT_SECONDS)
    }

    /// Machine advanced to WaitingForOpponent as the given player.
    fn waiting_machine(player: u8) -> Machine {
        let mut sm = machine();
        sm.connection_opened();
        sm.handle_message(ServerMessage::Connected { player });
        sm
    }

    /// Machine advanced to InProgress via `matched` as the given player.
    fn in_progress_machine(player: u8) -> Machine {
        let mut sm = waiting_machine(player);
        sm.handle_message(ServerMessage::Matched { player });
        sm
    }

    fn empty_grid() -> Vec<Vec<u8>> {
        vec![vec![0u8; COLS]; ROWS]
    }

    /// A mid-game grid with one disc per player.
    fn mid_game_grid() -> Vec<Vec<u8>> {
        let mut grid = empty_grid();
        grid[5][3] = 1;
        grid[5][4] = 2;
        grid
    }

    fn live_countdown_id(sm: &Machine) -> CountdownId {
        sm.live_countdown.expect("countdown should be armed")
    }

    // ── Connection and assignment ───────────────────────────────────

    #[test]
    fn connection_opened_enters_awaiting_assignment() {
        let mut sm = machine();
        let event = sm.connection_opened();
        assert_eq!(event, Some(ConnectFourEvent::Connected));
        assert_eq!(sm.view().phase, Phase::AwaitingAssignment);
    }

    #[test]
    fn connected_assigns_player_and_starts_countdown() {
        let mut sm = machine();
        sm.connection_opened();
        let event = sm.handle_message(ServerMessage::Connected { player: 2 });

        assert_eq!(
            event,
            Some(ConnectFourEvent::PlayerAssigned {
                player: Player::Two
            })
        );
        let view = sm.view();
        assert_eq!(view.phase, Phase::WaitingForOpponent);
        assert_eq!(view.local_player, Some(Player::Two));
        assert_eq!(view.countdown_seconds_remaining, DEFAULT_WAIT_SECONDS);
        assert_eq!(sm.clock.armed, vec![(CountdownId(1), DEFAULT_WAIT_SECONDS)]);
    }

    #[test]
    fn connected_without_player_number_defaults_to_player_one() {
        let sm = waiting_machine(0);
        assert_eq!(sm.view().local_player, Some(Player::One));
    }

    #[test]
    fn connected_with_invalid_player_is_an_anomaly() {
        let mut sm = machine();
        sm.connection_opened();
        let event = sm.handle_message(ServerMessage::Connected { player: 7 });
        assert!(matches!(
            event,
            Some(ConnectFourEvent::ProtocolAnomaly { .. })
        ));
        assert_eq!(sm.view().phase, Phase::AwaitingAssignment);
        assert_eq!(sm.view().local_player, None);
    }

    #[test]
    fn duplicate_connected_never_overwrites_assignment() {
        let mut sm = waiting_machine(1);
        let event = sm.handle_message(ServerMessage::Connected { player: 2 });
        assert_eq!(event, None);
        assert_eq!(sm.view().local_player, Some(Player::One));
        assert_eq!(sm.view().phase, Phase::WaitingForOpponent);
    }

    // ── Waiting window ──────────────────────────────────────────────

    #[test]
    fn waiting_rearms_countdown_without_phase_change() {
        let mut sm = waiting_machine(1);
        sm.handle_clock(ClockEvent {
            id: live_countdown_id(&sm),
            kind: ClockEventKind::Tick(4),
        });
        assert_eq!(sm.view().countdown_seconds_remaining, 4);

        let event = sm.handle_message(ServerMessage::Waiting {});
        assert_eq!(
            event,
            Some(ConnectFourEvent::WaitingForOpponent {
                seconds: DEFAULT_WAIT_SECONDS
            })
        );
        assert_eq!(sm.view().phase, Phase::WaitingForOpponent);
        assert_eq!(
            sm.view().countdown_seconds_remaining,
            DEFAULT_WAIT_SECONDS,
            "duplicate waiting re-arms the countdown to its full value"
        );
        assert_eq!(sm.clock.armed.len(), 2);
    }

    #[test]
    fn waiting_outside_the_waiting_phase_is_ignored() {
        let mut sm = in_progress_machine(1);
        assert_eq!(sm.handle_message(ServerMessage::Waiting {}), None);
        assert_eq!(sm.view().phase, Phase::InProgress);
    }

    #[test]
    fn ticks_update_the_countdown() {
        let mut sm = waiting_machine(1);
        let id = live_countdown_id(&sm);
        for remaining in (0..DEFAULT_WAIT_SECONDS).rev() {
            let event = sm.handle_clock(ClockEvent {
                id,
                kind: ClockEventKind::Tick(remaining),
            });
            assert_eq!(event, Some(ConnectFourEvent::CountdownTick { remaining }));
            assert_eq!(sm.view().countdown_seconds_remaining, remaining);
        }
        assert_eq!(sm.view().phase, Phase::WaitingForOpponent);
    }

    #[test]
    fn ticks_from_a_cancelled_countdown_are_never_applied() {
        let mut sm = waiting_machine(1);
        let stale_id = live_countdown_id(&sm);
        sm.handle_message(ServerMessage::Matched { player: 1 });
        assert_eq!(sm.clock.cancels, 1);

        let event = sm.handle_clock(ClockEvent {
            id: stale_id,
            kind: ClockEventKind::Tick(3),
        });
        assert_eq!(event, None);
        assert_eq!(sm.view().countdown_seconds_remaining, 0);
        assert_eq!(sm.view().phase, Phase::InProgress);
    }

    #[test]
    fn elapsed_window_still_accepts_bot_start() {
        // connected → waiting → ticks 10→0 with no match → elapsed; the
        // client stays ready for a bot_start at any tick count, including 0.
        let mut sm = waiting_machine(1);
        sm.handle_message(ServerMessage::Waiting {});
        let id = live_countdown_id(&sm);
        for remaining in (0..DEFAULT_WAIT_SECONDS).rev() {
            sm.handle_clock(ClockEvent {
                id,
                kind: ClockEventKind::Tick(remaining),
            });
        }
        let event = sm.handle_clock(ClockEvent {
            id,
            kind: ClockEventKind::Elapsed,
        });
        assert_eq!(event, Some(ConnectFourEvent::WaitWindowElapsed));
        assert_eq!(sm.view().phase, Phase::WaitingForOpponent);
        assert_eq!(sm.view().countdown_seconds_remaining, 0);

        let event = sm.handle_message(ServerMessage::BotStart { player: 1 });
        assert_eq!(
            event,
            Some(ConnectFourEvent::BotGameStarted {
                player: Player::One
            })
        );
        assert_eq!(sm.view().phase, Phase::InProgress);
        assert_eq!(sm.view().opponent, Some(OpponentKind::Bot));
    }

    // ── Game start ──────────────────────────────────────────────────

    #[test]
    fn matched_resets_to_an_empty_board_with_player_one_to_move() {
        let mut sm = waiting_machine(2);
        let event = sm.handle_message(ServerMessage::Matched { player: 2 });
        assert_eq!(
            event,
            Some(ConnectFourEvent::Matched {
                player: Player::Two
            })
        );

        let view = sm.view();
        assert_eq!(view.phase, Phase::InProgress);
        assert_eq!(view.opponent, Some(OpponentKind::Human));
        assert_eq!(view.outcome, None);
        let board = view.board.expect("board present once in progress");
        assert_eq!(board, Board::empty());
        assert_eq!(board.turn(), Player::One);

        // Player 2 cannot move until a board event flips the turn.
        assert_eq!(sm.request_move(3), Err(MoveDenied::NotYourTurn));
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 2,
        });
        assert_eq!(sm.request_move(3), Ok(()));
    }

    #[test]
    fn game_start_cancels_the_countdown() {
        let mut sm = waiting_machine(1);
        sm.handle_message(ServerMessage::BotStart { player: 1 });
        assert_eq!(sm.clock.cancels, 1);
        assert!(sm.live_countdown.is_none());
    }

    #[test]
    fn stale_game_start_does_not_reopen_a_game() {
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 2,
        });

        assert_eq!(sm.handle_message(ServerMessage::Matched { player: 2 }), None);
        assert_eq!(sm.handle_message(ServerMessage::BotStart { player: 2 }), None);

        let view = sm.view();
        assert_eq!(view.phase, Phase::InProgress);
        assert_eq!(view.local_player, Some(Player::One));
        assert_eq!(
            view.board.unwrap().cell(5, 3),
            Some(Cell::Disc(Player::One)),
            "board must not be reset by a stale game start"
        );
    }

    #[test]
    fn stale_game_start_after_conclusion_is_ignored() {
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::GameOver {
            winner: 1,
            board: None,
        });
        assert_eq!(sm.handle_message(ServerMessage::Matched { player: 1 }), None);
        assert_eq!(sm.view().phase, Phase::Concluded);
    }

    // ── Board replacement ───────────────────────────────────────────

    #[test]
    fn board_event_replaces_the_snapshot_wholesale() {
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 2,
        });

        // A later snapshot without the earlier discs fully replaces it.
        let mut second = empty_grid();
        second[5][0] = 2;
        let event = sm.handle_message(ServerMessage::Board {
            board: second,
            current_player: 1,
        });
        assert!(matches!(event, Some(ConnectFourEvent::BoardUpdated { .. })));

        let board = sm.view().board.unwrap();
        assert_eq!(board.cell(5, 3), Some(Cell::Empty), "no merging");
        assert_eq!(board.cell(5, 0), Some(Cell::Disc(Player::Two)));
        assert_eq!(board.turn(), Player::One);
    }

    #[test]
    fn malformed_board_is_dropped_and_last_board_retained() {
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 2,
        });

        let mut bad = empty_grid();
        bad[0][0] = 9;
        let event = sm.handle_message(ServerMessage::Board {
            board: bad,
            current_player: 1,
        });
        assert!(matches!(
            event,
            Some(ConnectFourEvent::ProtocolAnomaly { .. })
        ));

        let board = sm.view().board.unwrap();
        assert_eq!(board.cell(5, 3), Some(Cell::Disc(Player::One)));
        assert_eq!(board.turn(), Player::Two, "previous snapshot retained");
    }

    #[test]
    fn board_with_invalid_turn_is_dropped() {
        let mut sm = in_progress_machine(1);
        let event = sm.handle_message(ServerMessage::Board {
            board: empty_grid(),
            current_player: 0,
        });
        assert!(matches!(
            event,
            Some(ConnectFourEvent::ProtocolAnomaly { .. })
        ));
        assert_eq!(sm.view().board.unwrap(), Board::empty());
    }

    #[test]
    fn board_before_any_game_is_ignored() {
        let mut sm = waiting_machine(1);
        let event = sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 1,
        });
        assert_eq!(event, None);
        assert_eq!(sm.view().board, None);
        assert_eq!(sm.view().phase, Phase::WaitingForOpponent);
    }

    #[test]
    fn turn_flip_revokes_the_move_permission() {
        let mut sm = in_progress_machine(1);
        assert_eq!(sm.request_move(3), Ok(()));

        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 2,
        });
        for column in 0..COLS {
            assert_eq!(sm.request_move(column), Err(MoveDenied::NotYourTurn));
        }
    }

    // ── Conclusion ──────────────────────────────────────────────────

    #[test]
    fn game_over_concludes_and_later_boards_do_not_revert() {
        let mut sm = in_progress_machine(1);
        let event = sm.handle_message(ServerMessage::GameOver {
            winner: 1,
            board: Some(mid_game_grid()),
        });
        assert_eq!(
            event,
            Some(ConnectFourEvent::GameConcluded {
                winner: Player::One,
                you_won: Some(true),
            })
        );

        let view = sm.view();
        assert_eq!(view.phase, Phase::Concluded);
        assert_eq!(view.outcome, Some(Outcome { winner: Player::One }));
        assert_eq!(
            view.board.unwrap().cell(5, 3),
            Some(Cell::Disc(Player::One)),
            "final board from game_over reconciles the display"
        );

        // A later board reconciles display state without reverting phase.
        let event = sm.handle_message(ServerMessage::Board {
            board: empty_grid(),
            current_player: 1,
        });
        assert!(matches!(event, Some(ConnectFourEvent::BoardUpdated { .. })));
        let view = sm.view();
        assert_eq!(view.phase, Phase::Concluded);
        assert_eq!(view.outcome, Some(Outcome { winner: Player::One }));
        assert_eq!(sm.request_move(0), Err(MoveDenied::NotInProgress));
    }

    #[test]
    fn game_concluded_fires_exactly_once() {
        let mut sm = in_progress_machine(2);
        let first = sm.handle_message(ServerMessage::GameOver {
            winner: 1,
            board: None,
        });
        assert_eq!(
            first,
            Some(ConnectFourEvent::GameConcluded {
                winner: Player::One,
                you_won: Some(false),
            })
        );
        let second = sm.handle_message(ServerMessage::GameOver {
            winner: 1,
            board: None,
        });
        assert_eq!(second, None, "duplicate game_over is stale");
    }

    #[test]
    fn game_over_with_invalid_winner_is_an_anomaly() {
        let mut sm = in_progress_machine(1);
        let event = sm.handle_message(ServerMessage::GameOver {
            winner: 0,
            board: None,
        });
        assert!(matches!(
            event,
            Some(ConnectFourEvent::ProtocolAnomaly { .. })
        ));
        assert_eq!(sm.view().phase, Phase::InProgress);
    }

    #[test]
    fn game_over_with_malformed_final_board_still_concludes() {
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 1,
        });
        let mut bad = empty_grid();
        bad.pop();
        let event = sm.handle_message(ServerMessage::GameOver {
            winner: 2,
            board: Some(bad),
        });
        assert!(matches!(
            event,
            Some(ConnectFourEvent::GameConcluded { .. })
        ));
        let view = sm.view();
        assert_eq!(view.phase, Phase::Concluded);
        assert_eq!(
            view.board.unwrap().cell(5, 3),
            Some(Cell::Disc(Player::One)),
            "previous board retained when the final payload is malformed"
        );
    }

    // ── Disconnect and resume ───────────────────────────────────────

    #[test]
    fn transport_close_preserves_display_state_and_clears_assignment() {
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 2,
        });
        sm.transport_closed();

        let view = sm.view();
        assert_eq!(view.phase, Phase::Disconnected);
        assert_eq!(view.local_player, None);
        assert_eq!(view.last_assignment, Some(Player::One));
        assert!(view.board.is_some(), "board kept for display");
        assert_eq!(sm.request_move(0), Err(MoveDenied::NotInProgress));
    }

    #[test]
    fn transport_close_cancels_a_running_countdown() {
        let mut sm = waiting_machine(1);
        sm.transport_closed();
        assert_eq!(sm.clock.cancels, 1);
        assert_eq!(sm.view().countdown_seconds_remaining, 0);
    }

    #[test]
    fn resume_restores_the_exact_board_without_a_new_match() {
        // Play a game, drop the transport mid-game.
        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::Board {
            board: mid_game_grid(),
            current_player: 1,
        });
        sm.transport_closed();
        let prior = sm.view();

        // Fresh connection seeded with the prior view.
        let mut resumed = SessionStateMachine::resume(
            ManualClock::default(),
            DEFAULT_WAIT_SECONDS,
            &prior,
        );
        resumed.connection_opened();
        let event = resumed.handle_message(ServerMessage::Reconnected {
            board: mid_game_grid(),
            current_player: 1,
        });
        assert!(matches!(event, Some(ConnectFourEvent::GameResumed { .. })));

        let view = resumed.view();
        assert_eq!(view.phase, Phase::InProgress);
        assert_eq!(view.local_player, Some(Player::One));
        assert_eq!(view.board.unwrap().cell(5, 3), Some(Cell::Disc(Player::One)));
        assert_eq!(resumed.request_move(3), Ok(()));
    }

    #[test]
    fn reconnected_while_waiting_cancels_the_countdown() {
        let mut sm = waiting_machine(1);
        let event = sm.handle_message(ServerMessage::Reconnected {
            board: mid_game_grid(),
            current_player: 2,
        });
        assert!(matches!(event, Some(ConnectFourEvent::GameResumed { .. })));
        assert_eq!(sm.clock.cancels, 1);
        assert_eq!(sm.view().phase, Phase::InProgress);
        assert_eq!(sm.view().countdown_seconds_remaining, 0);
    }

    #[test]
    fn reconnected_mid_game_replaces_the_snapshot() {
        let mut sm = in_progress_machine(1);
        let event = sm.handle_message(ServerMessage::Reconnected {
            board: mid_game_grid(),
            current_player: 1,
        });
        assert!(matches!(event, Some(ConnectFourEvent::GameResumed { .. })));
        assert_eq!(
            sm.view().board.unwrap().cell(5, 4),
            Some(Cell::Disc(Player::Two))
        );
    }

    #[test]
    fn reconnected_without_a_transport_is_ignored() {
        let mut sm = machine();
        let event = sm.handle_message(ServerMessage::Reconnected {
            board: mid_game_grid(),
            current_player: 1,
        });
        assert_eq!(event, None);
        assert_eq!(sm.view().phase, Phase::Disconnected);
    }

    // ── Server error passthrough ────────────────────────────────────

    #[test]
    fn server_error_surfaces_without_state_change() {
        let mut sm = in_progress_machine(1);
        let before = sm.view();
        let event = sm.handle_message(ServerMessage::Error {});
        assert_eq!(event, Some(ConnectFourEvent::MoveRejected));
        assert_eq!(sm.view(), before);
    }

    // ── The move guard, exhaustively ────────────────────────────────

    #[test]
    fn move_guard_denies_in_every_non_playing_phase() {
        let sm = machine();
        assert_eq!(sm.request_move(0), Err(MoveDenied::NotInProgress));

        let mut sm = machine();
        sm.connection_opened();
        assert_eq!(sm.request_move(0), Err(MoveDenied::NotInProgress));

        let sm = waiting_machine(1);
        assert_eq!(sm.request_move(0), Err(MoveDenied::NotInProgress));

        let mut sm = in_progress_machine(1);
        sm.handle_message(ServerMessage::GameOver {
            winner: 2,
            board: None,
        });
        assert_eq!(sm.request_move(0), Err(MoveDenied::NotInProgress));
    }

    #[test]
    fn move_guard_allows_exactly_on_own_turn_in_progress() {
        // Allowed iff phase = InProgress ∧ board.turn = local ∧ no outcome.
        for local in [1u8, 2u8] {
            for turn in [1u8, 2u8] {
                let mut sm = in_progress_machine(local);
                sm.handle_message(ServerMessage::Board {
                    board: empty_grid(),
                    current_player: turn,
                });
                let verdict = sm.request_move(3);
                if local == turn {
                    assert_eq!(verdict, Ok(()), "local {local} turn {turn}");
                } else {
                    assert_eq!(verdict, Err(MoveDenied::NotYourTurn));
                }
            }
        }
    }

    #[test]
    fn move_guard_rejects_off_board_columns() {
        let sm = in_progress_machine(1);
        assert_eq!(sm.request_move(7), Err(MoveDenied::ColumnOutOfRange(7)));
        assert_eq!(sm.request_move(6), Ok(()));
    }

    #[test]
    fn move_guard_on_hand_built_views() {
        // The predicate is total over presentation-layer views too.
        let view = SessionView::default();
        assert_eq!(view.request_move(0), Err(MoveDenied::NotInProgress));

        let view = SessionView {
            phase: Phase::InProgress,
            board: Some(Board::empty()),
            local_player: None,
            ..SessionView::default()
        };
        assert_eq!(view.request_move(0), Err(MoveDenied::NotAssigned));

        let view = SessionView {
            phase: Phase::InProgress,
            board: Some(Board::empty()),
            local_player: Some(Player::One),
            outcome: Some(Outcome { winner: Player::One }),
            ..SessionView::default()
        };
        assert_eq!(view.request_move(0), Err(MoveDenied::GameOver));

        let view = SessionView {
            phase: Phase::InProgress,
            board: None,
            local_player: Some(Player::One),
            ..SessionView::default()
        };
        assert_eq!(view.request_move(0), Err(MoveDenied::NotInProgress));
    }
}
