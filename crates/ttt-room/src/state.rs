//! Room state (C2): the mutable data a lock actually guards.
//!
//! `Room` is deliberately not `Clone` — a `TimerHandle` owns a
//! `oneshot::Sender` that must not be duplicated. Callers that need to
//! broadcast after a mutation capture a [`RoomSnapshot`] under the lock
//! instead of cloning the room itself.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rand::Rng;
use ttt_protocol::{Board, PlayerId, Symbol};
use ttt_transport::ConnectionId;

use crate::engine::{self, MoveOutcome};
use crate::error::RoomError;
use crate::machine::{RoomEvent, RoomState};
use crate::timer_handle::TimerHandle;

/// One seat at the table.
pub struct Player {
    pub player_id: PlayerId,
    pub connection_id: Option<ConnectionId>,
    pub symbol: Option<Symbol>,
    /// Whether this player has already spent their one reconnection grace
    /// period for the current game.
    pub grace_used: bool,
    pub reconnection_timer: Option<TimerHandle>,
    pub reconnection_expires_at: Option<Instant>,
    pub turn_timer: Option<TimerHandle>,
    pub turn_expires_at: Option<Instant>,
    pub remaining_turn_seconds: Option<u64>,
}

impl Player {
    fn new(player_id: PlayerId, connection_id: ConnectionId) -> Self {
        Self {
            player_id,
            connection_id: Some(connection_id),
            symbol: None,
            grace_used: false,
            reconnection_timer: None,
            reconnection_expires_at: None,
            turn_timer: None,
            turn_expires_at: None,
            remaining_turn_seconds: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_id.is_some()
    }
}

/// A point-in-time, lock-free copy of the fields a broadcast needs to
/// report, taken right before the lock is released.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub board: Board,
    pub current_turn: Option<Symbol>,
    pub is_game_over: bool,
    pub winner: Option<Symbol>,
}

pub struct Room {
    pub code: ttt_protocol::RoomCode,
    pub board: Board,
    pub players: HashMap<PlayerId, Player>,
    pub player_order: Vec<PlayerId>,
    pub current_turn: Option<Symbol>,
    pub is_game_over: bool,
    pub winner: Option<Symbol>,
    pub rematch_offers: HashSet<PlayerId>,
    pub rematch_expires_at: Option<Instant>,
    pub created_at: Instant,
    pub last_activity_at: Instant,
    /// Bumped on every rematch reset; timer tasks compare their captured
    /// copy against the live value to detect they woke up stale.
    pub turn_timer_version: u64,
    pub state: RoomState,
}

impl Room {
    pub fn new(code: ttt_protocol::RoomCode) -> Self {
        let now = Instant::now();
        Self {
            code,
            board: engine::create_board(),
            players: HashMap::new(),
            player_order: Vec::new(),
            current_turn: None,
            is_game_over: false,
            winner: None,
            rematch_offers: HashSet::new(),
            rematch_expires_at: None,
            created_at: now,
            last_activity_at: now,
            turn_timer_version: 0,
            state: RoomState::initial(),
        }
    }

    pub fn can_join(&self, max_players: usize) -> bool {
        self.player_order.len() < max_players
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    /// Adds or updates a connection for `player_id`. Idempotent: assigning
    /// the same connection again is a no-op beyond the activity bump. If
    /// `player_id` is new and capacity allows, a fresh `Player` is created
    /// and appended to `player_order`.
    pub fn add_connection(
        &mut self,
        player_id: PlayerId,
        connection_id: ConnectionId,
        max_players: usize,
    ) -> Result<(), RoomError> {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.connection_id = Some(connection_id);
        } else {
            if !self.can_join(max_players) {
                return Err(RoomError::RoomFull);
            }
            self.players
                .insert(player_id, Player::new(player_id, connection_id));
            self.player_order.push(player_id);
        }
        self.touch();
        Ok(())
    }

    /// Nulls out whichever player currently holds `connection_id`.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) {
        for player in self.players.values_mut() {
            if player.connection_id == Some(connection_id) {
                player.connection_id = None;
            }
        }
        self.touch();
    }

    pub fn player_by_connection(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.connection_id == Some(connection_id))
    }

    pub fn all_connected(&self) -> bool {
        self.player_order
            .iter()
            .all(|id| self.players.get(id).is_some_and(Player::is_connected))
    }

    /// Assigns symbols and starts the game if exactly two players have
    /// joined and no symbols have been assigned yet.
    pub fn try_start_game(&mut self, rng: &mut impl Rng) -> bool {
        if !self.start_game_internal(rng) {
            return false;
        }
        self.apply_event(RoomEvent::PlayerJoined);
        true
    }

    /// Symbol-assignment half of starting a game, shared by
    /// [`Self::try_start_game`] (the initial `WaitingForPlayers` -> `Active`
    /// transition) and [`Self::reset_for_rematch`] (the `RematchAccepted`
    /// -> `Active` transition) — each fires its own machine event on top.
    fn start_game_internal(&mut self, rng: &mut impl Rng) -> bool {
        if self.player_order.len() != 2 || self.current_turn.is_some() {
            return false;
        }
        let (first, second) = engine::assign_symbols(rng);
        let mut symbols = [first, second].into_iter();
        for id in self.player_order.clone() {
            if let Some(player) = self.players.get_mut(&id) {
                player.symbol = symbols.next();
            }
        }
        self.current_turn = Some(Symbol::X);
        self.touch();
        true
    }

    /// Applies a move arriving over `connection_id` at `index`, gated in
    /// the documented order: game-over, unknown player, opponent
    /// disconnected, wrong turn, then delegated to the pure engine.
    pub fn try_make_move(
        &mut self,
        connection_id: ConnectionId,
        index: usize,
    ) -> Result<MoveOutcome, RoomError> {
        if self.is_game_over {
            return Err(RoomError::GameOver);
        }

        let player_id = self
            .player_by_connection(connection_id)
            .map(|p| p.player_id)
            .ok_or(RoomError::NotInGame)?;
        let symbol = self
            .players
            .get(&player_id)
            .and_then(|p| p.symbol)
            .ok_or(RoomError::NotInGame)?;

        if !self.all_connected() {
            return Err(RoomError::OpponentDisconnected);
        }
        if self.current_turn != Some(symbol) {
            return Err(RoomError::NotYourTurn);
        }

        let outcome = engine::try_apply_move(&mut self.board, symbol, index);
        match outcome {
            MoveOutcome::InvalidIndex => return Err(RoomError::InvalidIndex),
            MoveOutcome::CellTaken => return Err(RoomError::CellTaken),
            MoveOutcome::Win(winner) => {
                self.is_game_over = true;
                self.winner = Some(winner);
                self.apply_event(RoomEvent::GameWon);
            }
            MoveOutcome::Draw => {
                self.is_game_over = true;
                self.winner = None;
                self.apply_event(RoomEvent::GameDrawn);
            }
            MoveOutcome::Continue(next) => {
                self.current_turn = Some(next);
                self.apply_event(RoomEvent::MoveMade);
            }
        }
        self.touch();
        Ok(outcome)
    }

    /// `player_id`'s opponent wins by forfeit.
    pub fn forfeit(&mut self, player_id: PlayerId) {
        let winner = self
            .player_order
            .iter()
            .find(|id| **id != player_id)
            .and_then(|id| self.players.get(id))
            .and_then(|p| p.symbol);
        self.is_game_over = true;
        self.winner = winner;
        self.apply_event(RoomEvent::PlayerForfeited);
        self.touch();
    }

    /// Clears board, symbols, and per-player game state for a new game in
    /// the same room, per the rematch protocol.
    pub fn reset_for_rematch(&mut self, rng: &mut impl Rng) {
        self.board = engine::create_board();
        self.current_turn = None;
        self.is_game_over = false;
        self.winner = None;
        self.rematch_offers.clear();
        self.rematch_expires_at = None;
        self.turn_timer_version += 1;

        for player in self.players.values_mut() {
            player.symbol = None;
            player.grace_used = false;
            player.reconnection_timer = None;
            player.reconnection_expires_at = None;
            player.turn_timer = None;
            player.turn_expires_at = None;
            player.remaining_turn_seconds = None;
        }

        if self.start_game_internal(rng) {
            self.apply_event(RoomEvent::FirstMoveMade);
        }
        self.touch();
    }

    /// Per §4.9: a room not yet started, under-filled, and idle past
    /// `idle_timeout`, or one where every player is currently disconnected.
    pub fn is_idle_for_cleanup(&self, idle_timeout: Duration) -> bool {
        let game_not_started = self.player_order.len() < 2
            && self.players.values().all(|p| p.symbol.is_none());
        let idle_too_long = self.last_activity_at.elapsed() > idle_timeout;
        if game_not_started && idle_too_long {
            return true;
        }
        !self.player_order.is_empty()
            && self.player_order.iter().all(|id| {
                self.players
                    .get(id)
                    .is_some_and(|p| !p.is_connected())
            })
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            board: self.board,
            current_turn: self.current_turn,
            is_game_over: self.is_game_over,
            winner: self.winner,
        }
    }

    /// Drives the lifecycle state machine, logging and ignoring invalid
    /// transitions.
    pub fn apply_event(&mut self, event: RoomEvent) -> bool {
        self.state.apply(event)
    }
}
