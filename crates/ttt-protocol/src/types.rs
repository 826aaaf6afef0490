//! Core protocol types for the tic-tac-toe room service's wire format.
//!
//! This module defines every type that travels "on the wire" — the
//! structures that get serialized to JSON, sent over the transport, and
//! deserialized on the other side. Think of it as the language the client
//! and server speak.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A globally unique player identifier.
///
/// Newtype around [`Uuid`] rather than a raw `String` — the wire rule
/// ("parseable as a 128-bit UUID, compact or canonical") is enforced by
/// construction instead of re-validated by every caller.
///
/// `#[serde(transparent)]` serializes this as the UUID's canonical string,
/// not as `{ "0": "..." }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Generates a fresh, random player id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(PlayerId)
    }
}

/// A room's short join code: 4–6 uppercase alphanumeric characters drawn
/// from the ambiguity-free alphabet in [`crate::config`]-style configs.
///
/// Kept as a validated newtype rather than a bare `String` so a handler
/// that has a `RoomCode` in hand never needs to re-check its shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Wraps an already-known-good code (e.g. one just generated by the
    /// code generator) without re-validating it.
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Validates a client-supplied code: 4–6 chars, `[A-Z0-9]+`.
    pub fn parse(code: &str) -> Result<Self, ProtocolError> {
        let len = code.len();
        if !(4..=6).contains(&len)
            || !code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code '{code}' is not 4-6 uppercase alphanumeric characters"
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Board and cells
// ---------------------------------------------------------------------------

/// A single board cell. Serializes as the bare integer the wire format
/// specifies (`0`=empty, `1`=X, `2`=O), not as a tagged string — the
/// `Serialize`/`Deserialize` impls below are hand-written for this reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    X,
    O,
}

impl Cell {
    pub fn from_symbol(symbol: Symbol) -> Self {
        match symbol {
            Symbol::X => Cell::X,
            Symbol::O => Cell::O,
        }
    }

    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Cell::Empty => None,
            Cell::X => Some(Symbol::X),
            Cell::O => Some(Symbol::O),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let n: u8 = match self {
            Cell::Empty => 0,
            Cell::X => 1,
            Cell::O => 2,
        };
        serializer.serialize_u8(n)
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Cell::Empty),
            1 => Ok(Cell::X),
            2 => Ok(Cell::O),
            other => Err(D::Error::custom(format!("invalid board cell value {other}"))),
        }
    }
}

/// A 3x3 board, stored row-major as 9 cells.
pub type Board = [Cell; 9];

/// A fresh, all-empty board.
pub fn empty_board() -> Board {
    [Cell::Empty; 9]
}

// ---------------------------------------------------------------------------
// Symbol
// ---------------------------------------------------------------------------

/// One of the two marks a player plays with. Unit-only enums serialize as
/// their bare variant name in `serde_json` (`Symbol::X` → `"X"`), matching
/// the wire rule that `symbol`/`currentTurn` are `"X"`/`"O"`/`null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn opponent(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => write!(f, "X"),
            Symbol::O => write!(f, "O"),
        }
    }
}

// ---------------------------------------------------------------------------
// Game result
// ---------------------------------------------------------------------------

/// The outcome reported in a `GameOver` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Winner,
    Draw,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Every error code an RPC response can carry, each with a fixed,
/// human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidIndex,
    CellTaken,
    NotYourTurn,
    OpponentDisconnected,
    GameOver,
    Invalid,
    NotFound,
    RoomFull,
    AlreadyInRoom,
    ReconnectRequired,
    PlayerIdInUse,
    NotInGame,
    ReconnectFailed,
    OfferFailed,
    AcceptFailed,
}

impl ErrorCode {
    /// The fixed, human-readable message for this code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::InvalidIndex => "Move index must be between 0 and 8",
            ErrorCode::CellTaken => "That cell is already occupied",
            ErrorCode::NotYourTurn => "It is not your turn",
            ErrorCode::OpponentDisconnected => "Your opponent is disconnected",
            ErrorCode::GameOver => "The game has already ended",
            ErrorCode::Invalid => "The request was invalid",
            ErrorCode::NotFound => "The room could not be found",
            ErrorCode::RoomFull => "The room is already full",
            ErrorCode::AlreadyInRoom => "You are already connected to this room",
            ErrorCode::ReconnectRequired => "This player slot is disconnected; reconnect instead",
            ErrorCode::PlayerIdInUse => "That player id is already connected from elsewhere",
            ErrorCode::NotInGame => "You are not a player in this room",
            ErrorCode::ReconnectFailed => "Reconnection failed",
            ErrorCode::OfferFailed => "The rematch could not be offered",
            ErrorCode::AcceptFailed => "The rematch could not be accepted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// The uniform record every RPC returns to its caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub correlation_id: Uuid,
    pub server_timestamp: DateTime<Utc>,
}

impl<T: Serialize> ResultEnvelope<T> {
    /// Builds a success envelope carrying `payload`.
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_code: None,
            error_message: None,
            details: None,
            correlation_id: Uuid::new_v4(),
            server_timestamp: Utc::now(),
        }
    }

    /// Builds a failure envelope for `code`, using its fixed message.
    pub fn err(code: ErrorCode) -> Self {
        Self {
            success: false,
            payload: None,
            error_code: Some(code),
            error_message: Some(code.message().to_string()),
            details: None,
            correlation_id: Uuid::new_v4(),
            server_timestamp: Utc::now(),
        }
    }

    /// Builds a failure envelope for `code` with extra diagnostic `details`.
    pub fn err_with_details(code: ErrorCode, details: impl Into<String>) -> Self {
        let mut envelope = Self::err(code);
        envelope.details = Some(details.into());
        envelope
    }
}

// ---------------------------------------------------------------------------
// Client-bound messages (unsolicited pushes)
// ---------------------------------------------------------------------------

/// Every message the server can push to a client, either directly or via a
/// room group broadcast.
///
/// `#[serde(tag = "type")]` keeps the JSON shape `{ "type": "GameCreated",
/// ... }`; `rename_all_fields` renames each variant's fields to camelCase
/// without touching the `type` tag itself, matching the wire rule that
/// payload fields (not message names) use camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientMessage {
    GameCreated {
        room_code: RoomCode,
        board: Board,
        player_id: PlayerId,
    },
    GameJoined {
        room_code: RoomCode,
        board: Board,
        symbol: Symbol,
        current_turn: Option<Symbol>,
        player_id: PlayerId,
    },
    GameStarted {
        board: Board,
        current_turn: Option<Symbol>,
    },
    GameFull {
        room_code: RoomCode,
    },
    PlayerJoined,
    PlayerLeft {
        player_id: PlayerId,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    SyncedState {
        board: Board,
        symbol: Option<Symbol>,
        current_turn: Option<Symbol>,
        is_game_over: bool,
        winner: Option<Symbol>,
    },
    BoardUpdated {
        board: Board,
        current_turn: Option<Symbol>,
        is_game_over: bool,
        winner: Option<Symbol>,
    },
    CountdownTick {
        player_id: PlayerId,
        remaining_seconds: u64,
    },
    TurnCountdownResumed {
        player_id: PlayerId,
        total_seconds: u64,
        expires_at_utc: DateTime<Utc>,
        server_now: DateTime<Utc>,
    },
    TurnCountdownTick {
        player_id: PlayerId,
        remaining_seconds: u64,
        expires_at_utc: DateTime<Utc>,
        server_now: DateTime<Utc>,
    },
    TurnCountdownPaused {
        player_id: PlayerId,
        remaining_seconds: u64,
        server_now: DateTime<Utc>,
    },
    RematchOffered {
        player_id: PlayerId,
        expires_at: DateTime<Utc>,
    },
    RematchWindowStarted {
        expires_at: DateTime<Utc>,
    },
    RematchWindowExpired {
        room_code: RoomCode,
    },
    RematchStarted {
        room_code: RoomCode,
    },
    GameOver {
        room_code: RoomCode,
        result: GameResult,
        winner_id: Option<PlayerId>,
        winner_symbol: Option<Symbol>,
        board_snapshot: Option<Board>,
        current_turn: Option<Symbol>,
        is_game_over: bool,
        message: Option<String>,
        correlation_id: Option<Uuid>,
        server_timestamp: Option<DateTime<Utc>>,
    },
    RoomClosed {
        room_code: RoomCode,
    },
}

// ---------------------------------------------------------------------------
// Client-originated requests
// ---------------------------------------------------------------------------

/// Every request a client can send. `player_id`/`client_player_id` are the
/// fields the client actually supplies on the wire; the transport-assigned
/// `ConnectionId` behind the scenes is never part of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientRequest {
    CreateGame,
    JoinGame {
        room_code: RoomCode,
        client_player_id: Option<PlayerId>,
    },
    Reconnect {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    GetGameState {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    MakeMove {
        room_code: RoomCode,
        index: usize,
        player_id: Option<PlayerId>,
    },
    OfferRematch {
        room_code: RoomCode,
    },
    AcceptRematch {
        room_code: RoomCode,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_round_trips_through_canonical_uuid_string() {
        let id = PlayerId::new();
        let json = serde_json::to_string(&id).unwrap();
        let decoded: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn player_id_parses_both_compact_and_canonical_forms() {
        let canonical = "550e8400-e29b-41d4-a716-446655440000";
        let compact = "550e8400e29b41d4a716446655440000";
        assert_eq!(
            PlayerId::from_str(canonical).unwrap(),
            PlayerId::from_str(compact).unwrap()
        );
    }

    #[test]
    fn room_code_rejects_lowercase_and_bad_length() {
        assert!(RoomCode::parse("abcd").is_err());
        assert!(RoomCode::parse("AB").is_err());
        assert!(RoomCode::parse("ABCDEFG").is_err());
        assert!(RoomCode::parse("ABC123").is_ok());
    }

    #[test]
    fn cell_serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&Cell::Empty).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Cell::X).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Cell::O).unwrap(), "2");
    }

    #[test]
    fn cell_rejects_out_of_range_integers() {
        let result: Result<Cell, _> = serde_json::from_str("3");
        assert!(result.is_err());
    }

    #[test]
    fn symbol_serializes_as_bare_string() {
        assert_eq!(serde_json::to_string(&Symbol::X).unwrap(), "\"X\"");
        assert_eq!(serde_json::to_string(&Symbol::O).unwrap(), "\"O\"");
    }

    #[test]
    fn symbol_opponent_toggles() {
        assert_eq!(Symbol::X.opponent(), Symbol::O);
        assert_eq!(Symbol::O.opponent(), Symbol::X);
    }

    #[test]
    fn client_message_tag_is_bare_variant_name_with_camel_case_fields() {
        let msg = ClientMessage::GameFull {
            room_code: RoomCode::new_unchecked("ABC123"),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "GameFull");
        assert_eq!(json["roomCode"], "ABC123");
    }

    #[test]
    fn game_over_field_names_are_camel_case() {
        let msg = ClientMessage::GameOver {
            room_code: RoomCode::new_unchecked("ABC123"),
            result: GameResult::Winner,
            winner_id: Some(PlayerId::new()),
            winner_symbol: Some(Symbol::X),
            board_snapshot: Some(empty_board()),
            current_turn: None,
            is_game_over: true,
            message: Some("done".to_string()),
            correlation_id: None,
            server_timestamp: None,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "GameOver");
        assert!(json.get("winnerId").is_some());
        assert!(json.get("isGameOver").is_some());
    }

    #[test]
    fn result_envelope_omits_absent_optional_fields() {
        let envelope = ResultEnvelope::ok(42);
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["payload"], 42);
        assert!(json.get("errorCode").is_none());
    }

    #[test]
    fn result_envelope_err_carries_fixed_message() {
        let envelope: ResultEnvelope<()> = ResultEnvelope::err(ErrorCode::CellTaken);
        assert_eq!(envelope.error_message.as_deref(), Some(ErrorCode::CellTaken.message()));
    }

    #[test]
    fn client_request_make_move_round_trips() {
        let req = ClientRequest::MakeMove {
            room_code: RoomCode::new_unchecked("ABC123"),
            index: 4,
            player_id: Some(PlayerId::new()),
        };
        let json = serde_json::to_string(&req).unwrap();
        let decoded: ClientRequest = serde_json::from_str(&json).unwrap();
        match decoded {
            ClientRequest::MakeMove { index, .. } => assert_eq!(index, 4),
            _ => panic!("wrong variant"),
        }
    }
}
