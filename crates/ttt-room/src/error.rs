//! Error types for the room layer.

use ttt_protocol::ErrorCode;

/// Errors that can occur during room operations.
///
/// Every variant maps onto exactly one [`ErrorCode`] via [`RoomError::to_error_code`],
/// so a request handler never needs its own parallel classification logic.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomError {
    #[error("move index must be between 0 and 8")]
    InvalidIndex,

    #[error("that cell is already occupied")]
    CellTaken,

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("your opponent is disconnected")]
    OpponentDisconnected,

    #[error("the game has already ended")]
    GameOver,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("room not found")]
    NotFound,

    #[error("room is already full")]
    RoomFull,

    #[error("already connected to this room")]
    AlreadyInRoom,

    #[error("player slot is disconnected; reconnect instead")]
    ReconnectRequired,

    #[error("that player id is already connected from elsewhere")]
    PlayerIdInUse,

    #[error("not a player in this room")]
    NotInGame,

    #[error("reconnection failed")]
    ReconnectFailed,

    #[error("rematch could not be offered")]
    OfferFailed,

    #[error("rematch could not be accepted")]
    AcceptFailed,
}

impl RoomError {
    /// Maps this error onto the wire-level error code carrying the same meaning.
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            RoomError::InvalidIndex => ErrorCode::InvalidIndex,
            RoomError::CellTaken => ErrorCode::CellTaken,
            RoomError::NotYourTurn => ErrorCode::NotYourTurn,
            RoomError::OpponentDisconnected => ErrorCode::OpponentDisconnected,
            RoomError::GameOver => ErrorCode::GameOver,
            RoomError::Invalid(_) => ErrorCode::Invalid,
            RoomError::NotFound => ErrorCode::NotFound,
            RoomError::RoomFull => ErrorCode::RoomFull,
            RoomError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            RoomError::ReconnectRequired => ErrorCode::ReconnectRequired,
            RoomError::PlayerIdInUse => ErrorCode::PlayerIdInUse,
            RoomError::NotInGame => ErrorCode::NotInGame,
            RoomError::ReconnectFailed => ErrorCode::ReconnectFailed,
            RoomError::OfferFailed => ErrorCode::OfferFailed,
            RoomError::AcceptFailed => ErrorCode::AcceptFailed,
        }
    }
}
