//! Unified error type for the room service's process boundary.

use ttt_protocol::ProtocolError;
use ttt_room::RoomError;
use ttt_transport::TransportError;

/// Top-level error covering everything that can go wrong binding the
/// listener or running the accept loop. Per-request failures never reach
/// this type — they're reported to the caller as a `ResultEnvelope` error
/// code instead (see `ttt_room::RoomError::to_error_code`).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),
}
