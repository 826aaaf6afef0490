//! Wire protocol for the tic-tac-toe room service.
//!
//! This crate defines the language clients and servers speak:
//!
//! - **Types** ([`ClientMessage`], [`ClientRequest`], [`ResultEnvelope`],
//!   [`Board`], [`Symbol`], [`ErrorCode`], etc.) — the message structures
//!   that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! The protocol layer doesn't know about connections or rooms; it only
//! knows how to serialize and deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage/ClientRequest) → Room (state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    empty_board, Board, Cell, ClientMessage, ClientRequest, ErrorCode, GameResult, PlayerId,
    ResultEnvelope, RoomCode, Symbol,
};
