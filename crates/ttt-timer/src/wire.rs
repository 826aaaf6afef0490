//! Helpers for turning a [`ClientMessage`] into bytes on a shared
//! [`Broadcaster`], and for translating monotonic deadlines into the wall
//! clock timestamps the wire format carries.

use std::time::Instant;

use chrono::{DateTime, Utc};
use ttt_protocol::{Board, ClientMessage, Codec, GameResult, JsonCodec, PlayerId, RoomCode, Symbol};
use ttt_transport::ConnectionId;

use crate::context::Context;

/// Converts a `tokio`/`std` monotonic deadline into a wall-clock timestamp,
/// anchored against the current instant/UTC pair at the moment of the
/// call. `Instant` carries no wall-clock relationship on its own, so every
/// conversion re-anchors rather than caching a single offset.
pub fn instant_to_utc(deadline: Instant) -> DateTime<Utc> {
    let now_instant = Instant::now();
    let now_utc = Utc::now();
    if deadline >= now_instant {
        now_utc
            + chrono::Duration::from_std(deadline - now_instant).unwrap_or(chrono::Duration::zero())
    } else {
        now_utc
            - chrono::Duration::from_std(now_instant - deadline).unwrap_or(chrono::Duration::zero())
    }
}

fn encode(msg: &ClientMessage) -> Option<Vec<u8>> {
    match JsonCodec.encode(msg) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::error!(?err, "failed to encode outgoing message");
            None
        }
    }
}

/// Sends `msg` to every connection subscribed to `code`'s group.
pub fn broadcast(ctx: &Context, code: &ttt_protocol::RoomCode, msg: ClientMessage) {
    if let Some(bytes) = encode(&msg) {
        ctx.broadcaster.send_to_group(code.as_str(), bytes);
    }
}

/// Sends `msg` to a single connection.
pub fn send_to(ctx: &Context, connection_id: ConnectionId, msg: ClientMessage) {
    if let Some(bytes) = encode(&msg) {
        ctx.broadcaster.send_to(connection_id, bytes);
    }
}

/// Sends `msg` to every connection in `code`'s group except `except` —
/// used when the triggering connection already received a differently
/// shaped direct reply.
pub fn broadcast_except(ctx: &Context, code: &RoomCode, except: ConnectionId, msg: ClientMessage) {
    if let Some(bytes) = encode(&msg) {
        ctx.broadcaster
            .send_to_group_except(code.as_str(), except, bytes);
    }
}

/// Builds a `GameOver` message, filling in the fields a background timer
/// service (rather than a request handler) has on hand: no correlation id,
/// a server-stamped timestamp.
#[allow(clippy::too_many_arguments)]
pub fn game_over_message(
    code: &RoomCode,
    result: GameResult,
    winner_id: Option<PlayerId>,
    winner_symbol: Option<Symbol>,
    board_snapshot: Option<Board>,
    current_turn: Option<Symbol>,
    message: Option<String>,
) -> ClientMessage {
    ClientMessage::GameOver {
        room_code: code.clone(),
        result,
        winner_id,
        winner_symbol,
        board_snapshot,
        current_turn,
        is_game_over: true,
        message,
        correlation_id: None,
        server_timestamp: Some(Utc::now()),
    }
}
