//! Room teardown: cancelling every outstanding timer before the room is
//! removed from the registry, per the ordering guarantee in §5 — a room
//! removal must cancel every timer in that room before deletion returns.

use ttt_protocol::RoomCode;
use ttt_room::{CancelReason, RoomEvent, SharedRoom};

use crate::context::Context;

/// Cancels every player's reconnection/turn timer in `room`, then deletes
/// `code` from the registry. Returns whether a room was actually removed.
pub fn close_room(ctx: &Context, code: &RoomCode, room: &SharedRoom) -> bool {
    {
        let mut guard = room.lock().unwrap();
        let ids: Vec<_> = guard.player_order.clone();
        for id in ids {
            if let Some(player) = guard.players.get_mut(&id) {
                if let Some(handle) = player.reconnection_timer.take() {
                    handle.cancel(CancelReason::RoomRemoved);
                }
                if let Some(handle) = player.turn_timer.take() {
                    handle.cancel(CancelReason::RoomRemoved);
                }
            }
        }
        guard.apply_event(RoomEvent::RoomClosed);
    }
    ctx.registry.delete(code)
}
