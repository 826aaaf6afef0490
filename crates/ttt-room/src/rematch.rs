//! Rematch negotiation (C9), layered atop the state machine in `machine`.
//!
//! These functions only decide and mutate; they're called under the room
//! lock and return enough information for the caller to broadcast after
//! releasing it. The window timer that expires an unanswered offer lives
//! in the timer crate, since it has to sleep.

use std::time::{Duration, Instant};

use rand::Rng;
use ttt_protocol::PlayerId;

use crate::error::RoomError;
use crate::machine::{RoomEvent, RoomState};
use crate::state::Room;

#[derive(Debug, Clone, Copy)]
pub enum OfferOutcome {
    /// No window was open (or the previous one expired); a fresh one
    /// started and this offer is recorded in it.
    WindowStarted { expires_at: Instant },
    /// A window was already open; this player's offer was added to it.
    AlreadyOpen,
}

/// `offerRematch(code, playerId)` — requires state `GameOver` (or a rematch
/// negotiation already under way, which just adds this offer to it).
pub fn offer_rematch(
    room: &mut Room,
    player_id: PlayerId,
    window: Duration,
) -> Result<OfferOutcome, RoomError> {
    if !matches!(
        room.state,
        RoomState::GameOver | RoomState::RematchOffered | RoomState::RematchAccepted
    ) {
        return Err(RoomError::OfferFailed);
    }

    let now = Instant::now();
    let window_live = room.rematch_expires_at.is_some_and(|exp| exp > now);

    let outcome = if window_live {
        room.rematch_offers.insert(player_id);
        OfferOutcome::AlreadyOpen
    } else {
        let expires_at = now + window;
        room.rematch_offers.clear();
        room.rematch_offers.insert(player_id);
        room.rematch_expires_at = Some(expires_at);
        room.apply_event(RoomEvent::RematchOffered);
        OfferOutcome::WindowStarted { expires_at }
    };
    room.touch();
    Ok(outcome)
}

/// Opens the rematch window with no attached offer, called right after a
/// natural game conclusion (a win or draw reached via a move, as opposed
/// to a forfeit). Idempotent: a window already open is left untouched, so
/// a racing explicit `offerRematch` never shortens it.
pub fn start_window(room: &mut Room, window: Duration) -> Instant {
    if let Some(expires_at) = room.rematch_expires_at {
        return expires_at;
    }
    let expires_at = Instant::now() + window;
    room.rematch_offers.clear();
    room.rematch_expires_at = Some(expires_at);
    room.apply_event(RoomEvent::RematchOffered);
    room.touch();
    expires_at
}

#[derive(Debug, Clone, Copy)]
pub enum AcceptOutcome {
    /// Recorded; still waiting on the other player.
    Waiting,
    /// Every player has now accepted; the room has been reset for a new
    /// game and a turn timeout should be started for the new `X`.
    Started,
}

/// `acceptRematch(code, playerId)` — requires state `RematchOffered` (or
/// `RematchAccepted`, once the other player has already accepted) and a
/// still-live window.
pub fn accept_rematch(
    room: &mut Room,
    player_id: PlayerId,
    rng: &mut impl Rng,
) -> Result<AcceptOutcome, RoomError> {
    let window_live = room
        .rematch_expires_at
        .is_some_and(|exp| exp > Instant::now());
    let state_allows = matches!(room.state, RoomState::RematchOffered | RoomState::RematchAccepted);
    if !window_live || !state_allows {
        return Err(RoomError::AcceptFailed);
    }

    room.rematch_offers.insert(player_id);
    room.touch();

    // The first acceptance moves `RematchOffered` -> `RematchAccepted`
    // regardless of whether this same call also happens to complete the
    // set (e.g. the other player's offer was already recorded), so the
    // machine always passes through `RematchAccepted` before the reset
    // below fires `FirstMoveMade` from it.
    if room.state == RoomState::RematchOffered {
        room.apply_event(RoomEvent::RematchAccepted);
    }

    if room.player_order.len() == 2 && room.rematch_offers.len() >= room.player_order.len() {
        room.reset_for_rematch(rng);
        Ok(AcceptOutcome::Started)
    } else {
        Ok(AcceptOutcome::Waiting)
    }
}
