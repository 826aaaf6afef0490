//! Reconnection grace period (C7).

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info};
use ttt_protocol::{ClientMessage, GameResult, PlayerId, RoomCode};
use ttt_room::{CancelReason, SharedRoom, TimerHandle};

use crate::context::Context;
use crate::lifecycle;
use crate::wire;

/// Spawns the grace-period countdown for `player_id` in `code`. Called
/// right after a disconnect is recorded.
pub fn spawn_grace_period(ctx: Context, code: RoomCode, player_id: PlayerId) {
    tokio::spawn(run(ctx, code, player_id));
}

enum Plan {
    /// `graceUsed` was already spent — forfeit without a countdown.
    ImmediateForfeit,
    Countdown {
        total: u64,
        token: u64,
        cancel_rx: oneshot::Receiver<CancelReason>,
    },
    /// The player reconnected (or the room vanished) before we could arm
    /// anything.
    Skip,
}

async fn run(ctx: Context, code: RoomCode, player_id: PlayerId) {
    let Some(room) = ctx.registry.try_get_by_id(&code) else {
        return;
    };

    let plan = {
        let mut guard = room.lock().unwrap();
        let status = guard
            .players
            .get(&player_id)
            .map(|p| (p.is_connected(), p.grace_used));
        match status {
            None => Plan::Skip,
            Some((true, _)) => Plan::Skip,
            Some((false, true)) => Plan::ImmediateForfeit,
            Some((false, false)) => {
                let total = ctx.config.reconnection_grace_period_seconds;
                let token = ttt_room::next_token();
                let (tx, rx) = oneshot::channel();
                let player = guard.players.get_mut(&player_id).unwrap();
                player.grace_used = true;
                player.reconnection_timer = Some(TimerHandle::new(token, tx));
                player.reconnection_expires_at =
                    Some(Instant::now() + Duration::from_secs(total));
                Plan::Countdown {
                    total,
                    token,
                    cancel_rx: rx,
                }
            }
        }
    };

    match plan {
        Plan::Skip => {}
        Plan::ImmediateForfeit => {
            forfeit_and_close(&ctx, &room, &code, player_id, "fallback").await;
        }
        Plan::Countdown {
            total,
            token,
            mut cancel_rx,
        } => {
            wire::broadcast(&ctx, &code, ClientMessage::PlayerLeft { player_id });

            for remaining in (0..=total).rev() {
                wire::broadcast(
                    &ctx,
                    &code,
                    ClientMessage::CountdownTick {
                        player_id,
                        remaining_seconds: remaining,
                    },
                );
                if remaining == 0 {
                    break;
                }
                tokio::select! {
                    _ = sleep(Duration::from_secs(1)) => {}
                    reason = &mut cancel_rx => {
                        on_cancelled(&room, &code, player_id, reason.unwrap_or(CancelReason::RoomRemoved));
                        return;
                    }
                }
            }

            let still_due = {
                let guard = room.lock().unwrap();
                guard.players.get(&player_id).is_some_and(|p| {
                    !p.is_connected()
                        && p.grace_used
                        && p.reconnection_timer.as_ref().map(|h| h.token()) == Some(token)
                })
            };
            if still_due {
                forfeit_and_close(&ctx, &room, &code, player_id, "grace period elapsed").await;
            }
        }
    }
}

async fn forfeit_and_close(
    ctx: &Context,
    room: &SharedRoom,
    code: &RoomCode,
    player_id: PlayerId,
    reason: &str,
) {
    let (winner_symbol, winner_id, board_snapshot, current_turn) = {
        let mut guard = room.lock().unwrap();
        guard.forfeit(player_id);
        let winner_id = guard
            .player_order
            .iter()
            .find(|id| **id != player_id)
            .copied();
        (guard.winner, winner_id, guard.board, guard.current_turn)
    };

    info!(room = %code, player = %player_id, reason, "player forfeited by reconnection timeout");

    wire::broadcast(
        ctx,
        code,
        wire::game_over_message(
            code,
            GameResult::Winner,
            winner_id,
            winner_symbol,
            Some(board_snapshot),
            current_turn,
            Some("Opponent disconnected and failed to reconnect".to_string()),
        ),
    );
    lifecycle::close_room(ctx, code, room);
}

fn on_cancelled(room: &SharedRoom, code: &RoomCode, player_id: PlayerId, reason: CancelReason) {
    let mut guard = room.lock().unwrap();
    if let Some(player) = guard.players.get_mut(&player_id) {
        player.reconnection_expires_at = None;
    }
    drop(guard);
    debug!(room = %code, player = %player_id, ?reason, "reconnection grace period cancelled");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use ttt_protocol::RoomCode;
    use ttt_room::{Room, RoomCoreConfig, RoomRegistry};
    use ttt_transport::{Broadcaster, ConnectionId};

    use super::*;

    fn test_context() -> Context {
        Context::new(
            Arc::new(RoomRegistry::new()),
            Arc::new(Broadcaster::new()),
            Arc::new(RoomCoreConfig {
                reconnection_grace_period_seconds: 2,
                ..RoomCoreConfig::default()
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_grace_period_forfeits_and_removes_the_room() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        let p1 = PlayerId::new();
        let p2 = PlayerId::new();
        room.add_connection(p1, ConnectionId::new(1), 2).unwrap();
        room.add_connection(p2, ConnectionId::new(2), 2).unwrap();
        room.try_start_game(&mut rng);
        room.remove_connection(ConnectionId::new(1));
        let shared = ctx.registry.create(room).unwrap();

        let handle = tokio::spawn(run(ctx.clone(), code.clone(), p1));
        tokio::time::advance(StdDuration::from_secs(3)).await;
        handle.await.unwrap();

        assert!(!ctx.registry.exists(&code));
        let guard = shared.lock().unwrap();
        assert!(guard.is_game_over);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_mid_countdown_cancels_without_forfeiting() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        let p1 = PlayerId::new();
        let p2 = PlayerId::new();
        room.add_connection(p1, ConnectionId::new(1), 2).unwrap();
        room.add_connection(p2, ConnectionId::new(2), 2).unwrap();
        room.try_start_game(&mut rng);
        room.remove_connection(ConnectionId::new(1));
        let shared = ctx.registry.create(room).unwrap();

        let handle = tokio::spawn(run(ctx.clone(), code.clone(), p1));
        tokio::time::advance(StdDuration::from_millis(500)).await;

        let taken = {
            let mut guard = shared.lock().unwrap();
            guard.add_connection(p1, ConnectionId::new(3), 2).unwrap();
            guard.players.get_mut(&p1).unwrap().reconnection_timer.take()
        };
        if let Some(h) = taken {
            h.cancel(CancelReason::Reconnected);
        }

        tokio::time::advance(StdDuration::from_secs(5)).await;
        handle.await.unwrap();

        assert!(ctx.registry.exists(&code));
        let guard = shared.lock().unwrap();
        assert!(!guard.is_game_over);
    }
}
