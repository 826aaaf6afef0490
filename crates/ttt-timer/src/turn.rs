//! Turn-timeout service (C8).

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info};
use ttt_protocol::{ClientMessage, GameResult, PlayerId, RoomCode};
use ttt_room::{CancelReason, SharedRoom, TimerHandle};

use crate::context::Context;
use crate::lifecycle;
use crate::wire;

/// Spawns (or restarts) the turn-timeout countdown for whoever currently
/// holds the move in `code`. Any timer already running on another player
/// is cancelled first — at most one turn timer is ever live per room.
pub fn spawn_turn_timeout(ctx: Context, code: RoomCode) {
    tokio::spawn(run(ctx, code));
}

struct Armed {
    player_id: PlayerId,
    total: u64,
    expires_at: Instant,
    version: u64,
    token: u64,
    cancel_rx: oneshot::Receiver<CancelReason>,
}

async fn run(ctx: Context, code: RoomCode) {
    let Some(room) = ctx.registry.try_get_by_id(&code) else {
        return;
    };

    let armed = {
        let mut guard = room.lock().unwrap();

        for id in guard.player_order.clone() {
            if let Some(player) = guard.players.get_mut(&id) {
                if let Some(handle) = player.turn_timer.take() {
                    handle.cancel(CancelReason::Replaced);
                }
            }
        }

        if guard.is_game_over {
            return;
        }
        let Some(current_turn) = guard.current_turn else {
            return;
        };
        let Some(player_id) = guard
            .player_order
            .iter()
            .find(|id| guard.players.get(*id).and_then(|p| p.symbol) == Some(current_turn))
            .copied()
        else {
            return;
        };

        let total = guard
            .players
            .get_mut(&player_id)
            .unwrap()
            .remaining_turn_seconds
            .take()
            .unwrap_or(ctx.config.turn_timeout_seconds);
        let token = ttt_room::next_token();
        let (tx, rx) = oneshot::channel();
        let expires_at = Instant::now() + Duration::from_secs(total);
        let version = guard.turn_timer_version;
        let player = guard.players.get_mut(&player_id).unwrap();
        player.turn_timer = Some(TimerHandle::new(token, tx));
        player.turn_expires_at = Some(expires_at);

        Armed {
            player_id,
            total,
            expires_at,
            version,
            token,
            cancel_rx: rx,
        }
    };

    if !ctx.registry.exists(&code) || room.lock().unwrap().turn_timer_version != armed.version {
        return;
    }

    let expires_at_utc = wire::instant_to_utc(armed.expires_at);
    wire::broadcast(
        &ctx,
        &code,
        ClientMessage::TurnCountdownResumed {
            player_id: armed.player_id,
            total_seconds: armed.total,
            expires_at_utc,
            server_now: chrono::Utc::now(),
        },
    );
    wire::broadcast(
        &ctx,
        &code,
        ClientMessage::TurnCountdownTick {
            player_id: armed.player_id,
            remaining_seconds: armed.total,
            expires_at_utc,
            server_now: chrono::Utc::now(),
        },
    );

    let mut cancel_rx = armed.cancel_rx;
    for elapsed in 1..armed.total {
        tokio::select! {
            _ = sleep(Duration::from_secs(1)) => {}
            reason = &mut cancel_rx => {
                on_cancelled(&ctx, &room, &code, armed.player_id, reason.unwrap_or(CancelReason::RoomRemoved));
                return;
            }
        }
        let version_now = room.lock().unwrap().turn_timer_version;
        if version_now != armed.version {
            return;
        }
        wire::broadcast(
            &ctx,
            &code,
            ClientMessage::TurnCountdownTick {
                player_id: armed.player_id,
                remaining_seconds: armed.total - elapsed,
                expires_at_utc,
                server_now: chrono::Utc::now(),
            },
        );
    }

    tokio::select! {
        _ = sleep(Duration::from_secs(1)) => {}
        reason = &mut cancel_rx => {
            on_cancelled(&ctx, &room, &code, armed.player_id, reason.unwrap_or(CancelReason::RoomRemoved));
            return;
        }
    }

    let should_forfeit = {
        let guard = room.lock().unwrap();
        guard.turn_timer_version == armed.version
            && !guard.is_game_over
            && guard.current_turn.is_some()
            && guard
                .players
                .get(&armed.player_id)
                .and_then(|p| p.turn_timer.as_ref())
                .map(|h| h.token())
                == Some(armed.token)
    };

    if should_forfeit {
        let (winner_symbol, winner_id, board_snapshot, current_turn) = {
            let mut guard = room.lock().unwrap();
            let board_snapshot = guard.board;
            let winner_id = guard
                .player_order
                .iter()
                .find(|id| **id != armed.player_id)
                .copied();
            guard.forfeit(armed.player_id);
            if let Some(player) = guard.players.get_mut(&armed.player_id) {
                player.turn_timer = None;
                player.turn_expires_at = None;
            }
            (guard.winner, winner_id, board_snapshot, guard.current_turn)
        };

        info!(room = %code, player = %armed.player_id, "player timed out on their turn");
        wire::broadcast(
            &ctx,
            &code,
            wire::game_over_message(
                &code,
                GameResult::Winner,
                winner_id,
                winner_symbol,
                Some(board_snapshot),
                current_turn,
                Some("Player timed out on their turn".to_string()),
            ),
        );
        lifecycle::close_room(&ctx, &code, &room);
    } else {
        let mut guard = room.lock().unwrap();
        if let Some(player) = guard.players.get_mut(&armed.player_id) {
            if player.turn_timer.as_ref().map(|h| h.token()) == Some(armed.token) {
                player.turn_timer = None;
            }
        }
    }
}

fn on_cancelled(ctx: &Context, room: &SharedRoom, code: &RoomCode, player_id: PlayerId, reason: CancelReason) {
    debug!(room = %code, player = %player_id, ?reason, "turn timer cancelled");

    // Only a disconnect actually pauses the clock. `Replaced` fires on every
    // normal move handoff (the next `spawn_turn_timeout` call cancels the
    // mover's own still-set `turn_expires_at` as a side effect of clearing
    // every player's timer) and must leave `remaining_turn_seconds` alone,
    // or it would leak into that player's next turn and shrink their budget.
    if !matches!(reason, CancelReason::Disconnected) {
        let mut guard = room.lock().unwrap();
        if let Some(player) = guard.players.get_mut(&player_id) {
            player.turn_expires_at = None;
        }
        return;
    }

    let paused = {
        let mut guard = room.lock().unwrap();
        let Some(player) = guard.players.get_mut(&player_id) else {
            return;
        };
        if player.turn_expires_at.is_none() {
            return;
        }
        let remaining = player
            .turn_expires_at
            .map(|exp| {
                exp.saturating_duration_since(Instant::now())
                    .as_secs_f64()
                    .ceil()
                    .max(0.0) as u64
            })
            .unwrap_or(0);
        player.turn_expires_at = None;
        player.remaining_turn_seconds = Some(remaining);
        remaining
    };

    wire::broadcast(
        ctx,
        code,
        ClientMessage::TurnCountdownPaused {
            player_id,
            remaining_seconds: paused,
            server_now: chrono::Utc::now(),
        },
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use ttt_protocol::{PlayerId, RoomCode};
    use ttt_room::{Room, RoomCoreConfig, RoomRegistry};
    use ttt_transport::{Broadcaster, ConnectionId};

    use super::*;

    fn test_context() -> Context {
        Context::new(
            Arc::new(RoomRegistry::new()),
            Arc::new(Broadcaster::new()),
            Arc::new(RoomCoreConfig {
                turn_timeout_seconds: 3,
                ..RoomCoreConfig::default()
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_timeout_forfeits_the_current_turn_holder() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        room.add_connection(PlayerId::new(), ConnectionId::new(1), 2)
            .unwrap();
        room.add_connection(PlayerId::new(), ConnectionId::new(2), 2)
            .unwrap();
        room.try_start_game(&mut rng);
        ctx.registry.create(room).unwrap();

        let handle = tokio::spawn(run(ctx.clone(), code.clone()));
        tokio::time::advance(StdDuration::from_secs(4)).await;
        handle.await.unwrap();

        assert!(!ctx.registry.exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn moving_before_timeout_leaves_the_room_untouched() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        room.add_connection(PlayerId::new(), ConnectionId::new(1), 2)
            .unwrap();
        room.add_connection(PlayerId::new(), ConnectionId::new(2), 2)
            .unwrap();
        room.try_start_game(&mut rng);
        let shared = ctx.registry.create(room).unwrap();

        let handle = tokio::spawn(run(ctx.clone(), code.clone()));
        tokio::time::advance(StdDuration::from_millis(500)).await;

        {
            let mut guard = shared.lock().unwrap();
            guard.try_make_move(ConnectionId::new(1), 0).ok();
            if let Some(player) = guard.players.values_mut().next() {
                if let Some(h) = player.turn_timer.take() {
                    h.cancel(CancelReason::Replaced);
                }
            }
        }

        tokio::time::advance(StdDuration::from_secs(5)).await;
        handle.await.unwrap();

        assert!(ctx.registry.exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_cancellation_does_not_pause_the_moving_player() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        let p1 = PlayerId::new();
        room.add_connection(p1, ConnectionId::new(1), 2).unwrap();
        room.add_connection(PlayerId::new(), ConnectionId::new(2), 2)
            .unwrap();
        room.try_start_game(&mut rng);
        let shared = ctx.registry.create(room).unwrap();

        // Arm a timer, then cancel it with `Replaced` as a normal move
        // handoff would (spawn_turn_timeout's own arming loop does this).
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = shared.lock().unwrap();
            let player = guard.players.get_mut(&p1).unwrap();
            player.turn_timer = Some(TimerHandle::new(ttt_room::next_token(), tx));
            player.turn_expires_at = Some(Instant::now() + StdDuration::from_secs(30));
        }
        let _ = rx;
        on_cancelled(&ctx, &shared, &code, p1, CancelReason::Replaced);

        let guard = shared.lock().unwrap();
        let player = &guard.players[&p1];
        assert!(player.turn_expires_at.is_none());
        assert!(player.remaining_turn_seconds.is_none());
    }
}
