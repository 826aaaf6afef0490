//! Idle room sweeper (C10).

use std::time::Duration;

use tracing::info;
use ttt_protocol::{ClientMessage, GameResult};

use crate::context::Context;
use crate::lifecycle;
use crate::wire;

/// Spawns the sweep loop. Runs forever; the caller holds onto nothing but
/// the join handle (or lets it run detached for the process lifetime).
pub fn spawn(ctx: Context) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(ctx: Context) {
    let mut ticker = tokio::time::interval(Duration::from_secs(ctx.config.room_sweep_interval_seconds));
    loop {
        ticker.tick().await;
        sweep_once(&ctx);
    }
}

fn sweep_once(ctx: &Context) {
    let idle_timeout = Duration::from_secs(ctx.config.idle_room_timeout_seconds);
    for room in ctx.registry.get_all() {
        let (code, idle) = {
            let guard = room.lock().unwrap();
            (guard.code.clone(), guard.is_idle_for_cleanup(idle_timeout))
        };
        if !idle {
            continue;
        }
        info!(room = %code, "sweeping idle room");
        wire::broadcast(
            ctx,
            &code,
            ClientMessage::GameOver {
                room_code: code.clone(),
                result: GameResult::Cancelled,
                winner_id: None,
                winner_symbol: None,
                board_snapshot: None,
                current_turn: None,
                is_game_over: true,
                message: Some("Room expired due to inactivity".to_string()),
                correlation_id: None,
                server_timestamp: Some(chrono::Utc::now()),
            },
        );
        lifecycle::close_room(ctx, &code, &room);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use ttt_protocol::{PlayerId, RoomCode};
    use ttt_room::{Room, RoomCoreConfig, RoomRegistry};
    use ttt_transport::{Broadcaster, ConnectionId};

    use super::*;

    fn test_context(idle_timeout: u64, sweep_interval: u64) -> Context {
        Context::new(
            Arc::new(RoomRegistry::new()),
            Arc::new(Broadcaster::new()),
            Arc::new(RoomCoreConfig {
                idle_room_timeout_seconds: idle_timeout,
                room_sweep_interval_seconds: sweep_interval,
                ..RoomCoreConfig::default()
            }),
        )
    }

    #[test]
    fn sweep_once_removes_an_underfilled_idle_room() {
        let ctx = test_context(1, 60);
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        room.add_connection(PlayerId::new(), ConnectionId::new(1), 2)
            .unwrap();
        room.last_activity_at = std::time::Instant::now() - StdDuration::from_secs(10);
        ctx.registry.create(room).unwrap();

        sweep_once(&ctx);

        assert!(!ctx.registry.exists(&code));
    }

    #[test]
    fn sweep_once_leaves_an_active_room_alone() {
        let ctx = test_context(300, 60);
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        room.add_connection(PlayerId::new(), ConnectionId::new(1), 2)
            .unwrap();
        room.add_connection(PlayerId::new(), ConnectionId::new(2), 2)
            .unwrap();
        room.try_start_game(&mut rng);
        ctx.registry.create(room).unwrap();

        sweep_once(&ctx);

        assert!(ctx.registry.exists(&code));
    }

    #[test]
    fn sweep_once_removes_a_room_where_everyone_disconnected() {
        let ctx = test_context(300, 60);
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        room.add_connection(PlayerId::new(), ConnectionId::new(1), 2)
            .unwrap();
        room.add_connection(PlayerId::new(), ConnectionId::new(2), 2)
            .unwrap();
        room.try_start_game(&mut rng);
        room.remove_connection(ConnectionId::new(1));
        room.remove_connection(ConnectionId::new(2));
        ctx.registry.create(room).unwrap();

        sweep_once(&ctx);

        assert!(!ctx.registry.exists(&code));
    }
}
