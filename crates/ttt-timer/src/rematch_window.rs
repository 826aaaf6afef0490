//! Rematch window expiry (the background half of C9 — `startRematchWindow`).
//!
//! Unlike the reconnection and turn timers, this one has no cancellation
//! handle of its own: a window is "still live" exactly when
//! `rematch_expires_at` still holds the same instant this task was handed.
//! `acceptRematch` clears it on success; a second `offerRematch` call would
//! only replace it while a window is already live, which also changes the
//! stored instant.

use std::time::Instant;

use tracing::debug;
use ttt_protocol::{ClientMessage, RoomCode};
use ttt_room::RoomEvent;

use crate::context::Context;
use crate::lifecycle;
use crate::wire;

pub fn spawn_rematch_window(ctx: Context, code: RoomCode, expires_at: Instant) {
    tokio::spawn(run(ctx, code, expires_at));
}

async fn run(ctx: Context, code: RoomCode, expires_at: Instant) {
    let Some(room) = ctx.registry.try_get_by_id(&code) else {
        return;
    };

    tokio::time::sleep_until(expires_at.into()).await;

    let still_this_window = {
        let guard = room.lock().unwrap();
        guard.rematch_expires_at == Some(expires_at)
    };
    if !still_this_window {
        debug!(room = %code, "rematch window was cleared or replaced before expiry");
        return;
    }

    {
        let mut guard = room.lock().unwrap();
        guard.rematch_expires_at = None;
        guard.apply_event(RoomEvent::RematchExpired);
    }

    wire::broadcast(
        &ctx,
        &code,
        ClientMessage::RematchWindowExpired {
            room_code: code.clone(),
        },
    );
    lifecycle::close_room(&ctx, &code, &room);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ttt_protocol::{PlayerId, RoomCode};
    use ttt_room::{rematch, Room, RoomCoreConfig, RoomRegistry};
    use ttt_transport::{Broadcaster, ConnectionId};

    use super::*;

    fn test_context() -> Context {
        Context::new(
            Arc::new(RoomRegistry::new()),
            Arc::new(Broadcaster::new()),
            Arc::new(RoomCoreConfig::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn expired_window_closes_the_room() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        let p1 = PlayerId::new();
        let p2 = PlayerId::new();
        room.add_connection(p1, ConnectionId::new(1), 2).unwrap();
        room.add_connection(p2, ConnectionId::new(2), 2).unwrap();
        room.try_start_game(&mut rng);
        room.forfeit(p1);
        let expires_at = Instant::now() + Duration::from_secs(5);
        rematch::offer_rematch(&mut room, p2, Duration::from_secs(5)).unwrap();
        let actual_expiry = room.rematch_expires_at.unwrap();
        ctx.registry.create(room).unwrap();

        spawn_rematch_window(ctx.clone(), code.clone(), actual_expiry);
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(!ctx.registry.exists(&code));
        let _ = expires_at;
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_rematch_clears_the_window_before_it_fires() {
        let ctx = test_context();
        let code = RoomCode::new_unchecked("ABCDEF");
        let mut room = Room::new(code.clone());
        let mut rng = rand::rng();
        let p1 = PlayerId::new();
        let p2 = PlayerId::new();
        room.add_connection(p1, ConnectionId::new(1), 2).unwrap();
        room.add_connection(p2, ConnectionId::new(2), 2).unwrap();
        room.try_start_game(&mut rng);
        room.forfeit(p1);
        rematch::offer_rematch(&mut room, p1, Duration::from_secs(5)).unwrap();
        let expires_at = room.rematch_expires_at.unwrap();
        let shared = ctx.registry.create(room).unwrap();

        spawn_rematch_window(ctx.clone(), code.clone(), expires_at);
        tokio::time::advance(Duration::from_millis(500)).await;

        {
            let mut guard = shared.lock().unwrap();
            rematch::accept_rematch(&mut guard, p2, &mut rand::rng()).unwrap();
        }

        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(ctx.registry.exists(&code));
    }
}
