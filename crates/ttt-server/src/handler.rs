//! Per-connection handler: the request/response loop and the C11 RPC
//! table.
//!
//! Each accepted connection gets its own task. A request arriving over the
//! socket gets a direct reply wrapped in a [`ResultEnvelope`]; anything the
//! room needs to tell *other* members of the group goes out through the
//! shared [`Broadcaster`] instead, delivered to this same task's outbox and
//! forwarded to the socket by the `select!` loop below.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use ttt_protocol::{
    ClientMessage, ClientRequest, Codec, ErrorCode, GameResult, JsonCodec, PlayerId, ResultEnvelope,
    RoomCode, Symbol,
};
use ttt_room::{CancelReason, Room, RoomCoreConfig, RoomEvent};
use ttt_timer::wire;
use ttt_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(conn: WebSocketConnection, state: Arc<ServerState>) {
    let connection_id = conn.id();
    tracing::debug!(%connection_id, "accepted connection");

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    state.ctx.broadcaster.register(connection_id, outbox_tx);

    loop {
        tokio::select! {
            incoming = conn.recv() => {
                match incoming {
                    Ok(Some(bytes)) => {
                        let reply = dispatch(&state, connection_id, &bytes).await;
                        match JsonCodec.encode(&reply) {
                            Ok(bytes) => {
                                if let Err(err) = conn.send(&bytes).await {
                                    tracing::debug!(%connection_id, error = %err, "send failed");
                                    break;
                                }
                            }
                            Err(err) => tracing::error!(%connection_id, error = %err, "failed to encode reply"),
                        }
                    }
                    Ok(None) => {
                        tracing::info!(%connection_id, "connection closed cleanly");
                        break;
                    }
                    Err(err) => {
                        tracing::debug!(%connection_id, error = %err, "recv failed");
                        break;
                    }
                }
            }
            Some(bytes) = outbox_rx.recv() => {
                if let Err(err) = conn.send(&bytes).await {
                    tracing::debug!(%connection_id, error = %err, "push send failed");
                    break;
                }
            }
        }
    }

    state.ctx.broadcaster.unregister(connection_id);
    handle_disconnect(&state, connection_id).await;
}

async fn dispatch(state: &Arc<ServerState>, connection_id: ConnectionId, bytes: &[u8]) -> ResultEnvelope<ClientMessage> {
    let request: ClientRequest = match JsonCodec.decode(bytes) {
        Ok(req) => req,
        Err(err) => {
            tracing::debug!(%connection_id, error = %err, "failed to decode request");
            return ResultEnvelope::err(ErrorCode::Invalid);
        }
    };

    match request {
        ClientRequest::CreateGame => handle_create_game(state, connection_id).await,
        ClientRequest::JoinGame {
            room_code,
            client_player_id,
        } => handle_join_game(state, connection_id, room_code, client_player_id).await,
        ClientRequest::Reconnect { room_code, player_id } => {
            handle_reconnect(state, connection_id, room_code, player_id).await
        }
        ClientRequest::GetGameState { room_code, player_id } => {
            handle_get_game_state(state, room_code, player_id).await
        }
        // `player_id` is redundant here: `try_make_move` is keyed by the
        // connection that sent the request, not by the caller-supplied id.
        ClientRequest::MakeMove { room_code, index, .. } => {
            handle_make_move(state, connection_id, room_code, index).await
        }
        ClientRequest::OfferRematch { room_code } => handle_offer_rematch(state, connection_id, room_code).await,
        ClientRequest::AcceptRematch { room_code } => handle_accept_rematch(state, connection_id, room_code).await,
    }
}

async fn handle_create_game(state: &Arc<ServerState>, connection_id: ConnectionId) -> ResultEnvelope<ClientMessage> {
    let config = &state.ctx.config;
    let code = ttt_room::codegen::generate_unique_code(
        &mut rand::rng(),
        &config.room_code_alphabet,
        config.room_code_length,
        |candidate| state.ctx.registry.exists(candidate),
    );

    let mut room = Room::new(code.clone());
    let player_id = PlayerId::new();
    room.add_connection(player_id, connection_id, config.max_players_per_room)
        .expect("a fresh room always has room for its first player");
    let board = room.board;

    if let Err(err) = state.ctx.registry.create(room) {
        return ResultEnvelope::err(err.to_error_code());
    }

    state.ctx.broadcaster.join_group(code.as_str(), connection_id);
    state.connection_rooms.lock().unwrap().insert(connection_id, code.clone());

    tracing::info!(room = %code, player = %player_id, "room created");
    ResultEnvelope::ok(ClientMessage::GameCreated {
        room_code: code,
        board,
        player_id,
    })
}

enum JoinOutcome {
    AlreadyJoined(ClientMessage),
    Reject(ErrorCode),
    GameFull,
    Joined { player_id: PlayerId, started: bool },
}

fn try_join(guard: &mut Room, connection_id: ConnectionId, config: &RoomCoreConfig) -> JoinOutcome {
    let any_disconnected_slot = guard.player_order.iter().any(|id| !guard.players[id].is_connected());
    if any_disconnected_slot || !guard.can_join(config.max_players_per_room) {
        return JoinOutcome::GameFull;
    }
    let player_id = PlayerId::new();
    guard
        .add_connection(player_id, connection_id, config.max_players_per_room)
        .expect("capacity already checked above");
    let started = guard.try_start_game(&mut rand::rng());
    JoinOutcome::Joined { player_id, started }
}

async fn handle_join_game(
    state: &Arc<ServerState>,
    connection_id: ConnectionId,
    code: RoomCode,
    client_player_id: Option<PlayerId>,
) -> ResultEnvelope<ClientMessage> {
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return ResultEnvelope::err(ErrorCode::NotFound);
    };

    let outcome = {
        let mut guard = room.lock().unwrap();

        if let Some(player) = guard.player_by_connection(connection_id) {
            if guard.current_turn.is_some() {
                let snapshot = guard.snapshot();
                JoinOutcome::AlreadyJoined(ClientMessage::GameJoined {
                    room_code: code.clone(),
                    board: snapshot.board,
                    symbol: player.symbol.expect("a started game has assigned every symbol"),
                    current_turn: snapshot.current_turn,
                    player_id: player.player_id,
                })
            } else {
                JoinOutcome::Reject(ErrorCode::AlreadyInRoom)
            }
        } else if let Some(pid) = client_player_id {
            match guard.players.get(&pid) {
                Some(p) if p.connection_id.is_none() => JoinOutcome::Reject(ErrorCode::ReconnectRequired),
                Some(_) => JoinOutcome::Reject(ErrorCode::PlayerIdInUse),
                None => try_join(&mut guard, connection_id, &state.ctx.config),
            }
        } else {
            try_join(&mut guard, connection_id, &state.ctx.config)
        }
    };

    match outcome {
        JoinOutcome::AlreadyJoined(msg) => {
            state.ctx.broadcaster.join_group(code.as_str(), connection_id);
            state.connection_rooms.lock().unwrap().insert(connection_id, code.clone());
            ResultEnvelope::ok(msg)
        }
        JoinOutcome::Reject(err_code) => ResultEnvelope::err(err_code),
        JoinOutcome::GameFull => {
            wire::send_to(&state.ctx, connection_id, ClientMessage::GameFull { room_code: code.clone() });
            ResultEnvelope::err(ErrorCode::RoomFull)
        }
        JoinOutcome::Joined { player_id, started } => {
            state.ctx.broadcaster.join_group(code.as_str(), connection_id);
            state.connection_rooms.lock().unwrap().insert(connection_id, code.clone());

            let (snapshot, symbol) = {
                let guard = room.lock().unwrap();
                (guard.snapshot(), guard.players.get(&player_id).and_then(|p| p.symbol))
            };

            wire::broadcast_except(&state.ctx, &code, connection_id, ClientMessage::PlayerJoined);
            if started {
                wire::broadcast(
                    &state.ctx,
                    &code,
                    ClientMessage::GameStarted {
                        board: snapshot.board,
                        current_turn: snapshot.current_turn,
                    },
                );
                ttt_timer::spawn_turn_timeout(state.ctx.clone(), code.clone());
            }

            tracing::info!(room = %code, player = %player_id, "player joined");
            ResultEnvelope::ok(ClientMessage::GameJoined {
                room_code: code.clone(),
                board: snapshot.board,
                symbol: symbol.expect("try_start_game assigns a symbol to every seated player"),
                current_turn: snapshot.current_turn,
                player_id,
            })
        }
    }
}

async fn handle_reconnect(
    state: &Arc<ServerState>,
    connection_id: ConnectionId,
    code: RoomCode,
    player_id: PlayerId,
) -> ResultEnvelope<ClientMessage> {
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return ResultEnvelope::err(ErrorCode::NotFound);
    };

    enum Outcome {
        Reject(ErrorCode),
        Reconnected {
            snapshot: ttt_room::RoomSnapshot,
            symbol: Option<Symbol>,
            started: bool,
        },
    }

    let outcome = {
        let mut guard = room.lock().unwrap();
        match guard.players.get(&player_id) {
            None => Outcome::Reject(ErrorCode::NotInGame),
            Some(p) if p.connection_id.is_some() && p.connection_id != Some(connection_id) => {
                Outcome::Reject(ErrorCode::PlayerIdInUse)
            }
            _ => {
                guard
                    .add_connection(player_id, connection_id, state.ctx.config.max_players_per_room)
                    .expect("reconnecting a known player never exceeds capacity");
                if let Some(player) = guard.players.get_mut(&player_id) {
                    if let Some(handle) = player.reconnection_timer.take() {
                        handle.cancel(CancelReason::Reconnected);
                    }
                    player.reconnection_expires_at = None;
                }
                let started = if guard.player_order.len() == 2 && guard.current_turn.is_none() {
                    guard.try_start_game(&mut rand::rng())
                } else {
                    false
                };
                let snapshot = guard.snapshot();
                let symbol = guard.players.get(&player_id).and_then(|p| p.symbol);
                Outcome::Reconnected { snapshot, symbol, started }
            }
        }
    };

    match outcome {
        Outcome::Reject(err_code) => ResultEnvelope::err(err_code),
        Outcome::Reconnected { snapshot, symbol, started } => {
            state.ctx.broadcaster.join_group(code.as_str(), connection_id);
            state.connection_rooms.lock().unwrap().insert(connection_id, code.clone());

            wire::broadcast_except(&state.ctx, &code, connection_id, ClientMessage::PlayerReconnected { player_id });

            if started {
                wire::broadcast(
                    &state.ctx,
                    &code,
                    ClientMessage::GameStarted {
                        board: snapshot.board,
                        current_turn: snapshot.current_turn,
                    },
                );
            }
            if !snapshot.is_game_over && snapshot.current_turn.is_some() {
                ttt_timer::spawn_turn_timeout(state.ctx.clone(), code.clone());
            }

            tracing::info!(room = %code, player = %player_id, "player reconnected");
            ResultEnvelope::ok(ClientMessage::SyncedState {
                board: snapshot.board,
                symbol,
                current_turn: snapshot.current_turn,
                is_game_over: snapshot.is_game_over,
                winner: snapshot.winner,
            })
        }
    }
}

async fn handle_get_game_state(
    state: &Arc<ServerState>,
    code: RoomCode,
    player_id: PlayerId,
) -> ResultEnvelope<ClientMessage> {
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return ResultEnvelope::err(ErrorCode::NotFound);
    };
    let guard = room.lock().unwrap();
    let Some(player) = guard.players.get(&player_id) else {
        return ResultEnvelope::err(ErrorCode::NotInGame);
    };
    ResultEnvelope::ok(ClientMessage::SyncedState {
        board: guard.board,
        symbol: player.symbol,
        current_turn: guard.current_turn,
        is_game_over: guard.is_game_over,
        winner: guard.winner,
    })
}

async fn handle_make_move(
    state: &Arc<ServerState>,
    connection_id: ConnectionId,
    code: RoomCode,
    index: usize,
) -> ResultEnvelope<ClientMessage> {
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return ResultEnvelope::err(ErrorCode::NotFound);
    };

    let move_outcome = {
        let mut guard = room.lock().unwrap();
        match guard.try_make_move(connection_id, index) {
            Ok(outcome) => outcome,
            Err(err) => return ResultEnvelope::err(err.to_error_code()),
        }
    };

    let snapshot = { room.lock().unwrap().snapshot() };
    let board_update = ClientMessage::BoardUpdated {
        board: snapshot.board,
        current_turn: snapshot.current_turn,
        is_game_over: snapshot.is_game_over,
        winner: snapshot.winner,
    };
    wire::broadcast(&state.ctx, &code, board_update.clone());

    if snapshot.is_game_over {
        let winner_id = snapshot.winner.and_then(|winner| {
            let guard = room.lock().unwrap();
            guard
                .player_order
                .iter()
                .find(|id| guard.players[id].symbol == Some(winner))
                .copied()
        });
        let result = if snapshot.winner.is_some() {
            GameResult::Winner
        } else {
            GameResult::Draw
        };
        wire::broadcast(
            &state.ctx,
            &code,
            ClientMessage::GameOver {
                room_code: code.clone(),
                result,
                winner_id,
                winner_symbol: snapshot.winner,
                board_snapshot: Some(snapshot.board),
                current_turn: snapshot.current_turn,
                is_game_over: true,
                message: None,
                correlation_id: None,
                server_timestamp: Some(chrono::Utc::now()),
            },
        );

        let expires_at = {
            let mut guard = room.lock().unwrap();
            ttt_room::rematch::start_window(&mut guard, Duration::from_secs(state.ctx.config.rematch_window_seconds))
        };
        wire::broadcast(
            &state.ctx,
            &code,
            ClientMessage::RematchWindowStarted {
                expires_at: ttt_timer::wire::instant_to_utc(expires_at),
            },
        );
        ttt_timer::spawn_rematch_window(state.ctx.clone(), code.clone(), expires_at);
    } else {
        ttt_timer::spawn_turn_timeout(state.ctx.clone(), code.clone());
    }

    tracing::debug!(room = %code, ?move_outcome, "move applied");
    ResultEnvelope::ok(board_update)
}

async fn handle_offer_rematch(
    state: &Arc<ServerState>,
    connection_id: ConnectionId,
    code: RoomCode,
) -> ResultEnvelope<ClientMessage> {
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return ResultEnvelope::err(ErrorCode::NotFound);
    };
    let Some(player_id) = ({
        let guard = room.lock().unwrap();
        guard.player_by_connection(connection_id).map(|p| p.player_id)
    }) else {
        return ResultEnvelope::err(ErrorCode::NotInGame);
    };

    let outcome = {
        let mut guard = room.lock().unwrap();
        ttt_room::rematch::offer_rematch(
            &mut guard,
            player_id,
            Duration::from_secs(state.ctx.config.rematch_window_seconds),
        )
    };

    match outcome {
        Err(err) => ResultEnvelope::err(err.to_error_code()),
        Ok(offer_outcome) => {
            let expires_at = match offer_outcome {
                ttt_room::OfferOutcome::WindowStarted { expires_at } => {
                    ttt_timer::spawn_rematch_window(state.ctx.clone(), code.clone(), expires_at);
                    expires_at
                }
                ttt_room::OfferOutcome::AlreadyOpen => room
                    .lock()
                    .unwrap()
                    .rematch_expires_at
                    .expect("offer_rematch just confirmed a live window"),
            };
            let expires_at_utc = ttt_timer::wire::instant_to_utc(expires_at);
            let msg = ClientMessage::RematchOffered {
                player_id,
                expires_at: expires_at_utc,
            };
            wire::broadcast(&state.ctx, &code, msg.clone());
            tracing::info!(room = %code, player = %player_id, "rematch offered");
            ResultEnvelope::ok(msg)
        }
    }
}

async fn handle_accept_rematch(
    state: &Arc<ServerState>,
    connection_id: ConnectionId,
    code: RoomCode,
) -> ResultEnvelope<ClientMessage> {
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return ResultEnvelope::err(ErrorCode::NotFound);
    };
    let Some(player_id) = ({
        let guard = room.lock().unwrap();
        guard.player_by_connection(connection_id).map(|p| p.player_id)
    }) else {
        return ResultEnvelope::err(ErrorCode::NotInGame);
    };

    let outcome = {
        let mut guard = room.lock().unwrap();
        ttt_room::rematch::accept_rematch(&mut guard, player_id, &mut rand::rng())
    };

    match outcome {
        Err(err) => ResultEnvelope::err(err.to_error_code()),
        Ok(ttt_room::AcceptOutcome::Waiting) => {
            let expires_at_utc = {
                let guard = room.lock().unwrap();
                ttt_timer::wire::instant_to_utc(
                    guard
                        .rematch_expires_at
                        .expect("accept_rematch just confirmed a live window"),
                )
            };
            let msg = ClientMessage::RematchOffered {
                player_id,
                expires_at: expires_at_utc,
            };
            wire::broadcast(&state.ctx, &code, msg.clone());
            ResultEnvelope::ok(msg)
        }
        Ok(ttt_room::AcceptOutcome::Started) => {
            let snapshot = { room.lock().unwrap().snapshot() };
            wire::broadcast(&state.ctx, &code, ClientMessage::RematchStarted { room_code: code.clone() });
            wire::broadcast(
                &state.ctx,
                &code,
                ClientMessage::GameStarted {
                    board: snapshot.board,
                    current_turn: snapshot.current_turn,
                },
            );
            ttt_timer::spawn_turn_timeout(state.ctx.clone(), code.clone());
            tracing::info!(room = %code, "rematch started");
            ResultEnvelope::ok(ClientMessage::RematchStarted { room_code: code })
        }
    }
}

/// Disconnect hook (§4.11). Finds the one room this connection occupied,
/// pauses or closes it, and starts a grace period for the departed player
/// when the room stays open.
async fn handle_disconnect(state: &Arc<ServerState>, connection_id: ConnectionId) {
    let code = { state.connection_rooms.lock().unwrap().remove(&connection_id) };
    let Some(code) = code else { return };
    let Some(room) = state.ctx.registry.try_get_by_id(&code) else {
        return;
    };

    enum Action {
        CloseRoom,
        StartGrace(PlayerId),
        None,
    }

    let (action, cancelled_timer) = {
        let mut guard = room.lock().unwrap();
        let rematch_open = guard.is_game_over && guard.rematch_expires_at.is_some();
        let player_id = guard.player_by_connection(connection_id).map(|p| p.player_id);

        // At most one turn timer is ever live in a room; it may belong to
        // either player, not necessarily the one disconnecting.
        let cancelled_timer = if !rematch_open && !guard.is_game_over {
            guard
                .player_order
                .clone()
                .into_iter()
                .find_map(|id| guard.players.get_mut(&id).and_then(|p| p.turn_timer.take()))
        } else {
            None
        };

        if !guard.is_game_over {
            guard.apply_event(RoomEvent::PlayerDisconnected);
        }
        guard.remove_connection(connection_id);

        let action = if rematch_open {
            Action::CloseRoom
        } else {
            let all_disconnected = !guard.player_order.is_empty()
                && guard.player_order.iter().all(|id| !guard.players[id].is_connected());
            if all_disconnected {
                Action::CloseRoom
            } else if let Some(pid) = player_id {
                Action::StartGrace(pid)
            } else {
                Action::None
            }
        };

        (action, cancelled_timer)
    };

    if let Some(handle) = cancelled_timer {
        handle.cancel(CancelReason::Disconnected);
    }

    match action {
        Action::CloseRoom => {
            wire::broadcast(&state.ctx, &code, ClientMessage::RoomClosed { room_code: code.clone() });
            ttt_timer::close_room(&state.ctx, &code, &room);
            tracing::info!(room = %code, "room closed after disconnect");
        }
        Action::StartGrace(player_id) => {
            ttt_timer::spawn_grace_period(state.ctx.clone(), code.clone(), player_id);
        }
        Action::None => {}
    }
}
